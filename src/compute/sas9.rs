//! Command execution against the SAS 9 REST API.

use reqwest::header::ACCEPT;
use reqwest::Client;

use crate::error::SasError;

/// Client for the SAS 9 server command endpoint.
#[derive(Debug)]
pub struct Sas9Client {
    http: Client,
    server_url: String,
}

impl Sas9Client {
    pub fn new(http: Client, server_url: &str) -> Self {
        Self {
            http,
            server_url: server_url.to_string(),
        }
    }

    /// Runs lines of code on the named server and returns the raw response
    /// body.
    pub async fn execute_script(
        &self,
        lines_of_code: &[String],
        server_name: &str,
        repository_name: &str,
    ) -> Result<String, SasError> {
        let url = format!(
            "{}/sas/servers/{}/cmd?repositoryName={}",
            self.server_url, server_name, repository_name
        );
        let body = format!("command={}", lines_of_code.join("\n"));
        let resp = self
            .http
            .put(&url)
            .header(ACCEPT, "application/json")
            .body(body)
            .send()
            .await?;
        Ok(resp.text().await?)
    }
}
