//! OAuth authorization-code and token grants against SASLogon.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::header::AUTHORIZATION;
use reqwest::multipart::Form;

use crate::auth::{html, is_authorize_form_required, submit_authorize_form};
use crate::error::SasError;
use crate::types::TokenResponse;

use super::ComputeClient;

impl ComputeClient {
    /// Walks the authorization-code redirect for `client_id` and scrapes
    /// the code off the resulting page, granting the interposed
    /// authorization form when the server serves one. `None` when the page
    /// carries no code, for instance because no session is signed in.
    pub async fn get_auth_code(&self, client_id: &str) -> Result<Option<String>, SasError> {
        let url = format!(
            "{}/SASLogon/oauth/authorize?client_id={}&response_type=code",
            self.server_url, client_id
        );
        let page = self.http.get(&url).send().await?.text().await?;

        let page = if is_authorize_form_required(&page) {
            submit_authorize_form(&self.http, &self.server_url, &page).await?
        } else {
            page
        };
        Ok(html::extract_info_box(&page))
    }

    /// Exchanges an auth code for an access/refresh token pair.
    pub async fn get_access_token(
        &self,
        client_id: &str,
        client_secret: &str,
        auth_code: &str,
    ) -> Result<TokenResponse, SasError> {
        let form = Form::new()
            .text("grant_type", "authorization_code")
            .text("code", auth_code.to_string());
        self.token_request(client_id, client_secret, form).await
    }

    /// Trades a refresh token for a fresh token pair.
    pub async fn refresh_tokens(
        &self,
        client_id: &str,
        client_secret: &str,
        refresh_token: &str,
    ) -> Result<TokenResponse, SasError> {
        let form = Form::new()
            .text("grant_type", "refresh_token")
            .text("refresh_token", refresh_token.to_string());
        self.token_request(client_id, client_secret, form).await
    }

    /// Deletes the OAuth client registration itself. The response body is
    /// returned verbatim for the caller to display.
    pub async fn delete_client(
        &self,
        client_id: &str,
        access_token: &str,
    ) -> Result<String, SasError> {
        let url = format!("{}/oauth/clients/{}", self.server_url, client_id);
        let resp = self
            .http
            .delete(&url)
            .bearer_auth(access_token)
            .send()
            .await?;
        Ok(resp.text().await?)
    }

    async fn token_request(
        &self,
        client_id: &str,
        client_secret: &str,
        form: Form,
    ) -> Result<TokenResponse, SasError> {
        let url = format!("{}/SASLogon/oauth/token", self.server_url);
        let basic = STANDARD.encode(format!("{}:{}", client_id, client_secret));
        let resp = self
            .http
            .post(&url)
            .header(AUTHORIZATION, format!("Basic {}", basic))
            .multipart(form)
            .send()
            .await?;
        Self::parse_ok(resp).await
    }
}
