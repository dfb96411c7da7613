//! Compute and job-execution API client for SAS Viya servers.
//!
//! Everything here talks JSON to the `/compute`, `/jobExecution`,
//! `/folders` and `/files` services. CSRF challenges are handled inline:
//! a 403 naming a token header caches the pair and retries once.

pub mod oauth;
pub mod sas9;

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::Duration;

use async_stream::try_stream;
use futures::future::join_all;
use futures_core::Stream;
use futures_util::StreamExt;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error, warn};

use crate::csv::{convert_to_csv, rows_of};
use crate::error::SasError;
use crate::types::{
    Context, ContextAttributes, CsrfToken, FolderMember, Job, Link, ScriptResult, Session, Tables,
};

const POLL_INTERVAL: Duration = Duration::from_secs(3);
const POLL_CEILING: usize = 100;

/// Job states that stop the poll loop. A poll that hits the ceiling
/// returns a state this predicate rejects, which is how callers can tell
/// a stuck job from a finished one.
pub fn is_terminal_job_state(state: &str) -> bool {
    !matches!(state, "" | "pending" | "running")
}

/// Reads the CSRF pair a 403 challenge advertises, if present.
pub(crate) fn harvest_csrf(resp: &Response) -> Option<CsrfToken> {
    let header_name = resp
        .headers()
        .get("X-CSRF-HEADER")?
        .to_str()
        .ok()?
        .to_string();
    let value = resp
        .headers()
        .get(header_name.as_str())?
        .to_str()
        .ok()?
        .to_string();
    Some(CsrfToken { header_name, value })
}

#[derive(Debug, Deserialize)]
struct ItemsPage<T> {
    #[serde(default)]
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct FolderResource {
    id: String,
    #[serde(default)]
    links: Vec<Link>,
}

#[derive(Debug, Deserialize)]
struct FileResource {
    id: String,
}

/// A table uploaded ahead of a job submission.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub table_name: String,
    pub file_id: String,
}

/// Client for the Viya compute and job-execution services.
#[derive(Debug)]
pub struct ComputeClient {
    http: Client,
    server_url: String,
    csrf: Mutex<Option<CsrfToken>>,
    job_map: Mutex<HashMap<String, Vec<FolderMember>>>,
}

impl ComputeClient {
    /// Builds a compute client over an existing HTTP client, so the cookie
    /// jar is shared with the interactive login flow.
    pub fn new(http: Client, server_url: &str) -> Self {
        Self {
            http,
            server_url: server_url.to_string(),
            csrf: Mutex::new(None),
            job_map: Mutex::new(HashMap::new()),
        }
    }

    /// Lists every execution context defined on the server.
    pub async fn get_all_contexts(
        &self,
        access_token: Option<&str>,
    ) -> Result<Vec<Context>, SasError> {
        let url = format!("{}/compute/contexts", self.server_url);
        let resp = self
            .send_csrf(|| self.json_request(self.http.get(&url), access_token))
            .await?;
        let page: ItemsPage<Context> = Self::parse_ok(resp).await?;
        Ok(page.items)
    }

    /// Probes every context with a one-line program and keeps those the
    /// caller can actually run code in, annotated with the server-side user
    /// the context executes as. Probe failures are swallowed; a context
    /// that cannot run code is simply absent from the result.
    pub async fn get_executable_contexts(
        &self,
        access_token: Option<&str>,
    ) -> Result<Vec<Context>, SasError> {
        let contexts = self.get_all_contexts(access_token).await?;

        let probes = contexts.iter().map(|context| {
            let file_name = format!("test-{}", context.name);
            async move {
                let lines = ["%put &=sysuserid;".to_string()];
                self.execute_script(&file_name, &lines, &context.name, access_token, None, true)
                    .await
                    .ok()
                    .flatten()
            }
        });
        let results = join_all(probes).await;

        let mut executable = Vec::new();
        for (context, result) in contexts.into_iter().zip(results) {
            let result = match result {
                Some(r) if r.job_status == "completed" => r,
                _ => continue,
            };
            let sys_user_id = result.log["items"]
                .as_array()
                .and_then(|items| {
                    items.iter().find_map(|item| {
                        item["line"]
                            .as_str()
                            .and_then(|line| line.strip_prefix("SYSUSERID="))
                    })
                })
                .unwrap_or("")
                .to_string();
            executable.push(Context {
                attributes: ContextAttributes {
                    sys_user_id: Some(sys_user_id),
                },
                ..context
            });
        }
        Ok(executable)
    }

    /// Creates a session on the named context.
    pub async fn create_session(
        &self,
        context_name: &str,
        access_token: &str,
    ) -> Result<Session, SasError> {
        let url = format!("{}/compute/contexts", self.server_url);
        let resp = self
            .send_csrf(|| self.json_request(self.http.get(&url), Some(access_token)))
            .await?;
        let page: ItemsPage<Context> = Self::parse_ok(resp).await?;
        let context = page
            .items
            .into_iter()
            .find(|c| c.name == context_name)
            .ok_or_else(|| SasError::ContextNotFound {
                context_name: context_name.to_string(),
            })?;

        let url = format!(
            "{}/compute/contexts/{}/sessions",
            self.server_url, context.id
        );
        let resp = self
            .send_csrf(|| self.json_request(self.http.post(&url), Some(access_token)))
            .await?;
        Self::parse_ok(resp).await
    }

    /// Runs lines of code in a session on the named context, waits for the
    /// job to finish and returns its final state plus the fetched log.
    /// Returns `None` when the context does not exist or the finished job
    /// exposed no log.
    pub async fn execute_script(
        &self,
        file_name: &str,
        lines_of_code: &[String],
        context_name: &str,
        access_token: Option<&str>,
        session_id: Option<&str>,
        silent: bool,
    ) -> Result<Option<ScriptResult>, SasError> {
        let url = format!("{}/compute/contexts", self.server_url);
        let resp = self
            .send_csrf(|| self.json_request(self.http.get(&url), access_token))
            .await?;
        let page: ItemsPage<Context> = Self::parse_ok(resp).await?;

        let context = match page.items.into_iter().find(|c| c.name == context_name) {
            Some(context) => context,
            None => {
                error!(
                    "unable to find execution context {}, check the context name and try again",
                    context_name
                );
                return Ok(None);
            }
        };

        let session_id = match session_id {
            Some(id) => id.to_string(),
            None => {
                let url = format!(
                    "{}/compute/contexts/{}/sessions",
                    self.server_url, context.id
                );
                let resp = self
                    .send_csrf(|| self.json_request(self.http.post(&url), access_token))
                    .await?;
                let session: Session = Self::parse_ok(resp).await?;
                session.id
            }
        };

        let job_body = json!({
            "name": file_name,
            "description": "Powered by saslink",
            "code": lines_of_code,
        });
        let url = format!("{}/compute/sessions/{}/jobs", self.server_url, session_id);
        let resp = self
            .send_csrf(|| {
                self.json_request(self.http.post(&url), access_token)
                    .json(&job_body)
            })
            .await?;
        let job: Job = Self::parse_ok(resp).await?;
        if !silent {
            if let Some(link) = job.link("state") {
                debug!(
                    "job submitted for {}, state at {}{}",
                    file_name, self.server_url, link.href
                );
            }
        }

        let job_status = self.poll_job_state(&job, access_token, silent).await?;
        match job.link("log") {
            Some(link) => {
                let url = format!("{}{}?limit=100000", self.server_url, link.href);
                let resp = self
                    .send_csrf(|| self.json_request(self.http.get(&url), access_token))
                    .await?;
                let log: Value = Self::parse_ok(resp).await?;
                Ok(Some(ScriptResult { job_status, log }))
            }
            None => Ok(None),
        }
    }

    /// Submits a job definition stored under `app_loc`, waits for it to
    /// finish and returns its final state and log. Tables in `data` are
    /// uploaded first and wired into the job arguments as file references.
    pub async fn post_job(
        &self,
        app_loc: &str,
        job_path: &str,
        data: Option<&Tables>,
        access_token: Option<&str>,
    ) -> Result<ScriptResult, SasError> {
        let not_found = || SasError::JobNotFound {
            job_path: job_path.to_string(),
            app_loc: app_loc.to_string(),
        };

        let map_empty = self
            .job_map
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_empty();
        if map_empty {
            self.populate_job_map(app_loc, access_token).await?;
        }
        if self
            .job_map
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_empty()
        {
            return Err(not_found());
        }

        let files = match data {
            Some(tables) if !tables.is_empty() => {
                self.upload_tables(tables, access_token).await?
            }
            _ => Vec::new(),
        };

        let job_name = job_path.rsplit('/').next().unwrap_or(job_path);
        let job_folder = job_path
            .strip_suffix(job_name)
            .map(|folder| folder.trim_end_matches('/'))
            .unwrap_or("");

        let job_spec = {
            let map = self.job_map.lock().unwrap_or_else(|e| e.into_inner());
            map.get(job_folder)
                .and_then(|jobs| jobs.iter().find(|j| j.name == job_name))
                .cloned()
        };
        let job_spec = job_spec.ok_or_else(not_found)?;
        let definition_link = job_spec.link("getResource").ok_or_else(not_found)?;

        let url = format!("{}{}", self.server_url, definition_link.href);
        let resp = self
            .send_csrf(|| self.json_request(self.http.get(&url), access_token))
            .await?;
        let job_definition: Value = Self::parse_ok(resp).await?;

        let mut arguments = serde_json::Map::new();
        arguments.insert("_contextName".to_string(), json!("SharedCompute"));
        arguments.insert(
            "_program".to_string(),
            json!(format!("{}/{}", app_loc, job_path)),
        );
        arguments.insert("_webin_file_count".to_string(), json!(files.len()));
        arguments.insert("_debug".to_string(), json!(true));
        for (i, upload) in files.iter().enumerate() {
            arguments.insert(
                format!("_webin_fileuri{}", i + 1),
                json!(format!("/files/files/{}", upload.file_id)),
            );
            arguments.insert(format!("_webin_name{}", i + 1), json!(upload.table_name));
        }

        let job_request = json!({
            "name": format!("exec-{}", job_name),
            "description": "Powered by saslink",
            "jobDefinition": job_definition,
            "arguments": Value::Object(arguments),
        });
        let url = format!("{}/jobExecution/jobs", self.server_url);
        let resp = self
            .send_csrf(|| {
                self.json_request(self.http.post(&url), access_token)
                    .json(&job_request)
            })
            .await?;
        let posted: Job = Self::parse_ok(resp).await?;

        let job_status = self.poll_job_state(&posted, access_token, false).await?;
        match posted.link("log") {
            Some(link) => {
                let url = format!("{}{}", self.server_url, link.href);
                let resp = self
                    .send_csrf(|| self.json_request(self.http.get(&url), access_token))
                    .await?;
                let log: Value = Self::parse_ok(resp).await?;
                Ok(ScriptResult { job_status, log })
            }
            None => Ok(ScriptResult {
                job_status,
                log: Value::Null,
            }),
        }
    }

    /// Walks the folder tree one level deep under `folder_name` and caches
    /// every job definition found, keyed by subfolder name. Jobs at the
    /// root of the folder live under the empty key.
    async fn populate_job_map(
        &self,
        folder_name: &str,
        access_token: Option<&str>,
    ) -> Result<(), SasError> {
        let url = format!(
            "{}/folders/folders/@item?path={}",
            self.server_url, folder_name
        );
        let resp = self
            .send_csrf(|| self.json_request(self.http.get(&url), access_token))
            .await?;
        let folder: FolderResource = Self::parse_ok(resp).await?;

        let url = format!("{}/folders/folders/{}/members", self.server_url, folder.id);
        let resp = self
            .send_csrf(|| self.json_request(self.http.get(&url), access_token))
            .await?;
        let members: ItemsPage<FolderMember> = Self::parse_ok(resp).await?;

        let mut all_files: HashMap<String, Vec<FolderMember>> = HashMap::new();
        let jobs_at_root = members
            .items
            .iter()
            .filter(|m| m.content_type == "jobDefinition")
            .cloned()
            .collect();
        all_files.insert(String::new(), jobs_at_root);

        let subfolder_lookups = members
            .items
            .iter()
            .filter(|m| m.content_type == "folder")
            .map(|member| {
                let name = member.name.clone();
                async move {
                    let jobs = self
                        .jobs_in_subfolder(folder_name, &name, access_token)
                        .await?;
                    Ok::<(String, Vec<FolderMember>), SasError>((name, jobs))
                }
            });
        for result in join_all(subfolder_lookups).await {
            let (name, jobs) = result?;
            all_files.insert(name, jobs);
        }

        *self.job_map.lock().unwrap_or_else(|e| e.into_inner()) = all_files;
        Ok(())
    }

    async fn jobs_in_subfolder(
        &self,
        folder_name: &str,
        member_name: &str,
        access_token: Option<&str>,
    ) -> Result<Vec<FolderMember>, SasError> {
        let url = format!(
            "{}/folders/folders/@item?path={}/{}",
            self.server_url, folder_name, member_name
        );
        let resp = self
            .send_csrf(|| self.json_request(self.http.get(&url), access_token))
            .await?;
        let detail: FolderResource = Self::parse_ok(resp).await?;
        let members_link = detail
            .links
            .iter()
            .find(|l| l.rel == "members")
            .ok_or_else(|| SasError::MalformedResponse {
                body: format!("folder {} has no members link", member_name),
            })?;

        let url = format!("{}{}", self.server_url, members_link.href);
        let resp = self
            .send_csrf(|| self.json_request(self.http.get(&url), access_token))
            .await?;
        let contents: ItemsPage<FolderMember> = Self::parse_ok(resp).await?;
        Ok(contents
            .items
            .into_iter()
            .filter(|m| m.content_type == "jobDefinition")
            .collect())
    }

    /// Uploads each table as a raw CSV file, in table order.
    async fn upload_tables(
        &self,
        tables: &Tables,
        access_token: Option<&str>,
    ) -> Result<Vec<UploadedFile>, SasError> {
        let url = format!("{}/files/files#rawUpload", self.server_url);
        let mut uploaded = Vec::new();
        for (table_name, value) in tables {
            let csv = convert_to_csv(&rows_of(value))?;
            let resp = self
                .send_csrf(|| {
                    self.json_request(self.http.post(&url), access_token)
                        .body(csv.clone())
                })
                .await?;
            let file: FileResource = Self::parse_ok(resp).await?;
            uploaded.push(UploadedFile {
                table_name: table_name.clone(),
                file_id: file.id,
            });
        }
        Ok(uploaded)
    }

    /// Polls a submitted job until it reaches a terminal state, at most
    /// [`POLL_CEILING`] polls [`POLL_INTERVAL`] apart. The last observed
    /// state comes back even when the ceiling is hit, so a stuck job
    /// surfaces as `running`.
    async fn poll_job_state(
        &self,
        job: &Job,
        access_token: Option<&str>,
        silent: bool,
    ) -> Result<String, SasError> {
        let state_link = match job.link("state") {
            Some(link) => link,
            None => {
                warn!("job carries no state link, nothing to poll");
                return Ok(String::new());
            }
        };
        let url = format!("{}{}", self.server_url, state_link.href);
        let ticks = self.job_state_ticks(url, access_token.map(str::to_string), silent);
        drive_poll(ticks).await
    }

    /// Yields the job state every [`POLL_INTERVAL`], forever. The consumer
    /// decides when to stop pulling.
    fn job_state_ticks(
        &self,
        state_url: String,
        access_token: Option<String>,
        silent: bool,
    ) -> Pin<Box<dyn Stream<Item = Result<String, SasError>> + Send>> {
        let http = self.http.clone();
        Box::pin(try_stream! {
            loop {
                tokio::time::sleep(POLL_INTERVAL).await;
                let mut req = http.get(&state_url).header(CONTENT_TYPE, "application/json");
                if let Some(token) = &access_token {
                    req = req.bearer_auth(token);
                }
                let state = req.send().await?.text().await?;
                let state = state.trim().to_string();
                if !silent {
                    debug!("current job state: {}", state);
                }
                yield state;
            }
        })
    }

    /// Attaches `Content-Type: application/json` and the bearer token.
    fn json_request(
        &self,
        builder: RequestBuilder,
        access_token: Option<&str>,
    ) -> RequestBuilder {
        let builder = builder.header(CONTENT_TYPE, "application/json");
        match access_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Sends a request with the cached CSRF token attached. On a 403 that
    /// names a token header, caches the new pair and resends once.
    async fn send_csrf<F>(&self, build: F) -> Result<Response, SasError>
    where
        F: Fn() -> RequestBuilder,
    {
        let resp = self.attach_csrf(build()).send().await?;
        if resp.status() == reqwest::StatusCode::FORBIDDEN {
            if let Some(token) = harvest_csrf(&resp) {
                debug!("csrf challenge from {}, retrying once", token.header_name);
                *self.csrf.lock().unwrap_or_else(|e| e.into_inner()) = Some(token);
                return Ok(self.attach_csrf(build()).send().await?);
            }
        }
        Ok(resp)
    }

    fn attach_csrf(&self, builder: RequestBuilder) -> RequestBuilder {
        let csrf = self.csrf.lock().unwrap_or_else(|e| e.into_inner()).clone();
        match csrf {
            Some(token) => builder.header(token.header_name.as_str(), token.value.as_str()),
            None => builder,
        }
    }

    /// Decodes a JSON body, surfacing the status and raw text on failure.
    async fn parse_ok<T: DeserializeOwned>(resp: Response) -> Result<T, SasError> {
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(SasError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }
        serde_json::from_str(&body).map_err(|_| SasError::MalformedResponse { body })
    }
}

/// Pulls states until one is terminal or the poll ceiling is hit and
/// returns the last state seen.
async fn drive_poll<S>(mut states: S) -> Result<String, SasError>
where
    S: Stream<Item = Result<String, SasError>> + Unpin,
{
    let mut last = String::new();
    let mut polls = 0usize;
    while let Some(state) = states.next().await {
        last = state?;
        polls += 1;
        if is_terminal_job_state(&last) || polls >= POLL_CEILING {
            break;
        }
    }
    Ok(last)
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    #[test]
    fn test_terminal_job_states() {
        assert!(!is_terminal_job_state(""));
        assert!(!is_terminal_job_state("pending"));
        assert!(!is_terminal_job_state("running"));
        assert!(is_terminal_job_state("completed"));
        assert!(is_terminal_job_state("failed"));
        assert!(is_terminal_job_state("error"));
    }

    #[tokio::test]
    async fn test_drive_poll_stops_at_first_terminal_state() {
        let polled = Cell::new(0);
        let states =
            futures::stream::iter(["pending", "pending", "running", "completed", "failed"]).map(
                |state| {
                    polled.set(polled.get() + 1);
                    Ok::<String, SasError>(state.to_string())
                },
            );
        let last = drive_poll(states).await.unwrap();
        assert_eq!(last, "completed");
        assert_eq!(polled.get(), 4);
    }

    #[tokio::test]
    async fn test_drive_poll_gives_up_after_one_hundred_polls() {
        let polled = Cell::new(0);
        let states = futures::stream::iter(0..1000).map(|_| {
            polled.set(polled.get() + 1);
            Ok::<String, SasError>("running".to_string())
        });
        let last = drive_poll(states).await.unwrap();
        assert_eq!(last, "running");
        assert_eq!(polled.get(), 100);
    }

    #[tokio::test]
    async fn test_drive_poll_propagates_fetch_errors() {
        let states = futures::stream::iter([
            Ok::<String, SasError>("pending".to_string()),
            Err(SasError::MalformedResponse {
                body: "gateway timeout".to_string(),
            }),
        ]);
        let err = drive_poll(states).await.unwrap_err();
        assert!(matches!(err, SasError::MalformedResponse { .. }));
    }
}
