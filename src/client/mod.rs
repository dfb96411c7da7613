//! The request engine: builds program submissions, retries CSRF
//! challenges, parks calls that arrive while signed out and decodes the
//! platform's response shapes.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::Utc;
use futures::future::join_all;
use reqwest::multipart::{Form, Part};
use reqwest::{StatusCode, Url};
use serde_json::{Map, Value};
use tokio::sync::oneshot;
use tracing::debug;

use crate::auth::{is_log_in_required, needs_retry};
use crate::compute::sas9::Sas9Client;
use crate::compute::{harvest_csrf, ComputeClient};
use crate::config::{SasConfig, ServerType};
use crate::csv::{convert_to_csv, rows_of, split_chunks, CHUNK_SIZE};
use crate::error::SasError;
use crate::parser::{
    decode_sas9_debug, extract_iframe_src, parse_generated_code, parse_source_code,
    ResponseFormat,
};
use crate::types::{
    Context, CsrfToken, RequestLogEntry, ScriptResult, Session, Tables, TokenResponse,
};

const REQUEST_RETRY_LIMIT: usize = 5;
const REQUEST_LOG_CAP: usize = 20;

/// A request that hit the login page and waits for a sign-in. Holds the
/// original arguments for the replay and the channel that settles the
/// caller.
pub(crate) struct WaitingRequest {
    program_name: String,
    data: Option<Tables>,
    params: Option<Map<String, Value>>,
    tx: oneshot::Sender<Result<Value, SasError>>,
}

pub(crate) struct ClientState {
    pub(crate) csrf: Option<CsrfToken>,
    pub(crate) user_name: String,
    pub(crate) login_url: String,
    pub(crate) waiting: Vec<WaitingRequest>,
    pub(crate) requests: VecDeque<RequestLogEntry>,
}

/// Adapter for submitting programs to a SAS server and reading structured
/// results back. One instance owns the whole session: cookie jar, CSRF
/// token, username, parked requests and the request log.
pub struct SasClient {
    pub(crate) config: SasConfig,
    pub(crate) http: reqwest::Client,
    pub(crate) state: Mutex<ClientState>,
    compute: Option<ComputeClient>,
    sas9: Option<Sas9Client>,
}

impl SasClient {
    /// Builds a client. The HTTP client keeps a cookie jar so the SASLogon
    /// session survives across calls; the platform-specific API client
    /// shares it.
    pub fn new(mut config: SasConfig) -> Result<Self, SasError> {
        config.normalize();
        let http = reqwest::Client::builder().cookie_store(true).build()?;
        let compute = match config.server_type {
            ServerType::SasViya => Some(ComputeClient::new(http.clone(), &config.server_url)),
            ServerType::Sas9 => None,
        };
        let sas9 = match config.server_type {
            ServerType::Sas9 => Some(Sas9Client::new(http.clone(), &config.server_url)),
            ServerType::SasViya => None,
        };
        let state = Mutex::new(ClientState {
            csrf: None,
            user_name: String::new(),
            login_url: config.login_url(),
            waiting: Vec::new(),
            requests: VecDeque::new(),
        });
        Ok(Self {
            config,
            http,
            state,
            compute,
            sas9,
        })
    }

    /// Submits the named program under the configured app location and
    /// returns the decoded payload. Tables in `data` ride along in the
    /// platform's ingestion format; `params` adds extra request fields.
    /// When the server demands a login first, the call parks until
    /// [`SasClient::log_in`] succeeds and replays it.
    pub async fn request(
        &self,
        program_name: &str,
        data: Option<&Tables>,
        params: Option<&Map<String, Value>>,
    ) -> Result<Value, SasError> {
        self.request_inner(program_name, data, params, true, None::<fn(bool)>)
            .await
    }

    /// Same as [`SasClient::request`], additionally invoking
    /// `on_login_required` with `true` the moment the call parks.
    pub async fn request_with_callback<F>(
        &self,
        program_name: &str,
        data: Option<&Tables>,
        params: Option<&Map<String, Value>>,
        on_login_required: F,
    ) -> Result<Value, SasError>
    where
        F: FnOnce(bool),
    {
        self.request_inner(program_name, data, params, true, Some(on_login_required))
            .await
    }

    async fn request_inner<F>(
        &self,
        program_name: &str,
        data: Option<&Tables>,
        params: Option<&Map<String, Value>>,
        park: bool,
        on_login_required: Option<F>,
    ) -> Result<Value, SasError>
    where
        F: FnOnce(bool),
    {
        let program = self.program_path(program_name);
        let api_url = format!(
            "{}{}/?_program={}",
            self.config.server_url,
            self.config.jobs_path(),
            program
        );

        // Serialize up front so oversized values fail before any traffic.
        let payload = self.serialize_tables(data)?;

        let mut retry_count = 0;
        let body = loop {
            let form = self.build_form(&payload, params)?;
            let resp = self.http.post(&api_url).multipart(form).send().await?;

            if resp.status() == StatusCode::FORBIDDEN {
                if let Some(token) = harvest_csrf(&resp) {
                    debug!("caching csrf pair from 403 challenge");
                    self.state.lock().unwrap_or_else(|e| e.into_inner()).csrf = Some(token);
                }
            }
            let redirected = self.config.server_type == ServerType::Sas9
                && Url::parse(&api_url)
                    .map(|url| resp.url() != &url)
                    .unwrap_or(false);
            let text = resp.text().await?;

            if (needs_retry(&text) || redirected) && !is_log_in_required(&text) {
                if retry_count < REQUEST_RETRY_LIMIT {
                    retry_count += 1;
                    debug!(
                        "auth challenge in response, retry {} of {}",
                        retry_count, REQUEST_RETRY_LIMIT
                    );
                    continue;
                }
                return Err(SasError::RetriesExhausted { body: text });
            }
            break text;
        };

        self.append_request_log(&body, &program).await;

        if is_log_in_required(&body) {
            if let Some(callback) = on_login_required {
                callback(true);
            }
            if !park {
                return Err(SasError::LoginRequired);
            }
            debug!("login required, parking request until sign-in");
            let (tx, rx) = oneshot::channel();
            {
                let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
                state.waiting.push(WaitingRequest {
                    program_name: program_name.to_string(),
                    data: data.cloned(),
                    params: params.cloned(),
                    tx,
                });
            }
            return rx.await.map_err(|_| SasError::Canceled)?;
        }

        self.decode_response(body).await
    }

    /// Replays every parked request in arrival order. Each replay is an
    /// independent submission whose outcome settles the original caller; a
    /// replay that bounces back to the login page settles with
    /// [`SasError::LoginRequired`] instead of parking again.
    pub(crate) async fn resend_waiting_requests(&self) {
        let waiting = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut state.waiting)
        };
        if waiting.is_empty() {
            return;
        }
        debug!("replaying {} parked request(s)", waiting.len());

        let mut senders = Vec::with_capacity(waiting.len());
        let mut replays = Vec::with_capacity(waiting.len());
        for request in waiting {
            senders.push(request.tx);
            let (program_name, data, params) = (request.program_name, request.data, request.params);
            replays.push(async move {
                self.request_inner(
                    &program_name,
                    data.as_ref(),
                    params.as_ref(),
                    false,
                    None::<fn(bool)>,
                )
                .await
            });
        }
        let results = join_all(replays).await;
        for (tx, result) in senders.into_iter().zip(results) {
            let _ = tx.send(result);
        }
    }

    fn program_path(&self, program_name: &str) -> String {
        if self.config.app_loc.is_empty() {
            return program_name.to_string();
        }
        let mut app_loc = self.config.app_loc.clone();
        if !app_loc.ends_with('/') {
            app_loc.push('/');
        }
        let relative = program_name.strip_prefix('/').unwrap_or(program_name);
        format!("{}{}", app_loc, relative)
    }

    /// Serializes tables into the platform's submission shape. SAS 9 ships
    /// each table as a file part; Viya inlines them as numbered parameters,
    /// chunked when the text exceeds [`CHUNK_SIZE`] characters, with the
    /// table names listed under `sasjs_tables`.
    fn serialize_tables(&self, data: Option<&Tables>) -> Result<TablePayload, SasError> {
        let mut payload = TablePayload::default();
        let tables = match data {
            Some(tables) => tables,
            None => return Ok(payload),
        };

        match self.config.server_type {
            ServerType::Sas9 => {
                for (name, value) in tables {
                    let csv = convert_to_csv(&rows_of(value))?;
                    payload.file_parts.push((name.clone(), csv));
                }
            }
            ServerType::SasViya => {
                let mut table_names = Vec::new();
                for (counter, (name, value)) in tables.iter().enumerate() {
                    table_names.push(name.clone());
                    let csv = convert_to_csv(&rows_of(value))?;
                    let key = format!("sasjs{}data", counter + 1);
                    if csv.chars().count() > CHUNK_SIZE {
                        payload.chunked.push((key, split_chunks(&csv)));
                    } else {
                        payload.inline.push((key, csv));
                    }
                }
                payload
                    .inline
                    .push(("sasjs_tables".to_string(), table_names.join(" ")));
            }
        }
        Ok(payload)
    }

    fn build_form(
        &self,
        payload: &TablePayload,
        params: Option<&Map<String, Value>>,
    ) -> Result<Form, SasError> {
        let mut form = Form::new();
        for (name, csv) in &payload.file_parts {
            let part = Part::text(csv.clone())
                .file_name(format!("{}.csv", name))
                .mime_str("application/csv")?;
            form = form.part(name.clone(), part);
        }
        for (key, chunks) in &payload.chunked {
            for chunk in chunks {
                form = form.text(key.clone(), chunk.clone());
            }
        }
        for (key, value) in &payload.inline {
            form = form.text(key.clone(), value.clone());
        }

        // Engine params override caller params on key clashes.
        let mut merged: Map<String, Value> = Map::new();
        if let Some(params) = params {
            for (key, value) in params {
                merged.insert(key.clone(), value.clone());
            }
        }
        for (key, value) in self.request_params() {
            merged.insert(key, Value::String(value));
        }
        for (key, value) in &merged {
            form = form.text(key.clone(), param_text(value));
        }
        Ok(form)
    }

    /// Parameters every submission carries: the cached CSRF token and, in
    /// debug mode, the flags asking the server to keep full text logs and
    /// session results.
    fn request_params(&self) -> Vec<(String, String)> {
        let mut params = Vec::new();
        if let Some(csrf) = self.csrf() {
            params.push(("_csrf".to_string(), csrf.value));
        }
        if self.config.debug {
            params.push(("_omittextlog".to_string(), "false".to_string()));
            params.push(("_omitsessionresults".to_string(), "false".to_string()));
            params.push(("_debug".to_string(), "131".to_string()));
        }
        params
    }

    /// Decodes a settled response body by platform and debug mode, then
    /// learns the session username from the payload.
    async fn decode_response(&self, body: String) -> Result<Value, SasError> {
        let payload = match ResponseFormat::select(self.config.server_type, self.config.debug) {
            ResponseFormat::Sas9Debug => decode_sas9_debug(&body)?,
            ResponseFormat::ViyaDebug => {
                let bundle = self.fetch_debug_bundle(&body).await?;
                serde_json::from_str(&bundle)
                    .map_err(|_| SasError::MalformedResponse { body: bundle })?
            }
            ResponseFormat::Direct => serde_json::from_str(&body)
                .map_err(|_| SasError::MalformedResponse { body })?,
        };
        self.update_user_name(&payload);
        Ok(payload)
    }

    /// Follows the iframe indirection of a Viya debug response and returns
    /// the fetched bundle text.
    async fn fetch_debug_bundle(&self, body: &str) -> Result<String, SasError> {
        let src = extract_iframe_src(body).ok_or_else(|| SasError::MalformedResponse {
            body: body.to_string(),
        })?;
        let url = format!("{}{}", self.config.server_url, src);
        Ok(self.http.get(&url).send().await?.text().await?)
    }

    fn update_user_name(&self, payload: &Value) {
        let field = match self.config.server_type {
            ServerType::Sas9 => "_METAUSER",
            ServerType::SasViya => "SYSUSERID",
        };
        let user = payload[field].as_str().unwrap_or_default().to_string();
        self.state.lock().unwrap_or_else(|e| e.into_inner()).user_name = user;
    }

    /// Appends one entry to the request log ring. On Viya without debug the
    /// body is withheld, the entry still marks that the request happened.
    async fn append_request_log(&self, body: &str, program: &str) {
        let log_file = match self.config.server_type {
            ServerType::Sas9 => Some(body.to_string()),
            ServerType::SasViya => self.config.debug.then(|| body.to_string()),
        };

        let (source_code, generated_code, sas_work) = match &log_file {
            Some(text) => (
                parse_source_code(text),
                parse_generated_code(text, self.config.server_type),
                self.parse_sas_work(text).await,
            ),
            None => (String::new(), String::new(), None),
        };

        let entry = RequestLogEntry {
            log_file,
            service_link: program.to_string(),
            timestamp: Utc::now(),
            source_code,
            generated_code,
            sas_work,
        };
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.requests.push_back(entry);
        if state.requests.len() > REQUEST_LOG_CAP {
            state.requests.pop_front();
        }
    }

    /// Work-library metadata from a debug response. Best effort only; any
    /// failure along the way yields `None`.
    async fn parse_sas_work(&self, body: &str) -> Option<Value> {
        if !self.config.debug {
            return None;
        }
        let payload = match self.config.server_type {
            ServerType::Sas9 => decode_sas9_debug(body).ok()?,
            ServerType::SasViya => {
                let bundle = self.fetch_debug_bundle(body).await.ok()?;
                serde_json::from_str(&bundle).ok()?
            }
        };
        payload.get("WORK").cloned()
    }

    /// Configuration in effect, with normalized URLs.
    pub fn config(&self) -> &SasConfig {
        &self.config
    }

    /// Username last learned from a login call or a decoded response.
    pub fn user_name(&self) -> String {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .user_name
            .clone()
    }

    pub(crate) fn set_user_name(&self, user_name: &str) {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).user_name = user_name.to_string();
    }

    /// CSRF pair cached from the last 403 challenge, if any.
    pub fn csrf(&self) -> Option<CsrfToken> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .csrf
            .clone()
    }

    pub(crate) fn login_url(&self) -> String {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .login_url
            .clone()
    }

    /// The request log, most recent first. Capped at twenty entries.
    pub fn requests(&self) -> Vec<RequestLogEntry> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let mut entries: Vec<RequestLogEntry> = state.requests.iter().cloned().collect();
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        entries
    }

    /// Flips debug mode for subsequent requests.
    pub fn set_debug(&mut self, debug: bool) {
        self.config.debug = debug;
    }

    /// Swaps the configuration. URLs and the platform API clients are
    /// re-derived and the cached CSRF pair is dropped; the HTTP client and
    /// its cookie jar carry over.
    pub fn update_config(&mut self, mut config: SasConfig) {
        config.normalize();
        self.compute = match config.server_type {
            ServerType::SasViya => Some(ComputeClient::new(self.http.clone(), &config.server_url)),
            ServerType::Sas9 => None,
        };
        self.sas9 = match config.server_type {
            ServerType::Sas9 => Some(Sas9Client::new(self.http.clone(), &config.server_url)),
            ServerType::SasViya => None,
        };
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.login_url = config.login_url();
            state.csrf = None;
        }
        self.config = config;
    }

    fn viya(&self, operation: &'static str) -> Result<&ComputeClient, SasError> {
        self.compute.as_ref().ok_or(SasError::WrongServerType {
            operation,
            required: ServerType::SasViya,
        })
    }

    fn sas9(&self, operation: &'static str) -> Result<&Sas9Client, SasError> {
        self.sas9.as_ref().ok_or(SasError::WrongServerType {
            operation,
            required: ServerType::Sas9,
        })
    }

    /// Lists every execution context. Viya only.
    pub async fn get_all_contexts(
        &self,
        access_token: Option<&str>,
    ) -> Result<Vec<Context>, SasError> {
        self.viya("get_all_contexts")?
            .get_all_contexts(access_token)
            .await
    }

    /// Lists the contexts the caller can actually run code in. Viya only.
    pub async fn get_executable_contexts(
        &self,
        access_token: Option<&str>,
    ) -> Result<Vec<Context>, SasError> {
        self.viya("get_executable_contexts")?
            .get_executable_contexts(access_token)
            .await
    }

    /// Creates a compute session on the named context. Viya only.
    pub async fn create_session(
        &self,
        context_name: &str,
        access_token: &str,
    ) -> Result<Session, SasError> {
        self.viya("create_session")?
            .create_session(context_name, access_token)
            .await
    }

    /// Runs lines of code on the named context and returns the final job
    /// state and log. Viya only.
    pub async fn execute_script(
        &self,
        file_name: &str,
        lines_of_code: &[String],
        context_name: &str,
        access_token: Option<&str>,
        session_id: Option<&str>,
        silent: bool,
    ) -> Result<Option<ScriptResult>, SasError> {
        self.viya("execute_script")?
            .execute_script(
                file_name,
                lines_of_code,
                context_name,
                access_token,
                session_id,
                silent,
            )
            .await
    }

    /// Submits a stored job definition under the app location. Viya only.
    pub async fn post_job(
        &self,
        job_path: &str,
        data: Option<&Tables>,
        access_token: Option<&str>,
    ) -> Result<ScriptResult, SasError> {
        self.viya("post_job")?
            .post_job(&self.config.app_loc, job_path, data, access_token)
            .await
    }

    /// Runs lines of code through the SAS 9 command API. SAS 9 only.
    pub async fn execute_script_sas9(
        &self,
        lines_of_code: &[String],
        server_name: &str,
        repository_name: &str,
    ) -> Result<String, SasError> {
        self.sas9("execute_script_sas9")?
            .execute_script(lines_of_code, server_name, repository_name)
            .await
    }

    /// Walks the authorization-code redirect for an OAuth client. Viya
    /// only.
    pub async fn get_auth_code(&self, client_id: &str) -> Result<Option<String>, SasError> {
        self.viya("get_auth_code")?.get_auth_code(client_id).await
    }

    /// Exchanges an auth code for tokens. Viya only.
    pub async fn get_access_token(
        &self,
        client_id: &str,
        client_secret: &str,
        auth_code: &str,
    ) -> Result<TokenResponse, SasError> {
        self.viya("get_access_token")?
            .get_access_token(client_id, client_secret, auth_code)
            .await
    }

    /// Trades a refresh token for a fresh token pair. Viya only.
    pub async fn refresh_tokens(
        &self,
        client_id: &str,
        client_secret: &str,
        refresh_token: &str,
    ) -> Result<TokenResponse, SasError> {
        self.viya("refresh_tokens")?
            .refresh_tokens(client_id, client_secret, refresh_token)
            .await
    }

    /// Deletes an OAuth client registration. Viya only.
    pub async fn delete_client(
        &self,
        client_id: &str,
        access_token: &str,
    ) -> Result<String, SasError> {
        self.viya("delete_client")?
            .delete_client(client_id, access_token)
            .await
    }
}

#[derive(Debug, Default)]
struct TablePayload {
    file_parts: Vec<(String, String)>,
    chunked: Vec<(String, Vec<String>)>,
    inline: Vec<(String, String)>,
}

/// Form-field text for a parameter value: strings verbatim, everything
/// else in JSON notation.
fn param_text(value: &Value) -> String {
    match value.as_str() {
        Some(s) => s.to_string(),
        None => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn client_for(server_type: ServerType, debug: bool) -> SasClient {
        let config = SasConfig {
            server_url: "http://sas.example.com".to_string(),
            server_type,
            debug,
            ..SasConfig::default()
        };
        SasClient::new(config).unwrap()
    }

    #[test]
    fn test_program_path_joins_app_loc() {
        let client = client_for(ServerType::SasViya, true);
        assert_eq!(
            client.program_path("/common/sendArr"),
            "/Public/seedapp/common/sendArr"
        );
        assert_eq!(
            client.program_path("common/sendArr"),
            "/Public/seedapp/common/sendArr"
        );
    }

    #[test]
    fn test_program_path_without_app_loc() {
        let config = SasConfig {
            server_url: "http://sas.example.com".to_string(),
            app_loc: String::new(),
            ..SasConfig::default()
        };
        let client = SasClient::new(config).unwrap();
        assert_eq!(client.program_path("/common/sendArr"), "/common/sendArr");
    }

    #[test]
    fn test_request_params_debug_flags() {
        let client = client_for(ServerType::SasViya, true);
        let params = client.request_params();
        assert!(params.contains(&("_omittextlog".to_string(), "false".to_string())));
        assert!(params.contains(&("_omitsessionresults".to_string(), "false".to_string())));
        assert!(params.contains(&("_debug".to_string(), "131".to_string())));

        let client = client_for(ServerType::SasViya, false);
        assert!(client.request_params().is_empty());
    }

    #[test]
    fn test_request_params_include_cached_csrf() {
        let client = client_for(ServerType::SasViya, false);
        client.state.lock().unwrap().csrf = Some(CsrfToken {
            header_name: "x-csrf-token".to_string(),
            value: "tok123".to_string(),
        });
        assert_eq!(
            client.request_params(),
            vec![("_csrf".to_string(), "tok123".to_string())]
        );
    }

    #[test]
    fn test_serialize_tables_viya_inlines_small_tables() {
        let client = client_for(ServerType::SasViya, false);
        let mut tables = Tables::new();
        tables.insert("areas".to_string(), json!([{"area": "east"}]));
        let payload = client.serialize_tables(Some(&tables)).unwrap();

        assert!(payload.file_parts.is_empty());
        assert!(payload.chunked.is_empty());
        assert_eq!(payload.inline.len(), 2);
        assert_eq!(payload.inline[0].0, "sasjs1data");
        assert_eq!(payload.inline[1], ("sasjs_tables".to_string(), "areas".to_string()));
    }

    #[test]
    fn test_serialize_tables_viya_chunks_long_tables() {
        let client = client_for(ServerType::SasViya, false);
        let mut tables = Tables::new();
        tables.insert("big".to_string(), json!([{"text": "x".repeat(17_000)}]));
        let payload = client.serialize_tables(Some(&tables)).unwrap();

        assert_eq!(payload.chunked.len(), 1);
        let (key, chunks) = &payload.chunked[0];
        assert_eq!(key, "sasjs1data");
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.chars().count() <= CHUNK_SIZE));
    }

    #[test]
    fn test_serialize_tables_viya_empty_map_still_lists_names() {
        let client = client_for(ServerType::SasViya, false);
        let tables = Tables::new();
        let payload = client.serialize_tables(Some(&tables)).unwrap();
        assert_eq!(
            payload.inline,
            vec![("sasjs_tables".to_string(), String::new())]
        );
    }

    #[test]
    fn test_serialize_tables_sas9_builds_file_parts() {
        let client = client_for(ServerType::Sas9, false);
        let mut tables = Tables::new();
        tables.insert("areas".to_string(), json!([{"area": "east"}]));
        let payload = client.serialize_tables(Some(&tables)).unwrap();

        assert!(payload.inline.is_empty());
        assert_eq!(payload.file_parts.len(), 1);
        assert_eq!(payload.file_parts[0].0, "areas");
        assert!(payload.file_parts[0].1.starts_with("area:$4."));
    }

    #[test]
    fn test_serialize_tables_surfaces_oversized_values() {
        let client = client_for(ServerType::SasViya, false);
        let mut tables = Tables::new();
        tables.insert("big".to_string(), json!([{"text": "x".repeat(32_766)}]));
        let err = client.serialize_tables(Some(&tables)).unwrap_err();
        assert!(matches!(err, SasError::StringTooLong));
    }

    #[test]
    fn test_param_text_passes_strings_verbatim() {
        assert_eq!(param_text(&json!("abc")), "abc");
        assert_eq!(param_text(&json!(131)), "131");
        assert_eq!(param_text(&json!(true)), "true");
    }

    #[tokio::test]
    async fn test_request_log_ring_keeps_last_twenty() {
        let client = client_for(ServerType::Sas9, false);
        for i in 0..25 {
            client
                .append_request_log(&format!("body {}", i), "/common/sendArr")
                .await;
        }
        let entries = client.requests();
        assert_eq!(entries.len(), 20);
        assert!(entries
            .iter()
            .all(|e| e.log_file.as_deref() != Some("body 4")));
        assert!(entries
            .iter()
            .any(|e| e.log_file.as_deref() == Some("body 24")));
        // SAS 9 keeps the body even with debug off
        assert!(entries.iter().all(|e| e.log_file.is_some()));
    }

    #[test]
    fn test_update_config_rederives_urls_and_drops_csrf() {
        let mut client = client_for(ServerType::SasViya, false);
        client.state.lock().unwrap().csrf = Some(CsrfToken {
            header_name: "x-csrf-token".to_string(),
            value: "tok123".to_string(),
        });

        client.update_config(SasConfig {
            server_url: "http://other.example.com/".to_string(),
            server_type: ServerType::Sas9,
            ..SasConfig::default()
        });

        assert_eq!(client.config().server_url, "http://other.example.com");
        assert_eq!(client.login_url(), "http://other.example.com/SASLogon/login");
        assert!(client.csrf().is_none());
        assert!(client.sas9("execute_script_sas9").is_ok());
        assert!(client.viya("get_all_contexts").is_err());
    }

    #[test]
    fn test_wrong_server_type_message() {
        let client = client_for(ServerType::Sas9, false);
        let err = client.viya("get_all_contexts").err().unwrap();
        assert_eq!(
            err.to_string(),
            "get_all_contexts is only supported on SAS Viya servers."
        );
    }
}
