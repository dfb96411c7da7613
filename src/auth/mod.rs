//! Login handshake and session management against SASLogon.

pub mod html;

use reqwest::Client;
use tracing::debug;

use crate::client::SasClient;
use crate::config::ServerType;
use crate::error::SasError;
use crate::types::SessionStatus;

/// Body patterns that mean the request should be resubmitted with a fresh
/// CSRF token. Different server generations phrase the challenge
/// differently, so the union of every known marker is matched.
pub fn needs_retry(body: &str) -> bool {
    (body.contains(r#""errorCode":403"#)
        && body.contains("_csrf")
        && body.contains("X-CSRF-TOKEN"))
        || (body.contains(r#""status":403"#) && body.contains("_csrf"))
        || (body.contains(r#""status":449"#)
            && body.contains("Authentication success, retry original request"))
        || body.contains("redirected response - retry request")
}

/// True when the body is a login page rather than a job result.
pub fn is_log_in_required(body: &str) -> bool {
    html::extract_form_action(body, "Logon").is_some()
}

/// True when the body confirms an interactive sign-in.
pub fn is_log_in_success(body: &str) -> bool {
    body.contains("You have signed in.")
}

/// True when the server interposes an OAuth authorization form.
pub fn is_authorize_form_required(body: &str) -> bool {
    html::extract_form_action(body, "SASLogon/oauth/authorize").is_some()
}

/// Submits the interposed authorization form with every field it carries,
/// granting any approval-style field, and returns the response body.
pub async fn submit_authorize_form(
    http: &Client,
    server_url: &str,
    page: &str,
) -> Result<String, SasError> {
    let action = html::extract_form_action(page, "SASLogon/oauth/authorize")
        .unwrap_or_else(|| "/SASLogon/oauth/authorize".to_string());
    let url = if action.starts_with('/') {
        format!("{}{}", server_url, action)
    } else {
        action
    };

    let mut fields = html::extract_input_fields(page);
    let mut granted = false;
    for (name, value) in fields.iter_mut() {
        if name.to_lowercase().contains("approval") {
            *value = "true".to_string();
            granted = true;
        }
    }
    if !granted {
        fields.push(("approval".to_string(), "true".to_string()));
    }

    let resp = http.post(&url).form(&fields).send().await?;
    Ok(resp.text().await?)
}

impl SasClient {
    /// Probes the login page and reports whether a session is active.
    pub async fn check_session(&self) -> Result<SessionStatus, SasError> {
        let login_url = self.login_url().replace(".do", "");
        let body = self.http.get(&login_url).send().await?.text().await?;
        Ok(SessionStatus {
            is_logged_in: is_log_in_success(&body),
            user_name: self.user_name(),
        })
    }

    /// Runs the SASLogon form login. Requests parked while the client was
    /// signed out are replayed once the handshake succeeds.
    pub async fn log_in(
        &self,
        username: &str,
        password: &str,
    ) -> Result<SessionStatus, SasError> {
        self.set_user_name(username);

        let current = self.check_session().await?;
        if current.is_logged_in {
            self.resend_waiting_requests().await;
            return Ok(current);
        }

        let mut form = vec![
            ("_service".to_string(), "default".to_string()),
            ("username".to_string(), username.to_string()),
            ("password".to_string(), password.to_string()),
        ];
        form.extend(self.fetch_login_form().await?);

        let login_url = self.login_url();
        debug!(url = %login_url, "submitting login form");
        let body = self
            .http
            .post(&login_url)
            .form(&form)
            .send()
            .await?
            .text()
            .await?;

        let mut logged_in = if is_authorize_form_required(&body) {
            submit_authorize_form(&self.http, &self.config.server_url, &body).await?;
            false
        } else {
            is_log_in_success(&body)
        };

        if !logged_in {
            logged_in = self.check_session().await?.is_logged_in;
        }
        if logged_in {
            self.resend_waiting_requests().await;
        }

        Ok(SessionStatus {
            is_logged_in: logged_in,
            user_name: self.user_name(),
        })
    }

    /// Ends the server session. Only the fact that the request went through
    /// matters, the response body is discarded.
    pub async fn log_out(&self) -> Result<(), SasError> {
        self.http.get(&self.config.logout_url()).send().await?;
        Ok(())
    }

    /// Fetches the login page, learns the real form action URL and returns
    /// the hidden fields the form carries.
    async fn fetch_login_form(&self) -> Result<Vec<(String, String)>, SasError> {
        let login_url = self.login_url();
        let body = self.http.get(&login_url).send().await?.text().await?;
        if let Some(action) = html::extract_form_action(&body, "Logon") {
            self.set_login_url(&action);
            Ok(html::extract_hidden_fields(&body))
        } else {
            Ok(Vec::new())
        }
    }

    /// Rewrites the cached login URL from the action a login form reported.
    /// Query strings are dropped and SAS 9 actions lose their `.do` suffix.
    fn set_login_url(&self, action: &str) {
        let parsed = action.split('?').next().unwrap_or(action);
        if let Some(stripped) = parsed.strip_prefix('/') {
            let mut url = if self.config.server_url.is_empty() {
                stripped.to_string()
            } else {
                format!("{}/{}", self.config.server_url, stripped)
            };
            if self.config.server_type == ServerType::Sas9 {
                url = url.replace(".do", "");
            }
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.login_url = url;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_needs_retry_matches_every_marker_generation() {
        assert!(needs_retry(
            r#"{"errorCode":403,"message":"invalid _csrf token","header":"X-CSRF-TOKEN"}"#
        ));
        assert!(needs_retry(r#"{"status":403,"error":"bad _csrf token"}"#));
        assert!(needs_retry(
            r#"{"status":449,"detail":"Authentication success, retry original request"}"#
        ));
        assert!(needs_retry("redirected response - retry request"));
    }

    #[test]
    fn test_needs_retry_ignores_ordinary_failures() {
        assert!(!needs_retry("ERROR: The job could not be found."));
        assert!(!needs_retry(r#"{"status":403}"#));
        assert!(!needs_retry(r#"{"errorCode":403,"message":"_csrf"}"#));
    }

    #[test]
    fn test_is_log_in_required_detects_login_form() {
        let page = r#"<form id="fm1" action="/SASLogon/login.do" method="post">"#;
        assert!(is_log_in_required(page));
        assert!(!is_log_in_required(r#"{"SYSUSERID":"sasdemo"}"#));
    }

    #[test]
    fn test_is_log_in_success() {
        assert!(is_log_in_success("<p>You have signed in.</p>"));
        assert!(!is_log_in_success("<p>Please sign in.</p>"));
    }

    #[test]
    fn test_is_authorize_form_required() {
        let page = r#"<form action="/SASLogon/oauth/authorize" method="post">"#;
        assert!(is_authorize_form_required(page));
        assert!(!is_authorize_form_required(
            r#"<form action="/SASLogon/login" method="post">"#
        ));
    }
}
