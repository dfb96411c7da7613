//! Wire and domain types shared across the adapter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tables keyed by name, each value an array of row objects. Insertion
/// order is preserved, so derived parameter numbering is stable.
pub type Tables = serde_json::Map<String, Value>;

/// CSRF header-name/value pair harvested from a 403 challenge. The header
/// name itself is server-chosen and arrives in `X-CSRF-HEADER`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsrfToken {
    #[serde(rename = "headerName")]
    pub header_name: String,
    pub value: String,
}

/// Result of a session probe or a login attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub is_logged_in: bool,
    pub user_name: String,
}

/// A server-supplied hypermedia link on compute resources.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Link {
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub rel: String,
    #[serde(default)]
    pub href: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

/// Execution context in reduced shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Context {
    #[serde(default)]
    pub created_by: String,
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub version: i64,
    #[serde(default)]
    pub attributes: ContextAttributes,
}

/// Capability metadata attached to contexts that passed the probe run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sys_user_id: Option<String>,
}

/// A live server-side handle bound to one execution context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    #[serde(default)]
    pub links: Vec<Link>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// One code submission and its lifecycle links.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub links: Vec<Link>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl Job {
    /// First link with the given `rel`, if the server supplied one.
    pub fn link(&self, rel: &str) -> Option<&Link> {
        self.links.iter().find(|l| l.rel == rel)
    }
}

/// A folder member as listed by the folders service. Job definitions and
/// nested folders both arrive in this shape, told apart by `content_type`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FolderMember {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "contentType", default)]
    pub content_type: String,
    #[serde(default)]
    pub links: Vec<Link>,
}

impl FolderMember {
    /// First link with the given `rel`, if the server supplied one.
    pub fn link(&self, rel: &str) -> Option<&Link> {
        self.links.iter().find(|l| l.rel == rel)
    }
}

/// Terminal outcome of a code execution: final state plus the fetched log
/// resource (JSON with an `items` array), when the job exposed one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptResult {
    pub job_status: String,
    pub log: Value,
}

/// OAuth token grant response. Fields the platform is not obliged to send
/// stay optional; anything unrecognized is kept in `extra`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// One entry in the capped request log ring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestLogEntry {
    /// Raw response body, absent on Viya when debug is off.
    #[serde(rename = "logFile")]
    pub log_file: Option<String>,
    /// Full program path the request targeted.
    #[serde(rename = "serviceLink")]
    pub service_link: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "sourceCode")]
    pub source_code: String,
    #[serde(rename = "generatedCode")]
    pub generated_code: String,
    /// Work-library metadata, best-effort and debug-only.
    #[serde(rename = "SASWORK")]
    pub sas_work: Option<Value>,
}
