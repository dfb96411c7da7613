//! Decoding of program responses and extraction of code sections from logs.

use serde_json::Value;

use crate::config::ServerType;
use crate::error::SasError;

pub(crate) const WEBOUT_BEGIN: &str = ">>weboutBEGIN<<";
pub(crate) const WEBOUT_END: &str = ">>weboutEND<<";
pub(crate) const IFRAME_PREFIX: &str = "<iframe style=\"width: 99%; height: 500px\" src=\"";
pub(crate) const IFRAME_SUFFIX: &str = "\"></iframe>";

/// Response decode strategy, selected once per request from the platform
/// variant and debug flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ResponseFormat {
    /// SAS 9 debug: payload delimited inline by webout markers.
    Sas9Debug,
    /// Viya debug: payload behind an iframe indirection link.
    ViyaDebug,
    /// Either platform without debug: the body is the payload.
    Direct,
}

impl ResponseFormat {
    pub(crate) fn select(server_type: ServerType, debug: bool) -> Self {
        match (server_type, debug) {
            (ServerType::Sas9, true) => ResponseFormat::Sas9Debug,
            (ServerType::SasViya, true) => ResponseFormat::ViyaDebug,
            _ => ResponseFormat::Direct,
        }
    }
}

/// Payload segment of a SAS 9 debug response: everything between the first
/// begin marker and the following end marker (or the rest of the body when
/// the end marker is missing, which then fails JSON parsing downstream).
pub(crate) fn extract_webout(body: &str) -> Option<&str> {
    let after = body.split(WEBOUT_BEGIN).nth(1)?;
    after.split(WEBOUT_END).next()
}

pub(crate) fn decode_sas9_debug(body: &str) -> Result<Value, SasError> {
    extract_webout(body)
        .and_then(|segment| serde_json::from_str(segment).ok())
        .ok_or_else(|| SasError::ServerLog {
            message: parse_error_window(body),
        })
}

/// Debug-bundle URL embedded in a Viya debug response.
pub(crate) fn extract_iframe_src(body: &str) -> Option<&str> {
    let after = body.split(IFRAME_PREFIX).nth(1)?;
    after.split(IFRAME_SUFFIX).next()
}

/// Log window around the first line containing "error" (the benign
/// "completed with errors" phrase does not count), ten lines either side,
/// clamped to the log, joined with commas.
pub(crate) fn parse_error_window(body: &str) -> String {
    let lines: Vec<&str> = body.split('\n').collect();
    let index = lines
        .iter()
        .position(|line| {
            let lower = line.to_lowercase();
            lower.contains("error") && !lower.contains("this request completed with errors")
        })
        .unwrap_or(0);

    let start = index.saturating_sub(10);
    let end = (index + 10).min(lines.len() - 1);
    lines[start..=end].join(", ")
}

/// Lines the server echoes as numbered source: first ten characters of the
/// trimmed line, leading whitespace dropped, begin with a digit.
pub fn parse_source_code(log: &str) -> String {
    log.split('\n')
        .filter(|line| {
            let first10: String = line.trim().chars().take(10).collect();
            first10.trim_start().starts_with(|c: char| c.is_ascii_digit())
        })
        .collect::<Vec<_>>()
        .join("\r\n")
}

/// Macro-expanded code lines, marked `MPRINT` on SAS 9 and `normal:` on
/// Viya.
pub fn parse_generated_code(log: &str, server_type: ServerType) -> String {
    let marker = match server_type {
        ServerType::Sas9 => "MPRINT",
        ServerType::SasViya => "normal:",
    };
    log.split('\n')
        .filter(|line| line.trim().starts_with(marker))
        .collect::<Vec<_>>()
        .join("\r\n")
}
