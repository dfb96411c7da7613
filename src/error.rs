//! Error contract shared by every operation in the crate.

use thiserror::Error;

use crate::config::ServerType;

/// The single error type surfaced by the adapter. Callers always receive
/// either a parsed payload or one of these; the `Display` text is the
/// user-facing message in every case.
#[derive(Debug, Error)]
pub enum SasError {
    /// A character value exceeded the 32,765-byte ingestion limit. Raised
    /// before any network I/O; the whole table is withheld.
    #[error("The max length of a string value is 32765 characters.")]
    StringTooLong,

    /// The auth-challenge retry ceiling was hit. Carries the last raw
    /// response body, which is the only diagnostic the server offers.
    #[error("{body}")]
    RetriesExhausted { body: String },

    /// SAS 9 debug response without a webout section; the message is the
    /// log window around the first error line.
    #[error("{message}")]
    ServerLog { message: String },

    /// A body that should have been JSON was not. Carries the raw text.
    #[error("{body}")]
    MalformedResponse { body: String },

    #[error("Execution context {context_name} not found.")]
    ContextNotFound { context_name: String },

    #[error("The job {job_path} was not found at the app location {app_loc}.")]
    JobNotFound { job_path: String, app_loc: String },

    /// Precondition violation: the operation does not exist on the
    /// configured platform.
    #[error("{operation} is only supported on {required} servers.")]
    WrongServerType {
        operation: &'static str,
        required: ServerType,
    },

    /// Non-OK API response that carried no CSRF challenge.
    #[error("server returned {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// A parked request whose login never completed.
    #[error("queued request was dropped before login completed")]
    Canceled,

    /// The server answered with its login page. Surfaced only when a
    /// replayed request bounces a second time; a first-time request parks
    /// instead of failing.
    #[error("login required")]
    LoginRequired,

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}
