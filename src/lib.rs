//! saslink is a client adapter for SAS analytics platforms. It submits
//! stored programs and ad-hoc code to SAS 9 and SAS Viya servers, ships
//! tabular input in each platform's ingestion format, and decodes the
//! responses back into structured JSON.
//!
//! [`SasClient`] is the entry point: configure it with a [`SasConfig`]
//! and call [`SasClient::request`]. The Viya compute and job-execution
//! APIs and the SAS 9 command API are reachable through the same client.

pub mod auth;
pub mod client;
pub mod compute;
pub mod config;
pub mod csv;
pub mod error;
pub mod parser;
pub mod types;

pub use client::SasClient;
pub use compute::sas9::Sas9Client;
pub use compute::ComputeClient;
pub use config::{SasConfig, ServerType, Settings};
pub use error::SasError;
