//! Adapter configuration: target server, platform variant, and debug mode.

use std::{
    collections::HashMap,
    env, fmt, fs,
    io::{BufRead, BufReader},
    path::PathBuf,
};

use directories::BaseDirs;
use serde::{Deserialize, Serialize};

/// The two backend platform variants. They differ in ingestion format,
/// endpoint paths, and response decoration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerType {
    #[serde(rename = "SAS9")]
    Sas9,
    #[serde(rename = "SASVIYA")]
    SasViya,
}

impl fmt::Display for ServerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerType::Sas9 => write!(f, "SAS 9"),
            ServerType::SasViya => write!(f, "SAS Viya"),
        }
    }
}

impl ServerType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "SAS9" => Some(ServerType::Sas9),
            "SASVIYA" => Some(ServerType::SasViya),
            _ => None,
        }
    }
}

/// Connection settings for one client instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SasConfig {
    #[serde(rename = "serverUrl")]
    pub server_url: String,
    #[serde(rename = "pathSAS9")]
    pub path_sas9: String,
    #[serde(rename = "pathSASViya")]
    pub path_sasviya: String,
    #[serde(rename = "appLoc")]
    pub app_loc: String,
    #[serde(rename = "serverType")]
    pub server_type: ServerType,
    pub debug: bool,
}

impl Default for SasConfig {
    fn default() -> Self {
        Self {
            server_url: String::new(),
            path_sas9: "/SASStoredProcess/do".to_string(),
            path_sasviya: "/SASJobExecution".to_string(),
            app_loc: "/Public/seedapp".to_string(),
            server_type: ServerType::SasViya,
            debug: true,
        }
    }
}

impl SasConfig {
    /// Strips the trailing slash the server URL is commonly supplied with.
    pub fn normalize(&mut self) {
        while self.server_url.ends_with('/') {
            self.server_url.pop();
        }
    }

    /// Program-execution path for the configured platform.
    pub fn jobs_path(&self) -> &str {
        match self.server_type {
            ServerType::Sas9 => &self.path_sas9,
            ServerType::SasViya => &self.path_sasviya,
        }
    }

    pub fn login_url(&self) -> String {
        format!("{}/SASLogon/login", self.server_url)
    }

    pub fn logout_url(&self) -> String {
        let suffix = match self.server_type {
            ServerType::Sas9 => "/SASLogon/logout?",
            ServerType::SasViya => "/SASLogon/logout.do?",
        };
        format!("{}{}", self.server_url, suffix)
    }
}

/// CLI-side settings: a KEY=VALUE file under the user config dir with an
/// environment-variable overlay. The library itself never reads these;
/// callers build a [`SasConfig`] however they like.
#[derive(Debug, Clone)]
pub struct Settings {
    inner: HashMap<String, String>,
    pub config_path: PathBuf,
}

impl Settings {
    pub fn load() -> Self {
        let mut settings = Self::load_from(default_config_path());
        // Environment variables take precedence
        for (k, v) in env::vars() {
            if k.starts_with("SASLINK_") {
                settings.inner.insert(k, v);
            }
        }
        settings
    }

    /// Settings from one KEY=VALUE file, without the environment overlay.
    pub fn load_from(config_path: PathBuf) -> Self {
        let mut map = HashMap::new();

        if config_path.exists() {
            if let Ok(file) = fs::File::open(&config_path) {
                let reader = BufReader::new(file);
                for line in reader.lines().flatten() {
                    let line = line.trim();
                    if line.is_empty() || line.starts_with('#') {
                        continue;
                    }
                    if let Some((k, v)) = line.split_once('=') {
                        map.insert(k.trim().to_string(), v.trim().to_string());
                    }
                }
            }
        }

        Self { inner: map, config_path }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.get(key).cloned()
    }

    /// Folds the file/env settings over the built-in defaults.
    pub fn to_sas_config(&self) -> SasConfig {
        let mut cfg = SasConfig::default();
        if let Some(v) = self.get("SASLINK_SERVER_URL") {
            cfg.server_url = v;
        }
        if let Some(v) = self.get("SASLINK_APP_LOC") {
            cfg.app_loc = v;
        }
        if let Some(v) = self.get("SASLINK_PATH_SAS9") {
            cfg.path_sas9 = v;
        }
        if let Some(v) = self.get("SASLINK_PATH_SASVIYA") {
            cfg.path_sasviya = v;
        }
        if let Some(t) = self.get("SASLINK_SERVER_TYPE").and_then(|v| ServerType::parse(&v)) {
            cfg.server_type = t;
        }
        if let Some(v) = self.get("SASLINK_DEBUG") {
            cfg.debug = v.eq_ignore_ascii_case("true");
        }
        cfg.normalize();
        cfg
    }
}

fn default_config_path() -> PathBuf {
    let base = BaseDirs::new()
        .map(|b| b.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("~/.config"));
    base.join("saslink").join("config")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = SasConfig::default();
        assert_eq!(cfg.path_sas9, "/SASStoredProcess/do");
        assert_eq!(cfg.path_sasviya, "/SASJobExecution");
        assert_eq!(cfg.app_loc, "/Public/seedapp");
        assert_eq!(cfg.server_type, ServerType::SasViya);
        assert!(cfg.debug);
    }

    #[test]
    fn test_normalize_strips_trailing_slash() {
        let mut cfg = SasConfig {
            server_url: "https://sas.example.com/".to_string(),
            ..Default::default()
        };
        cfg.normalize();
        assert_eq!(cfg.server_url, "https://sas.example.com");
    }

    #[test]
    fn test_jobs_path_follows_server_type() {
        let mut cfg = SasConfig::default();
        assert_eq!(cfg.jobs_path(), "/SASJobExecution");
        cfg.server_type = ServerType::Sas9;
        assert_eq!(cfg.jobs_path(), "/SASStoredProcess/do");
    }

    #[test]
    fn test_logout_url_by_platform() {
        let mut cfg = SasConfig {
            server_url: "https://sas.example.com".to_string(),
            ..Default::default()
        };
        assert_eq!(cfg.logout_url(), "https://sas.example.com/SASLogon/logout.do?");
        cfg.server_type = ServerType::Sas9;
        assert_eq!(cfg.logout_url(), "https://sas.example.com/SASLogon/logout?");
    }

    #[test]
    fn test_server_type_parse() {
        assert_eq!(ServerType::parse("sas9"), Some(ServerType::Sas9));
        assert_eq!(ServerType::parse("SASVIYA"), Some(ServerType::SasViya));
        assert_eq!(ServerType::parse("other"), None);
    }

    #[test]
    fn test_settings_file_folds_into_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config");
        fs::write(
            &path,
            "# saslink settings\nSASLINK_SERVER_URL = https://sas.example.com/\nSASLINK_SERVER_TYPE=SAS9\nSASLINK_DEBUG=false\n",
        )
        .unwrap();

        let settings = Settings::load_from(path);
        assert_eq!(
            settings.get("SASLINK_SERVER_TYPE").as_deref(),
            Some("SAS9")
        );

        let cfg = settings.to_sas_config();
        assert_eq!(cfg.server_url, "https://sas.example.com");
        assert_eq!(cfg.server_type, ServerType::Sas9);
        assert!(!cfg.debug);
    }

    #[test]
    fn test_settings_missing_file_yields_defaults() {
        let settings = Settings::load_from(PathBuf::from("/nonexistent/saslink/config"));
        assert!(settings.get("SASLINK_SERVER_URL").is_none());
        let cfg = settings.to_sas_config();
        assert_eq!(cfg.server_url, "");
        assert_eq!(cfg.server_type, ServerType::SasViya);
    }
}
