//! Runtime configuration
//!
//! Values are resolved with the precedence environment > local connection
//! file > built-in defaults. The connection file lives in the data
//! directory (`database/connection.json` by default) and is the only part the
//! manager can edit at runtime.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs::{self, create_dir_all};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";
pub const DEFAULT_DATA_DIR: &str = "database";
pub const CONNECTION_FILE: &str = "connection.json";
pub const DEFAULT_SNAPSHOT_DELAY_MS: u64 = 1500;
pub const DEFAULT_HISTORY_LIMIT: usize = 100;
pub const DEFAULT_LABEL_MODEL: &str = crate::labels::DEFAULT_MODEL;

/// Remote store and audit webhook endpoints
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionSettings {
    pub supabase_url: String,
    pub supabase_key: String,
    pub webhook_url: String,
}

impl ConnectionSettings {
    /// Both the URL and the key are needed to talk to the store
    pub fn has_remote_store(&self) -> bool {
        !self.supabase_url.trim().is_empty() && !self.supabase_key.trim().is_empty()
    }

    pub fn has_webhook(&self) -> bool {
        !self.webhook_url.trim().is_empty()
    }

    /// Reject URLs that are obviously not HTTP endpoints
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (key, value) in [
            ("supabaseUrl", &self.supabase_url),
            ("webhookUrl", &self.webhook_url),
        ] {
            let value = value.trim();
            if !value.is_empty() && !value.starts_with("http://") && !value.starts_with("https://") {
                return Err(ConfigError::Invalid {
                    key: key.to_string(),
                    reason: format!("'{}' is not an http(s) URL", value),
                });
            }
        }
        Ok(())
    }
}

/// How low-stock alerts are delivered
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum EmailSettings {
    #[default]
    Disabled,
    /// Hosted transactional email API
    Api {
        #[serde(default)]
        endpoint: Option<String>,
        service_id: String,
        template_id: String,
        public_key: String,
    },
    Smtp {
        host: String,
        port: u16,
        username: String,
        password: String,
        from: String,
    },
}

/// Contents of the connection file; every field is optional
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FileConfig {
    pub bind_addr: Option<String>,
    #[serde(flatten)]
    pub connection: ConnectionSettings,
    pub email: Option<EmailSettings>,
    pub label_api_key: Option<String>,
    pub label_model: Option<String>,
    pub snapshot_delay_ms: Option<u64>,
    pub history_limit: Option<usize>,
}

/// Fully resolved configuration
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub bind_addr: String,
    pub data_dir: PathBuf,
    pub connection: ConnectionSettings,
    pub email: EmailSettings,
    pub label_api_key: Option<String>,
    pub label_model: String,
    /// Delay between a ledger audit event and the inventory snapshot push
    pub snapshot_delay: Duration,
    /// Transactions fetched on resync
    pub history_limit: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            connection: ConnectionSettings::default(),
            email: EmailSettings::Disabled,
            label_api_key: None,
            label_model: DEFAULT_LABEL_MODEL.to_string(),
            snapshot_delay: Duration::from_millis(DEFAULT_SNAPSHOT_DELAY_MS),
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

impl AppConfig {
    /// Load from the process environment and the connection file
    pub fn load() -> Result<Self, ConfigError> {
        Self::resolve(|key| std::env::var(key).ok())
    }

    /// Load using `env` as the environment lookup
    pub fn resolve<F>(env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());
        let data_dir = env("REAGENTFLOW_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));
        let file = read_file_config(&data_dir)?;
        Self::from_sources(data_dir, file, env)
    }

    /// Merge an already-read file with the environment
    pub fn from_sources<F>(data_dir: PathBuf, file: FileConfig, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = AppConfig::default();

        let connection = ConnectionSettings {
            supabase_url: env("REAGENTFLOW_SUPABASE_URL")
                .or_else(|| env("SUPABASE_URL"))
                .unwrap_or(file.connection.supabase_url),
            supabase_key: env("REAGENTFLOW_SUPABASE_KEY")
                .or_else(|| env("SUPABASE_KEY"))
                .unwrap_or(file.connection.supabase_key),
            webhook_url: env("REAGENTFLOW_WEBHOOK_URL").unwrap_or(file.connection.webhook_url),
        };
        connection.validate()?;

        let email = match email_from_env(&env)? {
            Some(email) => email,
            None => file.email.unwrap_or_default(),
        };

        let snapshot_delay_ms = match env("REAGENTFLOW_SNAPSHOT_DELAY_MS") {
            Some(v) => parse_number("REAGENTFLOW_SNAPSHOT_DELAY_MS", &v)?,
            None => file.snapshot_delay_ms.unwrap_or(DEFAULT_SNAPSHOT_DELAY_MS),
        };
        let history_limit = match env("REAGENTFLOW_HISTORY_LIMIT") {
            Some(v) => parse_number("REAGENTFLOW_HISTORY_LIMIT", &v)?,
            None => file.history_limit.unwrap_or(DEFAULT_HISTORY_LIMIT),
        };

        Ok(AppConfig {
            bind_addr: env("REAGENTFLOW_BIND")
                .or(file.bind_addr)
                .unwrap_or(defaults.bind_addr),
            data_dir,
            connection,
            email,
            label_api_key: env("REAGENTFLOW_GEMINI_API_KEY")
                .or_else(|| env("API_KEY"))
                .or(file.label_api_key),
            label_model: env("REAGENTFLOW_GEMINI_MODEL")
                .or(file.label_model)
                .unwrap_or(defaults.label_model),
            snapshot_delay: Duration::from_millis(snapshot_delay_ms),
            history_limit,
        })
    }

    pub fn connection_file(&self) -> PathBuf {
        self.data_dir.join(CONNECTION_FILE)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        key: key.to_string(),
        reason: format!("'{}' is not a valid number", value),
    })
}

fn email_from_env<F>(env: &F) -> Result<Option<EmailSettings>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(host) = env("REAGENTFLOW_SMTP_HOST") {
        let port = match env("REAGENTFLOW_SMTP_PORT") {
            Some(p) => parse_number("REAGENTFLOW_SMTP_PORT", &p)?,
            None => 465,
        };
        let username = env("REAGENTFLOW_SMTP_USER").unwrap_or_default();
        return Ok(Some(EmailSettings::Smtp {
            host,
            port,
            from: env("REAGENTFLOW_SMTP_FROM").unwrap_or_else(|| username.clone()),
            username,
            password: env("REAGENTFLOW_SMTP_PASSWORD").unwrap_or_default(),
        }));
    }

    match (
        env("REAGENTFLOW_EMAILJS_SERVICE_ID"),
        env("REAGENTFLOW_EMAILJS_TEMPLATE_ID"),
        env("REAGENTFLOW_EMAILJS_PUBLIC_KEY"),
    ) {
        (Some(service_id), Some(template_id), Some(public_key)) => Ok(Some(EmailSettings::Api {
            endpoint: env("REAGENTFLOW_EMAILJS_ENDPOINT"),
            service_id,
            template_id,
            public_key,
        })),
        _ => Ok(None),
    }
}

/// Read the connection file; a missing file yields the defaults
pub fn read_file_config(data_dir: &Path) -> Result<FileConfig, ConfigError> {
    let path = data_dir.join(CONNECTION_FILE);
    if !path.exists() {
        return Ok(FileConfig::default());
    }
    let content = fs::read_to_string(&path)?;
    if content.trim().is_empty() {
        return Ok(FileConfig::default());
    }
    Ok(serde_json::from_str(&content)?)
}

/// Persist the connection settings, keeping every other key in the file
pub fn save_connection_settings(
    data_dir: &Path,
    settings: &ConnectionSettings,
) -> Result<(), ConfigError> {
    settings.validate()?;
    if !data_dir.exists() {
        create_dir_all(data_dir)?;
    }
    let mut file = read_file_config(data_dir)?;
    file.connection = ConnectionSettings {
        supabase_url: settings.supabase_url.trim().to_string(),
        supabase_key: settings.supabase_key.trim().to_string(),
        webhook_url: settings.webhook_url.trim().to_string(),
    };
    let json = serde_json::to_string_pretty(&file)?;
    fs::write(data_dir.join(CONNECTION_FILE), json)?;
    log::info!("connection settings saved to {}", data_dir.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_without_sources() {
        let config =
            AppConfig::from_sources(PathBuf::from("db"), FileConfig::default(), env_of(&[])).unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:3000");
        assert_eq!(config.snapshot_delay, Duration::from_millis(1500));
        assert_eq!(config.history_limit, 100);
        assert_eq!(config.email, EmailSettings::Disabled);
        assert!(!config.connection.has_remote_store());
    }

    #[test]
    fn environment_beats_file() {
        let file = FileConfig {
            connection: ConnectionSettings {
                supabase_url: "https://file.supabase.co".into(),
                supabase_key: "file-key".into(),
                webhook_url: "https://script.example/exec".into(),
            },
            ..Default::default()
        };
        let env = env_of(&[("SUPABASE_URL", "https://env.supabase.co")]);
        let config = AppConfig::from_sources(PathBuf::from("db"), file, env).unwrap();
        assert_eq!(config.connection.supabase_url, "https://env.supabase.co");
        assert_eq!(config.connection.supabase_key, "file-key");
        assert!(config.connection.has_webhook());
    }

    #[test]
    fn email_api_from_environment() {
        let env = env_of(&[
            ("REAGENTFLOW_EMAILJS_SERVICE_ID", "svc"),
            ("REAGENTFLOW_EMAILJS_TEMPLATE_ID", "tpl"),
            ("REAGENTFLOW_EMAILJS_PUBLIC_KEY", "pk"),
        ]);
        let config = AppConfig::from_sources(PathBuf::from("db"), FileConfig::default(), env).unwrap();
        assert!(matches!(config.email, EmailSettings::Api { ref service_id, .. } if service_id == "svc"));
    }

    #[test]
    fn bad_numbers_are_rejected() {
        let env = env_of(&[("REAGENTFLOW_HISTORY_LIMIT", "many")]);
        let err = AppConfig::from_sources(PathBuf::from("db"), FileConfig::default(), env).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn file_shape_is_camel_case() {
        let file: FileConfig = serde_json::from_str(
            r#"{"supabaseUrl":"https://x.supabase.co","supabaseKey":"k",
                "email":{"provider":"smtp","host":"smtp.lab","port":587,
                         "username":"u","password":"p","from":"alertas@lab.com"}}"#,
        )
        .unwrap();
        assert_eq!(file.connection.supabase_key, "k");
        assert!(matches!(file.email, Some(EmailSettings::Smtp { port: 587, .. })));
    }
}
