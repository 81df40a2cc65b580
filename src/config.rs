use std::path::Path;

use config::{Config, Environment};
use serde::{Deserialize, Serialize};

use tracing::debug;

use crate::error::{AuditError, AuditResult};

fn default_database_url() -> String {
    "sqlite://secure_audit.db?mode=rwc".to_string()
}

fn default_app_key() -> String {
    "default_secure_key".to_string()
}

fn default_key_backup_dir() -> String {
    ".".to_string()
}

fn default_sendmail_path() -> String {
    "/usr/sbin/sendmail".to_string()
}

fn default_telegram_api_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_notify_timeout_secs() -> u64 {
    10
}

fn default_rabbitmq_api_url() -> String {
    "http://localhost:15672".to_string()
}

fn default_rabbitmq_credential() -> String {
    "guest".to_string()
}

fn default_rabbitmq_vhost() -> String {
    "/".to_string()
}

fn default_audit_queue() -> String {
    "audit_events".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_database_url", alias = "DATABASE_URL")]
    pub database_url: String,
    #[serde(default = "default_app_key", skip_serializing, alias = "APP_KEY")]
    pub app_key: String,
    #[serde(default = "default_key_backup_dir", alias = "KEY_BACKUP_DIR")]
    pub key_backup_dir: String,

    #[serde(default, alias = "ALERT_EMAIL")]
    pub alert_email: Option<String>,
    #[serde(default = "default_sendmail_path", alias = "SENDMAIL_PATH")]
    pub sendmail_path: String,
    #[serde(default, skip_serializing, alias = "TELEGRAM_TOKEN")]
    pub telegram_token: Option<String>,
    #[serde(default, alias = "TELEGRAM_CHAT_ID")]
    pub telegram_chat_id: Option<String>,
    #[serde(default = "default_telegram_api_url", alias = "TELEGRAM_API_URL")]
    pub telegram_api_url: String,
    #[serde(default = "default_notify_timeout_secs", alias = "NOTIFY_TIMEOUT_SECS")]
    pub notify_timeout_secs: u64,

    #[serde(default = "default_rabbitmq_api_url", alias = "RABBITMQ_API_URL")]
    pub rabbitmq_api_url: String,
    #[serde(default = "default_rabbitmq_credential", alias = "RABBITMQ_USER")]
    pub rabbitmq_user: String,
    #[serde(default = "default_rabbitmq_credential", skip_serializing, alias = "RABBITMQ_PASS")]
    pub rabbitmq_pass: String,
    #[serde(default = "default_rabbitmq_vhost", alias = "RABBITMQ_VHOST")]
    pub rabbitmq_vhost: String,
    #[serde(default = "default_audit_queue", alias = "AUDIT_QUEUE")]
    pub audit_queue: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            app_key: default_app_key(),
            key_backup_dir: default_key_backup_dir(),
            alert_email: None,
            sendmail_path: default_sendmail_path(),
            telegram_token: None,
            telegram_chat_id: None,
            telegram_api_url: default_telegram_api_url(),
            notify_timeout_secs: default_notify_timeout_secs(),
            rabbitmq_api_url: default_rabbitmq_api_url(),
            rabbitmq_user: default_rabbitmq_credential(),
            rabbitmq_pass: default_rabbitmq_credential(),
            rabbitmq_vhost: default_rabbitmq_vhost(),
            audit_queue: default_audit_queue(),
        }
    }
}

impl AppConfig {
    /// Load from `./.env` (if present) overlaid with the process environment
    pub fn load() -> AuditResult<Self> {
        Self::load_from(Path::new(".env"))
    }

    /// Variables already set in the process environment win over the
    /// env file. A missing env file is not an error.
    pub fn load_from(env_file: &Path) -> AuditResult<Self> {
        match dotenvy::from_path(env_file) {
            Ok(()) => debug!("Loaded {}", env_file.display()),
            Err(e) if e.not_found() => {}
            Err(e) => {
                return Err(AuditError::Config(format!(
                    "Failed to read {}: {}",
                    env_file.display(),
                    e
                )))
            }
        }

        let settings = Config::builder()
            .add_source(Environment::default())
            .build()?;

        let config: AppConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config.normalized())
    }

    fn validate(&self) -> AuditResult<()> {
        if self.app_key.is_empty() {
            return Err(AuditError::Config("APP_KEY must not be empty".to_string()));
        }
        Ok(())
    }

    /// Treat blank optional values from the env file as unset
    pub fn normalized(mut self) -> Self {
        for value in [
            &mut self.alert_email,
            &mut self.telegram_token,
            &mut self.telegram_chat_id,
        ] {
            if value.as_deref().map(str::trim) == Some("") {
                *value = None;
            }
        }
        self
    }
}
