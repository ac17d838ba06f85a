use super::defaults;
use super::models::{AppConfig, LogLevel};
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize, serde::Serialize)]
pub(super) struct ConfigTables {
    #[serde(default)]
    remote: RemoteConfig,
    #[serde(default)]
    auth: AuthConfig,
    #[serde(default)]
    storage: StorageConfig,
    #[serde(default)]
    reader: ReaderConfig,
    #[serde(default)]
    logging: LoggingConfig,
}

impl From<ConfigTables> for AppConfig {
    fn from(tables: ConfigTables) -> Self {
        AppConfig {
            api_base_url: tables.remote.api_base_url,
            auth_token: tables.remote.auth_token,
            remote_timeout_secs: tables.remote.timeout_secs,
            remote_enabled: tables.remote.enabled,
            offline_user_name: tables.auth.offline_user_name,
            offline_user_email: tables.auth.offline_user_email,
            cache_dir: tables.storage.cache_dir,
            auto_complete_on_last_page: tables.reader.auto_complete_on_last_page,
            log_level: tables.logging.log_level,
        }
    }
}

impl From<&AppConfig> for ConfigTables {
    fn from(config: &AppConfig) -> Self {
        ConfigTables {
            remote: RemoteConfig {
                api_base_url: config.api_base_url.clone(),
                auth_token: config.auth_token.clone(),
                timeout_secs: config.remote_timeout_secs,
                enabled: config.remote_enabled,
            },
            auth: AuthConfig {
                offline_user_name: config.offline_user_name.clone(),
                offline_user_email: config.offline_user_email.clone(),
            },
            storage: StorageConfig {
                cache_dir: config.cache_dir.clone(),
            },
            reader: ReaderConfig {
                auto_complete_on_last_page: config.auto_complete_on_last_page,
            },
            logging: LoggingConfig {
                log_level: config.log_level,
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
struct RemoteConfig {
    #[serde(default = "defaults::default_api_base_url")]
    api_base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    auth_token: Option<String>,
    #[serde(default = "defaults::default_timeout_secs")]
    timeout_secs: f32,
    #[serde(default = "defaults::default_remote_enabled")]
    enabled: bool,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        RemoteConfig {
            api_base_url: defaults::default_api_base_url(),
            auth_token: None,
            timeout_secs: defaults::default_timeout_secs(),
            enabled: defaults::default_remote_enabled(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
struct AuthConfig {
    #[serde(default = "defaults::default_offline_user_name")]
    offline_user_name: String,
    #[serde(default = "defaults::default_offline_user_email")]
    offline_user_email: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        AuthConfig {
            offline_user_name: defaults::default_offline_user_name(),
            offline_user_email: defaults::default_offline_user_email(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
struct StorageConfig {
    #[serde(default = "defaults::default_cache_dir")]
    cache_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            cache_dir: defaults::default_cache_dir(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
struct ReaderConfig {
    #[serde(default = "defaults::default_auto_complete_on_last_page")]
    auto_complete_on_last_page: bool,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        ReaderConfig {
            auto_complete_on_last_page: defaults::default_auto_complete_on_last_page(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
struct LoggingConfig {
    #[serde(default = "defaults::default_log_level")]
    log_level: LogLevel,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            log_level: defaults::default_log_level(),
        }
    }
}
