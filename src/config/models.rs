use serde::Deserialize;

/// Flattened runtime configuration; built from the TOML tables in `tables.rs`.
#[derive(Debug, Clone, Deserialize, serde::Serialize, PartialEq)]
pub struct AppConfig {
    #[serde(default = "crate::config::defaults::default_api_base_url")]
    pub api_base_url: String,
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default = "crate::config::defaults::default_timeout_secs")]
    pub remote_timeout_secs: f32,
    #[serde(default = "crate::config::defaults::default_remote_enabled")]
    pub remote_enabled: bool,
    #[serde(default = "crate::config::defaults::default_offline_user_name")]
    pub offline_user_name: String,
    #[serde(default = "crate::config::defaults::default_offline_user_email")]
    pub offline_user_email: String,
    #[serde(default = "crate::config::defaults::default_cache_dir")]
    pub cache_dir: String,
    #[serde(default = "crate::config::defaults::default_auto_complete_on_last_page")]
    pub auto_complete_on_last_page: bool,
    #[serde(default = "crate::config::defaults::default_log_level")]
    pub log_level: LogLevel,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            api_base_url: crate::config::defaults::default_api_base_url(),
            auth_token: None,
            remote_timeout_secs: crate::config::defaults::default_timeout_secs(),
            remote_enabled: crate::config::defaults::default_remote_enabled(),
            offline_user_name: crate::config::defaults::default_offline_user_name(),
            offline_user_email: crate::config::defaults::default_offline_user_email(),
            cache_dir: crate::config::defaults::default_cache_dir(),
            auto_complete_on_last_page:
                crate::config::defaults::default_auto_complete_on_last_page(),
            log_level: crate::config::defaults::default_log_level(),
        }
    }
}

impl AppConfig {
    /// Request timeout applied to every remote call.
    pub fn remote_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f32(self.remote_timeout_secs)
    }

    pub(crate) fn clamped(mut self) -> Self {
        if !self.remote_timeout_secs.is_finite() {
            self.remote_timeout_secs = crate::config::defaults::default_timeout_secs();
        }
        self.remote_timeout_secs = self
            .remote_timeout_secs
            .clamp(MIN_TIMEOUT_SECS, MAX_TIMEOUT_SECS);
        self.auth_token = self
            .auth_token
            .take()
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty());
        self
    }
}

pub const MIN_TIMEOUT_SECS: f32 = 0.5;
pub const MAX_TIMEOUT_SECS: f32 = 60.0;

/// Supported logging verbosity levels.
#[derive(Debug, Clone, Copy, Deserialize, serde::Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Info
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_filter_str())
    }
}

impl LogLevel {
    pub fn as_filter_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}
