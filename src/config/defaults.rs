pub(crate) fn default_api_base_url() -> String {
    "http://127.0.0.1:5000/api".to_string()
}

pub(crate) fn default_timeout_secs() -> f32 {
    5.0
}

pub(crate) fn default_remote_enabled() -> bool {
    true
}

pub(crate) fn default_offline_user_name() -> String {
    "Offline reader".to_string()
}

pub(crate) fn default_offline_user_email() -> String {
    "offline@localhost".to_string()
}

pub(crate) fn default_cache_dir() -> String {
    ".cache".to_string()
}

pub(crate) fn default_auto_complete_on_last_page() -> bool {
    true
}

pub(crate) fn default_log_level() -> crate::config::LogLevel {
    crate::config::LogLevel::Info
}
