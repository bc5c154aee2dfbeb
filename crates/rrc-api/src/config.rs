use std::collections::HashSet;

pub const ENV_API_BASE: &str = "RRC_API_BASE";
pub const ENV_BACKEND_URL: &str = "RRC_BACKEND_URL";
pub const ENV_WS_URL: &str = "RRC_WS_URL";
pub const ENV_FEATURE_FLAGS: &str = "RRC_FEATURE_FLAGS";
pub const ENV_LOG_LEVEL: &str = "RRC_LOG_LEVEL";
pub const ENV_MODE: &str = "RRC_ENV";

pub const FLAG_USE_MOCKS: &str = "use_mocks";

/// Resolved endpoint configuration. All fields have defined defaults; resolving
/// never fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    /// Base URL for REST calls, trailing slashes stripped. Empty when unset.
    pub api_base: String,
    /// WebSocket URL. Empty means realtime is disabled.
    pub ws_url: String,
    /// Route all calls to the simulated backend.
    pub use_mocks: bool,
    pub log_level: String,
}

impl ApiConfig {
    /// Resolves from an arbitrary key lookup so tests never touch the process
    /// environment.
    pub fn resolve(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .unwrap_or_default()
        };

        let api_base = {
            let raw = read(ENV_API_BASE);
            let raw = if raw.is_empty() {
                read(ENV_BACKEND_URL)
            } else {
                raw
            };
            raw.trim_end_matches('/').to_string()
        };

        let flags = parse_feature_flags(&read(ENV_FEATURE_FLAGS));
        let mode = read(ENV_MODE).to_lowercase();
        // The explicit flag wins; otherwise anything but production simulates.
        let use_mocks = flags.contains(FLAG_USE_MOCKS) || mode != "production";

        let log_level = {
            let raw = read(ENV_LOG_LEVEL);
            if raw.is_empty() {
                "info".to_string()
            } else {
                raw
            }
        };

        Self {
            api_base,
            ws_url: read(ENV_WS_URL),
            use_mocks,
            log_level,
        }
    }

    pub fn from_env() -> Self {
        Self::resolve(|key| std::env::var(key).ok())
    }

    pub fn realtime_enabled(&self) -> bool {
        !self.ws_url.is_empty()
    }
}

fn parse_feature_flags(raw: &str) -> HashSet<String> {
    raw.split(|ch: char| ch == ',' || ch.is_whitespace())
        .map(|flag| flag.trim().to_lowercase())
        .filter(|flag| !flag.is_empty())
        .collect()
}
