pub mod client;
pub mod config;
pub mod http;
pub mod mock;
pub mod realtime;

pub use client::{ApiFacade, RunnerApi, StartRunRequest};
pub use config::ApiConfig;
pub use http::HttpClient;
pub use mock::{LatencyRange, MockBackend, MockOptions};
pub use realtime::{ChannelStatus, Poller, RealtimeChannel, RealtimeEvent, Subscription};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("missing api base url; set RRC_API_BASE or RRC_BACKEND_URL, or enable mocks with RRC_FEATURE_FLAGS=use_mocks")]
    Config,
    #[error("api request failed ({status}): {body}")]
    Http { status: u16, body: String },
    #[error("response decode error: {0}")]
    Decode(String),
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("validation error: {0}")]
    Validation(String),
}

/// Keeps error payloads readable when a backend returns a page of HTML.
pub(crate) fn truncate_for_error(text: &str) -> String {
    const MAX: usize = 300;
    let trimmed = text.trim();
    if trimmed.len() <= MAX {
        return trimmed.to_string();
    }
    let mut cut = MAX;
    while !trimmed.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…", &trimmed[..cut])
}
