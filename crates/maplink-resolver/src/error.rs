use thiserror::Error;

/// Failures that abort a resolution request.
///
/// Only the redirect stage produces these; later stages degrade to
/// `StageOutcome::StageError` instead.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("invalid URL \"{url}\": {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("too many redirects resolving {url} (limit {limit})")]
    TooManyRedirects { url: String, limit: usize },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Failures inside the headless-browser stage. Never escape the stage.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("invalid browser configuration: {0}")]
    Config(String),

    #[error("failed to launch browser: {0}")]
    Launch(#[source] chromiumoxide::error::CdpError),

    #[error("browser runtime error: {0}")]
    Runtime(#[from] chromiumoxide::error::CdpError),
}
