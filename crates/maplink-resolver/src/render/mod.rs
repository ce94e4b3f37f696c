//! Stage 4: headless-browser rendering, the last resort.
//!
//! The [`PageRenderer`] trait is the seam between the pipeline and the
//! browser. [`ChromiumRenderer`] is the production implementation;
//! [`DisabledRenderer`] is used on hosts without a browser.

mod budget;
mod chromium;
mod network;

use std::time::Duration;

use async_trait::async_trait;
use maplink_core::{Coordinates, RegionFilter};

use crate::pipeline::StageOutcome;
use crate::rules::{first_match, CoordinateRule, PRECISE_BRACKET_RE};

pub use chromium::ChromiumRenderer;

/// Timeout for navigation and individual browser operations.
pub const OPERATION_TIMEOUT: Duration = Duration::from_secs(15);

/// Hard ceiling for the whole render stage. When it elapses the stage
/// reports `NotFound` regardless of in-flight work.
pub const STAGE_BUDGET: Duration = Duration::from_secs(20);

/// Extra wait after network idle for late client-side rendering.
pub const RENDER_GRACE: Duration = Duration::from_secs(3);

/// Hosts (or host + path prefixes) whose responses carry map payloads.
const MAP_API_MARKERS: [&str; 5] = [
    "maps.googleapis.com",
    "maps.google.com",
    "google.com/maps",
    "google.com/search",
    "googleusercontent.com/maps",
];

static RENDERED_RULES: [CoordinateRule; 1] =
    [CoordinateRule::pattern("precise_bracket", &PRECISE_BRACKET_RE).region_checked()];

/// Render a page in a browser and inspect it for coordinates.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    /// Render `url` and look for coordinates. `resolved_url` is the decoded
    /// form reported back when the browser does not land elsewhere.
    ///
    /// Implementations must release every resource they acquire before
    /// returning and must never escalate failures beyond
    /// [`StageOutcome::StageError`].
    async fn render(&self, url: &str, resolved_url: &str) -> StageOutcome;
}

/// Renderer for hosts without a headless browser: always `NotFound`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledRenderer;

#[async_trait]
impl PageRenderer for DisabledRenderer {
    async fn render(&self, url: &str, _resolved_url: &str) -> StageOutcome {
        tracing::debug!(url, "render stage disabled");
        StageOutcome::NotFound
    }
}

/// Scan rendered text (a response body, script source, or page content) for
/// the first plausible high-precision bracketed pair.
pub(crate) fn scan_rendered_text(text: &str, region: RegionFilter) -> Option<Coordinates> {
    first_match(&RENDERED_RULES, text, region).map(|m| m.coords)
}

/// `true` for responses from map-provider API hosts.
pub(crate) fn is_map_api_url(url: &str) -> bool {
    let lowered = url.to_ascii_lowercase();
    MAP_API_MARKERS.iter().any(|marker| lowered.contains(marker))
}
