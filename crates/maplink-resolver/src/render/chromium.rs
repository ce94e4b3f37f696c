//! Chromium renderer built on `chromiumoxide`.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::Page;
use futures::StreamExt;
use maplink_core::{Coordinates, RegionFilter, ResolvedLocation};
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::budget::{run_session, SessionRun};
use super::network::{intercept_map_responses, FirstMatch, InflightTracker};
use super::{scan_rendered_text, PageRenderer, OPERATION_TIMEOUT, RENDER_GRACE, STAGE_BUDGET};
use crate::error::RenderError;
use crate::pattern::extract_from_url;
use crate::pipeline::StageOutcome;
use crate::redirect::decode_terminal_url;

/// Client-side state object map pages bootstrap from.
const INIT_STATE_SCRIPT: &str = "(() => { try { return JSON.stringify(window.APP_INITIALIZATION_STATE ?? null) ?? ''; } catch (e) { return ''; } })()";

const INLINE_SCRIPTS_SCRIPT: &str =
    "Array.from(document.querySelectorAll('script'), s => s.textContent || '')";

/// Launches one isolated headless Chromium per render. Browsers are not
/// pooled or shared between requests.
#[derive(Debug, Clone)]
pub struct ChromiumRenderer {
    browser_path: Option<PathBuf>,
    region: RegionFilter,
}

impl ChromiumRenderer {
    #[must_use]
    pub fn new(browser_path: Option<PathBuf>, region: RegionFilter) -> Self {
        Self {
            browser_path,
            region,
        }
    }
}

#[async_trait]
impl PageRenderer for ChromiumRenderer {
    async fn render(&self, url: &str, resolved_url: &str) -> StageOutcome {
        let slot: FirstMatch = Arc::new(OnceCell::new());
        let region = self.region;
        let listener_slot = Arc::clone(&slot);
        let target = url.to_owned();
        let reported = resolved_url.to_owned();

        let run = run_session(
            STAGE_BUDGET,
            &slot,
            BrowserSession::launch(self.browser_path.clone()),
            move |session| {
                Box::pin(async move {
                    extract_in_session(session, &target, &reported, region, listener_slot).await
                })
            },
            BrowserSession::close,
        )
        .await;

        match run {
            SessionRun::Completed(Some(location)) => StageOutcome::Found(location),
            SessionRun::Completed(None) => StageOutcome::NotFound,
            SessionRun::Intercepted(coords) => {
                tracing::debug!(url, "keeping intercepted coordinates after incomplete inspection");
                StageOutcome::Found(ResolvedLocation::new(resolved_url, coords))
            }
            SessionRun::TimedOut => {
                tracing::info!(url, budget_secs = STAGE_BUDGET.as_secs(), "render stage budget exhausted");
                StageOutcome::NotFound
            }
            SessionRun::Failed(e) => StageOutcome::StageError(e.to_string()),
        }
    }
}

/// An owned browser process plus the task driving its CDP connection.
///
/// Acquired with [`BrowserSession::launch`], released with
/// [`BrowserSession::close`]; callers must close on every path.
struct BrowserSession {
    browser: Browser,
    handler: JoinHandle<()>,
}

impl BrowserSession {
    async fn launch(browser_path: Option<PathBuf>) -> Result<Self, RenderError> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .request_timeout(OPERATION_TIMEOUT)
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-background-networking");
        if let Some(path) = browser_path {
            builder = builder.chrome_executable(path);
        }
        let config = builder.build().map_err(RenderError::Config)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(RenderError::Launch)?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::trace!(error = %e, "browser handler event error");
                }
            }
        });

        tracing::debug!("headless browser launched");
        Ok(Self { browser, handler })
    }

    async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            tracing::warn!(error = %e, "failed to close browser; killing process");
            if let Some(Err(e)) = self.browser.kill().await {
                tracing::warn!(error = %e, "failed to kill browser process");
            }
        }
        if let Err(e) = self.browser.wait().await {
            tracing::warn!(error = %e, "failed to reap browser process");
        }
        self.handler.abort();
        tracing::debug!("headless browser closed");
    }
}

/// Navigate and inspect one page. Intercepted matches land in `slot`, which
/// the caller owns so they survive this future being cancelled.
async fn extract_in_session(
    session: &BrowserSession,
    url: &str,
    resolved_url: &str,
    region: RegionFilter,
    slot: FirstMatch,
) -> Result<Option<ResolvedLocation>, RenderError> {
    let page = session.browser.new_page("about:blank").await?;

    let interceptor = intercept_map_responses(&page, Arc::clone(&slot), region).await?;
    let tracker = InflightTracker::subscribe(&page).await?;

    // Navigation and network idle share one operation timeout.
    let load_deadline = Instant::now() + OPERATION_TIMEOUT;
    match tokio::time::timeout_at(load_deadline, page.goto(url)).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => tracing::debug!(url, error = %e, "navigation failed; inspecting what loaded"),
        Err(_) => tracing::debug!(url, "navigation timed out; inspecting what loaded"),
    }
    if !tracker.wait_for_idle(load_deadline).await {
        tracing::debug!(url, "network never went idle");
    }
    tokio::time::sleep(RENDER_GRACE).await;

    tracker.cancel();
    interceptor.cancel();

    if let Some(coords) = slot.get() {
        return Ok(Some(ResolvedLocation::new(resolved_url, *coords)));
    }

    if let Some(coords) = scan_page_scripts(&page, region).await {
        tracing::debug!(url, "coordinates found in page scripts");
        return Ok(Some(ResolvedLocation::new(resolved_url, coords)));
    }

    if let Some(current) = page.url().await? {
        let current = decode_terminal_url(&current);
        if let Some(m) = extract_from_url(&current) {
            tracing::debug!(url, current = %current, rule = m.rule, "coordinates found in post-navigation URL");
            return Ok(Some(ResolvedLocation::new(current, m.coords)));
        }
    }

    let content = page.content().await?;
    Ok(scan_rendered_text(&content, region).map(|coords| {
        tracing::debug!(url, "coordinates found in rendered content");
        ResolvedLocation::new(resolved_url, coords)
    }))
}

/// Check the client-side init state first, then every inline script.
async fn scan_page_scripts(page: &Page, region: RegionFilter) -> Option<Coordinates> {
    match page.evaluate(INIT_STATE_SCRIPT).await {
        Ok(result) => {
            if let Some(coords) = result
                .into_value::<String>()
                .ok()
                .and_then(|state| scan_rendered_text(&state, region))
            {
                return Some(coords);
            }
        }
        Err(e) => tracing::debug!(error = %e, "init state evaluation failed"),
    }

    match page.evaluate(INLINE_SCRIPTS_SCRIPT).await {
        Ok(result) => result
            .into_value::<Vec<String>>()
            .ok()?
            .iter()
            .find_map(|script| scan_rendered_text(script, region)),
        Err(e) => {
            tracing::debug!(error = %e, "inline script evaluation failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore = "requires a local Chromium install"]
    async fn renders_data_url_with_inline_script_coordinates() {
        let renderer = ChromiumRenderer::new(None, RegionFilter::SouthWest);
        let url = "data:text/html,<script>var c=[-17.7833451,-63.1821349];</script>";
        match renderer.render(url, url).await {
            StageOutcome::Found(loc) => {
                assert!((loc.lat - -17.783_345_1).abs() < 1e-9);
                assert!((loc.lon - -63.182_134_9).abs() < 1e-9);
            }
            other => panic!("expected Found, got {other:?}"),
        }
    }

    #[tokio::test]
    #[ignore = "requires a local Chromium install"]
    async fn blank_page_yields_not_found() {
        let renderer = ChromiumRenderer::new(None, RegionFilter::SouthWest);
        let outcome = renderer.render("about:blank", "about:blank").await;
        assert!(matches!(outcome, StageOutcome::NotFound));
    }

    #[tokio::test]
    async fn missing_browser_binary_is_a_stage_error() {
        let renderer = ChromiumRenderer::new(
            Some(PathBuf::from("/nonexistent/maplink/chromium")),
            RegionFilter::SouthWest,
        );
        let outcome = renderer.render("https://maps.example.com", "https://maps.example.com").await;
        assert!(matches!(outcome, StageOutcome::StageError(_)), "got {outcome:?}");
    }
}
