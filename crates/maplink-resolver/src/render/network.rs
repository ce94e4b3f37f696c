//! CDP network subscriptions used while a page loads: the map-API response
//! interceptor and the in-flight request counter behind network-idle.

use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chromiumoxide::cdp::browser_protocol::network::{
    EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent, EventResponseReceived,
    GetResponseBodyParams,
};
use chromiumoxide::Page;
use futures::StreamExt;
use maplink_core::{Coordinates, RegionFilter};
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::{is_map_api_url, scan_rendered_text};
use crate::error::RenderError;

/// Page counts as idle once no more than this many requests stay in flight
/// for the quiet period.
const IDLE_MAX_IN_FLIGHT: usize = 2;
const IDLE_QUIET_PERIOD: Duration = Duration::from_millis(500);
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Single-assignment slot for the first coordinate pair found by a
/// background listener.
pub(super) type FirstMatch = Arc<OnceCell<Coordinates>>;

/// A background event listener. Unsubscribes (aborts the task, dropping
/// its CDP event streams) on [`Subscription::cancel`] or drop.
pub(super) struct Subscription {
    name: &'static str,
    task: JoinHandle<()>,
}

impl Subscription {
    fn spawn<F>(name: &'static str, fut: F) -> Self
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        Self {
            name,
            task: tokio::spawn(fut),
        }
    }

    pub(super) fn cancel(self) {
        tracing::trace!(subscription = self.name, "unsubscribing");
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

enum LoadEvent {
    Response(Arc<EventResponseReceived>),
    Finished(Arc<EventLoadingFinished>),
}

/// Watch responses from map-provider API hosts and scan each finished body
/// for a plausible bracketed pair. The first hit fills `slot`; later hits
/// are ignored and the listener stops.
pub(super) async fn intercept_map_responses(
    page: &Page,
    slot: FirstMatch,
    region: RegionFilter,
) -> Result<Subscription, RenderError> {
    let responses = page.event_listener::<EventResponseReceived>().await?;
    let finished = page.event_listener::<EventLoadingFinished>().await?;
    let page = page.clone();

    Ok(Subscription::spawn("map_api_responses", async move {
        let mut events = std::pin::pin!(futures::stream::select(
            responses.map(LoadEvent::Response),
            finished.map(LoadEvent::Finished),
        ));
        let mut watched: HashSet<String> = HashSet::new();

        while let Some(event) = events.next().await {
            if slot.initialized() {
                break;
            }
            match event {
                LoadEvent::Response(ev) => {
                    if is_map_api_url(&ev.response.url) {
                        watched.insert(ev.request_id.inner().clone());
                    }
                }
                LoadEvent::Finished(ev) => {
                    if !watched.remove(ev.request_id.inner()) {
                        continue;
                    }
                    let body = match page
                        .execute(GetResponseBodyParams::new(ev.request_id.clone()))
                        .await
                    {
                        Ok(resp) => resp.result,
                        Err(e) => {
                            tracing::debug!(error = %e, "could not read intercepted response body");
                            continue;
                        }
                    };
                    if body.base64_encoded {
                        continue;
                    }
                    if let Some(coords) = scan_rendered_text(&body.body, region) {
                        if slot.set(coords).is_ok() {
                            tracing::debug!(lat = coords.lat, lon = coords.lon, "coordinates intercepted from map API response");
                        }
                        break;
                    }
                }
            }
        }
    }))
}

/// Counts requests currently in flight on a page.
pub(super) struct InflightTracker {
    count: Arc<AtomicI64>,
    subscription: Subscription,
}

impl InflightTracker {
    pub(super) async fn subscribe(page: &Page) -> Result<Self, RenderError> {
        let started = page.event_listener::<EventRequestWillBeSent>().await?;
        let finished = page.event_listener::<EventLoadingFinished>().await?;
        let failed = page.event_listener::<EventLoadingFailed>().await?;

        let count = Arc::new(AtomicI64::new(0));
        let counter = Arc::clone(&count);

        // A redirect reuses the request id without finishing the earlier hop.
        let started = started.map(|ev| i64::from(ev.redirect_response.is_none()));
        let finished = finished.map(|_| -1_i64);
        let failed = failed.map(|_| -1_i64);

        let subscription = Subscription::spawn("in_flight_requests", async move {
            let mut deltas = std::pin::pin!(futures::stream::select(
                started,
                futures::stream::select(finished, failed)
            ));
            while let Some(delta) = deltas.next().await {
                counter.fetch_add(delta, Ordering::Relaxed);
            }
        });

        Ok(Self {
            count,
            subscription,
        })
    }

    fn in_flight(&self) -> usize {
        usize::try_from(self.count.load(Ordering::Relaxed).max(0)).unwrap_or(0)
    }

    /// Wait until the page is network-idle or `deadline` passes. Returns
    /// `true` when idle was reached.
    pub(super) async fn wait_for_idle(&self, deadline: Instant) -> bool {
        let mut window = IdleWindow::new(IDLE_MAX_IN_FLIGHT, IDLE_QUIET_PERIOD);
        loop {
            let now = Instant::now();
            if window.observe(self.in_flight(), now) {
                return true;
            }
            if now >= deadline {
                return false;
            }
            tokio::time::sleep(IDLE_POLL_INTERVAL).await;
        }
    }

    pub(super) fn cancel(self) {
        self.subscription.cancel();
    }
}

/// Tracks how long the in-flight count has stayed at or below a threshold.
#[derive(Debug)]
pub(super) struct IdleWindow {
    max_in_flight: usize,
    quiet_period: Duration,
    quiet_since: Option<Instant>,
}

impl IdleWindow {
    pub(super) fn new(max_in_flight: usize, quiet_period: Duration) -> Self {
        Self {
            max_in_flight,
            quiet_period,
            quiet_since: None,
        }
    }

    /// Record one observation; `true` once the count has stayed at or below
    /// the threshold for the whole quiet period.
    pub(super) fn observe(&mut self, in_flight: usize, now: Instant) -> bool {
        if in_flight > self.max_in_flight {
            self.quiet_since = None;
            return false;
        }
        let since = *self.quiet_since.get_or_insert(now);
        now.duration_since(since) >= self.quiet_period
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window() -> IdleWindow {
        IdleWindow::new(2, Duration::from_millis(500))
    }

    #[test]
    fn idle_after_quiet_period() {
        let mut w = window();
        let t0 = Instant::now();
        assert!(!w.observe(1, t0));
        assert!(!w.observe(2, t0 + Duration::from_millis(499)));
        assert!(w.observe(0, t0 + Duration::from_millis(500)));
    }

    #[test]
    fn busy_burst_resets_quiet_period() {
        let mut w = window();
        let t0 = Instant::now();
        assert!(!w.observe(0, t0));
        assert!(!w.observe(3, t0 + Duration::from_millis(400)));
        assert!(!w.observe(0, t0 + Duration::from_millis(600)));
        assert!(!w.observe(2, t0 + Duration::from_millis(1000)));
        assert!(w.observe(2, t0 + Duration::from_millis(1100)));
    }

    #[test]
    fn never_idle_while_busy() {
        let mut w = window();
        let t0 = Instant::now();
        for ms in (0..5_000).step_by(100) {
            assert!(!w.observe(5, t0 + Duration::from_millis(ms)));
        }
    }
}
