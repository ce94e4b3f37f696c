//! Runs one browser session against the render-stage budget.
//!
//! Launch and inspection share a single deadline. Whatever happens inside
//! the budget, a launched session is closed before the outcome is reported,
//! and a match already written to the first-match slot is never lost.

use std::future::Future;
use std::time::Duration;

use futures::future::BoxFuture;
use maplink_core::{Coordinates, ResolvedLocation};
use tokio::time::{timeout_at, Instant};

use super::network::FirstMatch;
use crate::error::RenderError;

/// How a budgeted session ended.
#[derive(Debug)]
pub(super) enum SessionRun {
    /// Inspection ran to completion.
    Completed(Option<ResolvedLocation>),
    /// Inspection did not complete, but a listener had already matched.
    Intercepted(Coordinates),
    /// The budget ran out with nothing found.
    TimedOut,
    Failed(RenderError),
}

/// Launch a session, run `inspect` on it, and close it, all against
/// `budget`.
///
/// `close` runs on every path where `launch` succeeded, including budget
/// expiry and inspection failure. When inspection does not finish cleanly,
/// `slot` decides between [`SessionRun::Intercepted`] and the failure.
pub(super) async fn run_session<S, L, I, C, CF>(
    budget: Duration,
    slot: &FirstMatch,
    launch: L,
    inspect: I,
    close: C,
) -> SessionRun
where
    L: Future<Output = Result<S, RenderError>>,
    I: for<'s> FnOnce(&'s S) -> BoxFuture<'s, Result<Option<ResolvedLocation>, RenderError>>,
    C: FnOnce(S) -> CF,
    CF: Future<Output = ()>,
{
    let deadline = Instant::now() + budget;

    let session = match timeout_at(deadline, launch).await {
        Ok(Ok(session)) => session,
        Ok(Err(e)) => return SessionRun::Failed(e),
        Err(_) => return SessionRun::TimedOut,
    };

    let result = timeout_at(deadline, inspect(&session)).await;
    close(session).await;

    match result {
        Ok(Ok(found)) => SessionRun::Completed(found),
        Ok(Err(e)) => match slot.get() {
            Some(coords) => SessionRun::Intercepted(*coords),
            None => SessionRun::Failed(e),
        },
        Err(_) => match slot.get() {
            Some(coords) => SessionRun::Intercepted(*coords),
            None => SessionRun::TimedOut,
        },
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    use tokio::sync::OnceCell;

    use super::*;

    const BUDGET: Duration = Duration::from_secs(20);

    struct FakeSession {
        closed: Arc<AtomicBool>,
    }

    impl FakeSession {
        async fn close(self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    fn launched(closed: &Arc<AtomicBool>) -> impl Future<Output = Result<FakeSession, RenderError>> {
        let closed = Arc::clone(closed);
        async move { Ok(FakeSession { closed }) }
    }

    fn assert_within_budget(started: Instant) {
        let elapsed = started.elapsed();
        assert!(
            elapsed >= BUDGET && elapsed < BUDGET + Duration::from_secs(1),
            "stage took {elapsed:?}"
        );
    }

    fn bolivia() -> Coordinates {
        Coordinates {
            lat: -17.783_345_1,
            lon: -63.182_134_9,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn budget_expiry_without_match_times_out_and_closes() {
        let slot: FirstMatch = Arc::new(OnceCell::new());
        let closed = Arc::new(AtomicBool::new(false));
        let started = Instant::now();

        let run = run_session(
            BUDGET,
            &slot,
            launched(&closed),
            |_session| Box::pin(std::future::pending()),
            FakeSession::close,
        )
        .await;

        assert!(matches!(run, SessionRun::TimedOut), "got {run:?}");
        assert!(closed.load(Ordering::SeqCst), "session must be closed on timeout");
        assert_within_budget(started);
    }

    #[tokio::test(start_paused = true)]
    async fn budget_expiry_keeps_an_intercepted_match() {
        let slot: FirstMatch = Arc::new(OnceCell::new());
        let closed = Arc::new(AtomicBool::new(false));
        let listener_slot = Arc::clone(&slot);

        let run = run_session(
            BUDGET,
            &slot,
            launched(&closed),
            move |_session| {
                Box::pin(async move {
                    tokio::time::sleep(Duration::from_secs(4)).await;
                    let _ = listener_slot.set(bolivia());
                    std::future::pending().await
                })
            },
            FakeSession::close,
        )
        .await;

        match run {
            SessionRun::Intercepted(coords) => assert_eq!(coords, bolivia()),
            other => panic!("expected Intercepted, got {other:?}"),
        }
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn inspection_failure_keeps_an_intercepted_match() {
        let slot: FirstMatch = Arc::new(OnceCell::new());
        slot.set(bolivia()).expect("empty slot");
        let closed = Arc::new(AtomicBool::new(false));

        let run = run_session(
            BUDGET,
            &slot,
            launched(&closed),
            |_session| Box::pin(async { Err(RenderError::Config("page crashed".to_string())) }),
            FakeSession::close,
        )
        .await;

        assert!(matches!(run, SessionRun::Intercepted(_)), "got {run:?}");
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn inspection_failure_without_match_is_reported() {
        let slot: FirstMatch = Arc::new(OnceCell::new());
        let closed = Arc::new(AtomicBool::new(false));

        let run = run_session(
            BUDGET,
            &slot,
            launched(&closed),
            |_session| Box::pin(async { Err(RenderError::Config("page crashed".to_string())) }),
            FakeSession::close,
        )
        .await;

        assert!(matches!(run, SessionRun::Failed(RenderError::Config(_))), "got {run:?}");
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn completed_inspection_closes_once() {
        let slot: FirstMatch = Arc::new(OnceCell::new());
        let closes = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&closes);
        let location = ResolvedLocation::new("https://maps.example.com/x", bolivia());
        let expected = location.clone();

        let run = run_session(
            BUDGET,
            &slot,
            async { Ok(()) },
            move |_session| Box::pin(async move { Ok(Some(location)) }),
            move |()| async move {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        )
        .await;

        match run {
            SessionRun::Completed(Some(found)) => assert_eq!(found, expected),
            other => panic!("expected Completed(Some), got {other:?}"),
        }
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_launch_counts_against_the_budget() {
        let slot: FirstMatch = Arc::new(OnceCell::new());
        let inspected = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&inspected);
        let started = Instant::now();

        let run = run_session(
            BUDGET,
            &slot,
            async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(())
            },
            move |_session| {
                flag.store(true, Ordering::SeqCst);
                Box::pin(async { Ok(None) })
            },
            |()| async {},
        )
        .await;

        assert!(matches!(run, SessionRun::TimedOut), "got {run:?}");
        assert!(!inspected.load(Ordering::SeqCst));
        assert_within_budget(started);
    }

    #[tokio::test(start_paused = true)]
    async fn launch_failure_skips_close() {
        let slot: FirstMatch = Arc::new(OnceCell::new());
        let closed = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&closed);

        let run = run_session(
            BUDGET,
            &slot,
            async { Err::<(), _>(RenderError::Config("no browser".to_string())) },
            |_session| Box::pin(async { Ok(None) }),
            move |()| async move { flag.store(true, Ordering::SeqCst) },
        )
        .await;

        assert!(matches!(run, SessionRun::Failed(_)), "got {run:?}");
        assert!(!closed.load(Ordering::SeqCst));
    }
}
