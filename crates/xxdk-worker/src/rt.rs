//! Task spawning and timers for native (Tokio) and browser (wasm32) builds.

use std::future::Future;
use std::time::Duration;

/// Spawn a detached task on the current runtime.
///
/// Natively this must be called from within a Tokio runtime.
#[cfg(not(target_arch = "wasm32"))]
pub fn spawn<F>(future: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(future);
}

/// Spawn a detached task on the browser's microtask queue.
#[cfg(target_arch = "wasm32")]
pub fn spawn<F>(future: F)
where
    F: Future<Output = ()> + 'static,
{
    wasm_bindgen_futures::spawn_local(future);
}

/// Run `future` until it completes or `duration` passes.
///
/// Returns `None` when the deadline wins.
#[cfg(not(target_arch = "wasm32"))]
pub async fn timeout<F: Future>(duration: Duration, future: F) -> Option<F::Output> {
    tokio::time::timeout(duration, future).await.ok()
}

/// Run `future` until it completes or `duration` passes.
///
/// The browser timer is not `Send`, so it runs on its own local task and
/// signals expiry through a oneshot; the future returned here stays `Send`.
#[cfg(target_arch = "wasm32")]
pub async fn timeout<F: Future>(duration: Duration, future: F) -> Option<F::Output> {
    use futures::future::{select, Either};

    let millis = duration.as_millis().min(u32::MAX as u128) as u32;
    let (expired_tx, expired_rx) = tokio::sync::oneshot::channel::<()>();
    wasm_bindgen_futures::spawn_local(fire_unless_closed(
        gloo_timers::future::TimeoutFuture::new(millis),
        expired_tx,
    ));

    futures::pin_mut!(future);
    match select(future, expired_rx).await {
        Either::Left((output, _)) => Some(output),
        Either::Right(_) => None,
    }
}

/// Wait for `timer`, then signal `expired`. Drops the timer as soon as the
/// receiving side goes away.
#[cfg(any(target_arch = "wasm32", test))]
async fn fire_unless_closed<T: Future>(timer: T, mut expired: tokio::sync::oneshot::Sender<()>) {
    use futures::future::{select, Either};

    let fired = {
        let closed = expired.closed();
        futures::pin_mut!(timer, closed);
        matches!(select(timer, closed).await, Either::Left(_))
    };
    if fired {
        let _ = expired.send(());
    }
}

/// A point in time for measuring how long a wait took.
///
/// Follows Tokio's clock natively, so paused test time is honoured.
#[cfg(not(target_arch = "wasm32"))]
#[derive(Debug, Clone, Copy)]
pub struct Instant(tokio::time::Instant);

#[cfg(not(target_arch = "wasm32"))]
impl Instant {
    pub fn now() -> Self {
        Self(tokio::time::Instant::now())
    }

    pub fn elapsed(&self) -> Duration {
        self.0.elapsed()
    }
}

/// A point in time for measuring how long a wait took, read from `Date.now()`.
#[cfg(target_arch = "wasm32")]
#[derive(Debug, Clone, Copy)]
pub struct Instant(f64);

#[cfg(target_arch = "wasm32")]
impl Instant {
    pub fn now() -> Self {
        Self(js_sys::Date::now())
    }

    pub fn elapsed(&self) -> Duration {
        let millis = (js_sys::Date::now() - self.0).max(0.0);
        Duration::from_secs_f64(millis / 1000.0)
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_timeout_completes() {
        assert_eq!(timeout(Duration::from_secs(1), async { 7 }).await, Some(7));
    }

    #[tokio::test]
    async fn test_timeout_expires() {
        let never = futures::future::pending::<()>();
        assert_eq!(timeout(Duration::from_millis(10), never).await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_instant_measures_paused_time() {
        let start = Instant::now();
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(start.elapsed() >= Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_timer_dropped_once_receiver_closes() {
        let (tx, rx) = tokio::sync::oneshot::channel();
        drop(rx);
        let never = futures::future::pending::<()>();
        let finished = tokio::time::timeout(Duration::from_secs(1), fire_unless_closed(never, tx)).await;
        assert!(finished.is_ok());
    }

    #[tokio::test]
    async fn test_timer_fires_while_receiver_waits() {
        let (tx, rx) = tokio::sync::oneshot::channel();
        fire_unless_closed(async {}, tx).await;
        assert_eq!(rx.await, Ok(()));
    }
}
