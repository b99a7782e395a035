use crate::application::engine::FocusSessionEngine;
use crate::infrastructure::notifier::Notifier;
use crate::infrastructure::session_log_repository::SessionLogRepository;
use crate::infrastructure::task_store_client::TaskStoreClient;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time;

/// Drives the engine with one tick per interval while a run is active. The
/// ticker holds no countdown state of its own; the engine is the single
/// authority and every tick re-reads it.
pub struct SessionRunner<T, L, N>
where
    T: TaskStoreClient + 'static,
    L: SessionLogRepository + 'static,
    N: Notifier + 'static,
{
    engine: Arc<FocusSessionEngine<T, L, N>>,
    ticker: Mutex<Option<JoinHandle<()>>>,
    tick_interval: Duration,
}

impl<T, L, N> SessionRunner<T, L, N>
where
    T: TaskStoreClient + 'static,
    L: SessionLogRepository + 'static,
    N: Notifier + 'static,
{
    pub fn new(engine: Arc<FocusSessionEngine<T, L, N>>) -> Self {
        Self::with_tick_interval(engine, Duration::from_secs(1))
    }

    pub fn with_tick_interval(
        engine: Arc<FocusSessionEngine<T, L, N>>,
        tick_interval: Duration,
    ) -> Self {
        Self {
            engine,
            ticker: Mutex::new(None),
            tick_interval,
        }
    }

    /// Spawn the ticker for a freshly started or resumed run. Any previous
    /// handle is aborted first so two tickers never drive the same engine.
    pub fn start(&self) {
        let mut guard = match self.ticker.lock() {
            Ok(guard) => guard,
            Err(_) => return,
        };
        if let Some(handle) = guard.take() {
            handle.abort();
        }

        let engine = Arc::clone(&self.engine);
        let tick_interval = self.tick_interval;
        let handle = tokio::spawn(async move {
            let mut interval = time::interval(tick_interval);
            // The first tick of a tokio interval completes immediately;
            // skip it so the countdown starts a full period after start().
            interval.tick().await;
            loop {
                interval.tick().await;
                if !engine.is_running() {
                    break;
                }
                match engine.tick().await {
                    Ok(Some(transition)) if transition.is_terminal() => break,
                    Ok(Some(_)) => {}
                    Ok(None) => break,
                    // Log-append or lock failures do not stop the countdown;
                    // the next is_running check handles shutdown.
                    Err(_) => {}
                }
            }
        });
        *guard = Some(handle);
    }

    pub fn stop(&self) {
        if let Ok(mut guard) = self.ticker.lock() {
            if let Some(handle) = guard.take() {
                handle.abort();
            }
        }
    }

    pub fn is_ticking(&self) -> bool {
        self.ticker
            .lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(|handle| !handle.is_finished()))
            .unwrap_or(false)
    }
}

impl<T, L, N> Drop for SessionRunner<T, L, N>
where
    T: TaskStoreClient + 'static,
    L: SessionLogRepository + 'static,
    N: Notifier + 'static,
{
    fn drop(&mut self) {
        self.stop();
    }
}
