//! One-shot session expiration timers.
//!
//! Maps `session_id -> armed timer`. Each timer fires its callback at most
//! once on a background task; firing removes the registry entry before the
//! callback runs, so a `disarm` racing with a firing timer is a logged
//! no-op rather than an error.

use crate::errors::FcError;

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// One-shot timer registry keyed by session id.
///
/// The timer map sits behind an [`Arc`] so each sleeper task can remove
/// its own entry when it fires.
#[derive(Debug, Clone, Default)]
pub struct ExpirationScheduler {
    timers: Arc<Mutex<HashMap<String, CancellationToken>>>,
}

impl ExpirationScheduler {
    /// Create an empty scheduler.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Arm a one-shot timer for the given session.
    ///
    /// After `delay`, `on_fire` is invoked on a background task. The
    /// registry entry is removed before the callback runs.
    ///
    /// # Errors
    ///
    /// Returns [`FcError::TimerAlreadyArmed`] if a timer is already armed
    /// for this session id; callers must disarm first.
    pub fn arm<F, Fut>(&self, session_id: &str, delay: Duration, on_fire: F) -> Result<(), FcError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        {
            let mut timers = self.lock_timers();
            if timers.contains_key(session_id) {
                return Err(FcError::TimerAlreadyArmed(session_id.to_string()));
            }
            timers.insert(session_id.to_string(), cancel.clone());
        }

        let timers = Arc::clone(&self.timers);
        let session_id = session_id.to_string();
        tokio::spawn(async move {
            tokio::select! {
                () = cancel.cancelled() => {
                    debug!(
                        target: "fc.scheduler",
                        session_id = %session_id,
                        "Expiration timer cancelled before firing"
                    );
                }
                () = tokio::time::sleep(delay) => {
                    // Remove the entry first so a concurrent disarm sees
                    // the timer as already consumed.
                    match timers.lock() {
                        Ok(mut guard) => {
                            guard.remove(&session_id);
                        }
                        Err(poisoned) => {
                            poisoned.into_inner().remove(&session_id);
                        }
                    }
                    info!(
                        target: "fc.scheduler",
                        session_id = %session_id,
                        delay_secs = delay.as_secs(),
                        "Expiration timer fired"
                    );
                    on_fire().await;
                }
            }
        });

        debug!(
            target: "fc.scheduler",
            delay_secs = delay.as_secs(),
            "Expiration timer armed"
        );

        Ok(())
    }

    /// Cancel and remove the timer for the given session, if present.
    ///
    /// Absence is expected when a disarm races a timer that already fired;
    /// it is logged and not surfaced as an error.
    pub fn disarm(&self, session_id: &str) {
        match self.lock_timers().remove(session_id) {
            Some(cancel) => {
                cancel.cancel();
                debug!(
                    target: "fc.scheduler",
                    session_id = %session_id,
                    "Expiration timer disarmed"
                );
            }
            None => {
                warn!(
                    target: "fc.scheduler",
                    session_id = %session_id,
                    "Tried to disarm a timer that does not exist"
                );
            }
        }
    }

    /// Number of currently armed timers.
    #[must_use]
    pub fn armed_count(&self) -> usize {
        self.lock_timers().len()
    }

    /// Whether a timer is armed for the given session.
    #[must_use]
    pub fn is_armed(&self, session_id: &str) -> bool {
        self.lock_timers().contains_key(session_id)
    }

    fn lock_timers(&self) -> MutexGuard<'_, HashMap<String, CancellationToken>> {
        // A poisoned lock means a sleeper panicked between two plain map
        // operations; the map itself is still coherent.
        match self.timers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
