//! Cross-task control points between a worker and its supervisor.
//!
//! Stop and reload are level-triggered flags, not queues: duplicate
//! requests issued before the loop observes the first coalesce into one
//! action, and a reload publishes its replacement configuration into a
//! single pending slot with last-writer-wins semantics.

use statrelay_common::types::TargetConfig;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

pub(crate) struct ControlState {
    stopping: AtomicBool,
    reload: AtomicBool,
    connected: AtomicBool,
    pending: Mutex<Option<TargetConfig>>,
    active: RwLock<TargetConfig>,
}

impl ControlState {
    pub(crate) fn new(config: TargetConfig) -> Arc<Self> {
        Arc::new(Self {
            stopping: AtomicBool::new(false),
            reload: AtomicBool::new(false),
            connected: AtomicBool::new(false),
            pending: Mutex::new(None),
            active: RwLock::new(config),
        })
    }

    pub(crate) fn stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    pub(crate) fn set_stopping(&self) {
        self.stopping.store(true, Ordering::SeqCst);
    }

    pub(crate) fn reload_requested(&self) -> bool {
        self.reload.load(Ordering::SeqCst)
    }

    /// Lowers the reload flag. Called by the loop before it consumes the
    /// pending slot, so a request landing in between raises the flag again
    /// and is picked up on the next tick instead of being lost.
    pub(crate) fn clear_reload(&self) {
        self.reload.store(false, Ordering::SeqCst);
    }

    pub(crate) fn take_pending(&self) -> Option<TargetConfig> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }

    pub(crate) fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub(crate) fn set_active(&self, config: TargetConfig) {
        *self
            .active
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = config;
    }

    fn active(&self) -> TargetConfig {
        self.active
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

/// Thread-safe handle to a running [`crate::Worker`].
///
/// All methods are idempotent and safe to call concurrently with the
/// worker's own loop.
#[derive(Clone)]
pub struct WorkerHandle {
    name: String,
    state: Arc<ControlState>,
}

impl WorkerHandle {
    pub(crate) fn new(name: String, state: Arc<ControlState>) -> Self {
        Self { name, state }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Signals the worker to halt after its current tick. A cycle already
    /// in flight is allowed to complete.
    pub fn request_stop(&self) {
        tracing::info!(worker = %self.name, "asked to stop");
        self.state.set_stopping();
    }

    /// Publishes a replacement configuration and signals reload. The loop
    /// adopts it at its next iteration boundary, never mid-cycle; calling
    /// again before then replaces the pending configuration.
    pub fn request_reload(&self, config: TargetConfig) {
        tracing::debug!(worker = %self.name, "reload asked");
        *self
            .state
            .pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(config);
        self.state.reload.store(true, Ordering::SeqCst);
    }

    pub fn is_stopping(&self) -> bool {
        self.state.stopping()
    }

    /// Readiness flag: both sessions were established and have not been
    /// torn down since.
    pub fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::SeqCst)
    }

    /// The configuration currently driving the loop. Reflects a reload only
    /// once the loop has adopted it.
    pub fn current_config(&self) -> TargetConfig {
        self.state.active()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(dsn: &str, srvid: i32) -> TargetConfig {
        TargetConfig {
            dsn: dsn.to_string(),
            srvid,
            frequency: 300,
        }
    }

    fn handle() -> (WorkerHandle, Arc<ControlState>) {
        let state = ControlState::new(target("host=a", 1));
        (WorkerHandle::new("a".into(), state.clone()), state)
    }

    #[test]
    fn reload_coalesces_to_the_last_writer() {
        let (handle, state) = handle();

        handle.request_reload(target("host=a", 1));
        handle.request_reload(target("host=b", 2));

        assert!(state.reload_requested());
        state.clear_reload();
        let adopted = state.take_pending().unwrap();
        assert_eq!(adopted.dsn, "host=b");
        assert_eq!(adopted.srvid, 2);

        // The first config was never observable.
        assert!(state.take_pending().is_none());
        assert!(!state.reload_requested());
    }

    #[test]
    fn stop_is_idempotent_and_sticky() {
        let (handle, _state) = handle();
        assert!(!handle.is_stopping());
        handle.request_stop();
        handle.request_stop();
        assert!(handle.is_stopping());
    }

    #[test]
    fn current_config_tracks_loop_adoption_not_the_request() {
        let (handle, state) = handle();
        handle.request_reload(target("host=b", 2));

        // Not adopted yet: the loop has not observed the flag.
        assert_eq!(handle.current_config().dsn, "host=a");

        state.clear_reload();
        let pending = state.take_pending().unwrap();
        state.set_active(pending);
        assert_eq!(handle.current_config().dsn, "host=b");
    }

    #[test]
    fn connected_flag_round_trips() {
        let (handle, state) = handle();
        assert!(!handle.is_connected());
        state.set_connected(true);
        assert!(handle.is_connected());
        state.set_connected(false);
        assert!(!handle.is_connected());
    }
}
