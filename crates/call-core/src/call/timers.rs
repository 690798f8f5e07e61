//! Failure timers owned by a call
//!
//! A timer runs as a tokio task on the runtime captured when the registry
//! was created. When it fires, the handler is posted to the protocol
//! manager's event queue so it runs serialized with signaling work. Each
//! start bumps a generation counter; a fire whose generation is no longer
//! current is dropped, which covers a stop racing with an expiry that was
//! already queued.

use super::Call;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub struct CallTimer {
    name: &'static str,
    runtime: Option<Handle>,
    generation: Arc<AtomicU64>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for CallTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallTimer")
            .field("name", &self.name)
            .field("running", &self.is_running())
            .finish()
    }
}

impl CallTimer {
    pub fn new(name: &'static str, runtime: Option<Handle>) -> Self {
        Self {
            name,
            runtime,
            generation: Arc::new(AtomicU64::new(0)),
            task: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// (Re)arm the timer. `on_fire` receives the generation it was armed
    /// with. Returns false when no runtime is available to run the timer.
    pub fn start(&self, timeout: Duration, on_fire: impl FnOnce(u64) + Send + 'static) -> bool {
        let Some(runtime) = self.runtime.as_ref() else {
            warn!("No runtime available, {} timer not started", self.name);
            return false;
        };

        let armed = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let generation = self.generation.clone();
        let handle = runtime.spawn(async move {
            tokio::time::sleep(timeout).await;
            if generation.load(Ordering::SeqCst) == armed {
                on_fire(armed);
            }
        });

        if let Some(previous) = self.task.lock().replace(handle) {
            previous.abort();
        }
        debug!("{} timer armed for {:?}", self.name, timeout);
        true
    }

    /// Disarm the timer. Fires already queued become stale.
    pub fn stop(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }

    /// True while a fire armed with `generation` should still be honored
    pub fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    pub fn is_running(&self) -> bool {
        self.task.lock().as_ref().is_some_and(|task| !task.is_finished())
    }
}

#[derive(Clone, Copy)]
enum TimerKind {
    PleaseWait,
    VrsFailover,
    DhvConnecting,
}

impl Call {
    fn timer(&self, kind: TimerKind) -> &CallTimer {
        match kind {
            TimerKind::PleaseWait => &self.please_wait_timer,
            TimerKind::VrsFailover => &self.vrs_failover_timer,
            TimerKind::DhvConnecting => &self.dhv_connecting_timer,
        }
    }

    fn timer_start(&self, kind: TimerKind, timeout: Duration) -> bool {
        let call = self.self_ref.clone();
        self.timer(kind).start(timeout, move |generation| {
            if let Some(call) = call.upgrade() {
                call.timer_fired(kind, generation);
            }
        })
    }

    /// Hand a fired timer to the protocol manager's queue
    fn timer_fired(self: Arc<Self>, kind: TimerKind, generation: u64) {
        let Some(manager) = self.protocol_manager() else {
            crate::invariant_violation!(
                "call {}: {} timer fired without a protocol manager",
                self.index,
                self.timer(kind).name()
            );
            return;
        };
        let call = self;
        manager.post_event(move || {
            if !call.timer(kind).is_current(generation) {
                debug!("Dropping stale {} timer fire for call {}", call.timer(kind).name(), call.index);
                return;
            }
            match kind {
                TimerKind::PleaseWait => call.please_wait_timeout(),
                TimerKind::VrsFailover => call.vrs_failover_timeout(),
                TimerKind::DhvConnecting => call.dhv_connecting_timeout(),
            }
        });
    }

    /// Start the timer that tells the user an interpreter is still being
    /// located
    pub fn please_wait_timer_start(&self) -> bool {
        self.trace("please_wait_timer_start");
        self.timer_start(TimerKind::PleaseWait, self.ctx.timers.please_wait())
    }

    /// Start the timer after which the call fails over to another provider
    pub fn vrs_failover_timer_start(&self) -> bool {
        self.trace("vrs_failover_timer_start");
        self.timer_start(TimerKind::VrsFailover, self.ctx.timers.vrs_failover())
    }

    /// Start the timer bounding how long a hearing participant may take to
    /// answer
    pub fn dhv_connecting_timer_start(&self) -> bool {
        self.trace("dhv_connecting_timer_start");
        self.timer_start(TimerKind::DhvConnecting, self.ctx.timers.dhv_connecting())
    }

    pub fn dhv_connecting_timer_stop(&self) {
        self.dhv_connecting_timer.stop();
    }

    /// Stop the please-wait and failover timers
    pub fn failure_timers_stop(&self) {
        self.please_wait_timer.stop();
        self.vrs_failover_timer.stop();
    }

    fn please_wait_timeout(self: &Arc<Self>) {
        self.trace("please_wait_timeout");
        let uri = self.uri();
        let address = if uri.is_empty() { self.remote_ip_address() } else { uri };
        info!(
            "EventType=VRSFailover Reason=PleaseWaitTimerFired Address={} DialMethod={}",
            address,
            self.dial_method() as i32
        );
        match self.protocol_manager() {
            Some(manager) => manager.please_wait(self),
            None => crate::invariant_violation!("call {}: please wait without a protocol manager", self.index),
        }
    }

    fn vrs_failover_timeout(self: &Arc<Self>) {
        self.trace("vrs_failover_timeout");
        if let Err(err) = self.force_vrs_failover() {
            warn!("Call {} failover failed: {}", self.index, err);
        }
    }

    fn dhv_connecting_timeout(self: &Arc<Self>) {
        self.trace("dhv_connecting_timeout");
        info!(
            "EventType=DHVI Reason=NoAnswer CallID={}",
            self.call_id().unwrap_or_default()
        );
        if let Err(err) = self.dhvi_mcu_disconnect() {
            warn!("Call {} hearing participant disconnect failed: {}", self.index, err);
        }
    }

    /// Drop the hearing participant's bridge
    pub fn dhvi_mcu_disconnect(self: &Arc<Self>) -> crate::errors::CallResult<()> {
        self.trace("dhvi_mcu_disconnect");
        let manager = self.protocol_manager().ok_or(crate::errors::CallError::ProtocolManagerMissing)?;
        manager.dhv_mcu_disconnect(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test(start_paused = true)]
    async fn fires_once_after_timeout() {
        let timer = CallTimer::new("test", Some(Handle::current()));
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        assert!(timer.start(Duration::from_secs(5), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_prevents_fire() {
        let timer = CallTimer::new("test", Some(Handle::current()));
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        timer.start(Duration::from_secs(1), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        timer.stop();
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(!timer.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn restart_invalidates_previous_generation() {
        let timer = CallTimer::new("test", Some(Handle::current()));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let first = seen.clone();
        timer.start(Duration::from_secs(1), move |g| first.lock().push(g));
        let second = seen.clone();
        timer.start(Duration::from_secs(2), move |g| second.lock().push(g));

        tokio::time::sleep(Duration::from_secs(3)).await;
        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert!(timer.is_current(seen[0]));
    }

    #[test]
    fn without_runtime_start_is_refused() {
        let timer = CallTimer::new("test", None);
        assert!(!timer.start(Duration::from_secs(1), |_| {}));
        assert!(!timer.is_running());
    }
}
