//! Reentrancy guards
//!
//! - `DeadLoopCheck`: watchdog thread that aborts runaway script calls
//! - `DanglingCheck`: rejects access through handles to released objects

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use fos_reflect::{ObjectHandle, ObjectSystem, ReflectError};

use crate::error::{Access, ScriptError};

#[derive(Default)]
struct WatchdogState {
    running: AtomicBool,
    /// Active guarded scopes
    guards: AtomicU32,
    /// Ticks since the outermost guard was entered
    elapsed: AtomicU32,
    /// Outermost scope is waiting to be faulted
    pending: AtomicBool,
    /// Armed trap, consumed by the VM thread
    trap: AtomicBool,
    /// Current scope has been faulted; keeps interrupting until it unwinds
    faulted: AtomicBool,
    fired: AtomicU64,
}

/// Runaway-script watchdog.
///
/// A background thread counts ticks while a guard is held and arms the
/// trap once `timeout` ticks have passed, so a runaway call faults within
/// `timeout + 1` ticks of entering. Each guarded scope fires at most once
/// and `fired_count` moves by exactly one per firing.
///
/// Unlike a one-shot trap, a fired trap stays set: `WatchdogTrap::poll`
/// keeps returning true until the outermost guard drops, so a script that
/// catches the abort is interrupted again at its next poll.
pub struct DeadLoopCheck {
    timeout: u32,
    state: Arc<WatchdogState>,
    runner: Option<JoinHandle<()>>,
}

impl DeadLoopCheck {
    /// A zero timeout disables the watchdog; no thread is started
    pub fn new(timeout: u32, tick: Duration) -> Self {
        let state = Arc::new(WatchdogState::default());
        let runner = if timeout > 0 {
            state.running.store(true, Ordering::SeqCst);
            let runner_state = state.clone();
            thread::Builder::new()
                .name("script-watchdog".into())
                .spawn(move || run(runner_state, timeout, tick))
                .map_err(|e| tracing::error!("Failed to start script watchdog: {}", e))
                .ok()
        } else {
            None
        };
        Self { timeout, state, runner }
    }

    pub fn is_enabled(&self) -> bool {
        self.runner.is_some()
    }

    pub fn timeout(&self) -> u32 {
        self.timeout
    }

    /// Guard a script entry; `None` when disabled
    pub fn make_guard(&self) -> Option<DeadLoopGuard> {
        if !self.is_enabled() {
            return None;
        }
        if self.state.guards.fetch_add(1, Ordering::SeqCst) == 0 {
            self.state.elapsed.store(0, Ordering::SeqCst);
            self.state.trap.store(false, Ordering::SeqCst);
            self.state.faulted.store(false, Ordering::SeqCst);
            self.state.pending.store(true, Ordering::SeqCst);
        }
        Some(DeadLoopGuard { state: self.state.clone() })
    }

    /// Trap handle polled from the VM thread
    pub fn trap(&self) -> WatchdogTrap {
        WatchdogTrap { state: self.state.clone() }
    }

    /// Number of times the trap has fired
    pub fn fired_count(&self) -> u64 {
        self.state.fired.load(Ordering::SeqCst)
    }
}

impl Drop for DeadLoopCheck {
    fn drop(&mut self) {
        self.state.running.store(false, Ordering::SeqCst);
        if let Some(runner) = self.runner.take() {
            runner.thread().unpark();
            let _ = runner.join();
        }
    }
}

fn run(state: Arc<WatchdogState>, timeout: u32, tick: Duration) {
    loop {
        let deadline = Instant::now() + tick;
        loop {
            if !state.running.load(Ordering::SeqCst) {
                return;
            }
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::park_timeout(deadline - now);
        }

        if state.guards.load(Ordering::SeqCst) == 0 {
            continue;
        }
        let elapsed = state.elapsed.fetch_add(1, Ordering::SeqCst) + 1;
        if elapsed < timeout {
            continue;
        }
        if state.pending.swap(false, Ordering::SeqCst) {
            state.trap.store(true, Ordering::SeqCst);
        }
    }
}

/// Scope marker; the outermost drop disarms anything left pending
pub struct DeadLoopGuard {
    state: Arc<WatchdogState>,
}

impl Drop for DeadLoopGuard {
    fn drop(&mut self) {
        if self.state.guards.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.state.pending.store(false, Ordering::SeqCst);
            self.state.trap.store(false, Ordering::SeqCst);
            self.state.faulted.store(false, Ordering::SeqCst);
        }
    }
}

/// VM-side half of the watchdog
#[derive(Clone)]
pub struct WatchdogTrap {
    state: Arc<WatchdogState>,
}

impl WatchdogTrap {
    /// Whether the VM should abort now.
    ///
    /// Consumes an armed trap (counted and logged once per firing), then
    /// keeps answering true until the faulted scope has unwound, so a
    /// script cannot swallow the abort and keep looping.
    pub fn poll(&self) -> bool {
        if self.state.faulted.load(Ordering::Relaxed) {
            return self.state.guards.load(Ordering::SeqCst) > 0;
        }
        if !self.state.trap.load(Ordering::Relaxed) {
            return false;
        }
        if self.state.guards.load(Ordering::SeqCst) == 0 {
            self.state.trap.store(false, Ordering::SeqCst);
            return false;
        }
        if self.state.trap.swap(false, Ordering::SeqCst) {
            self.state.faulted.store(true, Ordering::SeqCst);
            self.state.fired.fetch_add(1, Ordering::SeqCst);
            tracing::error!("script exec timeout");
            return true;
        }
        false
    }
}

/// Dangling native reference check
#[derive(Debug, Clone, Copy)]
pub struct DanglingCheck {
    enabled: bool,
}

impl DanglingCheck {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Fail unless `object` is still alive.
    ///
    /// When enabled the error names the access, field and class.
    pub fn check(
        &self,
        system: &ObjectSystem,
        object: ObjectHandle,
        access: Access,
        field: &str,
        class: &str,
    ) -> Result<(), ScriptError> {
        if system.is_valid(object) {
            return Ok(());
        }
        if self.enabled {
            Err(ScriptError::Dangling { access, field: field.to_string(), class: class.to_string() })
        } else {
            Err(ReflectError::StaleObject(object).into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fos_reflect::ClassBuilder;

    #[test]
    fn test_disabled_watchdog() {
        let check = DeadLoopCheck::new(0, Duration::from_millis(10));
        assert!(!check.is_enabled());
        assert!(check.make_guard().is_none());
        thread::sleep(Duration::from_millis(50));
        assert!(!check.trap().poll());
    }

    #[test]
    fn test_fires_once() {
        let check = DeadLoopCheck::new(2, Duration::from_millis(10));
        let trap = check.trap();
        let guard = check.make_guard().unwrap();

        let start = Instant::now();
        while !trap.poll() {
            assert!(start.elapsed() < Duration::from_secs(2), "watchdog never fired");
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(check.fired_count(), 1);

        // Still inside the faulted scope
        thread::sleep(Duration::from_millis(60));
        assert!(trap.poll());
        assert_eq!(check.fired_count(), 1);

        drop(guard);
        assert!(!trap.poll());
        assert_eq!(check.fired_count(), 1);
    }

    #[test]
    fn test_nested_guards_share_scope() {
        let check = DeadLoopCheck::new(1000, Duration::from_millis(10));
        let outer = check.make_guard().unwrap();
        let inner = check.make_guard().unwrap();
        drop(inner);
        assert_eq!(check.state.guards.load(Ordering::SeqCst), 1);
        drop(outer);
        assert_eq!(check.state.guards.load(Ordering::SeqCst), 0);
        assert!(!check.state.pending.load(Ordering::SeqCst));
    }

    #[test]
    fn test_no_fire_without_guard() {
        let check = DeadLoopCheck::new(1, Duration::from_millis(5));
        thread::sleep(Duration::from_millis(50));
        assert!(!check.trap().poll());
        assert_eq!(check.fired_count(), 0);
    }

    #[test]
    fn test_dangling_check() {
        let system = ObjectSystem::new();
        let actor = system.define_class(ClassBuilder::new("Actor")).unwrap();
        let obj = system.new_object(actor, "").unwrap();
        let check = DanglingCheck::new(true);
        assert!(check.check(&system, obj, Access::Read, "Health", "Actor").is_ok());

        system.destroy_object(obj);
        let err = check.check(&system, obj, Access::Read, "Health", "Actor").unwrap_err();
        assert_eq!(err.to_string(), "attempt to read property 'Health' on released object (Actor)");

        let quiet = DanglingCheck::new(false);
        assert!(matches!(
            quiet.check(&system, obj, Access::Call, "Fire", "Actor"),
            Err(ScriptError::Reflect(ReflectError::StaleObject(_)))
        ));
    }

    #[test]
    fn test_each_scope_fires_once() {
        let check = DeadLoopCheck::new(1, Duration::from_millis(5));
        let trap = check.trap();
        for round in 1..=2u64 {
            let guard = check.make_guard().unwrap();
            let start = Instant::now();
            while !trap.poll() {
                assert!(start.elapsed() < Duration::from_secs(2), "watchdog never fired");
                thread::sleep(Duration::from_millis(1));
            }
            thread::sleep(Duration::from_millis(30));
            assert!(trap.poll());
            assert_eq!(check.fired_count(), round);
            drop(guard);
        }
    }
}
