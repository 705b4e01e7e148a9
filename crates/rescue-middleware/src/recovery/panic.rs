//! Panic-site backtraces.
//!
//! By the time `catch_unwind` returns, the panicking frames are gone. A panic
//! hook records the backtrace at the panic site in a thread-local slot; the
//! recovery boundary takes it right after unwinding, on the same thread.
//!
//! Panics carrying an [`ErrorValue`] are deliberate aborts and are not traced.
//! Panics raised while the boundary polls its chain are left to the recovery
//! sink, so the previous hook does not report them a second time.

use rescue_core::ErrorValue;
use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::sync::Once;

thread_local! {
    static PANIC_BACKTRACE: RefCell<Option<Backtrace>> = const { RefCell::new(None) };
    static GUARD_DEPTH: Cell<usize> = const { Cell::new(0) };
}

static HOOK: Once = Once::new();

/// Installs the backtrace-recording hook, chained in front of the hook that
/// was active before. Idempotent.
pub(crate) fn install_backtrace_hook() {
    HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            if !info.payload().is::<ErrorValue>() {
                record_backtrace();
            }
            if !inside_guard() {
                previous(info);
            }
        }));
        tracing::debug!("Installed panic backtrace hook");
    });
}

fn record_backtrace() {
    let _ = PANIC_BACKTRACE.try_with(|slot| {
        if let Ok(mut slot) = slot.try_borrow_mut() {
            *slot = Some(Backtrace::force_capture());
        }
    });
}

fn inside_guard() -> bool {
    GUARD_DEPTH.try_with(Cell::get).unwrap_or(0) > 0
}

/// Marks the current thread as polling a recovery boundary until dropped.
pub(crate) struct GuardScope(());

impl GuardScope {
    pub(crate) fn enter() -> Self {
        let _ = GUARD_DEPTH.try_with(|depth| depth.set(depth.get() + 1));
        Self(())
    }
}

impl Drop for GuardScope {
    fn drop(&mut self) {
        let _ = GUARD_DEPTH.try_with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

/// Takes the backtrace recorded by the most recent panic on this thread.
pub(crate) fn take_panic_backtrace() -> Option<Backtrace> {
    PANIC_BACKTRACE
        .try_with(|slot| slot.try_borrow_mut().ok().and_then(|mut slot| slot.take()))
        .ok()
        .flatten()
}

/// Describes a panic payload.
pub(crate) fn describe_payload(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "Box<dyn Any>".to_string()
    }
}
