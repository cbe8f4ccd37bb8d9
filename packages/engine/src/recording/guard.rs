// packages/engine/src/recording/guard.rs
//! Per-thread reentrancy guard
//!
//! While set, every recording entry point on the thread returns its input
//! untouched. Serialization runs arbitrary user code (`Serialize` impls,
//! `Display` of errors) that may itself be instrumented.

use std::cell::Cell;
use std::marker::PhantomData;

thread_local! {
    static ACTIVE: Cell<bool> = const { Cell::new(false) };
}

/// True while the calling thread is inside engine bookkeeping
pub fn is_active() -> bool {
    ACTIVE.with(|active| active.get())
}

/// Set the guard until the returned value is dropped
pub fn enter() -> SuppressGuard {
    let previous = ACTIVE.with(|active| active.replace(true));
    SuppressGuard {
        previous,
        _not_send: PhantomData,
    }
}

/// Restores the previous guard state on drop, including during unwinding
#[must_use = "recording is suppressed only while the guard is alive"]
pub struct SuppressGuard {
    previous: bool,
    _not_send: PhantomData<*const ()>,
}

impl Drop for SuppressGuard {
    fn drop(&mut self) {
        let previous = self.previous;
        ACTIVE.with(|active| active.set(previous));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_guards_restore() {
        assert!(!is_active());
        {
            let _outer = enter();
            assert!(is_active());
            {
                let _inner = enter();
                assert!(is_active());
            }
            assert!(is_active());
        }
        assert!(!is_active());
    }

    #[test]
    fn test_guard_is_thread_local() {
        let _guard = enter();
        let other = std::thread::spawn(is_active).join().unwrap();
        assert!(!other);
        assert!(is_active());
    }

    #[test]
    fn test_restored_after_panic() {
        let result = std::panic::catch_unwind(|| {
            let _guard = enter();
            panic!("serializer blew up");
        });
        assert!(result.is_err());
        assert!(!is_active());
    }
}
