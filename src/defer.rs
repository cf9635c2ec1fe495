//! Scoped cleanup guard.

/// Runs a closure when dropped, including on unwind.
pub struct Defer<F: FnOnce()> {
    func: Option<F>,
}

impl<F: FnOnce()> Defer<F> {
    /// Create a guard that runs `func` when it leaves scope.
    #[must_use]
    pub fn new(func: F) -> Self {
        Self { func: Some(func) }
    }
}

impl<F: FnOnce()> Drop for Defer<F> {
    fn drop(&mut self) {
        if let Some(func) = self.func.take() {
            func();
        }
    }
}

/// Convenience constructor for [`Defer`].
#[must_use]
pub fn defer<F: FnOnce()>(func: F) -> Defer<F> {
    Defer::new(func)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::panic;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_runs_on_scope_exit() {
        let ran = Cell::new(false);
        {
            let _guard = defer(|| ran.set(true));
            assert!(!ran.get());
        }
        assert!(ran.get());
    }

    #[test]
    fn test_runs_on_panic() {
        static RAN: AtomicBool = AtomicBool::new(false);

        let result = panic::catch_unwind(|| {
            let _guard = defer(|| RAN.store(true, Ordering::Relaxed));
            panic!("boom");
        });

        assert!(result.is_err());
        assert!(RAN.load(Ordering::Relaxed));
    }
}
