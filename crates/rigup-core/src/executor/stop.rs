use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cross-thread request to stop a run before its next step.
///
/// Clones share the same flag. A step that has already started always runs
/// to completion.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_flag() {
        let signal = StopSignal::new();
        let handle = signal.clone();
        assert!(!signal.is_raised());

        std::thread::spawn(move || handle.raise()).join().unwrap();
        assert!(signal.is_raised());
    }
}
