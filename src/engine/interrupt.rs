//! engine::interrupt
//!
//! Operator interrupt flag.
//!
//! Ctrl-C does not kill the process. It sets a shared flag that the
//! pipeline polls between steps and inside the rewrite and replay loops,
//! so every exit goes through the same cleanup path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::runtime::Handle;
use tracing::warn;

/// Shared interrupt flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct Interrupt(Arc<AtomicBool>);

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag.
    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Trigger the flag when the process receives Ctrl-C.
    pub fn listen(&self, runtime: &Handle) {
        let flag = self.clone();
        runtime.spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received; stopping after the current step");
                flag.trigger();
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_flag() {
        let interrupt = Interrupt::new();
        let observer = interrupt.clone();
        assert!(!observer.is_set());
        interrupt.trigger();
        assert!(observer.is_set());
    }
}
