//! Cooperative cancellation.
//!
//! A [`StopFlag`] is shared between a caller and the long-running media
//! operations it drives. The flag is checked between progress ticks; on
//! stop, the external process is terminated and the operation reports an
//! interruption instead of a normal completion.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Externally observable stop signal, cheap to clone across workers.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of all operations observing this flag.
    pub fn request_stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
