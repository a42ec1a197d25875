use std::sync::{Arc, Mutex, Weak};
use std::thread::available_parallelism;

use tracing::debug;

/// Upper bound on I/O threads the shared context advertises.
const MAX_IO_THREADS: usize = 4;

static SHARED: Mutex<Weak<TransportContext>> = Mutex::new(Weak::new());

/// Process-wide shared transport context.
///
/// Every connection holds an `Arc` to the context; the first connection
/// created brings it up, the last one dropped tears it down. Above the
/// socket layer the context is purely diagnostic — it records how many I/O
/// threads the transport may use, capped by available parallelism.
#[derive(Debug)]
pub struct TransportContext {
    io_threads: usize,
}

impl TransportContext {
    /// Get a handle to the shared context, creating it if no connection
    /// currently holds one.
    pub fn shared() -> Arc<TransportContext> {
        let mut slot = SHARED.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(ctx) = slot.upgrade() {
            return ctx;
        }
        let io_threads = available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            .min(MAX_IO_THREADS);
        debug!(io_threads, "creating shared transport context");
        let ctx = Arc::new(TransportContext { io_threads });
        *slot = Arc::downgrade(&ctx);
        ctx
    }

    /// Number of I/O threads the transport layer may use.
    pub fn io_threads(&self) -> usize {
        self.io_threads
    }
}

impl Drop for TransportContext {
    fn drop(&mut self) {
        debug!("tearing down shared transport context");
    }
}
