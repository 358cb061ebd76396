//! Backend diagnostics
//!
//! Errors raised on the audio callback thread travel to the engine through a
//! lock-free SPSC ring buffer, so the callback never waits on the engine lock.
//! The engine drains them together with the backend's own polled errors and
//! hands everything to a [`DiagnosticSink`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ringbuf::{
    traits::{Consumer, Producer, Split},
    HeapRb,
};

use super::backend::BackendDiagnostic;

/// Receives backend diagnostics after each batch of backend calls
pub trait DiagnosticSink: Send + Sync {
    /// `operation` names the engine operation whose batch produced the error
    fn report(&self, operation: &'static str, diagnostic: &BackendDiagnostic);
}

/// Default sink, writes every diagnostic to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn report(&self, operation: &'static str, diagnostic: &BackendDiagnostic) {
        log::warn!("Audio backend error during {}: {}", operation, diagnostic);
    }
}

/// Producer half, owned by the audio callback
pub struct DiagnosticProducer {
    producer: ringbuf::HeapProd<BackendDiagnostic>,
    dropped: Arc<AtomicU64>,
}

impl DiagnosticProducer {
    /// Queue a diagnostic, counting it as dropped if the queue is full
    pub fn push(&mut self, diagnostic: BackendDiagnostic) {
        if self.producer.try_push(diagnostic).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Consumer half, owned by the backend on the engine side
pub struct DiagnosticConsumer {
    consumer: ringbuf::HeapCons<BackendDiagnostic>,
    dropped: Arc<AtomicU64>,
}

impl DiagnosticConsumer {
    pub fn pop(&mut self) -> Option<BackendDiagnostic> {
        self.consumer.try_pop()
    }

    /// Diagnostics lost because the queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Create a diagnostic queue holding up to `capacity` entries
pub fn queue(capacity: usize) -> (DiagnosticProducer, DiagnosticConsumer) {
    let rb = HeapRb::<BackendDiagnostic>::new(capacity.max(1));
    let (producer, consumer) = rb.split();
    let dropped = Arc::new(AtomicU64::new(0));

    (
        DiagnosticProducer {
            producer,
            dropped: Arc::clone(&dropped),
        },
        DiagnosticConsumer { consumer, dropped },
    )
}
