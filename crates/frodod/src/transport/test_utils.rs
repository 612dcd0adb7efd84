//! Test helpers for the transport module.

use std::io::Read;
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use super::{ConnectionHandler, ConnectionStream};

/// Counts connections and drains whatever the client sends.
pub(crate) struct CountingHandler {
    count: Arc<AtomicUsize>,
}

impl CountingHandler {
    pub(crate) fn new() -> (Arc<AtomicUsize>, Arc<Self>) {
        let count = Arc::new(AtomicUsize::new(0));
        let handler = Arc::new(Self {
            count: Arc::clone(&count),
        });
        (count, handler)
    }
}

impl ConnectionHandler for CountingHandler {
    fn handle(&self, mut stream: ConnectionStream) {
        self.count.fetch_add(1, Ordering::SeqCst);
        let mut sink = Vec::new();
        let _ = stream.read_to_end(&mut sink);
    }
}
