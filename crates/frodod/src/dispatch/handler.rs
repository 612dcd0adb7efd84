//! Connection handler that serves one command per connection.
//!
//! The handler reads a single JSONL request line and hands it to a
//! [`ConnectionWorker`], which streams acknowledgements and the completion
//! back on the same stream before the connection closes.

use std::io::{self, Read};
use std::sync::Arc;

use frodo_protocol::CommandId;
use tracing::debug;

use crate::context::ServerContext;
use crate::transport::{ConnectionHandler, ConnectionStream};

use super::DISPATCH_TARGET;
use super::errors::ProtocolError;
use super::ConnectionWorker;

/// Maximum size of a single request line in bytes.
pub(crate) const MAX_REQUEST_BYTES: usize = 64 * 1024;

/// Connection handler that runs commands against the shared context.
#[derive(Debug)]
pub struct DispatchConnectionHandler {
    context: Arc<ServerContext>,
}

impl DispatchConnectionHandler {
    /// Creates a handler serving commands against `context`.
    #[must_use]
    pub const fn new(context: Arc<ServerContext>) -> Self {
        Self { context }
    }

    fn dispatch(&self, mut stream: ConnectionStream) {
        let worker = ConnectionWorker::new(&self.context);
        match read_request_line(&mut stream) {
            Ok(Some(line)) => worker.serve(&line, &mut stream),
            Ok(None) => {
                debug!(target: DISPATCH_TARGET, "client disconnected without request");
            }
            Err(error) => worker.reject(CommandId::default(), &error, &mut stream),
        }
    }
}

impl ConnectionHandler for DispatchConnectionHandler {
    fn handle(&self, stream: ConnectionStream) {
        self.dispatch(stream);
    }
}

/// Reads a bounded JSONL request line from the stream.
///
/// Returns `Ok(None)` if the client disconnects without sending data and
/// `Ok(Some(bytes))` when a complete line (or EOF with partial data) arrives.
fn read_request_line<R: Read>(stream: &mut R) -> Result<Option<Vec<u8>>, ProtocolError> {
    let mut buffer = Vec::new();
    let mut chunk = [0_u8; 1024];

    loop {
        let bytes_read = read_with_retry(stream, &mut chunk).map_err(ProtocolError::Read)?;
        let Some(received) = chunk.get(..bytes_read) else {
            return Err(ProtocolError::Read(io::Error::other("read past buffer end")));
        };

        if received.is_empty() {
            return Ok((!buffer.is_empty()).then_some(buffer));
        }

        if let Some(newline_pos) = received.iter().position(|byte| *byte == b'\n') {
            buffer.extend_from_slice(received.get(..=newline_pos).unwrap_or(received));
            enforce_limit(buffer.len())?;
            return Ok(Some(buffer));
        }

        buffer.extend_from_slice(received);
        enforce_limit(buffer.len())?;
    }
}

fn read_with_retry<R: Read>(stream: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        match stream.read(buf) {
            Ok(n) => return Ok(n),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
}

const fn enforce_limit(size: usize) -> Result<(), ProtocolError> {
    if size > MAX_REQUEST_BYTES {
        return Err(ProtocolError::RequestTooLarge {
            size,
            max_size: MAX_REQUEST_BYTES,
        });
    }
    Ok(())
}
