//! JSONL framing of server messages.

use std::io::{self, Write};

use frodo_protocol::{CommandId, Completion, ServerMessage};
use thiserror::Error;

/// Failure to deliver a message to the client.
#[derive(Debug, Error)]
pub enum ResponseError {
    /// Writing or flushing the stream failed.
    #[error("failed to write response: {0}")]
    Io(#[from] io::Error),
    /// Serialising the message failed.
    #[error("failed to serialise response: {0}")]
    Serialise(#[from] serde_json::Error),
}

/// Writes one JSON object per line.
///
/// Acknowledgements are flushed straight away so that a keep-alive reaches
/// the client while the command is still blocked.
#[derive(Debug)]
pub struct ResponseWriter<W> {
    writer: W,
}

impl<W: Write> ResponseWriter<W> {
    /// Wraps an output stream.
    pub const fn new(writer: W) -> Self {
        Self { writer }
    }

    fn write_message(&mut self, message: &ServerMessage) -> Result<(), ResponseError> {
        serde_json::to_writer(&mut self.writer, message)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }

    /// Sends an acknowledgement carrying a time-to-complete estimate.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream is closed.
    pub fn write_acknowledgement(
        &mut self,
        id: &CommandId,
        time_to_complete_ms: u64,
    ) -> Result<(), ResponseError> {
        self.write_message(&ServerMessage::acknowledgement(id.clone(), time_to_complete_ms))
    }

    /// Sends the completion.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream is closed.
    pub fn write_completion(&mut self, completion: Completion) -> Result<(), ResponseError> {
        self.write_message(&ServerMessage::Completion(completion))
    }
}
