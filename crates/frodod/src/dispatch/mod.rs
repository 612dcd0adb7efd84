//! JSONL command dispatch.
//!
//! Each connection carries one command. The client sends a single request
//! line:
//!
//! ```json
//! {"id":"c-17","arm":"red","command":{"type":"arc","lamp":"Xe","exposure_ms":5000}}
//! ```
//!
//! The daemon answers with one or more acknowledgements, each extending the
//! client's timeout, followed by exactly one completion:
//!
//! ```json
//! {"kind":"acknowledgement","id":"c-17","time_to_complete_ms":17000}
//! {"kind":"completion","id":"c-17","successful":true,"error_code":0,"error_message":""}
//! ```
//!
//! Requests whose type is unknown or whose body does not match its type are
//! completed straight away with the unknown-command code.

mod commands;
mod errors;
mod handler;
mod registry;
mod response;
mod session;
mod worker;

pub use self::errors::{AbortStep, CommandFailure, ErrorFamily, ProtocolError};
pub use self::handler::DispatchConnectionHandler;
pub use self::response::{ResponseError, ResponseWriter};
pub use self::session::{
    Execution, ExecutionPhase, ProgressSink, ProtocolSession, ProtocolState,
};
pub(crate) use self::worker::ConnectionWorker;

/// Tracing target for dispatch operations.
pub(crate) const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");
