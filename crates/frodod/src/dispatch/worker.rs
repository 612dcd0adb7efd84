//! Runs one command on one connection from request line to completion.

use std::io::Write;

use frodo_protocol::{CommandEnvelope, CommandId, Completion};
use tracing::{info, warn};

use crate::arms::WorkerRef;
use crate::context::ServerContext;
use crate::priority;

use super::DISPATCH_TARGET;
use super::errors::ProtocolError;
use super::registry::{self, CommandClass};
use super::response::ResponseWriter;
use super::session::{Execution, ProtocolSession};

/// Drives one command through the protocol.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ConnectionWorker<'c> {
    context: &'c ServerContext,
}

impl<'c> ConnectionWorker<'c> {
    pub(crate) const fn new(context: &'c ServerContext) -> Self {
        Self { context }
    }

    /// Serves a request line, writing every response to `output`.
    pub(crate) fn serve<W: Write>(&self, line: &[u8], output: W) {
        let envelope = match CommandEnvelope::parse(line) {
            Ok(envelope) => envelope,
            Err(error) => {
                self.reject(CommandId::default(), &ProtocolError::from(error), output);
                return;
            }
        };

        let entry = registry::lookup(envelope.type_tag());
        let command = match entry.decode(&envelope) {
            Ok(command) => command,
            Err(error) => {
                self.reject(envelope.id, &error, output);
                return;
            }
        };
        info!(
            target: DISPATCH_TARGET,
            command = %command.id,
            kind = %command.kind(),
            arm = ?command.arm,
            "command received"
        );

        if entry.class == CommandClass::Interrupt {
            priority::elevate_current_thread();
        }

        // Own the arms from receipt so an abort served while the estimate is
        // computed still lands on this command.
        let registration = (entry.abortable && !command.arm.is_none()).then(|| {
            self.context.arms().register(
                command.arm.arms(),
                WorkerRef::new(command.id.clone(), command.kind()),
            )
        });

        let mut session = ProtocolSession::new(command.id.clone(), ResponseWriter::new(output));
        let estimate = (entry.estimate)(self.context, &command);
        if let Err(error) = session.send_acknowledgement(estimate) {
            warn!(
                target: DISPATCH_TARGET,
                command = %command.id,
                %error,
                "client gone before acknowledgement; abandoning command"
            );
            return;
        }

        let mut execution = Execution::new(&mut session, registration.as_ref());
        let outcome = (entry.execute)(self.context, &command, &mut execution);
        let termination = execution.into_termination();
        drop(registration);

        let base = self.context.config().error_code_base();
        let completion = match outcome {
            Ok(result) => {
                info!(target: DISPATCH_TARGET, command = %command.id, "command succeeded");
                let completion = Completion::success(command.id.clone(), None);
                match result {
                    Some(result) => completion.with_result(result),
                    None => completion,
                }
            }
            Err(failure) => {
                let code = failure.error_code(base, entry.family);
                if failure.is_aborted() {
                    info!(target: DISPATCH_TARGET, command = %command.id, code, "command aborted");
                } else {
                    warn!(
                        target: DISPATCH_TARGET,
                        command = %command.id,
                        code,
                        error = %failure,
                        "command failed"
                    );
                }
                Completion::failure(command.id.clone(), code, failure.to_string())
            }
        };
        if let Err(error) = session.complete(completion) {
            warn!(
                target: DISPATCH_TARGET,
                command = %command.id,
                %error,
                "failed to deliver completion"
            );
        }
        if let Some(trigger) = termination {
            trigger.release();
        }
    }

    /// Completes a request that never reached a command with `base + 400`.
    pub(crate) fn reject<W: Write>(&self, id: CommandId, error: &ProtocolError, output: W) {
        let code = error.error_code(self.context.config().error_code_base());
        warn!(target: DISPATCH_TARGET, command = %id, code, %error, "request rejected");
        let session = ProtocolSession::new(id.clone(), ResponseWriter::new(output));
        if let Err(write_error) = session.complete(Completion::failure(id, code, error.to_string())) {
            warn!(target: DISPATCH_TARGET, error = %write_error, "failed to deliver rejection");
        }
    }
}

#[cfg(test)]
mod tests {
    use frodo_protocol::{Arm, ServerMessage};
    use rstest::rstest;

    use super::*;
    use crate::tests::support::{TestBench, test_collaborators};

    fn serve(bench: &TestBench, line: &str) -> Vec<ServerMessage> {
        let mut output = Vec::new();
        ConnectionWorker::new(&bench.context).serve(line.as_bytes(), &mut output);
        String::from_utf8(output)
            .expect("utf8")
            .lines()
            .map(|line| serde_json::from_str(line).expect("server message"))
            .collect()
    }

    fn single_completion(messages: &[ServerMessage]) -> &Completion {
        let completions: Vec<_> = messages
            .iter()
            .filter_map(|message| match message {
                ServerMessage::Completion(completion) => Some(completion),
                ServerMessage::Acknowledgement { .. } => None,
            })
            .collect();
        assert_eq!(completions.len(), 1, "exactly one completion");
        assert!(
            messages.last().is_some_and(ServerMessage::is_completion),
            "completion is last"
        );
        completions.first().copied().expect("completion")
    }

    #[rstest]
    #[case::not_json("hello")]
    #[case::blank("   ")]
    #[case::unknown_type(r#"{"id":"c-1","command":{"type":"focus"}}"#)]
    #[case::missing_type(r#"{"id":"c-1","command":{}}"#)]
    #[case::mismatched_body(r#"{"id":"c-1","arm":"red","command":{"type":"dark"}}"#)]
    fn undecodable_requests_get_one_unknown_completion(#[case] line: &str) {
        let bench = test_collaborators().into_bench();
        let messages = serve(&bench, line);
        assert_eq!(messages.len(), 1);
        let completion = single_completion(&messages);
        assert!(!completion.successful);
        assert_eq!(completion.error_code, 100_400);
        assert!(bench.hardware.calls().is_empty());
    }

    #[test]
    fn bias_acknowledges_then_completes() {
        let bench = test_collaborators().into_bench();
        let messages = serve(&bench, r#"{"id":"b-1","arm":"red","command":{"type":"bias"}}"#);
        assert!(matches!(
            messages.first(),
            Some(ServerMessage::Acknowledgement { .. })
        ));
        let completion = single_completion(&messages);
        assert!(completion.successful, "{completion:?}");
        assert!(bench.context.arms().owner(Arm::Red).is_none());
    }

    #[test]
    fn arm_specific_command_without_arm_is_invalid() {
        let bench = test_collaborators().into_bench();
        let messages = serve(&bench, r#"{"id":"b-2","command":{"type":"bias"}}"#);
        let completion = single_completion(&messages);
        assert_eq!(completion.error_code, 100_705);
    }

    #[test]
    fn status_reports_both_arms() {
        let bench = test_collaborators().into_bench();
        let messages = serve(&bench, r#"{"id":"s-1","command":{"type":"status"}}"#);
        let completion = single_completion(&messages);
        assert!(completion.successful);
        assert!(completion.result.is_some());
    }
}
