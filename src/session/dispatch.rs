//! Classification and serialized execution of resolved input.

use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::collab::DirectiveInput;
use crate::collab::DirectiveOutcome;
use crate::collab::ResolvedStatement;

use super::AfterCloseAction;
use super::SessionCore;
use super::lock;

impl SessionCore {
    /// Run one entered line to completion and report what the read loop
    /// should do next.
    ///
    /// The whole path holds the execution lock: neither the invalidator's
    /// cache swap nor another execution can interleave with it.
    pub(crate) async fn execute_line(&self, line: &str) -> AfterCloseAction {
        let _guard = self.execution_lock.enter().await;

        let line = line.trim();
        let Some(resolved) = self.resolve_input(line).await else {
            return self.after_close();
        };

        let cancel = self.cancel.install();
        if self.collab.directives.is_directive(&resolved.executable) {
            self.execute_directive(&resolved).await;
        } else {
            self.execute_statement(cancel, &resolved).await;
        }
        // invalidate the token whatever the outcome
        self.cancel.cancel_active();

        self.after_close()
    }

    async fn execute_directive(&self, resolved: &ResolvedStatement) {
        let validation = self.collab.directives.validate(&resolved.executable);
        if let Some(message) = validation.message {
            // shown even when validation goes on to fail
            self.collab.output.message(&[message]);
        }
        if let Some(validation_error) = validation.error {
            self.collab.output.show_error(&validation_error);
            return;
        }
        if !validation.should_run {
            return;
        }

        let input = {
            let view = lock(&self.view);
            DirectiveInput {
                text: resolved.executable.clone(),
                args: resolved.args.clone(),
                schema: view.schema.clone(),
                connections: view.connections.clone(),
                config: view.config.clone(),
            }
        };
        match self.collab.directives.execute(input).await {
            Ok(DirectiveOutcome::ExitSession) => {
                debug!("directive requested session exit");
                self.set_after_close(AfterCloseAction::Exit);
            }
            Ok(DirectiveOutcome::Continue) => {}
            Err(directive_error) => self.collab.output.show_error(&directive_error),
        }
    }

    async fn execute_statement(&self, cancel: CancellationToken, resolved: &ResolvedStatement) {
        let started = Instant::now();
        match self
            .collab
            .executor
            .run(cancel, &resolved.executable, &resolved.args)
            .await
        {
            Ok(result) => self.collab.output.stream_result(result),
            Err(execution_error) => {
                self.collab.output.show_error(&execution_error);
                if self.config().timing {
                    let elapsed = started.elapsed();
                    self.collab
                        .output
                        .message(&[format!("Time: {:.3}s (query failed)", elapsed.as_secs_f64())]);
                }
            }
        }
    }
}
