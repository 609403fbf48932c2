//! Input resolution: buffer raw lines until they form an executable unit.

use tracing::trace;

use crate::collab::ResolvedStatement;

use super::SessionCore;
use super::lock;

pub(crate) const STATEMENT_TERMINATOR: &str = ";";

impl SessionCore {
    /// Turn a raw line into an executable unit, or nothing if the entry
    /// is still accumulating, failed to resolve, or was discarded.
    ///
    /// History is recorded here: the raw line for a resolution failure or
    /// a single-line entry, the full resolved text for a multi-line one,
    /// and nothing at all for continuation lines and bare terminators.
    pub(crate) async fn resolve_input(&self, line: &str) -> Option<ResolvedStatement> {
        if line.is_empty() {
            return None;
        }

        let mut history_entry = Some(line.to_string());
        let resolved = self.resolve_input_inner(line, &mut history_entry).await;
        if let Some(entry) = history_entry {
            lock(&self.history).push(&entry);
        }
        resolved
    }

    async fn resolve_input_inner(
        &self,
        line: &str,
        history_entry: &mut Option<String>,
    ) -> Option<ResolvedStatement> {
        if !self.is_initialised() {
            // the token exists purely so an interrupt can abort the wait
            let wait_cancel = self.cancel.install();
            let ready = self.wait_for_init(&wait_cancel).await;
            self.cancel.cancel_active();
            if !ready {
                // the init owner has already shown the failure
                *history_entry = None;
                self.clear_buffer();
                return None;
            }
        }

        lock(&self.buffer).push(line.to_string());
        let joined = lock(&self.buffer).join("\n");

        let resolved = match self.collab.resolver.resolve(&joined).await {
            Ok(resolved) => resolved,
            Err(resolution_error) => {
                // keep the bad entry in history, but drop the buffer
                self.clear_buffer();
                self.collab.output.show_error(&resolution_error);
                return None;
            }
        };

        if !self.should_execute(&joined, resolved.is_named) {
            // still buffering: no history for pure continuation lines
            *history_entry = None;
            return None;
        }

        self.clear_buffer();

        if resolved.executable.trim() == STATEMENT_TERMINATOR {
            // a bare terminator is discarded silently
            *history_entry = None;
            trace!("discarding bare terminator");
            return None;
        }

        if !resolved.is_named && resolved.executable.lines().count() > 1 {
            // history captures the whole statement, not the last raw line
            *history_entry = Some(resolved.executable.clone());
        }

        Some(resolved)
    }

    /// Execute now, or keep buffering? Directives and named references
    /// run immediately; otherwise multi-line mode holds the entry until
    /// the terminator arrives.
    fn should_execute(&self, joined: &str, is_named: bool) -> bool {
        if is_named {
            return true;
        }
        if !self.config().multiline {
            return true;
        }
        if self.collab.directives.is_directive(joined) {
            return true;
        }
        joined.ends_with(STATEMENT_TERMINATOR)
    }

    pub(crate) fn clear_buffer(&self) {
        lock(&self.buffer).clear();
    }
}
