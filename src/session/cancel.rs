//! Cancellation: the single-slot cancel handle and the OS interrupt
//! reaction registered for the session's lifetime.

use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::trace;
use tracing::warn;

use super::AfterCloseAction;
use super::SessionCore;
use super::lock;

/// Holder for the cancel handle of the in-flight operation.
///
/// At most one valid token exists at a time; cancelling with an empty
/// slot is always a safe no-op. The slot is single-writer: the task that
/// installs a token is the one that clears it.
#[derive(Default)]
pub(crate) struct CancelSlot {
    active: StdMutex<Option<CancellationToken>>,
}

impl CancelSlot {
    /// Create a token scoped to a new execution and make it the active
    /// one. A stale predecessor is cancelled rather than leaked.
    pub(crate) fn install(&self) -> CancellationToken {
        let token = CancellationToken::new();
        if let Some(stale) = lock(&self.active).replace(token.clone()) {
            stale.cancel();
        }
        token
    }

    /// Cancel and invalidate the active token. Returns whether there was
    /// one.
    pub(crate) fn cancel_active(&self) -> bool {
        match lock(&self.active).take() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InterruptOutcome {
    /// Initialization had not completed; the interrupt became an exit
    /// request.
    CloseRequested,
    /// An in-flight operation was asked to abort.
    Cancelled,
    /// Nothing to cancel; the session stays as it is.
    Idle,
}

impl SessionCore {
    /// React to one interrupt. Never closes an initialised session:
    /// repeated interrupts at an idle prompt have no effect.
    pub(crate) fn on_interrupt(&self) -> InterruptOutcome {
        if !self.is_initialised() {
            // nothing meaningful to cancel yet
            self.close_prompt(AfterCloseAction::Exit);
            InterruptOutcome::CloseRequested
        } else if self.cancel.cancel_active() {
            InterruptOutcome::Cancelled
        } else {
            InterruptOutcome::Idle
        }
    }
}

/// Register the process-wide interrupt reaction. The task runs until the
/// session tears down (`quit`), performing one final cancel on the way
/// out, or until a pre-init interrupt turns into an exit request.
pub(crate) fn spawn_interrupt_handler(
    core: Arc<SessionCore>,
    quit: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = quit.cancelled() => {
                    // covers an operation still in flight at shutdown
                    core.cancel.cancel_active();
                    trace!("interrupt handler exiting");
                    return;
                }
                signal = tokio::signal::ctrl_c() => {
                    if let Err(signal_error) = signal {
                        warn!("failed to listen for interrupt: {signal_error}");
                        return;
                    }
                    trace!("interrupt received");
                    if core.on_interrupt() == InterruptOutcome::CloseRequested {
                        return;
                    }
                }
            }
        }
    })
}
