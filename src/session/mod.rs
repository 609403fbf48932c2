//! Session orchestration: the state machine and concurrency substrate
//! behind the interactive prompt.
//!
//! The controller composes four independently scheduled tasks: the read
//! loop, the one-shot initialization pipeline, the notification listener
//! and the interrupt handler. Its own top-level loop is a single
//! `select!` over the init channel and the read loop's terminal event.

use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::MutexGuard;

use tokio::sync::Mutex as TokioMutex;
use tokio::sync::MutexGuard as TokioMutexGuard;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing::trace;
use tracing::warn;

use crate::collab::Collaborators;
use crate::collab::LineEvent;
use crate::collab::LineSource;
use crate::collab::SchemaMetadata;
use crate::config::ShellConfig;
use crate::connections::ConnectionMap;
use crate::history::HistoryLog;
use crate::suggest::CompletionContext;
use crate::suggest::Suggestion;
use crate::suggest::SuggestionIndex;

mod cancel;
mod dispatch;
mod init;
mod input;
mod notify;

pub(crate) use cancel::CancelSlot;
pub(crate) use cancel::InterruptOutcome;
pub(crate) use init::InitResult;

/// Lifecycle of the session as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Starting,
    Running,
    Restarting,
    Closing,
}

/// What to do once the current read loop terminates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfterCloseAction {
    Exit,
    Restart,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InitPhase {
    Pending,
    Ready,
    Failed,
}

/// Terminal event of one read-loop run, delivered as a value rather than
/// through panic-based control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LoopExit {
    pub(crate) after_close: AfterCloseAction,
}

/// Std mutexes here guard tiny critical sections; a poisoned lock only
/// means a panicking test thread, so recover the inner value.
pub(crate) fn lock<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// The single critical section of the core. Guards statement/directive
/// execution and the invalidator's cached-state swap, so no execution
/// ever observes a half-updated view.
pub(crate) struct ExecutionLock(TokioMutex<()>);

impl ExecutionLock {
    fn new() -> Self {
        Self(TokioMutex::new(()))
    }

    pub(crate) async fn enter(&self) -> TokioMutexGuard<'_, ()> {
        self.0.lock().await
    }
}

/// Session-visible cached state. Swapped atomically (under the execution
/// lock for post-init swaps) and read through short std-mutex sections.
pub(crate) struct SessionView {
    pub(crate) config: ShellConfig,
    pub(crate) schema: SchemaMetadata,
    pub(crate) connections: ConnectionMap,
    pub(crate) suggestions: SuggestionIndex,
}

pub(crate) struct SessionCore {
    pub(crate) collab: Collaborators,
    pub(crate) view: StdMutex<SessionView>,
    pub(crate) execution_lock: ExecutionLock,
    /// Single-slot cancel handle for the in-flight operation.
    pub(crate) cancel: CancelSlot,
    pub(crate) history: StdMutex<HistoryLog>,
    /// Raw lines accumulated across a multi-line entry.
    pub(crate) buffer: StdMutex<Vec<String>>,
    state: StdMutex<SessionState>,
    after_close: StdMutex<AfterCloseAction>,
    /// Cancelling this token ends the current read-loop run.
    prompt_token: StdMutex<CancellationToken>,
    init_phase_tx: watch::Sender<InitPhase>,
    init_phase_rx: watch::Receiver<InitPhase>,
}

impl SessionCore {
    pub(crate) fn new(collab: Collaborators, config: ShellConfig) -> Self {
        let (init_phase_tx, init_phase_rx) = watch::channel(InitPhase::Pending);
        let history = HistoryLog::new(Arc::clone(&collab.history));
        Self {
            view: StdMutex::new(SessionView {
                config,
                schema: SchemaMetadata::default(),
                connections: ConnectionMap::default(),
                suggestions: SuggestionIndex::default(),
            }),
            execution_lock: ExecutionLock::new(),
            cancel: CancelSlot::default(),
            history: StdMutex::new(history),
            buffer: StdMutex::new(Vec::new()),
            state: StdMutex::new(SessionState::Starting),
            after_close: StdMutex::new(AfterCloseAction::Restart),
            prompt_token: StdMutex::new(CancellationToken::new()),
            init_phase_tx,
            init_phase_rx,
            collab,
        }
    }

    pub(crate) fn state(&self) -> SessionState {
        *lock(&self.state)
    }

    pub(crate) fn set_state(&self, state: SessionState) {
        *lock(&self.state) = state;
    }

    pub(crate) fn after_close(&self) -> AfterCloseAction {
        *lock(&self.after_close)
    }

    pub(crate) fn set_after_close(&self, action: AfterCloseAction) {
        *lock(&self.after_close) = action;
    }

    pub(crate) fn config(&self) -> ShellConfig {
        lock(&self.view).config.clone()
    }

    /// Install a fresh prompt context and mark the read loop armed. The
    /// default after-close action is to restart; an exit directive or a
    /// close request overwrites it.
    pub(crate) fn arm_prompt(&self) {
        *lock(&self.prompt_token) = CancellationToken::new();
        self.set_after_close(AfterCloseAction::Restart);
        self.set_state(SessionState::Running);
    }

    pub(crate) fn prompt_token(&self) -> CancellationToken {
        lock(&self.prompt_token).clone()
    }

    /// Cancel the running read loop, recording the action to take once it
    /// reports back. Idempotent.
    pub(crate) fn close_prompt(&self, action: AfterCloseAction) {
        self.set_after_close(action);
        lock(&self.prompt_token).cancel();
    }

    pub(crate) fn is_initialised(&self) -> bool {
        *self.init_phase_rx.borrow() == InitPhase::Ready
    }

    fn set_init_phase(&self, phase: InitPhase) {
        let _ = self.init_phase_tx.send(phase);
    }

    /// Suspend until initialization resolves, the waiting operation is
    /// cancelled, or the prompt is closed. Returns true only when the
    /// session is ready to execute.
    pub(crate) async fn wait_for_init(&self, cancel: &CancellationToken) -> bool {
        let prompt = self.prompt_token();
        let mut phase_rx = self.init_phase_rx.clone();
        loop {
            match *phase_rx.borrow_and_update() {
                InitPhase::Ready => return true,
                InitPhase::Failed => return false,
                InitPhase::Pending => {}
            }
            tokio::select! {
                _ = cancel.cancelled() => return false,
                _ = prompt.cancelled() => return false,
                changed = phase_rx.changed() => {
                    if changed.is_err() {
                        return false;
                    }
                }
            }
        }
    }

    /// Consume the init pipeline's result. `None` means the pipeline died
    /// without delivering, which is just as fatal as an explicit failure.
    pub(crate) async fn install_init_result(&self, result: Option<InitResult>) {
        match result {
            Some(InitResult::Ready {
                metadata,
                connections,
                warnings,
            }) => {
                for warning in &warnings {
                    warn!("connection warning: {warning}");
                }
                let suggestions = self.build_suggestions(&metadata);
                {
                    // pre-init there is no competing execution; the view
                    // mutex alone makes the install atomic for readers
                    let mut view = lock(&self.view);
                    view.schema = metadata;
                    view.connections = connections;
                    view.suggestions = suggestions;
                }
                self.set_init_phase(InitPhase::Ready);
                trace!("initialisation complete");
            }
            Some(InitResult::Failed(error)) => {
                self.collab.output.show_error(&error);
                self.set_init_phase(InitPhase::Failed);
                self.close_prompt(AfterCloseAction::Exit);
            }
            None => {
                self.collab
                    .output
                    .show_error(&crate::error::InitError::Aborted);
                self.set_init_phase(InitPhase::Failed);
                self.close_prompt(AfterCloseAction::Exit);
            }
        }
    }

    pub(crate) fn build_suggestions(&self, metadata: &SchemaMetadata) -> SuggestionIndex {
        SuggestionIndex::rebuild(
            self.collab.directives.suggestions(),
            &self.collab.resolver.named_query_names(),
            &metadata.table_names(),
        )
    }

    pub(crate) fn prompt_prefix(&self) -> String {
        if lock(&self.buffer).is_empty() {
            "> ".to_string()
        } else {
            ">>  ".to_string()
        }
    }

    pub(crate) fn complete(&self, line_before_cursor: &str, complete_on_empty: bool) -> Vec<Suggestion> {
        if !self.is_initialised() {
            return Vec::new();
        }
        let view = lock(&self.view);
        if !view.config.autocomplete {
            return Vec::new();
        }
        let word = line_before_cursor
            .rsplit(char::is_whitespace)
            .next()
            .unwrap_or("");
        view.suggestions.complete(
            CompletionContext {
                line: line_before_cursor,
                word_before_cursor: word,
                complete_on_empty,
            },
            self.collab.directives.as_ref(),
            self.collab.syntax.as_ref(),
        )
    }
}

/// The root aggregate: exactly one per process run.
pub struct InteractiveSession {
    core: Arc<SessionCore>,
    init_rx: tokio::sync::oneshot::Receiver<InitResult>,
}

impl InteractiveSession {
    /// Create the session and immediately start the initialization
    /// pipeline, so failures surface as early as possible. Must be called
    /// inside a tokio runtime.
    pub fn new(collab: Collaborators, config: ShellConfig) -> Self {
        let core = Arc::new(SessionCore::new(collab, config));
        let init_rx = init::spawn_init_pipeline(core.collab.clone());
        Self { core, init_rx }
    }

    /// A cloneable handle for the outer layer: completion requests, the
    /// prompt history, and interrupt/abandon hooks for line editors that
    /// intercept key events themselves.
    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            core: Arc::clone(&self.core),
        }
    }

    /// Drive the session to completion: arm the read loop, react to the
    /// init result, restart the loop after every executed unit, and run
    /// the guaranteed teardown sequence on exit.
    pub async fn run(self, mut lines: Box<dyn LineSource>) {
        let Self { core, init_rx } = self;
        let mut init_rx = init_rx;
        let mut init_consumed = false;

        let interrupt_quit = CancellationToken::new();
        let interrupt_task = cancel::spawn_interrupt_handler(Arc::clone(&core), interrupt_quit.clone());

        let listener_lifetime = CancellationToken::new();
        let listener_task = notify::spawn_notification_listener(Arc::clone(&core), listener_lifetime.clone());

        core.collab.output.message(&[
            "Welcome to the interactive query shell".to_string(),
            "Statements end with ';'. Directives run locally.".to_string(),
        ]);

        loop {
            core.arm_prompt();
            let mut read_task = spawn_read_loop(Arc::clone(&core), lines);

            let joined = loop {
                tokio::select! {
                    result = &mut init_rx, if !init_consumed => {
                        init_consumed = true;
                        core.install_init_result(result.ok()).await;
                    }
                    joined = &mut read_task => break joined,
                }
            };

            match joined {
                Ok((LoopExit { after_close }, returned_lines)) => {
                    lines = returned_lines;
                    match after_close {
                        AfterCloseAction::Restart => {
                            core.set_state(SessionState::Restarting);
                        }
                        AfterCloseAction::Exit => break,
                    }
                }
                Err(join_error) => {
                    error!("read loop task failed: {join_error}");
                    break;
                }
            }
        }

        core.set_state(SessionState::Closing);
        teardown(&core, interrupt_quit, interrupt_task, listener_lifetime, listener_task).await;
    }
}

/// Teardown order is part of the contract: stop cancellation (with one
/// final cancel for anything still in flight), persist history, stop the
/// listener, close the sink. No step is skipped on failure.
async fn teardown(
    core: &Arc<SessionCore>,
    interrupt_quit: CancellationToken,
    interrupt_task: JoinHandle<()>,
    listener_lifetime: CancellationToken,
    listener_task: JoinHandle<()>,
) {
    interrupt_quit.cancel();
    if let Err(join_error) = interrupt_task.await {
        warn!("interrupt handler did not stop cleanly: {join_error}");
    }
    core.cancel.cancel_active();

    if let Err(persist_error) = lock(&core.history).persist() {
        warn!("failed to persist history: {persist_error:#}");
    }

    listener_lifetime.cancel();
    if let Err(join_error) = listener_task.await {
        warn!("notification listener did not stop cleanly: {join_error}");
    }

    core.collab.output.close();
}

fn spawn_read_loop(
    core: Arc<SessionCore>,
    lines: Box<dyn LineSource>,
) -> JoinHandle<(LoopExit, Box<dyn LineSource>)> {
    tokio::spawn(run_read_loop(core, lines))
}

/// One read-loop run: accept a single line (or a close request) and hand
/// the line source back so the controller can relaunch the loop with a
/// fresh prompt.
async fn run_read_loop(
    core: Arc<SessionCore>,
    mut lines: Box<dyn LineSource>,
) -> (LoopExit, Box<dyn LineSource>) {
    let token = core.prompt_token();
    let prompt = core.prompt_prefix();

    let event = tokio::select! {
        _ = token.cancelled() => None,
        event = lines.next_line(&prompt) => Some(event),
    };

    let after_close = match event {
        None => core.after_close(),
        Some(Ok(LineEvent::Line(line))) => core.execute_line(&line).await,
        Some(Ok(LineEvent::Eof)) => AfterCloseAction::Exit,
        Some(Err(read_error)) => {
            error!("line input failed: {read_error:#}");
            AfterCloseAction::Exit
        }
    };
    (LoopExit { after_close }, lines)
}

/// Cloneable view of a running session for the surrounding terminal
/// layer.
#[derive(Clone)]
pub struct SessionHandle {
    core: Arc<SessionCore>,
}

impl SessionHandle {
    /// Completion candidates for the text before the cursor. Empty until
    /// initialization completes or when autocomplete is disabled.
    pub fn complete(&self, line_before_cursor: &str, complete_on_empty: bool) -> Vec<Suggestion> {
        self.core.complete(line_before_cursor, complete_on_empty)
    }

    /// History entries in submission order, for seeding the line editor.
    pub fn history(&self) -> Vec<String> {
        lock(&self.core.history).entries().to_vec()
    }

    /// The interrupt path for line editors that catch Ctrl-C themselves:
    /// before initialization this requests exit, afterwards it cancels
    /// the in-flight operation if there is one and is otherwise a no-op.
    pub fn interrupt(&self) {
        self.core.on_interrupt();
    }

    /// Drop a half-entered multi-line statement.
    pub fn abandon_buffer(&self) {
        self.core.clear_buffer();
    }

    /// Ask the session to close once the current read loop finishes.
    pub fn close(&self, action: AfterCloseAction) {
        self.core.close_prompt(action);
    }

    pub fn state(&self) -> SessionState {
        self.core.state()
    }
}
