//! End-to-end session lifecycle tests against the public API.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

use querysh::AfterCloseAction;
use querysh::Collaborators;
use querysh::ConfigLoad;
use querysh::ConfigLoader;
use querysh::ConnectionResolution;
use querysh::ConnectionResolver;
use querysh::DirectiveError;
use querysh::DirectiveInput;
use querysh::DirectiveOutcome;
use querysh::DirectiveRegistry;
use querysh::DirectiveValidation;
use querysh::ExecutionError;
use querysh::HistoryStore;
use querysh::InteractiveSession;
use querysh::LineEvent;
use querysh::LineSource;
use querysh::NotificationSource;
use querysh::NotificationStream;
use querysh::OutputSink;
use querysh::QueryResolver;
use querysh::ResolutionError;
use querysh::ResolvedStatement;
use querysh::ResultSet;
use querysh::SchemaMetadata;
use querysh::SchemaProvider;
use querysh::SessionState;
use querysh::ShellConfig;
use querysh::StatementExecutor;
use querysh::Suggestion;
use querysh::SyntaxInspector;

struct PassthroughResolver;

#[async_trait]
impl QueryResolver for PassthroughResolver {
    async fn resolve(&self, text: &str) -> Result<ResolvedStatement, ResolutionError> {
        Ok(ResolvedStatement {
            executable: text.to_string(),
            args: Vec::new(),
            is_named: false,
        })
    }

    fn named_query_names(&self) -> Vec<String> {
        Vec::new()
    }
}

#[derive(Default)]
struct CountingExecutor {
    calls: AtomicUsize,
}

#[async_trait]
impl StatementExecutor for CountingExecutor {
    async fn run(
        &self,
        _cancel: CancellationToken,
        _executable: &str,
        _args: &[String],
    ) -> Result<ResultSet, ExecutionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ResultSet::default())
    }
}

struct InstantSchema;

#[async_trait]
impl SchemaProvider for InstantSchema {
    async fn foreign_schema_names(&self) -> anyhow::Result<Vec<String>> {
        Ok(vec!["main".to_string()])
    }

    async fn metadata(&self) -> anyhow::Result<SchemaMetadata> {
        Ok(SchemaMetadata::default())
    }
}

/// Initialization that never resolves, for exercising the pre-init
/// interrupt path.
struct StalledSchema;

#[async_trait]
impl SchemaProvider for StalledSchema {
    async fn foreign_schema_names(&self) -> anyhow::Result<Vec<String>> {
        std::future::pending::<()>().await;
        unreachable!()
    }

    async fn metadata(&self) -> anyhow::Result<SchemaMetadata> {
        std::future::pending::<()>().await;
        unreachable!()
    }
}

struct NoConnections;

#[async_trait]
impl ConnectionResolver for NoConnections {
    async fn resolve(&self, _known_names: &[String]) -> anyhow::Result<ConnectionResolution> {
        Ok(ConnectionResolution::default())
    }
}

struct DefaultConfigLoader;

#[async_trait]
impl ConfigLoader for DefaultConfigLoader {
    async fn load(&self, _path: &str, _purpose: &str) -> anyhow::Result<ConfigLoad> {
        Ok(ConfigLoad::default())
    }
}

struct SilentNotifications;

struct SilentStream;

#[async_trait]
impl NotificationStream for SilentStream {
    async fn next_payload(&mut self) -> anyhow::Result<Option<String>> {
        std::future::pending::<()>().await;
        Ok(None)
    }
}

#[async_trait]
impl NotificationSource for SilentNotifications {
    async fn subscribe(&self, _channel: &str) -> anyhow::Result<Box<dyn NotificationStream>> {
        Ok(Box::new(SilentStream))
    }
}

struct ExitOnlyDirectives;

#[async_trait]
impl DirectiveRegistry for ExitOnlyDirectives {
    fn is_directive(&self, text: &str) -> bool {
        text.starts_with('.')
    }

    fn validate(&self, _text: &str) -> DirectiveValidation {
        DirectiveValidation::run()
    }

    async fn execute(&self, input: DirectiveInput) -> Result<DirectiveOutcome, DirectiveError> {
        if input.text == ".exit" {
            Ok(DirectiveOutcome::ExitSession)
        } else {
            Ok(DirectiveOutcome::Continue)
        }
    }

    fn suggestions(&self) -> Vec<Suggestion> {
        vec![Suggestion::new(".exit", "directive")]
    }

    fn complete(&self, _text: &str, _tables: &[Suggestion]) -> Vec<Suggestion> {
        Vec::new()
    }
}

#[derive(Default)]
struct CountingSink {
    results: AtomicUsize,
    errors: AtomicUsize,
    closed: AtomicUsize,
}

impl OutputSink for CountingSink {
    fn stream_result(&self, _result: ResultSet) {
        self.results.fetch_add(1, Ordering::SeqCst);
    }

    fn show_error(&self, _error: &dyn std::error::Error) {
        self.errors.fetch_add(1, Ordering::SeqCst);
    }

    fn message(&self, _lines: &[String]) {}

    fn close(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct MemHistory {
    saved: Mutex<Vec<String>>,
}

impl HistoryStore for MemHistory {
    fn load(&self) -> Vec<String> {
        Vec::new()
    }

    fn persist(&self, entries: &[String]) -> anyhow::Result<()> {
        *self.saved.lock().expect("history lock") = entries.to_vec();
        Ok(())
    }
}

struct NoTables;

impl SyntaxInspector for NoTables {
    fn expects_table(&self, _text: &str) -> bool {
        false
    }
}

/// Plays back a fixed script, then reports end of input.
struct ScriptedLines {
    script: VecDeque<String>,
}

impl ScriptedLines {
    fn new(lines: &[&str]) -> Box<Self> {
        Box::new(Self {
            script: lines.iter().map(|line| line.to_string()).collect(),
        })
    }
}

#[async_trait]
impl LineSource for ScriptedLines {
    async fn next_line(&mut self, _prompt: &str) -> anyhow::Result<LineEvent> {
        match self.script.pop_front() {
            Some(line) => Ok(LineEvent::Line(line)),
            None => Ok(LineEvent::Eof),
        }
    }
}

/// Never yields a line; the session has to be closed some other way.
struct SilentLines;

#[async_trait]
impl LineSource for SilentLines {
    async fn next_line(&mut self, _prompt: &str) -> anyhow::Result<LineEvent> {
        std::future::pending::<()>().await;
        unreachable!()
    }
}

struct Fixture {
    executor: Arc<CountingExecutor>,
    sink: Arc<CountingSink>,
    history: Arc<MemHistory>,
    session: InteractiveSession,
}

fn session_with(schema: Arc<dyn SchemaProvider>) -> Fixture {
    let executor = Arc::new(CountingExecutor::default());
    let sink = Arc::new(CountingSink::default());
    let history = Arc::new(MemHistory::default());
    let collab = Collaborators {
        resolver: Arc::new(PassthroughResolver),
        executor: Arc::clone(&executor) as Arc<dyn StatementExecutor>,
        schema,
        connections: Arc::new(NoConnections),
        config_loader: Arc::new(DefaultConfigLoader),
        notifications: Arc::new(SilentNotifications),
        directives: Arc::new(ExitOnlyDirectives),
        output: Arc::clone(&sink) as Arc<dyn OutputSink>,
        history: Arc::clone(&history) as Arc<dyn HistoryStore>,
        syntax: Arc::new(NoTables),
    };
    let session = InteractiveSession::new(collab, ShellConfig::default());
    Fixture {
        executor,
        sink,
        history,
        session,
    }
}

#[tokio::test]
async fn scripted_session_executes_and_tears_down() {
    let fixture = session_with(Arc::new(InstantSchema));
    let handle = fixture.session.handle();

    fixture
        .session
        .run(ScriptedLines::new(&["select 1;", ".exit"]))
        .await;

    assert_eq!(fixture.executor.calls.load(Ordering::SeqCst), 1);
    assert_eq!(fixture.sink.results.load(Ordering::SeqCst), 1);
    assert_eq!(fixture.sink.errors.load(Ordering::SeqCst), 0);
    assert_eq!(fixture.sink.closed.load(Ordering::SeqCst), 1);
    assert_eq!(handle.state(), SessionState::Closing);
    assert_eq!(
        *fixture.history.saved.lock().expect("history lock"),
        vec!["select 1;".to_string(), ".exit".to_string()]
    );
}

#[tokio::test]
async fn end_of_input_closes_the_session() {
    let fixture = session_with(Arc::new(InstantSchema));
    let handle = fixture.session.handle();

    fixture.session.run(ScriptedLines::new(&["select 1;"])).await;

    assert_eq!(fixture.executor.calls.load(Ordering::SeqCst), 1);
    assert_eq!(fixture.sink.closed.load(Ordering::SeqCst), 1);
    assert_eq!(handle.state(), SessionState::Closing);
}

#[tokio::test]
async fn close_request_ends_a_quiet_session() {
    let fixture = session_with(Arc::new(InstantSchema));
    let handle = fixture.session.handle();

    let run = tokio::spawn(fixture.session.run(Box::new(SilentLines)));
    tokio::time::sleep(Duration::from_millis(50)).await;
    handle.close(AfterCloseAction::Exit);

    tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("session should close promptly")
        .expect("run task join");

    assert_eq!(fixture.executor.calls.load(Ordering::SeqCst), 0);
    assert_eq!(fixture.sink.closed.load(Ordering::SeqCst), 1);
    assert_eq!(handle.state(), SessionState::Closing);
}

#[tokio::test]
async fn interrupt_during_stalled_init_exits_cleanly() {
    let fixture = session_with(Arc::new(StalledSchema));
    let handle = fixture.session.handle();

    let run = tokio::spawn(fixture.session.run(Box::new(SilentLines)));
    tokio::time::sleep(Duration::from_millis(50)).await;

    // repeated interrupts must stay safe
    handle.interrupt();
    handle.interrupt();

    tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("session should close promptly")
        .expect("run task join");

    assert_eq!(fixture.executor.calls.load(Ordering::SeqCst), 0);
    assert_eq!(fixture.sink.closed.load(Ordering::SeqCst), 1);
    assert_eq!(handle.state(), SessionState::Closing);
    assert!(fixture.history.saved.lock().expect("history lock").is_empty());
}
