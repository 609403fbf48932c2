//! Contracts for the collaborators the session core consumes.
//!
//! The core is deliberately backend-agnostic: the wire protocol, the
//! statement language, config parsing and the terminal layer all live
//! behind these traits.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::config::ShellConfig;
use crate::connections::ConnectionMap;
use crate::error::DirectiveError;
use crate::error::ExecutionError;
use crate::error::ResolutionError;
use crate::suggest::Suggestion;

/// Outcome of resolving accumulated input against the statement and
/// directive namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedStatement {
    /// The text to execute, after named-reference expansion.
    pub executable: String,
    pub args: Vec<String>,
    /// True when the input named a predefined query rather than ad hoc
    /// statement text.
    pub is_named: bool,
}

/// Cached schema metadata, keyed by schema name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaMetadata {
    pub tables_by_schema: BTreeMap<String, Vec<String>>,
}

impl SchemaMetadata {
    /// Distinct table names across all schemas, sorted.
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .tables_by_schema
            .values()
            .flatten()
            .cloned()
            .collect();
        names.sort();
        names.dedup();
        names
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Result of validating directive arguments. `message` is displayed
/// unconditionally; `error` aborts without running; `should_run = false`
/// means the validation itself satisfied the request (e.g. help text).
#[derive(Debug, Clone, Default)]
pub struct DirectiveValidation {
    pub message: Option<String>,
    pub should_run: bool,
    pub error: Option<DirectiveError>,
}

impl DirectiveValidation {
    pub fn run() -> Self {
        Self {
            should_run: true,
            ..Self::default()
        }
    }
}

/// What the session should do after a directive ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectiveOutcome {
    Continue,
    ExitSession,
}

/// Snapshot of session state handed to a directive handler.
#[derive(Debug, Clone)]
pub struct DirectiveInput {
    pub text: String,
    pub args: Vec<String>,
    pub schema: SchemaMetadata,
    pub connections: ConnectionMap,
    pub config: ShellConfig,
}

#[derive(Debug, Clone, Default)]
pub struct ConnectionResolution {
    pub connections: ConnectionMap,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ConfigLoad {
    pub config: ShellConfig,
    pub warnings: Vec<String>,
}

/// One event from the line-editing layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    Line(String),
    Eof,
}

#[async_trait]
pub trait QueryResolver: Send + Sync {
    /// Resolve accumulated text into an executable unit, expanding named
    /// references and splitting out arguments.
    async fn resolve(&self, text: &str) -> Result<ResolvedStatement, ResolutionError>;

    /// Names of predefined queries, offered as completions.
    fn named_query_names(&self) -> Vec<String>;
}

#[async_trait]
pub trait StatementExecutor: Send + Sync {
    /// Run a statement. Cancellation is cooperative: the executor is
    /// expected to observe `cancel` at its poll points and return
    /// [`ExecutionError::Cancelled`].
    async fn run(
        &self,
        cancel: CancellationToken,
        executable: &str,
        args: &[String],
    ) -> Result<ResultSet, ExecutionError>;
}

#[async_trait]
pub trait SchemaProvider: Send + Sync {
    async fn foreign_schema_names(&self) -> anyhow::Result<Vec<String>>;
    async fn metadata(&self) -> anyhow::Result<SchemaMetadata>;
}

#[async_trait]
pub trait ConnectionResolver: Send + Sync {
    async fn resolve(&self, known_names: &[String]) -> anyhow::Result<ConnectionResolution>;
}

#[async_trait]
pub trait ConfigLoader: Send + Sync {
    async fn load(&self, path: &str, purpose: &str) -> anyhow::Result<ConfigLoad>;
}

#[async_trait]
pub trait NotificationSource: Send + Sync {
    async fn subscribe(&self, channel: &str) -> anyhow::Result<Box<dyn NotificationStream>>;
}

/// An open subscription. Dropping the stream closes it.
#[async_trait]
pub trait NotificationStream: Send {
    /// Wait for the next raw payload. `Ok(None)` means the source closed
    /// the subscription.
    async fn next_payload(&mut self) -> anyhow::Result<Option<String>>;
}

#[async_trait]
pub trait DirectiveRegistry: Send + Sync {
    fn is_directive(&self, text: &str) -> bool;
    fn validate(&self, text: &str) -> DirectiveValidation;
    async fn execute(&self, input: DirectiveInput) -> Result<DirectiveOutcome, DirectiveError>;

    /// Suggestions for the directive names themselves.
    fn suggestions(&self) -> Vec<Suggestion>;
    /// Completion for a directive in progress; `tables` lets handlers
    /// that take a table argument offer table names.
    fn complete(&self, text: &str, tables: &[Suggestion]) -> Vec<Suggestion>;
}

pub trait OutputSink: Send + Sync {
    fn stream_result(&self, result: ResultSet);
    fn show_error(&self, error: &dyn std::error::Error);
    fn message(&self, lines: &[String]);
    /// Close the sink; the last step of session teardown.
    fn close(&self);
}

pub trait HistoryStore: Send + Sync {
    fn load(&self) -> Vec<String>;
    fn persist(&self, entries: &[String]) -> anyhow::Result<()>;
}

/// Lightweight syntactic-position oracle used by completion to decide
/// whether the cursor sits where a table reference is expected.
pub trait SyntaxInspector: Send + Sync {
    fn expects_table(&self, text: &str) -> bool;
}

#[async_trait]
pub trait LineSource: Send {
    async fn next_line(&mut self, prompt: &str) -> anyhow::Result<LineEvent>;
}

/// The full set of collaborators a session is built from.
#[derive(Clone)]
pub struct Collaborators {
    pub resolver: Arc<dyn QueryResolver>,
    pub executor: Arc<dyn StatementExecutor>,
    pub schema: Arc<dyn SchemaProvider>,
    pub connections: Arc<dyn ConnectionResolver>,
    pub config_loader: Arc<dyn ConfigLoader>,
    pub notifications: Arc<dyn NotificationSource>,
    pub directives: Arc<dyn DirectiveRegistry>,
    pub output: Arc<dyn OutputSink>,
    pub history: Arc<dyn HistoryStore>,
    pub syntax: Arc<dyn SyntaxInspector>,
}
