//! Session orchestration core for an interactive, REPL-style query
//! client.
//!
//! The crate owns the hard part of an interactive shell: a non-blocking
//! asynchronous initialization pipeline, multi-line input buffering and
//! classification, serialized execution of directives and statements,
//! cache invalidation driven by out-of-band change notifications, and
//! cooperative cancellation wired to the OS interrupt.
//!
//! Everything mechanical around it — the wire protocol, the statement
//! language, config parsing, syntax highlighting and the terminal layer —
//! stays behind the trait seams in [`collab`].

pub mod collab;
pub mod config;
pub mod connections;
pub mod error;
pub mod history;
pub mod session;
pub mod suggest;

pub use collab::Collaborators;
pub use collab::ConfigLoad;
pub use collab::ConfigLoader;
pub use collab::ConnectionResolution;
pub use collab::ConnectionResolver;
pub use collab::DirectiveInput;
pub use collab::DirectiveOutcome;
pub use collab::DirectiveRegistry;
pub use collab::DirectiveValidation;
pub use collab::HistoryStore;
pub use collab::LineEvent;
pub use collab::LineSource;
pub use collab::NotificationSource;
pub use collab::NotificationStream;
pub use collab::OutputSink;
pub use collab::QueryResolver;
pub use collab::ResolvedStatement;
pub use collab::ResultSet;
pub use collab::SchemaMetadata;
pub use collab::SchemaProvider;
pub use collab::StatementExecutor;
pub use collab::SyntaxInspector;
pub use config::ShellConfig;
pub use connections::Connection;
pub use connections::ConnectionKind;
pub use connections::ConnectionMap;
pub use connections::ConnectionValidation;
pub use connections::populate_aggregator_members;
pub use error::DirectiveError;
pub use error::ExecutionError;
pub use error::InitError;
pub use error::ResolutionError;
pub use history::HistoryLog;
pub use session::AfterCloseAction;
pub use session::InteractiveSession;
pub use session::SessionHandle;
pub use session::SessionState;
pub use suggest::CompletionContext;
pub use suggest::Suggestion;
pub use suggest::SuggestionIndex;
