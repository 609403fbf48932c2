//! Change-notification listener and cache invalidation.
//!
//! A long-lived subscription reacts to schema updates by reloading every
//! cached input and swapping the session view. All reload I/O happens
//! outside the execution lock; only the swap itself contends with an
//! in-flight statement.

use std::sync::Arc;

use serde::Deserialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use crate::connections::populate_aggregator_members;

use super::SessionCore;
use super::lock;

/// Envelope decoded from a raw notification payload. Unrecognised tags
/// are logged and ignored; they never stop the listener.
#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum NotificationEvent {
    SchemaUpdate,
    #[serde(other)]
    Other,
}

/// Subscribe and listen until the session's lifetime token is cancelled.
/// The subscription closes when the task drops the stream on exit.
pub(crate) fn spawn_notification_listener(
    core: Arc<SessionCore>,
    lifetime: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        listen(core, lifetime).await;
    })
}

async fn listen(core: Arc<SessionCore>, lifetime: CancellationToken) {
    let channel = core.config().notification_channel;
    let mut stream = match core.collab.notifications.subscribe(&channel).await {
        Ok(stream) => stream,
        Err(subscribe_error) => {
            warn!("failed to subscribe to change notifications: {subscribe_error:#}");
            return;
        }
    };

    loop {
        tokio::select! {
            _ = lifetime.cancelled() => break,
            payload = stream.next_payload() => match payload {
                Ok(Some(raw)) => core.handle_notification(&raw).await,
                Ok(None) => {
                    debug!("notification stream closed");
                    break;
                }
                Err(wait_error) => {
                    warn!("error waiting for notification: {wait_error:#}");
                }
            }
        }
    }
    trace!("notification listener done");
}

impl SessionCore {
    pub(crate) async fn handle_notification(&self, payload: &str) {
        let event = match serde_json::from_str::<NotificationEvent>(payload) {
            Ok(event) => event,
            Err(decode_error) => {
                warn!("ignoring undecodable notification: {decode_error}");
                return;
            }
        };
        match event {
            NotificationEvent::SchemaUpdate => {
                trace!("schema update notification");
                if let Err(cycle_error) = self.run_invalidation_cycle().await {
                    // aborts this cycle only; the listener keeps waiting
                    warn!("invalidation cycle aborted: {cycle_error:#}");
                }
            }
            NotificationEvent::Other => {
                trace!("ignoring notification with unrecognised tag");
            }
        }
    }

    /// One invalidation cycle: reload names, connections, config and
    /// schema metadata, rebuild suggestions, then swap everything in
    /// while holding the execution lock.
    async fn run_invalidation_cycle(&self) -> anyhow::Result<()> {
        let names = self.collab.schema.foreign_schema_names().await?;

        let resolution = self.collab.connections.resolve(&names).await?;
        let mut connections = resolution.connections;
        populate_aggregator_members(&mut connections);
        for warning in &resolution.warnings {
            warn!("connection warning: {warning}");
        }

        let config_load = self
            .collab
            .config_loader
            .load(&self.config().config_path, "query")
            .await?;
        for warning in &config_load.warnings {
            warn!("config warning: {warning}");
        }

        let metadata = self.collab.schema.metadata().await?;
        let suggestions = self.build_suggestions(&metadata);

        let _guard = self.execution_lock.enter().await;
        let mut view = lock(&self.view);
        view.schema = metadata;
        view.connections = connections;
        view.config = config_load.config;
        view.suggestions = suggestions;
        trace!("invalidation swap complete");
        Ok(())
    }
}
