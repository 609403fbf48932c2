//! One-shot asynchronous initialization pipeline.

use tokio::sync::oneshot;
use tracing::trace;

use crate::collab::Collaborators;
use crate::collab::SchemaMetadata;
use crate::connections::ConnectionMap;
use crate::connections::populate_aggregator_members;
use crate::error::InitError;

/// Produced exactly once per initialization attempt and consumed exactly
/// once by the session controller.
pub(crate) enum InitResult {
    Ready {
        metadata: SchemaMetadata,
        connections: ConnectionMap,
        warnings: Vec<String>,
    },
    Failed(InitError),
}

/// Start initialization in the background and hand back the single-slot
/// delivery channel. If the session reaches Closing first, the send fails
/// and the result is discarded without blocking teardown.
pub(crate) fn spawn_init_pipeline(collab: Collaborators) -> oneshot::Receiver<InitResult> {
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        let result = initialise(&collab).await;
        if tx.send(result).is_err() {
            trace!("init result discarded; session is already closing");
        }
    });
    rx
}

async fn initialise(collab: &Collaborators) -> InitResult {
    let names = match collab.schema.foreign_schema_names().await {
        Ok(names) => names,
        Err(source) => return InitResult::Failed(InitError::SchemaNames { source }),
    };

    let resolution = match collab.connections.resolve(&names).await {
        Ok(resolution) => resolution,
        Err(source) => return InitResult::Failed(InitError::Connections { source }),
    };
    let mut connections = resolution.connections;
    populate_aggregator_members(&mut connections);

    let metadata = match collab.schema.metadata().await {
        Ok(metadata) => metadata,
        Err(source) => return InitResult::Failed(InitError::Metadata { source }),
    };

    InitResult::Ready {
        metadata,
        connections,
        warnings: resolution.warnings,
    }
}
