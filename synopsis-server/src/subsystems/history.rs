//! History subsystem — newest-first view of stored summarization logs.

use synopsis_core::{HistoryEntry, LogStore, SynopsisError};

pub async fn recent_history(
    store: &dyn LogStore,
    limit: u32,
) -> Result<Vec<HistoryEntry>, SynopsisError> {
    match store.list_recent(limit).await {
        Ok(entries) => {
            tracing::debug!(limit, returned = entries.len(), "Loaded history");
            Ok(entries)
        }
        Err(e) => {
            tracing::error!(limit, error = %e, "Failed to read history");
            Err(e.into())
        }
    }
}
