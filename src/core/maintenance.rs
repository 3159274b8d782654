//! Out-of-band maintenance tasks

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::interval;

use crate::error::Result;
use crate::storage::{RefreshTokenStorage, SharedCredentialStore};

/// Remove expired refresh tokens once, returning how many were removed
///
/// Revocation state is always checked on use, so purging is only about
/// storage growth.
pub async fn purge_expired_once(store: &SharedCredentialStore) -> Result<usize> {
    let purged = store.purge_expired_refresh_tokens(chrono::Utc::now()).await?;
    if purged > 0 {
        log::info!("Purged {} expired refresh tokens", purged);
    }
    Ok(purged)
}

/// Start the periodic purge of expired refresh tokens
pub fn spawn_refresh_token_purge(
    store: SharedCredentialStore,
    purge_interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = interval(purge_interval);
        loop {
            interval.tick().await;
            if let Err(e) = purge_expired_once(&store).await {
                log::error!("Failed to purge expired refresh tokens: {}", e);
            }
        }
    })
}
