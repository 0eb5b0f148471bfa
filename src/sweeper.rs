/// Periodic removal of expired and long-revoked refresh token records
///
/// Runs on its own tokio task and shares nothing with request handling
/// beyond the store itself.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::auth::RefreshTokenStore;

/// Run one sweep, returning the number of records removed
///
/// Failures are logged and reported as zero.
pub async fn sweep_once(store: &dyn RefreshTokenStore) -> u64 {
    match store.delete_expired().await {
        Ok(removed) => {
            if removed > 0 {
                tracing::info!(removed = removed, "Swept refresh tokens");
            } else {
                tracing::debug!("Refresh token sweep found nothing to remove");
            }
            removed
        }
        Err(e) => {
            tracing::error!(error = %e, "Refresh token sweep failed");
            0
        }
    }
}

/// Sweep every `interval`, starting one interval from now
pub fn spawn_refresh_token_sweeper(
    store: Arc<dyn RefreshTokenStore>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            sweep_once(store.as_ref()).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{InMemoryRefreshTokenStore, SessionId};
    use chrono::Utc;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_sweep_once_removes_expired() {
        let store = InMemoryRefreshTokenStore::new();
        store
            .create(
                &SessionId::generate(),
                "h",
                Uuid::new_v4(),
                Utc::now() - chrono::Duration::seconds(5),
            )
            .await
            .unwrap();

        assert_eq!(sweep_once(&store).await, 1);
        assert_eq!(sweep_once(&store).await, 0);
    }

    #[tokio::test]
    async fn test_spawned_sweeper_runs_on_interval() {
        let store = Arc::new(InMemoryRefreshTokenStore::new());
        store
            .create(
                &SessionId::generate(),
                "h",
                Uuid::new_v4(),
                Utc::now() - chrono::Duration::seconds(5),
            )
            .await
            .unwrap();

        let handle = spawn_refresh_token_sweeper(store.clone(), Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(200)).await;
        handle.abort();

        assert!(store.is_empty());
    }
}
