use agentmesh_storage::Ltm;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Periodically removes expired LTM entries.
pub struct LtmCompactor {
    ltm: Arc<Ltm>,
    interval: Duration,
}

impl LtmCompactor {
    pub fn new(ltm: Arc<Ltm>, interval: Duration) -> Self {
        Self { ltm, interval }
    }

    async fn compact_once(&self) {
        let ltm = Arc::clone(&self.ltm);
        match tokio::task::spawn_blocking(move || ltm.compact()).await {
            Ok(removed) => debug!(removed, "LTM compaction pass finished"),
            Err(e) => error!(error = %e, "LTM compaction task failed"),
        }
    }

    pub async fn run_loop(self: Arc<Self>, mut shutdown: tokio::sync::broadcast::Receiver<()>) {
        info!(interval_secs = self.interval.as_secs(), "LtmCompactor started");

        let mut interval = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.compact_once().await;
                }
                _ = shutdown.recv() => {
                    info!("LtmCompactor shutting down");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentmesh_core::config::{LtmBackendKind, LtmConfig};
    use chrono::{Duration as ChronoDuration, Utc};
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_loop_compacts_then_stops() {
        let dir = TempDir::new().unwrap();
        let config = LtmConfig {
            backend: LtmBackendKind::File,
            ttl_days: 1,
            ..LtmConfig::default()
        };
        let path = dir.path().join("ltm.json");

        // Write through a clock two days in the past so the entry is stale.
        let past = Utc::now() - ChronoDuration::days(2);
        let writer = Ltm::open(&config, &path).with_clock(Arc::new(move || past));
        writer.write("stale", &json!(1));
        drop(writer);

        let ltm = Arc::new(Ltm::open(&config, &path));
        ltm.write("fresh", &json!(2));
        assert_eq!(ltm.stats().entries, 2);

        let compactor = Arc::new(LtmCompactor::new(ltm.clone(), Duration::from_millis(20)));
        let (tx, rx) = tokio::sync::broadcast::channel(1);
        let handle = tokio::spawn(compactor.run_loop(rx));

        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(ltm.stats().entries, 1);
        assert!(ltm.read("fresh").is_some());
    }
}
