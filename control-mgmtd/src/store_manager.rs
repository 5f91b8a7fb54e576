use std::thread;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use anyhow::Result;
use chrono::{DateTime, Utc};
use shared::types::StoredBeacon;
use crate::config::StoreConfig;
use crate::health::{SignerHealth, TrcHealth};
use crate::store::db::BeaconDb;
use crate::store::trust::TrustDb;
use crate::store::BeaconQuery;

/// Commands sent to the store thread
pub enum StoreCommand {
    QueryBeacons(BeaconQuery, oneshot::Sender<Result<Vec<StoredBeacon>>>),
    DeleteBeacon(String, oneshot::Sender<Result<u64>>),
    DeleteExpired(DateTime<Utc>, oneshot::Sender<Result<u64>>),
    SignerHealth(oneshot::Sender<Result<SignerHealth>>),
    TrcHealth(u16, oneshot::Sender<Result<TrcHealth>>),
    Shutdown,
}

/// Handle to interact with the beacon and trust databases
#[derive(Clone)]
pub struct StoreHandle {
    tx: mpsc::Sender<StoreCommand>,
}

impl StoreHandle {
    /// Spawn a new store thread owning both database connections
    pub fn spawn(beacons: BeaconDb, trust: TrustDb) -> Self {
        let (tx, mut rx) = mpsc::channel::<StoreCommand>(256);

        thread::spawn(move || {
            while let Some(cmd) = rx.blocking_recv() {
                match cmd {
                    StoreCommand::QueryBeacons(query, reply) => {
                        let _ = reply.send(beacons.query_beacons(&query));
                    }
                    StoreCommand::DeleteBeacon(prefix, reply) => {
                        let _ = reply.send(beacons.delete_beacon(&prefix));
                    }
                    StoreCommand::DeleteExpired(now, reply) => {
                        let _ = reply.send(beacons.delete_expired(now));
                    }
                    StoreCommand::SignerHealth(reply) => {
                        let _ = reply.send(trust.signer_health());
                    }
                    StoreCommand::TrcHealth(isd, reply) => {
                        let _ = reply.send(trust.trc_health(isd));
                    }
                    StoreCommand::Shutdown => {
                        tracing::info!("Store thread shutting down");
                        break;
                    }
                }
            }
        });

        Self { tx }
    }

    /// Run a query against the beacon store
    pub async fn query_beacons(&self, query: BeaconQuery) -> Result<Vec<StoredBeacon>> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(StoreCommand::QueryBeacons(query, reply)).await?;
        rx.await?
    }

    /// Delete the beacon matching an identifier prefix
    pub async fn delete_beacon(&self, id_prefix: String) -> Result<u64> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(StoreCommand::DeleteBeacon(id_prefix, reply)).await?;
        rx.await?
    }

    /// Remove beacons that expired before the given instant
    pub async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(StoreCommand::DeleteExpired(now, reply)).await?;
        rx.await?
    }

    /// Signer facts for the health endpoint
    pub async fn signer_health(&self) -> Result<SignerHealth> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(StoreCommand::SignerHealth(reply)).await?;
        rx.await?
    }

    /// Latest trust root facts for the given ISD
    pub async fn trc_health(&self, isd: u16) -> Result<TrcHealth> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(StoreCommand::TrcHealth(isd, reply)).await?;
        rx.await?
    }

    /// Shutdown the store thread
    pub async fn shutdown(&self) -> Result<()> {
        self.tx.send(StoreCommand::Shutdown).await?;
        Ok(())
    }
}

/// Store maintenance loop - periodically drops expired beacons
pub async fn run(
    store: StoreHandle,
    config: StoreConfig,
    cancel: CancellationToken,
) -> Result<()> {
    let mut cleanup_interval = tokio::time::interval(
        std::time::Duration::from_secs(config.cleanup_interval_secs)
    );

    loop {
        tokio::select! {
            _ = cleanup_interval.tick() => {
                match store.delete_expired(Utc::now()).await {
                    Ok(0) => {}
                    Ok(removed) => tracing::info!("Removed {} expired beacons", removed),
                    Err(e) => tracing::error!("Failed to remove expired beacons: {}", e),
                }
            }
            _ = cancel.cancelled() => {
                tracing::info!("Store maintenance shutting down");
                break;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use shared::types::{AsEntry, HopField, IsdAs, PathSegment, Usage};

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn segment(expiry: i64) -> PathSegment {
        PathSegment {
            timestamp: ts(1000),
            as_entries: vec![AsEntry {
                local: IsdAs::new(1, 0xff00_0000_0110),
                hop: HopField {
                    cons_ingress: 0,
                    cons_egress: 2,
                    expiry: ts(expiry),
                },
            }],
        }
    }

    #[tokio::test]
    async fn test_handle_round_trip() {
        let beacons = BeaconDb::open(":memory:").unwrap();
        let id = beacons
            .upsert_beacon(&segment(5000), 7, Usage::PROPAGATION, ts(1100))
            .unwrap();
        let trust = TrustDb::open(":memory:").unwrap();

        let store = StoreHandle::spawn(beacons, trust);

        let results = store.query_beacons(BeaconQuery::default()).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, id);

        let deleted = store.delete_beacon(id).await.unwrap();
        assert_eq!(deleted, 1);

        let signer = store.signer_health().await.unwrap();
        assert!(signer.signer_missing);

        store.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_handle_delete_expired() {
        let beacons = BeaconDb::open(":memory:").unwrap();
        beacons
            .upsert_beacon(&segment(2000), 1, Usage::PROPAGATION, ts(1100))
            .unwrap();
        let trust = TrustDb::open(":memory:").unwrap();

        let store = StoreHandle::spawn(beacons, trust);
        let removed = store.delete_expired(ts(3000)).await.unwrap();
        assert_eq!(removed, 1);

        store.shutdown().await.unwrap();
    }
}
