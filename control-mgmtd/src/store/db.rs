use std::path::Path;
use anyhow::{bail, Context, Result};
use rusqlite::{params, types::ToSql, Connection};
use chrono::{DateTime, SecondsFormat, Utc};
use shared::types::{PathSegment, StoredBeacon, Usage};
use crate::store::{id, BeaconQuery};

/// Timestamps are stored as second-resolution RFC 3339 in UTC so that
/// lexicographic comparison in SQL matches chronological order.
fn fmt_time(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

pub struct BeaconDb {
    conn: Connection,
}

impl BeaconDb {
    /// Open or create the SQLite database with WAL mode enabled
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;

        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .context("Failed to enable WAL mode")?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS beacons (
                id            TEXT PRIMARY KEY,
                segment       TEXT NOT NULL,
                start_isd_as  TEXT NOT NULL,
                ingress_if    INTEGER NOT NULL,
                usage         INTEGER NOT NULL,
                info_time     TEXT NOT NULL,
                expiration    TEXT NOT NULL,
                last_updated  TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_beacons_start ON beacons(start_isd_as);
            CREATE INDEX IF NOT EXISTS idx_beacons_expiration ON beacons(expiration);
            "#,
        )
        .context("Failed to create database schema")?;

        Ok(Self { conn })
    }

    /// Insert or refresh a beacon. The identifier is derived from the
    /// segment's identity, so re-inserting the same segment updates the
    /// existing row in place. Returns the assigned identifier.
    pub fn upsert_beacon(
        &self,
        segment: &PathSegment,
        ingress_if: u16,
        usage: Usage,
        last_updated: DateTime<Utc>,
    ) -> Result<String> {
        let id = id::segment_id(segment);
        let segment_json =
            serde_json::to_string(segment).context("Failed to serialize segment")?;
        let start_isd_as = segment
            .as_entries
            .first()
            .map(|entry| entry.local.to_string())
            .unwrap_or_default();

        self.conn
            .execute(
                r#"
                INSERT INTO beacons (
                    id, segment, start_isd_as, ingress_if, usage,
                    info_time, expiration, last_updated
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ON CONFLICT(id) DO UPDATE SET
                    segment = excluded.segment,
                    start_isd_as = excluded.start_isd_as,
                    ingress_if = excluded.ingress_if,
                    usage = excluded.usage,
                    info_time = excluded.info_time,
                    expiration = excluded.expiration,
                    last_updated = excluded.last_updated
                "#,
                params![
                    &id,
                    &segment_json,
                    &start_isd_as,
                    ingress_if,
                    usage.bits(),
                    fmt_time(segment.timestamp),
                    fmt_time(segment.min_expiry()),
                    fmt_time(last_updated),
                ],
            )
            .context("Failed to upsert beacon")?;

        Ok(id)
    }

    /// Execute a beacon query. Clauses are ANDed; empty clauses match
    /// everything. Results come back in insertion order.
    pub fn query_beacons(&self, query: &BeaconQuery) -> Result<Vec<StoredBeacon>> {
        let mut clauses: Vec<String> = Vec::new();
        let mut values: Vec<Box<dyn ToSql>> = Vec::new();

        if !query.starts_at.is_empty() {
            clauses.push(format!(
                "start_isd_as IN ({})",
                placeholders(query.starts_at.len())
            ));
            for isd_as in &query.starts_at {
                values.push(Box::new(isd_as.to_string()));
            }
        }
        if !query.usages.is_empty() {
            // Any shared bit matches.
            let masks = vec!["(usage & ?) != 0"; query.usages.len()];
            clauses.push(format!("({})", masks.join(" OR ")));
            for usage in &query.usages {
                values.push(Box::new(usage.bits()));
            }
        }
        if !query.ingress_interfaces.is_empty() {
            clauses.push(format!(
                "ingress_if IN ({})",
                placeholders(query.ingress_interfaces.len())
            ));
            for interface in &query.ingress_interfaces {
                values.push(Box::new(*interface));
            }
        }
        if let Some(valid_at) = query.valid_at {
            clauses.push("expiration > ?".to_string());
            values.push(Box::new(fmt_time(valid_at)));
        }
        if !query.seg_ids.is_empty() {
            clauses.push(format!("id IN ({})", placeholders(query.seg_ids.len())));
            for seg_id in &query.seg_ids {
                values.push(Box::new(seg_id.clone()));
            }
        }

        let mut sql = String::from(
            "SELECT id, segment, ingress_if, usage, last_updated FROM beacons",
        );
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }

        let mut stmt = self
            .conn
            .prepare(&sql)
            .context("Failed to prepare beacon query")?;
        let refs: Vec<&dyn ToSql> = values.iter().map(|value| value.as_ref()).collect();
        let beacons = stmt
            .query_map(&refs[..], Self::row_to_beacon)
            .context("Failed to query beacons")?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to collect beacons")?;

        Ok(beacons)
    }

    /// Delete the beacon whose identifier starts with the given prefix.
    /// Deleting an absent identifier is not an error; a prefix matching
    /// more than one beacon is.
    pub fn delete_beacon(&self, id_prefix: &str) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM beacons WHERE id LIKE ?1 || '%'",
                params![id_prefix],
                |row| row.get(0),
            )
            .context("Failed to count matching beacons")?;
        if count > 1 {
            bail!("{} beacons match id prefix {}", count, id_prefix);
        }

        let deleted = self
            .conn
            .execute(
                "DELETE FROM beacons WHERE id LIKE ?1 || '%'",
                params![id_prefix],
            )
            .context("Failed to delete beacon")?;

        Ok(deleted as u64)
    }

    /// Remove beacons whose expiration has passed
    pub fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let deleted = self
            .conn
            .execute(
                "DELETE FROM beacons WHERE expiration <= ?1",
                params![fmt_time(now)],
            )
            .context("Failed to delete expired beacons")?;

        Ok(deleted as u64)
    }

    /// Helper to convert a database row to StoredBeacon
    fn row_to_beacon(row: &rusqlite::Row) -> Result<StoredBeacon, rusqlite::Error> {
        let segment_json: String = row.get(1)?;
        let usage_bits: u32 = row.get(3)?;
        let last_updated_str: String = row.get(4)?;

        let segment: PathSegment = serde_json::from_str(&segment_json)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(
                1,
                rusqlite::types::Type::Text,
                Box::new(e),
            ))?;

        let last_updated = chrono::DateTime::parse_from_rfc3339(&last_updated_str)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(
                4,
                rusqlite::types::Type::Text,
                Box::new(e),
            ))?
            .with_timezone(&Utc);

        Ok(StoredBeacon {
            id: row.get(0)?,
            segment,
            ingress_if: row.get::<_, u16>(2)?,
            usage: Usage::from_bits(usage_bits),
            last_updated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use shared::types::{AsEntry, HopField, IsdAs};

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn segment(origin_asn: u64, info: i64, expiry: i64) -> PathSegment {
        PathSegment {
            timestamp: ts(info),
            as_entries: vec![
                AsEntry {
                    local: IsdAs::new(1, origin_asn),
                    hop: HopField {
                        cons_ingress: 0,
                        cons_egress: 2,
                        expiry: ts(expiry),
                    },
                },
                AsEntry {
                    local: IsdAs::new(1, 0xff00_0000_0210),
                    hop: HopField {
                        cons_ingress: 3,
                        cons_egress: 0,
                        expiry: ts(expiry + 500),
                    },
                },
            ],
        }
    }

    #[test]
    fn test_upsert_and_query_all() {
        let db = BeaconDb::open(":memory:").unwrap();
        let id = db
            .upsert_beacon(&segment(0x110, 1000, 5000), 7, Usage::PROPAGATION, ts(1100))
            .unwrap();

        let results = db.query_beacons(&BeaconQuery::default()).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, id);
        assert_eq!(results[0].ingress_if, 7);
        assert_eq!(results[0].usage, Usage::PROPAGATION);
        assert_eq!(results[0].last_updated, ts(1100));
        assert_eq!(results[0].segment, segment(0x110, 1000, 5000));
    }

    #[test]
    fn test_upsert_same_segment_is_idempotent() {
        let db = BeaconDb::open(":memory:").unwrap();
        let id1 = db
            .upsert_beacon(&segment(0x110, 1000, 5000), 7, Usage::PROPAGATION, ts(1100))
            .unwrap();
        let id2 = db
            .upsert_beacon(&segment(0x110, 1000, 5000), 8, Usage::UP_REGISTRATION, ts(1200))
            .unwrap();
        assert_eq!(id1, id2);

        let results = db.query_beacons(&BeaconQuery::default()).unwrap();
        assert_eq!(results.len(), 1, "re-insert should update in place");
        assert_eq!(results[0].ingress_if, 8);
        assert_eq!(results[0].last_updated, ts(1200));
    }

    #[test]
    fn test_query_by_usage_any_of() {
        let db = BeaconDb::open(":memory:").unwrap();
        db.upsert_beacon(&segment(0x110, 1000, 5000), 1, Usage::UP_REGISTRATION, ts(1100))
            .unwrap();
        db.upsert_beacon(&segment(0x111, 1000, 5000), 2, Usage::PROPAGATION, ts(1100))
            .unwrap();

        let query = BeaconQuery {
            usages: vec![Usage::UP_REGISTRATION | Usage::CORE_REGISTRATION],
            ..Default::default()
        };
        let results = db.query_beacons(&query).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].usage, Usage::UP_REGISTRATION);
    }

    #[test]
    fn test_query_valid_at() {
        let db = BeaconDb::open(":memory:").unwrap();
        db.upsert_beacon(&segment(0x110, 1000, 2000), 1, Usage::PROPAGATION, ts(1100))
            .unwrap();
        db.upsert_beacon(&segment(0x111, 1000, 9000), 2, Usage::PROPAGATION, ts(1100))
            .unwrap();

        let query = BeaconQuery {
            valid_at: Some(ts(3000)),
            ..Default::default()
        };
        let results = db.query_beacons(&query).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].segment.min_expiry(), ts(9000));

        // No validity clause returns expired beacons too.
        let all = db.query_beacons(&BeaconQuery::default()).unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn test_query_by_start_isd_as() {
        let db = BeaconDb::open(":memory:").unwrap();
        db.upsert_beacon(&segment(0xff00_0000_0110, 1000, 5000), 1, Usage::PROPAGATION, ts(1100))
            .unwrap();
        db.upsert_beacon(&segment(0xff00_0000_0111, 1000, 5000), 2, Usage::PROPAGATION, ts(1100))
            .unwrap();

        let query = BeaconQuery {
            starts_at: vec![IsdAs::new(1, 0xff00_0000_0110)],
            ..Default::default()
        };
        let results = db.query_beacons(&query).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].segment.as_entries[0].local, IsdAs::new(1, 0xff00_0000_0110));
    }

    #[test]
    fn test_query_by_ingress_interface() {
        let db = BeaconDb::open(":memory:").unwrap();
        db.upsert_beacon(&segment(0x110, 1000, 5000), 7, Usage::PROPAGATION, ts(1100))
            .unwrap();
        db.upsert_beacon(&segment(0x111, 1000, 5000), 9, Usage::PROPAGATION, ts(1100))
            .unwrap();

        let query = BeaconQuery {
            ingress_interfaces: vec![9],
            ..Default::default()
        };
        let results = db.query_beacons(&query).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].ingress_if, 9);
    }

    #[test]
    fn test_query_by_seg_id() {
        let db = BeaconDb::open(":memory:").unwrap();
        let id = db
            .upsert_beacon(&segment(0x110, 1000, 5000), 1, Usage::PROPAGATION, ts(1100))
            .unwrap();
        db.upsert_beacon(&segment(0x111, 1000, 5000), 2, Usage::PROPAGATION, ts(1100))
            .unwrap();

        let query = BeaconQuery {
            seg_ids: vec![id.clone()],
            ..Default::default()
        };
        let results = db.query_beacons(&query).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, id);
    }

    #[test]
    fn test_conjunction_of_clauses() {
        let db = BeaconDb::open(":memory:").unwrap();
        db.upsert_beacon(&segment(0x110, 1000, 5000), 7, Usage::UP_REGISTRATION, ts(1100))
            .unwrap();
        db.upsert_beacon(&segment(0x110, 2000, 5000), 9, Usage::UP_REGISTRATION, ts(1100))
            .unwrap();

        let query = BeaconQuery {
            starts_at: vec![IsdAs::new(1, 0x110)],
            usages: vec![Usage::UP_REGISTRATION],
            ingress_interfaces: vec![9],
            ..Default::default()
        };
        let results = db.query_beacons(&query).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].ingress_if, 9);
    }

    #[test]
    fn test_delete_by_prefix() {
        let db = BeaconDb::open(":memory:").unwrap();
        let id = db
            .upsert_beacon(&segment(0x110, 1000, 5000), 1, Usage::PROPAGATION, ts(1100))
            .unwrap();

        let deleted = db.delete_beacon(&id[..8]).unwrap();
        assert_eq!(deleted, 1);
        assert!(db.query_beacons(&BeaconQuery::default()).unwrap().is_empty());
    }

    #[test]
    fn test_delete_absent_is_ok() {
        let db = BeaconDb::open(":memory:").unwrap();
        let deleted = db.delete_beacon("deadbeef").unwrap();
        assert_eq!(deleted, 0);
    }

    #[test]
    fn test_delete_ambiguous_prefix_fails() {
        let db = BeaconDb::open(":memory:").unwrap();
        db.upsert_beacon(&segment(0x110, 1000, 5000), 1, Usage::PROPAGATION, ts(1100))
            .unwrap();
        db.upsert_beacon(&segment(0x111, 1000, 5000), 2, Usage::PROPAGATION, ts(1100))
            .unwrap();

        // The empty prefix matches both rows.
        let result = db.delete_beacon("");
        assert!(result.is_err());
        assert_eq!(db.query_beacons(&BeaconQuery::default()).unwrap().len(), 2);
    }

    #[test]
    fn test_delete_expired() {
        let db = BeaconDb::open(":memory:").unwrap();
        db.upsert_beacon(&segment(0x110, 1000, 2000), 1, Usage::PROPAGATION, ts(1100))
            .unwrap();
        db.upsert_beacon(&segment(0x111, 1000, 9000), 2, Usage::PROPAGATION, ts(1100))
            .unwrap();

        let removed = db.delete_expired(ts(3000)).unwrap();
        assert_eq!(removed, 1);
        let remaining = db.query_beacons(&BeaconQuery::default()).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].segment.min_expiry(), ts(9000));
    }
}
