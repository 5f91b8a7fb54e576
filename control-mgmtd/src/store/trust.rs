use std::path::Path;
use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use chrono::{DateTime, SecondsFormat, Utc};
use crate::health::{SignerHealth, TrcHealth, TrcId};

/// Trust material store: trust root documents plus the renewing signer's
/// current state as maintained by the signing subsystem. The management
/// API only ever reads from it; writes exist for that subsystem and for
/// tests.
pub struct TrustDb {
    conn: Connection,
}

impl TrustDb {
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
            CREATE TABLE IF NOT EXISTS trcs (
                isd         INTEGER NOT NULL,
                base        INTEGER NOT NULL,
                serial      INTEGER NOT NULL,
                not_before  TEXT NOT NULL,
                not_after   TEXT NOT NULL,
                PRIMARY KEY (isd, base, serial)
            );

            CREATE TABLE IF NOT EXISTS signer_state (
                id              INTEGER PRIMARY KEY CHECK (id = 1),
                expiration      TEXT,
                in_grace        INTEGER NOT NULL DEFAULT 0,
                missing_detail  TEXT
            );
            "#,
        )
        .context("Failed to create database schema")?;

        Ok(Self { conn })
    }

    /// Record a trust root document's identifying triple and validity.
    pub fn insert_trc(
        &self,
        id: TrcId,
        not_before: DateTime<Utc>,
        not_after: DateTime<Utc>,
    ) -> Result<()> {
        self.conn
            .execute(
                r#"
                INSERT OR REPLACE INTO trcs (isd, base, serial, not_before, not_after)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
                params![
                    id.isd,
                    id.base as i64,
                    id.serial as i64,
                    not_before.to_rfc3339_opts(SecondsFormat::Secs, true),
                    not_after.to_rfc3339_opts(SecondsFormat::Secs, true),
                ],
            )
            .context("Failed to insert TRC")?;
        Ok(())
    }

    /// Replace the signer state. `expiration = None` records a missing
    /// signer, optionally with a reason.
    pub fn set_signer(
        &self,
        expiration: Option<DateTime<Utc>>,
        in_grace: bool,
        missing_detail: Option<&str>,
    ) -> Result<()> {
        self.conn
            .execute(
                r#"
                INSERT OR REPLACE INTO signer_state (id, expiration, in_grace, missing_detail)
                VALUES (1, ?1, ?2, ?3)
                "#,
                params![
                    expiration.map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true)),
                    in_grace as i32,
                    missing_detail,
                ],
            )
            .context("Failed to set signer state")?;
        Ok(())
    }

    /// Signer facts for the health check. No recorded state at all also
    /// counts as a missing signer.
    pub fn signer_health(&self) -> Result<SignerHealth> {
        let row = self
            .conn
            .query_row(
                "SELECT expiration, in_grace, missing_detail FROM signer_state WHERE id = 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, Option<String>>(0)?,
                        row.get::<_, i32>(1)?,
                        row.get::<_, Option<String>>(2)?,
                    ))
                },
            )
            .optional()
            .context("Failed to query signer state")?;

        let health = match row {
            Some((Some(expiration_str), in_grace, _)) => {
                let expiration = DateTime::parse_from_rfc3339(&expiration_str)
                    .context("Failed to parse signer expiration")?
                    .with_timezone(&Utc);
                SignerHealth {
                    signer_missing: false,
                    signer_missing_detail: None,
                    expiration,
                    in_grace: in_grace != 0,
                }
            }
            Some((None, _, missing_detail)) => SignerHealth {
                signer_missing: true,
                signer_missing_detail: missing_detail,
                expiration: DateTime::UNIX_EPOCH,
                in_grace: false,
            },
            None => SignerHealth {
                signer_missing: true,
                signer_missing_detail: None,
                expiration: DateTime::UNIX_EPOCH,
                in_grace: false,
            },
        };
        Ok(health)
    }

    /// Latest trust root for the given ISD, ordered by base then serial.
    pub fn trc_health(&self, isd: u16) -> Result<TrcHealth> {
        let row = self
            .conn
            .query_row(
                r#"
                SELECT isd, base, serial FROM trcs
                WHERE isd = ?1
                ORDER BY base DESC, serial DESC
                LIMIT 1
                "#,
                params![isd],
                |row| {
                    Ok(TrcId {
                        isd: row.get::<_, u16>(0)?,
                        base: row.get::<_, i64>(1)? as u64,
                        serial: row.get::<_, i64>(2)? as u64,
                    })
                },
            )
            .optional()
            .context("Failed to query TRCs")?;

        let health = match row {
            Some(id) => TrcHealth {
                trc_id: Some(id),
                not_found_detail: None,
            },
            None => TrcHealth {
                trc_id: None,
                not_found_detail: Some(format!("no TRC for ISD {} in trust store", isd)),
            },
        };
        Ok(health)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_signer_absent() {
        let db = TrustDb::open(":memory:").unwrap();
        let health = db.signer_health().unwrap();
        assert!(health.signer_missing);
        assert!(health.signer_missing_detail.is_none());
    }

    #[test]
    fn test_signer_recorded_missing_with_detail() {
        let db = TrustDb::open(":memory:").unwrap();
        db.set_signer(None, false, Some("no key in keystore")).unwrap();
        let health = db.signer_health().unwrap();
        assert!(health.signer_missing);
        assert_eq!(health.signer_missing_detail.as_deref(), Some("no key in keystore"));
    }

    #[test]
    fn test_signer_present() {
        let db = TrustDb::open(":memory:").unwrap();
        db.set_signer(Some(ts(5000)), true, None).unwrap();
        let health = db.signer_health().unwrap();
        assert!(!health.signer_missing);
        assert_eq!(health.expiration, ts(5000));
        assert!(health.in_grace);
    }

    #[test]
    fn test_trc_latest_wins() {
        let db = TrustDb::open(":memory:").unwrap();
        for (base, serial) in [(1u64, 1u64), (1, 3), (2, 1)] {
            db.insert_trc(
                TrcId { isd: 1, base, serial },
                ts(0),
                ts(10_000),
            )
            .unwrap();
        }
        // A TRC for another ISD must not shadow the local one.
        db.insert_trc(TrcId { isd: 2, base: 9, serial: 9 }, ts(0), ts(10_000))
            .unwrap();

        let health = db.trc_health(1).unwrap();
        assert_eq!(
            health.trc_id,
            Some(TrcId { isd: 1, base: 2, serial: 1 })
        );
        assert!(health.not_found_detail.is_none());
    }

    #[test]
    fn test_trc_absent() {
        let db = TrustDb::open(":memory:").unwrap();
        let health = db.trc_health(1).unwrap();
        assert!(health.trc_id.is_none());
        assert!(health.not_found_detail.unwrap().contains("ISD 1"));
    }
}
