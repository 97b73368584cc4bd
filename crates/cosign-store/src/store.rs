use chrono::Utc;
use futures::future::BoxFuture;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;
use tracing::debug;

use cosign_core::error::{CosignError, Result};
use cosign_core::traits::AgreementStore;
use cosign_core::types::{AgreementId, AgreementKind, AgreementStatus, PartyId, PartyStatusRow};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS agreements (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        status TEXT NOT NULL,
        requested_by TEXT NOT NULL,
        summary TEXT NOT NULL,
        document BLOB,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS template_agreements (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        status TEXT NOT NULL,
        requested_by TEXT NOT NULL,
        summary TEXT NOT NULL,
        document BLOB,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS party_status (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        party_id TEXT NOT NULL,
        agreement_id INTEGER NOT NULL REFERENCES agreements(id),
        status TEXT NOT NULL,
        created_at TEXT NOT NULL,
        UNIQUE(party_id, agreement_id)
    );

    CREATE TABLE IF NOT EXISTS template_party_status (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        party_id TEXT NOT NULL,
        agreement_id INTEGER NOT NULL REFERENCES template_agreements(id),
        status TEXT NOT NULL,
        created_at TEXT NOT NULL,
        UNIQUE(party_id, agreement_id)
    );

    CREATE INDEX IF NOT EXISTS idx_party_status_agreement
        ON party_status(agreement_id);
    CREATE INDEX IF NOT EXISTS idx_template_party_status_agreement
        ON template_party_status(agreement_id);";

/// Table names for one agreement kind.
fn tables(kind: AgreementKind) -> (&'static str, &'static str) {
    match kind {
        AgreementKind::Direct => ("agreements", "party_status"),
        AgreementKind::Template => ("template_agreements", "template_party_status"),
    }
}

fn db_err(e: rusqlite::Error) -> CosignError {
    CosignError::Database(e.to_string())
}

/// SQLite-backed agreement store.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a SQLite database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CosignError::Database(format!("Failed to create db directory: {}", e))
            })?;
        }

        let conn = Connection::open(path).map_err(db_err)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;

        debug!(path = %path.display(), "SQLite store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| CosignError::Database(e.to_string()))
    }

    /// The stored final document, if the agreement was approved.
    pub fn final_document(&self, id: AgreementId, kind: AgreementKind) -> Result<Option<Vec<u8>>> {
        let (agreements, _) = tables(kind);
        let conn = self.conn()?;
        let doc: Option<Option<Vec<u8>>> = conn
            .query_row(
                &format!("SELECT document FROM {} WHERE id = ?1", agreements),
                params![id.0],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;
        Ok(doc.flatten())
    }

    fn set_status(
        conn: &Connection,
        id: AgreementId,
        status: AgreementStatus,
        kind: AgreementKind,
    ) -> Result<()> {
        let (agreements, _) = tables(kind);
        let changed = conn
            .execute(
                &format!(
                    "UPDATE {} SET status = ?1, updated_at = ?2 WHERE id = ?3",
                    agreements
                ),
                params![status.as_str(), Utc::now().to_rfc3339(), id.0],
            )
            .map_err(db_err)?;
        if changed == 0 {
            return Err(CosignError::Database(format!("{} agreement {} not found", kind, id)));
        }
        Ok(())
    }
}

impl AgreementStore for SqliteStore {
    fn create_agreement(
        &self,
        kind: AgreementKind,
        requested_by: &str,
        summary: &str,
    ) -> BoxFuture<'_, Result<AgreementId>> {
        let requested_by = requested_by.to_string();
        let summary = summary.to_string();
        Box::pin(async move {
            let (agreements, _) = tables(kind);
            let now = Utc::now().to_rfc3339();
            let conn = self.conn()?;
            conn.execute(
                &format!(
                    "INSERT INTO {} (status, requested_by, summary, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?4)",
                    agreements
                ),
                params![AgreementStatus::Processing.as_str(), requested_by, summary, now],
            )
            .map_err(db_err)?;
            let id = AgreementId(conn.last_insert_rowid());
            debug!(agreement_id = %id, kind = %kind, "Agreement row created");
            Ok(id)
        })
    }

    fn update_agreement_status(
        &self,
        id: AgreementId,
        status: AgreementStatus,
        kind: AgreementKind,
    ) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let conn = self.conn()?;
            Self::set_status(&conn, id, status, kind)
        })
    }

    fn create_party_status(
        &self,
        party_id: &PartyId,
        id: AgreementId,
        status: AgreementStatus,
        kind: AgreementKind,
    ) -> BoxFuture<'_, Result<bool>> {
        let party_id = party_id.0.clone();
        Box::pin(async move {
            let (_, party_table) = tables(kind);
            let conn = self.conn()?;
            let inserted = conn
                .execute(
                    &format!(
                        "INSERT OR IGNORE INTO {} (party_id, agreement_id, status, created_at)
                         VALUES (?1, ?2, ?3, ?4)",
                        party_table
                    ),
                    params![party_id, id.0, status.as_str(), Utc::now().to_rfc3339()],
                )
                .map_err(db_err)?;
            Ok(inserted > 0)
        })
    }

    fn store_final_document(
        &self,
        id: AgreementId,
        kind: AgreementKind,
        bytes: Vec<u8>,
    ) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let (agreements, _) = tables(kind);
            let mut conn = self.conn()?;
            let tx = conn.transaction().map_err(db_err)?;
            tx.execute(
                &format!("UPDATE {} SET document = ?1 WHERE id = ?2", agreements),
                params![bytes, id.0],
            )
            .map_err(db_err)?;
            Self::set_status(&tx, id, AgreementStatus::Approved, kind)?;
            tx.commit().map_err(db_err)?;
            Ok(())
        })
    }

    fn agreement_status(
        &self,
        id: AgreementId,
        kind: AgreementKind,
    ) -> BoxFuture<'_, Result<Option<AgreementStatus>>> {
        Box::pin(async move {
            let (agreements, _) = tables(kind);
            let conn = self.conn()?;
            let status: Option<String> = conn
                .query_row(
                    &format!("SELECT status FROM {} WHERE id = ?1", agreements),
                    params![id.0],
                    |row| row.get(0),
                )
                .optional()
                .map_err(db_err)?;
            status
                .map(|s| AgreementStatus::from_str(&s).map_err(CosignError::Database))
                .transpose()
        })
    }

    fn party_statuses(
        &self,
        id: AgreementId,
        kind: AgreementKind,
    ) -> BoxFuture<'_, Result<Vec<PartyStatusRow>>> {
        Box::pin(async move {
            let (_, party_table) = tables(kind);
            let conn = self.conn()?;
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT party_id, status, created_at FROM {}
                     WHERE agreement_id = ?1
                     ORDER BY id ASC",
                    party_table
                ))
                .map_err(db_err)?;

            let rows = stmt
                .query_map(params![id.0], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                })
                .map_err(db_err)?;

            let mut out = Vec::new();
            for row in rows {
                let (party_id, status, created_at) = row.map_err(db_err)?;
                out.push(PartyStatusRow {
                    party_id: PartyId(party_id),
                    agreement_id: id,
                    status: AgreementStatus::from_str(&status).map_err(CosignError::Database)?,
                    created_at,
                });
            }
            Ok(out)
        })
    }
}
