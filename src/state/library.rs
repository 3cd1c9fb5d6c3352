use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use std::path::{Path, PathBuf};

use super::data::Asset;
use crate::error::Result;

/// Outcome of adding a single file to the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportOutcome {
    Inserted(i64),
    /// The path was catalogued before and marked deleted; its row is live again
    Restored(i64),
    Duplicate,
}

/// The Library manages the SQLite photo catalog.
/// It stores one row per photo with its creation timestamp, and answers
/// newest-first queries for the stream pipeline.
pub struct Library {
    conn: Connection,
    db_path: PathBuf,
}

impl Library {
    /// Open (or create) the catalog at an explicit path
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(db_path)?;
        log::debug!("Catalog opened at {}", db_path.display());

        let library = Library {
            conn,
            db_path: db_path.to_path_buf(),
        };
        library.init_schema()?;

        Ok(library)
    }

    /// Get the path where the catalog is stored by default.
    ///
    /// The database file lives in the user's data directory:
    /// - Linux: ~/.local/share/gallery-stream/catalog.db
    /// - macOS: ~/Library/Application Support/gallery-stream/catalog.db
    /// - Windows: %APPDATA%\gallery-stream\catalog.db
    pub fn default_db_path() -> PathBuf {
        let mut path = dirs::data_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(std::env::temp_dir);

        path.push("gallery-stream");
        path.push("catalog.db");
        path
    }

    /// Create all tables and indexes if they don't exist.
    fn init_schema(&self) -> Result<()> {
        // created_at / imported_at are epoch milliseconds
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS assets (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                path            TEXT NOT NULL UNIQUE,
                filename        TEXT NOT NULL,
                created_at      INTEGER NOT NULL,
                imported_at     INTEGER NOT NULL,
                file_status     TEXT NOT NULL DEFAULT 'exists'
            )",
            [],
        )?;

        // Newest-first scans are the only query the pipeline runs
        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_assets_created_at
             ON assets(created_at DESC)",
            [],
        )?;

        Ok(())
    }

    /// Get a count of assets in the catalog
    pub fn asset_count(&self) -> Result<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM assets", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Add a photo to the catalog.
    /// Files that are already catalogued are reported as duplicates, unless
    /// their row was marked deleted: then it is restored with the new date.
    pub fn import_asset(
        &self,
        path: &str,
        filename: &str,
        created_at: DateTime<Utc>,
    ) -> Result<ImportOutcome> {
        let result = self.conn.execute(
            "INSERT INTO assets (path, filename, created_at, imported_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                path,
                filename,
                created_at.timestamp_millis(),
                Utc::now().timestamp_millis(),
            ],
        );

        match result {
            Ok(_) => Ok(ImportOutcome::Inserted(self.conn.last_insert_rowid())),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                let restored: Option<i64> = self
                    .conn
                    .query_row(
                        "UPDATE assets SET file_status = 'exists', created_at = ?2
                         WHERE path = ?1 AND file_status = 'deleted'
                         RETURNING id",
                        params![path, created_at.timestamp_millis()],
                        |row| row.get(0),
                    )
                    .optional()?;

                Ok(restored.map_or(ImportOutcome::Duplicate, ImportOutcome::Restored))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Get every live asset created at or before `until`, ordered by
    /// creation date (newest first).
    /// Ties are broken by id so repeated scans see the same order.
    pub fn get_assets_newest_first(&self, until: DateTime<Utc>) -> Result<Vec<Asset>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, path, filename, created_at FROM assets
             WHERE file_status = 'exists' AND created_at <= ?1
             ORDER BY created_at DESC, id DESC",
        )?;

        let assets = stmt
            .query_map([until.timestamp_millis()], asset_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(assets)
    }

    /// Verify that original files still exist on disk.
    /// Mark as 'deleted' if the file is missing, so scans skip it, and bring
    /// back deleted rows whose file has reappeared.
    /// Returns the number of rows newly marked deleted.
    pub fn verify_files(&self) -> Result<usize> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, path, file_status FROM assets")?;

        let rows: Vec<(i64, String, String)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut deleted_count = 0;
        let mut restored_count = 0;
        for (id, file_path, status) in rows {
            let on_disk = Path::new(&file_path).exists();
            let new_status = match (status.as_str(), on_disk) {
                ("exists", false) => {
                    deleted_count += 1;
                    "deleted"
                }
                ("deleted", true) => {
                    restored_count += 1;
                    "exists"
                }
                _ => continue,
            };
            self.conn.execute(
                "UPDATE assets SET file_status = ?2 WHERE id = ?1",
                params![id, new_status],
            )?;
        }

        if deleted_count > 0 {
            log::warn!("Marked {} missing files as deleted", deleted_count);
        }
        if restored_count > 0 {
            log::info!("Restored {} files found on disk again", restored_count);
        }

        Ok(deleted_count)
    }
}

fn asset_from_row(row: &Row<'_>) -> rusqlite::Result<Asset> {
    let created_ms: i64 = row.get(3)?;
    let created_at = DateTime::<Utc>::from_timestamp_millis(created_ms)
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(3, created_ms))?;

    Ok(Asset {
        id: row.get(0)?,
        path: row.get(1)?,
        filename: row.get(2)?,
        created_at,
    })
}

impl std::fmt::Debug for Library {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Library")
            .field("db_path", &self.db_path)
            .finish()
    }
}
