//! SQLite-backed persistence for imported media references.
//!
//! `MediaStore` owns the `photo_assets` table. The grid reads it through the
//! [`PhotoStore`] trait so hosts and tests can swap in another backend.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use parking_lot::Mutex;
use rusqlite::{params, Connection, Row, Transaction};
use tracing::{debug, info, warn};

use crate::models::{MediaHandle, MediaKind, MediaReference, MediaSubtype, StoredItem};

/// Persistence collaborator used by the grid and the import pipeline.
pub trait PhotoStore: Send + Sync {
    /// Persists one handle.
    fn create(&self, handle: &MediaHandle) -> Result<StoredItem>;

    /// Persists all handles in a single transaction.
    ///
    /// Either every handle is committed and returned in input order, or the
    /// transaction is rolled back and nothing is stored.
    fn create_batch(&self, handles: &[MediaHandle]) -> Result<Vec<StoredItem>>;

    /// Every stored item, oldest first.
    fn fetch_all(&self) -> Result<Vec<StoredItem>>;
}

/// SQLite photo store.
///
/// The database is stored at `XDG_CONFIG_HOME/photogrid/gallery.sqlite` by
/// default and uses WAL mode.
pub struct MediaStore {
    conn: Mutex<Connection>,
}

impl MediaStore {
    /// Opens or creates the database at the default XDG location.
    pub fn open_default() -> Result<Self> {
        let db_path = Self::default_db_path()?;
        Self::open(&db_path)
    }

    /// Returns the default database path based on XDG directories.
    pub fn default_db_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("", "", "photogrid")
            .context("Failed to determine project directories")?;

        let config_dir = proj_dirs.config_dir();
        std::fs::create_dir_all(config_dir)
            .with_context(|| format!("Failed to create config directory: {:?}", config_dir))?;

        Ok(config_dir.join("gallery.sqlite"))
    }

    /// Opens or creates the database at the specified path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create database directory: {:?}", parent))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {:?}", path))?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            PRAGMA foreign_keys = ON;
            ",
        )
        .context("Failed to configure SQLite pragmas")?;

        let store = Self::from_connection(conn)?;
        info!("Opened photo store at {:?}", path);
        Ok(store)
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_tables()?;
        Ok(store)
    }

    fn create_tables(&self) -> Result<()> {
        self.conn
            .lock()
            .execute_batch(
                "
            CREATE TABLE IF NOT EXISTS photo_assets (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                identifier TEXT NOT NULL,
                creation_date INTEGER NOT NULL,
                media_type INTEGER NOT NULL,
                media_subtypes INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_photo_assets_creation
                ON photo_assets(creation_date, id);
            ",
            )
            .context("Failed to create database tables")?;

        debug!("Database tables created/verified");
        Ok(())
    }

    fn insert_in_tx(tx: &Transaction, handles: &[MediaHandle], now: i64) -> Result<Vec<StoredItem>> {
        let mut stmt = tx.prepare_cached(
            "
            INSERT INTO photo_assets (identifier, creation_date, media_type, media_subtypes)
            VALUES (?1, ?2, ?3, ?4)
            ",
        )?;

        let mut stored = Vec::with_capacity(handles.len());
        for handle in handles {
            let reference = &handle.reference;
            stmt.execute(params![
                reference.identifier,
                now,
                reference.kind.to_raw(),
                reference.subtypes.bits() as i64,
            ])
            .with_context(|| format!("Failed to insert {}", reference.identifier))?;

            stored.push(StoredItem {
                id: tx.last_insert_rowid(),
                reference: MediaReference {
                    created_at: now,
                    ..reference.clone()
                },
            });
        }

        Ok(stored)
    }

    /// Returns the total count of stored items.
    pub fn count(&self) -> Result<i64> {
        let count: i64 = self
            .conn
            .lock()
            .query_row("SELECT COUNT(*) FROM photo_assets", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Returns the current Unix timestamp.
    pub fn now() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }

    /// Moves an unreadable database aside and starts a fresh one.
    pub fn handle_corruption(path: &Path) -> Result<Self> {
        warn!("Handling potential database corruption at {:?}", path);

        let backup_path = path.with_extension("sqlite.corrupted");
        if path.exists() {
            std::fs::rename(path, &backup_path).with_context(|| {
                format!("Failed to backup corrupted database to {:?}", backup_path)
            })?;
            warn!("Backed up corrupted database to {:?}", backup_path);
        }

        Self::open(path)
    }
}

impl PhotoStore for MediaStore {
    fn create(&self, handle: &MediaHandle) -> Result<StoredItem> {
        let mut stored = self.create_batch(std::slice::from_ref(handle))?;
        stored.pop().context("Insert returned no row")
    }

    fn create_batch(&self, handles: &[MediaHandle]) -> Result<Vec<StoredItem>> {
        if handles.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        // Dropping `tx` on error rolls the whole batch back.
        let stored = Self::insert_in_tx(&tx, handles, Self::now())?;
        tx.commit().context("Failed to commit photo batch")?;

        debug!(count = stored.len(), "Batch created photo assets");
        Ok(stored)
    }

    fn fetch_all(&self) -> Result<Vec<StoredItem>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "
            SELECT id, identifier, creation_date, media_type, media_subtypes
            FROM photo_assets
            ORDER BY creation_date ASC, id ASC
            ",
        )?;

        let items = stmt
            .query_map([], row_to_item)?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to query photo assets")?;

        Ok(items)
    }
}

fn row_to_item(row: &Row<'_>) -> rusqlite::Result<StoredItem> {
    Ok(StoredItem {
        id: row.get(0)?,
        reference: MediaReference {
            identifier: row.get(1)?,
            created_at: row.get(2)?,
            kind: MediaKind::from_raw(row.get(3)?),
            subtypes: MediaSubtype::from_bits(row.get::<_, i64>(4)? as u64),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn handle(identifier: &str) -> MediaHandle {
        MediaHandle::new(
            MediaReference::new(identifier, 0, MediaKind::Image),
            PathBuf::from(identifier),
        )
    }

    #[test]
    fn test_open_and_create() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.sqlite");

        let store = MediaStore::open(&db_path).unwrap();
        assert!(db_path.exists());
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_create_round_trips_fields() {
        let store = MediaStore::open_in_memory().unwrap();

        let mut live = handle("/photos/live.jpg");
        live.reference.subtypes = MediaSubtype::LIVE_PHOTO | MediaSubtype::HDR;
        let stored = store.create(&live).unwrap();
        assert!(stored.id > 0);

        let all = store.fetch_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0], stored);
        assert!(all[0].reference.is_live_photo());
        assert!(all[0].reference.subtypes.contains(MediaSubtype::HDR));
    }

    #[test]
    fn test_batch_preserves_input_order() {
        let store = MediaStore::open_in_memory().unwrap();

        let handles: Vec<MediaHandle> = (0..50)
            .map(|i| handle(&format!("/photos/{:02}.jpg", 49 - i)))
            .collect();
        let stored = store.create_batch(&handles).unwrap();
        assert_eq!(stored.len(), 50);

        let fetched = store.fetch_all().unwrap();
        let fetched_ids: Vec<&str> = fetched
            .iter()
            .map(|s| s.reference.identifier.as_str())
            .collect();
        let input_ids: Vec<&str> = handles.iter().map(|h| h.identifier()).collect();
        assert_eq!(fetched_ids, input_ids);
    }

    #[test]
    fn test_empty_batch_is_noop() {
        let store = MediaStore::open_in_memory().unwrap();
        assert!(store.create_batch(&[]).unwrap().is_empty());
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_failed_batch_rolls_back() {
        let store = MediaStore::open_in_memory().unwrap();
        store.create(&handle("/photos/existing.jpg")).unwrap();

        store
            .conn
            .lock()
            .execute_batch(
                "
                CREATE TRIGGER reject_poison BEFORE INSERT ON photo_assets
                WHEN NEW.identifier = 'poison'
                BEGIN SELECT RAISE(ABORT, 'poisoned'); END;
                ",
            )
            .unwrap();

        let batch = vec![handle("/photos/a.jpg"), handle("poison"), handle("/photos/b.jpg")];
        assert!(store.create_batch(&batch).is_err());

        let all = store.fetch_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].reference.identifier, "/photos/existing.jpg");
    }

    #[test]
    fn test_fetch_all_orders_by_creation() {
        let store = MediaStore::open_in_memory().unwrap();
        {
            let conn = store.conn.lock();
            conn.execute(
                "INSERT INTO photo_assets (identifier, creation_date, media_type, media_subtypes)
                 VALUES ('late', 200, 1, 0), ('early', 100, 2, 0)",
                [],
            )
            .unwrap();
        }

        let all = store.fetch_all().unwrap();
        assert_eq!(all[0].reference.identifier, "early");
        assert_eq!(all[0].reference.kind, MediaKind::Video);
        assert_eq!(all[1].reference.identifier, "late");
    }

    #[test]
    fn test_reopen_keeps_rows() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.sqlite");
        {
            let store = MediaStore::open(&db_path).unwrap();
            store
                .create_batch(&[handle("/a.jpg"), handle("/b.jpg")])
                .unwrap();
        }
        let store = MediaStore::open(&db_path).unwrap();
        assert_eq!(store.count().unwrap(), 2);
    }
}
