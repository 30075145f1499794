//! Storage Module
//!
//! Connection lifecycle for the embedded store: path resolution, the
//! vector-extension load attempt, PRAGMA configuration, and idempotent
//! schema migration.
//!
//! Contract: callers either hold their own [`rusqlite::Connection`]
//! (tests, embedding callers) and run the operation functions against
//! it, or go through [`crate::MemoryEngine`], which acquires a fresh
//! connection per call. Writers commit explicitly; a caller-owned
//! connection is committed by the caller.

mod migrations;

pub use migrations::apply_migrations;

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use rusqlite::Connection;

use crate::error::{MemoryError, Result};

const IN_MEMORY: &str = ":memory:";

/// Handle on the primary store file.
///
/// Cheap to clone around; each [`Store::acquire`] opens a fresh
/// connection so cross-process coordination stays with SQLite's own
/// locking discipline.
#[derive(Debug, Clone)]
pub struct Store {
    path: PathBuf,
}

impl Store {
    /// Resolve the store location. `None` selects the platform data
    /// directory (`…/memlayer/memlayer.db`).
    pub fn open(db_path: Option<PathBuf>) -> Result<Self> {
        let path = match db_path {
            Some(p) => p,
            None => {
                let proj_dirs = ProjectDirs::from("io", "memlayer", "memlayer").ok_or_else(|| {
                    MemoryError::Init("Could not determine project directories".to_string())
                })?;
                proj_dirs.data_dir().join("memlayer.db")
            }
        };
        Ok(Self { path })
    }

    /// An in-memory store. Only meaningful with a caller-owned
    /// connection: every acquisition of `:memory:` is a fresh database.
    pub fn in_memory() -> Self {
        Self {
            path: PathBuf::from(IN_MEMORY),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn is_in_memory(&self) -> bool {
        self.path.as_os_str() == IN_MEMORY
    }

    /// Open and configure a connection.
    ///
    /// Ensures the parent directory exists, attempts the vector
    /// extension (silent on failure: the engine degrades to
    /// lexical-only search), and applies the PRAGMA set.
    pub fn acquire(&self) -> Result<Connection> {
        if !self.is_in_memory() {
            if let Some(dir) = self.path.parent() {
                if !dir.as_os_str().is_empty() {
                    std::fs::create_dir_all(dir)?;
                }
            }
        }

        #[cfg(feature = "vector-search")]
        register_vector_extension();

        let conn = Connection::open(&self.path)?;
        configure_connection(&conn, self.is_in_memory())?;
        Ok(conn)
    }

    /// Acquire a connection and apply migrations.
    pub fn init(&self) -> Result<Connection> {
        let conn = self.acquire()?;
        apply_migrations(&conn)?;
        Ok(conn)
    }
}

/// Apply PRAGMAs to a connection.
///
/// WAL is skipped for in-memory databases, which do not persist a
/// journal mode.
fn configure_connection(conn: &Connection, in_memory: bool) -> Result<()> {
    if !in_memory {
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
    }
    conn.execute_batch(
        "PRAGMA synchronous = NORMAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;",
    )?;
    Ok(())
}

/// Register sqlite-vec as an auto extension, once per process.
///
/// Registration happens before any connection opens so every
/// subsequently opened connection sees `vec_distance_L2`. A failed
/// registration only logs: retrieval falls back to lexical-only.
#[cfg(feature = "vector-search")]
fn register_vector_extension() {
    use std::sync::Once;

    static REGISTER: Once = Once::new();

    REGISTER.call_once(|| unsafe {
        let rc = rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute::<
            *const (),
            unsafe extern "C" fn(
                *mut rusqlite::ffi::sqlite3,
                *mut *mut std::os::raw::c_char,
                *const rusqlite::ffi::sqlite3_api_routines,
            ) -> std::os::raw::c_int,
        >(
            sqlite_vec::sqlite3_vec_init as *const ()
        )));
        if rc != rusqlite::ffi::SQLITE_OK {
            tracing::warn!("sqlite-vec registration failed (rc={}), vector search disabled", rc);
        }
    });
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn acquire_creates_parent_directory() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(Some(dir.path().join("nested/deeper/memlayer.db"))).unwrap();
        let conn = store.init().unwrap();

        let journal: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(journal.to_lowercase(), "wal");
    }

    #[test]
    fn in_memory_store_skips_wal() {
        let store = Store::in_memory();
        let conn = store.init().unwrap();

        let fk: i64 = conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0)).unwrap();
        assert_eq!(fk, 1);
    }

    #[test]
    fn busy_timeout_is_five_seconds() {
        let store = Store::in_memory();
        let conn = store.init().unwrap();

        let timeout: i64 = conn.query_row("PRAGMA busy_timeout", [], |row| row.get(0)).unwrap();
        assert_eq!(timeout, 5000);
    }
}
