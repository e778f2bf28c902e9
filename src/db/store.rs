//! SQLite-backed record store
//!
//! Every batch is written inside a single transaction with a cached
//! prepared statement, so a failed batch leaves no rows behind.

use crate::db::schema::{self, keys};
use crate::db::{ExtensionCount, IndexStats, RecordStore, SizeComparison};
use crate::error::{StoreError, StoreResult};
use crate::record::Record;
use parking_lot::Mutex;
use rusqlite::{params, Connection, Row};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

const UPSERT_FILE: &str = "INSERT INTO files (path, size, modified_at, extension, indexed_at)
     VALUES (?1, ?2, ?3, ?4, ?5)
     ON CONFLICT(path) DO UPDATE SET
         size = excluded.size,
         modified_at = excluded.modified_at,
         extension = excluded.extension,
         indexed_at = excluded.indexed_at";

const SELECT_COLUMNS: &str = "SELECT path, size, modified_at, extension FROM files";

/// Record store on a single SQLite connection
pub struct SqliteStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Open (or create) a database file
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                return Err(StoreError::Open {
                    path: path.to_path_buf(),
                    reason: format!("parent directory '{}' does not exist", parent.display()),
                });
            }
        }

        let conn = Connection::open(path).map_err(|e| StoreError::Open {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        schema::create_database(&conn)?;
        schema::set_index_info(&conn, keys::INDEXER_VERSION, env!("CARGO_PKG_VERSION"))?;

        debug!(path = %path.display(), "Opened index database");
        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        })
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        schema::create_database(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    /// Path of the database file, `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Number of indexed records
    pub fn count(&self) -> StoreResult<u64> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))?;
        Ok(to_u64(count))
    }

    /// Delete every record, returning how many were removed
    pub fn clear(&self) -> StoreResult<usize> {
        let conn = self.conn.lock();
        let removed = conn.execute("DELETE FROM files", [])?;
        debug!(removed, "Cleared index");
        Ok(removed)
    }

    /// Store a metadata value
    pub fn set_info(&self, key: &str, value: &str) -> StoreResult<()> {
        let conn = self.conn.lock();
        schema::set_index_info(&conn, key, value)
    }

    /// Read a metadata value
    pub fn get_info(&self, key: &str) -> StoreResult<Option<String>> {
        let conn = self.conn.lock();
        schema::get_index_info(&conn, key)
    }

    /// Stored schema version
    pub fn schema_version(&self) -> StoreResult<u32> {
        let conn = self.conn.lock();
        schema::schema_version(&conn)
    }

    fn query_records<P: rusqlite::Params>(&self, sql: &str, params: P) -> StoreResult<Vec<Record>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(sql)?;
        let rows = stmt.query_map(params, row_to_record)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

impl RecordStore for SqliteStore {
    fn insert_batch(&self, records: &[Record]) -> StoreResult<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let indexed_at = now_millis();
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let mut written = 0;

        {
            let mut stmt = tx.prepare_cached(UPSERT_FILE)?;
            for record in records {
                written += stmt.execute(params![
                    record.path(),
                    to_i64(record.size()),
                    record.modified_at(),
                    record.extension(),
                    indexed_at,
                ])?;
            }
        }

        tx.commit()?;
        Ok(written)
    }

    fn find_by_name_substring(&self, text: &str) -> StoreResult<Vec<Record>> {
        let pattern = format!("%{}%", escape_like(text));
        self.query_records(
            &format!("{SELECT_COLUMNS} WHERE path LIKE ?1 ESCAPE '\\' ORDER BY path"),
            [pattern],
        )
    }

    fn find_by_extension(&self, extension: &str) -> StoreResult<Vec<Record>> {
        self.query_records(
            &format!("{SELECT_COLUMNS} WHERE extension = ?1 ORDER BY path"),
            [extension.to_lowercase()],
        )
    }

    fn find_by_size(&self, threshold: i64, direction: SizeComparison) -> StoreResult<Vec<Record>> {
        let sql = match direction {
            SizeComparison::GreaterThan => {
                format!("{SELECT_COLUMNS} WHERE size > ?1 ORDER BY path")
            }
            SizeComparison::LessThan => {
                format!("{SELECT_COLUMNS} WHERE size < ?1 ORDER BY path")
            }
        };
        self.query_records(&sql, [threshold])
    }

    fn aggregate_stats(&self) -> StoreResult<IndexStats> {
        let conn = self.conn.lock();

        let (count, total_size, avg_size, max_size, distinct_extensions) = conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(size), 0),
                    COALESCE(AVG(size), 0.0),
                    COALESCE(MAX(size), 0),
                    COUNT(DISTINCT extension)
             FROM files",
            [],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, f64>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            },
        )?;

        let mut stmt = conn.prepare_cached(
            "SELECT extension, COUNT(*) AS n FROM files
             GROUP BY extension
             ORDER BY n DESC, extension ASC",
        )?;
        let histogram = stmt
            .query_map([], |row| {
                Ok(ExtensionCount {
                    extension: row.get(0)?,
                    count: to_u64(row.get(1)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(IndexStats {
            count: to_u64(count),
            total_size: to_u64(total_size),
            avg_size: avg_size.max(0.0) as u64,
            max_size: to_u64(max_size),
            distinct_extensions: to_u64(distinct_extensions),
            histogram,
        })
    }
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<Record> {
    Ok(Record::from_parts(
        row.get(0)?,
        to_u64(row.get(1)?),
        row.get(2)?,
        row.get(3)?,
    ))
}

/// Escape LIKE wildcards so user text matches literally
fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn to_u64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_store() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        let records = vec![
            Record::new("/data/report.pdf", 2_000_000, 1),
            Record::new("/data/Report_2023.PDF", 1_048_576, 2),
            Record::new("/data/notes.txt", 10, 3),
            Record::new("/data/src/main.rs", 500, 4),
            Record::new("/data/README", 1_048_577, 5),
            Record::new("/data/100%_done.txt", 20, 6),
        ];
        assert_eq!(store.insert_batch(&records).unwrap(), 6);
        store
    }

    fn paths(records: &[Record]) -> Vec<&str> {
        records.iter().map(|r| r.path()).collect()
    }

    #[test]
    fn test_insert_and_count() {
        let store = sample_store();
        assert_eq!(store.count().unwrap(), 6);
        assert_eq!(store.insert_batch(&[]).unwrap(), 0);
    }

    #[test]
    fn test_reinsert_replaces_by_path() {
        let store = sample_store();
        store
            .insert_batch(&[Record::new("/data/notes.txt", 99, 7)])
            .unwrap();

        assert_eq!(store.count().unwrap(), 6);
        let found = store.find_by_name_substring("notes").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].size(), 99);
    }

    #[test]
    fn test_find_by_name_substring() {
        let store = sample_store();
        let found = store.find_by_name_substring("report").unwrap();
        assert_eq!(paths(&found), vec!["/data/Report_2023.PDF", "/data/report.pdf"]);
    }

    #[test]
    fn test_find_by_name_escapes_wildcards() {
        let store = sample_store();
        let found = store.find_by_name_substring("100%").unwrap();
        assert_eq!(paths(&found), vec!["/data/100%_done.txt"]);

        // '_' must not match an arbitrary character
        assert!(store.find_by_name_substring("main_rs").unwrap().is_empty());
    }

    #[test]
    fn test_find_by_extension() {
        let store = sample_store();
        let lower = store.find_by_extension("pdf").unwrap();
        let upper = store.find_by_extension("PDF").unwrap();
        assert_eq!(lower, upper);
        assert_eq!(lower.len(), 2);

        let none = store.find_by_extension("").unwrap();
        assert_eq!(paths(&none), vec!["/data/README"]);
    }

    #[test]
    fn test_find_by_size_is_strict() {
        let store = sample_store();
        let larger = store
            .find_by_size(1_048_576, SizeComparison::GreaterThan)
            .unwrap();
        assert_eq!(paths(&larger), vec!["/data/README", "/data/report.pdf"]);

        let smaller = store.find_by_size(20, SizeComparison::LessThan).unwrap();
        assert_eq!(paths(&smaller), vec!["/data/notes.txt"]);
    }

    #[test]
    fn test_aggregate_stats() {
        let store = sample_store();
        let stats = store.aggregate_stats().unwrap();

        assert_eq!(stats.count, 6);
        assert_eq!(stats.total_size, 2_000_000 + 1_048_576 + 10 + 500 + 1_048_577 + 20);
        assert_eq!(stats.avg_size, stats.total_size / 6);
        assert_eq!(stats.max_size, 2_000_000);
        assert_eq!(stats.distinct_extensions, 4);
        assert_eq!(
            stats.histogram[0],
            ExtensionCount {
                extension: "pdf".into(),
                count: 2
            }
        );
        assert_eq!(stats.histogram[1].extension, "txt");
        assert_eq!(stats.histogram.len(), 4);
    }

    #[test]
    fn test_empty_stats() {
        let store = SqliteStore::open_in_memory().unwrap();
        let stats = store.aggregate_stats().unwrap();
        assert_eq!(stats, IndexStats::default());
    }

    #[test]
    fn test_clear_and_info() {
        let store = sample_store();
        assert_eq!(store.clear().unwrap(), 6);
        assert_eq!(store.count().unwrap(), 0);

        store.set_info(keys::STATUS, "completed").unwrap();
        assert_eq!(store.get_info(keys::STATUS).unwrap().as_deref(), Some("completed"));
    }

    #[test]
    fn test_open_file_database() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("index.db");

        {
            let store = SqliteStore::open(&db_path).unwrap();
            store
                .insert_batch(&[Record::new("/x/a.txt", 1, 0)])
                .unwrap();
        }

        let store = SqliteStore::open(&db_path).unwrap();
        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(store.path(), Some(db_path.as_path()));
        assert_eq!(
            store.get_info(keys::INDEXER_VERSION).unwrap().as_deref(),
            Some(env!("CARGO_PKG_VERSION"))
        );
    }

    #[test]
    fn test_open_missing_parent_fails() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("missing").join("index.db");
        assert!(matches!(
            SqliteStore::open(&db_path),
            Err(StoreError::Open { .. })
        ));
    }
}
