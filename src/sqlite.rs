use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rusqlite::{params_from_iter, Connection};
use tracing::{debug, warn};

use crate::database::{Database, ExecuteResult};
use crate::ddl;
use crate::error::{DatabaseError, Result};
use crate::query::{Dialect, SqlQuery};
use crate::value::{Row, Value};

const DB_SUFFIX: &str = ".db";

/// SQLite database configuration
#[derive(Debug, Clone, PartialEq)]
pub struct SqliteConfig {
    /// Path to the SQLite database file, always ending in `.db`
    pub db_path: PathBuf,
    /// Directory of `.sql` scripts used to build a new database
    pub ddl_dir: Option<PathBuf>,
    /// Delete and rebuild the database even if the file exists
    pub force_rebuild: bool,
}

impl SqliteConfig {
    /// Config for `db_path`; `.db` is appended when the path lacks it.
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: with_db_extension(db_path.into()),
            ddl_dir: None,
            force_rebuild: false,
        }
    }

    pub fn with_ddl(mut self, ddl_dir: impl Into<PathBuf>) -> Self {
        self.ddl_dir = Some(ddl_dir.into());
        self
    }

    pub fn force_rebuild(mut self, force_rebuild: bool) -> Self {
        self.force_rebuild = force_rebuild;
        self
    }
}

fn with_db_extension(path: PathBuf) -> PathBuf {
    // Suffix check rather than `Path::extension`, which is None for `.db`.
    let has_suffix = path
        .file_name()
        .is_some_and(|name| name.to_string_lossy().ends_with(DB_SUFFIX));
    if has_suffix {
        return path;
    }
    let mut raw = path.into_os_string();
    raw.push(DB_SUFFIX);
    PathBuf::from(raw)
}

/// SQLite database backed by a single file.
///
/// Holds only the file location; every call opens its own connection with
/// foreign keys enforced and closes it before returning.
#[derive(Debug, Clone)]
pub struct SqliteDatabase {
    path: PathBuf,
}

impl SqliteDatabase {
    /// Open the database at `config.db_path`, building it from the DDL
    /// directory when the file does not exist or a rebuild is forced.
    pub fn open(config: SqliteConfig) -> Result<Self> {
        let db = Self {
            path: config.db_path,
        };

        if db.path.exists() && !config.force_rebuild {
            debug!(path = %db.path.display(), "using existing database");
            return Ok(db);
        }
        if config.force_rebuild {
            warn!(path = %db.path.display(), "force rebuilding the database");
        }

        let ddl_dir = config
            .ddl_dir
            .ok_or_else(|| DatabaseError::MissingDdl(db.path.clone()))?;
        db.build(&ddl_dir)?;
        Ok(db)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn build(&self, ddl_dir: &Path) -> Result<()> {
        // Validate the DDL location before touching an existing file.
        let scripts = ddl::discover(ddl_dir)?;

        if self.path.exists() {
            debug!(path = %self.path.display(), "deleting old database");
            fs::remove_file(&self.path).map_err(|e| DatabaseError::io(&self.path, e))?;
        }
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| DatabaseError::io(parent, e))?;
        }

        debug!(path = %self.path.display(), scripts = scripts.len(), "creating database");
        let applied = self.with_connection(|conn| {
            for script in &scripts {
                debug!(script = %script.display(), "loading DDL");
                conn.execute_batch(&ddl::load(script)?)?;
            }
            Ok(())
        });
        if let Err(e) = applied {
            // Leave no half-built file behind so the next open rebuilds it.
            if let Err(cleanup) = fs::remove_file(&self.path) {
                warn!(
                    path = %self.path.display(),
                    error = %cleanup,
                    "failed to remove partially built database"
                );
            }
            return Err(e);
        }

        debug!(path = %self.path.display(), "created database");
        Ok(())
    }

    /// Open a new connection with foreign key enforcement on.
    pub fn open_connection(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(conn)
    }

    /// Run `f` on a scoped connection, closed once `f` returns.
    ///
    /// Entry point for custom queries; uncommitted transactions opened by
    /// `f` roll back when the connection drops.
    pub fn with_connection<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut conn = self.open_connection()?;
        f(&mut conn)
    }

    async fn run_blocking<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || db.with_connection(f)).await?
    }
}

#[async_trait]
impl Database for SqliteDatabase {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn execute(&self, query: SqlQuery) -> Result<ExecuteResult> {
        self.run_blocking(move |conn| {
            let tx = conn.transaction()?;
            let rows_affected = tx.execute(&query.statement, params_from_iter(query.params.iter()))?;
            // Fresh connection, so a non-zero rowid came from this statement.
            let rowid = tx.last_insert_rowid();
            tx.commit()?;
            Ok(ExecuteResult {
                rows_affected: rows_affected as u64,
                last_insert_id: (rowid != 0).then_some(rowid),
            })
        })
        .await
    }

    async fn fetch(&self, query: SqlQuery) -> Result<Vec<Row>> {
        self.run_blocking(move |conn| {
            let mut stmt = conn.prepare(&query.statement)?;
            let columns = stmt.column_count();
            let rows = stmt
                .query_map(params_from_iter(query.params.iter()), |row| {
                    (0..columns)
                        .map(|i| row.get::<_, Value>(i))
                        .collect::<rusqlite::Result<Row>>()
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
        .await
    }
}
