//! In-process schema creation for embedded databases.
//!
//! The embedded engine cannot run every operation the services' native
//! migration chains need, so a fresh database is created from the
//! service's schema bundle and stamped with the bundle's migration heads.
//! The result looks fully migrated to the service's own tooling.

use std::path::{Path, PathBuf};

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use stackinit_shared::errors::{StackError, StackResult};

/// Helper macro to convert rusqlite errors to StackError.
macro_rules! db_err {
    ($result:expr) => {
        $result.map_err(|e| StackError::Database(e.to_string()))
    };
}

/// Migration version marker table understood by the services' tooling.
pub const VERSION_TABLE: &str = "alembic_version";

/// Routing-table UUID of the placeholder cell.
pub const CELL0_UUID: &str = "00000000-0000-0000-0000-000000000000";

/// Transport URL of a cell without a message bus.
pub const NULL_TRANSPORT: &str = "none:///";

const VERSION_TABLE_DDL: &str = "
    CREATE TABLE IF NOT EXISTS alembic_version (
        version_num VARCHAR(32) NOT NULL,
        CONSTRAINT alembic_version_pkc PRIMARY KEY (version_num)
    );
";

const CELL_MAPPINGS_DDL: &str = "
    CREATE TABLE IF NOT EXISTS cell_mappings (
        created_at DATETIME,
        updated_at DATETIME,
        id INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,
        uuid VARCHAR(36) NOT NULL UNIQUE,
        name VARCHAR(255),
        transport_url TEXT NOT NULL,
        database_connection TEXT NOT NULL,
        disabled BOOLEAN DEFAULT 0
    );
";

/// DDL plus migration heads describing one service's model set.
///
/// Loaded from `<schema_dir>/<name>.sql` and `<schema_dir>/<name>.heads`.
#[derive(Debug, Clone)]
pub struct SchemaBundle {
    pub name: String,
    pub ddl: String,
    /// One head per independent migration chain.
    pub heads: Vec<String>,
}

impl SchemaBundle {
    /// Whether `<schema_dir>/<name>.sql` is present.
    pub fn exists(schema_dir: &Path, name: &str) -> bool {
        schema_dir.join(format!("{}.sql", name)).is_file()
    }

    pub fn load(schema_dir: &Path, name: &str) -> StackResult<Self> {
        let ddl_path = schema_dir.join(format!("{}.sql", name));
        let heads_path = schema_dir.join(format!("{}.heads", name));

        let ddl = std::fs::read_to_string(&ddl_path).map_err(|e| {
            StackError::Database(format!(
                "cannot read schema bundle {}: {}",
                ddl_path.display(),
                e
            ))
        })?;
        let heads_text = std::fs::read_to_string(&heads_path).map_err(|e| {
            StackError::Database(format!(
                "cannot read migration heads {}: {}",
                heads_path.display(),
                e
            ))
        })?;

        Self::new(name, ddl, &heads_text)
    }

    pub fn new(name: &str, ddl: String, heads_text: &str) -> StackResult<Self> {
        let heads: Vec<String> = heads_text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(String::from)
            .collect();
        if heads.is_empty() {
            return Err(StackError::Database(format!(
                "schema bundle {} declares no migration heads",
                name
            )));
        }
        Ok(Self {
            name: name.to_string(),
            ddl,
            heads,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaOutcome {
    Created,
    AlreadyStamped,
}

/// Handle on one embedded database file.
pub struct EmbeddedDatabase {
    path: PathBuf,
    conn: Connection,
}

impl EmbeddedDatabase {
    /// Open or create the database file.
    pub fn open(path: &Path) -> StackResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = db_err!(Connection::open(path))?;
        db_err!(conn.execute_batch(
            "
            PRAGMA foreign_keys=ON;
            PRAGMA busy_timeout=30000;
            "
        ))?;

        Ok(Self {
            path: path.to_path_buf(),
            conn,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn table_exists(&self, table: &str) -> StackResult<bool> {
        let found: Option<String> = db_err!(
            self.conn
                .query_row(
                    "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
                    [table],
                    |row| row.get(0),
                )
                .optional()
        )?;
        Ok(found.is_some())
    }

    /// Migration heads currently stamped, empty when unstamped.
    pub fn stamped_heads(&self) -> StackResult<Vec<String>> {
        if !self.table_exists(VERSION_TABLE)? {
            return Ok(Vec::new());
        }
        let mut stmt = db_err!(
            self.conn
                .prepare("SELECT version_num FROM alembic_version ORDER BY version_num")
        )?;
        let rows = db_err!(stmt.query_map([], |row| row.get::<_, String>(0)))?;
        let mut heads = Vec::new();
        for head in rows {
            heads.push(db_err!(head)?);
        }
        Ok(heads)
    }

    /// Create every table of `bundle` and stamp its heads in one transaction.
    ///
    /// A database that already carries a version stamp is left untouched.
    pub fn create_and_stamp(&mut self, bundle: &SchemaBundle) -> StackResult<SchemaOutcome> {
        let existing = self.stamped_heads()?;
        if !existing.is_empty() {
            tracing::info!(
                bundle = %bundle.name,
                path = %self.path.display(),
                heads = ?existing,
                "Embedded schema already stamped, skipping creation"
            );
            return Ok(SchemaOutcome::AlreadyStamped);
        }

        let tx = db_err!(self.conn.transaction())?;
        db_err!(tx.execute_batch(&bundle.ddl))?;
        db_err!(tx.execute_batch(VERSION_TABLE_DDL))?;
        for head in &bundle.heads {
            db_err!(tx.execute(
                "INSERT INTO alembic_version (version_num) VALUES (?1)",
                [head],
            ))?;
        }
        db_err!(tx.commit())?;

        tracing::info!(
            bundle = %bundle.name,
            path = %self.path.display(),
            heads = ?bundle.heads,
            "Created embedded schema"
        );
        Ok(SchemaOutcome::Created)
    }

    /// Register the placeholder and primary cells when the routing table is empty.
    ///
    /// Returns whether rows were inserted.
    pub fn seed_cell_mappings(
        &mut self,
        cell0_connection: &str,
        cell1_connection: &str,
        cell1_transport: &str,
    ) -> StackResult<bool> {
        let tx = db_err!(self.conn.transaction())?;
        db_err!(tx.execute_batch(CELL_MAPPINGS_DDL))?;

        let count: i64 = db_err!(tx.query_row("SELECT COUNT(*) FROM cell_mappings", [], |row| {
            row.get(0)
        }))?;
        if count > 0 {
            tracing::debug!(count, "Cell mappings already present");
            return Ok(false);
        }

        let now = Utc::now().to_rfc3339();
        let cell1_uuid = uuid::Uuid::new_v4().to_string();
        for (uuid, name, transport, connection) in [
            (CELL0_UUID, "cell0", NULL_TRANSPORT, cell0_connection),
            (cell1_uuid.as_str(), "cell1", cell1_transport, cell1_connection),
        ] {
            db_err!(tx.execute(
                "INSERT INTO cell_mappings
                     (created_at, uuid, name, transport_url, database_connection, disabled)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0)",
                rusqlite::params![now, uuid, name, transport, connection],
            ))?;
        }
        db_err!(tx.commit())?;

        tracing::info!(cell1 = %cell1_uuid, "Seeded cell mappings");
        Ok(true)
    }

    #[cfg(test)]
    fn conn(&self) -> &Connection {
        &self.conn
    }
}
