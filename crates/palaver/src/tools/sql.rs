//! SQLite introspection and query tools.
//!
//! Three tools share one [`SqlDatabase`] handle:
//!
//! | Tool | Purpose |
//! |------|---------|
//! | [`SqlListTables`] | `sql_list_tables`: names of user tables |
//! | [`SqlSchema`] | `sql_schema`: `CREATE` statements plus sample rows |
//! | [`SqlQuery`] | `sql_query`: run one statement, return rows or a row count |
//!
//! Each call opens its own connection on a blocking thread.

use super::core::{Tool, ToolFuture, ToolSet, parse_tool_args};
use super::describe::ToolDescription;
use crate::error::{ChatError, ToolError};
use crate::{Arguments, ToolDef};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags, params};
use schemars::JsonSchema;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Rows returned by `sql_query` before the output is cut off.
pub const MAX_QUERY_ROWS: usize = 50;

/// Sample rows shown per table by `sql_schema`.
pub const SAMPLE_ROWS: usize = 3;

/// Handle to a SQLite database file.
#[derive(Debug, Clone)]
pub struct SqlDatabase {
    path: PathBuf,
    read_only: bool,
}

impl SqlDatabase {
    /// Open `path` and check that it is a readable SQLite database.
    ///
    /// A read-only handle rejects writes from `sql_query`.
    pub fn open(path: impl AsRef<Path>, read_only: bool) -> Result<Self, ChatError> {
        let db = Self {
            path: path.as_ref().to_path_buf(),
            read_only,
        };
        let conn = db
            .connect()
            .map_err(|e| ChatError::Config(format!("cannot open database {}: {e}", db.path.display())))?;
        conn.query_row("SELECT count(*) FROM sqlite_master", [], |row| row.get::<_, i64>(0))
            .map_err(|e| ChatError::Config(format!("{} is not a SQLite database: {e}", db.path.display())))?;
        Ok(db)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn connect(&self) -> rusqlite::Result<Connection> {
        let flags = if self.read_only {
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX
        } else {
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX
        };
        Connection::open_with_flags(&self.path, flags)
    }

    /// Run `f` against a fresh connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, ToolError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || {
            let conn = db.connect()?;
            f(&conn)
        })
        .await
        .map_err(|e| ToolError::execution(format!("database task failed: {e}")))?
        .map_err(|e| ToolError::execution(format!("database error: {e}")))
    }

    /// User table names, sorted.
    pub async fn list_tables(&self) -> Result<Vec<String>, ToolError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT name FROM sqlite_master \
                 WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
            )?;
            let names = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(names)
        })
        .await
    }

    /// `CREATE` statement and sample rows for each table.
    pub async fn describe(&self, tables: Vec<String>) -> Result<String, ToolError> {
        let known = self.list_tables().await?;
        if let Some(missing) = tables.iter().find(|t| !known.contains(t)) {
            return Err(ToolError::execution(format!(
                "table '{missing}' not found. Available tables: {}",
                known.join(", ")
            )));
        }

        self.with_conn(move |conn| {
            let mut sections = Vec::with_capacity(tables.len());
            for table in &tables {
                let create: String = conn.query_row(
                    "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?1",
                    params![table],
                    |row| row.get(0),
                )?;
                let sample = select_rows(
                    conn,
                    &format!("SELECT * FROM {} LIMIT {SAMPLE_ROWS}", quote_ident(table)),
                    SAMPLE_ROWS,
                )?;
                sections.push(format!(
                    "{create};\n\n/*\n{SAMPLE_ROWS} rows from {table} table:\n{}\n*/",
                    sample.render()
                ));
            }
            Ok(sections.join("\n\n"))
        })
        .await
    }

    /// Execute one statement.
    pub async fn run(&self, query: String) -> Result<String, ToolError> {
        debug!("sql_query: {query}");
        self.with_conn(move |conn| {
            let stmt = conn.prepare(&query)?;
            if stmt.column_count() > 0 {
                drop(stmt);
                let rows = select_rows(conn, &query, MAX_QUERY_ROWS)?;
                Ok(if rows.rows.is_empty() {
                    format!("{}\n(no rows)", rows.columns.join(" | "))
                } else {
                    rows.render()
                })
            } else {
                drop(stmt);
                let changed = conn.execute(&query, [])?;
                Ok(format!("{changed} row(s) affected"))
            }
        })
        .await
    }
}

struct RowSet {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
    truncated: bool,
}

impl RowSet {
    fn render(&self) -> String {
        let mut lines = vec![self.columns.join(" | ")];
        lines.extend(self.rows.iter().map(|r| r.join(" | ")));
        if self.truncated {
            lines.push(format!("[only the first {} rows shown]", self.rows.len()));
        }
        lines.join("\n")
    }
}

fn select_rows(conn: &Connection, sql: &str, limit: usize) -> rusqlite::Result<RowSet> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
    let width = columns.len();
    let mut rows = stmt.query([])?;
    let mut out = Vec::new();
    let mut truncated = false;
    while let Some(row) = rows.next()? {
        if out.len() == limit {
            truncated = true;
            break;
        }
        let cells = (0..width)
            .map(|i| row.get_ref(i).map(render_value))
            .collect::<rusqlite::Result<Vec<_>>>()?;
        out.push(cells);
    }
    Ok(RowSet {
        columns,
        rows: out,
        truncated,
    })
}

fn render_value(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => "NULL".into(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(t) => String::from_utf8_lossy(t).into_owned(),
        ValueRef::Blob(b) => format!("<blob {} bytes>", b.len()),
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

// ── Tools ──────────────────────────────────────────────────────────

/// `sql_list_tables`
pub struct SqlListTables {
    db: SqlDatabase,
}

impl SqlListTables {
    pub fn new(db: SqlDatabase) -> Self {
        Self { db }
    }
}

impl Tool for SqlListTables {
    fn definition(&self) -> ToolDef {
        ToolDescription::new("sql_list_tables", "List the tables in the connected SQL database")
            .when_to_use("First, before writing any query, to learn which tables exist")
            .output_format("Comma-separated table names")
            .into_def()
    }

    fn execute(&self, _arguments: &Arguments) -> ToolFuture<'_> {
        Box::pin(async move {
            let tables = self.db.list_tables().await?;
            Ok(if tables.is_empty() {
                "The database has no tables".to_string()
            } else {
                tables.join(", ")
            })
        })
    }
}

#[derive(Deserialize, JsonSchema)]
pub struct SqlSchemaArgs {
    /// Table names to describe, as returned by sql_list_tables.
    pub tables: Vec<String>,
}

/// `sql_schema`
pub struct SqlSchema {
    db: SqlDatabase,
}

impl SqlSchema {
    pub fn new(db: SqlDatabase) -> Self {
        Self { db }
    }
}

impl Tool for SqlSchema {
    fn definition(&self) -> ToolDef {
        ToolDescription::new(
            "sql_schema",
            "Show the schema and a few sample rows for the given tables",
        )
        .when_to_use("Before writing a query, to check column names and types")
        .when_not_to_use("To find out which tables exist; use sql_list_tables")
        .parameters_for::<SqlSchemaArgs>()
        .example("sql_schema(tables=['orders'])", "CREATE TABLE orders (...) plus 3 rows")
        .into_def()
    }

    fn execute(&self, arguments: &Arguments) -> ToolFuture<'_> {
        let parsed = parse_tool_args::<SqlSchemaArgs>("sql_schema", arguments);
        Box::pin(async move {
            let args = parsed?;
            if args.tables.is_empty() {
                return Err(ToolError::InvalidArguments {
                    tool: "sql_schema".into(),
                    reason: "at least one table name is required".into(),
                });
            }
            self.db.describe(args.tables).await
        })
    }
}

#[derive(Deserialize, JsonSchema)]
pub struct SqlQueryArgs {
    /// A single SQL statement.
    pub query: String,
}

/// `sql_query`
pub struct SqlQuery {
    db: SqlDatabase,
}

impl SqlQuery {
    pub fn new(db: SqlDatabase) -> Self {
        Self { db }
    }
}

impl Tool for SqlQuery {
    fn definition(&self) -> ToolDef {
        let when_not = if self.db.is_read_only() {
            "To explore table structure; use sql_schema. To modify data; the database is read-only"
        } else {
            "To explore table structure; use sql_schema"
        };
        ToolDescription::new(
            "sql_query",
            "Execute one SQL statement against the database and return the result",
        )
        .when_to_use("After checking the schema with sql_schema")
        .when_not_to_use(when_not)
        .parameters_for::<SqlQueryArgs>()
        .output_format(format!(
            "Header line and up to {MAX_QUERY_ROWS} rows, columns separated by ' | '; \
             for statements without results, the number of rows affected"
        ))
        .into_def()
    }

    fn execute(&self, arguments: &Arguments) -> ToolFuture<'_> {
        let parsed = parse_tool_args::<SqlQueryArgs>("sql_query", arguments);
        Box::pin(async move {
            let args = parsed?;
            if args.query.trim().is_empty() {
                return Err(ToolError::InvalidArguments {
                    tool: "sql_query".into(),
                    reason: "query must not be empty".into(),
                });
            }
            self.db.run(args.query).await
        })
    }
}

impl ToolSet {
    /// Register `sql_list_tables`, `sql_schema` and `sql_query` for `db`.
    pub fn with_sql_tools(self, db: SqlDatabase) -> Self {
        self.with(SqlListTables::new(db.clone()))
            .with(SqlSchema::new(db.clone()))
            .with(SqlQuery::new(db))
    }
}
