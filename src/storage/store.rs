use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::Value;
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteRow};
use sqlx::{Row, SqlitePool};

use super::MIGRATION_001_INITIAL;

/// Structured query object the store understands. Field paths are bound as
/// `json_extract` parameters, never spliced into SQL.
#[derive(Debug, Clone)]
pub enum Filter {
    /// Matches every document in the collection.
    All,
    /// Matches the document with the given id.
    Id(String),
    /// Matches documents whose field equals the given value.
    Eq(String, Value),
    /// Matches documents whose multi-valued field contains the given value.
    Contains(String, Value),
    /// Matches documents satisfying every inner filter.
    And(Vec<Filter>),
}

/// Owned bind argument for dynamically built statements.
enum Arg {
    Text(String),
    Int(i64),
    Real(f64),
}

fn arg_of(value: &Value) -> Arg {
    match value {
        Value::String(s) => Arg::Text(s.clone()),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Arg::Int(i),
            None => Arg::Real(n.as_f64().unwrap_or(0.0)),
        },
        Value::Bool(b) => Arg::Int(*b as i64),
        other => Arg::Text(other.to_string()),
    }
}

fn json_path(field: &str) -> String {
    format!("$.{field}")
}

fn push_filter(filter: &Filter, sql: &mut String, args: &mut Vec<Arg>) {
    match filter {
        Filter::All => sql.push_str("1 = 1"),
        Filter::Id(id) => {
            sql.push_str("id = ?");
            args.push(Arg::Text(id.clone()));
        }
        Filter::Eq(field, value) => {
            sql.push_str("json_extract(data, ?) = ?");
            args.push(Arg::Text(json_path(field)));
            args.push(arg_of(value));
        }
        Filter::Contains(field, value) => {
            sql.push_str(
                "EXISTS (SELECT 1 FROM json_each(documents.data, ?) WHERE json_each.value = ?)",
            );
            args.push(Arg::Text(json_path(field)));
            args.push(arg_of(value));
        }
        Filter::And(filters) => {
            if filters.is_empty() {
                sql.push_str("1 = 1");
                return;
            }
            sql.push('(');
            for (i, inner) in filters.iter().enumerate() {
                if i > 0 {
                    sql.push_str(" AND ");
                }
                push_filter(inner, sql, args);
            }
            sql.push(')');
        }
    }
}

fn where_clause(filter: &Filter) -> (String, Vec<Arg>) {
    let mut sql = String::new();
    let mut args = Vec::new();
    push_filter(filter, &mut sql, &mut args);
    (sql, args)
}

fn bind_args<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    args: Vec<Arg>,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for arg in args {
        query = match arg {
            Arg::Text(text) => query.bind(text),
            Arg::Int(value) => query.bind(value),
            Arg::Real(value) => query.bind(value),
        };
    }
    query
}

fn parse_data(row: &SqliteRow) -> Result<Value> {
    let data: String = row.get("data");
    serde_json::from_str(&data).context("Invalid document body")
}

/// Document store over SQLite. Collections are string-keyed; documents are
/// JSON bodies addressed by id.
///
/// Every method issues a single statement, so mutations are atomic per
/// document (bulk updates per statement). Nothing here spans a transaction
/// across statements.
#[derive(Clone)]
pub struct DocumentStore {
    pool: SqlitePool,
}

impl DocumentStore {
    /// Create a new store with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a SQLite database at the given path.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(database_url)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;
        Ok(())
    }

    /// Initialize a new database (connect + migrate).
    pub async fn init(database_url: &str) -> Result<Self> {
        let store = Self::connect(database_url).await?;
        store.migrate().await?;
        Ok(store)
    }

    // ========================
    // Lookups
    // ========================

    /// Point lookup by id.
    pub async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>> {
        let row = sqlx::query("SELECT data FROM documents WHERE collection = ? AND id = ?")
            .bind(collection)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch document")?;

        match row {
            Some(row) => Ok(Some(parse_data(&row)?)),
            None => Ok(None),
        }
    }

    /// Filtered bulk lookup, ordered by creation time.
    pub async fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<Value>> {
        let (clause, mut args) = where_clause(filter);
        let sql = format!(
            "SELECT data FROM documents WHERE collection = ? AND {clause} ORDER BY created_at, id"
        );

        let mut binds = vec![Arg::Text(collection.to_string())];
        binds.append(&mut args);

        let rows = bind_args(sqlx::query(&sql), binds)
            .fetch_all(&self.pool)
            .await
            .context("Failed to query documents")?;

        rows.iter().map(parse_data).collect()
    }

    /// Count documents matching the filter.
    pub async fn count(&self, collection: &str, filter: &Filter) -> Result<i64> {
        let (clause, mut args) = where_clause(filter);
        let sql = format!("SELECT COUNT(*) as count FROM documents WHERE collection = ? AND {clause}");

        let mut binds = vec![Arg::Text(collection.to_string())];
        binds.append(&mut args);

        let row = bind_args(sqlx::query(&sql), binds)
            .fetch_one(&self.pool)
            .await
            .context("Failed to count documents")?;

        Ok(row.get("count"))
    }

    // ========================
    // Mutations
    // ========================

    /// Insert a new document. Fails if the id is already taken.
    pub async fn insert(&self, collection: &str, id: &str, data: &Value) -> Result<()> {
        sqlx::query("INSERT INTO documents (collection, id, data, created_at) VALUES (?, ?, ?, ?)")
            .bind(collection)
            .bind(id)
            .bind(data.to_string())
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await
            .context("Failed to insert document")?;
        Ok(())
    }

    /// Overwrite named fields on every matching document. Returns the number
    /// of documents touched.
    pub async fn set_fields(
        &self,
        collection: &str,
        filter: &Filter,
        fields: &[(String, Value)],
    ) -> Result<u64> {
        if fields.is_empty() {
            return Ok(0);
        }

        let (clause, mut args) = where_clause(filter);
        let setters = vec!["?, json(?)"; fields.len()].join(", ");
        let sql = format!(
            "UPDATE documents SET data = json_set(data, {setters}) WHERE collection = ? AND {clause}"
        );

        let mut binds = Vec::new();
        for (field, value) in fields {
            binds.push(Arg::Text(json_path(field)));
            binds.push(Arg::Text(value.to_string()));
        }
        binds.push(Arg::Text(collection.to_string()));
        binds.append(&mut args);

        let result = bind_args(sqlx::query(&sql), binds)
            .execute(&self.pool)
            .await
            .context("Failed to update document fields")?;

        Ok(result.rows_affected())
    }

    /// Clear a single-valued field to null on every matching document.
    pub async fn clear_field(&self, collection: &str, filter: &Filter, field: &str) -> Result<u64> {
        let (clause, mut args) = where_clause(filter);
        let sql = format!(
            "UPDATE documents SET data = json_set(data, ?, json('null')) \
             WHERE collection = ? AND {clause}"
        );

        let mut binds = vec![Arg::Text(json_path(field)), Arg::Text(collection.to_string())];
        binds.append(&mut args);

        let result = bind_args(sqlx::query(&sql), binds)
            .execute(&self.pool)
            .await
            .context("Failed to clear field")?;

        Ok(result.rows_affected())
    }

    /// Atomically add `delta` to an integer field on every matching document.
    /// A missing field counts as zero. One statement, no read-modify-write.
    pub async fn increment(
        &self,
        collection: &str,
        filter: &Filter,
        field: &str,
        delta: i64,
    ) -> Result<u64> {
        let (clause, mut args) = where_clause(filter);
        let sql = format!(
            "UPDATE documents \
             SET data = json_set(data, ?, COALESCE(json_extract(data, ?), 0) + ?) \
             WHERE collection = ? AND {clause}"
        );

        let path = json_path(field);
        let mut binds = vec![
            Arg::Text(path.clone()),
            Arg::Text(path),
            Arg::Int(delta),
            Arg::Text(collection.to_string()),
        ];
        binds.append(&mut args);

        let result = bind_args(sqlx::query(&sql), binds)
            .execute(&self.pool)
            .await
            .context("Failed to increment field")?;

        Ok(result.rows_affected())
    }

    /// Remove a scalar value from a multi-valued field on every matching
    /// document (set-difference, not a full overwrite).
    pub async fn pull(
        &self,
        collection: &str,
        filter: &Filter,
        field: &str,
        value: &Value,
    ) -> Result<u64> {
        let (clause, mut args) = where_clause(filter);
        let sql = format!(
            "UPDATE documents \
             SET data = json_set(data, ?, \
                 json((SELECT COALESCE(json_group_array(json_each.value), json_array()) \
                       FROM json_each(documents.data, ?) WHERE json_each.value <> ?))) \
             WHERE collection = ? AND {clause}"
        );

        let path = json_path(field);
        let mut binds = vec![
            Arg::Text(path.clone()),
            Arg::Text(path),
            arg_of(value),
            Arg::Text(collection.to_string()),
        ];
        binds.append(&mut args);

        let result = bind_args(sqlx::query(&sql), binds)
            .execute(&self.pool)
            .await
            .context("Failed to pull value from field")?;

        Ok(result.rows_affected())
    }

    /// Atomically delete the matching document and return its prior body.
    pub async fn find_one_and_delete(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> Result<Option<Value>> {
        let (clause, mut args) = where_clause(filter);
        let sql = format!("DELETE FROM documents WHERE collection = ? AND {clause} RETURNING data");

        let mut binds = vec![Arg::Text(collection.to_string())];
        binds.append(&mut args);

        let row = bind_args(sqlx::query(&sql), binds)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to delete document")?;

        match row {
            Some(row) => Ok(Some(parse_data(&row)?)),
            None => Ok(None),
        }
    }
}
