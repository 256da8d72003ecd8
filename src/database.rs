use async_trait::async_trait;
use tracing::debug;

use crate::error::Result;
use crate::query::{
    CreateOperation, CrudOperation, DeleteOperation, Dialect, Query, ReadOperation, SqlQuery,
    UpdateOperation, UpsertOperation,
};
use crate::table::Table;
use crate::value::Row;

/// Outcome of a statement that does not return rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecuteResult {
    pub rows_affected: u64,
    /// Auto-increment id of the last inserted row, when the engine reports one.
    pub last_insert_id: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Updated,
    Inserted(Option<i64>),
    /// The row already held the given values.
    Unchanged,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CrudOutcome {
    Inserted(Option<i64>),
    Rows(Vec<Row>),
    Updated(bool),
    Deleted(u64),
    Upserted(UpsertOutcome),
}

/// Shared CRUD interface over a SQL engine.
///
/// Engines provide [`execute`](Database::execute) and
/// [`fetch`](Database::fetch); every helper is built on those two. Each call
/// acquires its own connection and releases it before returning.
#[async_trait]
pub trait Database: Send + Sync {
    fn dialect(&self) -> Dialect;

    /// Run a statement that returns no rows, committing on success.
    async fn execute(&self, query: SqlQuery) -> Result<ExecuteResult>;

    /// Run a statement and collect every row it returns.
    async fn fetch(&self, query: SqlQuery) -> Result<Vec<Row>>;

    /// Insert one row, returning the auto-increment id if one was assigned.
    async fn insert(&self, op: CreateOperation) -> Result<Option<i64>> {
        let query = op.build(self.dialect())?;
        let result = self.execute(query).await?;
        debug!(table = %op.table, id = ?result.last_insert_id, "inserted row");
        Ok(result.last_insert_id)
    }

    async fn select(&self, op: ReadOperation) -> Result<Vec<Row>> {
        let query = op.build(self.dialect())?;
        self.fetch(query).await
    }

    /// First matching row, if any.
    async fn select_one(&self, op: ReadOperation) -> Result<Option<Row>> {
        let rows = self.select(op.limit(1)).await?;
        Ok(rows.into_iter().next())
    }

    /// Whether any row in `table` matches `query`.
    async fn exists(&self, table: &(dyn Table + Sync), query: Query) -> Result<bool> {
        let op = ReadOperation::new(table).query(query);
        Ok(self.select_one(op).await?.is_some())
    }

    /// Returns true when at least one row changed.
    async fn update(&self, op: UpdateOperation) -> Result<bool> {
        let query = op.build(self.dialect())?;
        let result = self.execute(query).await?;
        let changed = result.rows_affected > 0;
        if changed {
            debug!(table = %op.table, rows = result.rows_affected, "updated rows");
        }
        Ok(changed)
    }

    async fn delete(&self, op: DeleteOperation) -> Result<u64> {
        let query = op.build(self.dialect())?;
        let result = self.execute(query).await?;
        debug!(table = %op.table, rows = result.rows_affected, "deleted rows");
        Ok(result.rows_affected)
    }

    /// Update the keyed row, inserting it when no row changed.
    async fn upsert(&self, op: UpsertOperation) -> Result<UpsertOutcome> {
        if !op.updates.is_empty() && self.update(op.update_operation()).await? {
            debug!(table = %op.table, "Updated {}", op.describe_keys());
            return Ok(UpsertOutcome::Updated);
        }
        match self.insert(op.create_operation()).await {
            Ok(id) => {
                debug!(table = %op.table, "Inserted {}", op.describe_keys());
                Ok(UpsertOutcome::Inserted(id))
            }
            // MySQL counts a no-op update as zero affected rows, so the
            // keyed row may exist with identical values. Any other unique
            // collision is a lost write and surfaces as an error.
            Err(e) if e.is_unique_violation() => {
                let keys: Query = op.primary_keys.iter().cloned().collect();
                if !keys.is_empty() && self.exists(&op.table, keys).await? {
                    Ok(UpsertOutcome::Unchanged)
                } else {
                    Err(e)
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Perform a CRUD operation
    async fn execute_crud(&self, op: CrudOperation) -> Result<CrudOutcome> {
        Ok(match op {
            CrudOperation::Create(op) => CrudOutcome::Inserted(self.insert(op).await?),
            CrudOperation::Read(op) => CrudOutcome::Rows(self.select(op).await?),
            CrudOperation::Update(op) => CrudOutcome::Updated(self.update(op).await?),
            CrudOperation::Delete(op) => CrudOutcome::Deleted(self.delete(op).await?),
            CrudOperation::Upsert(op) => CrudOutcome::Upserted(self.upsert(op).await?),
        })
    }
}
