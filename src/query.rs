//! Statement builders for the CRUD helpers.
//!
//! Every builder renders a [`SqlQuery`] with positional `?` placeholders,
//! which both `rusqlite` and the MySQL driver accept. Table and column names
//! are validated and quoted for the target [`Dialect`]; values are always
//! bound, never spliced into the statement.

use crate::error::{DatabaseError, Result};
use crate::table::Table;
use crate::value::Value;

/// SQL flavour a statement is rendered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    MySql,
}

impl Dialect {
    /// Validate `ident` and quote each dot-separated segment.
    pub fn quote(self, ident: &str) -> Result<String> {
        validate_identifier(ident)?;
        let (open, close) = match self {
            Dialect::Sqlite => ('"', '"'),
            Dialect::MySql => ('`', '`'),
        };
        Ok(ident
            .split('.')
            .map(|segment| format!("{open}{segment}{close}"))
            .collect::<Vec<_>>()
            .join("."))
    }

    /// Expression appending a bound value to a quoted column.
    fn append(self, quoted: &str) -> String {
        match self {
            Dialect::Sqlite => format!("COALESCE({quoted}, '') || ?"),
            Dialect::MySql => format!("CONCAT(COALESCE({quoted}, ''), ?)"),
        }
    }

    fn empty_insert(self) -> &'static str {
        match self {
            Dialect::Sqlite => "DEFAULT VALUES",
            Dialect::MySql => "() VALUES ()",
        }
    }

    // Neither engine accepts OFFSET without LIMIT.
    fn unbounded_limit(self) -> &'static str {
        match self {
            Dialect::Sqlite => "-1",
            Dialect::MySql => "18446744073709551615",
        }
    }
}

/// Accepts `name` or `schema.name` where every segment is
/// `[A-Za-z_][A-Za-z0-9_]*`.
pub fn validate_identifier(ident: &str) -> Result<()> {
    let valid = !ident.is_empty()
        && ident.split('.').all(|segment| {
            let mut chars = segment.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        });
    if valid {
        Ok(())
    } else {
        Err(DatabaseError::InvalidIdentifier(ident.to_string()))
    }
}

/// SQL statement with positional parameters
#[derive(Debug, Clone, PartialEq)]
pub struct SqlQuery {
    pub statement: String,
    pub params: Vec<Value>,
}

impl SqlQuery {
    pub fn new(statement: impl Into<String>) -> Self {
        Self {
            statement: statement.into(),
            params: Vec::new(),
        }
    }

    pub fn with_params(mut self, params: Vec<Value>) -> Self {
        self.params = params;
        self
    }

    /// Append one positional parameter.
    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.params.push(value.into());
        self
    }
}

/// Comparison applied to a column in a WHERE clause
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOperator {
    Equals(Value),
    NotEquals(Value),
    GreaterThan(Value),
    GreaterThanOrEqual(Value),
    LessThan(Value),
    LessThanOrEqual(Value),
    Like(String),
    In(Vec<Value>),
}

/// Conditions joined with `AND`, rendered in insertion order.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Query {
    pub conditions: Vec<(String, QueryOperator)>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_condition(mut self, field: impl Into<String>, op: QueryOperator) -> Self {
        self.conditions.push((field.into(), op));
        self
    }

    /// `field = value`, or `field IS NULL` when the value is null.
    pub fn where_equals(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with_condition(field, QueryOperator::Equals(value.into()))
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Render the predicate (without the `WHERE` keyword), pushing bound
    /// values onto `params`. `None` when there are no conditions.
    pub fn render(&self, dialect: Dialect, params: &mut Vec<Value>) -> Result<Option<String>> {
        if self.conditions.is_empty() {
            return Ok(None);
        }
        let mut clauses = Vec::with_capacity(self.conditions.len());
        for (field, op) in &self.conditions {
            let column = dialect.quote(field)?;
            let clause = match op {
                QueryOperator::Equals(Value::Null) => format!("{column} IS NULL"),
                QueryOperator::NotEquals(Value::Null) => format!("{column} IS NOT NULL"),
                QueryOperator::Equals(v) => bound(&column, "=", v, params),
                QueryOperator::NotEquals(v) => bound(&column, "<>", v, params),
                QueryOperator::GreaterThan(v) => bound(&column, ">", v, params),
                QueryOperator::GreaterThanOrEqual(v) => bound(&column, ">=", v, params),
                QueryOperator::LessThan(v) => bound(&column, "<", v, params),
                QueryOperator::LessThanOrEqual(v) => bound(&column, "<=", v, params),
                QueryOperator::Like(pattern) => {
                    params.push(Value::Text(pattern.clone()));
                    format!("{column} LIKE ?")
                }
                QueryOperator::In(values) if values.is_empty() => "1 = 0".to_string(),
                QueryOperator::In(values) => {
                    params.extend(values.iter().cloned());
                    format!("{column} IN ({})", placeholders(values.len()))
                }
            };
            clauses.push(clause);
        }
        Ok(Some(clauses.join(" AND ")))
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Query {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Query::new(), |q, (k, v)| q.where_equals(k, v))
    }
}

fn bound(column: &str, op: &str, value: &Value, params: &mut Vec<Value>) -> String {
    params.push(value.clone());
    format!("{column} {op} ?")
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn append_where(
    sql: &mut String,
    query: &Query,
    dialect: Dialect,
    params: &mut Vec<Value>,
) -> Result<()> {
    if let Some(predicate) = query.render(dialect, params)? {
        sql.push_str(" WHERE ");
        sql.push_str(&predicate);
    }
    Ok(())
}

/// Insert one row
#[derive(Debug, Clone, PartialEq)]
pub struct CreateOperation {
    pub table: String,
    pub data: Vec<(String, Value)>,
}

impl CreateOperation {
    pub fn new(table: impl Table) -> Self {
        Self {
            table: table.name().to_string(),
            data: Vec::new(),
        }
    }

    pub fn value(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.push((column.into(), value.into()));
        self
    }

    pub fn build(&self, dialect: Dialect) -> Result<SqlQuery> {
        let table = dialect.quote(&self.table)?;
        if self.data.is_empty() {
            return Ok(SqlQuery::new(format!(
                "INSERT INTO {table} {}",
                dialect.empty_insert()
            )));
        }
        let columns = self
            .data
            .iter()
            .map(|(c, _)| dialect.quote(c))
            .collect::<Result<Vec<_>>>()?;
        let statement = format!(
            "INSERT INTO {table} ({}) VALUES ({})",
            columns.join(", "),
            placeholders(columns.len())
        );
        Ok(SqlQuery::new(statement).with_params(self.data.iter().map(|(_, v)| v.clone()).collect()))
    }
}

/// Select rows
#[derive(Debug, Clone, PartialEq)]
pub struct ReadOperation {
    pub table: String,
    pub query: Query,
    pub fields: Option<Vec<String>>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub order_by: Vec<(String, bool)>, // (field, is_ascending)
}

impl ReadOperation {
    pub fn new(table: impl Table) -> Self {
        Self {
            table: table.name().to_string(),
            query: Query::new(),
            fields: None,
            limit: None,
            offset: None,
            order_by: Vec::new(),
        }
    }

    /// Restrict the selected columns; all columns (`*`) otherwise.
    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn where_equals(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.query = self.query.where_equals(field, value);
        self
    }

    pub fn query(mut self, query: Query) -> Self {
        self.query = query;
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, ascending: bool) -> Self {
        self.order_by.push((field.into(), ascending));
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn build(&self, dialect: Dialect) -> Result<SqlQuery> {
        let columns = match &self.fields {
            Some(fields) if !fields.is_empty() => fields
                .iter()
                .map(|f| dialect.quote(f))
                .collect::<Result<Vec<_>>>()?
                .join(", "),
            _ => "*".to_string(),
        };
        let mut sql = format!("SELECT {columns} FROM {}", dialect.quote(&self.table)?);
        let mut params = Vec::new();
        append_where(&mut sql, &self.query, dialect, &mut params)?;

        if !self.order_by.is_empty() {
            let order = self
                .order_by
                .iter()
                .map(|(field, asc)| {
                    dialect
                        .quote(field)
                        .map(|f| format!("{f} {}", if *asc { "ASC" } else { "DESC" }))
                })
                .collect::<Result<Vec<_>>>()?;
            sql.push_str(" ORDER BY ");
            sql.push_str(&order.join(", "));
        }
        match (self.limit, self.offset) {
            (Some(limit), Some(offset)) => sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}")),
            (Some(limit), None) => sql.push_str(&format!(" LIMIT {limit}")),
            (None, Some(offset)) => {
                sql.push_str(&format!(" LIMIT {} OFFSET {offset}", dialect.unbounded_limit()))
            }
            (None, None) => {}
        }
        Ok(SqlQuery::new(sql).with_params(params))
    }
}

/// Update rows matching a query
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateOperation {
    pub table: String,
    pub query: Query,
    pub updates: Vec<(String, Value)>,
    /// Append to the current column value instead of replacing it.
    pub amend: bool,
}

impl UpdateOperation {
    pub fn new(table: impl Table) -> Self {
        Self {
            table: table.name().to_string(),
            query: Query::new(),
            updates: Vec::new(),
            amend: false,
        }
    }

    pub fn set(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.updates.push((column.into(), value.into()));
        self
    }

    pub fn where_equals(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.query = self.query.where_equals(field, value);
        self
    }

    pub fn query(mut self, query: Query) -> Self {
        self.query = query;
        self
    }

    pub fn amend(mut self, amend: bool) -> Self {
        self.amend = amend;
        self
    }

    pub fn build(&self, dialect: Dialect) -> Result<SqlQuery> {
        if self.updates.is_empty() {
            return Err(DatabaseError::EmptyUpdate(self.table.clone()));
        }
        let mut params = Vec::with_capacity(self.updates.len());
        let mut assignments = Vec::with_capacity(self.updates.len());
        for (column, value) in &self.updates {
            let column = dialect.quote(column)?;
            let expr = if self.amend {
                dialect.append(&column)
            } else {
                "?".to_string()
            };
            assignments.push(format!("{column} = {expr}"));
            params.push(value.clone());
        }
        let mut sql = format!(
            "UPDATE {} SET {}",
            dialect.quote(&self.table)?,
            assignments.join(", ")
        );
        append_where(&mut sql, &self.query, dialect, &mut params)?;
        Ok(SqlQuery::new(sql).with_params(params))
    }
}

/// Delete rows matching a query; an empty query deletes every row.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteOperation {
    pub table: String,
    pub query: Query,
}

impl DeleteOperation {
    pub fn new(table: impl Table) -> Self {
        Self {
            table: table.name().to_string(),
            query: Query::new(),
        }
    }

    pub fn where_equals(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.query = self.query.where_equals(field, value);
        self
    }

    pub fn query(mut self, query: Query) -> Self {
        self.query = query;
        self
    }

    pub fn build(&self, dialect: Dialect) -> Result<SqlQuery> {
        let mut sql = format!("DELETE FROM {}", dialect.quote(&self.table)?);
        let mut params = Vec::new();
        append_where(&mut sql, &self.query, dialect, &mut params)?;
        Ok(SqlQuery::new(sql).with_params(params))
    }
}

/// Update the row identified by `primary_keys`, inserting it when absent.
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertOperation {
    pub table: String,
    pub primary_keys: Vec<(String, Value)>,
    pub updates: Vec<(String, Value)>,
}

impl UpsertOperation {
    pub fn new(table: impl Table) -> Self {
        Self {
            table: table.name().to_string(),
            primary_keys: Vec::new(),
            updates: Vec::new(),
        }
    }

    pub fn key(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.primary_keys.push((column.into(), value.into()));
        self
    }

    pub fn set(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.updates.push((column.into(), value.into()));
        self
    }

    pub fn update_operation(&self) -> UpdateOperation {
        UpdateOperation {
            table: self.table.clone(),
            query: self.primary_keys.iter().cloned().collect(),
            updates: self.updates.clone(),
            amend: false,
        }
    }

    /// Insert carrying the updates followed by the key columns.
    pub fn create_operation(&self) -> CreateOperation {
        CreateOperation {
            table: self.table.clone(),
            data: self
                .updates
                .iter()
                .chain(self.primary_keys.iter())
                .cloned()
                .collect(),
        }
    }

    /// Human readable key list for log lines, e.g. `id '3', kind 'a'`.
    pub fn describe_keys(&self) -> String {
        self.primary_keys
            .iter()
            .map(|(k, v)| format!("{k} '{v}'"))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// CRUD operation types
#[derive(Debug, Clone, PartialEq)]
pub enum CrudOperation {
    Create(CreateOperation),
    Read(ReadOperation),
    Update(UpdateOperation),
    Delete(DeleteOperation),
    Upsert(UpsertOperation),
}
