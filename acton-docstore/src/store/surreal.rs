//! SurrealDB document store
//!
//! Supports runtime protocol selection via URL scheme:
//! - `ws://` / `wss://` - WebSocket connections
//! - `http://` / `https://` - HTTP connections
//! - `mem://` - In-memory database (for testing)
//!
//! Each document is stored as the `doc` field of a record, next to a
//! `created_at` timestamp that gives unsorted reads a stable insertion order.
//! Keeping the document in its own field leaves the record `id` to SurrealDB,
//! so entities are free to use an `id` field of any type.
//!
//! Field paths are validated and every value is bound as a query parameter;
//! no caller-supplied text is spliced into SurrealQL.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use super::filter::like_to_regex;
use super::{
    Document, DocumentStore, DocumentStream, Filter, FilterOperator, FindOneAndUpdateOptions,
    FindOptions, OrderDirection, ReturnDocument, StoreSession, UpdateDocument, WriteOutcome,
};
use crate::config::StoreConfig;
use crate::repository::{
    RepositoryError, RepositoryErrorKind, RepositoryOperation, RepositoryResult,
};

/// SurrealDB client type alias using the `Any` engine for runtime protocol selection
pub type SurrealClient = surrealdb::Surreal<surrealdb::engine::any::Any>;

/// A SurrealQL statement with its bound parameters
struct Statement {
    sql: String,
    bindings: Vec<(String, Value)>,
}

/// Renders statements whose parameter names share a unique prefix
struct StatementBuilder {
    prefix: String,
    bindings: Vec<(String, Value)>,
}

impl StatementBuilder {
    fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            bindings: Vec::new(),
        }
    }

    /// Bind a value and return its parameter reference
    fn bind(&mut self, value: Value) -> String {
        let name = format!("{}_p{}", self.prefix, self.bindings.len());
        let reference = format!("${}", name);
        self.bindings.push((name, value));
        reference
    }

    /// Bind the collection name and return a table expression
    fn table(&mut self, collection: &str) -> String {
        let reference = self.bind(Value::String(collection.to_string()));
        format!("type::table({})", reference)
    }

    /// A statement-local variable name
    fn var(&self, name: &str) -> String {
        format!("${}_{}", self.prefix, name)
    }

    fn condition(
        &mut self,
        filter: &Filter,
        operation: RepositoryOperation,
    ) -> RepositoryResult<String> {
        Ok(match filter {
            Filter::And(inner) if inner.is_empty() => "true".to_string(),
            Filter::Or(inner) if inner.is_empty() => "false".to_string(),
            Filter::And(inner) => self.join(inner, " AND ", operation)?,
            Filter::Or(inner) => self.join(inner, " OR ", operation)?,
            Filter::Not(inner) => format!("!({})", self.condition(inner, operation)?),
            Filter::Condition(condition) => {
                let field = field_path(&condition.field, operation)?;
                let is_null = format!("({f} = NONE OR {f} = NULL)", f = field);
                match condition.operator {
                    FilterOperator::Equal if condition.value.is_null() => is_null,
                    FilterOperator::NotEqual if condition.value.is_null() => {
                        format!("!{}", is_null)
                    }
                    FilterOperator::Equal => {
                        format!("{} = {}", field, self.bind(condition.value.clone()))
                    }
                    FilterOperator::NotEqual => {
                        format!("!({} = {})", field, self.bind(condition.value.clone()))
                    }
                    FilterOperator::GreaterThan
                    | FilterOperator::GreaterThanOrEqual
                    | FilterOperator::LessThan
                    | FilterOperator::LessThanOrEqual => {
                        let guard = type_guard(&field, &condition.value);
                        let value = self.bind(condition.value.clone());
                        format!("({} AND {} {} {})", guard, field, condition.operator, value)
                    }
                    FilterOperator::Like => {
                        let pattern = condition.value.as_str().ok_or_else(|| {
                            RepositoryError::validation_failed(
                                operation,
                                format!("LIKE pattern for '{}' must be a string", condition.field),
                            )
                        })?;
                        let regex = self.bind(Value::String(like_to_regex(pattern)));
                        format!(
                            "(type::is::string({f}) AND string::matches({f}, {r}))",
                            f = field,
                            r = regex
                        )
                    }
                    FilterOperator::In => {
                        let values = self.bind(condition.value.clone());
                        format!("{} INSIDE {}", field, values)
                    }
                    FilterOperator::IsNull => is_null,
                    FilterOperator::IsNotNull => format!("!{}", is_null),
                }
            }
        })
    }

    fn join(
        &mut self,
        filters: &[Filter],
        separator: &str,
        operation: RepositoryOperation,
    ) -> RepositoryResult<String> {
        let parts = filters
            .iter()
            .map(|f| self.condition(f, operation))
            .collect::<RepositoryResult<Vec<_>>>()?;
        Ok(format!("({})", parts.join(separator)))
    }

    fn assignments(
        &mut self,
        fields: &[(String, Value)],
        operation: RepositoryOperation,
    ) -> RepositoryResult<String> {
        let parts = fields
            .iter()
            .map(|(field, value)| {
                let path = field_path(field, operation)?;
                Ok(format!("{} = {}", path, self.bind(value.clone())))
            })
            .collect::<RepositoryResult<Vec<_>>>()?;
        Ok(parts.join(", "))
    }

    fn finish(self, sql: String) -> Statement {
        Statement {
            sql,
            bindings: self.bindings,
        }
    }
}

/// Range comparisons only match values of the same JSON type
fn type_guard(field: &str, value: &Value) -> String {
    match value {
        Value::Number(_) => format!("type::is::number({})", field),
        Value::String(_) => format!("type::is::string({})", field),
        Value::Bool(_) => format!("type::is::bool({})", field),
        _ => "false".to_string(),
    }
}

/// Validate a dotted field path and address it inside the `doc` field
fn field_path(path: &str, operation: RepositoryOperation) -> RepositoryResult<String> {
    let valid = !path.is_empty()
        && path.split('.').all(|segment| {
            let mut chars = segment.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        });
    if valid {
        Ok(format!("doc.{}", path))
    } else {
        Err(RepositoryError::validation_failed(
            operation,
            format!("Invalid field path '{}'", path),
        ))
    }
}

fn order_clause(
    sort: &[(String, OrderDirection)],
    operation: RepositoryOperation,
) -> RepositoryResult<String> {
    let mut keys = sort
        .iter()
        .map(|(field, direction)| {
            let direction = match direction {
                OrderDirection::Ascending => "ASC",
                OrderDirection::Descending => "DESC",
            };
            Ok(format!("{} {}", field_path(field, operation)?, direction))
        })
        .collect::<RepositoryResult<Vec<_>>>()?;
    keys.push("created_at ASC".to_string());
    Ok(keys.join(", "))
}

fn select_statement(
    collection: &str,
    filter: &Filter,
    options: &FindOptions,
) -> RepositoryResult<Statement> {
    let operation = RepositoryOperation::Find;
    let mut builder = StatementBuilder::new("q");
    let table = builder.table(collection);
    let condition = builder.condition(filter, operation)?;
    let order = order_clause(&options.sort, operation)?;
    let mut sql = format!(
        "SELECT * FROM {} WHERE {} ORDER BY {}",
        table, condition, order
    );
    if let Some(limit) = options.limit {
        sql.push_str(&format!(" LIMIT {}", builder.bind(Value::from(limit))));
    }
    if let Some(skip) = options.skip.filter(|s| *s > 0) {
        sql.push_str(&format!(" START {}", builder.bind(Value::from(skip))));
    }
    Ok(builder.finish(sql))
}

fn insert_statement(prefix: &str, collection: &str, document: Document) -> Statement {
    let mut builder = StatementBuilder::new(prefix);
    let table = builder.table(collection);
    let doc = builder.bind(document);
    let sql = format!(
        "CREATE {} SET doc = {}, created_at = time::now() RETURN NONE;",
        table, doc
    );
    builder.finish(sql)
}

/// A write aimed at the first document matching `filter`
///
/// `write` renders the write against the target variable, or `None` when
/// there is nothing to write. The write repeats the filter, so a document
/// changed between selection and write is left alone and not counted.
///
/// A statement run on its own returns the written count. Buffered session
/// statements leave it out, since a `RETURN` inside a transaction replaces
/// the transaction's result.
fn targeted_statement(
    prefix: &str,
    returning: bool,
    collection: &str,
    filter: &Filter,
    operation: RepositoryOperation,
    write: impl FnOnce(&mut StatementBuilder, &str) -> RepositoryResult<Option<String>>,
) -> RepositoryResult<Statement> {
    let mut builder = StatementBuilder::new(prefix);
    let target = builder.var("target");
    let written = builder.var("written");
    let table = builder.table(collection);
    let condition = builder.condition(filter, operation)?;
    let mut sql = format!(
        "LET {} = (SELECT VALUE id FROM {} WHERE {} LIMIT 1);",
        target, table, condition
    );
    let counted = match write(&mut builder, &target)? {
        Some(write) => {
            sql.push_str(&format!(
                "\nLET {} = ({} WHERE {} RETURN BEFORE);",
                written, write, condition
            ));
            written
        }
        None => target,
    };
    if returning {
        sql.push_str(&format!("\nRETURN array::len({});", counted));
    }
    Ok(builder.finish(sql))
}

fn replace_statement(
    prefix: &str,
    returning: bool,
    collection: &str,
    filter: &Filter,
    document: Document,
) -> RepositoryResult<Statement> {
    let operation = RepositoryOperation::Replace;
    targeted_statement(prefix, returning, collection, filter, operation, |builder, target| {
        let doc = builder.bind(document);
        Ok(Some(format!("UPDATE {} SET doc = {}", target, doc)))
    })
}

fn update_statement(
    prefix: &str,
    returning: bool,
    collection: &str,
    filter: &Filter,
    update: &UpdateDocument,
) -> RepositoryResult<Statement> {
    let operation = RepositoryOperation::Update;
    targeted_statement(prefix, returning, collection, filter, operation, |builder, target| {
        if update.set_fields().is_empty() {
            return Ok(None);
        }
        let sets = builder.assignments(update.set_fields(), operation)?;
        Ok(Some(format!("UPDATE {} SET {}", target, sets)))
    })
}

fn delete_statement(
    prefix: &str,
    returning: bool,
    collection: &str,
    filter: &Filter,
) -> RepositoryResult<Statement> {
    let operation = RepositoryOperation::Delete;
    targeted_statement(prefix, returning, collection, filter, operation, |_, target| {
        Ok(Some(format!("DELETE {}", target)))
    })
}

/// Record key derived from the equality conditions of an upsert filter
///
/// Concurrent upserts of the same logical document collide on this one
/// record instead of each creating their own.
fn upsert_key(filter: &Filter) -> Option<Value> {
    let mut equalities = filter.equalities();
    if equalities.is_empty() {
        return None;
    }
    equalities.sort_by(|a, b| a.0.cmp(b.0));
    let pairs = equalities
        .into_iter()
        .map(|(field, value)| Value::Array(vec![Value::String(field.to_string()), value.clone()]))
        .collect();
    Some(Value::Array(pairs))
}

fn upsert_statement(
    collection: &str,
    filter: &Filter,
    update: &UpdateDocument,
    seed: Option<Document>,
) -> RepositoryResult<Statement> {
    let operation = RepositoryOperation::Upsert;
    let mut builder = StatementBuilder::new("u");
    let target = builder.var("target");
    let before = builder.var("before");
    let table = builder.table(collection);
    let condition = builder.condition(filter, operation)?;

    let update_clause = if update.set_fields().is_empty() {
        None
    } else {
        let sets = builder.assignments(update.set_fields(), operation)?;
        Some(format!("UPDATE {} SET {} RETURN NONE;", target, sets))
    };
    let insert_clause = seed.map(|seed| {
        let record = match upsert_key(filter) {
            Some(key) => {
                let name = builder.bind(Value::String(collection.to_string()));
                let key = builder.bind(key);
                format!("type::thing({}, {})", name, key)
            }
            None => table.clone(),
        };
        let doc = builder.bind(seed);
        format!(
            "CREATE {} SET doc = {}, created_at = time::now() RETURN NONE;",
            record, doc
        )
    });
    let branch = match (update_clause, insert_clause) {
        (Some(u), Some(i)) => format!(
            "IF array::len({t}) > 0 {{ {u} }} ELSE {{ {i} }};",
            t = target,
            u = u,
            i = i
        ),
        (Some(u), None) => format!("IF array::len({t}) > 0 {{ {u} }};", t = target, u = u),
        (None, Some(i)) => format!("IF array::len({t}) = 0 {{ {i} }};", t = target, i = i),
        (None, None) => String::new(),
    };

    let sql = format!(
        "BEGIN TRANSACTION;\n\
         LET {t} = (SELECT VALUE id FROM {table} WHERE {c} LIMIT 1);\n\
         LET {b} = (SELECT VALUE doc FROM {t});\n\
         {branch}\n\
         RETURN {{ before: {b}, after: (SELECT VALUE doc FROM {t}), matched: array::len({t}) }};\n\
         COMMIT TRANSACTION;",
        t = target,
        b = before,
        table = table,
        c = condition,
        branch = branch
    );
    Ok(builder.finish(sql))
}

#[derive(Debug, Deserialize)]
struct DocRow {
    doc: Value,
}

#[derive(Debug, Deserialize)]
struct CountRow {
    total: u64,
}

#[derive(Debug, Deserialize)]
struct UpsertRow {
    before: Vec<Value>,
    after: Vec<Value>,
    matched: u64,
}

/// Map a SurrealDB failure onto a repository error kind
fn map_error(operation: RepositoryOperation, err: surrealdb::Error) -> RepositoryError {
    let message = err.to_string();
    let lower = message.to_lowercase();
    if lower.contains("timeout") || lower.contains("timed out") {
        RepositoryError::timeout(operation, message)
    } else if lower.contains("conflict")
        || lower.contains("can be retried")
        || lower.contains("already exists")
    {
        RepositoryError::conflict(operation, message)
    } else if lower.contains("connect") || lower.contains("refused") || lower.contains("network") {
        RepositoryError::new(operation, RepositoryErrorKind::ConnectionFailed, message)
    } else {
        RepositoryError::store(operation, message)
    }
}

async fn execute(
    client: &SurrealClient,
    statement: Statement,
    operation: RepositoryOperation,
) -> RepositoryResult<surrealdb::Response> {
    let mut query = client.query(statement.sql);
    for binding in statement.bindings {
        query = query.bind(binding);
    }
    let mut response = query.await.map_err(|e| map_error(operation, e))?;
    let mut errors: Vec<_> = response.take_errors().into_iter().collect();
    if errors.is_empty() {
        return Ok(response);
    }
    // Statements cancelled by a failed transaction report that instead of the cause
    errors.sort_by_key(|(index, _)| *index);
    let cause = errors
        .iter()
        .position(|(_, e)| !e.to_string().contains("failed transaction"))
        .unwrap_or(0);
    let (_, error) = errors.swap_remove(cause);
    Err(map_error(operation, error))
}

/// The last statement result carrying a value
///
/// Scanning from the end skips the empty results of transaction control
/// statements.
fn last_value<T: serde::de::DeserializeOwned>(
    response: &mut surrealdb::Response,
    operation: RepositoryOperation,
) -> RepositoryResult<Option<T>> {
    for index in (0..response.num_statements()).rev() {
        let value: Option<T> = response
            .take(index)
            .map_err(|e| RepositoryError::serialization_error(operation, e.to_string()))?;
        if value.is_some() {
            return Ok(value);
        }
    }
    Ok(None)
}

async fn select(
    client: &SurrealClient,
    collection: &str,
    filter: &Filter,
    options: &FindOptions,
) -> RepositoryResult<Vec<Document>> {
    let statement = select_statement(collection, filter, options)?;
    let mut response = execute(client, statement, RepositoryOperation::Find).await?;
    let rows: Vec<DocRow> = response
        .take(0)
        .map_err(|e| {
            RepositoryError::serialization_error(RepositoryOperation::Find, e.to_string())
        })?;
    Ok(rows.into_iter().map(|row| row.doc).collect())
}

async fn matched_count(
    client: &SurrealClient,
    statement: Statement,
    operation: RepositoryOperation,
) -> RepositoryResult<u64> {
    let mut response = execute(client, statement, operation).await?;
    Ok(last_value::<u64>(&mut response, operation)?.unwrap_or(0))
}

/// Batched cursor over a query
///
/// Batches are paged by offset, so documents removed from earlier pages
/// while the stream is open shift later matches past the cursor.
struct Cursor {
    client: Arc<SurrealClient>,
    collection: String,
    filter: Filter,
    sort: Vec<(String, OrderDirection)>,
    next_start: u64,
    remaining: Option<u64>,
    batch_size: u64,
    buffer: VecDeque<Document>,
    exhausted: bool,
}

impl Cursor {
    async fn advance(&mut self) -> Option<RepositoryResult<Document>> {
        if let Some(document) = self.buffer.pop_front() {
            return Some(Ok(document));
        }
        if self.exhausted {
            return None;
        }

        let limit = match self.remaining {
            Some(0) => return None,
            Some(remaining) => remaining.min(self.batch_size),
            None => self.batch_size,
        };
        let options = FindOptions {
            skip: Some(self.next_start),
            limit: Some(limit),
            sort: self.sort.clone(),
        };

        match select(&self.client, &self.collection, &self.filter, &options).await {
            Ok(batch) => {
                let fetched = batch.len() as u64;
                tracing::debug!(
                    "Fetched {} document(s) from '{}' at offset {}",
                    fetched,
                    self.collection,
                    self.next_start
                );
                self.next_start += fetched;
                if let Some(remaining) = self.remaining.as_mut() {
                    *remaining = remaining.saturating_sub(fetched);
                }
                if fetched < limit {
                    self.exhausted = true;
                }
                self.buffer.extend(batch);
                self.buffer.pop_front().map(Ok)
            }
            Err(e) => {
                self.exhausted = true;
                Some(Err(e))
            }
        }
    }
}

/// Document store backed by SurrealDB
#[derive(Clone)]
pub struct SurrealStore {
    client: Arc<SurrealClient>,
    stream_batch_size: u64,
}

impl SurrealStore {
    /// Connect using the store configuration, retrying with exponential backoff
    pub async fn connect(config: &StoreConfig) -> RepositoryResult<Self> {
        let client = create_client_with_retries(config, config.max_retries).await?;
        Ok(Self::from_client(Arc::new(client)).with_stream_batch_size(config.stream_batch_size))
    }

    /// Wrap an already connected client
    pub fn from_client(client: Arc<SurrealClient>) -> Self {
        Self {
            client,
            stream_batch_size: 100,
        }
    }

    /// Documents fetched per round-trip while streaming
    #[must_use]
    pub fn with_stream_batch_size(mut self, batch_size: u64) -> Self {
        self.stream_batch_size = batch_size.max(1);
        self
    }

    /// The underlying client
    pub fn client(&self) -> &Arc<SurrealClient> {
        &self.client
    }
}

#[async_trait]
impl DocumentStore for SurrealStore {
    fn backend_name(&self) -> &'static str {
        "surrealdb"
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> RepositoryResult<Vec<Document>> {
        select(&self.client, collection, filter, options).await
    }

    async fn stream(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> RepositoryResult<DocumentStream> {
        // Reject bad field paths now rather than on the first poll
        select_statement(collection, filter, options)?;

        let cursor = Cursor {
            client: Arc::clone(&self.client),
            collection: collection.to_string(),
            filter: filter.clone(),
            sort: options.sort.clone(),
            next_start: options.skip.unwrap_or(0),
            remaining: options.limit,
            batch_size: self.stream_batch_size,
            buffer: VecDeque::new(),
            exhausted: false,
        };
        Ok(stream::unfold(cursor, |mut cursor| async move {
            let item = cursor.advance().await?;
            Some((item, cursor))
        })
        .boxed())
    }

    async fn count(&self, collection: &str, filter: &Filter) -> RepositoryResult<u64> {
        let mut builder = StatementBuilder::new("q");
        let table = builder.table(collection);
        let condition = builder.condition(filter, RepositoryOperation::Count)?;
        let sql = format!(
            "SELECT count() AS total FROM {} WHERE {} GROUP ALL",
            table, condition
        );
        let mut response =
            execute(&self.client, builder.finish(sql), RepositoryOperation::Count).await?;
        let rows: Vec<CountRow> = response
            .take(0)
            .map_err(|e| {
                RepositoryError::serialization_error(RepositoryOperation::Count, e.to_string())
            })?;
        Ok(rows.first().map_or(0, |row| row.total))
    }

    async fn insert_one(&self, collection: &str, document: Document) -> RepositoryResult<()> {
        ensure_object(RepositoryOperation::Insert, &document)?;
        execute(
            &self.client,
            insert_statement("q", collection, document),
            RepositoryOperation::Insert,
        )
        .await?;
        tracing::debug!("Inserted document into '{}'", collection);
        Ok(())
    }

    async fn replace_one(
        &self,
        collection: &str,
        filter: &Filter,
        document: Document,
    ) -> RepositoryResult<WriteOutcome> {
        ensure_object(RepositoryOperation::Replace, &document)?;
        let statement = replace_statement("q", true, collection, filter, document)?;
        let matched = matched_count(&self.client, statement, RepositoryOperation::Replace).await?;
        Ok(WriteOutcome::acknowledged(matched, matched))
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        update: &UpdateDocument,
    ) -> RepositoryResult<WriteOutcome> {
        let statement = update_statement("q", true, collection, filter, update)?;
        let matched = matched_count(&self.client, statement, RepositoryOperation::Update).await?;
        let modified = if update.set_fields().is_empty() { 0 } else { matched };
        Ok(WriteOutcome::acknowledged(matched, modified))
    }

    async fn delete_one(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> RepositoryResult<WriteOutcome> {
        let statement = delete_statement("q", true, collection, filter)?;
        let matched = matched_count(&self.client, statement, RepositoryOperation::Delete).await?;
        Ok(WriteOutcome::acknowledged(matched, matched))
    }

    async fn find_one_and_update(
        &self,
        collection: &str,
        filter: &Filter,
        update: &UpdateDocument,
        options: FindOneAndUpdateOptions,
    ) -> RepositoryResult<Option<Document>> {
        let operation = RepositoryOperation::Upsert;
        let seed = options.upsert.then(|| update.seed(filter.equalities()));
        let statement = upsert_statement(collection, filter, update, seed.clone())?;
        let mut response = execute(&self.client, statement, operation).await?;
        let row = last_value::<UpsertRow>(&mut response, operation)?.ok_or_else(|| {
            RepositoryError::store_write(operation, "Upsert returned no result")
        })?;

        if row.matched > 0 {
            let chosen = match options.return_document {
                ReturnDocument::Before => row.before,
                ReturnDocument::After => row.after,
            };
            return Ok(chosen.into_iter().next());
        }
        Ok(match options.return_document {
            ReturnDocument::Before => None,
            ReturnDocument::After => seed,
        })
    }

    async fn begin(&self) -> RepositoryResult<Arc<dyn StoreSession>> {
        tracing::debug!("SurrealDB session started");
        Ok(Arc::new(SurrealSession {
            store: self.clone(),
            state: Mutex::new(SessionState {
                statements: Vec::new(),
                finished: None,
            }),
        }))
    }
}

fn ensure_object(operation: RepositoryOperation, document: &Document) -> RepositoryResult<()> {
    if document.is_object() {
        Ok(())
    } else {
        Err(RepositoryError::validation_failed(
            operation,
            "Documents must be JSON objects",
        ))
    }
}

struct SessionState {
    statements: Vec<Statement>,
    finished: Option<&'static str>,
}

/// A session over a [`SurrealStore`]
///
/// Writes are buffered and sent as one `BEGIN TRANSACTION ... COMMIT
/// TRANSACTION` query on commit, so their outcomes are reported as
/// [`WriteOutcome::deferred`]. Reads see committed data only.
pub struct SurrealSession {
    store: SurrealStore,
    state: Mutex<SessionState>,
}

impl SurrealSession {
    async fn ensure_open(&self, operation: RepositoryOperation) -> RepositoryResult<()> {
        match self.state.lock().await.finished {
            Some(how) => Err(RepositoryError::transaction(
                operation,
                format!("Session already {}", how),
            )),
            None => Ok(()),
        }
    }

    async fn buffer(
        &self,
        operation: RepositoryOperation,
        statement: impl FnOnce(&str) -> RepositoryResult<Statement>,
    ) -> RepositoryResult<()> {
        let mut state = self.state.lock().await;
        if let Some(how) = state.finished {
            return Err(RepositoryError::transaction(
                operation,
                format!("Session already {}", how),
            ));
        }
        let prefix = format!("s{}", state.statements.len());
        let statement = statement(&prefix)?;
        state.statements.push(statement);
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for SurrealSession {
    fn backend_name(&self) -> &'static str {
        "surrealdb"
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> RepositoryResult<Vec<Document>> {
        self.ensure_open(RepositoryOperation::Find).await?;
        self.store.find(collection, filter, options).await
    }

    async fn stream(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> RepositoryResult<DocumentStream> {
        self.ensure_open(RepositoryOperation::Find).await?;
        self.store.stream(collection, filter, options).await
    }

    async fn count(&self, collection: &str, filter: &Filter) -> RepositoryResult<u64> {
        self.ensure_open(RepositoryOperation::Count).await?;
        self.store.count(collection, filter).await
    }

    async fn insert_one(&self, collection: &str, document: Document) -> RepositoryResult<()> {
        ensure_object(RepositoryOperation::Insert, &document)?;
        self.buffer(RepositoryOperation::Insert, |prefix| {
            Ok(insert_statement(prefix, collection, document))
        })
        .await
    }

    async fn replace_one(
        &self,
        collection: &str,
        filter: &Filter,
        document: Document,
    ) -> RepositoryResult<WriteOutcome> {
        ensure_object(RepositoryOperation::Replace, &document)?;
        self.buffer(RepositoryOperation::Replace, |prefix| {
            replace_statement(prefix, false, collection, filter, document)
        })
        .await?;
        Ok(WriteOutcome::deferred())
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        update: &UpdateDocument,
    ) -> RepositoryResult<WriteOutcome> {
        self.buffer(RepositoryOperation::Update, |prefix| {
            update_statement(prefix, false, collection, filter, update)
        })
        .await?;
        Ok(WriteOutcome::deferred())
    }

    async fn delete_one(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> RepositoryResult<WriteOutcome> {
        self.buffer(RepositoryOperation::Delete, |prefix| {
            delete_statement(prefix, false, collection, filter)
        })
        .await?;
        Ok(WriteOutcome::deferred())
    }

    async fn find_one_and_update(
        &self,
        _collection: &str,
        _filter: &Filter,
        _update: &UpdateDocument,
        _options: FindOneAndUpdateOptions,
    ) -> RepositoryResult<Option<Document>> {
        Err(RepositoryError::transaction(
            RepositoryOperation::Upsert,
            "find_one_and_update needs its result immediately \
             and cannot be buffered in a SurrealDB session",
        ))
    }

    async fn begin(&self) -> RepositoryResult<Arc<dyn StoreSession>> {
        Err(RepositoryError::transaction(
            RepositoryOperation::Begin,
            "Nested sessions are not supported",
        ))
    }
}

#[async_trait]
impl StoreSession for SurrealSession {
    async fn commit(&self) -> RepositoryResult<()> {
        let mut state = self.state.lock().await;
        if let Some(how) = state.finished {
            return Err(RepositoryError::transaction(
                RepositoryOperation::Commit,
                format!("Session already {}", how),
            ));
        }

        let statements = std::mem::take(&mut state.statements);
        let count = statements.len();
        if statements.is_empty() {
            state.finished = Some("committed");
            return Ok(());
        }

        let mut sql = String::from("BEGIN TRANSACTION;\n");
        let mut bindings = Vec::new();
        for statement in statements {
            sql.push_str(&statement.sql);
            sql.push('\n');
            bindings.extend(statement.bindings);
        }
        sql.push_str("COMMIT TRANSACTION;");

        let result = execute(
            &self.store.client,
            Statement { sql, bindings },
            RepositoryOperation::Commit,
        )
        .await;

        match result {
            Ok(_) => {
                state.finished = Some("committed");
                tracing::debug!("SurrealDB session committed {} write(s)", count);
                Ok(())
            }
            Err(e) => {
                state.finished = Some("rolled back");
                Err(RepositoryError::transaction(RepositoryOperation::Commit, e.message))
            }
        }
    }

    async fn abort(&self) -> RepositoryResult<()> {
        let mut state = self.state.lock().await;
        if let Some(how) = state.finished {
            return Err(RepositoryError::transaction(
                RepositoryOperation::Abort,
                format!("Session already {}", how),
            ));
        }
        tracing::debug!(
            "SurrealDB session aborted, discarding {} write(s)",
            state.statements.len()
        );
        state.statements.clear();
        state.finished = Some("aborted");
        Ok(())
    }

    fn as_store(self: Arc<Self>) -> Arc<dyn DocumentStore> {
        self
    }
}

/// Create a SurrealDB client with configurable retries
///
/// Uses exponential backoff strategy for retries
async fn create_client_with_retries(
    config: &StoreConfig,
    max_retries: u32,
) -> RepositoryResult<SurrealClient> {
    let mut attempt = 0;
    let base_delay = config.retry_delay();

    loop {
        match try_create_client(config).await {
            Ok(client) => {
                if attempt > 0 {
                    tracing::info!(
                        "SurrealDB connection established after {} attempt(s)",
                        attempt + 1
                    );
                } else {
                    tracing::info!(
                        "SurrealDB connected: url={}, ns={}, db={}",
                        sanitize_url(&config.url),
                        config.namespace,
                        config.database
                    );
                }
                return Ok(client);
            }
            Err(e) => {
                attempt += 1;

                if attempt > max_retries {
                    tracing::error!(
                        "Failed to connect to SurrealDB after {} attempts: {}",
                        max_retries + 1,
                        e
                    );
                    return Err(e);
                }

                let delay: Duration = base_delay * 2_u32.saturating_pow(attempt - 1);
                tracing::warn!(
                    "SurrealDB connection attempt {} failed: {}. Retrying in {:?}...",
                    attempt,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Attempt to create a SurrealDB client (single try)
async fn try_create_client(config: &StoreConfig) -> RepositoryResult<SurrealClient> {
    let url_safe = sanitize_url(&config.url);
    tracing::debug!("Connecting to SurrealDB: {}", url_safe);

    let client = surrealdb::engine::any::connect(config.url.as_str())
        .await
        .map_err(|e| {
            RepositoryError::connection_failed(format!(
                "Failed to connect to SurrealDB at '{}': {} ({})",
                url_safe,
                categorize_error(&e),
                e
            ))
        })?;

    if let (Some(username), Some(password)) = (&config.username, &config.password) {
        client
            .signin(surrealdb::opt::auth::Root { username, password })
            .await
            .map_err(|e| {
                RepositoryError::connection_failed(format!(
                    "Failed to authenticate with SurrealDB at '{}': {} ({})",
                    url_safe,
                    categorize_error(&e),
                    e
                ))
            })?;
    }

    client
        .use_ns(&config.namespace)
        .use_db(&config.database)
        .await
        .map_err(|e| {
            RepositoryError::connection_failed(format!(
                "Failed to select namespace '{}' / database '{}' on SurrealDB at '{}': {} ({})",
                config.namespace,
                config.database,
                url_safe,
                categorize_error(&e),
                e
            ))
        })?;

    Ok(client)
}

/// Sanitize connection URL for safe logging (remove credentials if present)
pub fn sanitize_url(url: &str) -> String {
    if let Some(at_pos) = url.find('@') {
        if let Some(scheme_end) = url.find("://") {
            let scheme = &url[..=scheme_end + 2];
            let after_at = &url[at_pos..];
            return format!("{}***{}", scheme, after_at);
        }
    }
    url.to_string()
}

/// Categorize SurrealDB error for better user guidance
fn categorize_error(err: &surrealdb::Error) -> &'static str {
    let err_str = err.to_string().to_lowercase();

    if err_str.contains("auth") || err_str.contains("credentials") || err_str.contains("signin") {
        "Authentication error - check your credentials"
    } else if err_str.contains("connect")
        || err_str.contains("network")
        || err_str.contains("dns")
        || err_str.contains("refused")
    {
        "Network connection error - check connectivity"
    } else if err_str.contains("permission")
        || err_str.contains("denied")
        || err_str.contains("not allowed")
    {
        "Permission error - check database permissions"
    } else if err_str.contains("timeout") {
        "Connection timeout - database may be overloaded"
    } else {
        "Connection error"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FilterCondition;
    use serde_json::json;

    async fn mem_store() -> SurrealStore {
        let config = StoreConfig {
            url: "mem://".to_string(),
            max_retries: 0,
            ..StoreConfig::default()
        };
        SurrealStore::connect(&config).await.unwrap()
    }

    async fn seeded() -> SurrealStore {
        let store = mem_store().await;
        for (id, name, age) in [(1, "Ada", 36), (2, "Brian", 41), (3, "Cleo", 29)] {
            store
                .insert_one("people", json!({"id": id, "name": name, "age": age}))
                .await
                .unwrap();
        }
        store
    }

    #[test]
    fn test_sanitize_url_no_credentials() {
        assert_eq!(sanitize_url("ws://localhost:8000"), "ws://localhost:8000");
        assert_eq!(sanitize_url("mem://"), "mem://");
    }

    #[test]
    fn test_sanitize_url_with_credentials() {
        let sanitized = sanitize_url("ws://user:pass@localhost:8000");
        assert!(sanitized.contains("***"));
        assert!(sanitized.contains("localhost:8000"));
        assert!(!sanitized.contains("user"));
        assert!(!sanitized.contains("pass"));
    }

    #[test]
    fn test_field_path_validation() {
        assert_eq!(
            field_path("address.city", RepositoryOperation::Find).unwrap(),
            "doc.address.city"
        );
        for bad in ["", "a b", "a;DELETE", "1abc", "a..b", "a.$b"] {
            let error = field_path(bad, RepositoryOperation::Find).unwrap_err();
            assert_eq!(error.kind, RepositoryErrorKind::ValidationFailed);
        }
    }

    #[test]
    fn test_condition_binds_values() {
        let mut builder = StatementBuilder::new("q");
        let filter = Filter::eq("name", "Ada") & Filter::gt("age", 30);
        let sql = builder.condition(&filter, RepositoryOperation::Find).unwrap();
        assert_eq!(
            sql,
            "(doc.name = $q_p0 AND (type::is::number(doc.age) AND doc.age > $q_p1))"
        );
        assert_eq!(builder.bindings.len(), 2);
        assert_eq!(builder.condition(&Filter::all(), RepositoryOperation::Find).unwrap(), "true");
    }

    #[tokio::test]
    async fn test_mem_signin_without_defined_user_is_rejected() {
        // A fresh embedded instance has no root users to sign in as
        let config = StoreConfig {
            url: "mem://".to_string(),
            username: Some("root".to_string()),
            password: Some("root".to_string()),
            max_retries: 0,
            ..StoreConfig::default()
        };
        let error = SurrealStore::connect(&config).await.err().unwrap();
        assert_eq!(error.kind, RepositoryErrorKind::ConnectionFailed);
        assert!(error.message.contains("authenticate"), "{}", error.message);
        assert!(!error.message.contains("root:root"));
    }

    #[tokio::test]
    async fn test_find_and_count() {
        let store = seeded().await;
        let found = store
            .find(
                "people",
                &Filter::gt("age", 30),
                &FindOptions::new().sort_by("age", OrderDirection::Descending),
            )
            .await
            .unwrap();
        let names = found.iter().map(|d| d["name"].as_str().unwrap()).collect::<Vec<_>>();
        assert_eq!(names, ["Brian", "Ada"]);

        assert_eq!(store.count("people", &Filter::all()).await.unwrap(), 3);
        assert_eq!(
            store
                .count("people", &Filter::from(FilterCondition::like("name", "_r%")))
                .await
                .unwrap(),
            1
        );
        assert_eq!(
            store
                .count("people", &Filter::from(FilterCondition::is_null("email")))
                .await
                .unwrap(),
            3
        );
        assert_eq!(store.count("nobody", &Filter::all()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_insertion_order_and_window() {
        let store = seeded().await;
        let found = store
            .find("people", &Filter::all(), &FindOptions::new().skip(1).limit(1))
            .await
            .unwrap();
        assert_eq!(found, [json!({"id": 2, "name": "Brian", "age": 41})]);
    }

    #[tokio::test]
    async fn test_writes_report_matches() {
        let store = seeded().await;
        let outcome = store
            .replace_one(
                "people",
                &Filter::eq("id", 1),
                json!({"id": 1, "name": "Ada L", "age": 37}),
            )
            .await
            .unwrap();
        assert_eq!(outcome.matched, 1);

        let outcome = store
            .update_one("people", &Filter::eq("id", 2), &UpdateDocument::new().set("age", 42))
            .await
            .unwrap();
        assert_eq!(outcome, WriteOutcome::acknowledged(1, 1));

        let outcome = store
            .delete_one("people", &Filter::eq("id", 99))
            .await
            .unwrap();
        assert_eq!(outcome.matched, 0);

        let brian = store
            .find_one("people", &Filter::eq("id", 2))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(brian["age"], json!(42));
    }

    #[tokio::test]
    async fn test_find_one_and_update_upserts_once() {
        let store = mem_store().await;
        let filter = Filter::eq("name", "orders");
        let update = UpdateDocument::new().set_on_insert("value", "1");
        let options = FindOneAndUpdateOptions::upsert(ReturnDocument::Before);

        assert!(store
            .find_one_and_update("Sequence", &filter, &update, options)
            .await
            .unwrap()
            .is_none());
        let existing = store
            .find_one_and_update("Sequence", &filter, &update, options)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(existing["value"], json!("1"));
        assert_eq!(store.count("Sequence", &Filter::all()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_stream_crosses_batches() {
        let store = seeded().await.with_stream_batch_size(2);
        let ids = store
            .stream("people", &Filter::all(), &FindOptions::new())
            .await
            .unwrap()
            .map(|d| d.unwrap()["id"].as_i64().unwrap())
            .collect::<Vec<_>>()
            .await;
        assert_eq!(ids, [1, 2, 3]);
    }

    #[tokio::test]
    async fn test_session_commit_and_abort() {
        let store = seeded().await;

        let session = store.begin().await.unwrap();
        session
            .insert_one("people", json!({"id": 4, "name": "Dmitri", "age": 52}))
            .await
            .unwrap();
        let outcome = session
            .delete_one("people", &Filter::eq("id", 1))
            .await
            .unwrap();
        assert!(!outcome.acknowledged);
        assert_eq!(store.count("people", &Filter::all()).await.unwrap(), 3);
        session.commit().await.unwrap();
        assert_eq!(store.count("people", &Filter::eq("id", 4)).await.unwrap(), 1);
        assert_eq!(store.count("people", &Filter::eq("id", 1)).await.unwrap(), 0);

        let session = store.begin().await.unwrap();
        session
            .insert_one("people", json!({"id": 5, "name": "Eve"}))
            .await
            .unwrap();
        session.abort().await.unwrap();
        assert_eq!(store.count("people", &Filter::eq("id", 5)).await.unwrap(), 0);
        assert!(session.count("people", &Filter::all()).await.is_err());
    }

    #[tokio::test]
    async fn test_repository_over_surreal() {
        use crate::context::StoreContext;
        use crate::repository::{Entity, Repository, RepositoryConfig};
        use serde::Serialize;

        #[derive(Debug, Serialize, Deserialize)]
        struct Item {
            id: i64,
            n: u32,
        }

        impl Entity for Item {
            type Id = i64;

            fn id(&self) -> &i64 {
                &self.id
            }

            fn set_id(&mut self, id: i64) {
                self.id = id;
            }
        }

        let context = StoreContext::new(Arc::new(mem_store().await));
        let repo = context.repository::<Item, ()>(
            RepositoryConfig::new("items").order_by("id", OrderDirection::Ascending),
        );
        for n in 0..25 {
            repo.create(&mut Item { id: 0, n }).await.unwrap();
        }

        let page = repo.get_paged_list(1, 10, &()).await.unwrap();
        assert_eq!(page.total, 25);
        assert_eq!(
            page.items.iter().map(|i| i.id).collect::<Vec<_>>(),
            (11..=20).collect::<Vec<i64>>()
        );
        assert_eq!(
            context.sequences().current_value("items").await.unwrap().as_deref(),
            Some("25")
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_upserts_create_one_record() {
        let store = mem_store().await;
        let filter = Filter::eq("name", "orders");
        let update = UpdateDocument::new().set_on_insert("value", "1");
        let options = FindOneAndUpdateOptions::upsert(ReturnDocument::Before);

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            let filter = filter.clone();
            let update = update.clone();
            handles.push(tokio::spawn(async move {
                store
                    .find_one_and_update("Sequence", &filter, &update, options)
                    .await
            }));
        }
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => {}
                Err(e) => assert_eq!(e.kind, RepositoryErrorKind::Conflict, "{}", e),
            }
        }
        assert_eq!(store.count("Sequence", &Filter::all()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_update_counts_only_documents_still_matching() {
        let store = seeded().await;
        let expected = Filter::eq("id", 2) & Filter::eq("age", 41);
        let first = store
            .update_one("people", &expected, &UpdateDocument::new().set("age", 42))
            .await
            .unwrap();
        let second = store
            .update_one("people", &expected, &UpdateDocument::new().set("age", 43))
            .await
            .unwrap();
        assert_eq!(first.matched, 1);
        assert_eq!(second.matched, 0);

        let brian = store.find_one("people", &Filter::eq("id", 2)).await.unwrap().unwrap();
        assert_eq!(brian["age"], json!(42));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_sequence_values_are_distinct() {
        use crate::sequence::SequenceGenerator;

        let store = Arc::new(mem_store().await);
        // Each round has a winner, conflicts included, so this bound is never reached
        let generator = SequenceGenerator::new(store.clone()).with_max_cas_attempts(1024);

        let mut handles = Vec::new();
        for _ in 0..32 {
            let generator = generator.clone();
            handles.push(tokio::spawn(async move { generator.next::<u64>("orders").await }));
        }
        let mut values = Vec::new();
        let mut errors = Vec::new();
        for handle in handles {
            match handle.await.unwrap() {
                Ok(value) => values.push(value),
                Err(e) => errors.push(e.to_string()),
            }
        }

        assert!(errors.is_empty(), "errors: {:?}", errors);
        values.sort_unstable();
        assert_eq!(values, (1..=32).collect::<Vec<u64>>());
        assert_eq!(store.count("Sequence", &Filter::all()).await.unwrap(), 1);
        assert_eq!(
            generator.current_value("orders").await.unwrap().as_deref(),
            Some("32")
        );
    }
}
