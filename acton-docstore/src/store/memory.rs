//! In-memory document store
//!
//! Collections are insertion-ordered vectors of JSON objects behind a
//! `tokio::sync::RwLock`. Each call holds the lock for its whole duration,
//! so every single call is atomic. Every document carries an insertion
//! sequence number that never changes, which lets unsorted streams resume
//! where they stopped even when earlier documents were removed meanwhile.
//!
//! Sessions stage their writes against a private snapshot (a session reads
//! its own writes) and keep a write log. Commit replays that log onto the
//! live collections under one write lock, all or nothing.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use regex::Regex;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, RwLock};

use super::filter::like_to_regex;
use super::{
    lookup, Document, DocumentStore, DocumentStream, Filter, FilterOperator,
    FindOneAndUpdateOptions, FindOptions, OrderDirection, ReturnDocument, StoreSession,
    UpdateDocument, WriteOutcome,
};
use crate::repository::{RepositoryError, RepositoryOperation, RepositoryResult};

/// A filter compiled for evaluation, with LIKE patterns turned into regexes
enum Matcher {
    Condition {
        field: String,
        operator: FilterOperator,
        value: Value,
        pattern: Option<Regex>,
    },
    And(Vec<Matcher>),
    Or(Vec<Matcher>),
    Not(Box<Matcher>),
}

impl Matcher {
    fn compile(filter: &Filter, operation: RepositoryOperation) -> RepositoryResult<Self> {
        Ok(match filter {
            Filter::Condition(condition) => {
                let pattern = match condition.operator {
                    FilterOperator::Like => {
                        let raw = condition.value.as_str().ok_or_else(|| {
                            RepositoryError::validation_failed(
                                operation,
                                format!("LIKE pattern for '{}' must be a string", condition.field),
                            )
                        })?;
                        let regex = Regex::new(&like_to_regex(raw)).map_err(|e| {
                            RepositoryError::validation_failed(
                                operation,
                                format!("Invalid LIKE pattern '{}': {}", raw, e),
                            )
                        })?;
                        Some(regex)
                    }
                    _ => None,
                };
                Self::Condition {
                    field: condition.field.clone(),
                    operator: condition.operator,
                    value: condition.value.clone(),
                    pattern,
                }
            }
            Filter::And(inner) => Self::And(
                inner
                    .iter()
                    .map(|f| Self::compile(f, operation))
                    .collect::<RepositoryResult<_>>()?,
            ),
            Filter::Or(inner) => Self::Or(
                inner
                    .iter()
                    .map(|f| Self::compile(f, operation))
                    .collect::<RepositoryResult<_>>()?,
            ),
            Filter::Not(inner) => Self::Not(Box::new(Self::compile(inner, operation)?)),
        })
    }

    fn matches(&self, document: &Document) -> bool {
        match self {
            Self::And(inner) => inner.iter().all(|m| m.matches(document)),
            Self::Or(inner) => inner.iter().any(|m| m.matches(document)),
            Self::Not(inner) => !inner.matches(document),
            Self::Condition {
                field,
                operator,
                value,
                pattern,
            } => {
                let actual = lookup(document, field);
                match operator {
                    FilterOperator::Equal => field_equals(actual, value),
                    FilterOperator::NotEqual => !field_equals(actual, value),
                    FilterOperator::GreaterThan => {
                        ordering(actual, value) == Some(Ordering::Greater)
                    }
                    FilterOperator::GreaterThanOrEqual => matches!(
                        ordering(actual, value),
                        Some(Ordering::Greater | Ordering::Equal)
                    ),
                    FilterOperator::LessThan => ordering(actual, value) == Some(Ordering::Less),
                    FilterOperator::LessThanOrEqual => matches!(
                        ordering(actual, value),
                        Some(Ordering::Less | Ordering::Equal)
                    ),
                    FilterOperator::Like => match (actual.and_then(Value::as_str), pattern) {
                        (Some(text), Some(regex)) => regex.is_match(text),
                        _ => false,
                    },
                    FilterOperator::In => match value {
                        Value::Array(candidates) => {
                            candidates.iter().any(|candidate| field_equals(actual, candidate))
                        }
                        _ => false,
                    },
                    FilterOperator::IsNull => actual.map_or(true, Value::is_null),
                    FilterOperator::IsNotNull => actual.is_some_and(|v| !v.is_null()),
                }
            }
        }
    }
}

/// Missing fields equal only null
fn field_equals(actual: Option<&Value>, expected: &Value) -> bool {
    match actual {
        None => expected.is_null(),
        Some(actual) => compare(actual, expected) == Some(Ordering::Equal),
    }
}

fn ordering(actual: Option<&Value>, expected: &Value) -> Option<Ordering> {
    compare(actual?, expected)
}

/// Compare two values of the same JSON type; numbers compare numerically
fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => {
            if let (Some(l), Some(r)) = (l.as_i64(), r.as_i64()) {
                Some(l.cmp(&r))
            } else if let (Some(l), Some(r)) = (l.as_u64(), r.as_u64()) {
                Some(l.cmp(&r))
            } else {
                l.as_f64()?.partial_cmp(&r.as_f64()?)
            }
        }
        (Value::String(l), Value::String(r)) => Some(l.cmp(r)),
        (Value::Bool(l), Value::Bool(r)) => Some(l.cmp(r)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (l, r) if l == r => Some(Ordering::Equal),
        _ => None,
    }
}

fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Bool(_)) => 1,
        Some(Value::Number(_)) => 2,
        Some(Value::String(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Object(_)) => 5,
    }
}

fn sort_order(left: &Document, right: &Document, keys: &[(String, OrderDirection)]) -> Ordering {
    for (field, direction) in keys {
        let (l, r) = (lookup(left, field), lookup(right, field));
        let order = match (l, r) {
            (Some(lv), Some(rv)) => {
                compare(lv, rv).unwrap_or_else(|| type_rank(l).cmp(&type_rank(r)))
            }
            _ => type_rank(l).cmp(&type_rank(r)),
        };
        let order = match direction {
            OrderDirection::Ascending => order,
            OrderDirection::Descending => order.reverse(),
        };
        if order != Ordering::Equal {
            return order;
        }
    }
    Ordering::Equal
}

fn to_usize(value: u64) -> usize {
    usize::try_from(value).unwrap_or(usize::MAX)
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

/// A stored document and its insertion sequence number
#[derive(Debug, Clone)]
struct Entry {
    seq: u64,
    document: Document,
}

#[derive(Debug, Clone, Default)]
struct Collection {
    next_seq: u64,
    entries: Vec<Entry>,
}

impl Collection {
    fn document_mut(&mut self, index: usize) -> Option<&mut Document> {
        self.entries.get_mut(index).map(|entry| &mut entry.document)
    }
}

#[derive(Debug, Clone, Default)]
struct Collections {
    collections: HashMap<String, Collection>,
}

impl Collections {
    /// Entries in insertion order, so ascending by sequence number
    fn entries(&self, collection: &str) -> &[Entry] {
        self.collections
            .get(collection)
            .map(|c| c.entries.as_slice())
            .unwrap_or(&[])
    }

    fn documents(&self, collection: &str) -> impl Iterator<Item = &Document> {
        self.entries(collection).iter().map(|entry| &entry.document)
    }

    fn position(&self, collection: &str, matcher: &Matcher) -> Option<usize> {
        self.documents(collection)
            .position(|document| matcher.matches(document))
    }

    fn find(&self, collection: &str, matcher: &Matcher, options: &FindOptions) -> Vec<Document> {
        let mut matched = self
            .documents(collection)
            .filter(|document| matcher.matches(document))
            .collect::<Vec<_>>();
        if !options.sort.is_empty() {
            matched.sort_by(|l, r| sort_order(l, r, &options.sort));
        }
        matched
            .into_iter()
            .skip(options.skip.map_or(0, to_usize))
            .take(options.limit.map_or(usize::MAX, to_usize))
            .cloned()
            .collect()
    }

    fn count(&self, collection: &str, matcher: &Matcher) -> u64 {
        self.documents(collection)
            .filter(|document| matcher.matches(document))
            .count() as u64
    }

    fn insert(&mut self, collection: &str, document: Document) -> RepositoryResult<()> {
        ensure_object(RepositoryOperation::Insert, &document)?;
        let target = self.collections.entry(collection.to_string()).or_default();
        let seq = target.next_seq;
        target.next_seq += 1;
        target.entries.push(Entry { seq, document });
        Ok(())
    }

    fn replace_one(
        &mut self,
        collection: &str,
        matcher: &Matcher,
        document: Document,
    ) -> RepositoryResult<WriteOutcome> {
        ensure_object(RepositoryOperation::Replace, &document)?;
        let Some(index) = self.position(collection, matcher) else {
            return Ok(WriteOutcome::acknowledged(0, 0));
        };
        let slot = self
            .collections
            .get_mut(collection)
            .and_then(|c| c.document_mut(index));
        match slot {
            Some(existing) => {
                let modified = u64::from(*existing != document);
                *existing = document;
                Ok(WriteOutcome::acknowledged(1, modified))
            }
            None => Ok(WriteOutcome::acknowledged(0, 0)),
        }
    }

    fn update_one(
        &mut self,
        collection: &str,
        matcher: &Matcher,
        update: &UpdateDocument,
    ) -> WriteOutcome {
        let Some(index) = self.position(collection, matcher) else {
            return WriteOutcome::acknowledged(0, 0);
        };
        match self
            .collections
            .get_mut(collection)
            .and_then(|c| c.document_mut(index))
        {
            Some(existing) => WriteOutcome::acknowledged(1, u64::from(update.apply(existing))),
            None => WriteOutcome::acknowledged(0, 0),
        }
    }

    fn delete_one(&mut self, collection: &str, matcher: &Matcher) -> WriteOutcome {
        let Some(index) = self.position(collection, matcher) else {
            return WriteOutcome::acknowledged(0, 0);
        };
        match self.collections.get_mut(collection) {
            Some(target) => {
                target.entries.remove(index);
                WriteOutcome::acknowledged(1, 1)
            }
            None => WriteOutcome::acknowledged(0, 0),
        }
    }

    fn find_one_and_update(
        &mut self,
        collection: &str,
        filter: &Filter,
        matcher: &Matcher,
        update: &UpdateDocument,
        options: FindOneAndUpdateOptions,
    ) -> RepositoryResult<Option<Document>> {
        if let Some(index) = self.position(collection, matcher) {
            let Some(existing) = self
                .collections
                .get_mut(collection)
                .and_then(|c| c.document_mut(index))
            else {
                return Ok(None);
            };
            let before = existing.clone();
            update.apply(existing);
            return Ok(Some(match options.return_document {
                ReturnDocument::Before => before,
                ReturnDocument::After => existing.clone(),
            }));
        }

        if !options.upsert {
            return Ok(None);
        }

        let seeded = update.seed(filter.equalities());
        self.insert(collection, seeded.clone())?;
        Ok(match options.return_document {
            ReturnDocument::Before => None,
            ReturnDocument::After => Some(seeded),
        })
    }
}

/// A write recorded by a session, replayed on commit
#[derive(Debug, Clone)]
enum WriteOp {
    Insert {
        collection: String,
        document: Document,
    },
    Replace {
        collection: String,
        filter: Filter,
        document: Document,
    },
    Update {
        collection: String,
        filter: Filter,
        update: UpdateDocument,
    },
    Delete {
        collection: String,
        filter: Filter,
    },
    Upsert {
        collection: String,
        filter: Filter,
        update: UpdateDocument,
        options: FindOneAndUpdateOptions,
    },
}

impl WriteOp {
    fn apply(&self, collections: &mut Collections) -> RepositoryResult<()> {
        match self {
            Self::Insert {
                collection,
                document,
            } => collections.insert(collection, document.clone()),
            Self::Replace {
                collection,
                filter,
                document,
            } => {
                let matcher = Matcher::compile(filter, RepositoryOperation::Commit)?;
                collections
                    .replace_one(collection, &matcher, document.clone())
                    .map(drop)
            }
            Self::Update {
                collection,
                filter,
                update,
            } => {
                let matcher = Matcher::compile(filter, RepositoryOperation::Commit)?;
                collections.update_one(collection, &matcher, update);
                Ok(())
            }
            Self::Delete { collection, filter } => {
                let matcher = Matcher::compile(filter, RepositoryOperation::Commit)?;
                collections.delete_one(collection, &matcher);
                Ok(())
            }
            Self::Upsert {
                collection,
                filter,
                update,
                options,
            } => {
                let matcher = Matcher::compile(filter, RepositoryOperation::Commit)?;
                collections
                    .find_one_and_update(collection, filter, &matcher, update, *options)
                    .map(drop)
            }
        }
    }
}

/// Lazy cursor over one collection of the live store
///
/// The cursor remembers the next sequence number to visit rather than a
/// vector index, so removals behind it do not make it skip a match.
/// Documents inserted after it was opened are visited too.
struct Cursor {
    inner: Arc<RwLock<Collections>>,
    collection: String,
    matcher: Matcher,
    next_seq: u64,
    skip: u64,
    remaining: Option<u64>,
}

impl Cursor {
    /// Advance to the next match, taking the read lock only for this step
    async fn advance(&mut self) -> Option<Document> {
        if self.remaining == Some(0) {
            return None;
        }
        let guard = self.inner.read().await;
        let entries = guard.entries(&self.collection);
        let start = entries.partition_point(|entry| entry.seq < self.next_seq);
        for Entry { seq, document } in &entries[start..] {
            self.next_seq = seq + 1;
            if !self.matcher.matches(document) {
                continue;
            }
            if self.skip > 0 {
                self.skip -= 1;
                continue;
            }
            if let Some(remaining) = self.remaining.as_mut() {
                *remaining -= 1;
            }
            return Some(document.clone());
        }
        None
    }
}

/// In-process document store
///
/// Cloning is cheap and clones share the same collections.
///
/// # Example
///
/// ```rust
/// use acton_docstore::store::{DocumentStore, Filter, MemoryStore};
/// use serde_json::json;
///
/// # tokio_test_block(async {
/// let store = MemoryStore::new();
/// store.insert_one("users", json!({"id": 1, "name": "Ada"})).await.unwrap();
/// let found = store.find_one("users", &Filter::eq("name", "Ada")).await.unwrap();
/// assert_eq!(found.unwrap()["id"], json!(1));
/// # });
/// # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Collections>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of collections holding at least one document
    pub async fn collection_names(&self) -> Vec<String> {
        let guard = self.inner.read().await;
        let mut names = guard
            .collections
            .iter()
            .filter(|(_, c)| !c.entries.is_empty())
            .map(|(name, _)| name.clone())
            .collect::<Vec<_>>();
        names.sort();
        names
    }

    /// Every document of a collection, regardless of any flag, in insertion order
    pub async fn snapshot(&self, collection: &str) -> Vec<Document> {
        self.inner
            .read()
            .await
            .documents(collection)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> RepositoryResult<Vec<Document>> {
        let matcher = Matcher::compile(filter, RepositoryOperation::Find)?;
        Ok(self.inner.read().await.find(collection, &matcher, options))
    }

    async fn stream(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> RepositoryResult<DocumentStream> {
        let matcher = Matcher::compile(filter, RepositoryOperation::Find)?;

        // Ordering needs every match up front
        if !options.sort.is_empty() {
            let documents = self.inner.read().await.find(collection, &matcher, options);
            return Ok(stream::iter(documents.into_iter().map(Ok)).boxed());
        }

        let cursor = Cursor {
            inner: Arc::clone(&self.inner),
            collection: collection.to_string(),
            matcher,
            next_seq: 0,
            skip: options.skip.unwrap_or(0),
            remaining: options.limit,
        };
        Ok(stream::unfold(cursor, |mut cursor| async move {
            let document = cursor.advance().await?;
            Some((Ok(document), cursor))
        })
        .boxed())
    }

    async fn count(&self, collection: &str, filter: &Filter) -> RepositoryResult<u64> {
        let matcher = Matcher::compile(filter, RepositoryOperation::Count)?;
        Ok(self.inner.read().await.count(collection, &matcher))
    }

    async fn insert_one(&self, collection: &str, document: Document) -> RepositoryResult<()> {
        self.inner.write().await.insert(collection, document)?;
        tracing::debug!("Inserted document into '{}'", collection);
        Ok(())
    }

    async fn replace_one(
        &self,
        collection: &str,
        filter: &Filter,
        document: Document,
    ) -> RepositoryResult<WriteOutcome> {
        let matcher = Matcher::compile(filter, RepositoryOperation::Replace)?;
        self.inner
            .write()
            .await
            .replace_one(collection, &matcher, document)
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        update: &UpdateDocument,
    ) -> RepositoryResult<WriteOutcome> {
        let matcher = Matcher::compile(filter, RepositoryOperation::Update)?;
        Ok(self
            .inner
            .write()
            .await
            .update_one(collection, &matcher, update))
    }

    async fn delete_one(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> RepositoryResult<WriteOutcome> {
        let matcher = Matcher::compile(filter, RepositoryOperation::Delete)?;
        Ok(self.inner.write().await.delete_one(collection, &matcher))
    }

    async fn find_one_and_update(
        &self,
        collection: &str,
        filter: &Filter,
        update: &UpdateDocument,
        options: FindOneAndUpdateOptions,
    ) -> RepositoryResult<Option<Document>> {
        let matcher = Matcher::compile(filter, RepositoryOperation::Upsert)?;
        self.inner
            .write()
            .await
            .find_one_and_update(collection, filter, &matcher, update, options)
    }

    async fn begin(&self) -> RepositoryResult<Arc<dyn StoreSession>> {
        let staged = self.inner.read().await.clone();
        tracing::debug!("Memory session started");
        Ok(Arc::new(MemorySession {
            root: self.clone(),
            state: Mutex::new(SessionState {
                staged,
                log: Vec::new(),
                finished: None,
            }),
        }))
    }
}

struct SessionState {
    staged: Collections,
    log: Vec<WriteOp>,
    finished: Option<&'static str>,
}

/// A session over a [`MemoryStore`]
pub struct MemorySession {
    root: MemoryStore,
    state: Mutex<SessionState>,
}

impl MemorySession {
    async fn open(
        &self,
        operation: RepositoryOperation,
    ) -> RepositoryResult<MutexGuard<'_, SessionState>> {
        let state = self.state.lock().await;
        match state.finished {
            Some(how) => Err(RepositoryError::transaction(
                operation,
                format!("Session already {}", how),
            )),
            None => Ok(state),
        }
    }
}

#[async_trait]
impl DocumentStore for MemorySession {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> RepositoryResult<Vec<Document>> {
        let matcher = Matcher::compile(filter, RepositoryOperation::Find)?;
        let state = self.open(RepositoryOperation::Find).await?;
        Ok(state.staged.find(collection, &matcher, options))
    }

    async fn stream(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> RepositoryResult<DocumentStream> {
        let documents = self.find(collection, filter, options).await?;
        Ok(stream::iter(documents.into_iter().map(Ok)).boxed())
    }

    async fn count(&self, collection: &str, filter: &Filter) -> RepositoryResult<u64> {
        let matcher = Matcher::compile(filter, RepositoryOperation::Count)?;
        let state = self.open(RepositoryOperation::Count).await?;
        Ok(state.staged.count(collection, &matcher))
    }

    async fn insert_one(&self, collection: &str, document: Document) -> RepositoryResult<()> {
        let mut state = self.open(RepositoryOperation::Insert).await?;
        state.staged.insert(collection, document.clone())?;
        state.log.push(WriteOp::Insert {
            collection: collection.to_string(),
            document,
        });
        Ok(())
    }

    async fn replace_one(
        &self,
        collection: &str,
        filter: &Filter,
        document: Document,
    ) -> RepositoryResult<WriteOutcome> {
        let matcher = Matcher::compile(filter, RepositoryOperation::Replace)?;
        let mut state = self.open(RepositoryOperation::Replace).await?;
        let outcome = state
            .staged
            .replace_one(collection, &matcher, document.clone())?;
        state.log.push(WriteOp::Replace {
            collection: collection.to_string(),
            filter: filter.clone(),
            document,
        });
        Ok(outcome)
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        update: &UpdateDocument,
    ) -> RepositoryResult<WriteOutcome> {
        let matcher = Matcher::compile(filter, RepositoryOperation::Update)?;
        let mut state = self.open(RepositoryOperation::Update).await?;
        let outcome = state.staged.update_one(collection, &matcher, update);
        state.log.push(WriteOp::Update {
            collection: collection.to_string(),
            filter: filter.clone(),
            update: update.clone(),
        });
        Ok(outcome)
    }

    async fn delete_one(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> RepositoryResult<WriteOutcome> {
        let matcher = Matcher::compile(filter, RepositoryOperation::Delete)?;
        let mut state = self.open(RepositoryOperation::Delete).await?;
        let outcome = state.staged.delete_one(collection, &matcher);
        state.log.push(WriteOp::Delete {
            collection: collection.to_string(),
            filter: filter.clone(),
        });
        Ok(outcome)
    }

    async fn find_one_and_update(
        &self,
        collection: &str,
        filter: &Filter,
        update: &UpdateDocument,
        options: FindOneAndUpdateOptions,
    ) -> RepositoryResult<Option<Document>> {
        let matcher = Matcher::compile(filter, RepositoryOperation::Upsert)?;
        let mut state = self.open(RepositoryOperation::Upsert).await?;
        let document = state
            .staged
            .find_one_and_update(collection, filter, &matcher, update, options)?;
        state.log.push(WriteOp::Upsert {
            collection: collection.to_string(),
            filter: filter.clone(),
            update: update.clone(),
            options,
        });
        Ok(document)
    }

    async fn begin(&self) -> RepositoryResult<Arc<dyn StoreSession>> {
        Err(RepositoryError::transaction(
            RepositoryOperation::Begin,
            "Nested sessions are not supported",
        ))
    }
}

#[async_trait]
impl StoreSession for MemorySession {
    async fn commit(&self) -> RepositoryResult<()> {
        let mut state = self.open(RepositoryOperation::Commit).await?;
        let mut live = self.root.inner.write().await;

        let mut next = live.clone();
        for op in &state.log {
            op.apply(&mut next)?;
        }
        *live = next;

        tracing::debug!("Memory session committed {} write(s)", state.log.len());
        state.log.clear();
        state.finished = Some("committed");
        Ok(())
    }

    async fn abort(&self) -> RepositoryResult<()> {
        let mut state = self.open(RepositoryOperation::Abort).await?;
        tracing::debug!("Memory session aborted, discarding {} write(s)", state.log.len());
        state.log.clear();
        state.staged = Collections::default();
        state.finished = Some("aborted");
        Ok(())
    }

    fn as_store(self: Arc<Self>) -> Arc<dyn DocumentStore> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FilterCondition;
    use serde_json::json;

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        for (id, name, age, tier) in [
            (1, "Ada", 36, "gold"),
            (2, "Brian", 41, "silver"),
            (3, "Cleo", 29, "gold"),
            (4, "Dmitri", 52, "bronze"),
        ] {
            store
                .insert_one(
                    "people",
                    json!({"id": id, "name": name, "age": age, "tier": tier, "is_deleted": false}),
                )
                .await
                .unwrap();
        }
        store
    }

    async fn names(store: &impl DocumentStore, filter: Filter) -> Vec<String> {
        store
            .find("people", &filter, &FindOptions::new())
            .await
            .unwrap()
            .into_iter()
            .map(|d| d["name"].as_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_filter_operators() {
        let store = seeded().await;
        assert_eq!(names(&store, Filter::eq("tier", "gold")).await, ["Ada", "Cleo"]);
        assert_eq!(names(&store, Filter::ne("tier", "gold")).await, ["Brian", "Dmitri"]);
        assert_eq!(names(&store, Filter::gt("age", 40)).await, ["Brian", "Dmitri"]);
        assert_eq!(names(&store, Filter::gte("age", 41)).await, ["Brian", "Dmitri"]);
        assert_eq!(names(&store, Filter::lt("age", 30)).await, ["Cleo"]);
        assert_eq!(names(&store, Filter::lte("age", 36)).await, ["Ada", "Cleo"]);
        assert_eq!(
            names(&store, FilterCondition::in_list("id", [1, 4]).into()).await,
            ["Ada", "Dmitri"]
        );
        assert_eq!(
            names(&store, FilterCondition::like("name", "_r%").into()).await,
            ["Brian"]
        );
        assert!(names(&store, FilterCondition::is_null("email").into()).await.len() == 4);
        assert!(names(&store, FilterCondition::is_not_null("email").into())
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn test_filter_combinators() {
        let store = seeded().await;
        let filter = Filter::eq("tier", "gold") | Filter::gt("age", 50);
        assert_eq!(names(&store, filter).await, ["Ada", "Cleo", "Dmitri"]);

        let filter = (Filter::eq("tier", "gold") & Filter::gt("age", 30)).negate();
        assert_eq!(names(&store, filter).await, ["Brian", "Cleo", "Dmitri"]);

        assert_eq!(names(&store, Filter::all()).await.len(), 4);
    }

    #[tokio::test]
    async fn test_like_escapes_regex_syntax() {
        let store = MemoryStore::new();
        store
            .insert_one("files", json!({"name": "a.b"}))
            .await
            .unwrap();
        store
            .insert_one("files", json!({"name": "axb"}))
            .await
            .unwrap();
        let found = store
            .count("files", &FilterCondition::like("name", "a.b").into())
            .await
            .unwrap();
        assert_eq!(found, 1);
    }

    #[tokio::test]
    async fn test_numbers_compare_across_representations() {
        let store = MemoryStore::new();
        store
            .insert_one("n", json!({"v": 1.0}))
            .await
            .unwrap();
        assert_eq!(store.count("n", &Filter::eq("v", 1)).await.unwrap(), 1);
        assert_eq!(store.count("n", &Filter::lt("v", 1.5)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_find_skip_limit_sort() {
        let store = seeded().await;
        let options = FindOptions::new()
            .sort_by("age", OrderDirection::Descending)
            .skip(1)
            .limit(2);
        let found = store
            .find("people", &Filter::all(), &options)
            .await
            .unwrap();
        let ages = found.iter().map(|d| d["age"].as_i64().unwrap()).collect::<Vec<_>>();
        assert_eq!(ages, [41, 36]);
    }

    #[tokio::test]
    async fn test_stream_is_lazy_and_windowed() {
        let store = seeded().await;
        let options = FindOptions::new().skip(1).limit(2);
        let stream = store
            .stream("people", &Filter::all(), &options)
            .await
            .unwrap();
        let found = stream
            .map(|d| d.unwrap()["id"].as_i64().unwrap())
            .collect::<Vec<_>>()
            .await;
        assert_eq!(found, [2, 3]);
    }

    #[tokio::test]
    async fn test_stream_sees_documents_appended_before_it_reaches_them() {
        let store = seeded().await;
        let mut stream = store
            .stream("people", &Filter::all(), &FindOptions::new())
            .await
            .unwrap();
        assert!(stream.next().await.is_some());
        store
            .insert_one("people", json!({"id": 5, "name": "Eve"}))
            .await
            .unwrap();
        let rest = stream.collect::<Vec<_>>().await;
        assert_eq!(rest.len(), 4);
    }

    #[tokio::test]
    async fn test_stream_survives_removal_behind_it() {
        let store = seeded().await;
        let mut stream = store
            .stream("people", &Filter::all(), &FindOptions::new())
            .await
            .unwrap();
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first["id"], json!(1));

        store.delete_one("people", &Filter::eq("id", 1)).await.unwrap();
        let rest = stream
            .map(|d| d.unwrap()["id"].as_i64().unwrap())
            .collect::<Vec<_>>()
            .await;
        assert_eq!(rest, [2, 3, 4]);
    }

    #[tokio::test]
    async fn test_replace_update_delete_outcomes() {
        let store = seeded().await;
        let outcome = store
            .replace_one("people", &Filter::eq("id", 1), json!({"id": 1, "name": "Ada L"}))
            .await
            .unwrap();
        assert_eq!(outcome, WriteOutcome::acknowledged(1, 1));

        let outcome = store
            .update_one(
                "people",
                &Filter::eq("id", 99),
                &UpdateDocument::new().set("name", "x"),
            )
            .await
            .unwrap();
        assert_eq!(outcome.matched, 0);

        let outcome = store
            .delete_one("people", &Filter::eq("id", 2))
            .await
            .unwrap();
        assert_eq!(outcome.modified, 1);
        let outcome = store
            .delete_one("people", &Filter::eq("id", 2))
            .await
            .unwrap();
        assert_eq!(outcome.modified, 0);
        assert_eq!(store.snapshot("people").await.len(), 3);
    }

    #[tokio::test]
    async fn test_insert_rejects_non_objects() {
        let store = MemoryStore::new();
        let error = store.insert_one("x", json!([1, 2])).await.unwrap_err();
        assert_eq!(
            error.kind,
            crate::repository::RepositoryErrorKind::ValidationFailed
        );
    }

    #[tokio::test]
    async fn test_find_one_and_update_upsert() {
        let store = MemoryStore::new();
        let filter = Filter::eq("name", "orders");
        let update = UpdateDocument::new().set_on_insert("value", "1");
        let options = FindOneAndUpdateOptions::upsert(ReturnDocument::Before);

        let first = store
            .find_one_and_update("Sequence", &filter, &update, options)
            .await
            .unwrap();
        assert!(first.is_none());

        let second = store
            .find_one_and_update("Sequence", &filter, &update, options)
            .await
            .unwrap();
        assert_eq!(second, Some(json!({"name": "orders", "value": "1"})));
        assert_eq!(store.snapshot("Sequence").await.len(), 1);

        let after = store
            .find_one_and_update(
                "Sequence",
                &filter,
                &UpdateDocument::new().set("value", "2"),
                FindOneAndUpdateOptions {
                    upsert: false,
                    return_document: ReturnDocument::After,
                },
            )
            .await
            .unwrap();
        assert_eq!(after.unwrap()["value"], json!("2"));
    }

    #[tokio::test]
    async fn test_session_reads_own_writes_and_commits() {
        let store = seeded().await;
        let session = store.begin().await.unwrap();
        session
            .insert_one("people", json!({"id": 5, "name": "Eve"}))
            .await
            .unwrap();
        session
            .delete_one("people", &Filter::eq("id", 1))
            .await
            .unwrap();

        assert_eq!(session.count("people", &Filter::all()).await.unwrap(), 4);
        assert!(session
            .find_one("people", &Filter::eq("id", 5))
            .await
            .unwrap()
            .is_some());
        assert!(store
            .find_one("people", &Filter::eq("id", 5))
            .await
            .unwrap()
            .is_none());

        session.commit().await.unwrap();
        assert_eq!(names(&store, Filter::all()).await, ["Brian", "Cleo", "Dmitri", "Eve"]);
    }

    #[tokio::test]
    async fn test_session_abort_discards_and_closes() {
        let store = seeded().await;
        let session = store.begin().await.unwrap();
        session
            .insert_one("people", json!({"id": 5, "name": "Eve"}))
            .await
            .unwrap();
        session.abort().await.unwrap();

        assert_eq!(store.snapshot("people").await.len(), 4);
        let error = session
            .count("people", &Filter::all())
            .await
            .unwrap_err();
        assert_eq!(
            error.kind,
            crate::repository::RepositoryErrorKind::Transaction
        );
        assert!(session.commit().await.is_err());
    }

    #[tokio::test]
    async fn test_dropped_session_discards_writes() {
        let store = seeded().await;
        {
            let session = store.begin().await.unwrap();
            session
                .insert_one("people", json!({"id": 5, "name": "Eve"}))
                .await
                .unwrap();
        }
        assert_eq!(store.snapshot("people").await.len(), 4);
    }

    #[tokio::test]
    async fn test_commit_replays_onto_concurrent_changes() {
        let store = seeded().await;
        let session = store.begin().await.unwrap();
        session
            .update_one(
                "people",
                &Filter::eq("id", 3),
                &UpdateDocument::new().set("tier", "platinum"),
            )
            .await
            .unwrap();
        store
            .insert_one("people", json!({"id": 6, "name": "Fay"}))
            .await
            .unwrap();
        session.commit().await.unwrap();

        assert_eq!(names(&store, Filter::eq("tier", "platinum")).await, ["Cleo"]);
        assert_eq!(store.snapshot("people").await.len(), 5);
    }

    #[tokio::test]
    async fn test_nested_begin_is_rejected() {
        let store = MemoryStore::new();
        let session = store.begin().await.unwrap();
        assert!(session.begin().await.is_err());
    }

    #[tokio::test]
    async fn test_collection_names() {
        let store = seeded().await;
        store.insert_one("audit", json!({})).await.unwrap();
        assert_eq!(store.collection_names().await, ["audit", "people"]);
    }
}
