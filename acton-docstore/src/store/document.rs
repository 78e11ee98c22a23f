//! Documents, update documents and per-call options

use serde_json::{Map, Value};

use super::filter::OrderDirection;

/// A stored document: always a JSON object
pub type Document = Value;

/// Resolve a dotted field path inside a document
pub(crate) fn lookup<'a>(document: &'a Document, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(document, |current, segment| current.as_object()?.get(segment))
}

/// Assign a value at a dotted field path, creating intermediate objects
pub(crate) fn assign(document: &mut Document, path: &str, value: Value) {
    let mut segments = path.split('.').peekable();
    let mut current = document;
    while let Some(segment) = segments.next() {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        let Value::Object(map) = current else {
            return;
        };
        if segments.peek().is_none() {
            map.insert(segment.to_string(), value);
            return;
        }
        current = map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
}

/// Field assignments applied by `update_one` and `find_one_and_update`
///
/// `set` fields are written on every match; `set_on_insert` fields are only
/// written when an upsert creates a new document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateDocument {
    set: Vec<(String, Value)>,
    set_on_insert: Vec<(String, Value)>,
}

impl UpdateDocument {
    /// Create an empty update
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign `value` to `field` on every matched document
    #[must_use]
    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set.push((field.into(), value.into()));
        self
    }

    /// Assign `value` to `field` only when an upsert inserts
    #[must_use]
    pub fn set_on_insert(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set_on_insert.push((field.into(), value.into()));
        self
    }

    /// Assignments applied on every match
    pub fn set_fields(&self) -> &[(String, Value)] {
        &self.set
    }

    /// Assignments applied only on insert
    pub fn insert_fields(&self) -> &[(String, Value)] {
        &self.set_on_insert
    }

    /// Whether the update changes nothing on an existing document
    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    /// Apply the `set` assignments to an existing document
    pub(crate) fn apply(&self, document: &mut Document) -> bool {
        let mut changed = false;
        for (field, value) in &self.set {
            if lookup(document, field) != Some(value) {
                assign(document, field, value.clone());
                changed = true;
            }
        }
        changed
    }

    /// Build the document an upsert inserts: filter equalities, then
    /// insert-only fields, then `set` fields
    pub(crate) fn seed<'a>(
        &self,
        equalities: impl IntoIterator<Item = (&'a str, &'a Value)>,
    ) -> Document {
        let mut document = Value::Object(Map::new());
        for (field, value) in equalities {
            assign(&mut document, field, value.clone());
        }
        for (field, value) in &self.set_on_insert {
            assign(&mut document, field, value.clone());
        }
        for (field, value) in &self.set {
            assign(&mut document, field, value.clone());
        }
        document
    }
}

/// Skip, limit and ordering for multi-document reads
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindOptions {
    /// Number of matching documents to skip
    pub skip: Option<u64>,
    /// Maximum number of documents to return
    pub limit: Option<u64>,
    /// Sort keys, most significant first
    pub sort: Vec<(String, OrderDirection)>,
}

impl FindOptions {
    /// Options with no skip, limit or ordering
    pub fn new() -> Self {
        Self::default()
    }

    /// Skip the first `skip` matches
    #[must_use]
    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    /// Return at most `limit` documents
    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Append a sort key
    #[must_use]
    pub fn sort_by(mut self, field: impl Into<String>, direction: OrderDirection) -> Self {
        self.sort.push((field.into(), direction));
        self
    }
}

/// Result of a single-document write
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOutcome {
    /// False when the write was deferred (buffered in a session) and the
    /// counts are not known yet
    pub acknowledged: bool,
    /// Documents matched by the filter
    pub matched: u64,
    /// Documents changed or removed
    pub modified: u64,
    /// Whether an upsert inserted a new document
    pub upserted: bool,
}

impl WriteOutcome {
    /// An acknowledged outcome
    pub const fn acknowledged(matched: u64, modified: u64) -> Self {
        Self {
            acknowledged: true,
            matched,
            modified,
            upserted: false,
        }
    }

    /// An outcome for a write buffered until commit
    pub const fn deferred() -> Self {
        Self {
            acknowledged: false,
            matched: 0,
            modified: 0,
            upserted: false,
        }
    }
}

/// Which version of the document `find_one_and_update` returns
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReturnDocument {
    /// The document as it was before the update (nothing when inserted)
    #[default]
    Before,
    /// The document after the update or insert
    After,
}

/// Options for `find_one_and_update`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FindOneAndUpdateOptions {
    /// Insert a document seeded from the filter when nothing matches
    pub upsert: bool,
    /// Which version of the document to return
    pub return_document: ReturnDocument,
}

impl FindOneAndUpdateOptions {
    /// Upserting options returning the given document version
    pub const fn upsert(return_document: ReturnDocument) -> Self {
        Self {
            upsert: true,
            return_document,
        }
    }
}
