//! Identifier sequences
//!
//! Numeric identifiers are minted from one counter document per collection:
//!
//! ```json
//! { "name": "orders", "value": "42" }
//! ```
//!
//! The counter is stored as a decimal string so every numeric kind, including
//! `u64`, round-trips losslessly through JSON backends.
//!
//! Creating the counter is a single atomic upsert. Advancing it is a
//! compare-and-swap on the stored value, retried when another writer gets
//! there first. The value handed out is always the value left in the store,
//! so calls yield 1, 2, 3, ... and concurrent callers never share a value.
//!
//! A generator always talks to the store it was built with. Repositories
//! bound to a transaction keep the generator of the root store, so numbers
//! handed out inside an aborted transaction are never reused.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::SequenceConfig;
use crate::identifier::{Identifier, IdentifierKind, SequenceValue};
use crate::repository::{
    RepositoryError, RepositoryErrorKind, RepositoryOperation, RepositoryResult,
};
use crate::store::{
    Document, DocumentStore, Filter, FindOneAndUpdateOptions, ReturnDocument, UpdateDocument,
};

const NAME_FIELD: &str = "name";
const VALUE_FIELD: &str = "value";

/// Mints identifiers for entity collections
#[derive(Clone)]
pub struct SequenceGenerator {
    store: Arc<dyn DocumentStore>,
    collection: String,
    max_cas_attempts: u32,
}

impl SequenceGenerator {
    /// Default name of the collection holding counters
    pub const DEFAULT_COLLECTION: &'static str = "Sequence";

    /// Default number of compare-and-swap attempts per call
    pub const DEFAULT_MAX_CAS_ATTEMPTS: u32 = 16;

    /// Create a generator storing counters in the default collection
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            collection: Self::DEFAULT_COLLECTION.to_string(),
            max_cas_attempts: Self::DEFAULT_MAX_CAS_ATTEMPTS,
        }
    }

    /// Create a generator from the `sequence` configuration section
    pub fn from_config(store: Arc<dyn DocumentStore>, config: &SequenceConfig) -> Self {
        Self::new(store)
            .with_collection(config.collection.clone())
            .with_max_cas_attempts(config.max_cas_attempts)
    }

    /// Store counters in another collection
    #[must_use]
    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    /// Limit compare-and-swap attempts (at least one is always made)
    #[must_use]
    pub fn with_max_cas_attempts(mut self, attempts: u32) -> Self {
        self.max_cas_attempts = attempts.max(1);
        self
    }

    /// Name of the collection holding counters
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Produce the next identifier of `kind` for `collection_name`
    pub async fn next_value(
        &self,
        collection_name: &str,
        kind: IdentifierKind,
    ) -> RepositoryResult<SequenceValue> {
        if !kind.is_numeric() {
            return Ok(SequenceValue::Uuid(Uuid::new_v4()));
        }

        self.advance(collection_name, kind)
            .await
            .map(SequenceValue::Number)
            .map_err(|e| e.with_entity(self.collection.as_str(), collection_name))
    }

    /// Produce the next identifier as the concrete identifier type
    pub async fn next<I: Identifier>(&self, collection_name: &str) -> RepositoryResult<I> {
        let value = self.next_value(collection_name, I::KIND).await?;
        I::from_sequence(value)
    }

    /// Produce the next identifier for a kind known only by name
    ///
    /// Unknown names fail before the store is touched.
    pub async fn next_value_named(
        &self,
        collection_name: &str,
        kind_name: &str,
    ) -> RepositoryResult<SequenceValue> {
        let kind = IdentifierKind::from_str(kind_name)?;
        self.next_value(collection_name, kind).await
    }

    /// The stored counter of `collection_name`, if any
    pub async fn current_value(&self, collection_name: &str) -> RepositoryResult<Option<String>> {
        let record = self
            .store
            .find_one(&self.collection, &Filter::eq(NAME_FIELD, collection_name))
            .await?;
        record.map(|r| stored_counter(&r).map(|(_, text)| text)).transpose()
    }

    async fn advance(&self, collection_name: &str, kind: IdentifierKind) -> RepositoryResult<u64> {
        let record = Filter::eq(NAME_FIELD, collection_name);

        for attempt in 1..=self.max_cas_attempts {
            match self.try_advance(collection_name, kind, &record).await {
                Ok(Some(value)) => return Ok(value),
                Ok(None) => tracing::warn!(
                    "Sequence '{}' moved during update (attempt {}/{}), retrying",
                    collection_name,
                    attempt,
                    self.max_cas_attempts
                ),
                Err(e) if e.kind == RepositoryErrorKind::Conflict => tracing::warn!(
                    "Sequence '{}' write conflict (attempt {}/{}), retrying: {}",
                    collection_name,
                    attempt,
                    self.max_cas_attempts,
                    e.message
                ),
                Err(e) => return Err(e),
            }
        }

        Err(RepositoryError::conflict(
            RepositoryOperation::NextSequence,
            format!(
                "Sequence '{}' kept changing after {} attempts",
                collection_name, self.max_cas_attempts
            ),
        ))
    }

    /// One round of ensure, read and compare-and-swap
    ///
    /// Returns `None` when another writer advanced the counter first.
    async fn try_advance(
        &self,
        collection_name: &str,
        kind: IdentifierKind,
        record: &Filter,
    ) -> RepositoryResult<Option<u64>> {
        let existing = self
            .store
            .find_one_and_update(
                &self.collection,
                record,
                &UpdateDocument::new().set_on_insert(VALUE_FIELD, "1"),
                FindOneAndUpdateOptions::upsert(ReturnDocument::Before),
            )
            .await?;

        let Some(current) = existing else {
            tracing::debug!("Created sequence '{}' at 1", collection_name);
            return Ok(Some(1));
        };

        let (raw, text) = stored_counter(&current)?;
        let next = kind.increment(kind.parse_counter(&text)?)?;

        let expected = record.clone() & Filter::eq(VALUE_FIELD, raw);
        let outcome = self
            .store
            .update_one(
                &self.collection,
                &expected,
                &UpdateDocument::new().set(VALUE_FIELD, next.to_string()),
            )
            .await?;

        if outcome.matched == 1 {
            tracing::debug!("Advanced sequence '{}' to {}", collection_name, next);
            Ok(Some(next))
        } else {
            Ok(None)
        }
    }
}

/// The stored counter as found in the document and as decimal text
fn stored_counter(record: &Document) -> RepositoryResult<(serde_json::Value, String)> {
    let raw = record.get(VALUE_FIELD).cloned().unwrap_or_default();
    let text = match &raw {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        other => {
            return Err(RepositoryError::serialization_error(
                RepositoryOperation::NextSequence,
                format!("Stored counter has unexpected value {}", other),
            ))
        }
    };
    Ok((raw, text))
}

impl fmt::Debug for SequenceGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SequenceGenerator")
            .field("backend", &self.store.backend_name())
            .field("collection", &self.collection)
            .field("max_cas_attempts", &self.max_cas_attempts)
            .finish()
    }
}
