//! Document store abstraction
//!
//! [`DocumentStore`] is the seam between repositories and a concrete
//! database. Documents are JSON objects grouped in named collections and
//! selected with [`Filter`] predicates.
//!
//! # Available Backends
//!
//! - **Memory** (always available): [`MemoryStore`], lock-protected and
//!   in-process. Used by tests and embedded deployments.
//! - **SurrealDB** (`surrealdb` feature): `SurrealStore`, connecting through
//!   the `any` engine (`ws://`, `http://`, `mem://`).
//!
//! Every single call is atomic with respect to the one document it touches.
//! Nothing spanning two calls is, unless both go through a [`StoreSession`].

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::sync::Arc;

use crate::repository::RepositoryResult;

mod document;
mod filter;
mod memory;

#[cfg(feature = "surrealdb")]
pub mod surreal;

pub use document::{
    Document, FindOneAndUpdateOptions, FindOptions, ReturnDocument, UpdateDocument, WriteOutcome,
};
pub use filter::{Filter, FilterCondition, FilterOperator, OrderDirection};
pub use memory::{MemorySession, MemoryStore};

#[cfg(feature = "surrealdb")]
pub use surreal::{SurrealClient, SurrealSession, SurrealStore};

pub(crate) use document::{assign, lookup};

/// A lazy, finite sequence of documents backed by a store cursor
pub type DocumentStream = BoxStream<'static, RepositoryResult<Document>>;

/// Trait for document database backends
///
/// Implementations must be safe to share across tasks behind an `Arc`.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Short backend name used in logs
    fn backend_name(&self) -> &'static str;

    /// Find all documents matching `filter`
    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> RepositoryResult<Vec<Document>>;

    /// Find the first document matching `filter`
    async fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> RepositoryResult<Option<Document>> {
        let options = FindOptions::new().limit(1);
        Ok(self
            .find(collection, filter, &options)
            .await?
            .into_iter()
            .next())
    }

    /// Open a cursor over the documents matching `filter`
    ///
    /// The stream yields documents as the cursor advances instead of
    /// loading the whole result set up front.
    async fn stream(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> RepositoryResult<DocumentStream>;

    /// Count documents matching `filter`
    async fn count(&self, collection: &str, filter: &Filter) -> RepositoryResult<u64>;

    /// Insert a new document
    async fn insert_one(&self, collection: &str, document: Document) -> RepositoryResult<()>;

    /// Replace the first document matching `filter`
    async fn replace_one(
        &self,
        collection: &str,
        filter: &Filter,
        document: Document,
    ) -> RepositoryResult<WriteOutcome>;

    /// Apply `update` to the first document matching `filter`
    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        update: &UpdateDocument,
    ) -> RepositoryResult<WriteOutcome>;

    /// Remove the first document matching `filter`
    async fn delete_one(&self, collection: &str, filter: &Filter) -> RepositoryResult<WriteOutcome>;

    /// Atomically apply `update` to the first match, optionally inserting
    ///
    /// Returns the document selected by `options.return_document`, or `None`
    /// when nothing matched (and, with [`ReturnDocument::Before`], when the
    /// call inserted).
    async fn find_one_and_update(
        &self,
        collection: &str,
        filter: &Filter,
        update: &UpdateDocument,
        options: FindOneAndUpdateOptions,
    ) -> RepositoryResult<Option<Document>>;

    /// Start a session whose writes become visible together on commit
    async fn begin(&self) -> RepositoryResult<Arc<dyn StoreSession>>;
}

/// A store session with a single open transaction
///
/// A session dropped without [`commit`](StoreSession::commit) discards its
/// writes. Once committed or aborted every further call fails.
#[async_trait]
pub trait StoreSession: DocumentStore {
    /// Make every write of the session visible
    async fn commit(&self) -> RepositoryResult<()>;

    /// Discard every write of the session
    async fn abort(&self) -> RepositoryResult<()>;

    /// View the session as a plain store for repositories
    fn as_store(self: Arc<Self>) -> Arc<dyn DocumentStore>;
}
