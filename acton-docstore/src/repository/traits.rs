//! Repository trait definitions
//!
//! The traits use RPITIT (Return Position Impl Trait In Traits), available
//! since Rust 1.75, so implementations are plain `async fn`s.
//!
//! # Overview
//!
//! - [`Repository`]: create, read, update and delete by identifier, plus
//!   criteria-based listing, streaming and paging
//! - [`SoftDeleteRepository`]: adds flag-based deletion on top of [`Repository`]
//!
//! `C` is the entity-specific criteria type. How criteria narrow a query is
//! decided by the repository's configuration, not by the caller.

use futures::stream::BoxStream;
use std::future::Future;

use super::entity::{Entity, SoftDeletable};
use super::error::RepositoryError;
use super::pagination::Page;

/// Result type for repository operations
pub type RepositoryResult<T> = std::result::Result<T, RepositoryError>;

/// Lazy, finite sequence of entities read through a store cursor
pub type EntityStream<E> = BoxStream<'static, RepositoryResult<E>>;

/// Base repository trait for CRUD operations
///
/// # Example
///
/// ```rust,ignore
/// use acton_docstore::repository::Repository;
///
/// let mut invoice = Invoice { id: 0, amount: 120 };
/// let id = repo.create(&mut invoice).await?;
/// assert_eq!(invoice.id, id);
///
/// let open = repo.get_list(&InvoiceCriteria::open()).await?;
/// ```
pub trait Repository<E: Entity, C>: Send + Sync {
    /// Assign a fresh identifier to `entity` and insert it
    ///
    /// Returns the assigned identifier, which the entity now carries too.
    fn create(&self, entity: &mut E) -> impl Future<Output = RepositoryResult<E::Id>> + Send;

    /// Physically remove the entity with this identifier
    ///
    /// Removing an identifier that does not exist is not an error.
    fn delete(&self, id: &E::Id) -> impl Future<Output = RepositoryResult<()>> + Send;

    /// Replace the stored document of `entity` with its current state
    ///
    /// Nothing happens when no visible document has that identifier.
    fn update(&self, entity: &E) -> impl Future<Output = RepositoryResult<()>> + Send;

    /// Find an entity by its identifier
    fn get_by_id(&self, id: &E::Id) -> impl Future<Output = RepositoryResult<Option<E>>> + Send;

    /// All entities matching `criteria`
    fn get_list(&self, criteria: &C) -> impl Future<Output = RepositoryResult<Vec<E>>> + Send;

    /// Entities matching `criteria`, yielded as the cursor advances
    fn get_stream(
        &self,
        criteria: &C,
    ) -> impl Future<Output = RepositoryResult<EntityStream<E>>> + Send;

    /// The `skip`-th page (zero-based) of `take` entities, with the total count
    fn get_paged_list(
        &self,
        skip: u64,
        take: u64,
        criteria: &C,
    ) -> impl Future<Output = RepositoryResult<Page<E>>> + Send;

    /// Count entities matching `criteria`
    fn count(&self, criteria: &C) -> impl Future<Output = RepositoryResult<u64>> + Send;

    /// Whether a visible entity has this identifier
    fn exists(&self, id: &E::Id) -> impl Future<Output = RepositoryResult<bool>> + Send;
}

/// Extended repository trait for soft delete support
///
/// Every read and [`Repository::update`] of a soft-delete repository skips
/// flagged documents. There is no way back from a soft delete.
pub trait SoftDeleteRepository<E: SoftDeletable, C>: Repository<E, C> {
    /// Flag the entity as deleted, leaving the document in place
    fn soft_delete(&self, id: &E::Id) -> impl Future<Output = RepositoryResult<()>> + Send;

    /// Physically remove the entity whether or not it is flagged
    fn hard_delete(&self, id: &E::Id) -> impl Future<Output = RepositoryResult<()>> + Send;
}
