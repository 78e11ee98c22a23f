//! Generic repositories over document stores
//!
//! # Features
//!
//! - **Generic CRUD**: [`Repository`] for create, read, update and delete by identifier
//! - **Soft Delete**: [`SoftDeleteRepository`] hiding flagged documents from every read
//! - **Listing**: criteria-driven lists, lazy streams and counted pages ([`Page`])
//! - **Identifiers**: minted on create from per-collection sequences or random UUIDs
//!
//! # Example
//!
//! ```rust
//! use acton_docstore::repository::{
//!     DocumentRepository, Entity, Repository, RepositoryConfig, SoftDeletable,
//!     SoftDeleteRepository,
//! };
//! use acton_docstore::store::{Filter, MemoryStore};
//! use serde::{Deserialize, Serialize};
//! use std::sync::Arc;
//!
//! #[derive(Serialize, Deserialize)]
//! struct User {
//!     id: i64,
//!     name: String,
//!     is_deleted: bool,
//! }
//!
//! impl Entity for User {
//!     type Id = i64;
//!     fn id(&self) -> &i64 { &self.id }
//!     fn set_id(&mut self, id: i64) { self.id = id; }
//! }
//!
//! impl SoftDeletable for User {
//!     fn is_deleted(&self) -> bool { self.is_deleted }
//! }
//!
//! struct UserCriteria {
//!     name: Option<String>,
//! }
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let config = RepositoryConfig::<UserCriteria>::new("users").list_filter(|c, _base| {
//!     c.name.clone().map_or_else(Filter::all, |name| Filter::eq("name", name))
//! });
//! let users = DocumentRepository::soft_deletable(Arc::new(MemoryStore::new()), config);
//!
//! let mut ada = User { id: 0, name: "Ada".into(), is_deleted: false };
//! let id = users.create(&mut ada).await.unwrap();
//! assert_eq!(id, 1);
//!
//! users.soft_delete(&id).await.unwrap();
//! assert!(users.get_by_id(&id).await.unwrap().is_none());
//! assert_eq!(users.count(&UserCriteria { name: None }).await.unwrap(), 0);
//! # });
//! ```

mod engine;
mod entity;
mod error;
mod pagination;
mod traits;

// Re-export all public types
pub use engine::{DocumentRepository, ListFilter, RepositoryConfig, Visibility};
pub use entity::{Entity, SoftDeletable};
pub use error::{RepositoryError, RepositoryErrorKind, RepositoryOperation};
pub use pagination::{Page, Pagination};
pub use traits::{EntityStream, Repository, RepositoryResult, SoftDeleteRepository};
