//! # acton-docstore
//!
//! Generic repositories over document databases.
//!
//! ## Features
//!
//! - **Generic CRUD**: one repository implementation for any serde entity
//! - **Soft delete**: flagged documents hidden from every read
//! - **Identifiers**: per-collection sequences for integer ids, random UUIDs otherwise
//! - **Listing**: criteria filters, lazy streams and counted pages
//! - **Transactions**: run a unit of work in a store session, rolled back on failure
//! - **Backends**: in-process memory store, SurrealDB behind the `surrealdb` feature
//!
//! ## Example
//!
//! ```rust,no_run
//! use acton_docstore::prelude::*;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Order {
//!     id: i64,
//!     total: u32,
//! }
//!
//! impl Entity for Order {
//!     type Id = i64;
//!     fn id(&self) -> &i64 { &self.id }
//!     fn set_id(&mut self, id: i64) { self.id = id; }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     // Load configuration
//!     let config = Config::load()?;
//!
//!     // Initialize tracing
//!     init_tracing(&config)?;
//!
//!     // Connect the configured store
//!     let context = StoreContext::connect(&config).await?;
//!
//!     let orders = context.repository::<Order, ()>(RepositoryConfig::new("orders"));
//!     let id = orders.create(&mut Order { id: 0, total: 120 }).await?;
//!     tracing::info!("Created order {}", id);
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod identifier;
pub mod observability;
pub mod repository;
pub mod sequence;
pub mod store;

pub use error::{Error, Result};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{Config, SequenceConfig, ServiceConfig, StoreBackend, StoreConfig};
    pub use crate::context::{StoreContext, Transaction};
    pub use crate::error::{Error, Result};
    pub use crate::identifier::{Identifier, IdentifierKind, SequenceValue};
    pub use crate::observability::init_tracing;
    pub use crate::repository::{
        DocumentRepository, Entity, EntityStream, Page, Pagination, Repository, RepositoryConfig,
        RepositoryError, RepositoryErrorKind, RepositoryOperation, RepositoryResult,
        SoftDeletable, SoftDeleteRepository,
    };
    pub use crate::sequence::SequenceGenerator;
    pub use crate::store::{
        DocumentStore, Filter, FilterCondition, FilterOperator, MemoryStore, OrderDirection,
        StoreSession,
    };

    #[cfg(feature = "surrealdb")]
    pub use crate::store::SurrealStore;
}
