//! Entity traits
//!
//! An entity is a serde-serializable record with an identifier field. The
//! identifier is assigned by the repository on create; its field name in the
//! stored document is [`Entity::ID_FIELD`].

use serde::{de::DeserializeOwned, Serialize};

use crate::identifier::Identifier;

/// A record persisted by a repository
///
/// # Example
///
/// ```rust
/// use acton_docstore::repository::Entity;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct Invoice {
///     id: i64,
///     amount: u32,
/// }
///
/// impl Entity for Invoice {
///     type Id = i64;
///
///     fn id(&self) -> &i64 {
///         &self.id
///     }
///
///     fn set_id(&mut self, id: i64) {
///         self.id = id;
///     }
/// }
/// ```
pub trait Entity: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Identifier type, which also selects how identifiers are minted
    type Id: Identifier;

    /// Document field holding the identifier
    const ID_FIELD: &'static str = "id";

    /// The entity's identifier
    fn id(&self) -> &Self::Id;

    /// Replace the entity's identifier
    fn set_id(&mut self, id: Self::Id);
}

/// An entity carrying a deletion flag
///
/// Soft-deleted documents stay in the collection with the flag set and are
/// hidden from every read of a soft-delete repository.
pub trait SoftDeletable: Entity {
    /// Document field holding the flag
    const DELETED_FIELD: &'static str = "is_deleted";

    /// Whether the entity is flagged as deleted
    fn is_deleted(&self) -> bool;
}
