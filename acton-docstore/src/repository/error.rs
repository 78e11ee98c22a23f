//! Repository error types
//!
//! A single structured error type is shared by document stores, the sequence
//! generator and repositories, so a failure raised by a store reaches the
//! caller unchanged through `?`.
//!
//! # Example
//!
//! ```rust
//! use acton_docstore::repository::{RepositoryError, RepositoryErrorKind};
//!
//! let error = RepositoryError::unsupported_identifier_kind("f64");
//! assert!(matches!(error.kind, RepositoryErrorKind::UnsupportedIdentifierKind));
//! assert!(!error.is_retriable());
//! ```

use std::fmt;

/// Store operation being performed when the error occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepositoryOperation {
    /// Finding or streaming documents
    Find,
    /// Counting documents matching a filter
    Count,
    /// Inserting a new document
    Insert,
    /// Replacing a whole document
    Replace,
    /// Updating fields of a document in place
    Update,
    /// Removing a document
    Delete,
    /// Atomic find-one-and-update, optionally inserting
    Upsert,
    /// Minting the next identifier of a sequence
    NextSequence,
    /// Starting a store session
    Begin,
    /// Committing a store session
    Commit,
    /// Aborting a store session
    Abort,
    /// Connecting to the store
    Connect,
}

impl RepositoryOperation {
    /// Whether the operation mutates stored documents
    pub const fn is_write(self) -> bool {
        matches!(
            self,
            Self::Insert | Self::Replace | Self::Update | Self::Delete | Self::Upsert
        )
    }
}

impl fmt::Display for RepositoryOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Find => write!(f, "find"),
            Self::Count => write!(f, "count"),
            Self::Insert => write!(f, "insert"),
            Self::Replace => write!(f, "replace"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
            Self::Upsert => write!(f, "upsert"),
            Self::NextSequence => write!(f, "next_sequence"),
            Self::Begin => write!(f, "begin"),
            Self::Commit => write!(f, "commit"),
            Self::Abort => write!(f, "abort"),
            Self::Connect => write!(f, "connect"),
        }
    }
}

/// Category of repository error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepositoryErrorKind {
    /// Identifier type is not one of the supported kinds
    UnsupportedIdentifierKind,
    /// The store failed to read documents
    StoreRead,
    /// The store failed to write documents
    StoreWrite,
    /// Session could not be started, committed or aborted
    Transaction,
    /// A document could not be converted to or from an entity
    SerializationError,
    /// Failed to connect to the store
    ConnectionFailed,
    /// Operation timed out
    Timeout,
    /// A concurrent writer won a compare-and-swap race
    Conflict,
    /// A sequence would overflow its identifier type
    SequenceExhausted,
    /// Arguments were rejected before touching the store
    ValidationFailed,
    /// Other unclassified error
    Other,
}

impl fmt::Display for RepositoryErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedIdentifierKind => write!(f, "unsupported_identifier_kind"),
            Self::StoreRead => write!(f, "store_read"),
            Self::StoreWrite => write!(f, "store_write"),
            Self::Transaction => write!(f, "transaction"),
            Self::SerializationError => write!(f, "serialization_error"),
            Self::ConnectionFailed => write!(f, "connection_failed"),
            Self::Timeout => write!(f, "timeout"),
            Self::Conflict => write!(f, "conflict"),
            Self::SequenceExhausted => write!(f, "sequence_exhausted"),
            Self::ValidationFailed => write!(f, "validation_failed"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Structured repository error with operation context
///
/// # Example
///
/// ```rust
/// use acton_docstore::repository::{RepositoryError, RepositoryOperation};
///
/// let error = RepositoryError::store_write(RepositoryOperation::Insert, "disk full")
///     .with_entity("orders", "42");
/// assert_eq!(
///     error.to_string(),
///     "Repository store_write error during insert: disk full [orders: 42]"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryError {
    /// The operation being performed when the error occurred
    pub operation: RepositoryOperation,
    /// The category of error
    pub kind: RepositoryErrorKind,
    /// Human-readable error message
    pub message: String,
    /// The collection or entity type involved
    pub entity_type: Option<String>,
    /// The identifier of the entity involved
    pub entity_id: Option<String>,
}

impl RepositoryError {
    /// Create a new repository error
    pub fn new(
        operation: RepositoryOperation,
        kind: RepositoryErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            operation,
            kind,
            message: message.into(),
            entity_type: None,
            entity_id: None,
        }
    }

    /// Create an "unsupported identifier kind" error naming the offending kind
    pub fn unsupported_identifier_kind(kind: impl Into<String>) -> Self {
        let kind = kind.into();
        Self::new(
            RepositoryOperation::NextSequence,
            RepositoryErrorKind::UnsupportedIdentifierKind,
            format!("{} not supported", kind),
        )
    }

    /// Create a read failure raised by a store
    pub fn store_read(operation: RepositoryOperation, message: impl Into<String>) -> Self {
        Self::new(operation, RepositoryErrorKind::StoreRead, message)
    }

    /// Create a write failure raised by a store
    pub fn store_write(operation: RepositoryOperation, message: impl Into<String>) -> Self {
        Self::new(operation, RepositoryErrorKind::StoreWrite, message)
    }

    /// Create a read or write failure depending on the operation
    pub fn store(operation: RepositoryOperation, message: impl Into<String>) -> Self {
        if operation.is_write() {
            Self::store_write(operation, message)
        } else {
            Self::store_read(operation, message)
        }
    }

    /// Create a session error
    pub fn transaction(operation: RepositoryOperation, message: impl Into<String>) -> Self {
        Self::new(operation, RepositoryErrorKind::Transaction, message)
    }

    /// Create a serialization error
    pub fn serialization_error(operation: RepositoryOperation, message: impl Into<String>) -> Self {
        Self::new(operation, RepositoryErrorKind::SerializationError, message)
    }

    /// Create a connection failed error
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::new(
            RepositoryOperation::Connect,
            RepositoryErrorKind::ConnectionFailed,
            message,
        )
    }

    /// Create a timeout error
    pub fn timeout(operation: RepositoryOperation, message: impl Into<String>) -> Self {
        Self::new(operation, RepositoryErrorKind::Timeout, message)
    }

    /// Create a conflict error
    pub fn conflict(operation: RepositoryOperation, message: impl Into<String>) -> Self {
        Self::new(operation, RepositoryErrorKind::Conflict, message)
    }

    /// Create a "sequence exhausted" error
    pub fn sequence_exhausted(message: impl Into<String>) -> Self {
        Self::new(
            RepositoryOperation::NextSequence,
            RepositoryErrorKind::SequenceExhausted,
            message,
        )
    }

    /// Create a validation failed error
    pub fn validation_failed(operation: RepositoryOperation, message: impl Into<String>) -> Self {
        Self::new(operation, RepositoryErrorKind::ValidationFailed, message)
    }

    /// Add entity context to an existing error
    #[must_use]
    pub fn with_entity(
        mut self,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
    ) -> Self {
        self.entity_type = Some(entity_type.into());
        self.entity_id = Some(entity_id.into());
        self
    }

    /// Set the operation that caused the error
    #[must_use]
    pub fn with_operation(mut self, operation: RepositoryOperation) -> Self {
        self.operation = operation;
        self
    }

    /// Check if this error is retriable (transient errors that may succeed on retry)
    ///
    /// Nothing in this crate retries on its own; the flag is for callers.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self.kind,
            RepositoryErrorKind::ConnectionFailed
                | RepositoryErrorKind::Timeout
                | RepositoryErrorKind::Conflict
        )
    }
}

impl fmt::Display for RepositoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Repository {} error during {}: {}",
            self.kind, self.operation, self.message
        )?;
        if let (Some(ref entity_type), Some(ref entity_id)) = (&self.entity_type, &self.entity_id) {
            write!(f, " [{}: {}]", entity_type, entity_id)?;
        }
        Ok(())
    }
}

impl std::error::Error for RepositoryError {}
