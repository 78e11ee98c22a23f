//! Store context and transactions
//!
//! A [`StoreContext`] owns the shared store handle and the sequence
//! generator, hands out repositories bound to both, and runs units of work
//! inside a store session with [`StoreContext::run_in_transaction`].

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::config::{Config, SequenceConfig, StoreBackend, StoreConfig};
use crate::repository::{
    DocumentRepository, Entity, RepositoryConfig, RepositoryError, RepositoryResult, SoftDeletable,
};
use crate::sequence::SequenceGenerator;
use crate::store::{DocumentStore, MemoryStore, StoreSession};

/// Shared entry point to one document store
///
/// # Example
///
/// ```rust
/// use acton_docstore::context::StoreContext;
/// use acton_docstore::repository::RepositoryError;
///
/// # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
/// let context = StoreContext::in_memory();
/// let answer = context
///     .run_in_transaction(
///         |_tx| async { Ok::<_, RepositoryError>(42) },
///         |e| eprintln!("rolled back: {e}"),
///     )
///     .await
///     .unwrap();
/// assert_eq!(answer, 42);
/// # });
/// ```
#[derive(Clone)]
pub struct StoreContext {
    store: Arc<dyn DocumentStore>,
    sequences: SequenceGenerator,
}

impl StoreContext {
    /// Wrap a store, keeping sequences in the default collection
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        let sequences = SequenceGenerator::new(Arc::clone(&store));
        Self { store, sequences }
    }

    /// Wrap a store with explicit sequence settings
    pub fn with_sequence_config(store: Arc<dyn DocumentStore>, config: &SequenceConfig) -> Self {
        let sequences = SequenceGenerator::from_config(Arc::clone(&store), config);
        Self { store, sequences }
    }

    /// A context over a fresh in-process store
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Connect the store named by `config.store.url`
    pub async fn connect(config: &Config) -> crate::Result<Self> {
        let store: Arc<dyn DocumentStore> = match config.store.backend()? {
            StoreBackend::Memory => Arc::new(MemoryStore::new()),
            StoreBackend::SurrealDb => connect_surreal(&config.store).await?,
        };
        tracing::info!(
            "Store context ready: backend={}, sequences={}",
            store.backend_name(),
            config.sequence.collection
        );
        Ok(Self::with_sequence_config(store, &config.sequence))
    }

    /// The root store
    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// The sequence generator shared by every repository of this context
    pub fn sequences(&self) -> &SequenceGenerator {
        &self.sequences
    }

    /// A repository seeing every document of its collection
    pub fn repository<E: Entity, C>(
        &self,
        config: RepositoryConfig<C>,
    ) -> DocumentRepository<E, C> {
        DocumentRepository::new(Arc::clone(&self.store), config)
            .with_sequences(self.sequences.clone())
    }

    /// A repository hiding soft-deleted documents
    pub fn soft_delete_repository<E: SoftDeletable, C>(
        &self,
        config: RepositoryConfig<C>,
    ) -> DocumentRepository<E, C> {
        DocumentRepository::soft_deletable(Arc::clone(&self.store), config)
            .with_sequences(self.sequences.clone())
    }

    /// Start a transaction
    pub async fn begin(&self) -> RepositoryResult<Transaction> {
        let session = self.store.begin().await?;
        tracing::debug!("Transaction started on {}", session.backend_name());
        Ok(Transaction { session })
    }

    /// Run `action` inside a transaction
    ///
    /// The transaction commits when `action` succeeds. When `action` fails
    /// the transaction is aborted, `on_error` sees the error once, and the
    /// same error is returned. A failed commit is reported the same way,
    /// without an abort.
    pub async fn run_in_transaction<T, E, F, Fut, H>(&self, action: F, on_error: H) -> Result<T, E>
    where
        F: FnOnce(Transaction) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<RepositoryError>,
        H: FnOnce(&E),
    {
        let transaction = self.begin().await?;

        match action(transaction.clone()).await {
            Ok(value) => match transaction.commit().await {
                Ok(()) => Ok(value),
                Err(e) => {
                    let error = E::from(e);
                    on_error(&error);
                    Err(error)
                }
            },
            Err(error) => {
                if let Err(e) = transaction.abort().await {
                    tracing::warn!("Failed to abort transaction: {}", e);
                }
                on_error(&error);
                Err(error)
            }
        }
    }
}

impl fmt::Debug for StoreContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreContext")
            .field("backend", &self.store.backend_name())
            .field("sequences", &self.sequences)
            .finish()
    }
}

#[cfg(feature = "surrealdb")]
async fn connect_surreal(config: &StoreConfig) -> crate::Result<Arc<dyn DocumentStore>> {
    let store = crate::store::SurrealStore::connect(config).await?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "surrealdb"))]
async fn connect_surreal(config: &StoreConfig) -> crate::Result<Arc<dyn DocumentStore>> {
    Err(RepositoryError::connection_failed(format!(
        "Store URL scheme of '{}' requires the `surrealdb` feature",
        config.url.split("://").next().unwrap_or_default()
    ))
    .into())
}

/// An open store session
///
/// Clones share the session. Repositories join it through
/// [`DocumentRepository::with_transaction`].
#[derive(Clone)]
pub struct Transaction {
    session: Arc<dyn StoreSession>,
}

impl Transaction {
    /// The session viewed as a store
    pub fn store(&self) -> Arc<dyn DocumentStore> {
        Arc::clone(&self.session).as_store()
    }

    /// Make every write of the transaction visible
    pub async fn commit(&self) -> RepositoryResult<()> {
        self.session.commit().await?;
        tracing::info!("Transaction committed on {}", self.session.backend_name());
        Ok(())
    }

    /// Discard every write of the transaction
    pub async fn abort(&self) -> RepositoryResult<()> {
        self.session.abort().await?;
        tracing::debug!("Transaction aborted on {}", self.session.backend_name());
        Ok(())
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("backend", &self.session.backend_name())
            .finish()
    }
}
