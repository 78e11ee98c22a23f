//! Generic document repository
//!
//! [`DocumentRepository`] implements [`Repository`] (and, for soft-deletable
//! entities, [`SoftDeleteRepository`]) for any serde entity over any
//! [`DocumentStore`]. Per-entity behaviour comes from a [`RepositoryConfig`]:
//! the collection name, how criteria narrow a listing, and the default order.
//!
//! Listing filters are composed as
//! `visibility(all) AND list_filter(criteria, visibility(all))`, so a
//! criteria translation can never widen a query past the visibility rule.

use futures::stream::StreamExt;
use serde::de::DeserializeOwned;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use super::entity::{Entity, SoftDeletable};
use super::error::{RepositoryError, RepositoryOperation};
use super::pagination::{Page, Pagination};
use super::traits::{EntityStream, Repository, RepositoryResult, SoftDeleteRepository};
use crate::context::Transaction;
use crate::sequence::SequenceGenerator;
use crate::store::{
    assign, lookup, Document, DocumentStore, Filter, FindOptions, OrderDirection, UpdateDocument,
};

/// Translation of caller criteria into a filter narrowing the base filter
pub type ListFilter<C> = Arc<dyn Fn(&C, Filter) -> Filter + Send + Sync>;

/// Per-entity repository settings
///
/// # Example
///
/// ```rust
/// use acton_docstore::repository::RepositoryConfig;
/// use acton_docstore::store::{Filter, OrderDirection};
///
/// struct InvoiceCriteria {
///     customer: Option<String>,
/// }
///
/// let config = RepositoryConfig::<InvoiceCriteria>::new("invoices")
///     .list_filter(|criteria, _base| match &criteria.customer {
///         Some(customer) => Filter::eq("customer", customer.clone()),
///         None => Filter::all(),
///     })
///     .order_by("issued_at", OrderDirection::Descending);
/// assert_eq!(config.collection(), "invoices");
/// ```
pub struct RepositoryConfig<C> {
    collection: String,
    list_filter: ListFilter<C>,
    order_by: Vec<(String, OrderDirection)>,
}

impl<C> RepositoryConfig<C> {
    /// Settings for `collection` that match every document and keep store order
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            list_filter: Arc::new(|_, _| Filter::all()),
            order_by: Vec::new(),
        }
    }

    /// Set the criteria translation
    ///
    /// The function receives the criteria and the base (visibility) filter
    /// and returns a filter that the repository conjoins with the base.
    #[must_use]
    pub fn list_filter<F>(mut self, list_filter: F) -> Self
    where
        F: Fn(&C, Filter) -> Filter + Send + Sync + 'static,
    {
        self.list_filter = Arc::new(list_filter);
        self
    }

    /// Append a default sort key for listings and pages
    #[must_use]
    pub fn order_by(mut self, field: impl Into<String>, direction: OrderDirection) -> Self {
        self.order_by.push((field.into(), direction));
        self
    }

    /// Physical collection name
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Default sort keys
    pub fn ordering(&self) -> &[(String, OrderDirection)] {
        &self.order_by
    }
}

impl<C> Clone for RepositoryConfig<C> {
    fn clone(&self) -> Self {
        Self {
            collection: self.collection.clone(),
            list_filter: Arc::clone(&self.list_filter),
            order_by: self.order_by.clone(),
        }
    }
}

impl<C> fmt::Debug for RepositoryConfig<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepositoryConfig")
            .field("collection", &self.collection)
            .field("order_by", &self.order_by)
            .finish_non_exhaustive()
    }
}

/// Which stored documents a repository can see
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// Every document
    All,
    /// Documents whose flag field is `false`
    HideDeleted {
        /// The flag field
        field: &'static str,
    },
}

impl Visibility {
    /// Restrict `filter` to visible documents
    pub fn apply(self, filter: Filter) -> Filter {
        match self {
            Self::All => filter,
            Self::HideDeleted { field } => Filter::eq(field, false).and(filter),
        }
    }
}

/// Repository over a document store for entities of type `E` queried by `C`
pub struct DocumentRepository<E, C> {
    store: Arc<dyn DocumentStore>,
    sequences: SequenceGenerator,
    config: Arc<RepositoryConfig<C>>,
    visibility: Visibility,
    deleted_flag: Option<fn(&E) -> bool>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity, C> DocumentRepository<E, C> {
    /// A repository that sees every document of the collection
    pub fn new(store: Arc<dyn DocumentStore>, config: RepositoryConfig<C>) -> Self {
        let sequences = SequenceGenerator::new(Arc::clone(&store));
        Self {
            store,
            sequences,
            config: Arc::new(config),
            visibility: Visibility::All,
            deleted_flag: None,
            _entity: PhantomData,
        }
    }

    /// Use another sequence generator for identifiers
    #[must_use]
    pub fn with_sequences(mut self, sequences: SequenceGenerator) -> Self {
        self.sequences = sequences;
        self
    }

    /// A copy of this repository whose reads and writes go through `transaction`
    ///
    /// Identifiers are still minted outside the transaction.
    #[must_use]
    pub fn with_transaction(&self, transaction: &Transaction) -> Self {
        Self {
            store: transaction.store(),
            sequences: self.sequences.clone(),
            config: Arc::clone(&self.config),
            visibility: self.visibility,
            deleted_flag: self.deleted_flag,
            _entity: PhantomData,
        }
    }

    /// Physical collection name
    pub fn collection(&self) -> &str {
        &self.config.collection
    }

    /// Visibility rule applied to reads and updates
    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    /// The store this repository talks to
    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    fn id_filter(&self, id: &E::Id) -> RepositoryResult<Filter> {
        let value = serde_json::to_value(id).map_err(|e| {
            RepositoryError::serialization_error(
                RepositoryOperation::Find,
                format!("Identifier {} is not serializable: {}", id, e),
            )
        })?;
        Ok(Filter::eq(E::ID_FIELD, value))
    }

    fn visible_id_filter(&self, id: &E::Id) -> RepositoryResult<Filter> {
        Ok(self.visibility.apply(self.id_filter(id)?))
    }

    fn criteria_filter(&self, criteria: &C) -> Filter {
        let base = self.visibility.apply(Filter::all());
        let narrowed = (self.config.list_filter)(criteria, base.clone());
        base.and(narrowed)
    }

    fn find_options(&self) -> FindOptions {
        FindOptions {
            sort: self.config.order_by.clone(),
            ..FindOptions::default()
        }
    }

    fn encode(&self, entity: &E, operation: RepositoryOperation) -> RepositoryResult<Document> {
        let mut document = serde_json::to_value(entity).map_err(|e| {
            RepositoryError::serialization_error(operation, e.to_string())
                .with_entity(self.collection(), entity.id().to_string())
        })?;
        if !document.is_object() {
            return Err(RepositoryError::serialization_error(
                operation,
                "Entities must serialize to JSON objects",
            )
            .with_entity(self.collection(), entity.id().to_string()));
        }
        // Entities that do not serialize their flag still get one stored
        if let (Visibility::HideDeleted { field }, Some(flag)) =
            (self.visibility, self.deleted_flag)
        {
            if lookup(&document, field).is_none() {
                assign(&mut document, field, serde_json::Value::Bool(flag(entity)));
            }
        }
        Ok(document)
    }
}

impl<E: SoftDeletable, C> DocumentRepository<E, C> {
    /// A repository hiding documents flagged by [`SoftDeletable::DELETED_FIELD`]
    pub fn soft_deletable(store: Arc<dyn DocumentStore>, config: RepositoryConfig<C>) -> Self {
        let mut repository = Self::new(store, config);
        repository.visibility = Visibility::HideDeleted {
            field: E::DELETED_FIELD,
        };
        repository.deleted_flag = Some(E::is_deleted as fn(&E) -> bool);
        repository
    }
}

impl<E, C> Clone for DocumentRepository<E, C> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            sequences: self.sequences.clone(),
            config: Arc::clone(&self.config),
            visibility: self.visibility,
            deleted_flag: self.deleted_flag,
            _entity: PhantomData,
        }
    }
}

impl<E, C> fmt::Debug for DocumentRepository<E, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentRepository")
            .field("backend", &self.store.backend_name())
            .field("collection", &self.config.collection)
            .field("visibility", &self.visibility)
            .finish()
    }
}

fn decode<E: DeserializeOwned>(document: Document, collection: &str) -> RepositoryResult<E> {
    serde_json::from_value(document).map_err(|e| {
        RepositoryError::serialization_error(
            RepositoryOperation::Find,
            format!("Document in '{}' does not match the entity: {}", collection, e),
        )
    })
}

impl<E, C> Repository<E, C> for DocumentRepository<E, C>
where
    E: Entity,
    C: Send + Sync + 'static,
{
    async fn create(&self, entity: &mut E) -> RepositoryResult<E::Id> {
        let id = self.sequences.next::<E::Id>(self.collection()).await?;
        entity.set_id(id.clone());

        let document = self.encode(entity, RepositoryOperation::Insert)?;
        self.store
            .insert_one(self.collection(), document)
            .await
            .map_err(|e| e.with_entity(self.collection(), id.to_string()))?;

        tracing::debug!("Created {} in '{}'", id, self.collection());
        Ok(id)
    }

    async fn delete(&self, id: &E::Id) -> RepositoryResult<()> {
        let filter = self.id_filter(id)?;
        let outcome = self
            .store
            .delete_one(self.collection(), &filter)
            .await
            .map_err(|e| e.with_entity(self.collection(), id.to_string()))?;
        tracing::debug!(
            "Deleted {} from '{}' (removed: {})",
            id,
            self.collection(),
            outcome.modified
        );
        Ok(())
    }

    async fn update(&self, entity: &E) -> RepositoryResult<()> {
        let filter = self.visible_id_filter(entity.id())?;
        let document = self.encode(entity, RepositoryOperation::Replace)?;
        let outcome = self
            .store
            .replace_one(self.collection(), &filter, document)
            .await
            .map_err(|e| e.with_entity(self.collection(), entity.id().to_string()))?;
        tracing::debug!(
            "Updated {} in '{}' (matched: {})",
            entity.id(),
            self.collection(),
            outcome.matched
        );
        Ok(())
    }

    async fn get_by_id(&self, id: &E::Id) -> RepositoryResult<Option<E>> {
        let filter = self.visible_id_filter(id)?;
        self.store
            .find_one(self.collection(), &filter)
            .await?
            .map(|document| decode(document, self.collection()))
            .transpose()
    }

    async fn get_list(&self, criteria: &C) -> RepositoryResult<Vec<E>> {
        let filter = self.criteria_filter(criteria);
        self.store
            .find(self.collection(), &filter, &self.find_options())
            .await?
            .into_iter()
            .map(|document| decode(document, self.collection()))
            .collect()
    }

    async fn get_stream(&self, criteria: &C) -> RepositoryResult<EntityStream<E>> {
        let filter = self.criteria_filter(criteria);
        let documents = self
            .store
            .stream(self.collection(), &filter, &self.find_options())
            .await?;

        let collection = self.config.collection.clone();
        Ok(documents
            .map(move |document| document.and_then(|d| decode(d, &collection)))
            .boxed())
    }

    async fn get_paged_list(
        &self,
        skip: u64,
        take: u64,
        criteria: &C,
    ) -> RepositoryResult<Page<E>> {
        if take == 0 {
            return Err(RepositoryError::validation_failed(
                RepositoryOperation::Find,
                "Page size must be greater than zero",
            ));
        }
        let pagination = Pagination::new(skip, take);
        let offset = pagination.offset().ok_or_else(|| {
            RepositoryError::validation_failed(
                RepositoryOperation::Find,
                format!("Page {} of size {} is out of range", skip, take),
            )
        })?;

        let filter = self.criteria_filter(criteria);
        let options = self.find_options().skip(offset).limit(take);
        let documents = self.store.find(self.collection(), &filter, &options).await?;
        let total = self.store.count(self.collection(), &filter).await?;

        let items = documents
            .into_iter()
            .map(|document| decode(document, self.collection()))
            .collect::<RepositoryResult<Vec<E>>>()?;
        Ok(Page::new(items, total, pagination))
    }

    async fn count(&self, criteria: &C) -> RepositoryResult<u64> {
        let filter = self.criteria_filter(criteria);
        self.store.count(self.collection(), &filter).await
    }

    async fn exists(&self, id: &E::Id) -> RepositoryResult<bool> {
        let filter = self.visible_id_filter(id)?;
        Ok(self.store.count(self.collection(), &filter).await? > 0)
    }
}

impl<E, C> SoftDeleteRepository<E, C> for DocumentRepository<E, C>
where
    E: SoftDeletable,
    C: Send + Sync + 'static,
{
    async fn soft_delete(&self, id: &E::Id) -> RepositoryResult<()> {
        let filter = self.id_filter(id)?;
        let update = UpdateDocument::new().set(E::DELETED_FIELD, true);
        let outcome = self
            .store
            .update_one(self.collection(), &filter, &update)
            .await
            .map_err(|e| e.with_entity(self.collection(), id.to_string()))?;
        tracing::debug!(
            "Soft-deleted {} in '{}' (matched: {})",
            id,
            self.collection(),
            outcome.matched
        );
        Ok(())
    }

    async fn hard_delete(&self, id: &E::Id) -> RepositoryResult<()> {
        Repository::delete(self, id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::RepositoryErrorKind;
    use crate::store::{FilterCondition, MemoryStore};
    use futures::TryStreamExt;
    use serde::{Deserialize, Serialize};
    use serde_json::json;
    use uuid::Uuid;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Note {
        id: i64,
        title: String,
        priority: u32,
        is_deleted: bool,
    }

    impl Note {
        fn new(title: &str, priority: u32) -> Self {
            Self {
                id: 0,
                title: title.to_string(),
                priority,
                is_deleted: false,
            }
        }
    }

    impl Entity for Note {
        type Id = i64;

        fn id(&self) -> &i64 {
            &self.id
        }

        fn set_id(&mut self, id: i64) {
            self.id = id;
        }
    }

    impl SoftDeletable for Note {
        fn is_deleted(&self) -> bool {
            self.is_deleted
        }
    }

    #[derive(Debug, Default)]
    struct NoteCriteria {
        min_priority: Option<u32>,
        title_prefix: Option<String>,
    }

    fn note_config() -> RepositoryConfig<NoteCriteria> {
        RepositoryConfig::new("notes")
            .list_filter(|criteria: &NoteCriteria, _base| {
                let mut filter = Filter::all();
                if let Some(min) = criteria.min_priority {
                    filter &= Filter::gte("priority", min);
                }
                if let Some(prefix) = &criteria.title_prefix {
                    filter &= Filter::from(FilterCondition::like("title", format!("{}%", prefix)));
                }
                filter
            })
            .order_by("id", OrderDirection::Ascending)
    }

    fn notes(store: &MemoryStore) -> DocumentRepository<Note, NoteCriteria> {
        DocumentRepository::soft_deletable(Arc::new(store.clone()), note_config())
    }

    async fn seed(repo: &DocumentRepository<Note, NoteCriteria>, count: u32) -> Vec<i64> {
        let mut ids = Vec::new();
        for n in 1..=count {
            let mut note = Note::new(&format!("note {}", n), n % 5);
            ids.push(repo.create(&mut note).await.unwrap());
        }
        ids
    }

    #[tokio::test]
    async fn test_create_assigns_and_persists_identifier() {
        let store = MemoryStore::new();
        let repo = notes(&store);

        let mut first = Note::new("first", 1);
        let id = repo.create(&mut first).await.unwrap();
        assert_eq!(id, 1);
        assert_eq!(first.id, 1);

        let mut second = Note::new("second", 2);
        assert_eq!(repo.create(&mut second).await.unwrap(), 2);

        let stored = store.snapshot("notes").await;
        assert_eq!(stored[0]["id"], json!(1));
        assert_eq!(stored[1]["id"], json!(2));
        assert_eq!(repo.get_by_id(&2).await.unwrap(), Some(second));
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Session {
        id: Uuid,
        user: String,
    }

    impl Entity for Session {
        type Id = Uuid;

        fn id(&self) -> &Uuid {
            &self.id
        }

        fn set_id(&mut self, id: Uuid) {
            self.id = id;
        }
    }

    #[tokio::test]
    async fn test_create_with_uuid_identifier() {
        let store = MemoryStore::new();
        let repo: DocumentRepository<Session, ()> =
            DocumentRepository::new(Arc::new(store.clone()), RepositoryConfig::new("sessions"));

        let mut session = Session {
            id: Uuid::nil(),
            user: "ada".to_string(),
        };
        let id = repo.create(&mut session).await.unwrap();
        assert_ne!(id, Uuid::nil());
        assert_eq!(repo.get_by_id(&id).await.unwrap(), Some(session));
        assert!(store.snapshot("Sequence").await.is_empty());
    }

    #[tokio::test]
    async fn test_get_by_id_absent_is_none() {
        let repo = notes(&MemoryStore::new());
        assert_eq!(repo.get_by_id(&42).await.unwrap(), None);
        assert!(!repo.exists(&42).await.unwrap());
    }

    #[tokio::test]
    async fn test_update_replaces_document() {
        let repo = notes(&MemoryStore::new());
        let mut note = Note::new("draft", 1);
        repo.create(&mut note).await.unwrap();

        note.title = "final".to_string();
        repo.update(&note).await.unwrap();
        assert_eq!(repo.get_by_id(&note.id).await.unwrap().unwrap().title, "final");
    }

    #[tokio::test]
    async fn test_update_missing_is_silent() {
        let store = MemoryStore::new();
        let repo = notes(&store);
        let mut ghost = Note::new("ghost", 1);
        ghost.id = 99;

        repo.update(&ghost).await.unwrap();
        assert!(store.snapshot("notes").await.is_empty());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = MemoryStore::new();
        let repo = notes(&store);
        let ids = seed(&repo, 2).await;

        repo.delete(&ids[0]).await.unwrap();
        repo.delete(&ids[0]).await.unwrap();
        assert_eq!(store.snapshot("notes").await.len(), 1);
        assert!(repo.get_by_id(&ids[0]).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_soft_delete_hides_from_every_read() {
        let store = MemoryStore::new();
        let repo = notes(&store);
        let ids = seed(&repo, 3).await;

        repo.soft_delete(&ids[1]).await.unwrap();

        assert!(repo.get_by_id(&ids[1]).await.unwrap().is_none());
        assert!(!repo.exists(&ids[1]).await.unwrap());
        assert_eq!(repo.count(&NoteCriteria::default()).await.unwrap(), 2);

        let listed = repo.get_list(&NoteCriteria::default()).await.unwrap();
        assert!(listed.iter().all(|n| !n.is_deleted));
        assert_eq!(listed.iter().map(|n| n.id).collect::<Vec<_>>(), [ids[0], ids[2]]);

        let streamed = repo
            .get_stream(&NoteCriteria::default())
            .await
            .unwrap()
            .try_collect::<Vec<_>>()
            .await
            .unwrap();
        assert_eq!(streamed, listed);

        let page = repo
            .get_paged_list(0, 10, &NoteCriteria::default())
            .await
            .unwrap();
        assert_eq!(page.total, 2);

        let stored = store.snapshot("notes").await;
        assert_eq!(stored.len(), 3);
        assert_eq!(stored[1]["is_deleted"], json!(true));
    }

    #[tokio::test]
    async fn test_update_of_soft_deleted_is_silent() {
        let store = MemoryStore::new();
        let repo = notes(&store);
        let mut note = Note::new("keep", 1);
        repo.create(&mut note).await.unwrap();
        repo.soft_delete(&note.id).await.unwrap();

        note.title = "changed".to_string();
        repo.update(&note).await.unwrap();

        let stored = store.snapshot("notes").await;
        assert_eq!(stored[0]["title"], json!("keep"));
        assert_eq!(stored[0]["is_deleted"], json!(true));
    }

    #[tokio::test]
    async fn test_hard_delete_removes_regardless_of_flag() {
        let store = MemoryStore::new();
        let repo = notes(&store);
        let ids = seed(&repo, 2).await;

        repo.soft_delete(&ids[0]).await.unwrap();
        repo.hard_delete(&ids[0]).await.unwrap();
        repo.hard_delete(&ids[1]).await.unwrap();
        repo.hard_delete(&ids[1]).await.unwrap();

        assert!(store.snapshot("notes").await.is_empty());
    }

    #[tokio::test]
    async fn test_plain_repository_sees_flagged_documents() {
        let store = MemoryStore::new();
        let soft = notes(&store);
        let ids = seed(&soft, 2).await;
        soft.soft_delete(&ids[0]).await.unwrap();

        let plain: DocumentRepository<Note, NoteCriteria> =
            DocumentRepository::new(Arc::new(store.clone()), note_config());
        assert_eq!(plain.visibility(), Visibility::All);
        assert!(plain.get_by_id(&ids[0]).await.unwrap().unwrap().is_deleted);
        assert_eq!(plain.count(&NoteCriteria::default()).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_paged_list_returns_requested_window() {
        let repo = notes(&MemoryStore::new());
        seed(&repo, 25).await;

        let page = repo
            .get_paged_list(1, 10, &NoteCriteria::default())
            .await
            .unwrap();
        assert_eq!(page.total, 25);
        assert_eq!(page.page, 1);
        assert_eq!(page.page_size, 10);
        assert_eq!(
            page.items.iter().map(|n| n.id).collect::<Vec<_>>(),
            (11..=20).collect::<Vec<i64>>()
        );
        assert!(page.has_next());

        let last = repo
            .get_paged_list(2, 10, &NoteCriteria::default())
            .await
            .unwrap();
        assert_eq!(last.items.len(), 5);
        assert!(!last.has_next());
    }

    #[tokio::test]
    async fn test_paged_list_rejects_zero_take() {
        let repo = notes(&MemoryStore::new());
        let error = repo
            .get_paged_list(0, 0, &NoteCriteria::default())
            .await
            .unwrap_err();
        assert_eq!(error.kind, RepositoryErrorKind::ValidationFailed);

        let error = repo
            .get_paged_list(u64::MAX, 2, &NoteCriteria::default())
            .await
            .unwrap_err();
        assert_eq!(error.kind, RepositoryErrorKind::ValidationFailed);
    }

    #[tokio::test]
    async fn test_criteria_narrow_listing() {
        let repo = notes(&MemoryStore::new());
        seed(&repo, 10).await;

        let criteria = NoteCriteria {
            min_priority: Some(4),
            ..NoteCriteria::default()
        };
        let listed = repo.get_list(&criteria).await.unwrap();
        assert_eq!(listed.iter().map(|n| n.id).collect::<Vec<_>>(), [4, 9]);

        let criteria = NoteCriteria {
            title_prefix: Some("note 1".to_string()),
            ..NoteCriteria::default()
        };
        assert_eq!(repo.count(&criteria).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_criteria_cannot_widen_past_visibility() {
        let store = MemoryStore::new();
        let config = note_config().list_filter(|_: &NoteCriteria, _base| {
            Filter::eq("is_deleted", true) | Filter::eq("is_deleted", false)
        });
        let repo: DocumentRepository<Note, NoteCriteria> =
            DocumentRepository::soft_deletable(Arc::new(store.clone()), config);
        let ids = seed(&repo, 2).await;
        repo.soft_delete(&ids[0]).await.unwrap();

        assert_eq!(repo.count(&NoteCriteria::default()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_default_order_applies_to_lists() {
        let repo = notes(&MemoryStore::new());
        seed(&repo, 4).await;
        let descending = DocumentRepository::<Note, NoteCriteria>::soft_deletable(
            Arc::clone(repo.store()),
            RepositoryConfig::new("notes").order_by("id", OrderDirection::Descending),
        );
        let listed = descending.get_list(&NoteCriteria::default()).await.unwrap();
        assert_eq!(listed.iter().map(|n| n.id).collect::<Vec<_>>(), [4, 3, 2, 1]);
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Tag {
        id: u32,
        label: String,
        #[serde(skip)]
        archived: bool,
    }

    impl Tag {
        fn new(label: &str, archived: bool) -> Self {
            Self {
                id: 0,
                label: label.to_string(),
                archived,
            }
        }
    }

    impl Entity for Tag {
        type Id = u32;

        fn id(&self) -> &u32 {
            &self.id
        }

        fn set_id(&mut self, id: u32) {
            self.id = id;
        }
    }

    impl SoftDeletable for Tag {
        const DELETED_FIELD: &'static str = "archived";

        fn is_deleted(&self) -> bool {
            self.archived
        }
    }

    #[tokio::test]
    async fn test_missing_flag_is_written_from_entity() {
        let store = MemoryStore::new();
        let repo: DocumentRepository<Tag, ()> = DocumentRepository::soft_deletable(
            Arc::new(store.clone()),
            RepositoryConfig::new("tags"),
        );
        let id = repo.create(&mut Tag::new("urgent", false)).await.unwrap();
        let archived = repo.create(&mut Tag::new("stale", true)).await.unwrap();

        let stored = store.snapshot("tags").await;
        assert_eq!(stored[0]["archived"], json!(false));
        assert_eq!(stored[1]["archived"], json!(true));
        assert_eq!(repo.get_list(&()).await.unwrap().len(), 1);
        assert!(repo.get_by_id(&archived).await.unwrap().is_none());

        repo.soft_delete(&id).await.unwrap();
        assert!(repo.get_by_id(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_undecodable_document_is_serialization_error() {
        let store = MemoryStore::new();
        store
            .insert_one("notes", json!({"id": 1, "title": 5, "is_deleted": false}))
            .await
            .unwrap();
        let error = notes(&store).get_by_id(&1).await.unwrap_err();
        assert_eq!(error.kind, RepositoryErrorKind::SerializationError);
    }

    #[test]
    fn test_visibility_apply() {
        assert_eq!(Visibility::All.apply(Filter::all()), Filter::all());
        let hidden = Visibility::HideDeleted { field: "is_deleted" }.apply(Filter::eq("id", 1));
        assert_eq!(
            hidden,
            Filter::And(vec![Filter::eq("is_deleted", false), Filter::eq("id", 1)])
        );
    }
}
