use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use gymdesk::core::{GymError, RecordId, RecordSnapshot, StoreError, StoreResult};
use gymdesk::domain::FITNESS_CATEGORIES;
use gymdesk::record::StoredRow;
use gymdesk::service::{FitnessCategoryForm, FitnessCategoryService};
use gymdesk::store::{Catalog, CommitOutcome, InsertOutcome, WriteBatch};
use gymdesk::{ActorContext, MemoryStore, RetryPolicy, RetryingStore, Role, Store, gym_catalog};

/// Fails the first `failures` commits with a transient error, then delegates.
struct FlakyStore {
    inner: MemoryStore,
    failures: u32,
    commits: AtomicU32,
    error: fn() -> StoreError,
}

impl FlakyStore {
    fn new(failures: u32) -> Self {
        Self {
            inner: MemoryStore::new(gym_catalog().unwrap()),
            failures,
            commits: AtomicU32::new(0),
            error: || StoreError::Transient("connection reset".to_string()),
        }
    }

    fn calls(&self) -> u32 {
        self.commits.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Store for FlakyStore {
    fn catalog(&self) -> &Catalog {
        self.inner.catalog()
    }

    async fn load(&self, table: &str, id: RecordId) -> StoreResult<Option<StoredRow>> {
        self.inner.load(table, id).await
    }

    async fn scan(&self, table: &str) -> StoreResult<Vec<StoredRow>> {
        self.inner.scan(table).await
    }

    async fn commit(&self, actor: &ActorContext, batch: WriteBatch) -> StoreResult<CommitOutcome> {
        let call = self.commits.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.failures {
            return Err((self.error)());
        }
        self.inner.commit(actor, batch).await
    }
}

fn fast_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        initial_backoff_ms: 1,
        max_backoff_ms: 2,
    }
}

fn category(name: &str) -> RecordSnapshot {
    RecordSnapshot::new().with("category", name)
}

#[tokio::test]
async fn transient_failures_are_retried_until_success() {
    let store = RetryingStore::new(FlakyStore::new(2), fast_policy(3));

    let outcome = store
        .insert(&ActorContext::system(), FITNESS_CATEGORIES.table, category("Cardio"))
        .await
        .unwrap();
    assert!(matches!(outcome, InsertOutcome::Inserted(_)));
    assert_eq!(store.inner().calls(), 3);
    assert_eq!(store.scan(FITNESS_CATEGORIES.table).await.unwrap().len(), 1);
}

#[tokio::test]
async fn exhausted_retries_report_the_attempt_count() {
    let store = RetryingStore::new(FlakyStore::new(10), fast_policy(3));

    let err = store
        .insert(&ActorContext::system(), FITNESS_CATEGORIES.table, category("Cardio"))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::RetriesExhausted { attempts: 3, .. }));
    assert_eq!(store.inner().calls(), 3);
    assert!(store.scan(FITNESS_CATEGORIES.table).await.unwrap().is_empty());
}

#[tokio::test]
async fn other_errors_are_not_retried() {
    let mut flaky = FlakyStore::new(1);
    flaky.error = || StoreError::Schema("bad batch".to_string());
    let store = RetryingStore::new(flaky, fast_policy(5));

    let err = store
        .insert(&ActorContext::system(), FITNESS_CATEGORIES.table, category("Cardio"))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Schema(_)));
    assert_eq!(store.inner().calls(), 1);
}

#[tokio::test]
async fn services_surface_exhausted_retries_as_transient_failures() {
    let store: Arc<dyn Store> = Arc::new(RetryingStore::new(FlakyStore::new(10), fast_policy(2)));
    let service = FitnessCategoryService::new(store);
    let admin = ActorContext::user("admin").with_role(Role::Admin);

    let err = service
        .create(&admin, FitnessCategoryForm::new("Cardio"))
        .await
        .unwrap_err();
    assert!(matches!(err, GymError::TransientStoreFailure { attempts: 2 }));
    assert!(err.is_recoverable());
    assert!(err.to_string().starts_with("Unable to save changes after 2 attempt(s)."));
}
