//! Cat storage behind a trait, plus the in-memory backend.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use wirekit::Lifecycle;

use super::error::CatsError;
use super::model::{Cat, NewCat};

/// Token of the [`Repository`] provider exported by `StorageModule`.
pub const CATS_REPOSITORY: &str = "CATS_REPOSITORY";

#[async_trait]
pub trait CatsRepository: Send + Sync {
    async fn list(&self, limit: usize) -> anyhow::Result<Vec<Cat>>;
    async fn get(&self, id: u32) -> anyhow::Result<Option<Cat>>;
    async fn insert(&self, cat: NewCat) -> anyhow::Result<Cat>;
    async fn remove(&self, id: u32) -> anyhow::Result<bool>;
    async fn count(&self) -> anyhow::Result<usize>;

    /// Releases backend resources; called once on shutdown.
    async fn close(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Ordered by id; names are unique.
#[derive(Default)]
pub struct InMemoryCatsRepository {
    cats: RwLock<BTreeMap<u32, Cat>>,
    next_id: AtomicU32,
}

impl InMemoryCatsRepository {
    pub fn new() -> Self {
        Self {
            cats: RwLock::new(BTreeMap::new()),
            next_id: AtomicU32::new(1),
        }
    }
}

#[async_trait]
impl CatsRepository for InMemoryCatsRepository {
    async fn list(&self, limit: usize) -> anyhow::Result<Vec<Cat>> {
        Ok(self.cats.read().values().take(limit).cloned().collect())
    }

    async fn get(&self, id: u32) -> anyhow::Result<Option<Cat>> {
        Ok(self.cats.read().get(&id).cloned())
    }

    async fn insert(&self, cat: NewCat) -> anyhow::Result<Cat> {
        let mut cats = self.cats.write();
        if cats.values().any(|c| c.name.eq_ignore_ascii_case(&cat.name)) {
            return Err(CatsError::Conflict { name: cat.name }.into());
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cat = Cat {
            id,
            name: cat.name,
            age: cat.age,
            breed: cat.breed,
        };
        cats.insert(id, cat.clone());
        Ok(cat)
    }

    async fn remove(&self, id: u32) -> anyhow::Result<bool> {
        Ok(self.cats.write().remove(&id).is_some())
    }

    async fn count(&self) -> anyhow::Result<usize> {
        Ok(self.cats.read().len())
    }
}

/// The injectable handle to the configured backend.
#[derive(Clone)]
pub struct Repository {
    backend: &'static str,
    inner: Arc<dyn CatsRepository>,
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("backend", &self.backend)
            .finish_non_exhaustive()
    }
}

impl Repository {
    pub fn new(backend: &'static str, inner: Arc<dyn CatsRepository>) -> Self {
        Self { backend, inner }
    }

    pub fn backend(&self) -> &'static str {
        self.backend
    }
}

impl std::ops::Deref for Repository {
    type Target = dyn CatsRepository;

    fn deref(&self) -> &Self::Target {
        self.inner.as_ref()
    }
}

#[async_trait]
impl Lifecycle for Repository {
    async fn on_module_init(&self) -> anyhow::Result<()> {
        let count = self.inner.count().await?;
        tracing::debug!(backend = self.backend, count, "Cats repository ready");
        Ok(())
    }

    async fn on_application_shutdown(&self, signal: Option<&str>) -> anyhow::Result<()> {
        tracing::info!(backend = self.backend, signal = signal.unwrap_or("none"), "Closing cats repository");
        self.inner.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ids_are_assigned_in_order() {
        let repo = InMemoryCatsRepository::new();
        let tom = repo.insert(NewCat::new("Tom", 3)).await.unwrap();
        let kitty = repo.insert(NewCat::new("Kitty", 1)).await.unwrap();
        assert_eq!((tom.id, kitty.id), (1, 2));
        assert_eq!(repo.list(10).await.unwrap(), vec![tom, kitty]);
        assert_eq!(repo.list(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_names_conflict() {
        let repo = InMemoryCatsRepository::new();
        repo.insert(NewCat::new("Tom", 3)).await.unwrap();
        let err = repo.insert(NewCat::new("tom", 5)).await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<CatsError>(),
            Some(&CatsError::Conflict { name: "tom".into() })
        );
    }

    #[tokio::test]
    async fn remove_reports_presence() {
        let repo = InMemoryCatsRepository::new();
        let tom = repo.insert(NewCat::new("Tom", 3)).await.unwrap();
        assert!(repo.remove(tom.id).await.unwrap());
        assert!(!repo.remove(tom.id).await.unwrap());
        assert!(repo.get(tom.id).await.unwrap().is_none());
    }
}
