use std::sync::Arc;

use tracing::{debug, info, instrument};
use wirekit::{Args, Dependency, Injectable, Lifecycle, ModuleConfig};

use super::error::CatsError;
use super::model::{Cat, NewCat};
use super::repository::{Repository, CATS_REPOSITORY};
use crate::config::CatsConfig;

/// Business rules for cats on top of the configured repository.
pub struct CatsService {
    repo: Arc<Repository>,
    config: Arc<ModuleConfig<CatsConfig>>,
}

impl Injectable for CatsService {
    fn dependencies() -> Vec<Dependency> {
        vec![
            Dependency::token(CATS_REPOSITORY),
            Dependency::of::<ModuleConfig<CatsConfig>>(),
        ]
    }

    fn construct(args: &mut Args) -> anyhow::Result<Self> {
        Ok(Self {
            repo: args.next()?,
            config: args.next()?,
        })
    }
}

impl CatsService {
    pub fn new(repo: Repository, config: CatsConfig) -> Self {
        Self {
            repo: Arc::new(repo),
            config: Arc::new(ModuleConfig(config)),
        }
    }

    /// At most `limit` cats, capped by the configured page size.
    #[instrument(name = "cats.service.list", skip(self))]
    pub async fn list(&self, limit: Option<usize>) -> anyhow::Result<Vec<Cat>> {
        let limit = limit
            .unwrap_or(self.config.page_size)
            .min(self.config.page_size);
        self.repo.list(limit).await
    }

    pub async fn get(&self, id: u32) -> anyhow::Result<Cat> {
        self.repo
            .get(id)
            .await?
            .ok_or_else(|| CatsError::NotFound { id }.into())
    }

    #[instrument(name = "cats.service.create", skip(self), fields(name = %cat.name))]
    pub async fn create(&self, cat: NewCat) -> anyhow::Result<Cat> {
        if cat.name.trim().is_empty() {
            return Err(CatsError::validation("name must not be empty").into());
        }
        if cat.age > self.config.max_age {
            return Err(CatsError::validation(format!(
                "age {} exceeds the maximum of {}",
                cat.age, self.config.max_age
            ))
            .into());
        }
        let created = self.repo.insert(cat).await?;
        debug!(id = created.id, "Cat created");
        Ok(created)
    }

    pub async fn remove(&self, id: u32) -> anyhow::Result<()> {
        if self.repo.remove(id).await? {
            Ok(())
        } else {
            Err(CatsError::NotFound { id }.into())
        }
    }
}

#[wirekit::async_trait]
impl Lifecycle for CatsService {
    async fn on_module_init(&self) -> anyhow::Result<()> {
        info!(
            backend = self.repo.backend(),
            page_size = self.config.page_size,
            "CatsService initialized"
        );
        Ok(())
    }
}
