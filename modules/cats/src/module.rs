use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;
use wirekit::{
    ConfigModule, Dependency, DynamicModule, Lifecycle, ModuleDescriptor, Provider, StaticModule, Token,
};

use crate::api::cats_controller;
use crate::config::CatsConfig;
use crate::domain::model::NewCat;
use crate::domain::repository::{
    CatsRepository, InMemoryCatsRepository, Repository, CATS_REPOSITORY,
};
use crate::domain::service::CatsService;

/// Options of [`StorageModule::for_root`].
#[derive(Debug, Clone, Default)]
pub struct StorageOptions {
    /// Cats inserted when the repository is created.
    pub seed: Vec<NewCat>,
}

impl StorageOptions {
    pub fn seeded(seed: impl IntoIterator<Item = NewCat>) -> Self {
        Self {
            seed: seed.into_iter().collect(),
        }
    }
}

/// Dynamic module exporting the cats [`Repository`] under
/// [`CATS_REPOSITORY`].
pub struct StorageModule;

impl StorageModule {
    pub fn for_root(options: StorageOptions) -> DynamicModule {
        DynamicModule::register_async("StorageModule", options, |options| async move {
            let mut names = HashSet::new();
            if let Some(dup) = options
                .seed
                .iter()
                .find(|cat| !names.insert(cat.name.to_ascii_lowercase()))
            {
                anyhow::bail!("duplicate seed cat '{}'", dup.name);
            }

            let repository = Provider::factory(CATS_REPOSITORY, Vec::<Dependency>::new(), move |_| {
                let seed = options.seed.clone();
                async move {
                    let store = InMemoryCatsRepository::new();
                    for cat in seed {
                        store.insert(cat).await?;
                    }
                    Ok::<_, anyhow::Error>(Repository::new("memory", Arc::new(store)))
                }
            })
            .with_lifecycle::<Repository>();

            Ok(ModuleDescriptor::new()
                .provider(repository)
                .export(CATS_REPOSITORY))
        })
    }
}

struct CatsModuleHooks;

#[async_trait]
impl Lifecycle for CatsModuleHooks {
    async fn on_application_bootstrap(&self) -> anyhow::Result<()> {
        info!("Cats module ready");
        Ok(())
    }
}

/// Cats feature module: service, controller and storage, reading its
/// settings from `modules.cats`. Needs `ConfigModule::for_root` in the
/// graph.
pub struct CatsModule;

impl StaticModule for CatsModule {
    fn define() -> ModuleDescriptor {
        CatsModule::descriptor(StorageOptions::default())
    }
}

impl CatsModule {
    /// A separate cats module backed by storage built from `storage`.
    pub fn register(storage: StorageOptions) -> DynamicModule {
        DynamicModule::register("CatsModule", storage, CatsModule::descriptor)
    }

    fn descriptor(storage: StorageOptions) -> ModuleDescriptor {
        ModuleDescriptor::new()
            .import(StorageModule::for_root(storage))
            .import(ConfigModule::for_feature::<CatsConfig>("cats"))
            .provider(Provider::class::<CatsService>().with_lifecycle::<CatsService>())
            .controller(cats_controller())
            .export(Token::of::<CatsService>())
            .lifecycle(Arc::new(CatsModuleHooks))
    }
}
