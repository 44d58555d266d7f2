//! Per-module configuration exposed through the container.
//!
//! The application supplies a [`ConfigProvider`] (usually backed by the
//! layered YAML/env config of the bootstrap crate). [`ConfigModule::for_root`]
//! makes it injectable everywhere as [`ConfigService`];
//! [`ConfigModule::for_feature`] exposes one typed section as
//! [`ModuleConfig<T>`].

use std::ops::Deref;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::module::{DynamicModule, ModuleDescriptor};
use crate::provider::{Dependency, Provider};
use crate::token::Token;

/// Source of raw module configuration sections.
pub trait ConfigProvider: Send + Sync {
    /// The whole entry of `module_name`, typically `{ config: {...} }`.
    fn get_module_config(&self, module_name: &str) -> Option<&serde_json::Value>;
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("module '{module}' not found")]
    ModuleNotFound { module: String },
    #[error("module '{module}' config must be an object")]
    InvalidModuleStructure { module: String },
    #[error("missing 'config' section in module '{module}'")]
    MissingConfigSection { module: String },
    #[error("invalid config for module '{module}': {source}")]
    InvalidConfig {
        module: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Deserialize the `config` section of `module_name`.
pub fn module_config_typed<T: DeserializeOwned>(
    provider: &dyn ConfigProvider,
    module_name: &str,
) -> Result<T, ConfigError> {
    let entry = provider
        .get_module_config(module_name)
        .ok_or_else(|| ConfigError::ModuleNotFound {
            module: module_name.to_string(),
        })?;
    let obj = entry
        .as_object()
        .ok_or_else(|| ConfigError::InvalidModuleStructure {
            module: module_name.to_string(),
        })?;
    let section = obj
        .get("config")
        .ok_or_else(|| ConfigError::MissingConfigSection {
            module: module_name.to_string(),
        })?;
    serde_json::from_value(section.clone()).map_err(|source| ConfigError::InvalidConfig {
        module: module_name.to_string(),
        source,
    })
}

/// Injectable handle to the application's configuration provider.
#[derive(Clone)]
pub struct ConfigService {
    provider: Arc<dyn ConfigProvider>,
}

impl std::fmt::Debug for ConfigService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigService").finish_non_exhaustive()
    }
}

impl ConfigService {
    pub fn new(provider: Arc<dyn ConfigProvider>) -> Self {
        Self { provider }
    }

    pub fn raw(&self, module_name: &str) -> Option<&serde_json::Value> {
        self.provider.get_module_config(module_name)
    }

    pub fn section<T: DeserializeOwned>(&self, module_name: &str) -> Result<T, ConfigError> {
        module_config_typed(self.provider.as_ref(), module_name)
    }

    /// Like [`section`](Self::section), falling back to `T::default()` when the
    /// module has no entry at all.
    pub fn section_or_default<T: DeserializeOwned + Default>(
        &self,
        module_name: &str,
    ) -> Result<T, ConfigError> {
        match self.section(module_name) {
            Err(ConfigError::ModuleNotFound { .. }) => Ok(T::default()),
            other => other,
        }
    }
}

/// A typed configuration section, provided by [`ConfigModule::for_feature`].
#[derive(Debug, Clone)]
pub struct ModuleConfig<T>(pub T);

impl<T> Deref for ModuleConfig<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

pub struct ConfigModule;

impl ConfigModule {
    /// A global module exporting [`ConfigService`].
    pub fn for_root(provider: Arc<dyn ConfigProvider>) -> DynamicModule {
        DynamicModule::register("ConfigModule", provider, |provider| {
            ModuleDescriptor::new()
                .provider(Provider::value(
                    Token::of::<ConfigService>(),
                    ConfigService::new(provider),
                ))
                .export(Token::of::<ConfigService>())
                .global()
        })
    }

    /// A module exporting `ModuleConfig<T>` read from the section of
    /// `module_name`. Requires [`for_root`](Self::for_root) somewhere in the
    /// graph. A missing module entry yields `T::default()`.
    pub fn for_feature<T>(module_name: &'static str) -> DynamicModule
    where
        T: DeserializeOwned + Default + Send + Sync + 'static,
    {
        DynamicModule::register(
            format!("ConfigModule({module_name})"),
            module_name,
            |module_name| {
                ModuleDescriptor::new()
                    .provider(Provider::factory(
                        Token::of::<ModuleConfig<T>>(),
                        [Dependency::of::<ConfigService>()],
                        move |mut args| async move {
                            let config = args.next::<ConfigService>()?;
                            let section = config.section_or_default::<T>(module_name)?;
                            Ok::<_, anyhow::Error>(ModuleConfig(section))
                        },
                    ))
                    .export(Token::of::<ModuleConfig<T>>())
            },
        )
    }
}
