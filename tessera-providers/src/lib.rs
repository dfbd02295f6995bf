// SPDX-License-Identifier: AGPL-3.0-or-later
//! Storage providers for Tessera
//!
//! SFTP and WebDAV data adapters behind the uniform item contract, plus a
//! registry building backend factories from a [`Configuration`].

pub mod sftp;
pub mod webdav;

pub use sftp::{SftpDataAdapter, SftpFactory, SftpIdMapper};
pub use webdav::{WebdavDataAdapter, WebdavFactory, WebdavIdMapper};

#[cfg(feature = "local")]
pub use sftp::LocalConnector;

#[cfg(feature = "ssh2")]
pub use sftp::{SshAuth, SshConnector};

#[cfg(feature = "webdav")]
pub use webdav::{HttpWebdavConnector, WebdavAuth};

use std::collections::HashMap;
use std::sync::Arc;
use tessera_core::{Configuration, ConnectionPool, DataStorerFactory, PersistenceError, PersistenceResult};

/// Builds a backend factory from a configuration.
pub type FactoryConstructor =
    Box<dyn Fn(&Configuration) -> PersistenceResult<Arc<dyn DataStorerFactory>> + Send + Sync>;

/// Registry of backend constructors, keyed by URL scheme
pub struct FactoryRegistry {
    constructors: HashMap<String, FactoryConstructor>,
}

impl FactoryRegistry {
    pub fn new() -> Self {
        Self { constructors: HashMap::new() }
    }

    /// Registry with every backend compiled into this build.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();

        #[cfg(feature = "local")]
        registry.register("file", Box::new(local_factory));

        #[cfg(feature = "webdav")]
        for scheme in ["webdav", "webdavs", "http", "https"] {
            registry.register(scheme, Box::new(webdav_factory));
        }

        #[cfg(feature = "ssh2")]
        registry.register("sftp", Box::new(ssh_factory));

        registry
    }

    pub fn register(&mut self, scheme: impl Into<String>, constructor: FactoryConstructor) {
        self.constructors.insert(scheme.into().to_ascii_lowercase(), constructor);
    }

    pub fn remove(&mut self, scheme: &str) -> Option<FactoryConstructor> {
        self.constructors.remove(&scheme.to_ascii_lowercase())
    }

    pub fn contains(&self, scheme: &str) -> bool {
        self.constructors.contains_key(&scheme.to_ascii_lowercase())
    }

    /// Registered schemes, sorted.
    pub fn schemes(&self) -> Vec<&str> {
        let mut schemes: Vec<&str> = self.constructors.keys().map(|s| s.as_str()).collect();
        schemes.sort_unstable();
        schemes
    }

    /// Validate `config` and build the factory registered for its scheme.
    pub fn create(&self, config: &Configuration) -> PersistenceResult<Arc<dyn DataStorerFactory>> {
        config.validate()?;
        let scheme = config.scheme.to_ascii_lowercase();
        let constructor = self
            .constructors
            .get(&scheme)
            .ok_or_else(|| PersistenceError::BackendNotFound(scheme.clone()))?;
        tracing::debug!(%scheme, max_connections = config.max_connections, "creating backend factory");
        constructor(config)
    }
}

impl Default for FactoryRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(any(feature = "local", feature = "webdav", feature = "ssh2"))]
fn pool_for<C: tessera_core::ConnectionFactory>(connector: C, config: &Configuration) -> ConnectionPool<C> {
    ConnectionPool::new(connector, config.max_connections).with_timeout(config.acquire_timeout())
}

/// Local directory tree rooted at `base_path`.
#[cfg(feature = "local")]
fn local_factory(config: &Configuration) -> PersistenceResult<Arc<dyn DataStorerFactory>> {
    let connector = LocalConnector::new(&config.base_path);
    Ok(Arc::new(SftpFactory::new(pool_for(connector, config), SftpIdMapper::default())))
}

#[cfg(feature = "webdav")]
fn webdav_factory(config: &Configuration) -> PersistenceResult<Arc<dyn DataStorerFactory>> {
    let connector = HttpWebdavConnector::from_config(config)?;
    let mapper = WebdavIdMapper::new(&config.base_path);
    let cache = Arc::new(tessera_cache::ResourceTypeCache::new());
    Ok(Arc::new(WebdavFactory::new(pool_for(connector, config), mapper, cache)))
}

#[cfg(feature = "ssh2")]
fn ssh_factory(config: &Configuration) -> PersistenceResult<Arc<dyn DataStorerFactory>> {
    let connector = SshConnector::from_config(config)?;
    let mapper = SftpIdMapper::new(&config.base_path);
    Ok(Arc::new(SftpFactory::new(pool_for(connector, config), mapper)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_scheme() {
        let registry = FactoryRegistry::new();
        let err = registry.create(&Configuration::new("gopher")).err().unwrap();
        assert!(matches!(err, PersistenceError::BackendNotFound(scheme) if scheme == "gopher"));
    }

    #[test]
    fn test_register_is_case_insensitive() {
        let mut registry = FactoryRegistry::new();
        registry.register(
            "MEM",
            Box::new(|_: &Configuration| -> PersistenceResult<Arc<dyn DataStorerFactory>> {
                Err(PersistenceError::Unsupported("mem".into()))
            }),
        );
        assert!(registry.contains("mem"));
        assert_eq!(registry.schemes(), vec!["mem"]);
        assert!(matches!(registry.create(&Configuration::new("Mem")), Err(PersistenceError::Unsupported(_))));
        assert!(registry.remove("mem").is_some());
        assert!(registry.schemes().is_empty());
    }

    #[cfg(all(feature = "local", feature = "webdav"))]
    #[test]
    fn test_default_schemes() {
        let registry = FactoryRegistry::with_defaults();
        for scheme in ["file", "webdav", "webdavs", "http", "https"] {
            assert!(registry.contains(scheme), "{} missing", scheme);
        }
    }

    #[cfg(feature = "webdav")]
    #[test]
    fn test_webdav_requires_host() {
        let registry = FactoryRegistry::with_defaults();
        assert!(registry.create(&Configuration::new("webdav")).is_err());
    }

    #[test]
    fn test_invalid_configuration_is_rejected_before_lookup() {
        let registry = FactoryRegistry::new();
        let config = Configuration::new("file").with_max_connections(0);
        assert!(matches!(registry.create(&config), Err(PersistenceError::Configuration(_))));
    }
}
