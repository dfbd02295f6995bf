// SPDX-License-Identifier: AGPL-3.0-or-later
//! WebDAV data adapter and factory

use async_trait::async_trait;
use bytes::BytesMut;
use std::sync::Arc;
use tessera_cache::ResourceTypeCache;
use tessera_core::{
    storer::ensure_named,
    stream::{memory_stream, DataStream, InputStream, BLOCK_SIZE},
    tree, ConnectionFactory, ConnectionPool, DataStorer, DataStorerFactory, Identifier, IdentifierMapper,
    NativeError, PersistenceError, PersistenceResult, ResourceType,
};
use tokio::io::AsyncReadExt;

use super::{WebdavIdMapper, WebdavSession, LINK_TARGET_NAMESPACE, LINK_TARGET_PROPERTY};

struct Shared<C: ConnectionFactory> {
    pool: ConnectionPool<C>,
    mapper: WebdavIdMapper,
    cache: Arc<ResourceTypeCache>,
}

/// Creates [`WebdavDataAdapter`]s sharing one connection pool and one
/// resource type cache.
pub struct WebdavFactory<C: ConnectionFactory> {
    shared: Arc<Shared<C>>,
}

impl<C: ConnectionFactory> Clone for WebdavFactory<C> {
    fn clone(&self) -> Self {
        Self { shared: self.shared.clone() }
    }
}

impl<C> WebdavFactory<C>
where
    C: ConnectionFactory,
    C::Connection: WebdavSession,
{
    pub fn new(pool: ConnectionPool<C>, mapper: WebdavIdMapper, cache: Arc<ResourceTypeCache>) -> Self {
        Self { shared: Arc::new(Shared { pool, mapper, cache }) }
    }

    pub fn pool(&self) -> &ConnectionPool<C> {
        &self.shared.pool
    }

    pub fn mapper(&self) -> &WebdavIdMapper {
        &self.shared.mapper
    }

    pub fn cache(&self) -> &Arc<ResourceTypeCache> {
        &self.shared.cache
    }

    pub fn adapter(&self, identifier: Identifier) -> WebdavDataAdapter<C> {
        let persistence_id = self.mapper().map_identifier(&identifier);
        WebdavDataAdapter { identifier, persistence_id, factory: self.clone() }
    }
}

impl<C> DataStorerFactory for WebdavFactory<C>
where
    C: ConnectionFactory,
    C::Connection: WebdavSession,
{
    fn create_data_storer(&self, identifier: Identifier) -> Box<dyn DataStorer> {
        Box::new(self.adapter(identifier))
    }
}

/// One WebDAV resource seen through the item contract.
pub struct WebdavDataAdapter<C: ConnectionFactory> {
    identifier: Identifier,
    persistence_id: String,
    factory: WebdavFactory<C>,
}

impl<C> WebdavDataAdapter<C>
where
    C: ConnectionFactory,
    C::Connection: WebdavSession,
{
    pub fn persistence_id(&self) -> &str {
        &self.persistence_id
    }

    fn pool(&self) -> &ConnectionPool<C> {
        self.factory.pool()
    }

    fn cache(&self) -> &ResourceTypeCache {
        self.factory.cache()
    }

    fn failure(&self, action: &str, source: NativeError) -> PersistenceError {
        PersistenceError::failure(action, &self.identifier, source)
    }

    /// Resource type of this item, from the cache when known.
    async fn resource_type(&self) -> PersistenceResult<ResourceType> {
        if let Some(resource_type) = self.cache().get(&self.identifier) {
            return Ok(resource_type);
        }
        let action = "Cannot determine resource type of";
        let mut conn = self.pool().acquire().await?;
        let result = conn.resource_types(&self.persistence_id, false).await;
        let resources = conn.settle(result).map_err(|e| self.failure(action, e))?;
        let resource_type = resources
            .first()
            .map(|resource| resource.resource_type())
            .ok_or_else(|| self.failure(action, NativeError::NotFound(self.persistence_id.clone())))?;
        self.cache().insert(self.identifier.clone(), resource_type.clone());
        Ok(resource_type)
    }
}

#[async_trait]
impl<C> DataStorer for WebdavDataAdapter<C>
where
    C: ConnectionFactory,
    C::Connection: WebdavSession,
{
    fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    async fn exists(&self) -> PersistenceResult<bool> {
        let mut conn = self.pool().acquire().await?;
        let result = conn.resource_types(&self.persistence_id, false).await;
        match conn.settle(result) {
            Ok(resources) => match resources.first() {
                Some(resource) => {
                    self.cache().insert(self.identifier.clone(), resource.resource_type());
                    Ok(true)
                }
                None => {
                    self.cache().invalidate(&self.identifier);
                    Ok(false)
                }
            },
            Err(NativeError::NotFound(_)) => {
                self.cache().invalidate(&self.identifier);
                Ok(false)
            }
            Err(e) => Err(self.failure("Cannot determine existence of", e)),
        }
    }

    async fn is_collection(&self) -> PersistenceResult<bool> {
        Ok(self.resource_type().await?.is_collection())
    }

    async fn is_leaf(&self) -> PersistenceResult<bool> {
        Ok(self.resource_type().await?.is_leaf())
    }

    async fn is_link(&self) -> PersistenceResult<bool> {
        Ok(self.resource_type().await?.is_link())
    }

    async fn link_target(&self) -> PersistenceResult<Option<Identifier>> {
        Ok(self.resource_type().await?.link_target)
    }

    async fn create_collection(&self, recursively: bool) -> PersistenceResult<()> {
        ensure_named(&self.identifier)?;
        if recursively {
            tree::create_missing_ancestors(&self.factory, &self.identifier).await?;
        }

        tracing::debug!(path = %self.persistence_id, "webdav mkcol");
        let mut conn = self.pool().acquire().await?;
        let result = conn.make_collection(&self.persistence_id).await;
        conn.settle(result).map_err(|e| self.failure("Cannot create collection", e))?;
        self.cache().insert(self.identifier.clone(), ResourceType::collection());
        Ok(())
    }

    async fn create_resource(&self) -> PersistenceResult<()> {
        ensure_named(&self.identifier)?;

        tracing::debug!(path = %self.persistence_id, "webdav put (empty)");
        let mut conn = self.pool().acquire().await?;
        let result = conn.put(&self.persistence_id, Default::default()).await;
        conn.settle(result).map_err(|e| self.failure("Cannot create resource", e))?;
        self.cache().insert(self.identifier.clone(), ResourceType::leaf());
        Ok(())
    }

    async fn create_link(&self, destination: &dyn DataStorer) -> PersistenceResult<()> {
        self.create_resource().await?;

        let target = destination.identifier();
        tracing::debug!(path = %self.persistence_id, %target, "webdav proppatch link target");
        let mut conn = self.pool().acquire().await?;
        let result = conn
            .set_property(&self.persistence_id, LINK_TARGET_NAMESPACE, LINK_TARGET_PROPERTY, &target.to_path_string())
            .await;
        conn.settle(result).map_err(|e| self.failure("Cannot set link target of", e))?;
        self.cache().insert(self.identifier.clone(), ResourceType::link(target.clone()));
        Ok(())
    }

    async fn get_children(&self) -> PersistenceResult<Vec<Identifier>> {
        let action = "Cannot retrieve children of item";
        let mut conn = self.pool().acquire().await?;
        let result = conn.resource_types(&self.persistence_id, true).await;
        let resources = conn.settle(result).map_err(|e| self.failure(action, e))?;

        let mut children = Vec::with_capacity(resources.len());
        for resource in resources {
            let identifier = self.factory.mapper().map_persistence_identifier(&resource.href)?;
            self.cache().insert(identifier.clone(), resource.resource_type());
            if identifier != self.identifier {
                children.push(identifier);
            }
        }
        Ok(children)
    }

    async fn read_data(&self) -> PersistenceResult<DataStream> {
        tracing::debug!(path = %self.persistence_id, "webdav get");
        let mut conn = self.pool().acquire().await?;
        let result = conn.get(&self.persistence_id).await;
        let content = conn.settle(result).map_err(|e| self.failure("Cannot read data of item", e))?;
        Ok(memory_stream(content))
    }

    async fn write_data(&self, data: InputStream) -> PersistenceResult<()> {
        let mut data = data;
        let mut content = BytesMut::new();
        let mut block = vec![0u8; BLOCK_SIZE];
        loop {
            let read = data
                .read(&mut block)
                .await
                .map_err(|e| self.failure("Cannot read input for item", NativeError::Io(e)))?;
            if read == 0 {
                break;
            }
            content.extend_from_slice(&block[..read]);
        }
        drop(data);

        tracing::debug!(path = %self.persistence_id, size = content.len(), "webdav put");
        let mut conn = self.pool().acquire().await?;
        let result = conn.put(&self.persistence_id, content.freeze()).await;
        conn.settle(result).map_err(|e| self.failure("Cannot write data to item", e))
    }

    async fn delete(&self) -> PersistenceResult<()> {
        tracing::debug!(path = %self.persistence_id, "webdav delete");
        let mut conn = self.pool().acquire().await?;
        let result = conn.delete(&self.persistence_id).await;
        conn.settle(result).map_err(|e| self.failure("Cannot delete item", e))?;
        self.cache().invalidate_tree(&self.identifier);
        Ok(())
    }

    async fn copy(&self, destination: &dyn DataStorer) -> PersistenceResult<()> {
        let target_id = destination.identifier();
        let target = self.factory.mapper().map_identifier(target_id);
        tracing::debug!(from = %self.persistence_id, to = %target, "webdav copy");
        let mut conn = self.pool().acquire().await?;
        let result = conn.copy_to(&self.persistence_id, &target).await;
        conn.settle(result).map_err(|e| self.failure("Cannot copy item", e))?;
        self.cache().invalidate_tree(target_id);
        Ok(())
    }

    async fn move_to(&self, destination: &dyn DataStorer) -> PersistenceResult<()> {
        let target_id = destination.identifier();
        let target = self.factory.mapper().map_identifier(target_id);
        tracing::debug!(from = %self.persistence_id, to = %target, "webdav move");
        let mut conn = self.pool().acquire().await?;
        let result = conn.move_to(&self.persistence_id, &target).await;
        conn.settle(result).map_err(|e| self.failure("Cannot move/rename item", e))?;
        self.cache().invalidate_tree(&self.identifier);
        self.cache().invalidate_tree(target_id);
        Ok(())
    }
}
