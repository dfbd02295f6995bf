// SPDX-License-Identifier: AGPL-3.0-or-later
//! SFTP data adapter and factory

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use tessera_core::{
    mapper::decode_name,
    storer::ensure_named,
    stream::{input_stream, DataStream, InputStream, SpooledBuffer},
    tree, ConnectionFactory, ConnectionPool, DataStorer, DataStorerFactory, Identifier, IdentifierMapper,
    NativeError, NativeResult, PersistenceError, PersistenceResult,
};
use tokio::io::AsyncReadExt;

use super::{
    DirEntry, FileAttributes, RemoteFile, SftpIdMapper, SftpPath, SftpSession, BLOCK_SIZE,
    DEFAULT_DIRECTORY_PERMISSIONS, DEFAULT_FILE_PERMISSIONS,
};

struct Shared<C: ConnectionFactory> {
    pool: ConnectionPool<C>,
    mapper: SftpIdMapper,
}

/// Creates [`SftpDataAdapter`]s sharing one connection pool.
pub struct SftpFactory<C: ConnectionFactory> {
    shared: Arc<Shared<C>>,
}

impl<C: ConnectionFactory> Clone for SftpFactory<C> {
    fn clone(&self) -> Self {
        Self { shared: self.shared.clone() }
    }
}

impl<C> SftpFactory<C>
where
    C: ConnectionFactory,
    C::Connection: SftpSession,
{
    pub fn new(pool: ConnectionPool<C>, mapper: SftpIdMapper) -> Self {
        Self { shared: Arc::new(Shared { pool, mapper }) }
    }

    pub fn pool(&self) -> &ConnectionPool<C> {
        &self.shared.pool
    }

    pub fn mapper(&self) -> &SftpIdMapper {
        &self.shared.mapper
    }

    pub fn adapter(&self, identifier: Identifier) -> SftpDataAdapter<C> {
        let persistence_id = self.mapper().map_identifier(&identifier);
        SftpDataAdapter { identifier, persistence_id, factory: self.clone() }
    }
}

impl<C> DataStorerFactory for SftpFactory<C>
where
    C: ConnectionFactory,
    C::Connection: SftpSession,
{
    fn create_data_storer(&self, identifier: Identifier) -> Box<dyn DataStorer> {
        Box::new(self.adapter(identifier))
    }
}

/// One SFTP path seen through the item contract.
pub struct SftpDataAdapter<C: ConnectionFactory> {
    identifier: Identifier,
    persistence_id: SftpPath,
    factory: SftpFactory<C>,
}

impl<C> SftpDataAdapter<C>
where
    C: ConnectionFactory,
    C::Connection: SftpSession,
{
    pub fn persistence_id(&self) -> &SftpPath {
        &self.persistence_id
    }

    fn pool(&self) -> &ConnectionPool<C> {
        self.factory.pool()
    }

    fn mapper(&self) -> &SftpIdMapper {
        self.factory.mapper()
    }

    fn failure(&self, action: &str, source: NativeError) -> PersistenceError {
        PersistenceError::failure(action, &self.identifier, source)
    }

    async fn stat(&self) -> PersistenceResult<FileAttributes> {
        let mut conn = self.pool().acquire().await?;
        let result = conn.stat(&self.persistence_id).await;
        conn.settle(result)
            .map_err(|e| self.failure("Cannot determine item type (file or collection) of", e))
    }

    /// Type of the item itself, without following a symbolic link.
    async fn lstat(&self) -> PersistenceResult<FileAttributes> {
        let mut conn = self.pool().acquire().await?;
        let result = conn.lstat(&self.persistence_id).await;
        conn.settle(result)
            .map_err(|e| self.failure("Cannot determine item type (file or collection) of", e))
    }

    async fn set_permissions(&self, mode: u32) -> PersistenceResult<()> {
        let mut conn = self.pool().acquire().await?;
        let result = conn.chmod(&self.persistence_id, mode).await;
        conn.settle(result)
            .map_err(|e| self.failure("Cannot set default permissions of", e))
    }

    async fn list_entries(&self, collection: &Identifier, path: &SftpPath) -> PersistenceResult<Vec<DirEntry>> {
        let mut conn = self.pool().acquire().await?;
        let result = conn.list_dir(path).await;
        let entries = conn
            .settle(result)
            .map_err(|e| PersistenceError::failure("Cannot retrieve children of item", collection, e))?;
        Ok(entries.into_iter().filter(|entry| !entry.is_self_or_parent()).collect())
    }

    /// Remove the tree below `root` on a single session: leaves as they are
    /// found, collections afterwards, deepest first.
    async fn remove_tree(&self, session: &mut C::Connection) -> NativeResult<()> {
        let mut pending = VecDeque::from([self.persistence_id.clone()]);
        let mut emptied = Vec::new();
        while let Some(collection) = pending.pop_front() {
            for entry in session.list_dir(&collection).await? {
                if entry.is_self_or_parent() {
                    continue;
                }
                let child = self.mapper().determine_persistence_child_id(&collection, &entry.filename);
                if entry.attributes.is_dir() {
                    pending.push_back(child);
                } else {
                    tracing::debug!(path = %child, "sftp remove");
                    session.remove(&child).await?;
                }
            }
            emptied.push(collection);
        }
        // Breadth-first discovery order lists every collection before its
        // descendants, so the reverse is safe for rmdir.
        for collection in emptied.iter().rev() {
            tracing::debug!(path = %collection, "sftp rmdir");
            session.rmdir(collection).await?;
        }
        Ok(())
    }

    async fn download(session: &mut C::Connection, path: &SftpPath) -> NativeResult<SpooledBuffer> {
        let mut file = session.open_read(path).await?;
        let mut spool = SpooledBuffer::new();
        let mut block = vec![0u8; BLOCK_SIZE];
        loop {
            let read = file.read(&mut block).await?;
            if read == 0 {
                break;
            }
            spool.write_block(&block[..read]).await?;
        }
        Ok(spool)
    }

    async fn upload(session: &mut C::Connection, path: &SftpPath, data: &mut InputStream) -> NativeResult<()> {
        let mut file = session.open_write(path).await?;
        let mut block = vec![0u8; BLOCK_SIZE];
        loop {
            let read = data.read(&mut block).await?;
            if read == 0 {
                break;
            }
            file.write_all(&block[..read]).await?;
        }
        file.flush().await
    }

    /// Read `path` on its own checkout. `item` only names the failure.
    async fn read_native(&self, item: &Identifier, path: &SftpPath) -> PersistenceResult<DataStream> {
        tracing::debug!(path = %path, "sftp read");
        let mut conn = self.pool().acquire().await?;
        let result = Self::download(&mut conn, path).await;
        let spool = conn
            .settle(result)
            .map_err(|e| PersistenceError::failure("Cannot read data of item", item, e))?;
        spool
            .into_stream()
            .await
            .map_err(|e| PersistenceError::failure("Cannot read data of item", item, NativeError::Io(e)))
    }

    async fn copy_leaf(&self, destination: &dyn DataStorer) -> PersistenceResult<()> {
        let data = self.read_data().await?;
        destination.write_data(Box::new(data)).await
    }

    /// Breadth-first copy of a collection tree inside this backend. Each
    /// listing releases its connection before the items it names are copied.
    /// Sources are addressed by their raw native names, so entries whose
    /// names are not UTF-8 are still read; their copies carry the decoded name.
    async fn copy_tree(&self, destination: &Identifier) -> PersistenceResult<()> {
        if destination.starts_with(&self.identifier) {
            return Err(PersistenceError::InvalidIdentifier(format!(
                "Cannot copy collection '{}' into itself ('{}')",
                self.identifier, destination
            )));
        }
        let target_of = |item: &Identifier| {
            item.rebase(&self.identifier, destination).ok_or_else(|| {
                PersistenceError::InvalidIdentifier(format!("'{}' is not below '{}'", item, self.identifier))
            })
        };

        let mut pending = VecDeque::from([(self.identifier.clone(), self.persistence_id.clone())]);
        while let Some((collection, native)) = pending.pop_front() {
            self.factory
                .create_data_storer(target_of(&collection)?)
                .create_collection(false)
                .await?;

            for entry in self.list_entries(&collection, &native).await? {
                let item = self.mapper().determine_child_id(&collection, &decode_name(&entry.filename));
                let path = self.mapper().determine_persistence_child_id(&native, &entry.filename);
                if entry.attributes.is_dir() {
                    pending.push_back((item, path));
                    continue;
                }
                let target = self.factory.create_data_storer(target_of(&item)?);
                let data = self.read_native(&item, &path).await?;
                target.write_data(Box::new(data)).await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl<C> DataStorer for SftpDataAdapter<C>
where
    C: ConnectionFactory,
    C::Connection: SftpSession,
{
    fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    async fn exists(&self) -> PersistenceResult<bool> {
        let mut conn = self.pool().acquire().await?;
        let result = conn.stat(&self.persistence_id).await;
        match conn.settle(result) {
            Ok(_) => Ok(true),
            Err(NativeError::NotFound(_)) => Ok(false),
            Err(e) => Err(self.failure("Cannot determine existence of", e)),
        }
    }

    async fn is_collection(&self) -> PersistenceResult<bool> {
        Ok(self.stat().await?.is_dir())
    }

    async fn is_leaf(&self) -> PersistenceResult<bool> {
        Ok(!self.is_collection().await?)
    }

    async fn create_collection(&self, recursively: bool) -> PersistenceResult<()> {
        ensure_named(&self.identifier)?;
        if recursively {
            tree::create_missing_ancestors(&self.factory, &self.identifier).await?;
        }

        tracing::debug!(path = %self.persistence_id, "sftp mkdir");
        let mut conn = self.pool().acquire().await?;
        let result = conn.mkdir(&self.persistence_id, DEFAULT_DIRECTORY_PERMISSIONS).await;
        conn.settle(result).map_err(|e| self.failure("Cannot create collection", e))?;

        // mkdir modes are filtered through the server's umask
        self.set_permissions(DEFAULT_DIRECTORY_PERMISSIONS).await
    }

    async fn create_resource(&self) -> PersistenceResult<()> {
        ensure_named(&self.identifier)?;
        self.write_data(input_stream(Vec::new())).await?;
        self.set_permissions(DEFAULT_FILE_PERMISSIONS).await
    }

    async fn create_link(&self, destination: &dyn DataStorer) -> PersistenceResult<()> {
        Err(PersistenceError::Unsupported(format!(
            "Cannot create link '{}' to '{}': SFTP stores do not support links",
            self.identifier,
            destination.identifier()
        )))
    }

    async fn get_children(&self) -> PersistenceResult<Vec<Identifier>> {
        let entries = self.list_entries(&self.identifier, &self.persistence_id).await?;
        Ok(entries
            .iter()
            .map(|entry| self.mapper().determine_child_id(&self.identifier, &decode_name(&entry.filename)))
            .collect())
    }

    async fn read_data(&self) -> PersistenceResult<DataStream> {
        self.read_native(&self.identifier, &self.persistence_id).await
    }

    async fn write_data(&self, data: InputStream) -> PersistenceResult<()> {
        let mut data = data;
        tracing::debug!(path = %self.persistence_id, "sftp write");
        let mut conn = self.pool().acquire().await?;
        let result = Self::upload(&mut conn, &self.persistence_id, &mut data).await;
        drop(data);
        conn.settle(result).map_err(|e| self.failure("Cannot write data to item", e))
    }

    async fn delete(&self) -> PersistenceResult<()> {
        // a link to a directory is unlinked, never walked
        let is_collection = self.lstat().await?.is_dir();
        tracing::debug!(path = %self.persistence_id, is_collection, "sftp delete");
        let mut conn = self.pool().acquire().await?;
        let result = if is_collection {
            self.remove_tree(&mut conn).await
        } else {
            conn.remove(&self.persistence_id).await
        };
        conn.settle(result).map_err(|e| self.failure("Cannot delete item", e))
    }

    async fn copy(&self, destination: &dyn DataStorer) -> PersistenceResult<()> {
        if self.is_collection().await? {
            self.copy_tree(destination.identifier()).await
        } else {
            self.copy_leaf(destination).await
        }
    }

    async fn move_to(&self, destination: &dyn DataStorer) -> PersistenceResult<()> {
        let target = self.mapper().map_identifier(destination.identifier());
        tracing::debug!(from = %self.persistence_id, to = %target, "sftp rename");
        let mut conn = self.pool().acquire().await?;
        let result = conn.rename(&self.persistence_id, &target).await;
        conn.settle(result).map_err(|e| self.failure("Cannot move/rename item", e))
    }
}
