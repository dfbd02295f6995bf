// SPDX-License-Identifier: AGPL-3.0-or-later
//! Uniform item contract implemented by every backend adapter

use async_trait::async_trait;

use crate::{
    stream::{DataStream, InputStream},
    Identifier, PersistenceError, PersistenceResult,
};

/// One identifier bound to one backend.
///
/// Adapters hold no connection of their own. Each operation borrows one from
/// the backend pool for its direct native calls and gives it back on every
/// exit path; recursive sub-operations borrow their own.
#[async_trait]
pub trait DataStorer: Send + Sync {
    fn identifier(&self) -> &Identifier;

    async fn exists(&self) -> PersistenceResult<bool>;
    async fn is_collection(&self) -> PersistenceResult<bool>;
    async fn is_leaf(&self) -> PersistenceResult<bool>;

    async fn is_link(&self) -> PersistenceResult<bool> {
        Ok(false)
    }

    async fn link_target(&self) -> PersistenceResult<Option<Identifier>> {
        Ok(None)
    }

    async fn can_add_children(&self) -> PersistenceResult<bool> {
        self.is_collection().await
    }

    /// Create this collection, creating missing parents first when
    /// `recursively` is set.
    async fn create_collection(&self, recursively: bool) -> PersistenceResult<()>;

    /// Create an empty leaf.
    async fn create_resource(&self) -> PersistenceResult<()>;

    async fn create_link(&self, _destination: &dyn DataStorer) -> PersistenceResult<()> {
        Err(PersistenceError::Unsupported(format!(
            "Cannot create link '{}': links are not supported by this backend",
            self.identifier()
        )))
    }

    /// Identifiers of the immediate children.
    async fn get_children(&self) -> PersistenceResult<Vec<Identifier>>;

    async fn read_data(&self) -> PersistenceResult<DataStream>;

    /// Replace the content with `data`. The stream is consumed and thereby
    /// closed, whatever the outcome.
    async fn write_data(&self, data: InputStream) -> PersistenceResult<()>;

    async fn delete(&self) -> PersistenceResult<()>;

    async fn copy(&self, destination: &dyn DataStorer) -> PersistenceResult<()>;

    async fn move_to(&self, destination: &dyn DataStorer) -> PersistenceResult<()>;
}

/// Creates adapters bound to identifiers of one backend.
pub trait DataStorerFactory: Send + Sync {
    fn create_data_storer(&self, identifier: Identifier) -> Box<dyn DataStorer>;
}

/// Reject creation of an item whose last segment is empty (the root).
pub fn ensure_named(identifier: &Identifier) -> PersistenceResult<()> {
    if identifier.name().is_empty() {
        return Err(PersistenceError::EmptyName(identifier.clone()));
    }
    Ok(())
}
