// SPDX-License-Identifier: AGPL-3.0-or-later
//! Bounded connection pool
//!
//! Connections are created on demand up to a fixed maximum and handed out as
//! [`PooledConnection`] guards. Dropping a guard returns its connection to the
//! idle set and wakes one task waiting in [`ConnectionPool::acquire`].

use async_trait::async_trait;
use parking_lot::Mutex;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;

use crate::{PersistenceError, PersistenceResult};

/// Backend-specific hook creating new connections for a pool.
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    type Connection: Send + 'static;

    /// Open and authenticate a new session.
    async fn create_connection(&self) -> PersistenceResult<Self::Connection>;
}

/// Bounded pool of live backend connections.
///
/// Invariants:
/// - at most `max_connections` connections exist at any time;
/// - a connection is either idle (owned by the pool) or checked out (owned by
///   exactly one guard), never both.
pub struct ConnectionPool<F: ConnectionFactory> {
    factory: F,
    max_connections: usize,
    acquire_timeout: Option<Duration>,
    /// One permit per connection that may currently be checked out
    permits: Semaphore,
    idle: Mutex<Vec<F::Connection>>,
    created: AtomicUsize,
}

impl<F: ConnectionFactory> ConnectionPool<F> {
    pub fn new(factory: F, max_connections: usize) -> Self {
        let max_connections = max_connections.max(1);
        Self {
            factory,
            max_connections,
            acquire_timeout: None,
            permits: Semaphore::new(max_connections),
            idle: Mutex::new(Vec::with_capacity(max_connections)),
            created: AtomicUsize::new(0),
        }
    }

    /// Bound the time [`acquire`](Self::acquire) waits for a free connection.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Number of connections currently in existence (idle or checked out).
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn idle(&self) -> usize {
        self.idle.lock().len()
    }

    /// Check out a connection.
    ///
    /// Reuses an idle connection, creates one while below the maximum, and
    /// otherwise suspends until another guard is released. A failed creation
    /// propagates to the caller and does not count towards the maximum.
    pub async fn acquire(&self) -> PersistenceResult<PooledConnection<'_, F>> {
        let permit = match self.acquire_timeout {
            Some(limit) => tokio::time::timeout(limit, self.permits.acquire())
                .await
                .map_err(|_| PersistenceError::PoolTimeout(limit))?,
            None => self.permits.acquire().await,
        }
        .map_err(|_| PersistenceError::PoolClosed)?;

        let reused = self.idle.lock().pop();
        let connection = match reused {
            Some(connection) => connection,
            None => {
                let connection = self.factory.create_connection().await?;
                let created = self.created.fetch_add(1, Ordering::SeqCst) + 1;
                tracing::debug!(created, max = self.max_connections, "created pooled connection");
                connection
            }
        };

        // The guard hands the permit back on release.
        permit.forget();
        Ok(PooledConnection { pool: self, connection: Some(connection) })
    }

    /// Close the pool: waiting and future acquires fail with
    /// [`PersistenceError::PoolClosed`], idle connections are dropped.
    pub fn shutdown(&self) {
        self.permits.close();
        let dropped = {
            let mut idle = self.idle.lock();
            let count = idle.len();
            idle.clear();
            count
        };
        self.created.fetch_sub(dropped, Ordering::SeqCst);
        tracing::info!(dropped, "connection pool shut down");
    }

    fn release(&self, connection: F::Connection) {
        // shutdown closes the permits before draining under this lock
        let mut idle = self.idle.lock();
        if self.permits.is_closed() {
            drop(idle);
            self.created.fetch_sub(1, Ordering::SeqCst);
            return;
        }
        idle.push(connection);
        drop(idle);
        self.permits.add_permits(1);
    }

    fn forget(&self) {
        self.created.fetch_sub(1, Ordering::SeqCst);
        if !self.permits.is_closed() {
            self.permits.add_permits(1);
        }
    }
}

/// Exclusive checkout of a pooled connection, released on drop.
pub struct PooledConnection<'a, F: ConnectionFactory> {
    pool: &'a ConnectionPool<F>,
    connection: Option<F::Connection>,
}

impl<'a, F: ConnectionFactory> PooledConnection<'a, F> {
    /// Destroy the connection instead of returning it, freeing its slot.
    pub fn discard(mut self) {
        if self.connection.take().is_some() {
            tracing::warn!("discarding broken pooled connection");
            self.pool.forget();
        }
    }

    /// Pass `result` through, discarding the connection first if the error
    /// says its transport is gone. Otherwise the connection is released.
    pub fn settle<T>(self, result: crate::NativeResult<T>) -> crate::NativeResult<T> {
        match &result {
            Err(err) if err.is_connection_lost() => self.discard(),
            _ => drop(self),
        }
        result
    }
}

impl<F: ConnectionFactory> Deref for PooledConnection<'_, F> {
    type Target = F::Connection;

    fn deref(&self) -> &Self::Target {
        // Only `discard` and `drop` take the connection, both consume the guard.
        self.connection.as_ref().expect("pooled connection already released")
    }
}

impl<F: ConnectionFactory> DerefMut for PooledConnection<'_, F> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.connection.as_mut().expect("pooled connection already released")
    }
}

impl<F: ConnectionFactory> Drop for PooledConnection<'_, F> {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            self.pool.release(connection);
        }
    }
}
