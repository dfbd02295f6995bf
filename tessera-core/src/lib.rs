// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tessera Core
//!
//! Core traits and types for uniform item persistence across SFTP, WebDAV and
//! other hierarchical stores: identifiers, the item contract, the bounded
//! connection pool and the error model.

pub mod config;
pub mod error;
pub mod identifier;
pub mod item;
pub mod mapper;
pub mod pool;
pub mod storer;
pub mod stream;
pub mod tree;

pub use config::{Configuration, MAX_CONNECTION_NUMBER};
pub use error::{NativeError, NativeResult, PersistenceError, PersistenceResult};
pub use identifier::Identifier;
pub use item::{ItemKind, ResourceType};
pub use mapper::IdentifierMapper;
pub use pool::{ConnectionFactory, ConnectionPool, PooledConnection};
pub use storer::{DataStorer, DataStorerFactory};
pub use stream::{DataStream, InputStream, SpooledBuffer};
