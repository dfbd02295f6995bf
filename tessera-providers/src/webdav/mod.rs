// SPDX-License-Identifier: AGPL-3.0-or-later
//! WebDAV storage backend
//!
//! HTTP-based distributed authoring. Collections map to WebDAV collections,
//! leaves to plain resources, and links to resources carrying a
//! `linkTarget` dead property.

use async_trait::async_trait;
use bytes::Bytes;
use tessera_core::{Identifier, NativeResult, ResourceType};

pub mod adapter;
#[cfg(feature = "webdav")]
pub mod client;
pub mod mapper;
pub mod multistatus;

pub use adapter::{WebdavDataAdapter, WebdavFactory};
#[cfg(feature = "webdav")]
pub use client::{HttpWebdavConnector, HttpWebdavSession, WebdavAuth};
pub use mapper::WebdavIdMapper;

/// Namespace of the link target dead property
pub const LINK_TARGET_NAMESPACE: &str = "urn:tessera:properties";

/// Local name of the link target dead property
pub const LINK_TARGET_PROPERTY: &str = "linkTarget";

/// One `<response>` of a PROPFIND multistatus
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DavResource {
    /// Href as sent by the server (percent-encoded)
    pub href: String,
    pub is_collection: bool,
    /// Logical identifier stored in the link target property
    pub link_target: Option<String>,
}

impl DavResource {
    pub fn resource_type(&self) -> ResourceType {
        ResourceType {
            is_collection: self.is_collection,
            link_target: self.link_target.as_deref().map(Identifier::new),
        }
    }
}

/// WebDAV capabilities a connection must offer.
///
/// Paths are absolute, percent-encoded URL paths as produced by
/// [`WebdavIdMapper`].
#[async_trait]
pub trait WebdavSession: Send {
    /// PROPFIND for the resource type of `path` (depth 0), plus those of its
    /// members when `with_members` is set (depth 1).
    async fn resource_types(&mut self, path: &str, with_members: bool) -> NativeResult<Vec<DavResource>>;

    /// MKCOL
    async fn make_collection(&mut self, path: &str) -> NativeResult<()>;

    async fn put(&mut self, path: &str, content: Bytes) -> NativeResult<()>;

    async fn get(&mut self, path: &str) -> NativeResult<Bytes>;

    async fn delete(&mut self, path: &str) -> NativeResult<()>;

    /// MOVE, overwriting the destination
    async fn move_to(&mut self, path: &str, destination: &str) -> NativeResult<()>;

    /// COPY (depth infinity), overwriting the destination
    async fn copy_to(&mut self, path: &str, destination: &str) -> NativeResult<()>;

    /// PROPPATCH setting one dead property
    async fn set_property(&mut self, path: &str, namespace: &str, name: &str, value: &str) -> NativeResult<()>;
}
