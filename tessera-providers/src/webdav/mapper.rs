// SPDX-License-Identifier: AGPL-3.0-or-later
//! Identifier mapping for WebDAV URL paths

use tessera_core::{mapper::decode_name, Identifier, IdentifierMapper, PersistenceError, PersistenceResult};

/// Maps identifiers below a base URL path.
///
/// `/a b/c` with base `/dav` becomes `/dav/a%20b/c`. Hrefs coming back from
/// the server may be absolute URLs and may encode differently; they are
/// compared segment-wise after decoding.
#[derive(Debug, Clone)]
pub struct WebdavIdMapper {
    /// Encoded base path without trailing slash; empty for the server root
    base: String,
    base_segments: Vec<String>,
}

impl WebdavIdMapper {
    /// `base_path` is the decoded path of the store below the server origin.
    pub fn new(base_path: &str) -> Self {
        let base_segments: Vec<String> = Identifier::new(base_path).segments().to_vec();
        let base = base_segments.iter().map(|segment| format!("/{}", urlencoding::encode(segment))).collect();
        Self { base, base_segments }
    }

    pub fn base_path(&self) -> &str {
        if self.base.is_empty() {
            "/"
        } else {
            &self.base
        }
    }
}

impl Default for WebdavIdMapper {
    fn default() -> Self {
        Self::new("/")
    }
}

/// Path component of an href, without scheme, authority, query or fragment.
fn href_path(href: &str) -> &str {
    let path = match href.find("://") {
        Some(scheme_end) => {
            let rest = &href[scheme_end + 3..];
            rest.find('/').map(|slash| &rest[slash..]).unwrap_or("/")
        }
        None => href,
    };
    path.split(|c: char| c == '?' || c == '#').next().unwrap_or(path)
}

fn decode_segment(segment: &str) -> String {
    decode_name(&urlencoding::decode_binary(segment.as_bytes()))
}

impl IdentifierMapper for WebdavIdMapper {
    type PersistenceId = String;

    fn map_identifier(&self, identifier: &Identifier) -> String {
        if identifier.is_root() {
            return format!("{}/", self.base);
        }
        let mut path = self.base.clone();
        for segment in identifier.segments() {
            path.push('/');
            path.push_str(&urlencoding::encode(segment));
        }
        path
    }

    fn map_persistence_identifier(&self, persistence_id: &String) -> PersistenceResult<Identifier> {
        let segments: Vec<String> = href_path(persistence_id)
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(decode_segment)
            .collect();
        let rest = segments.strip_prefix(self.base_segments.as_slice()).ok_or_else(|| {
            PersistenceError::InvalidIdentifier(format!(
                "'{}' is not below base path '{}'",
                persistence_id,
                self.base_path()
            ))
        })?;
        Ok(rest.iter().fold(Identifier::root(), |id, segment| id.join(segment)))
    }

    fn determine_persistence_child_id(&self, parent: &String, name: &[u8]) -> String {
        format!("{}/{}", parent.trim_end_matches('/'), urlencoding::encode_binary(name))
    }
}
