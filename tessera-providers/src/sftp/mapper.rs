// SPDX-License-Identifier: AGPL-3.0-or-later
//! Identifier mapping for SFTP paths

use tessera_core::{mapper::decode_name, Identifier, IdentifierMapper, PersistenceError, PersistenceResult};

use super::SftpPath;

/// Maps identifiers below a remote base directory.
///
/// `/a/b` with base `/srv/data` becomes `/srv/data/a/b`. A relative base is
/// resolved by the server against the login directory.
#[derive(Debug, Clone)]
pub struct SftpIdMapper {
    /// Base without trailing slash; empty for the file system root
    base: Vec<u8>,
}

impl SftpIdMapper {
    pub fn new(base_path: impl AsRef<[u8]>) -> Self {
        let mut base = base_path.as_ref().to_vec();
        while base.last() == Some(&b'/') {
            base.pop();
        }
        Self { base }
    }

    pub fn base_path(&self) -> SftpPath {
        if self.base.is_empty() {
            SftpPath::from("/")
        } else {
            SftpPath::new(self.base.clone())
        }
    }
}

impl Default for SftpIdMapper {
    fn default() -> Self {
        Self::new("/")
    }
}

impl IdentifierMapper for SftpIdMapper {
    type PersistenceId = SftpPath;

    fn map_identifier(&self, identifier: &Identifier) -> SftpPath {
        if identifier.is_root() {
            return self.base_path();
        }
        let mut path = self.base.clone();
        for segment in identifier.segments() {
            path.push(b'/');
            path.extend_from_slice(segment.as_bytes());
        }
        SftpPath::new(path)
    }

    fn map_persistence_identifier(&self, persistence_id: &SftpPath) -> PersistenceResult<Identifier> {
        let bytes = persistence_id.as_bytes();
        let rest = bytes
            .strip_prefix(self.base.as_slice())
            .filter(|rest| rest.is_empty() || rest[0] == b'/')
            .ok_or_else(|| {
                PersistenceError::InvalidIdentifier(format!(
                    "'{}' is not below base path '{}'",
                    persistence_id,
                    self.base_path()
                ))
            })?;
        Ok(Identifier::new(decode_name(rest)))
    }

    fn determine_persistence_child_id(&self, parent: &SftpPath, name: &[u8]) -> SftpPath {
        let mut path = parent.as_bytes().to_vec();
        if path.last() != Some(&b'/') {
            path.push(b'/');
        }
        path.extend_from_slice(name);
        SftpPath::new(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_maps_below_base() {
        let mapper = SftpIdMapper::new("/srv/data/");
        assert_eq!(mapper.map_identifier(&Identifier::new("/a/b")), SftpPath::from("/srv/data/a/b"));
        assert_eq!(mapper.map_identifier(&Identifier::root()), SftpPath::from("/srv/data"));
    }

    #[test]
    fn test_root_base() {
        let mapper = SftpIdMapper::default();
        assert_eq!(mapper.map_identifier(&Identifier::root()), SftpPath::from("/"));
        assert_eq!(mapper.map_identifier(&Identifier::new("/x")), SftpPath::from("/x"));
        assert_eq!(mapper.map_persistence_identifier(&SftpPath::from("/")).unwrap(), Identifier::root());
    }

    #[test]
    fn test_relative_base() {
        let mapper = SftpIdMapper::new("uploads");
        assert_eq!(mapper.map_identifier(&Identifier::new("/x")), SftpPath::from("uploads/x"));
    }

    #[test]
    fn test_inverse_mapping() {
        let mapper = SftpIdMapper::new("/srv/data");
        for id in ["/", "/a", "/a/b c/d", "/ünï/cødé"] {
            let id = Identifier::new(id);
            let native = mapper.map_identifier(&id);
            assert_eq!(mapper.map_persistence_identifier(&native).unwrap(), id);
        }
    }

    #[test]
    fn test_rejects_paths_outside_base() {
        let mapper = SftpIdMapper::new("/srv/data");
        assert!(mapper.map_persistence_identifier(&SftpPath::from("/srv/database")).is_err());
        assert!(mapper.map_persistence_identifier(&SftpPath::from("/etc")).is_err());
    }

    #[test]
    fn test_child_from_raw_name() {
        let mapper = SftpIdMapper::new("/srv");
        let parent = SftpPath::from("/srv/a");
        assert_eq!(mapper.determine_persistence_child_id(&parent, b"b"), SftpPath::from("/srv/a/b"));
        assert_eq!(
            mapper.determine_persistence_child_id(&SftpPath::from("/"), &[0xff]),
            SftpPath::new(vec![b'/', 0xff])
        );

        let child = mapper.determine_child_id(&Identifier::new("/a"), "b");
        assert_eq!(child, Identifier::new("/a/b"));
        assert_eq!(mapper.determine_parent_id(&child), Identifier::new("/a"));
        assert_eq!(mapper.determine_parent_id(&Identifier::root()), Identifier::root());
    }
}
