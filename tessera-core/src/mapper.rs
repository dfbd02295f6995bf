// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mapping between logical identifiers and backend-native addresses

use std::fmt;

use crate::{Identifier, PersistenceResult};

/// Bidirectional mapping between [`Identifier`]s and a backend's native
/// path scheme.
///
/// Implementations must round-trip:
/// `map_persistence_identifier(&map_identifier(id)) == Ok(id)`.
pub trait IdentifierMapper: Send + Sync {
    type PersistenceId: Clone + fmt::Debug + fmt::Display + Send + Sync;

    fn map_identifier(&self, identifier: &Identifier) -> Self::PersistenceId;

    fn map_persistence_identifier(&self, persistence_id: &Self::PersistenceId) -> PersistenceResult<Identifier>;

    /// Child address in native space, from a raw (possibly undecodable) name.
    fn determine_persistence_child_id(&self, parent: &Self::PersistenceId, name: &[u8]) -> Self::PersistenceId;

    fn determine_parent_id(&self, identifier: &Identifier) -> Identifier {
        identifier.parent().unwrap_or_else(Identifier::root)
    }

    fn determine_child_id(&self, parent: &Identifier, name: &str) -> Identifier {
        parent.join(name)
    }
}

/// Decode a backend-supplied name, replacing undecodable sequences.
pub fn decode_name(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).into_owned()
}
