// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tree helpers built from single-item operations

use crate::{DataStorerFactory, Identifier, PersistenceError, PersistenceResult};

/// Deepest identifier recursive collection creation accepts
pub const MAX_NESTING_DEPTH: usize = 256;

/// Create every missing ancestor of `identifier`, parent-first.
///
/// Walks upwards until an existing collection (or the root) is found, then
/// creates the missing collections top-down, each through its own adapter.
pub async fn create_missing_ancestors(
    factory: &dyn DataStorerFactory,
    identifier: &Identifier,
) -> PersistenceResult<()> {
    if identifier.depth() > MAX_NESTING_DEPTH {
        return Err(PersistenceError::TooDeeplyNested(identifier.clone()));
    }

    let mut missing = Vec::new();
    let mut current = identifier.parent();
    while let Some(ancestor) = current {
        if ancestor.is_root() {
            break;
        }
        let storer = factory.create_data_storer(ancestor.clone());
        if storer.exists().await? {
            break;
        }
        current = ancestor.parent();
        missing.push(storer);
    }

    for storer in missing.into_iter().rev() {
        tracing::debug!(identifier = %storer.identifier(), "creating missing parent collection");
        storer.create_collection(false).await?;
    }
    Ok(())
}
