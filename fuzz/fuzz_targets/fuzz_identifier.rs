// SPDX-License-Identifier: AGPL-3.0-or-later
//! Fuzz target for identifier normalization and backend path mapping

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use tessera_core::{Identifier, IdentifierMapper};
use tessera_providers::{SftpIdMapper, WebdavIdMapper};

#[derive(Debug, Arbitrary)]
struct Input<'a> {
    path: &'a str,
    base: &'a str,
    name: &'a [u8],
}

fuzz_target!(|input: Input<'_>| {
    let id = Identifier::new(input.path);

    // normalization is idempotent
    assert_eq!(Identifier::new(id.to_path_string()), id);
    if let Some(parent) = id.parent() {
        assert!(id.starts_with(&parent));
        if !id.name().is_empty() {
            assert_eq!(parent.join(id.name()), id);
        }
    }
    // a trailing separator only marks an unnamed identifier; items are
    // always addressed by their named form
    let id = id.parent().filter(|_| id.name().is_empty()).unwrap_or(id);

    let base = Identifier::new(input.base);
    if let Some(moved) = id.rebase(&Identifier::root(), &base) {
        assert_eq!(moved.rebase(&base, &Identifier::root()), Some(id.clone()));
    }

    let sftp = SftpIdMapper::new(base.to_path_string());
    let native = sftp.map_identifier(&id);
    assert_eq!(sftp.map_persistence_identifier(&native).ok(), Some(id.clone()));
    let _ = sftp.determine_persistence_child_id(&native, input.name);

    let webdav = WebdavIdMapper::new(&base.to_path_string());
    let href = webdav.map_identifier(&id);
    assert_eq!(webdav.map_persistence_identifier(&href).ok(), Some(id.clone()));
    let child = webdav.determine_persistence_child_id(&href, input.name);
    let _ = webdav.map_persistence_identifier(&child);
});
