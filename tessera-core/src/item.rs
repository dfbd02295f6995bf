// SPDX-License-Identifier: AGPL-3.0-or-later
//! Item classification

use serde::{Deserialize, Serialize};

use crate::Identifier;

/// Item kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemKind {
    Collection,
    Leaf,
    Link,
}

/// Resource type information as reported by a backend.
///
/// A resource carrying a link target is a link, regardless of its
/// collection flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceType {
    pub is_collection: bool,
    pub link_target: Option<Identifier>,
}

impl ResourceType {
    pub fn collection() -> Self {
        Self { is_collection: true, link_target: None }
    }

    pub fn leaf() -> Self {
        Self { is_collection: false, link_target: None }
    }

    pub fn link(target: Identifier) -> Self {
        Self { is_collection: false, link_target: Some(target) }
    }

    pub fn kind(&self) -> ItemKind {
        match (&self.link_target, self.is_collection) {
            (Some(_), _) => ItemKind::Link,
            (None, true) => ItemKind::Collection,
            (None, false) => ItemKind::Leaf,
        }
    }

    pub fn is_collection(&self) -> bool {
        self.kind() == ItemKind::Collection
    }

    pub fn is_leaf(&self) -> bool {
        self.kind() == ItemKind::Leaf
    }

    pub fn is_link(&self) -> bool {
        self.kind() == ItemKind::Link
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind() {
        assert_eq!(ResourceType::collection().kind(), ItemKind::Collection);
        assert_eq!(ResourceType::leaf().kind(), ItemKind::Leaf);
        assert_eq!(ResourceType::link(Identifier::new("/t")).kind(), ItemKind::Link);
    }

    #[test]
    fn test_link_is_neither_collection_nor_leaf() {
        let rt = ResourceType { is_collection: true, link_target: Some(Identifier::new("/t")) };
        assert!(rt.is_link());
        assert!(!rt.is_collection());
        assert!(!rt.is_leaf());
    }
}
