//! In-memory shadow namespace.
//!
//! A path-indexed tree mirroring the directory/file structure visible to
//! out-of-band callers. Nodes live in an arena and are addressed by index;
//! a directory's child map holds node ids, so two distinct paths may map to
//! the same node (see [`ShadowTree::link`]). One mutex guards the whole
//! structure and is held for the full duration of every public operation,
//! which is what makes [`ShadowTree::rename`] atomic to other callers.
//!
//! Missing intermediates, duplicate names, and operations on absent paths
//! are consistency violations by the out-of-band caller and panic; with the
//! release profile this aborts the process rather than continuing with a
//! namespace that no longer matches what the caller established.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use tracing::debug;

/// Stable identity of a node within the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct NodeId(usize);

const ROOT: NodeId = NodeId(0);

/// What a path entry resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    File,
    Directory,
}

#[derive(Debug)]
struct Node {
    // Present iff the node is a directory.
    children: Option<BTreeMap<String, NodeId>>,
}

impl Node {
    fn new(kind: NodeKind) -> Self {
        let children = match kind {
            NodeKind::Directory => Some(BTreeMap::new()),
            NodeKind::File => None,
        };
        Node { children }
    }

    fn kind(&self) -> NodeKind {
        if self.children.is_some() {
            NodeKind::Directory
        } else {
            NodeKind::File
        }
    }
}

#[derive(Debug)]
struct Arena {
    // Slot 0 is the root directory. Entries removed from the namespace keep
    // their slot until the tree is dropped; the arena owns every lifetime.
    nodes: Vec<Node>,
}

impl Arena {
    fn new() -> Self {
        Arena {
            nodes: vec![Node::new(NodeKind::Directory)],
        }
    }

    fn alloc(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node::new(kind));
        id
    }

    fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    fn children_mut(&mut self, id: NodeId, path: &str) -> &mut BTreeMap<String, NodeId> {
        match self.nodes[id.0].children {
            Some(ref mut children) => children,
            None => panic!("shadow tree: '{path}' is not a directory"),
        }
    }

    /// Walks every component of `path`. Panics if any component is missing
    /// or a non-final component is not a directory.
    fn resolve(&self, path: &str) -> NodeId {
        let mut current = ROOT;
        for component in components(path) {
            let children = match self.node(current).children {
                Some(ref children) => children,
                None => panic!("shadow tree: non-directory on the way to '{path}'"),
            };
            current = match children.get(component) {
                Some(&id) => id,
                None => panic!("shadow tree: '{component}' does not exist in '{path}'"),
            };
        }
        current
    }

    /// Walks everything but the final component, which must all be existing
    /// directories. Returns the containing directory and the final name.
    fn resolve_parent<'p>(&self, path: &'p str) -> (NodeId, &'p str) {
        let mut parts: Vec<&str> = components(path).collect();
        let name = match parts.pop() {
            Some(name) => name,
            None => panic!("shadow tree: the root has no parent entry"),
        };
        let mut current = ROOT;
        for component in parts {
            let children = match self.node(current).children {
                Some(ref children) => children,
                None => panic!("shadow tree: non-directory on the way to '{path}'"),
            };
            current = match children.get(component) {
                Some(&id) => id,
                None => panic!("shadow tree: '{component}' does not exist in '{path}'"),
            };
        }
        (current, name)
    }
}

fn components(path: &str) -> impl Iterator<Item = &str> {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    trimmed.split('/').filter(|c| !c.is_empty())
}

/// The concurrently-shared shadow namespace.
///
/// All operations take absolute `/`-separated paths; `/` is the root and is
/// always a directory.
pub struct ShadowTree {
    inner: Mutex<Arena>,
}

impl ShadowTree {
    /// Creates an empty namespace containing only the root directory.
    pub fn new() -> Self {
        ShadowTree {
            inner: Mutex::new(Arena::new()),
        }
    }

    /// Inserts a new leaf at `path`.
    ///
    /// Panics if an intermediate component is missing or not a directory,
    /// or if an entry named like the final component already exists.
    pub fn create(&self, path: &str, directory: bool) {
        debug!(path, directory, "shadow create");
        let kind = if directory {
            NodeKind::Directory
        } else {
            NodeKind::File
        };
        let mut arena = self.inner.lock();
        let (dir, name) = arena.resolve_parent(path);
        let id = arena.alloc(kind);
        if arena
            .children_mut(dir, path)
            .insert(name.to_string(), id)
            .is_some()
        {
            panic!("shadow tree: '{path}' already exists");
        }
    }

    /// Removes the final-component entry of `path` from its parent.
    ///
    /// Panics if any component of `path` is missing.
    pub fn destroy(&self, path: &str) {
        debug!(path, "shadow destroy");
        let mut arena = self.inner.lock();
        let (dir, name) = arena.resolve_parent(path);
        if arena.children_mut(dir, path).remove(name).is_none() {
            panic!("shadow tree: '{path}' does not exist");
        }
    }

    /// Whether `path` resolves to a directory. Panics if it does not resolve.
    pub fn is_directory(&self, path: &str) -> bool {
        let arena = self.inner.lock();
        let id = arena.resolve(path);
        arena.node(id).kind() == NodeKind::Directory
    }

    /// Moves the node at `from` to `to` in one step: no observer ever sees
    /// the namespace with the entry half-moved, because the tree lock is
    /// held across the lookup, the destination insert, and the source erase.
    ///
    /// The destination insert is a single map insertion; it either panics
    /// before mutating anything (missing ancestry, duplicate name, source
    /// absent) or fully succeeds, so the node is reachable under at least
    /// one of the two paths at every point.
    pub fn rename(&self, from: &str, to: &str) {
        debug!(from, to, "shadow rename");
        let mut arena = self.inner.lock();
        let id = arena.resolve(from);
        let (to_dir, to_name) = arena.resolve_parent(to);
        if arena
            .children_mut(to_dir, to)
            .insert(to_name.to_string(), id)
            .is_some()
        {
            panic!("shadow tree: '{to}' already exists");
        }
        let (from_dir, from_name) = arena.resolve_parent(from);
        arena.children_mut(from_dir, from).remove(from_name);
    }

    /// Makes `to` an alias of `from`: both entries reference the same node,
    /// so a mutation through either path is visible through the other.
    ///
    /// Panics under the same conditions as [`ShadowTree::rename`].
    pub fn link(&self, from: &str, to: &str) {
        debug!(from, to, "shadow link");
        let mut arena = self.inner.lock();
        let id = arena.resolve(from);
        let (to_dir, to_name) = arena.resolve_parent(to);
        if arena
            .children_mut(to_dir, to)
            .insert(to_name.to_string(), id)
            .is_some()
        {
            panic!("shadow tree: '{to}' already exists");
        }
    }

    /// Number of entries reachable from the root, the root included.
    pub fn len(&self) -> usize {
        fn walk(arena: &Arena, id: NodeId) -> usize {
            match arena.node(id).children {
                Some(ref children) => {
                    1 + children.values().map(|&c| walk(arena, c)).sum::<usize>()
                }
                None => 1,
            }
        }
        let arena = self.inner.lock();
        walk(&arena, ROOT)
    }

    /// True when only the root exists.
    pub fn is_empty(&self) -> bool {
        self.len() == 1
    }
}

impl Default for ShadowTree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;

    #[test]
    fn test_root_is_directory() {
        let tree = ShadowTree::new();
        assert!(tree.is_directory("/"));
        assert!(tree.is_empty());
    }

    #[test]
    fn test_create_directory_then_file_below_it() {
        let tree = ShadowTree::new();
        tree.create("/a", true);
        tree.create("/a/b", false);
        assert!(tree.is_directory("/a"));
        assert!(!tree.is_directory("/a/b"));
        assert_eq!(tree.len(), 3);
    }

    #[test]
    #[should_panic(expected = "already exists")]
    fn test_create_duplicate_name_is_fatal() {
        let tree = ShadowTree::new();
        tree.create("/a", false);
        tree.create("/a", true);
    }

    #[test]
    #[should_panic(expected = "does not exist")]
    fn test_create_with_missing_intermediate_is_fatal() {
        let tree = ShadowTree::new();
        tree.create("/missing/leaf", false);
    }

    #[test]
    #[should_panic(expected = "is not a directory")]
    fn test_create_under_file_is_fatal() {
        let tree = ShadowTree::new();
        tree.create("/f", false);
        tree.create("/f/child", false);
    }

    #[test]
    fn test_destroy_leaf_keeps_parent() {
        let tree = ShadowTree::new();
        tree.create("/a", true);
        tree.create("/a/b", false);
        tree.destroy("/a/b");
        assert!(tree.is_directory("/a"));
        assert_eq!(tree.len(), 2);
    }

    #[test]
    #[should_panic(expected = "does not exist")]
    fn test_lookup_after_destroy_is_fatal() {
        let tree = ShadowTree::new();
        tree.create("/a", true);
        tree.create("/a/b", false);
        tree.destroy("/a/b");
        tree.is_directory("/a/b");
    }

    #[test]
    #[should_panic(expected = "does not exist")]
    fn test_lookup_below_destroyed_directory_is_fatal() {
        let tree = ShadowTree::new();
        tree.create("/a", true);
        tree.create("/a/b", false);
        tree.destroy("/a/b");
        tree.destroy("/a");
        tree.is_directory("/a/x");
    }

    #[test]
    #[should_panic(expected = "does not exist")]
    fn test_destroy_missing_entry_is_fatal() {
        let tree = ShadowTree::new();
        tree.destroy("/nope");
    }

    #[test]
    fn test_rename_relocates_subtree() {
        let tree = ShadowTree::new();
        tree.create("/a", true);
        tree.create("/a/b", false);
        tree.rename("/a", "/c");
        assert!(tree.is_directory("/c"));
        assert!(!tree.is_directory("/c/b"));
    }

    #[test]
    #[should_panic(expected = "does not exist")]
    fn test_rename_source_gone_afterwards() {
        let tree = ShadowTree::new();
        tree.create("/a", true);
        tree.rename("/a", "/c");
        tree.is_directory("/a");
    }

    #[test]
    fn test_rename_keeps_node_kind() {
        let tree = ShadowTree::new();
        tree.create("/f", false);
        tree.rename("/f", "/g");
        assert!(!tree.is_directory("/g"));
    }

    #[test]
    #[should_panic(expected = "already exists")]
    fn test_rename_onto_existing_entry_is_fatal() {
        let tree = ShadowTree::new();
        tree.create("/a", false);
        tree.create("/b", false);
        tree.rename("/a", "/b");
    }

    #[test]
    fn test_link_aliases_share_mutations_both_ways() {
        let tree = ShadowTree::new();
        tree.create("/a", true);
        tree.link("/a", "/d");
        tree.create("/a/x", false);
        assert!(!tree.is_directory("/d/x"));
        tree.create("/d/y", true);
        assert!(tree.is_directory("/a/y"));
    }

    #[test]
    fn test_link_source_still_resolves() {
        let tree = ShadowTree::new();
        tree.create("/a", false);
        tree.link("/a", "/b");
        assert!(!tree.is_directory("/a"));
        assert!(!tree.is_directory("/b"));
    }

    #[test]
    fn test_destroying_one_alias_keeps_the_other() {
        let tree = ShadowTree::new();
        tree.create("/a", true);
        tree.create("/a/x", false);
        tree.link("/a", "/d");
        tree.destroy("/a");
        assert!(!tree.is_directory("/d/x"));
    }

    #[test]
    fn test_deep_nesting_resolves() {
        let tree = ShadowTree::new();
        tree.create("/a", true);
        tree.create("/a/b", true);
        tree.create("/a/b/c", true);
        tree.create("/a/b/c/d", false);
        assert!(tree.is_directory("/a/b/c"));
        assert!(!tree.is_directory("/a/b/c/d"));
    }

    #[test]
    fn test_concurrent_creates_into_disjoint_parents() {
        let tree = Arc::new(ShadowTree::new());
        let threads = 8;
        let files_per_thread = 32;
        for t in 0..threads {
            tree.create(&format!("/t{t}"), true);
        }

        let handles: Vec<_> = (0..threads)
            .map(|t| {
                let tree = Arc::clone(&tree);
                std::thread::spawn(move || {
                    for f in 0..files_per_thread {
                        tree.create(&format!("/t{t}/f{f}"), false);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        // No lost inserts, no corrupted sibling maps.
        assert_eq!(tree.len(), 1 + threads + threads * files_per_thread);
        for t in 0..threads {
            for f in 0..files_per_thread {
                assert!(!tree.is_directory(&format!("/t{t}/f{f}")));
            }
        }
    }

    proptest! {
        #[test]
        fn prop_distinct_siblings_all_resolve(
            names in prop::collection::btree_set("[a-z]{1,8}", 1..16)
        ) {
            let tree = ShadowTree::new();
            tree.create("/parent", true);
            for (i, name) in names.iter().enumerate() {
                tree.create(&format!("/parent/{name}"), i % 2 == 0);
            }
            for (i, name) in names.iter().enumerate() {
                prop_assert_eq!(tree.is_directory(&format!("/parent/{name}")), i % 2 == 0);
            }
            prop_assert_eq!(tree.len(), 2 + names.len());
        }
    }
}
