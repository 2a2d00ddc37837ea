//! Tree walks over parent links.
//!
//! Nodes are any copyable key; the tree is described by a `parent_of`
//! lookup. Used to find which segments lie between two candidate link
//! endpoints in the official assembly tree.

/// The two nodes cannot be related through one tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopologyError {
    /// The parent chains end at different roots
    DifferentRoots,
    /// A parent chain loops back on itself
    Cycle,
}

impl std::fmt::Display for TopologyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TopologyError::DifferentRoots => write!(f, "nodes are not part of the same tree"),
            TopologyError::Cycle => write!(f, "parent chain contains a cycle"),
        }
    }
}

impl std::error::Error for TopologyError {}

/// Upper bound on chain length before a cycle is assumed.
const MAX_DEPTH: usize = 1 << 16;

/// Depth of `node` below its root, and the root itself.
pub fn tree_level<K, F>(node: K, parent_of: F) -> Result<(usize, K), TopologyError>
where
    K: Copy + Eq,
    F: Fn(K) -> Option<K>,
{
    let mut depth = 0;
    let mut current = node;
    while let Some(parent) = parent_of(current) {
        depth += 1;
        if depth > MAX_DEPTH || parent == node {
            return Err(TopologyError::Cycle);
        }
        current = parent;
    }
    Ok((depth, current))
}

/// Lowest common ancestor of `a` and `b`.
pub fn common_ancestor<K, F>(a: K, b: K, parent_of: F) -> Result<K, TopologyError>
where
    K: Copy + Eq,
    F: Fn(K) -> Option<K>,
{
    let (depth_a, root_a) = tree_level(a, &parent_of)?;
    let (depth_b, root_b) = tree_level(b, &parent_of)?;
    if root_a != root_b {
        return Err(TopologyError::DifferentRoots);
    }

    let (mut lower, mut higher, lower_depth, higher_depth) = if depth_a >= depth_b {
        (a, b, depth_a, depth_b)
    } else {
        (b, a, depth_b, depth_a)
    };

    for _ in higher_depth..lower_depth {
        lower = parent_of(lower).ok_or(TopologyError::DifferentRoots)?;
    }
    while lower != higher {
        lower = parent_of(lower).ok_or(TopologyError::DifferentRoots)?;
        higher = parent_of(higher).ok_or(TopologyError::DifferentRoots)?;
    }
    Ok(lower)
}

/// Nodes strictly between each endpoint and their common ancestor.
///
/// Neither endpoint nor the ancestor is included. Nodes on `a`'s side come
/// first, each side ordered from the endpoint upward.
pub fn path_between<K, F>(a: K, b: K, parent_of: F) -> Result<Vec<K>, TopologyError>
where
    K: Copy + Eq,
    F: Fn(K) -> Option<K>,
{
    let ancestor = common_ancestor(a, b, &parent_of)?;
    let mut between = Vec::new();

    for endpoint in [a, b] {
        if endpoint == ancestor {
            continue;
        }
        let mut current = parent_of(endpoint).ok_or(TopologyError::DifferentRoots)?;
        while current != ancestor {
            between.push(current);
            current = parent_of(current).ok_or(TopologyError::DifferentRoots)?;
        }
    }

    Ok(between)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    //        1
    //       / \
    //      2   3
    //     /     \
    //    4       5
    //   /
    //  6
    fn tree() -> HashMap<u32, u32> {
        [(2, 1), (3, 1), (4, 2), (5, 3), (6, 4)].into_iter().collect()
    }

    #[test]
    fn test_level() {
        let t = tree();
        assert_eq!(tree_level(1, |n| t.get(&n).copied()), Ok((0, 1)));
        assert_eq!(tree_level(6, |n| t.get(&n).copied()), Ok((3, 1)));
    }

    #[test]
    fn test_common_ancestor() {
        let t = tree();
        let p = |n: u32| t.get(&n).copied();
        assert_eq!(common_ancestor(6, 5, p), Ok(1));
        assert_eq!(common_ancestor(6, 2, p), Ok(2));
        assert_eq!(common_ancestor(4, 4, p), Ok(4));
    }

    #[test]
    fn test_path_between_branches() {
        let t = tree();
        let path = path_between(6, 5, |n| t.get(&n).copied()).unwrap();
        assert_eq!(path, vec![4, 2, 3]);
    }

    #[test]
    fn test_path_between_ancestor_and_descendant() {
        let t = tree();
        let path = path_between(2, 6, |n| t.get(&n).copied()).unwrap();
        assert_eq!(path, vec![4]);
    }

    #[test]
    fn test_siblings_have_empty_path() {
        let t = tree();
        let path = path_between(2, 3, |n| t.get(&n).copied()).unwrap();
        assert!(path.is_empty());
    }

    #[test]
    fn test_different_roots() {
        let mut t = tree();
        t.insert(8, 7);
        assert_eq!(
            path_between(6, 8, |n| t.get(&n).copied()),
            Err(TopologyError::DifferentRoots)
        );
    }

    #[test]
    fn test_cycle_detected() {
        let t: HashMap<u32, u32> = [(1, 2), (2, 3), (3, 1)].into_iter().collect();
        assert_eq!(tree_level(1, |n| t.get(&n).copied()), Err(TopologyError::Cycle));
    }
}
