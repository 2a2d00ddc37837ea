//! Connectivity grouping for resource-sharing sets.
//!
//! Groups are recomputed from scratch from the current link list rather
//! than split incrementally, so removing a link never leaves stale unions.

use std::collections::BTreeMap;

/// Partition `nodes` into connected groups over `links`.
///
/// Each node maps to the smallest member of its group. Links that mention a
/// node not in `nodes` are ignored.
pub fn connected_groups<K>(nodes: &[K], links: &[(K, K)]) -> BTreeMap<K, K>
where
    K: Copy + Ord,
{
    let index: BTreeMap<K, usize> = nodes.iter().enumerate().map(|(i, &k)| (k, i)).collect();
    let mut parent: Vec<usize> = (0..nodes.len()).collect();

    fn find(parent: &mut [usize], mut i: usize) -> usize {
        while parent[i] != i {
            parent[i] = parent[parent[i]];
            i = parent[i];
        }
        i
    }

    for (a, b) in links {
        let (Some(&ia), Some(&ib)) = (index.get(a), index.get(b)) else {
            continue;
        };
        let ra = find(&mut parent, ia);
        let rb = find(&mut parent, ib);
        if ra != rb {
            parent[rb] = ra;
        }
    }

    // Smallest member per root
    let mut label: BTreeMap<usize, K> = BTreeMap::new();
    for (i, &node) in nodes.iter().enumerate() {
        let root = find(&mut parent, i);
        label
            .entry(root)
            .and_modify(|l| {
                if node < *l {
                    *l = node;
                }
            })
            .or_insert(node);
    }

    nodes
        .iter()
        .enumerate()
        .map(|(i, &node)| {
            let root = find(&mut parent, i);
            (node, label[&root])
        })
        .collect()
}
