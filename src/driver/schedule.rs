//! Ordering of subsets within a frame.
//!
//! Subsets that seed from a neighbor must run after it. Subsets are grouped
//! into waves by their depth in the neighbor forest; a wave only depends on
//! earlier waves, so its members can be solved concurrently. Neighbor cycles
//! are cut at their lowest-indexed member.

use crate::subset::Subset;

const UNSET: usize = usize::MAX;

/// Neighbor links with self-links, dangling ids and cycles removed.
fn effective_neighbors(subsets: &[Subset]) -> Vec<Option<usize>> {
    let n = subsets.len();
    let mut links: Vec<Option<usize>> = subsets
        .iter()
        .enumerate()
        .map(|(i, s)| s.neighbor().filter(|&j| j < n && j != i))
        .collect();

    // 0 = unvisited, 1 = on the current walk, 2 = done.
    let mut mark = vec![0u8; n];
    for start in 0..n {
        let mut path = Vec::new();
        let mut cur = Some(start);
        while let Some(c) = cur {
            match mark[c] {
                2 => break,
                1 => {
                    let pos = path.iter().position(|&p| p == c).unwrap_or(0);
                    if let Some(&root) = path[pos..].iter().min() {
                        links[root] = None;
                    }
                    break;
                }
                _ => {
                    mark[c] = 1;
                    path.push(c);
                    cur = links[c];
                }
            }
        }
        for p in path {
            mark[p] = 2;
        }
    }
    links
}

/// Depth of every subset in the neighbor forest.
pub fn depths(subsets: &[Subset]) -> Vec<usize> {
    let links = effective_neighbors(subsets);
    let mut depth = vec![UNSET; subsets.len()];
    for i in 0..subsets.len() {
        let mut chain = Vec::new();
        let mut next_depth = 0;
        let mut cur = Some(i);
        while let Some(c) = cur {
            if depth[c] != UNSET {
                next_depth = depth[c] + 1;
                break;
            }
            chain.push(c);
            cur = links[c];
        }
        for &c in chain.iter().rev() {
            depth[c] = next_depth;
            next_depth += 1;
        }
    }
    depth
}

/// Groups subset indices into dependency waves, each in subset order.
pub fn waves(subsets: &[Subset]) -> Vec<Vec<usize>> {
    let depth = depths(subsets);
    let levels = depth.iter().copied().max().map_or(0, |d| d + 1);
    let mut out = vec![Vec::new(); levels];
    for (i, &d) in depth.iter().enumerate() {
        out[d].push(i);
    }
    out
}

/// One subset per wave, ordered by distance from the first subset.
pub fn space_filling_order(subsets: &[Subset]) -> Vec<Vec<usize>> {
    let Some(first) = subsets.first() else {
        return Vec::new();
    };
    let (fx, fy) = first.centroid();
    let mut order: Vec<(f64, usize)> = subsets
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let (x, y) = s.centroid();
            ((x - fx).powi(2) + (y - fy).powi(2), i)
        })
        .collect();
    order.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    order.into_iter().map(|(_, i)| vec![i]).collect()
}
