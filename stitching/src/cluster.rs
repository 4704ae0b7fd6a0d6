//! Confidence-threshold clustering of the current working set.
//!
//! Operates purely on working-set *positions*; translating the selected
//! positions back to original indices is the orchestrator's job.

use pano_core::{Error, Result};

/// Union-find over working-set positions.
pub struct DisjointSets {
    parent: Vec<usize>,
}

impl DisjointSets {
    pub fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    pub fn find(&mut self, i: usize) -> usize {
        if self.parent[i] != i {
            self.parent[i] = self.find(self.parent[i]);
        }
        self.parent[i]
    }

    pub fn union(&mut self, i: usize, j: usize) {
        let ri = self.find(i);
        let rj = self.find(j);
        if ri != rj {
            self.parent[ri] = rj;
        }
    }
}

/// Partition working-set positions by match-confidence connectivity and
/// pick the panorama candidate component.
///
/// An edge joins positions `p < q` when either ordered direction's
/// confidence exceeds `threshold`. The winner is the largest connected
/// component, ties broken by the component containing the lowest position.
/// Returns `(selected, rejected)`, both ascending.
///
/// `confidence(p, q)` is queried in position space; the caller maps
/// positions to original indices inside the closure.
pub fn cluster<F>(
    working_len: usize,
    confidence: F,
    threshold: f64,
) -> Result<(Vec<usize>, Vec<usize>)>
where
    F: Fn(usize, usize) -> f64,
{
    let mut sets = DisjointSets::new(working_len);
    for p in 0..working_len {
        for q in p + 1..working_len {
            if confidence(p, q) > threshold || confidence(q, p) > threshold {
                sets.union(p, q);
            }
        }
    }

    // Component stats keyed by root: (size, min position).
    let mut size = vec![0usize; working_len];
    let mut min_pos = vec![usize::MAX; working_len];
    for p in 0..working_len {
        let r = sets.find(p);
        size[r] += 1;
        min_pos[r] = min_pos[r].min(p);
    }

    let mut best_root: Option<usize> = None;
    for r in 0..working_len {
        if size[r] == 0 {
            continue;
        }
        match best_root {
            None => best_root = Some(r),
            Some(b) => {
                if size[r] > size[b] || (size[r] == size[b] && min_pos[r] < min_pos[b]) {
                    best_root = Some(r);
                }
            }
        }
    }

    let Some(best) = best_root else {
        return Err(Error::NoViableCluster);
    };
    if size[best] < 2 {
        return Err(Error::NoViableCluster);
    }

    let mut selected = Vec::with_capacity(size[best]);
    let mut rejected = Vec::with_capacity(working_len - size[best]);
    for p in 0..working_len {
        if sets.find(p) == best {
            selected.push(p);
        } else {
            rejected.push(p);
        }
    }
    Ok((selected, rejected))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Symmetric confidence table for a small synthetic batch.
    fn table(n: usize, edges: &[(usize, usize, f64)]) -> impl Fn(usize, usize) -> f64 + '_ {
        move |p, q| {
            debug_assert!(p < n && q < n);
            edges
                .iter()
                .find(|&&(a, b, _)| (a, b) == (p, q) || (a, b) == (q, p))
                .map(|&(_, _, c)| c)
                .unwrap_or(0.0)
        }
    }

    #[test]
    fn picks_largest_component() {
        let edges = [(0, 1, 2.0), (1, 2, 2.0), (3, 4, 2.0)];
        let (sel, rej) = cluster(5, table(5, &edges), 1.0).unwrap();
        assert_eq!(sel, vec![0, 1, 2]);
        assert_eq!(rej, vec![3, 4]);
    }

    #[test]
    fn tie_broken_by_lowest_position() {
        let edges = [(2, 3, 2.0), (0, 1, 2.0)];
        let (sel, rej) = cluster(4, table(4, &edges), 1.0).unwrap();
        assert_eq!(sel, vec![0, 1]);
        assert_eq!(rej, vec![2, 3]);
    }

    #[test]
    fn no_edges_is_no_viable_cluster() {
        let result = cluster(3, |_, _| 0.0, 1.0);
        assert!(matches!(result, Err(Error::NoViableCluster)));
    }

    #[test]
    fn threshold_is_strict() {
        // Confidence exactly at the threshold does not connect.
        let edges = [(0, 1, 1.0)];
        let result = cluster(2, table(2, &edges), 1.0);
        assert!(matches!(result, Err(Error::NoViableCluster)));
    }

    #[test]
    fn deterministic_for_fixed_input() {
        let edges = [(0, 1, 1.5), (1, 2, 1.2), (3, 4, 1.8), (4, 5, 1.1)];
        let first = cluster(6, table(6, &edges), 1.0).unwrap();
        for _ in 0..10 {
            assert_eq!(cluster(6, table(6, &edges), 1.0).unwrap(), first);
        }
    }

    #[test]
    fn raising_threshold_never_grows_selection() {
        let edges = [
            (0, 1, 1.1),
            (1, 2, 1.6),
            (2, 3, 2.4),
            (3, 4, 0.9),
            (4, 5, 3.0),
        ];
        let mut prev_len = usize::MAX;
        for threshold in [0.5, 1.0, 1.5, 2.0, 2.5, 3.5] {
            let len = match cluster(6, table(6, &edges), threshold) {
                Ok((sel, _)) => sel.len(),
                Err(Error::NoViableCluster) => 0,
                Err(e) => panic!("unexpected error: {e}"),
            };
            assert!(
                len <= prev_len,
                "selection grew from {prev_len} to {len} at threshold {threshold}"
            );
            prev_len = len;
        }
    }

    #[test]
    fn asymmetric_confidence_counts_either_direction() {
        let conf = |p: usize, q: usize| if (p, q) == (1, 0) { 2.0 } else { 0.0 };
        let (sel, rej) = cluster(2, conf, 1.0).unwrap();
        assert_eq!(sel, vec![0, 1]);
        assert!(rej.is_empty());
    }
}
