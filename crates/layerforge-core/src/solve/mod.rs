//! # Constraint Solver
//!
//! Produces one consistent, not-yet-emitted assignment per call: AC-3 prunes
//! each layer's candidate domain against the ruler-rule constraint graph,
//! then a weighted backtracking search (most-constrained layer first, values
//! drawn by rarity weight from the *pruned* domain) fills in the rest. The
//! uniqueness ledger is consulted at every full assignment; a hit is a local
//! dead end, never a ledger mutation.

pub mod ac3;
pub mod search;

pub use search::solve;

use rand::rngs::StdRng;
use rand::Rng;

use crate::compile::CompiledRequest;

/// A chosen trait index for each compiled layer, in layer order.
pub type Assignment = Vec<usize>;

/// Per-layer candidate sets, represented as trait-index masks with live
/// counts. Cloned at each search node; layers and traits are small dense
/// arrays so the copies stay cheap.
#[derive(Clone)]
pub struct Domains {
    masks: Vec<Vec<bool>>,
    live: Vec<usize>,
}

impl Domains {
    pub fn full(compiled: &CompiledRequest) -> Self {
        let masks: Vec<Vec<bool>> = compiled
            .layers
            .iter()
            .map(|l| vec![true; l.traits.len()])
            .collect();
        let live = masks.iter().map(|m| m.len()).collect();
        Self { masks, live }
    }

    /// Remove a candidate; returns true when it was still live.
    pub fn remove(&mut self, layer: usize, tr: usize) -> bool {
        if self.masks[layer][tr] {
            self.masks[layer][tr] = false;
            self.live[layer] -= 1;
            true
        } else {
            false
        }
    }

    pub fn contains(&self, layer: usize, tr: usize) -> bool {
        self.masks[layer][tr]
    }

    pub fn live(&self, layer: usize) -> usize {
        self.live[layer]
    }

    pub fn iter(&self, layer: usize) -> impl Iterator<Item = usize> + '_ {
        self.masks[layer]
            .iter()
            .enumerate()
            .filter_map(|(i, &kept)| kept.then_some(i))
    }

    /// Collapse a layer to a single candidate.
    pub fn restrict_to(&mut self, layer: usize, tr: usize) {
        for (i, slot) in self.masks[layer].iter_mut().enumerate() {
            *slot = i == tr;
        }
        self.live[layer] = 1;
    }
}

/// Symmetric consistency of two trait picks: rules are attached to one side
/// but collisions are mutual, so both directions are checked.
pub fn consistent(
    compiled: &CompiledRequest,
    li: usize,
    ti: usize,
    lj: usize,
    tj: usize,
) -> bool {
    permits(compiled, li, ti, lj, tj) && permits(compiled, lj, tj, li, ti)
}

fn permits(compiled: &CompiledRequest, li: usize, ti: usize, lj: usize, tj: usize) -> bool {
    compiled.layers[li].traits[ti]
        .rules
        .iter()
        .filter(|r| r.target == lj)
        .all(|r| r.permits(tj))
}

/// Draw a position from `pool` (trait indices within `layer`) by rarity
/// weight. A full pool binary-searches the precomputed prefix sums; a pruned
/// pool accumulates over the surviving weights only, so forbidden traits
/// never skew the distribution.
pub fn draw_weighted(
    compiled: &CompiledRequest,
    layer: usize,
    pool: &[usize],
    rng: &mut StdRng,
) -> usize {
    let traits = &compiled.layers[layer].traits;
    if pool.len() == traits.len() {
        let prefix = &compiled.layers[layer].weight_prefix;
        let total = prefix.last().copied().unwrap_or(0);
        let roll = rng.random_range(0..total);
        return prefix.partition_point(|&p| p <= roll);
    }

    let total: u32 = pool.iter().map(|&t| u32::from(traits[t].weight)).sum();
    let mut roll = rng.random_range(0..total);
    for (pos, &t) in pool.iter().enumerate() {
        let w = u32::from(traits[t].weight);
        if roll < w {
            return pos;
        }
        roll -= w;
    }
    pool.len() - 1
}

