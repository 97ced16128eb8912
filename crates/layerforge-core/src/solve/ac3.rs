use std::collections::VecDeque;

use crate::compile::CompiledRequest;
use crate::solve::{consistent, Domains};

/// Prune every layer's domain to arc consistency. Arcs are seeded in both
/// directions for every constraint edge. Returns false when a domain wipes
/// out, which makes the whole item (and with an empty ledger, the whole run)
/// infeasible.
pub fn prune(compiled: &CompiledRequest, domains: &mut Domains) -> bool {
    let mut work: VecDeque<(usize, usize)> = VecDeque::new();
    for li in 0..compiled.layer_count() {
        for lj in compiled.graph.neighbors(li) {
            work.push_back((li, lj));
        }
    }
    run(compiled, domains, work)
}

/// Re-establish arc consistency after `layer`'s domain shrank (forward
/// checking after an assignment): only arcs pointing at `layer` are seeded.
pub fn propagate_from(compiled: &CompiledRequest, domains: &mut Domains, layer: usize) -> bool {
    let work = compiled
        .graph
        .neighbors(layer)
        .map(|lk| (lk, layer))
        .collect();
    run(compiled, domains, work)
}

fn run(
    compiled: &CompiledRequest,
    domains: &mut Domains,
    mut work: VecDeque<(usize, usize)>,
) -> bool {
    while let Some((li, lj)) = work.pop_front() {
        if !revise(compiled, domains, li, lj) {
            continue;
        }
        if domains.live(li) == 0 {
            return false;
        }
        for lk in compiled.graph.neighbors(li) {
            if lk != lj {
                work.push_back((lk, li));
            }
        }
    }
    true
}

/// Drop from `domain(li)` every trait with no supporting partner left in
/// `domain(lj)`. Returns true when anything was removed.
fn revise(compiled: &CompiledRequest, domains: &mut Domains, li: usize, lj: usize) -> bool {
    let candidates: Vec<usize> = domains.iter(li).collect();
    let mut removed = false;
    for t in candidates {
        let supported = domains.iter(lj).any(|u| consistent(compiled, li, t, lj, u));
        if !supported {
            domains.remove(li, t);
            removed = true;
        }
    }
    removed
}

