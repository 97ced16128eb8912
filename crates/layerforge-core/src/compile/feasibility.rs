use std::collections::{HashMap, HashSet};

use super::{CompiledCombination, CompiledLayer};

/// Upper bound on the number of distinct items this request can yield.
///
/// The whole combination space is the product of per-layer trait counts,
/// reduced by the largest single layer-pair exclusion that ruler rules
/// provably carve out. Each active strict-pair rule additionally caps the
/// collection at the size of its own projection space, bounded the same way.
/// Subtracting only the largest pair exclusion (rather than summing all of
/// them) keeps the result a true upper bound when exclusions overlap.
pub fn estimate(layers: &[CompiledLayer], combinations: &[CompiledCombination]) -> u128 {
    let counts: Vec<u128> = layers.iter().map(|l| l.traits.len() as u128).collect();
    let exclusions = forbidden_pairs(layers);

    let whole: Vec<usize> = (0..layers.len()).collect();
    let mut bound = space_bound(&counts, &whole, &exclusions);
    for combo in combinations {
        bound = bound.min(space_bound(&counts, &combo.layers, &exclusions));
    }
    bound
}

/// Distinct provably-forbidden (trait, trait) combinations per unordered
/// layer pair, merged across both attachment directions. An allow-list rule
/// contributes every target trait outside the list.
fn forbidden_pairs(
    layers: &[CompiledLayer],
) -> HashMap<(usize, usize), HashSet<(usize, usize)>> {
    let mut pairs: HashMap<(usize, usize), HashSet<(usize, usize)>> = HashMap::new();

    for (li, layer) in layers.iter().enumerate() {
        for (ti, tr) in layer.traits.iter().enumerate() {
            for rule in &tr.rules {
                let lj = rule.target;
                for tj in 0..layers[lj].traits.len() {
                    let blocked = rule.forbidden[tj] || (!rule.allow_any && !rule.allowed[tj]);
                    if !blocked {
                        continue;
                    }
                    let key = if li < lj { (li, lj) } else { (lj, li) };
                    let combo = if li < lj { (ti, tj) } else { (tj, ti) };
                    pairs.entry(key).or_default().insert(combo);
                }
            }
        }
    }

    pairs
}

/// Upper bound on distinct projections onto `subset`.
fn space_bound(
    counts: &[u128],
    subset: &[usize],
    exclusions: &HashMap<(usize, usize), HashSet<(usize, usize)>>,
) -> u128 {
    let product = subset
        .iter()
        .fold(1u128, |acc, &l| acc.saturating_mul(counts[l]));

    let mut largest_cut = 0u128;
    for (i, &a) in subset.iter().enumerate() {
        for &b in &subset[i + 1..] {
            let key = (a.min(b), a.max(b));
            let Some(excluded) = exclusions.get(&key) else {
                continue;
            };
            let rest = subset
                .iter()
                .filter(|&&l| l != a && l != b)
                .fold(1u128, |acc, &l| acc.saturating_mul(counts[l]));
            largest_cut = largest_cut.max((excluded.len() as u128).saturating_mul(rest));
        }
    }

    product.saturating_sub(largest_cut)
}
