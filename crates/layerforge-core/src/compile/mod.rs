//! # Request Validator
//!
//! Normalizes and validates an incoming [`GenerationRequest`] and derives the
//! tables every later stage reads: layers in canonical paint order with dense
//! indices, per-layer cumulative weight arrays for O(log k) sampling, compiled
//! ruler-rule masks, the layer constraint graph, active strict-pair
//! combinations, and the feasibility upper bound. All validation failures
//! abort here, before any item is generated.

pub mod feasibility;
pub mod graph;

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;

use crate::error::{ForgeError, Result};
use crate::request::{
    CombinationId, GenerationRequest, ImageData, Layer, LayerId, MetadataStandard, OutputSize,
    TraitId,
};
use graph::ConstraintGraph;

/// Default worker pool cap.
pub const DEFAULT_WORKER_CAP: u32 = 4;
/// Default per-item solver restart budget.
pub const DEFAULT_ATTEMPT_BUDGET: u32 = 64;
/// Default cap on composited bytes in flight (256 MiB).
pub const DEFAULT_MEMORY_BUDGET_BYTES: u64 = 256 * 1024 * 1024;

/// A validated request with every derived table the run needs. Immutable and
/// freely shared across workers behind an `Arc`.
pub struct CompiledRequest {
    pub name: String,
    pub description: String,
    pub output_size: OutputSize,
    pub target_count: u32,
    pub metadata_standard: MetadataStandard,
    /// Layers sorted by paint order; positions are the dense layer indices
    /// used everywhere downstream.
    pub layers: Vec<CompiledLayer>,
    /// Active strict-pair rules with sorted dense layer indices.
    pub combinations: Vec<CompiledCombination>,
    pub graph: ConstraintGraph,
    pub feasibility_estimate: u128,
    /// Resolved seed (caller-supplied or OS entropy).
    pub seed: u64,
    pub worker_cap: usize,
    pub attempt_budget: u32,
    pub memory_budget_bytes: u64,
    pub timeout: Option<Duration>,
}

pub struct CompiledLayer {
    pub id: LayerId,
    pub name: String,
    pub order: u32,
    pub optional: bool,
    pub traits: Vec<CompiledTrait>,
    /// Cumulative rarity weights over `traits`, for binary-search sampling
    /// on an unpruned domain.
    pub weight_prefix: Vec<u32>,
}

pub struct CompiledTrait {
    pub id: TraitId,
    pub name: String,
    pub weight: u8,
    pub image: Arc<ImageData>,
    pub rules: Vec<CompiledRule>,
}

/// A ruler rule lowered onto dense indices: boolean masks over the target
/// layer's traits.
pub struct CompiledRule {
    pub target: usize,
    /// True when the source rule's allow-list was empty (any target trait
    /// passes the allow check).
    pub allow_any: bool,
    pub allowed: Vec<bool>,
    pub forbidden: Vec<bool>,
}

impl CompiledRule {
    /// Whether this rule permits the given trait in its target layer.
    pub fn permits(&self, target_trait: usize) -> bool {
        !self.forbidden[target_trait] && (self.allow_any || self.allowed[target_trait])
    }
}

pub struct CompiledCombination {
    pub id: CombinationId,
    /// Dense layer indices, sorted ascending.
    pub layers: Vec<usize>,
}

impl CompiledRequest {
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    pub fn trait_count(&self, layer: usize) -> usize {
        self.layers[layer].traits.len()
    }
}

/// Validate a request and derive all generation tables.
pub fn compile(request: GenerationRequest) -> Result<CompiledRequest> {
    let GenerationRequest {
        name,
        description,
        output_size,
        target_count,
        metadata_standard,
        layers,
        strict_pair_rules,
        seed,
        worker_cap,
        attempt_budget,
        memory_budget_bytes,
        timeout_ms,
    } = request;

    if output_size.width == 0 || output_size.height == 0 {
        return Err(ForgeError::InvalidOutputSize {
            width: output_size.width,
            height: output_size.height,
        });
    }
    if layers.is_empty() {
        return Err(ForgeError::EmptyLayer {
            layer: name.clone(),
        });
    }

    let all_layer_ids: HashSet<LayerId> = layers.iter().map(|l| l.id).collect();

    let mut kept: Vec<Layer> = Vec::with_capacity(layers.len());
    let mut sorted = layers;
    sorted.sort_by_key(|l| l.order);
    for layer in sorted {
        if layer.traits.is_empty() {
            // Empty optional layers contribute no variable.
            if layer.optional {
                continue;
            }
            return Err(ForgeError::EmptyLayer { layer: layer.name });
        }
        kept.push(layer);
    }
    if kept.is_empty() {
        return Err(ForgeError::EmptyLayer {
            layer: name.clone(),
        });
    }

    for layer in &kept {
        for tr in &layer.traits {
            if !(1..=5).contains(&tr.weight) {
                return Err(ForgeError::WeightOutOfRange {
                    trait_name: tr.name.clone(),
                    weight: tr.weight,
                });
            }
            if tr.image.bytes.is_empty()
                || tr.image.width != output_size.width
                || tr.image.height != output_size.height
            {
                return Err(ForgeError::DimensionMismatch {
                    layer: layer.name.clone(),
                    trait_name: tr.name.clone(),
                    actual_width: tr.image.width,
                    actual_height: tr.image.height,
                    expected_width: output_size.width,
                    expected_height: output_size.height,
                });
            }
        }
    }

    let layer_index: IndexMap<LayerId, usize> =
        kept.iter().enumerate().map(|(i, l)| (l.id, i)).collect();
    let trait_index: Vec<IndexMap<TraitId, usize>> = kept
        .iter()
        .map(|l| l.traits.iter().enumerate().map(|(i, t)| (t.id, i)).collect())
        .collect();
    let trait_counts: Vec<usize> = kept.iter().map(|l| l.traits.len()).collect();

    // Lower ruler rules onto dense masks and collect constraint edges.
    let mut edges: Vec<(usize, usize)> = Vec::new();
    let mut lowered: Vec<Vec<Vec<CompiledRule>>> = Vec::with_capacity(kept.len());
    for (li, layer) in kept.iter().enumerate() {
        let mut per_trait = Vec::with_capacity(layer.traits.len());
        for tr in &layer.traits {
            let mut rules = Vec::new();
            for rule in tr.rules() {
                if let Some(overlap) = rule.allowed.iter().find(|id| rule.forbidden.contains(*id)) {
                    return Err(ForgeError::InvalidRule {
                        trait_name: tr.name.clone(),
                        reason: format!(
                            "trait {} is both allowed and forbidden for the same target layer",
                            overlap
                        ),
                    });
                }
                let Some(&target) = layer_index.get(&rule.target_layer) else {
                    if all_layer_ids.contains(&rule.target_layer) {
                        // Targets an empty optional layer that was dropped:
                        // the rule can never fire.
                        continue;
                    }
                    return Err(ForgeError::InvalidRule {
                        trait_name: tr.name.clone(),
                        reason: "targets a layer missing from the request".to_string(),
                    });
                };
                // Self-referential rules are ignored.
                if target == li {
                    continue;
                }

                let tcount = trait_counts[target];
                let mut allowed = vec![false; tcount];
                for id in &rule.allowed {
                    if let Some(&ti) = trait_index[target].get(id) {
                        allowed[ti] = true;
                    }
                }
                let mut forbidden = vec![false; tcount];
                for id in &rule.forbidden {
                    if let Some(&ti) = trait_index[target].get(id) {
                        forbidden[ti] = true;
                    }
                }

                edges.push((li, target));
                rules.push(CompiledRule {
                    target,
                    allow_any: rule.allowed.is_empty(),
                    allowed,
                    forbidden,
                });
            }
            per_trait.push(rules);
        }
        lowered.push(per_trait);
    }

    let graph = ConstraintGraph::build(kept.len(), edges);

    // Move image payloads out of the request without cloning the bytes.
    let mut compiled_layers = Vec::with_capacity(kept.len());
    for (layer, mut rules_for_layer) in kept.into_iter().zip(lowered) {
        let mut traits = Vec::with_capacity(layer.traits.len());
        let mut weight_prefix = Vec::with_capacity(layer.traits.len());
        let mut running = 0u32;
        for (ti, tr) in layer.traits.into_iter().enumerate() {
            running += u32::from(tr.weight);
            weight_prefix.push(running);
            traits.push(CompiledTrait {
                id: tr.id,
                name: tr.name,
                weight: tr.weight,
                image: Arc::new(tr.image),
                rules: std::mem::take(&mut rules_for_layer[ti]),
            });
        }
        compiled_layers.push(CompiledLayer {
            id: layer.id,
            name: layer.name,
            order: layer.order,
            optional: layer.optional,
            traits,
            weight_prefix,
        });
    }

    let mut combinations = Vec::new();
    for combo in strict_pair_rules {
        if !combo.active {
            continue;
        }
        let mut idxs = BTreeSet::new();
        for lid in &combo.layer_ids {
            match layer_index.get(lid) {
                Some(&ix) => {
                    idxs.insert(ix);
                }
                None if all_layer_ids.contains(lid) => {
                    // Projection onto a dropped empty layer is trivially equal
                    // for all items; the remaining layers carry the rule.
                }
                None => {
                    return Err(ForgeError::Other(format!(
                        "strict-pair rule {} references a layer missing from the request",
                        combo.id.0
                    )));
                }
            }
        }
        combinations.push(CompiledCombination {
            id: combo.id,
            layers: idxs.into_iter().collect(),
        });
    }

    let feasibility_estimate = feasibility::estimate(&compiled_layers, &combinations);
    if target_count < 1 || u128::from(target_count) > feasibility_estimate {
        return Err(ForgeError::Infeasible {
            requested: u64::from(target_count),
            upper_bound: feasibility_estimate,
        });
    }

    Ok(CompiledRequest {
        name,
        description,
        output_size,
        target_count,
        metadata_standard,
        layers: compiled_layers,
        combinations,
        graph,
        feasibility_estimate,
        seed: seed.unwrap_or_else(rand::random),
        worker_cap: worker_cap.unwrap_or(DEFAULT_WORKER_CAP).max(1) as usize,
        attempt_budget: attempt_budget.unwrap_or(DEFAULT_ATTEMPT_BUDGET).max(1),
        memory_budget_bytes: memory_budget_bytes.unwrap_or(DEFAULT_MEMORY_BUDGET_BYTES),
        timeout: timeout_ms.map(Duration::from_millis),
    })
}

