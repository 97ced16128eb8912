//! # Rarity & Summary Builder
//!
//! Runs once after the last item: counts how often every trait was actually
//! used, scores each item as the sum of `100 / trait_pct` over its assigned
//! traits, and ranks items by descending score (rank 1 is rarest; ties go
//! to the lower index). The result is the terminal `Summary` carried by the
//! `Complete` event.

use serde::Serialize;

use crate::compile::CompiledRequest;
use crate::error::Result;
use crate::metadata::{self, Attribute};
use crate::request::MetadataStandard;

/// Terminal statistics for a finished run.
#[derive(Debug, Serialize)]
pub struct Summary {
    pub collection: String,
    pub standard: MetadataStandard,
    pub total: u32,
    pub trait_frequencies: Vec<TraitFrequency>,
    /// One record per emitted item, ascending by index.
    pub items: Vec<ItemRecord>,
}

#[derive(Debug, Serialize)]
pub struct TraitFrequency {
    pub layer: String,
    pub trait_name: String,
    pub count: u32,
    pub pct: f64,
}

#[derive(Debug, Serialize)]
pub struct ItemRecord {
    pub index: u32,
    pub name: String,
    pub score: f64,
    pub rank: u32,
    pub attributes: Vec<Attribute>,
    /// Rendered metadata JSON body, byte-stable per the chosen standard.
    pub metadata_json: String,
}

/// Attribute list for an assignment, in layer paint order.
pub fn attributes(compiled: &CompiledRequest, assignment: &[usize]) -> Vec<Attribute> {
    assignment
        .iter()
        .enumerate()
        .map(|(li, &ti)| Attribute {
            trait_type: compiled.layers[li].name.clone(),
            value: compiled.layers[li].traits[ti].name.clone(),
        })
        .collect()
}

/// Build the terminal summary from the recorded assignments.
pub fn build_summary(compiled: &CompiledRequest, items: &[(u32, Vec<usize>)]) -> Result<Summary> {
    let total = items.len() as u32;
    let n = f64::from(total.max(1));

    let mut counts: Vec<Vec<u32>> = compiled
        .layers
        .iter()
        .map(|l| vec![0; l.traits.len()])
        .collect();
    for (_, assignment) in items {
        for (li, &ti) in assignment.iter().enumerate() {
            counts[li][ti] += 1;
        }
    }

    let pct = |li: usize, ti: usize| f64::from(counts[li][ti]) / n * 100.0;

    let scored: Vec<(u32, f64)> = items
        .iter()
        .map(|(index, assignment)| {
            let score: f64 = assignment
                .iter()
                .enumerate()
                .map(|(li, &ti)| 100.0 / pct(li, ti))
                .sum();
            (*index, score)
        })
        .collect();

    // Rank 1 is rarest; equal scores keep the lower index first.
    let mut order: Vec<usize> = (0..scored.len()).collect();
    order.sort_by(|&a, &b| {
        scored[b].1
            .partial_cmp(&scored[a].1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(scored[a].0.cmp(&scored[b].0))
    });
    let mut ranks = vec![0u32; scored.len()];
    for (position, &slot) in order.iter().enumerate() {
        ranks[slot] = position as u32 + 1;
    }

    let mut records = Vec::with_capacity(items.len());
    for (slot, (index, assignment)) in items.iter().enumerate() {
        let attrs = attributes(compiled, assignment);
        let metadata_json = metadata::render_record(
            compiled.metadata_standard,
            &compiled.name,
            &compiled.description,
            *index,
            &attrs,
        )?;
        records.push(ItemRecord {
            index: *index,
            name: metadata::item_name(&compiled.name, *index),
            score: scored[slot].1,
            rank: ranks[slot],
            attributes: attrs,
            metadata_json,
        });
    }
    records.sort_by_key(|r| r.index);

    let mut trait_frequencies = Vec::new();
    for (li, layer) in compiled.layers.iter().enumerate() {
        for (ti, tr) in layer.traits.iter().enumerate() {
            if counts[li][ti] > 0 {
                trait_frequencies.push(TraitFrequency {
                    layer: layer.name.clone(),
                    trait_name: tr.name.clone(),
                    count: counts[li][ti],
                    pct: pct(li, ti),
                });
            }
        }
    }

    Ok(Summary {
        collection: compiled.name.clone(),
        standard: compiled.metadata_standard,
        total,
        trait_frequencies,
        items: records,
    })
}

