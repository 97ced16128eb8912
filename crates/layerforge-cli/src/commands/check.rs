use anyhow::{Context, Result};
use serde::Serialize;

use layerforge_core::compile;

use crate::args::{CheckArgs, Cli};
use crate::manifest::Manifest;

#[derive(Serialize)]
struct CheckReport {
    collection: String,
    layers: usize,
    traits: usize,
    rules: usize,
    strict_pairs: usize,
    target_count: u32,
    feasibility_estimate: u128,
}

pub fn run(cli: &Cli, args: &CheckArgs) -> Result<()> {
    let manifest = Manifest::load(&cli.manifest)?;
    let request = manifest.build_request()?;

    let trait_count: usize = request.layers.iter().map(|l| l.traits.len()).sum();
    let rule_count: usize = request
        .layers
        .iter()
        .flat_map(|l| &l.traits)
        .map(|t| t.rules().len())
        .sum();
    let strict_pairs = request.strict_pair_rules.len();
    let target_count = request.target_count;

    let compiled = compile::compile(request).context("project failed validation")?;

    let report = CheckReport {
        collection: compiled.name.clone(),
        layers: compiled.layer_count(),
        traits: trait_count,
        rules: rule_count,
        strict_pairs,
        target_count,
        feasibility_estimate: compiled.feasibility_estimate,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("✓ {} is generatable", report.collection);
    println!("  layers:       {}", report.layers);
    println!("  traits:       {}", report.traits);
    println!("  ruler rules:  {}", report.rules);
    println!("  strict pairs: {}", report.strict_pairs);
    println!(
        "  feasibility:  {} distinct items possible, {} requested",
        report.feasibility_estimate, report.target_count
    );

    Ok(())
}
