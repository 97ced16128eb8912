use anyhow::Result;
use comfy_table::Table as ComfyTable;

use layerforge_core::request::{Layer, TraitKind};

use crate::args::{Cli, PreviewArgs};
use crate::manifest::Manifest;

/// Display alias for a rarity weight (sampling always uses the raw weight).
fn weight_label(weight: u8) -> &'static str {
    match weight {
        1 => "Mythic",
        2 => "Epic",
        3 => "Rare",
        4 => "Uncommon",
        _ => "Common",
    }
}

pub fn run(cli: &Cli, args: &PreviewArgs) -> Result<()> {
    let manifest = Manifest::load(&cli.manifest)?;
    let request = manifest.build_request()?;

    let mut layers: Vec<&Layer> = request.layers.iter().collect();
    layers.sort_by_key(|l| l.order);

    for layer in &layers {
        let optional = if layer.optional { " (optional)" } else { "" };
        println!(
            "━━━ {} · order {}{} · {} traits ━━━",
            layer.name,
            layer.order,
            optional,
            layer.traits.len()
        );

        let mut t = ComfyTable::new();
        t.set_header(vec!["Trait", "Weight", "Rarity", "Rules"]);
        for tr in &layer.traits {
            let rules = match &tr.kind {
                TraitKind::Normal => 0,
                TraitKind::Ruler(rules) => rules.len(),
            };
            t.add_row(vec![
                tr.name.clone(),
                tr.weight.to_string(),
                weight_label(tr.weight).to_string(),
                rules.to_string(),
            ]);
        }
        println!("{t}\n");

        if args.rules {
            for tr in &layer.traits {
                for rule in tr.rules() {
                    let target = request
                        .layers
                        .iter()
                        .find(|l| l.id == rule.target_layer)
                        .map(|l| l.name.as_str())
                        .unwrap_or("?");
                    println!(
                        "  {} → {}: {} allowed, {} forbidden",
                        tr.name,
                        target,
                        rule.allowed.len(),
                        rule.forbidden.len()
                    );
                }
            }
        }
    }

    if !request.strict_pair_rules.is_empty() {
        println!("strict pairs:");
        for sp in &request.strict_pair_rules {
            let names: Vec<&str> = sp
                .layer_ids
                .iter()
                .filter_map(|id| {
                    request
                        .layers
                        .iter()
                        .find(|l| l.id == *id)
                        .map(|l| l.name.as_str())
                })
                .collect();
            let state = if sp.active { "active" } else { "inactive" };
            println!("  [{}] ({state})", names.join(", "));
        }
    }

    Ok(())
}
