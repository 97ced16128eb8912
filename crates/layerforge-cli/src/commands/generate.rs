use std::fs;

use anyhow::{bail, Context, Result};
use comfy_table::Table as ComfyTable;
use indicatif::{ProgressBar, ProgressStyle};

use layerforge_core::engine::Event;
use layerforge_core::rarity::Summary;

use crate::args::{Cli, GenerateArgs};
use crate::manifest::Manifest;

pub fn run(cli: &Cli, args: &GenerateArgs) -> Result<()> {
    let manifest = Manifest::load(&cli.manifest)?;
    let mut request = manifest.build_request()?;
    if let Some(count) = args.count {
        request.target_count = count;
    }
    if args.seed.is_some() {
        request.seed = args.seed;
    }
    if args.workers.is_some() {
        request.worker_cap = args.workers;
    }

    let images_dir = args.out.join("images");
    let metadata_dir = args.out.join("metadata");
    fs::create_dir_all(&images_dir)
        .with_context(|| format!("failed to create {}", images_dir.display()))?;
    fs::create_dir_all(&metadata_dir)
        .with_context(|| format!("failed to create {}", metadata_dir.display()))?;

    let total = request.target_count;
    let mut run = layerforge_core::run(request).context("project failed validation")?;

    let pb = ProgressBar::new(u64::from(total));
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("=>-"),
    );

    let mut summary: Option<Box<Summary>> = None;
    while let Some(event) = run.next_event() {
        match event {
            Event::ItemReady(item) => {
                let path = images_dir.join(format!("{}.png", item.index));
                fs::write(&path, &item.png_bytes)
                    .with_context(|| format!("failed to write {}", path.display()))?;
                pb.inc(1);
            }
            Event::Progress {
                memory_used_bytes, ..
            } => {
                pb.set_message(format!(
                    "{:.1} MiB in flight",
                    memory_used_bytes as f64 / (1024.0 * 1024.0)
                ));
            }
            Event::Warning { message } => pb.println(format!("⚠ {message}")),
            Event::Error(err) => {
                pb.abandon();
                bail!("generation failed: {err}");
            }
            Event::Cancelled { completed, reason } => {
                pb.abandon();
                bail!("generation cancelled after {completed} items ({reason})");
            }
            Event::Complete(s) => summary = Some(s),
        }
    }
    let summary = summary.context("event stream closed without a summary")?;
    pb.finish_with_message("composited");

    for record in &summary.items {
        let path = metadata_dir.join(format!("{}.json", record.index));
        fs::write(&path, record.metadata_json.as_bytes())
            .with_context(|| format!("failed to write {}", path.display()))?;
    }

    println!(
        "\n✓ {} items written to {}",
        summary.total,
        args.out.display()
    );

    // Rarity leaderboard (top 10 rarest).
    let mut ranked: Vec<_> = summary.items.iter().collect();
    ranked.sort_by_key(|r| r.rank);
    let mut t = ComfyTable::new();
    t.set_header(vec!["Rank", "Item", "Score"]);
    for record in ranked.iter().take(10) {
        t.add_row(vec![
            record.rank.to_string(),
            record.name.clone(),
            format!("{:.2}", record.score),
        ]);
    }
    println!("\nRarest items:\n{t}");

    let mut freq = ComfyTable::new();
    freq.set_header(vec!["Layer", "Trait", "Count", "%"]);
    for f in &summary.trait_frequencies {
        freq.add_row(vec![
            f.layer.clone(),
            f.trait_name.clone(),
            f.count.to_string(),
            format!("{:.1}", f.pct),
        ]);
    }
    println!("\nTrait frequencies:\n{freq}");

    Ok(())
}
