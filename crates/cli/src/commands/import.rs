use anyhow::{bail, Context, Result};
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use indicatif::{ProgressBar, ProgressStyle};
use photopoints_core::config::ImportConfig;
use photopoints_core::report::{GroupOutcome, RunReport};
use photopoints_core::{ImportProgress, Importer};
use tracing::debug;

use crate::ImportArgs;

fn active_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "  {bar:30.cyan/blue} {spinner:.green} {pos:>5}/{len:<5} {prefix:.dim} {msg}",
    )
    .unwrap()
    .progress_chars("━╸─")
}

fn done_style() -> ProgressStyle {
    ProgressStyle::with_template("  {bar:30.green} {prefix:.green} {msg:.dim}").unwrap()
}

/// Settings from `--config` (if any) with flags layered on top.
pub(crate) fn build_config(args: ImportArgs) -> Result<ImportConfig> {
    let mut config = match &args.config {
        Some(path) => {
            debug!(path = %path.display(), "loading import config");
            ImportConfig::from_file(path)
                .with_context(|| format!("loading config {}", path.display()))?
        }
        None => {
            let (Some(input), Some(output), Some(key)) = (&args.input, &args.output, &args.key) else {
                bail!("--input, --output and --key are required without --config");
            };
            ImportConfig::new(input, output, key.as_str())
        }
    };

    if let Some(input) = args.input {
        config.input = input;
    }
    if let Some(output) = args.output {
        config.output = output;
    }
    if let Some(key) = args.key {
        config.group_key = key;
    }
    if !args.allow.is_empty() {
        config.allowed_groups = Some(args.allow);
    }
    if args.no_prune {
        config.prune = false;
    }
    debug!(
        input = %config.input.display(),
        output = %config.output.display(),
        key = %config.group_key,
        prune = config.prune,
        "import settings"
    );
    Ok(config)
}

pub fn run(args: ImportArgs) -> Result<RunReport> {
    let config = build_config(args)?;
    let importer = Importer::new(config)?;

    println!();
    println!(
        "  Importing {} grouped by '{}'",
        importer.config().input.display(),
        importer.config().group_key
    );

    let pb = ProgressBar::new(0);
    pb.set_style(active_style());
    pb.set_prefix("Reading");
    pb.enable_steady_tick(std::time::Duration::from_millis(80));

    let result = importer.run(Some(&mut |progress| match progress {
        ImportProgress::ScanComplete { file_count } => pb.set_length(file_count as u64),
        ImportProgress::PhotoRead { path } => {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            pb.set_message(name);
            pb.inc(1);
        }
        ImportProgress::PhotoSkipped { .. } => {}
        ImportProgress::GroupStart { group, records } => {
            if !pb.is_finished() {
                pb.set_style(done_style());
                pb.set_prefix("done");
                pb.finish_with_message(format!("Read {} photos", pb.position()));
            }
            println!("  Merging {records} records into '{group}'");
        }
        ImportProgress::GroupWritten { group, rows, .. } => {
            println!("  Saved '{group}' ({rows} rows)");
        }
        ImportProgress::GroupFailed { group, error } => {
            println!("  Skipped '{group}': {error}");
        }
    }));

    if !pb.is_finished() {
        pb.finish_and_clear();
    }
    let report = result?;

    print_summary(&report);
    Ok(report)
}

fn print_summary(report: &RunReport) {
    println!();
    println!(
        "  {} photos found, {} imported, {} skipped",
        report.photos_seen,
        report.records_built,
        report.skipped.len()
    );

    if report.groups.is_empty() {
        println!();
        return;
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Group"),
        Cell::new("Photos"),
        Cell::new("Rows"),
        Cell::new("New"),
        Cell::new("Updated"),
        Cell::new("Pruned"),
        Cell::new("Store"),
    ]);

    for group in &report.groups {
        let mut row = vec![Cell::new(&group.group), Cell::new(group.records)];
        match &group.outcome {
            GroupOutcome::Written {
                path,
                rows,
                inserted,
                updated,
                pruned,
            } => {
                row.push(Cell::new(rows));
                row.push(Cell::new(inserted).fg(Color::Green));
                row.push(Cell::new(updated));
                row.push(Cell::new(pruned).fg(Color::Yellow));
                row.push(Cell::new(path.display()));
            }
            GroupOutcome::Failed { error } => {
                for _ in 0..4 {
                    row.push(Cell::new("\u{2014}").fg(Color::DarkGrey));
                }
                row.push(Cell::new(error).fg(Color::Red));
            }
        }
        table.add_row(row);
    }

    println!("{table}");
    println!();
}
