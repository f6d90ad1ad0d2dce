//! barmerge CLI: merge and inspect commands.
//!
//! Commands:
//! - `merge`: append newly downloaded bar files onto their archive files
//!   (dry run unless `--confirm` is passed)
//! - `inspect`: list the series a directory holds, with ranges and sizes

use anyhow::{bail, Context, Result};
use barmerge_core::{scan_directory, MergeConfig, MergePlan, Merger, StdoutProgress};
use clap::{Args, Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "barmerge",
    about = "Merge incremental bar downloads into an archive directory"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Append origin files onto matching archive files and rename them.
    Merge {
        /// Directory with the newly downloaded files. Prompted for if missing.
        #[arg(long)]
        origin: Option<PathBuf>,

        /// Archive directory to append to. Prompted for if missing.
        #[arg(long)]
        destination: Option<PathBuf>,

        /// Path to a TOML config file.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Additional origin filenames to skip.
        #[arg(long = "skip")]
        skip: Vec<String>,

        /// Drop the first line of each origin file before appending.
        #[arg(long, default_value_t = false)]
        strip_header: bool,

        #[command(flatten)]
        pattern: PatternArgs,

        /// Actually merge (without this flag, only prints the plan).
        #[arg(long, default_value_t = false)]
        confirm: bool,
    },
    /// List the series in a directory.
    Inspect {
        /// Directory to scan.
        dir: PathBuf,

        #[command(flatten)]
        pattern: PatternArgs,
    },
}

#[derive(Args, Debug, Default)]
struct PatternArgs {
    /// Longest ticker accepted in filenames (default 5).
    #[arg(long)]
    ticker_max_len: Option<usize>,

    /// Match the filename pattern anywhere in the name, not just at the start.
    #[arg(long, default_value_t = false)]
    unanchored: bool,
}

impl PatternArgs {
    fn apply(&self, config: &mut MergeConfig) {
        if let Some(n) = self.ticker_max_len {
            config.pattern.ticker_max_len = n;
        }
        if self.unanchored {
            config.pattern.anchored = false;
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Merge {
            origin,
            destination,
            config,
            skip,
            strip_header,
            pattern,
            confirm,
        } => {
            let mut merge_config = match config {
                Some(path) => MergeConfig::from_file(&path)
                    .with_context(|| format!("loading config {}", path.display()))?,
                None => MergeConfig::default(),
            };
            merge_config.origin = origin.or(merge_config.origin);
            merge_config.destination = destination.or(merge_config.destination);
            merge_config.skip.extend(skip);
            merge_config.strip_source_header |= strip_header;
            pattern.apply(&mut merge_config);

            let stdin = io::stdin();
            prompt_missing_directories(&mut merge_config, &mut stdin.lock(), &mut io::stdout())?;
            run_merge(merge_config, confirm)
        }
        Commands::Inspect { dir, pattern } => {
            let mut config = MergeConfig::default();
            pattern.apply(&mut config);
            run_inspect(&dir, &config)
        }
    }
}

/// Ask on stdin for any directory the flags and config left unset.
fn prompt_missing_directories(
    config: &mut MergeConfig,
    input: &mut impl BufRead,
    output: &mut impl Write,
) -> Result<()> {
    if config.origin.is_none() {
        config.origin = Some(prompt(
            "Enter the origin folder (contents from) path: ",
            input,
            output,
        )?);
    }
    if config.destination.is_none() {
        config.destination = Some(prompt(
            "Enter the destination folder (append to) path: ",
            input,
            output,
        )?);
    }
    Ok(())
}

fn prompt(message: &str, input: &mut impl BufRead, output: &mut impl Write) -> Result<PathBuf> {
    write!(output, "{message}")?;
    output.flush()?;
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        bail!("no input for prompt: {}", message.trim_end());
    }
    let path = line.trim();
    if path.is_empty() {
        bail!("empty path for prompt: {}", message.trim_end());
    }
    Ok(PathBuf::from(path))
}

fn run_merge(config: MergeConfig, confirm: bool) -> Result<()> {
    tracing::debug!(?config, confirm, "resolved merge config");
    let merger = Merger::new(config)?;

    if !confirm {
        let plan = merger.plan()?;
        print_plan(&plan, &merger);
        println!();
        println!("Dry run: pass --confirm to actually merge.");
        if plan.has_failures() {
            std::process::exit(1);
        }
        return Ok(());
    }

    let summary = merger.run(&StdoutProgress)?;
    if !summary.all_succeeded() {
        for err in &summary.failures {
            eprintln!("Error: {err}");
        }
        std::process::exit(1);
    }
    Ok(())
}

fn print_plan(plan: &MergePlan, merger: &Merger) {
    println!("Origin:      {}", merger.origin().display());
    println!("Destination: {}", merger.destination().display());

    if plan.is_empty() {
        println!("Nothing to merge.");
        return;
    }

    println!();
    println!("Planned merges: {}", plan.jobs.len());
    for job in &plan.jobs {
        println!("  {}", job.source);
        if job.renames() {
            println!("    -> {}  =>  {}", job.destination, job.renamed_to);
        } else {
            println!("    -> {}  (name unchanged)", job.destination);
        }
        for other in &job.ambiguous {
            println!("    WARNING: also matches {other} (ignored)");
        }
    }

    if !plan.skipped.is_empty() {
        println!();
        println!("Skipped: {}", plan.skipped.len());
        for s in &plan.skipped {
            println!("  {} ({})", s.file, s.reason);
        }
    }

    if !plan.failures.is_empty() {
        println!();
        println!("Failures: {}", plan.failures.len());
        for e in &plan.failures {
            println!("  {e}");
        }
    }
}

fn run_inspect(dir: &Path, config: &MergeConfig) -> Result<()> {
    let pattern = config.pattern.build()?;
    let inventory = scan_directory(dir, &pattern)?;

    if inventory.entries.is_empty() {
        println!("No series files in {}", dir.display());
    } else {
        let mut entries: Vec<_> = inventory.entries.iter().collect();
        entries.sort_by(|a, b| a.series.key().cmp(&b.series.key()).then(a.file.cmp(&b.file)));

        println!("Directory: {}", dir.display());
        println!("Series files: {}", entries.len());
        println!("Total size: {}", format_size(inventory.total_size()));
        println!();
        println!(
            "{:<8} {:<8} {:<26} {:>10} {:>10}",
            "Ticker", "Bars", "Date Range", "Rows", "Size"
        );
        println!("{}", "-".repeat(66));
        for e in entries {
            let rows = e.rows.map_or_else(|| "?".to_string(), |r| r.to_string());
            let size = e.size_bytes.map_or_else(|| "?".to_string(), format_size);
            println!(
                "{:<8} {:<8} {:<26} {:>10} {:>10}",
                e.series.ticker,
                e.series.bar_size,
                e.date_range(),
                rows,
                size
            );
        }
    }

    for key in inventory.duplicate_keys() {
        println!("WARNING: several files hold series '{key}'; merges here are ambiguous");
    }
    if !inventory.unparseable.is_empty() {
        println!();
        println!("Not series files: {}", inventory.unparseable.len());
        for name in &inventory.unparseable {
            println!("  {name}");
        }
    }
    if !inventory.unusable.is_empty() {
        println!();
        println!("Unreadable entries: {}", inventory.unusable.len());
        for name in &inventory.unusable {
            println!("  {name}");
        }
    }

    Ok(())
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn prompts_only_for_missing_directories() {
        let mut config = MergeConfig {
            origin: Some("downloads".into()),
            ..MergeConfig::default()
        };
        let mut input = Cursor::new(b"  /data/archive \n".to_vec());
        let mut output = Vec::new();

        prompt_missing_directories(&mut config, &mut input, &mut output).unwrap();

        assert_eq!(config.origin, Some(PathBuf::from("downloads")));
        assert_eq!(config.destination, Some(PathBuf::from("/data/archive")));
        let shown = String::from_utf8(output).unwrap();
        assert_eq!(shown, "Enter the destination folder (append to) path: ");
    }

    #[test]
    fn prompts_in_order() {
        let mut config = MergeConfig::default();
        let mut input = Cursor::new(b"from\nto\n".to_vec());
        let mut output = Vec::new();

        prompt_missing_directories(&mut config, &mut input, &mut output).unwrap();

        assert_eq!(config.origin, Some(PathBuf::from("from")));
        assert_eq!(config.destination, Some(PathBuf::from("to")));
    }

    #[test]
    fn empty_or_closed_input_is_an_error() {
        let mut config = MergeConfig::default();
        let mut output = Vec::new();
        assert!(
            prompt_missing_directories(&mut config, &mut Cursor::new(b"\n".to_vec()), &mut output)
                .is_err()
        );
        assert!(
            prompt_missing_directories(&mut config, &mut Cursor::new(Vec::new()), &mut output)
                .is_err()
        );
    }

    #[test]
    fn pattern_flags_override_config() {
        let mut config = MergeConfig::default();
        PatternArgs {
            ticker_max_len: Some(4),
            unanchored: true,
        }
        .apply(&mut config);
        assert_eq!(config.pattern.ticker_max_len, 4);
        assert!(!config.pattern.anchored);

        let mut config = MergeConfig::default();
        PatternArgs::default().apply(&mut config);
        assert_eq!(config.pattern, barmerge_core::PatternConfig::default());
    }

    #[test]
    fn merge_flags_parse() {
        let cli = Cli::try_parse_from([
            "barmerge",
            "merge",
            "--origin",
            "in",
            "--destination",
            "out",
            "--skip",
            "Thumbs.db",
            "--ticker-max-len",
            "4",
            "--confirm",
        ])
        .unwrap();
        match cli.command {
            Commands::Merge {
                origin,
                skip,
                pattern,
                confirm,
                ..
            } => {
                assert_eq!(origin, Some(PathBuf::from("in")));
                assert_eq!(skip, vec!["Thumbs.db".to_string()]);
                assert_eq!(pattern.ticker_max_len, Some(4));
                assert!(confirm);
            }
            Commands::Inspect { .. } => panic!("expected merge"),
        }
    }

    #[test]
    fn size_formatting() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.0 MB");
    }
}
