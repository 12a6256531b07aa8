//! The `lightbox build` command.

use clap::Args;
use console::Style;
use indicatif::{ProgressBar, ProgressStyle};
use lightbox_core::{Config, GalleryBuilder, GalleryReport, ItemResult};
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Arguments for the `build` command.
#[derive(Args, Debug, Default)]
pub struct BuildArgs {
    /// Source photograph tree (overrides `general.source_dir`)
    #[arg(short, long, env = "LIGHTBOX_SOURCE")]
    pub source: Option<PathBuf>,

    /// Generated image root (overrides `general.output_dir`)
    #[arg(short, long, env = "LIGHTBOX_OUTPUT")]
    pub output: Option<PathBuf>,

    /// Record repository (overrides `general.repository_dir`)
    #[arg(short, long, env = "LIGHTBOX_REPOSITORY")]
    pub repository: Option<PathBuf>,

    /// Number of items processed concurrently
    #[arg(short, long)]
    pub parallel: Option<usize>,

    /// Write records without committing them
    #[arg(long)]
    pub no_commit: bool,
}

impl BuildArgs {
    /// Apply command-line overrides on top of the loaded config.
    fn apply(&self, config: &mut Config) {
        if let Some(source) = &self.source {
            config.general.source_dir = source.clone();
        }
        if let Some(output) = &self.output {
            config.general.output_dir = output.clone();
        }
        if let Some(repository) = &self.repository {
            config.general.repository_dir = repository.clone();
        }
        if let Some(parallel) = self.parallel {
            config.build.parallel_workers = parallel;
        }
        if self.no_commit {
            config.store.commit = false;
        }
    }
}

/// Execute the build command.
pub async fn execute(mut config: Config, args: BuildArgs) -> anyhow::Result<()> {
    args.apply(&mut config);
    config.validate()?;

    let source_dir = config.source_dir();
    if !source_dir.is_dir() {
        anyhow::bail!("Source directory not found: {}", source_dir.display());
    }

    let builder = GalleryBuilder::from_config(config);
    let progress = create_progress_bar();
    let start = Instant::now();

    let result = builder
        .process_gallery_with(|item| {
            progress.inc(1);
            match item {
                ItemResult::Ok(outcome) => progress.set_message(format!(
                    "{} ({})",
                    outcome.url_safe_path, outcome.decision
                )),
                ItemResult::ItemFailed(path, _) => progress.set_message(format!("{path} (failed)")),
                ItemResult::FatalAbort(_) => progress.set_message("aborting"),
            }
        })
        .await;
    progress.finish_and_clear();

    let report = result?;
    print_summary(&report, start.elapsed());
    Ok(())
}

/// Spinner with a running count; the item total isn't known until the scan ends.
fn create_progress_bar() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {pos} item(s) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.enable_steady_tick(Duration::from_millis(120));
    pb.set_message("scanning...");
    pb
}

/// Print a formatted summary table after a build.
fn print_summary(report: &GalleryReport, elapsed: Duration) {
    let label = Style::new().for_stderr().bold();
    let red = Style::new().for_stderr().red();
    let dim = Style::new().for_stderr().dim();

    eprintln!();
    eprintln!("  ====================================");
    eprintln!("               Summary");
    eprintln!("  ====================================");
    eprintln!("    {:<14}{:>8}", label.apply_to("Discovered:"), report.discovered);
    eprintln!("    {:<14}{:>8}", label.apply_to("Built:"), report.built);
    eprintln!("    {:<14}{:>8}", label.apply_to("Rebuilt:"), report.rebuilt);
    eprintln!("    {:<14}{:>8}", label.apply_to("Metadata:"), report.metadata_refreshed);
    eprintln!("    {:<14}{:>8}", label.apply_to("Unchanged:"), report.unchanged);
    if report.failed > 0 {
        eprintln!("    {:<14}{:>8}", red.apply_to("Failed:"), report.failed);
    }
    eprintln!("  ------------------------------------");
    eprintln!("    {:<14}{:>8}", label.apply_to("Written:"), report.written);
    eprintln!("    {:<14}{:>7.1}s", label.apply_to("Duration:"), elapsed.as_secs_f64());
    eprintln!("  ====================================");

    if !report.broken.is_empty() {
        eprintln!();
        eprintln!("  {}", red.apply_to("Broken items:"));
        for (path, reason) in report.broken.entries() {
            eprintln!("    {path}  {}", dim.apply_to(reason));
        }
    }
}
