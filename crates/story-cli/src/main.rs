use std::path::PathBuf;

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use story_core::config::{DEFAULT_USERNAME, DOWNLOAD_DIR_NAME};
use story_core::ArchiveOptions;

#[derive(Parser)]
#[command(name = "story-archive", version, about = "Save a user's current stories into date folders")]
struct Cli {
    /// Account whose stories to archive
    #[arg(default_value = DEFAULT_USERNAME)]
    username: String,

    /// Download directory (default: ./auto_archive)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let t_total = std::time::Instant::now();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let options = ArchiveOptions::new(
        cli.username,
        cli.output.unwrap_or_else(|| PathBuf::from(DOWNLOAD_DIR_NAME)),
    );

    let pb = ProgressBar::new(0);
    pb.set_style(ProgressStyle::default_bar().template("[{bar:40}] {pos}/{len} {msg}")?);

    let result = story_core::archive_remote(&options, &|_stage, current, total, message| {
        pb.set_length(total);
        pb.set_position(current + 1);
        pb.set_message(message.to_string());
    })?;
    pb.finish_and_clear();

    eprintln!(
        "Done! {} stories, {} downloaded, {} skipped, {} failed ({:.2}s) -> {}",
        result.total_stories,
        result.downloaded,
        result.skipped,
        result.failed,
        t_total.elapsed().as_secs_f64(),
        options.output.display()
    );

    Ok(())
}
