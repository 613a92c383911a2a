use anyhow::Context;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info};

use media_fetch::core::config::PathConfig;
use media_fetch::core::progress_tracker::LoggingProgress;
use media_fetch::core::tools::get_all_tools;
use media_fetch::utils::{format_bytes, init_tracing};
use media_fetch::{load_or_initialize_config, DownloadManager, ProgressObserver, TargetFormat};

#[derive(Parser, Debug)]
#[command(author, version, about = "Download and convert media from the web", long_about = None)]
struct Cli {
    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Root for the download, convert and temp directories
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download a YouTube video, media file, HLS stream or page with an embedded player
    Download { url: String },

    /// Convert a downloaded file to another format
    Convert {
        file: PathBuf,

        /// mp3, wav, mp4 or mkv
        #[arg(short, long)]
        format: TargetFormat,
    },

    /// List every downloaded file
    List,

    /// Show whether ffmpeg and yt-dlp are available
    Tools,
}

/// Terminal progress bar
struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        bar.enable_steady_tick(Duration::from_millis(120));
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] {bytes} {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        Self { bar }
    }
}

impl Drop for BarProgress {
    fn drop(&mut self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressObserver for BarProgress {
    fn on_progress(&self, bytes_done: u64, bytes_total: Option<u64>) {
        if let Some(total) = bytes_total {
            if self.bar.length() != Some(total) {
                self.bar.set_length(total);
                self.bar.set_style(
                    ProgressStyle::with_template(
                        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta}) {msg}",
                    )
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-"),
                );
            }
        }
        self.bar.set_position(bytes_done);
    }

    fn on_segment(&self, completed: usize, total: usize) {
        self.bar.set_message(format!("segment {completed}/{total}"));
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = load_or_initialize_config(cli.config.as_deref());
    if let Some(root) = &cli.data_dir {
        config.paths = PathConfig::under(root);
    }
    config.validate()?;
    config
        .paths
        .setup_directories(chrono::Local::now().date_naive())?;

    info!("{} v{}", media_fetch::NAME, media_fetch::VERSION);

    match cli.command {
        Command::Download { url } => {
            let manager = DownloadManager::new(config).context("Failed to set up downloader")?;
            // Plain log lines when stderr is redirected
            let progress: Box<dyn ProgressObserver> = if std::io::stderr().is_terminal() {
                Box::new(BarProgress::new())
            } else {
                Box::new(LoggingProgress::new(url.clone()))
            };
            let result = manager.handle(&url, progress.as_ref()).await;
            drop(progress);

            let file = result?;
            println!(
                "Download complete ({}): {} ({})",
                file.method,
                file.path.display(),
                format_bytes(file.size_bytes)
            );
        }
        Command::Convert { file, format } => {
            let manager = DownloadManager::new(config).context("Failed to set up converter")?;
            let output = manager.convert(&file, format).await?;
            println!("Conversion successful: {}", output.display());
        }
        Command::List => {
            let manager = DownloadManager::new(config)?;
            let files = manager.list_downloads();
            if files.is_empty() {
                println!("No downloaded files found.");
            }
            let root = &manager.config().paths.download_dir;
            for (i, path) in files.iter().enumerate() {
                let shown = path.strip_prefix(root).unwrap_or(path);
                println!("{:>3}: {}", i + 1, shown.display());
            }
        }
        Command::Tools => {
            for tool in get_all_tools(&config.tools).await {
                match &tool.version {
                    Some(version) => println!("{:<8} {} ({})", tool.name, version, tool.path),
                    None => println!("{:<8} not found ({})", tool.name, tool.path),
                }
            }
        }
    }

    Ok(())
}
