use clap::{Parser, Subcommand};
use pagefetch::config::Config;
use pagefetch::format::Encoder;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "pagefetch")]
#[command(about = "Fetch and transcode chapter images", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download and transcode every image of a chapter manifest
    Run(RunArgs),
    /// Report whether the output directory already holds the whole chapter
    Check(CheckArgs),
}

#[derive(clap::Args, Debug)]
pub struct BatchArgs {
    /// Chapter manifest (JSON object with "images", or a bare array of URLs)
    #[arg(long)]
    pub manifest: PathBuf,

    /// Destination directory, created if missing
    #[arg(long)]
    pub out: PathBuf,

    /// Configuration file (defaults to $PAGEFETCH_CONFIG or config/pagefetch.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub batch: BatchArgs,

    /// Output encoder: webp, jpeg, png or avif
    #[arg(long)]
    pub format: Option<Encoder>,

    #[arg(long)]
    pub quality: Option<u8>,

    /// Encoder effort (webp 0-6, avif 0-9)
    #[arg(long)]
    pub effort: Option<u8>,

    /// PNG compression level 0-9
    #[arg(long)]
    pub compression_level: Option<u8>,

    /// Lossless webp
    #[arg(long)]
    pub lossless: bool,

    #[arg(long)]
    pub max_concurrent: Option<usize>,

    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Print the batch report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(clap::Args, Debug)]
pub struct CheckArgs {
    #[command(flatten)]
    pub batch: BatchArgs,
}

impl RunArgs {
    /// Flags win over file and environment values.
    pub fn apply(&self, config: &mut Config) {
        if let Some(encoder) = self.format {
            if encoder != config.output.encoder {
                // effort ranges differ per encoder
                config.output.effort = None;
            }
            config.output.encoder = encoder;
        }
        if let Some(quality) = self.quality {
            config.output.quality = quality;
        }
        if let Some(effort) = self.effort {
            config.output.effort = Some(effort);
        }
        if let Some(level) = self.compression_level {
            config.output.compression_level = Some(level);
        }
        if self.lossless {
            config.output.lossless = true;
        }
        if let Some(max_concurrent) = self.max_concurrent {
            config.scheduler.max_concurrent = Some(max_concurrent);
        }
        if let Some(max_retries) = self.max_retries {
            config.scheduler.max_retries = max_retries;
        }
    }
}
