//! CLI argument definitions using clap derive macros.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

/// Resolve bibliographic records to open-access PDFs.
///
/// Each record is fetched through direct, publisher-specific and browser-like
/// strategies; fetched PDFs are published, their text extracted, and their
/// status recorded.
#[derive(Parser, Debug)]
#[command(name = "oa-downloader")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (defaults to $XDG_CONFIG_HOME/oa-downloader/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the batch endpoint over HTTP
    Serve {
        /// Listen address, e.g. 0.0.0.0:8080
        #[arg(long, value_name = "ADDR")]
        bind: Option<SocketAddr>,

        #[command(flatten)]
        batch: BatchArgs,
    },

    /// Run one batch payload and print the response JSON
    Run {
        /// Payload file (reads stdin when omitted)
        #[arg(short, long, value_name = "FILE")]
        input: Option<PathBuf>,

        #[command(flatten)]
        batch: BatchArgs,
    },
}

impl Command {
    /// Batch flags shared by every subcommand.
    #[must_use]
    pub fn batch_args(&self) -> &BatchArgs {
        match self {
            Self::Serve { batch, .. } | Self::Run { batch, .. } => batch,
        }
    }
}

/// Flags that override config-file values for a batch.
#[derive(ClapArgs, Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchArgs {
    /// Maximum concurrent record pipelines (1-100)
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub concurrency: Option<u8>,

    /// Attempts per retried strategy step (1-10)
    #[arg(short = 'r', long, value_parser = clap::value_parser!(u8).range(1..=10))]
    pub max_retries: Option<u8>,

    /// Working directory for local artifacts
    #[arg(short = 'o', long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Object-store bucket for published artifacts
    #[arg(short = 'b', long)]
    pub bucket: Option<String>,
}
