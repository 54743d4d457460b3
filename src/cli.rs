//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use anidl_core::{AudioType, SubtitlePolicy};
use clap::Parser;

/// Download anime episodes and assemble them into local video files.
///
/// Episodes are looked up in a catalog API, fetched segment by segment, and
/// concatenated with ffmpeg into `<output>/<anime>/Episode_<n>_<title>.mp4`.
#[derive(Parser, Debug)]
#[command(name = "anidl")]
#[command(author, version, about)]
pub struct Args {
    /// Search the catalog by title
    #[arg(short = 'a', long, conflicts_with = "id")]
    pub anime: Option<String>,

    /// Catalog anime id (skips search)
    #[arg(short = 'i', long)]
    pub id: Option<String>,

    /// Episode selection, e.g. "1-3,7,L2,!5" (prompted when omitted)
    #[arg(short = 'e', long, allow_hyphen_values = true)]
    pub episodes: Option<String>,

    /// Prefer servers whose name contains this keyword
    #[arg(short = 's', long)]
    pub server: Option<String>,

    /// Prefer variants whose resolution label contains this keyword (e.g. 720)
    #[arg(short = 'r', long)]
    pub resolution: Option<String>,

    /// Audio type: sub or dub [default: sub]
    #[arg(short = 'o', long)]
    pub audio: Option<AudioType>,

    /// Subtitles: none, default, all, or a comma list of languages [default: default]
    #[arg(short = 'L', long)]
    pub subtitles: Option<SubtitlePolicy>,

    /// Concurrent segment downloads (1-100) [default: 16]
    #[arg(short = 't', long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub threads: Option<u8>,

    /// Overall timeout per segment request in seconds (1-3600)
    #[arg(short = 'T', long, value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub timeout: Option<u64>,

    /// List episodes and exit without downloading
    #[arg(short = 'l', long)]
    pub list: bool,

    /// Enable debug logging
    #[arg(short = 'd', long)]
    pub debug: bool,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Output root directory [default: .]
    #[arg(short = 'O', long)]
    pub output_dir: Option<PathBuf>,

    /// Catalog API base URL
    #[arg(long, env = "ANIDL_API_URL")]
    pub api_url: Option<String>,

    /// Referer sent with media requests, replacing the catalog's
    #[arg(long)]
    pub referer: Option<String>,

    /// Multiplexer binary [default: ffmpeg]
    #[arg(long)]
    pub ffmpeg: Option<String>,
}

impl Args {
    /// Default log level from flags. `RUST_LOG` still takes precedence.
    ///
    /// Priority: quiet > debug > verbose count > info.
    #[must_use]
    pub fn default_log_level(&self) -> &'static str {
        if self.quiet {
            "error"
        } else if self.debug {
            "debug"
        } else {
            match self.verbose {
                0 => "info",
                1 => "debug",
                _ => "trace",
            }
        }
    }
}
