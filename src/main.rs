//! CLI entry point for anidl.

use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anidl_core::download::CONNECT_TIMEOUT_SECS;
use anidl_core::subtitles::DEFAULT_SUBTITLE_LANGUAGE;
use anidl_core::{
    AcquisitionResult, Assembler, AudioType, CatalogClient, DEFAULT_CONCURRENCY,
    EpisodeOrchestrator, FfmpegMultiplexer, HttpClient, Multiplexer, PipelineSettings, RunContext,
    SubtitlePolicy, WorkspaceRegistry, resolve_refs,
};
use anyhow::{Context, Result, bail};
use clap::Parser;
use clap::error::ErrorKind;
use tracing::{debug, error, info, warn};

mod cli;
mod config;
mod exit_handler;
mod lookup;
mod picker;

use cli::Args;
use config::{FileConfig, load_default_file_config};
use exit_handler::{ProcessExit, determine_exit_outcome};
use picker::{Picker, StdinPicker};

const DEFAULT_FFMPEG: &str = "ffmpeg";

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ProcessExit::Failure.into(),
            };
        }
    };

    // Priority: RUST_LOG env var > quiet flag > debug flag > verbose flag > default (info)
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(args.default_log_level()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let workspaces = WorkspaceRegistry::new();
    let outcome = tokio::select! {
        result = run(args, workspaces.clone()) => match result {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("{e:#}");
                ProcessExit::Failure
            }
        },
        _ = tokio::signal::ctrl_c() => {
            let removed = workspaces.cleanup_all();
            warn!(removed, "interrupted, temporary workspaces removed");
            // A prompt blocked on stdin would keep runtime shutdown waiting.
            std::process::exit(i32::from(ProcessExit::Interrupted.code()));
        }
    };
    outcome.into()
}

/// Settings after layering defaults < config file < env < flags.
#[derive(Debug)]
struct Resolved {
    api_url: String,
    ffmpeg: String,
    connect_timeout_secs: u64,
    pipeline: PipelineSettings,
}

fn resolve_settings(args: &Args, file: &FileConfig) -> Result<Resolved> {
    let Some(api_url) = args
        .api_url
        .clone()
        .or_else(|| file.api_url.clone())
        .filter(|url| !url.trim().is_empty())
    else {
        bail!(
            "no catalog API URL configured\n  \
             Suggestion: pass --api-url, set ANIDL_API_URL, or add api_url to the config file"
        );
    };

    let concurrency = args
        .threads
        .map(usize::from)
        .or(file.threads)
        .unwrap_or(DEFAULT_CONCURRENCY);
    let segment_timeout = args
        .timeout
        .or(file.segment_timeout_secs)
        .map(Duration::from_secs);

    let pipeline = PipelineSettings {
        output_root: args
            .output_dir
            .clone()
            .or_else(|| file.output_dir.clone())
            .unwrap_or_else(|| PathBuf::from(".")),
        audio: args.audio.or(file.audio).unwrap_or(AudioType::Sub),
        server_keyword: args.server.clone().or_else(|| file.server.clone()),
        resolution_keyword: args.resolution.clone().or_else(|| file.resolution.clone()),
        subtitles: args
            .subtitles
            .clone()
            .or_else(|| file.subtitles.clone())
            .unwrap_or(SubtitlePolicy::Default),
        subtitle_language: file
            .default_subtitle_language
            .clone()
            .unwrap_or_else(|| DEFAULT_SUBTITLE_LANGUAGE.to_string()),
        referer_override: args.referer.clone(),
        concurrency,
        segment_timeout,
        show_progress: !args.quiet && io::stderr().is_terminal(),
        ..PipelineSettings::default()
    };

    Ok(Resolved {
        api_url,
        ffmpeg: args
            .ffmpeg
            .clone()
            .or_else(|| file.ffmpeg.clone())
            .unwrap_or_else(|| DEFAULT_FFMPEG.to_string()),
        connect_timeout_secs: file.connect_timeout_secs.unwrap_or(CONNECT_TIMEOUT_SECS),
        pipeline,
    })
}

async fn run(args: Args, workspaces: WorkspaceRegistry) -> Result<ProcessExit> {
    let loaded = load_default_file_config()?;
    if let Some(path) = &loaded.path {
        debug!(path = %path.display(), loaded = loaded.config.is_some(), "config file");
    }
    let file = loaded.config.unwrap_or_default();
    let settings = resolve_settings(&args, &file)?;

    let multiplexer = Arc::new(FfmpegMultiplexer::new(settings.ffmpeg.clone()));
    if !args.list {
        multiplexer
            .check_available()
            .await
            .with_context(|| format!("multiplexer '{}' is not usable", settings.ffmpeg))?;
    }

    let catalog =
        CatalogClient::with_connect_timeout(&settings.api_url, settings.connect_timeout_secs)
            .context("invalid catalog configuration")?;
    let picker = StdinPicker;

    let anime = lookup::find_anime(&catalog, &picker, args.id.as_deref(), args.anime.as_deref())
        .await?;
    let listing = catalog
        .episodes(&anime.id)
        .await
        .with_context(|| format!("failed to list episodes for '{}'", anime.title))?;
    if listing.episodes.is_empty() {
        bail!("'{}' has no episodes", anime.title);
    }
    info!(title = %anime.title, episodes = listing.episodes.len(), "anime found");

    if args.list {
        println!("{} ({} episodes)", anime.title, listing.episodes.len());
        for episode in &listing.episodes {
            println!("{:>5}  {}", episode.number, episode.title);
        }
        return Ok(ProcessExit::Success);
    }

    let expression = match args.episodes.clone() {
        Some(expr) => expr,
        None => {
            let numbers = listing.numbers();
            let first = numbers.first().copied().unwrap_or_default();
            let last = numbers.last().copied().unwrap_or_default();
            match picker
                .ask(&format!("Episodes to download ({first}-{last}; e.g. 1-3,L2,*)"))
                .await?
            {
                Some(expr) => expr,
                None => bail!("no episode selection given\n  Suggestion: pass --episodes <EXPR>"),
            }
        }
    };

    let (selected, _warnings) = resolve_refs(&expression, &listing.episodes);
    if selected.is_empty() {
        bail!("episode selection '{expression}' matched no episodes");
    }
    info!(selected = selected.len(), expression = %expression, "episodes selected");

    let client = HttpClient::new_with_connect_timeout(settings.connect_timeout_secs);
    let orchestrator = EpisodeOrchestrator::new(
        catalog,
        client,
        Assembler::new(multiplexer),
        settings.pipeline,
    )
    .context("invalid download configuration")?;

    let mut ctx = RunContext::new(workspaces);
    let padding_basis = listing.padding_basis();
    for episode in &selected {
        info!(episode = episode.number, title = %episode.title, "starting episode");
        let result = orchestrator
            .acquire(&mut ctx, &anime.title, episode, padding_basis)
            .await;
        if let AcquisitionResult::Failed(reason) = &result {
            warn!(episode = episode.number, %reason, "episode not downloaded");
        }
    }

    let tally = &ctx.tally;
    info!(
        succeeded = tally.succeeded,
        skipped = tally.skipped,
        failed = tally.failed.len(),
        total = tally.total(),
        "run complete"
    );
    for (number, reason) in &tally.failed {
        error!(episode = number, %reason, "failed");
    }
    Ok(determine_exit_outcome(tally))
}
