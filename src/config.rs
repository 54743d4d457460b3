//! Configuration file loading for CLI defaults.
//!
//! The file is a flat list of `key = value` lines with `#` comments. Strings
//! are double-quoted; numbers are bare.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anidl_core::download::{MAX_CONCURRENCY, MIN_CONCURRENCY};
use anidl_core::{AudioType, SubtitlePolicy};
use anyhow::{Context, Result, bail};

const APP_DIR: &str = "anidl";
const CONFIG_FILE: &str = "config.toml";

/// File-backed defaults. Every field is optional; CLI flags win.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileConfig {
    /// Catalog API base URL.
    pub api_url: Option<String>,
    /// Output root directory.
    pub output_dir: Option<PathBuf>,
    /// Segment concurrency (1..=100).
    pub threads: Option<usize>,
    /// Audio preference.
    pub audio: Option<AudioType>,
    /// Subtitle policy.
    pub subtitles: Option<SubtitlePolicy>,
    /// Resolution keyword.
    pub resolution: Option<String>,
    /// Server keyword.
    pub server: Option<String>,
    /// Overall per-segment timeout in seconds.
    pub segment_timeout_secs: Option<u64>,
    /// Connect timeout in seconds.
    pub connect_timeout_secs: Option<u64>,
    /// Multiplexer binary.
    pub ffmpeg: Option<String>,
    /// Language the default subtitle policy prefers.
    pub default_subtitle_language: Option<String>,
}

impl FileConfig {
    /// Validates values against the same constraints as the CLI.
    pub fn validate(&self) -> Result<()> {
        if let Some(threads) = self.threads
            && !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&threads)
        {
            bail!(
                "Invalid config value for `threads`: {threads}. \
                 Expected range: {MIN_CONCURRENCY}..={MAX_CONCURRENCY}"
            );
        }
        validate_timeout_secs("segment_timeout_secs", self.segment_timeout_secs)?;
        validate_timeout_secs("connect_timeout_secs", self.connect_timeout_secs)?;
        if let Some(api_url) = &self.api_url
            && api_url.trim().is_empty()
        {
            bail!("Invalid config value for `api_url`: must not be empty");
        }
        Ok(())
    }
}

fn validate_timeout_secs(field: &str, value: Option<u64>) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(1..=3600).contains(&value) {
        bail!("Invalid config value for `{field}`: {value}. Expected range: 1..=3600");
    }
    Ok(())
}

/// Loaded config metadata.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Resolved config path if a base directory is known.
    pub path: Option<PathBuf>,
    /// Parsed config when the file exists.
    pub config: Option<FileConfig>,
}

/// Resolves the default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/anidl/config.toml`
/// 2. `$HOME/.config/anidl/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg_config_home).join(APP_DIR).join(CONFIG_FILE));
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join(APP_DIR)
            .join(CONFIG_FILE),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads config from the default path if present.
pub fn load_default_file_config() -> Result<LoadedConfig> {
    let path = resolve_default_config_path();
    let config = match path.as_deref() {
        Some(p) if p.exists() => Some(load_file_config(p)?),
        _ => None,
    };
    Ok(LoadedConfig { path, config })
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line_no = line_index + 1;
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!("Invalid config syntax on line {line_no}: expected key = value");
        };

        let key = raw_key.trim();
        let value = raw_value.trim();
        let string = |field: &str| {
            parse_string_literal(value)
                .with_context(|| format!("Invalid `{field}` value on line {line_no}"))
        };
        let integer = |field: &str| {
            parse_integer_u64(value)
                .with_context(|| format!("Invalid `{field}` value on line {line_no}"))
        };

        match key {
            "api_url" => cfg.api_url = Some(string(key)?),
            "output_dir" => cfg.output_dir = Some(PathBuf::from(string(key)?)),
            "threads" => {
                let parsed = integer(key)?;
                cfg.threads = Some(usize::try_from(parsed).with_context(|| {
                    format!("Invalid `threads` value on line {line_no}")
                })?);
            }
            "audio" => {
                let parsed = string(key)?;
                cfg.audio = Some(parsed.parse::<AudioType>().map_err(|e| {
                    anyhow::anyhow!("Invalid `audio` value '{parsed}' on line {line_no}: {e}")
                })?);
            }
            "subtitles" => {
                let parsed = string(key)?;
                cfg.subtitles = Some(parsed.parse::<SubtitlePolicy>().map_err(|e| {
                    anyhow::anyhow!("Invalid `subtitles` value '{parsed}' on line {line_no}: {e}")
                })?);
            }
            "resolution" => cfg.resolution = Some(string(key)?),
            "server" => cfg.server = Some(string(key)?),
            "segment_timeout_secs" => cfg.segment_timeout_secs = Some(integer(key)?),
            "connect_timeout_secs" => cfg.connect_timeout_secs = Some(integer(key)?),
            "ffmpeg" => cfg.ffmpeg = Some(string(key)?),
            "default_subtitle_language" => {
                cfg.default_subtitle_language = Some(string(key)?);
            }
            unknown => {
                bail!("Unknown configuration key: '{unknown}' on line {line_no}");
            }
        }
    }
    cfg.validate()?;
    Ok(cfg)
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string_literal(raw_value: &str) -> Result<String> {
    if raw_value.len() < 2 || !raw_value.starts_with('"') || !raw_value.ends_with('"') {
        bail!("Expected double-quoted string");
    }
    Ok(raw_value[1..raw_value.len() - 1].to_string())
}

fn parse_integer_u64(raw_value: &str) -> Result<u64> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<i128>()?;
    if value < 0 {
        bail!("Expected non-negative integer");
    }
    u64::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u64"))
}
