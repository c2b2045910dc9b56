//! Configuration loading: built-in defaults, then the config file, then CLI flags.

use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use oa_downloader_core::fetch::{DEFAULT_BASE_DELAY, DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT};
use oa_downloader_core::pipeline::DEFAULT_CONCURRENCY;
use oa_downloader_core::storage::DEFAULT_PUBLIC_BASE_URL;

use crate::cli::BatchArgs;

/// Env var holding the object-store bearer token.
pub const STORAGE_TOKEN_ENV: &str = "OA_STORAGE_TOKEN";

/// Bucket used when none is configured.
pub const DEFAULT_BUCKET: &str = "open-access-publications";

/// Address `serve` binds when none is configured.
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:8080";

/// Attempts per retried strategy step when none is configured.
pub const DEFAULT_MAX_RETRIES: u8 = 5;

/// Values read from the config file. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileConfig {
    /// Working directory for local artifacts.
    pub output_dir: Option<PathBuf>,
    /// Object-store bucket.
    pub bucket: Option<String>,
    /// Maximum concurrent record pipelines (1..=100).
    pub concurrency: Option<u8>,
    /// Attempts per retried strategy step (1..=10).
    pub max_retries: Option<u8>,
    /// Backoff base delay in milliseconds.
    pub base_delay_ms: Option<u64>,
    /// SQLite document store path. Unset keeps status documents in memory.
    pub database_path: Option<PathBuf>,
    /// Root directory of the local object store.
    pub object_store_root: Option<PathBuf>,
    /// GCS-compatible endpoint. Set to upload over HTTP instead of locally.
    pub object_store_endpoint: Option<String>,
    /// Prefix for public artifact links.
    pub public_base_url: Option<String>,
    /// Listen address for `serve`.
    pub bind_address: Option<SocketAddr>,
    pub connect_timeout_secs: Option<u64>,
    pub read_timeout_secs: Option<u64>,
    /// Headless browser executable for the automated session.
    pub browser_path: Option<PathBuf>,
}

impl FileConfig {
    /// Validates config values against runtime and CLI constraints.
    pub fn validate(&self) -> Result<()> {
        if let Some(concurrency) = self.concurrency
            && !(1..=100).contains(&concurrency)
        {
            bail!("Invalid config value for `concurrency`: {concurrency}. Expected range: 1..=100");
        }
        if let Some(max_retries) = self.max_retries
            && !(1..=10).contains(&max_retries)
        {
            bail!("Invalid config value for `max_retries`: {max_retries}. Expected range: 1..=10");
        }
        if let Some(base_delay_ms) = self.base_delay_ms
            && base_delay_ms > 60_000
        {
            bail!(
                "Invalid config value for `base_delay_ms`: {base_delay_ms}. Expected range: 0..=60000"
            );
        }
        validate_timeout_secs("connect_timeout_secs", self.connect_timeout_secs)?;
        validate_timeout_secs("read_timeout_secs", self.read_timeout_secs)?;
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

/// Fully resolved settings for one process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub output_dir: PathBuf,
    pub bucket: String,
    pub concurrency: usize,
    pub max_retries: u32,
    pub base_delay: Duration,
    pub database_path: Option<PathBuf>,
    pub object_store_root: PathBuf,
    pub object_store_endpoint: Option<String>,
    pub public_base_url: String,
    pub bind_address: SocketAddr,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub browser_path: Option<PathBuf>,
    pub storage_token: Option<String>,
}

impl Settings {
    /// Layers `file` and then `flags` over the built-in defaults.
    pub fn resolve(file: Option<&FileConfig>, flags: &BatchArgs) -> Result<Self> {
        let file = file.cloned().unwrap_or_default();

        let output_dir = flags
            .output_dir
            .clone()
            .or(file.output_dir)
            .unwrap_or_else(|| env::temp_dir().join("oa-downloader"));
        let object_store_root = file
            .object_store_root
            .unwrap_or_else(|| output_dir.join("published"));
        let bind_address = match file.bind_address {
            Some(address) => address,
            None => DEFAULT_BIND_ADDRESS
                .parse::<SocketAddr>()
                .context("Invalid built-in bind address")?,
        };

        Ok(Self {
            bucket: flags
                .bucket
                .clone()
                .or(file.bucket)
                .unwrap_or_else(|| DEFAULT_BUCKET.to_string()),
            concurrency: usize::from(
                flags
                    .concurrency
                    .or(file.concurrency)
                    .unwrap_or(u8::try_from(DEFAULT_CONCURRENCY).unwrap_or(2)),
            ),
            max_retries: u32::from(
                flags
                    .max_retries
                    .or(file.max_retries)
                    .unwrap_or(DEFAULT_MAX_RETRIES),
            ),
            base_delay: file
                .base_delay_ms
                .map_or(DEFAULT_BASE_DELAY, Duration::from_millis),
            database_path: file.database_path,
            object_store_root,
            object_store_endpoint: file.object_store_endpoint,
            public_base_url: file
                .public_base_url
                .unwrap_or_else(|| DEFAULT_PUBLIC_BASE_URL.to_string()),
            bind_address,
            connect_timeout: file
                .connect_timeout_secs
                .map_or(DEFAULT_CONNECT_TIMEOUT, Duration::from_secs),
            read_timeout: file
                .read_timeout_secs
                .map_or(DEFAULT_READ_TIMEOUT, Duration::from_secs),
            browser_path: file.browser_path,
            storage_token: env_var_non_empty(STORAGE_TOKEN_ENV),
            output_dir,
        })
    }
}

/// Resolves default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/oa-downloader/config.toml`
/// 2. `$HOME/.config/oa-downloader/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("oa-downloader")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("oa-downloader")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

fn env_var_non_empty(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

/// Loads the config file.
///
/// An explicit path must exist. The default path is optional.
pub fn load_file_config(explicit: Option<&Path>) -> Result<Option<FileConfig>> {
    if let Some(path) = explicit {
        return read_config_file(path).map(Some);
    }
    match resolve_default_config_path() {
        Some(path) if path.exists() => read_config_file(&path).map(Some),
        _ => Ok(None),
    }
}

fn read_config_file(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!(
                "Invalid config syntax on line {}: expected key = value",
                line_index + 1
            );
        };

        let key = raw_key.trim();
        let value = raw_value.trim();
        let invalid = || format!("Invalid `{key}` value on line {}", line_index + 1);

        match key {
            "output_dir" => {
                cfg.output_dir = Some(parse_string_literal(value).with_context(invalid)?.into());
            }
            "bucket" => cfg.bucket = Some(parse_string_literal(value).with_context(invalid)?),
            "concurrency" => cfg.concurrency = Some(parse_integer_u8(value).with_context(invalid)?),
            "max_retries" => cfg.max_retries = Some(parse_integer_u8(value).with_context(invalid)?),
            "base_delay_ms" => {
                cfg.base_delay_ms = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "database_path" => {
                cfg.database_path = Some(parse_string_literal(value).with_context(invalid)?.into());
            }
            "object_store_root" => {
                cfg.object_store_root =
                    Some(parse_string_literal(value).with_context(invalid)?.into());
            }
            "object_store_endpoint" => {
                cfg.object_store_endpoint = Some(parse_string_literal(value).with_context(invalid)?);
            }
            "public_base_url" => {
                cfg.public_base_url = Some(parse_string_literal(value).with_context(invalid)?);
            }
            "bind_address" => {
                let parsed = parse_string_literal(value).with_context(invalid)?;
                cfg.bind_address = Some(parsed.parse::<SocketAddr>().with_context(invalid)?);
            }
            "connect_timeout_secs" => {
                cfg.connect_timeout_secs = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "read_timeout_secs" => {
                cfg.read_timeout_secs = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "browser_path" => {
                cfg.browser_path = Some(parse_string_literal(value).with_context(invalid)?.into());
            }
            unknown => {
                bail!(
                    "Unknown configuration key: '{}' on line {}",
                    unknown,
                    line_index + 1
                );
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

fn parse_integer_u8(raw_value: &str) -> Result<u8> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<u16>()?;
    u8::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u8"))
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
