//! Application configuration loading for CLI defaults.
//!
//! The file is a flat list of `key = value` lines. Values set on the command
//! line always win over the file.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::ArgMatches;
use clap::parser::ValueSource;

use chunkfetch_core::fetch::constants::MAX_WORKERS;

use crate::cli::{Args, parse_size};

/// File configuration for chunkfetch defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileConfig {
    /// Default worker budget.
    pub workers: Option<usize>,
    /// Default chunk size in bytes.
    pub chunk_size: Option<u64>,
    /// Default retries per chunk.
    pub retries: Option<u32>,
    /// Default per-request timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Default verbosity mode.
    pub verbosity: Option<VerbositySetting>,
}

impl FileConfig {
    /// Validates config values against the CLI's accepted ranges.
    pub fn validate(&self) -> Result<()> {
        if let Some(workers) = self.workers
            && !(1..=MAX_WORKERS).contains(&workers)
        {
            bail!("Invalid config value for `workers`: {workers}. Expected range: 1..={MAX_WORKERS}");
        }
        if let Some(retries) = self.retries
            && retries > 10
        {
            bail!("Invalid config value for `retries`: {retries}. Expected range: 0..=10");
        }
        if let Some(timeout) = self.timeout_secs
            && !(1..=3600).contains(&timeout)
        {
            bail!("Invalid config value for `timeout_secs`: {timeout}. Expected range: 1..=3600");
        }
        Ok(())
    }
}

/// Supported config verbosity labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerbositySetting {
    Default,
    Verbose,
    Quiet,
    Debug,
}

/// Which flags the user actually typed.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct CliValueSources {
    pub(crate) workers: bool,
    pub(crate) chunk_size: bool,
    pub(crate) retries: bool,
    pub(crate) timeout_secs: bool,
    pub(crate) verbose: bool,
    pub(crate) quiet: bool,
}

impl CliValueSources {
    pub(crate) fn from_matches(matches: &ArgMatches) -> Self {
        Self {
            workers: is_commandline_value(matches, "workers"),
            chunk_size: is_commandline_value(matches, "chunk_size"),
            retries: is_commandline_value(matches, "retries"),
            timeout_secs: is_commandline_value(matches, "timeout_secs"),
            verbose: is_commandline_value(matches, "verbose"),
            quiet: is_commandline_value(matches, "quiet"),
        }
    }
}

fn is_commandline_value(matches: &ArgMatches, id: &str) -> bool {
    matches.value_source(id) == Some(ValueSource::CommandLine)
}

/// Fills every value the user did not pass explicitly from the file config.
pub(crate) fn apply_config_defaults(
    mut args: Args,
    cli_sources: &CliValueSources,
    file_config: Option<&FileConfig>,
) -> Args {
    let Some(file_config) = file_config else {
        return args;
    };

    if !cli_sources.workers
        && let Some(workers) = file_config.workers
    {
        args.workers = workers;
    }
    if !cli_sources.chunk_size
        && let Some(chunk_size) = file_config.chunk_size
    {
        args.chunk_size = chunk_size;
    }
    if !cli_sources.retries
        && let Some(retries) = file_config.retries
    {
        args.retries = retries;
    }
    if !cli_sources.timeout_secs
        && let Some(timeout_secs) = file_config.timeout_secs
    {
        args.timeout_secs = timeout_secs;
    }
    if !cli_sources.verbose
        && !cli_sources.quiet
        && let Some(verbosity) = file_config.verbosity
    {
        match verbosity {
            VerbositySetting::Default => {}
            VerbositySetting::Verbose => args.verbose = 1,
            VerbositySetting::Debug => args.verbose = 2,
            VerbositySetting::Quiet => args.quiet = true,
        }
    }
    args
}

/// Resolves default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/chunkfetch/config.toml`
/// 2. `$HOME/.config/chunkfetch/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("chunkfetch")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("chunkfetch")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads config from the default path if present.
///
/// Returns `Ok(None)` when no config file exists.
pub fn load_default_file_config() -> Result<Option<(PathBuf, FileConfig)>> {
    let Some(path) = resolve_default_config_path() else {
        return Ok(None);
    };
    if !path.exists() {
        return Ok(None);
    }
    let config = load_file_config(&path)?;
    Ok(Some((path, config)))
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
        let line_number = line_index + 1;
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!("Invalid config syntax on line {line_number}: expected key = value");
        };

        let key = raw_key.trim();
        let value = raw_value.trim();

        match key {
            "workers" => {
                let parsed = parse_integer_u64(value)
                    .with_context(|| format!("Invalid `workers` value on line {line_number}"))?;
                let workers = usize::try_from(parsed)
                    .map_err(|_| anyhow::anyhow!("workers out of range for usize"))?;
                cfg.workers = Some(workers);
            }
            "chunk_size" => {
                let parsed = parse_chunk_size(value)
                    .with_context(|| format!("Invalid `chunk_size` value on line {line_number}"))?;
                cfg.chunk_size = Some(parsed);
            }
            "retries" => {
                let parsed = parse_integer_u64(value)
                    .with_context(|| format!("Invalid `retries` value on line {line_number}"))?;
                let retries = u32::try_from(parsed)
                    .map_err(|_| anyhow::anyhow!("retries out of range for u32"))?;
                cfg.retries = Some(retries);
            }
            "timeout_secs" => {
                let parsed = parse_integer_u64(value).with_context(|| {
                    format!("Invalid `timeout_secs` value on line {line_number}")
                })?;
                cfg.timeout_secs = Some(parsed);
            }
            "verbosity" => {
                let parsed = parse_string_literal(value)
                    .with_context(|| format!("Invalid `verbosity` value on line {line_number}"))?;
                cfg.verbosity = Some(parse_verbosity(&parsed).with_context(|| {
                    format!("Invalid `verbosity` value '{parsed}' on line {line_number}")
                })?);
            }
            unknown => {
                bail!("Unknown configuration key: '{unknown}' on line {line_number}");
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

/// Accepts a bare byte count or a quoted size such as `"5M"`.
fn parse_chunk_size(raw_value: &str) -> Result<u64> {
    let token = if raw_value.starts_with('"') {
        parse_string_literal(raw_value)?
    } else {
        raw_value.to_string()
    };
    parse_size(&token).map_err(|e| anyhow::anyhow!(e))
}

fn parse_verbosity(value: &str) -> Result<VerbositySetting> {
    match value {
        "default" => Ok(VerbositySetting::Default),
        "verbose" => Ok(VerbositySetting::Verbose),
        "quiet" => Ok(VerbositySetting::Quiet),
        "debug" => Ok(VerbositySetting::Debug),
        _ => bail!("Expected one of: default, verbose, quiet, debug"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use clap::{CommandFactory, FromArgMatches};

    use super::*;

    fn parse_args(argv: &[&str]) -> (Args, CliValueSources) {
        let matches = Args::command().try_get_matches_from(argv).unwrap();
        let args = Args::from_arg_matches(&matches).unwrap();
        (args, CliValueSources::from_matches(&matches))
    }

    #[test]
    fn test_parse_config_partial_fields() {
        let cfg = parse_config_str(
            r#"
workers = 8
verbosity = "verbose"
"#,
        )
        .expect("partial config should parse");
        assert_eq!(cfg.workers, Some(8));
        assert_eq!(cfg.verbosity, Some(VerbositySetting::Verbose));
        assert!(cfg.chunk_size.is_none());
    }

    #[test]
    fn test_parse_config_all_fields() {
        let cfg = parse_config_str(
            r#"
workers = 16
chunk_size = "8M"
retries = 5
timeout_secs = 60
verbosity = "quiet"
"#,
        )
        .unwrap();
        assert_eq!(
            cfg,
            FileConfig {
                workers: Some(16),
                chunk_size: Some(8 * 1024 * 1024),
                retries: Some(5),
                timeout_secs: Some(60),
                verbosity: Some(VerbositySetting::Quiet),
            }
        );
    }

    #[test]
    fn test_parse_config_bare_chunk_size() {
        let cfg = parse_config_str("chunk_size = 1048576").unwrap();
        assert_eq!(cfg.chunk_size, Some(1_048_576));
    }

    #[test]
    fn test_parse_config_rejects_invalid_workers() {
        let err = parse_config_str("workers = 0").expect_err("invalid workers expected");
        assert!(err.to_string().contains("workers"));

        let err = parse_config_str("workers = 65").expect_err("invalid workers expected");
        assert!(err.to_string().contains("workers"));
    }

    #[test]
    fn test_parse_config_rejects_zero_chunk_size() {
        let err = parse_config_str("chunk_size = 0").expect_err("zero chunk size expected");
        assert!(err.to_string().contains("chunk_size"));
    }

    #[test]
    fn test_parse_config_rejects_retries_over_max() {
        let err = parse_config_str("retries = 11").expect_err("invalid retries expected");
        assert!(err.to_string().contains("retries"));
    }

    #[test]
    fn test_parse_config_rejects_numeric_values_with_trailing_tokens() {
        let err = parse_config_str("workers = 4 trailing").expect_err("expected trailing token error");
        assert!(err.to_string().contains("workers"));
    }

    #[test]
    fn test_parse_config_supports_inline_comments() {
        let cfg = parse_config_str(
            r#"
workers = 4 # parallel ranges
verbosity = "debug" # noisy
"#,
        )
        .expect("config with comments should parse");
        assert_eq!(cfg.workers, Some(4));
        assert_eq!(cfg.verbosity, Some(VerbositySetting::Debug));
    }

    #[test]
    fn test_parse_config_rejects_unknown_keys() {
        let err = parse_config_str("rate_limit = 123").expect_err("unknown key error expected");
        assert!(err.to_string().contains("Unknown configuration key"));
        assert!(err.to_string().contains("rate_limit"));
    }

    #[test]
    fn test_parse_config_rejects_missing_equals() {
        let err = parse_config_str("workers 4").expect_err("syntax error expected");
        assert!(err.to_string().contains("line 1"));
    }

    #[test]
    fn test_load_file_config_reads_from_disk() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "retries = 1\n").unwrap();

        let cfg = load_file_config(&path).unwrap();

        assert_eq!(cfg.retries, Some(1));
    }

    #[test]
    fn test_apply_config_defaults_fills_unset_values() {
        let (args, sources) = parse_args(&["chunkfetch", "https://example.com/f"]);
        let cfg = FileConfig {
            workers: Some(12),
            chunk_size: Some(1024),
            retries: Some(0),
            timeout_secs: Some(5),
            verbosity: Some(VerbositySetting::Quiet),
        };

        let merged = apply_config_defaults(args, &sources, Some(&cfg));

        assert_eq!(merged.workers, 12);
        assert_eq!(merged.chunk_size, 1024);
        assert_eq!(merged.retries, 0);
        assert_eq!(merged.timeout_secs, 5);
        assert!(merged.quiet);
    }

    #[test]
    fn test_apply_config_defaults_cli_wins() {
        let (args, sources) = parse_args(&["chunkfetch", "-w", "2", "-v", "https://example.com/f"]);
        let cfg = FileConfig {
            workers: Some(12),
            verbosity: Some(VerbositySetting::Quiet),
            ..FileConfig::default()
        };

        let merged = apply_config_defaults(args, &sources, Some(&cfg));

        assert_eq!(merged.workers, 2);
        assert_eq!(merged.verbose, 1);
        assert!(!merged.quiet);
    }

    #[test]
    fn test_apply_config_defaults_without_file_is_identity() {
        let (args, sources) = parse_args(&["chunkfetch", "-c", "1M", "https://example.com/f"]);
        let merged = apply_config_defaults(args, &sources, None);
        assert_eq!(merged.chunk_size, 1024 * 1024);
        assert_eq!(merged.workers, 4);
    }
}
