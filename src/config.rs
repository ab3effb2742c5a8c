//! Component L: configuration loading (§4.L, §6 "Configuration").
//!
//! A `clap`-derived CLI, generalized from the teacher's own CLI layer,
//! with an optional `--config <path>` TOML file. CLI flags override file
//! values, which override built-in defaults -- the same "file, then CLI
//! override" layering used elsewhere in the retrieved corpus's
//! configuration crates.

use crate::metrics::CounterMode;
use clap::Parser;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "wspserve")]
#[command(about = "Read-only HTTP query frontend over a tree of fixed-schema time-series files")]
#[command(version)]
pub struct Cli {
    /// Root directory holding the tree of `.wsp` archive files.
    #[arg(long)]
    pub data_root: Option<PathBuf>,

    /// Optional TOML file providing any of the fields below; CLI flags
    /// take precedence over it.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Hard cap on brace-expansion fanout (§4.B).
    #[arg(long)]
    pub max_globs: Option<usize>,

    /// Latency histogram bucket count (§4.G).
    #[arg(long)]
    pub buckets: Option<usize>,

    /// Index rebuild interval; `0s` disables the builder entirely (§4.C).
    #[arg(long)]
    pub scan_frequency: Option<String>,

    #[arg(long)]
    pub read_timeout: Option<String>,

    #[arg(long)]
    pub idle_timeout: Option<String>,

    #[arg(long)]
    pub write_timeout: Option<String>,

    /// Cumulative or delta counter emission (§4.G).
    #[arg(long, value_enum)]
    pub metrics_as_counters: Option<CounterMode>,

    /// HTTP listen address.
    #[arg(long)]
    pub bind_addr: Option<String>,

    /// `tracing-subscriber` `EnvFilter` directive string.
    #[arg(long)]
    pub log_filter: Option<String>,
}

/// The subset of [`Cli`]'s fields a TOML file may also provide.
#[derive(Debug, Clone, Default, Deserialize)]
struct FileConfig {
    data_root: Option<PathBuf>,
    max_globs: Option<usize>,
    buckets: Option<usize>,
    scan_frequency: Option<String>,
    read_timeout: Option<String>,
    idle_timeout: Option<String>,
    write_timeout: Option<String>,
    metrics_as_counters: Option<CounterModeToml>,
    bind_addr: Option<String>,
    log_filter: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum CounterModeToml {
    Cumulative,
    Delta,
}

impl From<CounterModeToml> for CounterMode {
    fn from(v: CounterModeToml) -> Self {
        match v {
            CounterModeToml::Cumulative => CounterMode::Cumulative,
            CounterModeToml::Delta => CounterMode::Delta,
        }
    }
}

/// Fully resolved configuration, ready to drive the builder and server.
#[derive(Debug, Clone)]
pub struct Config {
    pub data_root: PathBuf,
    pub max_globs: usize,
    pub buckets: usize,
    /// `Duration::ZERO` disables the background index builder (§4.C).
    pub scan_frequency: Duration,
    pub read_timeout: Duration,
    pub idle_timeout: Duration,
    pub write_timeout: Duration,
    pub metrics_as_counters: CounterMode,
    pub bind_addr: SocketAddr,
    pub log_filter: String,
}

impl Config {
    #[must_use]
    pub fn builder_enabled(&self) -> bool {
        self.scan_frequency != Duration::ZERO
    }
}

fn merge<T>(cli: Option<T>, file: Option<T>, default: T) -> T {
    cli.or(file).unwrap_or(default)
}

fn merge_duration(cli: Option<&str>, file: Option<&str>, default: &str) -> anyhow::Result<Duration> {
    let raw = cli.or(file).unwrap_or(default);
    Ok(humantime::parse_duration(raw)?)
}

/// Loads configuration from the process's real command line and, if
/// `--config` is given, the TOML file it points at.
pub fn load() -> anyhow::Result<Config> {
    resolve(Cli::parse())
}

/// Resolves a parsed [`Cli`] (plus whatever TOML file it names) into a
/// final [`Config`], applying CLI-overrides-file-overrides-default layering.
pub fn resolve(cli: Cli) -> anyhow::Result<Config> {
    let file = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .map_err(|e| anyhow::anyhow!("reading config file {}: {e}", path.display()))?;
            toml::from_str(&text)?
        }
        None => FileConfig::default(),
    };

    let data_root = merge(cli.data_root.clone(), file.data_root.clone(), PathBuf::from("."));
    let data_root = PathBuf::from(data_root.to_string_lossy().trim_end_matches('/').to_string());
    let data_root = if data_root.as_os_str().is_empty() { PathBuf::from("/") } else { data_root };
    let max_globs = merge(cli.max_globs, file.max_globs, 1000);
    let buckets = merge(cli.buckets, file.buckets, 10);
    let scan_frequency = merge_duration(cli.scan_frequency.as_deref(), file.scan_frequency.as_deref(), "60s")?;
    let read_timeout = merge_duration(cli.read_timeout.as_deref(), file.read_timeout.as_deref(), "30s")?;
    let idle_timeout = merge_duration(cli.idle_timeout.as_deref(), file.idle_timeout.as_deref(), "60s")?;
    let write_timeout = merge_duration(cli.write_timeout.as_deref(), file.write_timeout.as_deref(), "30s")?;
    let metrics_as_counters = merge(
        cli.metrics_as_counters,
        file.metrics_as_counters.map(CounterMode::from),
        CounterMode::Cumulative,
    );
    let bind_addr_raw = merge(cli.bind_addr.clone(), file.bind_addr.clone(), "127.0.0.1:8080".to_string());
    let bind_addr = bind_addr_raw
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid bind_addr '{bind_addr_raw}': {e}"))?;
    let log_filter = merge(cli.log_filter.clone(), file.log_filter.clone(), "info".to_string());

    Ok(Config {
        data_root,
        max_globs,
        buckets,
        scan_frequency,
        read_timeout,
        idle_timeout,
        write_timeout,
        metrics_as_counters,
        bind_addr,
        log_filter,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bare_cli() -> Cli {
        Cli {
            data_root: None,
            config: None,
            max_globs: None,
            buckets: None,
            scan_frequency: None,
            read_timeout: None,
            idle_timeout: None,
            write_timeout: None,
            metrics_as_counters: None,
            bind_addr: None,
            log_filter: None,
        }
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = resolve(bare_cli()).unwrap();
        assert_eq!(config.max_globs, 1000);
        assert_eq!(config.scan_frequency, Duration::from_secs(60));
        assert!(config.builder_enabled());
    }

    #[test]
    fn data_root_trailing_slash_is_stripped() {
        let mut cli = bare_cli();
        cli.data_root = Some(PathBuf::from("/var/lib/wsp/"));
        let config = resolve(cli).unwrap();
        assert_eq!(config.data_root, PathBuf::from("/var/lib/wsp"));
    }

    #[test]
    fn zero_scan_frequency_disables_the_builder() {
        let mut cli = bare_cli();
        cli.scan_frequency = Some("0s".into());
        let config = resolve(cli).unwrap();
        assert!(!config.builder_enabled());
    }

    #[test]
    fn toml_file_sets_scan_frequency_cli_overrides_max_globs() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("wspserve.toml");
        std::fs::write(&path, "scan_frequency = \"5m\"\nmax_globs = 50\n").unwrap();

        let mut cli = bare_cli();
        cli.config = Some(path);
        cli.max_globs = Some(200);

        let config = resolve(cli).unwrap();
        assert_eq!(config.scan_frequency, Duration::from_secs(300));
        assert_eq!(config.max_globs, 200, "CLI flag must win over the file value");
    }
}
