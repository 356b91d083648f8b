//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

use std::{
    net::IpAddr,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::{
    application::{
        render::{
            DEFAULT_ANCHOR_SYMBOL, DEFAULT_THEME, HighlighterSettings, PipelineSettings,
            ShellAssets, ThemeSource,
        },
        watch::{DEFAULT_POLL_INTERVAL, WatchSettings},
    },
    domain::documents::{DocumentRule, RenderMetadata},
    infra::{fs::DEFAULT_RETRY_DELAY, livereload::LiveReloadSettings},
};

pub use cli::{CliArgs, WatchOverrides};

const LOCAL_CONFIG_BASENAME: &str = "isledoc";
const ENV_PREFIX: &str = "ISLEDOC";
const DEFAULT_ROOT: &str = ".";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_DEBOUNCE_MS: u64 = 100;
const DEFAULT_STYLESHEET: &str = "style.css";
const DEFAULT_ICON: &str = "favicon.ico";
pub(crate) const DEFAULT_IGNORE_PATTERNS: [&str; 5] =
    [".git/", "node_modules/", "*.tmp", "*.md", "*.json"];

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub watch: WatchSettings,
    pub logging: LoggingSettings,
    pub render: RenderSettings,
    pub server: ServerSettings,
    /// Per-document rules consulted before the built-in ones.
    pub documents: Vec<DocumentRule>,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub highlighter: HighlighterSettings,
    pub pipeline: PipelineSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub enabled: bool,
    pub live_reload: LiveReloadSettings,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder =
        Config::builder().add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(&cli.overrides);

    Settings::from_raw(raw)
}

/// Resolve configuration using the process arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    watch: RawWatchSettings,
    logging: RawLoggingSettings,
    render: RawRenderSettings,
    server: RawServerSettings,
    documents: Vec<RawDocumentRule>,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &WatchOverrides) {
        if let Some(root) = overrides.root.as_ref() {
            self.watch.root = Some(root.clone());
        }
        if let Some(interval) = overrides.poll_interval_ms {
            self.watch.poll_interval_ms = Some(interval);
        }
        if let Some(host) = overrides.host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.port {
            self.server.port = Some(port);
        }
        if overrides.no_server {
            self.server.enabled = Some(false);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            watch,
            logging,
            render,
            server,
            documents,
        } = raw;

        let watch = build_watch_settings(watch)?;
        let logging = build_logging_settings(logging)?;
        let render = build_render_settings(render)?;
        let server = build_server_settings(server)?;
        let documents = documents
            .into_iter()
            .map(build_document_rule)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            watch,
            logging,
            render,
            server,
            documents,
        })
    }
}

fn build_watch_settings(watch: RawWatchSettings) -> Result<WatchSettings, LoadError> {
    let root = watch.root.unwrap_or_else(|| PathBuf::from(DEFAULT_ROOT));
    let poll_interval = positive_millis(
        watch.poll_interval_ms,
        DEFAULT_POLL_INTERVAL,
        "watch.poll_interval_ms",
    )?;
    let publish_retry = positive_millis(
        watch.publish_retry_ms,
        DEFAULT_RETRY_DELAY,
        "watch.publish_retry_ms",
    )?;

    Ok(WatchSettings {
        root,
        poll_interval,
        publish_retry,
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_render_settings(render: RawRenderSettings) -> Result<RenderSettings, LoadError> {
    let theme = match (render.theme_file, render.theme) {
        (Some(path), _) => ThemeSource::File(path),
        (None, Some(name)) if name.trim().is_empty() => {
            return Err(LoadError::invalid("render.theme", "must not be empty"));
        }
        (None, Some(name)) => ThemeSource::Bundled(name.trim().to_string()),
        (None, None) => ThemeSource::Bundled(DEFAULT_THEME.to_string()),
    };

    let anchor_symbol = render
        .anchor_symbol
        .unwrap_or_else(|| DEFAULT_ANCHOR_SYMBOL.to_string());
    if anchor_symbol.trim().is_empty() {
        return Err(LoadError::invalid(
            "render.anchor_symbol",
            "must not be empty",
        ));
    }

    Ok(RenderSettings {
        highlighter: HighlighterSettings {
            theme,
            grammars_dir: render.grammars_dir,
        },
        pipeline: PipelineSettings {
            anchor_symbol,
            assets: ShellAssets {
                stylesheet: render
                    .stylesheet
                    .unwrap_or_else(|| DEFAULT_STYLESHEET.to_string()),
                icon: render.icon.unwrap_or_else(|| DEFAULT_ICON.to_string()),
            },
        },
    })
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let host = IpAddr::from_str(host.trim()).map_err(|err| {
        LoadError::invalid("server.host", format!("invalid address `{host}`: {err}"))
    })?;

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let ignore = server.ignore.unwrap_or_else(|| {
        DEFAULT_IGNORE_PATTERNS
            .iter()
            .map(|pattern| pattern.to_string())
            .collect()
    });
    let debounce = Duration::from_millis(server.debounce_ms.unwrap_or(DEFAULT_DEBOUNCE_MS));

    Ok(ServerSettings {
        enabled: server.enabled.unwrap_or(true),
        live_reload: LiveReloadSettings {
            host,
            port,
            ignore,
            debounce,
        },
    })
}

fn build_document_rule(raw: RawDocumentRule) -> Result<DocumentRule, LoadError> {
    let source = raw
        .source
        .ok_or_else(|| LoadError::invalid("documents.source", "every document needs a source"))?;
    let stem = Path::new(&source)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(source.as_str())
        .to_string();

    let output = raw.output.unwrap_or_else(|| format!("{stem}.html"));
    let metadata = RenderMetadata::new(
        raw.title.unwrap_or(stem),
        raw.description.unwrap_or_default(),
        raw.author.unwrap_or_default(),
    );

    DocumentRule::new(source, output, metadata)
        .map_err(|err| LoadError::invalid("documents", err.to_string()))
}

fn positive_millis(
    value: Option<u64>,
    default: Duration,
    key: &'static str,
) -> Result<Duration, LoadError> {
    match value {
        Some(0) => Err(LoadError::invalid(key, "must be greater than zero")),
        Some(millis) => Ok(Duration::from_millis(millis)),
        None => Ok(default),
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawWatchSettings {
    root: Option<PathBuf>,
    poll_interval_ms: Option<u64>,
    publish_retry_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRenderSettings {
    theme: Option<String>,
    theme_file: Option<PathBuf>,
    grammars_dir: Option<PathBuf>,
    anchor_symbol: Option<String>,
    stylesheet: Option<String>,
    icon: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    enabled: Option<bool>,
    host: Option<String>,
    port: Option<u16>,
    ignore: Option<Vec<String>>,
    debounce_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDocumentRule {
    source: Option<String>,
    output: Option<String>,
    title: Option<String>,
    description: Option<String>,
    author: Option<String>,
}
