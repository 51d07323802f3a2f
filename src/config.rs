use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{HarcurlError, Result};

pub const DEFAULT_MATCHER_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_MATCHER_MODEL: &str = "gpt-4o-mini";

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: Option<ServerConfig>,
    #[serde(default)]
    pub session: Option<SessionConfig>,
    #[serde(default)]
    pub matcher: Option<MatcherConfig>,
    #[serde(default)]
    pub replay: Option<ReplayConfig>,
    #[serde(default)]
    pub logging: Option<LoggingConfig>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ServerConfig {
    pub bind: Option<String>,
    pub port: Option<u16>,
    pub max_upload_size: Option<String>,
    pub tls_cert: Option<PathBuf>,
    pub tls_key: Option<PathBuf>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct SessionConfig {
    pub ttl_secs: Option<u64>,
    pub sweep_interval_secs: Option<u64>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct MatcherConfig {
    pub endpoint: Option<String>,
    pub model: Option<String>,
    pub api_key_env: Option<String>,
    pub timeout_secs: Option<u64>,
    pub max_tokens: Option<u32>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ReplayConfig {
    pub timeout_secs: Option<u64>,
    pub max_response_size: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct LoggingConfig {
    pub filter: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct ResolvedConfig {
    pub server: ResolvedServerConfig,
    pub session: ResolvedSessionConfig,
    pub matcher: ResolvedMatcherConfig,
    pub replay: ResolvedReplayConfig,
    pub logging: ResolvedLoggingConfig,
}

#[derive(Clone, Debug, Serialize)]
pub struct ResolvedServerConfig {
    pub bind: String,
    pub port: u16,
    pub max_upload_size: String,
    pub tls_cert: Option<PathBuf>,
    pub tls_key: Option<PathBuf>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ResolvedSessionConfig {
    pub ttl_secs: u64,
    pub sweep_interval_secs: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct ResolvedMatcherConfig {
    pub endpoint: String,
    pub model: String,
    pub api_key_env: String,
    pub timeout_secs: u64,
    pub max_tokens: u32,
}

#[derive(Clone, Debug, Serialize)]
pub struct ResolvedReplayConfig {
    pub timeout_secs: u64,
    pub max_response_size: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct ResolvedLoggingConfig {
    pub filter: String,
}

impl Default for ResolvedServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 3000,
            max_upload_size: "150MB".to_string(),
            tls_cert: None,
            tls_key: None,
        }
    }
}

impl Default for ResolvedSessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 30 * 60,
            sweep_interval_secs: 60,
        }
    }
}

impl Default for ResolvedMatcherConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_MATCHER_ENDPOINT.to_string(),
            model: DEFAULT_MATCHER_MODEL.to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: 120,
            max_tokens: 2048,
        }
    }
}

impl Default for ResolvedReplayConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_response_size: "10MB".to_string(),
        }
    }
}

impl Default for ResolvedLoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl ResolvedConfig {
    pub fn from_config(config: &Config) -> Self {
        let mut resolved = Self::default();
        if let Some(cfg) = &config.server {
            resolved.server.apply(cfg);
        }
        if let Some(cfg) = &config.session {
            resolved.session.apply(cfg);
        }
        if let Some(cfg) = &config.matcher {
            resolved.matcher.apply(cfg);
        }
        if let Some(cfg) = &config.replay {
            resolved.replay.apply(cfg);
        }
        if let Some(cfg) = &config.logging {
            resolved.logging.apply(cfg);
        }
        resolved
    }
}

impl ResolvedServerConfig {
    fn apply(&mut self, cfg: &ServerConfig) {
        if let Some(value) = cfg.bind.clone() {
            self.bind = value;
        }
        if let Some(value) = cfg.port {
            self.port = value;
        }
        if let Some(value) = cfg.max_upload_size.clone() {
            self.max_upload_size = value;
        }
        if let Some(value) = cfg.tls_cert.clone() {
            self.tls_cert = Some(value);
        }
        if let Some(value) = cfg.tls_key.clone() {
            self.tls_key = Some(value);
        }
    }
}

impl ResolvedSessionConfig {
    fn apply(&mut self, cfg: &SessionConfig) {
        if let Some(value) = cfg.ttl_secs {
            self.ttl_secs = value;
        }
        if let Some(value) = cfg.sweep_interval_secs {
            self.sweep_interval_secs = value;
        }
    }
}

impl ResolvedMatcherConfig {
    fn apply(&mut self, cfg: &MatcherConfig) {
        if let Some(value) = cfg.endpoint.clone() {
            self.endpoint = value;
        }
        if let Some(value) = cfg.model.clone() {
            self.model = value;
        }
        if let Some(value) = cfg.api_key_env.clone() {
            self.api_key_env = value;
        }
        if let Some(value) = cfg.timeout_secs {
            self.timeout_secs = value;
        }
        if let Some(value) = cfg.max_tokens {
            self.max_tokens = value;
        }
    }
}

impl ResolvedReplayConfig {
    fn apply(&mut self, cfg: &ReplayConfig) {
        if let Some(value) = cfg.timeout_secs {
            self.timeout_secs = value;
        }
        if let Some(value) = cfg.max_response_size.clone() {
            self.max_response_size = value;
        }
    }
}

impl ResolvedLoggingConfig {
    fn apply(&mut self, cfg: &LoggingConfig) {
        if let Some(value) = cfg.filter.clone() {
            self.filter = value;
        }
    }
}

/// Merge every discovered config file, then `explicit` if given.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let mut config = Config::default();
    for path in config_search_paths()? {
        if !path.exists() {
            continue;
        }
        merge_config(&mut config, read_config_file(&path)?);
    }
    if let Some(path) = explicit {
        merge_config(&mut config, read_config_file(path)?);
    }
    Ok(config)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let contents = fs::read_to_string(path)?;
    parse_config(&contents).map_err(|err| {
        HarcurlError::InvalidArgs(format!(
            "Failed to parse config {}: {}",
            path.display(),
            err
        ))
    })
}

fn parse_config(contents: &str) -> std::result::Result<Config, toml::de::Error> {
    toml::from_str(contents)
}

fn merge_config(base: &mut Config, other: Config) {
    merge_section(&mut base.server, other.server, ServerConfig::merge);
    merge_section(&mut base.session, other.session, SessionConfig::merge);
    merge_section(&mut base.matcher, other.matcher, MatcherConfig::merge);
    merge_section(&mut base.replay, other.replay, ReplayConfig::merge);
    merge_section(&mut base.logging, other.logging, LoggingConfig::merge);
}

fn merge_section<T>(base: &mut Option<T>, other: Option<T>, merge: fn(&mut T, T)) {
    if let Some(other_section) = other {
        match base {
            Some(existing) => merge(existing, other_section),
            None => *base = Some(other_section),
        }
    }
}

impl ServerConfig {
    fn merge(&mut self, other: ServerConfig) {
        merge_opt(&mut self.bind, other.bind);
        merge_opt(&mut self.port, other.port);
        merge_opt(&mut self.max_upload_size, other.max_upload_size);
        merge_opt(&mut self.tls_cert, other.tls_cert);
        merge_opt(&mut self.tls_key, other.tls_key);
    }
}

impl SessionConfig {
    fn merge(&mut self, other: SessionConfig) {
        merge_opt(&mut self.ttl_secs, other.ttl_secs);
        merge_opt(&mut self.sweep_interval_secs, other.sweep_interval_secs);
    }
}

impl MatcherConfig {
    fn merge(&mut self, other: MatcherConfig) {
        merge_opt(&mut self.endpoint, other.endpoint);
        merge_opt(&mut self.model, other.model);
        merge_opt(&mut self.api_key_env, other.api_key_env);
        merge_opt(&mut self.timeout_secs, other.timeout_secs);
        merge_opt(&mut self.max_tokens, other.max_tokens);
    }
}

impl ReplayConfig {
    fn merge(&mut self, other: ReplayConfig) {
        merge_opt(&mut self.timeout_secs, other.timeout_secs);
        merge_opt(&mut self.max_response_size, other.max_response_size);
    }
}

impl LoggingConfig {
    fn merge(&mut self, other: LoggingConfig) {
        merge_opt(&mut self.filter, other.filter);
    }
}

fn merge_opt<T>(base: &mut Option<T>, other: Option<T>) {
    if other.is_some() {
        *base = other;
    }
}

fn config_search_paths() -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();

    if let Some(home) = home_dir() {
        if let Some(config_home) = config_home_dir(&home) {
            paths.push(config_home.join("harcurl").join("harcurl.toml"));
        }
        if let Some(appdata) = env::var_os("APPDATA") {
            paths.push(PathBuf::from(appdata).join("harcurl").join("harcurl.toml"));
        }
        paths.push(home.join(".harcurlrc"));
    }

    if let Ok(cwd) = env::current_dir() {
        let mut dirs = Vec::new();
        let mut current: Option<&Path> = Some(cwd.as_path());
        while let Some(dir) = current {
            dirs.push(dir.to_path_buf());
            current = dir.parent();
        }
        dirs.reverse();
        for dir in dirs {
            paths.push(dir.join(".harcurlrc"));
            paths.push(dir.join("harcurl.toml"));
        }
    }

    Ok(paths)
}

fn config_home_dir(home: &Path) -> Option<PathBuf> {
    if let Some(xdg) = env::var_os("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg));
    }
    Some(home.join(".config"))
}

fn home_dir() -> Option<PathBuf> {
    env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(|| env::var_os("USERPROFILE").map(PathBuf::from))
}

pub fn render_config(config: &ResolvedConfig) -> Result<String> {
    toml::to_string_pretty(config)
        .map_err(|err| HarcurlError::InvalidArgs(format!("Failed to render config: {}", err)))
}
