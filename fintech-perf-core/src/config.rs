//! Configuration resolution.
//!
//! Every value is looked up in four tiers, highest first: process-level overrides
//! (`-D key=value` on the command line), environment variables, the
//! `application-performance.properties` file, and a hard-coded default. A tier
//! holding a blank value counts as absent.
use crate::load_profile::{self, InjectionPhase, SlaThresholds};
use crate::{ConfigError, Profile};
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
#[allow(unused_imports)]
use tracing::{debug, error, info, trace, warn};

pub const CONFIG_FILE: &str = "application-performance.properties";

/// Directory searched for [`CONFIG_FILE`] before the built-in locations.
pub const RESOURCES_DIR_ENV: &str = "PERF_RESOURCES_DIR";

pub const DEFAULT_PROFILE: &str = "smoke";
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8080";
pub const DEFAULT_REQUEST_TIMEOUT_MS: i64 = 10_000;
pub const DEFAULT_LOAD_SCALE: i64 = 1;
pub const DEFAULT_DURATION_MULTIPLIER: i64 = 1;

/// Property keys, shared by overrides and the properties file.
pub mod keys {
    pub const PROFILE: &str = "perf.profile";
    pub const API_BASE_URL: &str = "api.baseUrl";
    pub const HTTP_TIMEOUT_MS: &str = "http.timeoutMs";
    pub const LOAD_SCALE: &str = "perf.scale";
    pub const DURATION_MULTIPLIER: &str = "perf.durationMultiplier";
}

/// Environment variable equivalents of [`keys`].
pub mod envs {
    pub const PROFILE: &str = "PERF_PROFILE";
    pub const API_BASE_URL: &str = "API_BASE_URL";
    pub const HTTP_TIMEOUT_MS: &str = "HTTP_TIMEOUT_MS";
    pub const LOAD_SCALE: &str = "PERF_SCALE";
    pub const DURATION_MULTIPLIER: &str = "PERF_DURATION_MULTIPLIER";
}

lazy_static! {
    /// Loaded on first access and never written again.
    static ref FILE_PROPERTIES: Properties = Properties::discover();
}

/// The process-wide properties file, loaded once.
pub fn file_properties() -> &'static Properties {
    &FILE_PROPERTIES
}

/// Flat string key/value map used for every configuration source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties(HashMap<String, String>);

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the Java properties format.
    ///
    /// Keys end at the first unescaped `=`, `:` or whitespace. Lines starting
    /// with `#` or `!` are comments, and a line ending in an odd number of
    /// backslashes continues on the next one. Backslash escapes, including
    /// `\uXXXX`, are decoded. Later duplicates win.
    pub fn parse(text: &str) -> Self {
        let mut properties = Self::new();
        for line in logical_lines(text) {
            let (key, value) = split_entry(&line);
            properties.insert(unescape(key), unescape(value));
        }
        properties
    }

    /// Load a properties file. A missing or unreadable file yields an empty set.
    /// Files that are not valid UTF-8 are read as ISO-8859-1.
    pub fn load(path: &Path) -> Self {
        match std::fs::read(path) {
            Ok(bytes) => {
                debug!("Loaded configuration from {}", path.display());
                Self::parse(&decode(bytes, path))
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                trace!("No configuration file at {}", path.display());
                Self::new()
            }
            Err(err) => {
                warn!("Ignoring unreadable configuration file {}: {err}", path.display());
                Self::new()
            }
        }
    }

    /// Snapshot of the process environment. Variables whose name or value is
    /// not valid unicode are skipped.
    pub fn from_env() -> Self {
        std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
            .collect()
    }

    /// Parse a single `key=value` override argument.
    pub fn parse_override(arg: &str) -> Result<(String, String), ConfigError> {
        match arg.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                Ok((key.trim().to_string(), value.to_string()))
            }
            _ => Err(ConfigError::MalformedOverride(arg.to_string())),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn discover() -> Self {
        search_paths()
            .into_iter()
            .find(|path| path.is_file())
            .map(|path| Self::load(&path))
            .unwrap_or_default()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Properties {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

fn decode(bytes: Vec<u8>, path: &Path) -> String {
    String::from_utf8(bytes).unwrap_or_else(|err| {
        debug!("{} is not UTF-8; reading it as ISO-8859-1", path.display());
        err.into_bytes().into_iter().map(char::from).collect()
    })
}

/// Join continuation lines and drop blanks and comments.
fn logical_lines(text: &str) -> Vec<String> {
    let mut lines = vec![];
    let mut pending: Option<String> = None;

    for raw in text.lines() {
        let line = raw.trim_start();
        if pending.is_none() && (line.is_empty() || line.starts_with('#') || line.starts_with('!')) {
            continue;
        }

        let backslashes = line.chars().rev().take_while(|&c| c == '\\').count();
        let continues = backslashes % 2 == 1;
        let body = if continues { &line[..line.len() - 1] } else { line };

        let mut joined = pending.take().unwrap_or_default();
        joined.push_str(body);
        if continues {
            pending = Some(joined);
        } else {
            lines.push(joined);
        }
    }

    lines.extend(pending);
    lines
}

/// Split a logical line into its raw key and value.
fn split_entry(line: &str) -> (&str, &str) {
    let mut escaped = false;
    let mut end = line.len();
    for (i, c) in line.char_indices() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == '=' || c == ':' || c.is_whitespace() {
            end = i;
            break;
        }
    }

    let rest = line[end..].trim_start();
    let rest = rest
        .strip_prefix(|c: char| c == '=' || c == ':')
        .unwrap_or(rest)
        .trim_start();
    (&line[..end], rest)
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('f') => out.push('\u{c}'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(decoded) => out.push(decoded),
                    // Malformed escapes are kept as written.
                    None => {
                        out.push_str("\\u");
                        out.push_str(&hex);
                    }
                }
            }
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

fn search_paths() -> Vec<PathBuf> {
    let mut paths = vec![];
    if let Some(dir) = std::env::var_os(RESOURCES_DIR_ENV) {
        paths.push(PathBuf::from(dir).join(CONFIG_FILE));
    }
    paths.push(PathBuf::from(CONFIG_FILE));
    paths.push(Path::new("resources").join(CONFIG_FILE));
    paths
}

/// Resolves configuration values across overrides, environment, file and
/// defaults.
///
/// The resolver owns snapshots of the first two sources and borrows the file
/// properties, which in a real process is the cached [`file_properties`].
#[derive(Debug, Clone)]
pub struct ConfigResolver<'a> {
    overrides: Properties,
    env: Properties,
    file: &'a Properties,
}

impl ConfigResolver<'static> {
    /// Resolver over the live process: given overrides, the current environment
    /// and the cached properties file.
    pub fn from_process(overrides: Properties) -> Self {
        Self::new(overrides, Properties::from_env(), file_properties())
    }
}

impl<'a> ConfigResolver<'a> {
    pub fn new(overrides: Properties, env: Properties, file: &'a Properties) -> Self {
        Self {
            overrides,
            env,
            file,
        }
    }

    /// Resolve `key` to a trimmed string, falling back to `default` when no
    /// source holds a non-blank value.
    pub fn resolve(&self, key: &str, env_var: &str, default: &str) -> String {
        self.lookup(key, env_var).unwrap_or(default).trim().to_string()
    }

    /// Like [`Self::resolve`] but parsed as an integer. Unparsable values
    /// silently become `default`.
    pub fn resolve_int(&self, key: &str, env_var: &str, default: i64) -> i64 {
        parse_int(&self.resolve(key, env_var, &default.to_string()), default)
    }

    fn lookup(&self, key: &str, env_var: &str) -> Option<&str> {
        [
            self.overrides.get(key),
            self.env.get(env_var),
            self.file.get(key),
        ]
        .into_iter()
        .flatten()
        .find(|value| !value.trim().is_empty())
    }

    /// Build the immutable run configuration. Fails only on an unsupported
    /// profile name.
    pub fn runtime_config(&self) -> Result<RuntimeConfig, ConfigError> {
        let profile = Profile::parse(&self.resolve(keys::PROFILE, envs::PROFILE, DEFAULT_PROFILE))?;
        let api_base_url = self.resolve(keys::API_BASE_URL, envs::API_BASE_URL, DEFAULT_API_BASE_URL);

        let timeout_ms = sanitize_positive(
            self.resolve_int(keys::HTTP_TIMEOUT_MS, envs::HTTP_TIMEOUT_MS, DEFAULT_REQUEST_TIMEOUT_MS),
            DEFAULT_REQUEST_TIMEOUT_MS,
        );
        let load_scale = sanitize_positive(
            self.resolve_int(keys::LOAD_SCALE, envs::LOAD_SCALE, DEFAULT_LOAD_SCALE),
            DEFAULT_LOAD_SCALE,
        );
        let duration_multiplier = sanitize_positive(
            self.resolve_int(
                keys::DURATION_MULTIPLIER,
                envs::DURATION_MULTIPLIER,
                DEFAULT_DURATION_MULTIPLIER,
            ),
            DEFAULT_DURATION_MULTIPLIER,
        );

        Ok(RuntimeConfig {
            profile,
            api_base_url,
            request_timeout: Duration::from_millis(timeout_ms.unsigned_abs()),
            load_scale: clamp_u32(load_scale),
            duration_multiplier: clamp_u32(duration_multiplier),
        })
    }
}

/// Parse a 32-bit decimal integer with an optional sign, returning `default`
/// on any failure, including values out of `i32` range.
pub fn parse_int(value: &str, default: i64) -> i64 {
    value.trim().parse::<i32>().map(i64::from).unwrap_or(default)
}

/// Replace non-positive values with `default`.
pub fn sanitize_positive(value: i64, default: i64) -> i64 {
    if value > 0 {
        value
    } else {
        default
    }
}

fn clamp_u32(value: i64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

/// Resolved configuration for one process. Built once before any load starts.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    pub profile: Profile,
    pub api_base_url: String,
    pub request_timeout: Duration,
    pub load_scale: u32,
    pub duration_multiplier: u32,
}

impl RuntimeConfig {
    /// Resolve from the live process with the given overrides.
    pub fn load(overrides: Properties) -> Result<Self, ConfigError> {
        ConfigResolver::from_process(overrides).runtime_config()
    }

    pub fn injection(&self) -> Vec<InjectionPhase> {
        load_profile::user_injection(
            self.profile,
            i64::from(self.load_scale),
            i64::from(self.duration_multiplier),
        )
    }

    pub fn thresholds(&self) -> SlaThresholds {
        load_profile::thresholds(self.profile)
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            profile: Profile::default(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS.unsigned_abs()),
            load_scale: 1,
            duration_multiplier: 1,
        }
    }
}

impl fmt::Display for RuntimeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "profile={}, api={}, timeout={}, scale={}, durationMultiplier={}",
            self.profile,
            self.api_base_url,
            humantime::format_duration(self.request_timeout),
            self.load_scale,
            self.duration_multiplier,
        )
    }
}
