use std::{
    env, fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};
use wadoload_core::{
    DataSetCache, ImageLoader, NativeImageFactory, Part10Parser, SchemeRouter,
    fetch::{FileFetchConfig, HttpFetchConfig},
};

/// Source that produced the loader configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LoaderConfigSource {
    #[default]
    Default,
    EnvPath(PathBuf),
    EnvInline,
    File(PathBuf),
}

/// Data set cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache events buffered per subscriber before slow subscribers start
    /// missing them.
    pub event_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { event_capacity: 64 }
    }
}

/// Everything needed to wire up an [`ImageLoader`] with the default
/// collaborators.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Network fetch for `wadouri` and `dicomweb` ids.
    pub http: HttpFetchConfig,
    /// Local fetch for `dicomfile` ids.
    pub file: FileFetchConfig,
    pub cache: CacheConfig,
}

const CONFIG_PATH_VAR: &str = "WADOLOAD_CONFIG_PATH";
const CONFIG_JSON_VAR: &str = "WADOLOAD_CONFIG_JSON";
const DEFAULT_FILES: &[&str] = &["wadoload.toml", "wadoload.json", "config/wadoload.toml"];

/// Document format of a loader configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    /// `.json` files are JSON, anything else is TOML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Toml,
        }
    }
}

impl LoaderConfig {
    /// Resolve the configuration from the environment, first match wins:
    /// `$WADOLOAD_CONFIG_PATH`, inline JSON in `$WADOLOAD_CONFIG_JSON`,
    /// `wadoload.toml`, `wadoload.json` or `config/wadoload.toml` in the
    /// working directory. Blank variables count as unset.
    pub fn load_from_env() -> anyhow::Result<(Self, LoaderConfigSource)> {
        Self::resolve(non_blank_var(CONFIG_PATH_VAR), non_blank_var(CONFIG_JSON_VAR))
    }

    fn resolve(
        config_path: Option<String>,
        inline_json: Option<String>,
    ) -> anyhow::Result<(Self, LoaderConfigSource)> {
        if let Some(path) = config_path.map(PathBuf::from) {
            let config = Self::load_from_file(&path)
                .with_context(|| format!("${CONFIG_PATH_VAR} is unusable"))?;
            return Ok((config, LoaderConfigSource::EnvPath(path)));
        }

        if let Some(raw) = inline_json {
            let config = Self::parse(&raw, ConfigFormat::Json)
                .with_context(|| format!("failed to parse ${CONFIG_JSON_VAR}"))?;
            return Ok((config, LoaderConfigSource::EnvInline));
        }

        match DEFAULT_FILES.iter().map(Path::new).find(|path| path.is_file()) {
            Some(path) => Ok((
                Self::load_from_file(path)?,
                LoaderConfigSource::File(path.to_path_buf()),
            )),
            None => Ok((Self::default(), LoaderConfigSource::Default)),
        }
    }

    /// Read a configuration file in the format its extension names.
    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path).with_context(|| {
            format!("failed to read loader config from {}", path.display())
        })?;
        Self::parse(&contents, ConfigFormat::from_path(path))
            .with_context(|| format!("invalid loader config {}", path.display()))
    }

    /// Parse a configuration document. Missing fields keep their defaults.
    pub fn parse(contents: &str, format: ConfigFormat) -> anyhow::Result<Self> {
        let config: Self = match format {
            ConfigFormat::Toml => toml::from_str(contents)?,
            ConfigFormat::Json => serde_json::from_str(contents)?,
        };
        Ok(config)
    }

    /// Reject settings the loader cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.http.timeout_ms == 0 {
            bail!("http.timeout_ms must be greater than zero");
        }
        if self.cache.event_capacity == 0 {
            bail!("cache.event_capacity must be greater than zero");
        }
        if let Some(root) = &self.file.root
            && !root.is_dir()
        {
            bail!("file.root {} is not a directory", root.display());
        }
        Ok(())
    }

    /// Build a loader over the HTTP and file fetchers, the Part 10 parser
    /// and the native image factory.
    pub fn build_loader(&self) -> anyhow::Result<ImageLoader> {
        self.validate()?;
        let router = SchemeRouter::from_config(&self.http, &self.file)
            .context("failed to build fetch strategies")?;
        let cache = DataSetCache::with_event_capacity(
            Arc::new(Part10Parser),
            self.cache.event_capacity,
        );
        Ok(ImageLoader::new(router, cache, Arc::new(NativeImageFactory)))
    }
}

fn non_blank_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}
