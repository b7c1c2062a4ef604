//! Configuration loading and validation.
//!
//! Settings live in a single `config.toml` in the config directory
//! (`--config-dir`, default `.`). Stock defaults are serialized to a TOML
//! table, the user file is merged on top key by key, and the result is
//! deserialized and validated. A missing file means stock defaults.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [provider]
//! kind = "cloudflare"       # cloudflare | accelerated-domains | imgix | bunny
//! # subdomain = "acme"      # required for imgix and bunny
//!
//! [srcset]
//! multipliers = [0.25, 0.5, 1.0, 1.5, 2.0, 2.5]
//! min_width = 300
//! max_width = 2400
//! max_gap = 200             # 0 disables gap filling
//!
//! [transform]
//! quality = 85
//!
//! [transform.args]          # extra args applied to every URL
//! # sharpen = 1
//!
//! [dimensions]
//! document_root = ""        # where URL paths resolve for header inspection
//! max_inspect_bytes = 1048576
//!
//! [dimensions.sizes]        # named sizes for `size-<name>` classes
//! thumbnail = [150, 150]
//! medium = [300, 300]
//! medium_large = [768, 768]
//! large = [1024, 1024]
//!
//! [dimensions.images]       # sizes of specific image URLs
//! # "/uploads/hero.jpg" = [1920, 1080]
//!
//! [processing]
//! max_processes = 4         # Max parallel workers (omit for auto = CPU cores)
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::transform::{
    Dimensions, FileInspector, Provider, SizeRegistry, TransformArgs, WidthPolicy,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Everything the pipeline needs, loaded from `config.toml`.
///
/// All fields have defaults. User config files need only specify the values
/// they want to override. Unknown keys are rejected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EdgeConfig {
    /// Which transformation endpoint URLs are built for.
    pub provider: ProviderConfig,
    /// Width planning for `srcset`.
    pub srcset: WidthPolicy,
    /// Arguments applied to every transformation.
    pub transform: TransformConfig,
    /// Dimension resolution for markup without width/height.
    pub dimensions: DimensionsConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
}

impl EdgeConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.provider.to_provider()?;

        let srcset = &self.srcset;
        if srcset.min_width == 0 {
            return Err(ConfigError::Validation(
                "srcset.min_width must be greater than 0".into(),
            ));
        }
        if srcset.min_width > srcset.max_width {
            return Err(ConfigError::Validation(
                "srcset.min_width must not exceed srcset.max_width".into(),
            ));
        }
        if srcset.multipliers.is_empty() {
            return Err(ConfigError::Validation(
                "srcset.multipliers must not be empty".into(),
            ));
        }
        if srcset
            .multipliers
            .iter()
            .any(|m| !(m.is_finite() && *m > 0.0))
        {
            return Err(ConfigError::Validation(
                "srcset.multipliers must all be positive".into(),
            ));
        }

        if !(1..=100).contains(&self.transform.quality) {
            return Err(ConfigError::Validation(
                "transform.quality must be 1-100".into(),
            ));
        }
        let (_, rejected) = TransformArgs::parse_raw(self.transform.raw_args());
        if let Some(err) = rejected.first() {
            return Err(ConfigError::Validation(format!("transform.args: {err}")));
        }

        if self.dimensions.max_inspect_bytes == 0 {
            return Err(ConfigError::Validation(
                "dimensions.max_inspect_bytes must be greater than 0".into(),
            ));
        }
        for (table, entries) in [
            ("sizes", &self.dimensions.sizes),
            ("images", &self.dimensions.images),
        ] {
            if let Some((name, _)) = entries.iter().find(|(_, [w, h])| *w == 0 || *h == 0) {
                return Err(ConfigError::Validation(format!(
                    "dimensions.{table}.{name} values must be non-zero"
                )));
            }
        }
        Ok(())
    }
}

/// Supported transformation endpoints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    #[default]
    Cloudflare,
    AcceleratedDomains,
    Imgix,
    Bunny,
}

/// `[provider]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    /// Account subdomain for imgix (`<sub>.imgix.net`) and bunny (`<sub>.b-cdn.net`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subdomain: Option<String>,
}

impl ProviderConfig {
    pub fn to_provider(&self) -> Result<Provider, ConfigError> {
        let subdomain = || -> Result<String, ConfigError> {
            let sub = self.subdomain.as_deref().unwrap_or("").trim();
            if sub.is_empty() {
                return Err(ConfigError::Validation(
                    "provider.subdomain is required for imgix and bunny".into(),
                ));
            }
            if !sub
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-')
            {
                return Err(ConfigError::Validation(format!(
                    "provider.subdomain {sub:?} may only contain letters, digits and '-'"
                )));
            }
            Ok(sub.to_ascii_lowercase())
        };
        Ok(match self.kind {
            ProviderKind::Cloudflare => Provider::Cloudflare,
            ProviderKind::AcceleratedDomains => Provider::AcceleratedDomains,
            ProviderKind::Imgix => Provider::Imgix {
                subdomain: subdomain()?,
            },
            ProviderKind::Bunny => Provider::Bunny {
                subdomain: subdomain()?,
            },
        })
    }
}

/// A `[transform.args]` value as written in TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawArg {
    Int(i64),
    Bool(bool),
    Text(String),
}

impl fmt::Display for RawArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// `[transform]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransformConfig {
    /// Default quality (1-100).
    pub quality: u32,
    /// Extra raw arguments. Keys may be canonical names or aliases.
    pub args: BTreeMap<String, RawArg>,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            quality: 85,
            args: BTreeMap::new(),
        }
    }
}

impl TransformConfig {
    /// Quality first, then `args`, so an explicit `q` in `args` wins.
    pub fn raw_args(&self) -> Vec<(String, String)> {
        std::iter::once(("q".to_string(), self.quality.to_string()))
            .chain(self.args.iter().map(|(k, v)| (k.clone(), v.to_string())))
            .collect()
    }

    /// The validated overrides that sit on top of the provider defaults.
    pub fn overrides(&self) -> TransformArgs {
        TransformArgs::from_raw(self.raw_args())
    }
}

/// `[dimensions]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DimensionsConfig {
    /// Directory URL paths are resolved against for header inspection.
    /// Empty disables file inspection.
    pub document_root: String,
    /// Upper bound on bytes read from any one file.
    pub max_inspect_bytes: u64,
    /// Named sizes as `[width, height]`, matched by `size-<name>` classes.
    pub sizes: BTreeMap<String, [u32; 2]>,
    /// Known image URLs as `[width, height]`. Checked before the filename
    /// suffix and size classes.
    pub images: BTreeMap<String, [u32; 2]>,
}

impl Default for DimensionsConfig {
    fn default() -> Self {
        Self {
            document_root: String::new(),
            max_inspect_bytes: 1024 * 1024,
            sizes: BTreeMap::from([
                ("thumbnail".to_string(), [150, 150]),
                ("medium".to_string(), [300, 300]),
                ("medium_large".to_string(), [768, 768]),
                ("large".to_string(), [1024, 1024]),
            ]),
            images: BTreeMap::new(),
        }
    }
}

impl DimensionsConfig {
    pub fn registry(&self) -> SizeRegistry {
        let named = self
            .sizes
            .iter()
            .filter_map(|(name, [w, h])| Some((name.clone(), Dimensions::new(*w, *h)?)))
            .collect();
        let mut registry = SizeRegistry::new(named);
        for (url, [w, h]) in &self.images {
            if let Some(dims) = Dimensions::new(*w, *h) {
                registry.register_url(url.as_str(), dims);
            }
        }
        registry
    }

    pub fn inspector(&self) -> Option<FileInspector> {
        let root = self.document_root.trim();
        (!root.is_empty()).then(|| FileInspector::new(root, self.max_inspect_bytes))
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel rewrite workers.
    /// When absent or null, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Worker count for the rewrite pool: every core unless `max_processes`
/// asks for fewer. Never zero.
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism().map_or(1, |n| n.get());
    match config.max_processes {
        Some(requested) => requested.clamp(1, cores),
        None => cores,
    }
}

// =============================================================================
// Loading
// =============================================================================
//
// stock defaults (as a toml table)
//   └─ merged with config.toml, table by table
//        └─ deserialized into EdgeConfig (unknown keys fail here)
//             └─ validate()

/// [`EdgeConfig::default`] as a TOML table, the layer user files merge onto.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(EdgeConfig::default()).expect("default config must serialize")
}

/// Overlay `overlay` onto `base`. Tables combine key by key at every depth;
/// any other overlay value, arrays included, replaces the base value.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut merged), toml::Value::Table(overlay)) => {
            for (key, value) in overlay {
                let value = match merged.remove(&key) {
                    Some(existing) => merge_toml(existing, value),
                    None => value,
                };
                merged.insert(key, value);
            }
            toml::Value::Table(merged)
        }
        (_, replacement) => replacement,
    }
}

/// The user's `config.toml` in `dir`, parsed but not yet checked against the
/// schema. `None` when the directory has no config file.
pub fn load_raw_config(dir: &Path) -> Result<Option<toml::Value>, ConfigError> {
    let file = dir.join("config.toml");
    if !file.is_file() {
        return Ok(None);
    }
    let value = toml::from_str(&fs::read_to_string(&file)?)?;
    Ok(Some(value))
}

/// Build a checked [`EdgeConfig`] from the defaults plus an optional user layer.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<EdgeConfig, ConfigError> {
    let value = match overlay {
        Some(overlay) => merge_toml(base, overlay),
        None => base,
    };
    let config: EdgeConfig = value.try_into()?;
    config.validate()?;
    Ok(config)
}

/// The configuration a pipeline runs with for `dir`.
pub fn load_config(dir: &Path) -> Result<EdgeConfig, ConfigError> {
    resolve_config(stock_defaults_value(), load_raw_config(dir)?)
}

/// Returns a fully-commented stock `config.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Edge Images Configuration
# =========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Provider
# ---------------------------------------------------------------------------
[provider]
# Transformation endpoint: "cloudflare", "accelerated-domains", "imgix" or "bunny".
kind = "cloudflare"

# Account subdomain, required for imgix (<subdomain>.imgix.net)
# and bunny (<subdomain>.b-cdn.net).
# subdomain = "acme"

# ---------------------------------------------------------------------------
# Responsive widths
# ---------------------------------------------------------------------------
[srcset]
# Scale factors applied to the original width.
multipliers = [0.25, 0.5, 1.0, 1.5, 2.0, 2.5]

# Planned widths stay within [min_width, max_width]; the original width is
# always offered even when it falls outside.
min_width = 300
max_width = 2400

# Largest step between neighbouring widths. Set to 0 to disable gap filling.
max_gap = 200

# ---------------------------------------------------------------------------
# Transformation arguments
# ---------------------------------------------------------------------------
[transform]
# Output quality (1 = worst, 100 = best).
quality = 85

# Extra arguments applied to every URL. Keys may be canonical names
# (f, fit, g, q, ...) or aliases (format, gravity, quality, ...).
[transform.args]
# sharpen = 1
# metadata = "none"

# ---------------------------------------------------------------------------
# Dimension resolution
# ---------------------------------------------------------------------------
[dimensions]
# Directory that URL paths resolve against when an image's size has to be
# read from its file header. Leave empty to disable file inspection.
document_root = ""

# Upper bound on bytes read from any one file.
max_inspect_bytes = 1048576

# Named sizes matched by `size-<name>` classes, as [width, height].
[dimensions.sizes]
large = [1024, 1024]
medium = [300, 300]
medium_large = [768, 768]
thumbnail = [150, 150]

# Sizes of specific image URLs, as [width, height]. Matched with or without
# the query string and origin.
[dimensions.images]
# "/uploads/hero.jpg" = [1920, 1080]

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel rewrite workers.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4
"##
}
