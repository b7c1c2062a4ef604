//! Transformation argument model.
//!
//! Every provider URL is built from a [`TransformArgs`] map: canonical keys
//! to validated values. Raw input (HTML attributes, config tables, CLI
//! `KEY=VALUE` pairs) flows through three steps:
//!
//! ```text
//! canonicalize("width")      → Some(CanonicalKey::Width)   (aliases fold to one key)
//! validate(Width, "600")     → Ok(ArgValue::Int(600))      (range / enum / pattern rules)
//! normalize(Gravity, "top")  → Some(ArgValue::Text("north"))  (synonyms → canonical value)
//! ```
//!
//! Nothing here is an error for the caller. Unknown keys vanish, values that
//! fail validation are dropped and logged at `debug`, and the provider
//! defaults fill the gap.
//!
//! ## Rules
//!
//! | Key | Aliases | Rule |
//! |---|---|---|
//! | `w`, `h` | `width`, `height` | integer 1–5000 |
//! | `dpr` | `device-pixel-ratio` | integer 1–3 |
//! | `q` | `quality` | integer 1–100 |
//! | `blur`, `sharpen` | `sharp` | integer 1–10 |
//! | `brightness`, `contrast` | `bri`, `con` | integer -100–100 |
//! | `gamma`, `trim` | `gam` | integer 1–100 |
//! | `rotate` | `rotation` | multiple of 90, \|v\| ≤ 360 |
//! | `pad` | `padding` | integer 0–1000 |
//! | `fit`, `g`, `f`, `flip`, `metadata`, `onerror` | see [`ALIASES`] | enumerations |
//! | `background` | `bg` | hex (3–8 digits), `rgb()`/`rgba()`, named color |
//! | `border` | | `<width>` or `<width>,<color>` |
//! | `anim` | `animation` | boolean flag |

use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::LazyLock;
use thiserror::Error;

/// Canonical transformation parameter.
///
/// Variants are declared in the lexical order of their canonical names, so the
/// derived `Ord` sorts a [`TransformArgs`] map exactly as its URL
/// serialization requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CanonicalKey {
    Anim,
    Background,
    Blur,
    Border,
    Brightness,
    Contrast,
    Dpr,
    Format,
    Fit,
    Flip,
    Gravity,
    Gamma,
    Height,
    Metadata,
    OnError,
    Padding,
    Quality,
    Rotate,
    Sharpen,
    Trim,
    Width,
}

impl CanonicalKey {
    pub const ALL: [CanonicalKey; 21] = [
        Self::Anim,
        Self::Background,
        Self::Blur,
        Self::Border,
        Self::Brightness,
        Self::Contrast,
        Self::Dpr,
        Self::Format,
        Self::Fit,
        Self::Flip,
        Self::Gravity,
        Self::Gamma,
        Self::Height,
        Self::Metadata,
        Self::OnError,
        Self::Padding,
        Self::Quality,
        Self::Rotate,
        Self::Sharpen,
        Self::Trim,
        Self::Width,
    ];

    /// The short identifier used in URLs and config.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Anim => "anim",
            Self::Background => "background",
            Self::Blur => "blur",
            Self::Border => "border",
            Self::Brightness => "brightness",
            Self::Contrast => "contrast",
            Self::Dpr => "dpr",
            Self::Format => "f",
            Self::Fit => "fit",
            Self::Flip => "flip",
            Self::Gravity => "g",
            Self::Gamma => "gamma",
            Self::Height => "h",
            Self::Metadata => "metadata",
            Self::OnError => "onerror",
            Self::Padding => "pad",
            Self::Quality => "q",
            Self::Rotate => "rotate",
            Self::Sharpen => "sharpen",
            Self::Trim => "trim",
            Self::Width => "w",
        }
    }

    /// Long-form names that fold into this key.
    pub fn aliases(self) -> &'static [&'static str] {
        ALIASES
            .iter()
            .find(|(key, _)| *key == self)
            .map(|(_, aliases)| *aliases)
            .unwrap_or(&[])
    }
}

impl fmt::Display for CanonicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for CanonicalKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Canonical key → aliases. The reverse direction lives in [`LOOKUP`].
pub const ALIASES: &[(CanonicalKey, &[&str])] = &[
    (CanonicalKey::Anim, &["animation", "animate"]),
    (CanonicalKey::Background, &["bg", "background-color"]),
    (CanonicalKey::Blur, &[]),
    (CanonicalKey::Border, &[]),
    (CanonicalKey::Brightness, &["bri"]),
    (CanonicalKey::Contrast, &["con"]),
    (CanonicalKey::Dpr, &["device-pixel-ratio", "pixel-ratio"]),
    (CanonicalKey::Format, &["format", "fm"]),
    (CanonicalKey::Fit, &["fit-mode", "resize"]),
    (CanonicalKey::Flip, &["mirror"]),
    (CanonicalKey::Gravity, &["gravity", "crop-gravity"]),
    (CanonicalKey::Gamma, &["gam"]),
    (CanonicalKey::Height, &["height"]),
    (CanonicalKey::Metadata, &["metadata-policy"]),
    (CanonicalKey::OnError, &["on-error", "error-policy"]),
    (CanonicalKey::Padding, &["padding"]),
    (CanonicalKey::Quality, &["quality"]),
    (CanonicalKey::Rotate, &["rotation", "rot"]),
    (CanonicalKey::Sharpen, &["sharp"]),
    (CanonicalKey::Trim, &[]),
    (CanonicalKey::Width, &["width"]),
];

/// Every accepted spelling (canonical or alias) → canonical key. Built once.
static LOOKUP: LazyLock<HashMap<&'static str, CanonicalKey>> = LazyLock::new(|| {
    let mut map = HashMap::new();
    for key in CanonicalKey::ALL {
        map.insert(key.as_str(), key);
    }
    for (key, aliases) in ALIASES {
        for alias in *aliases {
            map.insert(*alias, *key);
        }
    }
    map
});

/// Map a raw parameter name to its canonical key.
///
/// Matching ignores ASCII case, surrounding whitespace, and treats `_` as `-`.
/// Returns `None` for anything unrecognized.
pub fn canonicalize(name: &str) -> Option<CanonicalKey> {
    let folded = name.trim().to_ascii_lowercase().replace('_', "-");
    LOOKUP.get(folded.as_str()).copied()
}

/// A validated argument value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ArgValue {
    Int(i64),
    Text(String),
    Flag(bool),
}

impl ArgValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
            Self::Flag(v) => write!(f, "{v}"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArgError {
    #[error("rejected {key}={value:?}: {reason}")]
    Rejected {
        key: CanonicalKey,
        value: String,
        reason: String,
    },
    #[error("unknown argument {0:?}")]
    Unknown(String),
}

fn reject(key: CanonicalKey, raw: &str, reason: impl Into<String>) -> ArgError {
    ArgError::Rejected {
        key,
        value: raw.to_string(),
        reason: reason.into(),
    }
}

const FIT_MODES: &[&str] = &["scale-down", "contain", "cover", "crop", "pad"];
const FIT_SYNONYMS: &[(&str, &str)] = &[("scaledown", "scale-down"), ("fill", "cover")];

const GRAVITIES: &[&str] = &[
    "auto", "north", "south", "east", "west", "center", "left", "right",
];
const GRAVITY_SYNONYMS: &[(&str, &str)] = &[
    ("top", "north"),
    ("bottom", "south"),
    ("centre", "center"),
    ("middle", "center"),
];

const FORMATS: &[&str] = &["auto", "webp", "json", "jpeg", "png", "gif", "avif"];
const FORMAT_SYNONYMS: &[(&str, &str)] = &[("jpg", "jpeg")];

const FLIPS: &[&str] = &["h", "v", "hv"];
const FLIP_SYNONYMS: &[(&str, &str)] = &[
    ("horizontal", "h"),
    ("vertical", "v"),
    ("both", "hv"),
    ("vh", "hv"),
];

const METADATA_POLICIES: &[&str] = &["keep", "copyright", "none"];
const METADATA_SYNONYMS: &[(&str, &str)] = &[("all", "keep"), ("strip", "none")];

const ERROR_POLICIES: &[&str] = &["redirect", "404"];

const NAMED_COLORS: &[&str] = &[
    "black",
    "white",
    "transparent",
    "red",
    "green",
    "blue",
    "yellow",
    "gray",
    "grey",
    "silver",
    "orange",
    "purple",
];

fn synonyms_for(key: CanonicalKey) -> &'static [(&'static str, &'static str)] {
    match key {
        CanonicalKey::Fit => FIT_SYNONYMS,
        CanonicalKey::Gravity => GRAVITY_SYNONYMS,
        CanonicalKey::Format => FORMAT_SYNONYMS,
        CanonicalKey::Flip => FLIP_SYNONYMS,
        CanonicalKey::Metadata => METADATA_SYNONYMS,
        _ => &[],
    }
}

fn int_in(key: CanonicalKey, raw: &str, min: i64, max: i64) -> Result<ArgValue, ArgError> {
    let value: i64 = raw
        .parse()
        .map_err(|_| reject(key, raw, "not an integer"))?;
    if (min..=max).contains(&value) {
        Ok(ArgValue::Int(value))
    } else {
        Err(reject(key, raw, format!("outside {min}..={max}")))
    }
}

fn one_of(key: CanonicalKey, raw: &str, allowed: &[&str]) -> Result<ArgValue, ArgError> {
    let lower = raw.to_ascii_lowercase();
    let known = allowed.contains(&lower.as_str())
        || synonyms_for(key).iter().any(|(syn, _)| *syn == lower);
    if known {
        Ok(ArgValue::Text(lower))
    } else {
        Err(reject(key, raw, format!("expected one of {}", allowed.join("|"))))
    }
}

fn is_hex_color(value: &str) -> bool {
    let digits = value.strip_prefix('#').unwrap_or(value);
    (3..=8).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_hexdigit())
}

fn is_rgb_color(value: &str) -> bool {
    let (inner, components) = if let Some(rest) = value.strip_prefix("rgba(") {
        (rest, 4)
    } else if let Some(rest) = value.strip_prefix("rgb(") {
        (rest, 3)
    } else {
        return false;
    };
    let Some(inner) = inner.strip_suffix(')') else {
        return false;
    };
    let parts: Vec<&str> = inner.split(',').map(str::trim).collect();
    if parts.len() != components {
        return false;
    }
    let channels_ok = parts[..3]
        .iter()
        .all(|p| p.parse::<u16>().is_ok_and(|v| v <= 255));
    let alpha_ok = components == 3 || parts[3].parse::<f32>().is_ok_and(|a| (0.0..=1.0).contains(&a));
    channels_ok && alpha_ok
}

fn is_color(value: &str) -> bool {
    is_hex_color(value) || is_rgb_color(value) || NAMED_COLORS.contains(&value)
}

fn parse_flag(key: CanonicalKey, raw: &str) -> Result<ArgValue, ArgError> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(ArgValue::Flag(true)),
        "false" | "0" | "no" | "off" => Ok(ArgValue::Flag(false)),
        _ => Err(reject(key, raw, "expected a boolean")),
    }
}

/// Apply the per-key validation rule to a raw value.
pub fn validate(key: CanonicalKey, raw: &str) -> Result<ArgValue, ArgError> {
    use CanonicalKey::*;

    let raw = raw.trim();
    if raw.is_empty() {
        return Err(reject(key, raw, "empty value"));
    }

    match key {
        Width | Height => int_in(key, raw, 1, 5000),
        Dpr => int_in(key, raw.strip_suffix('x').unwrap_or(raw), 1, 3),
        Quality => int_in(key, raw, 1, 100),
        Blur | Sharpen => int_in(key, raw, 1, 10),
        Brightness | Contrast => int_in(key, raw, -100, 100),
        Gamma | Trim => int_in(key, raw, 1, 100),
        Padding => int_in(key, raw, 0, 1000),
        Rotate => {
            let value: i64 = raw
                .parse()
                .map_err(|_| reject(key, raw, "not an integer"))?;
            if value % 90 == 0 && value.abs() <= 360 {
                Ok(ArgValue::Int(value))
            } else {
                Err(reject(key, raw, "must be a multiple of 90 within ±360"))
            }
        }
        Fit => one_of(key, raw, FIT_MODES),
        Gravity => one_of(key, raw, GRAVITIES),
        Format => one_of(key, raw, FORMATS),
        Flip => one_of(key, raw, FLIPS),
        Metadata => one_of(key, raw, METADATA_POLICIES),
        OnError => one_of(key, raw, ERROR_POLICIES),
        Background => {
            let lower = raw.to_ascii_lowercase();
            if is_color(&lower) {
                Ok(ArgValue::Text(lower))
            } else {
                Err(reject(key, raw, "not a hex, rgb() or named color"))
            }
        }
        Border => {
            let lower = raw.to_ascii_lowercase();
            let (width, color) = match lower.split_once(',') {
                Some((w, c)) => (w.trim(), Some(c.trim())),
                None => (lower.as_str(), None),
            };
            let width_ok = width.parse::<u16>().is_ok_and(|w| (1..=100).contains(&w));
            if width_ok && color.is_none_or(is_color) {
                Ok(ArgValue::Text(lower.replace(' ', "")))
            } else {
                Err(reject(key, raw, "expected <width> or <width>,<color>"))
            }
        }
        Anim => parse_flag(key, raw),
    }
}

/// Fold value-level synonyms into their canonical spelling.
///
/// Returns `None` when the value normalizes to nothing (empty text).
pub fn normalize(key: CanonicalKey, value: ArgValue) -> Option<ArgValue> {
    match value {
        ArgValue::Text(text) => {
            let text = text.trim();
            if text.is_empty() {
                return None;
            }
            let mapped = synonyms_for(key)
                .iter()
                .find(|(syn, _)| *syn == text)
                .map(|(_, canonical)| (*canonical).to_string());
            let text = match (key, mapped) {
                (_, Some(canonical)) => canonical,
                (CanonicalKey::Background, None) if is_hex_color(text) && !text.starts_with('#') => {
                    format!("#{text}")
                }
                (_, None) => text.to_string(),
            };
            Some(ArgValue::Text(text))
        }
        other => Some(other),
    }
}

/// Validated, normalized transformation arguments, ordered by canonical key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TransformArgs(BTreeMap<CanonicalKey, ArgValue>);

impl TransformArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from raw pairs, dropping unknown keys and rejected values.
    pub fn from_raw<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        Self::parse_raw(pairs).0
    }

    /// Build from raw pairs and also return everything that was dropped.
    ///
    /// Later pairs win over earlier ones when two spellings fold to the same key.
    pub fn parse_raw<I, K, V>(pairs: I) -> (Self, Vec<ArgError>)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut args = Self::new();
        let mut dropped = Vec::new();
        for (name, raw) in pairs {
            let Some(key) = canonicalize(name.as_ref()) else {
                log::debug!("dropping unknown argument {:?}", name.as_ref());
                dropped.push(ArgError::Unknown(name.as_ref().to_string()));
                continue;
            };
            match validate(key, raw.as_ref()) {
                Ok(value) => {
                    if let Some(value) = normalize(key, value) {
                        args.0.insert(key, value);
                    }
                }
                Err(err) => {
                    log::debug!("{err}");
                    dropped.push(err);
                }
            }
        }
        (args, dropped)
    }

    /// Validate and store an integer the pipeline computed itself.
    pub fn set_int(&mut self, key: CanonicalKey, value: i64) -> Result<(), ArgError> {
        let validated = validate(key, &value.to_string())?;
        if let Some(validated) = normalize(key, validated) {
            self.0.insert(key, validated);
        }
        Ok(())
    }

    pub fn remove(&mut self, key: CanonicalKey) -> Option<ArgValue> {
        self.0.remove(&key)
    }

    /// `self` with every entry of `overrides` laid on top.
    pub fn merged(&self, overrides: &TransformArgs) -> TransformArgs {
        let mut merged = self.clone();
        for (key, value) in &overrides.0 {
            merged.0.insert(*key, value.clone());
        }
        merged
    }

    pub fn get(&self, key: CanonicalKey) -> Option<&ArgValue> {
        self.0.get(&key)
    }

    pub fn contains(&self, key: CanonicalKey) -> bool {
        self.0.contains_key(&key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (CanonicalKey, &ArgValue)> {
        self.0.iter().map(|(k, v)| (*k, v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // canonicalize
    // =========================================================================

    #[test]
    fn canonical_names_map_to_themselves() {
        for key in CanonicalKey::ALL {
            assert_eq!(canonicalize(key.as_str()), Some(key));
        }
    }

    #[test]
    fn aliases_fold_to_canonical_key() {
        assert_eq!(canonicalize("width"), Some(CanonicalKey::Width));
        assert_eq!(canonicalize("Height"), Some(CanonicalKey::Height));
        assert_eq!(canonicalize("device_pixel_ratio"), Some(CanonicalKey::Dpr));
        assert_eq!(canonicalize(" gravity "), Some(CanonicalKey::Gravity));
        assert_eq!(canonicalize("error-policy"), Some(CanonicalKey::OnError));
        assert_eq!(canonicalize("rotation"), Some(CanonicalKey::Rotate));
    }

    #[test]
    fn unknown_names_are_unrecognized() {
        assert_eq!(canonicalize("foo"), None);
        assert_eq!(canonicalize(""), None);
        assert_eq!(canonicalize("widthx"), None);
    }

    #[test]
    fn every_key_lists_its_aliases() {
        assert_eq!(CanonicalKey::Width.aliases(), &["width"]);
        assert!(CanonicalKey::Trim.aliases().is_empty());
        assert_eq!(ALIASES.len(), CanonicalKey::ALL.len());
    }

    #[test]
    fn declaration_order_matches_lexical_order() {
        let names: Vec<&str> = CanonicalKey::ALL.iter().map(|k| k.as_str()).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);

        let mut keys = CanonicalKey::ALL.to_vec();
        keys.sort();
        assert_eq!(keys, CanonicalKey::ALL.to_vec());
    }

    // =========================================================================
    // validate
    // =========================================================================

    #[test]
    fn integer_ranges_are_inclusive() {
        assert_eq!(validate(CanonicalKey::Width, "1"), Ok(ArgValue::Int(1)));
        assert_eq!(validate(CanonicalKey::Width, "5000"), Ok(ArgValue::Int(5000)));
        assert!(validate(CanonicalKey::Width, "0").is_err());
        assert!(validate(CanonicalKey::Width, "5001").is_err());
        assert!(validate(CanonicalKey::Dpr, "4").is_err());
        assert_eq!(validate(CanonicalKey::Dpr, "2x"), Ok(ArgValue::Int(2)));
        assert_eq!(validate(CanonicalKey::Brightness, "-100"), Ok(ArgValue::Int(-100)));
        assert!(validate(CanonicalKey::Contrast, "101").is_err());
        assert!(validate(CanonicalKey::Blur, "11").is_err());
        assert!(validate(CanonicalKey::Quality, "abc").is_err());
    }

    #[test]
    fn rotation_must_be_quarter_turns() {
        assert_eq!(validate(CanonicalKey::Rotate, "90"), Ok(ArgValue::Int(90)));
        assert_eq!(validate(CanonicalKey::Rotate, "-270"), Ok(ArgValue::Int(-270)));
        assert_eq!(validate(CanonicalKey::Rotate, "360"), Ok(ArgValue::Int(360)));
        assert!(validate(CanonicalKey::Rotate, "45").is_err());
        assert!(validate(CanonicalKey::Rotate, "450").is_err());
    }

    #[test]
    fn enumerations_accept_members_and_synonyms() {
        assert!(validate(CanonicalKey::Fit, "cover").is_ok());
        assert!(validate(CanonicalKey::Fit, "stretch").is_err());
        assert!(validate(CanonicalKey::Gravity, "TOP").is_ok());
        assert!(validate(CanonicalKey::Format, "avif").is_ok());
        assert!(validate(CanonicalKey::Format, "bmp").is_err());
        assert!(validate(CanonicalKey::Flip, "hv").is_ok());
        assert!(validate(CanonicalKey::Metadata, "copyright").is_ok());
        assert!(validate(CanonicalKey::OnError, "404").is_ok());
        assert!(validate(CanonicalKey::OnError, "500").is_err());
    }

    #[test]
    fn background_accepts_color_forms() {
        assert!(validate(CanonicalKey::Background, "#fff").is_ok());
        assert!(validate(CanonicalKey::Background, "ff00ff80").is_ok());
        assert!(validate(CanonicalKey::Background, "rgb(10, 20, 30)").is_ok());
        assert!(validate(CanonicalKey::Background, "rgba(10,20,30,0.5)").is_ok());
        assert!(validate(CanonicalKey::Background, "White").is_ok());
        assert!(validate(CanonicalKey::Background, "#ff").is_err());
        assert!(validate(CanonicalKey::Background, "rgb(300,0,0)").is_err());
        assert!(validate(CanonicalKey::Background, "rgb(1,2)").is_err());
        assert!(validate(CanonicalKey::Background, "chartreuse").is_err());
    }

    #[test]
    fn border_takes_width_and_optional_color() {
        assert!(validate(CanonicalKey::Border, "2").is_ok());
        assert_eq!(
            validate(CanonicalKey::Border, "2, #000"),
            Ok(ArgValue::Text("2,#000".to_string()))
        );
        assert!(validate(CanonicalKey::Border, "0").is_err());
        assert!(validate(CanonicalKey::Border, "2,nope").is_err());
    }

    #[test]
    fn anim_parses_booleans() {
        assert_eq!(validate(CanonicalKey::Anim, "yes"), Ok(ArgValue::Flag(true)));
        assert_eq!(validate(CanonicalKey::Anim, "0"), Ok(ArgValue::Flag(false)));
        assert!(validate(CanonicalKey::Anim, "maybe").is_err());
    }

    #[test]
    fn empty_values_are_rejected() {
        assert!(validate(CanonicalKey::Gravity, "  ").is_err());
    }

    // =========================================================================
    // normalize
    // =========================================================================

    #[test]
    fn normalize_maps_directional_synonyms() {
        let v = normalize(CanonicalKey::Gravity, ArgValue::Text("top".into()));
        assert_eq!(v, Some(ArgValue::Text("north".into())));
        let v = normalize(CanonicalKey::Format, ArgValue::Text("jpg".into()));
        assert_eq!(v, Some(ArgValue::Text("jpeg".into())));
        let v = normalize(CanonicalKey::Flip, ArgValue::Text("both".into()));
        assert_eq!(v, Some(ArgValue::Text("hv".into())));
    }

    #[test]
    fn normalize_prefixes_bare_hex_backgrounds() {
        let v = normalize(CanonicalKey::Background, ArgValue::Text("abc".into()));
        assert_eq!(v, Some(ArgValue::Text("#abc".into())));
        let v = normalize(CanonicalKey::Background, ArgValue::Text("black".into()));
        assert_eq!(v, Some(ArgValue::Text("black".into())));
    }

    #[test]
    fn normalize_strips_empty_text() {
        assert_eq!(normalize(CanonicalKey::Fit, ArgValue::Text(" ".into())), None);
        assert_eq!(
            normalize(CanonicalKey::Width, ArgValue::Int(10)),
            Some(ArgValue::Int(10))
        );
    }

    // =========================================================================
    // TransformArgs
    // =========================================================================

    #[test]
    fn unknown_keys_are_dropped_without_error() {
        let args = TransformArgs::from_raw([("foo", "bar"), ("width", "600")]);
        assert_eq!(args.len(), 1);
        assert_eq!(args.get(CanonicalKey::Width), Some(&ArgValue::Int(600)));
    }

    #[test]
    fn parse_raw_reports_what_was_dropped() {
        let (args, dropped) =
            TransformArgs::parse_raw([("foo", "bar"), ("q", "500"), ("gravity", "left")]);
        assert_eq!(args.len(), 1);
        assert_eq!(dropped.len(), 2);
        assert_eq!(dropped[0], ArgError::Unknown("foo".into()));
        assert!(matches!(
            dropped[1],
            ArgError::Rejected {
                key: CanonicalKey::Quality,
                ..
            }
        ));
    }

    #[test]
    fn later_spelling_wins() {
        let args = TransformArgs::from_raw([("w", "100"), ("width", "200")]);
        assert_eq!(args.get(CanonicalKey::Width), Some(&ArgValue::Int(200)));
    }

    #[test]
    fn merged_prefers_overrides() {
        let base = TransformArgs::from_raw([("fit", "cover"), ("q", "85")]);
        let over = TransformArgs::from_raw([("q", "60")]);
        let merged = base.merged(&over);
        assert_eq!(merged.get(CanonicalKey::Quality), Some(&ArgValue::Int(60)));
        assert_eq!(merged.get(CanonicalKey::Fit), Some(&ArgValue::Text("cover".into())));
    }

    #[test]
    fn set_int_validates_computed_values() {
        let mut args = TransformArgs::new();
        assert!(args.set_int(CanonicalKey::Width, 1200).is_ok());
        assert!(args.set_int(CanonicalKey::Height, 9000).is_err());
        assert!(!args.contains(CanonicalKey::Height));
    }

    #[test]
    fn iteration_is_sorted_by_canonical_name() {
        let args = TransformArgs::from_raw([("width", "1"), ("quality", "5"), ("fit", "crop")]);
        let keys: Vec<&str> = args.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["fit", "q", "w"]);
    }

    #[test]
    fn serializes_as_canonical_map() {
        let args = TransformArgs::from_raw([("width", "300"), ("anim", "false"), ("g", "top")]);
        let json = serde_json::to_string(&args).unwrap();
        assert_eq!(json, r#"{"anim":false,"g":"north","w":300}"#);
    }
}
