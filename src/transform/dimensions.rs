//! Image dimensions and how they are resolved for a markup element.
//!
//! Resolution tries three sources in order and stops at the first one that
//! yields both a width and a height:
//!
//! | Tier | Source |
//! |------|--------|
//! | Attributes | `width` / `height` on the element |
//! | Registered | [`SizeRegistry`]: known URLs, `-WxH` filename suffix, `size-<name>` class |
//! | File | [`ImageInspector`] reading the image header from disk |
//!
//! File inspection is bounded: at most `max_bytes` are read and any I/O or
//! decode failure simply leaves the dimensions unresolved.

use super::provider::{split_origin, strip_query};
use percent_encoding::percent_decode_str;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::{Cursor, Read};
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, LazyLock};
use thiserror::Error;

/// Pixel dimensions of an original image. Both sides are non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    /// `None` when either side is zero.
    pub fn new(width: u32, height: u32) -> Option<Self> {
        (width > 0 && height > 0).then_some(Self { width, height })
    }

    /// Height at `width` with the aspect ratio preserved.
    pub fn height_for_width(&self, width: u32) -> u32 {
        super::widths::scaled_height((self.width, self.height), width)
    }

    /// Width at `height` with the aspect ratio preserved.
    pub fn width_for_height(&self, height: u32) -> u32 {
        super::widths::scaled_height((self.height, self.width), height)
    }

    /// Width and height divided by their greatest common divisor.
    ///
    /// ```
    /// # use edge_images::transform::Dimensions;
    /// let dims = Dimensions::new(1200, 800).unwrap();
    /// assert_eq!(dims.reduced_ratio(), (3, 2));
    /// ```
    pub fn reduced_ratio(&self) -> (u32, u32) {
        let divisor = gcd(self.width, self.height);
        (self.width / divisor, self.height / divisor)
    }
}

fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a.max(1)
}

/// Parse an HTML dimension attribute: `"600"`, `"600px"`, `" 600 "`.
/// Percentages and anything without leading digits yield `None`.
pub fn parse_dimension_attr(value: &str) -> Option<u32> {
    let value = value.trim();
    let digits_end = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    let (digits, rest) = value.split_at(digits_end);
    if digits.is_empty() || !(rest.is_empty() || rest.eq_ignore_ascii_case("px")) {
        return None;
    }
    digits.parse().ok().filter(|&n| n > 0)
}

// ============================================================================
// Registered sizes
// ============================================================================

/// `photo-300x200.jpg`, `photo-300x200.jpg?v=2`
static SIZE_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"-(\d{1,5})x(\d{1,5})\.[A-Za-z0-9]{2,5}$").expect("valid regex")
});

/// Dimensions the host already knows about without reading files.
#[derive(Debug, Clone, Default)]
pub struct SizeRegistry {
    named: BTreeMap<String, Dimensions>,
    urls: HashMap<String, Dimensions>,
}

impl SizeRegistry {
    pub fn new(named: BTreeMap<String, Dimensions>) -> Self {
        Self {
            named,
            urls: HashMap::new(),
        }
    }

    /// Record the dimensions of a specific image URL.
    pub fn register_url(&mut self, url: impl Into<String>, dims: Dimensions) {
        self.urls.insert(url.into(), dims);
    }

    pub fn named(&self, name: &str) -> Option<Dimensions> {
        self.named.get(name).copied()
    }

    /// Look up `src`, then its filename suffix, then a `size-<name>` class.
    pub fn lookup(&self, src: &str, class: &str) -> Option<Dimensions> {
        let bare = strip_query(src);
        if let Some(dims) = self
            .urls
            .get(src)
            .or_else(|| self.urls.get(bare))
            .or_else(|| self.urls.get(split_origin(bare).1))
        {
            return Some(*dims);
        }

        if let Some(caps) = SIZE_SUFFIX.captures(bare) {
            let width = caps[1].parse().ok();
            let height = caps[2].parse().ok();
            if let Some(dims) = width.zip(height).and_then(|(w, h)| Dimensions::new(w, h)) {
                return Some(dims);
            }
        }

        class
            .split_ascii_whitespace()
            .filter_map(|c| c.strip_prefix("size-"))
            .find_map(|name| self.named(name))
    }
}

// ============================================================================
// File inspection
// ============================================================================

#[derive(Error, Debug)]
pub enum InspectError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{path} is larger than {limit} bytes and its header could not be read")]
    TooLarge { path: PathBuf, limit: u64 },
    #[error("cannot inspect {0}")]
    Unsupported(String),
    #[error("failed to decode {path}: {message}")]
    Decode { path: PathBuf, message: String },
}

/// Reads image dimensions for a URL.
///
/// `Sync` so a single inspector can serve a parallel rewrite.
pub trait ImageInspector: Sync + Send {
    fn inspect(&self, src: &str) -> Result<Dimensions, InspectError>;
}

impl<T: ImageInspector + ?Sized> ImageInspector for Arc<T> {
    fn inspect(&self, src: &str) -> Result<Dimensions, InspectError> {
        (**self).inspect(src)
    }
}

/// Resolves URL paths against a document root and reads image headers.
#[derive(Debug, Clone)]
pub struct FileInspector {
    root: PathBuf,
    max_bytes: u64,
}

impl FileInspector {
    pub fn new(root: impl Into<PathBuf>, max_bytes: u64) -> Self {
        Self {
            root: root.into(),
            max_bytes,
        }
    }

    /// Map a URL to a file under the root. The scheme and host are ignored.
    pub fn local_path(&self, src: &str) -> Result<PathBuf, InspectError> {
        if src.starts_with("data:") {
            return Err(InspectError::Unsupported(src.to_string()));
        }
        let (_, path) = split_origin(strip_query(src));
        let decoded = percent_decode_str(path)
            .decode_utf8()
            .map_err(|_| InspectError::Unsupported(src.to_string()))?;

        let relative = Path::new(decoded.trim_start_matches('/'));
        let mut resolved = self.root.clone();
        for component in relative.components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                _ => return Err(InspectError::Unsupported(src.to_string())),
            }
        }
        if resolved == self.root {
            return Err(InspectError::Unsupported(src.to_string()));
        }
        Ok(resolved)
    }
}

impl ImageInspector for FileInspector {
    fn inspect(&self, src: &str) -> Result<Dimensions, InspectError> {
        let path = self.local_path(src)?;
        // Opening a FIFO or device blocks, so only regular files are opened.
        let metadata = fs::metadata(&path)?;
        if !metadata.is_file() {
            return Err(InspectError::Unsupported(src.to_string()));
        }
        let file_len = metadata.len();
        let file = File::open(&path)?;

        let mut head = Vec::with_capacity(file_len.min(self.max_bytes) as usize);
        file.take(self.max_bytes).read_to_end(&mut head)?;

        match dimensions_from_bytes(&path, &head) {
            Err(InspectError::Decode { .. }) if file_len > self.max_bytes => {
                Err(InspectError::TooLarge {
                    path,
                    limit: self.max_bytes,
                })
            }
            other => other,
        }
    }
}

fn is_avif(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("avif"))
}

/// Read dimensions from the start of an image file.
fn dimensions_from_bytes(path: &Path, bytes: &[u8]) -> Result<Dimensions, InspectError> {
    let decode_err = |message: String| InspectError::Decode {
        path: path.to_path_buf(),
        message,
    };

    let (width, height) = if is_avif(path) {
        let avif = avif_parse::read_avif(&mut Cursor::new(bytes))
            .map_err(|e| decode_err(format!("AVIF container: {e:?}")))?;
        let meta = avif
            .primary_item_metadata()
            .map_err(|e| decode_err(format!("AVIF metadata: {e:?}")))?;
        (meta.max_frame_width.get(), meta.max_frame_height.get())
    } else {
        image::ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()?
            .into_dimensions()
            .map_err(|e| decode_err(e.to_string()))?
    };

    Dimensions::new(width, height).ok_or_else(|| decode_err("zero-sized image".to_string()))
}

// ============================================================================
// Resolution
// ============================================================================

/// Where a resolved size came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DimensionSource {
    Attributes,
    Registered,
    File,
}

/// The inputs an element offers for dimension resolution.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageHints<'a> {
    pub src: &'a str,
    pub width: Option<&'a str>,
    pub height: Option<&'a str>,
    pub class: &'a str,
}

/// Tries attributes, then the registry, then the inspector.
pub struct DimensionResolver {
    registry: SizeRegistry,
    inspector: Option<Box<dyn ImageInspector>>,
}

impl DimensionResolver {
    pub fn new(registry: SizeRegistry, inspector: Option<Box<dyn ImageInspector>>) -> Self {
        Self {
            registry,
            inspector,
        }
    }

    pub fn registry(&self) -> &SizeRegistry {
        &self.registry
    }

    pub fn resolve(&self, hints: &ImageHints<'_>) -> Option<(Dimensions, DimensionSource)> {
        let from_attrs = hints
            .width
            .and_then(parse_dimension_attr)
            .zip(hints.height.and_then(parse_dimension_attr))
            .and_then(|(w, h)| Dimensions::new(w, h));
        if let Some(dims) = from_attrs {
            return Some((dims, DimensionSource::Attributes));
        }

        if let Some(dims) = self.registry.lookup(hints.src, hints.class) {
            return Some((dims, DimensionSource::Registered));
        }

        let inspector = self.inspector.as_ref()?;
        match inspector.inspect(hints.src) {
            Ok(dims) => Some((dims, DimensionSource::File)),
            Err(e) => {
                log::debug!("no dimensions for {}: {e}", hints.src);
                None
            }
        }
    }
}

impl Default for DimensionResolver {
    fn default() -> Self {
        Self::new(SizeRegistry::default(), None)
    }
}
