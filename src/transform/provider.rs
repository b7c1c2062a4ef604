//! Edge transformation providers.
//!
//! A [`Provider`] turns an image path plus [`TransformArgs`] into a URL that
//! the provider's edge will answer with a transformed image. The set of
//! providers is closed; each variant supplies the same four capabilities:
//!
//! | Capability | Meaning |
//! |---|---|
//! | [`build_url`](Provider::build_url) | serialize args into the provider's URL grammar |
//! | [`is_transformed`](Provider::is_transformed) | recognize the provider's own marker |
//! | [`strip_transformation`](Provider::strip_transformation) | best-effort inverse of `build_url` |
//! | [`default_args`](Provider::default_args) | baseline args merged under caller overrides |
//!
//! ## URL shapes
//!
//! ```text
//! Cloudflare          /cdn-cgi/image/f=auto,fit=cover,w=600/uploads/a.jpg
//! Accelerated Domains /acd-cgi/img/v1/uploads/a.jpg?f=auto&fit=cover&w=600
//! Imgix               https://acme.imgix.net/uploads/a.jpg?auto=format&fit=crop&w=600
//! Bunny               https://acme.b-cdn.net/uploads/a.jpg?width=600
//! ```
//!
//! Parameters are always emitted in canonical-key order, so the same inputs
//! produce byte-identical URLs.

use super::args::{ArgValue, CanonicalKey, TransformArgs};
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};

/// Quality applied when nothing else asks for one.
pub const DEFAULT_QUALITY: i64 = 85;

const CLOUDFLARE_MARKER: &str = "/cdn-cgi/image/";
const ACD_MARKER: &str = "/acd-cgi/img/v1";
const IMGIX_HOST_SUFFIX: &str = ".imgix.net";
const BUNNY_HOST_SUFFIX: &str = ".b-cdn.net";

/// Characters escaped inside a parameter value. Covers the separators of
/// both the comma-delimited path grammar and the query grammar.
const VALUE_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'&')
    .add(b'+')
    .add(b',')
    .add(b'/')
    .add(b'<')
    .add(b'=')
    .add(b'>')
    .add(b'?');

/// A configured transformation endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provider {
    /// Cloudflare Image Resizing, path-segment options on the same origin.
    Cloudflare,
    /// Accelerated Domains image service, query options on the same origin.
    AcceleratedDomains,
    /// Imgix source bound to `<subdomain>.imgix.net`.
    Imgix { subdomain: String },
    /// Bunny Optimizer on the `<subdomain>.b-cdn.net` pull zone.
    Bunny { subdomain: String },
}

impl Provider {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Cloudflare => "cloudflare",
            Self::AcceleratedDomains => "accelerated-domains",
            Self::Imgix { .. } => "imgix",
            Self::Bunny { .. } => "bunny",
        }
    }

    /// Baseline args: `fit=cover, dpr=1, f=auto, g=auto, q=85`.
    pub fn default_args(&self) -> TransformArgs {
        let quality = DEFAULT_QUALITY.to_string();
        TransformArgs::from_raw([
            ("fit", "cover"),
            ("dpr", "1"),
            ("f", "auto"),
            ("g", "auto"),
            ("q", quality.as_str()),
        ])
    }

    /// Whether `url` already carries this provider's transformation marker.
    pub fn is_transformed(&self, url: &str) -> bool {
        match self {
            Self::Cloudflare => url.contains(CLOUDFLARE_MARKER),
            Self::AcceleratedDomains => url.contains(ACD_MARKER),
            Self::Imgix { .. } => split_origin(url).0.ends_with(IMGIX_HOST_SUFFIX),
            Self::Bunny { .. } => split_origin(url).0.ends_with(BUNNY_HOST_SUFFIX),
        }
    }

    /// Build the transformed URL for `original_path`.
    ///
    /// Only absolute URLs and root-relative paths are transformed. Already
    /// transformed input comes back unchanged, as do document-relative paths
    /// and input whose args are not expressible for this provider.
    pub fn build_url(&self, original_path: &str, args: &TransformArgs) -> String {
        if original_path.is_empty()
            || is_document_relative(original_path)
            || self.is_transformed(original_path)
        {
            return original_path.to_string();
        }

        let params = self.serialize_params(args);
        if params.is_empty() {
            return original_path.to_string();
        }

        let (origin, path) = split_origin(original_path);
        let path = path.trim_start_matches('/');

        match self {
            Self::Cloudflare => {
                let options: Vec<String> = params
                    .iter()
                    .map(|(name, value)| format!("{name}={value}"))
                    .collect();
                format!("{origin}{CLOUDFLARE_MARKER}{}/{path}", options.join(","))
            }
            Self::AcceleratedDomains => {
                format!("{origin}{ACD_MARKER}/{}", with_query(path, &params))
            }
            Self::Imgix { subdomain } => {
                format!(
                    "https://{subdomain}{IMGIX_HOST_SUFFIX}/{}",
                    with_query(path, &params)
                )
            }
            Self::Bunny { subdomain } => {
                format!(
                    "https://{subdomain}{BUNNY_HOST_SUFFIX}/{}",
                    with_query(path, &params)
                )
            }
        }
    }

    /// Remove the transformation marker, recovering the original path as
    /// closely as the URL allows. Untransformed input is returned as-is.
    pub fn strip_transformation(&self, url: &str) -> String {
        if !self.is_transformed(url) {
            return url.to_string();
        }
        match self {
            Self::Cloudflare => {
                let Some(start) = url.find(CLOUDFLARE_MARKER) else {
                    return url.to_string();
                };
                let prefix = &url[..start];
                let after = &url[start + CLOUDFLARE_MARKER.len()..];
                let rest = after.split_once('/').map(|(_, rest)| rest).unwrap_or("");
                if rest.starts_with("http://") || rest.starts_with("https://") {
                    rest.to_string()
                } else {
                    format!("{prefix}/{rest}")
                }
            }
            Self::AcceleratedDomains => {
                let stripped = url.replacen(ACD_MARKER, "", 1);
                strip_query(&stripped).to_string()
            }
            Self::Imgix { .. } | Self::Bunny { .. } => {
                let (_, path) = split_origin(url);
                let path = strip_query(path);
                if path.is_empty() {
                    "/".to_string()
                } else {
                    path.to_string()
                }
            }
        }
    }

    /// Args rendered as `(provider name, encoded value)` pairs, in canonical order.
    fn serialize_params(&self, args: &TransformArgs) -> Vec<(&'static str, String)> {
        let mut out = Vec::with_capacity(args.len());
        for (key, value) in args.iter() {
            match self {
                Self::Cloudflare | Self::AcceleratedDomains => {
                    out.push((key.as_str(), value.to_string()));
                }
                Self::Imgix { .. } => imgix_param(key, value, &mut out),
                Self::Bunny { .. } => bunny_param(key, value, &mut out),
            }
        }
        out.into_iter()
            .map(|(name, value)| (name, utf8_percent_encode(&value, VALUE_ENCODE_SET).to_string()))
            .collect()
    }
}

fn imgix_param(key: CanonicalKey, value: &ArgValue, out: &mut Vec<(&'static str, String)>) {
    use CanonicalKey::*;

    let text = value.to_string();
    match key {
        Width => out.push(("w", text)),
        Height => out.push(("h", text)),
        Dpr => out.push(("dpr", text)),
        Quality => out.push(("q", text)),
        Format if text == "auto" => out.push(("auto", "format".to_string())),
        Format => out.push(("fm", text)),
        Fit => {
            let fit = match text.as_str() {
                "contain" => "clip",
                "scale-down" => "max",
                "pad" => "fill",
                _ => "crop",
            };
            out.push(("fit", fit.to_string()));
        }
        Gravity => {
            let crop = match text.as_str() {
                "north" => "top",
                "south" => "bottom",
                "east" | "right" => "right",
                "west" | "left" => "left",
                "auto" => "entropy",
                _ => return,
            };
            out.push(("crop", crop.to_string()));
        }
        Blur => {
            if let Some(v) = value.as_int() {
                out.push(("blur", (v * 100).to_string()));
            }
        }
        Sharpen => {
            if let Some(v) = value.as_int() {
                out.push(("sharp", (v * 10).to_string()));
            }
        }
        Brightness => out.push(("bri", text)),
        Contrast => out.push(("con", text)),
        Gamma => out.push(("gam", text)),
        Background => out.push(("bg", text.trim_start_matches('#').to_string())),
        Border => out.push(("border", text.replace('#', ""))),
        Padding => out.push(("pad", text)),
        Rotate => out.push(("rot", text)),
        Flip => out.push(("flip", text)),
        Trim | Metadata | OnError | Anim => {}
    }
}

fn bunny_param(key: CanonicalKey, value: &ArgValue, out: &mut Vec<(&'static str, String)>) {
    use CanonicalKey::*;

    let text = value.to_string();
    match key {
        Width => out.push(("width", text)),
        Height => out.push(("height", text)),
        Quality => out.push(("quality", text)),
        Blur => out.push(("blur", text)),
        Sharpen => out.push(("sharpen", "true".to_string())),
        Brightness => out.push(("brightness", text)),
        Contrast => out.push(("contrast", text)),
        Gamma => out.push(("gamma", text)),
        Gravity if text != "auto" => out.push(("crop_gravity", text)),
        Flip => {
            if text.contains('h') {
                out.push(("flop", "true".to_string()));
            }
            if text.contains('v') {
                out.push(("flip", "true".to_string()));
            }
        }
        _ => {}
    }
}

/// Split `https://host/path?q` into `("https://host", "/path?q")`.
/// Relative input has an empty origin.
pub(crate) fn split_origin(url: &str) -> (&str, &str) {
    let authority_start = if let Some(i) = url.find("://") {
        i + 3
    } else if url.starts_with("//") {
        2
    } else {
        return ("", url);
    };
    let path_start = url[authority_start..]
        .find(['/', '?', '#'])
        .map(|i| authority_start + i)
        .unwrap_or(url.len());
    url.split_at(path_start)
}

/// `images/a.jpg` or `../a.jpg`: resolved against the page, so its site path
/// is unknown.
pub fn is_document_relative(url: &str) -> bool {
    let (origin, path) = split_origin(url);
    origin.is_empty() && !path.is_empty() && !path.starts_with('/')
}

pub(crate) fn strip_query(url: &str) -> &str {
    url.split(['?', '#']).next().unwrap_or(url)
}

fn with_query(path: &str, params: &[(&'static str, String)]) -> String {
    let query: Vec<String> = params
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect();
    let separator = if path.contains('?') { '&' } else { '?' };
    format!("{path}{separator}{}", query.join("&"))
}
