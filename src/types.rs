//! Shared types used across the transform and rewrite stages.

use serde::Serialize;
use std::fmt;

/// Why an image was left untouched.
///
/// None of these are errors: the element or URL passes through unchanged and
/// the rest of the input is still processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Skip {
    /// No source yielded both a width and a height.
    UnresolvedDimensions,
    /// The URL already points at the provider.
    AlreadyTransformed,
    /// The element carries the processed marker or sits inside a `<picture>`.
    AlreadyProcessed,
    /// SVG and other vector sources are never resized.
    VectorImage,
    /// `data:` URIs have no address a provider could fetch.
    InlineData,
    /// A document-relative path such as `images/a.jpg`, whose site path
    /// depends on the page it appears on.
    RelativeUrl,
    /// The match did not contain a well-formed tag.
    MalformedMarkup,
}

impl fmt::Display for Skip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::UnresolvedDimensions => "unresolved dimensions",
            Self::AlreadyTransformed => "already transformed",
            Self::AlreadyProcessed => "already processed",
            Self::VectorImage => "vector image",
            Self::InlineData => "inline data",
            Self::RelativeUrl => "relative url",
            Self::MalformedMarkup => "malformed markup",
        };
        f.write_str(reason)
    }
}

/// What kind of content is being rewritten.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Context {
    /// A single image fragment, such as a featured image. Only the first
    /// image is considered and figures are not unwrapped.
    #[value(name = "standalone")]
    StandaloneImage,
    /// Post or page body that may hold any number of images and figures.
    #[default]
    #[value(name = "block")]
    BlockContent,
}
