//! URL-level transformation: arguments, providers and `srcset` planning.
//!
//! | Piece | What it does |
//! |---|---|
//! | **Args** | Canonical keys, aliases, per-key validation and normalization |
//! | **Provider** | URL grammar for each supported endpoint, plus double-transform detection |
//! | **Widths** | Pure width planning with gap filling |
//! | **Srcset** | Widths + aspect ratio + provider → `srcset` string |
//! | **Dimensions** | Attribute, registry and file-header resolution of original sizes |
//!
//! Nothing here touches markup. The [`rewrite`](crate::rewrite) module sits on
//! top and decides which elements get transformed.

pub mod args;
pub mod dimensions;
pub mod provider;
pub mod srcset;
pub mod widths;

pub use args::{ArgError, ArgValue, CanonicalKey, TransformArgs, canonicalize};
pub use dimensions::{
    DimensionResolver, DimensionSource, Dimensions, FileInspector, ImageHints, ImageInspector,
    InspectError, SizeRegistry,
};
pub use provider::Provider;
pub use srcset::{SrcsetEntry, SrcsetTransformer};
pub use widths::{WidthPolicy, WidthSet};
