//! # Edge Images
//!
//! Rewrites HTML image markup so images are served through an edge image
//! transformation service (Cloudflare, Accelerated Domains, imgix, bunny.net).
//! Each `<img>` with known dimensions gets a provider URL, a responsive
//! `srcset`, a `sizes` hint and a container that reserves its aspect ratio.
//!
//! # Architecture
//!
//! Three layers, each usable on its own:
//!
//! ```text
//! transform   args + provider + widths  →  URLs and srcset strings
//! rewrite     HTML fragment             →  HTML fragment (uses transform)
//! pipeline    config                    →  the three host entry points
//! ```
//!
//! Nothing here does I/O except [`transform::FileInspector`], which reads image
//! headers under a configured document root when neither attributes nor
//! registered sizes give an image's dimensions.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`transform`] | Argument aliases and validation, provider URL syntax, width planning, dimension resolution, `srcset` |
//! | [`rewrite`] | Tolerant tag scanner, `<img>`/`<figure>` rewriting, container markup via Maud |
//! | [`pipeline`] | [`Pipeline`]: `rewrite`, `build_transformed_url`, `build_srcset` bound to one configuration |
//! | [`config`] | `config.toml` loading, merging over stock defaults, validation |
//! | [`types`] | [`Skip`] reasons and the rewrite [`Context`] |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Nothing Fails the Page
//!
//! A bad argument, a missing file or malformed markup never aborts a rewrite.
//! The element is left as it was and the reason is reported as a [`Skip`].
//! Only configuration errors are returned as `Err`, and only at load time.
//!
//! ## Idempotent Output
//!
//! Rewritten images carry a marker class and sit inside a `<picture>`; URLs
//! already pointing at the provider are recognized. Running the rewrite on its
//! own output returns it unchanged.
//!
//! ## Scanner, Not Parser
//!
//! Content comes from editors and plugins and is often not valid HTML. The
//! [`rewrite`] scanner finds only the tags it cares about, keeps every byte
//! between them, and re-emits untouched attributes exactly as written.

pub mod config;
pub mod output;
pub mod pipeline;
pub mod rewrite;
pub mod transform;
pub mod types;

pub use pipeline::Pipeline;
pub use types::{Context, Skip};
