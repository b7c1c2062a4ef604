//! `srcset` construction: width planning, aspect-ratio math and provider URLs.

use super::args::{CanonicalKey, TransformArgs};
use super::dimensions::Dimensions;
use super::provider::{Provider, is_document_relative, strip_query};
use super::widths::{self, WidthPolicy, WidthSet};
use crate::types::Skip;
use std::fmt;

/// One `srcset` candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrcsetEntry {
    pub width: u32,
    /// `None` when the computed height was out of range and left to the provider.
    pub height: Option<u32>,
    pub url: String,
}

impl fmt::Display for SrcsetEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}w", self.url, self.width)
    }
}

/// Join entries the way browsers expect them.
pub fn join(entries: &[SrcsetEntry]) -> String {
    entries
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// SVG sources are served as-is.
pub fn is_vector(url: &str) -> bool {
    let url = url.trim();
    if url
        .get(..14)
        .is_some_and(|scheme| scheme.eq_ignore_ascii_case("data:image/svg"))
    {
        return true;
    }
    let path = strip_query(url).to_ascii_lowercase();
    path.ends_with(".svg") || path.ends_with(".svgz")
}

/// Pixel width of a `sizes` value that is a single fixed slot (`"400px"`).
pub fn fixed_slot_width(sizes: &str) -> Option<u32> {
    sizes
        .trim()
        .strip_suffix("px")
        .and_then(|n| n.trim().parse().ok())
        .filter(|&n| n > 0)
}

/// Builds `srcset` strings for one provider and width policy.
#[derive(Debug, Clone)]
pub struct SrcsetTransformer {
    provider: Provider,
    policy: WidthPolicy,
    base_args: TransformArgs,
}

impl SrcsetTransformer {
    /// `overrides` sit on top of the provider defaults for every URL built.
    pub fn new(provider: Provider, policy: WidthPolicy, overrides: &TransformArgs) -> Self {
        let base_args = provider.default_args().merged(overrides);
        Self {
            provider,
            policy,
            base_args,
        }
    }

    pub fn provider(&self) -> &Provider {
        &self.provider
    }

    pub fn policy(&self) -> &WidthPolicy {
        &self.policy
    }

    /// Provider defaults with the configured overrides applied.
    pub fn base_args(&self) -> &TransformArgs {
        &self.base_args
    }

    /// Widths for an image, with a fixed `sizes` slot capping the band at
    /// three times the slot width.
    pub fn widths(&self, dims: Dimensions, sizes: &str) -> WidthSet {
        match fixed_slot_width(sizes) {
            Some(slot) => {
                let capped = WidthPolicy {
                    max_width: self
                        .policy
                        .max_width
                        .min(slot.saturating_mul(3))
                        .max(self.policy.min_width),
                    ..self.policy.clone()
                };
                widths::plan(dims.width, &capped)
            }
            None => widths::plan(dims.width, &self.policy),
        }
    }

    /// URL for `source_url` scaled to `width` with the aspect ratio of `dims`.
    pub fn sized_url(
        &self,
        source_url: &str,
        dims: Dimensions,
        width: u32,
        extra_args: &TransformArgs,
    ) -> String {
        let mut args = self.base_args.merged(extra_args);
        force_int(&mut args, CanonicalKey::Width, i64::from(width));
        force_int(
            &mut args,
            CanonicalKey::Height,
            i64::from(dims.height_for_width(width)),
        );
        self.provider.build_url(source_url, &args)
    }

    /// Plan the entries without joining them.
    pub fn plan(
        &self,
        source_url: &str,
        dims: Option<Dimensions>,
        sizes: &str,
        extra_args: &TransformArgs,
    ) -> Result<Vec<SrcsetEntry>, Skip> {
        if is_vector(source_url) {
            return Err(Skip::VectorImage);
        }
        let dims = dims
            .filter(|d| d.width > 0 && d.height > 0)
            .ok_or(Skip::UnresolvedDimensions)?;
        if self.provider.is_transformed(source_url) {
            return Err(Skip::AlreadyTransformed);
        }
        if is_document_relative(source_url) {
            return Err(Skip::RelativeUrl);
        }

        let widths = self.widths(dims, sizes);
        let mut args = self.base_args.merged(extra_args);
        if widths.is_single() {
            force_int(&mut args, CanonicalKey::Dpr, 2);
        }

        let entries = widths
            .iter()
            .filter_map(|width| {
                let mut entry_args = args.clone();
                if let Err(e) = entry_args.set_int(CanonicalKey::Width, i64::from(width)) {
                    log::debug!("skipping srcset width for {source_url}: {e}");
                    return None;
                }
                let height = dims.height_for_width(width);
                let height = force_int(&mut entry_args, CanonicalKey::Height, i64::from(height))
                    .then_some(height);
                Some(SrcsetEntry {
                    width,
                    height,
                    url: self.provider.build_url(source_url, &entry_args),
                })
            })
            .collect();
        Ok(entries)
    }

    /// The `srcset` value for `source_url`, or an empty string when the
    /// image should not get one.
    pub fn transform(
        &self,
        source_url: &str,
        dims: Option<Dimensions>,
        sizes: &str,
        extra_args: &TransformArgs,
    ) -> String {
        match self.plan(source_url, dims, sizes, extra_args) {
            Ok(entries) => join(&entries),
            Err(skip) => {
                log::debug!("no srcset for {source_url}: {skip}");
                String::new()
            }
        }
    }
}

/// Set a computed value, clearing any caller value for the key if it does
/// not validate. Returns whether the value was stored.
fn force_int(args: &mut TransformArgs, key: CanonicalKey, value: i64) -> bool {
    match args.set_int(key, value) {
        Ok(()) => true,
        Err(e) => {
            log::debug!("{e}");
            args.remove(key);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::args::ArgValue;

    fn cloudflare() -> SrcsetTransformer {
        SrcsetTransformer::new(
            Provider::Cloudflare,
            WidthPolicy::default(),
            &TransformArgs::new(),
        )
    }

    fn dims(w: u32, h: u32) -> Option<Dimensions> {
        Dimensions::new(w, h)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    #[test]
    fn vector_detection() {
        assert!(is_vector("/a/logo.svg"));
        assert!(is_vector("/a/logo.SVG?v=2"));
        assert!(is_vector("data:image/svg+xml;base64,AAAA"));
        assert!(!is_vector("/a/svg-photo.jpg"));
    }

    #[test]
    fn fixed_slot_width_parsing() {
        assert_eq!(fixed_slot_width("400px"), Some(400));
        assert_eq!(fixed_slot_width(" 400 px "), Some(400));
        assert_eq!(fixed_slot_width("100vw"), None);
        assert_eq!(fixed_slot_width("(max-width: 600px) 100vw, 600px"), None);
        assert_eq!(fixed_slot_width(""), None);
    }

    // =========================================================================
    // transform
    // =========================================================================

    #[test]
    fn transform_1200x800_default_policy() {
        let srcset = cloudflare().transform("/uploads/a.jpg", dims(1200, 800), "", &TransformArgs::new());
        let entries: Vec<&str> = srcset.split(", ").collect();
        assert_eq!(entries.len(), 12);
        assert_eq!(
            entries[0],
            "/cdn-cgi/image/dpr=1,f=auto,fit=cover,g=auto,h=200,q=85,w=300/uploads/a.jpg 300w"
        );
        assert!(entries.iter().all(|e| e.ends_with('w')));
        assert!(entries.last().unwrap().ends_with(" 2400w"));
    }

    #[test]
    fn transform_preserves_aspect_ratio() {
        let entries = cloudflare()
            .plan("/a.jpg", dims(1000, 333), "", &TransformArgs::new())
            .unwrap();
        for entry in &entries {
            let expected = (entry.width as f64 * 333.0 / 1000.0).round() as u32;
            assert_eq!(entry.height, Some(expected.max(1)), "width {}", entry.width);
            assert!(entry.url.contains(&format!("h={expected},")));
        }
    }

    #[test]
    fn single_width_forces_dpr_2() {
        let srcset = cloudflare().transform("/small.png", dims(100, 50), "", &TransformArgs::new());
        assert_eq!(
            srcset,
            "/cdn-cgi/image/dpr=2,f=auto,fit=cover,g=auto,h=50,q=85,w=100/small.png 100w"
        );
    }

    #[test]
    fn short_circuits_return_empty() {
        let t = cloudflare();
        let none = TransformArgs::new();
        assert_eq!(t.transform("/logo.svg", dims(800, 600), "", &none), "");
        assert_eq!(t.transform("/a.jpg", None, "", &none), "");
        assert_eq!(
            t.transform("/a.jpg", Some(Dimensions { width: 0, height: 10 }), "", &none),
            ""
        );
        assert_eq!(
            t.transform("/cdn-cgi/image/w=300/a.jpg", dims(800, 600), "", &none),
            ""
        );
    }

    #[test]
    fn plan_reports_skip_reason() {
        let t = cloudflare();
        let none = TransformArgs::new();
        assert_eq!(t.plan("/x.svg", dims(1, 1), "", &none), Err(Skip::VectorImage));
        assert_eq!(t.plan("/x.jpg", None, "", &none), Err(Skip::UnresolvedDimensions));
        assert_eq!(
            t.plan("/cdn-cgi/image/w=1/x.jpg", dims(1, 1), "", &none),
            Err(Skip::AlreadyTransformed)
        );
        assert_eq!(
            t.plan("img/x.jpg", dims(1, 1), "", &none),
            Err(Skip::RelativeUrl)
        );
    }

    #[test]
    fn caller_args_win_but_computed_size_wins_over_caller() {
        let extra = TransformArgs::from_raw([("quality", "60"), ("w", "10"), ("fit", "contain")]);
        let entries = cloudflare().plan("/a.jpg", dims(400, 200), "", &extra).unwrap();
        let first = &entries[0];
        assert_eq!(first.width, 400);
        assert!(first.url.contains("q=60"));
        assert!(first.url.contains("fit=contain"));
        assert!(first.url.contains("w=400"));
        assert!(!first.url.contains("w=10,") && !first.url.ends_with("w=10/a.jpg"));
    }

    #[test]
    fn configured_overrides_sit_between_defaults_and_caller() {
        let overrides = TransformArgs::from_raw([("q", "70"), ("sharpen", "2")]);
        let t = SrcsetTransformer::new(Provider::Cloudflare, WidthPolicy::default(), &overrides);
        assert_eq!(t.base_args().get(CanonicalKey::Quality), Some(&ArgValue::Int(70)));

        let entries = t
            .plan("/a.jpg", dims(100, 100), "", &TransformArgs::from_raw([("q", "50")]))
            .unwrap();
        assert!(entries[0].url.contains("q=50"));
        assert!(entries[0].url.contains("sharpen=2"));
    }

    #[test]
    fn out_of_range_widths_are_dropped() {
        // 6000 > the 5000 width limit; the planned band stays
        let entries = cloudflare()
            .plan("/huge.jpg", dims(6000, 3000), "", &TransformArgs::new())
            .unwrap();
        assert!(entries.iter().all(|e| e.width <= 2400));
        assert!(!entries.is_empty());
    }

    #[test]
    fn out_of_range_height_is_omitted() {
        // 100 wide plans a single width; 10000 tall is past the height limit
        let entries = cloudflare()
            .plan("/tall.jpg", dims(100, 10000), "", &TransformArgs::new())
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].height, None);
        assert!(!entries[0].url.contains("h="));
    }

    #[test]
    fn fixed_sizes_caps_planned_widths() {
        let t = cloudflare();
        let widths = t.widths(Dimensions::new(2000, 1000).unwrap(), "400px");
        assert!(widths.iter().all(|w| w <= 1200 || w == 2000), "{widths:?}");
        assert!(widths.contains(2000));

        // never capped below the band floor
        let widths = t.widths(Dimensions::new(2000, 1000).unwrap(), "50px");
        assert!(widths.contains(300));
    }

    #[test]
    fn sized_url_sets_both_sides() {
        let url = cloudflare().sized_url(
            "/a.jpg",
            Dimensions::new(1200, 800).unwrap(),
            600,
            &TransformArgs::new(),
        );
        assert_eq!(
            url,
            "/cdn-cgi/image/dpr=1,f=auto,fit=cover,g=auto,h=400,q=85,w=600/a.jpg"
        );
    }

    #[test]
    fn query_providers_join_with_ampersands() {
        let t = SrcsetTransformer::new(
            Provider::AcceleratedDomains,
            WidthPolicy::default(),
            &TransformArgs::new(),
        );
        let srcset = t.transform("https://e.com/a.jpg", dims(100, 100), "", &TransformArgs::new());
        assert_eq!(
            srcset,
            "https://e.com/acd-cgi/img/v1/a.jpg?dpr=2&f=auto&fit=cover&g=auto&h=100&q=85&w=100 100w"
        );
    }
}
