//! HTML fragment rewriting.
//!
//! A rewrite is one forward pass over the content:
//!
//! ```text
//! tokenize   locate img / figure / picture tags (comments and scripts skipped)
//! match      bare <img>, or <figure> holding exactly one <img>
//! transform  resolve dimensions, new src/srcset/sizes, marker class
//! collect    (span, replacement) pairs, in source order, never overlapping
//! splice     copy the content once, swapping each span for its replacement
//! ```
//!
//! Because replacements are collected against the original offsets and applied
//! in a single rebuild, a longer replacement can never shift a later match.
//!
//! Anything already inside a `<picture>` (including our own sizing container)
//! is left alone, which makes `rewrite(rewrite(x)) == rewrite(x)`.

pub mod markup;
pub mod scan;

use crate::transform::{
    DimensionResolver, DimensionSource, Dimensions, ImageHints, SrcsetTransformer, TransformArgs,
};
use crate::transform::dimensions::parse_dimension_attr;
use crate::transform::provider::is_document_relative;
use crate::transform::srcset::is_vector;
use crate::types::{Context, Skip};
use markup::{PROCESSED_CLASS, is_alignment_class, render_container, render_img};
use scan::{ImageElement, TagName, Token};
use std::collections::BTreeMap;
use std::ops::Range;

/// What happened to one matched element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementReport {
    pub tag: TagName,
    /// Byte offset of the element in the input.
    pub offset: usize,
    pub src: String,
    pub result: Result<DimensionSource, Skip>,
}

/// Rewritten content plus a per-element account of the pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteOutcome {
    pub content: String,
    pub elements: Vec<ElementReport>,
}

impl RewriteOutcome {
    pub fn rewritten(&self) -> usize {
        self.elements.iter().filter(|e| e.result.is_ok()).count()
    }

    pub fn skip_counts(&self) -> BTreeMap<Skip, usize> {
        let mut counts = BTreeMap::new();
        for skip in self.elements.iter().filter_map(|e| e.result.err()) {
            *counts.entry(skip).or_insert(0) += 1;
        }
        counts
    }
}

struct Replacement {
    span: Range<usize>,
    markup: String,
}

/// Shape of a `<figure>` as seen from its opening tag.
enum FigureShape {
    /// Exactly one `<img>`, no nested figure or picture.
    Convertible { img: usize, close: usize },
    /// Nothing to convert; scan its children like any other content.
    Transparent,
    /// No closing tag.
    Unclosed,
}

/// Rewrites image markup against one provider configuration.
pub struct Rewriter {
    transformer: SrcsetTransformer,
    resolver: DimensionResolver,
}

impl Rewriter {
    pub fn new(transformer: SrcsetTransformer, resolver: DimensionResolver) -> Self {
        Self {
            transformer,
            resolver,
        }
    }

    pub fn transformer(&self) -> &SrcsetTransformer {
        &self.transformer
    }

    pub fn resolver(&self) -> &DimensionResolver {
        &self.resolver
    }

    /// Rewrite `content`. Content with nothing to rewrite comes back unchanged.
    pub fn rewrite(&self, content: &str, context: Context) -> RewriteOutcome {
        let tokens = scan::tokenize(content);
        let mut replacements = Vec::new();
        let mut elements = Vec::new();
        let mut picture_depth = 0usize;

        let mut i = 0;
        while i < tokens.len() {
            match &tokens[i] {
                Token::Open {
                    name: TagName::Picture,
                    ..
                } => picture_depth += 1,
                Token::Close {
                    name: TagName::Picture,
                    ..
                } => picture_depth = picture_depth.saturating_sub(1),
                Token::Open {
                    name: TagName::Figure,
                    span,
                } if picture_depth == 0 && context == Context::BlockContent => {
                    match figure_shape(&tokens, i) {
                        FigureShape::Convertible { img, close } => {
                            let (report, replacement) =
                                self.rewrite_figure(content, span, &tokens[img], &tokens[close]);
                            elements.push(report);
                            replacements.extend(replacement);
                            i = close + 1;
                            continue;
                        }
                        FigureShape::Unclosed => {
                            elements.push(skipped(
                                TagName::Figure,
                                span.start,
                                String::new(),
                                Skip::MalformedMarkup,
                            ));
                        }
                        FigureShape::Transparent => {}
                    }
                }
                Token::Open {
                    name: TagName::Img,
                    span,
                } => {
                    let parsed = ImageElement::parse(content, TagName::Img, span.clone());
                    match parsed {
                        None => elements.push(skipped(
                            TagName::Img,
                            span.start,
                            String::new(),
                            Skip::MalformedMarkup,
                        )),
                        Some(el) if picture_depth > 0 => {
                            let src = el.attributes.get("src").unwrap_or("").to_string();
                            elements.push(skipped(
                                TagName::Img,
                                span.start,
                                src,
                                Skip::AlreadyProcessed,
                            ));
                        }
                        Some(el) => {
                            let (report, replacement) = self.rewrite_bare_img(el);
                            elements.push(report);
                            replacements.extend(replacement);
                        }
                    }
                    if context == Context::StandaloneImage {
                        break;
                    }
                }
                Token::Unterminated { name, offset } if *name != TagName::Picture => {
                    elements.push(skipped(*name, *offset, String::new(), Skip::MalformedMarkup));
                }
                _ => {}
            }
            i += 1;
        }

        RewriteOutcome {
            content: splice(content, &replacements),
            elements,
        }
    }

    fn rewrite_bare_img(&self, mut img: ImageElement) -> (ElementReport, Option<Replacement>) {
        let src = img.attributes.get("src").unwrap_or("").trim().to_string();
        let offset = img.source_offset;

        match self.transform_img(&mut img) {
            Ok((dims, source)) => {
                let align = img.attributes.take_classes(is_alignment_class);
                let inner = render_img(&img.attributes, img.self_closing);
                let replacement = Replacement {
                    span: img.span(),
                    markup: render_container(&align, dims, &inner),
                };
                (
                    ElementReport {
                        tag: TagName::Img,
                        offset,
                        src,
                        result: Ok(source),
                    },
                    Some(replacement),
                )
            }
            Err(skip) => (skipped(TagName::Img, offset, src, skip), None),
        }
    }

    fn rewrite_figure(
        &self,
        content: &str,
        open: &Range<usize>,
        img: &Token,
        close: &Token,
    ) -> (ElementReport, Option<Replacement>) {
        let (Token::Open { span: img_span, .. }, Token::Close { span: close_span, .. }) =
            (img, close)
        else {
            return (
                skipped(TagName::Figure, open.start, String::new(), Skip::MalformedMarkup),
                None,
            );
        };
        let figure = ImageElement::parse(content, TagName::Figure, open.clone());
        let img = ImageElement::parse(content, TagName::Img, img_span.clone());
        let (Some(figure), Some(mut img)) = (figure, img) else {
            return (
                skipped(TagName::Figure, open.start, String::new(), Skip::MalformedMarkup),
                None,
            );
        };

        let src = img.attributes.get("src").unwrap_or("").trim().to_string();
        let (dims, source) = match self.transform_img(&mut img) {
            Ok(resolved) => resolved,
            Err(skip) => return (skipped(TagName::Figure, open.start, src, skip), None),
        };

        let classes: Vec<String> = figure.attributes.classes().map(str::to_string).collect();
        let inner = format!(
            "{}{}{}",
            &content[open.end..img_span.start],
            render_img(&img.attributes, img.self_closing),
            &content[img_span.end..close_span.start],
        );
        let replacement = Replacement {
            span: open.start..close_span.end,
            markup: render_container(&classes, dims, &inner),
        };
        (
            ElementReport {
                tag: TagName::Figure,
                offset: open.start,
                src,
                result: Ok(source),
            },
            Some(replacement),
        )
    }

    /// Mutate `img` into its transformed form, or say why it must stay as is.
    /// Nothing is touched unless dimensions resolve.
    fn transform_img(&self, img: &mut ImageElement) -> Result<(Dimensions, DimensionSource), Skip> {
        let attrs = &img.attributes;
        if attrs.has_class(PROCESSED_CLASS) {
            return Err(Skip::AlreadyProcessed);
        }
        let src = attrs.get("src").unwrap_or("").trim().to_string();
        if src.is_empty() {
            return Err(Skip::MalformedMarkup);
        }
        if is_vector(&src) {
            return Err(Skip::VectorImage);
        }
        if src.starts_with("data:") {
            return Err(Skip::InlineData);
        }
        if self.transformer.provider().is_transformed(&src) {
            return Err(Skip::AlreadyTransformed);
        }
        if is_document_relative(&src) {
            return Err(Skip::RelativeUrl);
        }

        let hints = ImageHints {
            src: &src,
            width: attrs.get("width"),
            height: attrs.get("height"),
            class: attrs.get("class").unwrap_or(""),
        };
        let (dims, source) = self
            .resolver
            .resolve(&hints)
            .ok_or(Skip::UnresolvedDimensions)?;

        let sizes = match attrs.get("sizes") {
            Some(sizes) if !sizes.trim().is_empty() => sizes.to_string(),
            _ => format!("(max-width: {w}px) 100vw, {w}px", w = dims.width),
        };
        let none = TransformArgs::new();
        let srcset = self.transformer.transform(&src, Some(dims), &sizes, &none);
        let new_src = self.transformer.sized_url(&src, dims, dims.width, &none);

        let attrs = &mut img.attributes;
        attrs.set("src", new_src);
        if !srcset.is_empty() {
            attrs.set("srcset", srcset);
        }
        attrs.set_if_absent("sizes", sizes);
        let (width, height) = display_size(
            dims,
            attrs.get("width").and_then(parse_dimension_attr),
            attrs.get("height").and_then(parse_dimension_attr),
        );
        for (name, value) in [("width", width), ("height", height)] {
            if attrs.get(name) != Some(value.to_string().as_str()) {
                attrs.set(name, value.to_string());
            }
        }
        attrs.set_if_absent("loading", "lazy");
        attrs.set_if_absent("decoding", "async");
        attrs.add_class(PROCESSED_CLASS);
        Ok((dims, source))
    }
}

/// The `width`/`height` pair to write: an author-given side is kept and the
/// other follows the image's aspect ratio.
fn display_size(dims: Dimensions, width: Option<u32>, height: Option<u32>) -> (u32, u32) {
    match (width, height) {
        (Some(w), Some(h)) => (w, h),
        (Some(w), None) => (w, dims.height_for_width(w)),
        (None, Some(h)) => (dims.width_for_height(h), h),
        (None, None) => (dims.width, dims.height),
    }
}

fn skipped(tag: TagName, offset: usize, src: String, skip: Skip) -> ElementReport {
    log::debug!("leaving <{}> at byte {offset} unchanged: {skip}", tag.as_str());
    ElementReport {
        tag,
        offset,
        src,
        result: Err(skip),
    }
}

fn figure_shape(tokens: &[Token], open: usize) -> FigureShape {
    let mut img = None;
    for (j, token) in tokens.iter().enumerate().skip(open + 1) {
        match token {
            Token::Close {
                name: TagName::Figure,
                ..
            } => {
                return match img {
                    Some(img) => FigureShape::Convertible { img, close: j },
                    None => FigureShape::Transparent,
                };
            }
            Token::Open {
                name: TagName::Figure | TagName::Picture,
                ..
            } => return FigureShape::Transparent,
            Token::Open {
                name: TagName::Img, ..
            } => {
                if img.is_some() {
                    return FigureShape::Transparent;
                }
                img = Some(j);
            }
            Token::Unterminated { .. } => return FigureShape::Transparent,
            _ => {}
        }
    }
    FigureShape::Unclosed
}

/// Rebuild `content` with each span swapped for its replacement. Spans must
/// be in ascending order and must not overlap.
fn splice(content: &str, replacements: &[Replacement]) -> String {
    if replacements.is_empty() {
        return content.to_string();
    }
    let added: usize = replacements.iter().map(|r| r.markup.len()).sum();
    let mut out = String::with_capacity(content.len() + added);
    let mut cursor = 0;
    for replacement in replacements {
        out.push_str(&content[cursor..replacement.span.start]);
        out.push_str(&replacement.markup);
        cursor = replacement.span.end;
    }
    out.push_str(&content[cursor..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::dimensions::tests::MockInspector;
    use crate::transform::{Provider, SizeRegistry, WidthPolicy};

    fn rewriter_with(inspector: Option<MockInspector>) -> Rewriter {
        let transformer = SrcsetTransformer::new(
            Provider::Cloudflare,
            WidthPolicy::default(),
            &TransformArgs::new(),
        );
        let named = BTreeMap::from([("large".to_string(), Dimensions::new(1024, 768).unwrap())]);
        let inspector = inspector.map(|i| Box::new(i) as Box<dyn crate::transform::ImageInspector>);
        Rewriter::new(
            transformer,
            DimensionResolver::new(SizeRegistry::new(named), inspector),
        )
    }

    fn rewriter() -> Rewriter {
        rewriter_with(None)
    }

    fn block(html: &str) -> RewriteOutcome {
        rewriter().rewrite(html, Context::BlockContent)
    }

    // =========================================================================
    // Bare images
    // =========================================================================

    #[test]
    fn bare_img_is_wrapped_and_transformed() {
        let out = block(r#"<p><img src="/u/a.jpg" width="1200" height="800" alt="A"></p>"#);
        let html = &out.content;
        assert!(html.starts_with(
            "<p><picture class=\"edge-images-container\" \
             style=\"--aspect-ratio:3/2;--max-width:1200px;\"><img "
        ));
        assert!(html.contains(
            r#"src="/cdn-cgi/image/dpr=1,f=auto,fit=cover,g=auto,h=800,q=85,w=1200/u/a.jpg""#
        ));
        assert!(html.contains(r#"srcset="/cdn-cgi/image/"#));
        assert!(html.contains(" 2400w"));
        assert!(html.contains(r#"sizes="(max-width: 1200px) 100vw, 1200px""#));
        assert!(html.contains(r#"loading="lazy" decoding="async" class="edge-images-processed""#));
        assert!(html.contains(r#"alt="A""#));
        assert!(html.ends_with("</picture></p>"));
        assert_eq!(out.rewritten(), 1);
    }

    #[test]
    fn alignment_class_moves_to_container() {
        let out = block(r#"<img class="alignright size-large" src="/u/a.jpg">"#);
        let html = &out.content;
        assert!(html.starts_with(
            "<picture class=\"edge-images-container alignright\" \
             style=\"--aspect-ratio:4/3;--max-width:1024px;\">"
        ));
        assert!(html.contains(r#"class="size-large edge-images-processed""#));
        assert_eq!(out.elements[0].result, Ok(DimensionSource::Registered));
    }

    #[test]
    fn existing_attributes_are_kept() {
        let out = block(
            r#"<img src="/u/a.jpg" width="600" height="400" loading="eager" sizes="50vw" srcset="/old.jpg 600w" />"#,
        );
        let html = &out.content;
        assert!(html.contains(r#"loading="eager""#));
        assert!(!html.contains("loading=\"lazy\""));
        assert!(html.contains(r#"sizes="50vw""#));
        assert!(!html.contains("/old.jpg"));
        assert!(html.contains(" /></picture>"));
    }

    #[test]
    fn width_only_img_gets_proportional_height() {
        let out = block(r#"<img src="/u/photo-300x200.jpg" width="150">"#);
        let html = &out.content;
        assert!(html.contains(r#"width="150""#), "{html}");
        assert!(html.contains(r#"height="100""#), "{html}");
        assert!(html.contains("--aspect-ratio:3/2;--max-width:300px;"));
        assert_eq!(out.elements[0].result, Ok(DimensionSource::Registered));
    }

    #[test]
    fn height_only_img_gets_proportional_width() {
        let out = block(r#"<img src="/u/photo-300x200.jpg" height="50px">"#);
        let html = &out.content;
        assert!(html.contains(r#"height="50""#), "{html}");
        assert!(html.contains(r#"width="75""#), "{html}");
    }

    #[test]
    fn display_size_follows_aspect_ratio() {
        let dims = Dimensions::new(1200, 800).unwrap();
        assert_eq!(display_size(dims, None, None), (1200, 800));
        assert_eq!(display_size(dims, Some(600), None), (600, 400));
        assert_eq!(display_size(dims, None, Some(200)), (300, 200));
        assert_eq!(display_size(dims, Some(10), Some(10)), (10, 10));
    }

    // =========================================================================
    // Offsets
    // =========================================================================

    #[test]
    fn sibling_images_both_rewritten() {
        let html = r#"<img src="/a.jpg" width="1200" height="800"><span>mid</span><img src="/b.jpg" width="400" height="400">"#;
        let out = block(html);
        assert_eq!(out.rewritten(), 2);
        assert!(out.content.contains("<span>mid</span>"));
        assert!(out.content.contains(",w=1200/a.jpg"));
        assert!(out.content.contains(",w=400/b.jpg"));
        assert!(out.content.contains("--aspect-ratio:1/1;--max-width:400px;"));
        assert_eq!(out.content.matches("<picture").count(), 2);
    }

    #[test]
    fn skipped_image_between_rewrites_is_byte_identical() {
        let middle = r#"<img src="/nodims.jpg" alt="x">"#;
        let html = format!(
            r#"<img src="/a.jpg" width="10" height="10">{middle}<img src="/b.jpg" width="10" height="10">"#
        );
        let out = block(&html);
        assert!(out.content.contains(middle));
        assert_eq!(out.rewritten(), 2);
        assert_eq!(
            out.skip_counts(),
            BTreeMap::from([(Skip::UnresolvedDimensions, 1)])
        );
    }

    // =========================================================================
    // Skips
    // =========================================================================

    #[test]
    fn unchanged_input_for_skips() {
        for html in [
            r#"<img src="/logo.svg" width="10" height="10">"#,
            r#"<img src="data:image/png;base64,AAAA" width="10" height="10">"#,
            r#"<img src="/cdn-cgi/image/w=300/a.jpg" width="10" height="10">"#,
            r#"<img class="edge-images-processed" src="/a.jpg" width="10" height="10">"#,
            r#"<img src="/a.jpg">"#,
            r#"<img alt="no src">"#,
            r#"<picture><source srcset="/a.avif"><img src="/a.jpg" width="10" height="10"></picture>"#,
            "no images here",
            "",
        ] {
            assert_eq!(block(html).content, html, "changed: {html}");
        }
    }

    #[test]
    fn skip_reasons_are_reported() {
        let out = block(
            r#"<img src="/a.svg"><img src="data:image/gif;base64,R0"><img src="/cdn-cgi/image/w=1/a.jpg"><img src="uploads/b-300x200.jpg"><img src="/x.jpg"><img alt="">"#,
        );
        let reasons: Vec<_> = out.elements.iter().map(|e| e.result).collect();
        assert_eq!(
            reasons,
            [
                Err(Skip::VectorImage),
                Err(Skip::InlineData),
                Err(Skip::AlreadyTransformed),
                Err(Skip::RelativeUrl),
                Err(Skip::UnresolvedDimensions),
                Err(Skip::MalformedMarkup),
            ]
        );
    }

    #[test]
    fn unterminated_tag_is_left_alone() {
        let html = r#"<img src="/a.jpg" width="10" height="10"><img src="/b.jpg"#;
        let out = block(html);
        assert_eq!(out.rewritten(), 1);
        assert!(out.content.ends_with(r#"<img src="/b.jpg"#));
        assert_eq!(out.elements[1].result, Err(Skip::MalformedMarkup));
    }

    #[test]
    fn commented_images_are_ignored() {
        let html = r#"<!-- <img src="/a.jpg" width="10" height="10"> -->"#;
        let out = block(html);
        assert_eq!(out.content, html);
        assert!(out.elements.is_empty());
    }

    // =========================================================================
    // Figures
    // =========================================================================

    #[test]
    fn figure_becomes_container() {
        let html = r#"<figure class="wp-block-image alignwide"><a href="/big.jpg"><img src="/u/a-300x200.jpg" alt=""></a><figcaption>Cap</figcaption></figure>"#;
        let out = block(html);
        let content = &out.content;
        assert!(content.starts_with(
            "<picture class=\"edge-images-container wp-block-image alignwide\" \
             style=\"--aspect-ratio:3/2;--max-width:300px;\"><a href=\"/big.jpg\"><img "
        ));
        assert!(content.ends_with("</a><figcaption>Cap</figcaption></picture>"));
        assert!(!content.contains("<figure"));
        assert_eq!(out.elements[0].tag, TagName::Figure);
    }

    #[test]
    fn figure_without_dimensions_is_untouched() {
        let html = r#"<figure class="x"><img src="/a.jpg"></figure>"#;
        let out = block(html);
        assert_eq!(out.content, html);
        assert_eq!(out.elements[0].result, Err(Skip::UnresolvedDimensions));
    }

    #[test]
    fn gallery_figures_convert_individually() {
        let html = r#"<figure class="gallery"><figure class="a"><img src="/a-10x10.jpg"></figure><figure class="b"><img src="/b-20x10.jpg"></figure></figure>"#;
        let out = block(html);
        assert_eq!(out.rewritten(), 2);
        assert!(out.content.starts_with(r#"<figure class="gallery"><picture class="edge-images-container a""#));
        assert!(out.content.ends_with("</picture></figure>"));
    }

    #[test]
    fn figure_with_two_images_wraps_each() {
        let html = r#"<figure><img src="/a-10x10.jpg"><img src="/b-10x10.jpg"></figure>"#;
        let out = block(html);
        assert_eq!(out.rewritten(), 2);
        assert!(out.content.starts_with("<figure><picture"));
    }

    #[test]
    fn unclosed_figure_reports_and_continues() {
        let html = r#"<figure class="x"><img src="/a-10x10.jpg">"#;
        let out = block(html);
        assert_eq!(out.elements[0].result, Err(Skip::MalformedMarkup));
        assert_eq!(out.rewritten(), 1);
    }

    // =========================================================================
    // Context
    // =========================================================================

    #[test]
    fn standalone_only_first_image_and_no_figure_conversion() {
        let html = r#"<figure class="x"><img src="/a-10x10.jpg"></figure><img src="/b-10x10.jpg">"#;
        let out = rewriter().rewrite(html, Context::StandaloneImage);
        assert_eq!(out.rewritten(), 1);
        assert!(out.content.starts_with("<figure class=\"x\"><picture"));
        assert!(out.content.ends_with(r#"<img src="/b-10x10.jpg">"#));
    }

    // =========================================================================
    // Resolution and idempotence
    // =========================================================================

    #[test]
    fn file_tier_used_last() {
        let inspector = MockInspector::with(&[("/a.jpg", 800, 600)]);
        let rewriter = rewriter_with(Some(inspector));
        let out = rewriter.rewrite(r#"<img src="/a.jpg">"#, Context::BlockContent);
        assert_eq!(out.elements[0].result, Ok(DimensionSource::File));
        assert!(out.content.contains(r#"width="800" height="600""#));
    }

    #[test]
    fn rewrite_is_idempotent() {
        let html = r#"<p>x</p><img class="aligncenter" src="/a.jpg" width="1200" height="800"><figure class="f"><img src="/b-300x300.jpg"></figure><img src="/c.jpg"><img src="/d.svg">"#;
        let r = rewriter();
        let once = r.rewrite(html, Context::BlockContent).content;
        let twice = r.rewrite(&once, Context::BlockContent).content;
        assert_eq!(once, twice);
        assert_ne!(once, html);
    }

    #[test]
    fn splice_applies_in_order() {
        let replacements = [
            Replacement {
                span: 0..1,
                markup: "AAA".to_string(),
            },
            Replacement {
                span: 2..3,
                markup: String::new(),
            },
        ];
        assert_eq!(splice("a-b-c", &replacements), "AAA--c");
    }
}
