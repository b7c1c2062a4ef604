//! Serialization of rewritten `<img>` tags and the sizing container.

use super::scan::Attributes;
use crate::transform::Dimensions;
use maud::{Markup, PreEscaped, html};

/// Class on the `<picture>` that fixes an image's aspect ratio and width.
pub const CONTAINER_CLASS: &str = "edge-images-container";

/// Class added to every `<img>` this crate has rewritten.
pub const PROCESSED_CLASS: &str = "edge-images-processed";

/// Alignment classes that belong on the container rather than the image.
pub fn is_alignment_class(class: &str) -> bool {
    matches!(
        class,
        "alignleft" | "alignright" | "aligncenter" | "alignwide" | "alignfull" | "alignnone"
    )
}

pub fn render_img(attrs: &Attributes, self_closing: bool) -> String {
    if self_closing {
        format!("<img{attrs} />")
    } else {
        format!("<img{attrs}>")
    }
}

/// `--aspect-ratio:3/2;--max-width:1200px;`
pub fn container_style(dims: Dimensions) -> String {
    let (w, h) = dims.reduced_ratio();
    format!("--aspect-ratio:{w}/{h};--max-width:{}px;", dims.width)
}

/// Wrap already-serialized `inner` markup in the sizing container.
pub fn render_container(classes: &[String], dims: Dimensions, inner: &str) -> String {
    let mut class = String::from(CONTAINER_CLASS);
    for extra in classes.iter().filter(|c| c.as_str() != CONTAINER_CLASS) {
        class.push(' ');
        class.push_str(extra);
    }
    container(&class, &container_style(dims), inner).into_string()
}

fn container(class: &str, style: &str, inner: &str) -> Markup {
    html! {
        picture class=(class) style=(style) {
            (PreEscaped(inner))
        }
    }
}
