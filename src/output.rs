//! CLI output formatting.
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format functions
//! are pure: they never touch the filesystem or the terminal.
//!
//! ```text
//! content/post.html: 2 rewritten, 1 skipped
//!     img @120 /uploads/a.jpg (attributes)
//!     img @480 /logo.svg skipped: vector image
//! ```

use crate::rewrite::RewriteOutcome;
use crate::transform::{ArgError, SrcsetEntry, TransformArgs};
use std::path::Path;

// ============================================================================
// Helpers
// ============================================================================

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn plural(n: usize, one: &str, many: &str) -> String {
    if n == 1 {
        format!("{n} {one}")
    } else {
        format!("{n} {many}")
    }
}

/// Shorten long URLs for display, keeping the tail which identifies the file.
fn truncate_src(src: &str, max: usize) -> String {
    let count = src.chars().count();
    if count <= max {
        src.to_string()
    } else {
        let tail: String = src.chars().skip(count - max).collect();
        format!("...{tail}")
    }
}

// ============================================================================
// rewrite
// ============================================================================

/// One header line per file, then skip reasons grouped with their counts.
///
/// ```text
/// post.html: 3 rewritten, 2 skipped
///     unresolved dimensions: 1
///     already transformed: 1
/// ```
pub fn format_rewrite_summary(path: &Path, outcome: &RewriteOutcome) -> Vec<String> {
    let skips = outcome.skip_counts();
    let skipped: usize = skips.values().sum();
    let mut lines = vec![format!(
        "{}: {} rewritten, {} skipped",
        path.display(),
        outcome.rewritten(),
        skipped
    )];
    for (reason, count) in skips {
        lines.push(format!("{}{reason}: {count}", indent(1)));
    }
    lines
}

/// Every matched element with its source offset and result.
pub fn format_rewrite_details(path: &Path, outcome: &RewriteOutcome) -> Vec<String> {
    let mut lines = vec![format!("{}:", path.display())];
    for element in &outcome.elements {
        let head = format!(
            "{}{} @{} {}",
            indent(1),
            element.tag.as_str(),
            element.offset,
            truncate_src(&element.src, 60)
        );
        match element.result {
            Ok(source) => lines.push(format!("{head} ({})", source_label(source))),
            Err(skip) => lines.push(format!("{head} skipped: {skip}")),
        }
    }
    lines
}

fn source_label(source: crate::transform::DimensionSource) -> &'static str {
    use crate::transform::DimensionSource;
    match source {
        DimensionSource::Attributes => "attributes",
        DimensionSource::Registered => "registered",
        DimensionSource::File => "file",
    }
}

/// Closing line after a multi-file run.
pub fn format_rewrite_totals(files: usize, rewritten: usize, skipped: usize) -> Vec<String> {
    vec![format!(
        "==> {}, {}, {}",
        plural(files, "file", "files"),
        plural(rewritten, "image rewritten", "images rewritten"),
        plural(skipped, "skipped", "skipped")
    )]
}

pub fn print_rewrite_summary(path: &Path, outcome: &RewriteOutcome, detailed: bool) {
    let lines = if detailed {
        format_rewrite_details(path, outcome)
    } else {
        format_rewrite_summary(path, outcome)
    };
    for line in lines {
        eprintln!("{}", line);
    }
}

pub fn print_rewrite_totals(files: usize, rewritten: usize, skipped: usize) {
    for line in format_rewrite_totals(files, rewritten, skipped) {
        eprintln!("{}", line);
    }
}

// ============================================================================
// srcset
// ============================================================================

/// One candidate per line, with the height when known.
///
/// ```text
/// 300x200 /cdn-cgi/image/.../a.jpg
/// ```
pub fn format_srcset(entries: &[SrcsetEntry]) -> Vec<String> {
    entries
        .iter()
        .map(|e| match e.height {
            Some(h) => format!("{}x{} {}", e.width, h, e.url),
            None => format!("{}w {}", e.width, e.url),
        })
        .collect()
}

pub fn print_srcset(entries: &[SrcsetEntry]) {
    for line in format_srcset(entries) {
        println!("{}", line);
    }
}

// ============================================================================
// args
// ============================================================================

/// Resolved arguments as pretty JSON, followed by whatever was dropped.
pub fn format_args_output(
    args: &TransformArgs,
    dropped: &[ArgError],
) -> Result<Vec<String>, serde_json::Error> {
    let json = serde_json::to_string_pretty(args)?;
    let mut lines: Vec<String> = json.lines().map(str::to_string).collect();
    if !dropped.is_empty() {
        lines.push(format!("Dropped ({}):", dropped.len()));
        for err in dropped {
            lines.push(format!("{}{err}", indent(1)));
        }
    }
    Ok(lines)
}

pub fn print_args_output(
    args: &TransformArgs,
    dropped: &[ArgError],
) -> Result<(), serde_json::Error> {
    for line in format_args_output(args, dropped)? {
        println!("{}", line);
    }
    Ok(())
}
