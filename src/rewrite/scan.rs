//! Tag location and attribute parsing for the rewriter.
//!
//! This is not an HTML parser. It finds the handful of tags the rewriter
//! cares about (`img`, `figure`, `picture`), skips comments and raw-text
//! elements, and parses attributes with quote awareness so a `>` inside an
//! attribute value never ends a tag early.

use regex::Regex;
use std::borrow::Cow;
use std::fmt;
use std::ops::Range;
use std::sync::LazyLock;

static TAG_START: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<!--|<(/?)(img|figure|picture|script|style)(?:[\s/>]|$)").unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagName {
    Img,
    Figure,
    Picture,
}

impl TagName {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Img => "img",
            Self::Figure => "figure",
            Self::Picture => "picture",
        }
    }
}

/// One located tag. Spans are byte ranges into the scanned content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Open { name: TagName, span: Range<usize> },
    Close { name: TagName, span: Range<usize> },
    /// A tag that starts but never ends.
    Unterminated { name: TagName, offset: usize },
}

/// Locate every `img`/`figure`/`picture` tag, left to right.
pub fn tokenize(content: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut pos = 0;

    while let Some(caps) = TAG_START.captures_at(content, pos) {
        let Some(whole) = caps.get(0) else { break };
        let start = whole.start();

        let Some(name) = caps.get(2) else {
            // comment
            pos = content[start + 4..]
                .find("-->")
                .map(|i| start + 4 + i + 3)
                .unwrap_or(content.len());
            continue;
        };
        let closing = caps.get(1).is_some_and(|m| !m.is_empty());
        let lowered = name.as_str().to_ascii_lowercase();

        let tag = match lowered.as_str() {
            "img" => TagName::Img,
            "figure" => TagName::Figure,
            "picture" => TagName::Picture,
            raw_text => {
                pos = if closing {
                    name.end()
                } else {
                    skip_raw_text(content, name.end(), raw_text)
                };
                continue;
            }
        };

        let end = if closing {
            content[name.end()..].find('>').map(|i| name.end() + i + 1)
        } else {
            parse_attributes(content, name.end()).map(|(_, end)| end)
        };
        match end {
            Some(end) if closing => {
                tokens.push(Token::Close {
                    name: tag,
                    span: start..end,
                });
                pos = end;
            }
            Some(end) => {
                tokens.push(Token::Open {
                    name: tag,
                    span: start..end,
                });
                pos = end;
            }
            None => {
                tokens.push(Token::Unterminated {
                    name: tag,
                    offset: start,
                });
                pos = name.end();
            }
        }
    }
    tokens
}

/// Position just past `</name>` for a `script`/`style` element, or the end
/// of the content when it is never closed.
fn skip_raw_text(content: &str, from: usize, name: &str) -> usize {
    let closing = format!("</{name}");
    let haystack = content[from..].to_ascii_lowercase();
    match haystack.find(&closing) {
        Some(i) => {
            let close_start = from + i;
            content[close_start..]
                .find('>')
                .map(|j| close_start + j + 1)
                .unwrap_or(content.len())
        }
        None => content.len(),
    }
}

// ============================================================================
// Attributes
// ============================================================================

/// A single attribute. Untouched attributes keep their exact source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    name: String,
    value: Option<String>,
    raw: Option<String>,
}

impl Attribute {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Decoded value; a bare attribute such as `hidden` reads as `""`.
    pub fn value(&self) -> &str {
        self.value.as_deref().unwrap_or("")
    }
}

/// Attributes in source order. Names are matched case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes(Vec<Attribute>);

impl Attributes {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.find(name).map(|i| self.0[i].value())
    }

    pub fn has(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    /// Replace in place, or append when absent.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let attr = Attribute {
            name: name.to_ascii_lowercase(),
            value: Some(value.into()),
            raw: None,
        };
        match self.find(name) {
            Some(i) => self.0[i] = attr,
            None => self.0.push(attr),
        }
    }

    pub fn set_if_absent(&mut self, name: &str, value: impl Into<String>) {
        if !self.has(name) {
            self.set(name, value);
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.find(name)
            .map(|i| self.0.remove(i).value.unwrap_or_default())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.0.iter()
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.get("class").unwrap_or("").split_ascii_whitespace()
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes().any(|c| c == class)
    }

    pub fn add_class(&mut self, class: &str) {
        if self.has_class(class) {
            return;
        }
        let mut classes: Vec<&str> = self.classes().collect();
        classes.push(class);
        let joined = classes.join(" ");
        self.set("class", joined);
    }

    /// Remove every class matching `pred` and return them in order.
    pub fn take_classes(&mut self, pred: impl Fn(&str) -> bool) -> Vec<String> {
        let (taken, kept): (Vec<&str>, Vec<&str>) = self.classes().partition(|&c| pred(c));
        if taken.is_empty() {
            return Vec::new();
        }
        let taken: Vec<String> = taken.into_iter().map(str::to_string).collect();
        let kept = kept.join(" ");
        if kept.is_empty() {
            self.remove("class");
        } else {
            self.set("class", kept);
        }
        taken
    }

    fn find(&self, name: &str) -> Option<usize> {
        self.0.iter().position(|a| a.name.eq_ignore_ascii_case(name))
    }
}

/// Each attribute with its leading space, ready to follow a tag name.
impl fmt::Display for Attributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for attr in &self.0 {
            match (&attr.raw, &attr.value) {
                (Some(raw), _) => write!(f, " {raw}")?,
                (None, Some(value)) => write!(f, " {}=\"{}\"", attr.name, escape_attr(value))?,
                (None, None) => write!(f, " {}", attr.name)?,
            }
        }
        Ok(())
    }
}

/// Parse attributes starting right after a tag name.
///
/// Returns the attributes and the position just past the closing `>`, or
/// `None` if the tag is never closed.
pub fn parse_attributes(content: &str, from: usize) -> Option<(Attributes, usize)> {
    let bytes = content.as_bytes();
    let mut attrs = Vec::new();
    let mut i = from;

    loop {
        while i < bytes.len() && (bytes[i].is_ascii_whitespace() || bytes[i] == b'/') {
            i += 1;
        }
        if i >= bytes.len() {
            return None;
        }
        if bytes[i] == b'>' {
            return Some((Attributes(attrs), i + 1));
        }

        let name_start = i;
        while i < bytes.len()
            && !bytes[i].is_ascii_whitespace()
            && !matches!(bytes[i], b'=' | b'>' | b'/')
        {
            i += 1;
        }
        let name = &content[name_start..i];

        let mut j = i;
        while j < bytes.len() && bytes[j].is_ascii_whitespace() {
            j += 1;
        }
        if j < bytes.len() && bytes[j] == b'=' {
            j += 1;
            while j < bytes.len() && bytes[j].is_ascii_whitespace() {
                j += 1;
            }
            if j >= bytes.len() {
                return None;
            }
            let (value, value_end) = match bytes[j] {
                quote @ (b'"' | b'\'') => {
                    let close = content[j + 1..].find(quote as char)? + j + 1;
                    (&content[j + 1..close], close + 1)
                }
                _ => {
                    let mut k = j;
                    while k < bytes.len() && !bytes[k].is_ascii_whitespace() && bytes[k] != b'>' {
                        k += 1;
                    }
                    (&content[j..k], k)
                }
            };
            attrs.push(Attribute {
                name: name.to_ascii_lowercase(),
                value: Some(decode_entities(value).into_owned()),
                raw: Some(content[name_start..value_end].to_string()),
            });
            i = value_end;
        } else {
            attrs.push(Attribute {
                name: name.to_ascii_lowercase(),
                value: None,
                raw: Some(name.to_string()),
            });
        }
    }
}

/// Decode the character references that matter inside attribute values.
/// Unknown named references are left as written.
pub fn decode_entities(value: &str) -> Cow<'_, str> {
    if !value.contains('&') {
        return Cow::Borrowed(value);
    }
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let decoded = rest.find(';').filter(|&semi| semi <= 10).and_then(|semi| {
            let entity = &rest[1..semi];
            let ch = match entity {
                "amp" => Some('&'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "lt" => Some('<'),
                "gt" => Some('>'),
                _ => {
                    let code = if let Some(hex) = entity
                        .strip_prefix("#x")
                        .or_else(|| entity.strip_prefix("#X"))
                    {
                        u32::from_str_radix(hex, 16).ok()
                    } else {
                        entity.strip_prefix('#').and_then(|d| d.parse().ok())
                    };
                    code.and_then(char::from_u32)
                }
            };
            ch.map(|c| (c, semi + 1))
        });
        match decoded {
            Some((c, consumed)) => {
                out.push(c);
                rest = &rest[consumed..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

/// Escape a value for a double-quoted attribute.
pub fn escape_attr(value: &str) -> Cow<'_, str> {
    if !value.contains(['&', '"', '<', '>']) {
        return Cow::Borrowed(value);
    }
    let mut out = String::with_capacity(value.len() + 8);
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    Cow::Owned(out)
}

// ============================================================================
// Elements
// ============================================================================

/// A matched element within the content being rewritten.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageElement {
    pub tag_name: TagName,
    pub attributes: Attributes,
    pub source_offset: usize,
    pub source_length: usize,
    /// Written as `<img ... />`.
    pub self_closing: bool,
}

impl ImageElement {
    /// Parse the opening tag at `span`.
    pub fn parse(content: &str, tag_name: TagName, span: Range<usize>) -> Option<Self> {
        let name_end = span.start + 1 + tag_name.as_str().len();
        let (attributes, end) = parse_attributes(content, name_end)?;
        if end != span.end {
            return None;
        }
        let self_closing = content[span.start..end - 1].trim_end().ends_with('/');
        Some(Self {
            tag_name,
            attributes,
            source_offset: span.start,
            source_length: span.end - span.start,
            self_closing,
        })
    }

    pub fn span(&self) -> Range<usize> {
        self.source_offset..self.source_offset + self.source_length
    }
}
