//! Tag marker scanning.
//!
//! Decides, from the bytes following a `<`, whether the input holds a
//! complete tag marker, a literal `<`, or not enough text to tell yet. The
//! decision depends only on content, never on where a chunk ended, which is
//! what keeps classification independent of chunk boundaries.

/// Longest marker accepted as a tag, `<` and `>` included.
pub(crate) const MAX_TAG_LEN: usize = 256;

/// Shape of a recognised marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TagKind {
    /// `<name ...>`
    Open,
    /// `</name>`
    Close,
    /// `<name ... />`
    SelfClosing,
}

/// A complete tag marker copied out of the scanned input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Tag {
    pub kind: TagKind,
    pub name: String,
    /// Full marker text, `<` through `>`.
    pub raw: String,
}

/// Outcome of scanning at a `<`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Scan {
    Tag(Tag),
    /// The `<` is ordinary text.
    Literal,
    /// More input is needed to decide.
    Incomplete,
}

fn is_name_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_name_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b':' | b'.')
}

/// Scan the marker at the start of `input`, which must begin with `<`.
pub(crate) fn scan(input: &str) -> Scan {
    let bytes = input.as_bytes();
    if bytes.first() != Some(&b'<') {
        return Scan::Literal;
    }

    let closing = bytes.get(1) == Some(&b'/');
    let name_start = if closing { 2 } else { 1 };
    match bytes.get(name_start) {
        None => return Scan::Incomplete,
        Some(&b) if !is_name_start(b) => return Scan::Literal,
        Some(_) => {}
    }

    let mut end = None;
    for (idx, &b) in bytes.iter().enumerate().take(MAX_TAG_LEN).skip(1) {
        match b {
            b'>' => {
                end = Some(idx);
                break;
            }
            b'<' => return Scan::Literal,
            _ => {}
        }
    }
    let Some(end) = end else {
        return if bytes.len() >= MAX_TAG_LEN {
            Scan::Literal
        } else {
            Scan::Incomplete
        };
    };

    let inner = &input[name_start..end];
    let name_len = inner.bytes().take_while(|&b| is_name_char(b)).count();
    let name = &inner[..name_len];
    let rest = &inner[name_len..];

    let kind = if closing {
        if !rest.trim().is_empty() {
            return Scan::Literal;
        }
        TagKind::Close
    } else if rest.ends_with('/') {
        let attrs = &rest[..rest.len() - 1];
        if !attrs.is_empty() && !attrs.starts_with(char::is_whitespace) {
            return Scan::Literal;
        }
        TagKind::SelfClosing
    } else {
        if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
            return Scan::Literal;
        }
        TagKind::Open
    };

    Scan::Tag(Tag {
        kind,
        name: name.to_owned(),
        raw: input[..=end].to_owned(),
    })
}
