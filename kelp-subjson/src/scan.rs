// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! JSON text scanner.
//!
//! Locates the byte span of the value addressed by a parsed path without
//! building a tree, so that lookups can alias the document buffer and
//! mutations can be expressed as text splices. The scanner only walks the
//! containers the path actually descends into.

use std::ops::Range;

use crate::path::Component;
use crate::{Result, SubjsonError, MAX_DOC_DEPTH};

/// Shape of a JSON value, judged from its first byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Kind {
    Object,
    Array,
    Scalar,
}

pub(crate) fn kind_of(first: u8) -> Kind {
    match first {
        b'{' => Kind::Object,
        b'[' => Kind::Array,
        _ => Kind::Scalar,
    }
}

/// One element of a container: `start` is the first byte of the element
/// (the key for objects), `value` the span of its value text.
#[derive(Debug, Clone)]
pub(crate) struct Entry {
    pub start: usize,
    pub key: Option<Range<usize>>,
    pub value: Range<usize>,
}

/// Parsed top level of a single container.
#[derive(Debug, Clone)]
pub(crate) struct Layout {
    pub kind: Kind,
    pub open: usize,
    pub close: usize,
    pub entries: Vec<Entry>,
}

/// Outcome of walking a path over the document text.
#[derive(Debug)]
pub(crate) enum Resolution {
    /// Every component matched. `elem` carries the container and entry index
    /// of the final match (absent for the empty path, which addresses the
    /// document root).
    Full {
        value: Range<usize>,
        elem: Option<(Layout, usize)>,
    },
    /// `comps[..matched]` matched, the next component was not found in
    /// `layout`.
    Missing { matched: usize, layout: Layout },
}

fn skip_ws(doc: &[u8], mut pos: usize) -> usize {
    while pos < doc.len() && matches!(doc[pos], b' ' | b'\t' | b'\n' | b'\r') {
        pos += 1;
    }
    pos
}

fn skip_string(doc: &[u8], pos: usize) -> Result<usize> {
    debug_assert_eq!(doc[pos], b'"');
    let mut pos = pos + 1;
    while pos < doc.len() {
        match doc[pos] {
            b'"' => return Ok(pos + 1),
            b'\\' => pos += 2,
            _ => pos += 1,
        }
    }
    Err(SubjsonError::DocNotJson)
}

fn skip_literal(doc: &[u8], pos: usize, literal: &[u8]) -> Result<usize> {
    if doc.len() >= pos + literal.len() && &doc[pos..pos + literal.len()] == literal {
        Ok(pos + literal.len())
    } else {
        Err(SubjsonError::DocNotJson)
    }
}

fn skip_number(doc: &[u8], pos: usize) -> usize {
    let mut end = pos;
    while end < doc.len()
        && matches!(doc[end], b'0'..=b'9' | b'-' | b'+' | b'.' | b'e' | b'E')
    {
        end += 1;
    }
    end
}

/// Skip one JSON value starting at `pos` (no leading whitespace). `depth` is
/// the container-nesting level this value sits at; `max_seen` records the
/// deepest level visited. A container past `limit` fails `DocEtoodeep`.
fn skip_value(
    doc: &[u8],
    pos: usize,
    depth: usize,
    limit: usize,
    max_seen: &mut usize,
) -> Result<usize> {
    let first = *doc.get(pos).ok_or(SubjsonError::DocNotJson)?;
    match first {
        b'{' | b'[' => {
            if depth > limit {
                return Err(SubjsonError::DocEtoodeep);
            }
            if depth > *max_seen {
                *max_seen = depth;
            }
            if first == b'{' {
                skip_object(doc, pos, depth, limit, max_seen)
            } else {
                skip_array(doc, pos, depth, limit, max_seen)
            }
        }
        b'"' => skip_string(doc, pos),
        b't' => skip_literal(doc, pos, b"true"),
        b'f' => skip_literal(doc, pos, b"false"),
        b'n' => skip_literal(doc, pos, b"null"),
        b'-' | b'0'..=b'9' => Ok(skip_number(doc, pos)),
        _ => Err(SubjsonError::DocNotJson),
    }
}

fn skip_object(
    doc: &[u8],
    open: usize,
    depth: usize,
    limit: usize,
    max_seen: &mut usize,
) -> Result<usize> {
    let mut pos = skip_ws(doc, open + 1);
    if doc.get(pos) == Some(&b'}') {
        return Ok(pos + 1);
    }
    loop {
        if doc.get(pos) != Some(&b'"') {
            return Err(SubjsonError::DocNotJson);
        }
        pos = skip_string(doc, pos)?;
        pos = skip_ws(doc, pos);
        if doc.get(pos) != Some(&b':') {
            return Err(SubjsonError::DocNotJson);
        }
        pos = skip_ws(doc, pos + 1);
        pos = skip_value(doc, pos, depth + 1, limit, max_seen)?;
        pos = skip_ws(doc, pos);
        match doc.get(pos) {
            Some(b',') => pos = skip_ws(doc, pos + 1),
            Some(b'}') => return Ok(pos + 1),
            _ => return Err(SubjsonError::DocNotJson),
        }
    }
}

fn skip_array(
    doc: &[u8],
    open: usize,
    depth: usize,
    limit: usize,
    max_seen: &mut usize,
) -> Result<usize> {
    let mut pos = skip_ws(doc, open + 1);
    if doc.get(pos) == Some(&b']') {
        return Ok(pos + 1);
    }
    loop {
        pos = skip_value(doc, pos, depth + 1, limit, max_seen)?;
        pos = skip_ws(doc, pos);
        match doc.get(pos) {
            Some(b',') => pos = skip_ws(doc, pos + 1),
            Some(b']') => return Ok(pos + 1),
            _ => return Err(SubjsonError::DocNotJson),
        }
    }
}

/// Span of the single top-level value in `doc`, with surrounding whitespace
/// trimmed. Verifies structural well-formedness, the nesting limit, and
/// that nothing trails the value.
pub(crate) fn trimmed_span(doc: &[u8]) -> Result<Range<usize>> {
    let start = skip_ws(doc, 0);
    let mut max_seen = 0;
    let end = skip_value(doc, start, 1, MAX_DOC_DEPTH, &mut max_seen)?;
    if skip_ws(doc, end) != doc.len() {
        return Err(SubjsonError::DocNotJson);
    }
    Ok(start..end)
}

/// Container nesting depth of a standalone value (0 for scalars). The value
/// is assumed to already be known-valid JSON.
pub(crate) fn value_depth(value: &[u8]) -> Result<usize> {
    let start = skip_ws(value, 0);
    let mut max_seen = 0;
    skip_value(value, start, 1, usize::MAX, &mut max_seen)?;
    Ok(max_seen)
}

/// Parse the top level of the container at `span`.
pub(crate) fn layout_of(doc: &[u8], span: Range<usize>) -> Result<Layout> {
    let kind = kind_of(doc[span.start]);
    let open = span.start;
    let mut entries = Vec::new();
    let mut max_seen = 0;
    let mut pos = skip_ws(doc, open + 1);

    let closer = match kind {
        Kind::Object => b'}',
        Kind::Array => b']',
        Kind::Scalar => return Err(SubjsonError::PathMismatch),
    };

    if doc.get(pos) == Some(&closer) {
        return Ok(Layout {
            kind,
            open,
            close: pos,
            entries,
        });
    }

    loop {
        let start = pos;
        let key = if kind == Kind::Object {
            if doc.get(pos) != Some(&b'"') {
                return Err(SubjsonError::DocNotJson);
            }
            let key_end = skip_string(doc, pos)?;
            let key_span = pos..key_end;
            pos = skip_ws(doc, key_end);
            if doc.get(pos) != Some(&b':') {
                return Err(SubjsonError::DocNotJson);
            }
            pos = skip_ws(doc, pos + 1);
            Some(key_span)
        } else {
            None
        };

        let value_start = pos;
        let value_end = skip_value(doc, pos, 1, usize::MAX, &mut max_seen)?;
        entries.push(Entry {
            start,
            key,
            value: value_start..value_end,
        });

        pos = skip_ws(doc, value_end);
        match doc.get(pos) {
            Some(b',') => pos = skip_ws(doc, pos + 1),
            Some(c) if *c == closer => {
                return Ok(Layout {
                    kind,
                    open,
                    close: pos,
                    entries,
                });
            }
            _ => return Err(SubjsonError::DocNotJson),
        }
    }
}

/// Compare a JSON key token (quotes included) against a path component key.
fn key_matches(doc: &[u8], token: &Range<usize>, want: &str) -> bool {
    let inner = &doc[token.start + 1..token.end - 1];
    if !inner.contains(&b'\\') {
        return inner == want.as_bytes();
    }
    match serde_json::from_slice::<String>(&doc[token.clone()]) {
        Ok(key) => key == want,
        Err(_) => false,
    }
}

/// Walk `comps` down from `root`, returning either the full match or where
/// the walk stopped. Structure disagreements (key into an array, subscript
/// into an object, descending through a scalar) are `PathMismatch`.
pub(crate) fn resolve(
    doc: &[u8],
    root: Range<usize>,
    comps: &[Component<'_>],
) -> Result<Resolution> {
    let mut span = root;
    let mut last: Option<(Layout, usize)> = None;

    for (k, comp) in comps.iter().enumerate() {
        match (comp, kind_of(doc[span.start])) {
            (Component::Key(_), Kind::Object) | (Component::Index(_), Kind::Array) => {}
            _ => return Err(SubjsonError::PathMismatch),
        }
        let layout = layout_of(doc, span.clone())?;

        let found = match comp {
            Component::Key(name) => layout
                .entries
                .iter()
                .position(|e| key_matches(doc, e.key.as_ref().expect("object entry"), name)),
            Component::Index(i) => {
                let len = layout.entries.len() as i64;
                let idx = if *i < 0 { len + *i } else { *i };
                (0..len).contains(&idx).then_some(idx as usize)
            }
        };

        match found {
            Some(idx) => {
                span = layout.entries[idx].value.clone();
                last = Some((layout, idx));
            }
            None => return Ok(Resolution::Missing { matched: k, layout }),
        }
    }

    Ok(Resolution::Full { value: span, elem: last })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::parse_path;

    fn full_span(doc: &str, path: &str) -> Range<usize> {
        let comps = parse_path(path).unwrap();
        let root = trimmed_span(doc.as_bytes()).unwrap();
        match resolve(doc.as_bytes(), root, &comps).unwrap() {
            Resolution::Full { value, .. } => value,
            other => panic!("expected full match, got {other:?}"),
        }
    }

    #[test]
    fn test_trimmed_span() {
        assert_eq!(trimmed_span(b"  {\"a\":1} ").unwrap(), 2..9);
        assert_eq!(trimmed_span(b"42").unwrap(), 0..2);
        assert!(matches!(
            trimmed_span(b"{\"a\":1} junk"),
            Err(SubjsonError::DocNotJson)
        ));
        assert!(matches!(trimmed_span(b"{\"a\":}"), Err(SubjsonError::DocNotJson)));
    }

    #[test]
    fn test_depth_limit() {
        let mut doc = String::new();
        for _ in 0..MAX_DOC_DEPTH + 1 {
            doc.push('[');
        }
        for _ in 0..MAX_DOC_DEPTH + 1 {
            doc.push(']');
        }
        assert!(matches!(
            trimmed_span(doc.as_bytes()),
            Err(SubjsonError::DocEtoodeep)
        ));
    }

    #[test]
    fn test_value_depth() {
        assert_eq!(value_depth(b"5").unwrap(), 0);
        assert_eq!(value_depth(b"[1,2]").unwrap(), 1);
        assert_eq!(value_depth(b"{\"a\":[{\"b\":1}]}").unwrap(), 3);
    }

    #[test]
    fn test_resolve_nested() {
        let doc = r#"{"a":[1,{"b":"x"},3],"c":{"d":null}}"#;
        assert_eq!(&doc[full_span(doc, "a[1].b")], "\"x\"");
        assert_eq!(&doc[full_span(doc, "a[-1]")], "3");
        assert_eq!(&doc[full_span(doc, "c.d")], "null");
        assert_eq!(&doc[full_span(doc, "")], doc);
    }

    #[test]
    fn test_resolve_escaped_key() {
        let doc = r#"{"a\"b":1}"#;
        let comps = parse_path("`a\"b`").unwrap();
        let root = trimmed_span(doc.as_bytes()).unwrap();
        match resolve(doc.as_bytes(), root, &comps).unwrap() {
            Resolution::Full { value, .. } => assert_eq!(&doc[value], "1"),
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn test_resolve_missing_and_mismatch() {
        let doc = r#"{"a":[1,2],"s":"str"}"#;
        let root = trimmed_span(doc.as_bytes()).unwrap();

        let comps = parse_path("zz").unwrap();
        assert!(matches!(
            resolve(doc.as_bytes(), root.clone(), &comps).unwrap(),
            Resolution::Missing { matched: 0, .. }
        ));

        let comps = parse_path("a[5]").unwrap();
        assert!(matches!(
            resolve(doc.as_bytes(), root.clone(), &comps).unwrap(),
            Resolution::Missing { matched: 1, .. }
        ));

        let comps = parse_path("a.key").unwrap();
        assert!(matches!(
            resolve(doc.as_bytes(), root.clone(), &comps),
            Err(SubjsonError::PathMismatch)
        ));

        let comps = parse_path("s.deeper").unwrap();
        assert!(matches!(
            resolve(doc.as_bytes(), root, &comps),
            Err(SubjsonError::PathMismatch)
        ));
    }

    #[test]
    fn test_layout_entries() {
        let doc = br#"{ "x" : 1 , "y" : [2, 3] }"#;
        let layout = layout_of(doc, 0..doc.len()).unwrap();
        assert_eq!(layout.kind, Kind::Object);
        assert_eq!(layout.entries.len(), 2);
        assert_eq!(doc[layout.close], b'}');
        let y = &layout.entries[1];
        assert_eq!(&doc[y.value.clone()], b"[2, 3]");
    }
}
