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

//! Path parser.
//!
//! Grammar, informally:
//!
//! ```text
//! path      := "" | component ( subscript* ) ( "." component subscript* )*
//! component := plain-key | "`" quoted-key "`"
//! subscript := "[" index "]"
//! ```
//!
//! A doubled backtick inside a quoted key stands for a literal backtick.
//! The only negative index accepted is `-1` (last element).

use std::borrow::Cow;

use crate::{Result, SubjsonError, MAX_PATH_COMPONENTS};

/// One parsed path component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Component<'a> {
    /// Dictionary key.
    Key(Cow<'a, str>),
    /// Array subscript. `-1` addresses the last element.
    Index(i64),
}

impl Component<'_> {
    pub fn is_key(&self) -> bool {
        matches!(self, Component::Key(_))
    }
}

/// Parse a path into components. The empty path yields an empty vector and
/// addresses the document root.
pub fn parse_path(path: &str) -> Result<Vec<Component<'_>>> {
    let bytes = path.as_bytes();
    let mut comps = Vec::new();
    let mut pos = 0;

    if bytes.is_empty() {
        return Ok(comps);
    }

    loop {
        // A component starts here: quoted key, plain key, or a subscript
        // chain (subscripts may open a path, e.g. "[0].name").
        match bytes.get(pos) {
            Some(b'`') => {
                let (key, next) = parse_quoted(path, pos)?;
                push(&mut comps, Component::Key(key))?;
                pos = next;
            }
            Some(b'[') => {
                // Subscript with no preceding key is only legal at the very
                // start of the path or right after another subscript; the
                // loop structure below guarantees that.
            }
            Some(_) => {
                let (key, next) = parse_plain(path, pos)?;
                push(&mut comps, Component::Key(key))?;
                pos = next;
            }
            None => return Err(SubjsonError::PathEinval),
        }

        // Any number of subscripts.
        while bytes.get(pos) == Some(&b'[') {
            let (index, next) = parse_subscript(bytes, pos)?;
            push(&mut comps, Component::Index(index))?;
            pos = next;
        }

        match bytes.get(pos) {
            None => return Ok(comps),
            Some(b'.') => {
                pos += 1;
                if matches!(bytes.get(pos), None | Some(b'.') | Some(b'[')) {
                    return Err(SubjsonError::PathEinval);
                }
            }
            // Anything other than a separator after a component is a syntax
            // error (e.g. text after a closing backtick or bracket).
            Some(_) => return Err(SubjsonError::PathEinval),
        }
    }
}

fn push<'a>(comps: &mut Vec<Component<'a>>, comp: Component<'a>) -> Result<()> {
    if comps.len() == MAX_PATH_COMPONENTS {
        return Err(SubjsonError::PathE2big);
    }
    comps.push(comp);
    Ok(())
}

fn parse_plain(path: &str, start: usize) -> Result<(Cow<'_, str>, usize)> {
    let bytes = path.as_bytes();
    let mut end = start;
    while end < bytes.len() && bytes[end] != b'.' && bytes[end] != b'[' {
        if bytes[end] == b']' || bytes[end] == b'`' {
            return Err(SubjsonError::PathEinval);
        }
        end += 1;
    }
    if end == start {
        return Err(SubjsonError::PathEinval);
    }
    Ok((Cow::Borrowed(&path[start..end]), end))
}

fn parse_quoted(path: &str, start: usize) -> Result<(Cow<'_, str>, usize)> {
    let bytes = path.as_bytes();
    debug_assert_eq!(bytes[start], b'`');
    let mut key = String::new();
    let mut pos = start + 1;
    loop {
        match bytes.get(pos) {
            Some(b'`') => {
                if bytes.get(pos + 1) == Some(&b'`') {
                    key.push('`');
                    pos += 2;
                } else {
                    // Closing backtick. Empty quoted keys are legal JSON
                    // keys, so they are accepted here.
                    return Ok((Cow::Owned(key), pos + 1));
                }
            }
            Some(_) => {
                // Consume one full UTF-8 character.
                let ch = path[pos..].chars().next().ok_or(SubjsonError::PathEinval)?;
                key.push(ch);
                pos += ch.len_utf8();
            }
            None => return Err(SubjsonError::PathEinval),
        }
    }
}

fn parse_subscript(bytes: &[u8], start: usize) -> Result<(i64, usize)> {
    debug_assert_eq!(bytes[start], b'[');
    let mut pos = start + 1;
    let negative = bytes.get(pos) == Some(&b'-');
    if negative {
        pos += 1;
    }

    let digits_start = pos;
    while pos < bytes.len() && bytes[pos].is_ascii_digit() {
        pos += 1;
    }
    if pos == digits_start || bytes.get(pos) != Some(&b']') {
        return Err(SubjsonError::PathEinval);
    }

    let text = std::str::from_utf8(&bytes[digits_start..pos]).expect("ascii digits");
    let magnitude: i64 = text.parse().map_err(|_| SubjsonError::PathEinval)?;
    let index = if negative { -magnitude } else { magnitude };
    // Only [-1] is meaningful among negatives.
    if negative && index != -1 {
        return Err(SubjsonError::PathEinval);
    }
    Ok((index, pos + 1))
}
