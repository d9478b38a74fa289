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

//! Operation execution.
//!
//! [`Operation`] is a reusable per-worker object: `clear()` it, run
//! `op_exec`, then read or take the [`OpResult`]. Results express mutations
//! as fragment lists over two buffers — the input document and the result's
//! own scratch — so a successful lookup never copies document bytes and a
//! mutation is at most one splice plus two document slices.

use std::borrow::Cow;
use std::ops::Range;

use serde_json::Value;
use smallvec::SmallVec;

use crate::path::{parse_path, Component};
use crate::scan::{self, Kind, Layout, Resolution};
use crate::{Command, ExecFlags, Result, SubjsonError, MAX_DOC_DEPTH};

/// A fragment location: either a slice of the input document or a slice of
/// the result's scratch buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Loc {
    Doc { start: usize, end: usize },
    Scratch { start: usize, end: usize },
}

impl Loc {
    pub fn len(&self) -> usize {
        match self {
            Loc::Doc { start, end } | Loc::Scratch { start, end } => end - start,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Result of one executed operation.
///
/// For read ops `matchloc()` names the located value; for mutation ops
/// `newdoc()` is an ordered fragment list which, concatenated, forms the new
/// document. Scratch-sourced fragments live inside this result, so the
/// result must outlive any use of the fragments.
#[derive(Debug, Default)]
pub struct OpResult {
    scratch: Vec<u8>,
    match_loc: Option<Loc>,
    newdoc: SmallVec<[Loc; 4]>,
}

impl OpResult {
    pub fn clear(&mut self) {
        self.scratch.clear();
        self.match_loc = None;
        self.newdoc.clear();
    }

    pub fn matchloc(&self) -> Option<Loc> {
        self.match_loc
    }

    pub fn newdoc(&self) -> &[Loc] {
        &self.newdoc
    }

    /// Total length of the document the fragments describe.
    pub fn newdoc_len(&self) -> usize {
        self.newdoc.iter().map(Loc::len).sum()
    }

    /// Resolve a fragment against the document this result was produced
    /// from.
    pub fn resolve<'a>(&'a self, loc: Loc, doc: &'a [u8]) -> &'a [u8] {
        match loc {
            Loc::Doc { start, end } => &doc[start..end],
            Loc::Scratch { start, end } => &self.scratch[start..end],
        }
    }

    /// Concatenate the newdoc fragments into an owned buffer.
    pub fn materialize(&self, doc: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.newdoc_len());
        for loc in &self.newdoc {
            out.extend_from_slice(self.resolve(*loc, doc));
        }
        out
    }

    fn push_scratch(&mut self, text: &[u8]) -> Loc {
        let start = self.scratch.len();
        self.scratch.extend_from_slice(text);
        Loc::Scratch {
            start,
            end: self.scratch.len(),
        }
    }

    /// newdoc = doc with `at` replaced by `text`.
    fn splice(&mut self, doc_len: usize, at: Range<usize>, text: &[u8]) {
        let scratch = self.push_scratch(text);
        self.newdoc.clear();
        if at.start > 0 {
            self.newdoc.push(Loc::Doc { start: 0, end: at.start });
        }
        if !scratch.is_empty() {
            self.newdoc.push(scratch);
        }
        if at.end < doc_len {
            self.newdoc.push(Loc::Doc { start: at.end, end: doc_len });
        }
    }

    /// newdoc = doc with `at` cut out.
    fn cut(&mut self, doc_len: usize, at: Range<usize>) {
        self.newdoc.clear();
        if at.start > 0 {
            self.newdoc.push(Loc::Doc { start: 0, end: at.start });
        }
        if at.end < doc_len {
            self.newdoc.push(Loc::Doc { start: at.end, end: doc_len });
        }
    }
}

/// Reusable operation executor. One per worker; reset with [`clear`] before
/// each use.
///
/// [`clear`]: Operation::clear
#[derive(Debug, Default)]
pub struct Operation {
    result: OpResult,
}

impl Operation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset state left over from the previous execution, keeping buffer
    /// capacity.
    pub fn clear(&mut self) {
        self.result.clear();
    }

    /// Borrow the result of the last successful execution.
    pub fn result(&self) -> &OpResult {
        &self.result
    }

    /// Move the result out, leaving an empty one behind.
    pub fn take_result(&mut self) -> OpResult {
        std::mem::take(&mut self.result)
    }

    /// Execute `code` against `doc`. `value` carries the operand for
    /// commands that take one (`None` otherwise); `path` is the raw path
    /// text.
    pub fn op_exec(
        &mut self,
        code: Command,
        flags: ExecFlags,
        doc: &[u8],
        path: &str,
        value: Option<&[u8]>,
    ) -> Result<()> {
        self.result.clear();

        // The document must be a single well-formed value within the
        // nesting limit before any path work happens.
        let root = scan::trimmed_span(doc)?;
        serde_json::from_slice::<serde::de::IgnoredAny>(doc)
            .map_err(|_| SubjsonError::DocNotJson)?;

        let comps = parse_path(path)?;

        match code {
            Command::Get | Command::Exists => self.exec_lookup(code, doc, root, &comps),
            Command::Replace => self.exec_replace(doc, root, &comps, required(value)?),
            Command::Remove => self.exec_remove(doc, root, &comps),
            Command::DictAdd | Command::DictUpsert => {
                self.exec_dict(code, flags, doc, root, &comps, required(value)?)
            }
            Command::ArrayAppend | Command::ArrayPrepend => {
                self.exec_array_push(code, flags, doc, root, &comps, required(value)?)
            }
            Command::ArrayAddUnique => {
                self.exec_array_add_unique(flags, doc, root, &comps, required(value)?)
            }
            Command::ArrayInsert => self.exec_array_insert(doc, root, &comps, required(value)?),
            Command::Counter => self.exec_counter(flags, doc, root, &comps, required(value)?),
        }
    }

    fn exec_lookup(
        &mut self,
        code: Command,
        doc: &[u8],
        root: Range<usize>,
        comps: &[Component<'_>],
    ) -> Result<()> {
        match scan::resolve(doc, root, comps)? {
            Resolution::Full { value, .. } => {
                if code == Command::Get {
                    self.result.match_loc = Some(Loc::Doc {
                        start: value.start,
                        end: value.end,
                    });
                }
                Ok(())
            }
            Resolution::Missing { .. } => Err(SubjsonError::PathEnoent),
        }
    }

    fn exec_replace(
        &mut self,
        doc: &[u8],
        root: Range<usize>,
        comps: &[Component<'_>],
        value: &[u8],
    ) -> Result<()> {
        let value = check_value(value)?;
        match scan::resolve(doc, root, comps)? {
            Resolution::Full { value: span, .. } => {
                check_insert_depth(comps.len(), value)?;
                self.result.splice(doc.len(), span, value);
                Ok(())
            }
            Resolution::Missing { .. } => Err(SubjsonError::PathEnoent),
        }
    }

    fn exec_remove(
        &mut self,
        doc: &[u8],
        root: Range<usize>,
        comps: &[Component<'_>],
    ) -> Result<()> {
        if comps.is_empty() {
            // The root is not removable; delete the whole key instead.
            return Err(SubjsonError::PathEinval);
        }
        match scan::resolve(doc, root, comps)? {
            Resolution::Full { elem, .. } => {
                let (layout, idx) = elem.expect("non-empty path has an element context");
                let at = removal_span(&layout, idx);
                self.result.cut(doc.len(), at);
                Ok(())
            }
            Resolution::Missing { .. } => Err(SubjsonError::PathEnoent),
        }
    }

    fn exec_dict(
        &mut self,
        code: Command,
        flags: ExecFlags,
        doc: &[u8],
        root: Range<usize>,
        comps: &[Component<'_>],
        value: &[u8],
    ) -> Result<()> {
        let value = check_value(value)?;
        let last = comps.last().ok_or(SubjsonError::PathEinval)?;
        let Component::Key(_) = last else {
            // Dictionary ops address a key, never a subscript.
            return Err(SubjsonError::PathEinval);
        };

        match scan::resolve(doc, root, comps)? {
            Resolution::Full { value: span, .. } => match code {
                Command::DictAdd => Err(SubjsonError::DocEexists),
                _ => {
                    check_insert_depth(comps.len(), value)?;
                    self.result.splice(doc.len(), span, value);
                    Ok(())
                }
            },
            Resolution::Missing { matched, layout } => {
                self.insert_missing(doc, comps, matched, &layout, flags, Cow::Borrowed(value))
            }
        }
    }

    fn exec_array_push(
        &mut self,
        code: Command,
        flags: ExecFlags,
        doc: &[u8],
        root: Range<usize>,
        comps: &[Component<'_>],
        value: &[u8],
    ) -> Result<()> {
        let value = check_value(value)?;
        match scan::resolve(doc, root, comps)? {
            Resolution::Full { value: span, .. } => {
                if scan::kind_of(doc[span.start]) != Kind::Array {
                    return Err(SubjsonError::PathMismatch);
                }
                let layout = scan::layout_of(doc, span)?;
                // Elements of this array sit one container below the path.
                check_insert_depth(comps.len() + 1, value)?;
                let (pos, text) = match (code, layout.entries.first()) {
                    (_, None) => (layout.close, value.to_vec()),
                    (Command::ArrayPrepend, Some(first)) => {
                        let mut text = value.to_vec();
                        text.push(b',');
                        (first.start, text)
                    }
                    (_, Some(_)) => {
                        let mut text = vec![b','];
                        text.extend_from_slice(value);
                        (layout.close, text)
                    }
                };
                self.result.splice(doc.len(), pos..pos, &text);
                Ok(())
            }
            Resolution::Missing { matched, layout } => {
                // The array itself is missing; only MKDIR_P materializes it,
                // with the pushed value as its only element.
                if !flags.mkdir_p {
                    return Err(SubjsonError::PathEnoent);
                }
                let mut wrapped = Vec::with_capacity(value.len() + 2);
                wrapped.push(b'[');
                wrapped.extend_from_slice(value);
                wrapped.push(b']');
                self.insert_missing(doc, comps, matched, &layout, flags, Cow::Owned(wrapped))
            }
        }
    }

    fn exec_array_add_unique(
        &mut self,
        flags: ExecFlags,
        doc: &[u8],
        root: Range<usize>,
        comps: &[Component<'_>],
        value: &[u8],
    ) -> Result<()> {
        let value = check_value(value)?;
        let candidate: Value =
            serde_json::from_slice(value).map_err(|_| SubjsonError::ValueCantinsert)?;
        if candidate.is_object() || candidate.is_array() {
            return Err(SubjsonError::ValueCantinsert);
        }

        if let Resolution::Full { value: span, .. } = scan::resolve(doc, root.clone(), comps)? {
            if scan::kind_of(doc[span.start]) != Kind::Array {
                return Err(SubjsonError::PathMismatch);
            }
            let layout = scan::layout_of(doc, span)?;
            for entry in &layout.entries {
                let elem: Value = serde_json::from_slice(&doc[entry.value.clone()])
                    .map_err(|_| SubjsonError::DocNotJson)?;
                if elem.is_object() || elem.is_array() {
                    // Uniqueness is only defined over primitive members.
                    return Err(SubjsonError::PathMismatch);
                }
                if elem == candidate {
                    return Err(SubjsonError::DocEexists);
                }
            }
        }

        self.exec_array_push(Command::ArrayAppend, flags, doc, root, comps, value)
    }

    fn exec_array_insert(
        &mut self,
        doc: &[u8],
        root: Range<usize>,
        comps: &[Component<'_>],
        value: &[u8],
    ) -> Result<()> {
        let value = check_value(value)?;
        let Some(Component::Index(idx)) = comps.last() else {
            return Err(SubjsonError::PathEinval);
        };
        if *idx < 0 {
            return Err(SubjsonError::PathEinval);
        }

        match scan::resolve(doc, root, comps)? {
            Resolution::Full { elem, .. } => {
                // In-range index: insert before the addressed element.
                let (layout, at) = elem.expect("non-empty path has an element context");
                check_insert_depth(comps.len(), value)?;
                let mut text = value.to_vec();
                text.push(b',');
                let pos = layout.entries[at].start;
                self.result.splice(doc.len(), pos..pos, &text);
                Ok(())
            }
            Resolution::Missing { matched, layout } => {
                if matched != comps.len() - 1 || layout.kind != Kind::Array {
                    return Err(SubjsonError::PathEnoent);
                }
                // Index == len appends; anything further is out of range.
                if *idx as usize != layout.entries.len() {
                    return Err(SubjsonError::PathEnoent);
                }
                check_insert_depth(comps.len(), value)?;
                let text = if layout.entries.is_empty() {
                    value.to_vec()
                } else {
                    let mut text = vec![b','];
                    text.extend_from_slice(value);
                    text
                };
                let pos = layout.close;
                self.result.splice(doc.len(), pos..pos, &text);
                Ok(())
            }
        }
    }

    fn exec_counter(
        &mut self,
        flags: ExecFlags,
        doc: &[u8],
        root: Range<usize>,
        comps: &[Component<'_>],
        value: &[u8],
    ) -> Result<()> {
        let delta = parse_delta(value)?;

        match scan::resolve(doc, root, comps)? {
            Resolution::Full { value: span, .. } => {
                let text = &doc[span.clone()];
                if scan::kind_of(text[0]) != Kind::Scalar || !looks_numeric(text) {
                    return Err(SubjsonError::PathMismatch);
                }
                let current: i64 = std::str::from_utf8(text)
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .ok_or(SubjsonError::NumE2big)?;
                let updated = current.checked_add(delta).ok_or(SubjsonError::DeltaE2big)?;
                let updated_text = updated.to_string();
                self.result.splice(doc.len(), span, updated_text.as_bytes());
                let loc = self.result.push_scratch(updated_text.as_bytes());
                self.result.match_loc = Some(loc);
                Ok(())
            }
            Resolution::Missing { matched, layout } => {
                // A missing counter springs into existence holding the delta.
                let Some(Component::Key(_)) = comps.last() else {
                    return Err(SubjsonError::PathEnoent);
                };
                let text = delta.to_string();
                self.insert_missing(
                    doc,
                    comps,
                    matched,
                    &layout,
                    flags,
                    Cow::Owned(text.clone().into_bytes()),
                )?;
                let loc = self.result.push_scratch(text.as_bytes());
                self.result.match_loc = Some(loc);
                Ok(())
            }
        }
    }

    /// Insert `leaf` at `comps[matched..]` below the container where the
    /// walk stopped. Intermediate components require `MKDIR_P` and must be
    /// dictionary keys.
    fn insert_missing(
        &mut self,
        doc: &[u8],
        comps: &[Component<'_>],
        matched: usize,
        layout: &Layout,
        flags: ExecFlags,
        leaf: Cow<'_, [u8]>,
    ) -> Result<()> {
        let missing = &comps[matched..];
        debug_assert!(!missing.is_empty());

        if missing.len() > 1 && !flags.mkdir_p {
            return Err(SubjsonError::PathEnoent);
        }
        if missing.iter().any(|c| !c.is_key()) {
            // Array elements cannot be conjured by index.
            return Err(SubjsonError::PathEnoent);
        }
        if layout.kind != Kind::Object {
            return Err(SubjsonError::PathMismatch);
        }

        // The leaf lands under `matched` existing containers plus one new
        // container per missing intermediate.
        check_insert_depth(matched + missing.len(), &leaf)?;

        let mut body = Vec::new();
        if !layout.entries.is_empty() {
            body.push(b',');
        }
        for comp in missing {
            let Component::Key(name) = comp else { unreachable!() };
            body.extend_from_slice(encode_key(name).as_bytes());
            body.push(b':');
            body.push(b'{');
        }
        // One brace too many was opened for the leaf itself.
        body.truncate(body.len() - 1);
        body.extend_from_slice(&leaf);
        for _ in 0..missing.len() - 1 {
            body.push(b'}');
        }

        let pos = layout.close;
        self.result.splice(doc.len(), pos..pos, &body);
        Ok(())
    }
}

fn required(value: Option<&[u8]>) -> Result<&[u8]> {
    value.ok_or(SubjsonError::ValueCantinsert)
}

/// Trim and syntax-check an operand; every inserted value must be one
/// self-contained JSON value.
fn check_value(value: &[u8]) -> Result<&[u8]> {
    let trimmed = trim_ascii(value);
    if trimmed.is_empty() {
        return Err(SubjsonError::ValueCantinsert);
    }
    serde_json::from_slice::<serde::de::IgnoredAny>(trimmed)
        .map_err(|_| SubjsonError::ValueCantinsert)?;
    Ok(trimmed)
}

fn trim_ascii(mut bytes: &[u8]) -> &[u8] {
    while let [first, rest @ ..] = bytes {
        if matches!(first, b' ' | b'\t' | b'\n' | b'\r') {
            bytes = rest;
        } else {
            break;
        }
    }
    while let [rest @ .., last] = bytes {
        if matches!(last, b' ' | b'\t' | b'\n' | b'\r') {
            bytes = rest;
        } else {
            break;
        }
    }
    bytes
}

/// `enclosing` containers will surround the inserted value; the value's own
/// nesting must fit in what remains.
fn check_insert_depth(enclosing: usize, value: &[u8]) -> Result<()> {
    let own = scan::value_depth(value).map_err(|_| SubjsonError::ValueCantinsert)?;
    if enclosing + own > MAX_DOC_DEPTH {
        return Err(SubjsonError::ValueEtoodeep);
    }
    Ok(())
}

fn parse_delta(value: &[u8]) -> Result<i64> {
    let text = std::str::from_utf8(trim_ascii(value)).map_err(|_| SubjsonError::DeltaE2big)?;
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit() || b == b'-' || b == b'+') {
        return Err(SubjsonError::DeltaE2big);
    }
    let delta: i64 = text.parse().map_err(|_| SubjsonError::DeltaE2big)?;
    if delta == 0 {
        return Err(SubjsonError::DeltaE2big);
    }
    Ok(delta)
}

fn looks_numeric(text: &[u8]) -> bool {
    matches!(text.first(), Some(b'-') | Some(b'0'..=b'9'))
}

fn encode_key(name: &str) -> String {
    serde_json::to_string(name).expect("string serialization is infallible")
}

/// Removal span for entry `idx` of `layout`, including whichever comma keeps
/// the container well-formed.
fn removal_span(layout: &Layout, idx: usize) -> Range<usize> {
    let entries = &layout.entries;
    if entries.len() == 1 {
        layout.open + 1..layout.close
    } else if idx == 0 {
        entries[0].start..entries[1].start
    } else {
        entries[idx - 1].value.end..entries[idx].value.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(
        code: Command,
        flags: ExecFlags,
        doc: &str,
        path: &str,
        value: Option<&str>,
    ) -> Result<OpResult> {
        let mut op = Operation::new();
        op.clear();
        op.op_exec(code, flags, doc.as_bytes(), path, value.map(str::as_bytes))?;
        Ok(op.take_result())
    }

    fn mutate(code: Command, doc: &str, path: &str, value: Option<&str>) -> String {
        mutate_flags(code, ExecFlags::default(), doc, path, value)
    }

    fn mutate_flags(
        code: Command,
        flags: ExecFlags,
        doc: &str,
        path: &str,
        value: Option<&str>,
    ) -> String {
        let result = run(code, flags, doc, path, value).unwrap();
        String::from_utf8(result.materialize(doc.as_bytes())).unwrap()
    }

    fn mkdir_p() -> ExecFlags {
        ExecFlags { mkdir_p: true }
    }

    #[test]
    fn test_get_aliases_document() {
        let doc = r#"{"a":[1,2,3]}"#;
        let result = run(Command::Get, ExecFlags::default(), doc, "a[1]", None).unwrap();
        let loc = result.matchloc().unwrap();
        assert!(matches!(loc, Loc::Doc { .. }));
        assert_eq!(result.resolve(loc, doc.as_bytes()), b"2");
        assert!(result.newdoc().is_empty());
    }

    #[test]
    fn test_exists_has_no_value() {
        let doc = r#"{"k":"v"}"#;
        let result = run(Command::Exists, ExecFlags::default(), doc, "k", None).unwrap();
        assert!(result.matchloc().is_none());

        let err = run(Command::Exists, ExecFlags::default(), doc, "nope", None).unwrap_err();
        assert_eq!(err, SubjsonError::PathEnoent);
    }

    #[test]
    fn test_dict_add() {
        assert_eq!(
            mutate(Command::DictAdd, r#"{"a":1}"#, "b", Some("2")),
            r#"{"a":1,"b":2}"#
        );
        assert_eq!(mutate(Command::DictAdd, "{}", "a", Some("1")), r#"{"a":1}"#);
        assert_eq!(
            run(Command::DictAdd, ExecFlags::default(), r#"{"a":1}"#, "a", Some("9")).unwrap_err(),
            SubjsonError::DocEexists
        );
    }

    #[test]
    fn test_dict_upsert_replaces() {
        assert_eq!(
            mutate(Command::DictUpsert, r#"{"a":1,"b":2}"#, "a", Some("[3]")),
            r#"{"a":[3],"b":2}"#
        );
    }

    #[test]
    fn test_mkdir_p() {
        assert_eq!(
            mutate_flags(Command::DictUpsert, mkdir_p(), r#"{"a":1}"#, "x.y.z", Some("true")),
            r#"{"a":1,"x":{"y":{"z":true}}}"#
        );
        assert_eq!(
            run(Command::DictUpsert, ExecFlags::default(), r#"{"a":1}"#, "x.y", Some("1"))
                .unwrap_err(),
            SubjsonError::PathEnoent
        );
    }

    #[test]
    fn test_remove() {
        assert_eq!(mutate(Command::Remove, r#"{"a":1,"b":2}"#, "a", None), r#"{"b":2}"#);
        assert_eq!(mutate(Command::Remove, r#"{"a":1,"b":2}"#, "b", None), r#"{"a":1}"#);
        assert_eq!(mutate(Command::Remove, r#"{"a":1}"#, "a", None), "{}");
        assert_eq!(mutate(Command::Remove, r#"[1,2,3]"#, "[1]", None), "[1,3]");
        assert_eq!(
            run(Command::Remove, ExecFlags::default(), "{}", "", None).unwrap_err(),
            SubjsonError::PathEinval
        );
    }

    #[test]
    fn test_replace() {
        assert_eq!(
            mutate(Command::Replace, r#"{"a":{"b":1}}"#, "a.b", Some("\"s\"")),
            r#"{"a":{"b":"s"}}"#
        );
        assert_eq!(
            run(Command::Replace, ExecFlags::default(), "{}", "missing", Some("1")).unwrap_err(),
            SubjsonError::PathEnoent
        );
    }

    #[test]
    fn test_array_push() {
        assert_eq!(
            mutate(Command::ArrayAppend, r#"{"a":[1,2]}"#, "a", Some("3")),
            r#"{"a":[1,2,3]}"#
        );
        assert_eq!(
            mutate(Command::ArrayPrepend, r#"{"a":[1,2]}"#, "a", Some("0")),
            r#"{"a":[0,1,2]}"#
        );
        assert_eq!(mutate(Command::ArrayAppend, "[]", "", Some("1")), "[1]");
        assert_eq!(
            run(Command::ArrayAppend, ExecFlags::default(), r#"{"a":1}"#, "a", Some("2"))
                .unwrap_err(),
            SubjsonError::PathMismatch
        );
        // Missing array springs into existence under MKDIR_P.
        assert_eq!(
            mutate_flags(Command::ArrayAppend, mkdir_p(), "{}", "list", Some("1")),
            r#"{"list":[1]}"#
        );
    }

    #[test]
    fn test_array_insert() {
        assert_eq!(
            mutate(Command::ArrayInsert, r#"[1,3]"#, "[1]", Some("2")),
            "[1,2,3]"
        );
        assert_eq!(mutate(Command::ArrayInsert, r#"[1]"#, "[1]", Some("2")), "[1,2]");
        assert_eq!(mutate(Command::ArrayInsert, "[]", "[0]", Some("1")), "[1]");
        assert_eq!(
            run(Command::ArrayInsert, ExecFlags::default(), "[1]", "[5]", Some("9")).unwrap_err(),
            SubjsonError::PathEnoent
        );
        assert_eq!(
            run(Command::ArrayInsert, ExecFlags::default(), "[1]", "[-1]", Some("9")).unwrap_err(),
            SubjsonError::PathEinval
        );
    }

    #[test]
    fn test_array_add_unique() {
        assert_eq!(
            mutate(Command::ArrayAddUnique, r#"[1,2]"#, "", Some("3")),
            "[1,2,3]"
        );
        assert_eq!(
            run(Command::ArrayAddUnique, ExecFlags::default(), "[1,2]", "", Some("2"))
                .unwrap_err(),
            SubjsonError::DocEexists
        );
        assert_eq!(
            run(Command::ArrayAddUnique, ExecFlags::default(), "[{}]", "", Some("2"))
                .unwrap_err(),
            SubjsonError::PathMismatch
        );
        assert_eq!(
            run(Command::ArrayAddUnique, ExecFlags::default(), "[1]", "", Some("[2]"))
                .unwrap_err(),
            SubjsonError::ValueCantinsert
        );
    }

    #[test]
    fn test_counter() {
        let doc = r#"{"x":{"y":5}}"#;
        let result = run(Command::Counter, ExecFlags::default(), doc, "x.y", Some("+3")).unwrap();
        let loc = result.matchloc().unwrap();
        assert_eq!(result.resolve(loc, doc.as_bytes()), b"8");
        assert_eq!(
            String::from_utf8(result.materialize(doc.as_bytes())).unwrap(),
            r#"{"x":{"y":8}}"#
        );

        // Negative deltas and creation of missing counters.
        assert_eq!(mutate(Command::Counter, r#"{"n":10}"#, "n", Some("-4")), r#"{"n":6}"#);
        assert_eq!(mutate(Command::Counter, "{}", "n", Some("7")), r#"{"n":7}"#);
    }

    #[test]
    fn test_counter_errors() {
        for (doc, path, delta, want) in [
            (r#"{"n":"s"}"#, "n", "1", SubjsonError::PathMismatch),
            (r#"{"n":1.5}"#, "n", "1", SubjsonError::NumE2big),
            (r#"{"n":9223372036854775807}"#, "n", "1", SubjsonError::DeltaE2big),
            (r#"{"n":1}"#, "n", "0", SubjsonError::DeltaE2big),
            (r#"{"n":1}"#, "n", "x", SubjsonError::DeltaE2big),
            (r#"{"n":1}"#, "n", "1.5", SubjsonError::DeltaE2big),
        ] {
            assert_eq!(
                run(Command::Counter, ExecFlags::default(), doc, path, Some(delta)).unwrap_err(),
                want,
                "{doc} {delta}"
            );
        }
    }

    #[test]
    fn test_bad_operands() {
        assert_eq!(
            run(Command::Replace, ExecFlags::default(), r#"{"a":1}"#, "a", Some("{not json"))
                .unwrap_err(),
            SubjsonError::ValueCantinsert
        );
        assert_eq!(
            run(Command::Get, ExecFlags::default(), "not json", "a", None).unwrap_err(),
            SubjsonError::DocNotJson
        );
    }

    #[test]
    fn test_insert_depth_budget() {
        // Document nested (MAX-1) deep plus a 2-level value must not fit.
        let mut doc = String::from(r#"{"a":"#);
        let mut path = String::from("a");
        for _ in 0..MAX_DOC_DEPTH - 2 {
            doc.push_str(r#"{"a":"#);
            path.push_str(".a");
        }
        doc.push('1');
        for _ in 0..MAX_DOC_DEPTH - 1 {
            doc.push('}');
        }
        assert_eq!(
            run(
                Command::Replace,
                ExecFlags::default(),
                &doc,
                &path,
                Some(r#"[[1]]"#)
            )
            .unwrap_err(),
            SubjsonError::ValueEtoodeep
        );
        // A scalar in the same spot is fine.
        mutate(Command::Replace, &doc, &path, Some("2"));
    }

    #[test]
    fn test_whitespace_documents() {
        let doc = "{ \"a\" : [ 1 , 2 ] }";
        assert_eq!(
            mutate(Command::ArrayAppend, doc, "a", Some("3")),
            "{ \"a\" : [ 1 , 2 ,3] }"
        );
        assert_eq!(mutate(Command::Remove, doc, "a[0]", None), "{ \"a\" : [ 2 ] }");
    }
}
