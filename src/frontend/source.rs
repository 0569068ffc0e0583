//! Source positions for configuration files.
//!
//! `hcl` drops spans, so each file is also parsed with `hcl-edit` and the
//! block/attribute layout is mirrored into [`SourceBody`] together with
//! line/column ranges. That mirror is all location lookups need.

use std::fmt;
use std::ops::Range;
use std::path::{Path, PathBuf};

use hcl_edit::structure::{BlockLabel, Body, Structure};
use hcl_edit::Span;
use serde::Serialize;

use crate::names::{Accessor, Segment};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SourcePos {
    pub line: usize,
    pub column: usize,
    pub byte: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SourceRange {
    pub file: PathBuf,
    pub start: SourcePos,
    pub end: SourcePos,
}

impl fmt::Display for SourceRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}-{}:{}",
            self.file.display(),
            self.start.line,
            self.start.column,
            self.end.line,
            self.end.column
        )
    }
}

struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    fn new(text: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(text.match_indices('\n').map(|(i, _)| i + 1));
        LineIndex { starts }
    }

    fn pos(&self, text: &str, byte: usize) -> SourcePos {
        let line = match self.starts.binary_search(&byte) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        let line_start = self.starts[line];
        let column = text
            .get(line_start..byte)
            .map(|s| s.chars().count())
            .unwrap_or(byte - line_start);
        SourcePos {
            line: line + 1,
            column: column + 1,
            byte,
        }
    }

    fn range(&self, file: &Path, text: &str, span: Option<Range<usize>>) -> SourceRange {
        let span = span.unwrap_or(0..0);
        SourceRange {
            file: file.to_path_buf(),
            start: self.pos(text, span.start),
            end: self.pos(text, span.end),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceAttribute {
    pub key: String,
    pub range: SourceRange,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceBlock {
    pub ident: String,
    pub labels: Vec<String>,
    pub range: SourceRange,
    pub body: SourceBody,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceBody {
    pub attributes: Vec<SourceAttribute>,
    pub blocks: Vec<SourceBlock>,
}

impl SourceBody {
    pub fn parse(file: &Path, text: &str) -> Result<SourceBody, String> {
        let body = hcl_edit::parser::parse_body(text).map_err(|e| e.to_string())?;
        let index = LineIndex::new(text);
        Ok(mirror(&body, file, text, &index))
    }

    pub fn attribute(&self, key: &str) -> Option<&SourceAttribute> {
        self.attributes.iter().find(|a| a.key == key)
    }

    pub fn blocks_of(&self, ident: &str) -> Vec<&SourceBlock> {
        self.blocks.iter().filter(|b| b.ident == ident).collect()
    }

    pub fn find_block(&self, ident: &str, labels: &[&str]) -> Option<&SourceBlock> {
        self.blocks.iter().find(|b| {
            b.ident == ident && b.labels.iter().map(String::as_str).eq(labels.iter().copied())
        })
    }
}

fn mirror(body: &Body, file: &Path, text: &str, index: &LineIndex) -> SourceBody {
    let mut out = SourceBody::default();
    for structure in body.iter() {
        match structure {
            Structure::Attribute(attr) => out.attributes.push(SourceAttribute {
                key: attr.key.as_str().to_string(),
                range: index.range(file, text, attr.span()),
            }),
            Structure::Block(block) => out.blocks.push(SourceBlock {
                ident: block.ident.as_str().to_string(),
                labels: block.labels.iter().map(label_str).collect(),
                range: index.range(file, text, block.span()),
                body: mirror(&block.body, file, text, index),
            }),
        }
    }
    out
}

fn label_str(label: &BlockLabel) -> String {
    match label {
        BlockLabel::Ident(ident) => ident.as_str().to_string(),
        BlockLabel::String(s) => s.as_str().to_string(),
    }
}

enum Cursor<'a> {
    Body(&'a SourceBody),
    Blocks(Vec<&'a SourceBlock>),
}

impl SourceBlock {
    /// Range of the deepest part of `path` that exists in this block.
    ///
    /// A key selects nested blocks of that type (the first one's range) or
    /// else an attribute; an index selects among those nested blocks.
    pub fn locate(&self, path: &Accessor) -> SourceRange {
        let mut range = self.range.clone();
        let mut cursor = Cursor::Body(&self.body);
        for segment in path.segments() {
            cursor = match (cursor, segment) {
                (Cursor::Body(body), Segment::Key(key)) => {
                    let blocks = body.blocks_of(key);
                    if let Some(first) = blocks.first() {
                        range = first.range.clone();
                        Cursor::Blocks(blocks)
                    } else if let Some(attr) = body.attribute(key) {
                        return attr.range.clone();
                    } else {
                        return range;
                    }
                }
                (Cursor::Blocks(blocks), Segment::Index(i)) => match blocks.get(*i) {
                    Some(block) => {
                        range = block.range.clone();
                        Cursor::Body(&block.body)
                    }
                    None => return range,
                },
                (Cursor::Blocks(blocks), Segment::Key(key)) => match blocks.first() {
                    // Single nested block addressed without an index
                    Some(block) => match block.body.attribute(key) {
                        Some(attr) => return attr.range.clone(),
                        None => {
                            let nested = block.body.blocks_of(key);
                            match nested.first() {
                                Some(first) => {
                                    range = first.range.clone();
                                    Cursor::Blocks(nested)
                                }
                                None => return range,
                            }
                        }
                    },
                    None => return range,
                },
                (Cursor::Body(_), Segment::Index(_)) => return range,
            };
        }
        range
    }
}
