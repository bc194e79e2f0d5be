//! Statement segmentation
//!
//! Splits a SQL buffer into statements on `;` while ignoring semicolons that
//! sit inside quoted strings or comments. No grammar is involved: the scan is
//! a five-state machine over the characters of the buffer, and each statement
//! is handed on as opaque text.

use std::iter::Peekable;
use std::str::CharIndices;

use crate::types::{ParseAmbiguity, StatementDescriptor};


/* ===================== Public API ===================== */

/// Split `source` into ordered, non-empty statement descriptors.
///
/// Never fails: an unterminated quote or block comment is folded into the
/// final statement and flagged through [`StatementDescriptor::ambiguity`].
pub fn parse(source: &str) -> Vec<StatementDescriptor> {
    let mut segmenter = Segmenter::new(source);
    segmenter.scan();
    segmenter.finish()
}

/* ===================== Scanner ===================== */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Default,
    InSingleQuote,
    InDoubleQuote,
    InLineComment,
    InBlockComment,
}

/// A position in the source, tracked in all three units we report.
#[derive(Debug, Clone, Copy)]
struct Mark {
    char_offset: usize,
    byte_offset: usize,
    line: usize,
}

/// First significant character of the pending statement and the position
/// just past its last one.
#[derive(Debug, Clone, Copy)]
struct Extent {
    start: Mark,
    end: Mark,
}

struct Segmenter<'a> {
    source: &'a str,
    chars: Peekable<CharIndices<'a>>,
    state: ScanState,
    char_offset: usize,
    line: usize,
    pending: Option<Extent>,
    statements: Vec<StatementDescriptor>,
}

impl<'a> Segmenter<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.char_indices().peekable(),
            state: ScanState::Default,
            char_offset: 0,
            line: 1,
            pending: None,
            statements: Vec::new(),
        }
    }

    fn scan(&mut self) {
        while let Some((mark, ch)) = self.advance() {
            let state = self.state;
            match state {
                ScanState::Default => match ch {
                    '\'' => {
                        self.include(mark, ch);
                        self.state = ScanState::InSingleQuote;
                    }
                    '"' => {
                        self.include(mark, ch);
                        self.state = ScanState::InDoubleQuote;
                    }
                    '-' if self.advance_if('-').is_some() => {
                        self.state = ScanState::InLineComment;
                    }
                    '/' if self.advance_if('*').is_some() => {
                        self.state = ScanState::InBlockComment;
                    }
                    ';' => self.close(None),
                    _ => self.include(mark, ch),
                },
                ScanState::InSingleQuote => self.scan_quoted(mark, ch, '\''),
                ScanState::InDoubleQuote => self.scan_quoted(mark, ch, '"'),
                ScanState::InLineComment => {
                    if ch == '\n' {
                        self.state = ScanState::Default;
                    }
                }
                ScanState::InBlockComment => {
                    if ch == '*' && self.advance_if('/').is_some() {
                        self.state = ScanState::Default;
                    }
                }
            }
        }
    }

    /// Quoted text: a doubled quote is an escape, a single one closes.
    fn scan_quoted(&mut self, mark: Mark, ch: char, quote: char) {
        self.include(mark, ch);
        if ch != quote {
            return;
        }
        match self.advance_if(quote) {
            Some((escaped, next)) => self.include(escaped, next),
            None => self.state = ScanState::Default,
        }
    }

    fn advance(&mut self) -> Option<(Mark, char)> {
        let (byte_offset, ch) = self.chars.next()?;
        Some(self.consume(byte_offset, ch))
    }

    fn advance_if(&mut self, expected: char) -> Option<(Mark, char)> {
        let (byte_offset, ch) = self.chars.next_if(|&(_, c)| c == expected)?;
        Some(self.consume(byte_offset, ch))
    }

    fn consume(&mut self, byte_offset: usize, ch: char) -> (Mark, char) {
        let mark = Mark {
            char_offset: self.char_offset,
            byte_offset,
            line: self.line,
        };
        self.char_offset += 1;
        if ch == '\n' {
            self.line += 1;
        }
        (mark, ch)
    }

    /// Extend the pending statement over a significant character.
    fn include(&mut self, mark: Mark, ch: char) {
        if ch.is_whitespace() {
            return;
        }
        let end = Mark {
            char_offset: mark.char_offset + 1,
            byte_offset: mark.byte_offset + ch.len_utf8(),
            line: mark.line,
        };
        match &mut self.pending {
            Some(extent) => extent.end = end,
            None => self.pending = Some(Extent { start: mark, end }),
        }
    }

    fn close(&mut self, ambiguity: Option<ParseAmbiguity>) {
        let Some(extent) = self.pending.take() else {
            return;
        };
        let descriptor = StatementDescriptor {
            text: self.source[extent.start.byte_offset..extent.end.byte_offset].to_string(),
            start_offset: extent.start.char_offset,
            end_offset: extent.end.char_offset,
            start_line: extent.start.line,
            end_line: extent.end.line,
            sequence_index: self.statements.len(),
            ambiguity,
        };
        self.statements.push(descriptor);
    }

    fn finish(mut self) -> Vec<StatementDescriptor> {
        let ambiguity = match self.state {
            ScanState::Default | ScanState::InLineComment => None,
            ScanState::InSingleQuote => Some(ParseAmbiguity::UnterminatedSingleQuote),
            ScanState::InDoubleQuote => Some(ParseAmbiguity::UnterminatedDoubleQuote),
            ScanState::InBlockComment => Some(ParseAmbiguity::UnterminatedBlockComment),
        };

        if let Some(ambiguity) = ambiguity {
            if self.pending.is_none() {
                tracing::debug!(?ambiguity, "dropping comment-only trailing content");
                return self.statements;
            }
            tracing::debug!(
                ?ambiguity,
                statement = self.statements.len(),
                "input ended inside an open construct"
            );
            if ambiguity == ParseAmbiguity::UnterminatedBlockComment {
                self.extend_to_end();
            }
        }

        self.close(ambiguity);
        self.statements
    }

    /// Pull the pending statement's end over the rest of the input, minus
    /// trailing whitespace.
    fn extend_to_end(&mut self) {
        let Some(extent) = self.pending.as_mut() else {
            return;
        };
        let trimmed_end = self.source.trim_end().len();
        if trimmed_end <= extent.end.byte_offset {
            return;
        }
        let tail = &self.source[extent.end.byte_offset..trimmed_end];
        let last_line = extent.end.line + tail.matches('\n').count();
        extent.end = Mark {
            char_offset: extent.end.char_offset + tail.chars().count(),
            byte_offset: trimmed_end,
            line: last_line,
        };
    }
}
