//! Source position tracking and whitespace boundary scanning for trim
//! markers (spec.md §4.1).
use once_cell::unsync::OnceCell;
use std::fmt::{Display, Formatter};

/// Line/column of a byte offset into a [`Code`], 1-indexed.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl Display for Position {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// The UTF-8 codepoints treated as template whitespace for trim-marker
/// scanning, beyond plain ASCII space/tab/CR/LF (spec.md §4.1: "24 explicit
/// UTF-8 codepoints such as NBSP, EM SPACE, IDEOGRAPHIC SPACE").
pub const EXTRA_WHITESPACE: [char; 24] = [
    '\u{0085}', '\u{00A0}', '\u{1680}', '\u{2000}', '\u{2001}', '\u{2002}', '\u{2003}', '\u{2004}',
    '\u{2005}', '\u{2006}', '\u{2007}', '\u{2008}', '\u{2009}', '\u{200A}', '\u{2028}', '\u{2029}',
    '\u{202F}', '\u{205F}', '\u{3000}', '\u{180E}', '\u{200B}', '\u{FEFF}', '\u{2060}', '\u{00AD}',
];

pub fn is_trim_whitespace(c: char) -> bool {
    c.is_ascii_whitespace() || EXTRA_WHITESPACE.contains(&c)
}

/// A wrapper around a template's source bytes that lazily computes line
/// breaks on first use, so plain tokenization never pays for diagnostics.
pub struct Code<'c> {
    pub value: &'c [u8],
    line_breaks: OnceCell<Vec<usize>>,
}

impl<'c> From<&'c [u8]> for Code<'c> {
    fn from(value: &'c [u8]) -> Self {
        Code::new(value)
    }
}
impl<'c> From<&'c str> for Code<'c> {
    fn from(value: &'c str) -> Self {
        Code::new(value.as_bytes())
    }
}

impl<'c> Code<'c> {
    pub fn new(value: &'c [u8]) -> Self {
        Self {
            value,
            line_breaks: OnceCell::new(),
        }
    }

    fn line_breaks(&self) -> &Vec<usize> {
        self.line_breaks.get_or_init(|| {
            self.value
                .iter()
                .enumerate()
                .filter_map(|(index, b)| if *b == b'\n' { Some(index) } else { None })
                .collect()
        })
    }

    pub fn position_at(&self, pointer: usize) -> Position {
        let breaks = self.line_breaks();
        let index = match breaks.binary_search(&pointer) {
            Ok(index) | Err(index) => index,
        };
        if index == 0 {
            let s = std::str::from_utf8(&self.value[..pointer.min(self.value.len())])
                .unwrap_or_default();
            Position::new(1, s.chars().count() + 1)
        } else {
            let break_point = breaks[index - 1] + 1;
            let end = pointer.max(break_point).min(self.value.len());
            let s = std::str::from_utf8(&self.value[break_point..end]).unwrap_or_default();
            Position::new(index + 1, s.chars().count() + 1)
        }
    }

    pub fn as_str(&self) -> &'c str {
        std::str::from_utf8(self.value).unwrap_or("")
    }

    /// Scan backward from `pointer` (exclusive) over trim-marker whitespace,
    /// returning the byte offset just after the last non-whitespace byte
    /// that precedes it.
    pub fn previous_boundary(&self, pointer: usize) -> usize {
        let text = self.as_str();
        let mut cut = pointer;
        for (idx, c) in text[..pointer.min(text.len())].char_indices().rev() {
            if is_trim_whitespace(c) {
                cut = idx;
            } else {
                break;
            }
        }
        cut
    }

    /// Scan forward from `pointer` (inclusive) over trim-marker whitespace,
    /// returning the byte offset of the first non-whitespace byte.
    pub fn next_boundary(&self, pointer: usize) -> usize {
        let text = self.as_str();
        let mut cut = pointer.min(text.len());
        for (idx, c) in text[cut..].char_indices() {
            if is_trim_whitespace(c) {
                cut = cut + idx + c.len_utf8();
            } else {
                break;
            }
        }
        cut
    }
}
