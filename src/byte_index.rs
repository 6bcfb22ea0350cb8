//! Byte ranges as written in field tables: `"4"`, `"4-5"` or `"4 ~ 5"`.
//!
//! A range remembers which spelling it was parsed from so that moving it to a
//! new offset re-emits the same notation.

use std::fmt;
use std::str::FromStr;

/// How a range was (or will be) spelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notation {
    /// `"4"`; only meaningful for one-byte ranges.
    Single,
    /// `"4-5"`
    Dash,
    /// `"4 ~ 5"`
    Tilde,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ByteRangeError {
    #[error("invalid byte index: {0:?}")]
    Invalid(String),
    #[error("byte range {start}..{end} ends before it starts")]
    Reversed { start: usize, end: usize },
}

/// Contiguous byte range `[start, start + len)` inside a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    start: usize,
    len: usize,
    notation: Notation,
}

impl ByteRange {
    /// One byte at `start`, single notation.
    pub fn single(start: usize) -> Self {
        ByteRange {
            start,
            len: 1,
            notation: Notation::Single,
        }
    }

    /// `len` bytes from `start`. Widths above one default to dash notation.
    pub fn new(start: usize, len: usize) -> Self {
        let len = len.max(1);
        let notation = if len == 1 { Notation::Single } else { Notation::Dash };
        ByteRange { start, len, notation }
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// Last byte covered (inclusive).
    pub fn end(&self) -> usize {
        self.start + self.len - 1
    }

    pub fn notation(&self) -> Notation {
        self.notation
    }

    /// Same width and spelling, moved to `start`.
    pub fn moved_to(self, start: usize) -> Self {
        ByteRange { start, ..self }
    }

    /// Same start and spelling, resized. A single-notation range that grows
    /// wider switches to dash notation.
    pub fn resized(self, len: usize) -> Self {
        let len = len.max(1);
        let notation = match self.notation {
            Notation::Single if len > 1 => Notation::Dash,
            n => n,
        };
        ByteRange { len, notation, ..self }
    }
}

impl FromStr for ByteRange {
    type Err = ByteRangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (parts, notation) = if let Some((a, b)) = s.split_once('-') {
            (Some((a, b)), Notation::Dash)
        } else if let Some((a, b)) = s.split_once('~') {
            (Some((a, b)), Notation::Tilde)
        } else {
            (None, Notation::Single)
        };
        let parse = |t: &str| -> Result<usize, ByteRangeError> {
            t.trim()
                .parse::<usize>()
                .map_err(|_| ByteRangeError::Invalid(s.to_string()))
        };
        match parts {
            None => Ok(ByteRange::single(parse(s)?)),
            Some((a, b)) => {
                let start = parse(a)?;
                let end = parse(b)?;
                if end < start {
                    return Err(ByteRangeError::Reversed { start, end });
                }
                Ok(ByteRange {
                    start,
                    len: end - start + 1,
                    notation,
                })
            }
        }
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.notation {
            Notation::Single if self.len == 1 => write!(f, "{}", self.start),
            Notation::Single | Notation::Dash => write!(f, "{}-{}", self.start, self.end()),
            Notation::Tilde => write!(f, "{} ~ {}", self.start, self.end()),
        }
    }
}
