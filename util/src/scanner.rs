//! Cursor over a byte slice with line and column tracking.

use std::fmt;

/// Line and column of the scanner cursor.
///
/// Both start at `1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    /// Current line.
    pub line: usize,
    /// Current column.
    pub col: usize,
}

/// A byte reader over a `&[u8]` slice.
///
/// The scanner never copies: every read method returns a subslice
/// of the original input, so the returned slices live as long as
/// the input itself.
#[derive(Debug)]
pub struct Scanner<'a> {
    src: &'a [u8],
    pos: Position,
    idx: usize,
    len: usize,
}

/// The `Result` type used by the scanner.
pub type Result<T> = std::result::Result<T, Error>;

/// Categories of scanner failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Reached the end of input.
    Eof,
    /// Found an unexpected byte.
    Char {
        /// The byte that was expected.
        expected: u8,
        /// The byte that was found.
        found: u8,
    },
    /// Failed to read a number.
    Num,
}

/// A scanner error carrying the position it occurred at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Error {
    /// What went wrong.
    pub kind: ErrorKind,
    /// Line where the error occurred.
    pub line: usize,
    /// Column where the error occurred.
    pub col: usize,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ErrorKind::Eof => {
                write!(f, "unexpected end of input at line {} column {}", self.line, self.col)
            }
            ErrorKind::Char { expected, found } => write!(
                f,
                "expected byte '{}' but found '{}' at line {} column {}",
                expected.escape_ascii(),
                found.escape_ascii(),
                self.line,
                self.col
            ),
            ErrorKind::Num => {
                write!(f, "invalid number at line {} column {}", self.line, self.col)
            }
        }
    }
}

impl std::error::Error for Error {}

impl<'a> Scanner<'a> {
    /// Creates a new `Scanner` over `src`.
    pub const fn new(src: &'a [u8]) -> Self {
        Scanner {
            src,
            pos: Position { line: 1, col: 1 },
            idx: 0,
            len: src.len(),
        }
    }

    /// Returns the current cursor position.
    pub const fn position(&self) -> Position {
        self.pos
    }

    /// Returns `true` if the whole input was consumed.
    pub const fn is_eof(&self) -> bool {
        self.idx >= self.len
    }

    /// Returns the byte under the cursor without consuming it.
    pub fn peek(&self) -> Option<u8> {
        if self.is_eof() {
            None
        } else {
            Some(self.src[self.idx])
        }
    }

    /// Same as [`Scanner::peek`] but fails with [`ErrorKind::Eof`]
    /// at the end of input.
    pub fn lookahead(&self) -> Result<u8> {
        match self.peek() {
            Some(b) => Ok(b),
            None => self.error(ErrorKind::Eof),
        }
    }

    /// Returns the next `n` bytes without consuming them.
    pub fn peek_n(&self, n: usize) -> Option<&'a [u8]> {
        self.src.get(self.idx..self.idx + n)
    }

    /// Returns `true` if the remaining input starts with `needle`.
    pub fn starts_with(&self, needle: &[u8]) -> bool {
        self.src[self.idx..].starts_with(needle)
    }

    fn bump(&mut self) {
        let b = self.src[self.idx];
        self.idx += 1;
        if b == b'\n' {
            self.pos.line += 1;
            self.pos.col = 1;
        } else {
            self.pos.col += 1;
        }
    }

    /// Advances the cursor by at most `n` bytes.
    pub fn bump_n(&mut self, n: usize) {
        for _ in 0..n {
            if self.is_eof() {
                break;
            }
            self.bump();
        }
    }

    /// Consumes bytes while `f` returns `true` and returns them.
    pub fn read_while<F>(&mut self, f: F) -> &'a [u8]
    where
        F: Fn(u8) -> bool,
    {
        let start = self.idx;
        while let Some(b) = self.peek() {
            if !f(b) {
                break;
            }
            self.bump();
        }
        &self.src[start..self.idx]
    }

    /// Returns the bytes that `read_while` would consume, plus the
    /// byte it would stop at, without moving the cursor.
    pub fn peek_while<F>(&self, f: F) -> (&'a [u8], Option<u8>)
    where
        F: Fn(u8) -> bool,
    {
        let mut i = self.idx;
        while i < self.len && f(self.src[i]) {
            i += 1;
        }
        let stopped = if i < self.len { Some(self.src[i]) } else { None };
        (&self.src[self.idx..i], stopped)
    }

    /// Consumes bytes up to, but not including, `byte`.
    pub fn take_until(&mut self, byte: u8) -> &'a [u8] {
        self.read_while(|b| b != byte)
    }

    /// Consumes `expected` or fails with the byte that was found.
    pub fn must_read(&mut self, expected: u8) -> Result<()> {
        match self.peek() {
            Some(found) if found == expected => {
                self.bump();
                Ok(())
            }
            Some(found) => self.error(ErrorKind::Char { expected, found }),
            None => self.error(ErrorKind::Eof),
        }
    }

    /// Consumes the byte under the cursor if `f` accepts it.
    pub fn consume_if<F>(&mut self, f: F) -> bool
    where
        F: Fn(u8) -> bool,
    {
        match self.peek() {
            Some(b) if f(b) => {
                self.bump();
                true
            }
            _ => false,
        }
    }

    /// Returns `true` if the byte under the cursor satisfies `f`.
    pub fn cur_is_some_and<F>(&self, f: F) -> bool
    where
        F: Fn(u8) -> bool,
    {
        self.peek().is_some_and(f)
    }

    /// Reads a number from the input.
    ///
    /// Consumes exactly the bytes that form the number.
    pub fn read_num<N: lexical_core::FromLexical>(&mut self) -> Result<N> {
        let (num, read) = match lexical_core::parse_partial(self.as_ref()) {
            Ok(parsed) => parsed,
            Err(_) => return self.error(ErrorKind::Num),
        };
        if read == 0 {
            return self.error(ErrorKind::Num);
        }
        self.bump_n(read);
        Ok(num)
    }

    /// Reads an `u32` from the input.
    pub fn read_u32(&mut self) -> Result<u32> {
        self.read_num()
    }

    /// Reads an `u16` from the input.
    pub fn read_u16(&mut self) -> Result<u16> {
        self.read_num()
    }

    /// Returns the unconsumed rest of the input.
    pub fn remaining(&self) -> &'a [u8] {
        &self.src[self.idx..]
    }

    /// Builds an `Err` of `kind` at the current position.
    pub fn error<T>(&self, kind: ErrorKind) -> Result<T> {
        Err(Error {
            kind,
            line: self.pos.line,
            col: self.pos.col,
        })
    }
}

impl AsRef<[u8]> for Scanner<'_> {
    fn as_ref(&self) -> &[u8] {
        &self.src[self.idx..]
    }
}

impl Iterator for Scanner<'_> {
    type Item = u8;

    fn next(&mut self) -> Option<Self::Item> {
        let b = self.peek()?;
        self.bump();
        Some(b)
    }
}
