//! Line reading with a single line of lookahead
use std::borrow::Cow;
use std::io::BufRead;

/// A line of input, terminator included
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Line(Vec<u8>);

impl Line {
    /// Create a line from its raw bytes
    pub fn new(raw: Vec<u8>) -> Self {
        Self(raw)
    }

    /// The line exactly as read, including any `\n` or `\r\n`
    pub fn raw(&self) -> &[u8] {
        &self.0
    }

    /// Consume the line, returning its raw bytes
    pub fn into_raw(self) -> Vec<u8> {
        self.0
    }

    /// The line without its terminator
    pub fn content(&self) -> &[u8] {
        let line = self.0.strip_suffix(b"\n").unwrap_or(&self.0);
        line.strip_suffix(b"\r").unwrap_or(line)
    }

    /// The line without its terminator, lossily decoded
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.content())
    }

    /// Whether the line ended with a newline
    pub fn has_terminator(&self) -> bool {
        self.0.ends_with(b"\n")
    }

    /// Whether the line starts with `prefix`
    pub fn starts_with(&self, prefix: &[u8]) -> bool {
        self.0.starts_with(prefix)
    }
}

/// Reads lines from a byte stream, keeping at most one line buffered so that
/// callers can look at a line before deciding whether to consume it.
///
/// Malformed diff content is never an error here; only failures of the
/// underlying stream are reported.
pub struct LineReader<R> {
    reader: R,
    pending: Option<Line>,
    line_no: usize,
}

impl<R: BufRead> LineReader<R> {
    /// Wrap a buffered reader
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            pending: None,
            line_no: 0,
        }
    }

    fn read_raw(&mut self) -> std::io::Result<Option<Line>> {
        let mut buf = Vec::new();
        if self.reader.read_until(b'\n', &mut buf)? == 0 {
            return Ok(None);
        }
        Ok(Some(Line(buf)))
    }

    /// Look at the next line without consuming it.
    ///
    /// Repeated calls return the same line until `next_line` is called.
    pub fn peek(&mut self) -> std::io::Result<Option<&Line>> {
        if self.pending.is_none() {
            self.pending = self.read_raw()?;
        }
        Ok(self.pending.as_ref())
    }

    /// Consume and return the next line, or `None` at end of input
    pub fn next_line(&mut self) -> std::io::Result<Option<Line>> {
        let line = match self.pending.take() {
            Some(line) => Some(line),
            None => self.read_raw()?,
        };
        if line.is_some() {
            self.line_no += 1;
        }
        Ok(line)
    }

    /// Consume the next line only if `accept` returns true for it
    pub fn next_if(
        &mut self,
        accept: impl FnOnce(&Line) -> bool,
    ) -> std::io::Result<Option<Line>> {
        let accepted = match self.peek()? {
            Some(line) => accept(line),
            None => false,
        };
        if accepted {
            self.next_line()
        } else {
            Ok(None)
        }
    }

    /// Number of lines consumed so far; also the 1-based number of the last
    /// consumed line
    pub fn line_no(&self) -> usize {
        self.line_no
    }
}
