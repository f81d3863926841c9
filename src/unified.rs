//! Hunks of unified diffs
use crate::error::ErrorKind;
use crate::header::starts_file;
use crate::lines::LineReader;
use std::io::BufRead;
use std::num::ParseIntError;
use thiserror::Error;

/// The line that indicates that the previous line has no newline
pub const NO_NL: &[u8] = b"\\ No newline at end of file";

/// A line in a hunk, classified by its prefix
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HunkLine<'a> {
    /// A line that is unchanged
    Context(&'a [u8]),

    /// A line that was inserted
    Insert(&'a [u8]),

    /// A line that was removed
    Remove(&'a [u8]),

    /// A `\ No newline at end of file` marker
    NoNewline,
}

impl<'a> HunkLine<'a> {
    /// Classify a raw hunk body line.
    ///
    /// An empty line counts as context; some tools strip the leading space
    /// from blank context lines.
    pub fn parse_line(line: &'a [u8]) -> Option<Self> {
        if line.starts_with(b"\n") || line.starts_with(b"\r\n") || line.is_empty() {
            Some(Self::Context(line))
        } else if let Some(line) = line.strip_prefix(b" ") {
            Some(Self::Context(line))
        } else if let Some(line) = line.strip_prefix(b"+") {
            Some(Self::Insert(line))
        } else if let Some(line) = line.strip_prefix(b"-") {
            Some(Self::Remove(line))
        } else if line.starts_with(b"\\") {
            Some(Self::NoNewline)
        } else {
            None
        }
    }

    /// Get the character that represents this hunk line
    pub fn char(&self) -> u8 {
        match self {
            Self::Context(_) => b' ',
            Self::Insert(_) => b'+',
            Self::Remove(_) => b'-',
            Self::NoNewline => b'\\',
        }
    }

    /// Get the contents of this hunk line, without its prefix
    pub fn contents(&self) -> &'a [u8] {
        match self {
            Self::Context(bytes) | Self::Insert(bytes) | Self::Remove(bytes) => bytes,
            Self::NoNewline => b"",
        }
    }
}

/// An error that occurs when parsing a hunk header
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("Malformed hunk header: {}: {}", .0, String::from_utf8_lossy(.1))]
pub struct MalformedHunkHeader(pub &'static str, pub Vec<u8>);

impl From<MalformedHunkHeader> for ErrorKind {
    fn from(e: MalformedHunkHeader) -> Self {
        ErrorKind::MalformedHunkHeader {
            reason: e.0,
            line: String::from_utf8_lossy(&e.1).into_owned(),
        }
    }
}

/// Insertions and removals in a hunk or file
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Stat {
    /// Number of added lines
    pub added: usize,

    /// Number of removed lines
    pub removed: usize,
}

impl std::ops::Add for Stat {
    type Output = Stat;

    fn add(self, other: Stat) -> Stat {
        Stat {
            added: self.added + other.added,
            removed: self.removed + other.removed,
        }
    }
}

/// A hunk in a file diff
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct Hunk {
    /// First line of the hunk in the original file
    pub orig_start_line: usize,

    /// Number of lines in the original file
    pub orig_lines: usize,

    /// First line of the hunk in the new file
    pub new_start_line: usize,

    /// Number of lines in the new file
    pub new_lines: usize,

    /// Text after the closing `@@`, usually a function name
    pub section: Option<String>,

    /// Body offset of a no-newline marker applying to the original side
    pub orig_no_newline_at: Option<usize>,

    /// Body offset of a no-newline marker applying to the new side
    pub new_no_newline_at: Option<usize>,

    /// The `@@` line as it appeared in the input
    pub header_line: Option<Vec<u8>>,

    /// Body lines, verbatim: prefix and terminator included
    pub body: Vec<Vec<u8>>,
}

impl Hunk {
    /// Create a new hunk
    pub fn new(
        orig_start_line: usize,
        orig_lines: usize,
        new_start_line: usize,
        new_lines: usize,
        section: Option<String>,
    ) -> Self {
        Self {
            orig_start_line,
            orig_lines,
            new_start_line,
            new_lines,
            section,
            orig_no_newline_at: None,
            new_no_newline_at: None,
            header_line: None,
            body: Vec::new(),
        }
    }

    /// Parse a hunk header, without its line terminator
    pub fn from_header(line: &[u8]) -> Result<Self, MalformedHunkHeader> {
        let re = lazy_regex::regex!(r"^@@ ([^@]*) @@( (.*))?$"B);
        let captures = re
            .captures(line)
            .ok_or_else(|| MalformedHunkHeader("Does not match format.", line.to_vec()))?;
        let (orig, modi) = match captures[1].split(|b| *b == b' ').collect::<Vec<&[u8]>>()[..] {
            [orig, modi] if !orig.is_empty() && !modi.is_empty() => (orig, modi),
            _ => return Err(MalformedHunkHeader("Does not match format.", line.to_vec())),
        };

        if orig[0] != b'-' || modi[0] != b'+' {
            return Err(MalformedHunkHeader(
                "Positions don't start with + or -.",
                line.to_vec(),
            ));
        }
        let (orig_pos, orig_range) = parse_range(&String::from_utf8_lossy(&orig[1..]))
            .map_err(|_| MalformedHunkHeader("Original range is not a number.", line.to_vec()))?;
        let (mod_pos, mod_range) = parse_range(&String::from_utf8_lossy(&modi[1..]))
            .map_err(|_| MalformedHunkHeader("Modified range is not a number.", line.to_vec()))?;
        let section = captures
            .get(3)
            .map(|m| String::from_utf8_lossy(m.as_bytes()).into_owned())
            .filter(|s| !s.is_empty());
        Ok(Self::new(orig_pos, orig_range, mod_pos, mod_range, section))
    }

    /// Classify the body lines of this hunk
    pub fn lines(&self) -> impl Iterator<Item = HunkLine<'_>> {
        self.body.iter().filter_map(|l| HunkLine::parse_line(l))
    }

    /// Count the (original, new) lines present in the body
    pub fn counted(&self) -> (usize, usize) {
        self.lines().fold((0, 0), |(orig, new), line| match line {
            HunkLine::Context(_) => (orig + 1, new + 1),
            HunkLine::Remove(_) => (orig + 1, new),
            HunkLine::Insert(_) => (orig, new + 1),
            HunkLine::NoNewline => (orig, new),
        })
    }

    /// Report a disagreement between the body and the header counts
    pub fn count_mismatch(&self) -> Option<ErrorKind> {
        let (orig_found, new_found) = self.counted();
        if orig_found == self.orig_lines && new_found == self.new_lines {
            return None;
        }
        Some(ErrorKind::HunkCountMismatch {
            orig_expected: self.orig_lines,
            orig_found,
            new_expected: self.new_lines,
            new_found,
        })
    }

    /// Number of added and removed lines
    pub fn stat(&self) -> Stat {
        self.lines().fold(Stat::default(), |stat, line| match line {
            HunkLine::Insert(_) => Stat {
                added: stat.added + 1,
                ..stat
            },
            HunkLine::Remove(_) => Stat {
                removed: stat.removed + 1,
                ..stat
            },
            _ => stat,
        })
    }

    /// Get the header of this hunk, as read or synthesized from the ranges
    pub fn header(&self) -> Vec<u8> {
        if let Some(line) = &self.header_line {
            return line.clone();
        }
        let section = match &self.section {
            Some(section) => format!(" {}", section),
            None => String::new(),
        };
        format!(
            "@@ -{} +{} @@{}\n",
            range_str(self.orig_start_line, self.orig_lines),
            range_str(self.new_start_line, self.new_lines),
            section,
        )
        .into_bytes()
    }

    /// Write this hunk to a writer
    pub fn write<W: std::io::Write>(&self, w: &mut W) -> std::io::Result<()> {
        w.write_all(&self.header())?;
        for line in &self.body {
            w.write_all(line)?;
        }
        Ok(())
    }

    /// Serialize this hunk to a byte vector
    pub fn as_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        self.write(&mut bytes).unwrap();
        bytes
    }
}

fn range_str(pos: usize, range: usize) -> String {
    if range == 1 {
        format!("{}", pos)
    } else {
        format!("{},{}", pos, range)
    }
}

/// Parse a patch range, handling the "1" special-case
pub fn parse_range(textrange: &str) -> Result<(usize, usize), ParseIntError> {
    let tmp: Vec<&str> = textrange.split(',').collect();
    let (pos, brange) = if tmp.len() == 1 {
        (tmp[0], "1")
    } else {
        (tmp[0], tmp[1])
    };
    let pos = pos.parse::<usize>()?;
    let range = brange.parse::<usize>()?;
    Ok((pos, range))
}

/// Read one hunk: the `@@` line the reader is positioned on, then its body.
///
/// Body lines are taken while the counts from the header still need lines
/// and the next line carries a body prefix. A `---` or `+++` line is only
/// body while the side it would count against still needs lines; otherwise
/// it starts the next file. Problems are pushed onto `problems` together
/// with the line they were found on. A hunk cut short by the next file or by
/// the end of input is an overflow; one cut short by anything else is a count
/// mismatch. A header that does not parse yields no hunk.
pub fn read_hunk<R: BufRead>(
    reader: &mut LineReader<R>,
    problems: &mut Vec<(usize, ErrorKind)>,
) -> std::io::Result<Option<Hunk>> {
    let header = match reader.next_line()? {
        Some(header) => header,
        None => return Ok(None),
    };
    let mut hunk = match Hunk::from_header(header.content()) {
        Ok(hunk) => hunk,
        Err(e) => {
            log::warn!("{}", e);
            problems.push((reader.line_no(), e.into()));
            return Ok(None);
        }
    };
    hunk.header_line = Some(header.into_raw());

    let (mut orig_seen, mut new_seen) = (0, 0);
    loop {
        let orig_left = hunk.orig_lines.saturating_sub(orig_seen);
        let new_left = hunk.new_lines.saturating_sub(new_seen);
        let after_body_line = matches!(hunk.body.last(), Some(l) if !l.starts_with(b"\\"));
        let line = match reader.next_if(|line| {
            let content = line.content();
            if content.starts_with(b"\\") {
                after_body_line
            } else if orig_left == 0 && new_left == 0 {
                false
            } else if content.is_empty() {
                orig_left > 0 && new_left > 0
            } else if content.starts_with(b"--- ") {
                orig_left > 0
            } else if content.starts_with(b"+++ ") {
                new_left > 0
            } else {
                matches!(content[0], b' ' | b'-' | b'+')
            }
        })? {
            Some(line) => line,
            None => break,
        };

        match HunkLine::parse_line(line.content()) {
            Some(HunkLine::Context(_)) => {
                orig_seen += 1;
                new_seen += 1;
            }
            Some(HunkLine::Remove(_)) => orig_seen += 1,
            Some(HunkLine::Insert(_)) => new_seen += 1,
            Some(HunkLine::NoNewline) => {
                let at = hunk.body.len();
                match hunk.body.last().and_then(|l| l.first()).copied() {
                    Some(b'-') => hunk.orig_no_newline_at = Some(at),
                    Some(b'+') => hunk.new_no_newline_at = Some(at),
                    _ => {
                        hunk.orig_no_newline_at = Some(at);
                        hunk.new_no_newline_at = Some(at);
                    }
                }
            }
            None => {}
        }
        hunk.body.push(line.into_raw());
    }

    let short = orig_seen < hunk.orig_lines || new_seen < hunk.new_lines;
    let overflow = match reader.peek()? {
        None => Some(None),
        Some(line) if starts_file(line.content()) => Some(Some(line.text().into_owned())),
        Some(_) => None,
    };
    if let (true, Some(next)) = (short, overflow) {
        let kind = ErrorKind::Overflow(next);
        log::warn!("hunk at line {}: {}", reader.line_no(), kind);
        problems.push((reader.line_no() + 1, kind));
    } else if let Some(kind) = hunk.count_mismatch() {
        log::warn!("hunk at line {}: {}", reader.line_no(), kind);
        problems.push((reader.line_no(), kind));
    }
    Ok(Some(hunk))
}


#[cfg(test)]
mod hunkline_tests {
    use super::HunkLine;

    #[test]
    fn test_parse_line() {
        assert_eq!(
            HunkLine::parse_line(&b" foo\n"[..]),
            Some(HunkLine::Context(b"foo\n"))
        );
        assert_eq!(
            HunkLine::parse_line(&b"-foo\n"[..]),
            Some(HunkLine::Remove(b"foo\n"))
        );
        assert_eq!(
            HunkLine::parse_line(&b"+foo\n"[..]),
            Some(HunkLine::Insert(b"foo\n"))
        );
        assert_eq!(
            HunkLine::parse_line(&b"\n"[..]),
            Some(HunkLine::Context(b"\n"))
        );
        assert_eq!(
            HunkLine::parse_line(super::NO_NL),
            Some(HunkLine::NoNewline)
        );
        assert_eq!(HunkLine::parse_line(&b"aaaaa\n"[..]), None);
    }

    #[test]
    fn test_char_and_contents() {
        let line = HunkLine::parse_line(b"+foo\n").unwrap();
        assert_eq!(line.char(), b'+');
        assert_eq!(line.contents(), b"foo\n");
    }
}
