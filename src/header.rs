//! Parsing of the header block that introduces each file's diff
use crate::error::ErrorKind;
use crate::lines::{Line, LineReader};
use crate::patch::FileDiff;
use crate::timestamp::parse_diff_time;
use chrono::{DateTime, FixedOffset};
use std::io::BufRead;
use std::path::{Component, Path, PathBuf};

/// Prefixes of the git extended header lines
pub const EXTENDED_HEADER_PREFIXES: &[&[u8]] = &[
    b"diff --git ",
    b"index ",
    b"old mode ",
    b"new mode ",
    b"new file mode ",
    b"deleted file mode ",
    b"similarity index ",
    b"rename from ",
    b"rename to ",
    b"copy from ",
    b"copy to ",
    b"Binary files ",
    b"GIT binary patch",
];

/// Prefix of the POSIX diff message for a file found in one directory only
pub const ONLY_IN_PREFIX: &[u8] = b"Only in ";

static BINARY_FILES_RE: once_cell::sync::Lazy<regex::Regex> = once_cell::sync::Lazy::new(|| {
    lazy_regex::Regex::new(r"^Binary files (.+) and (.+) differ$").unwrap()
});

/// Whether a line is a git extended header line
pub fn is_extended_header(line: &[u8]) -> bool {
    EXTENDED_HEADER_PREFIXES
        .iter()
        .any(|prefix| line.starts_with(prefix))
}

/// Whether a line can start the diff of a new file
pub fn starts_file(line: &[u8]) -> bool {
    is_extended_header(line) || line.starts_with(b"--- ") || line.starts_with(ONLY_IN_PREFIX)
}

/// Split an `Only in {source}: {filename}` message into source and filename.
///
/// Returns `None` if the line is not an `Only in` message or lacks the
/// `": "` separator.
pub fn parse_only_in(line: &[u8]) -> Option<(&[u8], &[u8])> {
    let rest = line.strip_prefix(ONLY_IN_PREFIX)?;
    let idx = rest.windows(2).position(|w| w == b": ")?;
    Some((&rest[..idx], &rest[idx + 2..]))
}

/// Remove surrounding double quotes from a name, unescaping its contents.
///
/// Names that are not quoted, or that fail to unescape, are returned as is.
pub fn unquote(name: &str) -> String {
    name.strip_prefix('"')
        .and_then(|n| n.strip_suffix('"'))
        .and_then(|inner| smashquote::unescape_bytes(inner.as_bytes()).ok())
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or_else(|| name.to_string())
}

/// Split a leading double-quoted token off `s`, honouring backslash escapes.
fn split_quoted(s: &str) -> Option<(&str, &str)> {
    if !s.starts_with('"') {
        return None;
    }
    let mut escaped = false;
    for (i, c) in s.char_indices().skip(1) {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '"' => return Some((&s[..=i], &s[i + 1..])),
            _ => {}
        }
    }
    None
}

fn without_first_component(name: &str) -> &str {
    name.split_once('/').map_or(name, |(_, rest)| rest)
}

/// Split the arguments of a `diff --git` line into the two names.
///
/// Quoted names are unescaped. Unquoted names may contain spaces, in which
/// case the split is made where both halves name the same path once their
/// `a/` and `b/` prefixes are removed.
pub fn split_git_args(args: &str) -> Option<(String, String)> {
    if let Some((first, rest)) = split_quoted(args) {
        let second = rest.strip_prefix(' ')?;
        return Some((unquote(first), unquote(second)));
    }
    if let Some(idx) = args.find(" \"") {
        let second = &args[idx + 1..];
        if split_quoted(second).map_or(false, |(_, rest)| rest.is_empty()) {
            return Some((args[..idx].to_string(), unquote(second)));
        }
    }
    let spaces = args.match_indices(' ').map(|(i, _)| i).collect::<Vec<_>>();
    let split = spaces
        .iter()
        .copied()
        .find(|&i| without_first_component(&args[..i]) == without_first_component(&args[i + 1..]))
        .or_else(|| spaces.first().copied())?;
    Some((args[..split].to_string(), args[split + 1..].to_string()))
}

/// Split the text after `--- ` or `+++ ` into a name and a timestamp.
///
/// The timestamp follows the last tab. `/dev/null` maps to the empty name.
pub fn parse_name_and_time(text: &str) -> (String, Option<DateTime<FixedOffset>>) {
    let (name, time) = match text.rfind('\t') {
        Some(idx) => (&text[..idx], Some(&text[idx + 1..])),
        None => (text, None),
    };
    let time = time
        .filter(|t| !t.trim().is_empty())
        .and_then(|t| match parse_diff_time(t) {
            Ok(time) => Some(time),
            Err(e) => {
                log::warn!("ignoring timestamp of {:?}: {}", name, e);
                None
            }
        });
    let name = unquote(name);
    if name == "/dev/null" {
        (String::new(), time)
    } else {
        (name, time)
    }
}

/// Known shapes of a header block that has no `---`/`+++` pair.
///
/// Patterns are matched on exact line counts; the first match wins, in the
/// order of the variants.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeaderBlock {
    /// Rename of a binary file: six lines ending in `Binary files`
    RenamedBinary,
    /// Pure rename: `diff --git`, similarity, `rename from`, `rename to`
    Renamed,
    /// Added empty or binary file
    Added,
    /// Deleted empty or binary file
    Deleted,
    /// Changed binary file
    Binary,
    /// Change of file mode only
    ModeChanged,
    /// Pure copy
    Copied,
    /// A lone `Binary files A and B differ` line from plain diff
    BareBinary,
}

/// Classify a header block that is not followed by `---`/`+++` lines
pub fn classify(extended: &[String]) -> Option<HeaderBlock> {
    let count = extended.len();
    let at = |i: usize, prefix: &str| extended.get(i).map_or(false, |l| l.starts_with(prefix));

    if !at(0, "diff --git ") {
        if count == 1 && BINARY_FILES_RE.is_match(&extended[0]) {
            return Some(HeaderBlock::BareBinary);
        }
        return None;
    }

    let added_or_deleted_tail = count == 3
        || (count == 4 && at(3, "Binary files "))
        || (count > 4 && at(3, "GIT binary patch"));

    if count == 6 && at(5, "Binary files ") && at(2, "rename from ") && at(3, "rename to ") {
        Some(HeaderBlock::RenamedBinary)
    } else if count == 4 && at(2, "rename from ") && at(3, "rename to ") {
        Some(HeaderBlock::Renamed)
    } else if added_or_deleted_tail && at(1, "new file mode ") {
        Some(HeaderBlock::Added)
    } else if added_or_deleted_tail && at(1, "deleted file mode ") {
        Some(HeaderBlock::Deleted)
    } else if (count == 3 && at(2, "Binary files ")) || (count > 3 && at(2, "GIT binary patch")) {
        Some(HeaderBlock::Binary)
    } else if count == 3 && at(1, "old mode ") && at(2, "new mode ") {
        Some(HeaderBlock::ModeChanged)
    } else if count == 4 && at(2, "copy from ") && at(3, "copy to ") {
        Some(HeaderBlock::Copied)
    } else {
        None
    }
}

/// Derive the (original, new) names for a classified header block
fn block_names(block: HeaderBlock, extended: &[String]) -> Option<(String, String)> {
    if block == HeaderBlock::BareBinary {
        let captures = BINARY_FILES_RE.captures(&extended[0])?;
        return Some((unquote(&captures[1]), unquote(&captures[2])));
    }
    let args = extended[0].strip_prefix("diff --git ")?;
    let (orig, new) = split_git_args(args)?;
    Some(match block {
        HeaderBlock::Added => (String::new(), new),
        HeaderBlock::Deleted => (orig, String::new()),
        _ => (orig, new),
    })
}

/// Whether hunks may follow a file header
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HunkExpectation {
    /// Hunks follow as usual
    Expected,
    /// Only hunks directly after the header belong to the file; used for
    /// deletions, whose removed content git still writes out
    ImmediateOnly,
    /// The file has no hunks
    None,
}

/// The outcome of reading one file header
#[derive(Debug)]
pub enum HeaderRead {
    /// A file diff was started
    File(FileDiff, HunkExpectation),
    /// The header could not be completed. Holds the line the problem was
    /// found on, what went wrong, and the partially read file, if any.
    Rejected(usize, ErrorKind, Option<FileDiff>),
}

/// Read the header block of one file.
///
/// The reader must be positioned on a line for which `starts_file` holds.
/// At least one line is always consumed. Returns `None` at end of input.
pub fn read_file_header<R: BufRead>(
    reader: &mut LineReader<R>,
) -> std::io::Result<Option<HeaderRead>> {
    if let Some(line) = reader.next_if(|line| line.starts_with(ONLY_IN_PREFIX))? {
        return Ok(Some(read_only_in(reader.line_no(), line)));
    }

    let mut extended: Vec<String> = Vec::new();
    let mut extended_lines: Vec<Vec<u8>> = Vec::new();
    let mut binary_payload = false;
    while let Some(line) = reader.next_if(|line| {
        let content = line.content();
        if content.starts_with(b"--- ") || content.starts_with(ONLY_IN_PREFIX) {
            false
        } else if content.starts_with(b"diff --git ") {
            extended.is_empty()
        } else {
            binary_payload || is_extended_header(content)
        }
    })? {
        if line.starts_with(b"GIT binary patch") {
            binary_payload = true;
        }
        extended.push(line.text().into_owned());
        extended_lines.push(line.into_raw());
    }

    let next_is_orig = matches!(reader.peek()?, Some(line) if line.starts_with(b"--- "));
    if next_is_orig {
        return read_name_pair(reader, extended, extended_lines).map(Some);
    }

    if extended.is_empty() {
        // Only reachable when called off a file boundary.
        return Ok(reader.next_line()?.map(|line| {
            HeaderRead::Rejected(
                reader.line_no(),
                ErrorKind::MalformedHeaderBlock {
                    reason: "not a file header",
                    line: line.text().into_owned(),
                },
                None,
            )
        }));
    }

    let names = classify(&extended).and_then(|block| block_names(block, &extended));
    match names {
        Some((orig_name, new_name)) => {
            let mut file = FileDiff::new(orig_name, new_name);
            file.extended = extended;
            file.extended_lines = extended_lines;
            Ok(Some(HeaderRead::File(file, HunkExpectation::None)))
        }
        None => {
            let line = extended.last().cloned().unwrap_or_default();
            log::warn!("unrecognized header block ending at line {}", reader.line_no());
            let file = FileDiff {
                extended,
                extended_lines,
                ..Default::default()
            };
            Ok(Some(HeaderRead::Rejected(
                reader.line_no(),
                ErrorKind::MalformedHeaderBlock {
                    reason: "unrecognized extended header block",
                    line,
                },
                Some(file),
            )))
        }
    }
}

/// Lexically normalize a path: drop `.` components and empty segments,
/// and resolve `..` against the component before it where there is one.
fn clean_path(path: &Path) -> String {
    let mut parts: Vec<Component> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match parts.last() {
                Some(Component::Normal(_)) => {
                    parts.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => parts.push(component),
            },
            _ => parts.push(component),
        }
    }
    if parts.is_empty() {
        return ".".to_string();
    }
    parts
        .iter()
        .collect::<PathBuf>()
        .to_string_lossy()
        .into_owned()
}

fn read_only_in(line_no: usize, line: Line) -> HeaderRead {
    match parse_only_in(line.content()) {
        Some((source, filename)) => {
            let source = String::from_utf8_lossy(source);
            let filename = String::from_utf8_lossy(filename);
            let name = clean_path(&Path::new(source.as_ref()).join(filename.as_ref()));
            let mut file = FileDiff::new(name, String::new());
            file.header_lines.push(line.into_raw());
            HeaderRead::File(file, HunkExpectation::None)
        }
        None => {
            log::warn!("bad 'only in' message at line {}", line_no);
            HeaderRead::Rejected(
                line_no,
                ErrorKind::MalformedOnlyIn(line.text().into_owned()),
                None,
            )
        }
    }
}

fn read_name_pair<R: BufRead>(
    reader: &mut LineReader<R>,
    extended: Vec<String>,
    extended_lines: Vec<Vec<u8>>,
) -> std::io::Result<HeaderRead> {
    let mut file = FileDiff {
        extended,
        extended_lines,
        ..Default::default()
    };
    if let Some(orig) = reader.next_line()? {
        let (name, time) = parse_name_and_time(&orig.text()[4..]);
        file.orig_name = name;
        file.orig_time = time;
        file.header_lines.push(orig.into_raw());
    }

    let new = match reader.next_if(|line| line.starts_with(b"+++ "))? {
        Some(new) => new,
        None => {
            let line = match reader.peek()? {
                Some(line) => line.text().into_owned(),
                None => String::new(),
            };
            return Ok(HeaderRead::Rejected(
                reader.line_no() + 1,
                ErrorKind::MalformedHeaderBlock {
                    reason: "expected '+++ ' line",
                    line,
                },
                Some(file),
            ));
        }
    };
    let (name, time) = parse_name_and_time(&new.text()[4..]);
    file.new_name = name;
    file.new_time = time;
    file.header_lines.push(new.into_raw());

    let expectation = if file.new_name.is_empty() {
        HunkExpectation::ImmediateOnly
    } else {
        HunkExpectation::Expected
    };
    Ok(HeaderRead::File(file, expectation))
}



#[cfg(test)]
mod split_git_args_tests {
    use super::*;

    #[test]
    fn test_simple() {
        assert_eq!(
            split_git_args("a/foo b/foo"),
            Some(("a/foo".to_string(), "b/foo".to_string()))
        );
    }

    #[test]
    fn test_spaces() {
        assert_eq!(
            split_git_args("a/foo bar b/foo bar"),
            Some(("a/foo bar".to_string(), "b/foo bar".to_string()))
        );
    }

    #[test]
    fn test_rename_falls_back_to_first_space() {
        assert_eq!(
            split_git_args("a/old b/new"),
            Some(("a/old".to_string(), "b/new".to_string()))
        );
    }

    #[test]
    fn test_quoted() {
        assert_eq!(
            split_git_args("\"a/foo\\\"bar\" \"b/foo\\\"bar\""),
            Some(("a/foo\"bar".to_string(), "b/foo\"bar".to_string()))
        );
        assert_eq!(
            split_git_args("a/plain \"b/with\\ttab\""),
            Some(("a/plain".to_string(), "b/with\ttab".to_string()))
        );
    }

    #[test]
    fn test_no_space() {
        assert_eq!(split_git_args("onlyone"), None);
    }

    #[test]
    fn test_unquote() {
        assert_eq!(unquote("plain"), "plain");
        assert_eq!(unquote("\"quoted\""), "quoted");
        assert_eq!(unquote("\""), "\"");
    }

    #[test]
    fn test_parse_only_in() {
        assert_eq!(
            parse_only_in(b"Only in a/b: c: d"),
            Some((&b"a/b"[..], &b"c: d"[..]))
        );
        assert_eq!(parse_only_in(b"Only in a/b c"), None);
        assert_eq!(parse_only_in(b"Something else"), None);
    }
}
