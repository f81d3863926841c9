//! Errors reported while parsing diffs
use crate::patch::FileDiff;
use thiserror::Error;

/// What went wrong with a single file's diff.
///
/// None of these stop the parse; the parser carries on with the next file.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ErrorKind {
    /// An `Only in` line without the `": "` separator
    #[error("bad 'only in' message: {0}")]
    MalformedOnlyIn(String),

    /// Header lines that match no known pattern and have no `---`/`+++` pair
    #[error("malformed file header: {reason}: {line}")]
    MalformedHeaderBlock {
        /// Why the block was rejected
        reason: &'static str,
        /// The line the problem was detected on
        line: String,
    },

    /// A `@@` line whose ranges could not be parsed
    #[error("malformed hunk header: {reason}: {line}")]
    MalformedHunkHeader {
        /// Why the header was rejected
        reason: &'static str,
        /// The offending header line
        line: String,
    },

    /// The body of a hunk disagrees with the counts in its header
    #[error(
        "hunk line count mismatch: header says -{orig_expected} +{new_expected}, body has -{orig_found} +{new_found}"
    )]
    HunkCountMismatch {
        /// Original-side count from the header
        orig_expected: usize,
        /// Context and removed lines in the body
        orig_found: usize,
        /// New-side count from the header
        new_expected: usize,
        /// Context and added lines in the body
        new_found: usize,
    },

    /// A hunk ended before its counts were satisfied. Holds the line that
    /// stopped it, or `None` when the input ran out.
    #[error("{}", overflow_message(.0))]
    Overflow(Option<String>),

    /// The input held no file diff at all
    #[error("no file diff found")]
    NoFileDiff,
}

fn overflow_message(next: &Option<String>) -> String {
    match next {
        Some(line) => format!("overflowed into next file: {}", line),
        None => "overflowed past end of input".to_string(),
    }
}

/// The file an error belongs to
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ErrorFile {
    /// Position of the file in the returned sequence
    Index(usize),

    /// A file whose header could not be completed; it is not part of the
    /// returned sequence
    Partial(Box<FileDiff>),

    /// No file could be started
    Unknown,
}

fn describe_file(file: &ErrorFile) -> String {
    match file {
        ErrorFile::Index(index) => format!(" (file {})", index),
        ErrorFile::Partial(file) => format!(" (in partial file {:?})", file.display_name()),
        ErrorFile::Unknown => String::new(),
    }
}

/// A problem found in one file's diff
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("line {line}: {kind}{}", describe_file(.file))]
pub struct FileError {
    /// 1-based input line the problem was detected on
    pub line: usize,

    /// What went wrong
    pub kind: ErrorKind,

    /// Which file it went wrong in
    pub file: ErrorFile,
}

/// Every per-file problem found while parsing a multi-file diff
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{}", join_errors(.0))]
pub struct MultiError(pub Vec<FileError>);

fn join_errors(errors: &[FileError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

impl MultiError {
    /// The individual errors, in input order
    pub fn errors(&self) -> &[FileError] {
        &self.0
    }

    /// Errors attached to the file at `index` of the returned sequence
    pub fn for_file(&self, index: usize) -> impl Iterator<Item = &FileError> {
        self.0
            .iter()
            .filter(move |e| e.file == ErrorFile::Index(index))
    }
}

/// Reading the input failed. The files completed before the failure are
/// handed back.
#[derive(Debug, Error)]
#[error("failed to read diff input: {source}")]
pub struct ReadFailure {
    /// Files parsed before the stream failed
    pub files: Vec<FileDiff>,

    /// The underlying stream error
    #[source]
    pub source: std::io::Error,
}
