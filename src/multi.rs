//! Parsing of diffs covering many files
use crate::error::{ErrorFile, ErrorKind, FileError, MultiError, ReadFailure};
use crate::header::{read_file_header, starts_file, HeaderRead, HunkExpectation};
use crate::lines::LineReader;
use crate::patch::FileDiff;
use crate::unified::read_hunk;
use std::io::BufRead;

/// The result of reading one file from a multi-file diff.
///
/// A failure of the underlying stream is reported separately, as the `Err`
/// arm of [`MultiFileDiffReader::read_file`].
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The file parsed cleanly
    Complete(FileDiff),

    /// The file was parsed, but with problems
    Partial(FileDiff, Vec<FileError>),

    /// No file could be produced; the error may carry what was read of it
    Rejected(FileError),
}

/// What the line after a file's header and hunks means for that file
#[derive(Debug, PartialEq, Eq)]
enum Next {
    Hunk,
    Boundary,
    Excess,
    Trailing,
}

/// Reads file diffs one at a time from a multi-file unified diff.
///
/// Lines that cannot be attributed to a new file are attached to the file
/// before them, as excess hunk lines or as trailing content, so nothing is
/// dropped. Lines before the first file become that file's preamble.
pub struct MultiFileDiffReader<R> {
    reader: LineReader<R>,
    preamble: Vec<Vec<u8>>,
    emitted: usize,
}

impl<R: BufRead> MultiFileDiffReader<R> {
    /// Create a reader over a buffered byte stream
    pub fn new(reader: R) -> Self {
        Self {
            reader: LineReader::new(reader),
            preamble: Vec::new(),
            emitted: 0,
        }
    }

    /// Read the next file.
    ///
    /// Returns `Ok(None)` once the input is exhausted. Files returned as
    /// `Complete` or `Partial` are numbered from zero in the order they are
    /// returned; errors refer to them by that number.
    pub fn read_file(&mut self) -> std::io::Result<Option<Outcome>> {
        loop {
            let at_file = match self.reader.peek()? {
                None => {
                    if !self.preamble.is_empty() {
                        log::debug!(
                            "{} lines at end of input belong to no file",
                            self.preamble.len()
                        );
                    }
                    return Ok(None);
                }
                Some(line) => starts_file(line.content()),
            };
            if at_file {
                break;
            }
            if let Some(line) = self.reader.next_line()? {
                self.preamble.push(line.into_raw());
            }
        }

        let (mut file, expectation) = match read_file_header(&mut self.reader)? {
            None => return Ok(None),
            Some(HeaderRead::File(file, expectation)) => (file, expectation),
            Some(HeaderRead::Rejected(line, kind, partial)) => {
                let file = match partial {
                    Some(partial) => ErrorFile::Partial(Box::new(partial)),
                    None => ErrorFile::Unknown,
                };
                return Ok(Some(Outcome::Rejected(FileError { line, kind, file })));
            }
        };
        file.preamble = std::mem::take(&mut self.preamble);

        let mut problems = Vec::new();
        self.collect_hunks(&mut file, expectation, &mut problems)?;

        let index = self.emitted;
        self.emitted += 1;
        if problems.is_empty() {
            log::debug!("parsed {:?} with {} hunks", file.display_name(), file.hunks.len());
            return Ok(Some(Outcome::Complete(file)));
        }
        let errors = problems
            .into_iter()
            .map(|(line, kind)| FileError {
                line,
                kind,
                file: ErrorFile::Index(index),
            })
            .collect();
        Ok(Some(Outcome::Partial(file, errors)))
    }

    fn classify_next(file: &FileDiff, content: &[u8], accept_hunks: bool) -> Next {
        if content.starts_with(b"@@ ") && accept_hunks {
            Next::Hunk
        } else if starts_file(content) {
            Next::Boundary
        } else if !file.hunks.is_empty()
            && file.trailing.is_empty()
            && content != b"-- "
            && matches!(content.first(), Some(b' ' | b'-' | b'+'))
        {
            Next::Excess
        } else {
            Next::Trailing
        }
    }

    /// Collect the hunks of `file` until the next file starts or input ends
    fn collect_hunks(
        &mut self,
        file: &mut FileDiff,
        expectation: HunkExpectation,
        problems: &mut Vec<(usize, ErrorKind)>,
    ) -> std::io::Result<()> {
        let mut accept_hunks = expectation != HunkExpectation::None;
        let mut excess_from: Option<usize> = None;
        loop {
            let next = match self.reader.peek()? {
                None => break,
                Some(line) => Self::classify_next(file, line.content(), accept_hunks),
            };
            if next != Next::Hunk && expectation == HunkExpectation::ImmediateOnly {
                accept_hunks = false;
            }
            match next {
                Next::Boundary => break,
                Next::Hunk => {
                    Self::flush_excess(file, excess_from.take(), problems);
                    if let Some(hunk) = read_hunk(&mut self.reader, problems)? {
                        file.hunks.push(hunk);
                    } else {
                        self.skip_hunk_body(file)?;
                    }
                }
                Next::Excess => {
                    if let (Some(line), Some(hunk)) = (self.reader.next_line()?, file.hunks.last_mut()) {
                        excess_from.get_or_insert(self.reader.line_no());
                        hunk.body.push(line.into_raw());
                    }
                }
                Next::Trailing => {
                    if let Some(line) = self.reader.next_line()? {
                        if line.starts_with(b"@@ ") {
                            log::warn!(
                                "hunk header at line {} follows a file that takes no hunks",
                                self.reader.line_no()
                            );
                        }
                        file.trailing.push(line.into_raw());
                    }
                }
            }
        }
        Self::flush_excess(file, excess_from, problems);
        Ok(())
    }

    /// Report the last hunk of `file` if excess lines were appended to it
    fn flush_excess(
        file: &FileDiff,
        excess_from: Option<usize>,
        problems: &mut Vec<(usize, ErrorKind)>,
    ) {
        let kind = match (excess_from, file.hunks.last()) {
            (Some(_), Some(hunk)) => hunk.count_mismatch(),
            _ => None,
        };
        if let (Some(line), Some(kind)) = (excess_from, kind) {
            log::warn!("line {}: {}", line, kind);
            problems.push((line, kind));
        }
    }

    /// Keep the body lines after a malformed hunk header as trailing content
    fn skip_hunk_body(&mut self, file: &mut FileDiff) -> std::io::Result<()> {
        while let Some(line) = self.reader.next_if(|line| {
            let content = line.content();
            !starts_file(content) && !content.starts_with(b"@@ ")
                && matches!(content.first(), Some(b' ' | b'-' | b'+' | b'\\'))
        })? {
            file.trailing.push(line.into_raw());
        }
        Ok(())
    }
}

impl<R: BufRead> Iterator for MultiFileDiffReader<R> {
    type Item = std::io::Result<Outcome>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_file().transpose()
    }
}

/// The files of a multi-file diff, and every problem found in them
#[derive(Debug, PartialEq, Eq)]
pub struct ParseOutput {
    /// The files, in input order
    pub files: Vec<FileDiff>,

    /// Per-file problems; `None` if every file parsed cleanly
    pub error: Option<MultiError>,
}

impl ParseOutput {
    /// Treat any per-file problem as a failure of the whole parse
    pub fn into_strict(self) -> Result<Vec<FileDiff>, MultiError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.files),
        }
    }
}

/// Parse a multi-file diff from a stream.
///
/// Per-file problems do not stop the parse; they are collected in
/// [`ParseOutput::error`]. Only a failure of the stream itself ends it early.
pub fn read_multi_file_diff<R: BufRead>(reader: R) -> Result<ParseOutput, ReadFailure> {
    let mut files = Vec::new();
    let mut errors = Vec::new();
    for outcome in MultiFileDiffReader::new(reader) {
        match outcome {
            Ok(Outcome::Complete(file)) => files.push(file),
            Ok(Outcome::Partial(file, file_errors)) => {
                files.push(file);
                errors.extend(file_errors);
            }
            Ok(Outcome::Rejected(error)) => errors.push(error),
            Err(source) => return Err(ReadFailure { files, source }),
        }
    }
    let error = if errors.is_empty() {
        None
    } else {
        Some(MultiError(errors))
    };
    Ok(ParseOutput { files, error })
}

/// Parse a multi-file diff held in memory
pub fn parse_multi_file_diff(data: &[u8]) -> ParseOutput {
    match read_multi_file_diff(data) {
        Ok(output) => output,
        Err(failure) => unreachable!("reading from memory failed: {}", failure),
    }
}

/// Parse a diff that is expected to cover exactly one file.
///
/// Anything after the first file is ignored.
pub fn parse_file_diff(data: &[u8]) -> Result<FileDiff, MultiError> {
    let mut reader = MultiFileDiffReader::new(data);
    let outcome = reader
        .read_file()
        .unwrap_or_else(|e| unreachable!("reading from memory failed: {}", e));
    match outcome {
        Some(Outcome::Complete(file)) => Ok(file),
        Some(Outcome::Partial(_, errors)) => Err(MultiError(errors)),
        Some(Outcome::Rejected(error)) => Err(MultiError(vec![error])),
        None => Err(MultiError(vec![FileError {
            line: reader.reader.line_no(),
            kind: ErrorKind::NoFileDiff,
            file: ErrorFile::Unknown,
        }])),
    }
}

#[cfg(test)]
mod multi_tests {
    use super::*;
    use crate::patch::Status;

    const TWO_FILES: &[u8] = b"diff --git a/foo b/foo
index 1234567..89abcde 100644
--- a/foo
+++ b/foo
@@ -1,3 +1,3 @@
 one
-two
+zwei
 three
diff --git a/bar b/bar
index 1234567..89abcde 100644
--- a/bar
+++ b/bar
@@ -10,2 +10,3 @@ fn bar()
 x
+y
 z
@@ -20 +21 @@
-a
+b
";

    #[test]
    fn test_two_files() {
        let output = parse_multi_file_diff(TWO_FILES);
        assert!(output.error.is_none(), "{:?}", output.error);
        assert_eq!(output.files.len(), 2);
        let foo = &output.files[0];
        assert_eq!(foo.orig_name, "a/foo");
        assert_eq!(foo.new_name, "b/foo");
        assert_eq!(foo.hunks.len(), 1);
        assert_eq!(foo.hunks[0].body.len(), 4);
        let bar = &output.files[1];
        assert_eq!(bar.hunks.len(), 2);
        assert_eq!(bar.hunks[0].section.as_deref(), Some("fn bar()"));
        assert_eq!(bar.hunks[1].body, vec![b"-a\n".to_vec(), b"+b\n".to_vec()]);
    }

    #[test]
    fn test_round_trip() {
        let output = parse_multi_file_diff(TWO_FILES);
        let bytes = output
            .files
            .iter()
            .flat_map(|f| f.as_bytes())
            .collect::<Vec<u8>>();
        assert_eq!(bytes, TWO_FILES);
    }

    #[test]
    fn test_round_trip_with_noise() {
        let input: &[u8] = b"commit 0123456789abcdef
Author: A U Thor <author@example.com>

    Change things

diff --git a/bin b/bin
index 1..2 100644
GIT binary patch
literal 5
Mc${NkU}WL~000F1NB{r;

diff --git a/old b/new
similarity index 100%
rename from old
rename to new
Only in dir: file
--- a/x\t2009-10-14 19:49:59.000000000 +0000
+++ b/x\t2009-10-14 19:51:00.000000000 +0000
@@ -1 +1 @@
-a
\\ No newline at end of file
+b
\\ No newline at end of file
--\x20
2.39.0
";
        let output = parse_multi_file_diff(input);
        assert!(output.error.is_none(), "{:?}", output.error);
        let statuses = output.files.iter().map(|f| f.status()).collect::<Vec<_>>();
        assert_eq!(
            statuses,
            vec![Status::Binary, Status::Renamed, Status::OnlyIn, Status::Modified]
        );
        assert_eq!(output.files[0].preamble.len(), 5);
        assert_eq!(
            output.files[3].trailing,
            vec![b"-- \n".to_vec(), b"2.39.0\n".to_vec()]
        );
        let bytes = output
            .files
            .iter()
            .flat_map(|f| f.as_bytes())
            .collect::<Vec<u8>>();
        assert_eq!(bytes, input);
    }

    fn assert_round_trip(input: &[u8]) -> ParseOutput {
        let output = parse_multi_file_diff(input);
        assert!(output.error.is_none(), "{:?}", output.error);
        let bytes = output
            .files
            .iter()
            .flat_map(|f| f.as_bytes())
            .collect::<Vec<u8>>();
        assert_eq!(
            String::from_utf8_lossy(&bytes),
            String::from_utf8_lossy(input)
        );
        assert_eq!(bytes, input);
        output
    }

    #[test]
    fn test_round_trip_crlf() {
        let output = assert_round_trip(
            b"diff --git a/x b/x\r\nindex 1..2 100644\r\n--- a/x\r\n+++ b/x\r\n@@ -1 +1 @@\r\n-a\r\n+b\r\n",
        );
        assert_eq!(output.files[0].extended[1], "index 1..2 100644");
    }

    #[test]
    fn test_round_trip_without_final_newline() {
        let output = assert_round_trip(b"diff --git a/x b/x\nold mode 100644\nnew mode 100755");
        assert_eq!(output.files[0].status(), Status::ModeChanged);
    }

    #[test]
    fn test_round_trip_non_utf8_names() {
        let output = assert_round_trip(
            b"diff --git a/\xff b/\xff\nindex 1..2 100644\n--- a/\xff\n+++ b/\xff\n@@ -1 +1 @@\n-a\n+b\n",
        );
        assert_eq!(output.files[0].new_name, "b/\u{fffd}");
    }

    #[test]
    fn test_short_hunk_before_next_hunk() {
        let output =
            parse_multi_file_diff(b"--- a/x\n+++ b/x\n@@ -1,3 +1,3 @@\n a\n@@ -10 +10 @@\n-b\n+c\n");
        assert_eq!(output.files[0].hunks.len(), 2);
        let error = output.error.unwrap();
        assert_eq!(
            error.errors(),
            &[FileError {
                line: 4,
                kind: ErrorKind::HunkCountMismatch {
                    orig_expected: 3,
                    orig_found: 1,
                    new_expected: 3,
                    new_found: 1,
                },
                file: ErrorFile::Index(0),
            }]
        );
    }

    #[test]
    fn test_only_in() {
        let output = parse_multi_file_diff(b"Only in dir/sub: file.txt\n");
        assert!(output.error.is_none());
        assert_eq!(output.files.len(), 1);
        assert_eq!(output.files[0].orig_name, "dir/sub/file.txt");
        assert!(output.files[0].hunks.is_empty());
    }

    #[test]
    fn test_bad_only_in() {
        let output = parse_multi_file_diff(b"Only in dir/sub file.txt\n");
        assert!(output.files.is_empty());
        let error = output.error.unwrap();
        assert!(matches!(
            error.errors(),
            [FileError {
                line: 1,
                kind: ErrorKind::MalformedOnlyIn(_),
                file: ErrorFile::Unknown,
            }]
        ));
    }

    #[test]
    fn test_deleted_file_takes_no_later_hunks() {
        let output = parse_multi_file_diff(
            b"diff --git a/x b/x
deleted file mode 100644
--- a/x
+++ /dev/null
unrelated line
@@ -1 +1 @@
-a
+b
",
        );
        assert_eq!(output.files.len(), 1);
        let file = &output.files[0];
        assert_eq!(file.new_name, "");
        assert!(file.hunks.is_empty());
        assert_eq!(file.status(), Status::Deleted);
        assert_eq!(file.trailing.len(), 4);
        assert!(output.error.is_none());
    }

    #[test]
    fn test_deleted_file_with_removed_content() {
        let output = parse_multi_file_diff(
            b"diff --git a/x b/x
deleted file mode 100644
index 1234567..0000000
--- a/x
+++ /dev/null
@@ -1,2 +0,0 @@
-a
-b
diff --git a/y b/y
",
        );
        assert_eq!(output.files[0].hunks.len(), 1);
        assert_eq!(output.files[0].hunks[0].body.len(), 2);
    }

    #[test]
    fn test_truncated_hunk() {
        let output = parse_multi_file_diff(b"--- a/x\n+++ b/x\n@@ -1,0 +10,5 @@\n+1\n+2\n");
        assert_eq!(output.files.len(), 1);
        assert_eq!(output.files[0].hunks[0].body.len(), 2);
        let error = output.error.unwrap();
        assert_eq!(
            error.errors(),
            &[FileError {
                line: 6,
                kind: ErrorKind::Overflow(None),
                file: ErrorFile::Index(0),
            }]
        );
    }

    #[test]
    fn test_overflow_then_next_file() {
        let output = parse_multi_file_diff(
            b"--- a/x\n+++ b/x\n@@ -1,3 +1,3 @@\n a\n-b\n+c\ndiff --git a/y b/y\n--- a/y\n+++ b/y\n@@ -1 +1 @@\n-d\n+e\n",
        );
        assert_eq!(output.files.len(), 2);
        assert_eq!(output.files[1].hunks.len(), 1);
        let error = output.error.unwrap();
        assert_eq!(error.errors().len(), 1);
        assert_eq!(
            error.errors()[0].kind,
            ErrorKind::Overflow(Some("diff --git a/y b/y".to_string()))
        );
        assert_eq!(error.errors()[0].file, ErrorFile::Index(0));
    }

    #[test]
    fn test_excess_lines_are_a_mismatch() {
        let output = parse_multi_file_diff(b"--- a/x\n+++ b/x\n@@ -1 +1 @@\n-a\n+b\n+c\n");
        let file = &output.files[0];
        assert_eq!(file.hunks[0].body.len(), 3);
        let error = output.error.unwrap();
        assert_eq!(
            error.errors()[0].kind,
            ErrorKind::HunkCountMismatch {
                orig_expected: 1,
                orig_found: 1,
                new_expected: 1,
                new_found: 2,
            }
        );
        assert_eq!(error.errors()[0].line, 6);
    }

    #[test]
    fn test_malformed_hunk_header() {
        let output =
            parse_multi_file_diff(b"--- a/x\n+++ b/x\n@@ -x +y @@\n-a\n+b\n@@ -1 +1 @@\n-c\n+d\n");
        let file = &output.files[0];
        assert_eq!(file.hunks.len(), 1);
        assert_eq!(file.trailing, vec![b"-a\n".to_vec(), b"+b\n".to_vec()]);
        let error = output.error.unwrap();
        assert!(matches!(
            error.errors()[0].kind,
            ErrorKind::MalformedHunkHeader { .. }
        ));
    }

    #[test]
    fn test_unrecognized_header_block_recovers() {
        let output = parse_multi_file_diff(
            b"diff --git a/x b/x\nindex 1..2 100644\ndiff --git a/y b/y\n--- a/y\n+++ b/y\n@@ -1 +1 @@\n-a\n+b\n",
        );
        assert_eq!(output.files.len(), 1);
        assert_eq!(output.files[0].new_name, "b/y");
        let error = output.error.unwrap();
        match &error.errors()[0].file {
            ErrorFile::Partial(file) => assert_eq!(file.extended.len(), 2),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_junk_only() {
        let output = parse_multi_file_diff(b"nothing to see\nhere\n");
        assert!(output.files.is_empty());
        assert!(output.error.is_none());
    }

    #[test]
    fn test_into_strict() {
        assert_eq!(parse_multi_file_diff(TWO_FILES).into_strict().unwrap().len(), 2);
        assert!(parse_multi_file_diff(b"Only in x\n").into_strict().is_err());
    }

    #[test]
    fn test_parse_file_diff() {
        let file = parse_file_diff(TWO_FILES).unwrap();
        assert_eq!(file.new_name, "b/foo");
        let error = parse_file_diff(b"").unwrap_err();
        assert_eq!(error.errors()[0].kind, ErrorKind::NoFileDiff);
    }

    #[test]
    fn test_streaming() {
        let mut reader = MultiFileDiffReader::new(TWO_FILES);
        assert!(matches!(reader.next(), Some(Ok(Outcome::Complete(_)))));
        assert!(matches!(reader.next(), Some(Ok(Outcome::Complete(_)))));
        assert!(reader.next().is_none());
    }

    struct FailAfter {
        data: &'static [u8],
    }

    impl std::io::Read for FailAfter {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.data.is_empty() {
                return Err(std::io::Error::new(std::io::ErrorKind::Other, "disk on fire"));
            }
            let n = self.data.len().min(buf.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data = &self.data[n..];
            Ok(n)
        }
    }

    #[test]
    fn test_stream_failure_keeps_completed_files() {
        let reader = std::io::BufReader::new(FailAfter {
            data: b"Only in a: b\nOnly in c: d\n",
        });
        let failure = read_multi_file_diff(reader).unwrap_err();
        assert_eq!(failure.files.len(), 1);
        assert_eq!(failure.source.to_string(), "disk on fire");
    }
}
