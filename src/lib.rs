//! Parsing of multi-file unified diffs.
//!
//! Handles the output of `diff -u`, `diff -ruN`, `git diff`, `git show` and
//! `git format-patch`: `---`/`+++` headers with or without timestamps, git
//! extended headers, binary markers, and POSIX `Only in` messages.
//!
//! ```
//! let output = multidiff::parse_multi_file_diff(b"--- a/x\n+++ b/x\n@@ -1 +1 @@\n-a\n+b\n");
//! assert!(output.error.is_none());
//! assert_eq!(output.files[0].new_name, "b/x");
//! ```
pub mod error;
pub mod header;
pub mod lines;
pub mod logcache;
pub mod multi;
pub mod patch;
pub mod timestamp;
pub mod unified;

pub use error::{ErrorFile, ErrorKind, FileError, MultiError, ReadFailure};
pub use logcache::{LogCache, LogConfig};
pub use multi::{
    parse_file_diff, parse_multi_file_diff, read_multi_file_diff, MultiFileDiffReader, Outcome,
    ParseOutput,
};
pub use patch::{FileDiff, Status};
pub use unified::{Hunk, HunkLine};

// TODO: Return a Path instead of a PathBuf
pub fn strip_prefix(path: &std::path::Path, prefix: usize) -> std::path::PathBuf {
    path.components().skip(prefix).collect()
}

#[test]
fn test_strip_prefix() {
    assert_eq!(std::path::PathBuf::from("b"), strip_prefix(std::path::Path::new("a/b"), 1));
    assert_eq!(std::path::PathBuf::from("a/b"), strip_prefix(std::path::Path::new("a/b"), 0));
    assert_eq!(std::path::PathBuf::from(""), strip_prefix(std::path::Path::new("a/b"), 2));
}
