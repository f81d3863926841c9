//! The per-file diff model
use crate::timestamp::format_diff_time;
use crate::unified::{Hunk, Stat};
use chrono::{DateTime, FixedOffset};
use std::path::PathBuf;

/// What happened to a file
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Status {
    /// The file was created
    Added,
    /// The file was removed
    Deleted,
    /// The file's contents changed
    Modified,
    /// The file was moved, possibly with changes
    Renamed,
    /// The file was copied, possibly with changes
    Copied,
    /// Only the file's mode changed
    ModeChanged,
    /// A binary file changed
    Binary,
    /// The file exists in only one of two compared directories
    OnlyIn,
}

/// The diff of a single file
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FileDiff {
    /// Name of the original file; empty if the file was added
    pub orig_name: String,

    /// Timestamp of the original file
    pub orig_time: Option<DateTime<FixedOffset>>,

    /// Name of the new file; empty if the file was deleted
    pub new_name: String,

    /// Timestamp of the new file
    pub new_time: Option<DateTime<FixedOffset>>,

    /// Extended header lines (`diff --git`, `index`, modes, renames, binary
    /// markers), without terminators and lossily decoded
    pub extended: Vec<String>,

    /// The extended header lines as they appeared in the input
    pub extended_lines: Vec<Vec<u8>>,

    /// List of hunks
    pub hunks: Vec<Hunk>,

    /// Lines before the first file of the input, verbatim
    pub preamble: Vec<Vec<u8>>,

    /// The `---`/`+++` or `Only in` lines, verbatim
    pub header_lines: Vec<Vec<u8>>,

    /// Lines after the hunks that belong to no hunk, verbatim
    pub trailing: Vec<Vec<u8>>,
}

impl FileDiff {
    /// Create a file diff with the given names
    pub fn new(orig_name: String, new_name: String) -> Self {
        Self {
            orig_name,
            new_name,
            ..Default::default()
        }
    }

    /// The most descriptive name of the file
    pub fn display_name(&self) -> &str {
        if self.new_name.is_empty() {
            &self.orig_name
        } else {
            &self.new_name
        }
    }

    fn extended_value(&self, prefix: &str) -> Option<&str> {
        self.extended.iter().find_map(|l| l.strip_prefix(prefix))
    }

    fn has_extended(&self, prefix: &str) -> bool {
        self.extended.iter().any(|l| l.starts_with(prefix))
    }

    /// Whether this is a POSIX `Only in` entry
    pub fn is_only_in(&self) -> bool {
        self.header_lines
            .first()
            .map_or(false, |l| l.starts_with(crate::header::ONLY_IN_PREFIX))
    }

    /// Whether the change is to a binary file
    pub fn is_binary(&self) -> bool {
        self.has_extended("Binary files ") || self.has_extended("GIT binary patch")
    }

    /// Mode of the original file, if the header records one
    pub fn old_mode(&self) -> Option<&str> {
        self.extended_value("old mode ")
            .or_else(|| self.extended_value("deleted file mode "))
    }

    /// Mode of the new file, if the header records one
    pub fn new_mode(&self) -> Option<&str> {
        self.extended_value("new mode ")
            .or_else(|| self.extended_value("new file mode "))
    }

    /// Similarity percentage of a rename or copy
    pub fn similarity(&self) -> Option<u8> {
        self.extended_value("similarity index ")?
            .trim_end_matches('%')
            .parse()
            .ok()
    }

    /// Classify the change
    pub fn status(&self) -> Status {
        if self.is_only_in() {
            Status::OnlyIn
        } else if self.orig_name.is_empty() || self.has_extended("new file mode ") {
            Status::Added
        } else if self.new_name.is_empty() || self.has_extended("deleted file mode ") {
            Status::Deleted
        } else if self.has_extended("rename from ") {
            Status::Renamed
        } else if self.has_extended("copy from ") {
            Status::Copied
        } else if self.is_binary() {
            Status::Binary
        } else if self.has_extended("old mode ") && self.hunks.is_empty() {
            Status::ModeChanged
        } else {
            Status::Modified
        }
    }

    /// Path of the original file with `strip` leading components removed
    pub fn orig_path(&self, strip: usize) -> Option<PathBuf> {
        if self.orig_name.is_empty() {
            return None;
        }
        Some(crate::strip_prefix(std::path::Path::new(&self.orig_name), strip))
    }

    /// Path of the new file with `strip` leading components removed
    pub fn new_path(&self, strip: usize) -> Option<PathBuf> {
        if self.new_name.is_empty() {
            return None;
        }
        Some(crate::strip_prefix(std::path::Path::new(&self.new_name), strip))
    }

    /// Added and removed lines over all hunks
    pub fn stat(&self) -> Stat {
        self.hunks
            .iter()
            .fold(Stat::default(), |total, hunk| total + hunk.stat())
    }

    fn write_name_line<W: std::io::Write>(
        w: &mut W,
        prefix: &str,
        name: &str,
        time: &Option<DateTime<FixedOffset>>,
    ) -> std::io::Result<()> {
        let name = if name.is_empty() { "/dev/null" } else { name };
        match time {
            Some(time) => writeln!(w, "{} {}\t{}", prefix, name, format_diff_time(time)),
            None => writeln!(w, "{} {}", prefix, name),
        }
    }

    /// Write this file diff to a writer.
    ///
    /// Lines kept verbatim from the input are written back as they were, so a
    /// parsed diff reproduces its input. Header lines missing from a diff
    /// built by hand are synthesized.
    pub fn write<W: std::io::Write>(&self, w: &mut W) -> std::io::Result<()> {
        for line in &self.preamble {
            w.write_all(line)?;
        }
        if self.extended_lines.is_empty() {
            for line in &self.extended {
                writeln!(w, "{}", line)?;
            }
        } else {
            for line in &self.extended_lines {
                w.write_all(line)?;
            }
        }
        if !self.header_lines.is_empty() {
            for line in &self.header_lines {
                w.write_all(line)?;
            }
        } else if !self.hunks.is_empty() || self.extended.is_empty() {
            Self::write_name_line(w, "---", &self.orig_name, &self.orig_time)?;
            Self::write_name_line(w, "+++", &self.new_name, &self.new_time)?;
        }
        for hunk in &self.hunks {
            hunk.write(w)?;
        }
        for line in &self.trailing {
            w.write_all(line)?;
        }
        Ok(())
    }

    /// Serialize this file diff to a byte vector
    pub fn as_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        self.write(&mut bytes).unwrap();
        bytes
    }
}
