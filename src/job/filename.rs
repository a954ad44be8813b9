//! Validated upload filenames.
//!
//! A [`SafeFilename`] is built once from the client-supplied name and is the
//! only thing that ever touches the filesystem or the container command line.
//! It holds a single path component made of `[A-Za-z0-9_.-]` with an allowed
//! extension, so joining it onto a directory can never escape that directory.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::config::ALLOWED_EXTENSIONS;
use crate::error::JobError;

/// Suffix appended to the base name for the final wiki markup file.
pub const RESULT_SUFFIX: &str = "_wikitext.txt";

/// Longest filename accepted after sanitizing (bytes; all ASCII).
const MAX_FILENAME_LEN: usize = 200;

static UNSAFE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_.\-]").expect("static regex"));

/// A sanitized, extension-checked upload filename.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SafeFilename(String);

impl SafeFilename {
    /// Validate and sanitize a client-supplied filename.
    ///
    /// The raw name must be non-empty and carry an allowed extension; the
    /// sanitized form must still have a non-empty base and the same
    /// extension.
    pub fn parse(raw: &str) -> Result<Self, JobError> {
        if raw.trim().is_empty() {
            return Err(JobError::invalid_input("No file selected."));
        }
        if !has_allowed_extension(raw) {
            return Err(JobError::invalid_input(
                "Invalid file type. Please upload a PDF.",
            ));
        }

        let clean = sanitize(raw);

        if clean.len() > MAX_FILENAME_LEN {
            return Err(JobError::invalid_input(format!(
                "Filename is too long (max {} characters).",
                MAX_FILENAME_LEN
            )));
        }
        if !has_allowed_extension(&clean) || split_extension(&clean).0.is_empty() {
            return Err(JobError::invalid_input(format!(
                "Filename {:?} has no usable characters.",
                raw
            )));
        }

        Ok(Self(clean))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The name without its final extension: `a.b.pdf` -> `a.b`.
    pub fn base(&self) -> &str {
        split_extension(&self.0).0
    }

    /// Intermediate Markdown file name: `{base}.md`.
    pub fn markdown_name(&self) -> String {
        format!("{}.md", self.base())
    }

    /// Final wiki markup file name: `{base}_wikitext.txt`.
    pub fn result_name(&self) -> String {
        format!("{}{}", self.base(), RESULT_SUFFIX)
    }

    /// This file inside `dir`.
    pub fn path_in(&self, dir: &Path) -> PathBuf {
        dir.join(&self.0)
    }
}

impl fmt::Display for SafeFilename {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SafeFilename {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Split at the last `.`; the extension excludes the dot.
fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rsplit_once('.') {
        Some((base, ext)) => (base, Some(ext)),
        None => (name, None),
    }
}

fn has_allowed_extension(name: &str) -> bool {
    match split_extension(name).1 {
        Some(ext) => ALLOWED_EXTENSIONS
            .iter()
            .any(|allowed| ext.eq_ignore_ascii_case(allowed)),
        None => false,
    }
}

/// Reduce a filename to a single safe path component.
///
/// Non-ASCII is dropped, path separators become whitespace, whitespace runs
/// become `_`, everything outside `[A-Za-z0-9_.-]` is removed and leading or
/// trailing `.`/`_` are trimmed (so `..` can never survive).
fn sanitize(raw: &str) -> String {
    let ascii: String = raw
        .chars()
        .filter(char::is_ascii)
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();

    let joined = ascii.split_whitespace().collect::<Vec<_>>().join("_");
    let stripped = UNSAFE_CHARS.replace_all(&joined, "");

    stripped.trim_matches(|c| c == '.' || c == '_').to_string()
}
