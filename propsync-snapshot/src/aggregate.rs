//! Concatenation of bundle files into a single properties document.
//!
//! ## Document format
//!
//! ```text
//! # all properties collected from Nacos snapshot
//!
//! #=============== properties collected from ===============
//! # /abs/path/of/first/file
//! #=========================================================
//!
//! <first file, verbatim>
//!
//! #=============== properties collected from ===============
//! ...
//! ```
//!
//! The banner carries no trailing newline; every section starts with two
//! newlines, the three delimiter lines, and one blank line. Contents are
//! copied byte for byte, so a later definition of a key overrides an earlier
//! one when the document is loaded as Java properties.

use std::borrow::Cow;
use std::fmt::Write as _;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use propsync_core::MirrorEncoding;

use crate::error::{io_err, SnapshotError};

pub const BANNER: &str = "# all properties collected from Nacos snapshot";
pub const DELIMITER_TOP: &str = "#=============== properties collected from ===============";
pub const DELIMITER_BOTTOM: &str =
    "#=========================================================";

/// Render the concatenated document for `paths`, in order.
///
/// Entries are copied as raw bytes; they need not be UTF-8. A path that no
/// longer exists fails with [`SnapshotError::BundleEntryVanished`]; nothing
/// is written in that case.
pub fn render<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<u8>, SnapshotError> {
    let mut doc = BANNER.as_bytes().to_vec();
    for path in paths {
        let path = path.as_ref();
        let content = fs::read(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => SnapshotError::BundleEntryVanished {
                path: path.to_path_buf(),
            },
            _ => io_err(path, e),
        })?;
        doc.extend_from_slice(section_header(path).as_bytes());
        doc.extend_from_slice(&content);
    }
    Ok(doc)
}

/// Concatenate `paths` into `out`, optionally echoing the document to a
/// second sink. Returns the number of bytes written.
pub fn concatenate<P: AsRef<Path>>(
    paths: &[P],
    out: &Path,
    echo: Option<&mut dyn Write>,
) -> Result<usize, SnapshotError> {
    let doc = render(paths)?;
    if let Some(parent) = out.parent() {
        fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    fs::write(out, &doc).map_err(|e| io_err(out, e))?;
    tracing::debug!("file generated: {}", out.display());

    if let Some(sink) = echo {
        sink.write_all(&doc)
            .and_then(|()| sink.write_all(b"\n"))
            .map_err(|e| io_err("<echo>", e))?;
    }
    Ok(doc.len())
}

fn section_header(path: &Path) -> String {
    format!(
        "\n\n{DELIMITER_TOP}\n# {}\n{DELIMITER_BOTTOM}\n\n",
        path.display()
    )
}

// ---------------------------------------------------------------------------
// Splitting
// ---------------------------------------------------------------------------

/// One source section of a concatenated document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSection {
    pub source: PathBuf,
    pub content: Vec<u8>,
}

impl SourceSection {
    /// Content as text, with invalid UTF-8 replaced.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.content)
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Split a document produced by [`render`] back into its sections.
///
/// Bytes before the first section (the banner) are dropped.
pub fn split_sources(doc: &[u8]) -> Vec<SourceSection> {
    let opener = format!("\n\n{DELIMITER_TOP}\n# ").into_bytes();
    let closer = format!("\n{DELIMITER_BOTTOM}\n\n").into_bytes();

    let mut sections = Vec::new();
    let mut rest = match find(doc, &opener) {
        Some(at) => &doc[at..],
        None => return sections,
    };
    while let Some(body) = rest.strip_prefix(opener.as_slice()) {
        let Some(end_of_source) = find(body, &closer) else {
            break;
        };
        let source = PathBuf::from(String::from_utf8_lossy(&body[..end_of_source]).into_owned());
        let after = &body[end_of_source + closer.len()..];
        let (content, next) = match find(after, &opener) {
            Some(at) => (&after[..at], &after[at..]),
            None => (after, &[][..]),
        };
        sections.push(SourceSection {
            source,
            content: content.to_vec(),
        });
        rest = next;
    }
    sections
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Escape every non-ASCII character as `\uXXXX` (UTF-16 code units,
/// lowercase hex), the ISO-8859-1 convention for properties files.
pub fn escape_non_ascii(text: &str) -> Cow<'_, str> {
    if text.is_ascii() {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len() + text.len() / 2);
    let mut units = [0u16; 2];
    for c in text.chars() {
        if c.is_ascii() {
            out.push(c);
        } else {
            for unit in c.encode_utf16(&mut units) {
                let _ = write!(out, "\\u{unit:04x}");
            }
        }
    }
    Cow::Owned(out)
}

/// Apply the mirror encoding to a document.
pub fn encode(text: &str, encoding: MirrorEncoding) -> Cow<'_, str> {
    match encoding {
        MirrorEncoding::Utf8 => Cow::Borrowed(text),
        MirrorEncoding::AsciiEscaped => escape_non_ascii(text),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn empty_bundle_is_banner_only() {
        let tmp = TempDir::new().unwrap();
        let out = tmp.path().join("out.properties");
        let paths: Vec<PathBuf> = vec![];
        concatenate(&paths, &out, None).unwrap();
        assert_eq!(fs::read_to_string(&out).unwrap(), BANNER);
    }

    #[test]
    fn document_matches_exact_layout() {
        let tmp = TempDir::new().unwrap();
        let a = write(tmp.path(), "a", "x=1\n");
        let b = write(tmp.path(), "b", "x=2");
        let doc = String::from_utf8(render(&[&a, &b]).unwrap()).unwrap();

        let expected = format!(
            "{BANNER}\n\n{DELIMITER_TOP}\n# {}\n{DELIMITER_BOTTOM}\n\nx=1\n\
             \n\n{DELIMITER_TOP}\n# {}\n{DELIMITER_BOTTOM}\n\nx=2",
            a.display(),
            b.display()
        );
        assert_eq!(doc, expected);
        assert_eq!(DELIMITER_TOP.len(), DELIMITER_BOTTOM.len());
    }

    #[test]
    fn vanished_entry_fails_and_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        let a = write(tmp.path(), "a", "x=1\n");
        let gone = tmp.path().join("gone");
        let out = tmp.path().join("out");

        let err = concatenate(&[a, gone.clone()], &out, None).unwrap_err();
        assert!(matches!(err, SnapshotError::BundleEntryVanished { ref path } if *path == gone));
        assert!(!out.exists());
    }

    #[test]
    fn echo_receives_the_same_document() {
        let tmp = TempDir::new().unwrap();
        let a = write(tmp.path(), "a", "k=v\n");
        let out = tmp.path().join("out");
        let mut echo: Vec<u8> = Vec::new();

        concatenate(&[&a], &out, Some(&mut echo as &mut dyn Write)).unwrap();
        let written = fs::read_to_string(&out).unwrap();
        assert_eq!(String::from_utf8(echo).unwrap(), format!("{written}\n"));
    }

    #[test]
    fn split_recovers_sources_and_contents() {
        let tmp = TempDir::new().unwrap();
        let a = write(tmp.path(), "a", "x=1\ny=2\n");
        let b = write(tmp.path(), "b", "");
        let c = write(tmp.path(), "c", "# comment\nz=3");
        let doc = render(&[&a, &b, &c]).unwrap();

        let sections = split_sources(&doc);
        assert_eq!(sections.len(), 3);
        assert_eq!(sections[0].source, a);
        assert_eq!(sections[0].text(), "x=1\ny=2\n");
        assert!(sections[1].content.is_empty());
        assert_eq!(sections[2].source, c);
        assert_eq!(sections[2].text(), "# comment\nz=3");
    }

    #[test]
    fn non_utf8_entries_are_copied_byte_for_byte() {
        let tmp = TempDir::new().unwrap();
        let latin1 = tmp.path().join("latin1");
        fs::write(&latin1, b"name=caf\xe9\n").unwrap();
        let b = write(tmp.path(), "b", "k=v\n");
        let out = tmp.path().join("out");

        concatenate(&[&latin1, &b], &out, None).unwrap();
        let doc = fs::read(&out).unwrap();
        let sections = split_sources(&doc);
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].source, latin1);
        assert_eq!(sections[0].content, b"name=caf\xe9\n");
        assert_eq!(sections[1].content, b"k=v\n");
    }

    #[test]
    fn non_ascii_is_escaped_as_utf16_units() {
        assert_eq!(escape_non_ascii("name=plain"), "name=plain");
        assert_eq!(escape_non_ascii("name=中文"), "name=\\u4e2d\\u6587");
        assert_eq!(escape_non_ascii("emoji=😀"), "emoji=\\ud83d\\ude00");
        assert!(matches!(encode("é", MirrorEncoding::Utf8), Cow::Borrowed("é")));
    }
}
