//! Input resolution: validate the user-supplied PDF and derive output paths.
//!
//! pdfium reports a missing or non-PDF file as a generic load failure. We
//! check existence, readability and the `%PDF` magic bytes up front so the
//! operator gets an actionable error before any extraction attempt.

use crate::error::EnvelopeError;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Validate a local PDF path.
pub fn resolve_local(path: &Path) -> Result<PathBuf, EnvelopeError> {
    let path = path.to_path_buf();

    if !path.is_file() {
        return Err(EnvelopeError::FileNotFound { path });
    }

    match File::open(&path) {
        Ok(mut f) => {
            let mut magic = [0u8; 4];
            // Files shorter than the magic are left for pdfium to reject.
            if f.read_exact(&mut magic).is_ok() && &magic != b"%PDF" {
                return Err(EnvelopeError::NotAPdf { path, magic });
            }
        }
        Err(e) if e.kind() == ErrorKind::PermissionDenied => {
            return Err(EnvelopeError::PermissionDenied { path });
        }
        Err(_) => return Err(EnvelopeError::FileNotFound { path }),
    }

    debug!("Resolved local PDF: {}", path.display());
    Ok(path)
}

/// `<dir>/<stem>_merged.pdf` next to the input.
pub fn merged_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    input.with_file_name(format!("{}_merged.pdf", stem))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn accepts_pdf_magic() {
        let dir = TempDir::new().unwrap();
        let p = dir.path().join("letter.pdf");
        fs::write(&p, b"%PDF-1.7\n...").unwrap();
        assert_eq!(resolve_local(&p).unwrap(), p);
    }

    #[test]
    fn rejects_non_pdf() {
        let dir = TempDir::new().unwrap();
        let p = dir.path().join("letter.pdf");
        fs::write(&p, b"PK\x03\x04zip").unwrap();
        match resolve_local(&p).unwrap_err() {
            EnvelopeError::NotAPdf { magic, .. } => assert_eq!(&magic, b"PK\x03\x04"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn missing_file_and_directory_are_not_found() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            resolve_local(&dir.path().join("nope.pdf")),
            Err(EnvelopeError::FileNotFound { .. })
        ));
        assert!(matches!(
            resolve_local(dir.path()),
            Err(EnvelopeError::FileNotFound { .. })
        ));
    }

    #[test]
    fn merged_path_sits_next_to_input() {
        assert_eq!(
            merged_output_path(Path::new("/tmp/in/letter.v2.pdf")),
            PathBuf::from("/tmp/in/letter.v2_merged.pdf")
        );
        assert_eq!(
            merged_output_path(Path::new("letter.pdf")),
            PathBuf::from("letter_merged.pdf")
        );
    }
}
