//! Email attachments.

use crate::{MailError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

const OCTET_STREAM: &str = "application/octet-stream";

/// Email attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    /// File name shown to the recipient.
    pub filename: String,
    /// MIME type.
    pub mime_type: String,
    /// Raw file content.
    pub content: Vec<u8>,
}

impl Attachment {
    /// Create a new attachment from bytes.
    pub fn new(
        filename: impl Into<String>,
        mime_type: impl Into<String>,
        content: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            filename: filename.into(),
            mime_type: mime_type.into(),
            content: content.into(),
        }
    }

    /// Create an attachment from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| MailError::InvalidInput(format!("Invalid file name: {}", path.display())))?
            .to_string();

        let content = std::fs::read(path)?;

        Ok(Self::new(filename, guess_mime(path), content))
    }

    /// Create an attachment from bytes with automatic MIME type detection.
    pub fn from_bytes(filename: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        let filename = filename.into();
        let mime_type = guess_mime(Path::new(&filename));
        Self::new(filename, mime_type, content)
    }

    /// Get the size in bytes.
    pub fn size(&self) -> usize {
        self.content.len()
    }
}

fn guess_mime(path: &Path) -> String {
    mime_guess::from_path(path)
        .first()
        .map(|m| m.to_string())
        .unwrap_or_else(|| OCTET_STREAM.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_bytes_guesses_mime() {
        let pdf = Attachment::from_bytes("invoice.pdf", vec![1, 2, 3]);
        assert_eq!(pdf.mime_type, "application/pdf");
        assert_eq!(pdf.size(), 3);

        let unknown = Attachment::from_bytes("blob", b"??".to_vec());
        assert_eq!(unknown.mime_type, OCTET_STREAM);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "hello").unwrap();

        let attachment = Attachment::from_file(&path).unwrap();
        assert_eq!(attachment.filename, "notes.txt");
        assert_eq!(attachment.mime_type, "text/plain");
        assert_eq!(attachment.content, b"hello");
    }
}
