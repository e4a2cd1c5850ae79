//! Text extraction boundary.
//!
//! Format-specific parsing lives outside the engine. The engine only needs
//! "give me the text of this file or tell me you can't"; any failure is
//! treated as a document without contents.

use crate::error::{Error, Result};
use std::io::Read;
use std::path::Path;

pub trait TextExtractor: Send + Sync {
    fn extract(&self, path: &Path) -> Result<String>;
}

/// Detect if a file is binary by checking for NUL bytes in the first 512 bytes.
#[inline]
fn detect_binary(head: &[u8]) -> bool {
    head[..head.len().min(512)].contains(&0)
}

/// Reads files as text. Binary files and files above the size limit fail.
#[derive(Debug, Clone)]
pub struct PlainTextExtractor {
    max_file_size: u64,
}

impl PlainTextExtractor {
    pub fn new(max_file_size: u64) -> Self {
        Self { max_file_size }
    }
}

impl TextExtractor for PlainTextExtractor {
    fn extract(&self, path: &Path) -> Result<String> {
        let read_error = |source: std::io::Error| Error::ReadFile {
            path: path.to_path_buf(),
            source,
        };

        let file = std::fs::File::open(path).map_err(read_error)?;
        let size = file.metadata().map_err(read_error)?.len();
        if size > self.max_file_size {
            return Err(Error::FileTooLarge(path.to_path_buf()));
        }

        let mut bytes = Vec::with_capacity(size as usize);
        std::io::BufReader::new(file)
            .take(self.max_file_size)
            .read_to_end(&mut bytes)
            .map_err(read_error)?;

        if detect_binary(&bytes) {
            return Err(Error::BinaryContent(path.to_path_buf()));
        }

        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

impl<F> TextExtractor for F
where
    F: Fn(&Path) -> Result<String> + Send + Sync,
{
    fn extract(&self, path: &Path) -> Result<String> {
        self(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn reads_text_files() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.txt");
        std::fs::write(&path, "hello world").unwrap();

        let text = PlainTextExtractor::new(1024).extract(&path).unwrap();
        assert_eq!(text, "hello world");
    }

    #[test]
    fn rejects_binary_and_oversized_files() {
        let tmp = TempDir::new().unwrap();
        let binary = tmp.path().join("b.pdf");
        std::fs::write(&binary, b"%PDF\0\x01\x02").unwrap();
        let large = tmp.path().join("c.txt");
        std::fs::write(&large, "x".repeat(64)).unwrap();

        let extractor = PlainTextExtractor::new(32);
        assert!(matches!(
            extractor.extract(&binary),
            Err(Error::BinaryContent(_))
        ));
        assert!(matches!(
            extractor.extract(&large),
            Err(Error::FileTooLarge(_))
        ));
        assert!(matches!(
            extractor.extract(&tmp.path().join("missing.txt")),
            Err(Error::ReadFile { .. })
        ));
    }

    #[test]
    fn closures_are_extractors() {
        let extractor = |_: &Path| -> Result<String> { Ok("fixed".to_string()) };
        assert_eq!(extractor.extract(Path::new("/x")).unwrap(), "fixed");
    }
}
