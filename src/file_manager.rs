//! # File Management Module
//!
//! Questo modulo gestisce la discovery delle immagini e le utilità sui file.
//!
//! ## Responsabilità:
//! - Espansione ricorsiva delle directory in input (file nascosti esclusi)
//! - Filtro dei formati supportati (PNG, JPEG, WebP, GIF)
//! - Verifica del contenuto tramite magic bytes prima di lanciare un tool
//! - Formattazione human-readable delle dimensioni
//!
//! ## Esempio:
//! ```rust,ignore
//! let files = FileManager::find_images(&[PathBuf::from("/photos")]);
//! for file in files {
//!     let size = FileManager::file_size(&file).await?;
//! }
//! ```

use crate::error::CompressionError;
use crate::job::ImageFormat;
use anyhow::Result;
use std::io::Read;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

/// Bytes read from the head of a file to sniff its format
const SNIFF_LEN: usize = 32;

/// Manages file discovery and sizes
pub struct FileManager;

impl FileManager {
    /// Expand inputs into supported image files.
    ///
    /// Directories are walked recursively, skipping hidden entries. Plain
    /// files are kept only if their extension is supported. Missing paths
    /// are dropped.
    pub fn find_images(inputs: &[PathBuf]) -> Vec<PathBuf> {
        let mut files = Vec::new();

        for input in inputs {
            if input.is_dir() {
                for entry in WalkDir::new(input)
                    .into_iter()
                    .filter_entry(|e| e.depth() == 0 || !Self::is_hidden(e))
                    .filter_map(|e| e.ok())
                    .filter(|e| e.file_type().is_file())
                {
                    if Self::is_supported_image(entry.path()) {
                        files.push(entry.path().to_path_buf());
                    }
                }
            } else if input.is_file() {
                if Self::is_supported_image(input) {
                    files.push(input.clone());
                } else {
                    debug!("Ignoring unsupported file: {}", input.display());
                }
            } else {
                debug!("Ignoring missing input: {}", input.display());
            }
        }

        files
    }

    fn is_hidden(entry: &DirEntry) -> bool {
        entry
            .file_name()
            .to_str()
            .map(|s| s.starts_with('.'))
            .unwrap_or(false)
    }

    /// Check if a file has a supported image extension
    pub fn is_supported_image(path: &Path) -> bool {
        ImageFormat::from_path(path).is_supported()
    }

    /// Size of a file in bytes
    pub async fn file_size(path: &Path) -> Result<u64> {
        Ok(fs::metadata(path).await?.len())
    }

    /// Verify that the file content matches the format its extension claims
    pub fn verify_content(path: &Path, expected: ImageFormat) -> Result<(), CompressionError> {
        let mut head = Vec::with_capacity(SNIFF_LEN);
        std::fs::File::open(path)
            .and_then(|f| f.take(SNIFF_LEN as u64).read_to_end(&mut head))
            .map_err(|_| CompressionError::InvalidImage(path.to_path_buf()))?;

        let sniffed = match image::guess_format(&head) {
            Ok(image::ImageFormat::Png) => ImageFormat::Png,
            Ok(image::ImageFormat::Jpeg) => ImageFormat::Jpeg,
            Ok(image::ImageFormat::WebP) => ImageFormat::Webp,
            Ok(image::ImageFormat::Gif) => ImageFormat::Gif,
            _ => ImageFormat::Unsupported,
        };

        if sniffed == expected {
            Ok(())
        } else {
            debug!(
                "Content of {} looks like {:?}, expected {:?}",
                path.display(),
                sniffed,
                expected
            );
            Err(CompressionError::InvalidImage(path.to_path_buf()))
        }
    }

    /// Get human-readable file size
    pub fn format_size(size: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = size as f64;
        let mut unit_index = 0;

        while size >= 1000.0 && unit_index < UNITS.len() - 1 {
            size /= 1000.0;
            unit_index += 1;
        }

        if unit_index == 0 {
            format!("{} {}", size as u64, UNITS[unit_index])
        } else {
            format!("{:.1} {}", size, UNITS[unit_index])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    #[test]
    fn test_find_images_walks_and_filters() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        std::fs::create_dir_all(root.join("nested")).unwrap();
        std::fs::create_dir_all(root.join(".cache")).unwrap();
        std::fs::write(root.join("a.png"), b"").unwrap();
        std::fs::write(root.join("nested/b.JPG"), b"").unwrap();
        std::fs::write(root.join("nested/c.txt"), b"").unwrap();
        std::fs::write(root.join(".hidden.png"), b"").unwrap();
        std::fs::write(root.join(".cache/d.gif"), b"").unwrap();

        let mut files = FileManager::find_images(&[root.to_path_buf()]);
        files.sort();
        assert_eq!(files, vec![root.join("a.png"), root.join("nested/b.JPG")]);
    }

    #[test]
    fn test_find_images_keeps_explicit_files() {
        let temp = TempDir::new().unwrap();
        let webp = temp.path().join("x.webp");
        let tiff = temp.path().join("y.tiff");
        std::fs::write(&webp, b"").unwrap();
        std::fs::write(&tiff, b"").unwrap();

        let files = FileManager::find_images(&[webp.clone(), tiff, temp.path().join("missing.png")]);
        assert_eq!(files, vec![webp]);
    }

    #[test]
    fn test_verify_content() {
        let temp = TempDir::new().unwrap();
        let png = temp.path().join("real.png");
        std::fs::write(&png, PNG_MAGIC).unwrap();
        assert!(FileManager::verify_content(&png, ImageFormat::Png).is_ok());
        assert!(matches!(
            FileManager::verify_content(&png, ImageFormat::Jpeg),
            Err(CompressionError::InvalidImage(_))
        ));

        let junk = temp.path().join("junk.png");
        std::fs::write(&junk, b"not an image at all").unwrap();
        assert!(FileManager::verify_content(&junk, ImageFormat::Png).is_err());
        assert!(FileManager::verify_content(&temp.path().join("gone.png"), ImageFormat::Png).is_err());
    }

    #[test]
    fn test_format_size() {
        assert_eq!(FileManager::format_size(512), "512 B");
        assert_eq!(FileManager::format_size(1500), "1.5 KB");
        assert_eq!(FileManager::format_size(2_500_000), "2.5 MB");
    }
}
