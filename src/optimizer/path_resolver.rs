//! # Path Resolution Module
//!
//! Centralizza il calcolo del path di output di un job. Il path viene
//! calcolato quando il job entra in coda per un run e non cambia più
//! dopo il dispatch.

use crate::config::Config;
use std::path::{Path, PathBuf};

/// Suffix appended to the file stem in sibling mode
pub const SIBLING_SUFFIX: &str = "-min";

/// Where compressed files land
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputMode {
    /// Overwrite the source file
    ReplaceOriginal,
    /// `<dir>/<stem>-min.<ext>` next to the source
    Sibling,
    /// `<dir>/<file name>` inside a separate directory
    Directory(PathBuf),
}

impl OutputMode {
    pub fn from_config(config: &Config) -> Self {
        if config.replace_original {
            OutputMode::ReplaceOriginal
        } else if let Some(ref dir) = config.output_dir {
            OutputMode::Directory(dir.clone())
        } else {
            OutputMode::Sibling
        }
    }
}

/// Output path calculation
pub struct PathResolver;

impl PathResolver {
    pub fn output_path(source: &Path, mode: &OutputMode) -> PathBuf {
        match mode {
            OutputMode::ReplaceOriginal => source.to_path_buf(),
            OutputMode::Sibling => {
                let stem = source.file_stem().unwrap_or_default().to_string_lossy();
                let filename = match source.extension() {
                    Some(ext) => format!("{}{}.{}", stem, SIBLING_SUFFIX, ext.to_string_lossy()),
                    None => format!("{}{}", stem, SIBLING_SUFFIX),
                };
                source.with_file_name(filename)
            }
            OutputMode::Directory(dir) => match source.file_name() {
                Some(name) => dir.join(name),
                None => dir.join(source),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sibling_keeps_extension_case() {
        let out = PathResolver::output_path(Path::new("/pics/Cat.PNG"), &OutputMode::Sibling);
        assert_eq!(out, PathBuf::from("/pics/Cat-min.PNG"));
    }

    #[test]
    fn test_replace_original_is_source() {
        let src = Path::new("/pics/dog.jpg");
        assert_eq!(PathResolver::output_path(src, &OutputMode::ReplaceOriginal), src);
    }

    #[test]
    fn test_directory_mode_flattens_to_file_name() {
        let mode = OutputMode::Directory(PathBuf::from("/out"));
        let out = PathResolver::output_path(Path::new("/pics/2024/x.webp"), &mode);
        assert_eq!(out, PathBuf::from("/out/x.webp"));
    }

    #[test]
    fn test_mode_from_config() {
        let mut config = Config::default();
        assert_eq!(OutputMode::from_config(&config), OutputMode::Sibling);
        config.output_dir = Some(PathBuf::from("/out"));
        assert_eq!(OutputMode::from_config(&config), OutputMode::Directory(PathBuf::from("/out")));
        config.output_dir = None;
        config.replace_original = true;
        assert_eq!(OutputMode::from_config(&config), OutputMode::ReplaceOriginal);
    }
}
