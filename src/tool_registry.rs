//! # Tool Registry
//!
//! Resolves codec tool names to executable paths:
//! - Bundled tools (`<bundle root>/bin/<name>`) win
//! - Otherwise an ordered list of fixed system install locations
//!
//! Resolution happens once at construction. A missing tool is not an error
//! here; the codec that needs it reports `ToolNotFound` at first use.

use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;
use tracing::{debug, warn};

pub const PNGQUANT: &str = "pngquant";
pub const OXIPNG: &str = "oxipng";
pub const CJPEG: &str = "cjpeg";
pub const DJPEG: &str = "djpeg";
pub const CWEBP: &str = "cwebp";
pub const GIFSICLE: &str = "gifsicle";

/// Every tool the codec invoker may ask for
pub const KNOWN_TOOLS: [&str; 6] = [PNGQUANT, OXIPNG, CJPEG, DJPEG, CWEBP, GIFSICLE];

/// Environment override for the bundled tools root
pub const TOOLS_DIR_ENV: &str = "MINIPNG_TOOLS_DIR";

/// Fixed system locations, searched in order after the bundle
pub const SYSTEM_TOOL_DIRS: [&str; 6] = [
    "/opt/homebrew/bin",
    "/opt/homebrew/opt/mozjpeg/bin",
    "/usr/local/bin",
    "/usr/local/opt/mozjpeg/bin",
    "/opt/mozjpeg/bin",
    "/usr/bin",
];

/// Read-only map of codec tool name -> resolved path
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    bundle_root: Option<PathBuf>,
    system_dirs: Vec<PathBuf>,
    resolved: BTreeMap<String, Option<PathBuf>>,
}

impl ToolRegistry {
    /// Discover tools using the given bundle root, or detect one
    pub fn discover(bundle_root: Option<PathBuf>) -> Self {
        let bundle_root = bundle_root.or_else(Self::detect_bundle_root);
        let system_dirs = SYSTEM_TOOL_DIRS.iter().map(PathBuf::from).collect();
        Self::with_search_dirs(bundle_root, system_dirs)
    }

    /// Build a registry over explicit search locations
    pub fn with_search_dirs(bundle_root: Option<PathBuf>, system_dirs: Vec<PathBuf>) -> Self {
        let mut registry = Self {
            bundle_root,
            system_dirs,
            resolved: BTreeMap::new(),
        };

        for name in KNOWN_TOOLS {
            let path = registry.search(name);
            match &path {
                Some(p) => debug!("Resolved tool {} -> {}", name, p.display()),
                None => warn!("Tool not found: {}", name),
            }
            registry.resolved.insert(name.to_string(), path);
        }

        registry
    }

    /// Detect the bundled tools root
    fn detect_bundle_root() -> Option<PathBuf> {
        // Strategy 1: explicit environment override
        if let Some(dir) = env::var_os(TOOLS_DIR_ENV) {
            let path = PathBuf::from(dir);
            debug!("Checking {}: {:?}", TOOLS_DIR_ENV, path);
            if path.join("bin").is_dir() {
                return Some(path);
            }
        }

        // Strategy 2: app bundle layouts relative to the executable
        let exe_path = env::current_exe().ok()?;
        let exe_dir = exe_path.parent()?;
        let candidates = [
            exe_dir.join("..").join("Resources"), // macOS .app bundle
            exe_dir.join("resources"),
            exe_dir.to_path_buf(),
        ];

        for candidate in candidates {
            debug!("Checking bundle root: {:?}", candidate);
            if candidate.join("bin").is_dir() {
                return Some(candidate);
            }
        }

        debug!("No bundled tools directory found");
        None
    }

    fn search(&self, name: &str) -> Option<PathBuf> {
        let file_name = executable_name(name);

        if let Some(root) = &self.bundle_root {
            let bundled = root.join("bin").join(&file_name);
            if bundled.is_file() {
                return Some(bundled);
            }
        }

        self.system_dirs
            .iter()
            .map(|dir| dir.join(&file_name))
            .find(|path| path.is_file())
    }

    /// Path for a tool, or None when it is not installed
    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        match self.resolved.get(name) {
            Some(path) => path.clone(),
            None => self.search(name),
        }
    }

    /// Human readable availability report
    pub fn report(&self) -> String {
        let mut report = String::from("Compression tools:\n");
        match &self.bundle_root {
            Some(root) => report.push_str(&format!("Bundle root: {}\n", root.display())),
            None => report.push_str("Bundle root: none\n"),
        }

        let groups: [(&str, &[&str]); 4] = [
            ("PNG", &[PNGQUANT, OXIPNG]),
            ("JPEG", &[DJPEG, CJPEG]),
            ("WebP", &[CWEBP]),
            ("GIF", &[GIFSICLE]),
        ];

        for (category, tools) in groups {
            report.push_str(&format!("\n{}:\n", category));
            for tool in tools {
                match self.resolve(tool) {
                    Some(path) => report.push_str(&format!("  [ok] {} -> {}\n", tool, path.display())),
                    None => report.push_str(&format!("  [missing] {}\n", tool)),
                }
            }
        }

        report
    }
}

fn executable_name(name: &str) -> String {
    if cfg!(windows) {
        format!("{}.exe", name)
    } else {
        name.to_string()
    }
}
