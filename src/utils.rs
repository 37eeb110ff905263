//! # Utility Functions Module
//!
//! Helpers for building codec tool command lines.

use std::path::Path;

/// Converts any iterable of string-like items into owned tool arguments.
///
/// # Example
/// ```rust
/// use minipng::utils::to_string_vec;
///
/// let quality = 75;
/// let args = to_string_vec(["-quality", &quality.to_string(), "-optimize"]);
/// assert_eq!(args, vec!["-quality", "75", "-optimize"]);
/// ```
pub fn to_string_vec<T, I>(items: I) -> Vec<String>
where
    T: ToString,
    I: IntoIterator<Item = T>,
{
    items.into_iter().map(|item| item.to_string()).collect()
}

/// Lossy path-to-argument conversion for tool command lines
pub fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Builds a `Vec<String>` of tool arguments from mixed expressions.
///
/// ```rust
/// use minipng::args;
///
/// let level = 2;
/// let args = args![format!("-O{}", level), "--colors", 256];
/// assert_eq!(args, vec!["-O2", "--colors", "256"]);
/// ```
#[macro_export]
macro_rules! args {
    [$($item:expr),* $(,)?] => {
        vec![$(::std::string::ToString::to_string(&$item)),*]
    };
}
