//! Normalized constituency-name keys.
//!
//! Reference data and incoming result lines must normalize names the same
//! way or the matcher cannot resolve them: trim, strip diacritics via NFD
//! decomposition, then case-fold.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Compute the normalized lookup key for a constituency name.
pub fn normalize_name(raw: &str) -> String {
    raw.trim()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
}
