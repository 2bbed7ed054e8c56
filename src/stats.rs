use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::error::{BuildError, Result};

/// Percentage of `original` saved by shrinking it to `reduced`.
///
/// Zero-sized originals report no savings instead of dividing by zero.
#[allow(clippy::cast_precision_loss)]
pub fn savings_percent(original: u64, reduced: u64) -> f64 {
    if original == 0 {
        return 0.0;
    }
    (original as f64 - reduced as f64) / original as f64 * 100.0
}

/// One value per minified asset type.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq)]
pub struct PerAsset<T> {
    pub html: T,
    pub css: T,
    pub js: T,
}

impl<T: Copy> PerAsset<T> {
    pub fn entries(&self) -> [(&'static str, T); 3] {
        [("html", self.html), ("css", self.css), ("js", self.js)]
    }
}

#[derive(Serialize, Deserialize, Debug, Default, PartialEq)]
pub struct BuildStats {
    pub original_sizes: PerAsset<u64>,
    pub minified_sizes: PerAsset<u64>,
    pub compression_ratios: PerAsset<f64>,
}

impl BuildStats {
    pub fn new(original_sizes: PerAsset<u64>, minified_sizes: PerAsset<u64>) -> Self {
        let ratio = |orig, min| savings_percent(orig, min);
        Self {
            original_sizes,
            minified_sizes,
            compression_ratios: PerAsset {
                html: ratio(original_sizes.html, minified_sizes.html),
                css: ratio(original_sizes.css, minified_sizes.css),
                js: ratio(original_sizes.js, minified_sizes.js),
            },
        }
    }

    pub fn total_original(&self) -> u64 {
        self.original_sizes.html + self.original_sizes.css + self.original_sizes.js
    }

    pub fn total_minified(&self) -> u64 {
        self.minified_sizes.html + self.minified_sizes.css + self.minified_sizes.js
    }
}

#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Eq)]
pub struct ImageStats {
    pub original_size: u64,
    pub optimized_size: u64,
    pub files_processed: u64,
    pub webp_created: u64,
}

impl ImageStats {
    pub fn savings_percent(&self) -> f64 {
        savings_percent(self.original_size, self.optimized_size)
    }
}

/// Overwrites `path` with the pretty-printed JSON form of `stats`.
pub fn write_json<T: Serialize>(path: &Path, stats: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(stats)?;
    fs::write(path, json).map_err(BuildError::write(path))
}

/// `1234567` -> `1,234,567`
pub fn grouped(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

#[allow(clippy::cast_precision_loss)]
pub fn kib(n: u64) -> f64 {
    n as f64 / 1024.0
}

#[allow(clippy::cast_precision_loss)]
pub fn mib(n: u64) -> f64 {
    n as f64 / 1024.0 / 1024.0
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(100, 25, 75.0)]
    #[case(200, 200, 0.0)]
    #[case(0, 0, 0.0)]
    #[case(0, 10, 0.0)]
    fn savings_are_guarded(#[case] original: u64, #[case] reduced: u64, #[case] expected: f64) {
        assert!((savings_percent(original, reduced) - expected).abs() < f64::EPSILON);
    }

    #[rstest]
    #[case(0, "0")]
    #[case(999, "999")]
    #[case(1000, "1,000")]
    #[case(1_234_567, "1,234,567")]
    fn thousands_are_grouped(#[case] n: u64, #[case] expected: &str) {
        assert_eq!(grouped(n), expected);
    }

    #[test]
    fn build_stats_keep_asset_order() {
        let stats = BuildStats::new(
            PerAsset { html: 200, css: 100, js: 0 },
            PerAsset { html: 150, css: 50, js: 0 },
        );
        let json = serde_json::to_string(&stats).unwrap();
        assert!(json.starts_with(r#"{"original_sizes":{"html":200,"css":100,"js":0}"#));
        assert_eq!(stats.compression_ratios.css, 50.0);
        assert_eq!(stats.compression_ratios.js, 0.0);
        assert_eq!(stats.total_original(), 300);
    }
}
