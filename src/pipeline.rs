//! Production build: prune and minify the site's sources into the dist tree.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use walkdir::WalkDir;

use crate::{
    css,
    error::{BuildError, Result},
    minify,
    stats::{self, grouped, kib, BuildStats, PerAsset},
};

pub const INDEX: &str = "index.html";
pub const STYLE: &str = "style.css";
pub const SCRIPT: &str = "script.js";
pub const STYLE_MIN: &str = "style.min.css";
pub const SCRIPT_MIN: &str = "script.min.js";
pub const STATS_FILE: &str = "build-stats.json";

const DIST_DIRS: [&str; 4] = [
    "public/images",
    "public/optimized",
    "public/achievements",
    "public/files",
];
const ROOT_STATIC_FILES: [&str; 2] = ["robots.txt", "manifest.json"];
const ASSET_REWRITES: [(&str, &str); 2] = [
    (r#"href="style.css""#, r#"href="style.min.css""#),
    (r#"src="script.js""#, r#"src="script.min.js""#),
];

#[derive(Debug)]
pub struct BuildOutput {
    pub stats: BuildStats,
    pub unused_selectors: usize,
    /// Short content hashes of the minified assets, keyed by asset type.
    pub hashes: BTreeMap<&'static str, String>,
}

pub struct Builder {
    source: PathBuf,
    dist: PathBuf,
}

impl Builder {
    pub fn new(source: impl Into<PathBuf>, dist: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            dist: dist.into(),
        }
    }

    pub fn run(&self) -> Result<BuildOutput> {
        log::info!("Starting production build");
        self.reset_dist()?;

        let html = self.read_source(INDEX)?;
        let style = self.read_source(STYLE)?;
        let script = self.read_source(SCRIPT)?;

        log::info!("Analyzing CSS usage");
        let pruned = css::remove_unused(&style, &html);
        log::info!(
            "Found {} potentially unused selectors, conservatively removed unused rules",
            pruned.unused_selectors
        );

        log::info!("Minifying CSS");
        let min_style = minify::minify_css(&pruned.css);
        log::info!("Minifying JavaScript");
        let min_script = minify::minify_js(&script);
        log::info!("Optimizing HTML");
        let min_html = minify::rewrite_asset_references(&minify::minify_html(&html), &ASSET_REWRITES);

        let stats = BuildStats::new(
            PerAsset {
                html: html.len() as u64,
                css: style.len() as u64,
                js: script.len() as u64,
            },
            PerAsset {
                html: min_html.len() as u64,
                css: min_style.len() as u64,
                js: min_script.len() as u64,
            },
        );

        self.write_dist(INDEX, &min_html)?;
        self.write_dist(STYLE_MIN, &min_style)?;
        self.write_dist(SCRIPT_MIN, &min_script)?;

        self.copy_assets()?;
        stats::write_json(&self.dist.join(STATS_FILE), &stats)?;

        Ok(BuildOutput {
            stats,
            unused_selectors: pruned.unused_selectors,
            hashes: self.cache_busting_hashes(),
        })
    }

    fn reset_dist(&self) -> Result<()> {
        if self.dist.exists() {
            fs::remove_dir_all(&self.dist).map_err(BuildError::write(&self.dist))?;
        }
        fs::create_dir_all(&self.dist).map_err(BuildError::write(&self.dist))?;
        for dir in DIST_DIRS {
            let dir = self.dist.join(dir);
            fs::create_dir_all(&dir).map_err(BuildError::write(dir))?;
        }
        log::info!("Created clean distribution directory {}", self.dist.display());
        Ok(())
    }

    fn read_source(&self, name: &str) -> Result<String> {
        let path = self.source.join(name);
        fs::read_to_string(&path).map_err(BuildError::read(path))
    }

    fn write_dist(&self, name: &str, content: &str) -> Result<()> {
        let path = self.dist.join(name);
        fs::write(&path, content).map_err(BuildError::write(path))
    }

    fn copy_assets(&self) -> Result<()> {
        log::info!("Copying static assets");
        let public = self.source.join("public");
        if public.is_dir() {
            copy_dir_all(&public, &self.dist.join("public"))?;
        }
        for name in ROOT_STATIC_FILES {
            let from = self.source.join(name);
            if from.is_file() {
                let to = self.dist.join(name);
                fs::copy(&from, &to).map_err(|source| BuildError::Copy { from, to, source })?;
            }
        }
        Ok(())
    }

    /// First eight hex digits of the MD5 of each minified asset present in dist.
    pub fn cache_busting_hashes(&self) -> BTreeMap<&'static str, String> {
        [("css", STYLE_MIN), ("js", SCRIPT_MIN)]
            .into_iter()
            .filter_map(|(kind, name)| {
                let content = fs::read(self.dist.join(name)).ok()?;
                let digest = format!("{:x}", md5::compute(content));
                Some((kind, digest[..8].to_owned()))
            })
            .collect()
    }
}

/// Recursively copies `from` into `to`, merging with whatever is already there.
pub fn copy_dir_all(from: &Path, to: &Path) -> Result<()> {
    for entry in WalkDir::new(from) {
        let entry = entry?;
        let Ok(rel) = entry.path().strip_prefix(from) else {
            continue;
        };
        let dest = to.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&dest).map_err(BuildError::write(dest))?;
        } else {
            fs::copy(entry.path(), &dest).map_err(|source| BuildError::Copy {
                from: entry.path().to_path_buf(),
                to: dest,
                source,
            })?;
        }
    }
    Ok(())
}

pub fn print_report(output: &BuildOutput, dist: &Path) {
    let stats = &output.stats;
    println!("{}", "=".repeat(50));
    println!("BUILD OPTIMIZATION REPORT");
    println!("{}", "=".repeat(50));
    let ratios = stats.compression_ratios.entries();
    for (((name, original), (_, minified)), (_, ratio)) in stats
        .original_sizes
        .entries()
        .into_iter()
        .zip(stats.minified_sizes.entries())
        .zip(ratios)
    {
        println!("{}:", name.to_uppercase());
        print_sizes(original, minified, ratio);
        println!();
    }
    let (total_original, total_minified) = (stats.total_original(), stats.total_minified());
    println!("TOTAL:");
    print_sizes(
        total_original,
        total_minified,
        stats::savings_percent(total_original, total_minified),
    );
    println!("{}", "=".repeat(50));
    println!("Potentially unused selectors: {}", output.unused_selectors);
    for (kind, hash) in &output.hashes {
        println!("Cache-busting hash ({kind}): {hash}");
    }
    println!("Output directory: {}", dist.display());
}

fn print_sizes(original: u64, minified: u64, ratio: f64) {
    println!("  Original:  {} bytes ({:.1}KB)", grouped(original), kib(original));
    println!("  Minified:  {} bytes ({:.1}KB)", grouped(minified), kib(minified));
    println!(
        "  Saved:     {} bytes ({ratio:.1}%)",
        signed_grouped(original as i128 - minified as i128)
    );
}

/// Thousands-grouped, keeping the sign when minifying grew the file.
fn signed_grouped(diff: i128) -> String {
    let digits = grouped(diff.unsigned_abs() as u64);
    if diff < 0 {
        format!("-{digits}")
    } else {
        digits
    }
}
