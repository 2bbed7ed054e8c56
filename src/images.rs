//! Responsive image variants and WebP siblings for the portfolio's pictures.
//!
//! The actual pixel work is delegated to an [`ImageEncoder`]. A failing
//! encode only loses that one output; the rest of the run carries on.

use std::{
    fmt,
    fs, io,
    path::{Path, PathBuf},
    process::{Command, ExitStatus},
};

use serde::Deserialize;
use thiserror::Error;

use crate::{
    error::{BuildError, Result},
    stats::{self, mib, ImageStats},
};

pub const OPTIMIZED_DIR: &str = "public/optimized";
pub const STATS_FILE: &str = "optimization-stats.json";

const AVATAR: &str = "public/images/my-avatar.png";
const LOGOS: [&str; 5] = ["GDSC.png", "AWS.jpg", "MMSC.jpg", "TPG.jpg", "JBECP.jpg"];
const PROJECTS: [&str; 1] = ["ODRS.png"];
const GALLERIES: [&str; 3] = ["eneda", "excalicode", "GP"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Small,
    Medium,
    Large,
    Original,
}

impl Variant {
    pub const ALL: [Self; 4] = [Self::Small, Self::Medium, Self::Large, Self::Original];

    pub fn max_width(self) -> Option<u32> {
        match self {
            Self::Small => Some(400),
            Self::Medium => Some(800),
            Self::Large => Some(1200),
            Self::Original => None,
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Small => "small",
            Self::Medium => "medium",
            Self::Large => "large",
            Self::Original => "original",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Re-encode in the input's own format, stripped and progressive.
    Raster,
    WebP,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeOptions {
    pub format: Format,
    pub quality: u8,
    /// Only shrink images wider than this.
    pub max_width: Option<u32>,
}

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("Failed to launch `{tool}`")]
    Launch {
        tool: String,
        #[source]
        source: io::Error,
    },
    #[error("`{tool}` exited with {status}: {stderr}")]
    Failed {
        tool: String,
        status: ExitStatus,
        stderr: String,
    },
}

pub trait ImageEncoder {
    fn encode(&self, input: &Path, output: &Path, options: &EncodeOptions)
        -> Result<(), EncodeError>;
}

/// Encoder backed by the ImageMagick and cwebp command line tools.
#[derive(Debug, Clone)]
pub struct ToolEncoder {
    pub magick: String,
    pub cwebp: String,
}

impl ToolEncoder {
    fn command(&self, input: &Path, output: &Path, options: &EncodeOptions) -> Command {
        match options.format {
            Format::Raster => {
                let mut cmd = Command::new(&self.magick);
                cmd.arg(input)
                    .args(["-strip", "-interlace", "Plane", "-quality"])
                    .arg(options.quality.to_string());
                if let Some(width) = options.max_width {
                    cmd.arg("-resize").arg(format!("{width}>"));
                }
                cmd.arg(output);
                cmd
            }
            Format::WebP => {
                let mut cmd = Command::new(&self.cwebp);
                cmd.arg("-q")
                    .arg(options.quality.to_string())
                    .args(["-m", "6"])
                    .arg(input)
                    .arg("-o")
                    .arg(output);
                cmd
            }
        }
    }
}

impl ImageEncoder for ToolEncoder {
    fn encode(
        &self,
        input: &Path,
        output: &Path,
        options: &EncodeOptions,
    ) -> Result<(), EncodeError> {
        let mut cmd = self.command(input, output, options);
        let tool = cmd.get_program().to_string_lossy().into_owned();
        let out = cmd
            .output()
            .map_err(|source| EncodeError::Launch {
                tool: tool.clone(),
                source,
            })?;
        if out.status.success() {
            Ok(())
        } else {
            Err(EncodeError::Failed {
                tool,
                status: out.status,
                stderr: String::from_utf8_lossy(&out.stderr).trim().to_owned(),
            })
        }
    }
}

fn _default_quality() -> u8 {
    85
}
fn _default_logo_quality() -> u8 {
    80
}
fn _default_logo_width() -> u32 {
    300
}
fn _default_thumbnail_quality() -> u8 {
    90
}
fn _default_thumbnail_width() -> u32 {
    150
}
fn _default_magick() -> String {
    "magick".to_string()
}
fn _default_cwebp() -> String {
    "cwebp".to_string()
}

#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ImageSettings {
    #[serde(default = "_default_quality")]
    pub quality: u8,
    #[serde(default = "_default_logo_quality")]
    pub logo_quality: u8,
    #[serde(default = "_default_logo_width")]
    pub logo_width: u32,
    #[serde(default = "_default_thumbnail_quality")]
    pub thumbnail_quality: u8,
    #[serde(default = "_default_thumbnail_width")]
    pub thumbnail_width: u32,
    #[serde(default = "_default_magick")]
    pub magick: String,
    #[serde(default = "_default_cwebp")]
    pub cwebp: String,
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            quality: _default_quality(),
            logo_quality: _default_logo_quality(),
            logo_width: _default_logo_width(),
            thumbnail_quality: _default_thumbnail_quality(),
            thumbnail_width: _default_thumbnail_width(),
            magick: _default_magick(),
            cwebp: _default_cwebp(),
        }
    }
}

impl ImageSettings {
    pub fn encoder(&self) -> ToolEncoder {
        ToolEncoder {
            magick: self.magick.clone(),
            cwebp: self.cwebp.clone(),
        }
    }
}

#[derive(Debug, Default)]
pub struct Produced {
    /// Sizes of the re-encoded raster variants.
    pub raster: Vec<(PathBuf, u64)>,
    pub webp: Vec<(PathBuf, u64)>,
}

impl Produced {
    fn raster_bytes(&self) -> u64 {
        self.raster.iter().map(|(_, size)| size).sum()
    }
}

pub struct ImageOptimizer<E> {
    source: PathBuf,
    optimized: PathBuf,
    settings: ImageSettings,
    encoder: E,
    stats: ImageStats,
}

impl<E: ImageEncoder> ImageOptimizer<E> {
    pub fn new(source: impl Into<PathBuf>, settings: ImageSettings, encoder: E) -> Self {
        let source = source.into();
        Self {
            optimized: source.join(OPTIMIZED_DIR),
            source,
            settings,
            encoder,
            stats: ImageStats::default(),
        }
    }

    pub fn optimized_dir(&self) -> &Path {
        &self.optimized
    }

    pub fn run(mut self) -> Result<ImageStats> {
        log::info!("Starting image optimization");
        self.create_directories()?;
        self.optimize_avatar();
        self.optimize_logos();
        self.optimize_galleries()?;
        self.optimize_projects();
        stats::write_json(&self.optimized.join(STATS_FILE), &self.stats)?;
        Ok(self.stats)
    }

    fn create_directories(&self) -> Result<()> {
        let dirs = std::iter::once(self.optimized.join("images")).chain(
            GALLERIES
                .iter()
                .map(|gallery| self.optimized.join("achievements").join(gallery)),
        );
        for dir in dirs {
            fs::create_dir_all(&dir).map_err(BuildError::write(dir))?;
        }
        Ok(())
    }

    /// Runs one encode, logging and swallowing failures.
    fn encode(&self, input: &Path, output: &Path, options: EncodeOptions) -> Option<u64> {
        match self.encoder.encode(input, output, &options) {
            Ok(()) => match fs::metadata(output) {
                Ok(meta) => Some(meta.len()),
                Err(err) => {
                    log::error!("Encoder reported success but {} is unreadable: {err}", output.display());
                    None
                }
            },
            Err(err) => {
                log::error!("Error optimizing {}: {err}", input.display());
                None
            }
        }
    }

    /// Re-encodes `input` once, plus a WebP sibling made from the result.
    fn encode_with_webp(
        &mut self,
        input: &Path,
        output: &Path,
        options: EncodeOptions,
        produced: &mut Produced,
    ) {
        let Some(size) = self.encode(input, output, options) else {
            return;
        };
        produced.raster.push((output.to_path_buf(), size));
        let webp_path = output.with_extension("webp");
        if let Some(size) = self.encode(output, &webp_path, webp(options.quality)) {
            produced.webp.push((webp_path, size));
            self.stats.webp_created += 1;
        }
    }

    /// Writes `<base>-<variant><ext>` and its WebP for every [`Variant`].
    pub fn responsive_variants(&mut self, input: &Path, out_dir: &Path, base: &str) -> Produced {
        let ext = input
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();
        let mut produced = Produced::default();
        for variant in Variant::ALL {
            let output = out_dir.join(format!("{base}-{variant}{ext}"));
            let options = raster(self.settings.quality, variant.max_width());
            self.encode_with_webp(input, &output, options, &mut produced);
        }
        produced
    }

    /// Counts a source image, returning its size, or `None` when it is absent.
    fn take_source(&mut self, path: &Path) -> Option<u64> {
        let size = fs::metadata(path).ok().filter(|meta| meta.is_file())?.len();
        log::info!(
            "Processing {} ({:.1}KB)",
            path.file_name().unwrap_or_default().to_string_lossy(),
            stats::kib(size)
        );
        self.stats.original_size += size;
        Some(size)
    }

    fn responsive_job(&mut self, input: &Path, out_dir: &Path) -> Option<Produced> {
        self.take_source(input)?;
        let base = stem(input);
        let produced = self.responsive_variants(input, out_dir, &base);
        log::debug!(
            "{base}: {} variants, {} WebP",
            produced.raster.len(),
            produced.webp.len()
        );
        self.stats.optimized_size += produced.raster_bytes();
        self.stats.files_processed += 1;
        Some(produced)
    }

    fn optimize_avatar(&mut self) {
        log::info!("Optimizing avatar images");
        let avatar = self.source.join(AVATAR);
        let out_dir = self.optimized.join("images");
        if self.responsive_job(&avatar, &out_dir).is_none() {
            return;
        }
        let thumb = out_dir.join(format!("{}-thumb.png", stem(&avatar)));
        let options = raster(
            self.settings.thumbnail_quality,
            Some(self.settings.thumbnail_width),
        );
        if let Some(size) = self.encode(&avatar, &thumb, options) {
            log::info!("Created small avatar: {:.1}KB", stats::kib(size));
        }
    }

    fn optimize_logos(&mut self) {
        log::info!("Optimizing organization images");
        let out_dir = self.optimized.join("images");
        for logo in LOGOS {
            let input = self.source.join("public/images").join(logo);
            if self.take_source(&input).is_none() {
                continue;
            }
            let ext = input
                .extension()
                .map(|ext| ext.to_string_lossy().into_owned())
                .unwrap_or_default();
            let output = out_dir.join(format!("{}-optimized.{ext}", stem(&input)));
            let options = raster(self.settings.logo_quality, Some(self.settings.logo_width));
            let mut produced = Produced::default();
            self.encode_with_webp(&input, &output, options, &mut produced);
            self.stats.optimized_size += produced.raster_bytes();
            self.stats.files_processed += 1;
        }
    }

    fn optimize_galleries(&mut self) -> Result<()> {
        log::info!("Optimizing achievement images");
        for gallery in GALLERIES {
            let dir = self.source.join("public/achievements").join(gallery);
            if !dir.is_dir() {
                continue;
            }
            let out_dir = self.optimized.join("achievements").join(gallery);
            for input in jpegs_in(&dir)? {
                self.responsive_job(&input, &out_dir);
            }
        }
        Ok(())
    }

    fn optimize_projects(&mut self) {
        log::info!("Optimizing project images");
        let out_dir = self.optimized.join("images");
        for project in PROJECTS {
            let input = self.source.join("public/images").join(project);
            self.responsive_job(&input, &out_dir);
        }
    }
}

fn raster(quality: u8, max_width: Option<u32>) -> EncodeOptions {
    EncodeOptions {
        format: Format::Raster,
        quality,
        max_width,
    }
}

fn webp(quality: u8) -> EncodeOptions {
    EncodeOptions {
        format: Format::WebP,
        quality,
        max_width: None,
    }
}

fn stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// `*.jpg` files directly inside `dir`, sorted by name.
fn jpegs_in(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in fs::read_dir(dir).map_err(BuildError::read(dir))? {
        let path = entry.map_err(BuildError::read(dir))?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "jpg") {
            found.push(path);
        }
    }
    found.sort();
    Ok(found)
}

pub fn print_report(stats: &ImageStats, optimized: &Path) {
    println!("{}", "=".repeat(50));
    println!("IMAGE OPTIMIZATION RESULTS");
    println!("{}", "=".repeat(50));
    println!("Files processed: {}", stats.files_processed);
    println!("WebP files created: {}", stats.webp_created);
    println!("Original total size: {:.1}MB", mib(stats.original_size));
    println!("Optimized total size: {:.1}MB", mib(stats.optimized_size));
    println!("Space saved: {:.1}%", stats.savings_percent());
    println!("{}", "=".repeat(50));
    println!("Optimized images saved to: {}", optimized.display());
}
