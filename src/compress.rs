use std::{
    fs::{self, File},
    io::{self, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use flate2::{write::GzEncoder, Compression};

use crate::{
    error::{BuildError, Result},
    pipeline::{INDEX, SCRIPT_MIN, STYLE_MIN},
    stats::{grouped, savings_percent},
};

/// Minified outputs that get precompressed siblings.
pub const COMPRESSED_FILES: [&str; 3] = [INDEX, STYLE_MIN, SCRIPT_MIN];

const ZSTD_LEVEL: i32 = 19;

#[derive(Debug, PartialEq, Eq)]
pub struct CompressedFile {
    pub name: String,
    pub original: u64,
    pub gzip: u64,
    pub zstd: u64,
}

impl CompressedFile {
    pub fn ratio(&self) -> f64 {
        savings_percent(self.original, self.gzip)
    }
}

#[derive(Debug, Default)]
pub struct CompressionReport {
    pub files: Vec<CompressedFile>,
}

impl CompressionReport {
    pub fn total_original(&self) -> u64 {
        self.files.iter().map(|f| f.original).sum()
    }

    pub fn total_gzip(&self) -> u64 {
        self.files.iter().map(|f| f.gzip).sum()
    }

    pub fn ratio(&self) -> f64 {
        savings_percent(self.total_original(), self.total_gzip())
    }
}

pub fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

fn size(path: &Path) -> Result<u64> {
    fs::metadata(path)
        .map(|meta| meta.len())
        .map_err(BuildError::read(path))
}

/// Writes `<path>.gz` next to `path`.
pub fn gzip_file(path: &Path) -> Result<PathBuf> {
    let out = sibling(path, ".gz");
    let mut input = BufReader::new(File::open(path).map_err(BuildError::read(path))?);
    let writer = BufWriter::new(File::create(&out).map_err(BuildError::write(&out))?);
    let mut encoder = GzEncoder::new(writer, Compression::best());
    io::copy(&mut input, &mut encoder)
        .and_then(|_| encoder.finish())
        .and_then(|mut writer| writer.flush())
        .map_err(BuildError::write(&out))?;
    Ok(out)
}

/// Writes `<path>.zst` next to `path`.
pub fn zstd_file(path: &Path) -> Result<PathBuf> {
    let out = sibling(path, ".zst");
    let content = fs::read(path).map_err(BuildError::read(path))?;
    let compressed =
        zstd::bulk::compress(&content, ZSTD_LEVEL).map_err(BuildError::write(&out))?;
    fs::write(&out, compressed).map_err(BuildError::write(&out))?;
    Ok(out)
}

/// Precompresses the minified outputs found in `dist`, skipping absent ones.
pub fn compress_dist(dist: &Path) -> Result<CompressionReport> {
    let mut report = CompressionReport::default();
    if !dist.is_dir() {
        log::error!(
            "{} not found, run the production build first",
            dist.display()
        );
        return Ok(report);
    }

    log::info!("Compressing production assets");
    for name in COMPRESSED_FILES {
        let path = dist.join(name);
        if !path.is_file() {
            log::debug!("Skipping missing {name}");
            continue;
        }
        let gz = gzip_file(&path)?;
        let zst = zstd_file(&path)?;
        report.files.push(CompressedFile {
            name: name.to_owned(),
            original: size(&path)?,
            gzip: size(&gz)?,
            zstd: size(&zst)?,
        });
    }
    Ok(report)
}

pub fn print_report(report: &CompressionReport) {
    println!("{}", "=".repeat(50));
    for file in &report.files {
        println!("{}:", file.name);
        println!("  Original:    {} bytes", grouped(file.original));
        println!("  Compressed:  {} bytes", grouped(file.gzip));
        println!("  Zstd:        {} bytes", grouped(file.zstd));
        println!("  Saved:       {:.1}%", file.ratio());
        println!();
    }
    println!("TOTAL COMPRESSION:");
    println!("  Original:    {} bytes", grouped(report.total_original()));
    println!("  Compressed:  {} bytes", grouped(report.total_gzip()));
    println!("  Saved:       {:.1}%", report.ratio());
    println!("{}", "=".repeat(50));
}
