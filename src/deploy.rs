//! Full deployment: images, production build, then precompression.

use std::{fs, path::Path};

use anyhow::Context;

use crate::{
    compress::{self, sibling, COMPRESSED_FILES},
    images::{self, ImageOptimizer, ImageSettings},
    pipeline::{self, Builder},
    stats::{grouped, kib, savings_percent},
};

/// Sizes of one deployed file and its gzip sibling.
#[derive(Debug, PartialEq, Eq)]
pub struct DeployedFile {
    pub name: &'static str,
    pub minified: u64,
    pub gzip: Option<u64>,
}

fn step(description: &str, run: impl FnOnce() -> anyhow::Result<()>) -> anyhow::Result<()> {
    println!("{description}...");
    match run() {
        Ok(()) => {
            println!("{description} completed successfully");
            Ok(())
        }
        Err(err) => {
            println!("{description} failed: {err:#}");
            println!("\nDeployment failed!");
            Err(err.context(format!("{description} failed")))
        }
    }
}

/// Runs every stage in order, stopping at the first failure.
pub fn deploy(source: &Path, dist: &Path, settings: &ImageSettings) -> anyhow::Result<()> {
    println!("Starting portfolio deployment process...");
    println!("{}", "=".repeat(60));

    step("Optimizing images", || {
        let optimizer = ImageOptimizer::new(source, settings.clone(), settings.encoder());
        let optimized = optimizer.optimized_dir().to_path_buf();
        let stats = optimizer.run().context("image optimization")?;
        images::print_report(&stats, &optimized);
        Ok(())
    })?;
    step("Building production assets", || {
        let output = Builder::new(source, dist).run().context("production build")?;
        pipeline::print_report(&output, dist);
        Ok(())
    })?;
    step("Compressing assets", || {
        let report = compress::compress_dist(dist).context("compression")?;
        compress::print_report(&report);
        Ok(())
    })?;

    print_summary(dist, &summarize(dist));
    Ok(())
}

/// Deployed files present in `dist`, in serving order.
pub fn summarize(dist: &Path) -> Vec<DeployedFile> {
    COMPRESSED_FILES
        .into_iter()
        .filter_map(|name| {
            let path = dist.join(name);
            let minified = fs::metadata(&path).ok()?.len();
            let gzip = fs::metadata(sibling(&path, ".gz"))
                .ok()
                .map(|meta| meta.len())
                .filter(|&len| len > 0);
            Some(DeployedFile {
                name,
                minified,
                gzip,
            })
        })
        .collect()
}

fn print_summary(dist: &Path, files: &[DeployedFile]) {
    println!("\n{}", "=".repeat(60));
    println!("DEPLOYMENT SUMMARY");
    println!("{}", "=".repeat(60));
    if !files.is_empty() {
        println!("\nProduction files:");
    }
    for file in files {
        println!("  {}:", file.name);
        println!(
            "    Minified: {} bytes ({:.1}KB)",
            grouped(file.minified),
            kib(file.minified)
        );
        if let Some(gzip) = file.gzip {
            println!(
                "    Gzipped:  {} bytes ({:.1}KB, {:.1}% smaller)",
                grouped(gzip),
                kib(gzip),
                savings_percent(file.minified, gzip)
            );
        }
    }
    println!("\nPortfolio deployment preparation complete!");
    println!("Deploy the '{}' directory to your hosting provider", dist.display());
}
