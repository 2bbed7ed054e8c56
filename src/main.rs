use std::{
    env,
    fs::read_to_string,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use clap::{Parser, Subcommand};
use duration_str::deserialize_duration;
use serde::Deserialize;

use csp::CspPolicy;
use images::{ImageOptimizer, ImageSettings};
use pipeline::Builder;

mod compress;
mod csp;
mod css;
mod deploy;
mod error;
mod http;
mod images;
mod minify;
mod pipeline;
mod stats;

fn _default_source() -> PathBuf {
    PathBuf::from(".")
}
fn _default_dist() -> PathBuf {
    PathBuf::from("dist")
}
fn _default_port() -> u16 {
    8000
}
fn _default_max_age() -> Duration {
    Duration::from_secs(365 * 24 * 60 * 60)
}
fn _default_true() -> bool {
    true
}

#[derive(Deserialize, Clone, Debug)]
pub struct Config {
    #[serde(default = "_default_source")]
    source_dir: PathBuf,
    #[serde(default = "_default_dist")]
    dist_dir: PathBuf,
    #[serde(default = "_default_port")]
    port: u16,
    #[serde(
        default = "_default_max_age",
        deserialize_with = "deserialize_duration"
    )]
    cache_max_age: Duration,
    #[serde(default = "_default_true")]
    open_browser: bool,
    #[serde(default)]
    images: ImageSettings,
}

impl Config {
    fn load() -> anyhow::Result<Self> {
        let config_src =
            env::var("CONFIG_FILE").unwrap_or_else(|_| "sitekit.toml".to_string());
        let config_src = env::var("CONFIG")
            .or_else(|_| read_to_string(&config_src))
            .unwrap_or_default();
        toml::from_str(config_src.as_str()).context("Failed to parse config")
    }

    fn dist_dir(&self) -> PathBuf {
        self.source_dir.join(&self.dist_dir)
    }
}

#[derive(Parser)]
#[command(version, about = "Build, optimize and serve the portfolio site")]
struct Cli {
    /// Portfolio source directory, overriding `source_dir`
    #[arg(long, global = true)]
    root: Option<PathBuf>,
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Minify and prune the site into the dist directory
    Build,
    /// Precompress the built html, css and js
    Compress,
    /// Produce responsive and WebP image variants
    Images,
    /// Run images, build and compress in order
    Deploy,
    /// Serve the built site, or the sources with --dev
    Serve {
        #[arg(long)]
        dev: bool,
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Print the content security policy and companion headers
    Csp {
        #[arg(long)]
        json: bool,
    },
}

fn print_csp(policy: &CspPolicy, json: bool) -> anyhow::Result<()> {
    if json {
        let doc = serde_json::json!({
            "header": policy.header_value(),
            "security_headers": policy.security_headers(),
            "meta_tag": policy.meta_tag(),
        });
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }
    println!("Content Security Policy:");
    println!("{}", policy.header_value());
    println!("\nSecurity headers:");
    for (name, value) in policy.security_headers() {
        println!("{name}: {value}");
    }
    println!("\nMeta tag:");
    println!("{}", policy.meta_tag());
    Ok(())
}

fn build(source: &Path, dist: &Path) -> anyhow::Result<()> {
    let output = Builder::new(source, dist)
        .run()
        .context("Production build failed")?;
    pipeline::print_report(&output, dist);
    Ok(())
}

fn optimize_images(source: &Path, settings: &ImageSettings) -> anyhow::Result<()> {
    let optimizer = ImageOptimizer::new(source, settings.clone(), settings.encoder());
    let optimized = optimizer.optimized_dir().to_path_buf();
    let stats = optimizer.run().context("Image optimization failed")?;
    images::print_report(&stats, &optimized);
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose {
        log::Level::Debug
    } else {
        log::Level::Info
    };
    simple_logger::init_with_level(level).context("Failed to initialise logger")?;

    let mut config = Config::load()?;
    if let Some(root) = cli.root {
        config.source_dir = root;
    }
    let source = config.source_dir.clone();
    let dist = config.dist_dir();

    match cli.command {
        Command::Build => build(&source, &dist),
        Command::Compress => {
            let report = compress::compress_dist(&dist).context("Compression failed")?;
            if !report.files.is_empty() {
                compress::print_report(&report);
            }
            Ok(())
        }
        Command::Images => optimize_images(&source, &config.images),
        Command::Deploy => deploy::deploy(&source, &dist, &config.images),
        Command::Serve { dev, port } => {
            let port = port.unwrap_or(config.port);
            if dev {
                http::run_development(source, port, config.open_browser).await
            } else {
                http::run_production(dist, port, config.cache_max_age).await
            }
        }
        Command::Csp { json } => print_csp(&CspPolicy::portfolio(), json),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.source_dir, Path::new("."));
        assert_eq!(config.dist_dir(), Path::new("./dist"));
        assert_eq!(config.port, 8000);
        assert_eq!(config.cache_max_age, Duration::from_secs(31_536_000));
        assert!(config.open_browser);
        assert_eq!(config.images, ImageSettings::default());
    }

    #[test]
    fn overrides_parse() {
        let config: Config = toml::from_str(
            r#"
            source_dir = "/srv/site"
            dist_dir = "/srv/out"
            port = 9000
            cache_max_age = "1h"
            open_browser = false

            [images]
            quality = 70
            magick = "convert"
            "#,
        )
        .unwrap();
        assert_eq!(config.dist_dir(), Path::new("/srv/out"));
        assert_eq!(config.port, 9000);
        assert_eq!(config.cache_max_age, Duration::from_secs(3600));
        assert!(!config.open_browser);
        assert_eq!(config.images.quality, 70);
        assert_eq!(config.images.magick, "convert");
        assert_eq!(config.images.cwebp, "cwebp");
    }

    #[test]
    fn cli_accepts_global_root() {
        let cli = Cli::try_parse_from(["sitekit", "serve", "--dev", "--root", "site", "-p", "9"])
            .unwrap();
        assert_eq!(cli.root.as_deref(), Some(Path::new("site")));
        assert!(matches!(
            cli.command,
            Command::Serve {
                dev: true,
                port: Some(9)
            }
        ));
    }
}
