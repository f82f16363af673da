use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_circle_mut;
use sfm_features::DescriptorKind;
use sfm_pipeline::{collect_image_paths, PlyFormat, Reconstruction, SfmConfig};
use tracing::Level;

/// Sparse reconstruction from an ordered sequence of overlapping photographs
#[derive(Debug, Parser)]
#[command(name = "sfm", version, about)]
struct Cli {
    /// Directory of .jpg/.jpeg/.png frames, processed in file-name order
    image_dir: PathBuf,

    /// JSON or TOML configuration; flags below override it
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[arg(long)]
    fx: Option<f64>,
    #[arg(long)]
    fy: Option<f64>,
    #[arg(long)]
    cx: Option<f64>,
    #[arg(long)]
    cy: Option<f64>,

    /// gradient-histogram or binary
    #[arg(long)]
    descriptor: Option<DescriptorKind>,

    /// Ratio-test threshold for matching
    #[arg(long)]
    ratio: Option<f32>,

    /// Seed for RANSAC sampling
    #[arg(long)]
    seed: Option<u64>,

    #[arg(short, long, default_value = "reconstruction.ply")]
    output: PathBuf,

    /// Write binary little-endian PLY instead of ASCII
    #[arg(long)]
    binary: bool,

    /// Save every frame with its detected keypoints circled into DIR
    #[arg(long, value_name = "DIR")]
    draw_keypoints: Option<PathBuf>,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, conflicts_with = "quiet")]
    verbose: u8,

    /// Only warnings and errors
    #[arg(short, long)]
    quiet: bool,
}

impl Cli {
    fn log_level(&self) -> Level {
        match (self.quiet, self.verbose) {
            (true, _) => Level::WARN,
            (false, 0) => Level::INFO,
            (false, 1) => Level::DEBUG,
            _ => Level::TRACE,
        }
    }

    fn resolve_config(&self) -> Result<SfmConfig> {
        let mut config = match &self.config {
            Some(path) => SfmConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
            None => SfmConfig::default(),
        };

        let k = &mut config.intrinsics;
        k.fx = self.fx.unwrap_or(k.fx);
        k.fy = self.fy.unwrap_or(k.fy);
        k.cx = self.cx.unwrap_or(k.cx);
        k.cy = self.cy.unwrap_or(k.cy);
        if let Some(kind) = self.descriptor {
            config.features.descriptor = kind;
        }
        if let Some(ratio) = self.ratio {
            config.matching.ratio_threshold = ratio;
        }
        if self.seed.is_some() {
            config.ransac.seed = self.seed;
        }
        if self.binary {
            config.export.format = PlyFormat::BinaryLittleEndian;
        }

        config.validate()?;
        Ok(config)
    }
}

fn draw_keypoints(sfm: &Reconstruction, paths: &[PathBuf], dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;

    for (index, (image, path)) in sfm.state().images().iter().zip(paths).enumerate() {
        let Some(keypoints) = sfm.keypoints(index) else {
            continue;
        };
        let (w, h) = image.dimensions();
        let mut canvas = RgbImage::from_raw(w as u32, h as u32, image.rgb().to_vec())
            .context("image buffer does not match its dimensions")?;
        for kp in keypoints {
            let radius = (3.0 * kp.scale).round().max(1.0) as i32;
            let center = (kp.x.round() as i32, kp.y.round() as i32);
            draw_hollow_circle_mut(&mut canvas, center, radius, Rgb([255, 0, 0]));
        }

        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| index.to_string());
        let out = dir.join(format!("{}_keypoints.png", stem));
        canvas.save(&out).with_context(|| format!("saving {}", out.display()))?;
    }
    println!("Saved keypoint images to {}", dir.display());
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(cli.log_level())
        .with_target(false)
        .init();

    let config = cli.resolve_config()?;
    let paths = collect_image_paths(&cli.image_dir)?;
    println!("Found {} images in {}", paths.len(), cli.image_dir.display());

    let t0 = Instant::now();
    let mut sfm = Reconstruction::new(config)?;
    sfm.load_images(&paths)?;

    let detected = sfm.detect_features()?;
    println!("Detected {}", detected);
    if let Some(dir) = &cli.draw_keypoints {
        draw_keypoints(&sfm, &paths, dir)?;
    }

    println!("Matched {}", sfm.match_features()?);
    println!("Estimated {}", sfm.estimate_poses()?);
    println!("Triangulated {}", sfm.triangulate()?);

    let written = sfm.export(&cli.output)?;
    println!(
        "Saved {} points to {} in {:.2?}",
        written,
        cli.output.display(),
        t0.elapsed()
    );
    Ok(())
}
