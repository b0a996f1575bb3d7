use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use sign_fusion::{doctor as fusion_doctor, FusionContext, FusionPolicy};
use sign_knn::{doctor as knn_doctor, KnnConfig};
use sign_proto::{BatchScoreResponse, HealthResponse, ScoreResponse};
use sign_vision::{camera, doctor as vision_doctor, ClassifierConfig, DetectorConfig, LandmarkerConfig};

#[cfg(feature = "vision-tflite")]
use sign_vision::tflite::{TfliteClassifier, TfliteDetector, TfliteLandmarker};

#[derive(Debug, Parser)]
#[command(name = "signfuse", version, about = "signfuse - hand-sign recognition by fusing several recognizers")]
struct Cli {
    #[arg(long)]
    config: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Check the configuration and report backend readiness.
    Doctor,
    /// Score one image file.
    Score { image: PathBuf },
    /// Score several image files as one sign.
    Batch {
        #[arg(required = true)]
        images: Vec<PathBuf>,
    },
    /// Grab a burst from the camera and score it as one sign.
    Capture {
        /// Overrides camera.burst_frames.
        #[arg(long)]
        frames: Option<usize>,
    },
    Vision { #[command(subcommand)] cmd: VisionCmd },
}

#[derive(Debug, Subcommand)]
enum VisionCmd {
    /// Print input/output tensor shapes of a configured model.
    Inspect {
        #[arg(long, value_enum, default_value_t = ModelKind::Detector)]
        model: ModelKind,
    },
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum ModelKind {
    Detector,
    Classifier,
    Landmarks,
}

#[derive(Debug, serde::Deserialize)]
struct Config {
    #[serde(default)]
    policy: FusionPolicy,

    detector: Option<DetectorConfig>,
    classifier: Option<ClassifierConfig>,
    landmarks: Option<LandmarkerConfig>,
    knn: Option<KnnConfig>,
    camera: Option<camera::CameraConfig>,
}

fn load_config(path: &str) -> Result<Config> {
    let s = std::fs::read_to_string(path).context("read config")?;
    parse_config(&s)
}

fn parse_config(s: &str) -> Result<Config> {
    toml::from_str(s).context("parse config toml")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let cfg = load_config(&cli.config)?;

    match cli.cmd {
        Command::Doctor => doctor(&cfg).await?,
        Command::Score { image } => score(&cfg, &image).await?,
        Command::Batch { images } => batch(&cfg, &images).await?,
        Command::Capture { frames } => capture(&cfg, frames).await?,
        Command::Vision { cmd } => vision_cmd(&cfg, cmd).await?,
    }
    Ok(())
}

async fn doctor(cfg: &Config) -> Result<()> {
    info!("doctor: starting");

    fusion_doctor::check_policy(&cfg.policy)?;
    if let Some(d) = &cfg.detector {
        vision_doctor::check_detector(d)?;
    }
    if let Some(c) = cfg.classifier.as_ref().filter(|c| c.enable) {
        vision_doctor::check_classifier(c)?;
    }
    if let Some(l) = &cfg.landmarks {
        vision_doctor::check_landmarker(l)?;
    }
    if let Some(k) = &cfg.knn {
        knn_doctor::check_knn(k)?;
        anyhow::ensure!(cfg.landmarks.is_some(), "[knn] needs a [landmarks] model");
    }
    if let Some(c) = &cfg.camera {
        vision_doctor::check_camera(c).or_else(|e| {
            warn!("camera config unusable, capture disabled: {:#}", e);
            Ok::<(), anyhow::Error>(())
        })?;
    }
    if cfg.policy.image_classifier_enable && !cfg.classifier.as_ref().map(|c| c.enable).unwrap_or(false) {
        warn!("policy.image_classifier_enable=true but no enabled [classifier]");
    }
    if cfg.policy.hand_crop && cfg.landmarks.is_none() {
        info!("doctor: hand crop requested without [landmarks]; detector will see full frames");
    }

    let ctx = init_context(cfg);
    let health = HealthResponse::from_readiness(&ctx.readiness(), ctx.has_hand_locator());
    println!("{}", serde_json::to_string_pretty(&health)?);
    anyhow::ensure!(health.model_ready, "no recognizer is ready");

    info!("doctor: OK");
    Ok(())
}

async fn score(cfg: &Config, path: &Path) -> Result<()> {
    let bytes = tokio::fs::read(path).await.with_context(|| format!("read {}", path.display()))?;
    let mut ctx = init_context(cfg);
    let decision = ctx.score(&bytes, &cfg.policy)?;
    println!("{}", serde_json::to_string_pretty(&ScoreResponse::from(decision))?);
    Ok(())
}

async fn batch(cfg: &Config, paths: &[PathBuf]) -> Result<()> {
    let mut frames = Vec::with_capacity(paths.len());
    for p in paths {
        frames.push(tokio::fs::read(p).await.with_context(|| format!("read {}", p.display()))?);
    }
    score_frames(cfg, &frames)
}

async fn capture(cfg: &Config, frames: Option<usize>) -> Result<()> {
    let mut cam = cfg.camera.clone().context("no [camera] config section")?;
    if let Some(n) = frames {
        cam.burst_frames = n;
    }
    vision_doctor::check_camera(&cam)?;
    let jpegs = camera::capture_burst(&cam).await?;
    score_frames(cfg, &jpegs)
}

fn score_frames(cfg: &Config, frames: &[Vec<u8>]) -> Result<()> {
    let mut ctx = init_context(cfg);
    let consensus = ctx.score_batch(frames, &cfg.policy)?;
    println!("{}", serde_json::to_string_pretty(&BatchScoreResponse::from(consensus))?);
    Ok(())
}

async fn vision_cmd(cfg: &Config, cmd: VisionCmd) -> Result<()> {
    match cmd {
        VisionCmd::Inspect { model } => {
            print!("{}", inspect_model(cfg, model)?);
            Ok(())
        }
    }
}

#[cfg(feature = "vision-tflite")]
fn inspect_model(cfg: &Config, model: ModelKind) -> Result<String> {
    match model {
        ModelKind::Detector => {
            let d = cfg.detector.clone().context("no [detector] config section")?;
            TfliteDetector::new(d)?.inspect()
        }
        ModelKind::Classifier => {
            let c = cfg.classifier.clone().context("no [classifier] config section")?;
            TfliteClassifier::new(c)?.inspect()
        }
        ModelKind::Landmarks => {
            let l = cfg.landmarks.clone().context("no [landmarks] config section")?;
            TfliteLandmarker::new(l)?.inspect()
        }
    }
}

#[cfg(not(feature = "vision-tflite"))]
fn inspect_model(_cfg: &Config, _model: ModelKind) -> Result<String> {
    anyhow::bail!("vision backend not available; build with --features vision-tflite")
}

/// Builds the fusion context from whatever is configured. A backend that
/// fails to load is logged and left out; scoring reports it if nothing remains.
fn init_context(cfg: &Config) -> FusionContext {
    let builder = FusionContext::builder();

    #[cfg(feature = "vision-tflite")]
    let builder = load_models(cfg, builder);

    #[cfg(not(feature = "vision-tflite"))]
    if cfg.detector.is_some() || cfg.classifier.is_some() || cfg.landmarks.is_some() || cfg.knn.is_some() {
        warn!("models configured but binary not built with --features vision-tflite");
    }

    builder.build()
}

#[cfg(feature = "vision-tflite")]
fn load_models(cfg: &Config, mut builder: sign_fusion::FusionContextBuilder) -> sign_fusion::FusionContextBuilder {
    use sign_fusion::{LandmarkHandLocator, Role};
    use sign_knn::KnnLandmarkClassifier;
    use std::sync::{Arc, Mutex};

    if let Some(c) = cfg.classifier.as_ref().filter(|c| c.enable) {
        match TfliteClassifier::new(c.clone()) {
            Ok(b) => builder = builder.backend(Role::ImageClassifier, Box::new(b)),
            Err(e) => warn!("classifier unavailable: {:#}", e),
        }
    }

    if let Some(d) = &cfg.detector {
        match TfliteDetector::new(d.clone()) {
            Ok(b) => builder = builder.backend(Role::Detector, Box::new(b)),
            Err(e) => warn!("detector unavailable: {:#}", e),
        }
    }

    let Some(l) = &cfg.landmarks else { return builder; };
    let landmarker = match TfliteLandmarker::new(l.clone()) {
        Ok(m) => Arc::new(Mutex::new(m)),
        Err(e) => {
            warn!("landmarks unavailable: {:#}", e);
            return builder;
        }
    };
    builder = builder.hand_locator(Box::new(LandmarkHandLocator::new(landmarker.clone())));

    if let Some(k) = &cfg.knn {
        match KnnLandmarkClassifier::from_config(k, landmarker) {
            Ok(b) => builder = builder.backend(Role::LandmarkClassifier, Box::new(b)),
            Err(e) => warn!("knn unavailable: {:#}", e),
        }
    }
    builder
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn example_config_parses() {
        let cfg = parse_config(include_str!("../../../config/signfuse.example.toml")).unwrap();
        fusion_doctor::check_policy(&cfg.policy).unwrap();
        assert!(cfg.detector.is_some());
        assert_eq!(cfg.knn.as_ref().map(|k| k.k), Some(5));
        assert_eq!(cfg.camera.as_ref().map(|c| c.burst_frames), Some(5));
        assert!(!cfg.policy.image_classifier_enable);
    }

    #[test]
    fn empty_config_uses_default_policy() {
        let cfg = parse_config("").unwrap();
        assert_eq!(cfg.policy.top_k, 3);
        assert_eq!(cfg.policy.detector_accept_conf, 0.35);
        assert!(cfg.policy.augmentation.enable);
        assert!(cfg.detector.is_none());
    }

    #[test]
    fn partial_policy_keeps_other_defaults() {
        let cfg = parse_config("[policy]\ntop_k = 5\n[policy.augmentation]\nrotations = false\n").unwrap();
        assert_eq!(cfg.policy.top_k, 5);
        assert_eq!(cfg.policy.classifier_accept_conf, 0.05);
        assert!(!cfg.policy.augmentation.rotations);
        assert!(cfg.policy.augmentation.mirror);
    }

    #[test]
    fn unconfigured_context_refuses_to_score() {
        let cfg = parse_config("").unwrap();
        let mut ctx = init_context(&cfg);
        assert!(ctx.score(b"whatever", &cfg.policy).is_err());
    }

    #[test]
    fn cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["signfuse", "--config", "c.toml", "batch", "a.jpg", "b.jpg"]).unwrap();
        assert!(matches!(cli.cmd, Command::Batch { ref images } if images.len() == 2));
        let cli = Cli::try_parse_from(["signfuse", "--config", "c.toml", "vision", "inspect", "--model", "landmarks"]).unwrap();
        assert!(matches!(cli.cmd, Command::Vision { cmd: VisionCmd::Inspect { model: ModelKind::Landmarks } }));
        assert!(Cli::try_parse_from(["signfuse", "--config", "c.toml", "batch"]).is_err());
    }
}
