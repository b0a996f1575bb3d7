use anyhow::{Context, Result};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

#[derive(Debug, Clone, serde::Deserialize)]
pub struct CameraConfig {
    pub mode: String,   // "libcamera-jpeg" | "v4l2-mjpeg"
    pub device: String, // /dev/video0 (v4l2)
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Frames grabbed per `capture` run.
    #[serde(default = "default_burst_frames")]
    pub burst_frames: usize,
}

fn default_burst_frames() -> usize {
    5
}

/// One JPEG frame:
/// - libcamera-jpeg: `libcamera-still -n -t 1 --width .. --height .. -o -`
/// - v4l2-mjpeg: a single MJPEG frame through `ffmpeg`
pub async fn capture_jpeg(cfg: &CameraConfig) -> Result<Vec<u8>> {
    match cfg.mode.as_str() {
        "libcamera-jpeg" => capture_libcamera(cfg).await,
        "v4l2-mjpeg" => capture_v4l2_ffmpeg(cfg).await,
        other => anyhow::bail!("unknown camera.mode: {}", other),
    }
}

/// `burst_frames` frames paced at `fps`.
pub async fn capture_burst(cfg: &CameraConfig) -> Result<Vec<Vec<u8>>> {
    let interval = frame_interval(cfg.fps);
    let mut frames = Vec::with_capacity(cfg.burst_frames);
    for i in 0..cfg.burst_frames {
        if i > 0 {
            tokio::time::sleep(interval).await;
        }
        let jpeg = capture_jpeg(cfg).await.with_context(|| format!("capture frame {}", i))?;
        debug!("capture: frame {} ({} bytes)", i, jpeg.len());
        frames.push(jpeg);
    }
    info!("capture: burst of {} frames", frames.len());
    Ok(frames)
}

fn frame_interval(fps: u32) -> Duration {
    Duration::from_millis(1000 / fps.max(1) as u64)
}

async fn capture_libcamera(cfg: &CameraConfig) -> Result<Vec<u8>> {
    let mut cmd = Command::new("libcamera-still");
    cmd.args([
        "-n",      // no preview
        "-t", "1", // 1ms
        "--width", &cfg.width.to_string(),
        "--height", &cfg.height.to_string(),
        "-o", "-", // stdout
    ]);

    debug!("capture: libcamera-still");
    let out = cmd.output().await.context("run libcamera-still")?;
    anyhow::ensure!(out.status.success(), "libcamera-still failed");
    anyhow::ensure!(!out.stdout.is_empty(), "libcamera-still returned no data");
    Ok(out.stdout)
}

async fn capture_v4l2_ffmpeg(cfg: &CameraConfig) -> Result<Vec<u8>> {
    let mut cmd = Command::new("ffmpeg");
    cmd.args([
        "-hide_banner", "-loglevel", "error",
        "-f", "video4linux2",
        "-input_format", "mjpeg",
        "-video_size", &format!("{}x{}", cfg.width, cfg.height),
        "-i", &cfg.device,
        "-vframes", "1",
        "-f", "image2pipe",
        "-vcodec", "mjpeg",
        "-",
    ]);

    debug!("capture: ffmpeg v4l2");
    let out = cmd.output().await.context("run ffmpeg capture")?;
    anyhow::ensure!(out.status.success(), "ffmpeg capture failed");
    anyhow::ensure!(!out.stdout.is_empty(), "ffmpeg returned no data");
    Ok(out.stdout)
}
