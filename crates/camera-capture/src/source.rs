//! Frame sources
//!
//! A `FrameSource` is an opened capture device. It is owned by exactly one
//! capture loop and released when dropped.

use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::{CameraConfig, CameraError, CameraSource, VideoFrame};

/// An opened capture device
pub trait FrameSource: Send {
    /// Block until the next frame is available
    fn read_frame(&mut self) -> Result<VideoFrame, CameraError>;

    /// Human-readable description for logs
    fn describe(&self) -> String;
}

/// Opens capture devices on demand, once per session
pub trait FrameSourceFactory: Send + Sync {
    fn open(&self) -> Result<Box<dyn FrameSource>, CameraError>;
}

impl FrameSourceFactory for CameraConfig {
    fn open(&self) -> Result<Box<dyn FrameSource>, CameraError> {
        open_source(self)
    }
}

/// Open the source described by `config`
pub fn open_source(config: &CameraConfig) -> Result<Box<dyn FrameSource>, CameraError> {
    if config.width == 0 || config.height == 0 {
        return Err(CameraError::Open(format!(
            "invalid resolution {}x{}",
            config.width, config.height
        )));
    }

    let source: Box<dyn FrameSource> = match &config.source {
        CameraSource::Device { path } => open_device(path, config)?,
        CameraSource::Synthetic => Box::new(
            SyntheticSource::new(config.width, config.height).with_frame_rate(config.fps),
        ),
        CameraSource::Replay { dir, looped } => Box::new(ReplaySource::open(dir, *looped)?),
    };

    info!("Opened camera source: {}", source.describe());
    Ok(source)
}

#[cfg(target_os = "linux")]
fn open_device(path: &Path, config: &CameraConfig) -> Result<Box<dyn FrameSource>, CameraError> {
    Ok(Box::new(crate::device::DeviceSource::open(
        path,
        config.width,
        config.height,
    )?))
}

#[cfg(not(target_os = "linux"))]
fn open_device(path: &Path, _config: &CameraConfig) -> Result<Box<dyn FrameSource>, CameraError> {
    Err(CameraError::Open(format!(
        "{}: webcam capture needs V4L2 (Linux)",
        path.display()
    )))
}

/// Generated test pattern: a horizontal gradient with a bar sweeping across it
pub struct SyntheticSource {
    width: u32,
    height: u32,
    sequence: u32,
    opened_at: Instant,
    frame_period: Option<Duration>,
    last_frame: Option<Instant>,
}

impl SyntheticSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            sequence: 0,
            opened_at: Instant::now(),
            frame_period: None,
            last_frame: None,
        }
    }

    /// Pace reads like a real camera; zero disables pacing
    pub fn with_frame_rate(mut self, fps: u32) -> Self {
        self.frame_period = (fps > 0).then(|| Duration::from_secs_f64(1.0 / fps as f64));
        self
    }

    fn wait_for_next_frame(&mut self) {
        if let (Some(period), Some(last)) = (self.frame_period, self.last_frame) {
            let elapsed = last.elapsed();
            if elapsed < period {
                thread::sleep(period - elapsed);
            }
        }
        self.last_frame = Some(Instant::now());
    }
}

impl FrameSource for SyntheticSource {
    fn read_frame(&mut self) -> Result<VideoFrame, CameraError> {
        self.wait_for_next_frame();
        let bar_x = self.sequence % self.width;
        let mut data = Vec::with_capacity((self.width * self.height * 3) as usize);

        for _y in 0..self.height {
            for x in 0..self.width {
                if x.abs_diff(bar_x) < 4 {
                    data.extend_from_slice(&[255, 255, 255]);
                } else {
                    let shade = (x * 255 / self.width.max(1)) as u8;
                    data.extend_from_slice(&[shade, 64, 255 - shade]);
                }
            }
        }

        let frame = VideoFrame {
            data,
            width: self.width,
            height: self.height,
            timestamp_ns: self.opened_at.elapsed().as_nanos() as u64,
            sequence: self.sequence,
        };
        self.sequence = self.sequence.wrapping_add(1);
        Ok(frame)
    }

    fn describe(&self) -> String {
        format!("synthetic {}x{}", self.width, self.height)
    }
}

/// Replays still images from a directory in file-name order
pub struct ReplaySource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    position: usize,
    looped: bool,
    sequence: u32,
    opened_at: Instant,
}

impl ReplaySource {
    pub fn open(dir: &Path, looped: bool) -> Result<Self, CameraError> {
        let entries = std::fs::read_dir(dir)
            .map_err(|e| CameraError::Open(format!("{}: {}", dir.display(), e)))?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| is_image_file(path))
            .collect();
        files.sort();

        if files.is_empty() {
            return Err(CameraError::Open(format!(
                "no images found in {}",
                dir.display()
            )));
        }

        debug!("Replay source found {} images in {}", files.len(), dir.display());

        Ok(Self {
            dir: dir.to_path_buf(),
            files,
            position: 0,
            looped,
            sequence: 0,
            opened_at: Instant::now(),
        })
    }

    /// Number of images available
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FrameSource for ReplaySource {
    fn read_frame(&mut self) -> Result<VideoFrame, CameraError> {
        if self.position >= self.files.len() {
            if !self.looped {
                return Err(CameraError::Disconnected(format!(
                    "replay of {} finished",
                    self.dir.display()
                )));
            }
            self.position = 0;
        }

        let path = &self.files[self.position];
        self.position += 1;

        let image = image::open(path).map_err(|e| {
            warn!("Skipping unreadable image {}: {}", path.display(), e);
            CameraError::Format(format!("{}: {}", path.display(), e))
        })?;

        let frame = VideoFrame::from_image(
            image.to_rgb8(),
            self.opened_at.elapsed().as_nanos() as u64,
            self.sequence,
        );
        self.sequence = self.sequence.wrapping_add(1);
        Ok(frame)
    }

    fn describe(&self) -> String {
        format!("replay {} ({} images)", self.dir.display(), self.files.len())
    }
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| matches!(ext.to_ascii_lowercase().as_str(), "jpg" | "jpeg" | "png"))
        .unwrap_or(false)
}
