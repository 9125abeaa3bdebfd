//! Camera acquisition — the `CameraSource` seam and its V4L2 implementation.

use crate::frame::{self, Frame};
use std::path::Path;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CameraError {
    #[error("camera permission denied: {0}")]
    PermissionDenied(String),
    #[error("camera unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("camera is not streaming")]
    NotStreaming,
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("camera worker stopped: {0}")]
    WorkerStopped(String),
}

/// A live video source that can be started, stopped and sampled.
///
/// Every method may block on device I/O; async code drives a source
/// through [`CameraWorker`](crate::worker::CameraWorker). `stop` must be
/// idempotent and must release every acquired device handle, whatever
/// state the source is in.
pub trait CameraSource {
    fn start(&mut self) -> Result<(), CameraError>;
    fn stop(&mut self);
    fn is_active(&self) -> bool;
    fn capture_frame(&mut self) -> Result<Frame, CameraError>;
}

/// Info about a discovered V4L2 device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// Negotiated pixel format for the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUYV 4:2:2 packed (2 bytes/pixel).
    Yuyv,
    /// 8-bit grayscale (IR-only webcams).
    Grey,
    /// Motion-JPEG, one JPEG per buffer.
    Mjpg,
}

/// An opened device with its negotiated format.
struct OpenDevice {
    device: Device,
    width: u32,
    height: u32,
    pixel_format: PixelFormat,
}

/// V4L2 webcam. The device is only held open between `start` and `stop`.
pub struct V4l2Camera {
    device_path: String,
    requested_width: u32,
    requested_height: u32,
    warmup_frames: usize,
    open: Option<OpenDevice>,
}

impl V4l2Camera {
    pub fn new(device_path: &str, width: u32, height: u32) -> Self {
        Self {
            device_path: device_path.to_string(),
            requested_width: width,
            requested_height: height,
            warmup_frames: 0,
            open: None,
        }
    }

    /// Number of frames discarded after opening while auto-exposure settles.
    pub fn with_warmup_frames(mut self, count: usize) -> Self {
        self.warmup_frames = count;
        self
    }

    /// Negotiated resolution, if streaming.
    pub fn resolution(&self) -> Option<(u32, u32)> {
        self.open.as_ref().map(|d| (d.width, d.height))
    }

    fn open_device(&self) -> Result<OpenDevice, CameraError> {
        let path = self.device_path.as_str();
        if !Path::new(path).exists() {
            return Err(CameraError::DeviceUnavailable(format!("{path}: no such device")));
        }

        let device = Device::with_path(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::PermissionDenied => {
                CameraError::PermissionDenied(format!("{path}: {e}"))
            }
            _ if e.to_string().contains("busy") || e.raw_os_error() == Some(16) => {
                CameraError::DeviceUnavailable(format!("{path}: device busy"))
            }
            _ => CameraError::DeviceUnavailable(format!("{path}: {e}")),
        })?;

        let caps = device.query_caps().map_err(|e| {
            CameraError::DeviceUnavailable(format!("failed to query capabilities: {e}"))
        })?;

        tracing::info!(
            device = path,
            driver = %caps.driver,
            card = %caps.card,
            "opened camera"
        );

        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(CameraError::DeviceUnavailable(format!(
                "{path}: not a video capture device"
            )));
        }

        let mut fmt = device
            .format()
            .map_err(|e| CameraError::DeviceUnavailable(format!("failed to get format: {e}")))?;
        fmt.fourcc = FourCC::new(b"YUYV");
        fmt.width = self.requested_width;
        fmt.height = self.requested_height;

        let negotiated = device
            .set_format(&fmt)
            .map_err(|e| CameraError::DeviceUnavailable(format!("failed to set format: {e}")))?;

        let fourcc = negotiated.fourcc;
        let pixel_format = if fourcc == FourCC::new(b"YUYV") {
            PixelFormat::Yuyv
        } else if fourcc == FourCC::new(b"MJPG") {
            PixelFormat::Mjpg
        } else if fourcc == FourCC::new(b"GREY") {
            PixelFormat::Grey
        } else {
            return Err(CameraError::DeviceUnavailable(format!(
                "unsupported pixel format: {fourcc:?} (need YUYV, MJPG, or GREY)"
            )));
        };

        tracing::info!(
            width = negotiated.width,
            height = negotiated.height,
            fourcc = ?fourcc,
            "negotiated format"
        );

        Ok(OpenDevice {
            device,
            width: negotiated.width,
            height: negotiated.height,
            pixel_format,
        })
    }

    /// List available V4L2 video capture devices.
    pub fn list_devices() -> Vec<DeviceInfo> {
        let mut devices = Vec::new();

        for i in 0..16 {
            let path = format!("/dev/video{i}");
            if !Path::new(&path).exists() {
                continue;
            }
            let Ok(dev) = Device::with_path(&path) else {
                continue;
            };
            let Ok(caps) = dev.query_caps() else {
                continue;
            };
            if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
                continue;
            }
            devices.push(DeviceInfo {
                path,
                name: caps.card.clone(),
                driver: caps.driver.clone(),
                bus: caps.bus.clone(),
            });
        }

        devices
    }
}

impl CameraSource for V4l2Camera {
    fn start(&mut self) -> Result<(), CameraError> {
        if self.open.is_some() {
            return Ok(());
        }
        self.open = Some(self.open_device()?);

        if self.warmup_frames > 0 {
            tracing::debug!(count = self.warmup_frames, "discarding warmup frames");
            for _ in 0..self.warmup_frames {
                let _ = self.capture_frame();
            }
        }
        Ok(())
    }

    fn stop(&mut self) {
        // Dropping the device closes its file descriptor.
        if self.open.take().is_some() {
            tracing::info!(device = %self.device_path, "camera released");
        }
    }

    fn is_active(&self) -> bool {
        self.open.is_some()
    }

    fn capture_frame(&mut self) -> Result<Frame, CameraError> {
        let open = self.open.as_ref().ok_or(CameraError::NotStreaming)?;

        let mut stream =
            MmapStream::with_buffers(&open.device, BufType::VideoCapture, 4).map_err(|e| {
                CameraError::CaptureFailed(format!("failed to create mmap stream: {e}"))
            })?;

        let (buf, meta) = stream
            .next()
            .map_err(|e| CameraError::CaptureFailed(format!("failed to dequeue buffer: {e}")))?;

        let (w, h) = (open.width, open.height);
        let (data, width, height) = match open.pixel_format {
            PixelFormat::Yuyv => (frame::yuyv_to_rgb(buf, w, h), w, h),
            PixelFormat::Grey => (frame::grey_to_rgb(buf, w, h), w, h),
            PixelFormat::Mjpg => match frame::mjpeg_to_rgb(buf) {
                Ok((data, w, h)) => (Ok(data), w, h),
                Err(e) => (Err(e), w, h),
            },
        };
        let data = data.map_err(|e| CameraError::CaptureFailed(e.to_string()))?;

        Ok(Frame {
            data,
            width,
            height,
            timestamp: std::time::Instant::now(),
            sequence: meta.sequence,
        })
    }
}

impl Drop for V4l2Camera {
    fn drop(&mut self) {
        self.stop();
    }
}
