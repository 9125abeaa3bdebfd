//! rollcall-hw — Camera acquisition and capture encoding.
//!
//! Provides the `CameraSource` seam with a V4L2 webcam implementation,
//! the `CameraWorker` thread that keeps device I/O off async executors,
//! RGB frame conversion, and the JPEG `CaptureEncoder`.

pub mod camera;
pub mod encoder;
pub mod frame;
pub mod worker;

pub use camera::{CameraError, CameraSource, DeviceInfo, PixelFormat, V4l2Camera};
pub use encoder::{CaptureEncoder, EncodeError, ImagePayload};
pub use frame::Frame;
pub use worker::CameraWorker;
