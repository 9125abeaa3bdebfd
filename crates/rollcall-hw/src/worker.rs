//! Dedicated camera thread.
//!
//! V4L2 open, warmup and buffer dequeue all block, so the camera lives on
//! its own OS thread and async callers talk to it over a channel. Each
//! request carries a oneshot for its reply.

use crate::camera::{CameraError, CameraSource};
use crate::frame::Frame;
use std::thread::JoinHandle;
use tokio::sync::{mpsc, oneshot};

enum CameraRequest {
    Start {
        reply: oneshot::Sender<Result<(), CameraError>>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
    Capture {
        reply: oneshot::Sender<Result<Frame, CameraError>>,
    },
}

/// Async handle to a camera owned by a worker thread.
///
/// Dropping the handle closes the channel and waits for the thread, which
/// releases the device before exiting.
pub struct CameraWorker {
    tx: Option<mpsc::Sender<CameraRequest>>,
    thread: Option<JoinHandle<()>>,
}

impl CameraWorker {
    pub fn spawn<C>(mut camera: C) -> Result<Self, CameraError>
    where
        C: CameraSource + Send + 'static,
    {
        let (tx, mut rx) = mpsc::channel::<CameraRequest>(4);

        let thread = std::thread::Builder::new()
            .name("rollcall-camera".into())
            .spawn(move || {
                tracing::debug!("camera thread started");
                while let Some(req) = rx.blocking_recv() {
                    match req {
                        CameraRequest::Start { reply } => {
                            let _ = reply.send(camera.start());
                        }
                        CameraRequest::Stop { reply } => {
                            camera.stop();
                            let _ = reply.send(());
                        }
                        CameraRequest::Capture { reply } => {
                            let _ = reply.send(camera.capture_frame());
                        }
                    }
                }
                if camera.is_active() {
                    camera.stop();
                }
                tracing::debug!("camera thread exiting");
            })
            .map_err(|e| {
                CameraError::WorkerStopped(format!("failed to spawn camera thread: {e}"))
            })?;

        Ok(Self {
            tx: Some(tx),
            thread: Some(thread),
        })
    }

    pub async fn start(&self) -> Result<(), CameraError> {
        let (reply, rx) = oneshot::channel();
        self.request(CameraRequest::Start { reply }).await?;
        rx.await.map_err(|_| worker_gone())?
    }

    /// Release the device. Idempotent.
    pub async fn stop(&self) {
        let (reply, rx) = oneshot::channel();
        if self.request(CameraRequest::Stop { reply }).await.is_ok() {
            let _ = rx.await;
        }
    }

    pub async fn capture_frame(&self) -> Result<Frame, CameraError> {
        let (reply, rx) = oneshot::channel();
        self.request(CameraRequest::Capture { reply }).await?;
        rx.await.map_err(|_| worker_gone())?
    }

    async fn request(&self, req: CameraRequest) -> Result<(), CameraError> {
        let tx = self.tx.as_ref().ok_or_else(worker_gone)?;
        tx.send(req).await.map_err(|_| worker_gone())
    }
}

impl Drop for CameraWorker {
    fn drop(&mut self) {
        // Closing the channel ends the request loop; the join waits for at
        // most one in-flight request.
        self.tx.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("camera thread panicked");
            }
        }
    }
}

fn worker_gone() -> CameraError {
    CameraError::WorkerStopped("camera thread is not running".into())
}
