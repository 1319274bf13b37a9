//! Frame pump between the surface and the device.
//!
//! Each cycle snapshots the surface (or takes an external frame while a bypass
//! session is streaming), hands the bytes to the sink on tokio's blocking
//! pool, waits for the write to complete and only then sleeps one frame
//! interval. A slow device therefore slows the pump down instead of piling up
//! writes.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::encoder::FrameEncoder;
use crate::surface::SharedSurface;

/// Destination for encoded frames. Writes block until the bytes are accepted.
pub trait FrameSink: Send + 'static {
    fn write_frame(&mut self, frame: &[u8]) -> std::io::Result<()>;
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("device write failed: {0}")]
    Device(#[source] std::io::Error),

    #[error("device writer task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// External frames waiting to replace local rendering.
#[derive(Debug)]
pub struct Bypass {
    claimed: bool,
    active: bool,
    queue: VecDeque<Vec<u8>>,
    last: Option<Vec<u8>>,
    depth: usize,
}

pub type SharedBypass = Rc<RefCell<Bypass>>;

impl Bypass {
    pub fn new(depth: usize) -> Self {
        Self {
            claimed: false,
            active: false,
            queue: VecDeque::new(),
            last: None,
            depth: depth.max(1),
        }
    }

    pub fn shared(depth: usize) -> SharedBypass {
        Rc::new(RefCell::new(Self::new(depth)))
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Queue a raw frame and switch the transport over to external frames.
    pub fn push(&mut self, frame: Vec<u8>) {
        if !self.active {
            info!("Bypass active, local rendering suspended");
            self.active = true;
        }
        if self.queue.len() == self.depth {
            self.queue.pop_front();
            trace!("Bypass queue full, dropped oldest frame");
        }
        self.queue.push_back(frame);
    }

    pub fn is_claimed(&self) -> bool {
        self.claimed
    }

    /// Return to local rendering on the next transport cycle.
    pub fn end(&mut self) {
        if self.active {
            info!("Bypass ended, local rendering resumed");
        }
        self.active = false;
        self.queue.clear();
        self.last = None;
    }

    /// Next external frame in arrival order, repeating the last one while the
    /// queue is empty. `None` when bypass is inactive.
    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        if !self.active {
            return None;
        }
        if let Some(frame) = self.queue.pop_front() {
            self.last = Some(frame);
        }
        self.last.clone()
    }
}

/// Holds a bypass session open; ending or dropping it resumes local rendering.
pub struct BypassSession {
    bypass: SharedBypass,
}

impl BypassSession {
    /// `None` if another session already owns the bypass. Local rendering
    /// continues until the first frame is forwarded.
    pub fn begin(bypass: &SharedBypass) -> Option<Self> {
        let mut state = bypass.borrow_mut();
        if state.claimed {
            return None;
        }
        state.claimed = true;
        drop(state);
        Some(Self {
            bypass: bypass.clone(),
        })
    }

    pub fn forward(&self, frame: Vec<u8>) {
        self.bypass.borrow_mut().push(frame);
    }

    /// End-of-stream from the peer. The session stays claimed until dropped.
    pub fn pause(&self) {
        self.bypass.borrow_mut().end();
    }
}

impl Drop for BypassSession {
    fn drop(&mut self) {
        let mut state = self.bypass.borrow_mut();
        state.end();
        state.claimed = false;
    }
}

/// Where the next frame comes from: the bypass queue or the encoded surface.
pub struct FrameSource {
    surface: SharedSurface,
    encoder: FrameEncoder,
    bypass: SharedBypass,
}

impl FrameSource {
    pub fn new(surface: SharedSurface, bypass: SharedBypass) -> Self {
        let encoder = {
            let surface = surface.borrow();
            FrameEncoder::new(surface.width(), surface.height())
        };
        Self {
            surface,
            encoder,
            bypass,
        }
    }

    /// External frame if bypass is streaming, otherwise the encoded surface.
    pub fn next_frame(&self) -> Vec<u8> {
        if let Some(frame) = self.bypass.borrow_mut().next_frame() {
            return frame;
        }
        let pixels = self.surface.borrow().read_pixels();
        self.encoder.encode(&pixels)
    }
}

pub struct FrameTransport<S: FrameSink> {
    sink: S,
    source: FrameSource,
    interval: Duration,
}

impl<S: FrameSink> FrameTransport<S> {
    pub fn new(sink: S, surface: SharedSurface, bypass: SharedBypass, interval: Duration) -> Self {
        Self {
            sink,
            source: FrameSource::new(surface, bypass),
            interval,
        }
    }

    /// Pump frames until the device fails. Never returns `Ok`.
    pub async fn run(self) -> Result<(), TransportError> {
        let Self {
            mut sink,
            source,
            interval,
        } = self;
        info!(
            frame_len = source.encoder.frame_len(),
            interval_ms = interval.as_millis() as u64,
            "Frame transport started"
        );

        let mut sent: u64 = 0;
        loop {
            let frame = source.next_frame();
            let (returned, result) = tokio::task::spawn_blocking(move || {
                let result = sink.write_frame(&frame);
                (sink, result)
            })
            .await?;
            sink = returned;
            if let Err(e) = result {
                warn!(error = %e, sent, "Device write failed");
                return Err(TransportError::Device(e));
            }

            sent += 1;
            if sent % 1000 == 0 {
                debug!(sent, "Frames written");
            }
            tokio::time::sleep(interval).await;
        }
    }
}
