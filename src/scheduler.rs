//! Owns the active animation and the tasks that tick it.
//!
//! ```text
//!   control listener ──SchedulerCommand──▶ ModeScheduler
//!                                            │ primary: ScheduledTask
//!                                            │ rotation: RotationSlot ──▶ sub-mode task
//!                                            ▼
//!                                      RasterSurface ◀── FrameTransport (read only)
//! ```
//!
//! Everything here runs on one `LocalSet`, so a tick always completes before
//! any other task can observe the surface.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::catalog::Catalog;
use crate::modes::{self, Ball, Countdown, Mode, Plasma, ScrollText, SpriteAnimation};
use crate::power::PowerControl;
use crate::request::{ModeRequest, RequestError};
use crate::surface::SharedSurface;

#[derive(Debug, Error)]
pub enum SpriteError {
    #[error("failed to load sprite strip {path:?}: {source}")]
    Image {
        path: PathBuf,
        source: image::ImageError,
    },

    #[error("sprite loader task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// A periodic activity running on the local set.
///
/// Dropping or cancelling the task aborts it. An aborted task that is waiting
/// on its timer is dropped without being polled again, so a tick that was
/// already due when the cancellation happened never runs.
pub struct ScheduledTask {
    label: String,
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    pub fn spawn<F>(label: impl Into<String>, future: F) -> Self
    where
        F: Future<Output = ()> + 'static,
    {
        Self {
            label: label.into(),
            handle: tokio::task::spawn_local(future),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn cancel(self) {
        debug!(task = %self.label, "Cancelling task");
        drop(self);
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Sub-mode task owned by a rotation supervisor but cancellable by the scheduler.
pub type RotationSlot = Rc<RefCell<Option<ScheduledTask>>>;

/// Ticks `mode` at its own period until it finishes or the task is aborted.
pub async fn drive(mut mode: Box<dyn Mode>, surface: SharedSurface) {
    let mut ticker = time::interval(mode.period());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        mode.tick(&mut surface.borrow_mut());
        if mode.finished() {
            debug!(mode = mode.name(), "Mode finished");
            break;
        }
    }
}

/// Entry in the rotation pool.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RotationEntry {
    Sprite(String),
    Plasma,
}

impl RotationEntry {
    fn label(&self) -> String {
        match self {
            Self::Sprite(name) => format!("image:{name}"),
            Self::Plasma => "plasma".to_string(),
        }
    }
}

/// Every catalog animation, then plasma.
pub fn rotation_pool(catalog: &Catalog) -> Vec<RotationEntry> {
    catalog
        .names()
        .map(|name| RotationEntry::Sprite(name.to_string()))
        .chain(std::iter::once(RotationEntry::Plasma))
        .collect()
}

/// Uniform pick from `0..len` that never repeats `previous` when `len > 1`.
pub fn pick_next<R: Rng + ?Sized>(len: usize, previous: Option<usize>, rng: &mut R) -> Option<usize> {
    match (len, previous) {
        (0, _) => None,
        (1, _) => Some(0),
        (len, Some(previous)) if previous < len => {
            let pick = rng.gen_range(0..len - 1);
            Some(if pick >= previous { pick + 1 } else { pick })
        }
        (len, _) => Some(rng.gen_range(0..len)),
    }
}

/// Shared inputs every mode task needs.
#[derive(Clone)]
pub struct ModeContext {
    surface: SharedSurface,
    catalog: Rc<Catalog>,
    image_dir: PathBuf,
    extension: String,
    power: Rc<dyn PowerControl>,
}

impl ModeContext {
    pub fn new(
        surface: SharedSurface,
        catalog: Catalog,
        image_dir: PathBuf,
        extension: impl Into<String>,
        power: Rc<dyn PowerControl>,
    ) -> Self {
        Self {
            surface,
            catalog: Rc::new(catalog),
            image_dir,
            extension: extension.into(),
            power,
        }
    }

    pub fn surface(&self) -> &SharedSurface {
        &self.surface
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    fn dimensions(&self) -> (u32, u32) {
        let surface = self.surface.borrow();
        (surface.width(), surface.height())
    }

    fn start(&self, mode: Box<dyn Mode>) -> ScheduledTask {
        let label = mode.name().to_string();
        ScheduledTask::spawn(label, drive(mode, self.surface.clone()))
    }

    fn start_sprite(&self, requested: &str) -> ScheduledTask {
        let (name, fps) = self.catalog.resolve(requested);
        let (name, fps) = (name.to_string(), fps);
        let ctx = self.clone();
        ScheduledTask::spawn(format!("image:{name}"), async move {
            let frames = match ctx.load_sprite(&name).await {
                Ok(frames) => frames,
                Err(e) if name != ctx.catalog.default_name() => {
                    warn!(animation = %name, error = %e, "Falling back to default animation");
                    let (fallback, fallback_fps) = {
                        let default = ctx.catalog.default_name();
                        (default.to_string(), ctx.catalog.fps(default).unwrap_or(1))
                    };
                    match ctx.load_sprite(&fallback).await {
                        Ok(frames) => {
                            let mode = SpriteAnimation::new(fallback, fallback_fps, frames);
                            drive(Box::new(mode), ctx.surface.clone()).await;
                            return;
                        }
                        Err(e) => {
                            error!(animation = %fallback, error = %e, "Default animation unavailable");
                            ctx.surface.borrow_mut().clear();
                            return;
                        }
                    }
                }
                Err(e) => {
                    error!(animation = %name, error = %e, "Default animation unavailable");
                    ctx.surface.borrow_mut().clear();
                    return;
                }
            };
            debug!(animation = %name, frames = frames.len(), fps, "Sprite loaded");
            let mode = SpriteAnimation::new(name, fps, frames);
            drive(Box::new(mode), ctx.surface.clone()).await;
        })
    }

    async fn load_sprite(&self, name: &str) -> Result<Vec<Vec<u8>>, SpriteError> {
        let path = self.image_dir.join(format!("{name}.{}", self.extension));
        let (width, height) = self.dimensions();
        let result = tokio::task::spawn_blocking({
            let path = path.clone();
            move || modes::load_strip(&path, width, height)
        })
        .await?;
        result.map_err(|source| SpriteError::Image { path, source })
    }

    fn start_entry(&self, entry: &RotationEntry, rng: &mut StdRng) -> ScheduledTask {
        match entry {
            RotationEntry::Sprite(name) => self.start_sprite(name),
            RotationEntry::Plasma => {
                let (width, height) = self.dimensions();
                self.start(Box::new(Plasma::new(width, height, rng)))
            }
        }
    }
}

/// Picks a new sub-mode every `interval`, never the one it just showed.
async fn supervise(ctx: ModeContext, interval: Duration, slot: RotationSlot, mut rng: StdRng) {
    let pool = rotation_pool(&ctx.catalog);
    let mut previous = None;
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let Some(index) = pick_next(pool.len(), previous, &mut rng) else {
            warn!("Rotation pool is empty");
            return;
        };
        previous = Some(index);

        let entry = &pool[index];
        info!(pick = %entry.label(), "Rotating");
        let task = ctx.start_entry(entry, &mut rng);
        let replaced = slot.borrow_mut().replace(task);
        if let Some(old) = replaced {
            old.cancel();
        }
    }
}

/// Active mode and catalog, as reported to the control surface.
#[derive(Clone, Debug, Serialize)]
pub struct SchedulerStatus {
    pub active: Option<String>,
    pub catalog: BTreeMap<String, u32>,
    pub default: String,
}

pub enum SchedulerCommand {
    Change {
        payload: Value,
        reply: oneshot::Sender<Result<(), RequestError>>,
    },
    Describe {
        reply: oneshot::Sender<SchedulerStatus>,
    },
}

pub struct ModeScheduler {
    ctx: ModeContext,
    primary: Option<ScheduledTask>,
    rotation: RotationSlot,
    rng: StdRng,
}

impl ModeScheduler {
    pub fn new(ctx: ModeContext) -> Self {
        Self::with_rng(ctx, StdRng::from_entropy())
    }

    pub fn with_rng(ctx: ModeContext, rng: StdRng) -> Self {
        Self {
            ctx,
            primary: None,
            rotation: Rc::new(RefCell::new(None)),
            rng,
        }
    }

    /// Validate `payload` and switch to the mode it names. A rejected request
    /// leaves the current mode running.
    pub fn change_mode(&mut self, payload: &Value) -> Result<(), RequestError> {
        let request = ModeRequest::from_json(payload).inspect_err(|e| {
            warn!(error = %e, "Rejected mode change");
        })?;
        self.apply(request);
        Ok(())
    }

    pub fn apply(&mut self, request: ModeRequest) {
        if let Some(task) = self.primary.take() {
            task.cancel();
        }
        if !request.is_rotation() {
            let sub = self.rotation.borrow_mut().take();
            if let Some(sub) = sub {
                sub.cancel();
            }
        }

        let (width, height) = self.ctx.dimensions();
        self.primary = match request {
            ModeRequest::Stop => {
                self.ctx.surface.borrow_mut().clear();
                None
            }
            ModeRequest::Image(name) => Some(self.ctx.start_sprite(&name)),
            ModeRequest::Ball(color) => Some(self.ctx.start(Box::new(Ball::new(color)))),
            ModeRequest::Scroll(spec) => {
                Some(self.ctx.start(Box::new(ScrollText::new(spec, width))))
            }
            ModeRequest::Plasma => Some(
                self.ctx
                    .start(Box::new(Plasma::new(width, height, &mut self.rng))),
            ),
            ModeRequest::Power(action) => Some(
                self.ctx
                    .start(Box::new(Countdown::new(action, self.ctx.power.clone()))),
            ),
            ModeRequest::Rotate(interval) => {
                let rng = StdRng::from_rng(&mut self.rng).unwrap_or_else(|_| StdRng::from_entropy());
                Some(ScheduledTask::spawn(
                    "rotate",
                    supervise(self.ctx.clone(), interval, self.rotation.clone(), rng),
                ))
            }
        };

        info!(mode = ?self.active_mode(), "Mode changed");
    }

    /// Label of the mode currently drawing, `None` when idle or finished.
    pub fn active_mode(&self) -> Option<String> {
        let primary = self.primary.as_ref().filter(|task| !task.is_finished())?;
        let rotation = self.rotation.borrow();
        match rotation.as_ref() {
            Some(sub) if primary.label() == "rotate" => {
                Some(format!("rotate:{}", sub.label()))
            }
            _ => Some(primary.label().to_string()),
        }
    }

    /// Live periodic tasks, the rotation supervisor and its sub-mode included.
    pub fn active_tasks(&self) -> usize {
        let primary = self.primary.iter().filter(|t| !t.is_finished()).count();
        let sub = self
            .rotation
            .borrow()
            .iter()
            .filter(|t| !t.is_finished())
            .count();
        primary + sub
    }

    pub fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            active: self.active_mode(),
            catalog: self.ctx.catalog.entries().clone(),
            default: self.ctx.catalog.default_name().to_string(),
        }
    }

    /// Serve commands until every sender is gone.
    pub async fn run(mut self, mut commands: mpsc::Receiver<SchedulerCommand>) {
        while let Some(command) = commands.recv().await {
            match command {
                SchedulerCommand::Change { payload, reply } => {
                    let result = self.change_mode(&payload);
                    let _ = reply.send(result);
                }
                SchedulerCommand::Describe { reply } => {
                    let _ = reply.send(self.status());
                }
            }
        }
        debug!("Scheduler command channel closed");
    }
}
