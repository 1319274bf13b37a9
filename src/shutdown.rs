//! Process stop requests: ctrl-c from a terminal, SIGTERM from a service manager.

use tokio::signal::unix::{signal, Signal, SignalKind};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopRequest {
    Interrupt,
    Terminate,
}

pub struct ShutdownSignals {
    terminate: Signal,
}

impl ShutdownSignals {
    /// Install the handlers. Signals arriving after this call are not lost,
    /// even before [`Self::recv`] is polled.
    pub fn install() -> std::io::Result<Self> {
        Ok(Self {
            terminate: signal(SignalKind::terminate())?,
        })
    }

    pub async fn recv(&mut self) -> StopRequest {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => StopRequest::Interrupt,
            _ = self.terminate.recv() => StopRequest::Terminate,
        }
    }
}
