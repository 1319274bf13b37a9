use crate::config::PowerConfig;
use crate::request::PowerAction;

/// Privileged host action fired at the end of a countdown.
pub trait PowerControl {
    fn invoke(&self, action: PowerAction);
}

/// Runs the configured host command without waiting for it.
pub struct SystemPower {
    config: PowerConfig,
}

impl SystemPower {
    pub fn new(config: PowerConfig) -> Self {
        Self { config }
    }

    fn command(&self, action: PowerAction) -> &[String] {
        match action {
            PowerAction::Shutdown => &self.config.shutdown_command,
            PowerAction::Reboot => &self.config.reboot_command,
        }
    }
}

impl PowerControl for SystemPower {
    fn invoke(&self, action: PowerAction) {
        let Some((program, args)) = self.command(action).split_first() else {
            tracing::error!(?action, "No command configured");
            return;
        };

        tracing::warn!(?action, %program, ?args, "Invoking power action");
        // The child is reaped by tokio; success is not observable from here.
        if let Err(e) = tokio::process::Command::new(program).args(args).spawn() {
            tracing::error!(?action, error = %e, "Failed to spawn power command");
        }
    }
}
