use crate::runtime::config::WatcherConfig;
use crate::watcher::poller::{Collaborators, Watcher};
use anyhow::Result;
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Coordinates the watcher lifecycle and handles OS signals for graceful shutdowns.
pub struct Runner {
    watcher: Watcher,
    shutdown: CancellationToken,
    started: bool,
}

impl Runner {
    /// Creates a new runner and wires a root [`CancellationToken`] that
    /// propagates through the entire pipeline (poll loop, recorder, metrics).
    pub fn new(config: WatcherConfig, collaborators: Collaborators) -> Self {
        let shutdown = CancellationToken::new();
        let watcher = Watcher::with_cancellation_token(config, collaborators, shutdown.clone());
        Self {
            watcher,
            shutdown,
            started: false,
        }
    }

    /// Returns a clone of the root shutdown token so external callers can
    /// integrate with their own signal handlers or cancellation strategies.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn watcher(&self) -> &Watcher {
        &self.watcher
    }

    /// Starts the underlying watcher pipeline.
    pub async fn start(&mut self) -> Result<()> {
        if self.started {
            return Ok(());
        }

        self.watcher.start().await?;
        self.started = true;
        Ok(())
    }

    /// Stops the pipeline gracefully by cancelling the root token and
    /// delegating to the watcher.
    pub async fn stop(&mut self) -> Result<()> {
        if !self.started {
            return Ok(());
        }

        self.shutdown.cancel();
        self.watcher.stop().await?;
        self.started = false;
        self.reinitialize_shutdown_token();
        Ok(())
    }

    /// Runs until a Ctrl-C (SIGINT) is received or the shutdown token is
    /// cancelled elsewhere.
    pub async fn run_until_ctrl_c(&mut self) -> Result<()> {
        self.start().await?;
        tracing::info!("runner started; waiting for Ctrl-C (SIGINT) to initiate shutdown");

        tokio::select! {
            _ = signal::ctrl_c() => {
                tracing::info!("Ctrl-C received; shutting down runner");
            }
            _ = self.shutdown.cancelled() => {
                tracing::info!("runner shutdown token cancelled");
            }
        }

        self.shutdown.cancel();
        self.watcher.stop().await?;
        self.started = false;
        self.reinitialize_shutdown_token();
        Ok(())
    }

    fn reinitialize_shutdown_token(&mut self) {
        self.shutdown = CancellationToken::new();
        self.watcher.replace_shutdown_root(self.shutdown.clone());
    }
}
