use anyhow::{Context, Result};
use std::future::Future;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Receiving half of a service shutdown request. Resolves when shutdown is
/// requested or the handle is dropped.
pub type ShutdownSignal = oneshot::Receiver<()>;

/// Owns a background loop and the channel used to stop it.
#[derive(Debug)]
pub struct ServiceHandle {
    name: &'static str,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<Result<()>>>,
}

impl ServiceHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Signals the loop and waits for it to return. Yields the loop's own
    /// result so a loop that already exited with an error reports it here.
    pub async fn shutdown(&mut self) -> Result<()> {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
        match self.task.take() {
            Some(task) => task
                .await
                .with_context(|| format!("{} task panicked or was cancelled", self.name))?,
            None => Ok(()),
        }
    }
}

/// Spawns `run` on the current Tokio runtime with a fresh shutdown signal.
pub fn spawn_service<F, Fut>(name: &'static str, run: F) -> Result<ServiceHandle>
where
    F: FnOnce(ShutdownSignal) -> Fut,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let handle = tokio::runtime::Handle::try_current()
        .with_context(|| format!("{name} requires an active Tokio runtime"))?;
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let task = handle.spawn(run(shutdown_rx));
    tracing::info!(service = name, "service started");
    Ok(ServiceHandle {
        name,
        shutdown_tx: Some(shutdown_tx),
        task: Some(task),
    })
}

/// Sleeps for `duration` unless shutdown arrives first. Returns true on shutdown.
pub(crate) async fn sleep_or_shutdown(
    duration: std::time::Duration,
    shutdown_rx: &mut ShutdownSignal,
) -> bool {
    tokio::select! {
        _ = shutdown_rx => true,
        _ = tokio::time::sleep(duration) => false,
    }
}
