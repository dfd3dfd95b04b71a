// Graceful shutdown signalling

use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// Handed to whoever decides to stop the engine (signal handler, CLI, tests)
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

/// Observed by the engine at its suspension points
#[derive(Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
    _owned_tx: Option<Arc<watch::Sender<bool>>>,
}

pub fn shutdown_channel() -> (ShutdownHandle, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (
        ShutdownHandle { tx: Arc::new(tx) },
        ShutdownSignal { rx, _owned_tx: None },
    )
}

impl ShutdownHandle {
    pub fn initiate_shutdown(&self) {
        if !*self.tx.borrow() {
            info!("🛑 Graceful shutdown initiated");
        }
        self.tx.send_replace(true);
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.tx.borrow()
    }
}

impl ShutdownSignal {
    /// A signal that never fires
    pub fn never() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            rx,
            _owned_tx: Some(Arc::new(tx)),
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown is initiated. Pending forever if the handle is
    /// dropped without signalling.
    pub async fn recv(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}
