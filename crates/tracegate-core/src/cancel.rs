use std::sync::Arc;

use tokio::sync::watch;

/// Process-wide cancellation for pending requests.
///
/// Each call captures the current generation; `cancel_all` bumps it, which
/// settles every token captured before the bump.
#[derive(Clone)]
pub struct CancellationSignal {
    tx: Arc<watch::Sender<u64>>,
}

impl Default for CancellationSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationSignal {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { tx: Arc::new(tx) }
    }

    #[must_use]
    pub fn token(&self) -> CancelToken {
        let rx = self.tx.subscribe();
        let generation = *rx.borrow();
        CancelToken { rx, generation }
    }

    pub fn cancel_all(&self) {
        self.tx.send_modify(|generation| *generation += 1);
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        *self.tx.borrow()
    }
}

pub struct CancelToken {
    rx: watch::Receiver<u64>,
    generation: u64,
}

impl CancelToken {
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow() != self.generation
    }

    /// Resolves once the signal has moved past this token's generation.
    pub async fn cancelled(&mut self) {
        loop {
            if self.is_cancelled() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}
