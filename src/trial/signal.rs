//! One-shot convergence signal shared between the waiter and the fault loop.
//!
//! The waiter owns the write side and flips it to `true` once the new OSDs are
//! running; the fault loop holds a listener and stops killing as soon as it
//! observes the flip. Backed by a `watch` channel so listeners can also sleep
//! until the flip instead of polling.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use tokio::sync::watch;

/// Write side of the "convergence reached" flag.
#[derive(Debug, Clone)]
pub struct ConvergenceSignal {
    tx: Arc<watch::Sender<bool>>,
    transitions: Arc<AtomicU32>,
}

impl Default for ConvergenceSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl ConvergenceSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            transitions: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Clear the flag at the start of a trial.
    pub fn reset(&self) {
        self.tx.send_replace(false);
        self.transitions.store(0, Ordering::SeqCst);
    }

    /// Flip the flag to `true`. Returns `false` if it was already set.
    pub fn mark_reached(&self) -> bool {
        let flipped = self.tx.send_if_modified(|reached| {
            if *reached {
                false
            } else {
                *reached = true;
                true
            }
        });
        if flipped {
            self.transitions.fetch_add(1, Ordering::SeqCst);
        }
        flipped
    }

    /// Unconditionally set the flag after the trial branch completes.
    ///
    /// Returns `true` when the flag was still unset, i.e. the waiter never
    /// reported convergence and the value is being forced.
    pub fn force_reached(&self) -> bool {
        !self.tx.send_replace(true)
    }

    pub fn is_reached(&self) -> bool {
        *self.tx.borrow()
    }

    /// Number of false→true flips made through `mark_reached` since the last reset.
    pub fn transitions(&self) -> u32 {
        self.transitions.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> ConvergenceListener {
        ConvergenceListener {
            rx: self.tx.subscribe(),
        }
    }
}

/// Read side handed to the fault loop.
#[derive(Debug, Clone)]
pub struct ConvergenceListener {
    rx: watch::Receiver<bool>,
}

impl ConvergenceListener {
    pub fn is_reached(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once the flag is set. Never resolves if the signal is dropped unset.
    pub async fn reached(&mut self) {
        if self.rx.wait_for(|reached| *reached).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
