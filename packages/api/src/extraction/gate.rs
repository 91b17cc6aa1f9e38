use tracing::Instrument;

use std::{
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

#[derive(Debug, thiserror::Error)]
pub enum AdmissionError<E> {
    #[error("extraction resource currently in use")]
    Busy,
    #[error(transparent)]
    Failed(E),
    #[error("extraction task ended abnormally: {0}")]
    Aborted(String),
}

/// Idle/Extracting state shared by every clone.
#[derive(Debug, Clone, Default)]
pub struct ExtractionGate {
    extracting: Arc<AtomicBool>,
}

/// Holds the gate closed until dropped.
#[derive(Debug)]
#[must_use = "the gate reopens as soon as the permit is dropped"]
pub struct ExtractionPermit {
    extracting: Arc<AtomicBool>,
}

impl Drop for ExtractionPermit {
    fn drop(&mut self) {
        self.extracting.store(false, Ordering::Release);
        tracing::debug!("Extraction gate released");
    }
}

impl ExtractionGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idle -> Extracting, or `None` if another extraction holds the gate.
    pub fn try_acquire(&self) -> Option<ExtractionPermit> {
        self.extracting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| ExtractionPermit {
                extracting: Arc::clone(&self.extracting),
            })
    }

    pub fn is_extracting(&self) -> bool {
        self.extracting.load(Ordering::Acquire)
    }

    /// Runs `call` on its own task while holding the gate.
    ///
    /// The task owns the permit, so the gate stays closed until the call itself
    /// finishes even if the caller stops waiting for it.
    pub async fn try_acquire_and_run<F, Fut, T, E>(&self, call: F) -> Result<T, AdmissionError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let Some(permit) = self.try_acquire() else {
            tracing::info!("Extraction rejected, gate is busy");
            return Err(AdmissionError::Busy);
        };

        let job = call();
        let task = tokio::spawn(
            async move {
                let _permit = permit;
                job.await
            }
            .in_current_span(),
        );

        match task.await {
            Ok(result) => result.map_err(AdmissionError::Failed),
            Err(err) => {
                tracing::error!(error = %err, "Extraction task did not complete");
                Err(AdmissionError::Aborted(err.to_string()))
            }
        }
    }
}
