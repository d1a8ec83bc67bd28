/// Process-wide holder of the current [`Snapshot`].
///
/// Readers take one `Arc` per request and never block on a build. Builds and
/// reloads are serialized by a mutex; the finished snapshot is published by
/// swapping the pointer under a short write lock.
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Instant;

use crate::config::ConfigSource;
use crate::error::ConfigurationError;
use crate::model::Snapshot;

pub struct ContextCache {
    source: Arc<dyn ConfigSource>,
    published: RwLock<Option<Arc<Snapshot>>>,
    build: Mutex<BuildOutcome>,
    /// Completed build attempts, successful or not.
    attempts: AtomicU64,
}

#[derive(Default)]
struct BuildOutcome {
    last_error: Option<ConfigurationError>,
}

impl ContextCache {
    pub fn new(source: Arc<dyn ConfigSource>) -> Self {
        Self {
            source,
            published: RwLock::new(None),
            build: Mutex::new(BuildOutcome::default()),
            attempts: AtomicU64::new(0),
        }
    }

    /// The published snapshot, if any, without building.
    pub fn current(&self) -> Option<Arc<Snapshot>> {
        self.published
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The published snapshot, building the first one if needed.
    ///
    /// Callers that arrive while a build is running wait for it and share
    /// its outcome, including its error. A failed first build leaves the
    /// cache empty so a later call tries again.
    pub fn get_or_build(&self) -> Result<Arc<Snapshot>, ConfigurationError> {
        if let Some(snapshot) = self.current() {
            return Ok(snapshot);
        }

        let seen = self.attempts.load(Ordering::SeqCst);
        let mut outcome = self.build.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(snapshot) = self.current() {
            return Ok(snapshot);
        }
        if self.attempts.load(Ordering::SeqCst) != seen {
            if let Some(err) = &outcome.last_error {
                return Err(err.clone());
            }
        }

        self.build_and_publish(&mut outcome)
    }

    /// Build a fresh snapshot from the source and publish it. On failure the
    /// published snapshot stays as it was.
    pub fn reload(&self) -> Result<Arc<Snapshot>, ConfigurationError> {
        let mut outcome = self.build.lock().unwrap_or_else(PoisonError::into_inner);
        self.build_and_publish(&mut outcome)
    }

    fn build_and_publish(
        &self,
        outcome: &mut BuildOutcome,
    ) -> Result<Arc<Snapshot>, ConfigurationError> {
        let version = self.current().map_or(1, |s| s.version() + 1);
        let start = Instant::now();

        let built = self
            .source
            .load()
            .and_then(|config| Snapshot::build(&config, version));
        self.attempts.fetch_add(1, Ordering::SeqCst);

        match built {
            Ok(snapshot) => {
                let snapshot = Arc::new(snapshot);
                *self.published.write().unwrap_or_else(PoisonError::into_inner) =
                    Some(Arc::clone(&snapshot));
                outcome.last_error = None;
                tracing::info!(
                    version,
                    source = %self.source.describe(),
                    entities = snapshot.registry().entities().len(),
                    elapsed = ?start.elapsed(),
                    "published query model snapshot"
                );
                Ok(snapshot)
            }
            Err(err) => {
                tracing::warn!(
                    source = %self.source.describe(),
                    kept_version = self.current().map(|s| s.version()),
                    error = %err,
                    "query model build failed"
                );
                outcome.last_error = Some(err.clone());
                Err(err)
            }
        }
    }
}
