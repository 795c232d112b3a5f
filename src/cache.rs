//! Classifier cache
//!
//! Loading a classifier is expensive, so loaded instances are shared
//! process-wide, keyed by (variant, device). Each key has its own slot
//! lock, so concurrent callers of the same key trigger exactly one load
//! while other keys proceed independently. Cached classifiers are handed
//! out behind a mutex; configure-then-predict is serialized per entry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::config::{ExecutionDevice, ModelVariant};
use crate::error::PipelineError;
use crate::model::{ClassifierLoader, StepClassifier};

/// A loaded classifier shared between callers.
pub type SharedClassifier = Arc<Mutex<Box<dyn StepClassifier>>>;

type CacheKey = (ModelVariant, ExecutionDevice);
type Slot = Arc<Mutex<Option<SharedClassifier>>>;

pub(crate) fn lock_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct ClassifierCache {
    loader: Box<dyn ClassifierLoader>,
    slots: Mutex<HashMap<CacheKey, Slot>>,
}

impl ClassifierCache {
    pub fn new(loader: Box<dyn ClassifierLoader>) -> Self {
        ClassifierCache {
            loader,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached classifier for the key, loading it on first use.
    /// A failed load leaves the slot empty, so a later call retries.
    pub fn get_or_load(
        &self,
        variant: ModelVariant,
        device: ExecutionDevice,
    ) -> Result<SharedClassifier, PipelineError> {
        let slot = {
            let mut slots = lock_recover(&self.slots);
            slots.entry((variant, device)).or_default().clone()
        };
        // slot lock held across the load: one loader per key at a time
        let mut entry = lock_recover(&slot);
        if let Some(classifier) = entry.as_ref() {
            return Ok(classifier.clone());
        }
        log::debug!(
            "loading {} classifier on {}",
            variant.as_str(),
            device.as_str()
        );
        let loaded = self.loader.load(variant, device).map_err(|e| {
            PipelineError::ModelLoad {
                variant: variant.as_str().to_string(),
                reason: e.to_string(),
            }
        })?;
        let shared: SharedClassifier = Arc::new(Mutex::new(loaded));
        *entry = Some(shared.clone());
        Ok(shared)
    }

    /// Drops the cached entry for one key. Outstanding handles stay valid.
    pub fn invalidate(&self, variant: ModelVariant, device: ExecutionDevice) {
        lock_recover(&self.slots).remove(&(variant, device));
    }

    /// Drops every cached entry.
    pub fn clear(&self) {
        lock_recover(&self.slots).clear();
    }

    /// Number of keys with a loaded classifier.
    pub fn loaded(&self) -> usize {
        lock_recover(&self.slots)
            .values()
            .filter(|slot| lock_recover(slot).is_some())
            .count()
    }
}
