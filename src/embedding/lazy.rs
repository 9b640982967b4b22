/// One-time model initialization shared across requests
use std::sync::{Arc, Mutex};

type Loader<T, E> = Box<dyn Fn() -> Result<T, E> + Send + Sync>;

/// A model handle loaded on first use.
///
/// The slot mutex is held while loading, so concurrent first callers wait for
/// a single load instead of racing. A failed load leaves the slot empty and the
/// next caller retries.
pub struct LazyModel<T, E> {
    name: String,
    loader: Loader<T, E>,
    slot: Mutex<Option<Arc<T>>>,
}

impl<T, E> LazyModel<T, E> {
    pub fn new(
        name: impl Into<String>,
        loader: impl Fn() -> Result<T, E> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            loader: Box::new(loader),
            slot: Mutex::new(None),
        }
    }

    /// Get the loaded model, loading it if this is the first call
    pub fn get(&self) -> Result<Arc<T>, E> {
        // The slot only ever holds a fully built model, so a poisoned lock is still usable.
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(model) = slot.as_ref() {
            return Ok(Arc::clone(model));
        }

        tracing::info!("Loading model: {}", self.name);
        let model = Arc::new((self.loader)()?);
        *slot = Some(Arc::clone(&model));
        Ok(model)
    }

    pub fn is_loaded(&self) -> bool {
        self.slot
            .lock()
            .map(|slot| slot.is_some())
            .unwrap_or(false)
    }
}
