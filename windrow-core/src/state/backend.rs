use super::*;

/// Host-side factory for per-key state.
///
/// A backend hands out one [`StateStore`] per key and accepts the key's
/// snapshot back when the runner persists. The snapshot layout is opaque;
/// the only requirement is that `state_for` after `persist` reproduces the
/// same cells.
pub trait StateBackend: Send {
    /// Build the state store for `key`, restored from a prior snapshot if
    /// one exists.
    fn state_for(&self, key: &[u8]) -> Result<StateStore>;

    /// Persist `key`'s snapshot.
    fn persist(&mut self, key: &[u8], snapshot: Vec<u8>) -> Result<()>;
}

/// Keeps snapshots in a map. The default backend for tests and
/// single-process hosts.
#[derive(Debug, Default)]
pub struct InMemoryStateBackend {
    snapshots: AHashMap<Vec<u8>, Vec<u8>>,
}

impl InMemoryStateBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateBackend for InMemoryStateBackend {
    fn state_for(&self, key: &[u8]) -> Result<StateStore> {
        let mut store = StateStore::new();
        if let Some(snapshot) = self.snapshots.get(key) {
            store.restore(snapshot)?;
        }
        Ok(store)
    }

    fn persist(&mut self, key: &[u8], snapshot: Vec<u8>) -> Result<()> {
        self.snapshots.insert(key.to_vec(), snapshot);
        Ok(())
    }
}
