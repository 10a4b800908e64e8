use super::*;

// ── Cells ─────────────────────────────────────────────────────────────────────

/// Payload of one state cell. Values are serialized individually, so adds to
/// bags, sets, and maps stay O(1) in the size of the cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum CellData {
    Value(Vec<u8>),
    Bag(Vec<Vec<u8>>),
    Set(BTreeSet<Vec<u8>>),
    Combining(Vec<u8>),
    Map(BTreeMap<Vec<u8>, Vec<u8>>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Cell {
    fingerprint: String,
    data: CellData,
}

/// Per-key state: named, typed cells grouped by [`StateNamespace`].
///
/// Cells are created lazily on first write and removed by `clear`; after a
/// clear the cell reads as empty until the next write. Each cell is bound to
/// a fingerprint of its variant and value type; accessing an existing cell
/// through an incompatible handle fails with
/// [`EngineError::StateTypeMismatch`].
///
/// The store is exclusively owned by a single key's runner; there is no
/// concurrent access and no locking.
#[derive(Debug, Default)]
pub struct StateStore {
    cells: AHashMap<(StateNamespace, String), Cell>,
}

impl StateStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every cell in `namespace`.
    pub fn clear_namespace(&mut self, namespace: &StateNamespace) {
        self.cells.retain(|(ns, _), _| ns != namespace);
    }

    /// Drop every cell scoped to `window`, including trigger-private cells.
    pub fn clear_window(&mut self, window: &TimeWindow) {
        self.cells
            .retain(|(ns, _), _| ns.window_part() != Some(*window));
    }

    /// Return `true` if no cell exists in `namespace`.
    pub fn is_namespace_empty(&self, namespace: &StateNamespace) -> bool {
        !self.cells.keys().any(|(ns, _)| ns == namespace)
    }

    /// Return `true` if the store holds no cells at all.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Number of live cells across all namespaces.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Serialize all cells in a stable order.
    ///
    /// Two snapshots with no mutation in between are byte-identical, and a
    /// store restored from a snapshot reproduces the same cells.
    pub fn snapshot(&self) -> Result<Vec<u8>> {
        let mut entries: Vec<(&(StateNamespace, String), &Cell)> = self.cells.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        Ok(bincode::serialize(&entries)?)
    }

    /// Replace the store's contents from a [`snapshot`](Self::snapshot).
    pub fn restore(&mut self, data: &[u8]) -> Result<()> {
        let entries: Vec<((StateNamespace, String), Cell)> = bincode::deserialize(data)?;
        self.cells = entries.into_iter().collect();
        Ok(())
    }

    fn cell(
        &self,
        namespace: &StateNamespace,
        id: &str,
        fingerprint: &str,
    ) -> Result<Option<&CellData>> {
        match self.cells.get(&(*namespace, id.to_string())) {
            None => Ok(None),
            Some(cell) if cell.fingerprint == fingerprint => Ok(Some(&cell.data)),
            Some(cell) => Err(EngineError::StateTypeMismatch {
                id: id.to_string(),
                stored: cell.fingerprint.clone(),
                requested: fingerprint.to_string(),
            }
            .into()),
        }
    }

    fn cell_mut(
        &mut self,
        namespace: &StateNamespace,
        id: &str,
        fingerprint: &str,
        empty: impl FnOnce() -> CellData,
    ) -> Result<&mut CellData> {
        let cell = self
            .cells
            .entry((*namespace, id.to_string()))
            .or_insert_with(|| Cell {
                fingerprint: fingerprint.to_string(),
                data: empty(),
            });
        if cell.fingerprint != fingerprint {
            return Err(EngineError::StateTypeMismatch {
                id: id.to_string(),
                stored: cell.fingerprint.clone(),
                requested: fingerprint.to_string(),
            }
            .into());
        }
        Ok(&mut cell.data)
    }

    fn remove_cell(&mut self, namespace: &StateNamespace, id: &str, fingerprint: &str) -> Result<()> {
        let key = (*namespace, id.to_string());
        if let Some(cell) = self.cells.get(&key) {
            if cell.fingerprint != fingerprint {
                return Err(EngineError::StateTypeMismatch {
                    id: id.to_string(),
                    stored: cell.fingerprint.clone(),
                    requested: fingerprint.to_string(),
                }
                .into());
            }
            self.cells.remove(&key);
        }
        Ok(())
    }
}

// ── Handles ───────────────────────────────────────────────────────────────────
//
// Handles are descriptors: they carry the cell id and value type but never
// borrow the store, so a runner can hold any number of them without
// borrow-checker conflicts. State access always names the namespace
// explicitly.

/// Handle to a single-value cell.
pub struct ValueHandle<T> {
    id: &'static str,
    _marker: PhantomData<T>,
}

impl<T: StreamData> ValueHandle<T> {
    pub fn new(id: &'static str) -> Self {
        Self {
            id,
            _marker: PhantomData,
        }
    }

    fn fingerprint() -> String {
        format!("value<{}>", std::any::type_name::<T>())
    }

    pub fn read(&self, store: &StateStore, ns: &StateNamespace) -> Result<Option<T>> {
        match store.cell(ns, self.id, &Self::fingerprint())? {
            Some(CellData::Value(bytes)) => Ok(Some(bincode::deserialize(bytes)?)),
            Some(_) | None => Ok(None),
        }
    }

    pub fn write(&self, store: &mut StateStore, ns: &StateNamespace, value: &T) -> Result<()> {
        let bytes = bincode::serialize(value)?;
        match store.cell_mut(ns, self.id, &Self::fingerprint(), || {
            CellData::Value(Vec::new())
        })? {
            CellData::Value(slot) => *slot = bytes,
            _ => {}
        }
        Ok(())
    }

    pub fn clear(&self, store: &mut StateStore, ns: &StateNamespace) -> Result<()> {
        store.remove_cell(ns, self.id, &Self::fingerprint())
    }

    pub fn is_empty(&self, store: &StateStore, ns: &StateNamespace) -> Result<bool> {
        Ok(store.cell(ns, self.id, &Self::fingerprint())?.is_none())
    }
}

/// Handle to an append-only bag cell. Reads preserve insertion order.
pub struct BagHandle<T> {
    id: &'static str,
    _marker: PhantomData<T>,
}

impl<T: StreamData> BagHandle<T> {
    pub fn new(id: &'static str) -> Self {
        Self {
            id,
            _marker: PhantomData,
        }
    }

    fn fingerprint() -> String {
        format!("bag<{}>", std::any::type_name::<T>())
    }

    pub fn add(&self, store: &mut StateStore, ns: &StateNamespace, value: &T) -> Result<()> {
        let bytes = bincode::serialize(value)?;
        match store.cell_mut(ns, self.id, &Self::fingerprint(), || {
            CellData::Bag(Vec::new())
        })? {
            CellData::Bag(elements) => elements.push(bytes),
            _ => {}
        }
        Ok(())
    }

    pub fn read(&self, store: &StateStore, ns: &StateNamespace) -> Result<Vec<T>> {
        match store.cell(ns, self.id, &Self::fingerprint())? {
            Some(CellData::Bag(elements)) => {
                let mut out = Vec::with_capacity(elements.len());
                for bytes in elements {
                    out.push(bincode::deserialize(bytes)?);
                }
                Ok(out)
            }
            Some(_) | None => Ok(Vec::new()),
        }
    }

    pub fn clear(&self, store: &mut StateStore, ns: &StateNamespace) -> Result<()> {
        store.remove_cell(ns, self.id, &Self::fingerprint())
    }

    pub fn is_empty(&self, store: &StateStore, ns: &StateNamespace) -> Result<bool> {
        match store.cell(ns, self.id, &Self::fingerprint())? {
            Some(CellData::Bag(elements)) => Ok(elements.is_empty()),
            Some(_) | None => Ok(true),
        }
    }
}

/// Handle to a set cell. Membership is by encoded value.
pub struct SetHandle<T> {
    id: &'static str,
    _marker: PhantomData<T>,
}

impl<T: StreamData> SetHandle<T> {
    pub fn new(id: &'static str) -> Self {
        Self {
            id,
            _marker: PhantomData,
        }
    }

    fn fingerprint() -> String {
        format!("set<{}>", std::any::type_name::<T>())
    }

    pub fn add(&self, store: &mut StateStore, ns: &StateNamespace, value: &T) -> Result<()> {
        let bytes = bincode::serialize(value)?;
        match store.cell_mut(ns, self.id, &Self::fingerprint(), || {
            CellData::Set(BTreeSet::new())
        })? {
            CellData::Set(elements) => {
                elements.insert(bytes);
            }
            _ => {}
        }
        Ok(())
    }

    pub fn contains(&self, store: &StateStore, ns: &StateNamespace, value: &T) -> Result<bool> {
        let bytes = bincode::serialize(value)?;
        match store.cell(ns, self.id, &Self::fingerprint())? {
            Some(CellData::Set(elements)) => Ok(elements.contains(&bytes)),
            Some(_) | None => Ok(false),
        }
    }

    pub fn remove(&self, store: &mut StateStore, ns: &StateNamespace, value: &T) -> Result<()> {
        let bytes = bincode::serialize(value)?;
        if let CellData::Set(elements) = store.cell_mut(ns, self.id, &Self::fingerprint(), || {
            CellData::Set(BTreeSet::new())
        })? {
            elements.remove(&bytes);
        }
        Ok(())
    }

    /// Read all members, in encoded-byte order.
    pub fn read(&self, store: &StateStore, ns: &StateNamespace) -> Result<Vec<T>> {
        match store.cell(ns, self.id, &Self::fingerprint())? {
            Some(CellData::Set(elements)) => {
                let mut out = Vec::with_capacity(elements.len());
                for bytes in elements {
                    out.push(bincode::deserialize(bytes)?);
                }
                Ok(out)
            }
            Some(_) | None => Ok(Vec::new()),
        }
    }

    pub fn clear(&self, store: &mut StateStore, ns: &StateNamespace) -> Result<()> {
        store.remove_cell(ns, self.id, &Self::fingerprint())
    }

    pub fn is_empty(&self, store: &StateStore, ns: &StateNamespace) -> Result<bool> {
        match store.cell(ns, self.id, &Self::fingerprint())? {
            Some(CellData::Set(elements)) => Ok(elements.is_empty()),
            Some(_) | None => Ok(true),
        }
    }
}

/// Handle to a combining cell: stores only the accumulator of a
/// [`CombineFn`].
pub struct CombiningHandle<IN, ACC, OUT> {
    id: &'static str,
    _marker: PhantomData<(IN, ACC, OUT)>,
}

impl<IN, ACC: StreamData, OUT> CombiningHandle<IN, ACC, OUT> {
    pub fn new(id: &'static str) -> Self {
        Self {
            id,
            _marker: PhantomData,
        }
    }

    fn fingerprint() -> String {
        format!("combining<{}>", std::any::type_name::<ACC>())
    }

    /// Fold `input` into the stored accumulator, creating it if absent.
    pub fn add(
        &self,
        store: &mut StateStore,
        ns: &StateNamespace,
        combine_fn: &dyn CombineFn<IN, ACC, OUT>,
        input: &IN,
    ) -> Result<()> {
        let mut acc = self
            .read_accumulator(store, ns)?
            .unwrap_or_else(|| combine_fn.create_accumulator());
        combine_fn.add(&mut acc, input);
        self.write_accumulator(store, ns, &acc)
    }

    /// Extract the output from the stored accumulator; an absent cell reads
    /// as the output of a fresh accumulator.
    pub fn read(
        &self,
        store: &StateStore,
        ns: &StateNamespace,
        combine_fn: &dyn CombineFn<IN, ACC, OUT>,
    ) -> Result<OUT> {
        let acc = self
            .read_accumulator(store, ns)?
            .unwrap_or_else(|| combine_fn.create_accumulator());
        Ok(combine_fn.get_result(acc))
    }

    pub fn read_accumulator(
        &self,
        store: &StateStore,
        ns: &StateNamespace,
    ) -> Result<Option<ACC>> {
        match store.cell(ns, self.id, &Self::fingerprint())? {
            Some(CellData::Combining(bytes)) => Ok(Some(bincode::deserialize(bytes)?)),
            Some(_) | None => Ok(None),
        }
    }

    pub fn write_accumulator(
        &self,
        store: &mut StateStore,
        ns: &StateNamespace,
        acc: &ACC,
    ) -> Result<()> {
        let bytes = bincode::serialize(acc)?;
        match store.cell_mut(ns, self.id, &Self::fingerprint(), || {
            CellData::Combining(Vec::new())
        })? {
            CellData::Combining(slot) => *slot = bytes,
            _ => {}
        }
        Ok(())
    }

    /// Accumulate every source namespace's accumulator into the target, then
    /// clear the sources. Sources without a cell contribute nothing.
    pub fn merge_namespaces(
        &self,
        store: &mut StateStore,
        combine_fn: &dyn CombineFn<IN, ACC, OUT>,
        sources: &[StateNamespace],
        target: &StateNamespace,
    ) -> Result<()> {
        let mut merged: Option<ACC> = self.read_accumulator(store, target)?;
        for source in sources {
            if source == target {
                continue;
            }
            if let Some(acc) = self.read_accumulator(store, source)? {
                match merged.as_mut() {
                    Some(m) => combine_fn.merge(m, acc),
                    None => merged = Some(acc),
                }
            }
            self.clear(store, source)?;
        }
        if let Some(acc) = merged {
            self.write_accumulator(store, target, &acc)?;
        }
        Ok(())
    }

    pub fn clear(&self, store: &mut StateStore, ns: &StateNamespace) -> Result<()> {
        store.remove_cell(ns, self.id, &Self::fingerprint())
    }

    pub fn is_empty(&self, store: &StateStore, ns: &StateNamespace) -> Result<bool> {
        Ok(store.cell(ns, self.id, &Self::fingerprint())?.is_none())
    }
}

/// Handle to a map cell. Keys and values are encoded individually.
pub struct MapHandle<K, V> {
    id: &'static str,
    _marker: PhantomData<(K, V)>,
}

impl<K: StreamData, V: StreamData> MapHandle<K, V> {
    pub fn new(id: &'static str) -> Self {
        Self {
            id,
            _marker: PhantomData,
        }
    }

    fn fingerprint() -> String {
        format!(
            "map<{}, {}>",
            std::any::type_name::<K>(),
            std::any::type_name::<V>()
        )
    }

    pub fn put(
        &self,
        store: &mut StateStore,
        ns: &StateNamespace,
        key: &K,
        value: &V,
    ) -> Result<()> {
        let key_bytes = bincode::serialize(key)?;
        let value_bytes = bincode::serialize(value)?;
        match store.cell_mut(ns, self.id, &Self::fingerprint(), || {
            CellData::Map(BTreeMap::new())
        })? {
            CellData::Map(entries) => {
                entries.insert(key_bytes, value_bytes);
            }
            _ => {}
        }
        Ok(())
    }

    pub fn get(&self, store: &StateStore, ns: &StateNamespace, key: &K) -> Result<Option<V>> {
        let key_bytes = bincode::serialize(key)?;
        match store.cell(ns, self.id, &Self::fingerprint())? {
            Some(CellData::Map(entries)) => match entries.get(&key_bytes) {
                Some(bytes) => Ok(Some(bincode::deserialize(bytes)?)),
                None => Ok(None),
            },
            Some(_) | None => Ok(None),
        }
    }

    pub fn remove(
        &self,
        store: &mut StateStore,
        ns: &StateNamespace,
        key: &K,
    ) -> Result<Option<V>> {
        let key_bytes = bincode::serialize(key)?;
        match store.cell_mut(ns, self.id, &Self::fingerprint(), || {
            CellData::Map(BTreeMap::new())
        })? {
            CellData::Map(entries) => match entries.remove(&key_bytes) {
                Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
                None => Ok(None),
            },
            _ => Ok(None),
        }
    }

    /// Read all entries, in encoded-key order.
    pub fn entries(&self, store: &StateStore, ns: &StateNamespace) -> Result<Vec<(K, V)>> {
        match store.cell(ns, self.id, &Self::fingerprint())? {
            Some(CellData::Map(entries)) => {
                let mut out = Vec::with_capacity(entries.len());
                for (key_bytes, value_bytes) in entries {
                    out.push((
                        bincode::deserialize(key_bytes)?,
                        bincode::deserialize(value_bytes)?,
                    ));
                }
                Ok(out)
            }
            Some(_) | None => Ok(Vec::new()),
        }
    }

    pub fn clear(&self, store: &mut StateStore, ns: &StateNamespace) -> Result<()> {
        store.remove_cell(ns, self.id, &Self::fingerprint())
    }

    pub fn is_empty(&self, store: &StateStore, ns: &StateNamespace) -> Result<bool> {
        match store.cell(ns, self.id, &Self::fingerprint())? {
            Some(CellData::Map(entries)) => Ok(entries.is_empty()),
            Some(_) | None => Ok(true),
        }
    }
}
