//! Variable access - handle-based open/read/close over stored and derived variables

use crate::derived::DerivedRegistry;
use crate::error::{DcError, Result};
use crate::storage::RawCollection;
use crate::utils::{check_region, reversed, storage_region};
use ndarray::ArrayD;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Arena of per-open state keyed by stable integer tokens
///
/// Tokens are never reused within one table. Insertions and removals are
/// serialized; lookups hand out clones so no lock is held across an await.
pub struct TokenTable<T> {
    next: AtomicU64,
    entries: Mutex<HashMap<u64, T>>,
}

impl<T> Default for TokenTable<T> {
    fn default() -> Self {
        Self {
            next: AtomicU64::new(1),
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<T> fmt::Debug for TokenTable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenTable")
            .field("open", &self.len())
            .finish()
    }
}

impl<T> TokenTable<T> {
    /// Store an entry and return its token
    pub fn insert(&self, entry: T) -> u64 {
        let token = self.next.fetch_add(1, Ordering::Relaxed);
        self.entries.lock().insert(token, entry);
        token
    }

    pub fn remove(&self, token: u64) -> Option<T> {
        self.entries.lock().remove(&token)
    }

    pub fn contains(&self, token: u64) -> bool {
        self.entries.lock().contains_key(&token)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone> TokenTable<T> {
    pub fn get(&self, token: u64) -> Option<T> {
        self.entries.lock().get(&token).cloned()
    }
}

/// Opaque handle to a variable opened for reading at one timestep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(u64);

impl Handle {
    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Which backing serviced an open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backing {
    Stored,
    Derived,
}

/// State of one open handle
#[derive(Debug, Clone)]
pub struct OpenVariable {
    /// Storage timestep after time lookup
    pub ts: usize,
    pub name: String,
    /// Token issued by the backing
    pub token: u64,
    pub backing: Backing,
}

/// Read a canonical-order region of a stored variable
///
/// The single place where canonical `[min, max]` regions are converted to
/// storage-order `(start, count)` hyperslabs and the result flipped back.
pub(crate) async fn read_storage_region(
    storage: &dyn RawCollection,
    name: &str,
    token: u64,
    min: &[usize],
    max: &[usize],
) -> Result<ArrayD<f32>> {
    let dims = reversed(&storage.spatial_dim_lens(name));
    check_region(min, max, &dims)?;

    let (start, count) = storage_region(min, max);
    let slab = storage.read(token, &start, &count).await?;
    Ok(slab.reversed_axes())
}

/// Multiplexes open handles between raw storage and the derived registry
pub struct HandleTable {
    storage: Arc<dyn RawCollection>,
    derived: Arc<DerivedRegistry>,
    /// Logical timestep to storage timestep
    time_lookup: Vec<usize>,
    open: TokenTable<OpenVariable>,
}

impl HandleTable {
    pub fn new(
        storage: Arc<dyn RawCollection>,
        derived: Arc<DerivedRegistry>,
        time_lookup: Vec<usize>,
    ) -> Self {
        Self {
            storage,
            derived,
            time_lookup,
            open: TokenTable::default(),
        }
    }

    pub fn num_time_steps(&self) -> usize {
        self.storage.num_time_steps()
    }

    /// Storage timestep backing logical timestep `ts`
    pub fn time_lookup(&self, ts: usize) -> usize {
        self.time_lookup.get(ts).copied().unwrap_or(ts)
    }

    /// Number of handles currently open
    pub fn open_handles(&self) -> usize {
        self.open.len()
    }

    /// Whether `name` has data at logical timestep `ts`
    pub fn variable_exists(&self, ts: usize, name: &str) -> bool {
        if ts >= self.num_time_steps() {
            return false;
        }
        let ts = self.time_lookup(ts);

        match self.derived.get(name) {
            Some(var) => var.exists(ts),
            None => self.storage.variable_exists_at(ts, name),
        }
    }

    /// Spatial dimension lengths of a variable in canonical order
    pub fn dim_lens(&self, name: &str) -> Option<Vec<usize>> {
        if let Some(var) = self.derived.get(name) {
            return Some(var.dim_lens());
        }
        if self.storage.variable_exists(name) {
            return Some(reversed(&self.storage.spatial_dim_lens(name)));
        }
        None
    }

    /// Open a variable for reading at logical timestep `ts`
    pub async fn open(&self, ts: usize, name: &str) -> Result<Handle> {
        let count = self.num_time_steps();
        if ts >= count {
            return Err(DcError::TimeStepOutOfRange { ts, count });
        }
        let ts = self.time_lookup(ts);

        let (token, backing) = match self.derived.get(name) {
            Some(var) => (var.open_read(ts).await?, Backing::Derived),
            None => (self.storage.open_read(ts, name).await?, Backing::Stored),
        };

        let handle = Handle(self.open.insert(OpenVariable {
            ts,
            name: name.to_string(),
            token,
            backing,
        }));
        trace!(variable = %name, ts, handle = handle.id(), ?backing, "opened variable");
        Ok(handle)
    }

    /// Read the inclusive canonical-order region `[min, max]`
    pub async fn read(&self, handle: Handle, min: &[usize], max: &[usize]) -> Result<ArrayD<f32>> {
        let entry = self
            .open
            .get(handle.id())
            .ok_or(DcError::InvalidHandle(handle.id()))?;

        match entry.backing {
            Backing::Derived => {
                let var = self
                    .derived
                    .get(&entry.name)
                    .ok_or_else(|| DcError::NotFound(entry.name.clone()))?;
                var.read_region(entry.token, min, max).await
            }
            Backing::Stored => {
                read_storage_region(self.storage.as_ref(), &entry.name, entry.token, min, max).await
            }
        }
    }

    /// Close a handle; the handle is invalid afterwards even if the backing fails
    pub async fn close(&self, handle: Handle) -> Result<()> {
        let entry = self
            .open
            .remove(handle.id())
            .ok_or(DcError::InvalidHandle(handle.id()))?;
        trace!(variable = %entry.name, handle = handle.id(), "closing variable");

        match entry.backing {
            Backing::Derived => match self.derived.get(&entry.name) {
                Some(var) => var.close_variable(entry.token).await,
                None => Err(DcError::NotFound(entry.name)),
            },
            Backing::Stored => self.storage.close(entry.token).await,
        }
    }

    /// Read the full extent of a variable at `ts`. The handle is always closed.
    pub async fn get_variable(&self, ts: usize, name: &str) -> Result<ArrayD<f32>> {
        let lens = self
            .dim_lens(name)
            .ok_or_else(|| DcError::NotFound(name.to_string()))?;
        let min = vec![0; lens.len()];
        let max: Vec<usize> = lens.iter().map(|len| len.saturating_sub(1)).collect();

        let handle = self.open(ts, name).await?;
        let data = self.read(handle, &min, &max).await;
        let closed = self.close(handle).await;

        let data = data?;
        closed?;
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::derived::Index1DCoordVar;
    use crate::storage::MemoryCollection;
    use crate::types::XType;

    fn table(time_lookup: Vec<usize>) -> HandleTable {
        let mut mc = MemoryCollection::new("Time")
            .with_dimension("Time", 2)
            .with_dimension("bottom_top", 2)
            .with_dimension("south_north", 2)
            .with_dimension("west_east", 3);
        mc.add_variable(
            "T",
            &["Time", "bottom_top", "south_north", "west_east"],
            XType::Float,
            (0..2)
                .map(|t| (0..12).map(|i| (100 * t + i) as f32).collect())
                .collect(),
        )
        .unwrap();
        let storage: Arc<dyn RawCollection> = Arc::new(mc);

        let mut derived = DerivedRegistry::default();
        derived.add(Arc::new(
            Index1DCoordVar::initialize(storage.clone(), "bottom_top").unwrap(),
        ));

        HandleTable::new(storage, Arc::new(derived), time_lookup)
    }

    #[test]
    fn test_token_table() {
        let tokens: TokenTable<&str> = TokenTable::default();
        let a = tokens.insert("a");
        let b = tokens.insert("b");
        assert_ne!(a, b);
        assert_eq!(tokens.get(a), Some("a"));
        assert_eq!(tokens.remove(a), Some("a"));
        assert_eq!(tokens.remove(a), None);
        assert!(tokens.contains(b));
        assert_eq!(tokens.len(), 1);
    }

    #[tokio::test]
    async fn test_stored_read_is_canonical_order() {
        let table = table(vec![0, 1]);
        assert_eq!(table.dim_lens("T"), Some(vec![3, 2, 2]));

        let handle = table.open(1, "T").await.unwrap();
        // x in 1..=2, y = 1, z = 0
        let region = table.read(handle, &[1, 1, 0], &[2, 1, 0]).await.unwrap();
        assert_eq!(region.shape(), &[2, 1, 1]);
        assert_eq!(region[[0, 0, 0]], 104.0);
        assert_eq!(region[[1, 0, 0]], 105.0);
        table.close(handle).await.unwrap();
        assert_eq!(table.open_handles(), 0);
    }

    #[tokio::test]
    async fn test_time_lookup_applied() {
        let table = table(vec![1, 0]);
        let data = table.get_variable(0, "T").await.unwrap();
        assert_eq!(data[[0, 0, 0]], 100.0);
        assert_eq!(table.open_handles(), 0);
    }

    #[tokio::test]
    async fn test_derived_dispatch() {
        let table = table(vec![0, 1]);
        assert_eq!(table.dim_lens("bottom_top"), Some(vec![2]));
        let data = table.get_variable(1, "bottom_top").await.unwrap();
        assert_eq!(data.iter().copied().collect::<Vec<_>>(), vec![0.0, 1.0]);
    }

    #[tokio::test]
    async fn test_out_of_range_open_creates_no_handle() {
        let table = table(vec![0, 1]);
        assert!(matches!(
            table.open(2, "T").await,
            Err(DcError::TimeStepOutOfRange { ts: 2, count: 2 })
        ));
        assert_eq!(table.open_handles(), 0);
        assert!(!table.variable_exists(2, "T"));
        assert!(table.variable_exists(1, "T"));
    }

    #[tokio::test]
    async fn test_invalid_handle() {
        let table = table(vec![0, 1]);
        let handle = table.open(0, "T").await.unwrap();
        table.close(handle).await.unwrap();
        assert!(matches!(
            table.close(handle).await,
            Err(DcError::InvalidHandle(_))
        ));
        assert!(matches!(
            table.read(handle, &[0, 0, 0], &[0, 0, 0]).await,
            Err(DcError::InvalidHandle(_))
        ));
    }

    #[tokio::test]
    async fn test_read_region_out_of_bounds() {
        let table = table(vec![0, 1]);
        let handle = table.open(0, "T").await.unwrap();
        assert!(matches!(
            table.read(handle, &[0, 0, 0], &[3, 0, 0]).await,
            Err(DcError::OutOfBounds(_))
        ));
        table.close(handle).await.unwrap();
    }
}
