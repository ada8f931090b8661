//! Derived variables
//!
//! Coordinate variables that are not stored but computed from stored
//! sources on read. Every variant is a pure function of its sources and the
//! timestep, and keeps per-open state in its own [`TokenTable`] so handles
//! opened at different timesteps never share mutable state.

use crate::access::{read_storage_region, TokenTable};
use crate::error::{DcError, Result};
use crate::storage::RawCollection;
use crate::types::{CoordVar, XType};
use crate::utils::{check_region, region_shape, reversed};
use async_trait::async_trait;
use ndarray::{ArrayD, Axis, IxDyn, ShapeBuilder, Zip};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Common contract of computed variables
///
/// Construction plays the role of initialization: each variant validates
/// its sources and caches shape metadata in an associated `initialize`.
#[async_trait]
pub trait DerivedVariable: Send + Sync {
    fn name(&self) -> &str {
        &self.coord_var().name
    }

    /// Descriptor published in the metadata store
    fn coord_var(&self) -> &CoordVar;

    /// Spatial dimension lengths, canonical order
    fn dim_lens(&self) -> Vec<usize>;

    /// Whether the variable has data at storage timestep `ts`
    fn exists(&self, ts: usize) -> bool;

    async fn open_read(&self, ts: usize) -> Result<u64>;

    /// Compute the inclusive canonical-order region `[min, max]`
    async fn read_region(&self, token: u64, min: &[usize], max: &[usize]) -> Result<ArrayD<f32>>;

    async fn close_variable(&self, token: u64) -> Result<()>;
}

/// Derived variables by name
#[derive(Default)]
pub struct DerivedRegistry {
    vars: BTreeMap<String, Arc<dyn DerivedVariable>>,
}

impl DerivedRegistry {
    /// Register a variable, replacing any previous one of the same name
    pub fn add(&mut self, var: Arc<dyn DerivedVariable>) {
        self.vars.insert(var.name().to_string(), var);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn DerivedVariable>> {
        self.vars.get(name).cloned()
    }

    /// Whether `name` is served by a derived coordinate
    pub fn is_coord_var(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.vars.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

impl fmt::Debug for DerivedRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.vars.keys()).finish()
    }
}

fn dim_len(storage: &dyn RawCollection, name: &str) -> Option<usize> {
    storage
        .dim_names()
        .into_iter()
        .zip(storage.dim_lens())
        .find(|(d, _)| d == name)
        .map(|(_, len)| len)
}

#[derive(Debug, Clone)]
struct SourceToken {
    storage_token: u64,
}

/// An unstaggered coordinate interpolated onto a staggered axis
///
/// Interior staggered samples are midpoints of adjacent source samples; the
/// two boundary samples are linear extrapolations of the nearest two.
pub struct StaggeredCoordVar {
    storage: Arc<dyn RawCollection>,
    coord: CoordVar,
    source: String,
    /// Canonical axis that is staggered
    axis: usize,
    source_lens: Vec<usize>,
    dim_lens: Vec<usize>,
    open: TokenTable<SourceToken>,
}

impl StaggeredCoordVar {
    /// Derive `name` from `source` by staggering dimension `from_dim` onto `to_dim`
    pub fn initialize(
        storage: Arc<dyn RawCollection>,
        name: &str,
        source: &str,
        from_dim: &str,
        to_dim: &str,
    ) -> Result<Self> {
        if !storage.variable_exists(source) {
            return Err(DcError::NotFound(source.to_string()));
        }

        let source_dims = reversed(&storage.spatial_dim_names(source));
        let source_lens = reversed(&storage.spatial_dim_lens(source));
        let axis = source_dims
            .iter()
            .position(|d| d == from_dim)
            .ok_or_else(|| {
                DcError::InvalidCoordinateVariable(format!(
                    "{} has no dimension {}",
                    source, from_dim
                ))
            })?;

        let to_len = dim_len(storage.as_ref(), to_dim)
            .ok_or_else(|| DcError::MissingDimension(to_dim.to_string()))?;

        let n = source_lens[axis];
        if n < 2 || to_len != n + 1 {
            return Err(DcError::InvalidDimensions(format!(
                "cannot stagger {} of length {} onto {} of length {}",
                from_dim, n, to_dim, to_len
            )));
        }

        let mut dim_names = source_dims;
        dim_names[axis] = to_dim.to_string();
        let mut dim_lens = source_lens.clone();
        dim_lens[axis] = to_len;

        let units = storage
            .attribute(source, "units")
            .and_then(|u| u.as_text().map(str::to_string))
            .unwrap_or_default();

        let coord = CoordVar::new(
            name,
            units,
            XType::Float,
            vec![false; dim_names.len()],
            axis,
            dim_names,
            storage.time_dim_name(source),
        );

        Ok(Self {
            storage,
            coord,
            source: source.to_string(),
            axis,
            source_lens,
            dim_lens,
            open: TokenTable::default(),
        })
    }

    pub fn with_units(mut self, units: impl Into<String>) -> Self {
        self.coord.units = units.into();
        self
    }

    /// Set the logical axis (0=X, 1=Y) the coordinate measures
    pub fn with_axis(mut self, axis: usize) -> Self {
        self.coord.axis = axis;
        self
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

#[async_trait]
impl DerivedVariable for StaggeredCoordVar {
    fn coord_var(&self) -> &CoordVar {
        &self.coord
    }

    fn dim_lens(&self) -> Vec<usize> {
        self.dim_lens.clone()
    }

    fn exists(&self, ts: usize) -> bool {
        self.storage.variable_exists_at(ts, &self.source)
    }

    async fn open_read(&self, ts: usize) -> Result<u64> {
        let storage_token = self.storage.open_read(ts, &self.source).await?;
        Ok(self.open.insert(SourceToken { storage_token }))
    }

    async fn read_region(&self, token: u64, min: &[usize], max: &[usize]) -> Result<ArrayD<f32>> {
        let open = self.open.get(token).ok_or(DcError::InvalidHandle(token))?;
        check_region(min, max, &self.dim_lens)?;

        let axis = self.axis;
        let n = self.source_lens[axis];

        // source samples [lo, hi] cover every stencil in the region
        let lo = min[axis].saturating_sub(1).min(n - 2);
        let hi = max[axis].min(n - 1).max(lo + 1);
        let mut src_min = min.to_vec();
        let mut src_max = max.to_vec();
        src_min[axis] = lo;
        src_max[axis] = hi;

        let src = read_storage_region(
            self.storage.as_ref(),
            &self.source,
            open.storage_token,
            &src_min,
            &src_max,
        )
        .await?;

        let mut out = ArrayD::<f32>::zeros(IxDyn(&region_shape(min, max)).f());

        for k in min[axis]..=max[axis] {
            let (i0, w0, w1) = if k == 0 {
                (0, 1.5f32, -0.5f32)
            } else if k == n {
                (n - 2, -0.5, 1.5)
            } else {
                (k - 1, 0.5, 0.5)
            };

            let u0 = src.index_axis(Axis(axis), i0 - lo);
            let u1 = src.index_axis(Axis(axis), i0 + 1 - lo);
            Zip::from(out.index_axis_mut(Axis(axis), k - min[axis]))
                .and(&u0)
                .and(&u1)
                .for_each(|v, &a, &b| *v = w0 * a + w1 * b);
        }

        Ok(out)
    }

    async fn close_variable(&self, token: u64) -> Result<()> {
        let open = self.open.remove(token).ok_or(DcError::InvalidHandle(token))?;
        self.storage.close(open.storage_token).await
    }
}

/// Unitless `0..N-1` samples along one dimension
///
/// Stands in for a physical coordinate on axes (typically vertical) the
/// storage carries none for. Time-invariant.
pub struct Index1DCoordVar {
    coord: CoordVar,
    len: usize,
    open: TokenTable<usize>,
}

impl Index1DCoordVar {
    /// Index coordinate named after, and spanning, `dim_name`
    pub fn initialize(storage: Arc<dyn RawCollection>, dim_name: &str) -> Result<Self> {
        let len = dim_len(storage.as_ref(), dim_name)
            .ok_or_else(|| DcError::MissingDimension(dim_name.to_string()))?;

        let coord = CoordVar::new(
            dim_name,
            "",
            XType::Float,
            vec![false],
            2,
            vec![dim_name.to_string()],
            None,
        );

        Ok(Self {
            coord,
            len,
            open: TokenTable::default(),
        })
    }
}

#[async_trait]
impl DerivedVariable for Index1DCoordVar {
    fn coord_var(&self) -> &CoordVar {
        &self.coord
    }

    fn dim_lens(&self) -> Vec<usize> {
        vec![self.len]
    }

    fn exists(&self, _ts: usize) -> bool {
        true
    }

    async fn open_read(&self, ts: usize) -> Result<u64> {
        Ok(self.open.insert(ts))
    }

    async fn read_region(&self, token: u64, min: &[usize], max: &[usize]) -> Result<ArrayD<f32>> {
        if !self.open.contains(token) {
            return Err(DcError::InvalidHandle(token));
        }
        check_region(min, max, &[self.len])?;

        let values: Vec<f32> = (min[0]..=max[0]).map(|i| i as f32).collect();
        Ok(ArrayD::from_shape_vec(IxDyn(&[values.len()]), values)?)
    }

    async fn close_variable(&self, token: u64) -> Result<()> {
        self.open
            .remove(token)
            .map(|_| ())
            .ok_or(DcError::InvalidHandle(token))
    }
}
