//! Raw storage providers
//!
//! A raw collection is the opaque source of named multidimensional arrays,
//! attributes and dimension lists that the data collection virtualizes.
//! Everything it reports is in *storage order* (slowest-varying dimension
//! first, time leading); the access layer normalizes to canonical order.
//!
//! [`MemoryCollection`] is the bundled provider. Other formats plug in by
//! implementing [`RawCollection`].

use crate::access::TokenTable;
use crate::error::{DcError, Result};
use crate::types::{AttributeValue, Dimension, XType};
use async_trait::async_trait;
use bytes::Bytes;
use ndarray::{ArrayD, ArrayViewD, IxDyn, Slice};
use num_traits::NumCast;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tokio::fs;

/// Name that addresses global (collection-level) attributes
pub const GLOBAL: &str = "";

/// Trait for reading from a raw collection of time-stepped variables
///
/// Inventory queries are answered from metadata loaded when the provider was
/// created and report empty results for unknown variables. Data access goes
/// through an open/read/close cycle keyed by `(timestep, name)`.
#[async_trait]
pub trait RawCollection: Send + Sync {
    /// Names of all dimensions
    fn dim_names(&self) -> Vec<String>;

    /// Lengths of all dimensions, parallel to [`RawCollection::dim_names`]
    fn dim_lens(&self) -> Vec<usize>;

    /// Number of timesteps in the collection
    fn num_time_steps(&self) -> usize;

    /// Look up an attribute. `var == GLOBAL` addresses global attributes
    fn attribute(&self, var: &str, name: &str) -> Option<AttributeValue>;

    /// Names of all attributes attached to `var`
    fn attribute_names(&self, var: &str) -> Vec<String>;

    /// Variables with exactly `spatial_rank` non-time dimensions
    fn variable_names(&self, spatial_rank: usize, numeric_only: bool) -> Vec<String>;

    fn variable_exists(&self, name: &str) -> bool;

    /// Whether `name` has data at timestep `ts`
    fn variable_exists_at(&self, ts: usize, name: &str) -> bool;

    /// All dimension names of a variable, time included
    fn var_dim_names(&self, name: &str) -> Vec<String>;

    /// Name of the variable's time dimension, if it is time-varying
    fn time_dim_name(&self, name: &str) -> Option<String>;

    fn spatial_dim_names(&self, name: &str) -> Vec<String>;

    fn spatial_dim_lens(&self, name: &str) -> Vec<usize>;

    fn xtype(&self, name: &str) -> Option<XType>;

    /// Open a variable at a timestep, returning a provider token
    async fn open_read(&self, ts: usize, name: &str) -> Result<u64>;

    /// Read a hyperslab of numeric data in storage order
    async fn read(&self, token: u64, start: &[usize], count: &[usize]) -> Result<ArrayD<f32>>;

    /// Read the character record of a text variable
    async fn read_chars(&self, token: u64) -> Result<Bytes>;

    async fn close(&self, token: u64) -> Result<()>;
}

/// Key/value lookup over attributes
pub trait AttributeSource {
    fn attribute(&self, name: &str) -> Option<AttributeValue>;

    /// A single-valued numeric attribute, if present
    fn scalar_f64(&self, name: &str) -> Option<f64> {
        self.attribute(name).and_then(|a| a.scalar::<f64>())
    }

    /// A single-valued numeric attribute that must be present
    fn require_f64(&self, name: &str) -> Result<f64> {
        require_scalar(self, name)
    }

    fn require_i64(&self, name: &str) -> Result<i64> {
        require_scalar(self, name)
    }
}

/// Absent, text or multi-valued attributes are missing; a single value
/// that does not fit in `T` is invalid.
fn require_scalar<S, T>(source: &S, name: &str) -> Result<T>
where
    S: AttributeSource + ?Sized,
    T: NumCast,
{
    let value = source
        .attribute(name)
        .filter(AttributeValue::is_scalar)
        .ok_or_else(|| DcError::MissingAttribute(name.to_string()))?;
    value
        .scalar::<T>()
        .ok_or_else(|| DcError::InvalidAttribute(format!("{} = {:?}", name, value)))
}

impl AttributeSource for BTreeMap<String, AttributeValue> {
    fn attribute(&self, name: &str) -> Option<AttributeValue> {
        self.get(name).cloned()
    }
}

/// Global attributes of a raw collection seen as an [`AttributeSource`]
pub struct GlobalAttributeView<'a>(pub &'a dyn RawCollection);

impl AttributeSource for GlobalAttributeView<'_> {
    fn attribute(&self, name: &str) -> Option<AttributeValue> {
        self.0.attribute(GLOBAL, name)
    }
}

/// Per-timestep payload of a stored variable
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableData {
    /// One flattened storage-order record per timestep (one in total if static)
    Numeric(Vec<Vec<f32>>),
    /// One text record per timestep
    Text(Vec<String>),
}

impl VariableData {
    fn num_records(&self) -> usize {
        match self {
            VariableData::Numeric(r) => r.len(),
            VariableData::Text(r) => r.len(),
        }
    }
}

/// A variable held by [`MemoryCollection`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredVariable {
    /// Dimension names in storage order, time first if present
    pub dims: Vec<String>,
    pub xtype: XType,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeValue>,
    pub data: VariableData,
}

#[derive(Debug, Clone)]
struct OpenRecord {
    name: String,
    record: usize,
}

/// In-memory raw collection
///
/// Can be assembled with the builder methods or loaded from a JSON document
/// of the same shape as its serialized form.
#[derive(Debug, Serialize, Deserialize)]
pub struct MemoryCollection {
    time_dim: String,
    dims: Vec<Dimension>,
    #[serde(default)]
    global_attributes: BTreeMap<String, AttributeValue>,
    #[serde(default)]
    variables: BTreeMap<String, StoredVariable>,
    #[serde(skip)]
    open: TokenTable<OpenRecord>,
}

impl MemoryCollection {
    /// Create an empty collection whose time axis is named `time_dim`
    pub fn new(time_dim: impl Into<String>) -> Self {
        Self {
            time_dim: time_dim.into(),
            dims: Vec::new(),
            global_attributes: BTreeMap::new(),
            variables: BTreeMap::new(),
            open: TokenTable::default(),
        }
    }

    /// Parse a collection from a JSON document
    pub fn from_json_str(json: &str) -> Result<Self> {
        let collection: MemoryCollection = serde_json::from_str(json)?;
        collection.validate()?;
        Ok(collection)
    }

    /// Load a collection from a JSON file
    pub async fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = fs::read_to_string(path.as_ref()).await?;
        Self::from_json_str(&json)
    }

    /// Add a dimension
    pub fn with_dimension(mut self, name: impl Into<String>, length: usize) -> Self {
        self.dims.push(Dimension::new(name, length));
        self
    }

    /// Add a global attribute
    pub fn with_global_attribute(
        mut self,
        name: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Self {
        self.global_attributes.insert(name.into(), value.into());
        self
    }

    /// Add a numeric variable. `dims` are in storage order; `records` holds
    /// one flattened record per timestep, or a single record if static.
    pub fn add_variable(
        &mut self,
        name: impl Into<String>,
        dims: &[&str],
        xtype: XType,
        records: Vec<Vec<f32>>,
    ) -> Result<()> {
        let var = StoredVariable {
            dims: dims.iter().map(|d| d.to_string()).collect(),
            xtype,
            attributes: BTreeMap::new(),
            data: VariableData::Numeric(records),
        };
        self.insert_variable(name.into(), var)
    }

    /// Add a character variable with one text record per timestep
    pub fn add_text_variable(
        &mut self,
        name: impl Into<String>,
        dims: &[&str],
        records: Vec<String>,
    ) -> Result<()> {
        let var = StoredVariable {
            dims: dims.iter().map(|d| d.to_string()).collect(),
            xtype: XType::Char,
            attributes: BTreeMap::new(),
            data: VariableData::Text(records),
        };
        self.insert_variable(name.into(), var)
    }

    /// Attach an attribute to an existing variable
    pub fn add_attribute(
        &mut self,
        var: &str,
        name: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Result<()> {
        if var == GLOBAL {
            self.global_attributes.insert(name.into(), value.into());
            return Ok(());
        }

        let stored = self
            .variables
            .get_mut(var)
            .ok_or_else(|| DcError::NotFound(var.to_string()))?;
        stored.attributes.insert(name.into(), value.into());
        Ok(())
    }

    fn insert_variable(&mut self, name: String, var: StoredVariable) -> Result<()> {
        self.check_variable(&name, &var)?;
        self.variables.insert(name, var);
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if !self.dims.iter().any(|d| d.name == self.time_dim) {
            return Err(DcError::MissingDimension(self.time_dim.clone()));
        }
        for (name, var) in &self.variables {
            self.check_variable(name, var)?;
        }
        Ok(())
    }

    fn dim_len(&self, name: &str) -> Option<usize> {
        self.dims.iter().find(|d| d.name == name).map(|d| d.length)
    }

    fn is_time_varying(&self, var: &StoredVariable) -> bool {
        var.dims.first().map(|d| d == &self.time_dim).unwrap_or(false)
    }

    fn check_variable(&self, name: &str, var: &StoredVariable) -> Result<()> {
        let mut spatial = 1usize;
        for (i, dim) in var.dims.iter().enumerate() {
            let len = self.dim_len(dim).ok_or_else(|| {
                DcError::MissingDimension(format!("{} (used by {})", dim, name))
            })?;
            if dim == &self.time_dim && i != 0 {
                return Err(DcError::InvalidDimensions(format!(
                    "{}: time dimension must lead",
                    name
                )));
            }
            if dim != &self.time_dim {
                spatial *= len;
            }
        }

        let expected_records = if self.is_time_varying(var) {
            self.num_time_steps()
        } else {
            1
        };
        if var.data.num_records() != expected_records {
            return Err(DcError::InvalidDimensions(format!(
                "{}: expected {} records, found {}",
                name,
                expected_records,
                var.data.num_records()
            )));
        }

        if let VariableData::Numeric(records) = &var.data {
            if let Some(bad) = records.iter().find(|r| r.len() != spatial) {
                return Err(DcError::InvalidDimensions(format!(
                    "{}: record holds {} values, expected {}",
                    name,
                    bad.len(),
                    spatial
                )));
            }
        }

        Ok(())
    }

    fn lookup(&self, name: &str) -> Result<&StoredVariable> {
        self.variables
            .get(name)
            .ok_or_else(|| DcError::NotFound(name.to_string()))
    }

    fn open_record(&self, token: u64) -> Result<(OpenRecord, &StoredVariable)> {
        let record = self
            .open
            .get(token)
            .ok_or_else(|| DcError::Storage(format!("invalid storage token {}", token)))?;
        let var = self.lookup(&record.name)?;
        Ok((record, var))
    }
}

#[async_trait]
impl RawCollection for MemoryCollection {
    fn dim_names(&self) -> Vec<String> {
        self.dims.iter().map(|d| d.name.clone()).collect()
    }

    fn dim_lens(&self) -> Vec<usize> {
        self.dims.iter().map(|d| d.length).collect()
    }

    fn num_time_steps(&self) -> usize {
        self.dim_len(&self.time_dim).unwrap_or(0)
    }

    fn attribute(&self, var: &str, name: &str) -> Option<AttributeValue> {
        if var == GLOBAL {
            return self.global_attributes.get(name).cloned();
        }
        self.variables.get(var)?.attributes.get(name).cloned()
    }

    fn attribute_names(&self, var: &str) -> Vec<String> {
        if var == GLOBAL {
            return self.global_attributes.keys().cloned().collect();
        }
        self.variables
            .get(var)
            .map(|v| v.attributes.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn variable_names(&self, spatial_rank: usize, numeric_only: bool) -> Vec<String> {
        self.variables
            .iter()
            .filter(|(_, v)| !numeric_only || v.xtype.is_numeric())
            .filter(|(name, _)| self.spatial_dim_names(name).len() == spatial_rank)
            .map(|(name, _)| name.clone())
            .collect()
    }

    fn variable_exists(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    fn variable_exists_at(&self, ts: usize, name: &str) -> bool {
        match self.variables.get(name) {
            Some(var) => !self.is_time_varying(var) || ts < self.num_time_steps(),
            None => false,
        }
    }

    fn var_dim_names(&self, name: &str) -> Vec<String> {
        self.variables
            .get(name)
            .map(|v| v.dims.clone())
            .unwrap_or_default()
    }

    fn time_dim_name(&self, name: &str) -> Option<String> {
        let var = self.variables.get(name)?;
        if self.is_time_varying(var) {
            Some(self.time_dim.clone())
        } else {
            None
        }
    }

    fn spatial_dim_names(&self, name: &str) -> Vec<String> {
        self.var_dim_names(name)
            .into_iter()
            .filter(|d| d != &self.time_dim)
            .collect()
    }

    fn spatial_dim_lens(&self, name: &str) -> Vec<usize> {
        self.spatial_dim_names(name)
            .iter()
            .filter_map(|d| self.dim_len(d))
            .collect()
    }

    fn xtype(&self, name: &str) -> Option<XType> {
        self.variables.get(name).map(|v| v.xtype)
    }

    async fn open_read(&self, ts: usize, name: &str) -> Result<u64> {
        let var = self.lookup(name)?;
        let record = if self.is_time_varying(var) {
            let count = self.num_time_steps();
            if ts >= count {
                return Err(DcError::TimeStepOutOfRange { ts, count });
            }
            ts
        } else {
            0
        };

        Ok(self.open.insert(OpenRecord {
            name: name.to_string(),
            record,
        }))
    }

    async fn read(&self, token: u64, start: &[usize], count: &[usize]) -> Result<ArrayD<f32>> {
        let (open, var) = self.open_record(token)?;
        let records = match &var.data {
            VariableData::Numeric(records) => records,
            VariableData::Text(_) => {
                return Err(DcError::Storage(format!(
                    "{} is a character variable",
                    open.name
                )))
            }
        };

        let lens = self.spatial_dim_lens(&open.name);
        if start.len() != lens.len() || count.len() != lens.len() {
            return Err(DcError::InvalidDimensions(format!(
                "{}: hyperslab rank does not match variable rank {}",
                open.name,
                lens.len()
            )));
        }
        for i in 0..lens.len() {
            if start[i] + count[i] > lens[i] {
                return Err(DcError::OutOfBounds(format!(
                    "{}: axis {} hyperslab {}+{} exceeds {}",
                    open.name, i, start[i], count[i], lens[i]
                )));
            }
        }

        let view = ArrayViewD::from_shape(IxDyn(&lens), &records[open.record][..])?;
        let slab = view.slice_each_axis(|ax| {
            let i = ax.axis.index();
            Slice::from(start[i]..start[i] + count[i])
        });
        Ok(slab.to_owned())
    }

    async fn read_chars(&self, token: u64) -> Result<Bytes> {
        let (open, var) = self.open_record(token)?;
        match &var.data {
            VariableData::Text(records) => Ok(Bytes::from(records[open.record].clone().into_bytes())),
            VariableData::Numeric(_) => Err(DcError::Storage(format!(
                "{} is not a character variable",
                open.name
            ))),
        }
    }

    async fn close(&self, token: u64) -> Result<()> {
        self.open
            .remove(token)
            .map(|_| ())
            .ok_or_else(|| DcError::Storage(format!("invalid storage token {}", token)))
    }
}
