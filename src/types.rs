//! Core data types for the data collection: element types, dimensions,
//! attributes and the variable/mesh descriptors published by initialization.

use crate::error::{DcError, Result};
use num_traits::NumCast;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// External element types of stored variables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum XType {
    /// Unsigned 8-bit integer
    U8 = 1,
    /// Unsigned 16-bit integer
    U16 = 2,
    /// Unsigned 32-bit integer
    U32 = 3,
    /// Unsigned 64-bit integer
    U64 = 4,
    /// Signed 8-bit integer
    I8 = 5,
    /// Signed 16-bit integer
    I16 = 6,
    /// Signed 32-bit integer
    I32 = 7,
    /// Signed 64-bit integer
    I64 = 8,
    /// 32-bit floating point
    Float = 9,
    /// 64-bit floating point
    Double = 10,
    /// Character data (fixed-width text records)
    Char = 11,
}

impl XType {
    /// Numeric types are the ones that can back a data variable
    pub fn is_numeric(&self) -> bool {
        *self != XType::Char
    }
}

impl fmt::Display for XType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// A named axis length
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimension {
    pub name: String,
    pub length: usize,
}

impl Dimension {
    pub fn new(name: impl Into<String>, length: usize) -> Self {
        Self {
            name: name.into(),
            length,
        }
    }
}

/// Typed attribute payload
///
/// Deserializes untagged so JSON documents can write `"DX": [12000.0]`,
/// `"MAP_PROJ": [1]` or `"units": "K"` directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Int(Vec<i64>),
    Float(Vec<f64>),
    Text(String),
}

impl AttributeValue {
    /// Numeric values converted to `T`
    ///
    /// `None` for text attributes, or if any value does not fit in `T`.
    pub fn values<T: NumCast>(&self) -> Option<Vec<T>> {
        match self {
            AttributeValue::Int(v) => v.iter().map(|x| T::from(*x)).collect(),
            AttributeValue::Float(v) => v.iter().map(|x| T::from(*x)).collect(),
            AttributeValue::Text(_) => None,
        }
    }

    /// Numeric attribute holding exactly one value
    pub fn is_scalar(&self) -> bool {
        match self {
            AttributeValue::Int(v) => v.len() == 1,
            AttributeValue::Float(v) => v.len() == 1,
            AttributeValue::Text(_) => false,
        }
    }

    /// The value of a single-valued numeric attribute
    pub fn scalar<T: NumCast>(&self) -> Option<T> {
        if !self.is_scalar() {
            return None;
        }
        self.values::<T>()?.into_iter().next()
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Element type this attribute would have in storage
    pub fn xtype(&self) -> XType {
        match self {
            AttributeValue::Int(_) => XType::I64,
            AttributeValue::Float(_) => XType::Double,
            AttributeValue::Text(_) => XType::Char,
        }
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        AttributeValue::Float(vec![v])
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        AttributeValue::Int(vec![v])
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        AttributeValue::Text(v.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(v: String) -> Self {
        AttributeValue::Text(v)
    }
}

/// Where a data variable is sampled on its mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GridLocation {
    Node,
    Cell,
}

/// Descriptor for a variable holding spatial or temporal positions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordVar {
    pub name: String,
    pub units: String,
    pub xtype: XType,
    pub periodic: Vec<bool>,
    /// Logical axis: 0=X, 1=Y, 2=Z, 3=T
    pub axis: usize,
    pub time_varying: bool,
    /// Spatial dimensions, canonical (X-first) order
    pub dim_names: Vec<String>,
    pub time_dim_name: Option<String>,
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl CoordVar {
    pub fn new(
        name: impl Into<String>,
        units: impl Into<String>,
        xtype: XType,
        periodic: Vec<bool>,
        axis: usize,
        dim_names: Vec<String>,
        time_dim_name: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            units: units.into(),
            xtype,
            periodic,
            axis,
            time_varying: time_dim_name.is_some(),
            dim_names,
            time_dim_name,
            attributes: BTreeMap::new(),
        }
    }
}

/// Descriptor for a physical field sampled on a mesh
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataVar {
    pub name: String,
    pub units: String,
    pub xtype: XType,
    pub periodic: Vec<bool>,
    pub mesh: String,
    pub time_coord_var: Option<String>,
    pub location: GridLocation,
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl DataVar {
    pub fn new(
        name: impl Into<String>,
        units: impl Into<String>,
        xtype: XType,
        periodic: Vec<bool>,
        mesh: impl Into<String>,
        time_coord_var: Option<String>,
        location: GridLocation,
    ) -> Self {
        Self {
            name: name.into(),
            units: units.into(),
            xtype,
            periodic,
            mesh: mesh.into(),
            time_coord_var,
            location,
            attributes: BTreeMap::new(),
        }
    }
}

/// Either kind of variable descriptor
#[derive(Debug, Clone, Copy)]
pub enum BaseVar<'a> {
    Coord(&'a CoordVar),
    Data(&'a DataVar),
}

impl<'a> BaseVar<'a> {
    pub fn name(&self) -> &'a str {
        match self {
            BaseVar::Coord(v) => &v.name,
            BaseVar::Data(v) => &v.name,
        }
    }

    pub fn units(&self) -> &'a str {
        match self {
            BaseVar::Coord(v) => &v.units,
            BaseVar::Data(v) => &v.units,
        }
    }

    pub fn attributes(&self) -> &'a BTreeMap<String, AttributeValue> {
        match self {
            BaseVar::Coord(v) => &v.attributes,
            BaseVar::Data(v) => &v.attributes,
        }
    }
}

/// Association between spatial dimensions and the coordinate variables
/// positioned along them. Index `i` of `coord_vars` is the coordinate for
/// dimension `i`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mesh {
    pub name: String,
    pub dim_names: Vec<String>,
    pub coord_vars: Vec<String>,
}

impl Mesh {
    /// Create a mesh with a name synthesized from its dimensions
    pub fn new(dim_names: Vec<String>, coord_vars: Vec<String>) -> Result<Self> {
        let name = dim_names.join("x");
        Self::named(name, dim_names, coord_vars)
    }

    pub fn named(
        name: impl Into<String>,
        dim_names: Vec<String>,
        coord_vars: Vec<String>,
    ) -> Result<Self> {
        if dim_names.len() != coord_vars.len() {
            return Err(DcError::InvalidDimensions(format!(
                "mesh has {} dimensions but {} coordinate variables",
                dim_names.len(),
                coord_vars.len()
            )));
        }

        Ok(Self {
            name: name.into(),
            dim_names,
            coord_vars,
        })
    }

    pub fn topology_dim(&self) -> usize {
        self.dim_names.len()
    }
}
