//! Collection metadata: the immutable configuration read from global
//! attributes, initialization options, and the store of dimensions,
//! variable descriptors and meshes published by initialization.

use crate::error::Result;
use crate::storage::AttributeSource;
use crate::types::{AttributeValue, BaseVar, CoordVar, DataVar, Dimension, Mesh, XType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Global attributes that parameterize projection and time handling
///
/// Produced once by initialization and never mutated afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GlobalAttributes {
    /// Grid spacing along X (m)
    pub dx: f64,
    /// Grid spacing along Y (m)
    pub dy: f64,
    pub cen_lat: f64,
    pub cen_lon: f64,
    pub pole_lat: f64,
    pub pole_lon: f64,
    /// Gravitational acceleration (m s-2)
    pub grav: f64,
    /// Planetary radius (m); zero for Earth
    pub radius: f64,
    /// SI seconds per planetary day over SI seconds per Earth day
    pub p2si: f64,
}

impl GlobalAttributes {
    pub const STANDARD_GRAVITY: f64 = 9.81;
    pub const DEFAULT_POLE_LAT: f64 = 90.0;
    pub const DEFAULT_POLE_LON: f64 = 0.0;

    /// Read the global attributes
    ///
    /// `DX`, `DY`, `CEN_LAT` and `CEN_LON` are required. `POLE_LAT` and
    /// `POLE_LON` default to the geographic pole. If `G` is present the body
    /// is not Earth and `RADIUS` and `P2SI` become required.
    pub fn from_source(atts: &dyn AttributeSource) -> Result<Self> {
        let dx = atts.require_f64("DX")?;
        let dy = atts.require_f64("DY")?;
        let cen_lat = atts.require_f64("CEN_LAT")?;
        let cen_lon = atts.require_f64("CEN_LON")?;

        let pole_lat = atts
            .scalar_f64("POLE_LAT")
            .unwrap_or(Self::DEFAULT_POLE_LAT);
        let pole_lon = atts
            .scalar_f64("POLE_LON")
            .unwrap_or(Self::DEFAULT_POLE_LON);

        let (grav, radius, p2si) = match atts.scalar_f64("G") {
            Some(grav) => (grav, atts.require_f64("RADIUS")?, atts.require_f64("P2SI")?),
            None => (Self::STANDARD_GRAVITY, 0.0, 1.0),
        };

        Ok(Self {
            dx,
            dy,
            cen_lat,
            cen_lon,
            pole_lat,
            pole_lon,
            grav,
            radius,
            p2si,
        })
    }

    /// Whether the rotated pole sits at its default location
    pub fn has_default_pole(&self) -> bool {
        self.pole_lat == Self::DEFAULT_POLE_LAT && self.pole_lon == Self::DEFAULT_POLE_LON
    }

    /// Whether the data describes a body other than Earth
    pub fn is_planetary(&self) -> bool {
        self.radius != 0.0
    }
}

/// Naming options for initialization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InitOptions {
    /// Name of the time dimension
    pub time_dim: String,
    /// Character variable holding one formatted date per timestep
    pub times_var: String,
    /// Name given to the derived time coordinate variable
    pub time_coord: String,
    /// Vertical dimensions that get an index coordinate when present
    pub vertical_dims: Vec<String>,
}

impl Default for InitOptions {
    fn default() -> Self {
        Self {
            time_dim: "Time".to_string(),
            times_var: "Times".to_string(),
            time_coord: "Time".to_string(),
            vertical_dims: vec![
                "bottom_top".to_string(),
                "bottom_top_stag".to_string(),
                "soil_layers_stag".to_string(),
            ],
        }
    }
}

impl InitOptions {
    /// Parse options from JSON; absent fields keep their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_time_dim(mut self, name: impl Into<String>) -> Self {
        self.time_dim = name.into();
        self
    }

    pub fn with_times_var(mut self, name: impl Into<String>) -> Self {
        self.times_var = name.into();
        self
    }

    pub fn with_time_coord(mut self, name: impl Into<String>) -> Self {
        self.time_coord = name.into();
        self
    }

    pub fn with_vertical_dims(mut self, names: Vec<String>) -> Self {
        self.vertical_dims = names;
        self
    }
}

/// Dimensions, descriptors and meshes of an initialized collection
///
/// Lookups return `None` for unknown names; listings are sorted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataStore {
    dims: BTreeMap<String, Dimension>,
    coord_vars: BTreeMap<String, CoordVar>,
    data_vars: BTreeMap<String, DataVar>,
    meshes: BTreeMap<String, Mesh>,
    map_projection: String,
}

impl MetadataStore {
    pub fn get_dimension(&self, name: &str) -> Option<&Dimension> {
        self.dims.get(name)
    }

    pub fn get_dimension_names(&self) -> Vec<String> {
        self.dims.keys().cloned().collect()
    }

    pub fn get_mesh(&self, name: &str) -> Option<&Mesh> {
        self.meshes.get(name)
    }

    pub fn get_mesh_names(&self) -> Vec<String> {
        self.meshes.keys().cloned().collect()
    }

    pub fn get_coord_var_info(&self, name: &str) -> Option<&CoordVar> {
        self.coord_vars.get(name)
    }

    pub fn get_data_var_info(&self, name: &str) -> Option<&DataVar> {
        self.data_vars.get(name)
    }

    /// Coordinate descriptor if `name` is a coordinate, else data descriptor
    pub fn get_base_var_info(&self, name: &str) -> Option<BaseVar<'_>> {
        self.coord_vars
            .get(name)
            .map(BaseVar::Coord)
            .or_else(|| self.data_vars.get(name).map(BaseVar::Data))
    }

    pub fn get_coord_var_names(&self) -> Vec<String> {
        self.coord_vars.keys().cloned().collect()
    }

    pub fn get_data_var_names(&self) -> Vec<String> {
        self.data_vars.keys().cloned().collect()
    }

    /// Proj-style descriptor of the map projection
    pub fn map_projection(&self) -> &str {
        &self.map_projection
    }

    fn attribute(&self, var: &str, att: &str) -> Option<&AttributeValue> {
        self.get_base_var_info(var)?.attributes().get(att)
    }

    pub fn get_att_f64s(&self, var: &str, att: &str) -> Option<Vec<f64>> {
        self.attribute(var, att)?.values()
    }

    pub fn get_att_i64s(&self, var: &str, att: &str) -> Option<Vec<i64>> {
        self.attribute(var, att)?.values()
    }

    pub fn get_att_text(&self, var: &str, att: &str) -> Option<String> {
        self.attribute(var, att)?.as_text().map(str::to_string)
    }

    pub fn get_att_names(&self, var: &str) -> Vec<String> {
        self.get_base_var_info(var)
            .map(|v| v.attributes().keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn get_att_type(&self, var: &str, att: &str) -> Option<XType> {
        self.attribute(var, att).map(AttributeValue::xtype)
    }

    pub(crate) fn insert_dimension(&mut self, dim: Dimension) {
        self.dims.insert(dim.name.clone(), dim);
    }

    pub(crate) fn insert_coord_var(&mut self, var: CoordVar) {
        self.coord_vars.insert(var.name.clone(), var);
    }

    pub(crate) fn insert_data_var(&mut self, var: DataVar) {
        self.data_vars.insert(var.name.clone(), var);
    }

    pub(crate) fn insert_mesh(&mut self, mesh: Mesh) {
        self.meshes.insert(mesh.name.clone(), mesh);
    }

    pub(crate) fn set_map_projection(&mut self, projection: String) {
        self.map_projection = projection;
    }
}
