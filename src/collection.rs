//! Data collection - initialization pipeline and the public read surface
//!
//! [`DataCollection::initialize`] turns the inventory of a raw collection of
//! model output into a [`MetadataStore`]: global attributes, dimensions, map
//! projection, horizontal/vertical/time coordinates and the data variables
//! whose meshes resolve. Any fatal step aborts without publishing anything;
//! data variables that cannot be placed on a mesh are skipped.

use crate::access::{Handle, HandleTable};
use crate::derived::{DerivedRegistry, DerivedVariable, Index1DCoordVar, StaggeredCoordVar};
use crate::error::{DcError, Result};
use crate::grid::StructuredGrid;
use crate::metadata::{GlobalAttributes, InitOptions, MetadataStore};
use crate::projection::resolve_projection;
use crate::storage::{AttributeSource, GlobalAttributeView, RawCollection};
use crate::time::WrfTimeCoordVar;
use crate::types::{AttributeValue, CoordVar, DataVar, Dimension, GridLocation, Mesh, XType};
use crate::utils::reversed;
use ndarray::ArrayD;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Horizontal dimensions that must be present besides the time dimension
pub const REQUIRED_DIMS: [&str; 4] = [
    "west_east",
    "west_east_stag",
    "south_north",
    "south_north_stag",
];

struct HorizontalCoord {
    name: &'static str,
    units: &'static str,
    axis: usize,
    /// `(source, from_dim, to_dim)` used when the coordinate is not stored
    stagger: Option<(&'static str, &'static str, &'static str)>,
}

const HORIZONTAL_COORDS: [HorizontalCoord; 6] = [
    HorizontalCoord {
        name: "XLONG",
        units: "degrees_east",
        axis: 0,
        stagger: None,
    },
    HorizontalCoord {
        name: "XLAT",
        units: "degrees_north",
        axis: 1,
        stagger: None,
    },
    HorizontalCoord {
        name: "XLONG_U",
        units: "degrees_east",
        axis: 0,
        stagger: Some(("XLONG", "west_east", "west_east_stag")),
    },
    HorizontalCoord {
        name: "XLAT_U",
        units: "degrees_north",
        axis: 1,
        stagger: Some(("XLAT", "west_east", "west_east_stag")),
    },
    HorizontalCoord {
        name: "XLONG_V",
        units: "degrees_east",
        axis: 0,
        stagger: Some(("XLONG", "south_north", "south_north_stag")),
    },
    HorizontalCoord {
        name: "XLAT_V",
        units: "degrees_north",
        axis: 1,
        stagger: Some(("XLAT", "south_north", "south_north_stag")),
    },
];

/// Horizontal coordinate pair for the two leading canonical dimensions
fn horizontal_pair(x_dim: &str, y_dim: &str) -> Option<(&'static str, &'static str)> {
    match (x_dim, y_dim) {
        ("west_east", "south_north") => Some(("XLONG", "XLAT")),
        ("west_east_stag", "south_north") => Some(("XLONG_U", "XLAT_U")),
        ("west_east", "south_north_stag") => Some(("XLONG_V", "XLAT_V")),
        _ => None,
    }
}

/// Place a variable on a mesh
///
/// `dim_names` are the variable's dimensions in storage order. Returns the
/// canonical spatial dimensions, the coordinate variable for each, and the
/// time coordinate if the variable is time-varying.
pub fn resolve_var_coordinates(
    dim_names: &[String],
    options: &InitOptions,
) -> Result<(Vec<String>, Vec<String>, Option<String>)> {
    let mut dims = reversed(dim_names);

    let time_coord = if dims.last() == Some(&options.time_dim) {
        dims.pop();
        Some(options.time_coord.clone())
    } else {
        None
    };

    if dims.len() < 2 || dims.len() > 3 {
        return Err(DcError::InvalidCoordinateVariable(format!(
            "no mesh for spatial dimensions {:?}",
            dims
        )));
    }

    let (x, y) = horizontal_pair(&dims[0], &dims[1]).ok_or_else(|| {
        DcError::InvalidCoordinateVariable(format!(
            "no horizontal coordinates for dimensions {:?}",
            dims
        ))
    })?;

    let mut coords = vec![x.to_string(), y.to_string()];
    if let Some(vertical) = dims.get(2) {
        coords.push(vertical.clone());
    }

    Ok((dims, coords, time_coord))
}

fn storage_attributes(storage: &dyn RawCollection, var: &str) -> BTreeMap<String, AttributeValue> {
    storage
        .attribute_names(var)
        .into_iter()
        .filter_map(|name| storage.attribute(var, &name).map(|value| (name, value)))
        .collect()
}

/// Metadata and handle-based access over one raw collection
pub struct DataCollection {
    storage: Arc<dyn RawCollection>,
    options: InitOptions,
    globals: GlobalAttributes,
    metadata: MetadataStore,
    derived: Arc<DerivedRegistry>,
    time: Arc<WrfTimeCoordVar>,
    handles: HandleTable,
}

impl DataCollection {
    /// Run the initialization pipeline over `storage`
    pub async fn initialize(storage: Arc<dyn RawCollection>, options: InitOptions) -> Result<Self> {
        let view = GlobalAttributeView(storage.as_ref());
        let globals = GlobalAttributes::from_source(&view)?;
        let map_proj = view.require_i64("MAP_PROJ")?;

        let mut metadata = MetadataStore::default();
        for (name, len) in storage.dim_names().into_iter().zip(storage.dim_lens()) {
            metadata.insert_dimension(Dimension::new(name, len));
        }
        let mut required: Vec<&str> = REQUIRED_DIMS.to_vec();
        required.push(&options.time_dim);
        for required in required {
            if metadata.get_dimension(required).is_none() {
                return Err(DcError::MissingDimension(required.to_string()));
            }
        }
        debug!(
            dimensions = metadata.get_dimension_names().len(),
            steps = storage.num_time_steps(),
            "dimensions loaded"
        );

        let projection = resolve_projection(map_proj, &view, &globals)?;
        debug!(map_proj, projection = %projection, "map projection resolved");
        metadata.set_map_projection(projection);

        let mut derived = DerivedRegistry::default();
        Self::register_horizontal_coords(&storage, &mut metadata, &mut derived)?;

        for dim in &options.vertical_dims {
            if metadata.get_dimension(dim).is_none() {
                continue;
            }
            let var = Index1DCoordVar::initialize(storage.clone(), dim)?;
            metadata.insert_coord_var(var.coord_var().clone());
            derived.add(Arc::new(var));
        }

        let time = Arc::new(WrfTimeCoordVar::initialize(storage.clone(), &options, &globals).await?);
        metadata.insert_coord_var(time.coord_var().clone());
        derived.add(time.clone());
        debug!(derived = ?derived, "derived coordinates registered");

        Self::register_data_vars(storage.as_ref(), &options, &derived, &mut metadata);
        debug!(
            coord_vars = metadata.get_coord_var_names().len(),
            data_vars = metadata.get_data_var_names().len(),
            meshes = metadata.get_mesh_names().len(),
            "collection initialized"
        );

        let derived = Arc::new(derived);
        let handles = HandleTable::new(storage.clone(), derived.clone(), time.lookup().to_vec());

        Ok(Self {
            storage,
            options,
            globals,
            metadata,
            derived,
            time,
            handles,
        })
    }

    fn register_horizontal_coords(
        storage: &Arc<dyn RawCollection>,
        metadata: &mut MetadataStore,
        derived: &mut DerivedRegistry,
    ) -> Result<()> {
        let lon_dims = storage.var_dim_names("XLONG");
        let lat_dims = storage.var_dim_names("XLAT");
        if lon_dims.len() != 3 || lon_dims != lat_dims {
            return Err(DcError::InvalidCoordinateVariable(format!(
                "XLONG {:?} and XLAT {:?} must share three dimensions",
                lon_dims, lat_dims
            )));
        }

        for coord in &HORIZONTAL_COORDS {
            if storage.variable_exists(coord.name) {
                let mut var = CoordVar::new(
                    coord.name,
                    coord.units,
                    XType::Float,
                    vec![false; 2],
                    coord.axis,
                    reversed(&storage.spatial_dim_names(coord.name)),
                    storage.time_dim_name(coord.name),
                );
                var.attributes = storage_attributes(storage.as_ref(), coord.name);
                metadata.insert_coord_var(var);
                continue;
            }

            let Some((source, from_dim, to_dim)) = coord.stagger else {
                continue;
            };
            match StaggeredCoordVar::initialize(storage.clone(), coord.name, source, from_dim, to_dim)
            {
                Ok(var) => {
                    let var = var.with_units(coord.units).with_axis(coord.axis);
                    metadata.insert_coord_var(var.coord_var().clone());
                    derived.add(Arc::new(var));
                }
                Err(e) => {
                    warn!(variable = coord.name, error = %e, "skipping staggered coordinate");
                }
            }
        }

        Ok(())
    }

    fn register_data_vars(
        storage: &dyn RawCollection,
        options: &InitOptions,
        derived: &DerivedRegistry,
        metadata: &mut MetadataStore,
    ) {
        for rank in 1..=3 {
            for name in storage.variable_names(rank, true) {
                if metadata.get_coord_var_info(&name).is_some() || derived.is_coord_var(&name) {
                    continue;
                }

                let (dims, coords, time_coord) =
                    match resolve_var_coordinates(&storage.var_dim_names(&name), options) {
                        Ok(resolved) => resolved,
                        Err(e) => {
                            warn!(variable = %name, error = %e, "skipping data variable");
                            continue;
                        }
                    };

                if let Some(missing) = coords
                    .iter()
                    .find(|c| metadata.get_coord_var_info(c).is_none())
                {
                    warn!(variable = %name, coordinate = %missing, "skipping data variable without coordinate");
                    continue;
                }

                let mesh = match Mesh::new(dims, coords) {
                    Ok(mesh) => mesh,
                    Err(e) => {
                        warn!(variable = %name, error = %e, "skipping data variable");
                        continue;
                    }
                };

                let attributes = storage_attributes(storage, &name);
                let units = attributes
                    .get("units")
                    .and_then(AttributeValue::as_text)
                    .unwrap_or_default()
                    .to_string();

                let mut var = DataVar::new(
                    name.as_str(),
                    units,
                    XType::Float,
                    vec![false; 3],
                    mesh.name.as_str(),
                    time_coord,
                    GridLocation::Node,
                );
                var.attributes = attributes;

                metadata.insert_mesh(mesh);
                metadata.insert_data_var(var);
            }
        }
    }

    pub fn metadata(&self) -> &MetadataStore {
        &self.metadata
    }

    pub fn global_attributes(&self) -> &GlobalAttributes {
        &self.globals
    }

    pub fn options(&self) -> &InitOptions {
        &self.options
    }

    pub fn storage(&self) -> &Arc<dyn RawCollection> {
        &self.storage
    }

    pub fn map_projection(&self) -> &str {
        self.metadata.map_projection()
    }

    pub fn num_time_steps(&self) -> usize {
        self.handles.num_time_steps()
    }

    /// Scaled times in ascending order, if every time string parsed
    pub fn times(&self) -> Option<Vec<f64>> {
        self.time.times()
    }

    /// Names of the derived coordinate variables
    pub fn derived_var_names(&self) -> Vec<String> {
        self.derived.names()
    }

    /// Open `name` at logical timestep `ts`
    pub async fn open_variable_read(&self, ts: usize, name: &str) -> Result<Handle> {
        self.handles.open(ts, name).await
    }

    /// Read the inclusive region `[min, max]` (canonical order) of an open variable
    pub async fn read_region(
        &self,
        handle: Handle,
        min: &[usize],
        max: &[usize],
    ) -> Result<ArrayD<f32>> {
        self.handles.read(handle, min, max).await
    }

    pub async fn close_variable(&self, handle: Handle) -> Result<()> {
        self.handles.close(handle).await
    }

    /// Read a whole variable at `ts`
    pub async fn get_variable(&self, ts: usize, name: &str) -> Result<ArrayD<f32>> {
        self.handles.get_variable(ts, name).await
    }

    pub fn variable_exists(&self, ts: usize, name: &str) -> bool {
        self.handles.variable_exists(ts, name)
    }

    /// Spatial dimension lengths in canonical order
    pub fn get_dim_lens(&self, name: &str) -> Option<Vec<usize>> {
        self.handles.dim_lens(name)
    }

    pub fn open_handles(&self) -> usize {
        self.handles.open_handles()
    }

    /// Topology of a mesh
    pub fn grid(&self, mesh: &str) -> Result<StructuredGrid> {
        let mesh = self
            .metadata
            .get_mesh(mesh)
            .ok_or_else(|| DcError::NotFound(mesh.to_string()))?;
        StructuredGrid::from_mesh(&self.metadata, mesh)
    }
}
