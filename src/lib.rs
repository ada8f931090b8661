//! wrfdc - virtual data collection over WRF model output
//!
//! A handle-based read layer over raw collections of time-stepped model
//! arrays, plus a topology engine for the structured grids they live on.
//!
//! # Features
//!
//! - Metadata initialization from global attributes and dimension inventory
//! - Map projection resolution to Proj-style descriptors
//! - Derived coordinates: staggered lat/lon, vertical index axes, decoded time
//! - Uniform open/read/close over stored and derived variables, X-first indexing
//! - Cell/node adjacency, odometer traversal and periodic clamping on 2-D/3-D grids
//!
//! # Storage
//!
//! Raw data comes from any [`RawCollection`]. [`MemoryCollection`] is the
//! bundled provider and can be loaded from JSON; file formats plug in by
//! implementing the trait.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use wrfdc::{DataCollection, InitOptions, MemoryCollection};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let raw = MemoryCollection::from_json_file("wrfout_d01.json").await?;
//! let dc = DataCollection::initialize(Arc::new(raw), InitOptions::default()).await?;
//!
//! // Staggered longitudes are derived on the fly
//! let lon_u = dc.get_variable(0, "XLONG_U").await?;
//!
//! // Walk the cells of a data variable's mesh
//! let t2 = dc.metadata().get_data_var_info("T2").ok_or("no T2")?;
//! for cell in dc.grid(&t2.mesh)?.cell_begin() {
//!     println!("{:?}", cell);
//! }
//! # Ok(())
//! # }
//! ```

pub mod access;
pub mod collection;
pub mod derived;
pub mod error;
pub mod grid;
pub mod metadata;
pub mod projection;
pub mod storage;
pub mod time;
pub mod types;
pub mod utils;

// Re-exports
pub use access::{Handle, HandleTable, TokenTable};
pub use collection::DataCollection;
pub use derived::{DerivedRegistry, DerivedVariable, Index1DCoordVar, StaggeredCoordVar};
pub use error::{DcError, Result};
pub use grid::{ForwardCellIterator, ForwardNodeIterator, GridAxis, StructuredGrid};
pub use metadata::{GlobalAttributes, InitOptions, MetadataStore};
pub use projection::{resolve_projection, MapProjection};
pub use storage::{AttributeSource, MemoryCollection, RawCollection, GLOBAL};
pub use time::WrfTimeCoordVar;
pub use types::{
    AttributeValue, BaseVar, CoordVar, DataVar, Dimension, GridLocation, Mesh, XType,
};

/// Version of the wrfdc implementation
pub const WRFDC_VERSION: &str = env!("CARGO_PKG_VERSION");
