//! Common test utilities for wrfdc integration tests
//!
//! Provides helpers for:
//! - Locating test data files
//! - Building a small synthetic WRF-like collection in memory
//! - Installing a tracing subscriber once

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use wrfdc::{AttributeValue, DataCollection, InitOptions, MemoryCollection, RawCollection, XType};

pub const NX: usize = 4;
pub const NY: usize = 3;
pub const NZ: usize = 2;
pub const NT: usize = 3;

/// Storage order is 12Z, 06Z, 18Z; sorted by time the logical order is 06Z, 12Z, 18Z
pub const TIMES: [&str; NT] = [
    "2005-08-29_12:00:00",
    "2005-08-29_06:00:00",
    "2005-08-29_18:00:00",
];

/// Projection of the fixture (MAP_PROJ = 1)
pub const LCC: &str = "+proj=lcc +lon_0=-98 +lat_1=30 +lat_2=60 +ellps=WGS84";

/// Returns the path to the test-data directory
pub fn test_data_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test-data")
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Fixture longitude, linear in both index directions
pub fn lon(i: f32, j: f32) -> f32 {
    -100.0 + 2.0 * i + j
}

pub fn lat(i: f32, j: f32) -> f32 {
    30.0 + i + 2.0 * j
}

/// Temperature at storage timestep `t`
pub fn temperature(t: usize, i: usize, j: usize, k: usize) -> f32 {
    (1000 * t + 100 * k + 10 * j + i) as f32
}

/// One storage-order record per timestep for a `(nz, ny, nx)` field
fn records(
    steps: usize,
    shape: (usize, usize, usize),
    f: impl Fn(usize, usize, usize, usize) -> f32,
) -> Vec<Vec<f32>> {
    let (nz, ny, nx) = shape;
    (0..steps)
        .map(|t| {
            let mut record = Vec::with_capacity(nz * ny * nx);
            for k in 0..nz {
                for j in 0..ny {
                    for i in 0..nx {
                        record.push(f(t, i, j, k));
                    }
                }
            }
            record
        })
        .collect()
}

struct Builder {
    mc: MemoryCollection,
    skip: Vec<String>,
}

impl Builder {
    fn skipped(&self, name: &str) -> bool {
        self.skip.iter().any(|s| s == name)
    }

    fn global(&mut self, name: &str, value: impl Into<AttributeValue>) {
        if !self.skipped(name) {
            self.mc.add_attribute(wrfdc::GLOBAL, name, value).unwrap();
        }
    }

    fn variable(&mut self, name: &str, dims: &[&str], records: Vec<Vec<f32>>, units: &str) {
        if self.skipped(name) || dims.iter().any(|d| self.skipped(d)) {
            return;
        }
        self.mc
            .add_variable(name, dims, XType::Float, records)
            .unwrap();
        if !units.is_empty() {
            self.mc.add_attribute(name, "units", units).unwrap();
        }
    }
}

/// The fixture without the named global attributes, dimensions or variables
pub fn wrf_collection_without(skip: &[&str]) -> MemoryCollection {
    let skip: Vec<String> = skip.iter().map(|s| s.to_string()).collect();
    let mut mc = MemoryCollection::new("Time");
    for (name, len) in [
        ("Time", NT),
        ("DateStrLen", 19),
        ("west_east", NX),
        ("west_east_stag", NX + 1),
        ("south_north", NY),
        ("south_north_stag", NY + 1),
        ("bottom_top", NZ),
        ("bottom_top_stag", NZ + 1),
        ("soil_layers", 4),
    ] {
        if !skip.iter().any(|s| s == name) {
            mc = mc.with_dimension(name, len);
        }
    }

    let mut b = Builder { mc, skip };

    b.global("DX", 12000.0);
    b.global("DY", 12000.0);
    b.global("CEN_LAT", 38.5);
    b.global("CEN_LON", -98.0);
    b.global("MAP_PROJ", 1i64);
    b.global("STAND_LON", -98.0);
    b.global("TRUELAT1", 30.0);
    b.global("TRUELAT2", 60.0);

    if !b.skipped("Times") {
        b.mc.add_text_variable(
            "Times",
            &["Time", "DateStrLen"],
            TIMES.iter().map(|s| s.to_string()).collect(),
        )
        .unwrap();
    }

    let horizontal = ["Time", "south_north", "west_east"];
    b.variable(
        "XLONG",
        &horizontal,
        records(NT, (1, NY, NX), |_, i, j, _| lon(i as f32, j as f32)),
        "degree_east",
    );
    b.variable(
        "XLAT",
        &horizontal,
        records(NT, (1, NY, NX), |_, i, j, _| lat(i as f32, j as f32)),
        "degree_north",
    );

    b.variable(
        "T",
        &["Time", "bottom_top", "south_north", "west_east"],
        records(NT, (NZ, NY, NX), temperature),
        "K",
    );
    b.variable(
        "U",
        &["Time", "bottom_top", "south_north", "west_east_stag"],
        records(NT, (NZ, NY, NX + 1), |_, i, _, _| i as f32),
        "m s-1",
    );
    b.variable(
        "V",
        &["Time", "bottom_top", "south_north_stag", "west_east"],
        records(NT, (NZ, NY + 1, NX), |_, _, j, _| j as f32),
        "m s-1",
    );
    b.variable(
        "W",
        &["Time", "bottom_top_stag", "south_north", "west_east"],
        records(NT, (NZ + 1, NY, NX), |_, _, _, k| k as f32),
        "m s-1",
    );
    b.variable(
        "T2",
        &horizontal,
        records(NT, (1, NY, NX), |t, _, _, _| 280.0 + t as f32),
        "K",
    );
    if !b.skipped("T2") {
        b.mc.add_attribute("T2", "description", "TEMP at 2 M").unwrap();
    }
    b.variable(
        "HGT",
        &["south_north", "west_east"],
        records(1, (1, NY, NX), |_, i, j, _| (100 * j + i) as f32),
        "m",
    );

    // never placed on a mesh
    b.variable(
        "ZNU",
        &["Time", "bottom_top"],
        records(NT, (1, 1, NZ), |_, i, _, _| i as f32),
        "",
    );
    b.variable(
        "SMOIS",
        &["Time", "soil_layers", "south_north", "west_east"],
        records(NT, (4, NY, NX), |_, _, _, _| 0.3),
        "m3 m-3",
    );
    b.variable(
        "U10_STAG",
        &["Time", "south_north_stag", "west_east_stag"],
        records(NT, (1, NY + 1, NX + 1), |_, _, _, _| 0.0),
        "m s-1",
    );

    b.mc
}

pub fn wrf_collection() -> MemoryCollection {
    wrf_collection_without(&[])
}

pub async fn initialize(mc: MemoryCollection) -> wrfdc::Result<DataCollection> {
    init_tracing();
    let storage: Arc<dyn RawCollection> = Arc::new(mc);
    DataCollection::initialize(storage, InitOptions::default()).await
}

pub async fn wrf_data_collection() -> DataCollection {
    initialize(wrf_collection()).await.unwrap()
}
