//! Structured grid topology - node/cell adjacency, traversal and coordinate
//! clamping over a regular 2-D or 3-D mesh
//!
//! Index vectors are in canonical order: axis 0 (X) varies fastest. Nodes are
//! the samples; cells span two consecutive node layers on every axis, so a
//! grid of `n` nodes along an axis has `n - 1` cells along it.

use crate::error::{DcError, Result};
use crate::metadata::MetadataStore;
use crate::types::Mesh;
use serde::{Deserialize, Serialize};

/// One axis of a structured grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridAxis {
    pub name: String,
    /// Number of nodes along this axis
    pub len: usize,
    pub periodic: bool,
    /// User-coordinate extent used by clamping
    pub coord_min: f64,
    pub coord_max: f64,
}

impl GridAxis {
    /// Non-periodic axis spanning index space `[0, len - 1]`
    pub fn new(name: impl Into<String>, len: usize) -> Self {
        Self {
            name: name.into(),
            len,
            periodic: false,
            coord_min: 0.0,
            coord_max: len.saturating_sub(1) as f64,
        }
    }

    /// Number of cells along this axis
    pub fn cells(&self) -> usize {
        self.len.saturating_sub(1)
    }

    fn clamp(&self, coord: f64) -> f64 {
        if self.len == 1 {
            return self.coord_min;
        }
        if !self.periodic || !coord.is_finite() {
            return coord;
        }

        let span = self.coord_max - self.coord_min;
        if span <= 0.0 || (coord >= self.coord_min && coord < self.coord_max) {
            return coord;
        }

        let wrapped = self.coord_min + (coord - self.coord_min).rem_euclid(span);
        if wrapped >= self.coord_max {
            self.coord_min
        } else {
            wrapped
        }
    }
}

/// Topology of a regular mesh
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredGrid {
    axes: Vec<GridAxis>,
}

impl StructuredGrid {
    /// Create a grid from node counts per axis (X first). Only 2-D and 3-D
    /// grids are supported.
    pub fn new(dims: &[usize]) -> Result<Self> {
        let axes = dims
            .iter()
            .enumerate()
            .map(|(i, &len)| GridAxis::new(format!("axis{}", i), len))
            .collect();
        Self::from_axes(axes)
    }

    pub fn from_axes(axes: Vec<GridAxis>) -> Result<Self> {
        if !(2..=3).contains(&axes.len()) {
            return Err(DcError::InvalidDimensions(format!(
                "structured grids must be 2-D or 3-D, got {} axes",
                axes.len()
            )));
        }
        if let Some(axis) = axes.iter().find(|a| a.len == 0) {
            return Err(DcError::InvalidDimensions(format!(
                "axis {} has no nodes",
                axis.name
            )));
        }

        Ok(Self { axes })
    }

    /// Build the topology of a mesh from the lengths of its dimensions
    pub fn from_mesh(store: &MetadataStore, mesh: &Mesh) -> Result<Self> {
        let axes = mesh
            .dim_names
            .iter()
            .map(|name| {
                store
                    .get_dimension(name)
                    .map(|d| GridAxis::new(name.as_str(), d.length))
                    .ok_or_else(|| DcError::MissingDimension(name.clone()))
            })
            .collect::<Result<Vec<_>>>()?;
        Self::from_axes(axes)
    }

    /// Set per-axis periodicity; flags beyond the grid rank are ignored
    pub fn with_periodic(mut self, periodic: &[bool]) -> Self {
        for (axis, &p) in self.axes.iter_mut().zip(periodic) {
            axis.periodic = p;
        }
        self
    }

    /// Set per-axis user-coordinate extents
    pub fn with_extents(mut self, min: &[f64], max: &[f64]) -> Self {
        for ((axis, &lo), &hi) in self.axes.iter_mut().zip(min).zip(max) {
            axis.coord_min = lo;
            axis.coord_max = hi;
        }
        self
    }

    pub fn axes(&self) -> &[GridAxis] {
        &self.axes
    }

    /// Node counts per axis
    pub fn dims(&self) -> Vec<usize> {
        self.axes.iter().map(|a| a.len).collect()
    }

    pub fn topology_dim(&self) -> usize {
        self.axes.len()
    }

    pub fn periodic(&self) -> Vec<bool> {
        self.axes.iter().map(|a| a.periodic).collect()
    }

    pub fn node_count(&self) -> usize {
        self.axes.iter().map(|a| a.len).product()
    }

    pub fn cell_count(&self) -> usize {
        self.axes.iter().map(GridAxis::cells).product()
    }

    pub fn is_valid_node(&self, index: &[usize]) -> bool {
        index.len() == self.axes.len() && index.iter().zip(&self.axes).all(|(&i, a)| i < a.len)
    }

    /// A cell needs a node layer on both sides along every axis
    pub fn is_valid_cell(&self, index: &[usize]) -> bool {
        index.len() == self.axes.len()
            && index.iter().zip(&self.axes).all(|(&i, a)| i < a.cells())
    }

    /// Linear node index, X fastest
    pub fn node_coords_to_index(&self, coords: &[usize]) -> usize {
        let mut index = 0;
        let mut stride = 1;
        for (&coord, axis) in coords.iter().zip(&self.axes) {
            index += coord * stride;
            stride *= axis.len;
        }
        index
    }

    pub fn node_index_to_coords(&self, index: usize) -> Vec<usize> {
        let mut remaining = index;
        self.axes
            .iter()
            .map(|axis| {
                let coord = remaining % axis.len;
                remaining /= axis.len;
                coord
            })
            .collect()
    }

    /// Corner nodes of a cell, counter-clockwise from the cell's own index;
    /// for 3-D the bottom face comes first, then the top face.
    pub fn get_cell_nodes(&self, cell: &[usize]) -> Option<Vec<Vec<usize>>> {
        if !self.is_valid_cell(cell) {
            return None;
        }

        let (i, j) = (cell[0], cell[1]);
        let face = [(i, j), (i + 1, j), (i + 1, j + 1), (i, j + 1)];

        let nodes: Vec<Vec<usize>> = match cell.get(2) {
            None => face.iter().map(|&(x, y)| vec![x, y]).collect(),
            Some(&k) => [k, k + 1]
                .iter()
                .flat_map(|&z| face.iter().map(move |&(x, y)| vec![x, y, z]))
                .collect(),
        };
        Some(nodes)
    }

    fn cell_at(&self, i: Option<usize>, j: Option<usize>) -> Option<Vec<usize>> {
        let cell = vec![i?, j?];
        if self.is_valid_cell(&cell) {
            Some(cell)
        } else {
            None
        }
    }

    fn require_2d(&self, what: &str) -> Result<()> {
        if self.axes.len() != 2 {
            return Err(DcError::Unsupported(format!(
                "{} on a {}-D grid",
                what,
                self.axes.len()
            )));
        }
        Ok(())
    }

    /// Neighbors of a 2-D cell in the order below, right, top, left
    ///
    /// A neighbor outside the grid leaves `None` in its slot. Returns
    /// `Ok(None)` when the cell itself is out of range.
    pub fn get_cell_neighbors(&self, cell: &[usize]) -> Result<Option<[Option<Vec<usize>>; 4]>> {
        self.require_2d("cell neighbors")?;
        if !self.is_valid_cell(cell) {
            return Ok(None);
        }

        let (i, j) = (cell[0], cell[1]);
        Ok(Some([
            self.cell_at(Some(i), j.checked_sub(1)),
            self.cell_at(Some(i + 1), Some(j)),
            self.cell_at(Some(i), Some(j + 1)),
            self.cell_at(i.checked_sub(1), Some(j)),
        ]))
    }

    /// Cells sharing a 2-D node, counter-clockwise from lower-left:
    /// `(i-1, j-1)`, `(i, j-1)`, `(i, j)`, `(i-1, j)`
    ///
    /// Same slot policy as [`StructuredGrid::get_cell_neighbors`].
    pub fn get_node_cells(&self, node: &[usize]) -> Result<Option<[Option<Vec<usize>>; 4]>> {
        self.require_2d("node cells")?;
        if !self.is_valid_node(node) {
            return Ok(None);
        }

        let (i, j) = (node[0], node[1]);
        Ok(Some([
            self.cell_at(i.checked_sub(1), j.checked_sub(1)),
            self.cell_at(Some(i), j.checked_sub(1)),
            self.cell_at(Some(i), Some(j)),
            self.cell_at(i.checked_sub(1), Some(j)),
        ]))
    }

    /// Bring a user coordinate into the grid domain
    ///
    /// Components beyond the topology dimension are dropped. Length-1 axes
    /// pin to their minimum, periodic axes wrap into `[min, max)`, and
    /// non-periodic axes are returned unchanged.
    pub fn clamp_coord(&self, coords: &[f64]) -> Result<Vec<f64>> {
        if coords.len() < self.axes.len() {
            return Err(DcError::InvalidDimensions(format!(
                "coordinate has {} components, grid is {}-D",
                coords.len(),
                self.axes.len()
            )));
        }

        Ok(coords
            .iter()
            .zip(&self.axes)
            .map(|(&c, axis)| axis.clamp(c))
            .collect())
    }

    pub fn cell_begin(&self) -> ForwardCellIterator {
        ForwardCellIterator::begin(self)
    }

    pub fn cell_end(&self) -> ForwardCellIterator {
        ForwardCellIterator::end(self)
    }

    pub fn node_begin(&self) -> ForwardNodeIterator {
        ForwardNodeIterator::begin(self)
    }

    pub fn node_end(&self) -> ForwardNodeIterator {
        ForwardNodeIterator::end(self)
    }
}

/// Multidimensional counter, axis 0 fastest
///
/// The end position has every axis at zero except the last, which sits one
/// past its limit.
#[derive(Debug, Clone)]
struct Odometer {
    index: Vec<usize>,
    limits: Vec<usize>,
}

impl Odometer {
    fn begin(limits: Vec<usize>) -> Self {
        if limits.iter().any(|&l| l == 0) {
            return Self::end(limits);
        }
        Self {
            index: vec![0; limits.len()],
            limits,
        }
    }

    fn end(limits: Vec<usize>) -> Self {
        let mut index = vec![0; limits.len()];
        if let (Some(last), Some(&limit)) = (index.last_mut(), limits.last()) {
            *last = limit;
        }
        Self { index, limits }
    }

    fn is_end(&self) -> bool {
        match (self.index.last(), self.limits.last()) {
            (Some(&i), Some(&limit)) => i >= limit,
            _ => true,
        }
    }

    fn advance(&mut self) {
        if self.is_end() {
            return;
        }

        let last = self.index.len() - 1;
        for axis in 0..=last {
            self.index[axis] += 1;
            if self.index[axis] < self.limits[axis] || axis == last {
                return;
            }
            self.index[axis] = 0;
        }
    }

    /// Yield the current index and move past it
    fn step(&mut self) -> Option<Vec<usize>> {
        if self.is_end() {
            return None;
        }
        let current = self.index.clone();
        self.advance();
        Some(current)
    }
}

/// Traversal of every cell index in odometer order
///
/// Two iterators are equal when their cursors are equal, so a walk can be
/// checked against [`StructuredGrid::cell_end`].
#[derive(Debug, Clone)]
pub struct ForwardCellIterator {
    cursor: Odometer,
}

impl ForwardCellIterator {
    pub fn begin(grid: &StructuredGrid) -> Self {
        Self {
            cursor: Odometer::begin(grid.axes.iter().map(GridAxis::cells).collect()),
        }
    }

    pub fn end(grid: &StructuredGrid) -> Self {
        Self {
            cursor: Odometer::end(grid.axes.iter().map(GridAxis::cells).collect()),
        }
    }

    /// Current cell index
    pub fn index(&self) -> &[usize] {
        &self.cursor.index
    }
}

impl PartialEq for ForwardCellIterator {
    fn eq(&self, other: &Self) -> bool {
        self.cursor.index == other.cursor.index
    }
}

impl Iterator for ForwardCellIterator {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        self.cursor.step()
    }
}

/// Traversal of every node index in odometer order
#[derive(Debug, Clone)]
pub struct ForwardNodeIterator {
    cursor: Odometer,
}

impl ForwardNodeIterator {
    pub fn begin(grid: &StructuredGrid) -> Self {
        Self {
            cursor: Odometer::begin(grid.dims()),
        }
    }

    pub fn end(grid: &StructuredGrid) -> Self {
        Self {
            cursor: Odometer::end(grid.dims()),
        }
    }

    pub fn index(&self) -> &[usize] {
        &self.cursor.index
    }
}

impl PartialEq for ForwardNodeIterator {
    fn eq(&self, other: &Self) -> bool {
        self.cursor.index == other.cursor.index
    }
}

impl Iterator for ForwardNodeIterator {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        self.cursor.step()
    }
}
