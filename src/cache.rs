//! Shared working set of recently occupied cells.
//!
//! Locating a point by brute force tests every cell in the model. Particles
//! tend to stay in a small neighbourhood, so the cells they were recently
//! found in are remembered and tried first. Entries are only hints: a hit is
//! always re-verified with a containment test before it is returned.

use std::collections::HashSet;

use log::debug;
use nalgebra::{Point3, Vector3};
use parking_lot::RwLock;

use crate::error::Result;
use crate::kernel::{CellHandle, GeometryKernel, PointLocation};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::FacetKernel;
    use std::path::Path;

    fn kernel() -> FacetKernel {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/data/nested_cubes.toml");
        let mut kernel = FacetKernel::new();
        kernel.load_model(&path, 0.0).unwrap();
        kernel.build_spatial_index().unwrap();
        kernel
    }

    #[test]
    fn lookup_verifies_entries() {
        let kernel = kernel();
        let cache = FoundCellCache::new();
        let inner = kernel.cell_handle(1).unwrap();
        let dir = Vector3::new(0.0, 0.0, 1.0);

        assert_eq!(cache.checked_lookup(&kernel, &Point3::origin(), &dir).unwrap(), None);

        cache.add(inner);
        assert_eq!(cache.len(), 1);
        assert_eq!(
            cache.checked_lookup(&kernel, &Point3::origin(), &dir).unwrap(),
            Some(inner)
        );
        // stale entry: the point is no longer in the cached cell
        assert_eq!(
            cache.checked_lookup(&kernel, &Point3::new(1.5, 0.0, 0.0), &dir).unwrap(),
            None
        );

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn duplicate_adds_are_ignored() {
        let kernel = kernel();
        let cache = FoundCellCache::new();
        let cell = kernel.cell_handle(2).unwrap();
        cache.add(cell);
        cache.add(cell);
        assert_eq!(cache.len(), 1);
    }
}

/// Thread-safe set of cell handles, re-verified on every lookup.
///
/// Iteration holds the read lock, so insertions and clears never interleave
/// with a lookup in progress.
#[derive(Debug, Default)]
pub struct FoundCellCache {
    cells: RwLock<HashSet<CellHandle>>,
}

impl FoundCellCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&self) {
        self.cells.write().clear();
    }

    pub fn add(&self, cell: CellHandle) {
        self.cells.write().insert(cell);
    }

    pub fn len(&self) -> usize {
        self.cells.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.read().is_empty()
    }

    /// First cached cell that strictly contains the point, if any.
    ///
    /// A point on a cell boundary does not count as contained.
    pub fn checked_lookup<K: GeometryKernel>(
        &self,
        kernel: &K,
        position: &Point3<f64>,
        direction: &Vector3<f64>,
    ) -> Result<Option<CellHandle>> {
        let cells = self.cells.read();
        for &cell in cells.iter() {
            if kernel.point_in_volume(cell, position, direction, None)? == PointLocation::Inside {
                return Ok(Some(cell));
            }
        }
        debug!("found-cell cache miss ({} entries)", cells.len());
        Ok(None)
    }
}
