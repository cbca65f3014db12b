//! Capability interface to the solid-model engine.
//!
//! The navigation core never touches facets or CAD data directly. Everything
//! geometric goes through [`GeometryKernel`]: loading, containment tests, ray
//! fire, normals, neighbor lookup across a surface, measures, property tags and
//! the translation between kernel handles and the small integer ids the rest
//! of a transport code uses.
//!
//! Handles are opaque and never zero. A failed id lookup yields `None`, which
//! is not an error by itself.

use std::fmt;
use std::num::NonZeroU64;
use std::path::Path;

use nalgebra::{Point3, Vector3};

use crate::error::KernelError;

/// Stable integer id of a cell or surface.
pub type EntityId = u64;

macro_rules! handle_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(NonZeroU64);

        impl $name {
            /// Wraps a raw kernel value. Zero is the null handle.
            pub fn new(raw: u64) -> Option<Self> {
                NonZeroU64::new(raw).map(Self)
            }

            pub fn raw(self) -> u64 {
                self.0.get()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:#x}", self.0.get())
            }
        }
    };
}

handle_type!(
    /// Kernel handle of a volume.
    CellHandle
);
handle_type!(
    /// Kernel handle of a bounding surface.
    SurfaceHandle
);

/// Location of a point relative to a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointLocation {
    Inside,
    Outside,
    OnBoundary,
}

/// Kernel-specific record of facets a ray has already crossed.
///
/// Passing the history back into the kernel lets it skip facets the ray is
/// sitting on, which keeps repeated fires from a boundary robust.
pub trait RayHistory: fmt::Debug + Default + Clone + Send {
    /// Forget every recorded crossing.
    fn reset(&mut self);

    /// Forget everything but the most recent crossing (used after reflection).
    fn reset_to_last_intersection(&mut self);
}

/// The operations the navigation core needs from a solid-model engine.
///
/// Loading and property assignment take `&mut self` and happen once. Every
/// query takes `&self`, so a loaded kernel can be shared between threads.
pub trait GeometryKernel: Send + Sync {
    type History: RayHistory;

    fn load_model(&mut self, path: &Path, faceting_tolerance: f64) -> Result<(), KernelError>;

    /// Builds the acceleration structure used by ray fire.
    fn build_spatial_index(&mut self) -> Result<(), KernelError>;

    /// All volumes of the model (dimension 3 entities).
    fn cells(&self) -> Vec<CellHandle>;

    /// All surfaces of the model (dimension 2 entities).
    fn surfaces(&self) -> Vec<SurfaceHandle>;

    /// Names of every property present in the model.
    fn discover_property_names(&self) -> Result<Vec<String>, KernelError>;

    /// Restricts property parsing to the given names.
    fn assign_property_names(&mut self, names: &[String]) -> Result<(), KernelError>;

    /// Cells tagged with `name`, optionally restricted to one value.
    fn cells_with_property(
        &self,
        name: &str,
        value: Option<&str>,
    ) -> Result<Vec<CellHandle>, KernelError>;

    /// Surfaces tagged with `name`, optionally restricted to one value.
    fn surfaces_with_property(
        &self,
        name: &str,
        value: Option<&str>,
    ) -> Result<Vec<SurfaceHandle>, KernelError>;

    /// Distinct values of a property across the whole model.
    fn property_values(&self, name: &str) -> Result<Vec<String>, KernelError>;

    fn cell_has_property(&self, cell: CellHandle, name: &str) -> Result<bool, KernelError>;

    fn point_in_volume(
        &self,
        cell: CellHandle,
        position: &Point3<f64>,
        direction: &Vector3<f64>,
        history: Option<&Self::History>,
    ) -> Result<PointLocation, KernelError>;

    /// Nearest boundary crossing leaving `cell`, or `None` on a miss.
    fn ray_fire(
        &self,
        cell: CellHandle,
        position: &Point3<f64>,
        direction: &Vector3<f64>,
        history: Option<&mut Self::History>,
    ) -> Result<Option<(SurfaceHandle, f64)>, KernelError>;

    /// Unit normal of a surface at a point on it.
    fn surface_normal(
        &self,
        surface: SurfaceHandle,
        position: &Point3<f64>,
        history: Option<&Self::History>,
    ) -> Result<Vector3<f64>, KernelError>;

    /// The cell on the other side of `surface`, seen from `cell`.
    fn next_volume(
        &self,
        surface: SurfaceHandle,
        cell: CellHandle,
    ) -> Result<Option<CellHandle>, KernelError>;

    /// Distance from a point to the nearest boundary of a cell, in any direction.
    fn closest_boundary_distance(
        &self,
        cell: CellHandle,
        position: &Point3<f64>,
    ) -> Result<f64, KernelError>;

    fn measure_volume(&self, cell: CellHandle) -> Result<f64, KernelError>;

    fn measure_area(&self, surface: SurfaceHandle) -> Result<f64, KernelError>;

    /// Id of a cell. The handle must have come from this kernel.
    fn cell_id(&self, cell: CellHandle) -> EntityId;

    fn surface_id(&self, surface: SurfaceHandle) -> EntityId;

    fn cell_handle(&self, id: EntityId) -> Option<CellHandle>;

    fn surface_handle(&self, id: EntityId) -> Option<SurfaceHandle>;
}
