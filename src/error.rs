//! Error types for model loading and ray navigation.
//!
//! Every failure is surfaced to the direct caller. Nothing here is retried:
//! each variant points at a malformed model, a malformed input string or a
//! logic error, never at a transient condition.
//!
//! Contract violations (non-unit directions, per-thread calls before thread
//! support is enabled, substeps past the next boundary) are not represented
//! here. They panic.

use nalgebra::{Point3, Vector3};
use thiserror::Error;

use crate::kernel::EntityId;


/// Failures reported by a geometry kernel primitive.
///
/// These mean the kernel call itself went wrong, as opposed to a valid but
/// degenerate geometric answer.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum KernelError {
    #[error("no model has been loaded")]
    NotLoaded,

    #[error("could not read model file {path}: {message}")]
    Io { path: String, message: String },

    #[error("could not parse model: {0}")]
    Parse(String),

    #[error("unknown entity handle {0:#x}")]
    UnknownEntity(u64),

    #[error("spatial index has not been built")]
    NoSpatialIndex,

    #[error("{0}")]
    Other(String),
}

/// Errors produced while loading or navigating a geometry.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NavError {
    /// Fatal problem during model initialization.
    #[error("could not load the geometry: {0}")]
    GeometryLoad(String),

    /// A kernel primitive call failed.
    #[error("geometry kernel failure: {0}")]
    GeometryKernel(#[from] KernelError),

    /// Ray fire found no surface, or reported a negative distance.
    #[error(
        "ray misfire in cell {cell} (surface hit: {surface:?}, distance: {distance:?}) \
         at position {} with direction {}",
        fmt_point(.position),
        fmt_vec(.direction)
    )]
    RayMisfire {
        cell: EntityId,
        surface: Option<EntityId>,
        distance: Option<f64>,
        position: Point3<f64>,
        direction: Vector3<f64>,
    },

    /// No registered cell contains the point.
    #[error(
        "no cell contains the ray at position {} with direction {}",
        fmt_point(.position),
        fmt_vec(.direction)
    )]
    GeometryNavigation {
        position: Point3<f64>,
        direction: Vector3<f64>,
    },

    /// The kernel could not find the cell on the other side of a surface.
    #[error("no cell found across surface {surface} from cell {cell}")]
    NoBoundaryCell { cell: EntityId, surface: EntityId },

    /// Malformed `id.type.particletype` estimator property.
    #[error("invalid estimator property '{value}': {reason}")]
    InvalidEstimatorProperty { value: String, reason: String },

    /// Property names may not contain the reserved `_` separator.
    #[error("invalid property name '{0}': names may not contain '_'")]
    InvalidPropertyName(String),

    /// Malformed Boolean cell definition.
    #[error("invalid cell definition '{definition}': {reason}")]
    InvalidCellDefinition { definition: String, reason: String },
}

pub type Result<T> = std::result::Result<T, NavError>;

impl NavError {
    pub(crate) fn misfire(
        cell: EntityId,
        surface: Option<EntityId>,
        distance: Option<f64>,
        position: &Point3<f64>,
        direction: &Vector3<f64>,
    ) -> Self {
        NavError::RayMisfire {
            cell,
            surface,
            distance,
            position: *position,
            direction: *direction,
        }
    }

    pub(crate) fn estimator(value: &str, reason: impl Into<String>) -> Self {
        NavError::InvalidEstimatorProperty {
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// Formats a 3-vector as `[x, y, z]` for diagnostics.
pub(crate) fn fmt_vec(v: &Vector3<f64>) -> String {
    format!("[{}, {}, {}]", v.x, v.y, v.z)
}

pub(crate) fn fmt_point(p: &Point3<f64>) -> String {
    fmt_vec(&p.coords)
}
