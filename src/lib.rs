//! Cell lookup, ray firing and boundary crossing for Monte Carlo transport
//! geometries.
//!
//! The crate is organised leaf-first:
//! - [`boolean`] and [`csg`]: Boolean cell definitions of legacy CSG cells
//! - [`kernel`] and [`mesh`]: the geometry kernel contract and a faceted kernel
//! - [`properties`] and [`model`]: property names and the navigation registries
//! - [`cache`], [`ray`] and [`navigator`]: the ray navigation engine
//! - [`histories`]: parallel tracing of sampled rays

pub mod boolean;
pub mod cache;
pub mod csg;
pub mod error;
pub mod histories;
pub mod kernel;
pub mod mesh;
pub mod model;
pub mod navigator;
pub mod properties;
pub mod ray;
pub mod settings;

pub use error::{KernelError, NavError, Result};
pub use kernel::{CellHandle, EntityId, GeometryKernel, PointLocation, SurfaceHandle};
pub use mesh::FacetKernel;
pub use model::Model;
pub use navigator::NavigationContext;
