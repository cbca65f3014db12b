//! Legacy combinatorial-geometry cells.
//!
//! A CSG cell is a Boolean combination of half-spaces bounded by second order
//! surfaces. The sign of each surface token in the cell definition names the
//! side of that surface the cell lies on.

use std::collections::HashMap;

use nalgebra::{Point3, Vector3};

use crate::boolean::{surface_tokens, BooleanCellFunctor};
use crate::error::{NavError, Result};
use crate::kernel::EntityId;
use crate::settings::QUADRIC_RELATIVE_TOLERANCE;


/// Side of a surface a point lies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceSense {
    Positive,
    Negative,
    On,
}

/// A second order surface
/// `Ax² + By² + Cz² + Dxy + Eyz + Fxz + Gx + Hy + Jz + K = 0`.
#[derive(Debug, Clone, PartialEq)]
pub struct QuadricSurface {
    id: EntityId,
    coefficients: [f64; 10],
    tolerance: f64,
    planar: bool,
}

impl QuadricSurface {
    /// Coefficients in the order `A B C D E F G H J K`.
    pub fn new(id: EntityId, coefficients: [f64; 10]) -> Self {
        let planar = coefficients[..6].iter().all(|c| *c == 0.0);
        let mut surface = Self {
            id,
            coefficients,
            tolerance: 0.0,
            planar,
        };
        if planar {
            let norm = Vector3::new(coefficients[6], coefficients[7], coefficients[8]).norm();
            if norm > 0.0 {
                for c in &mut surface.coefficients[6..] {
                    *c /= norm;
                }
            }
        }
        let largest = surface.coefficients.iter().fold(0.0_f64, |m, c| m.max(c.abs()));
        surface.tolerance = QUADRIC_RELATIVE_TOLERANCE * largest;
        surface
    }

    /// The plane `normal · x + offset = 0`.
    pub fn plane(id: EntityId, normal: Vector3<f64>, offset: f64) -> Self {
        Self::new(
            id,
            [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, normal.x, normal.y, normal.z, offset],
        )
    }

    pub fn sphere(id: EntityId, center: Point3<f64>, radius: f64) -> Self {
        let c = center.coords;
        Self::new(
            id,
            [
                1.0,
                1.0,
                1.0,
                0.0,
                0.0,
                0.0,
                -2.0 * c.x,
                -2.0 * c.y,
                -2.0 * c.z,
                c.norm_squared() - radius * radius,
            ],
        )
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn evaluate(&self, p: &Point3<f64>) -> f64 {
        let [a, b, c, d, e, f, g, h, j, k] = self.coefficients;
        let (x, y, z) = (p.x, p.y, p.z);
        a * x * x + b * y * y + c * z * z + d * x * y + e * y * z + f * x * z
            + g * x
            + h * y
            + j * z
            + k
    }

    pub fn sense(&self, p: &Point3<f64>) -> SurfaceSense {
        let value = self.evaluate(p);
        if value > self.tolerance {
            SurfaceSense::Positive
        } else if value < -self.tolerance {
            SurfaceSense::Negative
        } else {
            SurfaceSense::On
        }
    }

    pub fn is_on(&self, p: &Point3<f64>) -> bool {
        self.sense(p) == SurfaceSense::On
    }

    /// Unit normal at a point on the surface, pointing into the half-space
    /// with the given sense.
    pub fn unit_normal(&self, p: &Point3<f64>, sense: SurfaceSense) -> Vector3<f64> {
        let [a, b, c, d, e, f, g, h, j, _] = self.coefficients;
        let (x, y, z) = (p.x, p.y, p.z);
        let gradient = Vector3::new(
            2.0 * a * x + d * y + f * z + g,
            2.0 * b * y + d * x + e * z + h,
            2.0 * c * z + e * y + f * x + j,
        );
        let normal = gradient.normalize();
        let toward_positive = sense != SurfaceSense::Negative;
        if toward_positive {
            normal
        } else {
            -normal
        }
    }

    /// Distance along a ray to the nearest crossing beyond the tolerance.
    pub fn distance_to(&self, origin: &Point3<f64>, direction: &Vector3<f64>) -> Option<f64> {
        let [a, b, c, d, e, f, g, h, j, _] = self.coefficients;
        let (x, y, z) = (origin.x, origin.y, origin.z);
        let (u, v, w) = (direction.x, direction.y, direction.z);

        let alpha = a * u * u + b * v * v + c * w * w + d * u * v + e * v * w + f * u * w;
        let beta = 2.0 * (a * x * u + b * y * v + c * z * w)
            + d * (x * v + y * u)
            + e * (y * w + z * v)
            + f * (x * w + z * u)
            + g * u
            + h * v
            + j * w;
        let gamma = self.evaluate(origin);

        let positive = |t: f64| (t > self.tolerance).then_some(t);
        if self.planar || alpha.abs() <= f64::EPSILON {
            if beta == 0.0 {
                return None;
            }
            return positive(-gamma / beta);
        }

        let discriminant = beta * beta - 4.0 * alpha * gamma;
        if discriminant < 0.0 {
            return None;
        }
        let root = discriminant.sqrt();
        let t1 = (-beta + root) / (2.0 * alpha);
        let t2 = (-beta - root) / (2.0 * alpha);
        let (near, far) = if t1 < t2 { (t1, t2) } else { (t2, t1) };
        positive(near).or_else(|| positive(far))
    }
}

/// A cell defined by a Boolean combination of surface half-spaces.
#[derive(Debug, Clone)]
pub struct CsgCell {
    id: EntityId,
    definition: BooleanCellFunctor,
    // one entry per surface token, duplicates included
    surfaces: Vec<(QuadricSurface, SurfaceSense)>,
}

impl CsgCell {
    /// Builds a cell from a definition such as `-1 n (2 u -3)`.
    ///
    /// Every surface named in the definition must be present in `surfaces`.
    pub fn new(
        id: EntityId,
        definition: &str,
        surfaces: &HashMap<EntityId, QuadricSurface>,
    ) -> Result<Self> {
        let functor = BooleanCellFunctor::new(definition)?;
        let mut senses = Vec::new();
        for token in surface_tokens(definition)? {
            let invalid = |reason: String| NavError::InvalidCellDefinition {
                definition: definition.to_string(),
                reason,
            };
            if token == 0 {
                return Err(invalid("surface 0 has no sense".to_string()));
            }
            let surface = surfaces
                .get(&token.unsigned_abs())
                .ok_or_else(|| invalid(format!("surface {} is not defined", token.unsigned_abs())))?;
            let sense = if token < 0 {
                SurfaceSense::Negative
            } else {
                SurfaceSense::Positive
            };
            senses.push((surface.clone(), sense));
        }
        Ok(Self {
            id,
            definition: functor,
            surfaces: senses,
        })
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn definition(&self) -> &BooleanCellFunctor {
        &self.definition
    }

    /// Whether the point lies strictly inside the cell.
    pub fn is_in(&self, p: &Point3<f64>) -> bool {
        let matches: Vec<bool> = self
            .surfaces
            .iter()
            .map(|(surface, sense)| surface.sense(p) == *sense)
            .collect();
        self.definition.evaluate(&matches)
    }

    /// Whether the point lies on the boundary of the cell.
    pub fn is_on(&self, p: &Point3<f64>) -> bool {
        let mut on_any = false;
        let matches: Vec<bool> = self
            .surfaces
            .iter()
            .map(|(surface, sense)| match surface.sense(p) {
                SurfaceSense::On => {
                    on_any = true;
                    true
                }
                s => s == *sense,
            })
            .collect();
        on_any && self.definition.evaluate(&matches)
    }
}
