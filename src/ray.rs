//! Per-thread navigation cursor.
//!
//! An [`InternalRay`] follows one particle history through the model. It
//! remembers the cell it is in and, once fired, the next boundary crossing so
//! repeated distance queries at the same state do not go back to the kernel.
//!
//! - any change of position or direction drops the cached crossing
//! - a substep shortens the cached distance instead of dropping it

use nalgebra::{Point3, Vector3};

use crate::kernel::{CellHandle, RayHistory, SurfaceHandle};
use crate::settings::UNIT_VECTOR_TOLERANCE;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::FacetHistory;
    use approx::assert_relative_eq;

    fn cell() -> CellHandle {
        CellHandle::new(7).unwrap()
    }

    fn surface() -> SurfaceHandle {
        SurfaceHandle::new(9).unwrap()
    }

    fn ray() -> InternalRay<FacetHistory> {
        InternalRay::new(Point3::origin(), Vector3::new(1.0, 0.0, 0.0), cell())
    }

    #[test]
    fn substep_shortens_cached_distance() {
        let mut ray = ray();
        ray.set_intersection(surface(), 2.0);
        ray.advance_substep(0.5);
        assert_relative_eq!(ray.position().x, 0.5);
        let (hit, distance) = ray.intersection().unwrap();
        assert_eq!(hit, surface());
        assert_relative_eq!(distance, 1.5);
    }

    #[test]
    #[should_panic(expected = "substep")]
    fn substep_past_boundary_panics() {
        let mut ray = ray();
        ray.set_intersection(surface(), 2.0);
        ray.advance_substep(2.0);
    }

    #[test]
    #[should_panic(expected = "unit")]
    fn non_unit_direction_panics() {
        InternalRay::<FacetHistory>::new(Point3::origin(), Vector3::new(1.0, 1.0, 0.0), cell());
    }

    #[test]
    fn direction_change_drops_intersection() {
        let mut ray = ray();
        ray.set_intersection(surface(), 2.0);
        ray.change_direction(Vector3::new(0.0, 1.0, 0.0), false);
        assert!(ray.intersection().is_none());
        assert_eq!(ray.cell(), cell());
    }

    #[test]
    fn advance_to_intersection_moves_and_switches_cell() {
        let mut ray = ray();
        ray.set_intersection(surface(), 2.0);
        let next = CellHandle::new(8).unwrap();
        ray.advance_to_intersection(next);
        assert_relative_eq!(ray.position().x, 2.0);
        assert_eq!(ray.cell(), next);
        assert!(ray.intersection().is_none());
    }
}

pub(crate) fn assert_unit(direction: &Vector3<f64>) {
    assert!(
        (direction.norm() - 1.0).abs() <= UNIT_VECTOR_TOLERANCE,
        "direction must be a unit vector, got norm {}",
        direction.norm()
    );
}

/// Stateful ray owned by a single worker thread.
#[derive(Debug, Clone)]
pub struct InternalRay<H: RayHistory> {
    position: Point3<f64>,
    direction: Vector3<f64>,
    cell: CellHandle,
    intersection: Option<(SurfaceHandle, f64)>,
    history: H,
}

impl<H: RayHistory> InternalRay<H> {
    /// Panics if `direction` is not a unit vector.
    pub fn new(position: Point3<f64>, direction: Vector3<f64>, cell: CellHandle) -> Self {
        assert_unit(&direction);
        Self {
            position,
            direction,
            cell,
            intersection: None,
            history: H::default(),
        }
    }

    pub fn position(&self) -> &Point3<f64> {
        &self.position
    }

    pub fn direction(&self) -> &Vector3<f64> {
        &self.direction
    }

    pub fn cell(&self) -> CellHandle {
        self.cell
    }

    /// Next boundary crossing, if the ray has been fired since it last moved.
    pub fn intersection(&self) -> Option<(SurfaceHandle, f64)> {
        self.intersection
    }

    pub fn history(&self) -> &H {
        &self.history
    }

    pub(crate) fn history_mut(&mut self) -> &mut H {
        &mut self.history
    }

    pub(crate) fn set_intersection(&mut self, surface: SurfaceHandle, distance: f64) {
        self.intersection = Some((surface, distance));
    }

    /// Points the ray somewhere else without moving it.
    ///
    /// After a reflection only the crossing just made is kept in the history,
    /// so the reflected ray cannot hit the same facet again. Any other change
    /// starts a fresh history.
    pub fn change_direction(&mut self, direction: Vector3<f64>, reflected: bool) {
        assert_unit(&direction);
        self.direction = direction;
        self.intersection = None;
        if reflected {
            self.history.reset_to_last_intersection();
        } else {
            self.history.reset();
        }
    }

    /// Moves the ray onto its cached crossing and into `next_cell`.
    ///
    /// Panics if the ray has not been fired.
    pub fn advance_to_intersection(&mut self, next_cell: CellHandle) {
        let (_, distance) = self
            .intersection
            .take()
            .unwrap_or_else(|| panic!("advance_to_intersection called on an unfired ray"));
        self.position += self.direction * distance;
        self.cell = next_cell;
    }

    /// Moves the ray part of the way to its cached crossing.
    ///
    /// Panics unless `0 <= distance < ` the cached distance.
    pub fn advance_substep(&mut self, distance: f64) {
        let (surface, remaining) = self
            .intersection
            .unwrap_or_else(|| panic!("substep requested on an unfired ray"));
        assert!(
            distance >= 0.0 && distance < remaining,
            "substep of {} must lie in [0, {})",
            distance,
            remaining
        );
        self.position += self.direction * distance;
        self.intersection = Some((surface, remaining - distance));
    }
}
