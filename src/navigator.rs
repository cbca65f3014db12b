//! Ray navigation through a loaded model.
//!
//! [`NavigationContext`] ties together the immutable [`Model`], the shared
//! [`FoundCellCache`] and one [`InternalRay`] slot per worker thread. It
//! answers two kinds of question:
//!
//! - **external rays**: stateless one-off queries (which cell contains this
//!   point, how far is the next boundary from here)
//! - **internal rays**: the per-thread cursor a transport loop drives from
//!   boundary to boundary, with reflection at reflecting surfaces
//!
//! # Key Components
//!
//! - [`NavigationContext`]: owner of all navigation state
//! - [`current_thread_id`]: slot index of the calling rayon worker
//!
//! Per-thread operations take the slot index explicitly. A slot is only ever
//! touched by its own thread; the mutex around it is never contended and
//! exists so the context can be shared as `&NavigationContext`.

use log::debug;
use nalgebra::{Point3, Vector3};
use parking_lot::{Mutex, MutexGuard};

use crate::cache::FoundCellCache;
use crate::error::{NavError, Result};
use crate::kernel::{CellHandle, EntityId, GeometryKernel, PointLocation, SurfaceHandle};
use crate::model::Model;
use crate::ray::{assert_unit, InternalRay};
use crate::settings::BOUNDARY_CHECK_DISTANCE;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::KernelError;
    use crate::mesh::FacetKernel;
    use crate::properties::ModelProperties;
    use approx::assert_relative_eq;
    use std::path::Path;

    fn context() -> NavigationContext<FacetKernel> {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/data/nested_cubes.toml");
        let model =
            Model::initialize(FacetKernel::new(), &path, 1e-3, ModelProperties::default()).unwrap();
        let mut nav = NavigationContext::new(model);
        nav.enable_thread_support(2);
        nav
    }

    #[test]
    fn locates_cells_strictly_inside() {
        let nav = context();
        let dir = Vector3::new(0.0, 0.0, 1.0);
        let found = nav
            .find_cell_handle_containing_ray(&Point3::new(2.5, 0.0, 0.0), &dir, false)
            .unwrap();
        assert_eq!(nav.model().cell_id(found), 3);
        assert_eq!(
            nav.find_cell_containing_ray(&Point3::new(9.0, 9.0, 9.0), &dir, false).unwrap(),
            4
        );
    }

    #[test]
    fn boundary_check_moves_to_the_next_cell() {
        let nav = context();
        let dir = Vector3::new(1.0, 0.0, 0.0);
        let near = Point3::new(1.0 - 1e-6, 0.0, 0.0);
        assert_eq!(nav.find_cell_containing_ray(&near, &dir, false).unwrap(), 1);
        let handle = nav.find_cell_handle_containing_ray(&near, &dir, true).unwrap();
        assert_eq!(nav.model().cell_id(handle), 2);
    }

    #[test]
    fn cache_is_filled_on_miss() {
        let nav = context();
        let dir = Vector3::new(0.0, 1.0, 0.0);
        let p = Point3::new(0.0, 1.5, 0.0);
        assert!(nav.check_found_cell_cache(&p, &dir).unwrap().is_none());
        let handle = nav.find_and_cache_cell_handle_containing_ray(&p, &dir).unwrap();
        assert_eq!(nav.check_found_cell_cache(&p, &dir).unwrap(), Some(handle));
        assert_eq!(nav.found_cell_cache().len(), 1);
    }

    #[test]
    fn external_fire() {
        let nav = context();
        let dir = Vector3::new(0.0, 0.0, -1.0);
        let (surface, distance) = nav
            .fire_external_ray(&Point3::new(0.0, 0.0, 1.5), &dir, None)
            .unwrap();
        // cell 2 is left through the inner cube below it
        assert_eq!(surface, 1);
        assert_relative_eq!(distance, 0.5, epsilon = 1e-12);

        let (surface, distance) = nav
            .fire_external_ray(&Point3::new(0.0, 0.0, 0.5), &dir, Some(1))
            .unwrap();
        assert_eq!(surface, 1);
        assert_relative_eq!(distance, 1.5, epsilon = 1e-12);
    }

    #[test]
    fn fire_in_unbounded_cell_misfires() {
        let nav = context();
        let err = nav
            .fire_external_ray(&Point3::new(5.0, 0.0, 0.0), &Vector3::new(1.0, 0.0, 0.0), None)
            .unwrap_err();
        assert!(matches!(err, NavError::RayMisfire { cell: 4, surface: None, .. }));
    }

    #[test]
    fn point_queries() {
        let nav = context();
        let dir = Vector3::new(1.0, 0.0, 0.0);
        assert_eq!(
            nav.point_location(&Point3::new(0.5, 0.0, 0.0), &dir, 1).unwrap(),
            PointLocation::Inside
        );
        assert_eq!(nav.boundary_cell(2, 2).unwrap(), 3);
        assert!(matches!(
            nav.boundary_cell(1, 3),
            Err(NavError::NoBoundaryCell { cell: 1, surface: 3 })
        ));
        let normal = nav.surface_normal(3, &Point3::new(3.0, 0.5, 0.5)).unwrap();
        assert_relative_eq!(normal, Vector3::new(1.0, 0.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn internal_ray_slots_are_independent() {
        let nav = context();
        let dir = Vector3::new(1.0, 0.0, 0.0);
        nav.set_internal_ray(0, &Point3::origin(), &dir, false).unwrap();
        assert!(nav.is_internal_ray_set(0));
        assert!(!nav.is_internal_ray_set(1));
        assert_eq!(nav.find_cell_containing_internal_ray(0), 1);
    }

    #[derive(Debug, Default, Clone)]
    struct NoHistory;

    impl crate::kernel::RayHistory for NoHistory {
        fn reset(&mut self) {}
        fn reset_to_last_intersection(&mut self) {}
    }

    /// Two cells split by one surface; every fire reports that surface one
    /// unit behind the ray.
    #[derive(Debug)]
    struct BackwardKernel;

    fn handle(raw: u64) -> CellHandle {
        CellHandle::new(raw).unwrap()
    }

    fn only_surface() -> SurfaceHandle {
        SurfaceHandle::new(1).unwrap()
    }

    impl GeometryKernel for BackwardKernel {
        type History = NoHistory;

        fn load_model(&mut self, _: &Path, _: f64) -> std::result::Result<(), KernelError> {
            Ok(())
        }
        fn build_spatial_index(&mut self) -> std::result::Result<(), KernelError> {
            Ok(())
        }
        fn cells(&self) -> Vec<CellHandle> {
            vec![handle(1), handle(2)]
        }
        fn surfaces(&self) -> Vec<SurfaceHandle> {
            vec![only_surface()]
        }
        fn discover_property_names(&self) -> std::result::Result<Vec<String>, KernelError> {
            Ok(vec!["termination.cell".to_string()])
        }
        fn assign_property_names(&mut self, _: &[String]) -> std::result::Result<(), KernelError> {
            Ok(())
        }
        fn cells_with_property(
            &self,
            name: &str,
            _: Option<&str>,
        ) -> std::result::Result<Vec<CellHandle>, KernelError> {
            Ok(if name == "termination.cell" { vec![handle(2)] } else { Vec::new() })
        }
        fn surfaces_with_property(
            &self,
            _: &str,
            _: Option<&str>,
        ) -> std::result::Result<Vec<SurfaceHandle>, KernelError> {
            Ok(Vec::new())
        }
        fn property_values(&self, _: &str) -> std::result::Result<Vec<String>, KernelError> {
            Ok(Vec::new())
        }
        fn cell_has_property(&self, _: CellHandle, _: &str) -> std::result::Result<bool, KernelError> {
            Ok(false)
        }
        fn point_in_volume(
            &self,
            cell: CellHandle,
            _: &Point3<f64>,
            _: &Vector3<f64>,
            _: Option<&NoHistory>,
        ) -> std::result::Result<PointLocation, KernelError> {
            Ok(if cell.raw() == 1 { PointLocation::Inside } else { PointLocation::Outside })
        }
        fn ray_fire(
            &self,
            _: CellHandle,
            _: &Point3<f64>,
            _: &Vector3<f64>,
            _: Option<&mut NoHistory>,
        ) -> std::result::Result<Option<(SurfaceHandle, f64)>, KernelError> {
            Ok(Some((only_surface(), -1.0)))
        }
        fn surface_normal(
            &self,
            _: SurfaceHandle,
            _: &Point3<f64>,
            _: Option<&NoHistory>,
        ) -> std::result::Result<Vector3<f64>, KernelError> {
            Ok(Vector3::x())
        }
        fn next_volume(
            &self,
            _: SurfaceHandle,
            cell: CellHandle,
        ) -> std::result::Result<Option<CellHandle>, KernelError> {
            Ok(Some(handle(3 - cell.raw())))
        }
        fn closest_boundary_distance(
            &self,
            _: CellHandle,
            _: &Point3<f64>,
        ) -> std::result::Result<f64, KernelError> {
            Ok(-1.0)
        }
        fn measure_volume(&self, _: CellHandle) -> std::result::Result<f64, KernelError> {
            Ok(1.0)
        }
        fn measure_area(&self, _: SurfaceHandle) -> std::result::Result<f64, KernelError> {
            Ok(1.0)
        }
        fn cell_id(&self, cell: CellHandle) -> EntityId {
            cell.raw()
        }
        fn surface_id(&self, surface: SurfaceHandle) -> EntityId {
            surface.raw()
        }
        fn cell_handle(&self, id: EntityId) -> Option<CellHandle> {
            (1..=2).contains(&id).then(|| handle(id))
        }
        fn surface_handle(&self, id: EntityId) -> Option<SurfaceHandle> {
            (id == 1).then(only_surface)
        }
    }

    #[test]
    fn negative_fire_distance_is_a_misfire() {
        let model = Model::initialize(
            BackwardKernel,
            Path::new("unused"),
            0.0,
            ModelProperties::default(),
        )
        .unwrap();
        let mut nav = NavigationContext::new(model);
        nav.enable_thread_support(1);
        let dir = Vector3::new(1.0, 0.0, 0.0);

        let external = nav.fire_external_ray(&Point3::origin(), &dir, None);
        assert!(matches!(
            external,
            Err(NavError::RayMisfire { cell: 1, surface: Some(1), distance: Some(d), .. }) if d < 0.0
        ));

        nav.set_internal_ray(0, &Point3::origin(), &dir, false).unwrap();
        let internal = nav.fire_internal_ray(0);
        assert!(matches!(
            internal,
            Err(NavError::RayMisfire { cell: 1, distance: Some(d), .. }) if d < 0.0
        ));
        // nothing was memoized, so the advance misfires too
        assert!(matches!(
            nav.advance_internal_ray_to_cell_boundary(0),
            Err(NavError::RayMisfire { .. })
        ));
        assert!(matches!(
            nav.distance_to_closest_boundary(0),
            Err(NavError::RayMisfire { distance: Some(d), .. }) if d < 0.0
        ));
    }

    #[test]
    #[should_panic(expected = "enable_thread_support")]
    fn slot_out_of_range_panics() {
        let nav = context();
        nav.is_internal_ray_set(5);
    }

    #[test]
    #[should_panic(expected = "unit vector")]
    fn non_unit_direction_panics() {
        let nav = context();
        let _ = nav.find_cell_handle_containing_ray(
            &Point3::origin(),
            &Vector3::new(1.0, 1.0, 1.0),
            false,
        );
    }
}

/// Slot index of the calling thread: the rayon worker index, or 0 outside a
/// rayon pool.
pub fn current_thread_id() -> usize {
    rayon::current_thread_index().unwrap_or(0)
}

/// Owner of the model, the found-cell cache and the per-thread rays.
///
/// **Context**: A transport code asks the same few questions millions of
/// times per history: where am I, how far to the next boundary, and what is on
/// the other side.
///
/// **How it Works**: Cell lookup tries the found-cell cache before scanning
/// every cell. Internal rays memoize their next crossing, and after every
/// boundary crossing the ray is fired again so the following distance query
/// is free.
#[derive(Debug)]
pub struct NavigationContext<K: GeometryKernel> {
    model: Model<K>,
    cache: FoundCellCache,
    rays: Vec<Mutex<Option<InternalRay<K::History>>>>,
}

impl<K: GeometryKernel> NavigationContext<K> {
    pub fn new(model: Model<K>) -> Self {
        Self {
            model,
            cache: FoundCellCache::new(),
            rays: Vec::new(),
        }
    }

    pub fn model(&self) -> &Model<K> {
        &self.model
    }

    pub fn found_cell_cache(&self) -> &FoundCellCache {
        &self.cache
    }

    /// Allocates one unset internal ray per thread, replacing any existing ones.
    pub fn enable_thread_support(&mut self, num_threads: usize) {
        assert!(num_threads > 0, "thread support needs at least one thread");
        self.rays = (0..num_threads).map(|_| Mutex::new(None)).collect();
        debug!("thread support enabled for {} threads", num_threads);
    }

    pub fn num_threads(&self) -> usize {
        self.rays.len()
    }

    fn slot(&self, thread: usize) -> MutexGuard<'_, Option<InternalRay<K::History>>> {
        assert!(
            thread < self.rays.len(),
            "thread {} has no internal ray: enable_thread_support was called for {} threads",
            thread,
            self.rays.len()
        );
        self.rays[thread].lock()
    }

    fn set_ray<'a>(
        slot: &'a mut Option<InternalRay<K::History>>,
        thread: usize,
    ) -> &'a mut InternalRay<K::History> {
        slot.as_mut()
            .unwrap_or_else(|| panic!("the internal ray of thread {} has not been set", thread))
    }

    /// Scans every cell for one that strictly contains the point.
    ///
    /// With `check_on_boundary`, a cell whose boundary is within
    /// [`BOUNDARY_CHECK_DISTANCE`] along the ray is replaced by the cell on the
    /// other side of it.
    pub fn find_cell_handle_containing_ray(
        &self,
        position: &Point3<f64>,
        direction: &Vector3<f64>,
        check_on_boundary: bool,
    ) -> Result<CellHandle> {
        assert_unit(direction);
        let kernel = self.model.kernel();

        let mut found = None;
        for &cell in self.model.cell_handles() {
            if kernel.point_in_volume(cell, position, direction, None)? == PointLocation::Inside {
                found = Some(cell);
                break;
            }
        }
        let cell = found.ok_or(NavError::GeometryNavigation {
            position: *position,
            direction: *direction,
        })?;

        if check_on_boundary {
            if let Some((surface, distance)) = kernel.ray_fire(cell, position, direction, None)? {
                if (0.0..BOUNDARY_CHECK_DISTANCE).contains(&distance) {
                    return self.boundary_cell_handle(cell, surface);
                }
            }
        }
        Ok(cell)
    }

    /// Tests only the cached cells. `None` is a miss, not an error.
    pub fn check_found_cell_cache(
        &self,
        position: &Point3<f64>,
        direction: &Vector3<f64>,
    ) -> Result<Option<CellHandle>> {
        assert_unit(direction);
        self.cache.checked_lookup(self.model.kernel(), position, direction)
    }

    /// The usual lookup path: the cache first, then a full scan whose result
    /// is cached.
    pub fn find_and_cache_cell_handle_containing_ray(
        &self,
        position: &Point3<f64>,
        direction: &Vector3<f64>,
    ) -> Result<CellHandle> {
        if let Some(cell) = self.check_found_cell_cache(position, direction)? {
            return Ok(cell);
        }
        let cell = self.find_cell_handle_containing_ray(position, direction, false)?;
        self.cache.add(cell);
        Ok(cell)
    }

    /// Id of the cell containing the point, optionally going through the cache.
    pub fn find_cell_containing_ray(
        &self,
        position: &Point3<f64>,
        direction: &Vector3<f64>,
        cache: bool,
    ) -> Result<EntityId> {
        let cell = if cache {
            self.find_and_cache_cell_handle_containing_ray(position, direction)?
        } else {
            self.find_cell_handle_containing_ray(position, direction, false)?
        };
        Ok(self.model.cell_id(cell))
    }

    fn checked_fire(
        &self,
        cell: CellHandle,
        position: &Point3<f64>,
        direction: &Vector3<f64>,
        history: Option<&mut K::History>,
    ) -> Result<(SurfaceHandle, f64)> {
        let hit = self
            .model
            .kernel()
            .ray_fire(cell, position, direction, history)?;
        match hit {
            Some((surface, distance)) if distance >= 0.0 => Ok((surface, distance)),
            Some((surface, distance)) => Err(NavError::misfire(
                self.model.cell_id(cell),
                Some(self.model.surface_id(surface)),
                Some(distance),
                position,
                direction,
            )),
            None => Err(NavError::misfire(
                self.model.cell_id(cell),
                None,
                None,
                position,
                direction,
            )),
        }
    }

    /// Distance to the next boundary along a stateless ray, and the surface
    /// hit there. The containing cell is located when `cell` is `None`.
    pub fn fire_external_ray(
        &self,
        position: &Point3<f64>,
        direction: &Vector3<f64>,
        cell: Option<EntityId>,
    ) -> Result<(EntityId, f64)> {
        assert_unit(direction);
        let cell = match cell {
            Some(id) => self.model.cell_handle(id)?,
            None => self.find_cell_handle_containing_ray(position, direction, false)?,
        };
        let (surface, distance) = self.checked_fire(cell, position, direction, None)?;
        Ok((self.model.surface_id(surface), distance))
    }

    /// Places the thread's ray, locating its cell.
    pub fn set_internal_ray(
        &self,
        thread: usize,
        position: &Point3<f64>,
        direction: &Vector3<f64>,
        cache_start_cell: bool,
    ) -> Result<()> {
        let cell = if cache_start_cell {
            self.find_and_cache_cell_handle_containing_ray(position, direction)?
        } else {
            self.find_cell_handle_containing_ray(position, direction, false)?
        };
        *self.slot(thread) = Some(InternalRay::new(*position, *direction, cell));
        Ok(())
    }

    /// Places the thread's ray in a known cell. The caller vouches that the
    /// cell contains the position.
    pub fn set_internal_ray_in_cell(
        &self,
        thread: usize,
        position: &Point3<f64>,
        direction: &Vector3<f64>,
        cell: EntityId,
        cache_start_cell: bool,
    ) -> Result<()> {
        let cell = self.model.cell_handle(cell)?;
        if cache_start_cell {
            self.cache.add(cell);
        }
        *self.slot(thread) = Some(InternalRay::new(*position, *direction, cell));
        Ok(())
    }

    pub fn is_internal_ray_set(&self, thread: usize) -> bool {
        self.slot(thread).is_some()
    }

    pub fn internal_ray_position(&self, thread: usize) -> Point3<f64> {
        let mut slot = self.slot(thread);
        *Self::set_ray(&mut slot, thread).position()
    }

    pub fn internal_ray_direction(&self, thread: usize) -> Vector3<f64> {
        let mut slot = self.slot(thread);
        *Self::set_ray(&mut slot, thread).direction()
    }

    /// Id of the cell the thread's ray is in.
    pub fn find_cell_containing_internal_ray(&self, thread: usize) -> EntityId {
        let mut slot = self.slot(thread);
        let cell = Self::set_ray(&mut slot, thread).cell();
        self.model.cell_id(cell)
    }

    /// Turns the ray without moving it. The current cell is kept.
    pub fn change_internal_ray_direction(&self, thread: usize, direction: &Vector3<f64>) {
        let mut slot = self.slot(thread);
        Self::set_ray(&mut slot, thread).change_direction(*direction, false);
    }

    fn fire_ray(&self, ray: &mut InternalRay<K::History>) -> Result<(SurfaceHandle, f64)> {
        if let Some(hit) = ray.intersection() {
            return Ok(hit);
        }
        let position = *ray.position();
        let direction = *ray.direction();
        let cell = ray.cell();
        let hit = self.checked_fire(cell, &position, &direction, Some(ray.history_mut()))?;
        ray.set_intersection(hit.0, hit.1);
        Ok(hit)
    }

    /// Surface and distance of the next crossing. Repeated calls without an
    /// intervening move return the cached answer.
    pub fn fire_internal_ray(&self, thread: usize) -> Result<(EntityId, f64)> {
        let mut slot = self.slot(thread);
        let (surface, distance) = self.fire_ray(Self::set_ray(&mut slot, thread))?;
        Ok((self.model.surface_id(surface), distance))
    }

    /// Moves the ray onto its next boundary and returns whether it reflected.
    ///
    /// At a reflecting surface the ray stays in its cell and its direction is
    /// mirrored about the surface normal. Otherwise it enters the neighbouring
    /// cell. Unless the new cell is a termination cell, the ray is fired again
    /// from its new state.
    pub fn advance_internal_ray_to_cell_boundary(&self, thread: usize) -> Result<bool> {
        self.advance_to_boundary(thread, None)
    }

    /// Same as [`advance_internal_ray_to_cell_boundary`], also returning the
    /// unit normal of the crossed surface at the crossing point.
    ///
    /// The normal has the surface's own orientation, whichever side the ray
    /// came from, and is the one the direction was mirrored about on a
    /// reflection.
    ///
    /// [`advance_internal_ray_to_cell_boundary`]: Self::advance_internal_ray_to_cell_boundary
    pub fn advance_internal_ray_to_cell_boundary_with_normal(
        &self,
        thread: usize,
    ) -> Result<(bool, Vector3<f64>)> {
        let mut normal = Vector3::zeros();
        let reflected = self.advance_to_boundary(thread, Some(&mut normal))?;
        Ok((reflected, normal))
    }

    fn advance_to_boundary(
        &self,
        thread: usize,
        normal_out: Option<&mut Vector3<f64>>,
    ) -> Result<bool> {
        let mut slot = self.slot(thread);
        let ray = Self::set_ray(&mut slot, thread);
        let kernel = self.model.kernel();

        let (surface, _) = self.fire_ray(ray)?;

        let reflected = if self.model.is_reflecting_surface_handle(surface) {
            let cell = ray.cell();
            ray.advance_to_intersection(cell);
            let normal = kernel.surface_normal(surface, ray.position(), Some(ray.history()))?;
            let direction = *ray.direction();
            let mirrored = direction - normal * (2.0 * direction.dot(&normal));
            ray.change_direction(mirrored.normalize(), true);
            debug!(
                "thread {} reflected off surface {}",
                thread,
                self.model.surface_id(surface)
            );
            if let Some(out) = normal_out {
                *out = normal;
            }
            true
        } else {
            let next = self.boundary_cell_handle(ray.cell(), surface)?;
            ray.advance_to_intersection(next);
            if let Some(out) = normal_out {
                *out = kernel.surface_normal(surface, ray.position(), Some(ray.history()))?;
            }
            false
        };

        if !self.model.is_termination_cell(self.model.cell_id(ray.cell())) {
            self.fire_ray(ray)?;
        }
        Ok(reflected)
    }

    /// Moves the ray `distance` along its direction without leaving its cell.
    ///
    /// Panics unless `0 <= distance <` the distance to the next boundary.
    pub fn advance_internal_ray_by_substep(&self, thread: usize, distance: f64) -> Result<()> {
        let mut slot = self.slot(thread);
        let ray = Self::set_ray(&mut slot, thread);
        self.fire_ray(ray)?;
        ray.advance_substep(distance);
        Ok(())
    }

    /// Distance from the ray to the nearest boundary of its cell in any
    /// direction.
    pub fn distance_to_closest_boundary(&self, thread: usize) -> Result<f64> {
        let mut slot = self.slot(thread);
        let ray = Self::set_ray(&mut slot, thread);
        let distance = self
            .model
            .kernel()
            .closest_boundary_distance(ray.cell(), ray.position())?;
        if distance < 0.0 {
            return Err(NavError::misfire(
                self.model.cell_id(ray.cell()),
                None,
                Some(distance),
                ray.position(),
                ray.direction(),
            ));
        }
        Ok(distance)
    }

    /// Location of a point relative to a cell, for a particle heading along
    /// `direction`.
    pub fn point_location(
        &self,
        position: &Point3<f64>,
        direction: &Vector3<f64>,
        cell: EntityId,
    ) -> Result<PointLocation> {
        assert_unit(direction);
        let handle = self.model.cell_handle(cell)?;
        Ok(self
            .model
            .kernel()
            .point_in_volume(handle, position, direction, None)?)
    }

    pub fn surface_normal(&self, surface: EntityId, position: &Point3<f64>) -> Result<Vector3<f64>> {
        let handle = self.model.surface_handle(surface)?;
        Ok(self.model.kernel().surface_normal(handle, position, None)?)
    }

    fn boundary_cell_handle(&self, cell: CellHandle, surface: SurfaceHandle) -> Result<CellHandle> {
        self.model
            .kernel()
            .next_volume(surface, cell)?
            .ok_or_else(|| NavError::NoBoundaryCell {
                cell: self.model.cell_id(cell),
                surface: self.model.surface_id(surface),
            })
    }

    /// The cell on the other side of `surface`, seen from `cell`.
    pub fn boundary_cell(&self, cell: EntityId, surface: EntityId) -> Result<EntityId> {
        let next = self.boundary_cell_handle(
            self.model.cell_handle(cell)?,
            self.model.surface_handle(surface)?,
        )?;
        Ok(self.model.cell_id(next))
    }
}
