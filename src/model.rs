//! Global navigation state built once from a model.
//!
//! A [`Model`] owns the loaded geometry kernel together with the registries
//! derived from it at initialization:
//!
//! - every cell and surface handle
//! - the termination cells, which end a history when entered
//! - the reflecting surfaces, indexed both by id and by handle
//!
//! Everything is immutable after [`Model::initialize`] returns, so a model can
//! be shared by reference between worker threads without locking.
//!
//! # Key Components
//!
//! - [`Model`]: registries and id-level queries
//! - [`EstimatorData`]: estimator declarations found in the model

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::Path;

use itertools::Itertools;
use log::{info, warn};

use crate::error::{KernelError, NavError, Result};
use crate::kernel::{CellHandle, EntityId, GeometryKernel, SurfaceHandle};
use crate::properties::{EstimatorType, ModelProperties, ParticleType};

/// Factor converting atom densities from atoms/b-cm to atoms/cm^3.
const BARN_DENSITY_FACTOR: f64 = 1e24;

/// Estimator declared on a set of cells or surfaces.
#[derive(Debug, Clone, PartialEq)]
pub struct EstimatorData {
    pub estimator_type: EstimatorType,
    pub particle_type: ParticleType,
    pub entities: Vec<EntityId>,
}

/// Registries and model-level queries over a loaded geometry.
#[derive(Debug)]
pub struct Model<K: GeometryKernel> {
    kernel: K,
    properties: ModelProperties,
    cells: Vec<CellHandle>,
    surfaces: Vec<SurfaceHandle>,
    termination_cells: HashSet<EntityId>,
    reflecting_by_id: HashMap<EntityId, SurfaceHandle>,
    reflecting_by_handle: HashMap<SurfaceHandle, EntityId>,
}

fn load_error(context: &str, err: KernelError) -> NavError {
    NavError::GeometryLoad(format!("{}: {}", context, err))
}

impl<K: GeometryKernel> Model<K> {
    /// Loads the model at `path` into `kernel` and builds the registries.
    ///
    /// Property names the model uses but `properties` does not recognize are
    /// logged and otherwise ignored. A model without any termination cell is
    /// rejected.
    pub fn initialize(
        mut kernel: K,
        path: &Path,
        facet_tolerance: f64,
        properties: ModelProperties,
    ) -> Result<Self> {
        properties.validate()?;

        kernel
            .load_model(path, facet_tolerance)
            .map_err(|e| load_error("unable to load the model", e))?;
        kernel
            .build_spatial_index()
            .map_err(|e| load_error("unable to build the spatial index", e))?;

        let recognized = properties.recognized();
        let found = kernel
            .discover_property_names()
            .map_err(|e| load_error("unable to read the model properties", e))?;
        let unknown: Vec<&String> = found.iter().filter(|n| !recognized.contains(*n)).collect();
        if !unknown.is_empty() {
            warn!(
                "the model contains unknown properties that will be ignored: {}",
                unknown.iter().join(", ")
            );
        }
        kernel
            .assign_property_names(&recognized)
            .map_err(|e| load_error("unable to parse the model properties", e))?;

        let cells = kernel.cells();
        let surfaces = kernel.surfaces();

        let termination_cells: HashSet<EntityId> = kernel
            .cells_with_property(properties.termination_cell(), None)
            .map_err(|e| load_error("unable to find the termination cells", e))?
            .into_iter()
            .map(|handle| kernel.cell_id(handle))
            .collect();
        if termination_cells.is_empty() {
            return Err(NavError::GeometryLoad(format!(
                "no cells carry the termination property '{}'",
                properties.termination_cell()
            )));
        }

        let mut reflecting_by_id = HashMap::new();
        let mut reflecting_by_handle = HashMap::new();
        for handle in kernel
            .surfaces_with_property(properties.reflecting_surface(), None)
            .map_err(|e| load_error("unable to find the reflecting surfaces", e))?
        {
            let id = kernel.surface_id(handle);
            reflecting_by_id.insert(id, handle);
            reflecting_by_handle.insert(handle, id);
        }

        info!(
            "model initialized: {} cells ({} termination), {} surfaces ({} reflecting)",
            cells.len(),
            termination_cells.len(),
            surfaces.len(),
            reflecting_by_id.len()
        );

        Ok(Self {
            kernel,
            properties,
            cells,
            surfaces,
            termination_cells,
            reflecting_by_id,
            reflecting_by_handle,
        })
    }

    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    pub fn properties(&self) -> &ModelProperties {
        &self.properties
    }

    /// Every cell handle in the model, in kernel order.
    pub fn cell_handles(&self) -> &[CellHandle] {
        &self.cells
    }

    pub fn surface_handles(&self) -> &[SurfaceHandle] {
        &self.surfaces
    }

    pub fn termination_cells(&self) -> &HashSet<EntityId> {
        &self.termination_cells
    }

    pub fn is_termination_cell(&self, cell: EntityId) -> bool {
        self.termination_cells.contains(&cell)
    }

    pub fn is_reflecting_surface(&self, surface: EntityId) -> bool {
        self.reflecting_by_id.contains_key(&surface)
    }

    pub fn is_reflecting_surface_handle(&self, surface: SurfaceHandle) -> bool {
        self.reflecting_by_handle.contains_key(&surface)
    }

    pub fn reflecting_surface_handle(&self, surface: EntityId) -> Option<SurfaceHandle> {
        self.reflecting_by_id.get(&surface).copied()
    }

    pub fn reflecting_surface_id(&self, surface: SurfaceHandle) -> Option<EntityId> {
        self.reflecting_by_handle.get(&surface).copied()
    }

    pub fn does_cell_exist(&self, cell: EntityId) -> bool {
        self.kernel.cell_handle(cell).is_some()
    }

    pub fn does_surface_exist(&self, surface: EntityId) -> bool {
        self.kernel.surface_handle(surface).is_some()
    }

    pub fn cell_id(&self, cell: CellHandle) -> EntityId {
        self.kernel.cell_id(cell)
    }

    pub fn surface_id(&self, surface: SurfaceHandle) -> EntityId {
        self.kernel.surface_id(surface)
    }

    pub(crate) fn cell_handle(&self, cell: EntityId) -> Result<CellHandle> {
        self.kernel
            .cell_handle(cell)
            .ok_or_else(|| KernelError::Other(format!("cell {} does not exist", cell)).into())
    }

    pub(crate) fn surface_handle(&self, surface: EntityId) -> Result<SurfaceHandle> {
        self.kernel
            .surface_handle(surface)
            .ok_or_else(|| KernelError::Other(format!("surface {} does not exist", surface)).into())
    }

    /// Volume of a cell. A non-positive measure means the cell is unbounded
    /// or badly tessellated, and is an error.
    pub fn cell_volume(&self, cell: EntityId) -> Result<f64> {
        let volume = self.kernel.measure_volume(self.cell_handle(cell)?)?;
        if volume <= 0.0 {
            return Err(KernelError::Other(format!(
                "cell {} has a non-positive volume ({})",
                cell, volume
            ))
            .into());
        }
        Ok(volume)
    }

    pub fn surface_area(&self, surface: EntityId) -> Result<f64> {
        let area = self.kernel.measure_area(self.surface_handle(surface)?)?;
        if area <= 0.0 {
            return Err(KernelError::Other(format!(
                "surface {} has a non-positive area ({})",
                surface, area
            ))
            .into());
        }
        Ok(area)
    }

    /// A cell without a material is void.
    pub fn is_void_cell(&self, cell: EntityId) -> Result<bool> {
        let handle = self.cell_handle(cell)?;
        Ok(!self
            .kernel
            .cell_has_property(handle, self.properties.material())?)
    }

    /// Cell ids, optionally leaving out void and termination cells.
    pub fn cells(&self, include_void: bool, include_termination: bool) -> Result<BTreeSet<EntityId>> {
        let mut ids = BTreeSet::new();
        for &handle in &self.cells {
            let id = self.kernel.cell_id(handle);
            if !include_termination && self.is_termination_cell(id) {
                continue;
            }
            if !include_void && self.is_void_cell(id)? {
                continue;
            }
            ids.insert(id);
        }
        Ok(ids)
    }

    pub fn surfaces(&self) -> BTreeSet<EntityId> {
        self.surfaces
            .iter()
            .map(|&handle| self.kernel.surface_id(handle))
            .collect()
    }

    // Cells carrying each value of a property.
    fn cells_by_value(&self, name: &str) -> Result<Vec<(String, Vec<EntityId>)>> {
        let values = self.kernel.property_values(name)?;
        values
            .into_iter()
            .map(|value| -> Result<(String, Vec<EntityId>)> {
                let cells = self
                    .kernel
                    .cells_with_property(name, Some(&value))?
                    .into_iter()
                    .map(|handle| self.kernel.cell_id(handle))
                    .collect();
                Ok((value, cells))
            })
            .collect()
    }

    fn surfaces_by_value(&self, name: &str) -> Result<Vec<(String, Vec<EntityId>)>> {
        let values = self.kernel.property_values(name)?;
        values
            .into_iter()
            .map(|value| -> Result<(String, Vec<EntityId>)> {
                let surfaces = self
                    .kernel
                    .surfaces_with_property(name, Some(&value))?
                    .into_iter()
                    .map(|handle| self.kernel.surface_id(handle))
                    .collect();
                Ok((value, surfaces))
            })
            .collect()
    }

    fn parse_material_id(value: &str) -> Result<u64> {
        if value.is_empty() || !value.chars().all(|c| c.is_ascii_digit()) {
            return Err(NavError::GeometryLoad(format!(
                "material id '{}' is not a non-negative integer",
                value
            )));
        }
        value
            .parse()
            .map_err(|_| NavError::GeometryLoad(format!("material id '{}' is out of range", value)))
    }

    /// Every material id used in the model.
    pub fn material_ids(&self) -> Result<BTreeSet<u64>> {
        self.kernel
            .property_values(self.properties.material())?
            .iter()
            .map(|value| Self::parse_material_id(value))
            .collect()
    }

    /// Material id of every non-void cell.
    pub fn cell_material_ids(&self) -> Result<BTreeMap<EntityId, u64>> {
        let mut materials = BTreeMap::new();
        for (value, cells) in self.cells_by_value(self.properties.material())? {
            let material = Self::parse_material_id(&value)?;
            for cell in cells {
                if materials.insert(cell, material).is_some() {
                    return Err(NavError::GeometryLoad(format!(
                        "cell {} has more than one material",
                        cell
                    )));
                }
            }
        }
        Ok(materials)
    }

    /// Density of every cell that declares one.
    ///
    /// Positive values are atom densities in atoms/b-cm and are returned in
    /// atoms/cm^3. Negative values are mass densities and are returned as-is.
    pub fn cell_densities(&self) -> Result<BTreeMap<EntityId, f64>> {
        let mut densities = BTreeMap::new();
        for (value, cells) in self.cells_by_value(self.properties.density())? {
            if value.is_empty() || !value.chars().all(|c| "-.0123456789".contains(c)) {
                return Err(NavError::GeometryLoad(format!("density '{}' is not a number", value)));
            }
            let mut density: f64 = value
                .parse()
                .map_err(|_| NavError::GeometryLoad(format!("density '{}' is not a number", value)))?;
            if density > 0.0 {
                density *= BARN_DENSITY_FACTOR;
            }
            for cell in cells {
                if densities.insert(cell, density).is_some() {
                    return Err(NavError::GeometryLoad(format!(
                        "cell {} has more than one density",
                        cell
                    )));
                }
            }
        }
        Ok(densities)
    }

    fn estimator_data(
        &self,
        tagged: Vec<(String, Vec<EntityId>)>,
        kind: &str,
        accepts: fn(EstimatorType) -> bool,
    ) -> Result<BTreeMap<u64, EstimatorData>> {
        let mut estimators = BTreeMap::new();
        for (value, entities) in tagged {
            // values only found on the other kind of entity
            if entities.is_empty() {
                continue;
            }
            let property = self.properties.parse_estimator_property(&value)?;
            if estimators.contains_key(&property.id) {
                return Err(NavError::estimator(
                    &value,
                    format!("estimator id {} is used more than once", property.id),
                ));
            }
            if !accepts(property.estimator_type) {
                return Err(NavError::estimator(
                    &value,
                    format!("not a valid {} estimator type", kind),
                ));
            }
            estimators.insert(
                property.id,
                EstimatorData {
                    estimator_type: property.estimator_type,
                    particle_type: property.particle_type,
                    entities,
                },
            );
        }
        Ok(estimators)
    }

    /// Estimators declared on cells, by estimator id.
    pub fn cell_estimator_data(&self) -> Result<BTreeMap<u64, EstimatorData>> {
        let tagged = self.cells_by_value(self.properties.estimator())?;
        self.estimator_data(tagged, "cell", EstimatorType::is_cell_estimator)
    }

    /// Estimators declared on surfaces, by estimator id.
    pub fn surface_estimator_data(&self) -> Result<BTreeMap<u64, EstimatorData>> {
        let tagged = self.surfaces_by_value(self.properties.estimator())?;
        self.estimator_data(tagged, "surface", EstimatorType::is_surface_estimator)
    }
}
