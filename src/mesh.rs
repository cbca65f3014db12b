//! Triangle-mesh geometry kernel.
//!
//! A model is a TOML manifest that points at a Wavefront OBJ file and lays out
//! the topology on top of it: every OBJ object is one surface, every surface
//! separates exactly two cells, and cells and surfaces carry property tags.
//!
//! ```toml
//! mesh = "nested_cubes.obj"
//!
//! [[cells]]
//! id = 1
//! properties = ["material_1", "density_-8.0"]
//!
//! [[surfaces]]
//! id = 1
//! object = "inner"   # OBJ object name
//! forward = 1        # facet normals point out of this cell
//! reverse = 2
//! properties = ["reflecting.surface"]
//! ```
//!
//! Property tags are `name` or `name_value`. The underscore is the separator,
//! which is why property names themselves may not contain one.
//!
//! # Key Components
//!
//! - [`FacetKernel`]: the [`GeometryKernel`] implementation
//! - [`FacetHistory`]: facets already crossed by a ray
//! - [`AABB`]: per-surface bounding boxes used to skip ray tests

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};

use log::{debug, info};
use nalgebra::{Point3, Vector3};
use serde::Deserialize;

use crate::error::KernelError;
use crate::kernel::{
    CellHandle, EntityId, GeometryKernel, PointLocation, RayHistory, SurfaceHandle,
};
use crate::settings::{BARYCENTRIC_TOLERANCE, ON_SURFACE_TOLERANCE};


const CELL_TAG: u64 = 3 << 32;
const SURFACE_TAG: u64 = 2 << 32;
const INDEX_MASK: u64 = 0xFFFF_FFFF;

/// Axis-aligned bounding box for spatial acceleration structures.
///
/// **Context**: Testing a ray against every facet of every surface of a cell
/// is wasteful when most surfaces are nowhere near the ray.
///
/// **How it Works**: Stores minimum and maximum coordinates along each axis.
/// A slab test rejects surfaces whose box the ray never enters.
#[derive(Debug, Clone, PartialEq)]
pub struct AABB {
    pub min: Point3<f64>,
    pub max: Point3<f64>,
}

impl AABB {
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Point3<f64>>) -> Self {
        let mut min = Point3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY);
        let mut max = Point3::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY);
        for p in points {
            for i in 0..3 {
                min[i] = min[i].min(p[i]);
                max[i] = max[i].max(p[i]);
            }
        }
        Self { min, max }
    }

    /// Grows the box by `margin` on every side.
    pub fn expanded(&self, margin: f64) -> Self {
        let m = Vector3::repeat(margin);
        Self {
            min: self.min - m,
            max: self.max + m,
        }
    }

    /// Slab test for the half-line `origin + t * direction`, `t >= 0`.
    pub fn hit_by_ray(&self, origin: &Point3<f64>, direction: &Vector3<f64>) -> bool {
        let mut t_min: f64 = 0.0;
        let mut t_max = f64::INFINITY;
        for i in 0..3 {
            if direction[i].abs() < f64::EPSILON {
                if origin[i] < self.min[i] || origin[i] > self.max[i] {
                    return false;
                }
                continue;
            }
            let inv = 1.0 / direction[i];
            let mut t0 = (self.min[i] - origin[i]) * inv;
            let mut t1 = (self.max[i] - origin[i]) * inv;
            if t0 > t1 {
                std::mem::swap(&mut t0, &mut t1);
            }
            t_min = t_min.max(t0);
            t_max = t_max.min(t1);
            if t_min > t_max {
                return false;
            }
        }
        true
    }
}

/// Represents a triangular facet of a surface mesh.
#[derive(Debug, Clone, PartialEq)]
struct Facet {
    vertices: [Point3<f64>; 3],
    normal: Vector3<f64>, // unit normal from the vertex winding
    area: f64,
}

impl Facet {
    fn new(a: Point3<f64>, b: Point3<f64>, c: Point3<f64>) -> Self {
        let cross = (b - a).cross(&(c - a));
        let area = 0.5 * cross.norm();
        let normal = if area > 0.0 { cross.normalize() } else { Vector3::zeros() };
        Self {
            vertices: [a, b, c],
            normal,
            area,
        }
    }

    /// Möller-Trumbore intersection, returning the ray parameter.
    fn intersect(&self, origin: &Point3<f64>, direction: &Vector3<f64>) -> Option<f64> {
        let [a, b, c] = &self.vertices;
        let e1 = b - a;
        let e2 = c - a;
        let p = direction.cross(&e2);
        let det = e1.dot(&p);
        if det.abs() < 1e-14 {
            return None;
        }
        let inv = 1.0 / det;
        let s = origin - a;
        let u = s.dot(&p) * inv;
        if u < -BARYCENTRIC_TOLERANCE || u > 1.0 + BARYCENTRIC_TOLERANCE {
            return None;
        }
        let q = s.cross(&e1);
        let v = direction.dot(&q) * inv;
        if v < -BARYCENTRIC_TOLERANCE || u + v > 1.0 + BARYCENTRIC_TOLERANCE {
            return None;
        }
        Some(e2.dot(&q) * inv)
    }

    /// Distance from a point to the closest point of the triangle.
    fn distance_to(&self, p: &Point3<f64>) -> f64 {
        (p - self.closest_point(p)).norm()
    }

    // Voronoi-region walk over vertices, edges and the face.
    fn closest_point(&self, p: &Point3<f64>) -> Point3<f64> {
        let [a, b, c] = self.vertices;
        let ab = b - a;
        let ac = c - a;
        let ap = p - a;
        let d1 = ab.dot(&ap);
        let d2 = ac.dot(&ap);
        if d1 <= 0.0 && d2 <= 0.0 {
            return a;
        }

        let bp = p - b;
        let d3 = ab.dot(&bp);
        let d4 = ac.dot(&bp);
        if d3 >= 0.0 && d4 <= d3 {
            return b;
        }

        let vc = d1 * d4 - d3 * d2;
        if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
            return a + ab * (d1 / (d1 - d3));
        }

        let cp = p - c;
        let d5 = ab.dot(&cp);
        let d6 = ac.dot(&cp);
        if d6 >= 0.0 && d5 <= d6 {
            return c;
        }

        let vb = d5 * d2 - d1 * d6;
        if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
            return a + ac * (d2 / (d2 - d6));
        }

        let va = d3 * d6 - d5 * d4;
        if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
            let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
            return b + (c - b) * w;
        }

        let denom = 1.0 / (va + vb + vc);
        a + ab * (vb * denom) + ac * (vc * denom)
    }

    // Contribution to the enclosed volume (divergence theorem).
    fn signed_volume(&self) -> f64 {
        let [a, b, c] = &self.vertices;
        a.coords.dot(&b.coords.cross(&c.coords)) / 6.0
    }
}

/// Facets a ray has crossed, as `(surface index, facet index)` pairs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FacetHistory {
    crossings: Vec<(usize, usize)>,
}

impl FacetHistory {
    pub fn crossings(&self) -> &[(usize, usize)] {
        &self.crossings
    }

    fn contains(&self, surface: usize, facet: usize) -> bool {
        self.crossings.contains(&(surface, facet))
    }

    fn last(&self) -> Option<(usize, usize)> {
        self.crossings.last().copied()
    }
}

impl RayHistory for FacetHistory {
    fn reset(&mut self) {
        self.crossings.clear();
    }

    fn reset_to_last_intersection(&mut self) {
        if let Some(last) = self.crossings.pop() {
            self.crossings.clear();
            self.crossings.push(last);
        }
    }
}

#[derive(Debug, Deserialize)]
struct Manifest {
    mesh: PathBuf,
    #[serde(default)]
    cells: Vec<CellEntry>,
    #[serde(default)]
    surfaces: Vec<SurfaceEntry>,
}

#[derive(Debug, Deserialize)]
struct CellEntry {
    id: EntityId,
    #[serde(default)]
    properties: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct SurfaceEntry {
    id: EntityId,
    object: String,
    forward: EntityId,
    reverse: EntityId,
    #[serde(default)]
    properties: Vec<String>,
}

/// A property tag split at the first underscore.
#[derive(Debug, Clone, PartialEq)]
struct Tag {
    name: String,
    value: Option<String>,
}

impl Tag {
    fn parse(raw: &str) -> Self {
        match raw.split_once('_') {
            Some((name, value)) => Tag {
                name: name.to_string(),
                value: Some(value.to_string()),
            },
            None => Tag {
                name: raw.to_string(),
                value: None,
            },
        }
    }

    fn matches(&self, name: &str, value: Option<&str>) -> bool {
        self.name == name && value.map_or(true, |v| self.value.as_deref() == Some(v))
    }
}

#[derive(Debug, Clone)]
struct MeshSurface {
    id: EntityId,
    facets: Vec<Facet>,
    forward: usize,
    reverse: usize,
    tags: Vec<Tag>,
    bounds: Option<AABB>,
}

#[derive(Debug, Clone)]
struct MeshCell {
    id: EntityId,
    tags: Vec<Tag>,
    // (surface index, +1 when this cell is the forward side)
    boundary: Vec<(usize, f64)>,
    signed_volume: Option<f64>,
}

/// Geometry kernel over a faceted OBJ model.
///
/// **Context**: The navigation core consumes a solid-model engine through a
/// narrow set of primitives. This kernel provides them for pre-faceted
/// models, which makes the whole stack usable and testable without a CAD
/// engine.
///
/// **How it Works**: Each surface keeps its facets with normals pointing out
/// of its forward cell, so a cell sees a facet as outward when it is the
/// forward side and inward otherwise. Ray fire only accepts facets the ray
/// leaves the cell through, and skips facets already in the ray history.
#[derive(Debug, Clone, Default)]
pub struct FacetKernel {
    cells: Vec<MeshCell>,
    surfaces: Vec<MeshSurface>,
    cell_index: HashMap<EntityId, usize>,
    surface_index: HashMap<EntityId, usize>,
    parsed_properties: HashSet<String>,
    faceting_tolerance: f64,
    loaded: bool,
    indexed: bool,
}

impl FacetKernel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Faceting tolerance the model was loaded with.
    pub fn faceting_tolerance(&self) -> f64 {
        self.faceting_tolerance
    }

    fn check_ready(&self) -> Result<(), KernelError> {
        if !self.loaded {
            return Err(KernelError::NotLoaded);
        }
        if !self.indexed {
            return Err(KernelError::NoSpatialIndex);
        }
        Ok(())
    }

    fn cell_index_of(&self, handle: CellHandle) -> Result<usize, KernelError> {
        let raw = handle.raw();
        let index = ((raw & INDEX_MASK) as usize).wrapping_sub(1);
        if raw & !INDEX_MASK != CELL_TAG || index >= self.cells.len() {
            return Err(KernelError::UnknownEntity(raw));
        }
        Ok(index)
    }

    fn cell_at(&self, handle: CellHandle) -> Result<&MeshCell, KernelError> {
        Ok(&self.cells[self.cell_index_of(handle)?])
    }

    fn surface_index_of(&self, handle: SurfaceHandle) -> Result<usize, KernelError> {
        let raw = handle.raw();
        let index = ((raw & INDEX_MASK) as usize).wrapping_sub(1);
        if raw & !INDEX_MASK != SURFACE_TAG || index >= self.surfaces.len() {
            return Err(KernelError::UnknownEntity(raw));
        }
        Ok(index)
    }

    fn cell_handle_at(index: usize) -> CellHandle {
        CellHandle::new(CELL_TAG | (index as u64 + 1)).expect("tagged handles are non-zero")
    }

    fn surface_handle_at(index: usize) -> SurfaceHandle {
        SurfaceHandle::new(SURFACE_TAG | (index as u64 + 1)).expect("tagged handles are non-zero")
    }

    fn is_parsed(&self, name: &str) -> bool {
        self.parsed_properties.contains(name)
    }

    // Outward facets of a cell: (surface index, facet index, outward normal, facet).
    fn cell_facets<'a>(
        &'a self,
        cell: &'a MeshCell,
    ) -> impl Iterator<Item = (usize, usize, Vector3<f64>, &'a Facet)> + 'a {
        cell.boundary.iter().flat_map(move |&(s, sense)| {
            self.surfaces[s]
                .facets
                .iter()
                .enumerate()
                .map(move |(f, facet)| (s, f, facet.normal * sense, facet))
        })
    }

    fn closest_facet(
        &self,
        cell: &MeshCell,
        position: &Point3<f64>,
    ) -> Option<(f64, usize, usize, Vector3<f64>)> {
        self.cell_facets(cell)
            .map(|(s, f, outward, facet)| (facet.distance_to(position), s, f, outward))
            .min_by(|a, b| a.0.total_cmp(&b.0))
    }

    fn read_manifest(path: &Path) -> Result<Manifest, KernelError> {
        let text = std::fs::read_to_string(path).map_err(|e| KernelError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        toml::from_str(&text).map_err(|e| KernelError::Parse(e.to_string()))
    }

    fn read_objects(path: &Path) -> Result<HashMap<String, Vec<Facet>>, KernelError> {
        let (models, _) = tobj::load_obj(
            path,
            &tobj::LoadOptions {
                triangulate: true,
                ..Default::default()
            },
        )
        .map_err(|e| KernelError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        let mut objects = HashMap::new();
        for model in models {
            let mesh = &model.mesh;
            let vertices: Vec<Point3<f64>> = mesh
                .positions
                .chunks_exact(3)
                .map(|p| Point3::new(p[0] as f64, p[1] as f64, p[2] as f64))
                .collect();
            let facets = mesh
                .indices
                .chunks_exact(3)
                .map(|tri| {
                    Facet::new(
                        vertices[tri[0] as usize],
                        vertices[tri[1] as usize],
                        vertices[tri[2] as usize],
                    )
                })
                .filter(|facet| facet.area > 0.0)
                .collect();
            objects.insert(model.name.clone(), facets);
        }
        Ok(objects)
    }
}

impl GeometryKernel for FacetKernel {
    type History = FacetHistory;

    fn load_model(&mut self, path: &Path, faceting_tolerance: f64) -> Result<(), KernelError> {
        let manifest = Self::read_manifest(path)?;
        let mesh_path = path
            .parent()
            .map(|dir| dir.join(&manifest.mesh))
            .unwrap_or_else(|| manifest.mesh.clone());
        let mut objects = Self::read_objects(&mesh_path)?;

        let mut cells = Vec::with_capacity(manifest.cells.len());
        let mut cell_index = HashMap::new();
        for (i, entry) in manifest.cells.iter().enumerate() {
            if cell_index.insert(entry.id, i).is_some() {
                return Err(KernelError::Parse(format!("cell {} is defined twice", entry.id)));
            }
            cells.push(MeshCell {
                id: entry.id,
                tags: entry.properties.iter().map(|t| Tag::parse(t)).collect(),
                boundary: Vec::new(),
                signed_volume: None,
            });
        }

        let mut surfaces = Vec::with_capacity(manifest.surfaces.len());
        let mut surface_index = HashMap::new();
        for (i, entry) in manifest.surfaces.iter().enumerate() {
            if surface_index.insert(entry.id, i).is_some() {
                return Err(KernelError::Parse(format!("surface {} is defined twice", entry.id)));
            }
            let facets = objects.remove(&entry.object).ok_or_else(|| {
                KernelError::Parse(format!(
                    "surface {} refers to missing mesh object '{}'",
                    entry.id, entry.object
                ))
            })?;
            let side = |id: EntityId| {
                cell_index.get(&id).copied().ok_or_else(|| {
                    KernelError::Parse(format!("surface {} borders unknown cell {}", entry.id, id))
                })
            };
            let forward = side(entry.forward)?;
            let reverse = side(entry.reverse)?;
            if forward == reverse {
                return Err(KernelError::Parse(format!(
                    "surface {} has cell {} on both sides",
                    entry.id, entry.forward
                )));
            }
            cells[forward].boundary.push((i, 1.0));
            cells[reverse].boundary.push((i, -1.0));
            surfaces.push(MeshSurface {
                id: entry.id,
                facets,
                forward,
                reverse,
                tags: entry.properties.iter().map(|t| Tag::parse(t)).collect(),
                bounds: None,
            });
        }

        info!(
            "loaded {} cells and {} surfaces from {}",
            cells.len(),
            surfaces.len(),
            path.display()
        );
        debug!("faceting tolerance {} (model is pre-faceted)", faceting_tolerance);

        *self = FacetKernel {
            cells,
            surfaces,
            cell_index,
            surface_index,
            parsed_properties: HashSet::new(),
            faceting_tolerance,
            loaded: true,
            indexed: false,
        };
        Ok(())
    }

    fn build_spatial_index(&mut self) -> Result<(), KernelError> {
        if !self.loaded {
            return Err(KernelError::NotLoaded);
        }
        for surface in &mut self.surfaces {
            if surface.facets.is_empty() {
                return Err(KernelError::Other(format!("surface {} has no facets", surface.id)));
            }
            let bounds = AABB::from_points(surface.facets.iter().flat_map(|f| f.vertices.iter()));
            surface.bounds = Some(bounds.expanded(ON_SURFACE_TOLERANCE));
        }
        let surface_volumes: Vec<f64> = self
            .surfaces
            .iter()
            .map(|s| s.facets.iter().map(Facet::signed_volume).sum())
            .collect();
        for cell in &mut self.cells {
            let volume = cell
                .boundary
                .iter()
                .map(|&(s, sense)| sense * surface_volumes[s])
                .sum();
            cell.signed_volume = Some(volume);
        }
        self.indexed = true;
        Ok(())
    }

    fn cells(&self) -> Vec<CellHandle> {
        (0..self.cells.len()).map(Self::cell_handle_at).collect()
    }

    fn surfaces(&self) -> Vec<SurfaceHandle> {
        (0..self.surfaces.len()).map(Self::surface_handle_at).collect()
    }

    fn discover_property_names(&self) -> Result<Vec<String>, KernelError> {
        if !self.loaded {
            return Err(KernelError::NotLoaded);
        }
        let names: BTreeSet<&str> = self
            .cells
            .iter()
            .flat_map(|c| c.tags.iter())
            .chain(self.surfaces.iter().flat_map(|s| s.tags.iter()))
            .map(|t| t.name.as_str())
            .collect();
        Ok(names.into_iter().map(String::from).collect())
    }

    fn assign_property_names(&mut self, names: &[String]) -> Result<(), KernelError> {
        if !self.loaded {
            return Err(KernelError::NotLoaded);
        }
        self.parsed_properties = names.iter().cloned().collect();
        Ok(())
    }

    fn cells_with_property(
        &self,
        name: &str,
        value: Option<&str>,
    ) -> Result<Vec<CellHandle>, KernelError> {
        if !self.loaded {
            return Err(KernelError::NotLoaded);
        }
        if !self.is_parsed(name) {
            return Ok(Vec::new());
        }
        Ok(self
            .cells
            .iter()
            .enumerate()
            .filter(|(_, c)| c.tags.iter().any(|t| t.matches(name, value)))
            .map(|(i, _)| Self::cell_handle_at(i))
            .collect())
    }

    fn surfaces_with_property(
        &self,
        name: &str,
        value: Option<&str>,
    ) -> Result<Vec<SurfaceHandle>, KernelError> {
        if !self.loaded {
            return Err(KernelError::NotLoaded);
        }
        if !self.is_parsed(name) {
            return Ok(Vec::new());
        }
        Ok(self
            .surfaces
            .iter()
            .enumerate()
            .filter(|(_, s)| s.tags.iter().any(|t| t.matches(name, value)))
            .map(|(i, _)| Self::surface_handle_at(i))
            .collect())
    }

    fn property_values(&self, name: &str) -> Result<Vec<String>, KernelError> {
        if !self.loaded {
            return Err(KernelError::NotLoaded);
        }
        if !self.is_parsed(name) {
            return Ok(Vec::new());
        }
        let values: BTreeSet<&str> = self
            .cells
            .iter()
            .flat_map(|c| c.tags.iter())
            .chain(self.surfaces.iter().flat_map(|s| s.tags.iter()))
            .filter(|t| t.name == name)
            .filter_map(|t| t.value.as_deref())
            .collect();
        Ok(values.into_iter().map(String::from).collect())
    }

    fn cell_has_property(&self, cell: CellHandle, name: &str) -> Result<bool, KernelError> {
        let cell = self.cell_at(cell)?;
        Ok(self.is_parsed(name) && cell.tags.iter().any(|t| t.name == name))
    }

    fn point_in_volume(
        &self,
        cell: CellHandle,
        position: &Point3<f64>,
        direction: &Vector3<f64>,
        history: Option<&FacetHistory>,
    ) -> Result<PointLocation, KernelError> {
        self.check_ready()?;
        let cell = self.cell_at(cell)?;

        if let Some((distance, _, _, outward)) = self.closest_facet(cell, position) {
            if distance < ON_SURFACE_TOLERANCE {
                let cosine = outward.dot(direction);
                return Ok(if cosine < -ON_SURFACE_TOLERANCE {
                    PointLocation::Inside
                } else if cosine > ON_SURFACE_TOLERANCE {
                    PointLocation::Outside
                } else {
                    PointLocation::OnBoundary
                });
            }
        }

        // The first facet met along the probe ray decides: leaving through it
        // means the point was inside.
        let nearest = self
            .cell_facets(cell)
            .filter(|(s, f, _, _)| history.map_or(true, |h| !h.contains(*s, *f)))
            .filter_map(|(_, _, outward, facet)| {
                facet
                    .intersect(position, direction)
                    .filter(|t| *t >= 0.0)
                    .map(|t| (t, outward))
            })
            .min_by(|a, b| a.0.total_cmp(&b.0));

        Ok(match nearest {
            Some((_, outward)) if outward.dot(direction) > 0.0 => PointLocation::Inside,
            Some(_) => PointLocation::Outside,
            None if cell.signed_volume.unwrap_or(0.0) < 0.0 => PointLocation::Inside,
            None => PointLocation::Outside,
        })
    }

    fn ray_fire(
        &self,
        cell: CellHandle,
        position: &Point3<f64>,
        direction: &Vector3<f64>,
        history: Option<&mut FacetHistory>,
    ) -> Result<Option<(SurfaceHandle, f64)>, KernelError> {
        self.check_ready()?;
        let cell = self.cell_at(cell)?;

        let mut best: Option<(f64, usize, usize)> = None;
        for &(s, sense) in &cell.boundary {
            let surface = &self.surfaces[s];
            if let Some(bounds) = &surface.bounds {
                if !bounds.hit_by_ray(position, direction) {
                    continue;
                }
            }
            for (f, facet) in surface.facets.iter().enumerate() {
                if history.as_ref().map_or(false, |h| h.contains(s, f)) {
                    continue;
                }
                if (facet.normal * sense).dot(direction) <= 0.0 {
                    continue;
                }
                if let Some(t) = facet.intersect(position, direction) {
                    if t > -ON_SURFACE_TOLERANCE && best.map_or(true, |(bt, _, _)| t < bt) {
                        best = Some((t, s, f));
                    }
                }
            }
        }

        Ok(best.map(|(t, s, f)| {
            if let Some(history) = history {
                history.crossings.push((s, f));
            }
            // a crossing within ON_SURFACE_TOLERANCE behind the ray is the
            // facet it sits on, reported at zero distance
            (Self::surface_handle_at(s), t.max(0.0))
        }))
    }

    fn surface_normal(
        &self,
        surface: SurfaceHandle,
        position: &Point3<f64>,
        history: Option<&FacetHistory>,
    ) -> Result<Vector3<f64>, KernelError> {
        self.check_ready()?;
        let index = self.surface_index_of(surface)?;
        let mesh = &self.surfaces[index];

        if let Some((s, f)) = history.and_then(FacetHistory::last) {
            if s == index {
                return Ok(mesh.facets[f].normal);
            }
        }
        mesh.facets
            .iter()
            .min_by(|a, b| a.distance_to(position).total_cmp(&b.distance_to(position)))
            .map(|facet| facet.normal)
            .ok_or_else(|| KernelError::Other(format!("surface {} has no facets", mesh.id)))
    }

    fn next_volume(
        &self,
        surface: SurfaceHandle,
        cell: CellHandle,
    ) -> Result<Option<CellHandle>, KernelError> {
        let mesh = &self.surfaces[self.surface_index_of(surface)?];
        let current = self.cell_index_of(cell)?;
        Ok(if mesh.forward == current {
            Some(Self::cell_handle_at(mesh.reverse))
        } else if mesh.reverse == current {
            Some(Self::cell_handle_at(mesh.forward))
        } else {
            None
        })
    }

    fn closest_boundary_distance(
        &self,
        cell: CellHandle,
        position: &Point3<f64>,
    ) -> Result<f64, KernelError> {
        self.check_ready()?;
        let cell = self.cell_at(cell)?;
        Ok(self
            .closest_facet(cell, position)
            .map_or(-1.0, |(distance, _, _, _)| distance))
    }

    fn measure_volume(&self, cell: CellHandle) -> Result<f64, KernelError> {
        self.check_ready()?;
        self.cell_at(cell)?
            .signed_volume
            .ok_or(KernelError::NoSpatialIndex)
    }

    fn measure_area(&self, surface: SurfaceHandle) -> Result<f64, KernelError> {
        let index = self.surface_index_of(surface)?;
        Ok(self.surfaces[index].facets.iter().map(|f| f.area).sum())
    }

    fn cell_id(&self, cell: CellHandle) -> EntityId {
        self.cell_at(cell)
            .map(|c| c.id)
            .unwrap_or_else(|e| panic!("{}", e))
    }

    fn surface_id(&self, surface: SurfaceHandle) -> EntityId {
        self.surface_index_of(surface)
            .map(|i| self.surfaces[i].id)
            .unwrap_or_else(|e| panic!("{}", e))
    }

    fn cell_handle(&self, id: EntityId) -> Option<CellHandle> {
        self.cell_index.get(&id).map(|&i| Self::cell_handle_at(i))
    }

    fn surface_handle(&self, id: EntityId) -> Option<SurfaceHandle> {
        self.surface_index.get(&id).map(|&i| Self::surface_handle_at(i))
    }
}
