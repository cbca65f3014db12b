//! Property names recognized in a model and the estimator property grammar.
//!
//! Cells and surfaces are tagged with `name` or `name_value` strings. Five
//! names carry meaning for navigation and scoring:
//!
//! - termination cell (default `termination.cell`)
//! - reflecting surface (default `reflecting.surface`)
//! - material (default `material`)
//! - density (default `density`)
//! - estimator (default `estimator`)
//!
//! Estimator values follow `id.type.particletype`, e.g. `3.cell.tl.flux.n`.
//! The type itself may contain dots, so the value is split at its first and
//! last dot.

use std::fmt;

use serde::Deserialize;

use crate::error::{NavError, Result};
use crate::kernel::EntityId;


/// Kinds of estimator that can be attached to model entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EstimatorType {
    SurfaceCurrent,
    SurfaceFlux,
    CellPulseHeight,
    CellTrackLengthFlux,
    CellCollisionFlux,
}

impl EstimatorType {
    pub fn is_cell_estimator(self) -> bool {
        matches!(
            self,
            EstimatorType::CellPulseHeight
                | EstimatorType::CellTrackLengthFlux
                | EstimatorType::CellCollisionFlux
        )
    }

    pub fn is_surface_estimator(self) -> bool {
        !self.is_cell_estimator()
    }
}

/// Particle an estimator scores. Only neutrons, photons and electrons are tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParticleType {
    Neutron,
    Photon,
    Electron,
}

impl ParticleType {
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "n" => Some(ParticleType::Neutron),
            "p" => Some(ParticleType::Photon),
            "e" => Some(ParticleType::Electron),
            _ => None,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            ParticleType::Neutron => "n",
            ParticleType::Photon => "p",
            ParticleType::Electron => "e",
        }
    }
}

impl fmt::Display for ParticleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A parsed `id.type.particletype` estimator value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EstimatorProperty {
    pub id: EntityId,
    pub estimator_type: EstimatorType,
    pub particle_type: ParticleType,
}

/// The configurable property and estimator type names of a model.
///
/// Names may not contain `_`, which separates a property name from its value
/// in the model. Setters validate this; a deserialized value should be
/// checked with [`ModelProperties::validate`].
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelProperties {
    termination_cell: String,
    reflecting_surface: String,
    material: String,
    density: String,
    estimator: String,
    surface_current: String,
    surface_flux: String,
    cell_pulse_height: String,
    cell_track_length_flux: String,
    cell_collision_flux: String,
}

impl Default for ModelProperties {
    fn default() -> Self {
        Self {
            termination_cell: "termination.cell".into(),
            reflecting_surface: "reflecting.surface".into(),
            material: "material".into(),
            density: "density".into(),
            estimator: "estimator".into(),
            surface_current: "surface.current".into(),
            surface_flux: "surface.flux".into(),
            cell_pulse_height: "cell.pulse.height".into(),
            cell_track_length_flux: "cell.tl.flux".into(),
            cell_collision_flux: "cell.c.flux".into(),
        }
    }
}

fn checked_name(name: &str) -> Result<String> {
    if name.contains('_') {
        Err(NavError::InvalidPropertyName(name.to_string()))
    } else {
        Ok(name.to_string())
    }
}

macro_rules! name_accessors {
    ($($field:ident, $setter:ident;)*) => {
        $(
            pub fn $field(&self) -> &str {
                &self.$field
            }

            pub fn $setter(&mut self, name: &str) -> Result<()> {
                self.$field = checked_name(name)?;
                Ok(())
            }
        )*
    };
}

impl ModelProperties {
    name_accessors! {
        termination_cell, set_termination_cell_property_name;
        reflecting_surface, set_reflecting_surface_property_name;
        material, set_material_property_name;
        density, set_density_property_name;
        estimator, set_estimator_property_name;
        surface_current, set_surface_current_name;
        surface_flux, set_surface_flux_name;
        cell_pulse_height, set_cell_pulse_height_name;
        cell_track_length_flux, set_cell_track_length_flux_name;
        cell_collision_flux, set_cell_collision_flux_name;
    }

    /// The five property names parsed out of a model.
    pub fn recognized(&self) -> Vec<String> {
        vec![
            self.termination_cell.clone(),
            self.reflecting_surface.clone(),
            self.material.clone(),
            self.density.clone(),
            self.estimator.clone(),
        ]
    }

    fn estimator_names(&self) -> [(&str, EstimatorType); 5] {
        [
            (self.surface_current.as_str(), EstimatorType::SurfaceCurrent),
            (self.surface_flux.as_str(), EstimatorType::SurfaceFlux),
            (self.cell_pulse_height.as_str(), EstimatorType::CellPulseHeight),
            (self.cell_track_length_flux.as_str(), EstimatorType::CellTrackLengthFlux),
            (self.cell_collision_flux.as_str(), EstimatorType::CellCollisionFlux),
        ]
    }

    /// Checks every name for the reserved `_` separator.
    pub fn validate(&self) -> Result<()> {
        for name in self.recognized() {
            checked_name(&name)?;
        }
        for (name, _) in self.estimator_names() {
            checked_name(name)?;
        }
        Ok(())
    }

    pub fn estimator_type(&self, name: &str) -> Option<EstimatorType> {
        self.estimator_names()
            .into_iter()
            .find(|(n, _)| *n == name)
            .map(|(_, t)| t)
    }

    /// Parses an `id.type.particletype` estimator value.
    pub fn parse_estimator_property(&self, value: &str) -> Result<EstimatorProperty> {
        let (first, last) = match (value.find('.'), value.rfind('.')) {
            (Some(first), Some(last)) if first < last => (first, last),
            _ => return Err(NavError::estimator(value, "expected the form id.type.particletype")),
        };
        let id = &value[..first];
        let type_name = &value[first + 1..last];
        let particle = &value[last + 1..];

        if id.is_empty() || type_name.is_empty() || particle.is_empty() {
            return Err(NavError::estimator(value, "empty segment"));
        }
        let id = id
            .parse::<EntityId>()
            .map_err(|_| NavError::estimator(value, format!("id '{}' is not an unsigned integer", id)))?;
        let estimator_type = self.estimator_type(type_name).ok_or_else(|| {
            NavError::estimator(value, format!("unknown estimator type '{}'", type_name))
        })?;
        let particle_type = ParticleType::from_code(particle).ok_or_else(|| {
            NavError::estimator(value, format!("unknown particle type '{}'", particle))
        })?;

        Ok(EstimatorProperty {
            id,
            estimator_type,
            particle_type,
        })
    }
}
