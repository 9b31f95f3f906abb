//! Material table and per-material constitutive rules.
//!
//! Each particle carries a material index; the P2G2 kernel branches on it
//! once, inside a single tensor computation, to build the Cauchy stress for
//! that particle. The branch table is baked into the generated WGSL from the
//! host-side [`MaterialTable`], so the hot loop reads no memory to decide.
//!
//! Stress model per material: isotropic pressure plus a viscosity term
//! `k * viscosity * strain`, where `k` is the material's coefficient. Sand
//! refuses tension (zero tensor under negative pressure) and foam damps the
//! whole tensor.

use glam::{Mat3, Vec3};

use crate::error::ConfigError;

/// Material identity carried by each particle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum MaterialKind {
    Fluid = 0,
    Elastic = 1,
    Sand = 2,
    Snow = 3,
    Foam = 4,
    Viscous = 5,
    Rigid = 6,
    Plasma = 7,
}

impl MaterialKind {
    pub const ALL: [MaterialKind; 8] = [
        MaterialKind::Fluid,
        MaterialKind::Elastic,
        MaterialKind::Sand,
        MaterialKind::Snow,
        MaterialKind::Foam,
        MaterialKind::Viscous,
        MaterialKind::Rigid,
        MaterialKind::Plasma,
    ];

    pub fn index(self) -> i32 {
        self as i32
    }

    pub fn from_index(index: i32) -> Result<Self, ConfigError> {
        Self::ALL
            .get(usize::try_from(index).map_err(|_| ConfigError::UnknownMaterial(index))?)
            .copied()
            .ok_or(ConfigError::UnknownMaterial(index))
    }

    /// Multiplier applied to the strain term of the stress tensor.
    pub fn viscosity_coefficient(self) -> f32 {
        match self {
            MaterialKind::Fluid => 0.1,
            MaterialKind::Elastic => 2.0,
            MaterialKind::Sand => 0.5,
            MaterialKind::Snow => 0.3,
            MaterialKind::Foam => 0.2,
            MaterialKind::Viscous => 5.0,
            MaterialKind::Rigid => 10.0,
            MaterialKind::Plasma => 0.05,
        }
    }
}

/// Physical and pass-through parameters of one material.
///
/// The core consumes `density`, `stiffness`, and `viscosity`; the remaining
/// physical knobs and the visual fields ride along for renderers and host
/// tooling.
#[derive(Clone, Copy, Debug)]
pub struct Material {
    pub density: f32,
    pub stiffness: f32,
    pub viscosity: f32,
    pub friction: f32,
    pub cohesion: f32,
    pub elasticity: f32,
    pub plasticity: f32,
    pub compressibility: f32,
    pub surface_tension: f32,
    pub thermal_conductivity: f32,
    /// Base color, also the MATERIAL color-mode LUT entry.
    pub color: Vec3,
    pub metalness: f32,
    pub roughness: f32,
    pub emissive: f32,
}

/// The eight built-in materials, indexable by [`MaterialKind`].
#[derive(Clone, Debug)]
pub struct MaterialTable {
    entries: [Material; 8],
}

impl Default for MaterialTable {
    fn default() -> Self {
        let base = Material {
            density: 1.0,
            stiffness: 1.0,
            viscosity: 1.0,
            friction: 0.1,
            cohesion: 0.0,
            elasticity: 0.0,
            plasticity: 0.0,
            compressibility: 0.5,
            surface_tension: 0.0,
            thermal_conductivity: 0.5,
            color: Vec3::ONE,
            metalness: 0.0,
            roughness: 0.8,
            emissive: 0.0,
        };
        let entries = [
            // Fluid
            Material {
                color: Vec3::new(0.1, 0.45, 0.95),
                surface_tension: 0.3,
                ..base
            },
            // Elastic
            Material {
                density: 1.2,
                stiffness: 2.0,
                viscosity: 0.6,
                elasticity: 0.9,
                color: Vec3::new(0.2, 0.9, 0.35),
                ..base
            },
            // Sand
            Material {
                density: 1.6,
                stiffness: 1.4,
                viscosity: 0.8,
                friction: 0.6,
                cohesion: 0.05,
                color: Vec3::new(0.9, 0.8, 0.45),
                roughness: 1.0,
                ..base
            },
            // Snow
            Material {
                density: 0.9,
                stiffness: 1.2,
                viscosity: 0.9,
                plasticity: 0.7,
                cohesion: 0.3,
                color: Vec3::new(0.95, 0.96, 1.0),
                ..base
            },
            // Foam
            Material {
                density: 0.3,
                stiffness: 0.6,
                viscosity: 1.2,
                compressibility: 0.9,
                color: Vec3::new(0.92, 0.9, 0.85),
                ..base
            },
            // Viscous
            Material {
                density: 1.1,
                stiffness: 0.8,
                viscosity: 3.0,
                cohesion: 0.5,
                color: Vec3::new(0.6, 0.3, 0.8),
                ..base
            },
            // Rigid
            Material {
                density: 2.0,
                stiffness: 3.0,
                viscosity: 1.5,
                elasticity: 0.2,
                color: Vec3::new(0.55, 0.55, 0.6),
                metalness: 0.6,
                roughness: 0.4,
                ..base
            },
            // Plasma
            Material {
                density: 0.2,
                stiffness: 0.4,
                viscosity: 0.2,
                thermal_conductivity: 2.0,
                color: Vec3::new(1.0, 0.35, 0.1),
                emissive: 2.0,
                ..base
            },
        ];
        Self { entries }
    }
}

impl MaterialTable {
    pub fn get(&self, kind: MaterialKind) -> &Material {
        &self.entries[kind.index() as usize]
    }

    pub fn get_mut(&mut self, kind: MaterialKind) -> &mut Material {
        &mut self.entries[kind.index() as usize]
    }

    /// The MATERIAL color-mode LUT entry for `kind`.
    pub fn color(&self, kind: MaterialKind) -> Vec3 {
        self.get(kind).color
    }

    /// Emit `material_stiffness` / `material_viscosity` / `material_color`
    /// lookup helpers with the table baked in as literals.
    pub fn lookup_wgsl(&self) -> String {
        let mut out = String::new();

        out.push_str("fn material_stiffness(material: i32) -> f32 {\n    switch material {\n");
        for kind in MaterialKind::ALL {
            out.push_str(&format!(
                "        case {}: {{ return {:?}; }}\n",
                kind.index(),
                self.get(kind).stiffness
            ));
        }
        out.push_str("        default: { return 1.0; }\n    }\n}\n\n");

        out.push_str("fn material_viscosity(material: i32) -> f32 {\n    switch material {\n");
        for kind in MaterialKind::ALL {
            out.push_str(&format!(
                "        case {}: {{ return {:?}; }}\n",
                kind.index(),
                self.get(kind).viscosity
            ));
        }
        out.push_str("        default: { return 1.0; }\n    }\n}\n\n");

        out.push_str("fn material_color(material: i32) -> vec3<f32> {\n    switch material {\n");
        for kind in MaterialKind::ALL {
            let c = self.get(kind).color;
            out.push_str(&format!(
                "        case {}: {{ return vec3<f32>({:?}, {:?}, {:?}); }}\n",
                kind.index(),
                c.x,
                c.y,
                c.z
            ));
        }
        out.push_str("        default: { return vec3<f32>(1.0, 1.0, 1.0); }\n    }\n}\n");
        out
    }

    /// Emit `material_stress`, the per-material Cauchy stress builder used by
    /// P2G2. All branches stay in registers; the switch wraps only the tensor
    /// assembly.
    pub fn stress_wgsl(&self) -> String {
        let mut out = String::from(
            r#"fn material_stress(material: i32, pressure: f32, strain: mat3x3<f32>, viscosity: f32) -> mat3x3<f32> {
    let pressure_term = mat3x3<f32>(
        vec3<f32>(-pressure, 0.0, 0.0),
        vec3<f32>(0.0, -pressure, 0.0),
        vec3<f32>(0.0, 0.0, -pressure)
    );
    switch material {
"#,
        );
        for kind in MaterialKind::ALL {
            let coeff = kind.viscosity_coefficient();
            let body = match kind {
                MaterialKind::Sand => format!(
                    "            if pressure < 0.0 {{\n                return mat3x3<f32>(vec3<f32>(0.0), vec3<f32>(0.0), vec3<f32>(0.0));\n            }}\n            return pressure_term + strain * ({:?} * viscosity);",
                    coeff
                ),
                MaterialKind::Foam => format!(
                    "            return (pressure_term + strain * ({:?} * viscosity)) * 0.3;",
                    coeff
                ),
                _ => format!(
                    "            return pressure_term + strain * ({:?} * viscosity);",
                    coeff
                ),
            };
            out.push_str(&format!(
                "        case {}: {{\n{}\n        }}\n",
                kind.index(),
                body
            ));
        }
        out.push_str(
            "        default: { return pressure_term; }\n    }\n}\n",
        );
        out
    }
}

/// CPU mirror of the WGSL `material_stress`, for unit tests and host tools.
pub fn cauchy_stress(kind: MaterialKind, pressure: f32, strain: Mat3, viscosity: f32) -> Mat3 {
    let pressure_term = Mat3::from_diagonal(Vec3::splat(-pressure));
    let coeff = kind.viscosity_coefficient();
    match kind {
        MaterialKind::Sand if pressure < 0.0 => Mat3::ZERO,
        MaterialKind::Foam => (pressure_term + strain * (coeff * viscosity)) * 0.3,
        _ => pressure_term + strain * (coeff * viscosity),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_round_trip() {
        for kind in MaterialKind::ALL {
            assert_eq!(MaterialKind::from_index(kind.index()).unwrap(), kind);
        }
        assert!(MaterialKind::from_index(8).is_err());
        assert!(MaterialKind::from_index(-1).is_err());
    }

    #[test]
    fn fluid_stress_is_pressure_plus_damped_strain() {
        let strain = Mat3::from_cols(
            Vec3::new(0.2, 0.1, 0.0),
            Vec3::new(0.1, -0.3, 0.0),
            Vec3::new(0.0, 0.0, 0.4),
        );
        let stress = cauchy_stress(MaterialKind::Fluid, 2.0, strain, 1.5);
        let expected = Mat3::from_diagonal(Vec3::splat(-2.0)) + strain * 0.15;
        assert!((stress.x_axis - expected.x_axis).length() < 1e-6);
        assert!((stress.y_axis - expected.y_axis).length() < 1e-6);
        assert!((stress.z_axis - expected.z_axis).length() < 1e-6);
    }

    #[test]
    fn sand_refuses_tension() {
        let strain = Mat3::IDENTITY;
        assert_eq!(cauchy_stress(MaterialKind::Sand, -0.5, strain, 1.0), Mat3::ZERO);
        // Compression behaves like the generic rule.
        let stress = cauchy_stress(MaterialKind::Sand, 0.5, strain, 1.0);
        assert!(stress.x_axis.x < 0.5);
    }

    #[test]
    fn foam_damps_the_whole_tensor() {
        let strain = Mat3::IDENTITY;
        let foam = cauchy_stress(MaterialKind::Foam, 1.0, strain, 1.0);
        let undamped = Mat3::from_diagonal(Vec3::splat(-1.0)) + strain * 0.2;
        assert!((foam.x_axis - undamped.x_axis * 0.3).length() < 1e-6);
    }

    #[test]
    fn lookup_wgsl_contains_every_material() {
        let table = MaterialTable::default();
        let wgsl = table.lookup_wgsl();
        for kind in MaterialKind::ALL {
            assert!(wgsl.contains(&format!("case {}:", kind.index())));
        }
    }

    #[test]
    fn stress_wgsl_has_sand_cutoff_and_foam_scale() {
        let wgsl = MaterialTable::default().stress_wgsl();
        assert!(wgsl.contains("if pressure < 0.0"));
        assert!(wgsl.contains("* 0.3"));
    }
}
