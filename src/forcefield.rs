//! User-defined force fields.
//!
//! Fields are authored host-side, packed into flat uniform arrays, and
//! evaluated inside the G2P kernel as one summed impulse per particle. Force
//! contributions are commutative additions, so evaluation order is never
//! observable. At most [`MAX_FORCE_FIELDS`] enabled fields fit in the packed
//! arrays; disabled fields are compacted out before upload.
//!
//! The same evaluation runs on the CPU via [`ForceFieldManager::evaluate`],
//! which tests lean on heavily.
//!
//! # Example
//!
//! ```ignore
//! let mut fields = ForceFieldManager::new();
//! fields.push(ForceField::vortex(Vec3::splat(32.0), Vec3::Y, 20.0, 40.0)
//!     .with_falloff(Falloff::Smooth));
//! fields.push(ForceField::turbulence(Vec3::splat(32.0), 5.0, 30.0, 2.0, 1.0));
//! simulator.update_force_fields(&fields)?;
//! ```

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

use crate::error::ConfigError;
use crate::shader_utils::tri_noise3d_vec;

/// Capacity of the packed uniform arrays.
pub const MAX_FORCE_FIELDS: usize = 8;

/// Central-difference step for the curl-noise field.
const CURL_EPSILON: f32 = 0.1;

/// How a field's strength tapers toward its influence radius.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(i32)]
pub enum Falloff {
    Constant = 0,
    Linear = 1,
    Quadratic = 2,
    #[default]
    Smooth = 3,
}

impl Falloff {
    /// Falloff factor for distance `d` from the field center, radius `r`.
    /// Callers cull `d > r` before asking; inside the radius every mode is
    /// monotone non-increasing with `f(0) = 1`.
    pub fn evaluate(self, d: f32, radius: f32) -> f32 {
        let t = (d / radius).clamp(0.0, 1.0);
        match self {
            Falloff::Constant => 1.0,
            Falloff::Linear => 1.0 - t,
            Falloff::Quadratic => (1.0 - t) * (1.0 - t),
            Falloff::Smooth => 1.0 - t * t * (3.0 - 2.0 * t),
        }
    }
}

/// Force field variants.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(i32)]
pub enum ForceFieldKind {
    Attractor = 0,
    Repeller = 1,
    Vortex = 2,
    Turbulence = 3,
    Directional = 4,
    VortexTube = 5,
    Spherical = 6,
    CurlNoise = 7,
}

/// One authored force field.
#[derive(Clone, Copy, Debug)]
pub struct ForceField {
    pub kind: ForceFieldKind,
    pub position: Vec3,
    pub direction: Vec3,
    pub axis: Vec3,
    pub strength: f32,
    pub radius: f32,
    pub falloff: Falloff,
    pub turbulence_scale: f32,
    pub noise_speed: f32,
    pub enabled: bool,
}

impl ForceField {
    fn base(kind: ForceFieldKind, position: Vec3, strength: f32, radius: f32) -> Self {
        Self {
            kind,
            position,
            direction: Vec3::Y,
            axis: Vec3::Y,
            strength,
            radius,
            falloff: Falloff::Smooth,
            turbulence_scale: 1.0,
            noise_speed: 1.0,
            enabled: true,
        }
    }

    pub fn attractor(position: Vec3, strength: f32, radius: f32) -> Self {
        Self::base(ForceFieldKind::Attractor, position, strength, radius)
    }

    pub fn repeller(position: Vec3, strength: f32, radius: f32) -> Self {
        Self::base(ForceFieldKind::Repeller, position, strength, radius)
    }

    pub fn vortex(position: Vec3, axis: Vec3, strength: f32, radius: f32) -> Self {
        Self {
            axis,
            ..Self::base(ForceFieldKind::Vortex, position, strength, radius)
        }
    }

    pub fn vortex_tube(position: Vec3, axis: Vec3, strength: f32, radius: f32) -> Self {
        Self {
            axis,
            ..Self::base(ForceFieldKind::VortexTube, position, strength, radius)
        }
    }

    pub fn turbulence(
        position: Vec3,
        strength: f32,
        radius: f32,
        scale: f32,
        noise_speed: f32,
    ) -> Self {
        Self {
            turbulence_scale: scale,
            noise_speed,
            ..Self::base(ForceFieldKind::Turbulence, position, strength, radius)
        }
    }

    pub fn directional(position: Vec3, direction: Vec3, strength: f32, radius: f32) -> Self {
        Self {
            direction,
            ..Self::base(ForceFieldKind::Directional, position, strength, radius)
        }
    }

    pub fn spherical(position: Vec3, strength: f32, radius: f32) -> Self {
        Self::base(ForceFieldKind::Spherical, position, strength, radius)
    }

    pub fn curl_noise(position: Vec3, strength: f32, radius: f32, scale: f32) -> Self {
        Self {
            turbulence_scale: scale,
            ..Self::base(ForceFieldKind::CurlNoise, position, strength, radius)
        }
    }

    pub fn with_falloff(mut self, falloff: Falloff) -> Self {
        self.falloff = falloff;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// CPU mirror of one field's contribution at `p`.
    pub fn contribution(&self, p: Vec3, time: f32) -> Vec3 {
        let to_field = self.position - p;
        let d = to_field.length();
        if d > self.radius {
            return Vec3::ZERO;
        }
        let falloff = self.falloff.evaluate(d, self.radius);
        let s = self.strength;
        match self.kind {
            ForceFieldKind::Attractor => {
                if d > 1e-4 {
                    (to_field / d) * s * falloff
                } else {
                    Vec3::ZERO
                }
            }
            ForceFieldKind::Repeller => {
                if d > 1e-4 {
                    -(to_field / d) * s * falloff
                } else {
                    Vec3::ZERO
                }
            }
            ForceFieldKind::Vortex | ForceFieldKind::VortexTube => {
                let axis = self.axis.normalize_or_zero();
                let from_center = -to_field;
                let axial_amount = from_center.dot(axis);
                let radial_vec = from_center - axis * axial_amount;
                let radial_len = radial_vec.length();
                if radial_len <= 1e-4 {
                    return Vec3::ZERO;
                }
                let radial_dir = radial_vec / radial_len;
                let tangent = axis.cross(radial_dir);
                if self.kind == ForceFieldKind::Vortex {
                    (tangent * s + radial_dir * (-0.3 * s) + axis * (0.2 * s)) * falloff
                } else {
                    let cap = (1.0 - axial_amount.abs() / self.radius).max(0.0);
                    (tangent * (2.0 * s)
                        + radial_dir * (-0.3 * 0.8 * s)
                        + axis * (0.2 * 0.5 * s * cap))
                        * falloff
                }
            }
            ForceFieldKind::Turbulence => {
                let n = tri_noise3d_vec(p * self.turbulence_scale, self.noise_speed, time);
                (n * 2.0 - Vec3::ONE) * s * falloff
            }
            ForceFieldKind::Directional => self.direction.normalize_or_zero() * s * falloff,
            ForceFieldKind::Spherical => {
                if d > 1e-4 {
                    let pulse = 0.5 + 0.5 * (2.0 * time).sin();
                    (-to_field / d) * s * falloff * pulse
                } else {
                    Vec3::ZERO
                }
            }
            ForceFieldKind::CurlNoise => {
                curl_noise(p * self.turbulence_scale, self.noise_speed, time) * s * falloff
            }
        }
    }
}

/// Central-difference curl of the triangle-noise field; divergence-free by
/// construction of the stencil.
pub fn curl_noise(p: Vec3, speed: f32, time: f32) -> Vec3 {
    let e = CURL_EPSILON;
    let sample = |q: Vec3| tri_noise3d_vec(q, speed, time);
    let px0 = sample(p - Vec3::X * e);
    let px1 = sample(p + Vec3::X * e);
    let py0 = sample(p - Vec3::Y * e);
    let py1 = sample(p + Vec3::Y * e);
    let pz0 = sample(p - Vec3::Z * e);
    let pz1 = sample(p + Vec3::Z * e);
    Vec3::new(
        (py1.z - py0.z) - (pz1.y - pz0.y),
        (pz1.x - pz0.x) - (px1.z - px0.z),
        (px1.y - px0.y) - (py1.x - py0.x),
    ) / (2.0 * e)
}

/// Packed uniform block mirroring the WGSL `ForceFields` struct.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct ForceFieldUniforms {
    pub count: u32,
    pub _pad: [u32; 3],
    pub position: [[f32; 4]; MAX_FORCE_FIELDS],
    pub direction: [[f32; 4]; MAX_FORCE_FIELDS],
    pub axis: [[f32; 4]; MAX_FORCE_FIELDS],
    /// x: strength, y: radius, z: turbulence scale, w: noise speed.
    pub params: [[f32; 4]; MAX_FORCE_FIELDS],
    /// x: kind, y: falloff mode.
    pub kinds: [[i32; 4]; MAX_FORCE_FIELDS],
}

impl Default for ForceFieldUniforms {
    fn default() -> Self {
        Self::zeroed()
    }
}

/// Collects authored fields and produces the packed snapshot.
#[derive(Clone, Debug, Default)]
pub struct ForceFieldManager {
    fields: Vec<ForceField>,
}

impl ForceFieldManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, field: ForceField) {
        self.fields.push(field);
    }

    pub fn clear(&mut self) {
        self.fields.clear();
    }

    pub fn fields(&self) -> &[ForceField] {
        &self.fields
    }

    pub fn fields_mut(&mut self) -> &mut Vec<ForceField> {
        &mut self.fields
    }

    fn enabled(&self) -> impl Iterator<Item = &ForceField> + '_ {
        self.fields.iter().filter(|f| f.enabled)
    }

    /// Pack the enabled fields into flat uniform arrays, compacting disabled
    /// entries out. More than [`MAX_FORCE_FIELDS`] enabled fields is a
    /// configuration error.
    pub fn snapshot(&self) -> Result<ForceFieldUniforms, ConfigError> {
        let enabled: Vec<&ForceField> = self.enabled().collect();
        if enabled.len() > MAX_FORCE_FIELDS {
            return Err(ConfigError::TooManyForceFields {
                enabled: enabled.len(),
                max: MAX_FORCE_FIELDS,
            });
        }
        let mut out = ForceFieldUniforms::zeroed();
        out.count = enabled.len() as u32;
        for (i, field) in enabled.iter().enumerate() {
            out.position[i] = field.position.extend(0.0).to_array();
            out.direction[i] = field.direction.extend(0.0).to_array();
            out.axis[i] = field.axis.extend(0.0).to_array();
            out.params[i] = [
                field.strength,
                field.radius,
                field.turbulence_scale,
                field.noise_speed,
            ];
            out.kinds[i] = [field.kind as i32, field.falloff as i32, 0, 0];
        }
        Ok(out)
    }

    /// CPU mirror of the in-kernel evaluator: summed contribution of every
    /// enabled field at `p`.
    pub fn evaluate(&self, p: Vec3, time: f32) -> Vec3 {
        self.enabled().map(|f| f.contribution(p, time)).sum()
    }
}

/// WGSL struct declaration for the packed uniforms.
pub fn uniform_struct_wgsl() -> String {
    format!(
        r#"struct ForceFields {{
    count: u32,
    _ff_pad0: u32,
    _ff_pad1: u32,
    _ff_pad2: u32,
    position: array<vec4<f32>, {n}>,
    direction: array<vec4<f32>, {n}>,
    axis: array<vec4<f32>, {n}>,
    params: array<vec4<f32>, {n}>,
    kinds: array<vec4<i32>, {n}>,
}}
"#,
        n = MAX_FORCE_FIELDS
    )
}

/// WGSL for falloff, curl noise, and the per-particle evaluator. Expects the
/// triangle-noise helpers and a `force_fields` uniform binding in scope.
pub fn evaluator_wgsl() -> String {
    format!(
        r#"fn field_falloff(mode: i32, d: f32, radius: f32) -> f32 {{
    let t = clamp(d / radius, 0.0, 1.0);
    switch mode {{
        case 0: {{ return 1.0; }}
        case 1: {{ return 1.0 - t; }}
        case 2: {{ let u = 1.0 - t; return u * u; }}
        default: {{ return 1.0 - t * t * (3.0 - 2.0 * t); }}
    }}
}}

fn curl_tri_noise(p: vec3<f32>, speed: f32, time: f32) -> vec3<f32> {{
    let e = {eps:?};
    let dx = vec3<f32>(e, 0.0, 0.0);
    let dy = vec3<f32>(0.0, e, 0.0);
    let dz = vec3<f32>(0.0, 0.0, e);
    let px0 = tri_noise3d_vec(p - dx, speed, time);
    let px1 = tri_noise3d_vec(p + dx, speed, time);
    let py0 = tri_noise3d_vec(p - dy, speed, time);
    let py1 = tri_noise3d_vec(p + dy, speed, time);
    let pz0 = tri_noise3d_vec(p - dz, speed, time);
    let pz1 = tri_noise3d_vec(p + dz, speed, time);
    return vec3<f32>(
        (py1.z - py0.z) - (pz1.y - pz0.y),
        (pz1.x - pz0.x) - (px1.z - px0.z),
        (px1.y - px0.y) - (py1.x - py0.x)
    ) / (2.0 * e);
}}

fn evaluate_force_fields(p: vec3<f32>, time: f32) -> vec3<f32> {{
    var total = vec3<f32>(0.0);
    for (var i = 0u; i < force_fields.count; i = i + 1u) {{
        let to_field = force_fields.position[i].xyz - p;
        let d = length(to_field);
        let strength = force_fields.params[i].x;
        let radius = force_fields.params[i].y;
        if d > radius {{
            continue;
        }}
        let falloff = field_falloff(force_fields.kinds[i].y, d, radius);
        let kind = force_fields.kinds[i].x;
        switch kind {{
            case 0: {{
                if d > 1e-4 {{
                    total += (to_field / d) * strength * falloff;
                }}
            }}
            case 1: {{
                if d > 1e-4 {{
                    total -= (to_field / d) * strength * falloff;
                }}
            }}
            case 2, 5: {{
                let axis = normalize(force_fields.axis[i].xyz);
                let from_center = -to_field;
                let axial_amount = dot(from_center, axis);
                let radial_vec = from_center - axis * axial_amount;
                let radial_len = length(radial_vec);
                if radial_len > 1e-4 {{
                    let radial_dir = radial_vec / radial_len;
                    let tangent = cross(axis, radial_dir);
                    if kind == 2 {{
                        total += (tangent * strength + radial_dir * (-0.3 * strength) + axis * (0.2 * strength)) * falloff;
                    }} else {{
                        let cap = max(1.0 - abs(axial_amount) / radius, 0.0);
                        total += (tangent * (2.0 * strength) + radial_dir * (-0.24 * strength) + axis * (0.1 * strength * cap)) * falloff;
                    }}
                }}
            }}
            case 3: {{
                let n = tri_noise3d_vec(p * force_fields.params[i].z, force_fields.params[i].w, time);
                total += (n * 2.0 - vec3<f32>(1.0)) * strength * falloff;
            }}
            case 4: {{
                total += normalize(force_fields.direction[i].xyz) * strength * falloff;
            }}
            case 6: {{
                if d > 1e-4 {{
                    let pulse = 0.5 + 0.5 * sin(2.0 * time);
                    total += (-to_field / d) * strength * falloff * pulse;
                }}
            }}
            default: {{
                total += curl_tri_noise(p * force_fields.params[i].z, force_fields.params[i].w, time) * strength * falloff;
            }}
        }}
    }}
    return total;
}}
"#,
        eps = CURL_EPSILON
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falloff_shape_properties() {
        for mode in [Falloff::Linear, Falloff::Quadratic, Falloff::Smooth] {
            assert!((mode.evaluate(0.0, 10.0) - 1.0).abs() < 1e-6, "{:?}", mode);
            assert!(mode.evaluate(10.0, 10.0).abs() < 1e-6, "{:?}", mode);
            let mut prev = f32::INFINITY;
            for step in 0..=20 {
                let v = mode.evaluate(step as f32 * 0.5, 10.0);
                assert!(v <= prev + 1e-6, "{:?} not monotone", mode);
                prev = v;
            }
        }
        assert_eq!(Falloff::Constant.evaluate(0.0, 10.0), 1.0);
        assert_eq!(Falloff::Constant.evaluate(10.0, 10.0), 1.0);
    }

    #[test]
    fn attractor_pulls_repeller_pushes() {
        let center = Vec3::splat(32.0);
        let p = center + Vec3::X * 5.0;

        let pull = ForceField::attractor(center, 10.0, 20.0).contribution(p, 0.0);
        assert!(pull.x < 0.0);

        let push = ForceField::repeller(center, 10.0, 20.0).contribution(p, 0.0);
        assert!(push.x > 0.0);
        assert!((pull + push).length() < 1e-5);
    }

    #[test]
    fn outside_radius_contributes_nothing() {
        let f = ForceField::attractor(Vec3::ZERO, 100.0, 5.0);
        assert_eq!(f.contribution(Vec3::X * 6.0, 0.0), Vec3::ZERO);
    }

    #[test]
    fn vortex_spins_and_spirals_inward() {
        let center = Vec3::splat(32.0);
        let f = ForceField::vortex(center, Vec3::Y, 10.0, 40.0);
        let p = center + Vec3::X * 8.0;
        let v = f.contribution(p, 0.0);

        // Angular momentum about the axis is positive.
        let r = p - center;
        assert!(r.cross(v).y > 0.0);
        // Radial component points toward the axis, axial component lifts.
        let radial_dir = Vec3::X;
        assert!(v.dot(radial_dir) < 0.0);
        assert!(v.y > 0.0);
    }

    #[test]
    fn vortex_tube_lift_fades_at_caps() {
        let center = Vec3::splat(32.0);
        let f = ForceField::vortex_tube(center, Vec3::Y, 10.0, 20.0);
        let mid = f.contribution(center + Vec3::X * 5.0, 0.0);
        let near_cap = f.contribution(center + Vec3::X * 5.0 + Vec3::Y * 18.0, 0.0);
        assert!(near_cap.y < mid.y);
    }

    #[test]
    fn curl_field_is_divergence_free() {
        // Matching central-difference stencils make div(curl) cancel exactly
        // up to float rounding.
        let e = 0.1;
        let p = Vec3::new(3.7, 1.2, 8.4);
        let f = |q: Vec3| curl_noise(q, 1.0, 0.3);
        let div = (f(p + Vec3::X * e).x - f(p - Vec3::X * e).x
            + f(p + Vec3::Y * e).y
            - f(p - Vec3::Y * e).y
            + f(p + Vec3::Z * e).z
            - f(p - Vec3::Z * e).z)
            / (2.0 * e);
        assert!(div.abs() < 1e-3, "divergence {}", div);
    }

    #[test]
    fn snapshot_compacts_disabled_fields() {
        let mut mgr = ForceFieldManager::new();
        mgr.push(ForceField::attractor(Vec3::ZERO, 1.0, 5.0));
        mgr.push(ForceField::repeller(Vec3::ONE, 2.0, 5.0).disabled());
        mgr.push(ForceField::spherical(Vec3::splat(2.0), 3.0, 5.0));

        let snap = mgr.snapshot().unwrap();
        assert_eq!(snap.count, 2);
        assert_eq!(snap.kinds[0][0], ForceFieldKind::Attractor as i32);
        assert_eq!(snap.kinds[1][0], ForceFieldKind::Spherical as i32);
        assert_eq!(snap.params[1][0], 3.0);
    }

    #[test]
    fn too_many_enabled_fields_is_an_error() {
        let mut mgr = ForceFieldManager::new();
        for i in 0..=MAX_FORCE_FIELDS {
            mgr.push(ForceField::attractor(Vec3::X * i as f32, 1.0, 5.0));
        }
        assert!(matches!(
            mgr.snapshot(),
            Err(ConfigError::TooManyForceFields { .. })
        ));
    }

    #[test]
    fn evaluate_sums_linearly() {
        let mut mgr = ForceFieldManager::new();
        let a = ForceField::attractor(Vec3::ZERO, 4.0, 50.0);
        let b = ForceField::directional(Vec3::ZERO, Vec3::Z, 2.0, 50.0);
        mgr.push(a);
        mgr.push(b);
        let p = Vec3::new(3.0, 0.0, 0.0);
        let sum = mgr.evaluate(p, 0.0);
        let expected = a.contribution(p, 0.0) + b.contribution(p, 0.0);
        assert!((sum - expected).length() < 1e-6);
    }
}
