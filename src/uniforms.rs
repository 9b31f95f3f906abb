//! Per-frame simulation parameters and their GPU uniform block.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

/// Gravity handling in G2P.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(u32)]
pub enum GravityType {
    None = 0,
    #[default]
    Vector = 1,
    /// Pull toward the grid center.
    Radial = 2,
}

/// Which quantity G2P writes into the per-particle color channel.
///
/// Modes the kernel does not implement (gradient and friends) leave the
/// stored color untouched; downstream visual code owns them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(u32)]
pub enum ColorMode {
    #[default]
    Velocity = 0,
    Density = 1,
    Gradient = 2,
    Material = 3,
}

/// Host-facing knobs supplied every frame.
#[derive(Clone, Copy, Debug)]
pub struct SimulationParams {
    pub num_particles: u32,
    /// User time-scale multiplier, not the raw frame delta.
    pub dt: f32,
    /// Ambient noise strength.
    pub noise: f32,
    pub stiffness: f32,
    pub rest_density: f32,
    pub dynamic_viscosity: f32,
    pub gravity_type: GravityType,
    pub gravity: Vec3,
    pub mouse_ray_origin: Vec3,
    /// Normalized.
    pub mouse_ray_direction: Vec3,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            num_particles: 0,
            dt: 1.0,
            noise: 0.0,
            stiffness: 3.0,
            rest_density: 1.0,
            dynamic_viscosity: 0.1,
            gravity_type: GravityType::Vector,
            gravity: Vec3::new(0.0, -9.8, 0.0),
            mouse_ray_origin: Vec3::ZERO,
            mouse_ray_direction: Vec3::NEG_Z,
        }
    }
}

/// The uniform block every kernel reads. Field order mirrors the WGSL
/// `SimUniforms` struct; rows are 16-byte aligned.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct SimUniforms {
    pub grid_size: [f32; 3],
    pub num_particles: u32,
    /// Effective timestep: `min(frame_dt, 1/60) * 6 * params.dt`.
    pub dt: f32,
    pub elapsed: f32,
    pub noise: f32,
    pub stiffness: f32,
    pub rest_density: f32,
    pub dynamic_viscosity: f32,
    pub gravity_type: u32,
    pub color_mode: u32,
    pub gravity: [f32; 3],
    pub _pad0: f32,
    pub mouse_ray_origin: [f32; 3],
    pub _pad1: f32,
    pub mouse_ray_direction: [f32; 3],
    pub _pad2: f32,
    pub mouse_force: [f32; 3],
    pub _pad3: f32,
}

impl Default for SimUniforms {
    fn default() -> Self {
        Self::zeroed()
    }
}

/// WGSL declaration matching [`SimUniforms`].
pub fn sim_uniforms_wgsl() -> &'static str {
    r#"struct SimUniforms {
    grid_size: vec3<f32>,
    num_particles: u32,
    dt: f32,
    elapsed: f32,
    noise: f32,
    stiffness: f32,
    rest_density: f32,
    dynamic_viscosity: f32,
    gravity_type: u32,
    color_mode: u32,
    gravity: vec3<f32>,
    _su_pad0: f32,
    mouse_ray_origin: vec3<f32>,
    _su_pad1: f32,
    mouse_ray_direction: vec3<f32>,
    _su_pad2: f32,
    mouse_force: vec3<f32>,
    _su_pad3: f32,
}
"#
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_block_is_tightly_row_aligned() {
        assert_eq!(std::mem::size_of::<SimUniforms>(), 112);
        assert_eq!(std::mem::size_of::<SimUniforms>() % 16, 0);
    }
}
