//! # Plume - MLS-MPM particle fluid engine
//!
//! Real-time GPU fluid simulation built on the Moving Least Squares Material
//! Point Method. Plume advances up to ~130k particles over a structured
//! background grid, resolving pressure, viscosity, user-defined force fields,
//! mouse interaction, ambient noise, and container collisions, and writes a
//! per-particle color channel for whatever renders the result.
//!
//! ## Quick Start
//!
//! ```ignore
//! use plume::prelude::*;
//!
//! let ctx = GpuContext::new()?;
//! let config = SimulationConfig::default();
//! let boundary = Boundary::with_shape(config.grid_size.as_vec3(), BoundaryShape::Box);
//! let mut sim = MlsMpmSimulator::new(ctx, config, &boundary)?;
//!
//! sim.write_particles(
//!     &(0..10_000)
//!         .map(|i| Particle::at(Vec3::new(32.0, 20.0 + i as f32 * 0.001, 32.0)))
//!         .collect::<Vec<_>>(),
//!     0,
//! );
//!
//! let params = SimulationParams {
//!     num_particles: 10_000,
//!     ..Default::default()
//! };
//! loop {
//!     sim.update(&params, frame_dt, elapsed)?;
//!     // hand the particle buffer to the renderer
//! }
//! ```
//!
//! ## Architecture
//!
//! Each `update` runs five compute passes in order:
//!
//! | Pass | Over | Does |
//! |------|------|------|
//! | clear | grid cells | zero the fixed-point accumulators and float cells |
//! | P2G1 | particles | scatter momentum and mass with atomic adds |
//! | P2G2 | particles | density estimate, pressure, per-material stress |
//! | grid update | grid cells | decode accumulators into `(velocity, mass)` |
//! | G2P | particles | gather, forces, integration, collision, color |
//!
//! The grid accumulates in fixed-point integers (`atomicAdd` on `i32`), and
//! the same backing buffer is viewed with or without atomics per pass through
//! the [`buffer::StructuredBuffer`] layout machinery.
//!
//! ## What plume is not
//!
//! Rendering, UI, emitter authoring, and scene wiring live outside this
//! crate. Producers write [`Particle`] values into buffer slots and tell the
//! simulator how many are live; everything visual is the renderer's business.

pub mod boundary;
pub mod buffer;
pub mod error;
pub mod forcefield;
pub mod gpu;
pub mod kernels;
pub mod materials;
pub mod particle;
pub mod shader_utils;
pub mod solver;
pub mod uniforms;

pub use boundary::{
    Boundary, BoundaryShape, CollisionMode, Rect, ViewportBounds, ViewportTracker,
};
pub use bytemuck;
pub use error::{ConfigError, GpuError, SimulationError};
pub use forcefield::{Falloff, ForceField, ForceFieldKind, ForceFieldManager, MAX_FORCE_FIELDS};
pub use glam::{Mat3, UVec3, Vec2, Vec3, Vec4};
pub use gpu::GpuContext;
pub use materials::{Material, MaterialKind, MaterialTable};
pub use particle::Particle;
pub use solver::{MlsMpmSimulator, SimulationConfig};
pub use uniforms::{ColorMode, GravityType, SimulationParams};

/// Convenient re-exports for common usage.
///
/// ```ignore
/// use plume::prelude::*;
/// ```
pub mod prelude {
    pub use crate::boundary::{Boundary, BoundaryShape, CollisionMode, ViewportTracker};
    pub use crate::error::{ConfigError, GpuError, SimulationError};
    pub use crate::forcefield::{Falloff, ForceField, ForceFieldKind, ForceFieldManager};
    pub use crate::gpu::GpuContext;
    pub use crate::materials::{MaterialKind, MaterialTable};
    pub use crate::particle::Particle;
    pub use crate::solver::{MlsMpmSimulator, SimulationConfig};
    pub use crate::uniforms::{ColorMode, GravityType, SimulationParams};
    pub use crate::{Mat3, UVec3, Vec2, Vec3, Vec4};
}
