//! The MLS-MPM simulator: buffers, pipelines, and the per-frame step.
//!
//! One `update` call dispatches five kernels in order — clear, P2G1, P2G2,
//! grid-update, G2P — inside a single command encoder. The host never touches
//! the storage buffers between passes; the storage-buffer hazards between
//! dispatches are the only synchronization the pipeline needs.
//!
//! Kernel sources are generated once at build time; everything that changes
//! per frame (parameters, force fields, boundary state, mouse ray) flows
//! through uniform writes, so no pipeline is ever rebuilt mid-run.

use glam::{UVec3, Vec3};

use crate::boundary::Boundary;
use crate::buffer::StructuredBuffer;
use crate::error::{ConfigError, SimulationError};
use crate::forcefield::{ForceFieldManager, ForceFieldUniforms};
use crate::gpu::GpuContext;
use crate::kernels::{self, decode_fixed, WORKGROUP_SIZE};
use crate::materials::MaterialTable;
use crate::particle::{particle_layout, Particle};
use crate::uniforms::{ColorMode, SimUniforms, SimulationParams};

/// Default cubic grid edge.
pub const DEFAULT_GRID_SIZE: u32 = 64;

/// Default particle capacity, sized for ~130k live particles.
pub const DEFAULT_MAX_PARTICLES: usize = 131_072;

/// The frame delta is capped here before time scaling.
const FRAME_DT_CAP: f32 = 1.0 / 60.0;

/// Hard ceiling on 1D dispatch width.
const MAX_WORKGROUPS: u32 = 65_535;

/// `dt_effective` for one step: capped frame delta, a fixed 6x gain, and the
/// user's time-scale knob.
pub fn effective_dt(frame_dt: f32, time_scale: f32) -> f32 {
    frame_dt.min(FRAME_DT_CAP) * 6.0 * time_scale
}

/// Build-time configuration, validated once when the simulator is created.
#[derive(Clone, Debug)]
pub struct SimulationConfig {
    pub grid_size: UVec3,
    pub max_particles: usize,
    pub materials: MaterialTable,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            grid_size: UVec3::splat(DEFAULT_GRID_SIZE),
            max_particles: DEFAULT_MAX_PARTICLES,
            materials: MaterialTable::default(),
        }
    }
}

impl SimulationConfig {
    pub fn with_grid_size(mut self, grid_size: UVec3) -> Self {
        self.grid_size = grid_size;
        self
    }

    pub fn with_max_particles(mut self, max_particles: usize) -> Self {
        self.max_particles = max_particles;
        self
    }

    pub fn with_materials(mut self, materials: MaterialTable) -> Self {
        self.materials = materials;
        self
    }

    pub fn cell_count(&self) -> u32 {
        self.grid_size.x * self.grid_size.y * self.grid_size.z
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let g = self.grid_size;
        let invalid = ConfigError::InvalidGridSize {
            width: g.x,
            height: g.y,
            depth: g.z,
        };
        if g.x == 0 || g.y == 0 || g.z == 0 {
            return Err(invalid);
        }
        let cells = g
            .x
            .checked_mul(g.y)
            .and_then(|xy| xy.checked_mul(g.z))
            .ok_or(invalid.clone())?;
        // The grid passes dispatch 1D; the cell count must fit.
        if cells.div_ceil(WORKGROUP_SIZE) > MAX_WORKGROUPS {
            return Err(invalid);
        }
        if self.max_particles == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        Ok(())
    }
}

/// Derives the mouse force from the trailing position samples.
#[derive(Clone, Debug, Default)]
struct MouseTracker {
    samples: Vec<Vec3>,
}

impl MouseTracker {
    const WINDOW: usize = 3;

    fn push(&mut self, pos: Vec3) {
        if self.samples.len() == Self::WINDOW {
            self.samples.remove(0);
        }
        self.samples.push(pos);
    }

    /// Mean per-step displacement across the window.
    fn force(&self) -> Vec3 {
        if self.samples.len() < 2 {
            return Vec3::ZERO;
        }
        let mut total = Vec3::ZERO;
        for pair in self.samples.windows(2) {
            total += pair[1] - pair[0];
        }
        total / (self.samples.len() - 1) as f32
    }
}

/// The five-pass MLS-MPM pipeline over a structured GPU grid.
pub struct MlsMpmSimulator {
    ctx: GpuContext,
    config: SimulationConfig,
    particles: StructuredBuffer,
    grid_cells: StructuredBuffer,
    grid_velocity: wgpu::Buffer,
    uniform_buffer: wgpu::Buffer,
    force_field_buffer: wgpu::Buffer,
    boundary_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    clear_pipeline: wgpu::ComputePipeline,
    p2g1_pipeline: wgpu::ComputePipeline,
    p2g2_pipeline: wgpu::ComputePipeline,
    grid_update_pipeline: wgpu::ComputePipeline,
    g2p_pipeline: wgpu::ComputePipeline,
    num_particles: u32,
    color_mode: ColorMode,
    mouse_ray_origin: Vec3,
    mouse_ray_direction: Vec3,
    mouse: MouseTracker,
}

impl MlsMpmSimulator {
    /// Validate the configuration, allocate every buffer, and compile all
    /// five kernels. The boundary's collision emitter runs exactly once,
    /// here; afterwards the boundary talks to the kernel only through
    /// [`MlsMpmSimulator::set_boundary`] snapshots.
    pub fn new(
        ctx: GpuContext,
        config: SimulationConfig,
        boundary: &Boundary,
    ) -> Result<Self, SimulationError> {
        config.validate()?;
        let cell_count = config.cell_count() as usize;

        let mut particles = StructuredBuffer::new(
            "particle buffer",
            particle_layout(),
            config.max_particles,
        );
        particles.upload(&ctx);

        let mut grid_cells =
            StructuredBuffer::new("grid cells", kernels::grid_cell_layout(), cell_count);
        grid_cells.upload(&ctx);

        let grid_velocity = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("grid velocity"),
            size: (cell_count * 16) as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });

        let uniform_buffer = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("sim uniforms"),
            size: std::mem::size_of::<SimUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let force_field_buffer = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("force field uniforms"),
            size: std::mem::size_of::<ForceFieldUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let boundary_buffer = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("boundary uniforms"),
            size: std::mem::size_of::<crate::boundary::BoundaryUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        ctx.queue
            .write_buffer(&force_field_buffer, 0, bytemuck::bytes_of(&ForceFieldUniforms::default()));
        ctx.queue
            .write_buffer(&boundary_buffer, 0, bytemuck::bytes_of(&boundary.snapshot()));

        let storage_entry = |binding: u32| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only: false },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };
        let uniform_entry = |binding: u32| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };
        let bind_group_layout =
            ctx.device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("simulation bind group layout"),
                    entries: &[
                        storage_entry(0),
                        storage_entry(1),
                        storage_entry(2),
                        uniform_entry(3),
                        uniform_entry(4),
                        uniform_entry(5),
                    ],
                });

        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("simulation bind group"),
            layout: &bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: particles.gpu_buffer().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: grid_cells.gpu_buffer().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: grid_velocity.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: force_field_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: boundary_buffer.as_entire_binding(),
                },
            ],
        });

        let pipeline_layout = ctx
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("simulation pipeline layout"),
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            });

        let sources = kernels::generate(&config.materials, boundary);
        let build = |label: &str, source: &str| -> Result<wgpu::ComputePipeline, SimulationError> {
            ctx.device.push_error_scope(wgpu::ErrorFilter::Validation);
            let module = ctx
                .device
                .create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some(label),
                    source: wgpu::ShaderSource::Wgsl(source.into()),
                });
            let pipeline = ctx
                .device
                .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: Some(label),
                    layout: Some(&pipeline_layout),
                    module: &module,
                    entry_point: Some("main"),
                    compilation_options: Default::default(),
                    cache: None,
                });
            if let Some(err) = pollster::block_on(ctx.device.pop_error_scope()) {
                return Err(SimulationError::Dispatch(format!("{}: {}", label, err)));
            }
            log::debug!("built {} pipeline", label);
            Ok(pipeline)
        };

        let clear_pipeline = build("clear grid", &sources.clear_grid)?;
        let p2g1_pipeline = build("p2g1", &sources.p2g1)?;
        let p2g2_pipeline = build("p2g2", &sources.p2g2)?;
        let grid_update_pipeline = build("grid update", &sources.grid_update)?;
        let g2p_pipeline = build("g2p", &sources.g2p)?;

        Ok(Self {
            ctx,
            config,
            particles,
            grid_cells,
            grid_velocity,
            uniform_buffer,
            force_field_buffer,
            boundary_buffer,
            bind_group,
            clear_pipeline,
            p2g1_pipeline,
            p2g2_pipeline,
            grid_update_pipeline,
            g2p_pipeline,
            num_particles: 0,
            color_mode: ColorMode::default(),
            mouse_ray_origin: Vec3::ZERO,
            mouse_ray_direction: Vec3::NEG_Z,
            mouse: MouseTracker::default(),
        })
    }

    pub fn gpu(&self) -> &GpuContext {
        &self.ctx
    }

    pub fn grid_size(&self) -> UVec3 {
        self.config.grid_size
    }

    pub fn max_particles(&self) -> usize {
        self.config.max_particles
    }

    pub fn num_particles(&self) -> u32 {
        self.num_particles
    }

    /// The particle storage buffer, in the layout of
    /// [`crate::particle::particle_layout`]. Renderers bind this directly;
    /// together with [`MlsMpmSimulator::num_particles`] it is the whole
    /// output interface.
    pub fn particle_buffer(&self) -> &wgpu::Buffer {
        self.particles.gpu_buffer()
    }

    /// Mean per-step mouse displacement over the trailing samples.
    pub fn mouse_force(&self) -> Vec3 {
        self.mouse.force()
    }

    /// Choose which quantity G2P writes into the color channel.
    pub fn set_color_mode(&mut self, mode: ColorMode) {
        self.color_mode = mode;
    }

    /// Shrink or grow the live range. Slots past the count keep their bytes
    /// and are recycled by the next producer write.
    pub fn set_num_particles(&mut self, count: u32) {
        let max = self.config.max_particles as u32;
        if count > max {
            log::warn!(
                "particle count {} exceeds capacity {}; clamping",
                count,
                max
            );
        }
        self.num_particles = count.min(max);
    }

    /// Producer interface: encode `batch` into slots starting at `base_slot`.
    ///
    /// Writes past the capacity are dropped with a warning and the simulation
    /// continues; the live count grows to cover the slots actually written.
    pub fn write_particles(&mut self, batch: &[Particle], base_slot: usize) {
        let capacity = self.config.max_particles;
        let fit = batch.len().min(capacity.saturating_sub(base_slot));
        if fit < batch.len() {
            log::warn!(
                "dropping {} particle(s): capacity {} exceeded",
                batch.len() - fit,
                capacity
            );
        }
        if fit == 0 {
            return;
        }
        debug_assert!(base_slot + fit <= self.particles.len());
        for (i, particle) in batch[..fit].iter().enumerate() {
            particle.store(&mut self.particles, base_slot + i);
        }
        self.particles.upload_range(&self.ctx, base_slot, fit);
        self.num_particles = self.num_particles.max((base_slot + fit) as u32);
    }

    /// Update the interaction ray. Positions are pre-scaled to grid space;
    /// the simulator keeps the last three samples and derives the impulse
    /// from their mean displacement.
    pub fn set_mouse_ray(&mut self, origin: Vec3, direction: Vec3, pos: Vec3) {
        self.mouse_ray_origin = origin;
        self.mouse_ray_direction = direction.normalize_or_zero();
        self.mouse.push(pos);
    }

    /// Copy the force-field manager's packed uniforms into the kernel's
    /// uniform block.
    pub fn update_force_fields(&mut self, fields: &ForceFieldManager) -> Result<(), SimulationError> {
        let snapshot = fields.snapshot()?;
        self.ctx
            .queue
            .write_buffer(&self.force_field_buffer, 0, bytemuck::bytes_of(&snapshot));
        Ok(())
    }

    /// Refresh the boundary snapshot the G2P collision block reads.
    pub fn set_boundary(&mut self, boundary: &Boundary) {
        self.ctx
            .queue
            .write_buffer(&self.boundary_buffer, 0, bytemuck::bytes_of(&boundary.snapshot()));
    }

    /// Run one simulation step: write the uniform block, then dispatch the
    /// five kernels in order. A backend validation failure abandons the frame
    /// and surfaces as [`SimulationError::Dispatch`]; there is no retry here.
    pub fn update(
        &mut self,
        params: &SimulationParams,
        frame_dt: f32,
        elapsed: f32,
    ) -> Result<(), SimulationError> {
        if params.rest_density <= 0.0 {
            return Err(ConfigError::NonPositiveRestDensity(params.rest_density).into());
        }
        self.set_num_particles(params.num_particles);

        let dt = effective_dt(frame_dt, params.dt);
        let uniforms = SimUniforms {
            grid_size: self.config.grid_size.as_vec3().to_array(),
            num_particles: self.num_particles,
            dt,
            elapsed,
            noise: params.noise,
            stiffness: params.stiffness,
            rest_density: params.rest_density,
            dynamic_viscosity: params.dynamic_viscosity,
            gravity_type: params.gravity_type as u32,
            color_mode: self.color_mode as u32,
            gravity: params.gravity.to_array(),
            mouse_ray_origin: self.mouse_ray_origin.to_array(),
            mouse_ray_direction: self.mouse_ray_direction.to_array(),
            mouse_force: self.mouse.force().to_array(),
            ..SimUniforms::default()
        };
        self.ctx
            .queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&uniforms));

        let cell_groups = self.config.cell_count().div_ceil(WORKGROUP_SIZE);
        let particle_groups = self.num_particles.div_ceil(WORKGROUP_SIZE);

        self.ctx
            .device
            .push_error_scope(wgpu::ErrorFilter::Validation);

        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("simulation step"),
            });

        let passes: [(&wgpu::ComputePipeline, u32, &str); 5] = [
            (&self.clear_pipeline, cell_groups, "clear grid"),
            (&self.p2g1_pipeline, particle_groups, "p2g1"),
            (&self.p2g2_pipeline, particle_groups, "p2g2"),
            (&self.grid_update_pipeline, cell_groups, "grid update"),
            (&self.g2p_pipeline, particle_groups, "g2p"),
        ];
        for (pipeline, groups, label) in passes {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(label),
                timestamp_writes: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &self.bind_group, &[]);
            pass.dispatch_workgroups(groups, 1, 1);
        }

        self.ctx.queue.submit(std::iter::once(encoder.finish()));

        if let Some(err) = pollster::block_on(self.ctx.device.pop_error_scope()) {
            return Err(SimulationError::Dispatch(err.to_string()));
        }
        Ok(())
    }

    /// Block until all submitted work completes. Tests and hosts that read
    /// back every frame use this as the completion fence.
    pub fn wait(&self) {
        self.ctx.device.poll(wgpu::Maintain::Wait);
    }

    /// Read the live particles back to the host. Stalls the pipeline.
    pub fn read_particles(&mut self) -> Result<Vec<Particle>, SimulationError> {
        self.particles.read_back(&self.ctx).map_err(SimulationError::Gpu)?;
        let count = self.num_particles as usize;
        Ok((0..count)
            .filter_map(|i| Particle::load(&self.particles, i))
            .collect())
    }

    /// Read the decoded per-cell mass accumulators back to the host.
    pub fn read_grid_masses(&mut self) -> Result<Vec<f32>, SimulationError> {
        let words = self
            .grid_cells
            .read_back(&self.ctx)
            .map_err(SimulationError::Gpu)?;
        Ok(words
            .chunks_exact(4)
            .map(|cell| decode_fixed(cell[3] as i32))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_dt_caps_the_frame_delta() {
        // A slow frame is treated as 1/60.
        assert!((effective_dt(0.25, 1.0) - (1.0 / 60.0) * 6.0).abs() < 1e-6);
        // A fast frame passes through.
        assert!((effective_dt(0.005, 1.0) - 0.03).abs() < 1e-6);
        // The user knob scales linearly.
        assert!((effective_dt(0.005, 0.5) - 0.015).abs() < 1e-6);
    }

    #[test]
    fn config_rejects_degenerate_grids() {
        let cfg = SimulationConfig::default().with_grid_size(UVec3::new(0, 64, 64));
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidGridSize { .. })
        ));

        let cfg = SimulationConfig::default().with_grid_size(UVec3::splat(256));
        assert!(cfg.validate().is_err(), "256^3 exceeds the dispatch width");

        let cfg = SimulationConfig::default().with_grid_size(UVec3::splat(128));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn config_rejects_zero_capacity() {
        let cfg = SimulationConfig::default().with_max_particles(0);
        assert!(matches!(cfg.validate(), Err(ConfigError::ZeroCapacity)));
    }

    #[test]
    fn mouse_force_is_mean_step_displacement() {
        let mut tracker = MouseTracker::default();
        assert_eq!(tracker.force(), Vec3::ZERO);

        tracker.push(Vec3::ZERO);
        assert_eq!(tracker.force(), Vec3::ZERO);

        tracker.push(Vec3::new(2.0, 0.0, 0.0));
        tracker.push(Vec3::new(4.0, 2.0, 0.0));
        assert_eq!(tracker.force(), Vec3::new(2.0, 1.0, 0.0));

        // The window keeps only the last three samples.
        tracker.push(Vec3::new(4.0, 2.0, 6.0));
        tracker.push(Vec3::new(4.0, 2.0, 12.0));
        assert_eq!(tracker.force(), Vec3::new(0.0, 0.0, 6.0));
    }
}
