//! WGSL source generation for the five compute passes.
//!
//! Every kernel is assembled from the same binding preamble plus the snippets
//! the pass needs: the material switch for P2G2, the force-field evaluator
//! and boundary collision block for G2P. The grid struct is rendered with
//! atomics matching each pass — all four accumulators in P2G1, momentum only
//! in P2G2, plain everywhere else — over the one shared backing buffer.
//!
//! Pipeline order per frame: clear → P2G1 → P2G2 → grid-update → G2P.
//! P2G passes scatter with commutative `atomicAdd`s, grid-update touches one
//! cell per invocation, and G2P reads the float grid no pass is writing, so
//! intra-pass ordering is unobservable by construction.

use glam::Vec3;

use crate::boundary::{self, Boundary};
use crate::buffer::{BufferLayout, FieldDesc, FieldKind};
use crate::forcefield;
use crate::materials::MaterialTable;
use crate::particle::particle_layout;
use crate::shader_utils;
use crate::uniforms;

/// Work-items per workgroup for every pass.
pub const WORKGROUP_SIZE: u32 = 256;

/// Fixed-point scale for the integer grid accumulators. Chosen for values in
/// roughly `[-200, 200]` at ~1e-5 precision.
pub const FIXED_POINT_MULTIPLIER: f32 = 1.0e7;

/// How fast a particle forgets its previous local density estimate.
pub const DENSITY_SMOOTHING: f32 = 0.05;

/// Low-pass factor for the orientation vector.
pub const DIRECTION_SMOOTHING: f32 = 0.1;

/// CPU mirror of the kernel-side fixed-point encoder.
#[inline]
pub fn encode_fixed(value: f32) -> i32 {
    (value * FIXED_POINT_MULTIPLIER) as i32
}

/// CPU mirror of the kernel-side fixed-point decoder.
#[inline]
pub fn decode_fixed(value: i32) -> f32 {
    value as f32 / FIXED_POINT_MULTIPLIER
}

/// Quadratic B-spline weights per axis for a fractional cell offset in
/// `[-0.5, 0.5]`. CPU mirror of the kernel helper; the 27 products of one
/// weight per axis partition unity.
pub fn bspline_weights(cell_diff: Vec3) -> [Vec3; 3] {
    let a = Vec3::splat(0.5) - cell_diff;
    let b = Vec3::splat(0.5) + cell_diff;
    [
        0.5 * a * a,
        Vec3::splat(0.75) - cell_diff * cell_diff,
        0.5 * b * b,
    ]
}

/// Layout of one integer grid cell: fixed-point momentum plus mass, all
/// eligible for atomic accumulation.
pub fn grid_cell_layout() -> BufferLayout {
    BufferLayout::new([
        FieldDesc::atomic("x", FieldKind::Int),
        FieldDesc::atomic("y", FieldKind::Int),
        FieldDesc::atomic("z", FieldKind::Int),
        FieldDesc::atomic("mass", FieldKind::Int),
    ])
}

/// The generated WGSL for all five passes.
pub struct KernelSources {
    pub clear_grid: String,
    pub p2g1: String,
    pub p2g2: String,
    pub grid_update: String,
    pub g2p: String,
}

fn preamble(grid_struct: &str) -> String {
    format!(
        "{particle}\n{grid}\n{sim}\n{ff}\n{bp}\n\
@group(0) @binding(0) var<storage, read_write> particles: array<Particle>;\n\
@group(0) @binding(1) var<storage, read_write> grid_cells: array<GridCell>;\n\
@group(0) @binding(2) var<storage, read_write> grid_velocity: array<vec4<f32>>;\n\
@group(0) @binding(3) var<uniform> sim: SimUniforms;\n\
@group(0) @binding(4) var<uniform> force_fields: ForceFields;\n\
@group(0) @binding(5) var<uniform> boundary: BoundaryParams;\n",
        particle = particle_layout().wgsl_struct("Particle", false),
        grid = grid_struct,
        sim = uniforms::sim_uniforms_wgsl(),
        ff = forcefield::uniform_struct_wgsl(),
        bp = boundary::uniform_struct_wgsl(),
    )
}

fn fixed_point_wgsl() -> String {
    format!(
        r#"fn encode_fixed(value: f32) -> i32 {{
    return i32(value * {mult:?});
}}

fn decode_fixed(value: i32) -> f32 {{
    return f32(value) / {mult:?};
}}
"#,
        mult = FIXED_POINT_MULTIPLIER
    )
}

const GRID_HELPERS_WGSL: &str = r#"fn cell_index(cell: vec3<i32>) -> u32 {
    let dims = vec3<u32>(sim.grid_size);
    return (u32(cell.x) * dims.y + u32(cell.y)) * dims.z + u32(cell.z);
}

fn bspline_weights(cell_diff: vec3<f32>) -> array<vec3<f32>, 3> {
    var w: array<vec3<f32>, 3>;
    let a = vec3<f32>(0.5) - cell_diff;
    let b = vec3<f32>(0.5) + cell_diff;
    w[0] = 0.5 * a * a;
    w[1] = vec3<f32>(0.75) - cell_diff * cell_diff;
    w[2] = 0.5 * b * b;
    return w;
}
"#;

fn clear_grid_wgsl() -> String {
    let grid_struct = grid_cell_layout().wgsl_struct("GridCell", false);
    format!(
        r#"{preamble}
@compute @workgroup_size({wg})
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {{
    let dims = vec3<u32>(sim.grid_size);
    let index = gid.x;
    if index >= dims.x * dims.y * dims.z {{
        return;
    }}
    grid_cells[index].x = 0;
    grid_cells[index].y = 0;
    grid_cells[index].z = 0;
    grid_cells[index].mass = 0;
    grid_velocity[index] = vec4<f32>(0.0);
}}
"#,
        preamble = preamble(&grid_struct),
        wg = WORKGROUP_SIZE,
    )
}

fn p2g1_wgsl() -> String {
    let grid_struct = grid_cell_layout().wgsl_struct("GridCell", true);
    format!(
        r#"{preamble}
{fixed_point}
{grid_helpers}
@compute @workgroup_size({wg})
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {{
    let index = gid.x;
    if index >= sim.num_particles {{
        return;
    }}
    let p = particles[index];
    let position = p.position;
    let cell_base = vec3<i32>(floor(position)) - vec3<i32>(1);
    let cell_diff = fract(position) - vec3<f32>(0.5);
    var w = bspline_weights(cell_diff);

    for (var gx = 0; gx < 3; gx = gx + 1) {{
        for (var gy = 0; gy < 3; gy = gy + 1) {{
            for (var gz = 0; gz < 3; gz = gz + 1) {{
                let weight = w[gx].x * w[gy].y * w[gz].z;
                let cell = cell_base + vec3<i32>(gx, gy, gz);
                let cell_dist = (vec3<f32>(cell) + vec3<f32>(0.5)) - position;
                let q = p.C * cell_dist;
                let vel_contrib = (p.velocity + q) * weight;
                let ci = cell_index(cell);
                atomicAdd(&grid_cells[ci].x, encode_fixed(vel_contrib.x));
                atomicAdd(&grid_cells[ci].y, encode_fixed(vel_contrib.y));
                atomicAdd(&grid_cells[ci].z, encode_fixed(vel_contrib.z));
                atomicAdd(&grid_cells[ci].mass, encode_fixed(weight));
            }}
        }}
    }}
}}
"#,
        preamble = preamble(&grid_struct),
        fixed_point = fixed_point_wgsl(),
        grid_helpers = GRID_HELPERS_WGSL,
        wg = WORKGROUP_SIZE,
    )
}

fn p2g2_wgsl(materials: &MaterialTable) -> String {
    let grid_struct = grid_cell_layout().wgsl_struct_selective("GridCell", &["x", "y", "z"]);
    format!(
        r#"{preamble}
{fixed_point}
{grid_helpers}
{material_lookup}
{material_stress}
@compute @workgroup_size({wg})
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {{
    let index = gid.x;
    if index >= sim.num_particles {{
        return;
    }}
    var p = particles[index];
    let position = p.position;
    let cell_base = vec3<i32>(floor(position)) - vec3<i32>(1);
    let cell_diff = fract(position) - vec3<f32>(0.5);
    var w = bspline_weights(cell_diff);

    // Local density from the mass scattered in P2G1.
    var density = 0.0;
    for (var gx = 0; gx < 3; gx = gx + 1) {{
        for (var gy = 0; gy < 3; gy = gy + 1) {{
            for (var gz = 0; gz < 3; gz = gz + 1) {{
                let weight = w[gx].x * w[gy].y * w[gz].z;
                let ci = cell_index(cell_base + vec3<i32>(gx, gy, gz));
                density = density + decode_fixed(grid_cells[ci].mass) * weight;
            }}
        }}
    }}
    p.density = mix(p.density, density, {density_smoothing:?});
    particles[index].density = p.density;

    let volume = 1.0 / max(p.density, 1e-5);
    let pressure = max(0.0, pow(p.density / sim.rest_density, 5.0) - 1.0)
        * sim.stiffness * material_stiffness(p.material);
    let strain = p.C + transpose(p.C);
    let viscosity = sim.dynamic_viscosity * material_viscosity(p.material);
    let stress = material_stress(p.material, pressure, strain, viscosity);
    let eq16_term0 = stress * (-4.0 * volume * sim.dt);

    for (var gx = 0; gx < 3; gx = gx + 1) {{
        for (var gy = 0; gy < 3; gy = gy + 1) {{
            for (var gz = 0; gz < 3; gz = gz + 1) {{
                let weight = w[gx].x * w[gy].y * w[gz].z;
                let cell = cell_base + vec3<i32>(gx, gy, gz);
                let cell_dist = (vec3<f32>(cell) + vec3<f32>(0.5)) - position;
                let momentum = (eq16_term0 * weight) * cell_dist;
                let ci = cell_index(cell);
                atomicAdd(&grid_cells[ci].x, encode_fixed(momentum.x));
                atomicAdd(&grid_cells[ci].y, encode_fixed(momentum.y));
                atomicAdd(&grid_cells[ci].z, encode_fixed(momentum.z));
            }}
        }}
    }}
}}
"#,
        preamble = preamble(&grid_struct),
        fixed_point = fixed_point_wgsl(),
        grid_helpers = GRID_HELPERS_WGSL,
        material_lookup = materials.lookup_wgsl(),
        material_stress = materials.stress_wgsl(),
        density_smoothing = DENSITY_SMOOTHING,
        wg = WORKGROUP_SIZE,
    )
}

fn grid_update_wgsl() -> String {
    let grid_struct = grid_cell_layout().wgsl_struct("GridCell", false);
    format!(
        r#"{preamble}
{fixed_point}
@compute @workgroup_size({wg})
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {{
    let dims = vec3<u32>(sim.grid_size);
    let index = gid.x;
    if index >= dims.x * dims.y * dims.z {{
        return;
    }}
    let mass = decode_fixed(grid_cells[index].mass);
    if mass <= 0.0 {{
        grid_velocity[index] = vec4<f32>(0.0);
        return;
    }}
    let velocity = vec3<f32>(
        decode_fixed(grid_cells[index].x),
        decode_fixed(grid_cells[index].y),
        decode_fixed(grid_cells[index].z)
    ) / mass;
    grid_velocity[index] = vec4<f32>(velocity, mass);
}}
"#,
        preamble = preamble(&grid_struct),
        fixed_point = fixed_point_wgsl(),
        wg = WORKGROUP_SIZE,
    )
}

fn g2p_wgsl(materials: &MaterialTable, boundary: &Boundary) -> String {
    let grid_struct = grid_cell_layout().wgsl_struct("GridCell", false);
    let collision = boundary.emit_collision("pos", "vel", "sim.dt");
    format!(
        r#"{preamble}
{utils}
{grid_helpers}
{material_lookup}
{field_eval}
@compute @workgroup_size({wg})
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {{
    let index = gid.x;
    if index >= sim.num_particles {{
        return;
    }}
    var p = particles[index];
    var pos = p.position;
    var vel = vec3<f32>(0.0);

    // Gravity.
    if sim.gravity_type == 2u {{
        let to_center = pos / sim.grid_size - vec3<f32>(0.5);
        let len = length(to_center);
        if len > 1e-5 {{
            vel -= (to_center / len) * (0.3 * sim.dt);
        }}
    }} else if sim.gravity_type == 1u {{
        vel += sim.gravity * sim.dt;
    }}

    // Ambient noise.
    let raw_noise = tri_noise3d_vec(pos * 0.015, sim.elapsed, 0.11) - vec3<f32>(0.285);
    let noise_len = length(raw_noise);
    if noise_len > 1e-5 {{
        vel -= (raw_noise / noise_len) * (0.28 * sim.noise * sim.dt);
    }}

    // Gather from the float grid and rebuild the affine matrix.
    let cell_base = vec3<i32>(floor(pos)) - vec3<i32>(1);
    let cell_diff = fract(pos) - vec3<f32>(0.5);
    var w = bspline_weights(cell_diff);
    var b = mat3x3<f32>(vec3<f32>(0.0), vec3<f32>(0.0), vec3<f32>(0.0));
    for (var gx = 0; gx < 3; gx = gx + 1) {{
        for (var gy = 0; gy < 3; gy = gy + 1) {{
            for (var gz = 0; gz < 3; gz = gz + 1) {{
                let weight = w[gx].x * w[gy].y * w[gz].z;
                let cell = cell_base + vec3<i32>(gx, gy, gz);
                let cell_dist = (vec3<f32>(cell) + vec3<f32>(0.5)) - pos;
                let weighted = grid_velocity[cell_index(cell)].xyz * weight;
                vel += weighted;
                b += mat3x3<f32>(weighted * cell_dist.x, weighted * cell_dist.y, weighted * cell_dist.z);
            }}
        }}
    }}
    p.C = b * 4.0;

    // Mouse interaction: squared-falloff force around the pick ray, with
    // depth compressed so the brush feels flat.
    let to_particle = pos - sim.mouse_ray_origin;
    var ray_offset = to_particle - sim.mouse_ray_direction * dot(to_particle, sim.mouse_ray_direction);
    ray_offset.z = ray_offset.z * 0.4;
    let ray_dist = length(ray_offset);
    let mouse_factor = pow(max(0.0, 1.0 - ray_dist * 0.1), 2.0);
    vel += sim.mouse_force * mouse_factor;

    // Per-particle mass factor.
    vel *= p.mass;

    pos += vel * sim.dt;

    // Force-field impulse, then the container takes the final word.
    vel += evaluate_force_fields(pos, sim.elapsed) * sim.dt;

{collision}

    p.position = pos;
    p.velocity = vel;
    p.direction = mix(p.direction, vel, {direction_smoothing:?});
    p.age = p.age + sim.dt;

    let density_ratio = p.density / sim.rest_density;
    if sim.color_mode == 0u {{
        let hue = density_ratio * 0.25 + sim.elapsed * 0.05;
        let sat = clamp(length(vel) * 0.5, 0.0, 1.0) * 0.3 + 0.7;
        let val = mouse_factor * 0.3 + 0.7;
        p.color = hsv_to_rgb(hue, sat, val);
    }} else if sim.color_mode == 1u {{
        p.color = hsv_to_rgb(density_ratio * 0.5, 0.8, 1.0);
    }} else if sim.color_mode == 3u {{
        p.color = material_color(p.material);
    }}
    // Remaining modes belong to the renderer; the stored color rides along.

    particles[index] = p;
}}
"#,
        preamble = preamble(&grid_struct),
        utils = shader_utils::all_utils_wgsl(),
        grid_helpers = GRID_HELPERS_WGSL,
        material_lookup = materials.lookup_wgsl(),
        field_eval = forcefield::evaluator_wgsl(),
        collision = collision,
        direction_smoothing = DIRECTION_SMOOTHING,
        wg = WORKGROUP_SIZE,
    )
}

/// Generate all five kernels. Called once at simulator build; the boundary's
/// collision emitter is invoked here and never again.
pub fn generate(materials: &MaterialTable, boundary: &Boundary) -> KernelSources {
    KernelSources {
        clear_grid: clear_grid_wgsl(),
        p2g1: p2g1_wgsl(),
        p2g2: p2g2_wgsl(materials),
        grid_update: grid_update_wgsl(),
        g2p: g2p_wgsl(materials, boundary),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::BoundaryShape;

    #[test]
    fn fixed_point_round_trips_within_tolerance() {
        let mut x = -10.0f32;
        while x <= 10.0 {
            let back = decode_fixed(encode_fixed(x));
            assert!(
                (back - x).abs() <= 1.0 / FIXED_POINT_MULTIPLIER,
                "{} -> {}",
                x,
                back
            );
            x += 0.0137;
        }
    }

    #[test]
    fn bspline_weights_partition_unity() {
        for i in 0..100 {
            let d = Vec3::new(
                (i as f32 * 0.031).sin() * 0.5,
                (i as f32 * 0.057).cos() * 0.5,
                ((i as f32 * 0.013).sin() * (i as f32 * 0.029).cos()) * 0.5,
            );
            let w = bspline_weights(d);
            let mut total = 0.0;
            for gx in 0..3 {
                for gy in 0..3 {
                    for gz in 0..3 {
                        total += w[gx].x * w[gy].y * w[gz].z;
                    }
                }
            }
            assert!((total - 1.0).abs() < 1e-5, "sum {} at {:?}", total, d);
        }
    }

    #[test]
    fn every_kernel_has_an_entry_point() {
        let sources = generate(
            &MaterialTable::default(),
            &Boundary::new(Vec3::splat(64.0)),
        );
        for src in [
            &sources.clear_grid,
            &sources.p2g1,
            &sources.p2g2,
            &sources.grid_update,
            &sources.g2p,
        ] {
            assert!(src.contains("@compute"));
            assert!(src.contains("fn main"));
        }
    }

    #[test]
    fn atomics_match_each_pass() {
        let sources = generate(
            &MaterialTable::default(),
            &Boundary::with_shape(Vec3::splat(64.0), BoundaryShape::Box),
        );
        assert!(!sources.clear_grid.contains("atomic<i32>"));
        assert!(sources.p2g1.contains("mass: atomic<i32>"));
        assert!(sources.p2g2.contains("x: atomic<i32>"));
        assert!(sources.p2g2.contains("mass: i32"));
        assert!(!sources.grid_update.contains("atomic<i32>"));
        assert!(sources.g2p.contains("boundary.wall_min"));
    }

    #[test]
    fn grid_cell_layout_is_four_words() {
        assert_eq!(grid_cell_layout().stride_words(), 4);
    }
}
