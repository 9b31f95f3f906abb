//! Container boundaries and viewport-driven containment.
//!
//! The boundary owns three things:
//!
//! - a shape state machine ([`Boundary::set_shape`]) whose derived geometry
//!   (walls, center, radius) is rebuilt on every transition,
//! - the collision code injected at the tail of the G2P kernel
//!   ([`Boundary::emit_collision`]), wired exactly once at kernel-build time
//!   and steered afterwards purely through its uniform snapshot,
//! - a CPU mirror of the same math ([`Boundary::apply_collision_response`])
//!   for test suites, which additionally understands the REFLECT/CLAMP/WRAP/
//!   KILL modes on the box shape.
//!
//! When no shape is active (or the shape is disabled) particles are held by a
//! soft spherical spring sized from the visible viewport, so the fluid hangs
//! inside the window instead of a hard box. The [`ViewportTracker`] feeds
//! that sizing; headless hosts use [`ViewportTracker::fixed`].

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};

/// Wall inset from the grid edge, in cells.
pub const WALL_THICKNESS: f32 = 3.0;

/// Extra inset applied to spherical radii so the fluid clears UI chrome.
const RADIUS_SAFETY_MARGIN: f32 = 5.0;

/// Container shapes. `None` means soft viewport containment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BoundaryShape {
    #[default]
    None,
    Box,
    Sphere,
    Tube,
    Dodecahedron,
    Custom,
}

impl BoundaryShape {
    /// Integer encoding used in the uniform block.
    pub fn index(self) -> i32 {
        match self {
            BoundaryShape::None => -1,
            BoundaryShape::Box => 0,
            BoundaryShape::Sphere => 1,
            BoundaryShape::Tube => 2,
            BoundaryShape::Dodecahedron => 3,
            BoundaryShape::Custom => 4,
        }
    }
}

/// Response applied by the CPU mirror when a box wall is crossed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CollisionMode {
    Reflect,
    #[default]
    Clamp,
    Wrap,
    Kill,
}

/// Uniform snapshot consumed by the collision code in G2P.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct BoundaryUniforms {
    pub wall_min: [f32; 3],
    pub enabled: i32,
    pub wall_max: [f32; 3],
    pub shape: i32,
    pub center: [f32; 3],
    pub radius: f32,
    pub stiffness: f32,
    pub viewport_pulse: f32,
    pub attractor_strength: f32,
    pub _pad: f32,
}

/// WGSL declaration matching [`BoundaryUniforms`].
pub fn uniform_struct_wgsl() -> &'static str {
    r#"struct BoundaryParams {
    wall_min: vec3<f32>,
    enabled: i32,
    wall_max: vec3<f32>,
    shape: i32,
    center: vec3<f32>,
    radius: f32,
    stiffness: f32,
    viewport_pulse: f32,
    attractor_strength: f32,
    _bp_pad: f32,
}
"#
}

/// The boundary module: shape, derived geometry, and collision emission.
#[derive(Clone, Debug)]
pub struct Boundary {
    shape: BoundaryShape,
    pub enabled: bool,
    grid_size: Vec3,
    wall_thickness: f32,
    pub stiffness: f32,
    pub restitution: f32,
    pub friction: f32,
    pub collision_mode: CollisionMode,
    /// Audio-reactive widening of the soft viewport sphere, `[0, 1]`.
    pub viewport_pulse: f32,
    /// Scales the soft-viewport spring. A plain knob of the snapshot.
    pub attractor_strength: f32,
    // Derived on every shape transition or grid resize.
    wall_min: Vec3,
    wall_max: Vec3,
    center: Vec3,
    radius: f32,
}

impl Boundary {
    pub fn new(grid_size: Vec3) -> Self {
        let mut b = Self {
            shape: BoundaryShape::None,
            enabled: false,
            grid_size,
            wall_thickness: WALL_THICKNESS,
            stiffness: 0.3,
            restitution: 0.5,
            friction: 0.1,
            collision_mode: CollisionMode::Clamp,
            viewport_pulse: 0.0,
            attractor_strength: 1.0,
            wall_min: Vec3::ZERO,
            wall_max: Vec3::ZERO,
            center: Vec3::ZERO,
            radius: 0.0,
        };
        b.rebuild();
        b
    }

    pub fn with_shape(grid_size: Vec3, shape: BoundaryShape) -> Self {
        let mut b = Self::new(grid_size);
        b.set_shape(shape);
        b.enabled = shape != BoundaryShape::None;
        b
    }

    pub fn shape(&self) -> BoundaryShape {
        self.shape
    }

    pub fn wall_min(&self) -> Vec3 {
        self.wall_min
    }

    pub fn wall_max(&self) -> Vec3 {
        self.wall_max
    }

    pub fn center(&self) -> Vec3 {
        self.center
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    /// Override the derived containment radius. A later shape transition or
    /// viewport update recomputes it from the grid again.
    pub fn set_radius(&mut self, radius: f32) {
        self.radius = radius.max(1.0);
    }

    pub fn grid_size(&self) -> Vec3 {
        self.grid_size
    }

    /// Transition the shape state machine. The previous shape's derived
    /// geometry is dropped and rebuilt for the new shape.
    pub fn set_shape(&mut self, shape: BoundaryShape) {
        if shape == self.shape {
            return;
        }
        log::debug!("boundary shape {:?} -> {:?}", self.shape, shape);
        self.shape = shape;
        self.rebuild();
    }

    /// Adopt the tracker's grid dimensions (soft viewport sizing).
    pub fn apply_viewport(&mut self, bounds: &ViewportBounds) {
        self.grid_size = Vec3::new(bounds.grid.width, bounds.grid.height, bounds.grid.depth);
        self.rebuild();
    }

    fn rebuild(&mut self) {
        self.wall_min = Vec3::splat(self.wall_thickness);
        self.wall_max = self.grid_size - self.wall_thickness;
        self.center = self.grid_size * 0.5;
        let safe = match self.shape {
            // The tube constrains radially in XY only.
            BoundaryShape::Tube => self.grid_size.x.min(self.grid_size.y),
            _ => self.grid_size.min_element(),
        };
        self.radius = (safe * 0.5 - (self.wall_thickness + RADIUS_SAFETY_MARGIN)).max(1.0);
    }

    /// Pack the current state for the G2P uniform block.
    pub fn snapshot(&self) -> BoundaryUniforms {
        BoundaryUniforms {
            wall_min: self.wall_min.to_array(),
            enabled: self.enabled as i32,
            wall_max: self.wall_max.to_array(),
            shape: self.shape.index(),
            center: self.center.to_array(),
            radius: self.radius,
            stiffness: self.stiffness,
            viewport_pulse: self.viewport_pulse,
            attractor_strength: self.attractor_strength,
            _pad: 0.0,
        }
    }

    /// Emit the collision block for the G2P kernel.
    ///
    /// `pos` and `vel` name mutable `var`s in the surrounding kernel; `dt`
    /// names the effective timestep. The code reads the `boundary` uniform,
    /// so shape changes after the build need no recompilation. Called exactly
    /// once, at kernel-build time; afterwards neither side holds the other.
    pub fn emit_collision(&self, pos: &str, vel: &str, dt: &str) -> String {
        format!(
            r#"    // Container collision on the predicted position.
    {{
        let predicted = {pos} + {vel} * {dt} * 3.0;
        if boundary.enabled == 0 || boundary.shape == -1 {{
            let offset = predicted - boundary.center;
            let d = length(offset);
            let safe_radius = boundary.radius * 0.95 + boundary.viewport_pulse * boundary.radius * 0.15;
            let soft_zone = boundary.radius * 0.7;
            if d > soft_zone {{
                let k = (0.04 + boundary.viewport_pulse * 0.08 + ((d - soft_zone) / (safe_radius - soft_zone)) * 0.12) * boundary.attractor_strength;
                {vel} -= offset * ((d - soft_zone) * k);
            }}
            let cur = {pos} - boundary.center;
            let cur_d = length(cur);
            if cur_d > safe_radius * 1.05 {{
                {pos} = boundary.center + cur * (safe_radius * 1.05 / cur_d);
            }}
        }} else if boundary.shape == 0 {{
            if predicted.x < boundary.wall_min.x {{ {vel}.x += (boundary.wall_min.x - predicted.x) * boundary.stiffness; }}
            if predicted.x > boundary.wall_max.x {{ {vel}.x += (boundary.wall_max.x - predicted.x) * boundary.stiffness; }}
            if predicted.y < boundary.wall_min.y {{ {vel}.y += (boundary.wall_min.y - predicted.y) * boundary.stiffness; }}
            if predicted.y > boundary.wall_max.y {{ {vel}.y += (boundary.wall_max.y - predicted.y) * boundary.stiffness; }}
            if predicted.z < boundary.wall_min.z {{ {vel}.z += (boundary.wall_min.z - predicted.z) * boundary.stiffness; }}
            if predicted.z > boundary.wall_max.z {{ {vel}.z += (boundary.wall_max.z - predicted.z) * boundary.stiffness; }}
            {pos} = clamp({pos}, boundary.wall_min, boundary.wall_max);
        }} else if boundary.shape == 1 || boundary.shape == 3 {{
            // The dodecahedron shares the spherical approximation.
            let offset = predicted - boundary.center;
            let d = length(offset);
            if d > boundary.radius {{
                {vel} -= (offset / d) * ((d - boundary.radius) * boundary.stiffness);
            }}
            let cur = {pos} - boundary.center;
            let cur_d = length(cur);
            if cur_d > boundary.radius {{
                {pos} = boundary.center + cur * (boundary.radius / cur_d);
            }}
        }} else if boundary.shape == 2 {{
            let radial = predicted.xy - boundary.center.xy;
            let rd = length(radial);
            if rd > boundary.radius {{
                let push = (radial / rd) * ((rd - boundary.radius) * boundary.stiffness);
                {vel}.x -= push.x;
                {vel}.y -= push.y;
            }}
            let cur_radial = {pos}.xy - boundary.center.xy;
            let crd = length(cur_radial);
            if crd > boundary.radius {{
                let on_ring = boundary.center.xy + cur_radial * (boundary.radius / crd);
                {pos}.x = on_ring.x;
                {pos}.y = on_ring.y;
            }}
            if predicted.z < boundary.wall_min.z {{ {vel}.z += (boundary.wall_min.z - predicted.z) * boundary.stiffness; }}
            if predicted.z > boundary.wall_max.z {{ {vel}.z += (boundary.wall_max.z - predicted.z) * boundary.stiffness; }}
            {pos}.z = clamp({pos}.z, boundary.wall_min.z, boundary.wall_max.z);
        }}
    }}
"#
        )
    }

    /// Geometric containment predicate for the active shape.
    pub fn check_collision(&self, p: Vec3) -> bool {
        match self.shape {
            BoundaryShape::None | BoundaryShape::Custom => {
                let safe_radius =
                    self.radius * 0.95 + self.viewport_pulse * self.radius * 0.15;
                (p - self.center).length() > safe_radius * 1.05
            }
            BoundaryShape::Box => {
                p.cmplt(self.wall_min).any() || p.cmpgt(self.wall_max).any()
            }
            BoundaryShape::Sphere | BoundaryShape::Dodecahedron => {
                (p - self.center).length() > self.radius
            }
            BoundaryShape::Tube => {
                let radial = Vec2::new(p.x - self.center.x, p.y - self.center.y);
                radial.length() > self.radius
                    || p.z < self.wall_min.z
                    || p.z > self.wall_max.z
            }
        }
    }

    /// CPU mirror of the G2P collision block. Returns `true` when the
    /// particle should be removed (KILL mode); the caller owns the removal.
    ///
    /// The box shape honors [`CollisionMode`]; REFLECT applies restitution,
    /// which the GPU path deliberately skips, so the two are not compared
    /// quantitatively for that mode.
    pub fn apply_collision_response(&self, pos: &mut Vec3, vel: &mut Vec3, dt: f32) -> bool {
        match self.shape {
            BoundaryShape::Box if self.enabled => match self.collision_mode {
                CollisionMode::Clamp => {
                    self.box_spring_clamp(pos, vel, dt);
                    false
                }
                CollisionMode::Reflect => {
                    for axis in 0..3 {
                        let (lo, hi) = (self.wall_min[axis], self.wall_max[axis]);
                        if pos[axis] < lo {
                            pos[axis] = lo;
                            vel[axis] = vel[axis].abs() * self.restitution;
                        } else if pos[axis] > hi {
                            pos[axis] = hi;
                            vel[axis] = -vel[axis].abs() * self.restitution;
                        }
                    }
                    false
                }
                CollisionMode::Wrap => {
                    let span = self.wall_max - self.wall_min;
                    for axis in 0..3 {
                        if pos[axis] < self.wall_min[axis] {
                            pos[axis] += span[axis];
                        } else if pos[axis] > self.wall_max[axis] {
                            pos[axis] -= span[axis];
                        }
                    }
                    false
                }
                CollisionMode::Kill => self.check_collision(*pos),
            },
            _ => {
                self.shared_response(pos, vel, dt);
                false
            }
        }
    }

    fn box_spring_clamp(&self, pos: &mut Vec3, vel: &mut Vec3, dt: f32) {
        let predicted = *pos + *vel * dt * 3.0;
        for axis in 0..3 {
            if predicted[axis] < self.wall_min[axis] {
                vel[axis] += (self.wall_min[axis] - predicted[axis]) * self.stiffness;
            }
            if predicted[axis] > self.wall_max[axis] {
                vel[axis] += (self.wall_max[axis] - predicted[axis]) * self.stiffness;
            }
        }
        *pos = pos.clamp(self.wall_min, self.wall_max);
    }

    // Identical math to the emitted WGSL for the non-box shapes.
    fn shared_response(&self, pos: &mut Vec3, vel: &mut Vec3, dt: f32) {
        let predicted = *pos + *vel * dt * 3.0;
        if !self.enabled || self.shape == BoundaryShape::None {
            let offset = predicted - self.center;
            let d = offset.length();
            let safe_radius = self.radius * 0.95 + self.viewport_pulse * self.radius * 0.15;
            let soft_zone = self.radius * 0.7;
            if d > soft_zone {
                let k = (0.04
                    + self.viewport_pulse * 0.08
                    + ((d - soft_zone) / (safe_radius - soft_zone)) * 0.12)
                    * self.attractor_strength;
                *vel -= offset * ((d - soft_zone) * k);
            }
            let cur = *pos - self.center;
            let cur_d = cur.length();
            if cur_d > safe_radius * 1.05 {
                *pos = self.center + cur * (safe_radius * 1.05 / cur_d);
            }
            return;
        }
        match self.shape {
            BoundaryShape::Box => self.box_spring_clamp(pos, vel, dt),
            BoundaryShape::Sphere | BoundaryShape::Dodecahedron => {
                let offset = predicted - self.center;
                let d = offset.length();
                if d > self.radius {
                    *vel -= (offset / d) * ((d - self.radius) * self.stiffness);
                }
                let cur = *pos - self.center;
                let cur_d = cur.length();
                if cur_d > self.radius {
                    *pos = self.center + cur * (self.radius / cur_d);
                }
            }
            BoundaryShape::Tube => {
                let radial = Vec2::new(predicted.x - self.center.x, predicted.y - self.center.y);
                let rd = radial.length();
                if rd > self.radius {
                    let push = (radial / rd) * ((rd - self.radius) * self.stiffness);
                    vel.x -= push.x;
                    vel.y -= push.y;
                }
                let cur_radial = Vec2::new(pos.x - self.center.x, pos.y - self.center.y);
                let crd = cur_radial.length();
                if crd > self.radius {
                    let on_ring = Vec2::new(self.center.x, self.center.y)
                        + cur_radial * (self.radius / crd);
                    pos.x = on_ring.x;
                    pos.y = on_ring.y;
                }
                if predicted.z < self.wall_min.z {
                    vel.z += (self.wall_min.z - predicted.z) * self.stiffness;
                }
                if predicted.z > self.wall_max.z {
                    vel.z += (self.wall_max.z - predicted.z) * self.stiffness;
                }
                pos.z = pos.z.clamp(self.wall_min.z, self.wall_max.z);
            }
            BoundaryShape::None | BoundaryShape::Custom => {}
        }
    }
}

/// Screen-space rectangle, pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rect {
    pub min_x: f32,
    pub min_y: f32,
    pub max_x: f32,
    pub max_y: f32,
}

/// Screen dimensions.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScreenBounds {
    pub width: f32,
    pub height: f32,
    pub aspect: f32,
}

/// Screen minus UI exclusions.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SafeZone {
    pub min_x: f32,
    pub max_x: f32,
    pub min_y: f32,
    pub max_y: f32,
    pub center: Vec2,
}

/// Grid dimensions derived from the safe zone.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GridBounds {
    pub width: f32,
    pub height: f32,
    pub depth: f32,
    pub center: Vec3,
}

/// The full viewport snapshot handed to subscribers.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewportBounds {
    pub screen: ScreenBounds,
    pub safe: SafeZone,
    pub grid: GridBounds,
}

/// Observes screen dimensions and UI exclusion zones and derives
/// [`ViewportBounds`]. Pure observer: hosts feed it, the simulator only ever
/// consumes the resulting bounds.
///
/// Updates are coalesced: mutations mark the tracker dirty and subscribers
/// are notified once per [`ViewportTracker::flush`], with a re-entrancy guard
/// so a subscriber mutating the tracker cannot recurse.
pub struct ViewportTracker {
    screen_w: f32,
    screen_h: f32,
    base_grid: Vec3,
    exclusions: Vec<Rect>,
    fixed: bool,
    dirty: bool,
    notifying: bool,
    current: ViewportBounds,
    subscribers: Vec<Box<dyn FnMut(&ViewportBounds)>>,
}

impl ViewportTracker {
    pub fn new(base_grid: Vec3) -> Self {
        let mut t = Self {
            screen_w: 1280.0,
            screen_h: 720.0,
            base_grid,
            exclusions: Vec::new(),
            fixed: false,
            dirty: true,
            notifying: false,
            current: ViewportBounds {
                screen: ScreenBounds {
                    width: 0.0,
                    height: 0.0,
                    aspect: 1.0,
                },
                safe: SafeZone {
                    min_x: 0.0,
                    max_x: 0.0,
                    min_y: 0.0,
                    max_y: 0.0,
                    center: Vec2::ZERO,
                },
                grid: GridBounds {
                    width: base_grid.x,
                    height: base_grid.y,
                    depth: base_grid.z,
                    center: base_grid * 0.5,
                },
            },
            subscribers: Vec::new(),
        };
        t.flush();
        t
    }

    /// A static bounds source for headless and cross-platform hosts: the
    /// grid never deviates from `grid`.
    pub fn fixed(grid: Vec3) -> Self {
        let mut t = Self::new(grid);
        // Square screen, no exclusions: the derived grid equals the base.
        t.screen_w = 1024.0;
        t.screen_h = 1024.0;
        t.dirty = true;
        t.flush();
        t.fixed = true;
        t
    }

    pub fn bounds(&self) -> &ViewportBounds {
        &self.current
    }

    pub fn set_screen(&mut self, width: f32, height: f32) {
        if self.fixed {
            return;
        }
        self.screen_w = width.max(1.0);
        self.screen_h = height.max(1.0);
        self.dirty = true;
        self.flush();
    }

    pub fn add_exclusion(&mut self, rect: Rect) {
        if self.fixed {
            return;
        }
        self.exclusions.push(rect);
        self.dirty = true;
        self.flush();
    }

    pub fn clear_exclusions(&mut self) {
        if self.fixed {
            return;
        }
        self.exclusions.clear();
        self.dirty = true;
        self.flush();
    }

    pub fn subscribe(&mut self, f: impl FnMut(&ViewportBounds) + 'static) {
        self.subscribers.push(Box::new(f));
    }

    /// Recompute and notify if dirty. Re-entrant calls coalesce into the
    /// in-flight notification.
    pub fn flush(&mut self) {
        if self.notifying {
            return;
        }
        self.notifying = true;
        while self.dirty {
            self.dirty = false;
            self.current = self.compute();
            let bounds = self.current;
            let mut subs = std::mem::take(&mut self.subscribers);
            for sub in &mut subs {
                sub(&bounds);
            }
            self.subscribers.extend(subs);
        }
        self.notifying = false;
    }

    fn compute(&self) -> ViewportBounds {
        let aspect = self.screen_w / self.screen_h;
        let screen = ScreenBounds {
            width: self.screen_w,
            height: self.screen_h,
            aspect,
        };

        // Shrink the safe rect away from any exclusion anchored to an edge.
        let (mut min_x, mut max_x) = (0.0f32, self.screen_w);
        let (mut min_y, mut max_y) = (0.0f32, self.screen_h);
        for r in &self.exclusions {
            let touches_left = r.min_x <= 1.0;
            let touches_right = r.max_x >= self.screen_w - 1.0;
            let touches_top = r.min_y <= 1.0;
            let touches_bottom = r.max_y >= self.screen_h - 1.0;
            if touches_left && !touches_right {
                min_x = min_x.max(r.max_x);
            } else if touches_right && !touches_left {
                max_x = max_x.min(r.min_x);
            } else if touches_top && !touches_bottom {
                min_y = min_y.max(r.max_y);
            } else if touches_bottom && !touches_top {
                max_y = max_y.min(r.min_y);
            }
        }
        min_x = min_x.min(max_x);
        min_y = min_y.min(max_y);
        let safe = SafeZone {
            min_x,
            max_x,
            min_y,
            max_y,
            center: Vec2::new((min_x + max_x) * 0.5, (min_y + max_y) * 0.5),
        };

        // Scale the grid so the domain matches the visible area: wide screens
        // widen the domain, exclusions shrink it.
        let safe_frac_x = ((max_x - min_x) / self.screen_w).clamp(0.1, 1.0);
        let safe_frac_y = ((max_y - min_y) / self.screen_h).clamp(0.1, 1.0);
        let width = self.base_grid.x * aspect.max(0.1) * safe_frac_x;
        let height = self.base_grid.y * safe_frac_y;
        let depth = self.base_grid.z;
        let grid = GridBounds {
            width,
            height,
            depth,
            center: Vec3::new(width, height, depth) * 0.5,
        };

        ViewportBounds { screen, safe, grid }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn grid() -> Vec3 {
        Vec3::splat(64.0)
    }

    #[test]
    fn shape_transition_rebuilds_geometry() {
        let mut b = Boundary::new(grid());
        assert_eq!(b.shape(), BoundaryShape::None);
        b.set_shape(BoundaryShape::Sphere);
        assert_eq!(b.shape(), BoundaryShape::Sphere);
        assert_eq!(b.radius(), 64.0 * 0.5 - (WALL_THICKNESS + 5.0));
        assert_eq!(b.wall_min(), Vec3::splat(WALL_THICKNESS));
        assert_eq!(b.wall_max(), Vec3::splat(64.0 - WALL_THICKNESS));
    }

    #[test]
    fn snapshot_encodes_shape_indices() {
        let mut b = Boundary::new(grid());
        assert_eq!(b.snapshot().shape, -1);
        b.set_shape(BoundaryShape::Box);
        assert_eq!(b.snapshot().shape, 0);
        b.set_shape(BoundaryShape::Dodecahedron);
        assert_eq!(b.snapshot().shape, 3);
    }

    #[test]
    fn box_clamp_contains_and_damps() {
        let mut b = Boundary::with_shape(grid(), BoundaryShape::Box);
        let mut pos = Vec3::new(70.0, 32.0, 32.0);
        let mut vel = Vec3::new(10.0, 0.0, 0.0);
        b.collision_mode = CollisionMode::Clamp;
        b.apply_collision_response(&mut pos, &mut vel, 0.1);
        assert!(pos.x <= b.wall_max().x);
        assert!(vel.x < 10.0);
    }

    #[test]
    fn box_reflect_applies_restitution() {
        let mut b = Boundary::with_shape(grid(), BoundaryShape::Box);
        b.collision_mode = CollisionMode::Reflect;
        b.restitution = 0.5;
        let mut pos = Vec3::new(1.0, 32.0, 32.0);
        let mut vel = Vec3::new(-4.0, 0.0, 0.0);
        assert!(!b.apply_collision_response(&mut pos, &mut vel, 0.1));
        assert_eq!(pos.x, b.wall_min().x);
        assert_eq!(vel.x, 2.0);
    }

    #[test]
    fn box_wrap_moves_to_opposite_wall() {
        let mut b = Boundary::with_shape(grid(), BoundaryShape::Box);
        b.collision_mode = CollisionMode::Wrap;
        let span = b.wall_max().x - b.wall_min().x;
        let mut pos = Vec3::new(b.wall_min().x - 1.0, 32.0, 32.0);
        let mut vel = Vec3::ZERO;
        b.apply_collision_response(&mut pos, &mut vel, 0.1);
        assert!((pos.x - (b.wall_min().x - 1.0 + span)).abs() < 1e-5);
    }

    #[test]
    fn box_kill_marks_but_does_not_mutate() {
        let mut b = Boundary::with_shape(grid(), BoundaryShape::Box);
        b.collision_mode = CollisionMode::Kill;
        let mut pos = Vec3::new(-5.0, 32.0, 32.0);
        let mut vel = Vec3::ZERO;
        assert!(b.apply_collision_response(&mut pos, &mut vel, 0.1));
        assert_eq!(pos, Vec3::new(-5.0, 32.0, 32.0));

        let mut inside = Vec3::splat(32.0);
        assert!(!b.apply_collision_response(&mut inside, &mut vel, 0.1));
    }

    #[test]
    fn collision_is_idempotent_inside_the_container() {
        for shape in [
            BoundaryShape::Box,
            BoundaryShape::Sphere,
            BoundaryShape::Tube,
            BoundaryShape::Dodecahedron,
        ] {
            let b = Boundary::with_shape(grid(), shape);
            let mut pos = Vec3::splat(32.0);
            let mut vel = Vec3::ZERO;
            b.apply_collision_response(&mut pos, &mut vel, 0.1);
            assert_eq!(pos, Vec3::splat(32.0), "{:?}", shape);
            assert_eq!(vel, Vec3::ZERO, "{:?}", shape);
        }
    }

    #[test]
    fn sphere_projects_escapees_onto_the_surface() {
        let b = Boundary::with_shape(grid(), BoundaryShape::Sphere);
        let mut pos = b.center() + Vec3::X * (b.radius() + 10.0);
        let mut vel = Vec3::ZERO;
        b.apply_collision_response(&mut pos, &mut vel, 0.1);
        assert!(((pos - b.center()).length() - b.radius()).abs() < 1e-4);
    }

    #[test]
    fn tube_constrains_radially_and_axially() {
        let b = Boundary::with_shape(grid(), BoundaryShape::Tube);
        let mut pos = b.center() + Vec3::new(b.radius() + 4.0, 0.0, 0.0);
        let mut vel = Vec3::ZERO;
        b.apply_collision_response(&mut pos, &mut vel, 0.1);
        let radial = Vec2::new(pos.x - b.center().x, pos.y - b.center().y);
        assert!((radial.length() - b.radius()).abs() < 1e-4);

        let mut below = Vec3::new(32.0, 32.0, -2.0);
        b.apply_collision_response(&mut below, &mut vel, 0.1);
        assert!(below.z >= b.wall_min().z);
    }

    #[test]
    fn soft_viewport_clamps_far_escapees() {
        let b = Boundary::new(grid());
        let safe_radius = b.radius() * 0.95;
        let mut pos = b.center() + Vec3::Y * (b.radius() * 3.0);
        let mut vel = Vec3::ZERO;
        b.apply_collision_response(&mut pos, &mut vel, 0.1);
        assert!((pos - b.center()).length() <= safe_radius * 1.05 + 1e-3);
    }

    #[test]
    fn emitted_wgsl_references_the_handles_it_was_given() {
        let b = Boundary::new(grid());
        let code = b.emit_collision("pos", "vel", "sim.dt");
        assert!(code.contains("pos + vel * sim.dt * 3.0"));
        assert!(code.contains("boundary.wall_min"));
    }

    #[test]
    fn tracker_scales_grid_with_aspect() {
        let mut t = ViewportTracker::new(grid());
        t.set_screen(1920.0, 1080.0);
        let b = t.bounds();
        assert!((b.screen.aspect - 1920.0 / 1080.0).abs() < 1e-5);
        assert!((b.grid.width - 64.0 * b.screen.aspect).abs() < 1e-3);
        assert_eq!(b.grid.height, 64.0);
        assert_eq!(b.grid.depth, 64.0);
    }

    #[test]
    fn tracker_shrinks_safe_zone_for_edge_panels() {
        let mut t = ViewportTracker::new(grid());
        t.set_screen(1000.0, 1000.0);
        // A 200px panel docked on the left.
        t.add_exclusion(Rect {
            min_x: 0.0,
            min_y: 0.0,
            max_x: 200.0,
            max_y: 1000.0,
        });
        let b = t.bounds();
        assert_eq!(b.safe.min_x, 200.0);
        assert!(b.grid.width < 64.0 * b.screen.aspect);
    }

    #[test]
    fn tracker_notifies_once_per_coalesced_update() {
        let hits = Rc::new(RefCell::new(0));
        let hits2 = hits.clone();
        let mut t = ViewportTracker::new(grid());
        t.subscribe(move |_| *hits2.borrow_mut() += 1);
        t.set_screen(800.0, 600.0);
        let after_first = *hits.borrow();
        assert_eq!(after_first, 1);
        t.set_screen(800.0, 600.0);
        assert_eq!(*hits.borrow(), 2);
    }

    #[test]
    fn fixed_tracker_ignores_screen_changes() {
        let mut t = ViewportTracker::fixed(grid());
        let before = *t.bounds();
        t.set_screen(4000.0, 100.0);
        t.add_exclusion(Rect {
            min_x: 0.0,
            min_y: 0.0,
            max_x: 500.0,
            max_y: 100.0,
        });
        assert_eq!(*t.bounds(), before);
    }
}
