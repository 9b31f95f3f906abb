//! Host-side particle values and the canonical particle buffer layout.
//!
//! Emitters and other producers build [`Particle`] values and hand them to
//! the simulator, which encodes them into the structured layout below. The
//! simulator only ever observes producers through the active particle count;
//! slots past it are dead storage awaiting recycling.

use glam::{Mat3, Vec3};

use crate::buffer::{BufferLayout, FieldDesc, FieldKind, FieldValue, StructuredBuffer};
use crate::materials::MaterialKind;

/// The particle element layout shared by every kernel.
///
/// Scalars ride in the trailing word of the preceding vec3 slot, so the
/// whole element packs into 32 words.
pub fn particle_layout() -> BufferLayout {
    BufferLayout::new([
        FieldDesc::new("position", FieldKind::Vec3),
        FieldDesc::new("density", FieldKind::Float),
        FieldDesc::new("velocity", FieldKind::Vec3),
        FieldDesc::new("mass", FieldKind::Float),
        FieldDesc::new("C", FieldKind::Mat3),
        FieldDesc::new("direction", FieldKind::Vec3),
        FieldDesc::new("age", FieldKind::Float),
        FieldDesc::new("color", FieldKind::Vec3),
        FieldDesc::new("lifetime", FieldKind::Float),
        FieldDesc::new("material", FieldKind::Int),
    ])
}

/// One particle, host side. Grid-space position in `[0, grid_size)`.
#[derive(Clone, Copy, Debug)]
pub struct Particle {
    pub position: Vec3,
    pub velocity: Vec3,
    /// Affine velocity matrix for the APIC transfer. Rebuilt by G2P every
    /// frame; producers normally leave it zero.
    pub affine: Mat3,
    /// Smoothed local density estimate. Starts at 1.0 so the first pressure
    /// samples stay tame.
    pub density: f32,
    /// Immutable after spawn; slight jitter around 1.0 gives the fluid
    /// texture.
    pub mass: f32,
    /// Low-pass-filtered velocity, for oriented sprites.
    pub direction: Vec3,
    /// Last color written by G2P.
    pub color: Vec3,
    pub material: MaterialKind,
    /// Seconds since spawn.
    pub age: f32,
    /// Seconds before expiry; infinite unless the producer says otherwise.
    pub lifetime: f32,
}

impl Default for Particle {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            velocity: Vec3::ZERO,
            affine: Mat3::ZERO,
            density: 1.0,
            mass: 1.0,
            direction: Vec3::ZERO,
            color: Vec3::ONE,
            material: MaterialKind::Fluid,
            age: 0.0,
            lifetime: f32::INFINITY,
        }
    }
}

impl Particle {
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    pub fn with_velocity(mut self, velocity: Vec3) -> Self {
        self.velocity = velocity;
        self
    }

    pub fn with_material(mut self, material: MaterialKind) -> Self {
        self.material = material;
        self
    }

    pub fn with_mass(mut self, mass: f32) -> Self {
        self.mass = mass;
        self
    }

    pub fn with_lifetime(mut self, lifetime: f32) -> Self {
        self.lifetime = lifetime;
        self
    }

    /// Encode into slot `index` of a buffer using [`particle_layout`].
    pub fn store(&self, buf: &mut StructuredBuffer, index: usize) {
        buf.set(index, "position", self.position);
        buf.set(index, "density", self.density);
        buf.set(index, "velocity", self.velocity);
        buf.set(index, "mass", self.mass);
        buf.set(index, "C", self.affine);
        buf.set(index, "direction", self.direction);
        buf.set(index, "age", self.age);
        buf.set(index, "color", self.color);
        buf.set(index, "lifetime", self.lifetime);
        buf.set(index, "material", self.material.index());
    }

    /// Decode slot `index` back into a host value.
    pub fn load(buf: &StructuredBuffer, index: usize) -> Option<Self> {
        let vec3 = |field: &str| match buf.get(index, field)? {
            FieldValue::Vec3(v) => Some(v),
            _ => None,
        };
        let float = |field: &str| match buf.get(index, field)? {
            FieldValue::Float(v) => Some(v),
            _ => None,
        };
        let material = match buf.get(index, "material")? {
            FieldValue::Int(i) => MaterialKind::from_index(i).ok()?,
            _ => return None,
        };
        let affine = match buf.get(index, "C")? {
            FieldValue::Mat3(m) => m,
            _ => return None,
        };
        Some(Self {
            position: vec3("position")?,
            velocity: vec3("velocity")?,
            affine,
            density: float("density")?,
            mass: float("mass")?,
            direction: vec3("direction")?,
            color: vec3("color")?,
            material,
            age: float("age")?,
            lifetime: float("lifetime")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_packs_into_32_words() {
        let layout = particle_layout();
        assert_eq!(layout.stride_words(), 32);
        assert_eq!(layout.offset_of("position"), Some(0));
        assert_eq!(layout.offset_of("density"), Some(3));
        assert_eq!(layout.offset_of("velocity"), Some(4));
        assert_eq!(layout.offset_of("mass"), Some(7));
        assert_eq!(layout.offset_of("C"), Some(8));
        assert_eq!(layout.offset_of("direction"), Some(20));
        assert_eq!(layout.offset_of("age"), Some(23));
        assert_eq!(layout.offset_of("color"), Some(24));
        assert_eq!(layout.offset_of("lifetime"), Some(27));
        assert_eq!(layout.offset_of("material"), Some(28));
    }

    #[test]
    fn store_load_round_trip() {
        let mut buf = StructuredBuffer::new("particles", particle_layout(), 8);
        let p = Particle::at(Vec3::new(10.0, 20.0, 30.0))
            .with_velocity(Vec3::new(-1.0, 0.5, 2.0))
            .with_material(MaterialKind::Sand)
            .with_mass(1.05)
            .with_lifetime(4.0);
        p.store(&mut buf, 3);

        let q = Particle::load(&buf, 3).unwrap();
        assert_eq!(q.position, p.position);
        assert_eq!(q.velocity, p.velocity);
        assert_eq!(q.material, MaterialKind::Sand);
        assert_eq!(q.mass, 1.05);
        assert_eq!(q.lifetime, 4.0);
        assert_eq!(q.density, 1.0);
    }

    #[test]
    fn default_lifetime_is_infinite() {
        let mut buf = StructuredBuffer::new("particles", particle_layout(), 1);
        Particle::default().store(&mut buf, 0);
        let p = Particle::load(&buf, 0).unwrap();
        assert!(p.lifetime.is_infinite());
    }
}
