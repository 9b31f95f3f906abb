//! Typed, aligned storage over a raw GPU buffer.
//!
//! A [`BufferLayout`] describes elements as `(name, kind, atomic?)` fields and
//! assigns each field a word offset following WGSL storage rules, so one
//! offset table drives both host-side writes and the generated shader struct.
//! The P2G passes need atomic integer accumulation on the grid while the
//! particle buffer stays plain; [`BufferLayout::wgsl_struct`] renders either
//! view of the same backing store depending on the per-dispatch atomic flag.

use glam::{Mat3, Vec3, Vec4};
use std::collections::HashSet;

use crate::error::GpuError;
use crate::gpu::GpuContext;

/// One 4-byte scalar word.
pub const WORD_BYTES: usize = 4;

/// Scalar shape of a field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
    Float,
    Int,
    Vec3,
    Vec4,
    Mat3,
}

impl FieldKind {
    /// Field size in scalar words. `Mat3` is three vec4-padded columns.
    pub fn size_words(self) -> usize {
        match self {
            FieldKind::Float | FieldKind::Int => 1,
            FieldKind::Vec3 => 3,
            FieldKind::Vec4 => 4,
            FieldKind::Mat3 => 12,
        }
    }

    /// Alignment in scalar words, matching WGSL storage layout.
    pub fn align_words(self) -> usize {
        match self {
            FieldKind::Float | FieldKind::Int => 1,
            FieldKind::Vec3 | FieldKind::Vec4 | FieldKind::Mat3 => 4,
        }
    }

    fn wgsl_type(self, atomic: bool) -> &'static str {
        match self {
            FieldKind::Float => "f32",
            FieldKind::Int => {
                if atomic {
                    "atomic<i32>"
                } else {
                    "i32"
                }
            }
            FieldKind::Vec3 => "vec3<f32>",
            FieldKind::Vec4 => "vec4<f32>",
            FieldKind::Mat3 => "mat3x3<f32>",
        }
    }
}

/// A field in a buffer element.
#[derive(Clone, Debug)]
pub struct FieldDesc {
    pub name: &'static str,
    pub kind: FieldKind,
    /// Whether kernels may accumulate into this field with `atomicAdd`.
    /// Only meaningful for `Int` fields.
    pub atomic: bool,
}

impl FieldDesc {
    pub fn new(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            atomic: false,
        }
    }

    pub fn atomic(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            atomic: true,
        }
    }
}

#[derive(Clone, Debug)]
struct PlacedField {
    desc: FieldDesc,
    offset_words: usize,
}

/// Field offsets and element stride for a structured buffer.
#[derive(Clone, Debug)]
pub struct BufferLayout {
    fields: Vec<PlacedField>,
    stride_words: usize,
}

impl BufferLayout {
    /// Place fields in declaration order. Each field is aligned to its kind's
    /// alignment; the stride is padded to a multiple of 4 words so elements
    /// tile the same way WGSL lays out an `array<T>`.
    pub fn new(fields: impl IntoIterator<Item = FieldDesc>) -> Self {
        let mut placed = Vec::new();
        let mut cursor = 0usize;
        for desc in fields {
            let align = desc.kind.align_words();
            cursor = cursor.div_ceil(align) * align;
            let size = desc.kind.size_words();
            placed.push(PlacedField {
                offset_words: cursor,
                desc,
            });
            cursor += size;
        }
        let stride_words = cursor.div_ceil(4) * 4;
        Self {
            fields: placed,
            stride_words,
        }
    }

    pub fn stride_words(&self) -> usize {
        self.stride_words
    }

    pub fn stride_bytes(&self) -> usize {
        self.stride_words * WORD_BYTES
    }

    /// Word offset of `name` within an element, if the field exists.
    pub fn offset_of(&self, name: &str) -> Option<usize> {
        self.fields
            .iter()
            .find(|f| f.desc.name == name)
            .map(|f| f.offset_words)
    }

    pub fn kind_of(&self, name: &str) -> Option<FieldKind> {
        self.fields
            .iter()
            .find(|f| f.desc.name == name)
            .map(|f| f.desc.kind)
    }

    /// Render the element as a WGSL struct. When `atomic` is set, fields
    /// flagged atomic become `atomic<i32>`; the backing bytes are identical
    /// either way, so kernels toggle the flag per dispatch.
    pub fn wgsl_struct(&self, struct_name: &str, atomic: bool) -> String {
        self.render_wgsl(struct_name, &|field| atomic && field.atomic)
    }

    /// Like [`BufferLayout::wgsl_struct`] but atomics are enabled for the
    /// named fields only. P2G2 accumulates momentum atomically while reading
    /// the mass channel plainly, so the two views coexist across dispatches.
    pub fn wgsl_struct_selective(&self, struct_name: &str, atomic_fields: &[&str]) -> String {
        self.render_wgsl(struct_name, &|field| {
            field.atomic && atomic_fields.contains(&field.name)
        })
    }

    fn render_wgsl(&self, struct_name: &str, atomic: &dyn Fn(&FieldDesc) -> bool) -> String {
        let mut out = format!("struct {} {{\n", struct_name);
        let mut cursor = 0usize;
        let mut pad = 0usize;
        for field in &self.fields {
            let align = field.desc.kind.align_words();
            let aligned = cursor.div_ceil(align) * align;
            for _ in cursor..aligned {
                out.push_str(&format!("    _pad{}: f32,\n", pad));
                pad += 1;
            }
            out.push_str(&format!(
                "    {}: {},\n",
                field.desc.name,
                field.desc.kind.wgsl_type(atomic(&field.desc))
            ));
            cursor = aligned + field.desc.kind.size_words();
        }
        for _ in cursor..self.stride_words {
            out.push_str(&format!("    _pad{}: f32,\n", pad));
            pad += 1;
        }
        out.push_str("}\n");
        out
    }
}

/// Host value for a single field write.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FieldValue {
    Float(f32),
    Int(i32),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat3(Mat3),
}

impl FieldValue {
    fn kind(&self) -> FieldKind {
        match self {
            FieldValue::Float(_) => FieldKind::Float,
            FieldValue::Int(_) => FieldKind::Int,
            FieldValue::Vec3(_) => FieldKind::Vec3,
            FieldValue::Vec4(_) => FieldKind::Vec4,
            FieldValue::Mat3(_) => FieldKind::Mat3,
        }
    }

    fn write_words(&self, out: &mut [u32]) {
        match *self {
            FieldValue::Float(v) => out[0] = v.to_bits(),
            FieldValue::Int(v) => out[0] = v as u32,
            FieldValue::Vec3(v) => {
                out[0] = v.x.to_bits();
                out[1] = v.y.to_bits();
                out[2] = v.z.to_bits();
            }
            FieldValue::Vec4(v) => {
                for (i, c) in v.to_array().iter().enumerate() {
                    out[i] = c.to_bits();
                }
            }
            FieldValue::Mat3(m) => {
                // Three vec4-padded columns, as WGSL stores mat3x3.
                for (col, axis) in [m.x_axis, m.y_axis, m.z_axis].iter().enumerate() {
                    out[col * 4] = axis.x.to_bits();
                    out[col * 4 + 1] = axis.y.to_bits();
                    out[col * 4 + 2] = axis.z.to_bits();
                }
            }
        }
    }
}

impl From<f32> for FieldValue {
    fn from(v: f32) -> Self {
        FieldValue::Float(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::Int(v)
    }
}

impl From<Vec3> for FieldValue {
    fn from(v: Vec3) -> Self {
        FieldValue::Vec3(v)
    }
}

impl From<Vec4> for FieldValue {
    fn from(v: Vec4) -> Self {
        FieldValue::Vec4(v)
    }
}

impl From<Mat3> for FieldValue {
    fn from(v: Mat3) -> Self {
        FieldValue::Mat3(v)
    }
}

/// A typed layout over a raw storage buffer, with a host-side staging copy.
///
/// Host writes land in staging; [`StructuredBuffer::upload`] pushes the whole
/// store (or a slot range) to the GPU. The GPU side is created lazily so
/// layouts can be unit-tested without a device.
pub struct StructuredBuffer {
    layout: BufferLayout,
    len: usize,
    words: Vec<u32>,
    gpu: Option<wgpu::Buffer>,
    label: &'static str,
    unknown_warned: HashSet<String>,
}

impl StructuredBuffer {
    pub fn new(label: &'static str, layout: BufferLayout, len: usize) -> Self {
        let words = vec![0u32; layout.stride_words() * len];
        Self {
            layout,
            len,
            words,
            gpu: None,
            label,
            unknown_warned: HashSet::new(),
        }
    }

    pub fn layout(&self) -> &BufferLayout {
        &self.layout
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn size_bytes(&self) -> u64 {
        (self.words.len() * WORD_BYTES) as u64
    }

    /// Write one field of one element into staging.
    ///
    /// Unknown field names are ignored (warned once per name); a value whose
    /// shape does not match the field aborts the write with no partial
    /// mutation. Out-of-range indices are ignored the same way.
    pub fn set(&mut self, index: usize, field: &str, value: impl Into<FieldValue>) {
        let value = value.into();
        if index >= self.len {
            return;
        }
        let Some(offset) = self.layout.offset_of(field) else {
            if self.unknown_warned.insert(field.to_string()) {
                log::warn!("{}: ignoring write to unknown field {:?}", self.label, field);
            }
            return;
        };
        let kind = self.layout.kind_of(field).unwrap();
        if kind != value.kind() {
            log::warn!(
                "{}: aborting write to {:?}: expected {:?}, got {:?}",
                self.label,
                field,
                kind,
                value.kind()
            );
            return;
        }
        let base = index * self.layout.stride_words() + offset;
        debug_assert!(base + kind.size_words() <= self.words.len());
        value.write_words(&mut self.words[base..base + kind.size_words()]);
    }

    /// Host-side read of a staged field. Tests and inspectors only; this does
    /// not see GPU-side mutation until a readback refreshes staging.
    pub fn get(&self, index: usize, field: &str) -> Option<FieldValue> {
        if index >= self.len {
            return None;
        }
        let offset = self.layout.offset_of(field)?;
        let kind = self.layout.kind_of(field)?;
        let base = index * self.layout.stride_words() + offset;
        let w = &self.words[base..];
        Some(match kind {
            FieldKind::Float => FieldValue::Float(f32::from_bits(w[0])),
            FieldKind::Int => FieldValue::Int(w[0] as i32),
            FieldKind::Vec3 => FieldValue::Vec3(Vec3::new(
                f32::from_bits(w[0]),
                f32::from_bits(w[1]),
                f32::from_bits(w[2]),
            )),
            FieldKind::Vec4 => FieldValue::Vec4(Vec4::new(
                f32::from_bits(w[0]),
                f32::from_bits(w[1]),
                f32::from_bits(w[2]),
                f32::from_bits(w[3]),
            )),
            FieldKind::Mat3 => {
                let col = |c: usize| {
                    Vec3::new(
                        f32::from_bits(w[c * 4]),
                        f32::from_bits(w[c * 4 + 1]),
                        f32::from_bits(w[c * 4 + 2]),
                    )
                };
                FieldValue::Mat3(Mat3::from_cols(col(0), col(1), col(2)))
            }
        })
    }

    /// Create the GPU buffer if needed and push the full staging store.
    pub fn upload(&mut self, ctx: &GpuContext) {
        let buffer = self.gpu.get_or_insert_with(|| {
            ctx.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(self.label),
                size: (self.words.len() * WORD_BYTES) as u64,
                usage: wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::COPY_DST
                    | wgpu::BufferUsages::COPY_SRC,
                mapped_at_creation: false,
            })
        });
        ctx.queue.write_buffer(buffer, 0, bytemuck::cast_slice(&self.words));
    }

    /// Push a contiguous range of elements, creating the GPU buffer if needed.
    pub fn upload_range(&mut self, ctx: &GpuContext, first: usize, count: usize) {
        if self.gpu.is_none() {
            self.upload(ctx);
            return;
        }
        let stride = self.layout.stride_words();
        let start = first.min(self.len) * stride;
        let end = (first + count).min(self.len) * stride;
        if start >= end {
            return;
        }
        ctx.queue.write_buffer(
            self.gpu.as_ref().unwrap(),
            (start * WORD_BYTES) as u64,
            bytemuck::cast_slice(&self.words[start..end]),
        );
    }

    /// The GPU-side buffer. Panics if `upload` has never run; kernel wiring
    /// happens strictly after buffer creation.
    pub fn gpu_buffer(&self) -> &wgpu::Buffer {
        self.gpu
            .as_ref()
            .expect("structured buffer used before upload")
    }

    /// Synchronously copy the GPU contents back into staging and return a
    /// word view of it.
    pub fn read_back(&mut self, ctx: &GpuContext) -> Result<&[u32], GpuError> {
        let buffer = self
            .gpu
            .as_ref()
            .ok_or_else(|| GpuError::BufferMapping("buffer never uploaded".into()))?;
        let bytes = ctx.read_buffer_sync(buffer, (self.words.len() * WORD_BYTES) as u64)?;
        self.words.copy_from_slice(bytemuck::cast_slice(&bytes));
        Ok(&self.words)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn particle_like_layout() -> BufferLayout {
        BufferLayout::new([
            FieldDesc::new("position", FieldKind::Vec3),
            FieldDesc::new("density", FieldKind::Float),
            FieldDesc::new("velocity", FieldKind::Vec3),
            FieldDesc::new("mass", FieldKind::Float),
            FieldDesc::new("C", FieldKind::Mat3),
            FieldDesc::new("material", FieldKind::Int),
        ])
    }

    #[test]
    fn scalars_pack_into_vec3_tail() {
        let layout = particle_like_layout();
        assert_eq!(layout.offset_of("position"), Some(0));
        assert_eq!(layout.offset_of("density"), Some(3));
        assert_eq!(layout.offset_of("velocity"), Some(4));
        assert_eq!(layout.offset_of("mass"), Some(7));
        assert_eq!(layout.offset_of("C"), Some(8));
        assert_eq!(layout.offset_of("material"), Some(20));
    }

    #[test]
    fn stride_pads_to_four_words() {
        let layout = particle_like_layout();
        // material ends at word 21; stride rounds up.
        assert_eq!(layout.stride_words(), 24);

        let grid = BufferLayout::new([
            FieldDesc::atomic("x", FieldKind::Int),
            FieldDesc::atomic("y", FieldKind::Int),
            FieldDesc::atomic("z", FieldKind::Int),
            FieldDesc::atomic("mass", FieldKind::Int),
        ]);
        assert_eq!(grid.stride_words(), 4);
    }

    #[test]
    fn unknown_field_is_ignored() {
        let mut buf = StructuredBuffer::new("test", particle_like_layout(), 4);
        buf.set(0, "position", Vec3::ONE);
        let before = buf.words.clone();
        buf.set(0, "not_a_field", 3.0f32);
        assert_eq!(buf.words, before);
    }

    #[test]
    fn shape_mismatch_aborts_write() {
        let mut buf = StructuredBuffer::new("test", particle_like_layout(), 4);
        buf.set(1, "velocity", Vec3::new(1.0, 2.0, 3.0));
        // A scalar aimed at a vec3 slot must not touch any component.
        buf.set(1, "velocity", 9.0f32);
        assert_eq!(
            buf.get(1, "velocity"),
            Some(FieldValue::Vec3(Vec3::new(1.0, 2.0, 3.0)))
        );
    }

    #[test]
    fn mat3_round_trips_through_padded_columns() {
        let mut buf = StructuredBuffer::new("test", particle_like_layout(), 2);
        let m = Mat3::from_cols(
            Vec3::new(1.0, 2.0, 3.0),
            Vec3::new(4.0, 5.0, 6.0),
            Vec3::new(7.0, 8.0, 9.0),
        );
        buf.set(1, "C", m);
        assert_eq!(buf.get(1, "C"), Some(FieldValue::Mat3(m)));
        // Neighbor elements untouched.
        assert_eq!(buf.get(0, "C"), Some(FieldValue::Mat3(Mat3::ZERO)));
    }

    #[test]
    fn wgsl_struct_toggles_atomics() {
        let grid = BufferLayout::new([
            FieldDesc::atomic("x", FieldKind::Int),
            FieldDesc::new("flags", FieldKind::Int),
        ]);
        let plain = grid.wgsl_struct("Cell", false);
        assert!(plain.contains("x: i32"));
        assert!(!plain.contains("atomic"));

        let atomic = grid.wgsl_struct("Cell", true);
        assert!(atomic.contains("x: atomic<i32>"));
        // Fields not flagged atomic stay plain even when the dispatch asks
        // for atomic access.
        assert!(atomic.contains("flags: i32"));
    }

    #[test]
    fn selective_atomics_cover_named_fields_only() {
        let grid = BufferLayout::new([
            FieldDesc::atomic("x", FieldKind::Int),
            FieldDesc::atomic("y", FieldKind::Int),
            FieldDesc::atomic("z", FieldKind::Int),
            FieldDesc::atomic("mass", FieldKind::Int),
        ]);
        let wgsl = grid.wgsl_struct_selective("Cell", &["x", "y", "z"]);
        assert!(wgsl.contains("x: atomic<i32>"));
        assert!(wgsl.contains("z: atomic<i32>"));
        assert!(wgsl.contains("mass: i32"));
    }

    #[test]
    fn wgsl_struct_pads_interior_gaps() {
        let layout = BufferLayout::new([
            FieldDesc::new("a", FieldKind::Float),
            FieldDesc::new("b", FieldKind::Vec3),
        ]);
        assert_eq!(layout.offset_of("b"), Some(4));
        let wgsl = layout.wgsl_struct("T", false);
        assert!(wgsl.contains("_pad0: f32"));
        assert!(wgsl.contains("_pad1: f32"));
        assert!(wgsl.contains("_pad2: f32"));
    }

    #[test]
    fn out_of_range_index_is_ignored() {
        let mut buf = StructuredBuffer::new("test", particle_like_layout(), 2);
        buf.set(5, "density", 1.0f32);
        assert_eq!(buf.get(5, "density"), None);
    }
}
