//! CPU-side mesh representation produced by the model loaders.

use corelib::{EngineError, EngineResult};

/// What a vertex attribute carries. Each semantic owns a fixed shader location.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AttributeSemantic {
    Position,
    Normal,
    TexCoord,
    Color,
}

impl AttributeSemantic {
    pub const ALL: [AttributeSemantic; 4] =
        [Self::Position, Self::Normal, Self::TexCoord, Self::Color];

    #[inline]
    pub const fn location(self) -> u32 {
        match self {
            Self::Position => 0,
            Self::Normal => 1,
            Self::TexCoord => 2,
            Self::Color => 3,
        }
    }

    #[inline]
    pub const fn components(self) -> u32 {
        match self {
            Self::Position | Self::Normal => 3,
            Self::TexCoord => 2,
            Self::Color => 4,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttributeType {
    Float32,
}

impl AttributeType {
    #[inline]
    pub const fn size(self) -> u32 {
        match self {
            Self::Float32 => 4,
        }
    }
}

/// One attribute inside the interleaved vertex buffer. `offset` is in bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VertexAttribute {
    pub semantic: AttributeSemantic,
    pub location: u32,
    pub ty: AttributeType,
    pub components: u32,
    pub offset: u32,
}

/// Texture referenced by a material. Never loaded by the model loaders.
#[derive(Clone, Debug, PartialEq)]
pub enum TextureRef {
    /// Path resolved relative to the model file (keeps a `res://` prefix when present).
    Path(String),
    /// Encoded image embedded in the model; feed it to `load_texture_from_memory`.
    Embedded {
        mime_type: Option<String>,
        bytes: Vec<u8>,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct MaterialInfo {
    pub name: String,
    pub base_color: [f32; 4],
    pub diffuse_texture: Option<TextureRef>,
    pub normal_texture: Option<TextureRef>,
}

impl MaterialInfo {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_color: [1.0, 1.0, 1.0, 1.0],
            diffuse_texture: None,
            normal_texture: None,
        }
    }
}

/// Contiguous index range drawn with one material.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubMesh {
    pub index_offset: u32,
    pub index_count: u32,
    pub material: Option<usize>,
}

/// Per-semantic vertex streams gathered by a loader before interleaving.
#[derive(Clone, Debug, Default)]
pub struct VertexStreams {
    pub positions: Vec<[f32; 3]>,
    pub normals: Option<Vec<[f32; 3]>>,
    pub tex_coords: Option<Vec<[f32; 2]>>,
    pub colors: Option<Vec<[f32; 4]>>,
}

/// Indexed triangle mesh with an interleaved `f32` vertex buffer.
///
/// Only attributes every vertex supplies are present; absent ones are simply not
/// listed in [`MeshData::attributes`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshData {
    pub attributes: Vec<VertexAttribute>,
    /// Bytes between consecutive vertices.
    pub stride: u32,
    pub vertices: Vec<f32>,
    pub indices: Vec<u32>,
    pub submeshes: Vec<SubMesh>,
    pub materials: Vec<MaterialInfo>,
    /// Material libraries named by the source file (e.g. OBJ `mtllib`).
    pub material_libraries: Vec<String>,
}

impl MeshData {
    /// Interleave `streams` and validate `indices`. `name` is used for error context.
    pub fn from_streams(streams: VertexStreams, indices: Vec<u32>, name: &str) -> EngineResult<Self> {
        let count = streams.positions.len();
        let check = |semantic: AttributeSemantic, len: usize| {
            if len == count {
                Ok(())
            } else {
                Err(EngineError::parse(
                    name,
                    None,
                    format!("{semantic:?} stream has {len} entries for {count} positions"),
                ))
            }
        };
        if let Some(n) = &streams.normals {
            check(AttributeSemantic::Normal, n.len())?;
        }
        if let Some(t) = &streams.tex_coords {
            check(AttributeSemantic::TexCoord, t.len())?;
        }
        if let Some(c) = &streams.colors {
            check(AttributeSemantic::Color, c.len())?;
        }

        let present = [
            (AttributeSemantic::Position, true),
            (AttributeSemantic::Normal, streams.normals.is_some()),
            (AttributeSemantic::TexCoord, streams.tex_coords.is_some()),
            (AttributeSemantic::Color, streams.colors.is_some()),
        ];
        let mut attributes = Vec::new();
        let mut offset = 0;
        for (semantic, _) in present.iter().filter(|(_, on)| *on) {
            attributes.push(VertexAttribute {
                semantic: *semantic,
                location: semantic.location(),
                ty: AttributeType::Float32,
                components: semantic.components(),
                offset,
            });
            offset += semantic.components() * AttributeType::Float32.size();
        }
        let stride = offset;

        let floats_per_vertex = (stride / AttributeType::Float32.size()) as usize;
        let mut vertices = Vec::with_capacity(count * floats_per_vertex);
        for i in 0..count {
            vertices.extend_from_slice(&streams.positions[i]);
            if let Some(n) = &streams.normals {
                vertices.extend_from_slice(&n[i]);
            }
            if let Some(t) = &streams.tex_coords {
                vertices.extend_from_slice(&t[i]);
            }
            if let Some(c) = &streams.colors {
                vertices.extend_from_slice(&c[i]);
            }
        }

        if let Some(bad) = indices.iter().find(|&&i| i as usize >= count) {
            return Err(EngineError::parse(
                name,
                None,
                format!("index {bad} out of range for {count} vertices"),
            ));
        }
        if indices.len() % 3 != 0 {
            return Err(EngineError::parse(
                name,
                None,
                format!("{} indices do not form whole triangles", indices.len()),
            ));
        }

        let index_count = indices.len() as u32;
        Ok(Self {
            attributes,
            stride,
            vertices,
            indices,
            submeshes: vec![SubMesh {
                index_offset: 0,
                index_count,
                material: None,
            }],
            materials: Vec::new(),
            material_libraries: Vec::new(),
        })
    }

    #[inline]
    pub fn floats_per_vertex(&self) -> usize {
        (self.stride / AttributeType::Float32.size()) as usize
    }

    pub fn vertex_count(&self) -> usize {
        match self.floats_per_vertex() {
            0 => 0,
            n => self.vertices.len() / n,
        }
    }

    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn attribute(&self, semantic: AttributeSemantic) -> Option<&VertexAttribute> {
        self.attributes.iter().find(|a| a.semantic == semantic)
    }

    #[inline]
    pub fn has(&self, semantic: AttributeSemantic) -> bool {
        self.attribute(semantic).is_some()
    }

    /// De-interleave one attribute; `None` if the mesh omits it or the
    /// attribute does not fit inside the stride.
    pub fn read(&self, semantic: AttributeSemantic) -> Option<Vec<&[f32]>> {
        let attr = self.attribute(semantic)?;
        let per_vertex = self.floats_per_vertex();
        let start = (attr.offset / AttributeType::Float32.size()) as usize;
        let end = start + attr.components as usize;
        if per_vertex == 0 || end > per_vertex {
            return None;
        }
        Some(
            self.vertices
                .chunks_exact(per_vertex)
                .map(|v| &v[start..end])
                .collect(),
        )
    }

    /// Returns `true` if both vertex and index buffers are non-empty.
    pub fn is_valid(&self) -> bool {
        !self.vertices.is_empty() && !self.indices.is_empty()
    }

    /// Full structural check for meshes that did not come out of
    /// [`MeshData::from_streams`]. Errors are `InvalidDimensions`.
    pub fn validate(&self, name: &str) -> EngineResult<()> {
        let fail = |reason: String| Err(EngineError::invalid_dimensions(name, reason));
        if !self.is_valid() {
            return fail("mesh has no vertices or indices".into());
        }
        let float = AttributeType::Float32.size();
        if self.stride == 0 || self.stride % float != 0 {
            return fail(format!("stride {} is not a positive multiple of {float}", self.stride));
        }
        if !self.has(AttributeSemantic::Position) {
            return fail("mesh has no position attribute".into());
        }
        for (i, attr) in self.attributes.iter().enumerate() {
            if self.attributes[..i].iter().any(|a| a.location == attr.location) {
                return fail(format!("attribute location {} is used twice", attr.location));
            }
            if self.attributes[..i].iter().any(|a| a.semantic == attr.semantic) {
                return fail(format!("{:?} attribute is listed twice", attr.semantic));
            }
            let end = u64::from(attr.offset) + u64::from(attr.components) * u64::from(attr.ty.size());
            if attr.offset % float != 0 || end > u64::from(self.stride) {
                return fail(format!(
                    "{:?} attribute at offset {} does not fit stride {}",
                    attr.semantic, attr.offset, self.stride
                ));
            }
        }
        let per_vertex = self.floats_per_vertex();
        if self.vertices.len() % per_vertex != 0 {
            return fail(format!(
                "{} floats do not form whole vertices of {per_vertex}",
                self.vertices.len()
            ));
        }
        if self.indices.len() % 3 != 0 {
            return fail(format!("{} indices do not form whole triangles", self.indices.len()));
        }
        let count = self.vertex_count();
        if let Some(bad) = self.indices.iter().find(|&&i| i as usize >= count) {
            return fail(format!("index {bad} out of range for {count} vertices"));
        }
        for sub in &self.submeshes {
            let end = u64::from(sub.index_offset) + u64::from(sub.index_count);
            if end > self.indices.len() as u64 {
                return fail(format!(
                    "sub-mesh {}..{end} exceeds {} indices",
                    sub.index_offset,
                    self.indices.len()
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle_streams() -> VertexStreams {
        VertexStreams {
            positions: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            normals: None,
            tex_coords: Some(vec![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]]),
            colors: None,
        }
    }

    #[test]
    fn omitted_attributes_shrink_the_layout() {
        let mesh = MeshData::from_streams(triangle_streams(), vec![0, 1, 2], "tri").unwrap();
        assert!(mesh.is_valid());
        assert!(!mesh.has(AttributeSemantic::Normal));
        let uv = mesh.attribute(AttributeSemantic::TexCoord).unwrap();
        assert_eq!((uv.location, uv.offset, uv.components), (2, 12, 2));
        assert_eq!(mesh.stride, 20);
        assert_eq!(mesh.vertex_count(), 3);
        assert_eq!(mesh.read(AttributeSemantic::TexCoord).unwrap()[1], &[1.0, 0.0]);
    }

    #[test]
    fn attribute_locations_are_unique() {
        let mut streams = triangle_streams();
        streams.normals = Some(vec![[0.0, 0.0, 1.0]; 3]);
        streams.colors = Some(vec![[1.0; 4]; 3]);
        let mesh = MeshData::from_streams(streams, vec![0, 1, 2], "tri").unwrap();
        let mut locations: Vec<u32> = mesh.attributes.iter().map(|a| a.location).collect();
        locations.dedup();
        assert_eq!(locations, vec![0, 1, 2, 3]);
        assert_eq!(mesh.stride, (3 + 3 + 2 + 4) * 4);
    }

    #[test]
    fn out_of_range_index_is_a_parse_error() {
        let err = MeshData::from_streams(triangle_streams(), vec![0, 1, 3], "tri").unwrap_err();
        assert!(matches!(err, EngineError::ParseError { .. }));
    }

    #[test]
    fn loader_output_passes_validation() {
        let mesh = MeshData::from_streams(triangle_streams(), vec![0, 1, 2], "tri").unwrap();
        mesh.validate("tri").unwrap();
    }

    #[test]
    fn hand_built_meshes_are_validated() {
        let good = MeshData::from_streams(triangle_streams(), vec![0, 1, 2], "tri").unwrap();

        let mut shared_location = good.clone();
        shared_location.attributes[1].location = 0;
        let mut bad_index = good.clone();
        bad_index.indices = vec![0, 1, 99];
        let mut zero_stride = good.clone();
        zero_stride.stride = 0;
        let mut outside_stride = good.clone();
        outside_stride.attributes[1].offset = 16;
        let mut ragged = good.clone();
        ragged.vertices.pop();
        let mut long_submesh = good.clone();
        long_submesh.submeshes[0].index_count = 6;

        for (what, mesh) in [
            ("shared location", shared_location),
            ("bad index", bad_index),
            ("zero stride", zero_stride),
            ("outside stride", outside_stride),
            ("ragged vertices", ragged),
            ("long sub-mesh", long_submesh),
        ] {
            let err = mesh.validate("hand").unwrap_err();
            assert!(matches!(err, EngineError::InvalidDimensions { .. }), "{what}: {err}");
        }
    }

    #[test]
    fn read_never_slices_outside_a_vertex() {
        let mut mesh = MeshData::from_streams(triangle_streams(), vec![0, 1, 2], "tri").unwrap();
        mesh.attributes[1].offset = 16;
        assert!(mesh.read(AttributeSemantic::TexCoord).is_none());
        mesh.stride = 0;
        assert!(mesh.read(AttributeSemantic::Position).is_none());
        assert_eq!(mesh.vertex_count(), 0);
    }

    #[test]
    fn mismatched_stream_lengths_are_rejected() {
        let mut streams = triangle_streams();
        streams.tex_coords = Some(vec![[0.0, 0.0]]);
        assert!(MeshData::from_streams(streams, vec![0, 1, 2], "tri").is_err());
    }
}
