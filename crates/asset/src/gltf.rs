//! glTF 2.0 loader (`.gltf` JSON and `.glb` binary containers).
//!
//! Every primitive of every mesh is merged into one [`MeshData`] with one
//! [`SubMesh`] per primitive. Node transforms are not applied.

use ::gltf::{Gltf, buffer, image, json::validation, mesh::Mode};
use corelib::{AssetSource, EngineError, EngineResult, LoaderConfig, fs::sibling_path};

use crate::{
    mesh::{MaterialInfo, MeshData, SubMesh, TextureRef, VertexStreams},
    obj::complete_stream,
};

/// Parse a glTF document held in memory. External buffers are read through
/// `source`, relative to `path`.
pub fn load_gltf(
    bytes: &[u8],
    path: &str,
    source: &dyn AssetSource,
    config: &LoaderConfig,
) -> EngineResult<MeshData> {
    let document = Gltf::from_slice(bytes).map_err(|e| map_gltf_error(path, e))?;

    let required: Vec<&str> = document.extensions_required().collect();
    if !required.is_empty() {
        return Err(EngineError::unsupported_feature(
            path,
            format!("required extensions: {}", required.join(", ")),
        ));
    }

    let buffers = load_buffers(&document, path, source)?;

    let mut positions: Vec<[f32; 3]> = Vec::new();
    let mut normals: Vec<Option<[f32; 3]>> = Vec::new();
    let mut tex_coords: Vec<Option<[f32; 2]>> = Vec::new();
    let mut colors: Vec<Option<[f32; 4]>> = Vec::new();
    let mut indices: Vec<u32> = Vec::new();
    let mut submeshes: Vec<SubMesh> = Vec::new();

    for mesh in document.meshes() {
        for primitive in mesh.primitives() {
            if primitive.mode() != Mode::Triangles {
                return Err(EngineError::unsupported_feature(
                    path,
                    format!(
                        "primitive mode {:?} in mesh {}",
                        primitive.mode(),
                        mesh.name().unwrap_or("<unnamed>")
                    ),
                ));
            }
            let reader = primitive.reader(|b| buffers.get(b.index()).map(Vec::as_slice));

            let prim_positions: Vec<[f32; 3]> = reader
                .read_positions()
                .ok_or_else(|| {
                    EngineError::parse(path, None, format!("mesh {} primitive has no POSITION", mesh.index()))
                })?
                .collect();
            let count = prim_positions.len();
            let base = positions.len();
            if base + count > config.max_vertices {
                return Err(EngineError::unsupported_feature(
                    path,
                    format!("more than {} vertices", config.max_vertices),
                ));
            }

            positions.extend(prim_positions);
            extend_or_pad(&mut normals, reader.read_normals(), count);
            extend_or_pad(
                &mut tex_coords,
                reader.read_tex_coords(0).map(|t| {
                    t.into_f32().map(|[u, v]| if config.flip_uv_v { [u, 1.0 - v] } else { [u, v] })
                }),
                count,
            );
            extend_or_pad(&mut colors, reader.read_colors(0).map(|c| c.into_rgba_f32()), count);

            let index_offset = indices.len();
            let base = u32::try_from(base)
                .map_err(|_| EngineError::parse(path, None, "vertex count exceeds u32 indices"))?;
            let local: Vec<u32> = match reader.read_indices() {
                Some(read) => read.into_u32().collect(),
                None => (0..count as u32).collect(),
            };
            for index in local {
                if index as usize >= count {
                    return Err(EngineError::parse(
                        path,
                        None,
                        format!(
                            "mesh {} primitive {} index {index} out of range for {count} vertices",
                            mesh.index(),
                            primitive.index()
                        ),
                    ));
                }
                let rebased = index.checked_add(base).ok_or_else(|| {
                    EngineError::parse(path, None, "merged index exceeds u32 range")
                })?;
                indices.push(rebased);
            }
            submeshes.push(SubMesh {
                index_offset: index_offset as u32,
                index_count: (indices.len() - index_offset) as u32,
                material: primitive.material().index(),
            });
        }
    }

    if indices.is_empty() {
        return Err(EngineError::parse(path, None, "glTF contained no triangles"));
    }

    let streams = VertexStreams {
        positions,
        normals: complete_stream(normals, path, "normals"),
        tex_coords: complete_stream(tex_coords, path, "texture coordinates"),
        colors: complete_stream(colors, path, "vertex colours"),
    };
    let mut mesh = MeshData::from_streams(streams, indices, path)?;
    mesh.submeshes = submeshes;
    mesh.materials = document
        .materials()
        .map(|material| read_material(&material, &buffers, path))
        .collect::<EngineResult<_>>()?;

    log::info!(
        "Parsed glTF '{}': {} vertices, {} triangles, {} sub-meshes, {} materials",
        path,
        mesh.vertex_count(),
        mesh.triangle_count(),
        mesh.submeshes.len(),
        mesh.materials.len()
    );
    Ok(mesh)
}

fn extend_or_pad<T>(out: &mut Vec<Option<T>>, values: Option<impl Iterator<Item = T>>, count: usize) {
    match values {
        Some(values) => out.extend(values.map(Some)),
        None => out.extend(std::iter::repeat_with(|| None).take(count)),
    }
}

fn load_buffers(document: &Gltf, path: &str, source: &dyn AssetSource) -> EngineResult<Vec<Vec<u8>>> {
    let mut buffer_data = Vec::new();
    for buffer in document.buffers() {
        let data = match buffer.source() {
            buffer::Source::Bin => document
                .blob
                .as_deref()
                .map(<[u8]>::to_vec)
                .ok_or_else(|| EngineError::parse(path, None, "GLB BIN chunk missing"))?,
            buffer::Source::Uri(uri) if uri.starts_with("data:") => {
                return Err(EngineError::unsupported_feature(path, "data: buffer URIs"));
            }
            buffer::Source::Uri(uri) => source.read(&sibling_path(path, uri))?,
        };
        if data.len() < buffer.length() {
            return Err(EngineError::parse(
                path,
                None,
                format!(
                    "buffer {} holds {} bytes, {} declared",
                    buffer.index(),
                    data.len(),
                    buffer.length()
                ),
            ));
        }
        buffer_data.push(data);
    }
    Ok(buffer_data)
}

fn read_material(
    material: &::gltf::Material<'_>,
    buffers: &[Vec<u8>],
    path: &str,
) -> EngineResult<MaterialInfo> {
    let name = material
        .name()
        .map(str::to_owned)
        .unwrap_or_else(|| format!("material{}", material.index().unwrap_or_default()));
    let pbr = material.pbr_metallic_roughness();

    let diffuse_texture = pbr
        .base_color_texture()
        .map(|info| texture_ref(info.texture().source().source(), buffers, path))
        .transpose()?;
    let normal_texture = material
        .normal_texture()
        .map(|normal| texture_ref(normal.texture().source().source(), buffers, path))
        .transpose()?;

    Ok(MaterialInfo {
        name,
        base_color: pbr.base_color_factor(),
        diffuse_texture,
        normal_texture,
    })
}

fn texture_ref(source: image::Source<'_>, buffers: &[Vec<u8>], path: &str) -> EngineResult<TextureRef> {
    match source {
        image::Source::View { view, mime_type } => {
            let start = view.offset();
            let end = start + view.length();
            let bytes = buffers
                .get(view.buffer().index())
                .and_then(|data| data.get(start..end))
                .ok_or_else(|| {
                    EngineError::parse(path, None, format!("image view {} out of bounds", view.index()))
                })?;
            Ok(TextureRef::Embedded {
                mime_type: Some(mime_type.to_owned()),
                bytes: bytes.to_vec(),
            })
        }
        image::Source::Uri { uri, .. } if uri.starts_with("data:") => {
            Err(EngineError::unsupported_feature(path, "data: image URIs"))
        }
        image::Source::Uri { uri, .. } => Ok(TextureRef::Path(sibling_path(path, uri))),
    }
}

fn map_gltf_error(path: &str, err: ::gltf::Error) -> EngineError {
    if let ::gltf::Error::Validation(errors) = &err {
        if let Some((json_path, _)) = errors
            .iter()
            .find(|(_, e)| matches!(e, validation::Error::Unsupported))
        {
            return EngineError::unsupported_feature(path, format!("unsupported value at {json_path}"));
        }
    }
    EngineError::parse(path, None, err.to_string())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::mesh::AttributeSemantic;
    use corelib::MemoryAssetSource;

    /// Wrap a JSON document and binary payload into a GLB container.
    pub(crate) fn glb(json: &str, bin: &[u8]) -> Vec<u8> {
        let mut json = json.as_bytes().to_vec();
        while json.len() % 4 != 0 {
            json.push(b' ');
        }
        let mut bin = bin.to_vec();
        while bin.len() % 4 != 0 {
            bin.push(0);
        }
        let total = 12 + 8 + json.len() + 8 + bin.len();

        let mut out = Vec::with_capacity(total);
        out.extend_from_slice(b"glTF");
        out.extend_from_slice(&2u32.to_le_bytes());
        out.extend_from_slice(&(total as u32).to_le_bytes());
        out.extend_from_slice(&(json.len() as u32).to_le_bytes());
        out.extend_from_slice(&0x4E4F_534Au32.to_le_bytes());
        out.extend_from_slice(&json);
        out.extend_from_slice(&(bin.len() as u32).to_le_bytes());
        out.extend_from_slice(&0x004E_4942u32.to_le_bytes());
        out.extend_from_slice(&bin);
        out
    }

    /// Two triangles in two primitives sharing one buffer. The first primitive
    /// has normals, the second does not.
    pub(crate) fn two_primitive_glb() -> Vec<u8> {
        two_primitive_glb_with_indices([0, 1, 2], [0, 1, 2])
    }

    /// Same layout as [`two_primitive_glb`] with explicit per-primitive indices.
    fn two_primitive_glb_with_indices(first: [u32; 3], second: [u32; 3]) -> Vec<u8> {
        let positions: [[f32; 3]; 3] = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
        let normals: [[f32; 3]; 3] = [[0.0, 0.0, 1.0]; 3];

        let mut bin: Vec<u8> = Vec::new();
        bin.extend_from_slice(bytemuck::cast_slice(&positions));
        bin.extend_from_slice(bytemuck::cast_slice(&normals));
        bin.extend_from_slice(bytemuck::cast_slice(&first));
        bin.extend_from_slice(bytemuck::cast_slice(&second));

        let json = format!(
            r#"{{
  "asset": {{"version": "2.0"}},
  "buffers": [{{"byteLength": {len}}}],
  "bufferViews": [
    {{"buffer": 0, "byteOffset": 0, "byteLength": 36}},
    {{"buffer": 0, "byteOffset": 36, "byteLength": 36}},
    {{"buffer": 0, "byteOffset": 72, "byteLength": 12}},
    {{"buffer": 0, "byteOffset": 84, "byteLength": 12}}
  ],
  "accessors": [
    {{"bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
      "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0]}},
    {{"bufferView": 1, "componentType": 5126, "count": 3, "type": "VEC3"}},
    {{"bufferView": 2, "componentType": 5125, "count": 3, "type": "SCALAR"}},
    {{"bufferView": 3, "componentType": 5125, "count": 3, "type": "SCALAR"}}
  ],
  "materials": [
    {{"name": "red", "pbrMetallicRoughness": {{"baseColorFactor": [1.0, 0.0, 0.0, 1.0]}}}}
  ],
  "meshes": [{{"primitives": [
    {{"attributes": {{"POSITION": 0, "NORMAL": 1}}, "indices": 2, "material": 0}},
    {{"attributes": {{"POSITION": 0}}, "indices": 3}}
  ]}}]
}}"#,
            len = bin.len()
        );
        glb(&json, &bin)
    }

    fn load(bytes: &[u8]) -> EngineResult<MeshData> {
        load_gltf(bytes, "res://models/test.glb", &MemoryAssetSource::new(), &LoaderConfig::default())
    }

    #[test]
    fn primitives_merge_into_submeshes() {
        let mesh = load(&two_primitive_glb()).unwrap();
        assert_eq!(mesh.vertex_count(), 6);
        assert_eq!(mesh.indices, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(
            mesh.submeshes,
            vec![
                SubMesh { index_offset: 0, index_count: 3, material: Some(0) },
                SubMesh { index_offset: 3, index_count: 3, material: None },
            ]
        );
        assert_eq!(mesh.materials[0].name, "red");
        assert_eq!(mesh.materials[0].base_color, [1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn index_overflow_in_later_primitive_is_a_parse_error() {
        let err = load(&two_primitive_glb_with_indices([0, 1, 2], [0, 1, u32::MAX])).unwrap_err();
        assert!(matches!(err, EngineError::ParseError { .. }), "{err}");
    }

    #[test]
    fn primitive_cannot_reach_into_another_primitives_vertices() {
        let err = load(&two_primitive_glb_with_indices([0, 1, 4], [0, 1, 2])).unwrap_err();
        assert!(matches!(err, EngineError::ParseError { .. }), "{err}");
        assert!(err.to_string().contains("index 4"), "{err}");
    }

    #[test]
    fn partially_present_normals_are_omitted() {
        let mesh = load(&two_primitive_glb()).unwrap();
        assert!(mesh.has(AttributeSemantic::Position));
        assert!(!mesh.has(AttributeSemantic::Normal));
    }

    #[test]
    fn external_buffer_is_read_relative_to_model() {
        let positions: [[f32; 3]; 3] = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
        let bin: Vec<u8> = bytemuck::cast_slice(&positions).to_vec();
        let json = r#"{
  "asset": {"version": "2.0"},
  "buffers": [{"byteLength": 36, "uri": "tri.bin"}],
  "bufferViews": [{"buffer": 0, "byteLength": 36}],
  "accessors": [{"bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
                 "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0]}],
  "meshes": [{"primitives": [{"attributes": {"POSITION": 0}}]}]
}"#;
        let source = MemoryAssetSource::new().with_file("res://models/tri.bin", bin);
        let mesh = load_gltf(
            json.as_bytes(),
            "res://models/tri.gltf",
            &source,
            &LoaderConfig::default(),
        )
        .unwrap();
        assert_eq!(mesh.indices, vec![0, 1, 2]);
        assert_eq!(mesh.submeshes.len(), 1);
    }

    #[test]
    fn missing_external_buffer_reports_asset_not_found() {
        let json = r#"{
  "asset": {"version": "2.0"},
  "buffers": [{"byteLength": 36, "uri": "gone.bin"}]
}"#;
        let err = load(json.as_bytes()).unwrap_err();
        assert!(matches!(err, EngineError::AssetNotFound { .. }), "{err}");
    }

    #[test]
    fn line_primitives_are_unsupported() {
        let positions: [[f32; 3]; 2] = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]];
        let bin: Vec<u8> = bytemuck::cast_slice(&positions).to_vec();
        let json = r#"{
  "asset": {"version": "2.0"},
  "buffers": [{"byteLength": 24}],
  "bufferViews": [{"buffer": 0, "byteLength": 24}],
  "accessors": [{"bufferView": 0, "componentType": 5126, "count": 2, "type": "VEC3",
                 "min": [0.0, 0.0, 0.0], "max": [1.0, 0.0, 0.0]}],
  "meshes": [{"primitives": [{"attributes": {"POSITION": 0}, "mode": 1}]}]
}"#;
        let err = load(&glb(json, &bin)).unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedFeature { .. }), "{err}");
    }

    #[test]
    fn data_uri_buffers_are_unsupported() {
        let json = r#"{
  "asset": {"version": "2.0"},
  "buffers": [{"byteLength": 4, "uri": "data:application/octet-stream;base64,AAAAAA=="}]
}"#;
        let err = load(json.as_bytes()).unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedFeature { .. }), "{err}");
    }

    #[test]
    fn required_extension_is_unsupported() {
        let json = r#"{
  "asset": {"version": "2.0"},
  "extensionsUsed": ["KHR_draco_mesh_compression"],
  "extensionsRequired": ["KHR_draco_mesh_compression"]
}"#;
        let err = load(json.as_bytes()).unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedFeature { .. }), "{err}");
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let err = load(b"{ \"asset\": ").unwrap_err();
        assert!(matches!(err, EngineError::ParseError { .. }), "{err}");
    }
}
