//! OBJ/MTL parser supporting positions (with optional vertex colours), normals,
//! texture coordinates and `usemtl` material groups.

use std::{
    collections::HashMap,
    io::{self, BufRead},
};

use corelib::{EngineError, EngineResult, LoaderConfig, fs::sibling_path};

use crate::mesh::{MaterialInfo, MeshData, SubMesh, TextureRef, VertexStreams};

const FREE_FORM_TAGS: [&str; 8] = [
    "cstype", "curv", "curv2", "surf", "parm", "trim", "hole", "bmat",
];

/// Load an OBJ mesh from a [`BufRead`] implementation. `name` is used in errors.
pub fn load_obj_from_reader<R: BufRead>(
    reader: R,
    name: &str,
    config: &LoaderConfig,
) -> EngineResult<MeshData> {
    ObjParser::new(name, config).parse(reader)
}

/// Convenience helper to parse an OBJ held in memory.
pub fn load_obj_from_str(contents: &str, name: &str, config: &LoaderConfig) -> EngineResult<MeshData> {
    load_obj_from_reader(io::Cursor::new(contents), name, config)
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
struct Key(usize, Option<usize>, Option<usize>);

struct ObjParser<'a> {
    name: &'a str,
    config: &'a LoaderConfig,

    positions: Vec<[f32; 3]>,
    position_colors: Vec<Option<[f32; 4]>>,
    normals: Vec<[f32; 3]>,
    texcoords: Vec<[f32; 2]>,

    unique: HashMap<Key, u32>,
    out_positions: Vec<[f32; 3]>,
    out_normals: Vec<Option<[f32; 3]>>,
    out_texcoords: Vec<Option<[f32; 2]>>,
    out_colors: Vec<Option<[f32; 4]>>,
    indices: Vec<u32>,

    material_names: Vec<String>,
    material_libraries: Vec<String>,
    submeshes: Vec<SubMesh>,
    current_material: Option<usize>,
    submesh_start: usize,
}

impl<'a> ObjParser<'a> {
    fn new(name: &'a str, config: &'a LoaderConfig) -> Self {
        Self {
            name,
            config,
            positions: Vec::new(),
            position_colors: Vec::new(),
            normals: Vec::new(),
            texcoords: Vec::new(),
            unique: HashMap::new(),
            out_positions: Vec::new(),
            out_normals: Vec::new(),
            out_texcoords: Vec::new(),
            out_colors: Vec::new(),
            indices: Vec::new(),
            material_names: Vec::new(),
            material_libraries: Vec::new(),
            submeshes: Vec::new(),
            current_material: None,
            submesh_start: 0,
        }
    }

    fn parse<R: BufRead>(mut self, reader: R) -> EngineResult<MeshData> {
        for (line_no, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| {
                EngineError::parse(self.name, Some(line_no + 1), format!("unreadable line: {e}"))
            })?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let mut parts = trimmed.split_whitespace();
            let Some(tag) = parts.next() else {
                continue;
            };

            match tag {
                "v" => {
                    let values = self.parse_floats(parts, line_no, "vertex")?;
                    match values.len() {
                        3 | 4 => {
                            self.positions.push([values[0], values[1], values[2]]);
                            self.position_colors.push(None);
                        }
                        6 | 7 => {
                            self.positions.push([values[0], values[1], values[2]]);
                            self.position_colors
                                .push(Some([values[3], values[4], values[5], 1.0]));
                        }
                        n => {
                            return Err(EngineError::parse(
                                self.name,
                                Some(line_no + 1),
                                format!("vertex needs 3, 4, 6 or 7 components, got {n}"),
                            ));
                        }
                    }
                }
                "vt" => {
                    let values = self.parse_floats(parts, line_no, "texture coordinate")?;
                    if values.is_empty() || values.len() > 3 {
                        return Err(EngineError::parse(
                            self.name,
                            Some(line_no + 1),
                            format!("texture coordinate needs 1 to 3 components, got {}", values.len()),
                        ));
                    }
                    let u = values[0];
                    let v = values.get(1).copied().unwrap_or(0.0);
                    let v = if self.config.flip_uv_v { 1.0 - v } else { v };
                    self.texcoords.push([u, v]);
                }
                "vn" => {
                    let values = self.parse_floats(parts, line_no, "normal")?;
                    if values.len() != 3 {
                        return Err(EngineError::parse(
                            self.name,
                            Some(line_no + 1),
                            format!("normal needs 3 components, got {}", values.len()),
                        ));
                    }
                    self.normals.push([values[0], values[1], values[2]]);
                }
                "f" => self.parse_face(parts, line_no)?,
                "usemtl" => {
                    let material = parts.collect::<Vec<_>>().join(" ");
                    self.switch_material(material);
                }
                "mtllib" => {
                    self.material_libraries
                        .extend(parts.map(|lib| lib.to_owned()));
                }
                "l" | "p" => {
                    log::warn!(
                        "Skipping '{}' element on line {} of {}",
                        tag,
                        line_no + 1,
                        self.name
                    );
                }
                tag if FREE_FORM_TAGS.contains(&tag) => {
                    return Err(EngineError::unsupported_feature(
                        self.name,
                        format!("free-form geometry '{tag}' on line {}", line_no + 1),
                    ));
                }
                _ => {
                    // Ignore other directives (o/g/s/etc.)
                }
            }
        }

        self.finish()
    }

    fn parse_floats<'l>(
        &self,
        parts: impl Iterator<Item = &'l str>,
        line_no: usize,
        what: &str,
    ) -> EngineResult<Vec<f32>> {
        parts
            .map(|token| {
                token.parse::<f32>().map_err(|_| {
                    EngineError::parse(
                        self.name,
                        Some(line_no + 1),
                        format!("invalid {what} component '{token}'"),
                    )
                })
            })
            .collect()
    }

    fn parse_face<'l>(
        &mut self,
        parts: impl Iterator<Item = &'l str>,
        line_no: usize,
    ) -> EngineResult<()> {
        let keys = parts
            .map(|part| self.parse_face_vertex(part, line_no))
            .collect::<EngineResult<Vec<Key>>>()?;
        if keys.len() < 3 {
            return Err(EngineError::parse(
                self.name,
                Some(line_no + 1),
                format!("face needs at least 3 vertices, got {}", keys.len()),
            ));
        }

        let mut face_indices: Vec<u32> = Vec::with_capacity(keys.len());
        for key in keys {
            let index = match self.unique.get(&key) {
                Some(&idx) => idx,
                None => self.push_vertex(key, line_no)?,
            };
            face_indices.push(index);
        }
        // Triangulate fan
        for tri in 1..(face_indices.len() - 1) {
            self.indices.push(face_indices[0]);
            self.indices.push(face_indices[tri]);
            self.indices.push(face_indices[tri + 1]);
        }
        Ok(())
    }

    fn push_vertex(&mut self, key: Key, line_no: usize) -> EngineResult<u32> {
        if self.out_positions.len() >= self.config.max_vertices {
            return Err(EngineError::unsupported_feature(
                self.name,
                format!(
                    "more than {} vertices (line {})",
                    self.config.max_vertices,
                    line_no + 1
                ),
            ));
        }
        let Key(vi, vti, vni) = key;
        let idx = u32::try_from(self.out_positions.len()).map_err(|_| {
            EngineError::unsupported_feature(self.name, format!("more than {} vertices", u32::MAX))
        })?;

        self.out_positions.push(self.positions[vi]);
        self.out_colors.push(self.position_colors[vi]);
        self.out_texcoords.push(vti.map(|i| self.texcoords[i]));
        self.out_normals.push(vni.map(|i| self.normals[i]));
        self.unique.insert(key, idx);
        Ok(idx)
    }

    fn parse_face_vertex(&self, token: &str, line_no: usize) -> EngineResult<Key> {
        let mut split = token.split('/');
        let pos = split.next().unwrap_or_default();
        let pos_idx = self.resolve_index(pos, self.positions.len(), line_no)?;

        let tex_idx = match split.next() {
            Some(value) if !value.is_empty() => {
                Some(self.resolve_index(value, self.texcoords.len(), line_no)?)
            }
            _ => None,
        };

        let norm_idx = match split.next() {
            Some(value) if !value.is_empty() => {
                Some(self.resolve_index(value, self.normals.len(), line_no)?)
            }
            _ => None,
        };

        if split.next().is_some() {
            return Err(EngineError::parse(
                self.name,
                Some(line_no + 1),
                format!("malformed face element '{token}'"),
            ));
        }

        Ok(Key(pos_idx, tex_idx, norm_idx))
    }

    fn resolve_index(&self, token: &str, len: usize, line_no: usize) -> EngineResult<usize> {
        let raw = token.parse::<i64>().map_err(|_| {
            EngineError::parse(self.name, Some(line_no + 1), format!("invalid index '{token}'"))
        })?;
        if raw == 0 {
            return Err(EngineError::parse(
                self.name,
                Some(line_no + 1),
                "OBJ indices are 1-based; found 0",
            ));
        }

        let idx = if raw > 0 { raw - 1 } else { len as i64 + raw };
        if idx < 0 || idx as usize >= len {
            return Err(EngineError::parse(
                self.name,
                Some(line_no + 1),
                format!("index {raw} resolved out of bounds (len={len})"),
            ));
        }
        Ok(idx as usize)
    }

    fn switch_material(&mut self, material: String) {
        self.close_submesh();
        let slot = match self.material_names.iter().position(|m| *m == material) {
            Some(slot) => slot,
            None => {
                self.material_names.push(material);
                self.material_names.len() - 1
            }
        };
        self.current_material = Some(slot);
    }

    fn close_submesh(&mut self) {
        let count = self.indices.len() - self.submesh_start;
        if count > 0 {
            self.submeshes.push(SubMesh {
                index_offset: self.submesh_start as u32,
                index_count: count as u32,
                material: self.current_material,
            });
        }
        self.submesh_start = self.indices.len();
    }

    fn finish(mut self) -> EngineResult<MeshData> {
        if self.out_positions.is_empty() || self.indices.is_empty() {
            return Err(EngineError::parse(self.name, None, "OBJ contained no triangles"));
        }
        self.close_submesh();

        let name = self.name;
        let streams = VertexStreams {
            positions: std::mem::take(&mut self.out_positions),
            normals: complete_stream(std::mem::take(&mut self.out_normals), name, "normals"),
            tex_coords: complete_stream(
                std::mem::take(&mut self.out_texcoords),
                name,
                "texture coordinates",
            ),
            colors: complete_stream(std::mem::take(&mut self.out_colors), name, "vertex colours"),
        };

        let mut mesh = MeshData::from_streams(streams, std::mem::take(&mut self.indices), name)?;
        mesh.submeshes = std::mem::take(&mut self.submeshes);
        mesh.materials = self.material_names.into_iter().map(MaterialInfo::named).collect();
        mesh.material_libraries = self.material_libraries;
        log::info!(
            "Parsed OBJ '{}': {} vertices, {} triangles, {} sub-meshes",
            name,
            mesh.vertex_count(),
            mesh.triangle_count(),
            mesh.submeshes.len()
        );
        Ok(mesh)
    }
}

/// Keep a stream only if every vertex supplied it.
pub(crate) fn complete_stream<T>(stream: Vec<Option<T>>, name: &str, what: &str) -> Option<Vec<T>> {
    let supplied = stream.iter().filter(|v| v.is_some()).count();
    if supplied == 0 {
        log::debug!("'{name}' has no {what}; omitting attribute");
        return None;
    }
    if supplied < stream.len() {
        log::warn!(
            "'{}' supplies {} for {} of {} vertices; omitting attribute",
            name,
            what,
            supplied,
            stream.len()
        );
        return None;
    }
    stream.into_iter().collect()
}

/// Parse an MTL library. Texture paths are resolved relative to `mtl_path`.
pub fn parse_mtl(contents: &str, mtl_path: &str) -> EngineResult<Vec<MaterialInfo>> {
    let mut materials: Vec<MaterialInfo> = Vec::new();

    for (line_no, line) in contents.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let mut parts = trimmed.split_whitespace();
        let Some(tag) = parts.next() else {
            continue;
        };
        let rest: Vec<&str> = parts.collect();

        if tag == "newmtl" {
            materials.push(MaterialInfo::named(rest.join(" ")));
            continue;
        }
        let Some(current) = materials.last_mut() else {
            if matches!(tag, "Kd" | "d" | "Tr" | "map_Kd" | "map_Bump" | "bump" | "norm") {
                return Err(EngineError::parse(
                    mtl_path,
                    Some(line_no + 1),
                    format!("'{tag}' before any newmtl"),
                ));
            }
            continue;
        };

        let float = |i: usize| -> EngineResult<f32> {
            rest.get(i)
                .and_then(|t| t.parse::<f32>().ok())
                .ok_or_else(|| {
                    EngineError::parse(mtl_path, Some(line_no + 1), format!("bad '{tag}' value"))
                })
        };

        match tag {
            "Kd" => {
                current.base_color[0] = float(0)?;
                current.base_color[1] = float(1)?;
                current.base_color[2] = float(2)?;
            }
            "d" => current.base_color[3] = float(0)?,
            "Tr" => current.base_color[3] = 1.0 - float(0)?,
            "map_Kd" | "map_Bump" | "bump" | "norm" => {
                // Options (-bm 1.0, -s ...) precede the file name, which comes last.
                let file = rest.last().ok_or_else(|| {
                    EngineError::parse(mtl_path, Some(line_no + 1), format!("'{tag}' without a file"))
                })?;
                let texture = TextureRef::Path(sibling_path(mtl_path, file));
                if tag == "map_Kd" {
                    current.diffuse_texture = Some(texture);
                } else {
                    current.normal_texture = Some(texture);
                }
            }
            _ => {}
        }
    }

    Ok(materials)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::AttributeSemantic;

    fn parse(src: &str) -> EngineResult<MeshData> {
        load_obj_from_str(src, "test.obj", &LoaderConfig::default())
    }

    #[test]
    fn parse_simple_triangle() {
        let src = r#"
            v 0.0 0.0 0.0
            v 1.0 0.0 0.0
            v 0.0 1.0 0.0
            vn 0.0 0.0 1.0
            vt 0.0 0.0
            vt 1.0 0.0
            vt 0.0 1.0
            f 1/1/1 2/2/1 3/3/1
        "#;
        let mesh = parse(src).expect("parse triangle");
        assert_eq!(mesh.vertex_count(), 3);
        assert_eq!(mesh.indices.len(), 3);
        assert!(mesh.is_valid());
        assert!(mesh.has(AttributeSemantic::Normal));
        assert!(mesh.has(AttributeSemantic::TexCoord));
    }

    #[test]
    fn mesh_without_normals_omits_normal_slot() {
        let src = "v 0 0 0\nv 1 0 0\nv 0 1 0\nvt 0 0\nvt 1 0\nvt 0 1\nf 1/1 2/2 3/3\n";
        let mesh = parse(src).unwrap();
        assert!(!mesh.has(AttributeSemantic::Normal));
        assert!(mesh.attributes.iter().all(|a| a.location != 1));
        assert_eq!(mesh.stride, 20);
    }

    #[test]
    fn mixed_normals_are_dropped() {
        let src = "v 0 0 0\nv 1 0 0\nv 0 1 0\nv 1 1 0\nvn 0 0 1\nf 1//1 2//1 3//1\nf 2 4 3\n";
        let mesh = parse(src).unwrap();
        assert!(!mesh.has(AttributeSemantic::Normal));
        assert_eq!(mesh.triangle_count(), 2);
    }

    #[test]
    fn quads_fan_triangulate_with_negative_indices() {
        let src = "v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nf -4 -3 -2 -1\n";
        let mesh = parse(src).unwrap();
        assert_eq!(mesh.indices, vec![0, 1, 2, 0, 2, 3]);
        assert_eq!(mesh.vertex_count(), 4);
    }

    #[test]
    fn shared_corners_are_deduplicated() {
        let src = "v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nf 1 2 3\nf 1 3 4\n";
        let mesh = parse(src).unwrap();
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.indices.len(), 6);
    }

    #[test]
    fn vertex_colours_become_an_attribute() {
        let src = "v 0 0 0 1 0 0\nv 1 0 0 0 1 0\nv 0 1 0 0 0 1\nf 1 2 3\n";
        let mesh = parse(src).unwrap();
        let colors = mesh.read(AttributeSemantic::Color).unwrap();
        assert_eq!(colors[1], &[0.0, 1.0, 0.0, 1.0]);
    }

    #[test]
    fn usemtl_splits_submeshes() {
        let src = "mtllib scene.mtl\nv 0 0 0\nv 1 0 0\nv 0 1 0\nv 1 1 0\n\
                   usemtl red\nf 1 2 3\nusemtl blue\nf 2 4 3\nusemtl red\nf 1 3 4\n";
        let mesh = parse(src).unwrap();
        assert_eq!(mesh.material_libraries, vec!["scene.mtl".to_string()]);
        let names: Vec<&str> = mesh.materials.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["red", "blue"]);
        let ranges: Vec<(u32, u32, Option<usize>)> = mesh
            .submeshes
            .iter()
            .map(|s| (s.index_offset, s.index_count, s.material))
            .collect();
        assert_eq!(ranges, vec![(0, 3, Some(0)), (3, 3, Some(1)), (6, 3, Some(0))]);
    }

    #[test]
    fn flip_uv_option_inverts_v() {
        let config = LoaderConfig {
            flip_uv_v: true,
            ..LoaderConfig::default()
        };
        let src = "v 0 0 0\nv 1 0 0\nv 0 1 0\nvt 0 0.25\nf 1/1 2/1 3/1\n";
        let mesh = load_obj_from_str(src, "uv.obj", &config).unwrap();
        assert_eq!(mesh.read(AttributeSemantic::TexCoord).unwrap()[0], &[0.0, 0.75]);
    }

    #[test]
    fn malformed_vertex_reports_line() {
        let err = parse("v 0 0 0\nv 1 zero 0\n").unwrap_err();
        assert!(matches!(err, EngineError::ParseError { line: Some(2), .. }), "{err}");
    }

    #[test]
    fn zero_index_is_a_parse_error() {
        let err = parse("v 0 0 0\nv 1 0 0\nv 0 1 0\nf 0 1 2\n").unwrap_err();
        assert!(matches!(err, EngineError::ParseError { line: Some(4), .. }));
    }

    #[test]
    fn short_vertex_is_a_parse_error_with_line() {
        let err = parse("v 0 0 0\nv 1 2\n").unwrap_err();
        assert!(matches!(err, EngineError::ParseError { line: Some(2), .. }), "{err}");
    }

    #[test]
    fn degenerate_face_is_rejected_before_adding_vertices() {
        let err = parse("v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2\nf 1 2 3\n").unwrap_err();
        assert!(matches!(err, EngineError::ParseError { line: Some(4), .. }), "{err}");
        assert!(err.to_string().contains("at least 3"), "{err}");
    }

    #[test]
    fn free_form_curves_are_unsupported() {
        let err = parse("v 0 0 0\ncstype bspline\n").unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedFeature { .. }));
    }

    #[test]
    fn lines_are_skipped_not_fatal() {
        let mesh = parse("v 0 0 0\nv 1 0 0\nv 0 1 0\nl 1 2\nf 1 2 3\n").unwrap();
        assert_eq!(mesh.triangle_count(), 1);
    }

    #[test]
    fn empty_obj_is_a_parse_error() {
        assert!(matches!(parse("# nothing\n"), Err(EngineError::ParseError { .. })));
    }

    #[test]
    fn vertex_budget_is_enforced() {
        let config = LoaderConfig {
            max_vertices: 2,
            ..LoaderConfig::default()
        };
        let err = load_obj_from_str("v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n", "big.obj", &config)
            .unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedFeature { .. }));
    }

    #[test]
    fn mtl_textures_resolve_next_to_library() {
        let src = "newmtl brick\nKd 0.5 0.25 1\nd 0.5\nmap_Kd textures/brick.png\n\
                   map_Bump -bm 1.0 textures/brick_n.png\n";
        let materials = parse_mtl(src, "res://models/walls.mtl").unwrap();
        assert_eq!(materials.len(), 1);
        let brick = &materials[0];
        assert_eq!(brick.base_color, [0.5, 0.25, 1.0, 0.5]);
        assert_eq!(
            brick.diffuse_texture,
            Some(TextureRef::Path("res://models/textures/brick.png".into()))
        );
        assert_eq!(
            brick.normal_texture,
            Some(TextureRef::Path("res://models/textures/brick_n.png".into()))
        );
    }
}
