//! ObjectLoader: model files in, [`MeshData`] out. All reads go through the
//! [`AssetSource`] gateway.

use std::{io::Cursor, sync::Arc};

use corelib::{AssetSource, EngineError, EngineResult, LoaderConfig, fs::sibling_path};

use crate::{gltf::load_gltf, mesh::MeshData, obj};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelFormat {
    Obj,
    Gltf,
    Glb,
}

impl ModelFormat {
    /// Pick a format from the file extension (case-insensitive).
    pub fn from_path(path: &str) -> Option<Self> {
        let ext = path.rsplit_once('.')?.1.to_ascii_lowercase();
        match ext.as_str() {
            "obj" => Some(Self::Obj),
            "gltf" => Some(Self::Gltf),
            "glb" => Some(Self::Glb),
            _ => None,
        }
    }

    /// Sniff the content: GLB magic, then a JSON object, otherwise OBJ text.
    pub fn detect(bytes: &[u8]) -> Self {
        if bytes.starts_with(b"glTF") {
            return Self::Glb;
        }
        match bytes.iter().find(|b| !b.is_ascii_whitespace()) {
            Some(b'{') => Self::Gltf,
            _ => Self::Obj,
        }
    }
}

pub struct ObjectLoader {
    source: Arc<dyn AssetSource>,
    config: LoaderConfig,
}

impl ObjectLoader {
    pub fn new(source: Arc<dyn AssetSource>, config: &LoaderConfig) -> Self {
        Self {
            source,
            config: config.clone(),
        }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Read and parse a model. OBJ material libraries are resolved next to the model.
    pub fn load_model(&self, path: &str) -> EngineResult<MeshData> {
        let format = ModelFormat::from_path(path).ok_or_else(|| EngineError::UnsupportedFormat {
            name: path.to_owned(),
            format: path
                .rsplit_once('.')
                .map(|(_, ext)| ext.to_owned())
                .unwrap_or_else(|| "<no extension>".into()),
        })?;
        let bytes = self.source.read(path)?;
        let mut mesh = self.parse(&bytes, path, format)?;
        if format == ModelFormat::Obj {
            self.apply_material_libraries(&mut mesh, path)?;
        }
        Ok(mesh)
    }

    /// Parse a model already in memory. `mtllib` references are reported but not read.
    pub fn load_mesh(&self, bytes: &[u8], format: ModelFormat) -> EngineResult<MeshData> {
        self.parse(bytes, "<memory>", format)
    }

    fn parse(&self, bytes: &[u8], name: &str, format: ModelFormat) -> EngineResult<MeshData> {
        match format {
            ModelFormat::Obj => obj::load_obj_from_reader(Cursor::new(bytes), name, &self.config),
            ModelFormat::Gltf | ModelFormat::Glb => {
                load_gltf(bytes, name, self.source.as_ref(), &self.config)
            }
        }
    }

    fn apply_material_libraries(&self, mesh: &mut MeshData, obj_path: &str) -> EngineResult<()> {
        for library in &mesh.material_libraries {
            let mtl_path = sibling_path(obj_path, library);
            let bytes = match self.source.read(&mtl_path) {
                Ok(bytes) => bytes,
                Err(EngineError::AssetNotFound { .. }) => {
                    log::warn!("Material library '{mtl_path}' not found; keeping default materials");
                    continue;
                }
                Err(e) => return Err(e),
            };
            let text = String::from_utf8_lossy(&bytes);
            for parsed in obj::parse_mtl(&text, &mtl_path)? {
                if let Some(slot) = mesh.materials.iter_mut().find(|m| m.name == parsed.name) {
                    *slot = parsed;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{AttributeSemantic, TextureRef};
    use corelib::MemoryAssetSource;

    const QUAD: &str = "mtllib quad.mtl\nv 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\n\
                        usemtl stone\nf 1 2 3 4\n";

    fn loader(source: MemoryAssetSource) -> ObjectLoader {
        ObjectLoader::new(Arc::new(source), &LoaderConfig::default())
    }

    #[test]
    fn format_from_extension_and_content() {
        assert_eq!(ModelFormat::from_path("res://a/b.OBJ"), Some(ModelFormat::Obj));
        assert_eq!(ModelFormat::from_path("scene.glb"), Some(ModelFormat::Glb));
        assert_eq!(ModelFormat::from_path("scene.fbx"), None);
        assert_eq!(ModelFormat::detect(b"glTF\x02\0\0\0"), ModelFormat::Glb);
        assert_eq!(ModelFormat::detect(b"  {\"asset\":{}}"), ModelFormat::Gltf);
        assert_eq!(ModelFormat::detect(b"v 0 0 0"), ModelFormat::Obj);
    }

    #[test]
    fn obj_materials_are_filled_from_mtllib() {
        let source = MemoryAssetSource::new()
            .with_file("res://models/quad.obj", QUAD)
            .with_file("res://models/quad.mtl", "newmtl stone\nKd 0.5 0.5 0.5\nmap_Kd stone.png\n");
        let mesh = loader(source).load_model("res://models/quad.obj").unwrap();
        assert_eq!(mesh.triangle_count(), 2);
        assert_eq!(mesh.materials.len(), 1);
        assert_eq!(mesh.materials[0].base_color, [0.5, 0.5, 0.5, 1.0]);
        assert_eq!(
            mesh.materials[0].diffuse_texture,
            Some(TextureRef::Path("res://models/stone.png".into()))
        );
    }

    #[test]
    fn missing_mtllib_only_warns() {
        let source = MemoryAssetSource::new().with_file("res://models/quad.obj", QUAD);
        let mesh = loader(source).load_model("res://models/quad.obj").unwrap();
        assert_eq!(mesh.materials[0].name, "stone");
        assert_eq!(mesh.materials[0].diffuse_texture, None);
    }

    #[test]
    fn missing_model_is_asset_not_found() {
        let err = loader(MemoryAssetSource::new())
            .load_model("res://models/none.obj")
            .unwrap_err();
        assert!(matches!(err, EngineError::AssetNotFound { .. }));
    }

    #[test]
    fn unknown_extension_is_unsupported_format() {
        let err = loader(MemoryAssetSource::new())
            .load_model("res://models/a.fbx")
            .unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedFormat { ref format, .. } if format == "fbx"));
    }

    #[test]
    fn load_mesh_parses_glb_bytes() {
        let bytes = crate::gltf::tests::two_primitive_glb();
        let loader = loader(MemoryAssetSource::new());
        let mesh = loader.load_mesh(&bytes, ModelFormat::detect(&bytes)).unwrap();
        assert_eq!(mesh.submeshes.len(), 2);
    }

    #[test]
    fn load_mesh_without_normals_omits_slot() {
        let src = b"v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n";
        let mesh = loader(MemoryAssetSource::new())
            .load_mesh(src, ModelFormat::Obj)
            .unwrap();
        assert!(!mesh.has(AttributeSemantic::Normal));
        assert_eq!(mesh.attributes.len(), 1);
    }
}
