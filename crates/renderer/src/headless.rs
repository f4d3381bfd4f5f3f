//! Headless backend: no GPU, CPU copies of every upload.
//!
//! Used for tests and for tools that only need the resource contract (asset
//! validation, batch conversion). Handles follow the same rules as the GL backend.

use std::sync::Arc;

use asset::{CubemapFaceSet, MeshData, PixelBuffer};
use corelib::{AssetSource, Camera3D, EngineConfig, EngineError, EngineResult, Mat4, Transform};

use crate::{
    MeshInfo, Renderer, TextureInfo, check_environment, check_texture_size,
    frame::{FrameRecorder, FrameStats},
    handle::{MeshHandle, ResourceArena, TextureHandle, next_backend_id},
};

struct StoredTexture {
    info: TextureInfo,
    /// One entry per layer (six for cubemaps, in +X,-X,+Y,-Y,+Z,-Z order).
    layers: Vec<PixelBuffer>,
}

struct StoredMesh {
    info: MeshInfo,
    data: MeshData,
}

struct QueuedDraw {
    mesh: MeshHandle,
    texture: Option<TextureHandle>,
    triangles: u64,
}

pub struct HeadlessRenderer {
    source: Arc<dyn AssetSource>,
    backend_id: u32,
    textures: ResourceArena<TextureHandle, StoredTexture>,
    meshes: ResourceArena<MeshHandle, StoredMesh>,
    frame: FrameRecorder,
    queued: Vec<QueuedDraw>,
    environment: Option<TextureHandle>,
    width: u32,
    height: u32,
    max_texture_dimension: u32,
    view_projection: Mat4,
}

impl HeadlessRenderer {
    pub fn new(config: &EngineConfig, source: Arc<dyn AssetSource>) -> Self {
        let backend_id = next_backend_id();
        log::debug!("Headless renderer backend id {backend_id}");
        Self {
            source,
            backend_id,
            textures: ResourceArena::new(backend_id),
            meshes: ResourceArena::new(backend_id),
            frame: FrameRecorder::new(config.performance.max_draws_per_frame),
            queued: Vec::new(),
            environment: None,
            width: config.viewport.width.max(1),
            height: config.viewport.height.max(1),
            max_texture_dimension: config.renderer_device.max_texture_dimension,
            view_projection: Mat4::IDENTITY,
        }
    }

    #[inline]
    pub fn backend_id(&self) -> u32 {
        self.backend_id
    }

    pub fn viewport(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// CPU copy of one uploaded layer (layer 0 for 2D textures).
    pub fn texture_pixels(&self, handle: TextureHandle, layer: u32) -> EngineResult<&PixelBuffer> {
        let stored = self.textures.get(handle)?;
        stored
            .layers
            .get(layer as usize)
            .ok_or_else(|| EngineError::InvalidHandle {
                handle: handle.to_string(),
                reason: format!("layer {layer} out of range ({} layers)", stored.layers.len()),
            })
    }

    pub fn mesh_data(&self, handle: MeshHandle) -> EngineResult<&MeshData> {
        Ok(&self.meshes.get(handle)?.data)
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn live_meshes(&self) -> usize {
        self.meshes.len()
    }

    /// View-projection of the frame in progress (identity before the first frame).
    pub fn view_projection(&self) -> Mat4 {
        self.view_projection
    }
}

impl Renderer for HeadlessRenderer {
    fn backend_name(&self) -> &'static str {
        "headless"
    }

    fn asset_source(&self) -> &dyn AssetSource {
        self.source.as_ref()
    }

    fn upload_texture(&mut self, pixels: &PixelBuffer, label: &str) -> EngineResult<TextureHandle> {
        check_texture_size(pixels.width(), pixels.height(), self.max_texture_dimension, label)?;
        let info = TextureInfo {
            width: pixels.width(),
            height: pixels.height(),
            layers: 1,
            format: pixels.format(),
            label: label.to_owned(),
        };
        let handle = self.textures.insert(StoredTexture {
            info,
            layers: vec![pixels.clone()],
        });
        log::info!(
            "Loaded texture '{}' {}x{} {:?} -> {}",
            label,
            pixels.width(),
            pixels.height(),
            pixels.format(),
            handle
        );
        Ok(handle)
    }

    fn upload_cubemap(&mut self, faces: &CubemapFaceSet, label: &str) -> EngineResult<TextureHandle> {
        let size = faces.face_size();
        check_texture_size(size, size, self.max_texture_dimension, label)?;
        let info = TextureInfo {
            width: size,
            height: size,
            layers: faces.faces().len() as u32,
            format: faces.faces()[0].format(),
            label: label.to_owned(),
        };
        let handle = self.textures.insert(StoredTexture {
            info,
            layers: faces.faces().to_vec(),
        });
        log::info!(
            "Loaded cubemap '{}' ({}) faces {}x{} -> {}",
            label,
            faces.layout(),
            size,
            size,
            handle
        );
        Ok(handle)
    }

    fn create_mesh(&mut self, mesh: &MeshData, label: &str) -> EngineResult<MeshHandle> {
        mesh.validate(label)?;
        let info = MeshInfo::describe(mesh, label);
        let handle = self.meshes.insert(StoredMesh {
            info,
            data: mesh.clone(),
        });
        log::info!(
            "Created mesh '{}' ({} vertices, {} triangles) -> {}",
            label,
            mesh.vertex_count(),
            mesh.triangle_count(),
            handle
        );
        Ok(handle)
    }

    fn texture_info(&self, handle: TextureHandle) -> EngineResult<TextureInfo> {
        Ok(self.textures.get(handle)?.info.clone())
    }

    fn mesh_info(&self, handle: MeshHandle) -> EngineResult<MeshInfo> {
        Ok(self.meshes.get(handle)?.info.clone())
    }

    fn destroy_texture(&mut self, handle: TextureHandle) -> EngineResult<()> {
        let stored = self.textures.remove(handle)?;
        if self.environment == Some(handle) {
            self.environment = None;
        }
        log::debug!("Destroyed texture '{}' {}", stored.info.label, handle);
        Ok(())
    }

    fn destroy_mesh(&mut self, handle: MeshHandle) -> EngineResult<()> {
        let stored = self.meshes.remove(handle)?;
        log::debug!("Destroyed mesh '{}' {}", stored.info.label, handle);
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.width = width.max(1);
        self.height = height.max(1);
    }

    fn begin_frame(&mut self, camera: &Camera3D) -> EngineResult<()> {
        let aspect = self.width as f32 / self.height as f32;
        let view_projection = camera.view_projection(aspect)?;
        self.frame.begin()?;
        self.view_projection = view_projection;
        self.queued.clear();
        Ok(())
    }

    fn draw_mesh(
        &mut self,
        mesh: MeshHandle,
        texture: Option<TextureHandle>,
        _transform: &Transform,
    ) -> EngineResult<()> {
        let triangles = self.meshes.get(mesh)?.data.triangle_count();
        if let Some(texture) = texture {
            let stored = self.textures.get(texture)?;
            if stored.info.is_cubemap() {
                return Err(EngineError::InvalidHandle {
                    handle: texture.to_string(),
                    reason: "cubemap bound as a 2D diffuse texture".into(),
                });
            }
        }
        if self.frame.record(triangles)? {
            self.queued.push(QueuedDraw {
                mesh,
                texture,
                triangles: triangles as u64,
            });
        }
        Ok(())
    }

    fn set_environment(&mut self, cubemap: Option<TextureHandle>) -> EngineResult<()> {
        if let Some(handle) = cubemap {
            check_environment(handle, &self.textures.get(handle)?.info)?;
        }
        self.environment = cubemap;
        Ok(())
    }

    fn environment(&self) -> Option<TextureHandle> {
        self.environment
    }

    fn end_frame(&mut self) -> EngineResult<FrameStats> {
        let mut stats = self.frame.end()?;
        for draw in std::mem::take(&mut self.queued) {
            let live = self.meshes.get(draw.mesh).is_ok()
                && draw.texture.is_none_or(|t| self.textures.get(t).is_ok());
            if !live {
                log::warn!("Skipping draw of {}: destroyed before end_frame", draw.mesh);
                stats.discard_stale(draw.triangles);
            }
        }
        stats.environment_drawn = self.environment.is_some();
        Ok(stats)
    }

    fn cleanup(&mut self) {
        let textures = self.textures.drain().len();
        let meshes = self.meshes.drain().len();
        self.queued.clear();
        self.environment = None;
        self.frame.abort();
        if textures + meshes > 0 {
            log::info!("Headless cleanup released {textures} textures and {meshes} meshes");
        }
    }
}
