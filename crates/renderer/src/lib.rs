//! Renderer: backend-agnostic resource contract plus the OpenGL (wgpu GL) and
//! headless backends.
//!
//! Uploads go through the required primitives (`upload_texture`,
//! `upload_cubemap`, `create_mesh`). The `load_*` helpers are provided on top of
//! them and read bytes through the backend's [`AssetSource`].

use std::sync::Arc;

use asset::{
    AtlasLayout, AttributeSemantic, CubemapFaceSet, CubemapOrientation, MeshData, PixelBuffer,
    PixelFormat, slice_atlas, texture,
};
use corelib::{AssetSource, BackendKind, Camera3D, EngineConfig, EngineError, EngineResult, Transform};

pub mod frame;
pub mod handle;
pub mod headless;
pub mod opengl;

pub use frame::FrameStats;
pub use handle::{MeshHandle, TextureHandle};
pub use headless::HeadlessRenderer;
pub use opengl::OpenGlRenderer;

/// Read-back description of a live texture.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextureInfo {
    pub width: u32,
    pub height: u32,
    /// 1 for 2D textures, 6 for cubemaps.
    pub layers: u32,
    /// Format of the uploaded source pixels.
    pub format: PixelFormat,
    pub label: String,
}

impl TextureInfo {
    #[inline]
    pub fn is_cubemap(&self) -> bool {
        self.layers == 6
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MeshInfo {
    pub vertex_count: u32,
    pub index_count: u32,
    pub submesh_count: u32,
    pub attributes: Vec<AttributeSemantic>,
    pub label: String,
}

impl MeshInfo {
    pub(crate) fn describe(mesh: &MeshData, label: &str) -> Self {
        Self {
            vertex_count: mesh.vertex_count() as u32,
            index_count: mesh.indices.len() as u32,
            submesh_count: mesh.submeshes.len() as u32,
            attributes: mesh.attributes.iter().map(|a| a.semantic).collect(),
            label: label.to_owned(),
        }
    }
}

pub trait Renderer {
    fn backend_name(&self) -> &'static str;

    /// Gateway used by the `load_*_from_file` helpers.
    fn asset_source(&self) -> &dyn AssetSource;

    fn upload_texture(&mut self, pixels: &PixelBuffer, label: &str) -> EngineResult<TextureHandle>;

    fn upload_cubemap(&mut self, faces: &CubemapFaceSet, label: &str) -> EngineResult<TextureHandle>;

    fn create_mesh(&mut self, mesh: &MeshData, label: &str) -> EngineResult<MeshHandle>;

    fn texture_info(&self, handle: TextureHandle) -> EngineResult<TextureInfo>;

    fn mesh_info(&self, handle: MeshHandle) -> EngineResult<MeshInfo>;

    fn destroy_texture(&mut self, handle: TextureHandle) -> EngineResult<()>;

    fn destroy_mesh(&mut self, handle: MeshHandle) -> EngineResult<()>;

    fn resize(&mut self, width: u32, height: u32);

    fn begin_frame(&mut self, camera: &Camera3D) -> EngineResult<()>;

    /// Queue a draw. `texture` must be a 2D texture; `None` samples white.
    fn draw_mesh(
        &mut self,
        mesh: MeshHandle,
        texture: Option<TextureHandle>,
        transform: &Transform,
    ) -> EngineResult<()>;

    /// Cubemap drawn behind the scene at every `end_frame`; `None` turns it off.
    /// Destroying the texture also clears it.
    fn set_environment(&mut self, cubemap: Option<TextureHandle>) -> EngineResult<()>;

    fn environment(&self) -> Option<TextureHandle>;

    /// Submit the queued draws. Draws whose mesh or texture has been destroyed
    /// since `draw_mesh` are skipped and counted in `dropped_draws`.
    fn end_frame(&mut self) -> EngineResult<FrameStats>;

    /// Release every live resource. Safe to call more than once.
    fn cleanup(&mut self);

    fn load_texture_from_file(&mut self, path: &str) -> EngineResult<TextureHandle> {
        let bytes = self.asset_source().read(path)?;
        let pixels = texture::decode(&bytes, path)?;
        self.upload_texture(&pixels, path)
    }

    /// Decode an in-memory image. `name` is only a debug label.
    fn load_texture_from_memory(&mut self, bytes: &[u8], name: &str) -> EngineResult<TextureHandle> {
        let label = if name.is_empty() { "<memory>" } else { name };
        let pixels = texture::decode(bytes, label)?;
        self.upload_texture(&pixels, label)
    }

    fn load_texture_from_raw_data(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
        format: PixelFormat,
        name: &str,
    ) -> EngineResult<TextureHandle> {
        let buffer = PixelBuffer::from_raw(width, height, format, pixels.to_vec(), name)?;
        self.upload_texture(&buffer, name)
    }

    fn load_cubemap_from_atlas(
        &mut self,
        bytes: &[u8],
        layout: AtlasLayout,
        orientation: CubemapOrientation,
    ) -> EngineResult<TextureHandle> {
        let atlas = texture::decode(bytes, "<cubemap atlas>")?;
        let faces = slice_atlas(&atlas, layout, orientation)?;
        self.upload_cubemap(&faces, "<cubemap atlas>")
    }

    fn load_cubemap_from_file(
        &mut self,
        path: &str,
        layout: AtlasLayout,
        orientation: CubemapOrientation,
    ) -> EngineResult<TextureHandle> {
        let bytes = self.asset_source().read(path)?;
        let atlas = texture::decode(&bytes, path)?;
        let faces = slice_atlas(&atlas, layout, orientation)?;
        self.upload_cubemap(&faces, path)
    }

    /// Load a cubemap atlas and make it the environment.
    fn create_skybox_from_atlas(
        &mut self,
        bytes: &[u8],
        layout: AtlasLayout,
        orientation: CubemapOrientation,
    ) -> EngineResult<TextureHandle> {
        let handle = self.load_cubemap_from_atlas(bytes, layout, orientation)?;
        self.set_environment(Some(handle))?;
        Ok(handle)
    }

    fn create_skybox_from_file(
        &mut self,
        path: &str,
        layout: AtlasLayout,
        orientation: CubemapOrientation,
    ) -> EngineResult<TextureHandle> {
        let handle = self.load_cubemap_from_file(path, layout, orientation)?;
        self.set_environment(Some(handle))?;
        Ok(handle)
    }
}

/// Construct the backend named by `config.renderer_device.backend`.
pub fn create_renderer(
    config: &EngineConfig,
    source: Arc<dyn AssetSource>,
) -> EngineResult<Box<dyn Renderer>> {
    log::info!(
        "Creating {} renderer ({}x{})",
        config.renderer_device.backend.name(),
        config.viewport.width,
        config.viewport.height
    );
    match config.renderer_device.backend {
        BackendKind::OpenGl => Ok(Box::new(OpenGlRenderer::new(config, source)?)),
        BackendKind::Headless => Ok(Box::new(HeadlessRenderer::new(config, source))),
    }
}

/// Environment slots only accept cubemaps.
pub(crate) fn check_environment(handle: TextureHandle, info: &TextureInfo) -> EngineResult<()> {
    if !info.is_cubemap() {
        return Err(EngineError::InvalidHandle {
            handle: handle.to_string(),
            reason: format!("'{}' is a 2D texture, not a cubemap", info.label),
        });
    }
    Ok(())
}

/// Reject textures larger than `max` in either dimension.
pub(crate) fn check_texture_size(width: u32, height: u32, max: u32, label: &str) -> EngineResult<()> {
    if width > max || height > max {
        return Err(EngineError::invalid_dimensions(
            label,
            format!("{width}x{height} exceeds the {max} texel limit"),
        ));
    }
    Ok(())
}
