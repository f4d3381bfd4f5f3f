//! Asset loading/parsers: textures, cubemap atlases and meshes (OBJ/MTL, glTF).
//! Everything here is pure CPU work and may run off the render thread.

pub mod cubemap;
pub mod gltf;
pub mod loader;
pub mod mesh;
pub mod obj;
pub mod texture;

pub use cubemap::{AtlasLayout, CubeFace, CubemapFaceSet, CubemapOrientation, slice_atlas};
pub use loader::{ModelFormat, ObjectLoader};
pub use mesh::{
    AttributeSemantic, AttributeType, MaterialInfo, MeshData, SubMesh, TextureRef, VertexAttribute,
    VertexStreams,
};
pub use texture::{ImageKind, PixelBuffer, PixelFormat, PixelSource};

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send<T: Send>() {}

    #[test]
    fn cpu_side_assets_cross_threads() {
        assert_send::<PixelBuffer>();
        assert_send::<CubemapFaceSet>();
        assert_send::<MeshData>();
        assert_send::<ObjectLoader>();
    }
}
