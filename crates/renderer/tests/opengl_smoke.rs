//! Runs only where an OpenGL adapter is available; otherwise each test logs and returns.

use std::sync::Arc;

use asset::{AtlasLayout, CubemapOrientation, MeshData, PixelFormat, VertexStreams};
use corelib::{Camera3D, EngineConfig, EngineError, MemoryAssetSource, Transform};
use renderer::{OpenGlRenderer, Renderer};

fn try_renderer(config: &EngineConfig) -> Option<OpenGlRenderer> {
    let _ = env_logger::builder().is_test(true).try_init();
    match OpenGlRenderer::new(config, Arc::new(MemoryAssetSource::new())) {
        Ok(r) => Some(r),
        Err(err) => {
            log::warn!("Skipping OpenGL test: {err}");
            None
        }
    }
}

fn triangle() -> MeshData {
    let streams = VertexStreams {
        positions: vec![[-0.5, -0.5, 0.0], [0.5, -0.5, 0.0], [0.0, 0.5, 0.0]],
        ..Default::default()
    };
    MeshData::from_streams(streams, vec![0, 1, 2], "tri").unwrap()
}

#[test]
fn textures_meshes_and_a_frame() {
    let mut config = EngineConfig::default();
    config.viewport.width = 64;
    config.viewport.height = 64;
    let Some(mut r) = try_renderer(&config) else {
        return;
    };

    let tex = r
        .load_texture_from_raw_data(&[10, 20, 30], 1, 1, PixelFormat::Rgb8, "rgb")
        .unwrap();
    let info = r.texture_info(tex).unwrap();
    assert_eq!((info.width, info.height, info.layers), (1, 1, 1));

    let mesh = r.create_mesh(&triangle(), "tri").unwrap();
    r.begin_frame(&Camera3D::default()).unwrap();
    r.draw_mesh(mesh, Some(tex), &Transform::identity()).unwrap();
    r.draw_mesh(mesh, None, &Transform::identity()).unwrap();
    let stats = r.end_frame().unwrap();
    assert_eq!((stats.draw_calls, stats.triangles), (2, 2));

    r.resize(32, 16);
    assert_eq!(r.color_target().width(), 32);

    r.destroy_mesh(mesh).unwrap();
    assert!(matches!(r.destroy_mesh(mesh), Err(EngineError::DoubleFree { .. })));
    r.cleanup();
    assert!(matches!(r.destroy_texture(tex), Err(EngineError::DoubleFree { .. })));
}

#[test]
fn cubemap_upload_and_size_limit() {
    let mut config = EngineConfig::default();
    config.renderer_device.max_texture_dimension = 4;
    let Some(mut r) = try_renderer(&config) else {
        return;
    };

    let atlas = asset::PixelBuffer::from_raw(24, 4, PixelFormat::R8, vec![200; 24 * 4], "atlas").unwrap();
    let faces = asset::slice_atlas(&atlas, AtlasLayout::Auto, CubemapOrientation::Default).unwrap();
    let sky = r.upload_cubemap(&faces, "sky").unwrap();
    assert!(r.texture_info(sky).unwrap().is_cubemap());

    let err = r
        .load_texture_from_raw_data(&[0; 5 * 5], 5, 5, PixelFormat::R8, "big")
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidDimensions { .. }));
}

#[test]
fn environment_pass_and_stale_draws() {
    let Some(mut r) = try_renderer(&EngineConfig::default()) else {
        return;
    };
    let atlas = asset::PixelBuffer::from_raw(6, 1, PixelFormat::Rgba8, vec![90; 6 * 4], "atlas").unwrap();
    let faces = asset::slice_atlas(&atlas, AtlasLayout::HorizontalStrip, CubemapOrientation::Default).unwrap();
    let sky = r.upload_cubemap(&faces, "sky").unwrap();
    r.set_environment(Some(sky)).unwrap();

    let kept = r.create_mesh(&triangle(), "kept").unwrap();
    let doomed = r.create_mesh(&triangle(), "doomed").unwrap();
    r.begin_frame(&Camera3D::default()).unwrap();
    r.draw_mesh(kept, None, &Transform::identity()).unwrap();
    r.draw_mesh(doomed, None, &Transform::identity()).unwrap();
    r.destroy_mesh(doomed).unwrap();
    let stats = r.end_frame().unwrap();
    assert!(stats.environment_drawn);
    assert_eq!((stats.draw_calls, stats.dropped_draws), (1, 1));

    let mut bad = triangle();
    bad.indices = vec![0, 1, 7];
    assert!(matches!(r.create_mesh(&bad, "bad"), Err(EngineError::InvalidDimensions { .. })));
}
