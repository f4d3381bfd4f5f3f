//! Entry point for Ember3D.
//! Loads the assets named on the command line through the configured backend,
//! renders a few frames and reports what was uploaded.
//!
//! Asset flags (repeatable): `--texture=PATH`, `--model=PATH`, `--cubemap=PATH`.
//! `--skybox=PATH` loads a cubemap atlas and draws it behind the scene.
//! `--frames=N` sets how many frames to draw (default 1). Engine flags are
//! documented on `corelib::config`.

use std::sync::Arc;

use anyhow::{Context, Result};
use asset::{AtlasLayout, CubemapOrientation, ObjectLoader};
use corelib::{Camera3D, DiskAssetSource, EngineConfig, Transform, Vec3};
use renderer::{MeshHandle, Renderer, TextureHandle};

#[derive(Debug, Default)]
struct AssetArgs {
    textures: Vec<String>,
    models: Vec<String>,
    cubemaps: Vec<String>,
    skybox: Option<String>,
    frames: u32,
}

fn parse_asset_args() -> AssetArgs {
    let mut args = AssetArgs {
        frames: 1,
        ..AssetArgs::default()
    };
    for arg in std::env::args().skip(1) {
        if let Some(v) = arg.strip_prefix("--texture=") {
            args.textures.push(v.to_owned());
        } else if let Some(v) = arg.strip_prefix("--model=") {
            args.models.push(v.to_owned());
        } else if let Some(v) = arg.strip_prefix("--cubemap=") {
            args.cubemaps.push(v.to_owned());
        } else if let Some(v) = arg.strip_prefix("--skybox=") {
            args.skybox = Some(v.to_owned());
        } else if let Some(v) = arg.strip_prefix("--frames=") {
            match v.parse::<u32>() {
                Ok(n) => args.frames = n,
                Err(_) => log::warn!("Ignoring invalid --frames '{v}'"),
            }
        }
    }
    args
}

/// Upload a model and the diffuse texture of its first material, if it names one.
fn load_model(
    renderer: &mut dyn Renderer,
    loader: &ObjectLoader,
    path: &str,
) -> Result<(MeshHandle, Option<TextureHandle>)> {
    let mesh = loader
        .load_model(path)
        .with_context(|| format!("loading model {path}"))?;
    let handle = renderer.create_mesh(&mesh, path)?;

    let texture = match mesh.materials.iter().find_map(|m| m.diffuse_texture.as_ref()) {
        Some(asset::TextureRef::Path(tex_path)) => match renderer.load_texture_from_file(tex_path) {
            Ok(h) => Some(h),
            Err(err) => {
                log::warn!("Model '{path}' texture '{tex_path}' not loaded: {err}");
                None
            }
        },
        Some(asset::TextureRef::Embedded { bytes, .. }) => {
            Some(renderer.load_texture_from_memory(bytes, path)?)
        }
        None => None,
    };
    Ok((handle, texture))
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = EngineConfig::load();
    let assets = parse_asset_args();
    log::info!(
        "Starting {} {}. Backend: {}, viewport={}x{}, asset_root={}",
        config.application.name,
        config.application.version,
        config.renderer_device.backend.name(),
        config.viewport.width,
        config.viewport.height,
        config.environment.asset_root.display()
    );

    let source = Arc::new(DiskAssetSource::new(config.environment.asset_root.clone()));
    let loader = ObjectLoader::new(source.clone(), &config.loader);
    let mut renderer = renderer::create_renderer(&config, source).context("creating renderer")?;

    let mut textures = Vec::new();
    for path in &assets.textures {
        let handle = renderer
            .load_texture_from_file(path)
            .with_context(|| format!("loading texture {path}"))?;
        textures.push(handle);
    }
    for path in &assets.cubemaps {
        renderer
            .load_cubemap_from_file(path, AtlasLayout::Auto, CubemapOrientation::Default)
            .with_context(|| format!("loading cubemap {path}"))?;
    }
    if let Some(path) = &assets.skybox {
        renderer
            .create_skybox_from_file(path, AtlasLayout::Auto, CubemapOrientation::Default)
            .with_context(|| format!("loading skybox {path}"))?;
    }
    let mut draws = Vec::new();
    for path in &assets.models {
        let (mesh, texture) = load_model(renderer.as_mut(), &loader, path)?;
        draws.push((mesh, texture.or_else(|| textures.first().copied())));
    }

    let camera = Camera3D::default();
    for frame in 0..assets.frames {
        renderer.begin_frame(&camera)?;
        for (i, (mesh, texture)) in draws.iter().enumerate() {
            let offset = i as f32 * 2.5;
            let transform = Transform::from_trs(
                Vec3::new(offset, 0.0, 0.0),
                Vec3::new(0.0, frame as f32 * 5.0, 0.0),
                Vec3::ONE,
            );
            renderer.draw_mesh(*mesh, *texture, &transform)?;
        }
        let stats = renderer.end_frame()?;
        log::info!(
            "Frame {}: {} draws, {} triangles, environment={}",
            stats.frame_index,
            stats.draw_calls,
            stats.triangles,
            stats.environment_drawn
        );
    }

    renderer.cleanup();
    log::info!("Graceful shutdown. Bye!");
    Ok(())
}
