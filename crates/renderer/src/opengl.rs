//! OpenGL backend: wgpu restricted to `Backends::GL`, drawing into an offscreen
//! colour + depth target sized from the viewport config.
//! wgpu = 26.x

use std::{marker::PhantomData, sync::Arc};

use asset::{AttributeSemantic, CubemapFaceSet, MeshData, PixelBuffer};
use bytemuck::{Pod, Zeroable};
use corelib::{AssetSource, Camera3D, EngineConfig, EngineError, EngineResult, Transform};
use glam::{Mat4, Vec4};
use wgpu::{
    BindGroupLayout, BindGroupLayoutDescriptor, BindGroupLayoutEntry, BindingType, BlendState,
    Buffer, BufferBindingType, BufferUsages, ColorTargetState, ColorWrites,
    CommandEncoderDescriptor, DepthBiasState, DepthStencilState, Device, DeviceDescriptor,
    Extent3d, Features, FragmentState, Instance, InstanceDescriptor, Limits, LoadOp, Operations,
    PipelineLayoutDescriptor, PowerPreference, Queue, RenderPassColorAttachment,
    RenderPassDescriptor, RenderPipeline, RenderPipelineDescriptor, Sampler, ShaderModuleDescriptor,
    ShaderSource, ShaderStages, StoreOp, Texture, TextureDescriptor, TextureDimension,
    TextureFormat, TextureUsages, TextureView, TextureViewDescriptor, TextureViewDimension,
    VertexBufferLayout, VertexState, VertexStepMode, util::DeviceExt,
};

use crate::{
    MeshInfo, Renderer, TextureInfo, check_environment, check_texture_size,
    frame::{FrameRecorder, FrameStats},
    handle::{MeshHandle, ResourceArena, TextureHandle, next_backend_id},
};

/// GPU vertex: every mesh is expanded to this layout on upload.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct GpuVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
    pub color: [f32; 4],
}

impl GpuVertex {
    pub const LAYOUT: VertexBufferLayout<'static> = VertexBufferLayout {
        array_stride: std::mem::size_of::<GpuVertex>() as u64,
        step_mode: VertexStepMode::Vertex,
        attributes: &wgpu::vertex_attr_array![
            0 => Float32x3,
            1 => Float32x3,
            2 => Float32x2,
            3 => Float32x4
        ],
    };
}

/// Per-draw UBO (16-byte aligned).
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct DrawUniforms {
    model: [[f32; 4]; 4],
    view_proj: [[f32; 4]; 4],
    normal_matrix: [[f32; 4]; 4],
}

/// Environment pass UBO: inverse of projection * rotation-only view.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct SkyUniforms {
    inv_view_proj: [[f32; 4]; 4],
}

const COLOR_FORMAT: TextureFormat = TextureFormat::Rgba8UnormSrgb;
const DEPTH_FORMAT: TextureFormat = TextureFormat::Depth32Float;
const TEXTURE_FORMAT: TextureFormat = TextureFormat::Rgba8UnormSrgb;

struct GpuTexture {
    texture: Texture,
    view: TextureView,
    info: TextureInfo,
}

struct GpuMesh {
    vertex_buf: Buffer,
    index_buf: Buffer,
    index_count: u32,
    info: MeshInfo,
}

struct RenderTargets {
    color: Texture,
    color_view: TextureView,
    depth: Texture,
    depth_view: TextureView,
}

impl RenderTargets {
    fn destroy(&self) {
        self.color.destroy();
        self.depth.destroy();
    }
}

struct PendingDraw {
    mesh: MeshHandle,
    texture: Option<TextureHandle>,
    triangles: u64,
    model: Mat4,
    normal_matrix: Mat4,
}

pub struct OpenGlRenderer {
    source: Arc<dyn AssetSource>,
    backend_id: u32,

    // Device/queue
    device: Device,
    queue: Queue,
    adapter_info: wgpu::AdapterInfo,

    // Pipeline & shared bindings
    pipeline: RenderPipeline,
    draw_bgl: BindGroupLayout,
    sampler: Sampler,
    white: Texture,
    white_view: TextureView,

    // Environment pass
    sky_pipeline: RenderPipeline,
    sky_bgl: BindGroupLayout,
    sky_sampler: Sampler,
    environment: Option<TextureHandle>,
    sky_inv_view_proj: Mat4,

    // Offscreen target
    targets: RenderTargets,
    width: u32,
    height: u32,
    clear_color: wgpu::Color,
    max_texture_dimension: u32,

    textures: ResourceArena<TextureHandle, GpuTexture>,
    meshes: ResourceArena<MeshHandle, GpuMesh>,
    frame: FrameRecorder,
    pending: Vec<PendingDraw>,
    view_projection: Mat4,

    // GL contexts are bound to the creating thread.
    _not_send: PhantomData<*const ()>,
}

impl OpenGlRenderer {
    pub fn new(config: &EngineConfig, source: Arc<dyn AssetSource>) -> EngineResult<Self> {
        pollster::block_on(Self::new_async(config, source))
    }

    async fn new_async(config: &EngineConfig, source: Arc<dyn AssetSource>) -> EngineResult<Self> {
        let width = config.viewport.width.max(1);
        let height = config.viewport.height.max(1);

        let instance = Instance::new(&InstanceDescriptor {
            backends: wgpu::Backends::GL,
            ..Default::default()
        });
        let power_preference = if config.renderer_device.power_preference_high {
            PowerPreference::HighPerformance
        } else {
            PowerPreference::LowPower
        };
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| EngineError::Backend(format!("no OpenGL adapter: {e}")))?;
        let adapter_info = adapter.get_info();
        log::info!("OpenGL adapter: {} ({:?})", adapter_info.name, adapter_info.backend);

        let (device, queue) = adapter
            .request_device(&DeviceDescriptor {
                label: Some("Ember3D Device"),
                required_features: Features::empty(),
                required_limits: Limits::downlevel_webgl2_defaults().using_resolution(adapter.limits()),
                memory_hints: Default::default(),
                trace: Default::default(),
            })
            .await
            .map_err(|e| EngineError::Backend(format!("request_device failed: {e}")))?;

        let max_texture_dimension = config
            .renderer_device
            .max_texture_dimension
            .min(device.limits().max_texture_dimension_2d);

        // ==== Shaders ====
        let shader = device.create_shader_module(ShaderModuleDescriptor {
            label: Some("Mesh WGSL"),
            source: ShaderSource::Wgsl(include_str!("shaders/mesh.wgsl").into()),
        });

        // ==== Draw BGL: uniforms + diffuse texture + sampler ====
        let draw_bgl = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("Draw BGL"),
            entries: &[
                BindGroupLayoutEntry {
                    binding: 0,
                    visibility: ShaderStages::VERTEX | ShaderStages::FRAGMENT,
                    ty: BindingType::Buffer {
                        ty: BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                BindGroupLayoutEntry {
                    binding: 1,
                    visibility: ShaderStages::FRAGMENT,
                    ty: BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                BindGroupLayoutEntry {
                    binding: 2,
                    visibility: ShaderStages::FRAGMENT,
                    ty: BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        // ==== Pipeline ====
        let pipeline_layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
            label: Some("Mesh PipelineLayout"),
            bind_group_layouts: &[&draw_bgl],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_render_pipeline(&RenderPipelineDescriptor {
            label: Some("Mesh Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[GpuVertex::LAYOUT],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(ColorTargetState {
                    format: COLOR_FORMAT,
                    blend: Some(BlendState::ALPHA_BLENDING),
                    write_mask: ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState {
                cull_mode: Some(wgpu::Face::Back),
                ..Default::default()
            },
            depth_stencil: Some(DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::LessEqual,
                stencil: wgpu::StencilState::default(),
                bias: DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Diffuse Sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        // 1x1 white used when a draw has no texture.
        let white = device.create_texture_with_data(
            &queue,
            &texture_descriptor("White", 1, 1, 1),
            wgpu::util::TextureDataOrder::LayerMajor,
            &[255, 255, 255, 255],
        );
        let white_view = white.create_view(&TextureViewDescriptor::default());

        let (sky_pipeline, sky_bgl) = create_sky_pipeline(&device);
        let sky_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Sky Sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let targets = create_targets(&device, width, height);
        let [r, g, b, a] = config.viewport.clear_color;
        let backend_id = next_backend_id();
        log::debug!("OpenGL renderer backend id {backend_id}, texture limit {max_texture_dimension}");

        Ok(Self {
            source,
            backend_id,
            device,
            queue,
            adapter_info,
            pipeline,
            draw_bgl,
            sampler,
            white,
            white_view,
            sky_pipeline,
            sky_bgl,
            sky_sampler,
            environment: None,
            sky_inv_view_proj: Mat4::IDENTITY,
            targets,
            width,
            height,
            clear_color: wgpu::Color { r, g, b, a },
            max_texture_dimension,
            textures: ResourceArena::new(backend_id),
            meshes: ResourceArena::new(backend_id),
            frame: FrameRecorder::new(config.performance.max_draws_per_frame),
            pending: Vec::new(),
            view_projection: Mat4::IDENTITY,
            _not_send: PhantomData,
        })
    }

    #[inline]
    pub fn backend_id(&self) -> u32 {
        self.backend_id
    }

    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.adapter_info
    }

    /// Offscreen colour target the frame is rendered into.
    pub fn color_target(&self) -> &Texture {
        &self.targets.color
    }

    /// Create a texture and write `layers` into it inside a validation scope.
    /// On any validation error the texture is destroyed and nothing is returned.
    fn upload_layers(&self, label: &str, size: u32, layers: &[PixelBuffer]) -> EngineResult<Texture> {
        let width = layers.first().map_or(size, PixelBuffer::width);
        let height = layers.first().map_or(size, PixelBuffer::height);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let texture = self.device.create_texture(&texture_descriptor(
            label,
            width,
            height,
            layers.len() as u32,
        ));
        for (layer, pixels) in layers.iter().enumerate() {
            let rgba = pixels.to_rgba8();
            self.queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d {
                        x: 0,
                        y: 0,
                        z: layer as u32,
                    },
                    aspect: wgpu::TextureAspect::All,
                },
                &rgba,
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(4 * pixels.width()),
                    rows_per_image: Some(pixels.height()),
                },
                Extent3d {
                    width: pixels.width(),
                    height: pixels.height(),
                    depth_or_array_layers: 1,
                },
            );
        }
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            texture.destroy();
            log::error!("Upload of '{label}' failed validation: {err}");
            return Err(EngineError::Backend(format!("texture upload '{label}' failed: {err}")));
        }
        Ok(texture)
    }

    fn release_texture(texture: GpuTexture) {
        texture.texture.destroy();
    }

    fn release_mesh(mesh: GpuMesh) {
        mesh.vertex_buf.destroy();
        mesh.index_buf.destroy();
    }
}

impl Renderer for OpenGlRenderer {
    fn backend_name(&self) -> &'static str {
        "opengl"
    }

    fn asset_source(&self) -> &dyn AssetSource {
        self.source.as_ref()
    }

    fn upload_texture(&mut self, pixels: &PixelBuffer, label: &str) -> EngineResult<TextureHandle> {
        check_texture_size(pixels.width(), pixels.height(), self.max_texture_dimension, label)?;
        let texture = self.upload_layers(label, pixels.width(), std::slice::from_ref(pixels))?;
        let view = texture.create_view(&TextureViewDescriptor::default());
        let info = TextureInfo {
            width: pixels.width(),
            height: pixels.height(),
            layers: 1,
            format: pixels.format(),
            label: label.to_owned(),
        };
        let handle = self.textures.insert(GpuTexture { texture, view, info });
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
        let texture = self.upload_layers(label, size, faces.faces())?;
        let view = texture.create_view(&TextureViewDescriptor {
            label: Some(label),
            dimension: Some(TextureViewDimension::Cube),
            array_layer_count: Some(6),
            ..Default::default()
        });
        let info = TextureInfo {
            width: size,
            height: size,
            layers: faces.faces().len() as u32,
            format: faces.faces()[0].format(),
            label: label.to_owned(),
        };
        let handle = self.textures.insert(GpuTexture { texture, view, info });
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
        let vertices = expand_vertices(mesh);
        let vertex_buf = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(&vertices),
            usage: BufferUsages::VERTEX,
        });
        let index_buf = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(&mesh.indices),
            usage: BufferUsages::INDEX,
        });
        let handle = self.meshes.insert(GpuMesh {
            vertex_buf,
            index_buf,
            index_count: mesh.indices.len() as u32,
            info: MeshInfo::describe(mesh, label),
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
        let texture = self.textures.remove(handle)?;
        if self.environment == Some(handle) {
            self.environment = None;
        }
        log::debug!("Destroyed texture '{}' {}", texture.info.label, handle);
        Self::release_texture(texture);
        Ok(())
    }

    fn destroy_mesh(&mut self, handle: MeshHandle) -> EngineResult<()> {
        let mesh = self.meshes.remove(handle)?;
        log::debug!("Destroyed mesh '{}' {}", mesh.info.label, handle);
        Self::release_mesh(mesh);
        Ok(())
    }

    /// Resize: recreate the offscreen colour & depth targets.
    fn resize(&mut self, width: u32, height: u32) {
        self.width = width.max(1);
        self.height = height.max(1);
        self.targets.destroy();
        self.targets = create_targets(&self.device, self.width, self.height);
    }

    fn begin_frame(&mut self, camera: &Camera3D) -> EngineResult<()> {
        let aspect = self.width as f32 / self.height as f32;
        let view_projection = camera.view_projection(aspect)?;
        let mut rotation = camera.view()?;
        rotation.w_axis = Vec4::W;
        self.frame.begin()?;
        self.view_projection = view_projection;
        self.sky_inv_view_proj = (camera.projection(aspect) * rotation).inverse();
        self.pending.clear();
        Ok(())
    }

    fn draw_mesh(
        &mut self,
        mesh: MeshHandle,
        texture: Option<TextureHandle>,
        transform: &Transform,
    ) -> EngineResult<()> {
        let triangles = self.meshes.get(mesh)?.info.index_count as usize / 3;
        if let Some(texture) = texture {
            if self.textures.get(texture)?.info.is_cubemap() {
                return Err(EngineError::InvalidHandle {
                    handle: texture.to_string(),
                    reason: "cubemap bound as a 2D diffuse texture".into(),
                });
            }
        }
        if self.frame.record(triangles)? {
            self.pending.push(PendingDraw {
                mesh,
                texture,
                triangles: triangles as u64,
                model: transform.matrix(),
                normal_matrix: transform.normal_matrix(),
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

    /// Render every queued draw: clear, one indexed draw per mesh, then the
    /// environment behind them.
    fn end_frame(&mut self) -> EngineResult<FrameStats> {
        let mut stats = self.frame.end()?;
        let draws = std::mem::take(&mut self.pending);

        let mut prepared = Vec::with_capacity(draws.len());
        for draw in &draws {
            let view = match draw.texture {
                Some(texture) => self.textures.get(texture).ok().map(|t| &t.view),
                None => Some(&self.white_view),
            };
            let Some((mesh, view)) = self.meshes.get(draw.mesh).ok().zip(view) else {
                log::warn!("Skipping draw of {}: destroyed before end_frame", draw.mesh);
                stats.discard_stale(draw.triangles);
                continue;
            };
            let uniforms = DrawUniforms {
                model: draw.model.to_cols_array_2d(),
                view_proj: self.view_projection.to_cols_array_2d(),
                normal_matrix: draw.normal_matrix.to_cols_array_2d(),
            };
            let ubo = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Draw UBO"),
                contents: bytemuck::bytes_of(&uniforms),
                usage: BufferUsages::UNIFORM,
            });
            let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Draw BG"),
                layout: &self.draw_bgl,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: ubo.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::Sampler(&self.sampler),
                    },
                ],
            });
            prepared.push((mesh, ubo, bind_group));
        }

        let sky = match self.environment.map(|h| self.textures.get(h)) {
            Some(Ok(cubemap)) => {
                let uniforms = SkyUniforms {
                    inv_view_proj: self.sky_inv_view_proj.to_cols_array_2d(),
                };
                let ubo = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("Sky UBO"),
                    contents: bytemuck::bytes_of(&uniforms),
                    usage: BufferUsages::UNIFORM,
                });
                let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("Sky BG"),
                    layout: &self.sky_bgl,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: ubo.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: wgpu::BindingResource::TextureView(&cubemap.view),
                        },
                        wgpu::BindGroupEntry {
                            binding: 2,
                            resource: wgpu::BindingResource::Sampler(&self.sky_sampler),
                        },
                    ],
                });
                Some((ubo, bind_group))
            }
            _ => None,
        };
        stats.environment_drawn = sky.is_some();

        let mut encoder = self.device.create_command_encoder(&CommandEncoderDescriptor {
            label: Some("MainEncoder"),
        });
        {
            let mut rpass = encoder.begin_render_pass(&RenderPassDescriptor {
                label: Some("MainPass"),
                color_attachments: &[Some(RenderPassColorAttachment {
                    view: &self.targets.color_view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: Operations {
                        load: LoadOp::Clear(self.clear_color),
                        store: StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.targets.depth_view,
                    depth_ops: Some(Operations {
                        load: LoadOp::Clear(1.0),
                        store: StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
            });

            rpass.set_pipeline(&self.pipeline);
            for (mesh, _, bind_group) in &prepared {
                rpass.set_bind_group(0, bind_group, &[]);
                rpass.set_vertex_buffer(0, mesh.vertex_buf.slice(..));
                rpass.set_index_buffer(mesh.index_buf.slice(..), wgpu::IndexFormat::Uint32);
                rpass.draw_indexed(0..mesh.index_count, 0, 0..1);
            }
            if let Some((_, bind_group)) = &sky {
                rpass.set_pipeline(&self.sky_pipeline);
                rpass.set_bind_group(0, bind_group, &[]);
                rpass.draw(0..3, 0..1);
            }
        }
        self.queue.submit(Some(encoder.finish()));
        drop(prepared);
        drop(sky);

        log::trace!(
            "Frame {}: {} draws, {} triangles",
            stats.frame_index,
            stats.draw_calls,
            stats.triangles
        );
        Ok(stats)
    }

    fn cleanup(&mut self) {
        let textures = self.textures.drain();
        let meshes = self.meshes.drain();
        let (t, m) = (textures.len(), meshes.len());
        textures.into_iter().for_each(Self::release_texture);
        meshes.into_iter().for_each(Self::release_mesh);
        self.pending.clear();
        self.environment = None;
        self.frame.abort();
        if t + m > 0 {
            log::info!("OpenGL cleanup released {t} textures and {m} meshes");
        }
    }
}

impl Drop for OpenGlRenderer {
    fn drop(&mut self) {
        self.cleanup();
        self.targets.destroy();
        self.white.destroy();
    }
}

fn texture_descriptor(label: &str, width: u32, height: u32, layers: u32) -> TextureDescriptor<'_> {
    TextureDescriptor {
        label: Some(label),
        size: Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: layers.max(1),
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: TextureDimension::D2,
        format: TEXTURE_FORMAT,
        usage: TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_DST,
        view_formats: &[],
    }
}

/// Environment pipeline: fullscreen triangle at depth 1.0, tested LEQUAL
/// without depth writes so it only fills pixels no mesh covered.
fn create_sky_pipeline(device: &Device) -> (RenderPipeline, BindGroupLayout) {
    let shader = device.create_shader_module(ShaderModuleDescriptor {
        label: Some("Skybox WGSL"),
        source: ShaderSource::Wgsl(include_str!("shaders/skybox.wgsl").into()),
    });
    let bgl = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
        label: Some("Sky BGL"),
        entries: &[
            BindGroupLayoutEntry {
                binding: 0,
                visibility: ShaderStages::FRAGMENT,
                ty: BindingType::Buffer {
                    ty: BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
            BindGroupLayoutEntry {
                binding: 1,
                visibility: ShaderStages::FRAGMENT,
                ty: BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: TextureViewDimension::Cube,
                    multisampled: false,
                },
                count: None,
            },
            BindGroupLayoutEntry {
                binding: 2,
                visibility: ShaderStages::FRAGMENT,
                ty: BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
        ],
    });
    let layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
        label: Some("Sky PipelineLayout"),
        bind_group_layouts: &[&bgl],
        push_constant_ranges: &[],
    });
    let pipeline = device.create_render_pipeline(&RenderPipelineDescriptor {
        label: Some("Sky Pipeline"),
        layout: Some(&layout),
        vertex: VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            buffers: &[],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        fragment: Some(FragmentState {
            module: &shader,
            entry_point: Some("fs_main"),
            targets: &[Some(ColorTargetState {
                format: COLOR_FORMAT,
                blend: None,
                write_mask: ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        primitive: wgpu::PrimitiveState::default(),
        depth_stencil: Some(DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: false,
            depth_compare: wgpu::CompareFunction::LessEqual,
            stencil: wgpu::StencilState::default(),
            bias: DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    });
    (pipeline, bgl)
}

/// Create the offscreen colour and depth targets.
fn create_targets(device: &Device, width: u32, height: u32) -> RenderTargets {
    let size = Extent3d {
        width: width.max(1),
        height: height.max(1),
        depth_or_array_layers: 1,
    };
    let color = device.create_texture(&TextureDescriptor {
        label: Some("ColorTarget"),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: TextureDimension::D2,
        format: COLOR_FORMAT,
        usage: TextureUsages::RENDER_ATTACHMENT | TextureUsages::COPY_SRC,
        view_formats: &[],
    });
    let depth = device.create_texture(&TextureDescriptor {
        label: Some("DepthTex"),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    RenderTargets {
        color_view: color.create_view(&TextureViewDescriptor::default()),
        depth_view: depth.create_view(&TextureViewDescriptor::default()),
        color,
        depth,
    }
}

/// Expand a mesh to [`GpuVertex`], filling omitted attributes with neutral defaults.
pub fn expand_vertices(mesh: &MeshData) -> Vec<GpuVertex> {
    let positions = mesh.read(AttributeSemantic::Position);
    let normals = mesh.read(AttributeSemantic::Normal);
    let uvs = mesh.read(AttributeSemantic::TexCoord);
    let colors = mesh.read(AttributeSemantic::Color);
    (0..mesh.vertex_count())
        .map(|i| GpuVertex {
            position: component(&positions, i, [0.0; 3]),
            normal: component(&normals, i, [0.0, 0.0, 1.0]),
            uv: component(&uvs, i, [0.0; 2]),
            color: component(&colors, i, [1.0; 4]),
        })
        .collect()
}

fn component<const N: usize>(stream: &Option<Vec<&[f32]>>, index: usize, default: [f32; N]) -> [f32; N] {
    stream
        .as_ref()
        .and_then(|values| values.get(index))
        .and_then(|value| <[f32; N]>::try_from(*value).ok())
        .unwrap_or(default)
}
