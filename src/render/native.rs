use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use bytemuck::bytes_of;
use log::{debug, info};
use wgpu::util::DeviceExt;
use winit::window::Window;

use super::shared::{GlobalUniform, ObjectConstants, KEY_LIGHT, WGSL_SHADER};
use super::{SceneRenderer, SurfaceFactory};
use crate::camera::{CameraParams, ViewportSize};
use crate::error::RenderError;
use crate::model::{MeshPrimitive, VERTEX_STRIDE};
use crate::scene::Scene;
use crate::xr::XrSession;

/// GPU renderer backed by wgpu that draws the scene into a desktop window.
pub struct WgpuRenderer {
    _window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    viewport: Arc<ViewportSize>,
    depth: DepthBuffer,
    pipeline: wgpu::RenderPipeline,
    global_layout: wgpu::BindGroupLayout,
    object_layout: wgpu::BindGroupLayout,
    mesh_cache: HashMap<(String, usize), MeshBuffers>,
}

impl WgpuRenderer {
    /// Initializes the GPU renderer for the window. `viewport` is read on
    /// every frame and the swap chain follows it.
    pub async fn new(window: Arc<Window>, viewport: Arc<ViewportSize>) -> Result<Self> {
        let (width, height) = viewport.get();

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let surface = instance.create_surface(Arc::clone(&window))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("failed to acquire GPU adapter")?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("viewer-device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: Default::default(),
                trace: wgpu::Trace::Off,
            })
            .await
            .context("failed to create GPU device")?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|format| format.is_srgb())
            .or_else(|| surface_caps.formats.first())
            .copied()
            .ok_or_else(|| anyhow!("surface reports no supported formats"))?;
        let alpha_mode = surface_caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width,
            height,
            present_mode: wgpu::PresentMode::Fifo,
            desired_maximum_frame_latency: 2,
            alpha_mode,
            view_formats: vec![],
        };
        surface.configure(&device, &config);

        let depth = DepthBuffer::create(&device, width, height);

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("viewer-shader"),
            source: wgpu::ShaderSource::Wgsl(WGSL_SHADER.into()),
        });

        let global_layout = uniform_layout::<GlobalUniform>(&device, "global-bind-layout");
        let object_layout = uniform_layout::<ObjectConstants>(&device, "object-bind-layout");

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("viewer-pipeline-layout"),
            bind_group_layouts: &[&global_layout, &object_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("viewer-pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: (VERTEX_STRIDE * std::mem::size_of::<f32>()) as u64,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &[
                        wgpu::VertexAttribute {
                            format: wgpu::VertexFormat::Float32x3,
                            offset: 0,
                            shader_location: 0,
                        },
                        wgpu::VertexAttribute {
                            format: wgpu::VertexFormat::Float32x3,
                            offset: (3 * std::mem::size_of::<f32>()) as u64,
                            shader_location: 1,
                        },
                    ],
                }],
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DepthBuffer::FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: Default::default(),
                bias: Default::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: surface_format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            multiview: None,
            cache: None,
        });

        info!("wgpu renderer ready ({width}x{height}, {surface_format:?})");

        Ok(Self {
            _window: window,
            surface,
            device,
            queue,
            config,
            viewport,
            depth,
            pipeline,
            global_layout,
            object_layout,
            mesh_cache: HashMap::new(),
        })
    }

    fn sync_size(&mut self) {
        let (width, height) = self.viewport.get();
        if width == self.config.width && height == self.config.height {
            return;
        }
        self.reconfigure(width, height);
    }

    fn reconfigure(&mut self, width: u32, height: u32) {
        self.config.width = width.max(1);
        self.config.height = height.max(1);
        self.surface.configure(&self.device, &self.config);
        self.depth = DepthBuffer::create(&self.device, self.config.width, self.config.height);
    }

    fn ensure_uploaded(&mut self, mesh_name: &str, index: usize, primitive: &MeshPrimitive) {
        let key = (mesh_name.to_string(), index);
        if self.mesh_cache.contains_key(&key) {
            return;
        }
        debug!("uploading {mesh_name} primitive {index}");
        let buffers = MeshBuffers::from_primitive(&self.device, primitive, mesh_name);
        self.mesh_cache.insert(key, buffers);
    }
}

impl SceneRenderer for WgpuRenderer {
    fn render(&mut self, scene: &Scene, views: &[CameraParams]) -> Result<(), RenderError> {
        self.sync_size();

        let output = match self.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.reconfigure(self.config.width, self.config.height);
                return Err(RenderError::Surface("surface lost, reconfigured".to_string()));
            }
            Err(err) => return Err(RenderError::Surface(err.to_string())),
        };
        let target = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        for node in scene.nodes() {
            for (index, primitive) in node.mesh.primitives.iter().enumerate() {
                self.ensure_uploaded(&node.mesh.name, index, primitive);
            }
        }

        let view_groups: Vec<wgpu::BindGroup> = views
            .iter()
            .map(|camera| {
                let uniform = GlobalUniform::new(camera, &KEY_LIGHT);
                let buffer = self
                    .device
                    .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some("global-uniform"),
                        contents: bytes_of(&uniform),
                        usage: wgpu::BufferUsages::UNIFORM,
                    });
                self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("global-bind-group"),
                    layout: &self.global_layout,
                    entries: &[wgpu::BindGroupEntry {
                        binding: 0,
                        resource: buffer.as_entire_binding(),
                    }],
                })
            })
            .collect();

        let mut draws = Vec::new();
        for node in scene.nodes() {
            for (index, primitive) in node.mesh.primitives.iter().enumerate() {
                let constants = ObjectConstants::new(node, primitive.base_color);
                let buffer = self
                    .device
                    .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some("object-uniform"),
                        contents: bytes_of(&constants),
                        usage: wgpu::BufferUsages::UNIFORM,
                    });
                let group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("object-bind-group"),
                    layout: &self.object_layout,
                    entries: &[wgpu::BindGroupEntry {
                        binding: 0,
                        resource: buffer.as_entire_binding(),
                    }],
                });
                draws.push(((node.mesh.name.clone(), index), group));
            }
        }

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("viewer-encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("main-pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: 0.03,
                            g: 0.03,
                            b: 0.05,
                            a: 1.0,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            pass.set_pipeline(&self.pipeline);
            for (camera, view_group) in views.iter().zip(&view_groups) {
                if let Some(viewport) = camera.viewport {
                    pass.set_viewport(
                        viewport.x as f32,
                        viewport.y as f32,
                        viewport.width as f32,
                        viewport.height as f32,
                        0.0,
                        1.0,
                    );
                }
                pass.set_bind_group(0, view_group, &[]);
                for (key, object_group) in &draws {
                    let Some(mesh) = self.mesh_cache.get(key) else {
                        continue;
                    };
                    pass.set_vertex_buffer(0, mesh.vertex.slice(..));
                    pass.set_index_buffer(mesh.index.slice(..), wgpu::IndexFormat::Uint32);
                    pass.set_bind_group(1, object_group, &[]);
                    pass.draw_indexed(0..mesh.index_count, 0, 0..1);
                }
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        Ok(())
    }

    fn surface_size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }
}

/// Creates a [`WgpuRenderer`] for the preview window when a session starts.
pub struct WindowSurfaces {
    window: Arc<Window>,
    viewport: Arc<ViewportSize>,
}

impl WindowSurfaces {
    pub fn new(window: Arc<Window>, viewport: Arc<ViewportSize>) -> Self {
        Self { window, viewport }
    }
}

impl<S: XrSession> SurfaceFactory<S> for WindowSurfaces {
    type Renderer = WgpuRenderer;

    async fn create(&self, _session: &S) -> Result<WgpuRenderer, RenderError> {
        WgpuRenderer::new(Arc::clone(&self.window), Arc::clone(&self.viewport))
            .await
            .map_err(|err| RenderError::Surface(format!("{err:#}")))
    }
}

fn uniform_layout<T>(device: &wgpu::Device, label: &str) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: wgpu::BufferSize::new(std::mem::size_of::<T>() as u64),
            },
            count: None,
        }],
    })
}

struct MeshBuffers {
    vertex: wgpu::Buffer,
    index: wgpu::Buffer,
    index_count: u32,
}

impl MeshBuffers {
    fn from_primitive(device: &wgpu::Device, primitive: &MeshPrimitive, label: &str) -> Self {
        let vertex = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}-vertices")),
            contents: bytemuck::cast_slice(&primitive.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}-indices")),
            contents: bytemuck::cast_slice(&primitive.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Self {
            vertex,
            index,
            index_count: primitive.indices.len() as u32,
        }
    }
}

struct DepthBuffer {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl DepthBuffer {
    const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24Plus;

    fn create(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("depth-texture"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            _texture: texture,
            view,
        }
    }
}
