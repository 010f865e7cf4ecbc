//! wgpu Renderer
//!
//! Presents the CPU canvas in the window. The canvas is uploaded into an
//! sRGB texture whenever it changes and blitted as a letterboxed quad that
//! keeps the canvas aspect ratio.

use anyhow::{Context, Result};
use image::RgbaImage;
use wgpu::util::DeviceExt;

const CANVAS_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

/// Uniforms for blit shader (quad scale in clip space)
#[repr(C, align(16))]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct BlitUniforms {
    scale: [f32; 2],
    _padding: [f32; 2],
}

/// Where the canvas lands inside the surface, in surface pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    /// Largest centered rectangle with the canvas aspect ratio
    pub fn fit(canvas: (u32, u32), surface: (u32, u32)) -> Self {
        let (cw, ch) = (canvas.0.max(1) as f32, canvas.1.max(1) as f32);
        let (sw, sh) = (surface.0 as f32, surface.1 as f32);
        let scale = (sw / cw).min(sh / ch);
        let (width, height) = (cw * scale, ch * scale);
        Self {
            x: (sw - width) * 0.5,
            y: (sh - height) * 0.5,
            width,
            height,
        }
    }

    /// Map a surface position to canvas pixel coordinates
    ///
    /// Positions outside the viewport map outside the canvas; drawing there is clipped.
    pub fn to_canvas(&self, canvas: (u32, u32), position: [f64; 2]) -> [f32; 2] {
        if self.width <= 0.0 || self.height <= 0.0 {
            return [position[0] as f32, position[1] as f32];
        }
        [
            (position[0] as f32 - self.x) * canvas.0 as f32 / self.width,
            (position[1] as f32 - self.y) * canvas.1 as f32 / self.height,
        ]
    }

    fn clip_scale(&self, surface: (u32, u32)) -> [f32; 2] {
        if surface.0 == 0 || surface.1 == 0 {
            return [1.0, 1.0];
        }
        [self.width / surface.0 as f32, self.height / surface.1 as f32]
    }
}

/// Renderer wraps the wgpu device, queue, and surface
pub struct Renderer {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    max_texture_dimension: u32,

    // Canvas texture mirroring the CPU raster
    canvas_texture: wgpu::Texture,
    canvas_size: (u32, u32),

    // Blit pipeline for copying canvas to surface
    blit_pipeline: wgpu::RenderPipeline,
    blit_uniform_buffer: wgpu::Buffer,
    blit_bind_group: wgpu::BindGroup,
}

impl Renderer {
    /// Create a new renderer
    ///
    /// # Arguments
    /// * `window` - The window to render to
    /// * `size` - Initial surface size
    /// * `canvas_size` - Dimensions of the canvas raster to present
    pub async fn new(
        window: impl Into<wgpu::SurfaceTarget<'static>>,
        size: winit::dpi::PhysicalSize<u32>,
        canvas_size: (u32, u32),
    ) -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all() & !wgpu::Backends::BROWSER_WEBGPU,
            ..Default::default()
        });

        let surface = instance.create_surface(window).context("Failed to create surface")?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("Failed to find suitable adapter")?;

        let adapter_info = adapter.get_info();
        log::info!("Adapter acquired: {:?} (backend: {:?})", adapter_info.name, adapter_info.backend);

        let adapter_limits = adapter.limits();
        let max_texture_dimension = adapter_limits.max_texture_dimension_2d;
        if canvas_size.0 > max_texture_dimension || canvas_size.1 > max_texture_dimension {
            anyhow::bail!(
                "canvas {}x{} exceeds max texture size {}",
                canvas_size.0,
                canvas_size.1,
                max_texture_dimension
            );
        }

        let mut device_limits = wgpu::Limits::default();
        device_limits.max_texture_dimension_2d = adapter_limits.max_texture_dimension_2d;
        device_limits.max_texture_dimension_1d = adapter_limits.max_texture_dimension_1d;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Sketch Loop Device"),
                required_features: wgpu::Features::empty(),
                required_limits: device_limits,
                memory_hints: Default::default(),
                trace: Default::default(),
                experimental_features: Default::default(),
            })
            .await
            .context("Failed to create device")?;

        let surface_caps = surface.get_capabilities(&adapter);
        log::debug!(
            "Surface capabilities: formats={:?}, present_modes={:?}",
            surface_caps.formats,
            surface_caps.present_modes
        );

        // Prefer an sRGB surface so the sRGB canvas texture round-trips unchanged
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .context("Surface reports no formats")?;
        let present_mode = surface_caps
            .present_modes
            .first()
            .copied()
            .unwrap_or(wgpu::PresentMode::Fifo);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.min(max_texture_dimension),
            height: size.height.min(max_texture_dimension),
            present_mode,
            alpha_mode: wgpu::CompositeAlphaMode::Opaque,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };

        // Only configure if size is valid, otherwise wait for resize
        if config.width > 0 && config.height > 0 {
            surface.configure(&device, &config);
        } else {
            log::warn!("Skipping surface configuration (invalid size: {}x{})", config.width, config.height);
        }

        let (canvas_texture, canvas_view) = Self::create_canvas_texture(&device, canvas_size.0, canvas_size.1);

        let (blit_pipeline, blit_bind_group_layout) = Self::create_blit_pipeline(&device, surface_format);

        let canvas_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Canvas Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let blit_uniforms = BlitUniforms {
            scale: Viewport::fit(canvas_size, (config.width, config.height)).clip_scale((config.width, config.height)),
            _padding: [0.0; 2],
        };
        let blit_uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Blit Uniform Buffer"),
            contents: bytemuck::cast_slice(&[blit_uniforms]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let blit_bind_group = Self::create_blit_bind_group(
            &device,
            &blit_bind_group_layout,
            &canvas_view,
            &canvas_sampler,
            &blit_uniform_buffer,
        );

        log::info!(
            "Renderer initialized: surface {}x{} {:?}, canvas {}x{}",
            size.width,
            size.height,
            surface_format,
            canvas_size.0,
            canvas_size.1
        );

        Ok(Self {
            surface,
            device,
            queue,
            config,
            max_texture_dimension,
            canvas_texture,
            canvas_size,
            blit_pipeline,
            blit_uniform_buffer,
            blit_bind_group,
        })
    }

    fn create_canvas_texture(device: &wgpu::Device, width: u32, height: u32) -> (wgpu::Texture, wgpu::TextureView) {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Canvas Texture"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: CANVAS_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        (texture, view)
    }

    fn create_blit_bind_group(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        canvas_view: &wgpu::TextureView,
        sampler: &wgpu::Sampler,
        uniforms: &wgpu::Buffer,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Blit Bind Group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(canvas_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: uniforms.as_entire_binding(),
                },
            ],
        })
    }

    /// Create the blit pipeline for copying canvas to surface
    fn create_blit_pipeline(
        device: &wgpu::Device,
        target_format: wgpu::TextureFormat,
    ) -> (wgpu::RenderPipeline, wgpu::BindGroupLayout) {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Blit Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/blit.wgsl").into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Blit Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Blit Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Blit Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: target_format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        (pipeline, bind_group_layout)
    }

    /// Copy the canvas raster into the presentation texture
    pub fn upload_canvas(&mut self, image: &RgbaImage) {
        let (width, height) = image.dimensions();
        // the canvas keeps its background dimensions for the whole session
        if (width, height) != self.canvas_size {
            log::error!(
                "Canvas {}x{} does not match texture {}x{}, upload skipped",
                width,
                height,
                self.canvas_size.0,
                self.canvas_size.1
            );
            return;
        }

        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.canvas_texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            image.as_raw(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * width),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
    }

    /// Resize the surface
    pub fn resize(&mut self, new_size: winit::dpi::PhysicalSize<u32>) {
        if new_size.width == 0 || new_size.height == 0 {
            return;
        }

        let clamped_width = new_size.width.min(self.max_texture_dimension);
        let clamped_height = new_size.height.min(self.max_texture_dimension);
        if clamped_width != new_size.width || clamped_height != new_size.height {
            log::warn!(
                "Resize {}x{} exceeds max texture size {}, clamping to {}x{}",
                new_size.width,
                new_size.height,
                self.max_texture_dimension,
                clamped_width,
                clamped_height
            );
        }

        self.config.width = clamped_width;
        self.config.height = clamped_height;
        self.surface.configure(&self.device, &self.config);
        self.write_blit_uniforms();

        log::debug!("Surface resized to: {}x{}", clamped_width, clamped_height);
    }

    fn write_blit_uniforms(&self) {
        let surface = (self.config.width, self.config.height);
        let blit_uniforms = BlitUniforms {
            scale: Viewport::fit(self.canvas_size, surface).clip_scale(surface),
            _padding: [0.0; 2],
        };
        self.queue
            .write_buffer(&self.blit_uniform_buffer, 0, bytemuck::cast_slice(&[blit_uniforms]));
    }

    /// Render a frame (blit canvas to surface)
    pub fn render(&mut self) {
        if self.config.width == 0 || self.config.height == 0 {
            return;
        }

        let output = match self.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                log::debug!("Surface lost or outdated, reconfiguring");
                self.surface.configure(&self.device, &self.config);
                return;
            }
            Err(e) => {
                log::error!("Failed to get surface texture: {:?}", e);
                return;
            }
        };

        let view = output.texture.create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Render Encoder"),
        });

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Blit Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            render_pass.set_pipeline(&self.blit_pipeline);
            render_pass.set_bind_group(0, &self.blit_bind_group, &[]);
            render_pass.draw(0..6, 0..1);
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();
    }

    /// Canvas placement for the current surface
    pub fn viewport(&self) -> Viewport {
        Viewport::fit(self.canvas_size, (self.config.width, self.config.height))
    }
}
