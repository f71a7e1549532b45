use std::{collections::HashMap, mem, process, sync::Arc};

use bytemuck::NoUninit;
use wgpu::{
    Backends, BindGroup, BindGroupDescriptor, BindGroupEntry, BindGroupLayout,
    BindGroupLayoutDescriptor, BindGroupLayoutEntry, BindingResource, BindingType, BlendComponent,
    BlendFactor, BlendOperation, BlendState, Buffer, BufferBindingType, BufferDescriptor,
    BufferUsages, Color, ColorTargetState, ColorWrites, CommandEncoder, Device, DeviceDescriptor,
    Extent3d, FragmentState, InstanceDescriptor, LoadOp, MemoryHints, MultisampleState,
    Operations, PipelineCompilationOptions, PipelineLayout, PipelineLayoutDescriptor,
    PrimitiveState, PrimitiveTopology, Queue, RenderPass, RenderPassColorAttachment,
    RenderPassDescriptor, RenderPipeline, RenderPipelineDescriptor, RequestAdapterOptions,
    ShaderModule, ShaderModuleDescriptor, ShaderSource, ShaderStages, StoreOp, Surface,
    SurfaceConfiguration, SurfaceError, SurfaceTarget, TextureDescriptor, TextureDimension,
    TextureFormat, TextureSampleType, TextureUsages, TextureView, TextureViewDimension,
    VertexState,
};
use winit::{
    application::ApplicationHandler,
    event::{ElementState, MouseButton, Touch, WindowEvent},
    event_loop::ActiveEventLoop,
    keyboard::{Key, ModifiersState},
    window::{Window, WindowId},
};

use crate::{
    cmd::{Cmd, Controls, Pointer},
    config::{Chord, CommandVerb, Config},
    drawing::Drawing,
    math::{vec2, Vec2u},
    observe::Subscription,
    render::{Dab, Frame, Layer},
    style,
};

/// Canvas color behind all strokes.
const BACKGROUND: style::Color = style::Color::WHITE;
/// Format of the per-stroke coverage targets. Only the red channel is used.
const COVERAGE_FORMAT: TextureFormat = TextureFormat::R16Float;
/// Keeps the highest coverage written to a pixel instead of adding it up.
const MAX_BLENDING: BlendState = BlendState {
    color: BlendComponent {
        src_factor: BlendFactor::One,
        dst_factor: BlendFactor::One,
        operation: BlendOperation::Max,
    },
    alpha: BlendComponent {
        src_factor: BlendFactor::One,
        dst_factor: BlendFactor::One,
        operation: BlendOperation::Max,
    },
};

pub struct App {
    instance: wgpu::Instance,
    win: Option<Win>,

    drawing: Drawing,
    controls: Controls,
    bindings: HashMap<Chord, CommandVerb>,

    modifiers: ModifiersState,
    pointer: Pointer,
}

struct Gpu {
    device: Device,
    queue: Queue,

    dab_pipeline: RenderPipeline,
    blur_horizontal_pipeline: RenderPipeline,
    blur_vertical_pipeline: RenderPipeline,
    composite_pipeline: RenderPipeline,

    uniform_buf: Buffer,
    uniforms_bg: BindGroup,
    frame_bgl: BindGroupLayout,
    dab_buf: Buffer,
    layer_buf: Buffer,
    frame_bg: BindGroup,
    source_bgl: BindGroupLayout,
    /// Reused between frames to avoid reallocating.
    frame: Frame,
}

impl Gpu {
    fn new(
        instance: &wgpu::Instance,
        surface: &Surface<'_>,
    ) -> anyhow::Result<(Self, SurfaceConfiguration)> {
        let adapter = pollster::block_on(instance.request_adapter(&RequestAdapterOptions {
            compatible_surface: Some(surface),
            ..Default::default()
        }))?;
        let info = adapter.get_info();
        log::info!("using adapter '{}' ({:?})", info.name, info.backend);

        let (device, queue) = pollster::block_on(adapter.request_device(&DeviceDescriptor {
            memory_hints: MemoryHints::MemoryUsage,
            ..Default::default()
        }))?;

        // Colors are given in sRGB, so skip the hardware conversion and write them unchanged.
        let caps = surface.get_capabilities(&adapter);
        let Some(&format) = caps
            .formats
            .iter()
            .find(|f| !f.is_srgb())
            .or(caps.formats.first())
        else {
            anyhow::bail!("surface is not supported by the graphics adapter");
        };
        let Some(mut config) = surface.get_default_config(&adapter, 1, 1) else {
            anyhow::bail!("surface is not supported by the graphics adapter");
        };
        config.format = format;

        let shader = device.create_shader_module(ShaderModuleDescriptor {
            label: Some("shader"),
            source: ShaderSource::Wgsl(include_str!("shader.wgsl").into()),
        });

        // BGLs
        let uniforms_bgl = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("uniforms"),
            entries: &[BindGroupLayoutEntry {
                binding: 0,
                count: None,
                visibility: ShaderStages::VERTEX,
                ty: BindingType::Buffer {
                    ty: BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
            }],
        });
        let storage_entry = |binding| BindGroupLayoutEntry {
            binding,
            count: None,
            visibility: ShaderStages::VERTEX_FRAGMENT,
            ty: BindingType::Buffer {
                ty: BufferBindingType::Storage { read_only: true },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
        };
        let frame_bgl = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("frame"),
            entries: &[storage_entry(0), storage_entry(1)],
        });
        let source_bgl = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("source"),
            entries: &[BindGroupLayoutEntry {
                binding: 0,
                count: None,
                visibility: ShaderStages::FRAGMENT,
                ty: BindingType::Texture {
                    sample_type: TextureSampleType::Float { filterable: false },
                    view_dimension: TextureViewDimension::D2,
                    multisampled: false,
                },
            }],
        });

        let dab_layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
            label: Some("dab_pipeline"),
            bind_group_layouts: &[&uniforms_bgl, &frame_bgl],
            ..Default::default()
        });
        let layer_layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
            label: Some("layer_pipeline"),
            bind_group_layouts: &[&uniforms_bgl, &frame_bgl, &source_bgl],
            ..Default::default()
        });
        let pipeline = PipelineBuilder {
            device: &device,
            shader: &shader,
        };
        let dab_pipeline = pipeline.build(
            &dab_layout,
            ("dab_vertex", "dab_coverage"),
            PrimitiveTopology::TriangleStrip,
            COVERAGE_FORMAT,
            Some(MAX_BLENDING),
        );
        let blur_horizontal_pipeline = pipeline.build(
            &layer_layout,
            ("layer_vertex", "blur_horizontal"),
            PrimitiveTopology::TriangleList,
            COVERAGE_FORMAT,
            None,
        );
        let blur_vertical_pipeline = pipeline.build(
            &layer_layout,
            ("layer_vertex", "blur_vertical"),
            PrimitiveTopology::TriangleList,
            COVERAGE_FORMAT,
            None,
        );
        let composite_pipeline = pipeline.build(
            &layer_layout,
            ("layer_vertex", "composite"),
            PrimitiveTopology::TriangleList,
            format,
            Some(BlendState::PREMULTIPLIED_ALPHA_BLENDING),
        );

        let uniform_buf = device.create_buffer(&BufferDescriptor {
            label: Some("uniforms"),
            size: mem::size_of::<Uniforms>() as u64,
            usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let uniforms_bg = device.create_bind_group(&BindGroupDescriptor {
            label: Some("uniforms"),
            layout: &uniforms_bgl,
            entries: &[BindGroupEntry {
                binding: 0,
                resource: BindingResource::Buffer(uniform_buf.as_entire_buffer_binding()),
            }],
        });
        // 1 element preallocated, storage bindings can't be empty.
        let dab_buf = create_storage_buffer(&device, "dabs", mem::size_of::<Dab>());
        let layer_buf = create_storage_buffer(&device, "layers", mem::size_of::<Layer>());
        let frame_bg = create_frame_bind_group(&device, &frame_bgl, &dab_buf, &layer_buf);

        let gpu = Gpu {
            device,
            queue,
            dab_pipeline,
            blur_horizontal_pipeline,
            blur_vertical_pipeline,
            composite_pipeline,
            uniform_buf,
            uniforms_bg,
            frame_bgl,
            dab_buf,
            layer_buf,
            frame_bg,
            source_bgl,
            frame: Frame::default(),
        };
        Ok((gpu, config))
    }

    /// Uploads `self.frame`, growing the storage buffers when it doesn't fit.
    fn upload_frame(&mut self) {
        let dabs: &[u8] = bytemuck::cast_slice(&self.frame.dabs);
        let layers: &[u8] = bytemuck::cast_slice(&self.frame.layers);

        let mut grown = false;
        for (buf, data, label) in [
            (&mut self.dab_buf, dabs, "dabs"),
            (&mut self.layer_buf, layers, "layers"),
        ] {
            if buf.size() < data.len() as u64 {
                *buf = create_storage_buffer(&self.device, label, data.len().next_power_of_two());
                grown = true;
            }
            if !data.is_empty() {
                self.queue.write_buffer(buf, 0, data);
            }
        }
        if grown {
            self.frame_bg = create_frame_bind_group(
                &self.device,
                &self.frame_bgl,
                &self.dab_buf,
                &self.layer_buf,
            );
        }
    }
}

struct PipelineBuilder<'a> {
    device: &'a Device,
    shader: &'a ShaderModule,
}

impl PipelineBuilder<'_> {
    fn build(
        &self,
        layout: &PipelineLayout,
        (vertex, fragment): (&str, &str),
        topology: PrimitiveTopology,
        format: TextureFormat,
        blend: Option<BlendState>,
    ) -> RenderPipeline {
        self.device
            .create_render_pipeline(&RenderPipelineDescriptor {
                label: Some(fragment),
                layout: Some(layout),
                vertex: VertexState {
                    module: self.shader,
                    entry_point: Some(vertex),
                    compilation_options: PipelineCompilationOptions::default(),
                    buffers: &[],
                },
                primitive: PrimitiveState {
                    topology,
                    ..Default::default()
                },
                depth_stencil: None,
                multisample: MultisampleState::default(),
                fragment: Some(FragmentState {
                    module: self.shader,
                    entry_point: Some(fragment),
                    compilation_options: PipelineCompilationOptions::default(),
                    targets: &[Some(ColorTargetState {
                        format,
                        blend,
                        write_mask: ColorWrites::all(),
                    })],
                }),
                multiview: None,
                cache: None,
            })
    }
}

fn create_storage_buffer(device: &Device, label: &str, size: usize) -> Buffer {
    device.create_buffer(&BufferDescriptor {
        label: Some(label),
        size: size as u64,
        usage: BufferUsages::STORAGE | BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

fn create_frame_bind_group(
    device: &Device,
    layout: &BindGroupLayout,
    dab_buf: &Buffer,
    layer_buf: &Buffer,
) -> BindGroup {
    device.create_bind_group(&BindGroupDescriptor {
        label: Some("frame"),
        layout,
        entries: &[
            BindGroupEntry {
                binding: 0,
                resource: BindingResource::Buffer(dab_buf.as_entire_buffer_binding()),
            },
            BindGroupEntry {
                binding: 1,
                resource: BindingResource::Buffer(layer_buf.as_entire_buffer_binding()),
            },
        ],
    })
}

/// Two window-sized coverage textures. A stroke's dabs go into `coverage`; the horizontal blur
/// reads `coverage` into `scratch` and the vertical blur reads `scratch` back into `coverage`.
struct CoverageTargets {
    coverage: TextureView,
    scratch: TextureView,
    /// Binds `coverage` as the source texture.
    coverage_bg: BindGroup,
    /// Binds `scratch` as the source texture.
    scratch_bg: BindGroup,
}

impl CoverageTargets {
    fn new(gpu: &Gpu, width: u32, height: u32) -> Self {
        let target = |label| {
            let view = gpu
                .device
                .create_texture(&TextureDescriptor {
                    label: Some(label),
                    size: Extent3d {
                        width,
                        height,
                        depth_or_array_layers: 1,
                    },
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: TextureDimension::D2,
                    format: COVERAGE_FORMAT,
                    usage: TextureUsages::RENDER_ATTACHMENT | TextureUsages::TEXTURE_BINDING,
                    view_formats: &[],
                })
                .create_view(&Default::default());
            let bg = gpu.device.create_bind_group(&BindGroupDescriptor {
                label: Some(label),
                layout: &gpu.source_bgl,
                entries: &[BindGroupEntry {
                    binding: 0,
                    resource: BindingResource::TextureView(&view),
                }],
            });
            (view, bg)
        };
        let (coverage, coverage_bg) = target("coverage");
        let (scratch, scratch_bg) = target("scratch");
        Self {
            coverage,
            scratch,
            coverage_bg,
            scratch_bg,
        }
    }
}

struct Win {
    window: Arc<Window>,
    surface: Surface<'static>,
    surface_config: SurfaceConfiguration,
    gpu: Gpu,
    /// Created with the swapchain, so `None` while the window has never had a size.
    targets: Option<CoverageTargets>,
    /// Observer requesting a redraw whenever the drawing changes.
    redraw_sub: Subscription,
}

impl Win {
    fn recreate_swapchain(&mut self) {
        let res = self.window.inner_size();
        if res.width == 0 || res.height == 0 {
            // Minimized; configuring a zero-sized surface is an error.
            return;
        }
        self.surface_config.width = res.width;
        self.surface_config.height = res.height;

        log::debug!(
            "configuring window surface for {}x{} (format: {:?}, present mode: {:?})",
            res.width,
            res.height,
            self.surface_config.format,
            self.surface_config.present_mode,
        );

        self.surface.configure(&self.gpu.device, &self.surface_config);
        self.targets = Some(CoverageTargets::new(&self.gpu, res.width, res.height));
    }

    fn redraw(&mut self, drawing: &Drawing) {
        if self.targets.is_none() {
            return;
        }
        let st = match self.surface.get_current_texture() {
            Ok(st) => st,
            Err(err @ (SurfaceError::Outdated | SurfaceError::Lost)) => {
                log::debug!("surface error: {}", err);
                self.recreate_swapchain();
                self.window.request_redraw();
                return;
            }
            Err(e) => {
                log::warn!("failed to acquire frame: {}", e);
                return;
            }
        };

        let Some(targets) = &self.targets else { return };
        let gpu = &mut self.gpu;
        gpu.frame.build(drawing.visible_strokes());
        gpu.upload_frame();

        let size: Vec2u = vec2(st.texture.width(), st.texture.height());
        let uniforms = Uniforms {
            render_target_size: size,
            _padding: [0; 2],
        };
        gpu.queue
            .write_buffer(&gpu.uniform_buf, 0, bytemuck::bytes_of(&uniforms));

        let mut enc = gpu.device.create_command_encoder(&Default::default());
        let view = st.texture.create_view(&Default::default());
        let [r, g, b, a] = BACKGROUND.premultiplied().map(f64::from);
        drop(color_pass(&mut enc, &view, LoadOp::Clear(Color { r, g, b, a })));

        // Each stroke is rasterized, blurred and composited on its own, so that its color and
        // blur apply to the stroke as a whole.
        let layers = gpu.frame.layers.iter().zip(&gpu.frame.bounds);
        for (index, (layer, bounds)) in layers.enumerate() {
            let Some([x, y, w, h]) = bounds.scissor(size) else {
                continue;
            };
            let instance = index as u32..index as u32 + 1;

            let clear = LoadOp::Clear(Color::TRANSPARENT);
            let mut pass = color_pass(&mut enc, &targets.coverage, clear);
            pass.set_pipeline(&gpu.dab_pipeline);
            pass.set_bind_group(0, &gpu.uniforms_bg, &[]);
            pass.set_bind_group(1, &gpu.frame_bg, &[]);
            pass.set_scissor_rect(x, y, w, h);
            pass.draw(0..4, layer.dabs());
            drop(pass);

            let mut steps = Vec::with_capacity(3);
            if layer.is_blurred() {
                steps.push((
                    &gpu.blur_horizontal_pipeline,
                    &targets.coverage_bg,
                    &targets.scratch,
                    clear,
                ));
                steps.push((
                    &gpu.blur_vertical_pipeline,
                    &targets.scratch_bg,
                    &targets.coverage,
                    LoadOp::Load,
                ));
            }
            steps.push((&gpu.composite_pipeline, &targets.coverage_bg, &view, LoadOp::Load));

            for (pipeline, source, target, load) in steps {
                let mut pass = color_pass(&mut enc, target, load);
                pass.set_pipeline(pipeline);
                pass.set_bind_group(0, &gpu.uniforms_bg, &[]);
                pass.set_bind_group(1, &gpu.frame_bg, &[]);
                pass.set_bind_group(2, source, &[]);
                pass.set_scissor_rect(x, y, w, h);
                pass.draw(0..3, instance.clone());
            }
        }

        gpu.queue.submit([enc.finish()]);
        self.window.pre_present_notify();
        st.present();
    }
}

fn color_pass<'e>(
    enc: &'e mut CommandEncoder,
    view: &TextureView,
    load: LoadOp<Color>,
) -> RenderPass<'e> {
    enc.begin_render_pass(&RenderPassDescriptor {
        color_attachments: &[Some(RenderPassColorAttachment {
            view,
            depth_slice: None,
            resolve_target: None,
            ops: Operations {
                load,
                store: StoreOp::Store,
            },
        })],
        ..Default::default()
    })
}

impl App {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        Ok(Self {
            instance: wgpu::Instance::new(&InstanceDescriptor {
                backends: Backends::PRIMARY,
                ..Default::default()
            }),
            win: None,
            drawing: Drawing::new(config.style),
            controls: Controls::new(&config),
            bindings: config.bind,
            modifiers: ModifiersState::empty(),
            pointer: Pointer::default(),
        })
    }

    fn create_win(&mut self, event_loop: &ActiveEventLoop) -> anyhow::Result<Win> {
        let window = Arc::new(
            event_loop.create_window(Window::default_attributes().with_title("TinyDraw"))?,
        );

        let surface = self
            .instance
            .create_surface(SurfaceTarget::from(window.clone()))?;
        let (gpu, surface_config) = Gpu::new(&self.instance, &surface)?;

        // Every change to the drawing needs a new frame.
        let redraw_window = window.clone();
        let redraw_sub = self
            .drawing
            .subscribe(move |_| redraw_window.request_redraw());

        let mut win = Win {
            window,
            surface,
            surface_config,
            gpu,
            targets: None,
            redraw_sub,
        };
        win.recreate_swapchain();
        Ok(win)
    }

    /// Runs a command bound to a key, if there is one.
    fn key_pressed(&mut self, key: &Key) {
        let Key::Character(ch) = key else { return };
        let chord = Chord {
            // Command on macOS.
            ctrl: self.modifiers.control_key() || self.modifiers.super_key(),
            shift: self.modifiers.shift_key(),
            alt: self.modifiers.alt_key(),
            key: ch.to_lowercase(),
        };
        if let Some(verb) = self.bindings.get(&chord) {
            let cmd = self.controls.command(verb, self.drawing.style());
            log::debug!("{verb:?} -> {cmd:?}");
            self.drawing.handle(cmd);
            self.update_title();
        }
    }

    fn pointer_input(&mut self, cmd: Option<Cmd>) {
        let Some(cmd) = cmd else { return };
        self.drawing.handle(cmd);
        if cmd == Cmd::PointerReleased {
            self.update_title();
        }
    }

    /// Shows the brush settings and undo/redo availability in the title bar.
    fn update_title(&self) {
        let Some(win) = &self.win else { return };
        let style = self.drawing.style();
        let mut title = format!(
            "TinyDraw | {} strokes | width {:.0} | softness {:.0} | spacing {:.0}%",
            self.drawing.committed().len(),
            style.width,
            style.blur,
            style.spacing * 100.0,
        );
        if self.drawing.can_undo() {
            title.push_str(" | undo");
        }
        if self.drawing.can_redo() {
            title.push_str(" | redo");
        }
        win.window.set_title(&title);
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.win.is_none() {
            let win = match self.create_win(event_loop) {
                Ok(win) => win,
                Err(e) => {
                    eprintln!("could not create window: {e}");
                    process::exit(1);
                }
            };
            self.win = Some(win);
            self.update_title();
        }
    }

    fn suspended(&mut self, _event_loop: &ActiveEventLoop) {
        // The surface doesn't outlive a suspension on mobile platforms. `resumed` builds a new
        // window with its own redraw observer.
        if let Some(win) = self.win.take() {
            self.drawing.unsubscribe(win.redraw_sub);
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        let Some(win) = &mut self.win else { return };

        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::RedrawRequested => win.redraw(&self.drawing),
            WindowEvent::Resized(_) => {
                win.recreate_swapchain();
                win.window.request_redraw();
            }
            WindowEvent::ModifiersChanged(modifiers) => self.modifiers = modifiers.state(),
            WindowEvent::KeyboardInput { event, .. } if event.state == ElementState::Pressed => {
                self.key_pressed(&event.logical_key);
            }
            WindowEvent::CursorMoved { position, .. } => {
                let cmd = self
                    .pointer
                    .cursor_moved(vec2(position.x as f32, position.y as f32));
                self.pointer_input(cmd);
            }
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => {
                let cmd = match state {
                    ElementState::Pressed => self.pointer.mouse_pressed(),
                    ElementState::Released => self.pointer.mouse_released(),
                };
                self.pointer_input(cmd);
            }
            WindowEvent::Touch(Touch {
                id,
                phase,
                location,
                ..
            }) => {
                let position = vec2(location.x as f32, location.y as f32);
                let cmd = self.pointer.touch(id, phase, position);
                self.pointer_input(cmd);
            }
            _ => {}
        }
    }
}

#[derive(Clone, Copy, NoUninit)]
#[repr(C)]
struct Uniforms {
    render_target_size: Vec2u,
    _padding: [u32; 2],
}
