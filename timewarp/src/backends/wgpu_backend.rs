use std::mem;
use std::sync::mpsc::{self, TryRecvError};
use std::sync::Arc;

use fxhash::FxHashMap;
use glam::{uvec2, vec4, UVec2, Vec4};
use half::f16;
use log::{debug, info, warn};

use crate::gpu::{gamma_to_linear, TimewarpUniforms};
use crate::{
    Backend, BackendError, Bindings, Pass, ReadbackImage, TextureDescriptor,
};

/// Shader program implementing a [`Pass`].
///
/// The vertex stage is expected to emit a fullscreen triangle out of three
/// vertices, without any vertex buffers; the fragment stage gets the
/// following bindings in group 0:
///
/// - 0: [`TimewarpUniforms`] (uniform buffer),
/// - 1: non-filtering sampler,
/// - 2: source,
/// - 3: motion/depth of the current frame,
/// - 4: reference color,
/// - 5: reference motion/depth.
///
/// Bindings not used by given pass are filled with the source texture.
#[derive(Debug)]
pub struct WgpuShader {
    pub module: wgpu::ShaderModule,
    pub vertex_entry_point: &'static str,
    pub fragment_entry_point: &'static str,
}

/// Texture handled by [`WgpuBackend`].
#[derive(Debug)]
pub struct WgpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl WgpuTexture {
    /// Wraps texture owned by the host.
    ///
    /// Sources need `TEXTURE_BINDING`, destinations need `RENDER_ATTACHMENT`
    /// (and `COPY_SRC` for the capture to work).
    pub fn new(texture: wgpu::Texture) -> Self {
        let view = texture.create_view(&Default::default());

        Self { texture, view }
    }

    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn size(&self) -> UVec2 {
        uvec2(self.texture.width(), self.texture.height())
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.texture.format()
    }
}

/// Download started by [`WgpuBackend::read_back()`].
#[derive(Debug)]
pub struct WgpuReadback {
    buffer: wgpu::Buffer,
    size: UVec2,
    format: wgpu::TextureFormat,
    padded_bytes_per_row: u32,
    receiver: mpsc::Receiver<Result<(), wgpu::BufferAsyncError>>,
}

type PipelineKey = (Pass, Vec<wgpu::TextureFormat>);

/// [`Backend`] running passes through `wgpu`.
///
/// Each pass is recorded into its own command buffer and submitted right
/// away; readbacks are mapped asynchronously and polled without blocking.
#[derive(Debug)]
pub struct WgpuBackend {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    shaders: FxHashMap<Pass, WgpuShader>,
    pipelines: FxHashMap<PipelineKey, wgpu::RenderPipeline>,
    bind_group_layout: wgpu::BindGroupLayout,
    uniforms: wgpu::Buffer,
    sampler: wgpu::Sampler,
}

impl WgpuBackend {
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Self {
        info!("Initializing wgpu backend");

        let uniforms = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("timewarp_uniforms"),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::UNIFORM,
            size: mem::size_of::<TimewarpUniforms>() as _,
            mapped_at_creation: false,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("timewarp_sampler"),
            ..Default::default()
        });

        let texture_entry = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                multisampled: false,
                view_dimension: wgpu::TextureViewDimension::D2,
                sample_type: wgpu::TextureSampleType::Float {
                    filterable: false,
                },
            },
            count: None,
        };

        let bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("timewarp_bind_group_layout"),
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Sampler(
                            wgpu::SamplerBindingType::NonFiltering,
                        ),
                        count: None,
                    },
                    texture_entry(2),
                    texture_entry(3),
                    texture_entry(4),
                    texture_entry(5),
                ],
            });

        Self {
            device,
            queue,
            shaders: Default::default(),
            pipelines: Default::default(),
            bind_group_layout,
            uniforms,
            sampler,
        }
    }

    pub fn with_shader(mut self, pass: Pass, shader: WgpuShader) -> Self {
        self.set_shader(pass, shader);
        self
    }

    /// Replaces shader used for given pass; pipelines built for the previous
    /// one are dropped.
    pub fn set_shader(&mut self, pass: Pass, shader: WgpuShader) {
        debug!("Setting shader for the {pass} pass");

        self.shaders.insert(pass, shader);
        self.pipelines.retain(|(pipeline_pass, _), _| *pipeline_pass != pass);
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    fn prepare_pipeline(
        &mut self,
        pass: Pass,
        formats: &[wgpu::TextureFormat],
    ) -> Result<PipelineKey, BackendError> {
        let key = (pass, formats.to_vec());

        if self.pipelines.contains_key(&key) {
            return Ok(key);
        }

        let shader = self
            .shaders
            .get(&pass)
            .ok_or(BackendError::MissingPass(pass))?;

        debug!("Initializing pipeline: {pass}; formats={formats:?}");

        let targets: Vec<_> = formats
            .iter()
            .map(|&format| {
                Some(wgpu::ColorTargetState {
                    format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })
            })
            .collect();

        let pipeline = validated(&self.device, || {
            let pipeline_layout = self.device.create_pipeline_layout(
                &wgpu::PipelineLayoutDescriptor {
                    label: Some(&format!("timewarp_{pass}_pipeline_layout")),
                    bind_group_layouts: &[&self.bind_group_layout],
                    push_constant_ranges: &[],
                },
            );

            self.device.create_render_pipeline(
                &wgpu::RenderPipelineDescriptor {
                    label: Some(&format!("timewarp_{pass}_pipeline")),
                    layout: Some(&pipeline_layout),
                    vertex: wgpu::VertexState {
                        module: &shader.module,
                        entry_point: shader.vertex_entry_point,
                        buffers: &[],
                    },
                    primitive: wgpu::PrimitiveState::default(),
                    depth_stencil: None,
                    multisample: wgpu::MultisampleState::default(),
                    fragment: Some(wgpu::FragmentState {
                        module: &shader.module,
                        entry_point: shader.fragment_entry_point,
                        targets: &targets,
                    }),
                    multiview: None,
                },
            )
        })
        .map_err(|err| BackendError::PassFailed {
            pass,
            reason: format!("couldn't create pipeline: {err}"),
        })?;

        self.pipelines.insert(key.clone(), pipeline);

        Ok(key)
    }
}

impl Backend for WgpuBackend {
    type Texture = WgpuTexture;
    type Readback = WgpuReadback;

    fn allocate(
        &mut self,
        desc: &TextureDescriptor,
    ) -> Result<WgpuTexture, BackendError> {
        info!(
            "Allocating texture `{}`; size={}x{}, layers={}, format={:?}",
            desc.label, desc.size.x, desc.size.y, desc.layers, desc.format
        );

        if desc.size.x == 0 || desc.size.y == 0 || desc.layers == 0 {
            return Err(BackendError::AllocationFailed {
                label: desc.label.into(),
                reason: "texture must not be empty".into(),
            });
        }

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(desc.label),
            size: wgpu::Extent3d {
                width: desc.size.x,
                height: desc.size.y,
                depth_or_array_layers: desc.layers,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: desc.format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });

        Ok(WgpuTexture::new(texture))
    }

    fn release(&mut self, texture: WgpuTexture) {
        debug!("Releasing texture; size={:?}", texture.size());

        texture.texture.destroy();
    }

    fn run_pass(
        &mut self,
        pass: Pass,
        bindings: &Bindings<'_, WgpuTexture>,
        targets: &[&WgpuTexture],
    ) -> Result<(), BackendError> {
        let formats: Vec<_> =
            targets.iter().map(|target| target.format()).collect();

        let key = self.prepare_pipeline(pass, &formats)?;
        let pipeline = &self.pipelines[&key];

        let source = bindings.source;
        let motion_depth = bindings.motion_depth.unwrap_or(source);

        let (reference_color, reference_motion_depth) = bindings
            .reference
            .as_ref()
            .map(|reference| (reference.color, reference.motion_depth))
            .unwrap_or((source, source));

        let label = format!("timewarp_{pass}_pass");

        let commands = validated(&self.device, || {
            self.queue.write_buffer(
                &self.uniforms,
                0,
                bytemuck::bytes_of(&bindings.uniforms),
            );

            let bind_group =
                self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some(&format!("timewarp_{pass}_bind_group")),
                    layout: &self.bind_group_layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: self.uniforms.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: wgpu::BindingResource::Sampler(
                                &self.sampler,
                            ),
                        },
                        wgpu::BindGroupEntry {
                            binding: 2,
                            resource: wgpu::BindingResource::TextureView(
                                source.view(),
                            ),
                        },
                        wgpu::BindGroupEntry {
                            binding: 3,
                            resource: wgpu::BindingResource::TextureView(
                                motion_depth.view(),
                            ),
                        },
                        wgpu::BindGroupEntry {
                            binding: 4,
                            resource: wgpu::BindingResource::TextureView(
                                reference_color.view(),
                            ),
                        },
                        wgpu::BindGroupEntry {
                            binding: 5,
                            resource: wgpu::BindingResource::TextureView(
                                reference_motion_depth.view(),
                            ),
                        },
                    ],
                });

            let color_attachments: Vec<_> = targets
                .iter()
                .map(|target| {
                    Some(wgpu::RenderPassColorAttachment {
                        view: target.view(),
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                            store: true,
                        },
                    })
                })
                .collect();

            let mut encoder = self.device.create_command_encoder(
                &wgpu::CommandEncoderDescriptor {
                    label: Some(&label),
                },
            );

            {
                let mut render_pass =
                    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                        label: Some(&label),
                        color_attachments: &color_attachments,
                        depth_stencil_attachment: None,
                    });

                render_pass.set_pipeline(pipeline);
                render_pass.set_bind_group(0, &bind_group, &[]);
                render_pass.draw(0..3, 0..1);
            }

            encoder.finish()
        })
        .map_err(|err| BackendError::PassFailed {
            pass,
            reason: err.to_string(),
        })?;

        self.queue.submit(Some(commands));

        Ok(())
    }

    fn read_back(
        &mut self,
        texture: &WgpuTexture,
    ) -> Result<WgpuReadback, BackendError> {
        let format = texture.format();
        let size = texture.size();

        let usage = texture.texture().usage();

        if !usage.contains(wgpu::TextureUsages::COPY_SRC) {
            return Err(BackendError::ReadbackFailed(
                "texture doesn't have the COPY_SRC usage".into(),
            ));
        }

        let bytes_per_pixel = bytes_per_pixel(format)
            .ok_or(BackendError::UnsupportedFormat(format))?;

        let padded_bytes_per_row =
            align_bytes_per_row(bytes_per_pixel * size.x);

        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("timewarp_readback"),
            size: (padded_bytes_per_row * size.y) as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let commands = validated(&self.device, || {
            let mut encoder = self.device.create_command_encoder(
                &wgpu::CommandEncoderDescriptor {
                    label: Some("timewarp_readback"),
                },
            );

            encoder.copy_texture_to_buffer(
                wgpu::ImageCopyTexture {
                    texture: texture.texture(),
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                wgpu::ImageCopyBuffer {
                    buffer: &buffer,
                    layout: wgpu::ImageDataLayout {
                        offset: 0,
                        bytes_per_row: Some(padded_bytes_per_row),
                        rows_per_image: Some(size.y),
                    },
                },
                wgpu::Extent3d {
                    width: size.x,
                    height: size.y,
                    depth_or_array_layers: 1,
                },
            );

            encoder.finish()
        })
        .map_err(|err| BackendError::ReadbackFailed(err.to_string()))?;

        self.queue.submit(Some(commands));

        let (sender, receiver) = mpsc::channel();

        buffer
            .slice(..)
            .map_async(wgpu::MapMode::Read, move |result| {
                _ = sender.send(result);
            });

        Ok(WgpuReadback {
            buffer,
            size,
            format,
            padded_bytes_per_row,
            receiver,
        })
    }

    fn poll_read_back(
        &mut self,
        readback: &mut WgpuReadback,
    ) -> Option<Result<ReadbackImage, BackendError>> {
        self.device.poll(wgpu::Maintain::Poll);

        match readback.receiver.try_recv() {
            Err(TryRecvError::Empty) => None,

            Err(TryRecvError::Disconnected) => {
                Some(Err(BackendError::ReadbackFailed(
                    "buffer mapping has been abandoned".into(),
                )))
            }

            Ok(Err(err)) => {
                Some(Err(BackendError::ReadbackFailed(err.to_string())))
            }

            Ok(Ok(())) => {
                let image = {
                    let data = readback.buffer.slice(..).get_mapped_range();

                    decode_rows(
                        &data,
                        readback.size,
                        readback.format,
                        readback.padded_bytes_per_row,
                    )
                };

                readback.buffer.unmap();

                Some(image)
            }
        }
    }
}

/// Runs `f` within a validation error scope, so that invalid shaders or
/// bindings are reported instead of reaching the device's uncaptured error
/// handler (which panics).
fn validated<T>(
    device: &wgpu::Device,
    f: impl FnOnce() -> T,
) -> Result<T, wgpu::Error> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);

    let value = f();

    match pollster::block_on(device.pop_error_scope()) {
        Some(err) => {
            warn!("wgpu validation failed: {err}");
            Err(err)
        }
        None => Ok(value),
    }
}

fn bytes_per_pixel(format: wgpu::TextureFormat) -> Option<u32> {
    match format {
        wgpu::TextureFormat::Rgba16Float => Some(8),

        wgpu::TextureFormat::Rgba8Unorm
        | wgpu::TextureFormat::Rgba8UnormSrgb
        | wgpu::TextureFormat::Bgra8Unorm
        | wgpu::TextureFormat::Bgra8UnormSrgb => Some(4),

        _ => None,
    }
}

fn align_bytes_per_row(bytes: u32) -> u32 {
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

    (bytes + align - 1) / align * align
}

/// Converts a padded texture download into linear pixels.
fn decode_rows(
    data: &[u8],
    size: UVec2,
    format: wgpu::TextureFormat,
    padded_bytes_per_row: u32,
) -> Result<ReadbackImage, BackendError> {
    let bytes_per_pixel = bytes_per_pixel(format)
        .ok_or(BackendError::UnsupportedFormat(format))?;

    let expected = (padded_bytes_per_row * size.y) as usize;

    if data.len() < expected {
        return Err(BackendError::ReadbackFailed(format!(
            "got {} bytes, expected {expected}",
            data.len()
        )));
    }

    let mut pixels = Vec::with_capacity((size.x * size.y) as usize);

    for row in data.chunks(padded_bytes_per_row as usize).take(size.y as _) {
        let row = &row[..(bytes_per_pixel * size.x) as usize];

        for texel in row.chunks_exact(bytes_per_pixel as usize) {
            pixels.push(decode_texel(format, texel));
        }
    }

    Ok(ReadbackImage { size, pixels })
}

fn decode_texel(format: wgpu::TextureFormat, texel: &[u8]) -> Vec4 {
    let unorm = |idx: usize| texel[idx] as f32 / 255.0;
    let srgb = |idx: usize| gamma_to_linear(unorm(idx));

    match format {
        wgpu::TextureFormat::Rgba16Float => {
            let channel = |idx: usize| {
                f16::from_le_bytes([texel[2 * idx], texel[2 * idx + 1]])
                    .to_f32()
            };

            vec4(channel(0), channel(1), channel(2), channel(3))
        }

        wgpu::TextureFormat::Rgba8Unorm => {
            vec4(unorm(0), unorm(1), unorm(2), unorm(3))
        }

        wgpu::TextureFormat::Rgba8UnormSrgb => {
            vec4(srgb(0), srgb(1), srgb(2), unorm(3))
        }

        wgpu::TextureFormat::Bgra8Unorm => {
            vec4(unorm(2), unorm(1), unorm(0), unorm(3))
        }

        wgpu::TextureFormat::Bgra8UnormSrgb => {
            vec4(srgb(2), srgb(1), srgb(0), unorm(3))
        }

        _ => Vec4::ZERO,
    }
}
