//! Compute kernels that write packed skinning data into lookup textures.
//!
//! WGSL source lives in `bake.wgsl` next to this file and is embedded at
//! compile time with `include_str!`. Pipelines and bind group layouts are
//! built once in `BakeKernels::new`; each bake call then only creates its
//! staging buffers and bind group.

use wgpu::util::DeviceExt;

use crate::bake::weights::BoneWeight;

/// Threads per workgroup in `bake.wgsl`; dispatches round up to this.
pub const WORKGROUP_SIZE: u32 = 32;

/// Array layers of the matrix texture, one per matrix column.
pub const MATRIX_LAYERS: u32 = 4;

/// Per-dispatch parameters shared by both kernels. Padded to the 16-byte
/// uniform size the shader-side struct rounds up to.
#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct PackInfo {
    count: u32,
    dim: u32,
    _pad: [u32; 2],
}

/// The two bake pipelines with their bind group layouts, built once per
/// device and reused across every bake pass.
pub struct BakeKernels {
    matrix_pipeline: wgpu::ComputePipeline,
    matrix_bgl: wgpu::BindGroupLayout,
    weight_pipeline: wgpu::ComputePipeline,
    weight_bgl: wgpu::BindGroupLayout,
}

impl BakeKernels {
    pub fn new(device: &wgpu::Device) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("bake-kernels"),
            source: wgpu::ShaderSource::Wgsl(std::borrow::Cow::Borrowed(include_str!(
                "bake.wgsl"
            ))),
        });

        let matrix_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("bake-matrix-bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::StorageTexture {
                        access: wgpu::StorageTextureAccess::WriteOnly,
                        format: wgpu::TextureFormat::Rgba32Float,
                        view_dimension: wgpu::TextureViewDimension::D2Array,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });
        let matrix_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("bake-matrix-pl"),
            bind_group_layouts: &[&matrix_bgl],
            push_constant_ranges: &[],
        });
        let matrix_pipeline =
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some("bake-matrix-pipeline"),
                layout: Some(&matrix_layout),
                module: &shader,
                entry_point: Some("bake_matrix_texture"),
                compilation_options: Default::default(),
                cache: None,
            });

        let weight_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("bake-weight-bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 4,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::StorageTexture {
                        access: wgpu::StorageTextureAccess::WriteOnly,
                        format: wgpu::TextureFormat::Rg32Float,
                        view_dimension: wgpu::TextureViewDimension::D2,
                    },
                    count: None,
                },
            ],
        });
        let weight_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("bake-weight-pl"),
            bind_group_layouts: &[&weight_bgl],
            push_constant_ranges: &[],
        });
        let weight_pipeline =
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some("bake-weight-pipeline"),
                layout: Some(&weight_layout),
                module: &shader,
                entry_point: Some("bake_bone_weights"),
                compilation_options: Default::default(),
                cache: None,
            });

        Self {
            matrix_pipeline,
            matrix_bgl,
            weight_pipeline,
            weight_bgl,
        }
    }

    /// Write `matrices` into a fresh square `Rgba32Float` texture with one
    /// array layer per matrix column. `dim` must fit every matrix.
    pub fn bake_matrices(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        matrices: &[[f32; 16]],
        dim: u32,
    ) -> wgpu::Texture {
        let count = matrices.len() as u32;
        debug_assert!(u64::from(dim) * u64::from(dim) >= u64::from(count));
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("anim-matrix-tex"),
            size: wgpu::Extent3d {
                width: dim,
                height: dim,
                depth_or_array_layers: MATRIX_LAYERS,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba32Float,
            usage: wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let staging = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("bake-matrix-staging"),
            contents: bytemuck::cast_slice(matrices),
            usage: wgpu::BufferUsages::STORAGE,
        });
        let info = info_buffer(device, count, dim);
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            dimension: Some(wgpu::TextureViewDimension::D2Array),
            ..Default::default()
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("bake-matrix-bg"),
            layout: &self.matrix_bgl,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: staging.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: info.as_entire_binding(),
                },
            ],
        });
        submit_pass(
            device,
            queue,
            &self.matrix_pipeline,
            &bind_group,
            count,
            "bake-matrix",
        );
        texture
    }

    /// Write bone/weight entries into a fresh square `Rg32Float` texture,
    /// red holding the bone index and green the weight.
    pub fn bake_weights(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        entries: &[BoneWeight],
        dim: u32,
    ) -> wgpu::Texture {
        let count = entries.len() as u32;
        debug_assert!(u64::from(dim) * u64::from(dim) >= u64::from(count));
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("bone-weight-tex"),
            size: wgpu::Extent3d {
                width: dim,
                height: dim,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rg32Float,
            usage: wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let staging = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("bake-weight-staging"),
            contents: bytemuck::cast_slice(entries),
            usage: wgpu::BufferUsages::STORAGE,
        });
        let info = info_buffer(device, count, dim);
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("bake-weight-bg"),
            layout: &self.weight_bgl,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: info.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: staging.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
            ],
        });
        submit_pass(
            device,
            queue,
            &self.weight_pipeline,
            &bind_group,
            count,
            "bake-weights",
        );
        texture
    }
}

fn info_buffer(device: &wgpu::Device, count: u32, dim: u32) -> wgpu::Buffer {
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("bake-info"),
        contents: bytemuck::bytes_of(&PackInfo {
            count,
            dim,
            _pad: [0; 2],
        }),
        usage: wgpu::BufferUsages::UNIFORM,
    })
}

fn submit_pass(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    pipeline: &wgpu::ComputePipeline,
    bind_group: &wgpu::BindGroup,
    count: u32,
    label: &str,
) {
    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some(label),
    });
    {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(label),
            timestamp_writes: None,
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, bind_group, &[]);
        pass.dispatch_workgroups(count.div_ceil(WORKGROUP_SIZE), 1, 1);
    }
    queue.submit(Some(encoder.finish()));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_info_matches_the_uniform_size() {
        assert_eq!(std::mem::size_of::<PackInfo>(), 16);
    }

    #[test]
    fn dispatch_rounds_up_to_workgroups_of_32() {
        assert_eq!(75u32.div_ceil(WORKGROUP_SIZE), 3);
        assert_eq!(32u32.div_ceil(WORKGROUP_SIZE), 1);
        assert_eq!(33u32.div_ceil(WORKGROUP_SIZE), 2);
    }
}
