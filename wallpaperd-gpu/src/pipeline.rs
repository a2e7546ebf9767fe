//! Shader and pipeline creation (spec §4.D): reflect SPIR-V bytecode once
//! via naga, then hand it to wgpu, and build render pipelines against a
//! fixed bind-group ABI scenes compile their shaders against.
//!
//! wgpu pipelines need a concrete `BindGroupLayout` per bind group; rather
//! than deriving one bespoke per shader (which would need a full naga
//! resource-binding pass, cf. `blade-graphics/src/webgpu/pipeline.rs`'s
//! `fill_resource_bindings`), every pipeline here shares two fixed layouts:
//! group 0 is eight uniform buffers (vertex uniform slots 0-3, fragment
//! slots 4-7 — matching `push_vertex_uniform_data`/`push_fragment_uniform_data`'s
//! `slot < 4` contract), group 1 is `MAX_TEXTURE_SLOTS` texture+sampler
//! pairs. Scene shaders are authored against this fixed ABI (spec §4.E:
//! "layout follows the std140 rules published to scene authors").

use crate::format;
use crate::types::PipelineInfo;
use wallpaperd_error::WdError;

pub const MAX_UNIFORM_SLOTS: u32 = 4;
pub const MAX_TEXTURE_SLOTS: u32 = 8;

pub const UNIFORM_GROUP: u32 = 0;
pub const TEXTURE_GROUP: u32 = 1;

/// Shared across every GPU Session: a pipeline layout built from the two
/// fixed bind group layouts above.
pub struct PipelineAbi {
    pub uniform_layout: wgpu::BindGroupLayout,
    pub texture_layout: wgpu::BindGroupLayout,
    pub pipeline_layout: wgpu::PipelineLayout,
}

impl PipelineAbi {
    pub fn new(device: &wgpu::Device) -> Self {
        let mut uniform_entries = Vec::with_capacity((MAX_UNIFORM_SLOTS * 2) as usize);
        for slot in 0..MAX_UNIFORM_SLOTS {
            uniform_entries.push(wgpu::BindGroupLayoutEntry {
                binding: slot,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            });
        }
        for slot in 0..MAX_UNIFORM_SLOTS {
            uniform_entries.push(wgpu::BindGroupLayoutEntry {
                binding: MAX_UNIFORM_SLOTS + slot,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            });
        }
        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("wallpaperd-uniform-group"),
            entries: &uniform_entries,
        });

        let mut texture_entries = Vec::with_capacity((MAX_TEXTURE_SLOTS * 2) as usize);
        for slot in 0..MAX_TEXTURE_SLOTS {
            texture_entries.push(wgpu::BindGroupLayoutEntry {
                binding: slot,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            });
        }
        for slot in 0..MAX_TEXTURE_SLOTS {
            texture_entries.push(wgpu::BindGroupLayoutEntry {
                binding: MAX_TEXTURE_SLOTS + slot,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            });
        }
        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("wallpaperd-texture-group"),
            entries: &texture_entries,
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("wallpaperd-pipeline-layout"),
            bind_group_layouts: &[&uniform_layout, &texture_layout],
            push_constant_ranges: &[],
        });

        Self { uniform_layout, texture_layout, pipeline_layout }
    }
}

fn spirv_words(bytes: &[u8]) -> Result<Vec<u32>, WdError> {
    if bytes.len() % 4 != 0 {
        return Err(WdError::ShaderCompileFailed(
            "SPIR-V bytecode length is not a multiple of 4".into(),
        ));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

/// Reflect `bytes` as a SPIR-V module (validating it parses, carries a
/// `main` entry point of the expected stage, and passes naga's validator),
/// then translate to WGSL for wgpu, following the same reflect-then-emit
/// shape as `blade-graphics/src/webgpu/pipeline.rs::load_shader`. Doing the
/// translation ourselves (rather than wgpu's SPIR-V passthrough, which
/// needs an unsafe, backend-conditional native-shader feature) keeps shader
/// compilation portable across every wgpu backend.
pub fn compile_shader(
    device: &wgpu::Device,
    bytes: &[u8],
    stage: naga::ShaderStage,
    label: &str,
) -> Result<wgpu::ShaderModule, WdError> {
    spirv_words(bytes)?; // length sanity check before handing bytes to naga

    let options = naga::front::spv::Options::default();
    let module = naga::front::spv::parse_u8_slice(bytes, &options)
        .map_err(|e| WdError::ShaderCompileFailed(format!("{label}: SPIR-V parse failed: {e}")))?;

    let has_entry_point = module
        .entry_points
        .iter()
        .any(|ep| ep.name == "main" && ep.stage == stage);
    if !has_entry_point {
        return Err(WdError::ShaderCompileFailed(format!(
            "{label}: no 'main' entry point for stage {stage:?}"
        )));
    }

    let module_info = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    )
    .validate(&module)
    .map_err(|e| WdError::ShaderCompileFailed(format!("{label}: validation failed: {e}")))?;

    let wgsl = naga::back::wgsl::write_string(&module, &module_info, naga::back::wgsl::WriterFlags::empty())
        .map_err(|e| WdError::ShaderCompileFailed(format!("{label}: WGSL emission failed: {e}")))?;

    Ok(device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(std::borrow::Cow::Owned(wgsl)),
    }))
}

pub fn create_render_pipeline(
    device: &wgpu::Device,
    abi: &PipelineAbi,
    info: &PipelineInfo,
    vertex_shader: &wgpu::ShaderModule,
    fragment_shader: &wgpu::ShaderModule,
) -> Result<wgpu::RenderPipeline, WdError> {
    let color_format = format::map_texture_format(info.color_target_format)?;

    let mut attributes_by_slot: std::collections::BTreeMap<u32, Vec<wgpu::VertexAttribute>> =
        std::collections::BTreeMap::new();
    for attr in &info.vertex_attributes {
        attributes_by_slot.entry(attr.slot).or_default().push(wgpu::VertexAttribute {
            format: format::map_vertex_attribute_type(attr.attr_type),
            offset: attr.offset as u64,
            shader_location: attr.location,
        });
    }

    let mut vertex_buffers = Vec::with_capacity(info.vertex_bindings.len());
    // Attribute slices must outlive the `VertexBufferLayout`s that borrow them.
    let mut attribute_storage = Vec::with_capacity(info.vertex_bindings.len());
    for binding in &info.vertex_bindings {
        let attrs = attributes_by_slot.remove(&binding.slot).unwrap_or_default();
        attribute_storage.push(attrs);
    }
    for (binding, attrs) in info.vertex_bindings.iter().zip(attribute_storage.iter()) {
        vertex_buffers.push(wgpu::VertexBufferLayout {
            array_stride: binding.stride as u64,
            step_mode: if binding.per_instance {
                wgpu::VertexStepMode::Instance
            } else {
                wgpu::VertexStepMode::Vertex
            },
            attributes: attrs,
        });
    }

    let depth_stencil = format::map_depth_test_mode(info.depth_test_mode).map(|compare| {
        wgpu::DepthStencilState {
            format: wgpu::TextureFormat::Depth16Unorm,
            depth_write_enabled: info.depth_write,
            depth_compare: compare,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }
    });

    let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("wallpaperd-pipeline"),
        layout: Some(&abi.pipeline_layout),
        vertex: wgpu::VertexState {
            module: vertex_shader,
            entry_point: Some("main"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            buffers: &vertex_buffers,
        },
        primitive: wgpu::PrimitiveState {
            topology: format::map_topology(info.topology),
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: format::map_cull_mode(info.cull_mode),
            ..Default::default()
        },
        depth_stencil,
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module: fragment_shader,
            entry_point: Some("main"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            targets: &[Some(wgpu::ColorTargetState {
                format: color_format,
                blend: format::map_blend_mode(info.blend_mode),
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        multiview: None,
        cache: None,
    });

    Ok(pipeline)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_word_aligned_bytecode() {
        let err = spirv_words(&[1, 2, 3]).unwrap_err();
        assert!(matches!(err, WdError::ShaderCompileFailed(_)));
    }

    #[test]
    fn word_alignment_round_trips() {
        let words = spirv_words(&[1, 0, 0, 0, 2, 0, 0, 0]).unwrap();
        assert_eq!(words, vec![1u32, 2u32]);
    }
}
