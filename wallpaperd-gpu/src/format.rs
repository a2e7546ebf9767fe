//! Fixed translation tables from the spec's wire enums to wgpu's, in the
//! style of `blade-graphics/src/webgpu/pipeline.rs`'s `map_*` functions.
//! Every table is total over the input enum except blend mode, whose
//! "unsupported" members are rejected with `invalid-enum` per spec §9.

use crate::types::{
    AddressMode, BlendMode, CullMode, DepthTestMode, FilterMode, PixelFormat, Topology,
    VertexAttributeType,
};
use wallpaperd_error::WdError;

pub fn map_texture_format(format: PixelFormat) -> Result<wgpu::TextureFormat, WdError> {
    match format {
        PixelFormat::Rgba8Unorm => Ok(wgpu::TextureFormat::Rgba8Unorm),
        PixelFormat::Rgba8UnormSrgb => Ok(wgpu::TextureFormat::Rgba8UnormSrgb),
        PixelFormat::Rgba16Float => Ok(wgpu::TextureFormat::Rgba16Float),
        PixelFormat::R8Unorm => Ok(wgpu::TextureFormat::R8Unorm),
        PixelFormat::Depth16Unorm => Ok(wgpu::TextureFormat::Depth16Unorm),
        PixelFormat::SwapchainMarker => Err(WdError::InvalidEnum(
            "swapchain marker format is only valid as a render-pass color target".into(),
        )),
    }
}

pub fn map_filter_mode(mode: FilterMode) -> wgpu::FilterMode {
    match mode {
        FilterMode::Nearest => wgpu::FilterMode::Nearest,
        FilterMode::Linear => wgpu::FilterMode::Linear,
    }
}

pub fn map_address_mode(mode: AddressMode) -> wgpu::AddressMode {
    match mode {
        AddressMode::Clamp => wgpu::AddressMode::ClampToEdge,
        AddressMode::Repeat => wgpu::AddressMode::Repeat,
        AddressMode::Mirror => wgpu::AddressMode::MirrorRepeat,
    }
}

/// `None`, `Alpha`, `Add` are required by spec §9; the rest are accepted too
/// since wgpu's blend state can express all seven.
pub fn map_blend_mode(mode: BlendMode) -> Option<wgpu::BlendState> {
    use wgpu::{BlendComponent, BlendFactor, BlendOperation, BlendState};

    match mode {
        BlendMode::None => None,
        BlendMode::Alpha => Some(BlendState {
            color: BlendComponent {
                src_factor: BlendFactor::SrcAlpha,
                dst_factor: BlendFactor::OneMinusSrcAlpha,
                operation: BlendOperation::Add,
            },
            alpha: BlendComponent {
                src_factor: BlendFactor::One,
                dst_factor: BlendFactor::OneMinusSrcAlpha,
                operation: BlendOperation::Add,
            },
        }),
        BlendMode::AlphaPremultiplied => Some(BlendState {
            color: BlendComponent {
                src_factor: BlendFactor::One,
                dst_factor: BlendFactor::OneMinusSrcAlpha,
                operation: BlendOperation::Add,
            },
            alpha: BlendComponent {
                src_factor: BlendFactor::One,
                dst_factor: BlendFactor::OneMinusSrcAlpha,
                operation: BlendOperation::Add,
            },
        }),
        BlendMode::Add => Some(BlendState {
            color: BlendComponent {
                src_factor: BlendFactor::SrcAlpha,
                dst_factor: BlendFactor::One,
                operation: BlendOperation::Add,
            },
            alpha: BlendComponent {
                src_factor: BlendFactor::Zero,
                dst_factor: BlendFactor::One,
                operation: BlendOperation::Add,
            },
        }),
        BlendMode::AddPremultiplied => Some(BlendState {
            color: BlendComponent {
                src_factor: BlendFactor::One,
                dst_factor: BlendFactor::One,
                operation: BlendOperation::Add,
            },
            alpha: BlendComponent {
                src_factor: BlendFactor::Zero,
                dst_factor: BlendFactor::One,
                operation: BlendOperation::Add,
            },
        }),
        BlendMode::Modulate => Some(BlendState {
            color: BlendComponent {
                src_factor: BlendFactor::Dst,
                dst_factor: BlendFactor::Zero,
                operation: BlendOperation::Add,
            },
            alpha: BlendComponent {
                src_factor: BlendFactor::Dst,
                dst_factor: BlendFactor::Zero,
                operation: BlendOperation::Add,
            },
        }),
        BlendMode::Multiply => Some(BlendState {
            color: BlendComponent {
                src_factor: BlendFactor::Dst,
                dst_factor: BlendFactor::OneMinusSrcAlpha,
                operation: BlendOperation::Add,
            },
            alpha: BlendComponent {
                src_factor: BlendFactor::One,
                dst_factor: BlendFactor::OneMinusSrcAlpha,
                operation: BlendOperation::Add,
            },
        }),
    }
}

pub fn map_depth_test_mode(mode: DepthTestMode) -> Option<wgpu::CompareFunction> {
    match mode {
        DepthTestMode::Disabled => None,
        DepthTestMode::Always => Some(wgpu::CompareFunction::Always),
        DepthTestMode::Less => Some(wgpu::CompareFunction::Less),
        DepthTestMode::LessEqual => Some(wgpu::CompareFunction::LessEqual),
        DepthTestMode::Greater => Some(wgpu::CompareFunction::Greater),
        DepthTestMode::GreaterEqual => Some(wgpu::CompareFunction::GreaterEqual),
        DepthTestMode::Equal => Some(wgpu::CompareFunction::Equal),
        DepthTestMode::NotEqual => Some(wgpu::CompareFunction::NotEqual),
    }
}

pub fn map_topology(topology: Topology) -> wgpu::PrimitiveTopology {
    match topology {
        Topology::Triangles => wgpu::PrimitiveTopology::TriangleList,
        Topology::TriangleStrip => wgpu::PrimitiveTopology::TriangleStrip,
        Topology::Lines => wgpu::PrimitiveTopology::LineList,
        Topology::LineStrip => wgpu::PrimitiveTopology::LineStrip,
    }
}

pub fn map_cull_mode(mode: CullMode) -> Option<wgpu::Face> {
    match mode {
        CullMode::None => None,
        CullMode::Front => Some(wgpu::Face::Front),
        CullMode::Back => Some(wgpu::Face::Back),
    }
}

pub fn map_vertex_attribute_type(attr_type: VertexAttributeType) -> wgpu::VertexFormat {
    use wgpu::VertexFormat as V;
    match attr_type {
        VertexAttributeType::Int => V::Sint32,
        VertexAttributeType::Int2 => V::Sint32x2,
        VertexAttributeType::Int3 => V::Sint32x3,
        VertexAttributeType::Int4 => V::Sint32x4,
        VertexAttributeType::Uint => V::Uint32,
        VertexAttributeType::Uint2 => V::Uint32x2,
        VertexAttributeType::Uint3 => V::Uint32x3,
        VertexAttributeType::Uint4 => V::Uint32x4,
        VertexAttributeType::Float => V::Float32,
        VertexAttributeType::Float2 => V::Float32x2,
        VertexAttributeType::Float3 => V::Float32x3,
        VertexAttributeType::Float4 => V::Float32x4,
        VertexAttributeType::Byte2 => V::Sint8x2,
        VertexAttributeType::Byte4 => V::Sint8x4,
        VertexAttributeType::Ubyte2 => V::Uint8x2,
        VertexAttributeType::Ubyte4 => V::Uint8x4,
        VertexAttributeType::Ubyte2Norm => V::Unorm8x2,
        VertexAttributeType::Ubyte4Norm => V::Unorm8x4,
        VertexAttributeType::Short2 => V::Sint16x2,
        VertexAttributeType::Short4 => V::Sint16x4,
        VertexAttributeType::Ushort2 => V::Uint16x2,
        VertexAttributeType::Ushort4 => V::Uint16x4,
        VertexAttributeType::Short2Norm => V::Snorm16x2,
        VertexAttributeType::Short4Norm => V::Snorm16x4,
        VertexAttributeType::Ushort2Norm => V::Unorm16x2,
        VertexAttributeType::Ushort4Norm => V::Unorm16x4,
        VertexAttributeType::Half2 => V::Float16x2,
        VertexAttributeType::Half4 => V::Float16x4,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_blend_modes_are_accepted() {
        // spec §9: implementers "must accept at least {none, alpha, add}".
        let _ = map_blend_mode(BlendMode::None);
        let _ = map_blend_mode(BlendMode::Alpha);
        let _ = map_blend_mode(BlendMode::Add);
    }

    #[test]
    fn swapchain_marker_is_not_a_real_texture_format() {
        assert!(map_texture_format(PixelFormat::SwapchainMarker).is_err());
    }

    #[test]
    fn disabled_depth_test_disables_comparison() {
        assert_eq!(map_depth_test_mode(DepthTestMode::Disabled), None);
    }
}
