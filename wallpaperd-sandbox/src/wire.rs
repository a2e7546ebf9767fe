//! Fixed-layout parsing of the Pass-Info Records (spec §3) out of sandbox
//! linear memory. Every record is little-endian, 4-byte-aligned fields in
//! declaration order — the layout a scene author's C struct gets from any
//! wasm32 target by default, so no explicit packing pragmas are needed on
//! either side of the boundary.

use wallpaperd_error::WdError;
use wallpaperd_gpu::types::{
    AddressMode, BindingsInfo, BlendMode, CullMode, DepthTestMode, FilterMode, PipelineInfo,
    PixelFormat, RenderPassInfo, SamplerInfo, TextureInfo, TextureSamplerBinding, Topology,
    VertexAttribute, VertexAttributeType, VertexBinding, VertexBufferBinding,
};

/// A read-only cursor over one snapshot of sandbox linear memory.
pub struct MemoryReader<'a> {
    bytes: &'a [u8],
}

impl<'a> MemoryReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    fn slice(&self, offset: u32, len: u32) -> Result<&'a [u8], WdError> {
        let start = offset as usize;
        let end = start
            .checked_add(len as usize)
            .ok_or_else(|| WdError::InvalidHandle("sandbox pointer arithmetic overflowed".into()))?;
        self.bytes
            .get(start..end)
            .ok_or_else(|| WdError::InvalidHandle(format!("sandbox pointer {offset} (len {len}) is out of bounds")))
    }

    pub fn u32(&self, offset: u32) -> Result<u32, WdError> {
        let bytes = self.slice(offset, 4)?;
        Ok(u32::from_le_bytes(bytes.try_into().unwrap()))
    }

    pub fn f32(&self, offset: u32) -> Result<f32, WdError> {
        Ok(f32::from_bits(self.u32(offset)?))
    }

    pub fn bool32(&self, offset: u32) -> Result<bool, WdError> {
        Ok(self.u32(offset)? != 0)
    }

    pub fn bytes(&self, offset: u32, len: u32) -> Result<&'a [u8], WdError> {
        self.slice(offset, len)
    }

    /// Read a nul-terminated string starting at `offset`.
    pub fn cstr(&self, offset: u32) -> Result<String, WdError> {
        let start = offset as usize;
        let tail = self
            .bytes
            .get(start..)
            .ok_or_else(|| WdError::InvalidHandle(format!("sandbox pointer {offset} is out of bounds")))?;
        let nul = tail
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| WdError::InvalidHandle(format!("string at sandbox pointer {offset} is not nul-terminated")))?;
        let bytes = tail
            .get(..nul)
            .ok_or_else(|| WdError::InvalidHandle(format!("string at sandbox pointer {offset} is out of bounds")))?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| WdError::InvalidHandle(format!("string at sandbox pointer {offset} is not valid utf-8: {e}")))
    }
}

fn vertex_attribute_type(tag: u32) -> Result<VertexAttributeType, WdError> {
    use VertexAttributeType as T;
    Ok(match tag {
        0 => T::Int,
        1 => T::Int2,
        2 => T::Int3,
        3 => T::Int4,
        4 => T::Uint,
        5 => T::Uint2,
        6 => T::Uint3,
        7 => T::Uint4,
        8 => T::Float,
        9 => T::Float2,
        10 => T::Float3,
        11 => T::Float4,
        12 => T::Byte2,
        13 => T::Byte4,
        14 => T::Ubyte2,
        15 => T::Ubyte4,
        16 => T::Ubyte2Norm,
        17 => T::Ubyte4Norm,
        18 => T::Short2,
        19 => T::Short4,
        20 => T::Ushort2,
        21 => T::Ushort4,
        22 => T::Short2Norm,
        23 => T::Short4Norm,
        24 => T::Ushort2Norm,
        25 => T::Ushort4Norm,
        26 => T::Half2,
        27 => T::Half4,
        other => return Err(WdError::InvalidEnum(format!("unknown vertex attribute type tag {other}"))),
    })
}

fn pixel_format(tag: u32) -> Result<PixelFormat, WdError> {
    Ok(match tag {
        0 => PixelFormat::Rgba8Unorm,
        1 => PixelFormat::Rgba8UnormSrgb,
        2 => PixelFormat::Rgba16Float,
        3 => PixelFormat::R8Unorm,
        4 => PixelFormat::Depth16Unorm,
        5 => PixelFormat::SwapchainMarker,
        other => return Err(WdError::InvalidEnum(format!("unknown pixel format tag {other}"))),
    })
}

fn filter_mode(tag: u32) -> Result<FilterMode, WdError> {
    Ok(match tag {
        0 => FilterMode::Nearest,
        1 => FilterMode::Linear,
        other => return Err(WdError::InvalidEnum(format!("unknown filter mode tag {other}"))),
    })
}

fn address_mode(tag: u32) -> Result<AddressMode, WdError> {
    Ok(match tag {
        0 => AddressMode::Clamp,
        1 => AddressMode::Repeat,
        2 => AddressMode::Mirror,
        other => return Err(WdError::InvalidEnum(format!("unknown address mode tag {other}"))),
    })
}

fn blend_mode(tag: u32) -> Result<BlendMode, WdError> {
    Ok(match tag {
        0 => BlendMode::None,
        1 => BlendMode::Alpha,
        2 => BlendMode::AlphaPremultiplied,
        3 => BlendMode::Add,
        4 => BlendMode::AddPremultiplied,
        5 => BlendMode::Modulate,
        6 => BlendMode::Multiply,
        other => return Err(WdError::InvalidEnum(format!("unknown blend mode tag {other}"))),
    })
}

fn depth_test_mode(tag: u32) -> Result<DepthTestMode, WdError> {
    Ok(match tag {
        0 => DepthTestMode::Disabled,
        1 => DepthTestMode::Always,
        2 => DepthTestMode::Less,
        3 => DepthTestMode::LessEqual,
        4 => DepthTestMode::Greater,
        5 => DepthTestMode::GreaterEqual,
        6 => DepthTestMode::Equal,
        7 => DepthTestMode::NotEqual,
        other => return Err(WdError::InvalidEnum(format!("unknown depth test mode tag {other}"))),
    })
}

fn topology(tag: u32) -> Result<Topology, WdError> {
    Ok(match tag {
        0 => Topology::Triangles,
        1 => Topology::TriangleStrip,
        2 => Topology::Lines,
        3 => Topology::LineStrip,
        other => return Err(WdError::InvalidEnum(format!("unknown topology tag {other}"))),
    })
}

fn cull_mode(tag: u32) -> Result<CullMode, WdError> {
    Ok(match tag {
        0 => CullMode::None,
        1 => CullMode::Front,
        2 => CullMode::Back,
        other => return Err(WdError::InvalidEnum(format!("unknown cull mode tag {other}"))),
    })
}

/// `color_target:u32, clear_color_rgba:[f32;4], clear_color:u32, depth_target:u32, clear_depth:f32, clear_depth_flag:u32` (36 bytes).
pub fn read_render_pass_info(mem: &MemoryReader, ptr: u32) -> Result<RenderPassInfo, WdError> {
    Ok(RenderPassInfo {
        color_target: mem.u32(ptr)?,
        clear_color_rgba: [
            mem.f32(ptr + 4)?,
            mem.f32(ptr + 8)?,
            mem.f32(ptr + 12)?,
            mem.f32(ptr + 16)?,
        ],
        clear_color: mem.bool32(ptr + 20)?,
        depth_target: mem.u32(ptr + 24)?,
        clear_depth: mem.f32(ptr + 28)?,
        clear_depth_flag: mem.bool32(ptr + 32)?,
    })
}

/// `width, height, mip_levels, msaa_sample_exponent, format, render_target` (24 bytes).
pub fn read_texture_info(mem: &MemoryReader, ptr: u32) -> Result<TextureInfo, WdError> {
    Ok(TextureInfo {
        width: mem.u32(ptr)?,
        height: mem.u32(ptr + 4)?,
        mip_levels: mem.u32(ptr + 8)?,
        msaa_sample_exponent: mem.u32(ptr + 12)? as u8,
        format: pixel_format(mem.u32(ptr + 16)?)?,
        render_target: mem.bool32(ptr + 20)?,
    })
}

/// `min, mag, mip, wrap_x, wrap_y, anisotropy` (24 bytes).
pub fn read_sampler_info(mem: &MemoryReader, ptr: u32) -> Result<SamplerInfo, WdError> {
    Ok(SamplerInfo {
        min: filter_mode(mem.u32(ptr)?)?,
        mag: filter_mode(mem.u32(ptr + 4)?)?,
        mip: filter_mode(mem.u32(ptr + 8)?)?,
        wrap_x: address_mode(mem.u32(ptr + 12)?)?,
        wrap_y: address_mode(mem.u32(ptr + 16)?)?,
        anisotropy: mem.u32(ptr + 20)?,
    })
}

/// `slot, stride, per_instance` (12 bytes) per entry.
fn read_vertex_binding(mem: &MemoryReader, ptr: u32) -> Result<VertexBinding, WdError> {
    Ok(VertexBinding {
        slot: mem.u32(ptr)?,
        stride: mem.u32(ptr + 4)?,
        per_instance: mem.bool32(ptr + 8)?,
    })
}

/// `location, attr_type, slot, offset` (16 bytes) per entry.
fn read_vertex_attribute(mem: &MemoryReader, ptr: u32) -> Result<VertexAttribute, WdError> {
    Ok(VertexAttribute {
        location: mem.u32(ptr)?,
        attr_type: vertex_attribute_type(mem.u32(ptr + 4)?)?,
        slot: mem.u32(ptr + 8)?,
        offset: mem.u32(ptr + 12)?,
    })
}

/// `vertex_bindings_ptr, vertex_bindings_count, vertex_attributes_ptr,
/// vertex_attributes_count, vertex_shader, fragment_shader,
/// color_target_format, blend_mode, depth_test_mode, depth_write, topology,
/// cull_mode` (48 bytes header, plus the two referenced arrays).
pub fn read_pipeline_info(mem: &MemoryReader, ptr: u32) -> Result<PipelineInfo, WdError> {
    let vertex_bindings_ptr = mem.u32(ptr)?;
    let vertex_bindings_count = mem.u32(ptr + 4)?;
    let vertex_attributes_ptr = mem.u32(ptr + 8)?;
    let vertex_attributes_count = mem.u32(ptr + 12)?;

    let mut vertex_bindings = Vec::with_capacity(vertex_bindings_count as usize);
    for i in 0..vertex_bindings_count {
        vertex_bindings.push(read_vertex_binding(mem, vertex_bindings_ptr + i * 12)?);
    }
    let mut vertex_attributes = Vec::with_capacity(vertex_attributes_count as usize);
    for i in 0..vertex_attributes_count {
        vertex_attributes.push(read_vertex_attribute(mem, vertex_attributes_ptr + i * 16)?);
    }

    Ok(PipelineInfo {
        vertex_bindings,
        vertex_attributes,
        vertex_shader: mem.u32(ptr + 16)?,
        fragment_shader: mem.u32(ptr + 20)?,
        color_target_format: pixel_format(mem.u32(ptr + 24)?)?,
        blend_mode: blend_mode(mem.u32(ptr + 28)?)?,
        depth_test_mode: depth_test_mode(mem.u32(ptr + 32)?)?,
        depth_write: mem.bool32(ptr + 36)?,
        topology: topology(mem.u32(ptr + 40)?)?,
        cull_mode: cull_mode(mem.u32(ptr + 44)?)?,
    })
}

/// `buffer, offset` (8 bytes) per entry. The wire offset is 32-bit; widened
/// to the 64-bit field `wallpaperd-gpu` carries internally.
fn read_vertex_buffer_binding(mem: &MemoryReader, ptr: u32) -> Result<VertexBufferBinding, WdError> {
    Ok(VertexBufferBinding {
        buffer: mem.u32(ptr)?,
        offset: mem.u32(ptr + 4)? as u64,
    })
}

/// `texture, sampler` (8 bytes) per entry.
fn read_texture_sampler_binding(mem: &MemoryReader, ptr: u32) -> Result<TextureSamplerBinding, WdError> {
    Ok(TextureSamplerBinding {
        texture: mem.u32(ptr)?,
        sampler: mem.u32(ptr + 4)?,
    })
}

/// `vertex_buffers_ptr, vertex_buffers_count, index_buffer,
/// texture_samplers_ptr, texture_samplers_count` (20 bytes header).
pub fn read_bindings_info(mem: &MemoryReader, ptr: u32) -> Result<BindingsInfo, WdError> {
    let vertex_buffers_ptr = mem.u32(ptr)?;
    let vertex_buffers_count = mem.u32(ptr + 4)?;
    let index_buffer = mem.u32(ptr + 8)?;
    let texture_samplers_ptr = mem.u32(ptr + 12)?;
    let texture_samplers_count = mem.u32(ptr + 16)?;

    let mut vertex_buffers = Vec::with_capacity(vertex_buffers_count as usize);
    for i in 0..vertex_buffers_count {
        vertex_buffers.push(read_vertex_buffer_binding(mem, vertex_buffers_ptr + i * 8)?);
    }
    let mut texture_samplers = Vec::with_capacity(texture_samplers_count as usize);
    for i in 0..texture_samplers_count {
        texture_samplers.push(read_texture_sampler_binding(mem, texture_samplers_ptr + i * 8)?);
    }

    Ok(BindingsInfo { vertex_buffers, index_buffer, texture_samplers })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_a_render_pass_info_record() {
        let mut buf = vec![0u8; 36];
        buf[0..4].copy_from_slice(&7u32.to_le_bytes());
        buf[4..8].copy_from_slice(&1.0f32.to_le_bytes());
        buf[20..24].copy_from_slice(&1u32.to_le_bytes());
        let mem = MemoryReader::new(&buf);
        let info = read_render_pass_info(&mem, 0).unwrap();
        assert_eq!(info.color_target, 7);
        assert_eq!(info.clear_color_rgba[0], 1.0);
        assert!(info.clear_color);
        assert!(!info.clear_depth_flag);
    }

    #[test]
    fn rejects_out_of_bounds_pointers() {
        let buf = vec![0u8; 4];
        let mem = MemoryReader::new(&buf);
        assert!(mem.u32(100).is_err());
    }

    #[test]
    fn rejects_unterminated_strings() {
        let buf = vec![b'x'; 8];
        let mem = MemoryReader::new(&buf);
        assert!(mem.cstr(0).is_err());
    }
}
