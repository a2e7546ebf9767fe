//! Wire-level record shapes for the GPU Session (spec §3 Pass-Info Records).
//!
//! These structs are the native-side landing spot for the bytes the sandbox
//! host copies out of scene memory; they carry no GPU handles of their own,
//! just the plain-old-data description of what to build.

/// One of the eight object kinds the Object Manager tracks (spec §3).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum ObjectKind {
    VertexBuffer,
    Index16Buffer,
    Index32Buffer,
    Texture,
    Sampler,
    VertexShader,
    FragmentShader,
    Pipeline,
}

impl ObjectKind {
    pub fn name(self) -> &'static str {
        match self {
            ObjectKind::VertexBuffer => "vertex_buffer",
            ObjectKind::Index16Buffer => "index16_buffer",
            ObjectKind::Index32Buffer => "index32_buffer",
            ObjectKind::Texture => "texture",
            ObjectKind::Sampler => "sampler",
            ObjectKind::VertexShader => "vertex_shader",
            ObjectKind::FragmentShader => "fragment_shader",
            ObjectKind::Pipeline => "pipeline",
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PixelFormat {
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Rgba16Float,
    R8Unorm,
    Depth16Unorm,
    /// Not a real format; marks "use whatever the swapchain is configured with".
    SwapchainMarker,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum FilterMode {
    Nearest,
    Linear,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum AddressMode {
    Clamp,
    Repeat,
    Mirror,
}

/// Superset of the original `OW_BLEND_*` spellings (spec §9 Open Questions);
/// `None`, `Alpha`, `Add` are required, the rest may be rejected as
/// `invalid-enum` by a backend that can't express them. wgpu can express all
/// seven, so this backend accepts the full set.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BlendMode {
    None,
    Alpha,
    AlphaPremultiplied,
    Add,
    AddPremultiplied,
    Modulate,
    Multiply,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DepthTestMode {
    Disabled,
    Always,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Equal,
    NotEqual,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Topology {
    Triangles,
    TriangleStrip,
    Lines,
    LineStrip,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CullMode {
    None,
    Front,
    Back,
}

/// The 28 enumerated vertex attribute vector types (spec §3).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum VertexAttributeType {
    Int,
    Int2,
    Int3,
    Int4,
    Uint,
    Uint2,
    Uint3,
    Uint4,
    Float,
    Float2,
    Float3,
    Float4,
    Byte2,
    Byte4,
    Ubyte2,
    Ubyte4,
    Ubyte2Norm,
    Ubyte4Norm,
    Short2,
    Short4,
    Ushort2,
    Ushort4,
    Short2Norm,
    Short4Norm,
    Ushort2Norm,
    Ushort4Norm,
    Half2,
    Half4,
}

#[derive(Clone, Copy, Debug)]
pub struct RenderPassInfo {
    /// 0 means swapchain.
    pub color_target: u32,
    pub clear_color_rgba: [f32; 4],
    pub clear_color: bool,
    /// 0 means no depth target.
    pub depth_target: u32,
    pub clear_depth: f32,
    pub clear_depth_flag: bool,
}

#[derive(Clone, Copy, Debug)]
pub struct TextureInfo {
    pub width: u32,
    pub height: u32,
    pub mip_levels: u32,
    /// 0..=3: mip count implied by MSAA sample count = 2^exponent.
    pub msaa_sample_exponent: u8,
    pub format: PixelFormat,
    pub render_target: bool,
}

#[derive(Clone, Copy, Debug)]
pub struct SamplerInfo {
    pub min: FilterMode,
    pub mag: FilterMode,
    pub mip: FilterMode,
    pub wrap_x: AddressMode,
    pub wrap_y: AddressMode,
    pub anisotropy: u32,
}

#[derive(Clone, Copy, Debug)]
pub struct VertexBinding {
    pub slot: u32,
    pub stride: u32,
    pub per_instance: bool,
}

#[derive(Clone, Copy, Debug)]
pub struct VertexAttribute {
    pub location: u32,
    pub attr_type: VertexAttributeType,
    pub slot: u32,
    pub offset: u32,
}

#[derive(Clone, Debug)]
pub struct PipelineInfo {
    pub vertex_bindings: Vec<VertexBinding>,
    pub vertex_attributes: Vec<VertexAttribute>,
    /// Handles into the Object Manager; validated as {VertexShader, FragmentShader}.
    pub vertex_shader: u32,
    pub fragment_shader: u32,
    pub color_target_format: PixelFormat,
    pub blend_mode: BlendMode,
    pub depth_test_mode: DepthTestMode,
    pub depth_write: bool,
    pub topology: Topology,
    pub cull_mode: CullMode,
}

#[derive(Clone, Copy, Debug)]
pub struct VertexBufferBinding {
    pub buffer: u32,
    pub offset: u64,
}

#[derive(Clone, Copy, Debug)]
pub struct TextureSamplerBinding {
    pub texture: u32,
    pub sampler: u32,
}

#[derive(Clone, Debug, Default)]
pub struct BindingsInfo {
    pub vertex_buffers: Vec<VertexBufferBinding>,
    /// 0 means no index buffer bound.
    pub index_buffer: u32,
    pub texture_samplers: Vec<TextureSamplerBinding>,
}
