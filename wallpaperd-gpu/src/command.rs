//! Deferred command recording (spec §4.D, §5 "all GPU work ... submits
//! atomically at the end of that call; intra-frame ordering is exactly call
//! order"). Host API calls append to the currently open pass; `submit()`
//! replays every pass against one real `wgpu::CommandEncoder`.
//!
//! wgpu's own `RenderPass<'encoder>` borrows its encoder for its whole
//! lifetime, which doesn't fit a host API where `begin_render_pass` and
//! `render_geometry` are separate calls reached through a sandbox trap
//! boundary in between. Recording into a plain `Vec<Command>` first and
//! replaying at submit time sidesteps that borrow entirely; each `Command`
//! embeds already-resolved wgpu resources (cheap Arc clones) rather than
//! object-manager handles, so replay never needs to touch the Object
//! Manager again.

/// One drawable unit recorded during an open render pass.
pub enum Command {
    Draw {
        pipeline: wgpu::RenderPipeline,
        vertex_buffers: Vec<(wgpu::Buffer, u64)>,
        uniform_bind_group: wgpu::BindGroup,
        texture_bind_group: wgpu::BindGroup,
        vertex_offset: u32,
        vertex_count: u32,
        instance_count: u32,
    },
    DrawIndexed {
        pipeline: wgpu::RenderPipeline,
        vertex_buffers: Vec<(wgpu::Buffer, u64)>,
        uniform_bind_group: wgpu::BindGroup,
        texture_bind_group: wgpu::BindGroup,
        index_buffer: wgpu::Buffer,
        index_format: wgpu::IndexFormat,
        index_offset: u32,
        index_count: u32,
        base_vertex: i32,
        instance_count: u32,
    },
}

/// One unit of work recorded during an open copy pass.
pub enum CopyOp {
    UploadBuffer {
        buffer: wgpu::Buffer,
        offset: u64,
        data: Vec<u8>,
    },
    UploadTexture {
        texture: wgpu::Texture,
        mip_level: u32,
        origin: wgpu::Origin3d,
        bytes_per_row: u32,
        size: wgpu::Extent3d,
        data: Vec<u8>,
    },
    GenerateMipmaps {
        texture: wgpu::Texture,
        format: wgpu::TextureFormat,
        base_size: wgpu::Extent3d,
        mip_levels: u32,
    },
}

pub struct RenderPassRecording {
    pub color_view: wgpu::TextureView,
    pub clear_color: Option<wgpu::Color>,
    pub depth_view: Option<wgpu::TextureView>,
    pub clear_depth: Option<f32>,
    pub draws: Vec<Command>,
}

pub enum FramePass {
    Copy(Vec<CopyOp>),
    Render(RenderPassRecording),
}

/// The pass-exclusivity state machine from spec §3 invariant 2, represented
/// as a tagged variant per §9's design note so mismatched begin/end calls
/// are caught before they ever reach wgpu.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PassState {
    Idle,
    CopyOpen,
    RenderOpen,
}
