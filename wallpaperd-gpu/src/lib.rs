//! GPU session, object manager, pass state machine, and pipeline ABI
//! (spec components C and D): everything between the sandbox host-api
//! shims and wgpu.

mod command;
mod format;
mod objects;
mod pipeline;
mod session;
pub mod types;

pub use command::PassState;
pub use objects::{Handle, ObjectManager};
pub use pipeline::{MAX_TEXTURE_SLOTS, MAX_UNIFORM_SLOTS};
pub use session::{GpuConfig, GpuSession, PresentMode};
