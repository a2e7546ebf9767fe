//! Per-instance store data threaded through every host-API call via
//! `wasmtime::Caller::data_mut`.

use std::collections::HashMap;

use wallpaperd_archive::ArchiveReader;
use wallpaperd_error::WdError;
use wallpaperd_gpu::GpuSession;
use wasmtime::{Memory, TypedFunc};

/// Everything a host-API entry needs besides its own arguments: the GPU
/// Session (spec §4.D) it records work against, the scene's Archive Reader
/// (§4.A) for `load_file`/shader/texture-from-file lookups, the guest's
/// exported allocator for `load_file`/`get_option` out-params, and the
/// pre-marshalled scene option pointers (§4.F "Option marshalling").
pub struct SandboxState {
    pub gpu: GpuSession,
    pub archive: ArchiveReader,
    pub memory: Option<Memory>,
    pub alloc: Option<TypedFunc<u32, u32>>,
    pub option_ptrs: HashMap<String, u32>,
    pub mouse_x: f32,
    pub mouse_y: f32,
    pub mouse_buttons: u32,
    pub audio_spectrum: Vec<f32>,
}

impl SandboxState {
    pub fn new(gpu: GpuSession, archive: ArchiveReader) -> Self {
        Self {
            gpu,
            archive,
            memory: None,
            alloc: None,
            option_ptrs: HashMap::new(),
            mouse_x: 0.0,
            mouse_y: 0.0,
            mouse_buttons: 0,
            audio_spectrum: Vec::new(),
        }
    }

    pub fn memory(&self) -> Result<Memory, WdError> {
        self.memory
            .ok_or_else(|| WdError::ModuleInstantiate("scene module does not export a memory named 'memory'".into()))
    }
}
