//! Sandbox Host (spec §4.F): owns the process-wide wasmtime `Engine` and
//! `Linker`, loads scene modules (preferring a cached AOT artifact over the
//! original bytes), instantiates them with the host-API surface from
//! [`hostapi`] wired in, and drives the `init`/`update` exports.

mod hostapi;
mod options;
mod state;
mod wire;

use wallpaperd_aotcache::AotCache;
use wallpaperd_archive::ArchiveReader;
use wallpaperd_error::{ErrorSlot, WdError};
use wallpaperd_gpu::GpuSession;
use wasmtime::{Engine, Instance, Linker, Module, Store, TypedFunc};

pub use state::SandboxState;

/// Sandbox stack size (spec §4.F: "Instantiation uses a 4 MiB sandbox stack").
const SANDBOX_STACK_BYTES: usize = 4 * 1024 * 1024;

/// Process-wide sandbox runtime state: one `Engine`, one `Linker` with every
/// `env::*` entry registered, one `AotCache`. Cheap to hold for the whole
/// process lifetime (spec §4.F: "the runtime is process-wide state").
pub struct SandboxHost {
    engine: Engine,
    linker: Linker<SandboxState>,
    aot_cache: AotCache,
}

impl SandboxHost {
    pub fn new() -> Result<Self, WdError> {
        let mut config = wasmtime::Config::new();
        config.max_wasm_stack(SANDBOX_STACK_BYTES);
        let engine = Engine::new(&config)
            .map_err(|e| WdError::SandboxRuntimeInit(format!("creating wasmtime engine: {e}")))?;

        let mut linker = Linker::new(&engine);
        hostapi::register(&mut linker)?;

        let aot_cache = AotCache::new()?;

        Ok(Self { engine, linker, aot_cache })
    }

    /// Load `scene.wasm`'s module, preferring a cached AOT artifact. A
    /// cached artifact that fails to deserialize (stale engine version, disk
    /// corruption) is discarded and recompiled once (spec §4.F, §4.B).
    fn load_module(&self, wasm_bytes: &[u8]) -> Result<Module, WdError> {
        if let Some(cached) = self.aot_cache.try_load(wasm_bytes) {
            match unsafe { Module::deserialize(&self.engine, &cached) } {
                Ok(module) => return Ok(module),
                Err(e) => {
                    log::warn!("cached AOT artifact failed to load, recompiling: {e}");
                    self.aot_cache.invalidate(wasm_bytes);
                }
            }
        }

        match self.aot_cache.compile(&self.engine, wasm_bytes) {
            Ok(compiled) => unsafe { Module::deserialize(&self.engine, &compiled) }
                .map_err(|e| WdError::ModuleLoad(format!("loading freshly compiled module: {e}"))),
            Err(e) => {
                log::warn!("AOT compilation failed ({e}), loading module bytes directly");
                Module::new(&self.engine, wasm_bytes).map_err(|e| WdError::ModuleLoad(format!("{e}")))
            }
        }
    }

    /// Load, instantiate and initialise a scene. `gpu`/`archive` move into
    /// the instance's store data and live exactly as long as it does.
    pub fn load_scene(
        &self,
        gpu: GpuSession,
        mut archive: ArchiveReader,
        options: &[(String, String)],
    ) -> Result<SceneInstance, WdError> {
        let wasm_bytes = archive.read("scene.wasm")?;
        let module = self.load_module(&wasm_bytes)?;

        let mut store = Store::new(&self.engine, SandboxState::new(gpu, archive));
        let instance = self
            .linker
            .instantiate(&mut store, &module)
            .map_err(|e| WdError::ModuleInstantiate(format!("{e}")))?;

        let memory = instance
            .get_memory(&mut store, "memory")
            .ok_or_else(|| WdError::ModuleInstantiate("scene module does not export a memory named 'memory'".into()))?;
        store.data_mut().memory = Some(memory);

        if !options.is_empty() {
            let alloc = instance
                .get_typed_func::<u32, u32>(&mut store, "wallpaperd_alloc")
                .map_err(|e| WdError::ModuleInstantiate(format!("scene module does not export 'wallpaperd_alloc': {e}")))?;
            store.data_mut().alloc = Some(alloc);
            let pointers = options::marshal_options(&mut store, alloc, memory, options)?;
            store.data_mut().option_ptrs = pointers;
        }

        let mut scene = SceneInstance { store, instance };
        scene.call_init()?;
        Ok(scene)
    }
}

/// A running scene: a wasmtime `Store`/`Instance` pair plus the resolved
/// `init`/`update` exports.
pub struct SceneInstance {
    store: Store<SandboxState>,
    instance: Instance,
}

impl SceneInstance {
    fn call_init(&mut self) -> Result<(), WdError> {
        ErrorSlot::clear();
        let init: TypedFunc<(), ()> = self
            .instance
            .get_typed_func(&mut self.store, "init")
            .map_err(|e| WdError::ModuleInstantiate(format!("scene module does not export 'init': {e}")))?;
        self.store.data_mut().gpu.begin_copy_pass()?;
        let result = init.call(&mut self.store, ());
        if result.is_ok() {
            self.store.data_mut().gpu.end_copy_pass()?;
        } else if let Err(e) = self.store.data_mut().gpu.end_copy_pass() {
            log::warn!("init trapped and left the copy pass in an unexpected state: {e}");
        }
        self.raise_on_failure(result)
    }

    /// Drive one frame. `delta` is already clamped and speed-scaled by the
    /// frame loop (spec §4.G step 7).
    pub fn update(&mut self, delta: f32) -> Result<(), WdError> {
        ErrorSlot::clear();
        let update: TypedFunc<f32, ()> = self
            .instance
            .get_typed_func(&mut self.store, "update")
            .map_err(|e| WdError::ModuleInstantiate(format!("scene module does not export 'update': {e}")))?;
        let result = update.call(&mut self.store, delta);
        self.raise_on_failure(result)
    }

    /// Prefer the Error Channel's message over wasmtime's own trap
    /// diagnostic when both are available (spec §4.H).
    fn raise_on_failure(&self, result: Result<(), wasmtime::Error>) -> Result<(), WdError> {
        match result {
            Ok(()) => Ok(()),
            Err(e) => Err(match ErrorSlot::get() {
                Some(message) => WdError::SceneTrap(message),
                None => WdError::SceneTrap(e.to_string()),
            }),
        }
    }

    pub fn gpu_mut(&mut self) -> &mut GpuSession {
        &mut self.store.data_mut().gpu
    }

    pub fn set_mouse_state(&mut self, x: f32, y: f32, buttons: u32) {
        let state = self.store.data_mut();
        state.mouse_x = x;
        state.mouse_y = y;
        state.mouse_buttons = buttons;
    }

    pub fn set_audio_spectrum(&mut self, spectrum: Vec<f32>) {
        self.store.data_mut().audio_spectrum = spectrum;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn minimal_scene_wasm() -> Vec<u8> {
        wat::parse_str(
            r#"
            (module
                (import "env" "log" (func $log (param i32)))
                (memory (export "memory") 1)
                (func (export "wallpaperd_alloc") (param i32) (result i32)
                    i32.const 1024)
                (func (export "init"))
                (func (export "update") (param f32)))
            "#,
        )
        .unwrap()
    }

    fn scratch_archive(name: &str, wasm: &[u8]) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("wallpaperd-sandbox-tests-{name}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("scene.owp");
        let file = std::fs::File::create(&path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        zip.start_file("scene.wasm", options).unwrap();
        zip.write_all(wasm).unwrap();
        zip.finish().unwrap();
        path
    }

    #[test]
    fn load_module_falls_back_when_aot_cache_unavailable() {
        let engine = Engine::default();
        let wasm = minimal_scene_wasm();
        let module = Module::new(&engine, &wasm);
        assert!(module.is_ok());
    }

    #[test]
    fn archive_scene_wasm_round_trips() {
        let path = scratch_archive("roundtrip", &minimal_scene_wasm());
        let mut archive = ArchiveReader::open(&path).unwrap();
        assert!(archive.contains("scene.wasm"));
        let bytes = archive.read("scene.wasm").unwrap();
        assert!(!bytes.is_empty());
        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }
}
