//! Host API Shims (spec §4.E): the `env::*` surface registered on the
//! `wasmtime::Linker`. Every entry resolves its pointer arguments against
//! the calling instance's own memory, delegates to the Object Manager / GPU
//! Session (`wallpaperd-gpu`) or the Archive Reader (`wallpaperd-archive`),
//! and on failure writes the Error Channel before returning `Err`, which
//! wasmtime turns into a trap that unwinds the running `init`/`update` call.

use wallpaperd_error::{ErrorSlot, WdError};
use wallpaperd_gpu::Handle;
use wasmtime::{Caller, Extern, Linker};

use crate::state::SandboxState;
use crate::wire::{self, MemoryReader};

/// Record `err` in the Error Channel and turn it into the trap that
/// propagates out of the scene's `init`/`update` call (spec §4.H).
fn trap(err: WdError) -> wasmtime::Error {
    let message = err.to_string();
    ErrorSlot::set(&message);
    wasmtime::Error::msg(message)
}

fn memory_of(caller: &mut Caller<'_, SandboxState>) -> Result<wasmtime::Memory, wasmtime::Error> {
    match caller.get_export("memory") {
        Some(Extern::Memory(memory)) => Ok(memory),
        _ => Err(trap(WdError::ModuleInstantiate(
            "scene module does not export a memory named 'memory'".into(),
        ))),
    }
}

/// Copy `len` bytes starting at `ptr` out of the caller's memory.
fn read_bytes(caller: &mut Caller<'_, SandboxState>, ptr: u32, len: u32) -> Result<Vec<u8>, wasmtime::Error> {
    let memory = memory_of(caller)?;
    let reader = MemoryReader::new(memory.data(&*caller));
    reader.bytes(ptr, len).map(<[u8]>::to_vec).map_err(trap)
}

fn read_cstr(caller: &mut Caller<'_, SandboxState>, ptr: u32) -> Result<String, wasmtime::Error> {
    let memory = memory_of(caller)?;
    let reader = MemoryReader::new(memory.data(&*caller));
    reader.cstr(ptr).map_err(trap)
}

fn write_u32(caller: &mut Caller<'_, SandboxState>, ptr: u32, value: u32) -> Result<(), wasmtime::Error> {
    let memory = memory_of(caller)?;
    memory
        .write(&mut *caller, ptr as usize, &value.to_le_bytes())
        .map_err(|e| trap(WdError::InvalidHandle(format!("writing out-param at {ptr}: {e}"))))
}

fn write_bytes(caller: &mut Caller<'_, SandboxState>, ptr: u32, data: &[u8]) -> Result<(), wasmtime::Error> {
    let memory = memory_of(caller)?;
    memory
        .write(&mut *caller, ptr as usize, data)
        .map_err(|e| trap(WdError::InvalidHandle(format!("writing {} bytes at {ptr}: {e}", data.len()))))
}

/// Allocate `len` bytes in the guest's own heap via its exported allocator,
/// copy `data` into them, and return the guest-side pointer. Used by
/// `load_file` and `create_texture_from_image`'s width/height writeback.
fn alloc_and_write(caller: &mut Caller<'_, SandboxState>, data: &[u8]) -> Result<u32, wasmtime::Error> {
    let alloc = caller
        .data()
        .alloc
        .ok_or_else(|| trap(WdError::ModuleInstantiate("scene module does not export an allocator".into())))?;
    let ptr = alloc
        .call(&mut *caller, data.len() as u32)
        .map_err(|e| trap(WdError::ModuleInstantiate(format!("guest allocator call failed: {e}"))))?;
    write_bytes(caller, ptr, data)?;
    Ok(ptr)
}

pub fn register(linker: &mut Linker<SandboxState>) -> Result<(), WdError> {
    linker
        .func_wrap("env", "log", |mut caller: Caller<'_, SandboxState>, msg_ptr: u32| -> Result<(), wasmtime::Error> {
            let message = read_cstr(&mut caller, msg_ptr)?;
            log::info!(target: "scene", "{message}");
            Ok(())
        })
        .map_err(link_err)?;

    linker
        .func_wrap(
            "env",
            "load_file",
            |mut caller: Caller<'_, SandboxState>, path_ptr: u32, out_ptr: u32, out_size_ptr: u32| -> Result<(), wasmtime::Error> {
                let path = read_cstr(&mut caller, path_ptr)?;
                let bytes = caller.data_mut().archive.read(&path).map_err(trap)?;
                let ptr = alloc_and_write(&mut caller, &bytes)?;
                write_u32(&mut caller, out_ptr, ptr)?;
                write_u32(&mut caller, out_size_ptr, bytes.len() as u32)?;
                Ok(())
            },
        )
        .map_err(link_err)?;

    linker
        .func_wrap("env", "begin_copy_pass", |mut caller: Caller<'_, SandboxState>| -> Result<(), wasmtime::Error> {
            caller.data_mut().gpu.begin_copy_pass().map_err(trap)
        })
        .map_err(link_err)?;
    linker
        .func_wrap("env", "end_copy_pass", |mut caller: Caller<'_, SandboxState>| -> Result<(), wasmtime::Error> {
            caller.data_mut().gpu.end_copy_pass().map_err(trap)
        })
        .map_err(link_err)?;

    linker
        .func_wrap(
            "env",
            "begin_render_pass",
            |mut caller: Caller<'_, SandboxState>, info_ptr: u32| -> Result<(), wasmtime::Error> {
                let memory = memory_of(&mut caller)?;
                let info = {
                    let reader = MemoryReader::new(memory.data(&caller));
                    wire::read_render_pass_info(&reader, info_ptr).map_err(trap)?
                };
                caller.data_mut().gpu.begin_render_pass(&info).map_err(trap)
            },
        )
        .map_err(link_err)?;
    linker
        .func_wrap("env", "end_render_pass", |mut caller: Caller<'_, SandboxState>| -> Result<(), wasmtime::Error> {
            caller.data_mut().gpu.end_render_pass().map_err(trap)
        })
        .map_err(link_err)?;

    linker
        .func_wrap(
            "env",
            "create_vertex_buffer",
            |mut caller: Caller<'_, SandboxState>, size: u32| -> Result<u32, wasmtime::Error> {
                Ok(caller.data_mut().gpu.create_vertex_buffer(size as u64).map_err(trap)?.0)
            },
        )
        .map_err(link_err)?;
    linker
        .func_wrap(
            "env",
            "create_index_buffer",
            |mut caller: Caller<'_, SandboxState>, size: u32, wide: u32| -> Result<u32, wasmtime::Error> {
                Ok(caller.data_mut().gpu.create_index_buffer(size as u64, wide != 0).map_err(trap)?.0)
            },
        )
        .map_err(link_err)?;

    linker
        .func_wrap(
            "env",
            "update_vertex_buffer",
            |mut caller: Caller<'_, SandboxState>, handle: u32, offset: u32, src_ptr: u32, size: u32| -> Result<(), wasmtime::Error> {
                let data = read_bytes(&mut caller, src_ptr, size)?;
                caller.data_mut().gpu.update_buffer(Handle(handle), offset as u64, &data).map_err(trap)
            },
        )
        .map_err(link_err)?;
    linker
        .func_wrap(
            "env",
            "update_index_buffer",
            |mut caller: Caller<'_, SandboxState>, handle: u32, offset: u32, src_ptr: u32, size: u32| -> Result<(), wasmtime::Error> {
                let data = read_bytes(&mut caller, src_ptr, size)?;
                caller.data_mut().gpu.update_buffer(Handle(handle), offset as u64, &data).map_err(trap)
            },
        )
        .map_err(link_err)?;

    linker
        .func_wrap(
            "env",
            "create_texture",
            |mut caller: Caller<'_, SandboxState>, info_ptr: u32| -> Result<u32, wasmtime::Error> {
                let memory = memory_of(&mut caller)?;
                let info = {
                    let reader = MemoryReader::new(memory.data(&caller));
                    wire::read_texture_info(&reader, info_ptr).map_err(trap)?
                };
                Ok(caller.data_mut().gpu.create_texture(&info).map_err(trap)?.0)
            },
        )
        .map_err(link_err)?;

    linker
        .func_wrap(
            "env",
            "create_texture_from_image",
            |mut caller: Caller<'_, SandboxState>, path_ptr: u32, info_ptr: u32| -> Result<u32, wasmtime::Error> {
                let path = read_cstr(&mut caller, path_ptr)?;
                let bytes = caller.data_mut().archive.read(&path).map_err(trap)?;
                let decoded = wallpaperd_assets::decode_image_to_rgba8(&bytes).map_err(trap)?;

                let memory = memory_of(&mut caller)?;
                let mut info = {
                    let reader = MemoryReader::new(memory.data(&caller));
                    wire::read_texture_info(&reader, info_ptr).map_err(trap)?
                };
                info.width = decoded.width;
                info.height = decoded.height;
                write_u32(&mut caller, info_ptr, info.width)?;
                write_u32(&mut caller, info_ptr + 4, info.height)?;

                let state = caller.data_mut();
                let handle = state.gpu.create_texture(&info).map_err(trap)?;
                state
                    .gpu
                    .update_texture(handle, 0, 0, 0, decoded.width, decoded.height, decoded.pitch, &decoded.rgba8)
                    .map_err(trap)?;
                Ok(handle.0)
            },
        )
        .map_err(link_err)?;

    linker
        .func_wrap(
            "env",
            "update_texture",
            #[allow(clippy::too_many_arguments)]
            |mut caller: Caller<'_, SandboxState>,
             handle: u32,
             mip_level: u32,
             x: u32,
             y: u32,
             width: u32,
             height: u32,
             bytes_per_row: u32,
             src_ptr: u32|
             -> Result<(), wasmtime::Error> {
                let len = u64::from(bytes_per_row) * u64::from(height);
                let data = read_bytes(&mut caller, src_ptr, len as u32)?;
                caller
                    .data_mut()
                    .gpu
                    .update_texture(Handle(handle), mip_level, x, y, width, height, bytes_per_row, &data)
                    .map_err(trap)
            },
        )
        .map_err(link_err)?;

    linker
        .func_wrap(
            "env",
            "generate_mipmaps",
            |mut caller: Caller<'_, SandboxState>, handle: u32| -> Result<(), wasmtime::Error> {
                caller.data_mut().gpu.generate_mipmaps(Handle(handle)).map_err(trap)
            },
        )
        .map_err(link_err)?;

    linker
        .func_wrap(
            "env",
            "create_sampler",
            |mut caller: Caller<'_, SandboxState>, info_ptr: u32| -> Result<u32, wasmtime::Error> {
                let memory = memory_of(&mut caller)?;
                let info = {
                    let reader = MemoryReader::new(memory.data(&caller));
                    wire::read_sampler_info(&reader, info_ptr).map_err(trap)?
                };
                Ok(caller.data_mut().gpu.create_sampler(&info).map_err(trap)?.0)
            },
        )
        .map_err(link_err)?;

    linker
        .func_wrap(
            "env",
            "create_vertex_shader_from_bytecode",
            |mut caller: Caller<'_, SandboxState>, ptr: u32, size: u32| -> Result<u32, wasmtime::Error> {
                let bytes = read_bytes(&mut caller, ptr, size)?;
                Ok(caller.data_mut().gpu.create_vertex_shader(&bytes).map_err(trap)?.0)
            },
        )
        .map_err(link_err)?;
    linker
        .func_wrap(
            "env",
            "create_fragment_shader_from_bytecode",
            |mut caller: Caller<'_, SandboxState>, ptr: u32, size: u32| -> Result<u32, wasmtime::Error> {
                let bytes = read_bytes(&mut caller, ptr, size)?;
                Ok(caller.data_mut().gpu.create_fragment_shader(&bytes).map_err(trap)?.0)
            },
        )
        .map_err(link_err)?;
    linker
        .func_wrap(
            "env",
            "create_vertex_shader_from_file",
            |mut caller: Caller<'_, SandboxState>, path_ptr: u32| -> Result<u32, wasmtime::Error> {
                let path = read_cstr(&mut caller, path_ptr)?;
                let bytes = caller.data_mut().archive.read(&path).map_err(trap)?;
                Ok(caller.data_mut().gpu.create_vertex_shader(&bytes).map_err(trap)?.0)
            },
        )
        .map_err(link_err)?;
    linker
        .func_wrap(
            "env",
            "create_fragment_shader_from_file",
            |mut caller: Caller<'_, SandboxState>, path_ptr: u32| -> Result<u32, wasmtime::Error> {
                let path = read_cstr(&mut caller, path_ptr)?;
                let bytes = caller.data_mut().archive.read(&path).map_err(trap)?;
                Ok(caller.data_mut().gpu.create_fragment_shader(&bytes).map_err(trap)?.0)
            },
        )
        .map_err(link_err)?;

    linker
        .func_wrap(
            "env",
            "create_pipeline",
            |mut caller: Caller<'_, SandboxState>, info_ptr: u32| -> Result<u32, wasmtime::Error> {
                let memory = memory_of(&mut caller)?;
                let info = {
                    let reader = MemoryReader::new(memory.data(&caller));
                    wire::read_pipeline_info(&reader, info_ptr).map_err(trap)?
                };
                Ok(caller.data_mut().gpu.create_pipeline(&info).map_err(trap)?.0)
            },
        )
        .map_err(link_err)?;

    linker
        .func_wrap(
            "env",
            "render_geometry",
            |mut caller: Caller<'_, SandboxState>,
             pipeline: u32,
             bindings_ptr: u32,
             vertex_offset: u32,
             vertex_count: u32,
             instance_count: u32|
             -> Result<(), wasmtime::Error> {
                let memory = memory_of(&mut caller)?;
                let bindings = {
                    let reader = MemoryReader::new(memory.data(&caller));
                    wire::read_bindings_info(&reader, bindings_ptr).map_err(trap)?
                };
                caller
                    .data_mut()
                    .gpu
                    .render_geometry(Handle(pipeline), &bindings, vertex_offset, vertex_count, instance_count)
                    .map_err(trap)
            },
        )
        .map_err(link_err)?;

    linker
        .func_wrap(
            "env",
            "render_geometry_indexed",
            #[allow(clippy::too_many_arguments)]
            |mut caller: Caller<'_, SandboxState>,
             pipeline: u32,
             bindings_ptr: u32,
             index_offset: u32,
             index_count: u32,
             vertex_offset: i32,
             instance_count: u32|
             -> Result<(), wasmtime::Error> {
                let memory = memory_of(&mut caller)?;
                let bindings = {
                    let reader = MemoryReader::new(memory.data(&caller));
                    wire::read_bindings_info(&reader, bindings_ptr).map_err(trap)?
                };
                caller
                    .data_mut()
                    .gpu
                    .render_geometry_indexed(Handle(pipeline), &bindings, index_offset, index_count, vertex_offset, instance_count)
                    .map_err(trap)
            },
        )
        .map_err(link_err)?;

    linker
        .func_wrap(
            "env",
            "push_vertex_uniform_data",
            |mut caller: Caller<'_, SandboxState>, slot: u32, src_ptr: u32, size: u32| -> Result<(), wasmtime::Error> {
                let data = read_bytes(&mut caller, src_ptr, size)?;
                caller.data_mut().gpu.push_vertex_uniform_data(slot, &data).map_err(trap)
            },
        )
        .map_err(link_err)?;
    linker
        .func_wrap(
            "env",
            "push_fragment_uniform_data",
            |mut caller: Caller<'_, SandboxState>, slot: u32, src_ptr: u32, size: u32| -> Result<(), wasmtime::Error> {
                let data = read_bytes(&mut caller, src_ptr, size)?;
                caller.data_mut().gpu.push_fragment_uniform_data(slot, &data).map_err(trap)
            },
        )
        .map_err(link_err)?;

    linker
        .func_wrap(
            "env",
            "get_screen_size",
            |mut caller: Caller<'_, SandboxState>, out_w: u32, out_h: u32| -> Result<(), wasmtime::Error> {
                let (width, height) = caller.data().gpu.screen_size();
                write_u32(&mut caller, out_w, width)?;
                write_u32(&mut caller, out_h, height)?;
                Ok(())
            },
        )
        .map_err(link_err)?;

    linker
        .func_wrap(
            "env",
            "get_mouse_state",
            |mut caller: Caller<'_, SandboxState>, out_x: u32, out_y: u32| -> Result<u32, wasmtime::Error> {
                let state = caller.data();
                let (x, y, buttons) = (state.mouse_x, state.mouse_y, state.mouse_buttons);
                write_bytes(&mut caller, out_x, &x.to_le_bytes())?;
                write_bytes(&mut caller, out_y, &y.to_le_bytes())?;
                Ok(buttons)
            },
        )
        .map_err(link_err)?;

    linker
        .func_wrap(
            "env",
            "get_audio_spectrum",
            |mut caller: Caller<'_, SandboxState>, out_ptr: u32, length: u32| -> Result<(), wasmtime::Error> {
                let state = caller.data();
                let mut samples = vec![0f32; length as usize];
                let available = state.audio_spectrum.len().min(samples.len());
                samples[..available].copy_from_slice(&state.audio_spectrum[..available]);
                let bytes: Vec<u8> = samples.iter().flat_map(|v| v.to_le_bytes()).collect();
                write_bytes(&mut caller, out_ptr, &bytes)
            },
        )
        .map_err(link_err)?;

    linker
        .func_wrap(
            "env",
            "get_option",
            |mut caller: Caller<'_, SandboxState>, name_ptr: u32| -> Result<u32, wasmtime::Error> {
                let name = read_cstr(&mut caller, name_ptr)?;
                Ok(caller.data().option_ptrs.get(&name).copied().unwrap_or(0))
            },
        )
        .map_err(link_err)?;

    linker
        .func_wrap("env", "free_vertex_buffer", free_handle_fn)
        .map_err(link_err)?;
    linker
        .func_wrap("env", "free_index_buffer", free_handle_fn)
        .map_err(link_err)?;
    linker.func_wrap("env", "free_texture", free_handle_fn).map_err(link_err)?;
    linker.func_wrap("env", "free_sampler", free_handle_fn).map_err(link_err)?;
    linker
        .func_wrap("env", "free_vertex_shader", free_handle_fn)
        .map_err(link_err)?;
    linker
        .func_wrap("env", "free_fragment_shader", free_handle_fn)
        .map_err(link_err)?;
    linker.func_wrap("env", "free_pipeline", free_handle_fn).map_err(link_err)?;

    Ok(())
}

/// `free_*` is always a no-fail call to `ObjectManager::free`, idempotent on
/// a stale or already-freed handle (spec §3 invariant, testable property 3).
fn free_handle_fn(mut caller: Caller<'_, SandboxState>, handle: u32) {
    caller.data_mut().gpu.free_resource(Handle(handle));
}

fn link_err(e: anyhow::Error) -> WdError {
    WdError::SandboxRuntimeInit(format!("registering host function: {e}"))
}
