//! Option marshalling (spec §4.F): each CLI-provided scene option gets a
//! nul-terminated copy written into the guest's own heap at init time, via
//! the scene's exported allocator. `get_option` later just hands back the
//! recorded pointer.

use std::collections::HashMap;

use wallpaperd_error::WdError;
use wasmtime::{Memory, Store, TypedFunc};

use crate::state::SandboxState;

pub fn marshal_options(
    store: &mut Store<SandboxState>,
    alloc: TypedFunc<u32, u32>,
    memory: Memory,
    options: &[(String, String)],
) -> Result<HashMap<String, u32>, WdError> {
    let mut pointers = HashMap::with_capacity(options.len());
    for (name, value) in options {
        let mut bytes = value.as_bytes().to_vec();
        bytes.push(0);
        let ptr = alloc
            .call(&mut *store, bytes.len() as u32)
            .map_err(|e| WdError::ModuleInstantiate(format!("allocating option '{name}' in guest heap: {e}")))?;
        memory
            .write(&mut *store, ptr as usize, &bytes)
            .map_err(|e| WdError::ModuleInstantiate(format!("writing option '{name}' into guest memory: {e}")))?;
        pointers.insert(name.clone(), ptr);
    }
    Ok(pointers)
}
