//! Object Manager (spec §4.C): a two-level page table of stable 32-bit
//! handles over native GPU resources.
//!
//! Grounded in `examples/original_source/src/object_manager.c`'s
//! bucket/page layout (page size 2^10, page-count ceiling 2^10), adapted to
//! the RwLock-free single-threaded model (spec §5: no concurrent access to
//! the Object Manager) and to wgpu's Arc-backed resource handles, which make
//! "release" just "drop" with no explicit driver call needed.

use crate::types::ObjectKind;
use wallpaperd_error::WdError;

const PAGE_SIZE_LOG2: u32 = 10;
const PAGE_SIZE: usize = 1 << PAGE_SIZE_LOG2;
const MAX_PAGES: usize = 1 << 10;
const CAPACITY: usize = PAGE_SIZE * MAX_PAGES;

/// A 32-bit opaque handle. 0 is the reserved "absent" sentinel (spec §3).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Handle(pub u32);

impl Handle {
    pub const ABSENT: Handle = Handle(0);

    pub fn is_absent(self) -> bool {
        self.0 == 0
    }
}

/// The native object behind a handle. Dropping a variant releases the
/// underlying driver resource, since wgpu's own types are reference-counted
/// handles that free GPU memory in their `Drop` impl.
pub enum NativeObject {
    Buffer(wgpu::Buffer),
    Texture { texture: wgpu::Texture, view: wgpu::TextureView },
    Sampler(wgpu::Sampler),
    VertexShader(wgpu::ShaderModule),
    FragmentShader(wgpu::ShaderModule),
    Pipeline(wgpu::RenderPipeline),
}

enum Slot {
    /// Never allocated, or allocated and then freed: resolves to absent.
    Empty,
    Live(ObjectKind, NativeObject),
}

struct Page {
    slots: Vec<Slot>,
}

impl Page {
    fn new() -> Self {
        let mut slots = Vec::with_capacity(PAGE_SIZE);
        slots.resize_with(PAGE_SIZE, || Slot::Empty);
        Self { slots }
    }
}

/// Teardown order: pipelines -> shaders -> textures+samplers -> buffers
/// (spec §3 invariant 4, §5 "Process-wide state").
const TEARDOWN_ORDER: [&[ObjectKind]; 4] = [
    &[ObjectKind::Pipeline],
    &[ObjectKind::VertexShader, ObjectKind::FragmentShader],
    &[ObjectKind::Texture, ObjectKind::Sampler],
    &[
        ObjectKind::VertexBuffer,
        ObjectKind::Index16Buffer,
        ObjectKind::Index32Buffer,
    ],
];

pub struct ObjectManager {
    pages: Vec<Page>,
    /// Next slot index to hand out (0-based). The handle returned is `top + 1`.
    top: u32,
}

impl ObjectManager {
    pub fn new() -> Self {
        Self { pages: Vec::new(), top: 0 }
    }

    /// Allocate a new handle for `object`, tagging it with `kind`.
    pub fn insert(&mut self, kind: ObjectKind, object: NativeObject) -> Result<Handle, WdError> {
        let index = self.top as usize;
        let page_idx = index >> PAGE_SIZE_LOG2;
        if page_idx >= MAX_PAGES {
            return Err(WdError::ObjectManagerExhausted(format!(
                "object manager capacity ({CAPACITY}) exceeded"
            )));
        }
        if page_idx >= self.pages.len() {
            self.pages.push(Page::new());
        }
        let slot_idx = index & (PAGE_SIZE - 1);
        self.pages[page_idx].slots[slot_idx] = Slot::Live(kind, object);
        self.top += 1;
        Ok(Handle(index as u32 + 1))
    }

    fn locate(&self, handle: Handle) -> Option<(usize, usize)> {
        if handle.is_absent() {
            return None;
        }
        let index = (handle.0 - 1) as usize;
        if index as u32 >= self.top {
            return None;
        }
        Some((index >> PAGE_SIZE_LOG2, index & (PAGE_SIZE - 1)))
    }

    /// Resolve `handle` to its kind and a reference to the native object.
    /// `None` for handle 0, an out-of-range handle, or a freed slot.
    pub fn get(&self, handle: Handle) -> Option<(ObjectKind, &NativeObject)> {
        let (page_idx, slot_idx) = self.locate(handle)?;
        match &self.pages[page_idx].slots[slot_idx] {
            Slot::Live(kind, obj) => Some((*kind, obj)),
            Slot::Empty => None,
        }
    }

    /// Resolve `handle`, requiring it to carry `expected` kind.
    pub fn get_typed(
        &self,
        handle: Handle,
        expected: ObjectKind,
    ) -> Result<&NativeObject, WdError> {
        match self.get(handle) {
            None => Err(WdError::InvalidHandle(format!(
                "handle {} does not resolve to a live object",
                handle.0
            ))),
            Some((kind, obj)) if kind == expected => Ok(obj),
            Some((kind, _)) => Err(WdError::WrongHandleType(format!(
                "handle {} is a {}, expected {}",
                handle.0,
                kind.name(),
                expected.name()
            ))),
        }
    }

    /// Idempotent: returns `true` the first time a live handle is released,
    /// `false` on an already-freed or never-allocated handle (spec §4.C,
    /// testable property 3).
    pub fn free(&mut self, handle: Handle) -> bool {
        let Some((page_idx, slot_idx)) = self.locate(handle) else {
            return false;
        };
        let slot = &mut self.pages[page_idx].slots[slot_idx];
        match slot {
            Slot::Live(..) => {
                *slot = Slot::Empty; // old NativeObject dropped here, releasing the driver resource
                true
            }
            Slot::Empty => false,
        }
    }

    /// Release every outstanding handle in teardown order (spec §3 invariant 4).
    pub fn drop_all(&mut self) {
        for group in TEARDOWN_ORDER {
            for page in &mut self.pages {
                for slot in &mut page.slots {
                    let matches = matches!(slot, Slot::Live(kind, _) if group.contains(kind));
                    if matches {
                        *slot = Slot::Empty;
                    }
                }
            }
        }
    }
}

impl Default for ObjectManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Constructing a `NativeObject` needs a live `wgpu::Device`, and
    // `session.rs` has no device-backed tests of its own (no test in this
    // tree spins up a real adapter, matching the teacher, which carries none
    // either). Handle lifecycle against real resources is therefore
    // untested; here we only exercise the parts of the page table that
    // don't need a device: absent-handle resolution and the stated capacity
    // ceiling.

    #[test]
    fn handle_zero_is_always_absent() {
        let manager = ObjectManager::new();
        assert!(manager.get(Handle::ABSENT).is_none());
    }

    #[test]
    fn free_on_never_allocated_handle_is_noop() {
        let mut manager = ObjectManager::new();
        assert!(!manager.free(Handle(1)));
    }

    #[test]
    fn capacity_matches_spec_ceiling() {
        assert_eq!(CAPACITY, 1 << 20);
    }
}
