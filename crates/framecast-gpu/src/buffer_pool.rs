//! Grow-only GPU buffer arena.
//!
//! One buffer per role, reallocated only when a request exceeds the current
//! capacity. Buffers never shrink while the arena lives.

use framecast_core::{FramecastError, Result};
use tracing::debug;

/// Allocation granularity. Keeps copies and bindings aligned.
pub const BUFFER_ALIGNMENT: u64 = 256;

/// What a buffer is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferRole {
    /// Uploaded float RGBA frame.
    Input,
    /// Packed 8-bit 4:2:2 output.
    Packed,
    /// 16-bit Y plane output.
    LumaPlane,
    /// 16-bit interleaved UV plane output.
    ChromaPlane,
    /// Kernel uniforms.
    Params,
    /// Host-mappable copy of the outputs.
    Readback,
}

impl BufferRole {
    pub const ALL: [Self; 6] = [
        Self::Input,
        Self::Packed,
        Self::LumaPlane,
        Self::ChromaPlane,
        Self::Params,
        Self::Readback,
    ];

    pub fn usage(self) -> wgpu::BufferUsages {
        use wgpu::BufferUsages as U;
        match self {
            Self::Input => U::STORAGE | U::COPY_DST,
            Self::Packed | Self::LumaPlane | Self::ChromaPlane => U::STORAGE | U::COPY_SRC,
            Self::Params => U::UNIFORM | U::COPY_DST,
            Self::Readback => U::MAP_READ | U::COPY_DST,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Input => "framecast_input",
            Self::Packed => "framecast_packed",
            Self::LumaPlane => "framecast_luma_plane",
            Self::ChromaPlane => "framecast_chroma_plane",
            Self::Params => "framecast_params",
            Self::Readback => "framecast_readback",
        }
    }
}

/// New capacity for a request, or `None` if `current` already suffices.
pub fn grown_capacity(current: u64, requested: u64) -> Option<u64> {
    if requested <= current {
        return None;
    }
    Some(requested.div_ceil(BUFFER_ALIGNMENT) * BUFFER_ALIGNMENT)
}

struct Slot {
    buffer: wgpu::Buffer,
    capacity: u64,
}

/// Per-role buffers owned by one compute context.
#[derive(Default)]
pub struct BufferArena {
    input: Option<Slot>,
    packed: Option<Slot>,
    luma_plane: Option<Slot>,
    chroma_plane: Option<Slot>,
    params: Option<Slot>,
    readback: Option<Slot>,
}

impl BufferArena {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, role: BufferRole) -> &Option<Slot> {
        match role {
            BufferRole::Input => &self.input,
            BufferRole::Packed => &self.packed,
            BufferRole::LumaPlane => &self.luma_plane,
            BufferRole::ChromaPlane => &self.chroma_plane,
            BufferRole::Params => &self.params,
            BufferRole::Readback => &self.readback,
        }
    }

    fn slot_mut(&mut self, role: BufferRole) -> &mut Option<Slot> {
        match role {
            BufferRole::Input => &mut self.input,
            BufferRole::Packed => &mut self.packed,
            BufferRole::LumaPlane => &mut self.luma_plane,
            BufferRole::ChromaPlane => &mut self.chroma_plane,
            BufferRole::Params => &mut self.params,
            BufferRole::Readback => &mut self.readback,
        }
    }

    /// Make the buffer for `role` hold at least `bytes`. Returns true if it was reallocated.
    pub fn ensure_capacity(&mut self, device: &wgpu::Device, role: BufferRole, bytes: u64) -> bool {
        let slot = self.slot_mut(role);
        let current = slot.as_ref().map_or(0, |s| s.capacity);
        let Some(capacity) = grown_capacity(current, bytes) else {
            return false;
        };

        debug!(role = role.label(), from = current, to = capacity, "growing GPU buffer");
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(role.label()),
            size: capacity,
            usage: role.usage(),
            mapped_at_creation: false,
        });
        *slot = Some(Slot { buffer, capacity });
        true
    }

    /// The buffer for `role`, which must have been sized with [`Self::ensure_capacity`].
    pub fn buffer(&self, role: BufferRole) -> Result<&wgpu::Buffer> {
        self.slot(role).as_ref().map(|s| &s.buffer).ok_or_else(|| {
            FramecastError::ConversionFailed(format!("{} buffer not allocated", role.label()))
        })
    }

    pub fn capacity(&self, role: BufferRole) -> u64 {
        self.slot(role).as_ref().map_or(0, |s| s.capacity)
    }

    /// Bytes held across all roles.
    pub fn allocated_bytes(&self) -> u64 {
        BufferRole::ALL.iter().map(|&role| self.capacity(role)).sum()
    }

    /// Drop one buffer, e.g. a readback left pending by a timed-out map.
    pub fn discard(&mut self, role: BufferRole) {
        *self.slot_mut(role) = None;
    }

    /// Drop every buffer.
    pub fn clear(&mut self) {
        for role in BufferRole::ALL {
            self.discard(role);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_growth_within_capacity() {
        assert_eq!(grown_capacity(1024, 1024), None);
        assert_eq!(grown_capacity(1024, 10), None);
        assert_eq!(grown_capacity(0, 0), None);
    }

    #[test]
    fn growth_rounds_to_alignment() {
        assert_eq!(grown_capacity(0, 1), Some(256));
        assert_eq!(grown_capacity(256, 257), Some(512));
        assert_eq!(grown_capacity(0, 1920 * 1080 * 16), Some(1920 * 1080 * 16));
    }

    #[test]
    fn growth_is_monotonic() {
        let mut capacity = 0;
        for request in [64, 4096, 100, 1_000_000, 512, 1_000_001] {
            if let Some(next) = grown_capacity(capacity, request) {
                assert!(next > capacity);
                capacity = next;
            }
            assert!(capacity >= request);
        }
    }

    #[test]
    fn empty_arena_reports_nothing() {
        let arena = BufferArena::new();
        assert_eq!(arena.allocated_bytes(), 0);
        assert!(arena.buffer(BufferRole::Input).is_err());
    }

    #[test]
    fn roles_have_distinct_usages() {
        assert!(BufferRole::Readback.usage().contains(wgpu::BufferUsages::MAP_READ));
        assert!(BufferRole::Params.usage().contains(wgpu::BufferUsages::UNIFORM));
        assert!(BufferRole::Packed.usage().contains(wgpu::BufferUsages::COPY_SRC));
    }
}
