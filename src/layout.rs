//! Binary layout of the shared trace buffer.
//!
//! The external recorder creates a fixed-size file at a well-known path,
//! writes a header at offset 0 and appends fixed-size entries starting at
//! `ENTRY_START_OFFSET`. Everything is little-endian. The structs below
//! mirror the recorder's C layout byte for byte; the header advertises the
//! entry region offset and entry size so a reader can refuse a foreign
//! layout instead of decoding garbage.

use plain::Plain;

/// Offset of the first entry relative to the start of the buffer.
pub const ENTRY_START_OFFSET: usize = 0x20;

/// Size of one entry in bytes. The kind tag sits at offset 0, the payload
/// at offset `PAYLOAD_OFFSET`; the remainder is padding.
pub const ENTRY_SIZE: usize = 0x40;

/// Offset of the per-kind payload within an entry.
pub const PAYLOAD_OFFSET: usize = 0x08;

pub const ENTRY_KIND_UNUSED: u8 = 0;
pub const ENTRY_KIND_SCHED_SWITCH: u8 = 1;
pub const ENTRY_KIND_PROCESS: u8 = 2;
pub const ENTRY_KIND_THREAD: u8 = 3;

/// Length of a thread comm recorded in a sched-switch entry (TASK_COMM_LEN).
pub const COMM_LEN: usize = 16;

/// Length of a process or thread name in a creation entry.
pub const NAME_LEN: usize = 32;

/// Header at the start of the shared buffer.
///
/// `size` is written last by the recorder (after a memory barrier), so a
/// nonzero `size` means the rest of the header is valid.
#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct TraceHeader {
    pub size: u64,
    pub num_entries: u64,
    pub entry_start_offset: i32,
    pub entry_size: i32,
    pub done: u8,
}

/// Payload of a process-create entry.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct ProcessPayload {
    pub pid: i32,
    pub name: [u8; NAME_LEN],
}

/// Payload of a thread-create entry.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct ThreadPayload {
    pub tid: i32,
    pub pid: i32,
    pub name: [u8; NAME_LEN],
}

/// Payload of a sched-switch entry. `old` is the thread going off-CPU,
/// `new` the thread going on-CPU. `count` is the recorder's ring-buffer
/// sequence counter used for loss detection.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct SchedSwitchPayload {
    pub old_tid: i32,
    pub old_comm: [u8; COMM_LEN],
    pub new_tid: i32,
    pub new_comm: [u8; COMM_LEN],
    pub ns: u64,
    pub count: u32,
}

impl Default for ProcessPayload {
    fn default() -> Self {
        ProcessPayload {
            pid: 0,
            name: [0; NAME_LEN],
        }
    }
}

impl Default for ThreadPayload {
    fn default() -> Self {
        ThreadPayload {
            tid: 0,
            pid: 0,
            name: [0; NAME_LEN],
        }
    }
}

impl Default for SchedSwitchPayload {
    fn default() -> Self {
        SchedSwitchPayload {
            old_tid: 0,
            old_comm: [0; COMM_LEN],
            new_tid: 0,
            new_comm: [0; COMM_LEN],
            ns: 0,
            count: 0,
        }
    }
}

// Plain lets us decode these straight from the mapped bytes.
unsafe impl Plain for TraceHeader {}
unsafe impl Plain for ProcessPayload {}
unsafe impl Plain for ThreadPayload {}
unsafe impl Plain for SchedSwitchPayload {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{offset_of, size_of};

    #[test]
    fn header_layout() {
        assert_eq!(offset_of!(TraceHeader, size), 0x00);
        assert_eq!(offset_of!(TraceHeader, num_entries), 0x08);
        assert_eq!(offset_of!(TraceHeader, entry_start_offset), 0x10);
        assert_eq!(offset_of!(TraceHeader, entry_size), 0x14);
        assert_eq!(offset_of!(TraceHeader, done), 0x18);
        assert!(size_of::<TraceHeader>() <= ENTRY_START_OFFSET);
    }

    #[test]
    fn payload_layout() {
        // Offsets within the entry are PAYLOAD_OFFSET + field offset; these
        // must match the recorder's advertised layout.
        assert_eq!(PAYLOAD_OFFSET + offset_of!(SchedSwitchPayload, old_tid), 0x08);
        assert_eq!(PAYLOAD_OFFSET + offset_of!(SchedSwitchPayload, old_comm), 0x0c);
        assert_eq!(PAYLOAD_OFFSET + offset_of!(SchedSwitchPayload, new_tid), 0x1c);
        assert_eq!(PAYLOAD_OFFSET + offset_of!(SchedSwitchPayload, new_comm), 0x20);
        assert_eq!(PAYLOAD_OFFSET + offset_of!(SchedSwitchPayload, ns), 0x30);
        assert_eq!(PAYLOAD_OFFSET + offset_of!(SchedSwitchPayload, count), 0x38);

        assert_eq!(PAYLOAD_OFFSET + offset_of!(ProcessPayload, pid), 0x08);
        assert_eq!(PAYLOAD_OFFSET + offset_of!(ProcessPayload, name), 0x0c);

        assert_eq!(PAYLOAD_OFFSET + offset_of!(ThreadPayload, tid), 0x08);
        assert_eq!(PAYLOAD_OFFSET + offset_of!(ThreadPayload, pid), 0x0c);
        assert_eq!(PAYLOAD_OFFSET + offset_of!(ThreadPayload, name), 0x10);
    }

    #[test]
    fn payloads_fit_entry() {
        assert!(PAYLOAD_OFFSET + size_of::<SchedSwitchPayload>() <= ENTRY_SIZE);
        assert!(PAYLOAD_OFFSET + size_of::<ProcessPayload>() <= ENTRY_SIZE);
        assert!(PAYLOAD_OFFSET + size_of::<ThreadPayload>() <= ENTRY_SIZE);
    }
}
