//! Stateless decoding of single trace entries.
//!
//! All functions operate on one `ENTRY_SIZE` byte slice and have no state;
//! the store decides what to do with the decoded values. Field accessors
//! are provided separately from the full decode so hot paths (timestamp
//! lookups during binary search) do not have to materialize a `Record`.

use crate::layout::{
    ProcessPayload, SchedSwitchPayload, ThreadPayload, ENTRY_KIND_PROCESS,
    ENTRY_KIND_SCHED_SWITCH, ENTRY_KIND_THREAD, ENTRY_KIND_UNUSED, PAYLOAD_OFFSET,
};

/// One decoded trace entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Unused,
    ProcessCreate {
        pid: i32,
        name: String,
    },
    ThreadCreate {
        tid: i32,
        pid: i32,
        name: String,
    },
    SchedSwitch {
        old_tid: i32,
        old_comm: String,
        new_tid: i32,
        new_comm: String,
        ns: u64,
        count: u32,
    },
    /// Entry kinds this reader does not know about; skipped with a warning.
    Unknown(u8),
}

/// Decode a fixed-capacity, zero-terminated name field. Names written by
/// strncpy may fill the whole buffer without a terminating NUL.
pub fn decode_name(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Kind tag of an entry.
pub fn kind(entry: &[u8]) -> u8 {
    entry[0]
}

fn switch_payload(entry: &[u8]) -> SchedSwitchPayload {
    let mut p = SchedSwitchPayload::default();
    plain::copy_from_bytes(&mut p, &entry[PAYLOAD_OFFSET..]).expect("entry shorter than payload");
    p
}

/// Timestamp of a sched-switch entry.
///
/// Contract: callers must only pass sched-switch entries (action and gap
/// indices always are); anything else is a format-level programming error.
pub fn switch_ns(entry: &[u8]) -> u64 {
    assert_eq!(kind(entry), ENTRY_KIND_SCHED_SWITCH, "entry has no timestamp");
    switch_payload(entry).ns
}

/// Ring-buffer sequence counter of a sched-switch entry.
pub fn switch_count(entry: &[u8]) -> u32 {
    assert_eq!(kind(entry), ENTRY_KIND_SCHED_SWITCH, "entry has no counter");
    switch_payload(entry).count
}

/// Outgoing (old) and incoming (new) tids of a sched-switch entry.
pub fn switch_tids(entry: &[u8]) -> (i32, i32) {
    assert_eq!(kind(entry), ENTRY_KIND_SCHED_SWITCH, "entry has no tids");
    let p = switch_payload(entry);
    (p.old_tid, p.new_tid)
}

/// Comm of the outgoing thread of a sched-switch entry.
pub fn switch_old_comm(entry: &[u8]) -> String {
    decode_name(&switch_payload(entry).old_comm)
}

/// Comm of the incoming thread of a sched-switch entry.
pub fn switch_new_comm(entry: &[u8]) -> String {
    decode_name(&switch_payload(entry).new_comm)
}

/// Decode a full entry by its kind tag.
pub fn decode(entry: &[u8]) -> Record {
    match kind(entry) {
        ENTRY_KIND_UNUSED => Record::Unused,
        ENTRY_KIND_PROCESS => {
            let mut p = ProcessPayload::default();
            plain::copy_from_bytes(&mut p, &entry[PAYLOAD_OFFSET..])
                .expect("entry shorter than payload");
            Record::ProcessCreate {
                pid: p.pid,
                name: decode_name(&p.name),
            }
        }
        ENTRY_KIND_THREAD => {
            let mut p = ThreadPayload::default();
            plain::copy_from_bytes(&mut p, &entry[PAYLOAD_OFFSET..])
                .expect("entry shorter than payload");
            Record::ThreadCreate {
                tid: p.tid,
                pid: p.pid,
                name: decode_name(&p.name),
            }
        }
        ENTRY_KIND_SCHED_SWITCH => {
            let p = switch_payload(entry);
            Record::SchedSwitch {
                old_tid: p.old_tid,
                old_comm: decode_name(&p.old_comm),
                new_tid: p.new_tid,
                new_comm: decode_name(&p.new_comm),
                ns: p.ns,
                count: p.count,
            }
        }
        k => Record::Unknown(k),
    }
}
