//! Synthetic trace construction for unit tests.

use crate::layout::{
    ProcessPayload, SchedSwitchPayload, ThreadPayload, TraceHeader, ENTRY_KIND_PROCESS,
    ENTRY_KIND_SCHED_SWITCH, ENTRY_KIND_THREAD, ENTRY_SIZE, ENTRY_START_OFFSET, NAME_LEN,
    PAYLOAD_OFFSET,
};
use crate::store::TraceStore;

pub(crate) struct TraceBuilder {
    entries: Vec<[u8; ENTRY_SIZE]>,
    done: bool,
}

fn name_field(name: &str) -> [u8; NAME_LEN] {
    let mut f = [0u8; NAME_LEN];
    f[..name.len()].copy_from_slice(name.as_bytes());
    f
}

fn comm_field(name: &str) -> [u8; 16] {
    let mut f = [0u8; 16];
    f[..name.len()].copy_from_slice(name.as_bytes());
    f
}

fn entry_with<T: plain::Plain>(kind: u8, payload: &T) -> [u8; ENTRY_SIZE] {
    let mut e = [0u8; ENTRY_SIZE];
    e[0] = kind;
    let bytes = unsafe { plain::as_bytes(payload) };
    e[PAYLOAD_OFFSET..PAYLOAD_OFFSET + bytes.len()].copy_from_slice(bytes);
    e
}

impl TraceBuilder {
    pub(crate) fn new() -> Self {
        TraceBuilder {
            entries: Vec::new(),
            done: false,
        }
    }

    pub(crate) fn process(mut self, pid: i32, name: &str) -> Self {
        let p = ProcessPayload {
            pid,
            name: name_field(name),
        };
        self.entries.push(entry_with(ENTRY_KIND_PROCESS, &p));
        self
    }

    pub(crate) fn thread(mut self, tid: i32, pid: i32, name: &str) -> Self {
        let p = ThreadPayload {
            tid,
            pid,
            name: name_field(name),
        };
        self.entries.push(entry_with(ENTRY_KIND_THREAD, &p));
        self
    }

    pub(crate) fn switch(mut self, old_tid: i32, new_tid: i32, ns: u64, count: u32) -> Self {
        let p = SchedSwitchPayload {
            old_tid,
            old_comm: comm_field(&format!("comm{old_tid}")),
            new_tid,
            new_comm: comm_field(&format!("comm{new_tid}")),
            ns,
            count,
        };
        self.entries.push(entry_with(ENTRY_KIND_SCHED_SWITCH, &p));
        self
    }

    pub(crate) fn done(mut self) -> Self {
        self.done = true;
        self
    }

    pub(crate) fn bytes(&self) -> Vec<u8> {
        let size = (ENTRY_START_OFFSET + self.entries.len() * ENTRY_SIZE) as u64;
        let h = TraceHeader {
            size,
            num_entries: self.entries.len() as u64,
            entry_start_offset: ENTRY_START_OFFSET as i32,
            entry_size: ENTRY_SIZE as i32,
            done: self.done as u8,
        };
        let mut v = vec![0u8; ENTRY_START_OFFSET];
        let hb = unsafe { plain::as_bytes(&h) };
        v[..hb.len()].copy_from_slice(hb);
        for e in &self.entries {
            v.extend_from_slice(e);
        }
        v
    }

    /// Build a store over the assembled trace, refreshed once.
    pub(crate) fn build(&self) -> TraceStore {
        let mut store = TraceStore::from_bytes(self.bytes()).unwrap();
        store.refresh().unwrap();
        store
    }

    /// Build a store without refreshing, for tests that drive ingestion.
    pub(crate) fn build_unrefreshed(&self) -> TraceStore {
        TraceStore::from_bytes(self.bytes()).unwrap()
    }
}
