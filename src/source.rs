//! Access to the shared trace artifact.
//!
//! The recorder creates a fixed-size file at a well-known path and appends
//! entries to it; we only ever map it read-only. `MAP_SHARED` means writes
//! by the recorder become visible through the mapping, so a single mapping
//! taken once the header is initialized is enough for the life of the run.

use std::fmt;
use std::fs::File;
use std::io;
use std::os::fd::AsRawFd;
use std::path::Path;
use std::slice;

use crate::layout::{TraceHeader, ENTRY_SIZE, ENTRY_START_OFFSET};

/// Errors raised while opening or decoding the trace artifact.
#[derive(Debug)]
pub enum TraceError {
    /// The artifact's advertised layout does not match the compiled-in
    /// contract, or the producer violated its own ordering guarantees.
    /// Fatal: decoding with a foreign layout would produce garbage.
    Format(String),
    /// The artifact is missing or could not be (re)mapped. Retried on the
    /// next poll tick; previously ingested state stays untouched.
    Io(io::Error),
    /// The artifact exists but the recorder has not finished initializing
    /// its header yet (the size field is written last).
    NotReady,
}

impl TraceError {
    /// Transient errors are retried by the poll loop; anything else must
    /// abort ingestion.
    pub fn is_transient(&self) -> bool {
        !matches!(self, TraceError::Format(_))
    }
}

impl fmt::Display for TraceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceError::Format(msg) => write!(f, "trace format error: {msg}"),
            TraceError::Io(e) => write!(f, "trace artifact unavailable: {e}"),
            TraceError::NotReady => write!(f, "trace artifact not initialized yet"),
        }
    }
}

impl std::error::Error for TraceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TraceError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for TraceError {
    fn from(e: io::Error) -> Self {
        TraceError::Io(e)
    }
}

/// Read-only mapping of the trace artifact.
#[derive(Debug)]
pub struct TraceMap {
    ptr: *mut libc::c_void,
    len: usize,
}

// The mapping is read-only and the pointer is never handed out mutably.
unsafe impl Send for TraceMap {}
unsafe impl Sync for TraceMap {}

impl TraceMap {
    /// Map the artifact at `path` read-only.
    ///
    /// Returns `NotReady` while the file is still too small to hold a
    /// header; `Io` if it cannot be opened or mapped.
    pub fn open(path: &Path) -> Result<TraceMap, TraceError> {
        let file = File::open(path)?;
        let len = file.metadata()?.len() as usize;
        if len < ENTRY_START_OFFSET {
            return Err(TraceError::NotReady);
        }
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ,
                libc::MAP_SHARED,
                file.as_raw_fd(),
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(TraceError::Io(io::Error::last_os_error()));
        }
        Ok(TraceMap { ptr, len })
    }

    pub fn bytes(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(self.ptr as *const u8, self.len) }
    }

    /// Snapshot of the live header. The recorder bumps `num_entries` after
    /// a memory barrier, so a volatile read gives us a consistent view of
    /// everything up to the count we observe.
    pub fn header(&self) -> TraceHeader {
        unsafe { std::ptr::read_volatile(self.ptr as *const TraceHeader) }
    }
}

impl Drop for TraceMap {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.ptr, self.len);
        }
    }
}

/// The trace bytes a store decodes from: a live mapping of the artifact,
/// or an owned buffer for replaying a completed trace in memory.
#[derive(Debug)]
pub enum TraceBuf {
    Mapped(TraceMap),
    Owned(Vec<u8>),
}

impl TraceBuf {
    pub fn bytes(&self) -> &[u8] {
        match self {
            TraceBuf::Mapped(m) => m.bytes(),
            TraceBuf::Owned(v) => v,
        }
    }

    pub fn header(&self) -> TraceHeader {
        match self {
            TraceBuf::Mapped(m) => m.header(),
            TraceBuf::Owned(v) => {
                let mut h = TraceHeader::default();
                plain::copy_from_bytes(&mut h, v).expect("buffer shorter than header");
                h
            }
        }
    }
}

/// One-time header contract check at stream open. The advertised entry
/// layout must match the compiled-in constants; a zero size field means
/// the recorder is still initializing.
pub fn check_header(h: &TraceHeader) -> Result<(), TraceError> {
    if h.size == 0 {
        return Err(TraceError::NotReady);
    }
    if h.entry_start_offset != ENTRY_START_OFFSET as i32 {
        return Err(TraceError::Format(format!(
            "entry start offset is {:#x}, expected {:#x}",
            h.entry_start_offset, ENTRY_START_OFFSET
        )));
    }
    if h.entry_size != ENTRY_SIZE as i32 {
        return Err(TraceError::Format(format!(
            "entry size is {:#x}, expected {:#x}",
            h.entry_size, ENTRY_SIZE
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_bytes(size: u64, eso: i32, es: i32) -> Vec<u8> {
        let h = TraceHeader {
            size,
            num_entries: 0,
            entry_start_offset: eso,
            entry_size: es,
            done: 0,
        };
        let mut v = vec![0u8; ENTRY_START_OFFSET];
        let bytes = unsafe { plain::as_bytes(&h) };
        v[..bytes.len()].copy_from_slice(bytes);
        v
    }

    #[test]
    fn header_contract_enforced() {
        let buf = TraceBuf::Owned(header_bytes(4096, ENTRY_START_OFFSET as i32, ENTRY_SIZE as i32));
        assert!(check_header(&buf.header()).is_ok());

        let buf = TraceBuf::Owned(header_bytes(4096, 0x10, ENTRY_SIZE as i32));
        let err = check_header(&buf.header()).unwrap_err();
        assert!(!err.is_transient());

        let buf = TraceBuf::Owned(header_bytes(4096, ENTRY_START_OFFSET as i32, 0x80));
        let err = check_header(&buf.header()).unwrap_err();
        assert!(!err.is_transient());
    }

    #[test]
    fn zero_size_is_transient() {
        let buf = TraceBuf::Owned(header_bytes(0, ENTRY_START_OFFSET as i32, ENTRY_SIZE as i32));
        let err = check_header(&buf.header()).unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn missing_artifact_is_transient() {
        let err = TraceMap::open(Path::new("/nonexistent/trace")).unwrap_err();
        assert!(err.is_transient());
    }
}
