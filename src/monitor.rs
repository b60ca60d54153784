//! Poll loop driving incremental ingestion while the recorder is live.

use std::path::Path;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use anyhow::Result;

use crate::store::TraceStore;

/// Poll the trace artifact at `path` until the recorder marks it done or
/// a message (or disconnect) arrives on `stop_rx`.
///
/// The artifact may not exist yet when we start; transient errors are
/// logged and retried on the next tick. `on_refresh` runs after every
/// refresh with the store read-locked, so a renderer sharing the returned
/// handle sees updates between ticks. Returns `None` when stopped before
/// the artifact ever appeared.
pub fn poll_until_done<F>(
    path: &Path,
    interval: Duration,
    stop_rx: &Receiver<()>,
    mut on_refresh: F,
) -> Result<Option<Arc<RwLock<TraceStore>>>>
where
    F: FnMut(&TraceStore),
{
    let mut shared: Option<Arc<RwLock<TraceStore>>> = None;
    loop {
        if shared.is_none() {
            match TraceStore::open(path) {
                Ok(s) => shared = Some(Arc::new(RwLock::new(s))),
                Err(e) if e.is_transient() => {
                    eprintln!("Warning: {e}, waiting for the recorder");
                }
                Err(e) => return Err(e.into()),
            }
        }
        let mut done = false;
        if let Some(store) = &shared {
            {
                let mut store = store.write().unwrap();
                match store.refresh() {
                    Ok(()) => {}
                    Err(e) if e.is_transient() => eprintln!("Warning: {e}"),
                    Err(e) => return Err(e.into()),
                }
                done = store.done();
            }
            on_refresh(&store.read().unwrap());
        }
        if done {
            break;
        }
        match stop_rx.recv_timeout(interval) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
    }
    Ok(shared)
}
