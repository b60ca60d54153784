//! Reconstruction of per-thread scheduling timelines from a live kernel
//! trace buffer, plus the coordinate engine to map them onto a zoomable,
//! pannable viewport.
//!
//! An external recorder writes fixed-size entries (process and thread
//! creations, scheduler switches) into a shared file; [`store::TraceStore`]
//! ingests them incrementally while the recording is still running, and
//! [`view::ViewTransform`] maps the reconstructed timelines to screen
//! coordinates for a renderer.

pub mod codec;
pub mod intern;
pub mod layout;
pub mod monitor;
pub mod scale;
pub mod source;
pub mod store;
pub mod view;

#[cfg(test)]
pub(crate) mod testutil;

pub use source::TraceError;
pub use store::TraceStore;
pub use view::{Pannable, ViewTransform, Viewport};
