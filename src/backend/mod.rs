//! Backends - concrete render-strategy implementations shipped with the
//! crate.
//!
//! Visual backends (DOM, terminal) live with their platforms; the crate
//! ships the in-memory reference tree used for headless rendering and for
//! exercising the strategy contract.

pub mod memory;

pub use memory::{MemoryBackend, MemoryHandle};
