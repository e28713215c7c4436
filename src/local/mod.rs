//! Filesystem-backed collaborators used by the binary.

mod frame_source;
mod object_storage;

pub use frame_source::StillImageFrameSource;
pub use object_storage::LocalObjectStorage;
