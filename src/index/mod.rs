pub mod artifact_store;
pub mod checksum;
pub mod diff;
pub mod registry;
pub mod snapshot;
pub mod vector_index;
