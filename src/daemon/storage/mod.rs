//!  Storage is organized through [store::MeasurementStore] on top of [chunk_storage::ChunkDirectory].
//!  The basic idea is:
//!   - There is a directory with all the chunk files.
//!   - A chunk file holds one [entities::Batch] and is rewritten in full on every flush.
//!   - Chunks are rotated after an hour and never touched again afterwards.

pub mod chunk_storage;
pub mod entities;
pub mod store;
