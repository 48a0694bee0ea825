//! This module contains the read-through caches that turn numeric asset IDs into parsed assets and
//! provide the deduplication for the geometry preparation.
//!
//! Many placed interior cells reference the same environment (the template of room shapes) and the
//! same surfaces, so these are resolved once and shared as [`std::sync::Arc`]s. Whoever has the
//! first reference to any specific asset takes care of loading and parsing it while holding the
//! lock of that asset's slot, so racing resolutions of the same ID wait instead of doing the work
//! twice. Different IDs never wait on each other beyond the short shard lock of the map.
//!
//! Resolution may fail (missing or malformed assets). Failures are recorded per ID, so that a
//! known-bad ID fails fast instead of hitting the asset source again for every cell that refers to
//! it. A failure is never fatal: the preparation skips the affected polygon or cell.
//!
//! Decoded textures are the only large assets in here, they live in a cache that is bounded by
//! their byte size and may be evicted, in which case they are loaded again on demand.
//!
//! Note: GPU memory is not managed here, see [`crate::rendering::gpu::resource_cache`]. This
//! separation is what allows the graph to be used from the streaming worker thread.
pub mod asset_resolver;
pub mod generators;
pub mod resolver;
