/// A source of raw, still encoded assets that are addressed by their numeric ID.
///
/// Implementations are shared between the streaming worker and the render thread, hence `Send + Sync`.
pub trait RawAssetLoader: Send + Sync {
    /// in case of a caching implementation, this may need to clone the whole buffer!
    fn load_raw_owned(&self, id: u32) -> Option<Vec<u8>>;

    fn contains(&self, id: u32) -> bool;
}
