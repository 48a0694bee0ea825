pub mod asset_graph;
pub mod cell_renderer;
pub mod common;
/// Everything that touches the GPU. Only ever used from the render thread.
pub mod gpu;
pub mod importer;
