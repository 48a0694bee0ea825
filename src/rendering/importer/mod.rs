/// This module handles converting the types from cellstream-files into prepared geometry: upload-ready
/// vertex and index buffers plus the portal data that the visibility needs.
/// The preparation is GPU agnostic and thread-safe, so it runs on the streaming worker, while only the
/// upload of the prepared result happens on the render thread.
pub mod envcell_importer;
