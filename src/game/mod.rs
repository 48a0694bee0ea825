pub mod cell_manager;
pub mod placement;
pub mod portal_visibility;
pub mod streaming;
