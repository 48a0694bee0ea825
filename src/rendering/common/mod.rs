/// Axis aligned boxes, planes, rays and the view frustum. Everything that culling and picking needs.
pub mod bounds;
pub mod camera;
/// The world is a grid of landblocks. The streaming unit and the world space conventions live here.
pub mod coordinate_systems;
/// basic types (e.g. prepared geometry) to abstract away from both the asset format and the GPU device.
pub mod types;
