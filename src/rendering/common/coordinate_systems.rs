use glam::{Vec2, Vec3};

/// Edge length of a landblock in world units. World space is RH, Up: Z, landblock (x, y) spans
/// `[x * LANDBLOCK_SIZE, (x + 1) * LANDBLOCK_SIZE)` on the respective axis.
pub const LANDBLOCK_SIZE: f32 = 192.0;
/// Landblocks per world axis.
pub const LANDBLOCK_GRID: i32 = 256;

/// A fixed-size world tile (landblock), the unit of streaming granularity.
/// Encoded as `x << 8 | y`, which is also the high word of every cell ID inside of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpatialCellKey(pub u16);

impl SpatialCellKey {
    pub const fn new(x: u8, y: u8) -> Self {
        Self(((x as u16) << 8) | y as u16)
    }

    /// Grid coordinates outside of the world yield [`None`].
    pub fn from_grid(x: i32, y: i32) -> Option<Self> {
        if (0..LANDBLOCK_GRID).contains(&x) && (0..LANDBLOCK_GRID).contains(&y) {
            Some(Self::new(x as u8, y as u8))
        } else {
            None
        }
    }

    pub fn from_world(position: Vec3) -> Option<Self> {
        let (x, y) = world_to_grid(position.truncate());
        Self::from_grid(x, y)
    }

    #[inline]
    pub const fn x(&self) -> u8 {
        (self.0 >> 8) as u8
    }

    #[inline]
    pub const fn y(&self) -> u8 {
        (self.0 & 0xFF) as u8
    }

    /// World space position of the south west corner, at height zero.
    pub fn origin(&self) -> Vec3 {
        Vec3::new(
            self.x() as f32 * LANDBLOCK_SIZE,
            self.y() as f32 * LANDBLOCK_SIZE,
            0.0,
        )
    }

    pub fn center(&self) -> Vec2 {
        self.origin().truncate() + Vec2::splat(LANDBLOCK_SIZE * 0.5)
    }

    /// 2D distance from `position` to the center of this landblock.
    pub fn distance_to(&self, position: Vec2) -> f32 {
        self.center().distance(position)
    }
}

impl std::fmt::Display for SpatialCellKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04X}", self.0)
    }
}

#[inline]
pub fn world_to_grid(position: Vec2) -> (i32, i32) {
    (
        (position.x / LANDBLOCK_SIZE).floor() as i32,
        (position.y / LANDBLOCK_SIZE).floor() as i32,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_from_world_position() {
        let key = SpatialCellKey::from_world(Vec3::new(2.0 * LANDBLOCK_SIZE + 10.0, 5.0, -30.0)).unwrap();
        assert_eq!(key, SpatialCellKey::new(2, 0));
        assert_eq!(key.0, 0x0200);
        assert_eq!(key.to_string(), "0200");
    }

    #[test]
    fn outside_of_the_world() {
        assert!(SpatialCellKey::from_world(Vec3::new(-1.0, 10.0, 0.0)).is_none());
        assert!(SpatialCellKey::from_world(Vec3::new(256.0 * LANDBLOCK_SIZE, 10.0, 0.0)).is_none());
    }

    #[test]
    fn center_distance() {
        let key = SpatialCellKey::new(1, 1);
        assert_eq!(key.center(), Vec2::splat(1.5 * LANDBLOCK_SIZE));
        assert_eq!(key.distance_to(key.center()), 0.0);
        assert_eq!(key.distance_to(key.center() + Vec2::new(3.0, 4.0)), 5.0);
    }
}
