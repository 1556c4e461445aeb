//! Grid Geometry
//!
//! Integer tile coordinates on a grid that is toroidal in x.
//! Rows are addressed bottom-up: y = 0 is the bottom row.

use serde::{Serialize, Deserialize};

/// A tile coordinate on the level grid.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GridPos {
    /// Column
    pub x: i32,
    /// Row (bottom-up)
    pub y: i32,
}

impl GridPos {
    /// Off-grid position for pre-allocated entities without a spawn point.
    pub const PARKED: GridPos = GridPos { x: -100, y: -100 };

    /// Create a new position.
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Is this the parking sentinel?
    #[inline]
    pub fn is_parked(self) -> bool {
        self == Self::PARKED
    }

    /// Offset by (dx, dy).
    #[inline]
    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Self { x: self.x + dx, y: self.y + dy }
    }
}

/// Grid dimensions of a level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridSize {
    /// Tiles per row
    pub width: i32,
    /// Number of rows
    pub height: i32,
}

impl GridSize {
    /// Create a new size.
    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    /// Check whether a position lies on the grid.
    #[inline]
    pub fn contains(&self, pos: GridPos) -> bool {
        self.contains_x(pos.x) && pos.y >= 0 && pos.y < self.height
    }

    /// Check whether a column lies in `[0, width)`.
    #[inline]
    pub fn contains_x(&self, x: i32) -> bool {
        x >= 0 && x < self.width
    }

    /// Wrap a column onto `[0, width)`.
    #[inline]
    pub fn wrap_x(&self, x: i32) -> i32 {
        if self.width <= 0 {
            return x;
        }
        x.rem_euclid(self.width)
    }
}

/// Signed horizontal displacement of minimal magnitude on a ring of
/// circumference `width`.
///
/// The result lies in `(-width/2, width/2]`, so a step across the seam
/// (`width-1 -> 0`) reads as `+1` instead of `-(width-1)`.
pub fn torus_delta(prev_x: i32, cur_x: i32, width: i32) -> i32 {
    if width <= 0 {
        return cur_x - prev_x;
    }
    let mut dx = (cur_x - prev_x).rem_euclid(width);
    // compare doubled values so odd widths stay exact
    if 2 * dx > width {
        dx -= width;
    }
    dx
}

/// Median of a sample set (upper median for even counts).
///
/// Sorts the slice in place. Returns 0 for an empty slice.
pub fn median(samples: &mut [i32]) -> i32 {
    if samples.is_empty() {
        return 0;
    }
    samples.sort_unstable();
    samples[samples.len() / 2]
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_torus_delta_plain_steps() {
        assert_eq!(torus_delta(5, 6, 20), 1);
        assert_eq!(torus_delta(6, 5, 20), -1);
        assert_eq!(torus_delta(7, 7, 20), 0);
    }

    #[test]
    fn test_torus_delta_across_seam() {
        assert_eq!(torus_delta(19, 0, 20), 1);
        assert_eq!(torus_delta(0, 19, 20), -1);
        assert_eq!(torus_delta(9, 0, 10), 1);
    }

    #[test]
    fn test_torus_delta_half_width_is_positive() {
        assert_eq!(torus_delta(0, 5, 10), 5);
        assert_eq!(torus_delta(5, 0, 10), 5);
        assert_eq!(torus_delta(0, 4, 7), -3);
        assert_eq!(torus_delta(0, 3, 7), 3);
    }

    #[test]
    fn test_median() {
        assert_eq!(median(&mut []), 0);
        assert_eq!(median(&mut [1]), 1);
        assert_eq!(median(&mut [1, -1, 1]), 1);
        assert_eq!(median(&mut [0, 1, 0, 1]), 1);
        assert_eq!(median(&mut [0, 0, 0, 1]), 0);
    }

    #[test]
    fn test_wrap_and_contains() {
        let size = GridSize::new(10, 5);
        assert_eq!(size.wrap_x(10), 0);
        assert_eq!(size.wrap_x(-1), 9);
        assert!(size.contains(GridPos::new(9, 4)));
        assert!(!size.contains(GridPos::new(10, 4)));
        assert!(!size.contains(GridPos::PARKED));
    }

    proptest! {
        #[test]
        fn prop_torus_delta_range(width in 1i32..200, a in 0i32..200, b in 0i32..200) {
            let prev = a % width;
            let cur = b % width;
            let dx = torus_delta(prev, cur, width);
            // (-width/2, width/2] expressed on doubled values
            prop_assert!(2 * dx > -width);
            prop_assert!(2 * dx <= width);
            prop_assert_eq!((prev + dx).rem_euclid(width), cur);
        }

        #[test]
        fn prop_torus_delta_seam(width in 2i32..200) {
            prop_assert_eq!(torus_delta(width - 1, 0, width), 1);
        }
    }
}
