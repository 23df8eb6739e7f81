//! Core types with newtype pattern for type safety.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Add;

/// Frame number (position in the coded sequence, starting at zero).
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FrameNumber(pub u64);

impl FrameNumber {
    pub const ZERO: Self = Self(0);

    /// Whether this frame falls on a GOP boundary (`gop == 0` disables periodic key frames).
    pub fn is_gop_boundary(self, gop: u32) -> bool {
        gop != 0 && self.0 % gop as u64 == 0
    }
}

impl Add<u64> for FrameNumber {
    type Output = Self;
    fn add(self, rhs: u64) -> Self {
        Self(self.0 + rhs)
    }
}

impl fmt::Display for FrameNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "F{}", self.0)
    }
}

/// Picture resolution in luma samples.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const CIF: Self = Self {
        width: 352,
        height: 288,
    };
    pub const VGA: Self = Self {
        width: 640,
        height: 480,
    };

    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn pixel_count(self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Number of `block`-sized blocks per row and per column (edge blocks may be partial).
    pub fn block_grid(self, block: u32) -> (u32, u32) {
        let block = block.max(1);
        (self.width.div_ceil(block), self.height.div_ceil(block))
    }

    /// Total number of `block`-sized blocks covering the picture.
    pub fn block_count(self, block: u32) -> usize {
        let (cols, rows) = self.block_grid(block);
        cols as usize * rows as usize
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gop_boundaries() {
        assert!(FrameNumber(0).is_gop_boundary(30));
        assert!(!FrameNumber(29).is_gop_boundary(30));
        assert!(FrameNumber(60).is_gop_boundary(30));
        assert!(!FrameNumber(0).is_gop_boundary(0));
    }

    #[test]
    fn block_grid_rounds_up() {
        let cif = Resolution::CIF;
        assert_eq!(cif.block_grid(16), (22, 18));
        assert_eq!(Resolution::new(100, 20).block_grid(16), (7, 2));
        assert_eq!(Resolution::new(100, 20).block_count(16), 14);
    }

    #[test]
    fn resolution_display() {
        assert_eq!(Resolution::VGA.to_string(), "640x480");
        assert_eq!(Resolution::VGA.pixel_count(), 307_200);
    }
}
