//! Motion search results and estimator mode descriptions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Full-pel displacement of one block, plus the block it belongs to.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MotionVector {
    /// Block column (in blocks, not pixels).
    pub block_x: u32,
    /// Block row (in blocks, not pixels).
    pub block_y: u32,
    pub dx: i32,
    pub dy: i32,
}

impl MotionVector {
    pub fn zero(block_x: u32, block_y: u32) -> Self {
        Self {
            block_x,
            block_y,
            dx: 0,
            dy: 0,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.dx == 0 && self.dy == 0
    }

    pub fn magnitude_sqr(&self) -> i64 {
        let (dx, dy) = (self.dx as i64, self.dy as i64);
        dx * dx + dy * dy
    }
}

/// One vector per block, in raster order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotionField {
    /// Blocks per row.
    pub columns: u32,
    /// Blocks per column.
    pub rows: u32,
    pub vectors: Vec<MotionVector>,
}

impl MotionField {
    /// An all-zero field for a `columns x rows` block grid.
    pub fn zeroed(columns: u32, rows: u32) -> Self {
        let vectors = (0..rows)
            .flat_map(|by| (0..columns).map(move |bx| MotionVector::zero(bx, by)))
            .collect();
        Self {
            columns,
            rows,
            vectors,
        }
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn get(&self, block_x: u32, block_y: u32) -> Option<&MotionVector> {
        if block_x >= self.columns || block_y >= self.rows {
            return None;
        }
        self.vectors
            .get(block_y as usize * self.columns as usize + block_x as usize)
    }

    /// Count of blocks with a non-zero displacement.
    pub fn moving_blocks(&self) -> usize {
        self.vectors.iter().filter(|v| !v.is_zero()).count()
    }

    /// Flatten to `[dx0, dy0, dx1, dy1, ...]` for the named-property protocol.
    pub fn to_interleaved(&self) -> Vec<i32> {
        self.vectors.iter().flat_map(|v| [v.dx, v.dy]).collect()
    }
}

/// Output of a single motion search.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotionEstimate {
    pub field: MotionField,
    /// Mean per-block distortion over the blocks included in the average.
    pub average_distortion: u64,
}

/// Raw estimator mode value: `0` asks the estimator to decide, other values
/// are defined by each estimator and listed by its capabilities.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EstimationMode(pub u32);

impl EstimationMode {
    pub const AUTO: Self = Self(0);

    pub fn is_auto(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for EstimationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_auto() {
            write!(f, "auto")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Capability entry describing one accepted mode value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeInfo {
    pub mode: EstimationMode,
    pub name: String,
    pub description: String,
}

impl ModeInfo {
    pub fn new(mode: u32, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            mode: EstimationMode(mode),
            name: name.into(),
            description: description.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zeroed_field_is_raster_ordered() {
        let field = MotionField::zeroed(3, 2);
        assert_eq!(field.len(), 6);
        assert_eq!(field.vectors[0], MotionVector::zero(0, 0));
        assert_eq!(field.vectors[2], MotionVector::zero(2, 0));
        assert_eq!(field.vectors[3], MotionVector::zero(0, 1));
        assert_eq!(field.get(2, 1), Some(&MotionVector::zero(2, 1)));
        assert!(field.get(3, 0).is_none());
        assert_eq!(field.moving_blocks(), 0);
    }

    #[test]
    fn interleaved_layout() {
        let mut field = MotionField::zeroed(2, 1);
        field.vectors[1].dx = -3;
        field.vectors[1].dy = 2;
        assert_eq!(field.to_interleaved(), vec![0, 0, -3, 2]);
        assert_eq!(field.moving_blocks(), 1);
        assert_eq!(field.vectors[1].magnitude_sqr(), 13);
    }

    #[test]
    fn mode_display() {
        assert_eq!(EstimationMode::AUTO.to_string(), "auto");
        assert_eq!(EstimationMode(2).to_string(), "2");
    }
}
