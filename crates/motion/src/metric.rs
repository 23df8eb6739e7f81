//! Block distortion metrics.
//!
//! All estimators in this crate score candidates with the sum of absolute
//! differences (SAD). Reference reads outside the picture are clamped to the
//! nearest edge sample, so candidates may point past the boundary.

use rtv_common::PlaneRef;

/// A rectangular block of samples. Edge blocks may be smaller than the nominal block size.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BlockRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BlockRect {
    pub fn area(&self) -> u32 {
        self.width * self.height
    }

    /// The same block on a pyramid level subsampled by `2^level`.
    pub fn at_level(&self, level: u32, level_width: u32, level_height: u32) -> Self {
        let x = (self.x >> level).min(level_width.saturating_sub(1));
        let y = (self.y >> level).min(level_height.saturating_sub(1));
        let width = (self.width >> level).max(1).min(level_width - x);
        let height = (self.height >> level).max(1).min(level_height - y);
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// SAD between `rect` in `source` and the same rect displaced by `(dx, dy)` in `reference`.
pub fn block_sad(source: PlaneRef<'_>, reference: PlaneRef<'_>, rect: BlockRect, dx: i32, dy: i32) -> u32 {
    block_sad_bounded(source, reference, rect, dx, dy, u32::MAX)
}

/// Like [`block_sad`] but stops accumulating once the running total reaches `bound`.
///
/// The returned value is exact when it is below `bound`; otherwise it is some
/// value `>= bound`.
pub fn block_sad_bounded(
    source: PlaneRef<'_>,
    reference: PlaneRef<'_>,
    rect: BlockRect,
    dx: i32,
    dy: i32,
    bound: u32,
) -> u32 {
    let src_stride = source.width() as usize;
    let ref_stride = reference.width() as usize;
    let rx = rect.x as i32 + dx;
    let ry = rect.y as i32 + dy;
    let inside = rx >= 0
        && ry >= 0
        && rx + rect.width as i32 <= reference.width() as i32
        && ry + rect.height as i32 <= reference.height() as i32;

    let src = source.data();
    let refd = reference.data();
    let mut total = 0u32;

    for row in 0..rect.height {
        let s_start = (rect.y + row) as usize * src_stride + rect.x as usize;
        let src_row = &src[s_start..s_start + rect.width as usize];

        if inside {
            let r_start = (ry as usize + row as usize) * ref_stride + rx as usize;
            let ref_row = &refd[r_start..r_start + rect.width as usize];
            total += src_row
                .iter()
                .zip(ref_row)
                .map(|(a, b)| a.abs_diff(*b) as u32)
                .sum::<u32>();
        } else {
            for (col, &s) in src_row.iter().enumerate() {
                let r = reference.sample_clamped(rx + col as i32, ry + row as i32);
                total += s.abs_diff(r) as u32;
            }
        }

        if total >= bound {
            return total;
        }
    }
    total
}
