//! Resolution pyramid helpers for hierarchical search.

use rtv_common::{Plane, PlaneRef, Resolution};

/// Resolution of the next pyramid level (each dimension halved, rounded up).
pub fn half_resolution(res: Resolution) -> Resolution {
    Resolution::new(res.width.div_ceil(2).max(1), res.height.div_ceil(2).max(1))
}

/// Resolution of pyramid level `level` (level 0 is `res` itself).
pub fn level_resolution(res: Resolution, level: u32) -> Resolution {
    (0..level).fold(res, |r, _| half_resolution(r))
}

/// Subsample `src` by two in each direction into `dst` with a rounded 2x2 mean.
///
/// `dst` must already have `half_resolution(src.resolution())`; odd edges
/// reuse the last row/column.
pub fn downsample_into(src: PlaneRef<'_>, dst: &mut Plane) {
    let dst_res = dst.resolution();
    debug_assert_eq!(dst_res, half_resolution(src.resolution()));
    let width = dst_res.width as usize;
    let out = dst.data_mut();

    for y in 0..dst_res.height as i32 {
        for x in 0..dst_res.width as i32 {
            let (sx, sy) = (x * 2, y * 2);
            let sum = src.sample_clamped(sx, sy) as u32
                + src.sample_clamped(sx + 1, sy) as u32
                + src.sample_clamped(sx, sy + 1) as u32
                + src.sample_clamped(sx + 1, sy + 1) as u32;
            out[y as usize * width + x as usize] = ((sum + 2) >> 2) as u8;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn half_resolution_rounds_up() {
        assert_eq!(half_resolution(Resolution::new(352, 288)), Resolution::new(176, 144));
        assert_eq!(half_resolution(Resolution::new(5, 3)), Resolution::new(3, 2));
        assert_eq!(half_resolution(Resolution::new(1, 1)), Resolution::new(1, 1));
        assert_eq!(level_resolution(Resolution::new(64, 48), 2), Resolution::new(16, 12));
    }

    #[test]
    fn downsample_averages_quads() {
        let src = Plane::from_vec(
            Resolution::new(4, 2),
            vec![
                0, 4, 100, 100, //
                8, 12, 100, 100,
            ],
        )
        .unwrap();
        let mut dst = Plane::new(Resolution::new(2, 1));
        downsample_into(src.view(), &mut dst);
        assert_eq!(dst.data(), &[6, 100]);
    }

    #[test]
    fn downsample_odd_edge_replicates() {
        let src = Plane::from_vec(Resolution::new(3, 1), vec![10, 20, 40]).unwrap();
        let mut dst = Plane::new(Resolution::new(2, 1));
        downsample_into(src.view(), &mut dst);
        // (10+20+10+20+2)/4 = 15, (40+40+40+40+2)/4 = 40
        assert_eq!(dst.data(), &[15, 40]);
    }
}
