//! Synthetic pictures shared by the estimator tests.

use rtv_common::{Plane, Resolution};

/// Deterministic textured picture with no repeating structure at small shifts.
pub fn textured(res: Resolution, seed: u32) -> Plane {
    let data = (0..res.height)
        .flat_map(|y| {
            (0..res.width).map(move |x| {
                let v = x.wrapping_mul(7919) ^ y.wrapping_mul(104_729) ^ seed;
                (v.wrapping_mul(2_654_435_761) >> 24) as u8
            })
        })
        .collect();
    Plane::from_vec(res, data).unwrap()
}

/// Smooth picture (slow gradients plus a soft blob) that survives subsampling.
pub fn smooth(res: Resolution, phase: u32) -> Plane {
    let data = (0..res.height)
        .flat_map(|y| {
            (0..res.width).map(move |x| {
                let fx = (x + phase) as f64;
                let fy = y as f64;
                let v = 128.0 + 60.0 * (fx / 7.0).sin() + 50.0 * (fy / 9.0).cos()
                    + 10.0 * ((fx + fy) / 5.0).sin();
                v.clamp(0.0, 255.0) as u8
            })
        })
        .collect();
    Plane::from_vec(res, data).unwrap()
}

/// `out(x, y) = reference(x + dx, y + dy)` with edge clamping.
pub fn shifted(reference: &Plane, dx: i32, dy: i32) -> Plane {
    let res = reference.resolution();
    let view = reference.view();
    let mut out = Plane::new(res);
    for y in 0..res.height {
        for x in 0..res.width {
            out.set(x, y, view.sample_clamped(x as i32 + dx, y as i32 + dy));
        }
    }
    out
}
