//! Placement resolution.
//!
//! KiCad stores a footprint's `(at x y angle)` in absolute board coordinates:
//! millimetres, origin at the top-left of the page, Y growing downward, angle
//! in degrees counter-clockwise as seen from the top. Bottom-side footprints
//! keep the same convention (the angle is still seen from the top), so no
//! flip is applied here. Resolution is normalization only.

use crate::parser::pcb_schema::{Footprint, Placement};

/// Steps per mm and per degree kept in placements.
const STEPS: f64 = 10_000.0;

fn quantize(value: f64) -> f64 {
    // + 0.0 turns -0.0 into 0.0
    (value * STEPS).round() / STEPS + 0.0
}

/// Wrap an angle into `[0, 360)`.
pub fn normalize_angle(degrees: f64) -> f64 {
    let wrapped = quantize(degrees.rem_euclid(360.0));
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

pub fn resolve_footprint(fp: &Footprint) -> Placement {
    Placement {
        x: quantize(fp.position.x),
        y: quantize(fp.position.y),
        rotation: normalize_angle(fp.rotation),
        side: fp.side,
    }
}

/// Attach a [`Placement`] to every footprint.
pub fn resolve(footprints: &mut [Footprint]) {
    for fp in footprints.iter_mut() {
        fp.placement = Some(resolve_footprint(fp));
    }
}
