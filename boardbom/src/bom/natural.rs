//! Natural ordering for reference designators (C1 < C2 < C10).

use std::cmp::Ordering;

/// Alphabetic runs compare as text, digit runs as integers. Designators
/// that natord considers equal (`R01`, `R1`) fall back to byte order so the
/// result never depends on input order.
pub fn compare(a: &str, b: &str) -> Ordering {
    natord::compare(a, b).then_with(|| a.cmp(b))
}

pub fn sort(designators: &mut [String]) {
    designators.sort_by(|a, b| compare(a, b));
}
