/// Returns true iff the first `len` bytes of `a` and `b` are equal.
///
/// Stops at the first differing byte. A `len` of 0 is trivially equal; a `len` larger than
/// either region is never equal, as the bytes past the end were never filled.
#[must_use]
pub fn regions_equal(a: &[u8], b: &[u8], len: usize) -> bool {
    match (a.get(..len), b.get(..len)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Compares two filled chunks; chunks of different lengths never match.
#[must_use]
pub fn chunks_equal(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && regions_equal(a, b, a.len())
}
