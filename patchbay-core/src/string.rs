//! Helpers for creating fixed-size `arrayvec::ArrayString`s.

use arrayvec::Array;

use crate::error::{Error, Result};

/// Creates an array string, errors if input doesn't fit.
pub fn new<A>(s: &str) -> Result<arrayvec::ArrayString<A>>
where
    A: Array<Item = u8> + Copy,
{
    arrayvec::ArrayString::from(s).map_err(|e| Error::Other(format!("{}", e)))
}

/// Creates an array string, truncating input that doesn't fit.
pub fn new_truncate<A>(s: &str) -> arrayvec::ArrayString<A>
where
    A: Array<Item = u8> + Copy,
{
    arrayvec::ArrayString::from(truncate(s, A::CAPACITY)).unwrap()
}

/// Truncates string to specified size, backing off to the nearest char
/// boundary.
fn truncate(slice: &str, size: usize) -> &str {
    if slice.len() <= size {
        return slice;
    }
    let mut index = size;
    while !slice.is_char_boundary(index) {
        index -= 1;
    }
    &slice[..index]
}

#[test]
fn truncate_respects_char_boundary() {
    let long = "zażółć gęślą jaźń zażółć gęślą jaźń";
    let id: crate::StringId = new_truncate(long);
    assert!(id.len() <= 23);
    assert!(long.starts_with(id.as_str()));
}
