//! Conversions between big-endian octets and unsigned integers.
//!
//! The readers never panic: reading past the end of the slice gives
//! `None`, which the parser turns into a `MalformedMessage`.

/// Read the octet at `offset`.
pub fn read_u8(octets: &[u8], offset: usize) -> Option<u8> {
    octets.get(offset).copied()
}

/// Read a big-endian `u16` starting at `offset`.
pub fn read_u16(octets: &[u8], offset: usize) -> Option<u16> {
    let end = offset.checked_add(2)?;
    let bytes = octets.get(offset..end)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

/// Read a big-endian `u32` starting at `offset`.
pub fn read_u32(octets: &[u8], offset: usize) -> Option<u32> {
    let end = offset.checked_add(4)?;
    let bytes = octets.get(offset..end)?;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

pub fn u16_octets(value: u16) -> [u8; 2] {
    value.to_be_bytes()
}

pub fn u32_octets(value: u32) -> [u8; 4] {
    value.to_be_bytes()
}
