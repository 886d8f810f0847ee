//! Per-message state for name compression (RFC 1035 section 4.1.4).
//!
//! A name is a sequence of labels, and every suffix of that sequence
//! is itself a name which later names can point at.  The table maps
//! each suffix written so far to the absolute offset (from the first
//! octet of the header) at which it starts.

use std::collections::HashMap;
use std::fmt;

use crate::protocol::types::{Label, POINTER_MAX_OFFSET, POINTER_TAG};

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct CompressionTable {
    offsets: HashMap<Vec<Label>, u16>,
}

impl CompressionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The offset at which this suffix was first written, if it has
    /// been.
    pub fn lookup(&self, suffix: &[Label]) -> Option<u16> {
        self.offsets.get(suffix).copied()
    }

    /// The two-octet pointer to this suffix, if it has been written.
    pub fn pointer_to(&self, suffix: &[Label]) -> Option<u16> {
        self.lookup(suffix)
            .map(|offset| (u16::from(POINTER_TAG) << 8) | offset)
    }

    /// Remember that this suffix starts at `offset`.  The first
    /// offset recorded for a suffix is kept, and the root name is
    /// never recorded, as a pointer to it would be longer than the
    /// name itself.
    ///
    /// # Errors
    ///
    /// If the offset is beyond what a pointer can address.  This is
    /// not fatal: the name just can't be pointed at.
    pub fn record(&mut self, suffix: &[Label], offset: usize) -> Result<(), EncodingOverflow> {
        if is_root(suffix) || self.offsets.contains_key(suffix) {
            return Ok(());
        }

        match u16::try_from(offset) {
            Ok(pointer) if offset <= POINTER_MAX_OFFSET => {
                self.offsets.insert(suffix.to_vec(), pointer);
                Ok(())
            }
            _ => Err(EncodingOverflow { offset }),
        }
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }
}

fn is_root(suffix: &[Label]) -> bool {
    suffix.iter().all(Label::is_empty)
}

/// A name was written at an offset which a 14-bit compression
/// pointer cannot reach.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct EncodingOverflow {
    pub offset: usize,
}

impl fmt::Display for EncodingOverflow {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "offset {} is beyond the compression pointer limit of {POINTER_MAX_OFFSET}",
            self.offset
        )
    }
}

impl std::error::Error for EncodingOverflow {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::test_util::*;
    use crate::protocol::types::DomainName;

    #[test]
    fn records_and_points_to_suffixes() {
        let name = domain("www.example.com.");
        let mut table = CompressionTable::new();

        assert_eq!(Ok(()), table.record(&name.labels, 12));
        assert_eq!(Ok(()), table.record(&name.labels[1..], 16));

        assert_eq!(Some(12), table.lookup(&name.labels));
        assert_eq!(Some(0xC00C), table.pointer_to(&name.labels));
        assert_eq!(Some(0xC010), table.pointer_to(&domain("example.com.").labels));
        assert_eq!(None, table.pointer_to(&domain("com.").labels));
    }

    #[test]
    fn keeps_first_offset() {
        let name = domain("example.com.");
        let mut table = CompressionTable::new();

        assert_eq!(Ok(()), table.record(&name.labels, 20));
        assert_eq!(Ok(()), table.record(&name.labels, 40));

        assert_eq!(Some(20), table.lookup(&name.labels));
    }

    #[test]
    fn never_records_root() {
        let mut table = CompressionTable::new();

        assert_eq!(
            Ok(()),
            table.record(&DomainName::root_domain().labels, 12)
        );

        assert!(table.is_empty());
    }

    #[test]
    fn rejects_offsets_past_pointer_range() {
        let name = domain("example.com.");
        let mut table = CompressionTable::new();

        assert_eq!(Ok(()), table.record(&name.labels, POINTER_MAX_OFFSET));
        assert_eq!(
            Err(EncodingOverflow {
                offset: POINTER_MAX_OFFSET + 1
            }),
            table.record(&domain("other.example.com.").labels, POINTER_MAX_OFFSET + 1)
        );

        assert_eq!(1, table.len());
        assert_eq!(None, table.lookup(&domain("other.example.com.").labels));
    }

    #[test]
    fn suffixes_are_case_sensitive() {
        let mut table = CompressionTable::new();
        table
            .record(&domain("Example.com.").labels, 12)
            .expect("offset in range");

        assert_eq!(None, table.lookup(&domain("example.com.").labels));
    }
}
