//! Deserialisation of DNS messages from the network.  See the `types`
//! module for details of the format.

use bytes::Bytes;
use std::fmt;

use crate::protocol::octets;
use crate::protocol::types::*;

impl Message {
    /// # Errors
    ///
    /// If the message cannot be parsed.
    pub fn from_octets(octets: &[u8]) -> Result<Self, MalformedMessage> {
        Self::deserialise(&mut ConsumableBuffer::new(octets))
    }

    /// # Errors
    ///
    /// If the message cannot be parsed.
    pub fn deserialise(buffer: &mut ConsumableBuffer) -> Result<Self, MalformedMessage> {
        let wire_header = WireHeader::deserialise(buffer)?;
        let id = wire_header.header.id;

        // the counts come off the wire, so don't trust them to size
        // allocations beyond what the buffer could possibly hold
        let capacity = |count: u16| usize::from(count).min(buffer.remaining());
        let mut questions = Vec::with_capacity(capacity(wire_header.qdcount));
        let mut answers = Vec::with_capacity(capacity(wire_header.ancount));
        let mut authority = Vec::with_capacity(capacity(wire_header.nscount));
        let mut additional = Vec::with_capacity(capacity(wire_header.arcount));

        for _ in 0..wire_header.qdcount {
            questions.push(Question::deserialise(id, buffer)?);
        }
        for _ in 0..wire_header.ancount {
            answers.push(ResourceRecord::deserialise(id, buffer)?);
        }
        for _ in 0..wire_header.nscount {
            authority.push(ResourceRecord::deserialise(id, buffer)?);
        }
        for _ in 0..wire_header.arcount {
            additional.push(ResourceRecord::deserialise(id, buffer)?);
        }

        Ok(Self {
            header: wire_header.header,
            questions,
            answers,
            authority,
            additional,
        })
    }
}

impl WireHeader {
    /// # Errors
    ///
    /// If the header is too short.
    pub fn deserialise(buffer: &mut ConsumableBuffer) -> Result<Self, MalformedMessage> {
        let id = buffer.next_u16().ok_or(MalformedMessage::CompletelyBusted)?;
        let flags1 = buffer
            .next_u8()
            .ok_or(MalformedMessage::HeaderTooShort(id))?;
        let flags2 = buffer
            .next_u8()
            .ok_or(MalformedMessage::HeaderTooShort(id))?;
        let qdcount = buffer
            .next_u16()
            .ok_or(MalformedMessage::HeaderTooShort(id))?;
        let ancount = buffer
            .next_u16()
            .ok_or(MalformedMessage::HeaderTooShort(id))?;
        let nscount = buffer
            .next_u16()
            .ok_or(MalformedMessage::HeaderTooShort(id))?;
        let arcount = buffer
            .next_u16()
            .ok_or(MalformedMessage::HeaderTooShort(id))?;

        Ok(Self {
            header: Header {
                id,
                is_response: flags1 & HEADER_MASK_QR != 0,
                opcode: Opcode::from((flags1 & HEADER_MASK_OPCODE) >> HEADER_OFFSET_OPCODE),
                is_authoritative: flags1 & HEADER_MASK_AA != 0,
                is_truncated: flags1 & HEADER_MASK_TC != 0,
                recursion_desired: flags1 & HEADER_MASK_RD != 0,
                recursion_available: flags2 & HEADER_MASK_RA != 0,
                z: (flags2 & HEADER_MASK_Z) >> HEADER_OFFSET_Z,
                rcode: Rcode::from((flags2 & HEADER_MASK_RCODE) >> HEADER_OFFSET_RCODE),
            },
            qdcount,
            ancount,
            nscount,
            arcount,
        })
    }
}

impl Question {
    /// # Errors
    ///
    /// If the question cannot be parsed.
    pub fn deserialise(id: u16, buffer: &mut ConsumableBuffer) -> Result<Self, MalformedMessage> {
        let name = DomainName::deserialise(id, buffer)?;
        let qtype = QueryType::deserialise(id, buffer)?;
        let qclass = QueryClass::deserialise(id, buffer)?;

        Ok(Self {
            name,
            qtype,
            qclass,
        })
    }
}

impl ResourceRecord {
    /// # Errors
    ///
    /// If the record cannot be parsed.
    pub fn deserialise(id: u16, buffer: &mut ConsumableBuffer) -> Result<Self, MalformedMessage> {
        let name = DomainName::deserialise(id, buffer)?;
        let rtype = RecordType::deserialise(id, buffer)?;
        let rclass = RecordClass::deserialise(id, buffer)?;
        let ttl = buffer
            .next_u32()
            .ok_or(MalformedMessage::ResourceRecordTooShort(id))?;
        let rdlength = buffer
            .next_u16()
            .ok_or(MalformedMessage::ResourceRecordTooShort(id))?;

        let rdata_start = buffer.position;

        // MX and NS hold a domain name, which may be compressed: expand
        // it so the record can be re-serialised with fresh pointers.
        let rdata = match rtype {
            RecordType::MX => RecordData::MX {
                preference: buffer
                    .next_u16()
                    .ok_or(MalformedMessage::ResourceRecordTooShort(id))?,
                exchange: DomainName::deserialise(id, buffer)?,
            },
            RecordType::NS => RecordData::NS {
                nsdname: DomainName::deserialise(id, buffer)?,
            },
            _ => RecordData::Raw {
                rtype,
                octets: buffer
                    .take(usize::from(rdlength))
                    .map(Bytes::copy_from_slice)
                    .ok_or(MalformedMessage::ResourceRecordTooShort(id))?,
            },
        };

        if buffer.position == rdata_start + usize::from(rdlength) {
            Ok(Self {
                name,
                rdata,
                rclass,
                ttl,
            })
        } else {
            Err(MalformedMessage::ResourceRecordInvalid(id))
        }
    }
}

impl DomainName {
    /// # Errors
    ///
    /// If the domain cannot be parsed.
    pub fn deserialise(id: u16, buffer: &mut ConsumableBuffer) -> Result<Self, MalformedMessage> {
        Self::deserialise_with_depth(id, buffer, 0)
    }

    /// Decode a name, following at most `MAX_POINTER_DEPTH - depth`
    /// further pointers.  Every pointer must go strictly backwards from
    /// the start of the name containing it, so decoding always ends.
    fn deserialise_with_depth(
        id: u16,
        buffer: &mut ConsumableBuffer,
        depth: usize,
    ) -> Result<Self, MalformedMessage> {
        let mut labels = Vec::<Label>::with_capacity(5);
        let mut len = 0;
        let start = buffer.position;

        loop {
            let size = buffer
                .next_u8()
                .ok_or(MalformedMessage::DomainTooShort(id))?;

            if usize::from(size) <= LABEL_MAX_LEN {
                len += 1 + usize::from(size);

                if size == 0 {
                    labels.push(Label::new());
                    break;
                }

                let octets = buffer
                    .take(usize::from(size))
                    .ok_or(MalformedMessage::DomainTooShort(id))?;
                labels.push(
                    Label::try_from(octets).map_err(|_| MalformedMessage::DomainLabelInvalid(id))?,
                );

                if len > DOMAINNAME_MAX_LEN {
                    return Err(MalformedMessage::DomainTooLong(id));
                }
            } else if size & POINTER_TAG == POINTER_TAG {
                let hi = size & !POINTER_TAG;
                let lo = buffer
                    .next_u8()
                    .ok_or(MalformedMessage::DomainTooShort(id))?;
                let ptr = usize::from(u16::from_be_bytes([hi, lo]));

                // pointer must be to an earlier record (not merely a
                // different one: an earlier one: RFC 1035 section
                // 4.1.4)
                if ptr >= start {
                    return Err(MalformedMessage::DomainPointerInvalid(id));
                }
                if depth >= MAX_POINTER_DEPTH {
                    return Err(MalformedMessage::DomainPointerTooDeep(id));
                }

                let other =
                    Self::deserialise_with_depth(id, &mut buffer.at_offset(ptr), depth + 1)?;
                len += other.len;
                labels.extend(other.labels);
                break;
            } else {
                // 0b01 and 0b10 prefixes are reserved
                return Err(MalformedMessage::DomainLabelInvalid(id));
            }
        }

        if len <= DOMAINNAME_MAX_LEN {
            Ok(DomainName { labels, len })
        } else {
            Err(MalformedMessage::DomainTooLong(id))
        }
    }
}

impl QueryType {
    /// # Errors
    ///
    /// If the query type is too short.
    pub fn deserialise(id: u16, buffer: &mut ConsumableBuffer) -> Result<Self, MalformedMessage> {
        let value = buffer
            .next_u16()
            .ok_or(MalformedMessage::QuestionTooShort(id))?;
        Ok(Self::from(value))
    }
}

impl QueryClass {
    /// # Errors
    ///
    /// If the query class is too short.
    pub fn deserialise(id: u16, buffer: &mut ConsumableBuffer) -> Result<Self, MalformedMessage> {
        let value = buffer
            .next_u16()
            .ok_or(MalformedMessage::QuestionTooShort(id))?;
        Ok(Self::from(value))
    }
}

impl RecordType {
    /// # Errors
    ///
    /// If the record type is too short.
    pub fn deserialise(id: u16, buffer: &mut ConsumableBuffer) -> Result<Self, MalformedMessage> {
        let value = buffer
            .next_u16()
            .ok_or(MalformedMessage::ResourceRecordTooShort(id))?;
        Ok(Self::from(value))
    }
}

impl RecordClass {
    /// # Errors
    ///
    /// If the record class is too short.
    pub fn deserialise(id: u16, buffer: &mut ConsumableBuffer) -> Result<Self, MalformedMessage> {
        let value = buffer
            .next_u16()
            .ok_or(MalformedMessage::ResourceRecordTooShort(id))?;
        Ok(Self::from(value))
    }
}

/// Errors encountered when parsing a datagram.  In all the errors
/// which have a `u16` parameter, that is the ID from the header - so
/// that an error response can be sent.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum MalformedMessage {
    /// The datagram is not even 2 octets long, so it doesn't even
    /// contain a valid ID.  An error cannot even be sent back to the
    /// client in this case as, without an ID, it cannot be linked
    /// with the correct query.
    CompletelyBusted,

    /// The header is missing one or more required fields.
    HeaderTooShort(u16),

    /// A question ends with an incomplete field.
    QuestionTooShort(u16),

    /// A resource record ends with an incomplete field.
    ResourceRecordTooShort(u16),

    /// A resource record's RDATA does not fill exactly RDLENGTH
    /// octets.
    ResourceRecordInvalid(u16),

    /// A domain is incomplete.
    DomainTooShort(u16),

    /// A domain is over 255 octets in size.
    DomainTooLong(u16),

    /// A domain pointer points to or after the start of the name
    /// containing it.
    DomainPointerInvalid(u16),

    /// A domain is built from more than `MAX_POINTER_DEPTH` nested
    /// pointers.
    DomainPointerTooDeep(u16),

    /// A domain label is longer than 63 octets, but not a pointer.
    DomainLabelInvalid(u16),
}

impl MalformedMessage {
    pub fn id(self) -> Option<u16> {
        match self {
            MalformedMessage::CompletelyBusted => None,
            MalformedMessage::HeaderTooShort(id) => Some(id),
            MalformedMessage::QuestionTooShort(id) => Some(id),
            MalformedMessage::ResourceRecordTooShort(id) => Some(id),
            MalformedMessage::ResourceRecordInvalid(id) => Some(id),
            MalformedMessage::DomainTooShort(id) => Some(id),
            MalformedMessage::DomainTooLong(id) => Some(id),
            MalformedMessage::DomainPointerInvalid(id) => Some(id),
            MalformedMessage::DomainPointerTooDeep(id) => Some(id),
            MalformedMessage::DomainLabelInvalid(id) => Some(id),
        }
    }
}

impl fmt::Display for MalformedMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MalformedMessage::CompletelyBusted => write!(f, "message too short to contain an ID"),
            MalformedMessage::HeaderTooShort(_) => write!(f, "header too short"),
            MalformedMessage::QuestionTooShort(_) => write!(f, "question too short"),
            MalformedMessage::ResourceRecordTooShort(_) => write!(f, "resource record too short"),
            MalformedMessage::ResourceRecordInvalid(_) => {
                write!(f, "resource record data does not match its length")
            }
            MalformedMessage::DomainTooShort(_) => write!(f, "domain name too short"),
            MalformedMessage::DomainTooLong(_) => write!(f, "domain name too long"),
            MalformedMessage::DomainPointerInvalid(_) => {
                write!(f, "domain name pointer does not point backwards")
            }
            MalformedMessage::DomainPointerTooDeep(_) => {
                write!(f, "domain name pointers nested too deeply")
            }
            MalformedMessage::DomainLabelInvalid(_) => write!(f, "domain name label invalid"),
        }
    }
}

impl std::error::Error for MalformedMessage {}

/// A buffer which will be consumed by the parsing process.
pub struct ConsumableBuffer<'a> {
    octets: &'a [u8],
    position: usize,
}

impl<'a> ConsumableBuffer<'a> {
    pub fn new(octets: &'a [u8]) -> Self {
        Self {
            octets,
            position: 0,
        }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> usize {
        self.octets.len().saturating_sub(self.position)
    }

    pub fn next_u8(&mut self) -> Option<u8> {
        let value = octets::read_u8(self.octets, self.position)?;
        self.position += 1;
        Some(value)
    }

    pub fn next_u16(&mut self) -> Option<u16> {
        let value = octets::read_u16(self.octets, self.position)?;
        self.position += 2;
        Some(value)
    }

    pub fn next_u32(&mut self) -> Option<u32> {
        let value = octets::read_u32(self.octets, self.position)?;
        self.position += 4;
        Some(value)
    }

    pub fn take(&mut self, size: usize) -> Option<&'a [u8]> {
        let end = self.position.checked_add(size)?;
        let slice = self.octets.get(self.position..end)?;
        self.position = end;
        Some(slice)
    }

    pub fn at_offset(&self, position: usize) -> ConsumableBuffer<'a> {
        Self {
            octets: self.octets,
            position,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::test_util::*;

    #[test]
    #[rustfmt::skip]
    fn decodes_header_flags_msb_first() {
        let octets = [
            0x12, 0x34, // ID
            0b1_0010_1_1_0, // QR, opcode 2, AA, TC, no RD
            0b1_101_0011, // RA, Z 5, rcode 3
            0, 0, 0, 0, 0, 0, 0, 0,
        ];

        let header = Message::from_octets(&octets).unwrap().header;

        assert_eq!(0x1234, header.id);
        assert!(header.is_response);
        assert_eq!(Opcode::Status, header.opcode);
        assert!(header.is_authoritative);
        assert!(header.is_truncated);
        assert!(!header.recursion_desired);
        assert!(header.recursion_available);
        assert_eq!(5, header.z);
        assert_eq!(Rcode::NameError, header.rcode);
    }

    #[test]
    fn rejects_short_header() {
        assert_eq!(
            Err(MalformedMessage::CompletelyBusted),
            Message::from_octets(&[1])
        );
        assert_eq!(
            Err(MalformedMessage::HeaderTooShort(0x0102)),
            Message::from_octets(&[1, 2, 0, 0, 0, 1, 0, 0, 0, 0])
        );
    }

    #[test]
    fn rejects_missing_question() {
        let octets = [0, 7, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0];

        assert_eq!(
            Err(MalformedMessage::DomainTooShort(7)),
            Message::from_octets(&octets)
        );
    }

    #[test]
    #[rustfmt::skip]
    fn follows_pointer_into_earlier_name() {
        let octets = [
            3, b'c', b'o', b'm', 0, // offset 0
            3, b'w', b'w', b'w', 7, b'e', b'x', b'a', b'm', b'p', b'l', b'e', 0b1100_0000, 0,
        ];
        let mut buffer = ConsumableBuffer::new(&octets);
        buffer.take(5);

        assert_eq!(
            Ok(domain("www.example.com.")),
            DomainName::deserialise(0, &mut buffer)
        );
        assert_eq!(octets.len(), buffer.position());
    }

    #[test]
    fn rejects_self_referential_pointer() {
        let octets = [0b1100_0000, 0];

        assert_eq!(
            Err(MalformedMessage::DomainPointerInvalid(0)),
            DomainName::deserialise(0, &mut ConsumableBuffer::new(&octets))
        );
    }

    #[test]
    fn rejects_forward_pointer() {
        let octets = [1, b'a', 0b1100_0000, 4, 1, b'b', 0];

        assert_eq!(
            Err(MalformedMessage::DomainPointerInvalid(0)),
            DomainName::deserialise(0, &mut ConsumableBuffer::new(&octets))
        );
    }

    #[test]
    fn rejects_deeply_nested_pointers() {
        // a root name followed by a chain of pointers, each pointing
        // at the one before
        let mut octets = vec![0];
        for i in 0..=MAX_POINTER_DEPTH {
            let target = if i == 0 { 0 } else { 1 + (i - 1) * 2 };
            octets.push(0b1100_0000);
            octets.push(u8::try_from(target).unwrap());
        }

        let last = octets.len() - 2;
        assert_eq!(
            Err(MalformedMessage::DomainPointerTooDeep(0)),
            DomainName::deserialise(0, &mut ConsumableBuffer::new(&octets).at_offset(last))
        );

        // one fewer pointer is fine
        let last_ok = last - 2;
        assert_eq!(
            Ok(DomainName::root_domain()),
            DomainName::deserialise(0, &mut ConsumableBuffer::new(&octets).at_offset(last_ok))
        );
    }

    #[test]
    fn rejects_reserved_label_prefixes() {
        for prefix in [0b0100_0000, 0b1000_0000] {
            assert_eq!(
                Err(MalformedMessage::DomainLabelInvalid(0)),
                DomainName::deserialise(0, &mut ConsumableBuffer::new(&[prefix, 0]))
            );
        }
    }

    #[test]
    fn rejects_overlong_name() {
        let mut octets = Vec::new();
        for _ in 0..5 {
            octets.push(60);
            octets.extend([b'a'; 60]);
        }
        octets.push(0);

        assert_eq!(
            Err(MalformedMessage::DomainTooLong(0)),
            DomainName::deserialise(0, &mut ConsumableBuffer::new(&octets))
        );
    }

    #[test]
    #[rustfmt::skip]
    fn rejects_rdata_not_matching_rdlength() {
        let octets = [
            0, 9, 0, 0, 0, 0, 0, 1, 0, 0, 0, 0,
            0, // root
            0, 2, // NS
            0, 1, // IN
            0, 0, 1, 44, // TTL
            0, 5, // RDLENGTH, but the name is 3 octets
            1, b'a', 0,
            0, 0,
        ];

        assert_eq!(
            Err(MalformedMessage::ResourceRecordInvalid(9)),
            Message::from_octets(&octets)
        );
    }

    #[test]
    fn malformed_message_id() {
        assert_eq!(None, MalformedMessage::CompletelyBusted.id());
        assert_eq!(Some(42), MalformedMessage::DomainPointerTooDeep(42).id());
    }
}
