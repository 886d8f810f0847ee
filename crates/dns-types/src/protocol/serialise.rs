//! Serialisation of DNS messages to the wire format.  See the `types`
//! module for details of the format.

use bytes::{BufMut, BytesMut};

use crate::protocol::compression::CompressionTable;
use crate::protocol::octets;
use crate::protocol::types::*;

/// Octets of a message which are never cut off when truncating: the
/// ID and the two flag octets.
pub const ID_AND_FLAGS_LEN: usize = 4;

/// Largest message body (everything after the ID and flags) sent over
/// UDP, giving a 512 octet datagram.
pub const UDP_BODY_LIMIT: usize = 508;

/// Largest message which fits behind a TCP length prefix.
pub const TCP_MESSAGE_LIMIT: usize = u16::MAX as usize;

/// The transport a message is being serialised for, which decides
/// how it is truncated.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Transport {
    Udp,
    Tcp,
}

impl Message {
    /// Serialise the message and cut it down to fit the transport.
    ///
    /// If the message is too long, the excess octets are dropped and
    /// the TC flag is set.  This can leave a partial record at the
    /// end of the message.
    ///
    /// # Errors
    ///
    /// If the message is invalid (the `Message` type permits more
    /// states than strictly allowed).
    pub fn to_octets(&self, transport: Transport) -> Result<BytesMut, Error> {
        let mut buffer = WritableBuffer::default();
        self.serialise(&mut buffer)?;

        let limit = match transport {
            Transport::Udp => ID_AND_FLAGS_LEN + UDP_BODY_LIMIT,
            Transport::Tcp => TCP_MESSAGE_LIMIT,
        };

        let mut octets = buffer.octets;
        if octets.len() > limit {
            octets.truncate(limit);
            octets[2] |= HEADER_MASK_TC;
        }

        Ok(octets)
    }

    /// # Errors
    ///
    /// If the message is invalid (the `Message` type permits more
    /// states than strictly allowed).
    pub fn serialise(&self, buffer: &mut WritableBuffer) -> Result<(), Error> {
        let qdcount = usize_to_u16(self.questions.len())?;
        let ancount = usize_to_u16(self.answers.len())?;
        let nscount = usize_to_u16(self.authority.len())?;
        let arcount = usize_to_u16(self.additional.len())?;

        self.header.serialise(buffer);
        buffer.write_u16(qdcount);
        buffer.write_u16(ancount);
        buffer.write_u16(nscount);
        buffer.write_u16(arcount);

        for question in &self.questions {
            question.serialise(buffer);
        }
        for rr in &self.answers {
            rr.serialise(buffer)?;
        }
        for rr in &self.authority {
            rr.serialise(buffer)?;
        }
        for rr in &self.additional {
            rr.serialise(buffer)?;
        }

        Ok(())
    }
}

impl Header {
    pub fn serialise(&self, buffer: &mut WritableBuffer) {
        // octet 1
        let flag_qr = if self.is_response { HEADER_MASK_QR } else { 0 };
        let field_opcode = HEADER_MASK_OPCODE & (u8::from(self.opcode) << HEADER_OFFSET_OPCODE);
        let flag_aa = if self.is_authoritative {
            HEADER_MASK_AA
        } else {
            0
        };
        let flag_tc = if self.is_truncated { HEADER_MASK_TC } else { 0 };
        let flag_rd = if self.recursion_desired {
            HEADER_MASK_RD
        } else {
            0
        };
        // octet 2
        let flag_ra = if self.recursion_available {
            HEADER_MASK_RA
        } else {
            0
        };
        let field_z = HEADER_MASK_Z & (self.z << HEADER_OFFSET_Z);
        let field_rcode = HEADER_MASK_RCODE & (u8::from(self.rcode) << HEADER_OFFSET_RCODE);

        buffer.write_u16(self.id);
        buffer.write_u8(flag_qr | field_opcode | flag_aa | flag_tc | flag_rd);
        buffer.write_u8(flag_ra | field_z | field_rcode);
    }
}

impl Question {
    /// Questions are always written out in full, and are not pointed
    /// at by later names.
    pub fn serialise(&self, buffer: &mut WritableBuffer) {
        self.name.serialise(buffer, false);
        self.qtype.serialise(buffer);
        self.qclass.serialise(buffer);
    }
}

impl ResourceRecord {
    /// # Errors
    ///
    /// If the RDATA is too long.
    pub fn serialise(&self, buffer: &mut WritableBuffer) -> Result<(), Error> {
        self.name.serialise(buffer, true);
        self.rdata.rtype().serialise(buffer);
        self.rclass.serialise(buffer);
        buffer.write_u32(self.ttl);

        // filled in below
        let rdlength_index = buffer.index();
        buffer.write_u16(0);

        match &self.rdata {
            RecordData::Raw { octets, .. } => buffer.write_octets(octets),
            RecordData::MX {
                preference,
                exchange,
            } => {
                buffer.write_u16(*preference);
                exchange.serialise(buffer, true);
            }
            RecordData::NS { nsdname } => nsdname.serialise(buffer, true),
        }

        // -2 so we don't also include the 2 octets for the rdlength
        let rdlength = usize_to_u16(buffer.index() - rdlength_index - 2)?;
        let [hi, lo] = octets::u16_octets(rdlength);
        buffer.octets[rdlength_index] = hi;
        buffer.octets[rdlength_index + 1] = lo;

        Ok(())
    }
}

impl DomainName {
    /// Write the name, label by label.  With `compress` set, the rest
    /// of the name becomes a pointer as soon as it matches a suffix
    /// written earlier, and each suffix written literally is
    /// remembered for later names.
    pub fn serialise(&self, buffer: &mut WritableBuffer, compress: bool) {
        for (i, label) in self.labels.iter().enumerate() {
            if label.is_empty() {
                break;
            }

            if compress {
                let suffix = &self.labels[i..];
                if let Some(ptr) = buffer.compression.pointer_to(suffix) {
                    buffer.write_u16(ptr);
                    return;
                }

                // past the reach of a pointer the name is just not
                // remembered
                let index = buffer.index();
                let _ = buffer.compression.record(suffix, index);
            }

            buffer.write_u8(label.len());
            buffer.write_octets(label.octets());
        }

        buffer.write_u8(0);
    }
}

impl QueryType {
    pub fn serialise(self, buffer: &mut WritableBuffer) {
        buffer.write_u16(self.into());
    }
}

impl QueryClass {
    pub fn serialise(self, buffer: &mut WritableBuffer) {
        buffer.write_u16(self.into());
    }
}

impl RecordType {
    pub fn serialise(self, buffer: &mut WritableBuffer) {
        buffer.write_u16(self.into());
    }
}

impl RecordClass {
    pub fn serialise(self, buffer: &mut WritableBuffer) {
        buffer.write_u16(self.into());
    }
}

/// Prefix a serialised message with its two-octet length, for
/// sending over TCP (RFC 1035 section 4.2.2).
///
/// # Errors
///
/// If the message is too long to have its length in two octets.
pub fn frame_tcp(message: &[u8]) -> Result<BytesMut, Error> {
    let len = usize_to_u16(message.len())?;
    let mut framed = BytesMut::with_capacity(message.len() + 2);
    framed.put_slice(&octets::u16_octets(len));
    framed.put_slice(message);
    Ok(framed)
}

/// Errors encountered when serialising a message.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Error {
    /// A counter does not fit in the desired width.
    CounterTooLarge { counter: usize, bits: u32 },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::CounterTooLarge { counter, bits } => {
                write!(f, "'{counter}' cannot be converted to a u{bits}")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

/// A buffer which can be written to, for serialisation purposes.
///
/// The whole message, header included, goes into the one buffer, so
/// `index` is the absolute offset which compression pointers refer
/// to.
pub struct WritableBuffer {
    pub octets: BytesMut,
    pub compression: CompressionTable,
}

impl Default for WritableBuffer {
    fn default() -> Self {
        Self {
            octets: BytesMut::with_capacity(512),
            compression: CompressionTable::new(),
        }
    }
}

impl WritableBuffer {
    pub fn index(&self) -> usize {
        self.octets.len()
    }

    pub fn write_u8(&mut self, octet: u8) {
        self.octets.put_u8(octet);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.write_octets(&octets::u16_octets(value));
    }

    pub fn write_u32(&mut self, value: u32) {
        self.write_octets(&octets::u32_octets(value));
    }

    pub fn write_octets(&mut self, octets: &[u8]) {
        self.octets.put_slice(octets);
    }
}

/// Helper function to convert a `usize` into a `u16` (or return an error).
///
/// # Errors
///
/// If the value cannot be converted.
fn usize_to_u16(counter: usize) -> Result<u16, Error> {
    if let Ok(t) = u16::try_from(counter) {
        Ok(t)
    } else {
        Err(Error::CounterTooLarge {
            counter,
            bits: u16::BITS,
        })
    }
}
