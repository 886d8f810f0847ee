use bytes::Bytes;
use std::fmt;
use std::net::IpAddr;

use dns_types::protocol::types::*;

/// TTL of every record produced here.
pub const ANSWER_TTL: u32 = 300;

/// Preference of an `MX` record when none is configured.
pub const DEFAULT_MX_PREFERENCE: u16 = 5;

/// How to answer a question, given whatever address the answer
/// source has resolved for it.
///
/// Each variant appends its records to the response, and leaves the
/// response untouched if the address is missing or of the wrong
/// family.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum Responder {
    /// One `A` record for the question name.
    A,

    /// One `AAAA` record for the question name.  An IPv4 address is
    /// left-padded with zero octets.
    AAAA,

    /// One `MX` record pointing at `host`.
    MX { preference: u16, host: DomainName },

    /// One `NS` record pointing at `nameserver`, plus glue records in
    /// the additional section for each of its addresses.
    NS {
        nameserver: DomainName,
        addresses: Vec<IpAddr>,
    },

    /// Refuse the whole query: every section of the response is
    /// cleared, overriding anything answered so far.  Once refused, a
    /// response takes no further records.
    Refusal,
}

impl Responder {
    pub fn mx(host: DomainName) -> Self {
        Responder::MX {
            preference: DEFAULT_MX_PREFERENCE,
            host,
        }
    }

    /// # Errors
    ///
    /// If `A` or `AAAA` are not given an address, `A` is given an
    /// IPv6 address, or the response has already been refused.
    /// Nothing is added to the response in that case.
    pub fn answer_for(
        &self,
        response: &mut Message,
        question: &Question,
        address: Option<IpAddr>,
    ) -> Result<(), ResolutionFailure> {
        if response.header.rcode == Rcode::Refused && *self != Responder::Refusal {
            return Err(ResolutionFailure::Refused);
        }

        match self {
            Responder::A => {
                let address = address.ok_or(ResolutionFailure::MissingAddress)?;
                let rr = ipv4_record(question.name.clone(), address)?;
                response.answers.push(rr);
                set_authoritative_answer(response);
            }
            Responder::AAAA => {
                let address = address.ok_or(ResolutionFailure::MissingAddress)?;
                response
                    .answers
                    .push(ipv6_record(question.name.clone(), address));
                set_authoritative_answer(response);
            }
            Responder::MX { preference, host } => {
                response.answers.push(ResourceRecord {
                    name: question.name.clone(),
                    rdata: RecordData::MX {
                        preference: *preference,
                        exchange: host.clone(),
                    },
                    rclass: RecordClass::IN,
                    ttl: ANSWER_TTL,
                });
                set_authoritative_answer(response);
            }
            Responder::NS {
                nameserver,
                addresses,
            } => {
                let mut glue = addresses
                    .iter()
                    .map(|address| match address {
                        IpAddr::V4(ipv4) => {
                            address_record(nameserver.clone(), RecordType::A, &ipv4.octets())
                        }
                        IpAddr::V6(ipv6) => {
                            address_record(nameserver.clone(), RecordType::AAAA, &ipv6.octets())
                        }
                    })
                    .collect::<Vec<_>>();

                response.answers.push(ResourceRecord {
                    name: question.name.clone(),
                    rdata: RecordData::NS {
                        nsdname: nameserver.clone(),
                    },
                    rclass: RecordClass::IN,
                    ttl: ANSWER_TTL,
                });
                response.additional.append(&mut glue);
                set_authoritative_answer(response);
            }
            Responder::Refusal => {
                response.header.rcode = Rcode::Refused;
                response.header.is_authoritative = false;
                response.questions.clear();
                response.answers.clear();
                response.authority.clear();
                response.additional.clear();
            }
        }

        Ok(())
    }
}

fn set_authoritative_answer(response: &mut Message) {
    response.header.rcode = Rcode::NoError;
    response.header.is_authoritative = true;
}

fn ipv4_record(name: DomainName, address: IpAddr) -> Result<ResourceRecord, ResolutionFailure> {
    match address {
        IpAddr::V4(ipv4) => Ok(address_record(name, RecordType::A, &ipv4.octets())),
        IpAddr::V6(_) => Err(ResolutionFailure::WrongAddressFamily {
            expected: RecordType::A,
            address,
        }),
    }
}

fn ipv6_record(name: DomainName, address: IpAddr) -> ResourceRecord {
    address_record(name, RecordType::AAAA, &ipv6_octets(address))
}

/// The 16 octets of an IPv6 address, or of an IPv4 address with
/// twelve zero octets in front.
fn ipv6_octets(address: IpAddr) -> [u8; 16] {
    match address {
        IpAddr::V4(ipv4) => {
            let mut octets = [0; 16];
            octets[12..].copy_from_slice(&ipv4.octets());
            octets
        }
        IpAddr::V6(ipv6) => ipv6.octets(),
    }
}

fn address_record(name: DomainName, rtype: RecordType, octets: &[u8]) -> ResourceRecord {
    ResourceRecord {
        name,
        rdata: RecordData::Raw {
            rtype,
            octets: Bytes::copy_from_slice(octets),
        },
        rclass: RecordClass::IN,
        ttl: ANSWER_TTL,
    }
}

/// A `Responder` was given data it can't turn into records.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ResolutionFailure {
    /// No address was resolved for a record which needs one.
    MissingAddress,

    /// The address can't be written as this type of record.
    WrongAddressFamily {
        expected: RecordType,
        address: IpAddr,
    },

    /// The response was refused by an earlier question.
    Refused,
}

impl fmt::Display for ResolutionFailure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ResolutionFailure::MissingAddress => write!(f, "no address to answer with"),
            ResolutionFailure::WrongAddressFamily { expected, address } => {
                write!(f, "cannot answer {expected} with '{address}'")
            }
            ResolutionFailure::Refused => write!(f, "response already refused"),
        }
    }
}

impl std::error::Error for ResolutionFailure {}

#[cfg(test)]
mod tests {
    use dns_types::protocol::serialise::Transport;
    use dns_types::protocol::types::test_util::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    use super::*;

    fn query(name: &str, rtype: RecordType) -> (Message, Question) {
        let question = Question {
            name: domain(name),
            qtype: QueryType::Record(rtype),
            qclass: QueryClass::Record(RecordClass::IN),
        };
        let response = Message::from_question(1, question.clone()).make_response();
        (response, question)
    }

    #[test]
    fn a_answers_with_ipv4_address() {
        let (mut response, question) = query("example.com.", RecordType::A);

        Responder::A
            .answer_for(
                &mut response,
                &question,
                Some(IpAddr::V4(Ipv4Addr::new(93, 184, 216, 34))),
            )
            .unwrap();

        assert_eq!(
            vec![a_record("example.com.", [93, 184, 216, 34])],
            response.answers
        );
        assert_eq!(RecordType::A, response.answers[0].rtype());
        assert_eq!(RecordClass::IN, response.answers[0].rclass);
        assert_eq!(300, response.answers[0].ttl);
        assert_eq!(Rcode::NoError, response.header.rcode);
        assert!(response.header.is_authoritative);
        assert!(response.authority.is_empty());
        assert!(response.additional.is_empty());
    }

    #[test]
    fn a_rejects_ipv6_address() {
        let (mut response, question) = query("example.com.", RecordType::A);
        response.header.rcode = Rcode::NameError;
        let before = response.clone();

        let address = IpAddr::V6(Ipv6Addr::LOCALHOST);
        assert_eq!(
            Err(ResolutionFailure::WrongAddressFamily {
                expected: RecordType::A,
                address,
            }),
            Responder::A.answer_for(&mut response, &question, Some(address))
        );
        assert_eq!(before, response);
    }

    #[test]
    fn a_rejects_missing_address() {
        let (mut response, question) = query("example.com.", RecordType::A);
        let before = response.clone();

        assert_eq!(
            Err(ResolutionFailure::MissingAddress),
            Responder::A.answer_for(&mut response, &question, None)
        );
        assert_eq!(before, response);
    }

    #[test]
    fn aaaa_answers_with_ipv6_address() {
        let (mut response, question) = query("example.com.", RecordType::AAAA);
        let address = "2606:2800:220:1:248:1893:25c8:1946"
            .parse::<Ipv6Addr>()
            .unwrap();

        Responder::AAAA
            .answer_for(&mut response, &question, Some(IpAddr::V6(address)))
            .unwrap();

        assert_eq!(
            vec![aaaa_record("example.com.", address.octets())],
            response.answers
        );
        assert!(response.header.is_authoritative);
    }

    #[test]
    fn aaaa_pads_ipv4_address() {
        let (mut response, question) = query("example.com.", RecordType::AAAA);

        Responder::AAAA
            .answer_for(
                &mut response,
                &question,
                Some(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1))),
            )
            .unwrap();

        assert_eq!(
            vec![aaaa_record(
                "example.com.",
                [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 192, 0, 2, 1]
            )],
            response.answers
        );
    }

    #[test]
    fn mx_defers_exchange() {
        let (mut response, question) = query("example.com.", RecordType::MX);

        Responder::mx(domain("mail.example.com."))
            .answer_for(&mut response, &question, None)
            .unwrap();

        assert_eq!(
            vec![mx_record("example.com.", 5, "mail.example.com.")],
            response.answers
        );
        assert_eq!(Rcode::NoError, response.header.rcode);
        assert!(response.header.is_authoritative);
    }

    #[test]
    fn mx_exchange_is_compressed_on_the_wire() {
        let (mut response, question) = query("example.com.", RecordType::MX);

        Responder::MX {
            preference: 10,
            host: domain("mail.example.com."),
        }
        .answer_for(&mut response, &question, None)
        .unwrap();

        let octets = response.to_octets(Transport::Udp).unwrap();

        // header, 17 octet question, 13 octet name, 10 octets of
        // fixed fields, then the RDATA: preference, "mail", and a
        // pointer to the owner name
        let rdata = 12 + 17 + 13 + 10;
        assert_eq!(&[0u8, 9], &octets[rdata - 2..rdata]);
        assert_eq!(
            &[0, 10, 4, b'm', b'a', b'i', b'l', 0b1100_0000, 29],
            &octets[rdata..]
        );

        assert_eq!(Ok(response), Message::from_octets(&octets));
    }

    #[test]
    fn ns_answers_with_glue() {
        let (mut response, question) = query("example.com.", RecordType::NS);

        Responder::NS {
            nameserver: domain("ns1.example.com."),
            addresses: vec![IpAddr::V4(Ipv4Addr::new(192, 0, 2, 53))],
        }
        .answer_for(&mut response, &question, None)
        .unwrap();

        assert_eq!(
            vec![ns_record("example.com.", "ns1.example.com.")],
            response.answers
        );
        assert_eq!(
            vec![a_record("ns1.example.com.", [192, 0, 2, 53])],
            response.additional
        );
        assert_eq!(RecordType::NS, response.answers[0].rtype());
        assert_eq!(RecordType::A, response.additional[0].rtype());
        assert!(response.header.is_authoritative);
    }

    #[test]
    fn ns_glue_follows_address_family() {
        let (mut response, question) = query("example.com.", RecordType::NS);

        Responder::NS {
            nameserver: domain("ns1.example.com."),
            addresses: vec![
                IpAddr::V4(Ipv4Addr::new(192, 0, 2, 53)),
                IpAddr::V6(Ipv6Addr::LOCALHOST),
            ],
        }
        .answer_for(&mut response, &question, None)
        .unwrap();

        assert_eq!(
            vec![
                a_record("ns1.example.com.", [192, 0, 2, 53]),
                aaaa_record("ns1.example.com.", Ipv6Addr::LOCALHOST.octets()),
            ],
            response.additional
        );
    }

    #[test]
    fn refusal_clears_earlier_answers() {
        let (mut response, question) = query("example.com.", RecordType::A);

        Responder::A
            .answer_for(
                &mut response,
                &question,
                Some(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1))),
            )
            .unwrap();
        Responder::NS {
            nameserver: domain("ns1.example.com."),
            addresses: vec![IpAddr::V4(Ipv4Addr::new(192, 0, 2, 53))],
        }
        .answer_for(&mut response, &question, None)
        .unwrap();
        Responder::Refusal
            .answer_for(&mut response, &question, None)
            .unwrap();

        assert_eq!(Rcode::Refused, response.header.rcode);
        assert!(!response.header.is_authoritative);
        assert!(response.questions.is_empty());
        assert!(response.answers.is_empty());
        assert!(response.authority.is_empty());
        assert!(response.additional.is_empty());
    }

    #[test]
    fn refusal_sticks() {
        let (mut response, question) = query("example.com.", RecordType::A);

        Responder::Refusal
            .answer_for(&mut response, &question, None)
            .unwrap();
        let refused = response.clone();

        assert_eq!(
            Err(ResolutionFailure::Refused),
            Responder::A.answer_for(
                &mut response,
                &question,
                Some(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1))),
            )
        );
        assert_eq!(
            Err(ResolutionFailure::Refused),
            Responder::NS {
                nameserver: domain("ns1.example.com."),
                addresses: vec![IpAddr::V4(Ipv4Addr::new(192, 0, 2, 53))],
            }
            .answer_for(&mut response, &question, None)
        );
        assert_eq!(refused, response);

        Responder::Refusal
            .answer_for(&mut response, &question, None)
            .unwrap();
        assert_eq!(refused, response);
    }
}
