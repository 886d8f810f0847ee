use dns_types::protocol::deserialise::{ConsumableBuffer, MalformedMessage};
use dns_types::protocol::serialise::{Transport, WritableBuffer, UDP_BODY_LIMIT};
use dns_types::protocol::types::test_util::*;
use dns_types::protocol::types::*;

#[test]
fn roundtrip_message() {
    for _ in 0..100 {
        let original = arbitrary_message();
        let deserialised = Message::from_octets(&original.to_octets(Transport::Tcp).unwrap());

        assert_eq!(Ok(original), deserialised);
    }
}

#[test]
fn roundtrip_header() {
    for _ in 0..100 {
        let original = Message {
            header: arbitrary_header(),
            questions: Vec::new(),
            answers: Vec::new(),
            authority: Vec::new(),
            additional: Vec::new(),
        };
        let deserialised = Message::from_octets(&original.to_octets(Transport::Tcp).unwrap());

        assert_eq!(Ok(original), deserialised);
    }
}

#[test]
fn roundtrip_question() {
    for _ in 0..100 {
        let original = arbitrary_question();

        let mut buffer = WritableBuffer::default();
        original.serialise(&mut buffer);
        let deserialised = Question::deserialise(0, &mut ConsumableBuffer::new(&buffer.octets));

        assert_eq!(Ok(original), deserialised);
    }
}

#[test]
fn roundtrip_resourcerecord() {
    for _ in 0..100 {
        let original = arbitrary_resourcerecord();

        let mut buffer = WritableBuffer::default();
        original.serialise(&mut buffer).unwrap();
        let deserialised =
            ResourceRecord::deserialise(0, &mut ConsumableBuffer::new(&buffer.octets));

        assert_eq!(Ok(original), deserialised);
    }
}

#[test]
fn roundtrip_domainname() {
    for _ in 0..100 {
        let original = arbitrary_domainname();

        let mut buffer = WritableBuffer::default();
        original.serialise(&mut buffer, true);
        let deserialised = DomainName::deserialise(0, &mut ConsumableBuffer::new(&buffer.octets));

        assert_eq!(Ok(original), deserialised);
    }
}

#[test]
fn second_occurrence_of_name_points_at_first() {
    let mut message = Message::from_question(
        1,
        Question {
            name: domain("example.com."),
            qtype: QueryType::Record(RecordType::A),
            qclass: QueryClass::Record(RecordClass::IN),
        },
    )
    .make_response();
    message.answers = vec![
        a_record("example.com.", [192, 0, 2, 1]),
        a_record("example.com.", [192, 0, 2, 2]),
    ];

    let octets = message.to_octets(Transport::Udp).unwrap();

    // header, then a 13 octet name with 4 octets of type and class
    let first_name = HEADER_LEN + 13 + 4;
    assert_eq!(b"\x07example\x03com\x00", &octets[first_name..first_name + 13]);

    // 13 octet name, 10 octets of fixed fields, 4 octets of address
    let second_name = first_name + 13 + 10 + 4;
    let pointer = 0xC000 | u16::try_from(first_name).unwrap();
    assert_eq!(
        pointer.to_be_bytes(),
        [octets[second_name], octets[second_name + 1]]
    );

    assert_eq!(Ok(message), Message::from_octets(&octets));
}

#[test]
#[rustfmt::skip]
fn pointer_into_earlier_name_is_followed() {
    let octets = [
        0, 1, 0, 0, 0, 2, 0, 0, 0, 0, 0, 0,
        // offset 12: "example.com."
        7, b'e', b'x', b'a', b'm', b'p', b'l', b'e', 3, b'c', b'o', b'm', 0,
        0, 1, 0, 1,
        // "www" then a pointer to offset 12
        3, b'w', b'w', b'w', 0b1100_0000, 12,
        0, 1, 0, 1,
    ];

    let message = Message::from_octets(&octets).unwrap();

    assert_eq!(2, message.questions.len());
    assert_eq!(domain("example.com."), message.questions[0].name);
    assert_eq!(domain("www.example.com."), message.questions[1].name);
    assert_eq!("www.example.com.", message.questions[1].name.to_string());
}

#[test]
fn udp_response_over_limit_is_clipped() {
    let mut message = Message::from_question(
        1,
        Question {
            name: domain("www.example.com."),
            qtype: QueryType::Record(RecordType::TXT),
            qclass: QueryClass::Record(RecordClass::IN),
        },
    )
    .make_response();
    // 12 + 21 + 27 + 540
    message.answers = vec![raw_record("www.example.com.", RecordType::TXT, &[b'x'; 540])];

    let natural = message.to_octets(Transport::Tcp).unwrap();
    assert_eq!(600, natural.len());

    let clipped = message.to_octets(Transport::Udp).unwrap();
    assert_eq!(UDP_BODY_LIMIT, clipped.len() - 4);
    assert_eq!(512, clipped.len());
    assert_eq!(HEADER_MASK_TC, clipped[2] & HEADER_MASK_TC);
    assert_eq!(&natural[4..512], &clipped[4..]);
}

#[test]
fn udp_response_under_limit_is_untouched() {
    let mut message = Message::from_question(
        1,
        Question {
            name: domain("www.example.com."),
            qtype: QueryType::Record(RecordType::TXT),
            qclass: QueryClass::Record(RecordClass::IN),
        },
    )
    .make_response();
    message.answers = vec![raw_record("www.example.com.", RecordType::TXT, &[b'x'; 340])];

    let octets = message.to_octets(Transport::Udp).unwrap();

    assert_eq!(400, octets.len());
    assert_eq!(0, octets[2] & HEADER_MASK_TC);
    assert_eq!(Ok(message), Message::from_octets(&octets));
}

#[test]
fn ten_octets_is_malformed() {
    let octets = [0x12, 0x34, 0, 0, 0, 0, 0, 0, 0, 0];

    assert_eq!(
        Err(MalformedMessage::HeaderTooShort(0x1234)),
        Message::from_octets(&octets)
    );
}

#[test]
fn missing_question_is_malformed() {
    let octets = [0x12, 0x34, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0];

    let error = Message::from_octets(&octets).unwrap_err();

    assert_eq!(Some(0x1234), error.id());
}

#[test]
fn truncated_answer_is_malformed() {
    let mut message = Message::from_question(
        1,
        Question {
            name: domain("www.example.com."),
            qtype: QueryType::Record(RecordType::A),
            qclass: QueryClass::Record(RecordClass::IN),
        },
    )
    .make_response();
    message.answers = vec![a_record("www.example.com.", [1, 2, 3, 4])];

    let octets = message.to_octets(Transport::Tcp).unwrap();
    for len in 0..octets.len() {
        assert!(Message::from_octets(&octets[..len]).is_err());
    }
}
