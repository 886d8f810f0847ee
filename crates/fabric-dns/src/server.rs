use dns_responder::{respond, QuestionHandler};
use dns_types::protocol::deserialise::MalformedMessage;
use dns_types::protocol::types::*;

use crate::metrics::{DNS_QUESTIONS_TOTAL, DNS_RESPONSES_TOTAL};

/// Parse a query and build the response to it.
///
/// Responses sent to us get FORMERR, and opcodes other than a
/// standard query get NOTIMP.  Everything else goes to the handler,
/// one question at a time.
///
/// # Errors
///
/// If the octets are not a DNS message.  The error carries the ID,
/// if there was one, so a FORMERR can still be sent.
pub fn handle_raw_message<H: QuestionHandler + ?Sized>(
    handler: &H,
    buf: &[u8],
) -> Result<Message, MalformedMessage> {
    let query = Message::from_octets(buf)?;

    if query.header.is_response {
        tracing::debug!(id = query.header.id, "got a response rather than a query");
        return Ok(Message::make_format_error_response(query.header.id));
    }

    if query.header.opcode != Opcode::Standard {
        tracing::debug!(id = query.header.id, "got an unsupported opcode");
        let mut response = query.make_response();
        response.header.rcode = Rcode::NotImplemented;
        return Ok(response);
    }

    for question in &query.questions {
        let qtype = question.qtype.to_string();
        let qclass = question.qclass.to_string();
        DNS_QUESTIONS_TOTAL
            .with_label_values(&[qtype.as_str(), qclass.as_str()])
            .inc();
    }

    Ok(respond(handler, &query))
}

/// Count a response as it is sent.
pub fn record_response(response: &Message) {
    let rcode = response.header.rcode.to_string();
    DNS_RESPONSES_TOTAL
        .with_label_values(&[
            bool_label(response.header.is_authoritative),
            bool_label(response.header.is_truncated),
            bool_label(response.header.recursion_desired),
            bool_label(response.header.recursion_available),
            rcode.as_str(),
        ])
        .inc();
}

fn bool_label(flag: bool) -> &'static str {
    if flag {
        "true"
    } else {
        "false"
    }
}
