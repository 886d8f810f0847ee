#![no_main]
use libfuzzer_sys::fuzz_target;

use dns_types::protocol::serialise::{Transport, TCP_MESSAGE_LIMIT};
use dns_types::protocol::types::Message;

fuzz_target!(|data: &[u8]| {
    if let Ok(deserialised) = Message::from_octets(data) {
        if let Ok(serialised) = deserialised.to_octets(Transport::Tcp) {
            // expanding pointers in questions can push a message past
            // the limit, and then it comes back truncated
            if serialised.len() < TCP_MESSAGE_LIMIT {
                let re_deserialised = Message::from_octets(&serialised);
                assert_eq!(Ok(deserialised), re_deserialised);
            }
        }
    }
});
