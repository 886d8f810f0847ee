#![no_main]
use libfuzzer_sys::fuzz_target;

use dns_types::protocol::serialise::{Transport, TCP_MESSAGE_LIMIT};
use dns_types::protocol::types::Message;

fuzz_target!(|message: Message| {
    if let Ok(serialised) = message.to_octets(Transport::Tcp) {
        if serialised.len() < TCP_MESSAGE_LIMIT {
            let deserialised = Message::from_octets(&serialised);
            assert_eq!(Ok(message), deserialised);
        }
    }
});
