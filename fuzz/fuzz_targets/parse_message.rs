#![no_main]
use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use sip_core::SipMessage;
use sip_parse::{parse_message, serialize_response, ParseOutcome};

fuzz_target!(|data: &[u8]| {
    let bytes = Bytes::copy_from_slice(data);
    // Any parsed response must serialize again without panicking.
    if let ParseOutcome::Message(SipMessage::Response(response)) = parse_message(&bytes) {
        let _ = serialize_response(&response);
    }
});
