#![no_main]

use libfuzzer_sys::fuzz_target;
use truth_or_dare_client::protocol::{split_records, HandshakeResponse, HubMessage};
use truth_or_dare_client::ServerEvent;

fuzz_target!(|data: &[u8]| {
    let Ok(frame) = std::str::from_utf8(data) else {
        return;
    };

    for record in split_records(frame) {
        let _ = HandshakeResponse::parse(record);
        if let Ok(HubMessage::Invocation { target, arguments }) = HubMessage::parse(record) {
            if let Ok(event) = ServerEvent::from_invocation(&target, arguments) {
                // A decoded event always reports the kind it was decoded as.
                assert_eq!(event.kind().as_str(), target);
            }
        }
    }
});
