#![no_main]

//! Fuzz target for the stateless path: everything an unknown peer can make
//! the driver parse before a connection exists.
//!
//! Each input is tried as-is and wrapped in a DTLS 1.2 handshake record
//! header, so the ClientHello and HelloVerifyRequest parsers see plausible
//! framing as well as garbage.

use libfuzzer_sys::fuzz_target;

use dtlsmux::message::{
    classify_opener, describe, split_records, ClientHello, HelloVerifyRequest, Opener,
    RECORD_HEADER_LEN,
};
use dtlsmux::COOKIE_LEN;

const MAX_FRAGMENT_SIZE: usize = 16384;

fn exercise(data: &[u8]) {
    let _ = describe(data);

    match classify_opener(data) {
        Opener::WithCookie(hello) => assert_eq!(hello.cookie.len(), COOKIE_LEN),
        Opener::Fresh | Opener::Invalid => {}
    }

    let _ = ClientHello::parse(data);
    let _ = HelloVerifyRequest::parse(data);

    let mut records = split_records(data);
    let mut total = 0;
    for record in records.by_ref() {
        assert!(record.len() >= RECORD_HEADER_LEN);
        total += record.len();
    }
    assert_eq!(total + records.remainder().len(), data.len());
}

fuzz_target!(|data: &[u8]| {
    exercise(data);

    if !data.is_empty() {
        let frag_len = data.len().min(MAX_FRAGMENT_SIZE);

        let mut record = Vec::with_capacity(RECORD_HEADER_LEN + frag_len);
        record.push(22u8); // Handshake
        record.extend_from_slice(&[0xFE, 0xFD]); // DTLS 1.2
        record.extend_from_slice(&[0, 0]); // epoch 0
        record.extend_from_slice(&[0, 0, 0, 0, 0, 1]); // sequence 1
        record.extend_from_slice(&(frag_len as u16).to_be_bytes());
        record.extend_from_slice(&data[..frag_len]);

        exercise(&record);
    }
});
