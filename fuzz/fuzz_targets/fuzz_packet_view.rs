//! Fuzz target: `PacketView::parse` and `decode_in_place`
//!
//! Treats the input as a received payload and checks that matching it
//! against the packet layouts never panics, that every named field of a
//! matched layout lies inside the payload, and that decoding keyed bytes
//! advances the key stream by exactly the keyed length.
//!
//! cargo fuzz run fuzz_packet_view

#![no_main]

use farmer::comm::cipher::{KeyStream, KEY_LEN};
use farmer::comm::schema::{decode_in_place, PacketView};
use farmer::link::MAX_PAYLOAD_LEN;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() < KEY_LEN {
        return;
    }
    let (key, payload) = data.split_at(KEY_LEN);
    if payload.len() > MAX_PAYLOAD_LEN {
        return;
    }

    let Ok(view) = PacketView::parse(payload) else {
        return;
    };
    let layout = view.layout();
    for field in layout.fields {
        assert!(view.field(field.id).is_some(), "{:?} outside payload", field.id);
    }

    let mut key_bytes = [0u8; KEY_LEN];
    key_bytes.copy_from_slice(key);
    let mut keys = KeyStream::from_key(key_bytes);
    let mut bytes = payload.to_vec();
    if decode_in_place(layout, &mut bytes, &mut keys).is_ok() {
        assert_eq!(usize::from(keys.index()), layout.keyed_len() % KEY_LEN);
    }
});
