//! Fuzz target: `FrameReceiver::run`
//!
//! Drives arbitrary byte sequences through the byte-at-a-time frame
//! receiver, with the first input byte choosing how often the inter-byte
//! timer is allowed to expire.  Checks that:
//! - No panics under any byte sequence
//! - Every delivered frame is 1..=40 bytes and matches its announced length
//! - Every delivered frame re-encodes to a frame that `parse_frame` accepts
//!
//! cargo fuzz run fuzz_frame_receiver

#![no_main]

use farmer::dispatch::timers::TimerService;
use farmer::dispatch::{Context, Dispatcher, Event, EventKind, ServiceId};
use farmer::link::receiver::FrameReceiver;
use farmer::link::{encode_frame, parse_frame, MAX_FRAME_LEN, MAX_PAYLOAD_LEN};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Some((&pace, bytes)) = data.split_first() else {
        return;
    };
    // 0 = never advance time; otherwise one tick every `pace` bytes.
    let pace = usize::from(pace % 16);

    let mut rx = FrameReceiver::new(4);
    let mut queue = Dispatcher::new();
    let mut timers = TimerService::new();

    for (i, b) in bytes.iter().enumerate() {
        if pace != 0 && i % pace == 0 {
            timers.tick(&mut queue);
        }
        let mut cx = Context::new(&mut queue, &mut timers);
        rx.run(Event::new(EventKind::ByteReceived, u16::from(*b)), &mut cx);

        while let Some((to, ev)) = queue.next() {
            match to {
                ServiceId::Receiver => {
                    let mut cx = Context::new(&mut queue, &mut timers);
                    rx.run(ev, &mut cx);
                }
                ServiceId::Comm => {
                    assert_eq!(ev.kind, EventKind::PacketReceived);
                    let frame = rx.frame();
                    assert_eq!(usize::from(ev.param), frame.len());
                    assert!(!frame.is_empty() && frame.len() <= MAX_PAYLOAD_LEN);

                    let mut out = [0u8; MAX_FRAME_LEN];
                    let len = encode_frame(frame, &mut out).expect("delivered frame must re-encode");
                    assert_eq!(parse_frame(&out[..len]), Some(frame));
                }
                other => panic!("receiver posted to {other:?}"),
            }
        }
    }
});
