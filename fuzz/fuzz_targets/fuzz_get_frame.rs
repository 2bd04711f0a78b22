#![no_main]

use bytes::BytesMut;
use frame_link::{CheckKind, FramingProtocol, HeadTailProtocol};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Feed arbitrary bytes through both framings, in two chunks, and look for
    // panics or a parser that stops making progress.
    let Ok(head_tail) = HeadTailProtocol::new(&b"##"[..], &b"$$"[..], 1, CheckKind::Sum) else {
        return;
    };
    let protocols = [FramingProtocol::fixed_head_default(), head_tail.into()];
    let split = data.first().map_or(0, |b| usize::from(*b)).min(data.len());

    for protocol in &protocols {
        let mut buf = BytesMut::new();
        for chunk in [&data[..split], &data[split..]] {
            buf.extend_from_slice(chunk);
            for _ in 0..=data.len() {
                match protocol.get_frame(&mut buf) {
                    Ok(Some(packet)) => assert!(packet.encoded_len() > 0),
                    Ok(None) | Err(_) => break,
                }
            }
        }
    }
});
