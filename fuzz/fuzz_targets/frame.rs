#![no_main]

use libfuzzer_sys::fuzz_target;
use sealink_core::frame::{encode_frame, FrameDecoder, TaggedFrame};

fuzz_target!(|data: &[u8]| {
    // Arbitrary stream bytes, fed in two pieces, must never panic and never
    // yield a body larger than the limit.
    let split = data.first().map(|&b| b as usize % (data.len() + 1)).unwrap_or(0);
    let mut decoder = FrameDecoder::with_max_len(64 * 1024);
    decoder.push(&data[..split]);
    decoder.push(&data[split..]);

    while let Ok(Some(body)) = decoder.decode() {
        assert!(body.len() <= 64 * 1024);

        // Re-encoding a decoded body reproduces the untagged wire form.
        let wire = encode_frame(None, &body).expect("body fits u32");
        assert_eq!(&wire[4..], &body[..]);

        if let Ok(frame) = TaggedFrame::parse(&body) {
            assert_eq!(frame.payload.len() + 1, body.len());
            let _ = frame.kind();
        }
    }
});
