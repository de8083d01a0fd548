#![no_main]

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use majordome_core::codec::FrameDecoder;
use majordome_core::message::MqMessage;
use majordome_core::multipart::MultipartAssembler;
use majordome_mdp::command::Command;

fuzz_target!(|data: &[u8]| {
    // Frame decoding + multipart assembly over arbitrary bytes must never
    // panic, only return errors or ask for more data.
    let mut decoder = FrameDecoder::new(1 << 16);
    let mut assembler = MultipartAssembler::new(64, 1 << 16);
    let mut buf = BytesMut::from(data);
    loop {
        match decoder.decode(&mut buf) {
            Ok(Some(frame)) => {
                if let Ok(Some(msg)) = assembler.push(frame) {
                    // Whatever assembled, payload decoding must not panic
                    // either.
                    let _ = MqMessage::from_frames(&msg);
                }
            }
            Ok(None) | Err(_) => break,
        }
    }

    // Command bytes decode to a known command or None, never panic.
    if let Some(byte) = data.first() {
        let _ = Command::from_byte(*byte);
    }
});
