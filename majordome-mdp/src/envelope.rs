//! Return-address envelope handling.
//!
//! REQUEST and REPLY bodies carry `[...address frames, empty, ...payload]`.
//! The address stack is captured once when a request is dispatched and
//! consumed exactly once when the matching reply is routed back; the empty
//! frame separates it from the opaque payload.

use bytes::Bytes;

/// Split a body at the first empty delimiter frame.
///
/// Returns `(address stack, payload)`, or `None` if there is no delimiter.
/// An empty address stack is possible (delimiter-first body) and left to
/// the caller to judge.
#[must_use]
pub fn split_envelope(frames: &[Bytes]) -> Option<(Vec<Bytes>, Vec<Bytes>)> {
    let delim = frames.iter().position(Bytes::is_empty)?;
    Some((frames[..delim].to_vec(), frames[delim + 1..].to_vec()))
}

/// Rebuild a body from an address stack and a payload.
#[must_use]
pub fn wrap_envelope(envelope: Vec<Bytes>, payload: Vec<Bytes>) -> Vec<Bytes> {
    let mut frames = envelope;
    frames.push(Bytes::new());
    frames.extend(payload);
    frames
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(parts: &[&'static [u8]]) -> Vec<Bytes> {
        parts.iter().map(|p| Bytes::from_static(p)).collect()
    }

    #[test]
    fn splits_at_first_delimiter() {
        let body = frames(&[b"peer-1", b"", b"action", b"{}"]);
        let (addr, payload) = split_envelope(&body).unwrap();
        assert_eq!(addr, frames(&[b"peer-1"]));
        assert_eq!(payload, frames(&[b"action", b"{}"]));
    }

    #[test]
    fn later_empty_frames_stay_in_payload() {
        let body = frames(&[b"peer-1", b"", b"x", b"", b"y"]);
        let (_, payload) = split_envelope(&body).unwrap();
        assert_eq!(payload, frames(&[b"x", b"", b"y"]));
    }

    #[test]
    fn no_delimiter_is_none() {
        assert!(split_envelope(&frames(&[b"peer-1", b"payload"])).is_none());
    }

    #[test]
    fn wrap_then_split_roundtrips() {
        let addr = frames(&[b"peer-7"]);
        let payload = frames(&[b"ping", b"{}"]);
        let body = wrap_envelope(addr.clone(), payload.clone());
        assert_eq!(split_envelope(&body).unwrap(), (addr, payload));
    }
}
