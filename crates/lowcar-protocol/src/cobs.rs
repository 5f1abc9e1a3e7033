//! Consistent Overhead Byte Stuffing.
//!
//! Guarantees the encoded output never contains `0x00`, so that byte can be
//! reserved as the frame delimiter. Overhead is one byte per started run of
//! 254 non-zero bytes.

use crate::ProtocolError;

/// Longest run a single COBS length byte can describe.
const MAX_BLOCK: u8 = 0xFF;

/// Encodes `src`, returning a buffer free of zero bytes.
pub fn encode(src: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(src.len() + src.len() / 254 + 1);
    let mut code_at = out.len();
    out.push(0); // patched when the block closes
    let mut code: u8 = 1;

    for &byte in src {
        if byte == 0 {
            out[code_at] = code;
            code_at = out.len();
            out.push(0);
            code = 1;
        } else {
            out.push(byte);
            code += 1;
            if code == MAX_BLOCK {
                out[code_at] = code;
                code_at = out.len();
                out.push(0);
                code = 1;
            }
        }
    }
    out[code_at] = code;
    out
}

/// Decodes a COBS body produced by [`encode`].
///
/// Rejects truncated blocks and embedded zero bytes instead of panicking;
/// the framing layer treats either as a corrupt frame and resynchronizes.
pub fn decode(src: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let mut out = Vec::with_capacity(src.len());
    let mut at = 0;

    while at < src.len() {
        let code = src[at];
        if code == 0 {
            return Err(ProtocolError::CobsZero);
        }
        at += 1;
        let run_end = at + (code as usize - 1);
        if run_end > src.len() {
            return Err(ProtocolError::CobsTruncated);
        }
        if src[at..run_end].contains(&0) {
            return Err(ProtocolError::CobsZero);
        }
        out.extend_from_slice(&src[at..run_end]);
        at = run_end;
        if code < MAX_BLOCK && at < src.len() {
            out.push(0);
        }
    }
    Ok(out)
}
