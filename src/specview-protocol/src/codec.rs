// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Binary wire format for broadcast spectrum frames.
//!
//! One message per frame, no length prefix (the websocket transport is
//! message-oriented). Little-endian layout, in order:
//!
//! | field            | type | bytes |
//! |------------------|------|-------|
//! | fft_size         | i32  | 4     |
//! | latency_ms       | i64  | 8     |
//! | ref_level        | f32  | 4     |
//! | power_range      | f32  | 4     |
//! | center_frequency | u64  | 8     |
//! | bandwidth        | i32  | 4     |
//! | linear           | i32  | 4     |
//! | spectrum         | f32  | 4 × fft_size |

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

use specview_dsp::FrameInfo;

/// Fixed header length in bytes, ahead of the spectrum data.
pub const FRAME_HEADER_LEN: usize = 36;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("frame too short: {0} bytes (need at least {FRAME_HEADER_LEN})")]
    TooShort(usize),
    #[error("invalid fft size in frame header: {0}")]
    InvalidFftSize(i32),
    #[error("frame length {got} does not match fft size {fft_size} (want {want})")]
    LengthMismatch {
        fft_size: usize,
        want: usize,
        got: usize,
    },
}

/// Serialize one frame into a message payload of exactly
/// `FRAME_HEADER_LEN + 4 * spectrum.len()` bytes.
pub fn encode_frame(info: &FrameInfo, spectrum: &[f32]) -> Bytes {
    let mut buf = BytesMut::with_capacity(FRAME_HEADER_LEN + 4 * spectrum.len());
    buf.put_i32_le(info.fft_size as i32);
    buf.put_i64_le(info.latency_ms);
    buf.put_f32_le(info.ref_level);
    buf.put_f32_le(info.power_range);
    buf.put_u64_le(info.center_frequency);
    buf.put_i32_le(info.bandwidth);
    buf.put_i32_le(if info.linear { 1 } else { 0 });
    for &v in spectrum {
        buf.put_f32_le(v);
    }
    buf.freeze()
}

/// Parse a frame message back into metadata and spectrum values.
pub fn decode_frame(payload: &[u8]) -> Result<(FrameInfo, Vec<f32>), CodecError> {
    if payload.len() < FRAME_HEADER_LEN {
        return Err(CodecError::TooShort(payload.len()));
    }
    let mut buf = payload;
    let fft_size_raw = buf.get_i32_le();
    if fft_size_raw < 0 {
        return Err(CodecError::InvalidFftSize(fft_size_raw));
    }
    let fft_size = fft_size_raw as usize;
    let info = FrameInfo {
        fft_size: fft_size as u32,
        latency_ms: buf.get_i64_le(),
        ref_level: buf.get_f32_le(),
        power_range: buf.get_f32_le(),
        center_frequency: buf.get_u64_le(),
        bandwidth: buf.get_i32_le(),
        linear: buf.get_i32_le() != 0,
    };
    let want = FRAME_HEADER_LEN + 4 * fft_size;
    if payload.len() != want {
        return Err(CodecError::LengthMismatch {
            fft_size,
            want,
            got: payload.len(),
        });
    }
    let mut spectrum = Vec::with_capacity(fft_size);
    for _ in 0..fft_size {
        spectrum.push(buf.get_f32_le());
    }
    Ok((info, spectrum))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_info(fft_size: u32, linear: bool) -> FrameInfo {
        FrameInfo {
            fft_size,
            latency_ms: 42,
            ref_level: -20.0,
            power_range: 100.0,
            center_frequency: 145_000_000,
            bandwidth: 2_400_000,
            linear,
        }
    }

    #[test]
    fn encoded_length_is_header_plus_bins() {
        for fft_size in [64usize, 1024, 4096] {
            let spectrum = vec![0.0f32; fft_size];
            let payload = encode_frame(&sample_info(fft_size as u32, false), &spectrum);
            assert_eq!(payload.len(), 36 + 4 * fft_size);
        }
    }

    #[test]
    fn round_trip_is_exact() {
        let spectrum: Vec<f32> = (0..512).map(|i| -100.0 + i as f32 * 0.25).collect();
        let info = sample_info(512, true);
        let payload = encode_frame(&info, &spectrum);
        let (decoded_info, decoded_spectrum) = decode_frame(&payload).unwrap();
        assert_eq!(decoded_info, info);
        assert_eq!(decoded_spectrum, spectrum);
    }

    #[test]
    fn linear_flag_round_trips_both_ways() {
        let spectrum = vec![1.0f32; 64];
        for linear in [false, true] {
            let payload = encode_frame(&sample_info(64, linear), &spectrum);
            let (info, _) = decode_frame(&payload).unwrap();
            assert_eq!(info.linear, linear);
        }
    }

    #[test]
    fn truncated_payload_is_rejected() {
        let payload = encode_frame(&sample_info(64, false), &vec![0.0f32; 64]);
        assert!(matches!(
            decode_frame(&payload[..20]),
            Err(CodecError::TooShort(20))
        ));
        assert!(matches!(
            decode_frame(&payload[..payload.len() - 4]),
            Err(CodecError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn negative_fft_size_is_rejected() {
        let mut payload = encode_frame(&sample_info(64, false), &vec![0.0f32; 64]).to_vec();
        payload[3] = 0x80;
        assert!(matches!(
            decode_frame(&payload),
            Err(CodecError::InvalidFftSize(_))
        ));
    }
}
