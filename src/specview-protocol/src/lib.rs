// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

pub mod codec;

pub use codec::{decode_frame, encode_frame, CodecError, FRAME_HEADER_LEN};
