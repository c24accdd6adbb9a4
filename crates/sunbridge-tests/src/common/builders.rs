// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Builders for protocol frames and gateway components.

use sunbridge_ble::frame::{checksum, FUNCTION_READ};

/// Wraps a register payload in a valid response frame for `unit_id`.
pub fn response_frame(unit_id: u8, payload: &[u8]) -> Vec<u8> {
    let mut frame = vec![unit_id, FUNCTION_READ, payload.len() as u8];
    frame.extend_from_slice(payload);
    let crc = checksum(&frame);
    frame.extend_from_slice(&crc.to_le_bytes());
    frame
}

/// Builds an exception response frame.
pub fn exception_frame(unit_id: u8, code: u8) -> Vec<u8> {
    let mut frame = vec![unit_id, FUNCTION_READ | 0x80, code];
    let crc = checksum(&frame);
    frame.extend_from_slice(&crc.to_le_bytes());
    frame
}

/// Splits a frame into notification-sized chunks.
pub fn chunked(frame: Vec<u8>, chunk_size: usize) -> Vec<Vec<u8>> {
    frame
        .chunks(chunk_size.max(1))
        .map(|c| c.to_vec())
        .collect()
}

/// Encodes big-endian register words as payload bytes.
pub fn words(values: &[u16]) -> Vec<u8> {
    values.iter().flat_map(|w| w.to_be_bytes()).collect()
}
