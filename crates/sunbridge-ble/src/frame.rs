// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Frame codec for the vendor register protocol.
//!
//! The BT module speaks a Modbus-flavoured framing over two GATT
//! characteristics. A read request is eight bytes:
//!
//! ```text
//! [device_id, function, start_hi, start_lo, count_hi, count_lo, crc_lo, crc_hi]
//! ```
//!
//! and the response echoes the header ahead of the payload:
//!
//! ```text
//! [device_id, function, byte_count, payload..., crc_lo, crc_hi]
//! [device_id, function|0x80, exception_code, crc_lo, crc_hi]       (error)
//! ```
//!
//! The checksum is CRC-16/MODBUS (poly 0xA001 reflected, init 0xFFFF),
//! transmitted low byte first. This module does no I/O: it encodes
//! requests, parses/verifies responses, and reassembles frames from the
//! notification chunk stream via [`FrameAssembler`].

use bytes::{Buf, BytesMut};

use sunbridge_core::error::{FrameError, FrameResult};

/// Function code for "read holding registers", the only operation this
/// read-only gateway issues.
pub const FUNCTION_READ: u8 = 0x03;

/// Shortest complete response: id + fc + one byte + CRC.
pub const MIN_RESPONSE_LEN: usize = 5;

/// Computes the protocol checksum over `data`.
pub fn checksum(data: &[u8]) -> u16 {
    crc16::State::<crc16::MODBUS>::calculate(data)
}

// =============================================================================
// RequestFrame
// =============================================================================

/// A read-registers request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestFrame {
    /// Target device ID on the shared BT module (hub mode multiplexes
    /// several logical devices over one link).
    pub device_id: u8,
    /// Function code; always [`FUNCTION_READ`] here.
    pub function: u8,
    /// Starting register address.
    pub start: u16,
    /// Number of 16-bit registers to read.
    pub count: u16,
}

impl RequestFrame {
    /// Creates a read request.
    pub fn read(device_id: u8, start: u16, count: u16) -> Self {
        Self {
            device_id,
            function: FUNCTION_READ,
            start,
            count,
        }
    }

    /// Encodes the request into wire bytes with the CRC trailer.
    pub fn encode(&self) -> Vec<u8> {
        let mut frame = Vec::with_capacity(8);
        frame.push(self.device_id);
        frame.push(self.function);
        frame.extend_from_slice(&self.start.to_be_bytes());
        frame.extend_from_slice(&self.count.to_be_bytes());
        let crc = checksum(&frame);
        frame.extend_from_slice(&crc.to_le_bytes());
        frame
    }

    /// Decodes a request frame, verifying length and checksum.
    pub fn decode(data: &[u8]) -> FrameResult<Self> {
        if data.len() < 8 {
            return Err(FrameError::too_short(data.len(), 8));
        }

        let computed = checksum(&data[..6]);
        let received = u16::from_le_bytes([data[6], data[7]]);
        if computed != received {
            return Err(FrameError::checksum_mismatch(received, computed));
        }

        Ok(Self {
            device_id: data[0],
            function: data[1],
            start: u16::from_be_bytes([data[2], data[3]]),
            count: u16::from_be_bytes([data[4], data[5]]),
        })
    }
}

// =============================================================================
// ResponseFrame
// =============================================================================

/// A verified response frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFrame {
    /// Device ID echoed by the responder.
    pub device_id: u8,
    /// Function code echoed by the responder.
    pub function: u8,
    /// Register payload (big-endian words).
    pub payload: Vec<u8>,
}

/// Parses and verifies a complete response frame.
///
/// Verification order matters: checksum first, then header match. A frame
/// is only attributed to a device after it proves to be intact.
pub fn parse_response(
    data: &[u8],
    expected_device: u8,
    expected_function: u8,
) -> FrameResult<ResponseFrame> {
    if data.len() < MIN_RESPONSE_LEN {
        return Err(FrameError::too_short(data.len(), MIN_RESPONSE_LEN));
    }

    let function = data[1];

    // Exception frame: fixed five bytes.
    if function & 0x80 != 0 {
        verify_crc(&data[..MIN_RESPONSE_LEN])?;
        if data[0] != expected_device {
            return Err(FrameError::UnexpectedDevice {
                expected: expected_device,
                actual: data[0],
            });
        }
        if function & 0x7F != expected_function {
            return Err(FrameError::UnexpectedFunction {
                expected: expected_function,
                actual: function,
            });
        }
        return Err(FrameError::Exception { code: data[2] });
    }

    let byte_count = data[2] as usize;
    let total = 3 + byte_count + 2;
    if data.len() < total {
        return Err(FrameError::too_short(data.len(), total));
    }

    verify_crc(&data[..total])?;

    if data[0] != expected_device {
        return Err(FrameError::UnexpectedDevice {
            expected: expected_device,
            actual: data[0],
        });
    }
    if function != expected_function {
        return Err(FrameError::UnexpectedFunction {
            expected: expected_function,
            actual: function,
        });
    }

    Ok(ResponseFrame {
        device_id: data[0],
        function,
        payload: data[3..3 + byte_count].to_vec(),
    })
}

/// Verifies the CRC trailer of `frame` (body + 2 trailer bytes).
fn verify_crc(frame: &[u8]) -> FrameResult<()> {
    let body = &frame[..frame.len() - 2];
    let computed = checksum(body);
    let received = u16::from_le_bytes([frame[frame.len() - 2], frame[frame.len() - 1]]);
    if computed != received {
        return Err(FrameError::checksum_mismatch(received, computed));
    }
    Ok(())
}

// =============================================================================
// FrameAssembler
// =============================================================================

/// Reassembles response frames from a BLE notification byte stream.
///
/// Notifications arrive in MTU-sized chunks that need not align with frame
/// boundaries; stray bytes from a previous aborted exchange may precede the
/// frame. The assembler buffers chunks, recognizes frame completion from
/// the length header, and on corruption resynchronizes by scanning forward
/// to the next plausible header for the outstanding request.
#[derive(Debug)]
pub struct FrameAssembler {
    device_id: u8,
    function: u8,
    buf: BytesMut,
}

impl FrameAssembler {
    /// Creates an assembler for one outstanding request.
    pub fn new(device_id: u8, function: u8) -> Self {
        Self {
            device_id,
            function,
            buf: BytesMut::with_capacity(256),
        }
    }

    /// Appends a notification chunk.
    pub fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Returns the number of buffered bytes.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Discards all buffered bytes.
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Attempts to extract the next frame from the buffer.
    ///
    /// - `None`: no complete frame yet; feed more chunks.
    /// - `Some(Ok(frame))`: a verified frame for the outstanding request.
    /// - `Some(Err(_))`: a complete-looking frame failed verification; the
    ///   buffer has been resynchronized past it, so the caller may keep
    ///   collecting or retry the request.
    pub fn poll_frame(&mut self) -> Option<FrameResult<ResponseFrame>> {
        loop {
            self.sync_to_header();

            if self.buf.len() < MIN_RESPONSE_LEN {
                return None;
            }

            let total = self.pending_frame_len();
            if self.buf.len() < total {
                return None;
            }

            let candidate = self.buf.split_to(total);
            match parse_response(&candidate, self.device_id, self.function) {
                Ok(frame) => return Some(Ok(frame)),
                Err(err) => {
                    // Resync: drop the first byte of the bad candidate and
                    // rescan it together with whatever followed.
                    let mut rest = BytesMut::with_capacity(candidate.len() - 1 + self.buf.len());
                    rest.extend_from_slice(&candidate[1..]);
                    rest.extend_from_slice(&self.buf);
                    self.buf = rest;
                    return Some(Err(err));
                }
            }
        }
    }

    /// Drops leading bytes that cannot start a response to the outstanding
    /// request.
    fn sync_to_header(&mut self) {
        while self.buf.len() >= 2 {
            let id_ok = self.buf[0] == self.device_id;
            let fc = self.buf[1];
            let fc_ok = fc == self.function || fc == self.function | 0x80;
            if id_ok && fc_ok {
                return;
            }
            self.buf.advance(1);
        }
    }

    /// Total frame length implied by the buffered header.
    ///
    /// Assumes a plausible header at offset 0 and at least
    /// [`MIN_RESPONSE_LEN`] buffered bytes.
    fn pending_frame_len(&self) -> usize {
        if self.buf[1] & 0x80 != 0 {
            MIN_RESPONSE_LEN
        } else {
            3 + self.buf[2] as usize + 2
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
