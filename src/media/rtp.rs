//! Minimal RTP packet encode/decode (RFC 3550 fixed header only)

use crate::error::{RelayError, Result};

const RTP_VERSION: u8 = 2;
const FIXED_HEADER_LEN: usize = 12;

/// RTP packet without CSRCs or header extensions on the send side
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpPacket {
    pub payload_type: u8,
    pub marker: bool,
    pub sequence_number: u16,
    pub timestamp: u32,
    pub ssrc: u32,
    pub payload: Vec<u8>,
}

impl RtpPacket {
    pub fn new(payload_type: u8, sequence_number: u16, timestamp: u32, ssrc: u32, payload: Vec<u8>) -> Self {
        Self {
            payload_type,
            marker: false,
            sequence_number,
            timestamp,
            ssrc,
            payload,
        }
    }

    pub fn with_marker(mut self, marker: bool) -> Self {
        self.marker = marker;
        self
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(FIXED_HEADER_LEN + self.payload.len());
        out.push(RTP_VERSION << 6);
        out.push(((self.marker as u8) << 7) | (self.payload_type & 0x7f));
        out.extend_from_slice(&self.sequence_number.to_be_bytes());
        out.extend_from_slice(&self.timestamp.to_be_bytes());
        out.extend_from_slice(&self.ssrc.to_be_bytes());
        out.extend_from_slice(&self.payload);
        out
    }

    /// Decode a datagram, skipping CSRCs, extension and padding
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < FIXED_HEADER_LEN {
            return Err(RelayError::Data(format!("RTP packet too short: {} bytes", buf.len())));
        }

        let version = buf[0] >> 6;
        if version != RTP_VERSION {
            return Err(RelayError::Data(format!("unsupported RTP version {}", version)));
        }
        let padding = buf[0] & 0x20 != 0;
        let extension = buf[0] & 0x10 != 0;
        let csrc_count = (buf[0] & 0x0f) as usize;

        let mut offset = FIXED_HEADER_LEN + csrc_count * 4;
        if extension {
            if buf.len() < offset + 4 {
                return Err(RelayError::Data("truncated RTP header extension".into()));
            }
            let words = u16::from_be_bytes([buf[offset + 2], buf[offset + 3]]) as usize;
            offset += 4 + words * 4;
        }

        let mut end = buf.len();
        if padding {
            let pad = *buf.last().unwrap_or(&0) as usize;
            end = end.saturating_sub(pad);
        }
        if offset > end {
            return Err(RelayError::Data("RTP header longer than packet".into()));
        }

        Ok(Self {
            payload_type: buf[1] & 0x7f,
            marker: buf[1] & 0x80 != 0,
            sequence_number: u16::from_be_bytes([buf[2], buf[3]]),
            timestamp: u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
            ssrc: u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]),
            payload: buf[offset..end].to_vec(),
        })
    }
}
