//! Framing for the one message the core sends itself: the OK packet that
//! finishes a client handshake.

use bytes::{BufMut, BytesMut};

use super::constants::OK_PACKET_HEADER;

/// Append a length-encoded integer.
fn put_lenenc_int(buffer: &mut BytesMut, value: u64) {
    match value {
        0..=250 => buffer.put_u8(value as u8),
        251..=0xFFFF => {
            buffer.put_u8(0xFC);
            buffer.put_u16_le(value as u16);
        }
        0x1_0000..=0xFF_FFFF => {
            buffer.put_u8(0xFD);
            buffer.put_u8((value & 0xFF) as u8);
            buffer.put_u8(((value >> 8) & 0xFF) as u8);
            buffer.put_u8(((value >> 16) & 0xFF) as u8);
        }
        _ => {
            buffer.put_u8(0xFE);
            buffer.put_u64_le(value);
        }
    }
}

/// Frame a payload with the 4-byte packet header: 3 bytes little-endian
/// length plus the sequence id.
pub fn frame_packet(seq_id: u8, payload: &[u8]) -> BytesMut {
    let mut buffer = BytesMut::with_capacity(4 + payload.len());
    let len = payload.len();
    buffer.put_u8((len & 0xFF) as u8);
    buffer.put_u8(((len >> 8) & 0xFF) as u8);
    buffer.put_u8(((len >> 16) & 0xFF) as u8);
    buffer.put_u8(seq_id);
    buffer.put_slice(payload);
    buffer
}

/// Build a framed OK packet.
pub fn ok_packet(
    seq_id: u8,
    affected_rows: u64,
    last_insert_id: u64,
    status_flags: u16,
    warnings: u16,
) -> BytesMut {
    let mut payload = BytesMut::with_capacity(16);
    payload.put_u8(OK_PACKET_HEADER);
    put_lenenc_int(&mut payload, affected_rows);
    put_lenenc_int(&mut payload, last_insert_id);
    payload.put_u16_le(status_flags);
    payload.put_u16_le(warnings);
    frame_packet(seq_id, &payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::constants::SERVER_STATUS_AUTOCOMMIT;

    #[test]
    fn ok_packet_layout() {
        let packet = ok_packet(1, 0, 0, SERVER_STATUS_AUTOCOMMIT, 0);
        assert_eq!(
            &packet[..],
            &[0x07, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn lenenc_int_boundaries() {
        let mut buffer = BytesMut::new();
        put_lenenc_int(&mut buffer, 250);
        assert_eq!(&buffer[..], &[250]);

        let mut buffer = BytesMut::new();
        put_lenenc_int(&mut buffer, 251);
        assert_eq!(&buffer[..], &[0xFC, 251, 0]);

        let mut buffer = BytesMut::new();
        put_lenenc_int(&mut buffer, 0x1_0000);
        assert_eq!(&buffer[..], &[0xFD, 0, 0, 1]);

        let mut buffer = BytesMut::new();
        put_lenenc_int(&mut buffer, u64::MAX);
        assert_eq!(buffer[0], 0xFE);
        assert_eq!(buffer.len(), 9);
    }

    #[test]
    fn frame_packet_header_is_little_endian() {
        let payload = vec![0u8; 0x0201];
        let packet = frame_packet(3, &payload);
        assert_eq!(&packet[..4], &[0x01, 0x02, 0x00, 0x03]);
        assert_eq!(packet.len(), 4 + payload.len());
    }
}
