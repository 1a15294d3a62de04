//! Control-plane wire packets: probe/reset/ping/ack/version-negotiation.
//!
//! Every control packet shares a [`ControlHeader`]; the `Ack` variant adds two
//! extra fields referencing the command and sequence number it acknowledges.
//! All multi-byte integers are big-endian on the wire. The checksum field is
//! zeroed while computing or verifying [`checksum16`](crate::checksum16).

use crate::checksum::checksum16;
use crate::constants::{DEVICE_ADDRESS_SIZE, MAX_IP_STRING_SIZE, MAX_STREAM_NAME_SIZE};
use crate::error::CodecError;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// The control-plane command carried by a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ControlCommand {
    Reset = 0x01,
    Ping = 0x02,
    Connected = 0x03,
    Ack = 0x04,
    ProtocolVersion = 0x05,
    /// Never a packet's own top-level command; appears only inside an
    /// [`AckExtra::acked_command`] when the `Ack` it's attached to
    /// acknowledges a reassembled data-plane payload rather than one of the
    /// control commands above.
    PayloadDelivered = 0x06,
}

impl ControlCommand {
    fn from_u8(v: u8) -> Result<Self, CodecError> {
        Ok(match v {
            0x01 => ControlCommand::Reset,
            0x02 => ControlCommand::Ping,
            0x03 => ControlCommand::Connected,
            0x04 => ControlCommand::Ack,
            0x05 => ControlCommand::ProtocolVersion,
            0x06 => ControlCommand::PayloadDelivered,
            other => return Err(CodecError::UnknownCommand(other)),
        })
    }

    fn name(&self) -> &'static str {
        match self {
            ControlCommand::Reset => "Reset",
            ControlCommand::Ping => "Ping",
            ControlCommand::Connected => "Connected",
            ControlCommand::Ack => "Ack",
            ControlCommand::ProtocolVersion => "ProtocolVersion",
            ControlCommand::PayloadDelivered => "PayloadDelivered",
        }
    }
}

/// `{probe_version_num, major, minor}` advertised during version negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProtocolVersion {
    pub probe_version_num: u8,
    pub major: u8,
    pub minor: u8,
}

impl ProtocolVersion {
    /// The minimum probe version this crate will negotiate down to.
    pub const MIN_SUPPORTED: u8 = 3;

    pub fn is_compatible(&self) -> bool {
        self.probe_version_num >= Self::MIN_SUPPORTED
    }
}

/// Fields common to every control packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlHeader {
    pub control_packet_num: u32,
    pub sender_device_address: [u8; DEVICE_ADDRESS_SIZE],
    pub sender_ip: String,
    pub sender_stream_name: String,
    pub sender_stream_id: u32,
    pub sender_control_dest_port: u16,
    pub sender_version: ProtocolVersion,
}

impl ControlHeader {
    pub fn new(control_packet_num: u32, sender_stream_id: u32, sender_control_dest_port: u16) -> Self {
        Self {
            control_packet_num,
            sender_device_address: [0; DEVICE_ADDRESS_SIZE],
            sender_ip: String::new(),
            sender_stream_name: String::new(),
            sender_stream_id,
            sender_control_dest_port,
            sender_version: ProtocolVersion {
                probe_version_num: ProtocolVersion::MIN_SUPPORTED,
                major: 1,
                minor: 0,
            },
        }
    }
}

/// Extra fields carried only by the `Ack` variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckExtra {
    pub acked_command: ControlCommand,
    pub acked_control_packet_num: u32,
}

/// A decoded control-plane packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlPacket {
    Reset(ControlHeader),
    Ping(ControlHeader),
    Connected(ControlHeader),
    ProtocolVersion(ControlHeader),
    Ack(ControlHeader, AckExtra),
}

impl ControlPacket {
    pub fn header(&self) -> &ControlHeader {
        match self {
            ControlPacket::Reset(h)
            | ControlPacket::Ping(h)
            | ControlPacket::Connected(h)
            | ControlPacket::ProtocolVersion(h)
            | ControlPacket::Ack(h, _) => h,
        }
    }

    pub fn command(&self) -> ControlCommand {
        match self {
            ControlPacket::Reset(_) => ControlCommand::Reset,
            ControlPacket::Ping(_) => ControlCommand::Ping,
            ControlPacket::Connected(_) => ControlCommand::Connected,
            ControlPacket::ProtocolVersion(_) => ControlCommand::ProtocolVersion,
            ControlPacket::Ack(..) => ControlCommand::Ack,
        }
    }

    /// Encodes this packet, computing and inserting the checksum over the
    /// whole (checksum-zeroed) buffer.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(encoded_len(self));
        buf.put_u8(self.command() as u8);
        buf.put_u16(0); // checksum placeholder
        encode_body(self, &mut buf);

        let sum = checksum16(&buf);
        buf[1..3].copy_from_slice(&sum.to_be_bytes());
        buf.freeze()
    }

    /// Decodes and validates a control packet, verifying its checksum and
    /// that its length matches the declared command's fixed size.
    pub fn decode(mut data: &[u8]) -> Result<Self, CodecError> {
        if data.len() < 3 {
            return Err(CodecError::Truncated {
                need: 3,
                have: data.len(),
            });
        }
        let command_byte = data[0];
        let declared_checksum = u16::from_be_bytes([data[1], data[2]]);
        let command = ControlCommand::from_u8(command_byte)?;

        let mut zeroed = data.to_vec();
        zeroed[1] = 0;
        zeroed[2] = 0;
        let computed = checksum16(&zeroed);
        if computed != declared_checksum {
            return Err(CodecError::ChecksumMismatch {
                computed,
                declared: declared_checksum,
            });
        }

        data.advance(3);
        decode_body(command, data)
    }
}

fn encode_body(packet: &ControlPacket, buf: &mut BytesMut) {
    let header = packet.header();
    buf.put_u32(header.control_packet_num);
    buf.put_slice(&header.sender_device_address);
    put_fixed_string(buf, &header.sender_ip, MAX_IP_STRING_SIZE);
    put_fixed_string(buf, &header.sender_stream_name, MAX_STREAM_NAME_SIZE);
    buf.put_u32(header.sender_stream_id);
    buf.put_u16(header.sender_control_dest_port);
    buf.put_u8(header.sender_version.probe_version_num);
    buf.put_u8(header.sender_version.major);
    buf.put_u8(header.sender_version.minor);

    if let ControlPacket::Ack(_, extra) = packet {
        buf.put_u8(extra.acked_command as u8);
        buf.put_u32(extra.acked_control_packet_num);
    }
}

fn decode_body(command: ControlCommand, mut data: &[u8]) -> Result<ControlPacket, CodecError> {
    let header = decode_header(&mut data)?;
    match command {
        ControlCommand::Reset => {
            check_exhausted(command, &data)?;
            Ok(ControlPacket::Reset(header))
        }
        ControlCommand::Ping => {
            check_exhausted(command, &data)?;
            Ok(ControlPacket::Ping(header))
        }
        ControlCommand::Connected => {
            check_exhausted(command, &data)?;
            Ok(ControlPacket::Connected(header))
        }
        ControlCommand::ProtocolVersion => {
            check_exhausted(command, &data)?;
            Ok(ControlPacket::ProtocolVersion(header))
        }
        ControlCommand::Ack => {
            if data.len() < 5 {
                return Err(CodecError::Truncated {
                    need: 5,
                    have: data.len(),
                });
            }
            let acked_command = ControlCommand::from_u8(data.get_u8())?;
            let acked_control_packet_num = data.get_u32();
            check_exhausted(command, &data)?;
            Ok(ControlPacket::Ack(
                header,
                AckExtra {
                    acked_command,
                    acked_control_packet_num,
                },
            ))
        }
        // Never a packet's own top-level command (see the variant's doc comment).
        ControlCommand::PayloadDelivered => Err(CodecError::UnknownCommand(command as u8)),
    }
}

/// Rejects trailing bytes left over after a fixed-size command's body has
/// been fully decoded: the declared length must match the command's size
/// exactly, not just be long enough.
fn check_exhausted(command: ControlCommand, data: &[u8]) -> Result<(), CodecError> {
    if !data.is_empty() {
        return Err(CodecError::SizeMismatch {
            command: command.name(),
            declared: data.len(),
            expected: 0,
        });
    }
    Ok(())
}

fn decode_header(data: &mut &[u8]) -> Result<ControlHeader, CodecError> {
    let fixed_len = 4 + DEVICE_ADDRESS_SIZE
        + (1 + MAX_IP_STRING_SIZE)
        + (1 + MAX_STREAM_NAME_SIZE)
        + 4
        + 2
        + 3;
    if data.len() < fixed_len {
        return Err(CodecError::Truncated {
            need: fixed_len,
            have: data.len(),
        });
    }

    let control_packet_num = data.get_u32();
    let mut sender_device_address = [0u8; DEVICE_ADDRESS_SIZE];
    data.copy_to_slice(&mut sender_device_address);
    let sender_ip = get_fixed_string(data, MAX_IP_STRING_SIZE)?;
    let sender_stream_name = get_fixed_string(data, MAX_STREAM_NAME_SIZE)?;
    let sender_stream_id = data.get_u32();
    let sender_control_dest_port = data.get_u16();
    let sender_version = ProtocolVersion {
        probe_version_num: data.get_u8(),
        major: data.get_u8(),
        minor: data.get_u8(),
    };

    Ok(ControlHeader {
        control_packet_num,
        sender_device_address,
        sender_ip,
        sender_stream_name,
        sender_stream_id,
        sender_control_dest_port,
        sender_version,
    })
}

fn put_fixed_string(buf: &mut BytesMut, s: &str, capacity: usize) {
    let bytes = s.as_bytes();
    let len = bytes.len().min(capacity);
    buf.put_u8(len as u8);
    buf.put_slice(&bytes[..len]);
    buf.put_bytes(0, capacity - len);
}

fn get_fixed_string(data: &mut &[u8], capacity: usize) -> Result<String, CodecError> {
    let len = data.get_u8() as usize;
    if len > capacity {
        return Err(CodecError::StringTooLong);
    }
    let slice = &data[..capacity];
    let s = String::from_utf8_lossy(&slice[..len]).into_owned();
    data.advance(capacity);
    Ok(s)
}

fn encoded_len(packet: &ControlPacket) -> usize {
    let base = 3 // command + checksum
        + 4 // control_packet_num
        + DEVICE_ADDRESS_SIZE
        + (1 + MAX_IP_STRING_SIZE)
        + (1 + MAX_STREAM_NAME_SIZE)
        + 4 // stream id
        + 2 // dest port
        + 3; // version
    match packet {
        ControlPacket::Ack(..) => base + 1 + 4,
        _ => base,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> ControlHeader {
        let mut h = ControlHeader::new(42, 7, 9000);
        h.sender_ip = "10.0.0.1".to_string();
        h.sender_stream_name = "camera-0".to_string();
        h.sender_device_address[0] = 0xAB;
        h
    }

    #[test]
    fn reset_round_trips() {
        let packet = ControlPacket::Reset(sample_header());
        let encoded = packet.encode();
        let decoded = ControlPacket::decode(&encoded).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn ack_round_trips() {
        let packet = ControlPacket::Ack(
            sample_header(),
            AckExtra {
                acked_command: ControlCommand::Reset,
                acked_control_packet_num: 41,
            },
        );
        let encoded = packet.encode();
        let decoded = ControlPacket::decode(&encoded).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn corrupted_byte_fails_checksum() {
        let packet = ControlPacket::Ping(sample_header());
        let mut encoded = packet.encode().to_vec();
        let last = encoded.len() - 1;
        encoded[last] ^= 0xFF;
        assert!(matches!(
            ControlPacket::decode(&encoded),
            Err(CodecError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn unknown_command_rejected() {
        let mut encoded = ControlPacket::Ping(sample_header()).encode().to_vec();
        encoded[0] = 0x7F;
        // Recompute checksum so the failure is specifically UnknownCommand,
        // not an incidental ChecksumMismatch.
        let mut zeroed = encoded.clone();
        zeroed[1] = 0;
        zeroed[2] = 0;
        let sum = checksum16(&zeroed);
        encoded[1..3].copy_from_slice(&sum.to_be_bytes());
        assert!(matches!(
            ControlPacket::decode(&encoded),
            Err(CodecError::UnknownCommand(0x7F))
        ));
    }
}
