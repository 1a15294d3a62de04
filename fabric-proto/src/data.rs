//! Data-plane wire packets carrying media payload fragments.
//!
//! Every fragment carries a [`DataHeader`] whose `payload_type` selects one
//! of three layouts: `Num0` (first fragment of a payload, extended with the
//! payload's total size and out-of-band `extra_data`), `DataOffset` (a
//! fragment carrying its byte offset into the reassembled payload), or
//! `Common` (a bare continuation fragment needing neither).

use crate::constants::{
    COMMON_HEADER_SIZE, DATA_OFFSET_HEADER_EXTENSION_SIZE, MAX_EXTRA_DATA_SIZE,
    NUM0_HEADER_EXTENSION_SIZE,
};
use crate::error::CodecError;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Which header extension a data packet carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PayloadType {
    Num0 = 0x00,
    DataOffset = 0x01,
    Common = 0x02,
}

impl PayloadType {
    fn from_u8(v: u8) -> Result<Self, CodecError> {
        Ok(match v {
            0x00 => PayloadType::Num0,
            0x01 => PayloadType::DataOffset,
            0x02 => PayloadType::Common,
            other => return Err(CodecError::UnknownPayloadType(other)),
        })
    }
}

/// Fields common to every data packet, regardless of `payload_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommonFields {
    pub payload_num: u16,
    pub packet_sequence_num: u32,
    pub encoded_header_size: u8,
}

/// A PTP (IEEE 1588) timestamp: seconds and nanoseconds since the PTP epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PtpTimestamp {
    pub seconds: u32,
    pub nanoseconds: u32,
}

/// Extension fields present only on the first fragment of a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Num0Extension {
    pub total_payload_size: u32,
    /// Sender-advertised maximum end-to-end latency budget for this payload,
    /// in microseconds. Consulted by the optional Rx buffered-delay path.
    pub max_latency_microsecs: u32,
    /// The sender's capture timestamp, used to order payloads by
    /// origination time rather than arrival time.
    pub origination_ptp_timestamp: PtpTimestamp,
    /// Opaque application-defined tag carried alongside the payload.
    pub payload_user_data: u64,
    /// Sender-side wall-clock time, in microseconds since the Unix epoch,
    /// when transmission of this payload began.
    pub tx_start_time_microseconds: u64,
    pub extra_data: Vec<u8>,
}

/// Extension fields present on fragments carrying an explicit byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataOffsetExtension {
    pub payload_data_offset: u32,
}

/// A decoded data packet: a [`CommonFields`] header plus fragment bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataPacket {
    Num0 {
        common: CommonFields,
        ext: Num0Extension,
        fragment: Bytes,
    },
    DataOffset {
        common: CommonFields,
        ext: DataOffsetExtension,
        fragment: Bytes,
    },
    Common {
        common: CommonFields,
        fragment: Bytes,
    },
}

impl DataPacket {
    pub fn common(&self) -> &CommonFields {
        match self {
            DataPacket::Num0 { common, .. }
            | DataPacket::DataOffset { common, .. }
            | DataPacket::Common { common, .. } => common,
        }
    }

    pub fn fragment(&self) -> &Bytes {
        match self {
            DataPacket::Num0 { fragment, .. }
            | DataPacket::DataOffset { fragment, .. }
            | DataPacket::Common { fragment, .. } => fragment,
        }
    }

    fn payload_type(&self) -> PayloadType {
        match self {
            DataPacket::Num0 { .. } => PayloadType::Num0,
            DataPacket::DataOffset { .. } => PayloadType::DataOffset,
            DataPacket::Common { .. } => PayloadType::Common,
        }
    }

    pub fn encode(&self) -> Result<Bytes, CodecError> {
        let common = self.common();
        let header_size = match self {
            DataPacket::Num0 { .. } => COMMON_HEADER_SIZE + NUM0_HEADER_EXTENSION_SIZE,
            DataPacket::DataOffset { .. } => COMMON_HEADER_SIZE + DATA_OFFSET_HEADER_EXTENSION_SIZE,
            DataPacket::Common { .. } => COMMON_HEADER_SIZE,
        };
        let mut buf = BytesMut::with_capacity(header_size + self.fragment().len());
        buf.put_u8(self.payload_type() as u8);
        buf.put_u8(common.encoded_header_size);
        buf.put_u16(common.payload_num);
        buf.put_u32(common.packet_sequence_num);

        match self {
            DataPacket::Num0 { ext, .. } => {
                if ext.extra_data.len() > MAX_EXTRA_DATA_SIZE {
                    return Err(CodecError::ExtraDataTooLong);
                }
                buf.put_u32(ext.total_payload_size);
                buf.put_u32(ext.max_latency_microsecs);
                buf.put_u32(ext.origination_ptp_timestamp.seconds);
                buf.put_u32(ext.origination_ptp_timestamp.nanoseconds);
                buf.put_u64(ext.payload_user_data);
                buf.put_u64(ext.tx_start_time_microseconds);
                buf.put_u16(ext.extra_data.len() as u16);
                buf.put_slice(&ext.extra_data);
                buf.put_bytes(0, MAX_EXTRA_DATA_SIZE - ext.extra_data.len());
            }
            DataPacket::DataOffset { ext, .. } => {
                buf.put_u32(ext.payload_data_offset);
            }
            DataPacket::Common { .. } => {}
        }

        buf.put_slice(self.fragment());
        Ok(buf.freeze())
    }

    pub fn decode(mut data: &[u8]) -> Result<Self, CodecError> {
        if data.len() < COMMON_HEADER_SIZE {
            return Err(CodecError::Truncated {
                need: COMMON_HEADER_SIZE,
                have: data.len(),
            });
        }
        let payload_type = PayloadType::from_u8(data.get_u8())?;
        let encoded_header_size = data.get_u8();
        let payload_num = data.get_u16();
        let packet_sequence_num = data.get_u32();
        let common = CommonFields {
            payload_num,
            packet_sequence_num,
            encoded_header_size,
        };

        match payload_type {
            PayloadType::Num0 => {
                if data.len() < NUM0_HEADER_EXTENSION_SIZE {
                    return Err(CodecError::Truncated {
                        need: NUM0_HEADER_EXTENSION_SIZE,
                        have: data.len(),
                    });
                }
                let total_payload_size = data.get_u32();
                let max_latency_microsecs = data.get_u32();
                let origination_ptp_timestamp = PtpTimestamp {
                    seconds: data.get_u32(),
                    nanoseconds: data.get_u32(),
                };
                let payload_user_data = data.get_u64();
                let tx_start_time_microseconds = data.get_u64();
                let extra_len = data.get_u16() as usize;
                if extra_len > MAX_EXTRA_DATA_SIZE {
                    return Err(CodecError::ExtraDataTooLong);
                }
                let extra_data = data[..extra_len].to_vec();
                data.advance(MAX_EXTRA_DATA_SIZE);
                Ok(DataPacket::Num0 {
                    common,
                    ext: Num0Extension {
                        total_payload_size,
                        max_latency_microsecs,
                        origination_ptp_timestamp,
                        payload_user_data,
                        tx_start_time_microseconds,
                        extra_data,
                    },
                    fragment: Bytes::copy_from_slice(data),
                })
            }
            PayloadType::DataOffset => {
                if data.len() < DATA_OFFSET_HEADER_EXTENSION_SIZE {
                    return Err(CodecError::Truncated {
                        need: DATA_OFFSET_HEADER_EXTENSION_SIZE,
                        have: data.len(),
                    });
                }
                let payload_data_offset = data.get_u32();
                Ok(DataPacket::DataOffset {
                    common,
                    ext: DataOffsetExtension { payload_data_offset },
                    fragment: Bytes::copy_from_slice(data),
                })
            }
            PayloadType::Common => Ok(DataPacket::Common {
                common,
                fragment: Bytes::copy_from_slice(data),
            }),
        }
    }
}
