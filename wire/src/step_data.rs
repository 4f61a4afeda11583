//! Step-data request and acknowledgment codecs.
//!
//! The step-data exchange is the one place board firmware mixes byte
//! orders: the channel and message id fields travel big-endian while every
//! other field stays little-endian. Captures from production racks confirm
//! the asymmetry; both codecs preserve it exactly, and the request test
//! pins the byte sequence so an accidental "fix" fails loudly.

use bytes::Buf;
use serde::{Deserialize, Serialize};

use crate::{ChannelId, WireError};

/// Message id of the step-data exchange
pub const STEP_DATA_MESSAGE_ID: u16 = 0x0202;

/// Step-data request size in bytes
pub const STEP_DATA_REQUEST_SIZE: usize = 8;

/// Step-data acknowledgment size in bytes
pub const STEP_DATA_ACK_SIZE: usize = 50;

/// Request for one step-data record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepDataRequest {
    /// Target channel
    pub channel: ChannelId,
    /// Index of the step record being requested
    pub step_index: u32,
}

impl StepDataRequest {
    /// Create a request
    pub fn new(channel: ChannelId, step_index: u32) -> Self {
        Self {
            channel,
            step_index,
        }
    }

    /// Encode to the 8-byte wire form: channel and message id big-endian,
    /// step index little-endian
    pub fn encode(&self) -> [u8; STEP_DATA_REQUEST_SIZE] {
        let mut frame = [0u8; STEP_DATA_REQUEST_SIZE];
        frame[0..2].copy_from_slice(&(self.channel.get() as u16).to_be_bytes());
        frame[2..4].copy_from_slice(&STEP_DATA_MESSAGE_ID.to_be_bytes());
        frame[4..8].copy_from_slice(&self.step_index.to_le_bytes());
        frame
    }
}

/// Step-data record returned by a board
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepDataAck {
    /// Channel the record belongs to
    pub channel: ChannelId,
    /// Index of the returned step record
    pub step_index: u32,
    /// Test type selector
    pub test_type: u16,
    /// Test mode selector
    pub test_mode: u16,
    /// Cycle number of the record
    pub cycle_number: u16,
    /// Step number of the record
    pub step_number: u32,
    /// Target voltage in µV
    pub target_voltage: i32,
    /// Target current in µA
    pub target_current: i32,
    /// Chamber mode selector
    pub chamber_mode: u16,
    /// Target chamber temperature in 0.01 °C
    pub chamber_temp: i16,
    /// Target power in µW
    pub target_power: i32,
    /// Target resistance in µΩ
    pub target_resistance: i32,
    /// Scheduled end time, device epoch seconds
    pub end_time: u64,
    /// Index into the step's time-end table
    pub time_end_index: u32,
}

impl StepDataAck {
    /// Decode the 50-byte wire form.
    ///
    /// Channel and message id are read big-endian and the id must be
    /// [`STEP_DATA_MESSAGE_ID`]; every following field is little-endian.
    pub fn decode(input: &[u8]) -> Result<Self, WireError> {
        if input.len() < STEP_DATA_ACK_SIZE {
            return Err(WireError::Short {
                need: STEP_DATA_ACK_SIZE,
                have: input.len(),
            });
        }

        let mut buf = &input[..STEP_DATA_ACK_SIZE];
        let channel = ChannelId::new(buf.get_u16())?;
        let id = buf.get_u16();
        if id != STEP_DATA_MESSAGE_ID {
            return Err(WireError::MessageId(id));
        }

        let step_index = buf.get_u32_le();
        let test_type = buf.get_u16_le();
        let test_mode = buf.get_u16_le();
        let cycle_number = buf.get_u16_le();
        let step_number = buf.get_u32_le();
        let target_voltage = buf.get_i32_le();
        let target_current = buf.get_i32_le();
        let chamber_mode = buf.get_u16_le();
        let chamber_temp = buf.get_i16_le();
        let target_power = buf.get_i32_le();
        let target_resistance = buf.get_i32_le();
        let end_time = buf.get_u64_le();
        let time_end_index = buf.get_u32_le();

        Ok(Self {
            channel,
            step_index,
            test_type,
            test_mode,
            cycle_number,
            step_number,
            target_voltage,
            target_current,
            chamber_mode,
            chamber_temp,
            target_power,
            target_resistance,
            end_time,
            time_end_index,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_exact_bytes() {
        let request = StepDataRequest::new(ChannelId::new(5).unwrap(), 10);
        assert_eq!(
            request.encode(),
            [0x00, 0x05, 0x02, 0x02, 0x0A, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn test_request_field_byte_orders() {
        let request = StepDataRequest::new(ChannelId::new(128).unwrap(), 0x0102_0304);
        let frame = request.encode();
        assert_eq!(&frame[0..2], &[0x00, 0x80]);
        assert_eq!(&frame[2..4], &[0x02, 0x02]);
        assert_eq!(&frame[4..8], &[0x04, 0x03, 0x02, 0x01]);
    }

    fn ack_bytes(channel: u16, id: u16) -> Vec<u8> {
        let mut buf = Vec::with_capacity(STEP_DATA_ACK_SIZE);
        buf.extend_from_slice(&channel.to_be_bytes());
        buf.extend_from_slice(&id.to_be_bytes());
        buf.extend_from_slice(&3u32.to_le_bytes()); // step_index
        buf.extend_from_slice(&1u16.to_le_bytes()); // test_type
        buf.extend_from_slice(&2u16.to_le_bytes()); // test_mode
        buf.extend_from_slice(&40u16.to_le_bytes()); // cycle_number
        buf.extend_from_slice(&9u32.to_le_bytes()); // step_number
        buf.extend_from_slice(&4_200_000i32.to_le_bytes()); // target_voltage
        buf.extend_from_slice(&(-1_500_000i32).to_le_bytes()); // target_current
        buf.extend_from_slice(&1u16.to_le_bytes()); // chamber_mode
        buf.extend_from_slice(&(-550i16).to_le_bytes()); // chamber_temp
        buf.extend_from_slice(&6_300_000i32.to_le_bytes()); // target_power
        buf.extend_from_slice(&100_000i32.to_le_bytes()); // target_resistance
        buf.extend_from_slice(&1_700_000_000u64.to_le_bytes()); // end_time
        buf.extend_from_slice(&5u32.to_le_bytes()); // time_end_index
        buf
    }

    #[test]
    fn test_ack_decode() {
        let ack = StepDataAck::decode(&ack_bytes(7, STEP_DATA_MESSAGE_ID)).unwrap();
        assert_eq!(ack.channel.get(), 7);
        assert_eq!(ack.step_index, 3);
        assert_eq!(ack.test_type, 1);
        assert_eq!(ack.test_mode, 2);
        assert_eq!(ack.cycle_number, 40);
        assert_eq!(ack.step_number, 9);
        assert_eq!(ack.target_voltage, 4_200_000);
        assert_eq!(ack.target_current, -1_500_000);
        assert_eq!(ack.chamber_mode, 1);
        assert_eq!(ack.chamber_temp, -550);
        assert_eq!(ack.target_power, 6_300_000);
        assert_eq!(ack.target_resistance, 100_000);
        assert_eq!(ack.end_time, 1_700_000_000);
        assert_eq!(ack.time_end_index, 5);
    }

    #[test]
    fn test_ack_rejects_wrong_message_id() {
        let err = StepDataAck::decode(&ack_bytes(7, 0x0303)).unwrap_err();
        assert!(matches!(err, WireError::MessageId(0x0303)));
    }

    #[test]
    fn test_ack_rejects_short_input() {
        let err = StepDataAck::decode(&[0u8; 49]).unwrap_err();
        assert!(matches!(err, WireError::Short { need: 50, have: 49 }));
    }

    #[test]
    fn test_ack_rejects_out_of_range_channel() {
        let err = StepDataAck::decode(&ack_bytes(200, STEP_DATA_MESSAGE_ID)).unwrap_err();
        assert!(matches!(err, WireError::Channel(200)));
    }
}
