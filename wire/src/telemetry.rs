//! Telemetry frame assembly and decoding.
//!
//! Boards stream fixed 800-byte telemetry frames, four 200-byte channel
//! blocks per frame in channel order. TCP delivers the stream in arbitrary
//! chunks, so bytes are buffered and frames cut out whole before decoding.
//!
//! Block layout, all fields little-endian:
//!
//! ```text
//! offset  0  f32  voltage      µV
//! offset  4  f32  current      µA
//! offset  8  f32  power        µW
//! offset 12  f32  capacity     mAh
//! offset 16  f32  temperature  0.01 °C
//! offset 20  i32  step number
//! offset 24  i32  cycle number
//! offset 28..200  reserved by board firmware
//! ```

use bytes::{Buf, Bytes, BytesMut};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{BoardId, ChannelId, WireError, CHANNELS_PER_BOARD};

/// Telemetry frame size in bytes
pub const TELEMETRY_FRAME_SIZE: usize = 800;

/// Channel block size in bytes
pub const CHANNEL_BLOCK_SIZE: usize = 200;

/// One decoded channel measurement.
///
/// Values are scaled to SI units at decode time; the raw block is retained
/// for consumers that need the undecoded firmware fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelReading {
    /// Rack-wide channel this reading belongs to
    pub channel: ChannelId,
    /// Arrival time of the frame carrying this reading
    pub timestamp: DateTime<Utc>,
    /// Cell voltage in volts
    pub voltage: f64,
    /// Cell current in amperes
    pub current: f64,
    /// Power in watts
    pub power: f64,
    /// Accumulated capacity in amp-hours
    pub capacity: f64,
    /// Temperature in degrees Celsius
    pub temperature: f64,
    /// Active test step number
    pub step_number: i32,
    /// Active test cycle number
    pub cycle_number: i32,
    /// The raw 200-byte channel block
    pub raw: Bytes,
}

/// Decode one 200-byte channel block.
///
/// Short input is an error; the decoder never reads past the block.
pub fn decode_block(channel: ChannelId, block: Bytes) -> Result<ChannelReading, WireError> {
    if block.len() < CHANNEL_BLOCK_SIZE {
        return Err(WireError::Short {
            need: CHANNEL_BLOCK_SIZE,
            have: block.len(),
        });
    }

    let mut cursor = &block[..];
    let voltage = cursor.get_f32_le() as f64 / 1e6;
    let current = cursor.get_f32_le() as f64 / 1e6;
    let power = cursor.get_f32_le() as f64 / 1e6;
    let capacity = cursor.get_f32_le() as f64 / 1e3;
    let temperature = cursor.get_f32_le() as f64 / 1e2;
    let step_number = cursor.get_i32_le();
    let cycle_number = cursor.get_i32_le();

    Ok(ChannelReading {
        channel,
        timestamp: Utc::now(),
        voltage,
        current,
        power,
        capacity,
        temperature,
        step_number,
        cycle_number,
        raw: block.slice(..CHANNEL_BLOCK_SIZE),
    })
}

/// Decode a complete telemetry frame from `board`.
///
/// Block `i` carries the board's channel at offset `i`, so a frame from
/// board `b` yields channels `(b-1)*4 + 1 ..= (b-1)*4 + 4` in order. Block
/// slices share the frame's allocation.
pub fn decode_frame(board: BoardId, frame: &Bytes) -> Result<Vec<ChannelReading>, WireError> {
    if frame.len() < TELEMETRY_FRAME_SIZE {
        return Err(WireError::Short {
            need: TELEMETRY_FRAME_SIZE,
            have: frame.len(),
        });
    }

    let mut readings = Vec::with_capacity(CHANNELS_PER_BOARD as usize);
    for offset in 0..CHANNELS_PER_BOARD {
        let start = offset as usize * CHANNEL_BLOCK_SIZE;
        let block = frame.slice(start..start + CHANNEL_BLOCK_SIZE);
        readings.push(decode_block(board.channel_at(offset), block)?);
    }

    Ok(readings)
}

/// Incremental frame cutter for the telemetry stream.
///
/// Append raw socket reads to a `BytesMut` and call [`assemble`] until it
/// returns `None`. Partial frames stay buffered; a frame split across any
/// number of reads comes out whole and byte-aligned.
///
/// [`assemble`]: FrameAssembler::assemble
#[derive(Debug, Default)]
pub struct FrameAssembler {
    frames: u64,
}

impl FrameAssembler {
    /// Create a new assembler
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames produced since creation
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Cut the next complete frame out of `buf`, or `None` if fewer than
    /// [`TELEMETRY_FRAME_SIZE`] bytes are buffered
    pub fn assemble(&mut self, buf: &mut BytesMut) -> Option<Bytes> {
        if buf.len() < TELEMETRY_FRAME_SIZE {
            return None;
        }
        self.frames += 1;
        Some(buf.split_to(TELEMETRY_FRAME_SIZE).freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BufMut;

    fn block_bytes(
        voltage_uv: f32,
        current_ua: f32,
        power_uw: f32,
        capacity_mah: f32,
        temp_centi: f32,
        step: i32,
        cycle: i32,
    ) -> Vec<u8> {
        let mut block = vec![0u8; CHANNEL_BLOCK_SIZE];
        block[0..4].copy_from_slice(&voltage_uv.to_le_bytes());
        block[4..8].copy_from_slice(&current_ua.to_le_bytes());
        block[8..12].copy_from_slice(&power_uw.to_le_bytes());
        block[12..16].copy_from_slice(&capacity_mah.to_le_bytes());
        block[16..20].copy_from_slice(&temp_centi.to_le_bytes());
        block[20..24].copy_from_slice(&step.to_le_bytes());
        block[24..28].copy_from_slice(&cycle.to_le_bytes());
        block
    }

    #[test]
    fn test_block_decode_scaling() {
        let channel = ChannelId::new(1).unwrap();
        let block = block_bytes(3_654_321.0, -1_250_000.0, 4_567_890.0, 2_500.0, 2_345.0, 7, 12);

        let reading = decode_block(channel, Bytes::from(block)).unwrap();
        assert!((reading.voltage - 3.654_321).abs() < 1e-6);
        assert!((reading.current + 1.25).abs() < 1e-6);
        assert!((reading.power - 4.567_89).abs() < 1e-6);
        assert!((reading.capacity - 2.5).abs() < 1e-6);
        assert!((reading.temperature - 23.45).abs() < 1e-6);
        assert_eq!(reading.step_number, 7);
        assert_eq!(reading.cycle_number, 12);
        assert_eq!(reading.raw.len(), CHANNEL_BLOCK_SIZE);
    }

    #[test]
    fn test_block_decode_short_input() {
        let channel = ChannelId::new(1).unwrap();
        let err = decode_block(channel, Bytes::from(vec![0u8; 199])).unwrap_err();
        assert!(matches!(err, WireError::Short { need: 200, have: 199 }));
    }

    #[test]
    fn test_frame_decode_assigns_channels_in_block_order() {
        let board = BoardId::new(2).unwrap();
        let mut frame = BytesMut::with_capacity(TELEMETRY_FRAME_SIZE);
        for step in 0..4i32 {
            frame.put_slice(&block_bytes(1_000_000.0, 0.0, 0.0, 0.0, 0.0, step, 0));
        }

        let readings = decode_frame(board, &frame.freeze()).unwrap();
        let channels: Vec<u8> = readings.iter().map(|r| r.channel.get()).collect();
        assert_eq!(channels, vec![5, 6, 7, 8]);
        let steps: Vec<i32> = readings.iter().map(|r| r.step_number).collect();
        assert_eq!(steps, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_frame_decode_short_input() {
        let board = BoardId::new(1).unwrap();
        let err = decode_frame(board, &Bytes::from(vec![0u8; 799])).unwrap_err();
        assert!(matches!(err, WireError::Short { need: 800, have: 799 }));
    }

    #[test]
    fn test_assembler_single_byte_chunks() {
        let mut frame = Vec::new();
        for step in 0..4i32 {
            frame.extend_from_slice(&block_bytes(2_000_000.0, 0.0, 0.0, 0.0, 0.0, step, 1));
        }

        let mut assembler = FrameAssembler::new();
        let mut buf = BytesMut::new();
        let mut out = Vec::new();
        for byte in &frame {
            buf.put_u8(*byte);
            while let Some(complete) = assembler.assemble(&mut buf) {
                out.push(complete);
            }
        }

        assert_eq!(out.len(), 1);
        assert_eq!(&out[0][..], &frame[..]);
        assert!(buf.is_empty());
        assert_eq!(assembler.frames(), 1);
    }

    #[test]
    fn test_assembler_keeps_partial_tail() {
        let mut assembler = FrameAssembler::new();
        let mut buf = BytesMut::new();
        let head = vec![0xABu8; TELEMETRY_FRAME_SIZE + 100];
        buf.put_slice(&head);

        let first = assembler.assemble(&mut buf);
        assert!(first.is_some());
        assert_eq!(buf.len(), 100);
        assert!(assembler.assemble(&mut buf).is_none());

        let tail = vec![0xCDu8; TELEMETRY_FRAME_SIZE - 100];
        buf.put_slice(&tail);
        let second = assembler.assemble(&mut buf).unwrap();
        assert_eq!(&second[..100], &[0xABu8; 100][..]);
        assert_eq!(&second[100..], &[0xCDu8; 700][..]);
        assert!(buf.is_empty());
        assert_eq!(assembler.frames(), 2);
    }
}
