//! In-memory layout of the shared regions.
//!
//! Both regions are plain `#[repr(C)]` structs mapped at offset 0 of their
//! backing objects. Every field must read as something valid when the
//! supervisor hands out a zeroed region: a zeroed cell is `Int(0)`, a zeroed
//! mode is `Idle`, zeroed bitmaps mean "nothing connected, nothing pending".

use lowcar_protocol::{DeviceIdentity, MAX_DEVICES, MAX_PARAMS, Value};

use crate::ShmError;

/// DATA (device to host) and COMMAND (host to device) parameter streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Data,
    Command,
}

impl Stream {
    pub(crate) fn index(self) -> usize {
        match self {
            Stream::Data => 0,
            Stream::Command => 1,
        }
    }
}

/// Which process is calling into the hub. Determines command-changed
/// side effects and which subscription lane a caller owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Client {
    /// The device daemon; the only writer of DATA and reader of COMMAND.
    DeviceHandler,
    /// The user-code executor.
    Executor,
    /// The relay to remote operator consoles.
    NetRelay,
}

impl Client {
    pub(crate) fn subscription_lane(self) -> Option<usize> {
        match self {
            Client::DeviceHandler => None,
            Client::Executor => Some(0),
            Client::NetRelay => Some(1),
        }
    }

    pub(crate) fn name(self) -> &'static str {
        match self {
            Client::DeviceHandler => "device handler",
            Client::Executor => "executor",
            Client::NetRelay => "net relay",
        }
    }
}

pub(crate) const NUM_STREAMS: usize = 2;
pub(crate) const NUM_LANES: usize = 2;

const TAG_INT: u32 = 0;
const TAG_FLOAT: u32 = 1;
const TAG_BOOL: u32 = 2;

/// One stored parameter value: a tag word plus the value bits.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub(crate) struct RawValue {
    tag: u32,
    bits: u32,
}

impl RawValue {
    /// The all-zero cell, identical to fresh region memory: `Int(0)`.
    pub(crate) fn zeroed() -> Self {
        Self { tag: 0, bits: 0 }
    }

    pub(crate) fn store(value: Value) -> Self {
        match value {
            Value::Int(v) => Self {
                tag: TAG_INT,
                bits: v as u32,
            },
            Value::Float(v) => Self {
                tag: TAG_FLOAT,
                bits: v.to_bits(),
            },
            Value::Bool(v) => Self {
                tag: TAG_BOOL,
                bits: v as u32,
            },
        }
    }

    pub(crate) fn load(self, slot: usize, param: usize) -> Result<Value, ShmError> {
        match self.tag {
            TAG_INT => Ok(Value::Int(self.bits as i32)),
            TAG_FLOAT => Ok(Value::Float(f32::from_bits(self.bits))),
            TAG_BOOL => Ok(Value::Bool(self.bits != 0)),
            _ => Err(ShmError::CorruptCell { slot, param }),
        }
    }
}

/// Identity as stored in the region; fixed width, no padding surprises.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub(crate) struct RawIdentity {
    pub dev_type: u16,
    pub year: u8,
    _pad: [u8; 5],
    pub uid: u64,
}

impl RawIdentity {
    pub(crate) fn store(id: &DeviceIdentity) -> Self {
        Self {
            dev_type: id.dev_type,
            year: id.year,
            _pad: [0; 5],
            uid: id.uid,
        }
    }

    pub(crate) fn load(&self) -> DeviceIdentity {
        DeviceIdentity {
            dev_type: self.dev_type,
            year: self.year,
            uid: self.uid,
        }
    }
}

/// The device hub region.
///
/// `cmd_changed[0]` carries one bit per slot with pending commands;
/// `cmd_changed[1 + slot]` carries the per-parameter bits for that slot.
/// `sub_masks[lane][slot]` is a consumer lane's requested DATA parameters,
/// `sub_changed` one bit per slot whose union of lanes changed since the
/// last drain.
#[repr(C)]
pub(crate) struct DeviceRegion {
    pub catalog: u32,
    pub cmd_changed: [u32; 1 + MAX_DEVICES],
    pub sub_masks: [[u32; MAX_DEVICES]; NUM_LANES],
    pub sub_changed: u32,
    pub identities: [RawIdentity; MAX_DEVICES],
    pub params: [[[RawValue; MAX_PARAMS]; MAX_DEVICES]; NUM_STREAMS],
}

/// Coarse robot execution state, settable by any attached process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum RunMode {
    #[default]
    Idle = 0,
    Auto = 1,
    Teleop = 2,
}

impl RunMode {
    pub(crate) fn from_word(word: u32) -> Self {
        match word {
            1 => RunMode::Auto,
            2 => RunMode::Teleop,
            _ => RunMode::Idle,
        }
    }
}

/// Where an input snapshot came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputSource {
    Gamepad,
    Keyboard,
}

impl InputSource {
    pub(crate) fn index(self) -> usize {
        match self {
            InputSource::Gamepad => 0,
            InputSource::Keyboard => 1,
        }
    }
}

/// Latest-state-wins snapshot of one input device. No history.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct InputSnapshot {
    pub buttons: u64,
    pub joysticks: [f32; 4],
    pub connected: u32,
}

/// The auxiliary region: run mode plus one snapshot per input source.
#[repr(C)]
pub(crate) struct AuxRegion {
    pub run_mode: u32,
    pub inputs: [InputSnapshot; 2],
}

pub(crate) const DEVICE_REGION_SIZE: usize = std::mem::size_of::<DeviceRegion>();
pub(crate) const AUX_REGION_SIZE: usize = std::mem::size_of::<AuxRegion>();

/// Object-name scheme for one hub instance. The prefix keeps concurrently
/// running instances (production vs. tests) apart.
pub(crate) struct Names {
    prefix: String,
}

impl Names {
    pub(crate) fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
        }
    }

    pub(crate) fn device_region(&self) -> String {
        format!("{}-hub", self.prefix)
    }

    pub(crate) fn aux_region(&self) -> String {
        format!("{}-aux", self.prefix)
    }

    pub(crate) fn catalog_sem(&self) -> String {
        format!("{}-catalog", self.prefix)
    }

    pub(crate) fn cmd_map_sem(&self) -> String {
        format!("{}-cmdmap", self.prefix)
    }

    pub(crate) fn sub_map_sem(&self) -> String {
        format!("{}-submap", self.prefix)
    }

    pub(crate) fn run_mode_sem(&self) -> String {
        format!("{}-runmode", self.prefix)
    }

    pub(crate) fn input_sem(&self) -> String {
        format!("{}-input", self.prefix)
    }

    pub(crate) fn stream_sem(&self, slot: usize, stream: Stream) -> String {
        let tag = match stream {
            Stream::Data => "data",
            Stream::Command => "cmd",
        };
        format!("{}-s{slot:02}-{tag}", self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zeroed_cell_reads_as_int_zero() {
        let cell = RawValue { tag: 0, bits: 0 };
        assert_eq!(cell.load(0, 0).unwrap(), Value::Int(0));
    }

    #[test]
    fn value_cells_roundtrip() {
        for v in [Value::Int(-7), Value::Float(3.5), Value::Bool(true)] {
            assert_eq!(RawValue::store(v).load(1, 2).unwrap(), v);
        }
    }

    #[test]
    fn garbage_tag_is_rejected() {
        let cell = RawValue { tag: 9, bits: 0 };
        assert_eq!(
            cell.load(3, 4),
            Err(ShmError::CorruptCell { slot: 3, param: 4 })
        );
    }

    #[test]
    fn zeroed_mode_is_idle() {
        assert_eq!(RunMode::from_word(0), RunMode::Idle);
    }
}
