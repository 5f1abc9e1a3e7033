//! Host-side catalog of lowcar device types.
//!
//! Static data: which parameters each board type exposes, their declared
//! types, and whether user code may read or write them. The daemon uses
//! the per-type schema to decode DEVICE_DATA and to validate outgoing
//! DEVICE_WRITE masks.

use lowcar_protocol::ParamType;

pub struct ParamDesc {
    pub name: &'static str,
    pub kind: ParamType,
    pub readable: bool,
    pub writable: bool,
}

pub struct DeviceType {
    pub id: u16,
    pub name: &'static str,
    pub params: &'static [ParamDesc],
}

impl DeviceType {
    /// Parameter types indexed by parameter number, the shape the wire
    /// codec consumes.
    pub fn schema(&self) -> Vec<ParamType> {
        self.params.iter().map(|p| p.kind).collect()
    }

    /// Bitmap of the parameters user code may write.
    pub fn writable_mask(&self) -> u32 {
        self.params
            .iter()
            .enumerate()
            .filter(|(_, p)| p.writable)
            .fold(0, |mask, (i, _)| mask | (1 << i))
    }

    pub fn param_index(&self, name: &str) -> Option<usize> {
        self.params.iter().position(|p| p.name == name)
    }
}

macro_rules! params {
    ($( ($name:literal, $kind:ident, $readable:literal, $writable:literal) ),* $(,)?) => {
        &[
            $(ParamDesc {
                name: $name,
                kind: ParamType::$kind,
                readable: $readable,
                writable: $writable,
            }),*
        ]
    };
}

static LIMIT_SWITCH: DeviceType = DeviceType {
    id: 0,
    name: "LimitSwitch",
    params: params![
        ("switch0", Bool, true, false),
        ("switch1", Bool, true, false),
        ("switch2", Bool, true, false),
    ],
};

static LINE_FOLLOWER: DeviceType = DeviceType {
    id: 1,
    name: "LineFollower",
    params: params![
        ("left", Float, true, false),
        ("center", Float, true, false),
        ("right", Float, true, false),
    ],
};

static POTENTIOMETER: DeviceType = DeviceType {
    id: 2,
    name: "Potentiometer",
    params: params![
        ("pot0", Float, true, false),
        ("pot1", Float, true, false),
        ("pot2", Float, true, false),
    ],
};

static BATTERY_BUZZER: DeviceType = DeviceType {
    id: 4,
    name: "BatteryBuzzer",
    params: params![
        ("is_unsafe", Bool, true, false),
        ("calibrated", Bool, true, false),
        ("v_cell1", Float, true, false),
        ("v_cell2", Float, true, false),
        ("v_cell3", Float, true, false),
        ("v_batt", Float, true, false),
        ("dv_cell2", Float, true, false),
        ("dv_cell3", Float, true, false),
    ],
};

static SERVO_CONTROL: DeviceType = DeviceType {
    id: 7,
    name: "ServoControl",
    params: params![
        ("servo0", Float, true, true),
        ("servo1", Float, true, true),
    ],
};

static RFID: DeviceType = DeviceType {
    id: 11,
    name: "RFID",
    params: params![
        ("id", Int, true, false),
        ("detect_tag", Int, true, false),
    ],
};

static POLAR_BEAR: DeviceType = DeviceType {
    id: 12,
    name: "PolarBear",
    params: params![
        ("duty_cycle", Float, true, true),
        ("pid_pos_setpoint", Float, false, true),
        ("pid_pos_kp", Float, false, true),
        ("pid_pos_ki", Float, false, true),
        ("pid_pos_kd", Float, false, true),
        ("pid_vel_setpoint", Float, false, true),
        ("pid_vel_kp", Float, false, true),
        ("pid_vel_ki", Float, false, true),
        ("pid_vel_kd", Float, false, true),
        ("current_thresh", Float, false, true),
        ("enc_pos", Float, true, true),
        ("enc_vel", Float, true, false),
        ("motor_current", Float, true, false),
        ("deadband", Float, true, true),
    ],
};

static KOALA_BEAR: DeviceType = DeviceType {
    id: 13,
    name: "KoalaBear",
    params: params![
        ("duty_cycle_a", Float, true, true),
        ("duty_cycle_b", Float, true, true),
        ("pid_ki_a", Float, true, true),
        ("pid_kd_a", Float, true, true),
        ("enc_a", Float, true, true),
        ("deadband_a", Float, true, true),
        ("motor_enabled_a", Bool, true, true),
        ("drive_mode_a", Int, true, true),
        ("pid_kp_a", Float, true, true),
        ("pid_kp_b", Float, true, true),
        ("pid_ki_b", Float, true, true),
        ("pid_kd_b", Float, true, true),
        ("enc_b", Float, true, true),
        ("deadband_b", Float, true, true),
        ("motor_enabled_b", Bool, true, true),
        ("drive_mode_b", Int, true, true),
    ],
};

/// Simulated board used by virtual endpoints and the test harness.
static DUMMY_DEVICE: DeviceType = DeviceType {
    id: 14,
    name: "DummyDevice",
    params: params![
        ("int_latch", Int, true, true),
        ("bool_latch", Bool, true, true),
        ("float_latch", Float, true, true),
        ("counter", Int, true, false),
        ("flipflop", Bool, true, false),
        ("ramp", Float, true, false),
    ],
};

static DEVICE_TYPES: &[&DeviceType] = &[
    &LIMIT_SWITCH,
    &LINE_FOLLOWER,
    &POTENTIOMETER,
    &BATTERY_BUZZER,
    &SERVO_CONTROL,
    &RFID,
    &POLAR_BEAR,
    &KOALA_BEAR,
    &DUMMY_DEVICE,
];

pub fn device_type(id: u16) -> Option<&'static DeviceType> {
    DEVICE_TYPES.iter().copied().find(|d| d.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_id() {
        assert_eq!(device_type(13).unwrap().name, "KoalaBear");
        assert!(device_type(3).is_none());
        assert!(device_type(999).is_none());
    }

    #[test]
    fn schema_matches_declaration_order() {
        let schema = device_type(11).unwrap().schema();
        assert_eq!(schema, vec![ParamType::Int, ParamType::Int]);
    }

    #[test]
    fn writable_mask_covers_only_writable_params() {
        assert_eq!(device_type(0).unwrap().writable_mask(), 0);
        assert_eq!(device_type(7).unwrap().writable_mask(), 0b11);
        // PolarBear: everything except enc_vel (11) and motor_current (12)
        assert_eq!(device_type(12).unwrap().writable_mask(), 0b10_0111_1111_1111);
    }

    #[test]
    fn param_index_by_name() {
        let koala = device_type(13).unwrap();
        assert_eq!(koala.param_index("pid_kp_a"), Some(8));
        assert_eq!(koala.param_index("nope"), None);
    }
}
