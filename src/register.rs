/// INA231 register map. Each register is 16 bits wide and is selected by a
/// one-byte pointer written at the start of a bus transaction.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Register {
    Configuration = 0x00,
    ShuntVoltage = 0x01,
    BusVoltage = 0x02,
    Power = 0x03,
    Current = 0x04,
    Calibration = 0x05,
}

/// Default 7-bit device address. The A0/A1 straps allow 0x41..=0x4F.
pub const DEVICE_ADDRESS: u8 = 0x40;

/// Configuration word: averaging count and conversion time selection.
pub const CONFIG_WORD: u16 = 0x4527;

/// Calibration word for a 0.1 ohm shunt and 1 A expected maximum current.
/// Fixes the current LSB at 1 uA and the power LSB at 25 uW.
pub const CALIBRATION_WORD: u16 = 0x0A00;
