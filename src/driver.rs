use crate::register::{Register, CALIBRATION_WORD, CONFIG_WORD, DEVICE_ADDRESS};
use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

const SETTLE_DELAY_MS: u32 = 10;

const BUS_VOLTAGE_LSB_V: f32 = 0.00125;
const SHUNT_VOLTAGE_LSB_V: f32 = 0.000_002_5;
const CURRENT_LSB_MA: f32 = 0.001;
const POWER_LSB_MW: f32 = 0.025;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Ina231Error<E> {
    /// Bus fault reported by the underlying I2C implementation.
    I2c(E),
    /// The output sink rejected a write.
    Fmt,
}

impl<E> From<core::fmt::Error> for Ina231Error<E> {
    fn from(_: core::fmt::Error) -> Self {
        Ina231Error::Fmt
    }
}

/// One decoded sampling tick. The four source registers are read in four
/// independent bus transactions, so the fields are not guaranteed to come
/// from the same conversion cycle.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Measurement {
    /// Bus voltage in volts.
    pub bus_voltage: f32,
    /// Voltage across the shunt resistor in volts.
    pub shunt_voltage: f32,
    /// Bus plus shunt voltage in volts.
    pub load_voltage: f32,
    /// Load current in milliamps.
    pub current_ma: f32,
    /// Load power in milliwatts.
    pub power_mw: f32,
}

pub struct Ina231Driver<I2C> {
    i2c: I2C,
    address: u8,
}

impl<I2C> Ina231Driver<I2C>
where
    I2C: I2c,
{
    /// Creates a driver for a device at the default address (0x40).
    pub fn new(i2c: I2C) -> Self {
        Self::with_address(i2c, DEVICE_ADDRESS)
    }

    /// Creates a driver for a device strapped to a non-default address.
    pub fn with_address(i2c: I2C, address: u8) -> Self {
        Self { i2c, address }
    }

    /// Writes the configuration and calibration words, then waits for the
    /// first conversion to settle. Must succeed before any reading is
    /// meaningful; a failure here is not retried.
    pub fn initialize<Delay: DelayNs>(
        &mut self,
        delay: &mut Delay,
    ) -> Result<(), Ina231Error<I2C::Error>> {
        self.write_register(Register::Configuration, CONFIG_WORD)?;
        self.write_register(Register::Calibration, CALIBRATION_WORD)?;
        delay.delay_ms(SETTLE_DELAY_MS);
        Ok(())
    }

    pub fn write_register(
        &mut self,
        register: Register,
        data: u16,
    ) -> Result<(), Ina231Error<I2C::Error>> {
        let payload = data.to_be_bytes();
        self.i2c
            .write(self.address, &[register as u8, payload[0], payload[1]])
            .map_err(Ina231Error::I2c)
    }

    pub fn read_register(&mut self, register: Register) -> Result<u16, Ina231Error<I2C::Error>> {
        let mut read_buffer = [0u8; 2];
        // Pointer write and data read share one transaction (repeated start).
        self.i2c
            .write_read(self.address, &[register as u8], &mut read_buffer)
            .map_err(Ina231Error::I2c)?;

        Ok(u16::from_be_bytes(read_buffer))
    }

    pub fn bus_voltage(&mut self) -> Result<f32, Ina231Error<I2C::Error>> {
        Ok(decode_bus_voltage(self.read_register(Register::BusVoltage)?))
    }

    pub fn shunt_voltage(&mut self) -> Result<f32, Ina231Error<I2C::Error>> {
        Ok(decode_shunt_voltage(
            self.read_register(Register::ShuntVoltage)?,
        ))
    }

    pub fn current(&mut self) -> Result<f32, Ina231Error<I2C::Error>> {
        Ok(decode_current(self.read_register(Register::Current)?))
    }

    pub fn power(&mut self) -> Result<f32, Ina231Error<I2C::Error>> {
        Ok(decode_power(self.read_register(Register::Power)?))
    }

    /// Reads all four measurement registers and derives the load voltage.
    pub fn read_sample(&mut self) -> Result<Measurement, Ina231Error<I2C::Error>> {
        let shunt_voltage = self.shunt_voltage()?;
        let bus_voltage = self.bus_voltage()?;
        let power_mw = self.power()?;
        let current_ma = self.current()?;

        Ok(Measurement {
            bus_voltage,
            shunt_voltage,
            load_voltage: bus_voltage + shunt_voltage,
            current_ma,
            power_mw,
        })
    }
}

/// Bus voltage in volts. The register carries the reading in bits 15..3;
/// the bottom three bits are discarded before scaling by 1.25 mV/bit.
pub fn decode_bus_voltage(raw: u16) -> f32 {
    (raw >> 3) as f32 * BUS_VOLTAGE_LSB_V
}

/// Shunt voltage in volts, 2.5 uV/bit, signed.
pub fn decode_shunt_voltage(raw: u16) -> f32 {
    twos_complement(raw) as f32 * SHUNT_VOLTAGE_LSB_V
}

/// Current in milliamps, 1 uA/bit under the default calibration, signed.
pub fn decode_current(raw: u16) -> f32 {
    twos_complement(raw) as f32 * CURRENT_LSB_MA
}

/// Power in milliwatts, 25 uW/bit under the default calibration, unsigned.
pub fn decode_power(raw: u16) -> f32 {
    raw as f32 * POWER_LSB_MW
}

/// Reinterprets raw register bits as a signed 16-bit quantity.
pub fn twos_complement(raw: u16) -> i16 {
    i16::from_ne_bytes(raw.to_ne_bytes())
}

#[cfg(feature = "std")]
impl<E> std::fmt::Display for Ina231Error<E>
where
    E: std::fmt::Debug,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Ina231Error::I2c(bus) => write!(f, "I2C Error: {bus:?}"),
            Ina231Error::Fmt => write!(f, "Output Sink Error"),
        }
    }
}

#[cfg(feature = "std")]
impl<E> std::error::Error for Ina231Error<E>
where
    E: std::fmt::Debug,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::i2c::ErrorKind;
    use embedded_hal_mock::eh1::delay::NoopDelay;
    use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction as I2cTransaction};

    fn assert_close(actual: f32, expected: f32) {
        let tolerance = expected.abs() * 1e-5 + 1e-9;
        assert!(
            (actual - expected).abs() <= tolerance,
            "{actual} not within {tolerance} of {expected}"
        );
    }

    #[test]
    fn decodes_bus_voltage_with_shift() {
        for raw in [0u16, 0x0008, 0x2580, 0x7FF8, 0xFFFF] {
            assert_eq!(decode_bus_voltage(raw), (raw >> 3) as f32 * 0.00125);
        }
        assert_close(decode_bus_voltage(0x2580), 1.5); // 9600 >> 3 = 1200 LSBs
    }

    #[test]
    fn decodes_shunt_voltage_signed() {
        assert_close(decode_shunt_voltage(400), 0.001);
        assert_close(decode_shunt_voltage(0xFFFF), -0.000_002_5);
    }

    #[test]
    fn decodes_current_signed() {
        assert_close(decode_current(10_000), 10.0);
        assert_close(decode_current(0x8000), -32.768);
        assert_close(decode_current(0x7FFF), 32.767);
    }

    #[test]
    fn decodes_power_unsigned() {
        assert_close(decode_power(60), 1.5);
        assert_close(decode_power(0xFFFF), 1638.375);
    }

    #[test]
    fn reinterprets_sign_boundaries() {
        assert_eq!(twos_complement(0x0000), 0);
        assert_eq!(twos_complement(0x7FFF), 32767);
        assert_eq!(twos_complement(0x8000), -32768);
        assert_eq!(twos_complement(0xFFFF), -1);
    }

    #[test]
    fn write_frames_selector_then_big_endian_value() {
        let mut i2c = I2cMock::new(&[I2cTransaction::write(0x40, vec![0x00, 0x45, 0x27])]);
        let mut driver = Ina231Driver::new(i2c.clone());

        driver
            .write_register(Register::Configuration, CONFIG_WORD)
            .unwrap();
        i2c.done();
    }

    #[test]
    fn read_uses_repeated_start_and_assembles_big_endian() {
        let mut i2c = I2cMock::new(&[I2cTransaction::write_read(
            0x40,
            vec![0x04],
            vec![0x01, 0xF4],
        )]);
        let mut driver = Ina231Driver::new(i2c.clone());

        assert_eq!(driver.read_register(Register::Current).unwrap(), 500);
        i2c.done();
    }

    #[test]
    fn initialize_writes_config_then_calibration() {
        let mut i2c = I2cMock::new(&[
            I2cTransaction::write(0x40, vec![0x00, 0x45, 0x27]),
            I2cTransaction::write(0x40, vec![0x05, 0x0A, 0x00]),
        ]);
        let mut driver = Ina231Driver::new(i2c.clone());

        driver.initialize(&mut NoopDelay::new()).unwrap();
        i2c.done();
    }

    #[test]
    fn initialize_propagates_write_failure() {
        let mut i2c = I2cMock::new(&[
            I2cTransaction::write(0x40, vec![0x00, 0x45, 0x27]).with_error(ErrorKind::Other)
        ]);
        let mut driver = Ina231Driver::new(i2c.clone());

        assert_eq!(
            driver.initialize(&mut NoopDelay::new()),
            Err(Ina231Error::I2c(ErrorKind::Other))
        );
        i2c.done();
    }

    #[test]
    fn read_failure_is_signaled_not_zero() {
        let mut i2c = I2cMock::new(&[
            I2cTransaction::write_read(0x40, vec![0x02], vec![0x00, 0x00])
                .with_error(ErrorKind::Other),
        ]);
        let mut driver = Ina231Driver::new(i2c.clone());

        assert_eq!(
            driver.read_register(Register::BusVoltage),
            Err(Ina231Error::I2c(ErrorKind::Other))
        );
        i2c.done();
    }

    #[test]
    fn sample_reads_four_registers_and_sums_load_voltage() {
        let mut i2c = I2cMock::new(&[
            I2cTransaction::write_read(0x40, vec![0x01], vec![0x01, 0x90]), // shunt: 400
            I2cTransaction::write_read(0x40, vec![0x02], vec![0x25, 0x80]), // bus: 9600
            I2cTransaction::write_read(0x40, vec![0x03], vec![0x00, 0x3C]), // power: 60
            I2cTransaction::write_read(0x40, vec![0x04], vec![0x27, 0x10]), // current: 10000
        ]);
        let mut driver = Ina231Driver::new(i2c.clone());

        let sample = driver.read_sample().unwrap();
        assert_close(sample.shunt_voltage, 0.001);
        assert_close(sample.bus_voltage, 1.5);
        assert_close(sample.load_voltage, 1.501);
        assert_close(sample.power_mw, 1.5);
        assert_close(sample.current_ma, 10.0);
        i2c.done();
    }

    #[test]
    fn strapped_address_is_used_on_the_bus() {
        let mut i2c = I2cMock::new(&[I2cTransaction::write_read(
            0x44,
            vec![0x04],
            vec![0x00, 0x00],
        )]);
        let mut driver = Ina231Driver::with_address(i2c.clone(), 0x44);

        assert_eq!(driver.current().unwrap(), 0.0);
        i2c.done();
    }
}
