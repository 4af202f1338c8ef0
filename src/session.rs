use crate::driver::{Ina231Driver, Ina231Error, Measurement};
use core::fmt::Write;
use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

/// Warm-up window before the zero-offset baseline is captured.
const WARMUP_MS: u32 = 2000;
/// Sampling period. Applied as a fixed end-of-tick delay, not a scheduled
/// timer, so processing latency adds to the effective period.
const SAMPLE_PERIOD_MS: u32 = 25;
/// Extra pause after the baseline notice so it stands out on the stream.
const BASELINE_PAUSE_MS: u32 = 500;
/// Linear gain applied to the current delta.
const DELTA_GAIN: f32 = 5.0;
/// Divisor of the sign-preserving quadratic spike transform.
const SPIKE_DIVISOR: f32 = 10.0;

/// One-time lines are prefixed with `# ` so the plotting consumer can
/// filter them from data lines.
pub const STARTUP_BANNER: &str = "# INA231 current monitor starting";
pub const INIT_FAILURE_NOTICE: &str = "# INA231 initialization failed";

/// Milliseconds elapsed since session start. Injectable so the warm-up
/// deadline can be tested without real time passing.
pub trait Clock {
    fn elapsed_ms(&mut self) -> u32;
}

impl<F> Clock for F
where
    F: FnMut() -> u32,
{
    fn elapsed_ms(&mut self) -> u32 {
        self()
    }
}

/// Wall-clock [`Clock`] anchored at construction time.
#[cfg(feature = "std")]
pub struct StdClock(std::time::Instant);

#[cfg(feature = "std")]
impl StdClock {
    pub fn new() -> Self {
        Self(std::time::Instant::now())
    }
}

#[cfg(feature = "std")]
impl Clock for StdClock {
    fn elapsed_ms(&mut self) -> u32 {
        self.0.elapsed().as_millis() as u32
    }
}

/// Reference levels captured once at the end of warm-up. Deltas on every
/// later tick are computed against these.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Baseline {
    pub current_ma: f32,
    pub load_voltage: f32,
}

#[derive(Copy, Clone)]
enum State {
    Warmup,
    Steady(Baseline),
}

/// Polls the sensor at a fixed cadence and emits amplified current deltas
/// as labeled text lines for a live plotting consumer.
///
/// The session owns all mutable state; the Warmup -> Steady transition
/// happens exactly once and is irreversible.
pub struct MonitorSession<I2C, Delay, C> {
    driver: Ina231Driver<I2C>,
    delay: Delay,
    clock: C,
    state: State,
}

impl<I2C, Delay, C> MonitorSession<I2C, Delay, C>
where
    I2C: I2c,
    Delay: DelayNs,
    C: Clock,
{
    pub fn new(driver: Ina231Driver<I2C>, delay: Delay, clock: C) -> Self {
        Self {
            driver,
            delay,
            clock,
            state: State::Warmup,
        }
    }

    /// The captured baseline, or `None` while still warming up.
    pub fn baseline(&self) -> Option<Baseline> {
        match self.state {
            State::Warmup => None,
            State::Steady(baseline) => Some(baseline),
        }
    }

    /// Emits the startup banner and configures the device. On failure the
    /// fixed failure notice is written once and the error is returned; the
    /// caller must not tick a session that failed to start.
    pub fn start<W: Write>(&mut self, sink: &mut W) -> Result<(), Ina231Error<I2C::Error>> {
        writeln!(sink, "{STARTUP_BANNER}")?;
        if let Err(e) = self.driver.initialize(&mut self.delay) {
            writeln!(sink, "{INIT_FAILURE_NOTICE}")?;
            return Err(e);
        }
        Ok(())
    }

    /// One sampling tick: read, update the baseline state machine, emit.
    /// Ends with the fixed sampling-period delay regardless of what the
    /// tick produced.
    pub fn tick<W: Write>(&mut self, sink: &mut W) -> Result<(), Ina231Error<I2C::Error>> {
        let sample = self.driver.read_sample()?;

        match self.state {
            State::Warmup => {
                if self.clock.elapsed_ms() > WARMUP_MS {
                    let baseline = Baseline {
                        current_ma: sample.current_ma,
                        load_voltage: sample.load_voltage,
                    };
                    self.state = State::Steady(baseline);
                    writeln!(
                        sink,
                        "# Baseline established: {:.2} mA, {:.3} V",
                        baseline.current_ma, baseline.load_voltage
                    )?;
                    // The sample that set the baseline is not echoed as data.
                    self.delay.delay_ms(BASELINE_PAUSE_MS);
                }
            }
            State::Steady(baseline) => write_data_line(sink, &sample, &baseline)?,
        }

        self.delay.delay_ms(SAMPLE_PERIOD_MS);
        Ok(())
    }

    /// Starts the session and samples forever. Returns only on error.
    pub fn run<W: Write>(
        &mut self,
        sink: &mut W,
    ) -> Result<core::convert::Infallible, Ina231Error<I2C::Error>> {
        self.start(sink)?;
        loop {
            self.tick(sink)?;
        }
    }
}

fn write_data_line<W: Write>(
    sink: &mut W,
    sample: &Measurement,
    baseline: &Baseline,
) -> core::fmt::Result {
    let change = sample.current_ma - baseline.current_ma;
    writeln!(
        sink,
        "Current_mA:{:.2},Current_Change_5x:{:.2},Current_Spike:{:.2},Voltage:{:.3},Power_mW:{:.2},Baseline_Current:{:.2}",
        sample.current_ma,
        change * DELTA_GAIN,
        spike_transform(change),
        sample.load_voltage,
        sample.power_mw,
        baseline.current_ma,
    )
}

/// `change * |change| / 10`: grows quadratically with the delta magnitude
/// while keeping its sign, so current spikes stay readable on a linear
/// plot. Written without `abs`, which is unavailable in core.
fn spike_transform(change: f32) -> f32 {
    let magnitude = change * change / SPIKE_DIVISOR;
    if change < 0.0 {
        -magnitude
    } else {
        magnitude
    }
}
