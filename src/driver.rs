//! Blocking driver for the MAX6639; the async API mirrors it behind the
//! `async` feature.
//!
//! Every accessor performs at most one or two register transactions and
//! returns a `Result`, so a bus fault or an unresponsive device is never
//! silently folded into a stale value. Setters that touch a shared byte
//! read-modify-write so sibling fields are preserved.

use embedded_hal::i2c::{Error as _, ErrorKind};

use crate::data_types::{
    Address, Channel, Channel2Source, ControlMode, PulsesPerRev, PwmFrequency, PwmPolarity,
    RpmRange, TachSelect, TempStep,
};
use crate::error::Error;
use crate::registers::{
    addr, apply_correction, defaults, duty_to_percent, ext_temp_fraction, fields,
    percent_to_duty, remove_correction, tach_count_to_rpm, FanConfig1, FanConfig2a, FanConfig3,
    GlobalConfig, DEFAULT_I2C_ADDRESS, READ_RETRY_LIMIT,
};

/// MAX6639 device handle. Owns the bus, a delay provider and the volatile
/// per-channel sensor corrections.
pub struct Max6639<I2C, D> {
    i2c: I2C,
    delay: D,
    address: u8,
    correction: [i8; 2],
}

impl<I2C, D> Max6639<I2C, D> {
    /// Create a driver instance with the default I2C address (0x2C).
    pub fn new(i2c: I2C, delay: D) -> Self {
        Self::with_address(i2c, delay, DEFAULT_I2C_ADDRESS)
    }

    /// Create a driver instance with a literal 7-bit address.
    pub fn with_address(i2c: I2C, delay: D, address: u8) -> Self {
        Self {
            i2c,
            delay,
            address,
            correction: [0, 0],
        }
    }

    /// Create a driver instance for one of the ADD-pin strapped addresses.
    pub fn with_strapped_address(i2c: I2C, delay: D, address: Address) -> Self {
        Self::with_address(i2c, delay, address.value())
    }

    /// The 7-bit I2C address configured for this instance.
    pub fn address(&self) -> u8 {
        self.address
    }

    /// Current calibration offset for a channel.
    pub fn sensor_correction(&self, ch: Channel) -> i8 {
        self.correction[ch.index() as usize]
    }

    /// Set the calibration offset for a channel. Applied to every
    /// temperature and limit accessor; takes effect immediately, no bus I/O.
    pub fn set_sensor_correction(&mut self, ch: Channel, offset: i8) {
        self.correction[ch.index() as usize] = offset;
    }

    /// Release the bus and delay provider.
    pub fn free(self) -> (I2C, D) {
        (self.i2c, self.delay)
    }
}

impl<I2C, D> Max6639<I2C, D>
where
    I2C: embedded_hal::i2c::I2c,
    D: embedded_hal::delay::DelayNs,
{
    /// Write a single register.
    pub fn write_reg(&mut self, reg: u8, value: u8) -> Result<(), Error<I2C::Error>> {
        self.i2c
            .write(self.address, &[reg, value])
            .map_err(Error::I2c)
    }

    /// Read a single register, polling through NAKs with a bounded retry.
    ///
    /// The device stretches or NAKs while a conversion is in flight, so an
    /// unacknowledged transfer is retried once per millisecond up to
    /// [`READ_RETRY_LIMIT`] attempts before failing with [`Error::Timeout`].
    /// Any other bus fault propagates immediately.
    pub fn read_reg(&mut self, reg: u8) -> Result<u8, Error<I2C::Error>> {
        let mut buf = [0u8; 1];
        for _ in 0..READ_RETRY_LIMIT {
            match self.i2c.write_read(self.address, &[reg], &mut buf) {
                Ok(()) => return Ok(buf[0]),
                Err(e) => match e.kind() {
                    ErrorKind::NoAcknowledge(_) => self.delay.delay_ms(1),
                    _ => return Err(Error::I2c(e)),
                },
            }
        }
        Err(Error::Timeout)
    }

    /// Update masked bits in a register (read-modify-write).
    pub fn update_reg(&mut self, reg: u8, mask: u8, value: u8) -> Result<(), Error<I2C::Error>> {
        let cur = self.read_reg(reg)?;
        let new = (cur & !mask) | (value & mask);
        self.write_reg(reg, new)
    }

    /// Bring the device to the documented startup configuration: bus timeout
    /// disabled, channel 2 on the local sensor, PPR = 2, active-high 20 Hz
    /// PWM, THERM/ALERT/OT limits at 40/50/60 degC, minimum-speed threshold
    /// enabled, 4000 RPM range, and each fan tracking its own temperature
    /// channel. A POR pulse with a settling delay precedes everything else
    /// so the device is out of standby before the writes land.
    pub fn init_defaults(&mut self) -> Result<(), Error<I2C::Error>> {
        self.set_por(true)?;
        self.delay.delay_ms(defaults::POR_SETTLE_MS);
        self.set_config(GlobalConfig::DISABLE_TIMEOUT | GlobalConfig::CH2_LOCAL)?;
        for ch in Channel::BOTH {
            self.set_ppr(ch, PulsesPerRev::Two)?;
            self.set_pwm_polarity(ch, PwmPolarity::ActiveHigh)?;
            self.set_pwm_frequency(ch, PwmFrequency::Hz20)?;
            self.set_therm_limit(ch, defaults::THERM_LIMIT_C)?;
            self.set_alert_limit(ch, defaults::ALERT_LIMIT_C)?;
            self.set_ot_limit(ch, defaults::OT_LIMIT_C)?;
            self.set_fan_start_temp(ch, defaults::FAN_START_TEMP_C)?;
            self.set_fan_minimum_speed(ch, true, defaults::MIN_TACH_COUNT)?;
            self.set_rpm_range(ch, RpmRange::Rpm4000)?;
            self.set_rate_of_change(ch, defaults::RATE_OF_CHANGE)?;
        }
        self.set_fan_auto_rpm(Channel::Ch0, TachSelect::Temp0)?;
        self.set_fan_auto_rpm(Channel::Ch1, TachSelect::Temp1)
    }

    // --- Identification and status ---

    pub fn get_device_id(&mut self) -> Result<u8, Error<I2C::Error>> {
        self.read_reg(addr::DEVICE_ID)
    }

    pub fn get_manufacturer_id(&mut self) -> Result<u8, Error<I2C::Error>> {
        self.read_reg(addr::MANUFACTURER_ID)
    }

    pub fn get_revision(&mut self) -> Result<u8, Error<I2C::Error>> {
        self.read_reg(addr::DEVICE_REVISION)
    }

    /// Raw status byte (fan fault / THERM / ALERT / OT flags).
    pub fn get_status(&mut self) -> Result<u8, Error<I2C::Error>> {
        self.read_reg(addr::STATUS)
    }

    pub fn get_output_mask(&mut self) -> Result<u8, Error<I2C::Error>> {
        self.read_reg(addr::OUTPUT_MASK)
    }

    pub fn set_output_mask(&mut self, mask: u8) -> Result<(), Error<I2C::Error>> {
        self.write_reg(addr::OUTPUT_MASK, mask)
    }

    pub fn get_config(&mut self) -> Result<GlobalConfig, Error<I2C::Error>> {
        let raw = self.read_reg(addr::GLOBAL_CONFIG)?;
        Ok(GlobalConfig::from_bits_truncate(raw))
    }

    pub fn set_config(&mut self, config: GlobalConfig) -> Result<(), Error<I2C::Error>> {
        self.write_reg(addr::GLOBAL_CONFIG, config.bits())
    }

    /// Remote-diode fault flag for a channel.
    pub fn get_diode_fault(&mut self, ch: Channel) -> Result<bool, Error<I2C::Error>> {
        let raw = self.read_reg(addr::temp_ext(ch))?;
        Ok(raw & fields::DIODE_FAULT != 0)
    }

    // --- Temperature ---

    /// Channel temperature in whole degrees Celsius, correction applied.
    pub fn get_temp_celsius(&mut self, ch: Channel) -> Result<u8, Error<I2C::Error>> {
        let raw = self.read_reg(addr::temp(ch))?;
        Ok(apply_correction(raw, self.sensor_correction(ch)))
    }

    /// Channel temperature in degrees Fahrenheit (truncating integer scale).
    pub fn get_temp_fahrenheit(&mut self, ch: Channel) -> Result<u8, Error<I2C::Error>> {
        let celsius = self.get_temp_celsius(ch)?;
        Ok((celsius as u16 * 9 / 5 + 32).min(255) as u8)
    }

    /// Channel temperature with the 0.125 degC fractional extension.
    pub fn get_ext_temp(&mut self, ch: Channel) -> Result<f32, Error<I2C::Error>> {
        let celsius = self.get_temp_celsius(ch)?;
        let ext = self.read_reg(addr::temp_ext(ch))?;
        Ok(celsius as f32 + ext_temp_fraction(ext))
    }

    pub fn get_alert_limit(&mut self, ch: Channel) -> Result<u8, Error<I2C::Error>> {
        let raw = self.read_reg(addr::alert_limit(ch))?;
        Ok(remove_correction(raw, self.sensor_correction(ch)))
    }

    pub fn set_alert_limit(&mut self, ch: Channel, limit: u8) -> Result<(), Error<I2C::Error>> {
        let raw = apply_correction(limit, self.sensor_correction(ch));
        self.write_reg(addr::alert_limit(ch), raw)
    }

    pub fn get_ot_limit(&mut self, ch: Channel) -> Result<u8, Error<I2C::Error>> {
        let raw = self.read_reg(addr::ot_limit(ch))?;
        Ok(remove_correction(raw, self.sensor_correction(ch)))
    }

    pub fn set_ot_limit(&mut self, ch: Channel, limit: u8) -> Result<(), Error<I2C::Error>> {
        let raw = apply_correction(limit, self.sensor_correction(ch));
        self.write_reg(addr::ot_limit(ch), raw)
    }

    pub fn get_therm_limit(&mut self, ch: Channel) -> Result<u8, Error<I2C::Error>> {
        let raw = self.read_reg(addr::therm_limit(ch))?;
        Ok(remove_correction(raw, self.sensor_correction(ch)))
    }

    pub fn set_therm_limit(&mut self, ch: Channel, limit: u8) -> Result<(), Error<I2C::Error>> {
        let raw = apply_correction(limit, self.sensor_correction(ch));
        self.write_reg(addr::therm_limit(ch), raw)
    }

    /// Temperature at which the fan starts in auto mode, correction applied.
    pub fn get_fan_start_temp(&mut self, ch: Channel) -> Result<u8, Error<I2C::Error>> {
        let raw = self.read_reg(addr::fan_start_temp(ch))?;
        Ok(remove_correction(raw, self.sensor_correction(ch)))
    }

    pub fn set_fan_start_temp(&mut self, ch: Channel, temp: u8) -> Result<(), Error<I2C::Error>> {
        let raw = apply_correction(temp, self.sensor_correction(ch));
        self.write_reg(addr::fan_start_temp(ch), raw)
    }

    // --- Tach and duty ---

    pub fn get_tach_count(&mut self, ch: Channel) -> Result<u8, Error<I2C::Error>> {
        self.read_reg(addr::tach_count(ch))
    }

    pub fn set_tach_count(&mut self, ch: Channel, count: u8) -> Result<(), Error<I2C::Error>> {
        self.write_reg(addr::tach_count(ch), count)
    }

    pub fn get_target_tach(&mut self, ch: Channel) -> Result<u8, Error<I2C::Error>> {
        self.read_reg(addr::target_tach(ch))
    }

    pub fn set_target_tach(&mut self, ch: Channel, count: u8) -> Result<(), Error<I2C::Error>> {
        self.write_reg(addr::target_tach(ch), count)
    }

    pub fn get_ppr(&mut self, ch: Channel) -> Result<PulsesPerRev, Error<I2C::Error>> {
        let raw = self.read_reg(addr::ppr_min_tach(ch))?;
        Ok(PulsesPerRev::from_code(
            (raw & fields::PPR_MASK) >> fields::PPR_SHIFT,
        ))
    }

    /// Set pulses-per-revolution without disturbing the minimum tach count
    /// packed into the same byte.
    pub fn set_ppr(&mut self, ch: Channel, ppr: PulsesPerRev) -> Result<(), Error<I2C::Error>> {
        self.update_reg(
            addr::ppr_min_tach(ch),
            fields::PPR_MASK,
            ppr.code() << fields::PPR_SHIFT,
        )
    }

    pub fn get_min_tach_count(&mut self, ch: Channel) -> Result<u8, Error<I2C::Error>> {
        let raw = self.read_reg(addr::ppr_min_tach(ch))?;
        Ok(raw & fields::MIN_TACH_MASK)
    }

    /// Set the 6-bit minimum tach count without disturbing the PPR field.
    pub fn set_min_tach_count(&mut self, ch: Channel, count: u8) -> Result<(), Error<I2C::Error>> {
        self.update_reg(addr::ppr_min_tach(ch), fields::MIN_TACH_MASK, count)
    }

    /// Target duty in the chip's native 0..=120 scale.
    pub fn get_duty(&mut self, ch: Channel) -> Result<u8, Error<I2C::Error>> {
        self.read_reg(addr::target_duty(ch))
    }

    pub fn set_duty(&mut self, ch: Channel, duty: u8) -> Result<(), Error<I2C::Error>> {
        self.write_reg(addr::target_duty(ch), duty)
    }

    /// Target duty as a percentage of full scale.
    pub fn get_duty_percent(&mut self, ch: Channel) -> Result<u8, Error<I2C::Error>> {
        let duty = self.get_duty(ch)?;
        Ok(duty_to_percent(duty))
    }

    /// Set the target duty as a percentage; values above 100 are clamped.
    pub fn set_duty_percent(&mut self, ch: Channel, percent: u8) -> Result<(), Error<I2C::Error>> {
        self.set_duty(ch, percent_to_duty(percent))
    }

    /// Measured fan speed in RPM, derived from the tach count, the PPR
    /// setting and the selected range. 0 when the tach reports no signal.
    pub fn get_fan_rpm(&mut self, ch: Channel) -> Result<u16, Error<I2C::Error>> {
        let count = self.get_tach_count(ch)?;
        let ppr = self.get_ppr(ch)?;
        let range = self.get_rpm_range(ch)?;
        Ok(tach_count_to_rpm(count, ppr.pulses(), range.frequency_hz()))
    }

    pub fn get_rpm_range(&mut self, ch: Channel) -> Result<RpmRange, Error<I2C::Error>> {
        let raw = self.read_reg(addr::fan_config1(ch))?;
        Ok(RpmRange::from_code(raw & fields::RPM_RANGE_MASK))
    }

    pub fn set_rpm_range(&mut self, ch: Channel, range: RpmRange) -> Result<(), Error<I2C::Error>> {
        self.update_reg(addr::fan_config1(ch), fields::RPM_RANGE_MASK, range.code())
    }

    // --- PWM output ---

    /// Current PWM output frequency, combining the global band bit with the
    /// per-channel frequency code.
    pub fn get_pwm_frequency(&mut self, ch: Channel) -> Result<PwmFrequency, Error<I2C::Error>> {
        let config = self.get_config()?;
        let code = self.read_reg(addr::fan_config3(ch))? & fields::PWM_FREQ_CODE_MASK;
        Ok(PwmFrequency::from_parts(
            config.contains(GlobalConfig::PWM_FREQ_HIGH),
            code,
        ))
    }

    /// Select the PWM output frequency. Writes the band bit in the global
    /// config register and the 2-bit code in fan config 3, preserving the
    /// neighbouring fields of both.
    pub fn set_pwm_frequency(
        &mut self,
        ch: Channel,
        freq: PwmFrequency,
    ) -> Result<(), Error<I2C::Error>> {
        let (high_band, code) = freq.parts();
        let band = if high_band {
            GlobalConfig::PWM_FREQ_HIGH.bits()
        } else {
            0
        };
        self.update_reg(addr::GLOBAL_CONFIG, GlobalConfig::PWM_FREQ_HIGH.bits(), band)?;
        self.update_reg(addr::fan_config3(ch), fields::PWM_FREQ_CODE_MASK, code)
    }

    /// Enable or suppress the fan spin-up sequence.
    pub fn set_fan_spinup(&mut self, ch: Channel, enabled: bool) -> Result<(), Error<I2C::Error>> {
        let mask = FanConfig3::SPINUP_DISABLE.bits();
        self.update_reg(addr::fan_config3(ch), mask, if enabled { 0 } else { mask })
    }

    /// Force full speed while the THERM limit is exceeded.
    pub fn set_therm_full_speed(
        &mut self,
        ch: Channel,
        enabled: bool,
    ) -> Result<(), Error<I2C::Error>> {
        let mask = FanConfig3::THERM_FULL_SPEED.bits();
        self.update_reg(addr::fan_config3(ch), mask, if enabled { mask } else { 0 })
    }

    /// Enable or disable tach pulse stretching.
    pub fn set_pulse_stretch(&mut self, ch: Channel, enabled: bool) -> Result<(), Error<I2C::Error>> {
        let mask = FanConfig3::PULSE_STRETCH_DISABLE.bits();
        self.update_reg(addr::fan_config3(ch), mask, if enabled { 0 } else { mask })
    }

    pub fn set_pwm_polarity(
        &mut self,
        ch: Channel,
        polarity: PwmPolarity,
    ) -> Result<(), Error<I2C::Error>> {
        let mask = FanConfig2a::POLARITY_HIGH.bits();
        let value = match polarity {
            PwmPolarity::ActiveHigh => mask,
            PwmPolarity::ActiveLow => 0,
        };
        self.update_reg(addr::fan_config2a(ch), mask, value)
    }

    /// Select open-loop PWM or closed-loop RPM drive for a fan.
    pub fn set_control_mode(
        &mut self,
        ch: Channel,
        mode: ControlMode,
    ) -> Result<(), Error<I2C::Error>> {
        let mask = FanConfig1::PWM_MODE.bits();
        let value = match mode {
            ControlMode::Pwm => mask,
            ControlMode::Rpm => 0,
        };
        self.update_reg(addr::fan_config1(ch), mask, value)
    }

    /// Assign the temperature channel driving this fan's automatic RPM
    /// control. Clears the PWM-mode bit; auto-RPM only operates closed-loop.
    pub fn set_fan_auto_rpm(
        &mut self,
        ch: Channel,
        select: TachSelect,
    ) -> Result<(), Error<I2C::Error>> {
        let mask = FanConfig1::PWM_MODE.bits() | fields::TACH_SELECT_MASK;
        self.update_reg(addr::fan_config1(ch), mask, select.bits())
    }

    /// Drive a fan open-loop at a fixed duty percentage.
    pub fn set_fan_pwm(&mut self, ch: Channel, percent: u8) -> Result<(), Error<I2C::Error>> {
        let mask = FanConfig1::PWM_MODE.bits() | fields::TACH_SELECT_MASK;
        self.update_reg(
            addr::fan_config1(ch),
            mask,
            FanConfig1::PWM_MODE.bits(),
        )?;
        self.set_duty_percent(ch, percent)
    }

    /// Drive a fan closed-loop toward a fixed target tach count.
    pub fn set_fan_manual_rpm(&mut self, ch: Channel, target: u8) -> Result<(), Error<I2C::Error>> {
        let mask = FanConfig1::PWM_MODE.bits() | fields::TACH_SELECT_MASK;
        self.update_reg(addr::fan_config1(ch), mask, 0)?;
        self.set_target_tach(ch, target)
    }

    /// Enable minimum-speed enforcement and set the tach threshold backing it.
    pub fn set_fan_minimum_speed(
        &mut self,
        ch: Channel,
        enabled: bool,
        count: u8,
    ) -> Result<(), Error<I2C::Error>> {
        let mask = FanConfig2a::MIN_SPEED_EN.bits();
        self.update_reg(addr::fan_config2a(ch), mask, if enabled { mask } else { 0 })?;
        self.set_min_tach_count(ch, count)
    }

    // --- Ramp-rate and step-size fields ---

    /// Duty-cycle rate of change code (3 bits).
    pub fn get_rate_of_change(&mut self, ch: Channel) -> Result<u8, Error<I2C::Error>> {
        let raw = self.read_reg(addr::fan_config1(ch))?;
        Ok((raw & fields::RATE_OF_CHANGE_MASK) >> fields::RATE_OF_CHANGE_SHIFT)
    }

    pub fn set_rate_of_change(&mut self, ch: Channel, code: u8) -> Result<(), Error<I2C::Error>> {
        self.update_reg(
            addr::fan_config1(ch),
            fields::RATE_OF_CHANGE_MASK,
            code << fields::RATE_OF_CHANGE_SHIFT,
        )
    }

    /// RPM step size A code (3 bits).
    pub fn get_rpm_step_a(&mut self, ch: Channel) -> Result<u8, Error<I2C::Error>> {
        let raw = self.read_reg(addr::fan_config2a(ch))?;
        Ok((raw & fields::RPM_STEP_A_MASK) >> fields::RPM_STEP_A_SHIFT)
    }

    pub fn set_rpm_step_a(&mut self, ch: Channel, code: u8) -> Result<(), Error<I2C::Error>> {
        self.update_reg(
            addr::fan_config2a(ch),
            fields::RPM_STEP_A_MASK,
            code << fields::RPM_STEP_A_SHIFT,
        )
    }

    pub fn get_temp_step_a(&mut self, ch: Channel) -> Result<TempStep, Error<I2C::Error>> {
        let raw = self.read_reg(addr::fan_config2a(ch))?;
        Ok(TempStep::from_code(
            (raw & fields::TEMP_STEP_A_MASK) >> fields::TEMP_STEP_A_SHIFT,
        ))
    }

    pub fn set_temp_step_a(&mut self, ch: Channel, step: TempStep) -> Result<(), Error<I2C::Error>> {
        self.update_reg(
            addr::fan_config2a(ch),
            fields::TEMP_STEP_A_MASK,
            step.code() << fields::TEMP_STEP_A_SHIFT,
        )
    }

    /// RPM step size B code (4 bits).
    pub fn get_rpm_step_b(&mut self, ch: Channel) -> Result<u8, Error<I2C::Error>> {
        let raw = self.read_reg(addr::fan_config2b(ch))?;
        Ok((raw & fields::RPM_STEP_B_MASK) >> fields::RPM_STEP_B_SHIFT)
    }

    pub fn set_rpm_step_b(&mut self, ch: Channel, code: u8) -> Result<(), Error<I2C::Error>> {
        self.update_reg(
            addr::fan_config2b(ch),
            fields::RPM_STEP_B_MASK,
            code << fields::RPM_STEP_B_SHIFT,
        )
    }

    /// Start step code (4 bits).
    pub fn get_start_step(&mut self, ch: Channel) -> Result<u8, Error<I2C::Error>> {
        let raw = self.read_reg(addr::fan_config2b(ch))?;
        Ok(raw & fields::START_STEP_MASK)
    }

    pub fn set_start_step(&mut self, ch: Channel, code: u8) -> Result<(), Error<I2C::Error>> {
        self.update_reg(addr::fan_config2b(ch), fields::START_STEP_MASK, code)
    }

    // --- Run state ---

    /// Leave (`true`) or enter (`false`) standby.
    pub fn set_run(&mut self, run: bool) -> Result<(), Error<I2C::Error>> {
        let mask = GlobalConfig::STANDBY.bits();
        self.update_reg(addr::GLOBAL_CONFIG, mask, if run { 0 } else { mask })
    }

    /// `true` when the standby bit is clear.
    pub fn is_running(&mut self) -> Result<bool, Error<I2C::Error>> {
        let config = self.get_config()?;
        Ok(!config.contains(GlobalConfig::STANDBY))
    }

    /// Assert or release power-on reset.
    pub fn set_por(&mut self, reset: bool) -> Result<(), Error<I2C::Error>> {
        let mask = GlobalConfig::POR.bits();
        self.update_reg(addr::GLOBAL_CONFIG, mask, if reset { mask } else { 0 })
    }

    /// Select the temperature source monitored on channel 2.
    pub fn set_channel2_source(
        &mut self,
        source: Channel2Source,
    ) -> Result<(), Error<I2C::Error>> {
        let mask = GlobalConfig::CH2_LOCAL.bits();
        let value = match source {
            Channel2Source::Local => mask,
            Channel2Source::Remote => 0,
        };
        self.update_reg(addr::GLOBAL_CONFIG, mask, value)
    }
}

#[cfg(feature = "async")]
impl<I2C, D> Max6639<I2C, D>
where
    I2C: embedded_hal_async::i2c::I2c,
    D: embedded_hal_async::delay::DelayNs,
{
    pub async fn write_reg_async(&mut self, reg: u8, value: u8) -> Result<(), Error<I2C::Error>> {
        self.i2c
            .write(self.address, &[reg, value])
            .await
            .map_err(Error::I2c)
    }

    /// Async version of [`read_reg`](Self::read_reg), same retry bound.
    pub async fn read_reg_async(&mut self, reg: u8) -> Result<u8, Error<I2C::Error>> {
        let mut buf = [0u8; 1];
        for _ in 0..READ_RETRY_LIMIT {
            match self.i2c.write_read(self.address, &[reg], &mut buf).await {
                Ok(()) => return Ok(buf[0]),
                Err(e) => match e.kind() {
                    ErrorKind::NoAcknowledge(_) => self.delay.delay_ms(1).await,
                    _ => return Err(Error::I2c(e)),
                },
            }
        }
        Err(Error::Timeout)
    }

    pub async fn update_reg_async(
        &mut self,
        reg: u8,
        mask: u8,
        value: u8,
    ) -> Result<(), Error<I2C::Error>> {
        let cur = self.read_reg_async(reg).await?;
        let new = (cur & !mask) | (value & mask);
        self.write_reg_async(reg, new).await
    }

    /// Async version of [`init_defaults`](Self::init_defaults).
    pub async fn init_defaults_async(&mut self) -> Result<(), Error<I2C::Error>> {
        self.set_por_async(true).await?;
        self.delay.delay_ms(defaults::POR_SETTLE_MS).await;
        self.set_config_async(GlobalConfig::DISABLE_TIMEOUT | GlobalConfig::CH2_LOCAL)
            .await?;
        for ch in Channel::BOTH {
            self.set_ppr_async(ch, PulsesPerRev::Two).await?;
            self.set_pwm_polarity_async(ch, PwmPolarity::ActiveHigh).await?;
            self.set_pwm_frequency_async(ch, PwmFrequency::Hz20).await?;
            self.set_therm_limit_async(ch, defaults::THERM_LIMIT_C).await?;
            self.set_alert_limit_async(ch, defaults::ALERT_LIMIT_C).await?;
            self.set_ot_limit_async(ch, defaults::OT_LIMIT_C).await?;
            self.set_fan_start_temp_async(ch, defaults::FAN_START_TEMP_C)
                .await?;
            self.set_fan_minimum_speed_async(ch, true, defaults::MIN_TACH_COUNT)
                .await?;
            self.set_rpm_range_async(ch, RpmRange::Rpm4000).await?;
            self.set_rate_of_change_async(ch, defaults::RATE_OF_CHANGE).await?;
        }
        self.set_fan_auto_rpm_async(Channel::Ch0, TachSelect::Temp0)
            .await?;
        self.set_fan_auto_rpm_async(Channel::Ch1, TachSelect::Temp1)
            .await
    }

    pub async fn get_device_id_async(&mut self) -> Result<u8, Error<I2C::Error>> {
        self.read_reg_async(addr::DEVICE_ID).await
    }

    pub async fn get_manufacturer_id_async(&mut self) -> Result<u8, Error<I2C::Error>> {
        self.read_reg_async(addr::MANUFACTURER_ID).await
    }

    pub async fn get_revision_async(&mut self) -> Result<u8, Error<I2C::Error>> {
        self.read_reg_async(addr::DEVICE_REVISION).await
    }

    pub async fn get_status_async(&mut self) -> Result<u8, Error<I2C::Error>> {
        self.read_reg_async(addr::STATUS).await
    }

    pub async fn get_output_mask_async(&mut self) -> Result<u8, Error<I2C::Error>> {
        self.read_reg_async(addr::OUTPUT_MASK).await
    }

    pub async fn set_output_mask_async(&mut self, mask: u8) -> Result<(), Error<I2C::Error>> {
        self.write_reg_async(addr::OUTPUT_MASK, mask).await
    }

    pub async fn get_config_async(&mut self) -> Result<GlobalConfig, Error<I2C::Error>> {
        let raw = self.read_reg_async(addr::GLOBAL_CONFIG).await?;
        Ok(GlobalConfig::from_bits_truncate(raw))
    }

    pub async fn set_config_async(&mut self, config: GlobalConfig) -> Result<(), Error<I2C::Error>> {
        self.write_reg_async(addr::GLOBAL_CONFIG, config.bits()).await
    }

    pub async fn get_diode_fault_async(&mut self, ch: Channel) -> Result<bool, Error<I2C::Error>> {
        let raw = self.read_reg_async(addr::temp_ext(ch)).await?;
        Ok(raw & fields::DIODE_FAULT != 0)
    }

    pub async fn get_temp_celsius_async(&mut self, ch: Channel) -> Result<u8, Error<I2C::Error>> {
        let raw = self.read_reg_async(addr::temp(ch)).await?;
        Ok(apply_correction(raw, self.sensor_correction(ch)))
    }

    pub async fn get_temp_fahrenheit_async(&mut self, ch: Channel) -> Result<u8, Error<I2C::Error>> {
        let celsius = self.get_temp_celsius_async(ch).await?;
        Ok((celsius as u16 * 9 / 5 + 32).min(255) as u8)
    }

    pub async fn get_ext_temp_async(&mut self, ch: Channel) -> Result<f32, Error<I2C::Error>> {
        let celsius = self.get_temp_celsius_async(ch).await?;
        let ext = self.read_reg_async(addr::temp_ext(ch)).await?;
        Ok(celsius as f32 + ext_temp_fraction(ext))
    }

    pub async fn get_alert_limit_async(&mut self, ch: Channel) -> Result<u8, Error<I2C::Error>> {
        let raw = self.read_reg_async(addr::alert_limit(ch)).await?;
        Ok(remove_correction(raw, self.sensor_correction(ch)))
    }

    pub async fn set_alert_limit_async(
        &mut self,
        ch: Channel,
        limit: u8,
    ) -> Result<(), Error<I2C::Error>> {
        let raw = apply_correction(limit, self.sensor_correction(ch));
        self.write_reg_async(addr::alert_limit(ch), raw).await
    }

    pub async fn get_ot_limit_async(&mut self, ch: Channel) -> Result<u8, Error<I2C::Error>> {
        let raw = self.read_reg_async(addr::ot_limit(ch)).await?;
        Ok(remove_correction(raw, self.sensor_correction(ch)))
    }

    pub async fn set_ot_limit_async(
        &mut self,
        ch: Channel,
        limit: u8,
    ) -> Result<(), Error<I2C::Error>> {
        let raw = apply_correction(limit, self.sensor_correction(ch));
        self.write_reg_async(addr::ot_limit(ch), raw).await
    }

    pub async fn get_therm_limit_async(&mut self, ch: Channel) -> Result<u8, Error<I2C::Error>> {
        let raw = self.read_reg_async(addr::therm_limit(ch)).await?;
        Ok(remove_correction(raw, self.sensor_correction(ch)))
    }

    pub async fn set_therm_limit_async(
        &mut self,
        ch: Channel,
        limit: u8,
    ) -> Result<(), Error<I2C::Error>> {
        let raw = apply_correction(limit, self.sensor_correction(ch));
        self.write_reg_async(addr::therm_limit(ch), raw).await
    }

    pub async fn get_fan_start_temp_async(&mut self, ch: Channel) -> Result<u8, Error<I2C::Error>> {
        let raw = self.read_reg_async(addr::fan_start_temp(ch)).await?;
        Ok(remove_correction(raw, self.sensor_correction(ch)))
    }

    pub async fn set_fan_start_temp_async(
        &mut self,
        ch: Channel,
        temp: u8,
    ) -> Result<(), Error<I2C::Error>> {
        let raw = apply_correction(temp, self.sensor_correction(ch));
        self.write_reg_async(addr::fan_start_temp(ch), raw).await
    }

    pub async fn get_tach_count_async(&mut self, ch: Channel) -> Result<u8, Error<I2C::Error>> {
        self.read_reg_async(addr::tach_count(ch)).await
    }

    pub async fn set_tach_count_async(
        &mut self,
        ch: Channel,
        count: u8,
    ) -> Result<(), Error<I2C::Error>> {
        self.write_reg_async(addr::tach_count(ch), count).await
    }

    pub async fn get_target_tach_async(&mut self, ch: Channel) -> Result<u8, Error<I2C::Error>> {
        self.read_reg_async(addr::target_tach(ch)).await
    }

    pub async fn set_target_tach_async(
        &mut self,
        ch: Channel,
        count: u8,
    ) -> Result<(), Error<I2C::Error>> {
        self.write_reg_async(addr::target_tach(ch), count).await
    }

    pub async fn get_ppr_async(&mut self, ch: Channel) -> Result<PulsesPerRev, Error<I2C::Error>> {
        let raw = self.read_reg_async(addr::ppr_min_tach(ch)).await?;
        Ok(PulsesPerRev::from_code(
            (raw & fields::PPR_MASK) >> fields::PPR_SHIFT,
        ))
    }

    pub async fn set_ppr_async(
        &mut self,
        ch: Channel,
        ppr: PulsesPerRev,
    ) -> Result<(), Error<I2C::Error>> {
        self.update_reg_async(
            addr::ppr_min_tach(ch),
            fields::PPR_MASK,
            ppr.code() << fields::PPR_SHIFT,
        )
        .await
    }

    pub async fn get_min_tach_count_async(&mut self, ch: Channel) -> Result<u8, Error<I2C::Error>> {
        let raw = self.read_reg_async(addr::ppr_min_tach(ch)).await?;
        Ok(raw & fields::MIN_TACH_MASK)
    }

    pub async fn set_min_tach_count_async(
        &mut self,
        ch: Channel,
        count: u8,
    ) -> Result<(), Error<I2C::Error>> {
        self.update_reg_async(addr::ppr_min_tach(ch), fields::MIN_TACH_MASK, count)
            .await
    }

    pub async fn get_duty_async(&mut self, ch: Channel) -> Result<u8, Error<I2C::Error>> {
        self.read_reg_async(addr::target_duty(ch)).await
    }

    pub async fn set_duty_async(&mut self, ch: Channel, duty: u8) -> Result<(), Error<I2C::Error>> {
        self.write_reg_async(addr::target_duty(ch), duty).await
    }

    pub async fn get_duty_percent_async(&mut self, ch: Channel) -> Result<u8, Error<I2C::Error>> {
        let duty = self.get_duty_async(ch).await?;
        Ok(duty_to_percent(duty))
    }

    pub async fn set_duty_percent_async(
        &mut self,
        ch: Channel,
        percent: u8,
    ) -> Result<(), Error<I2C::Error>> {
        self.set_duty_async(ch, percent_to_duty(percent)).await
    }

    pub async fn get_fan_rpm_async(&mut self, ch: Channel) -> Result<u16, Error<I2C::Error>> {
        let count = self.get_tach_count_async(ch).await?;
        let ppr = self.get_ppr_async(ch).await?;
        let range = self.get_rpm_range_async(ch).await?;
        Ok(tach_count_to_rpm(count, ppr.pulses(), range.frequency_hz()))
    }

    pub async fn get_rpm_range_async(&mut self, ch: Channel) -> Result<RpmRange, Error<I2C::Error>> {
        let raw = self.read_reg_async(addr::fan_config1(ch)).await?;
        Ok(RpmRange::from_code(raw & fields::RPM_RANGE_MASK))
    }

    pub async fn set_rpm_range_async(
        &mut self,
        ch: Channel,
        range: RpmRange,
    ) -> Result<(), Error<I2C::Error>> {
        self.update_reg_async(addr::fan_config1(ch), fields::RPM_RANGE_MASK, range.code())
            .await
    }

    pub async fn get_pwm_frequency_async(
        &mut self,
        ch: Channel,
    ) -> Result<PwmFrequency, Error<I2C::Error>> {
        let config = self.get_config_async().await?;
        let code = self.read_reg_async(addr::fan_config3(ch)).await? & fields::PWM_FREQ_CODE_MASK;
        Ok(PwmFrequency::from_parts(
            config.contains(GlobalConfig::PWM_FREQ_HIGH),
            code,
        ))
    }

    pub async fn set_pwm_frequency_async(
        &mut self,
        ch: Channel,
        freq: PwmFrequency,
    ) -> Result<(), Error<I2C::Error>> {
        let (high_band, code) = freq.parts();
        let band = if high_band {
            GlobalConfig::PWM_FREQ_HIGH.bits()
        } else {
            0
        };
        self.update_reg_async(addr::GLOBAL_CONFIG, GlobalConfig::PWM_FREQ_HIGH.bits(), band)
            .await?;
        self.update_reg_async(addr::fan_config3(ch), fields::PWM_FREQ_CODE_MASK, code)
            .await
    }

    pub async fn set_fan_spinup_async(
        &mut self,
        ch: Channel,
        enabled: bool,
    ) -> Result<(), Error<I2C::Error>> {
        let mask = FanConfig3::SPINUP_DISABLE.bits();
        self.update_reg_async(addr::fan_config3(ch), mask, if enabled { 0 } else { mask })
            .await
    }

    pub async fn set_therm_full_speed_async(
        &mut self,
        ch: Channel,
        enabled: bool,
    ) -> Result<(), Error<I2C::Error>> {
        let mask = FanConfig3::THERM_FULL_SPEED.bits();
        self.update_reg_async(addr::fan_config3(ch), mask, if enabled { mask } else { 0 })
            .await
    }

    pub async fn set_pulse_stretch_async(
        &mut self,
        ch: Channel,
        enabled: bool,
    ) -> Result<(), Error<I2C::Error>> {
        let mask = FanConfig3::PULSE_STRETCH_DISABLE.bits();
        self.update_reg_async(addr::fan_config3(ch), mask, if enabled { 0 } else { mask })
            .await
    }

    pub async fn set_pwm_polarity_async(
        &mut self,
        ch: Channel,
        polarity: PwmPolarity,
    ) -> Result<(), Error<I2C::Error>> {
        let mask = FanConfig2a::POLARITY_HIGH.bits();
        let value = match polarity {
            PwmPolarity::ActiveHigh => mask,
            PwmPolarity::ActiveLow => 0,
        };
        self.update_reg_async(addr::fan_config2a(ch), mask, value).await
    }

    pub async fn set_control_mode_async(
        &mut self,
        ch: Channel,
        mode: ControlMode,
    ) -> Result<(), Error<I2C::Error>> {
        let mask = FanConfig1::PWM_MODE.bits();
        let value = match mode {
            ControlMode::Pwm => mask,
            ControlMode::Rpm => 0,
        };
        self.update_reg_async(addr::fan_config1(ch), mask, value).await
    }

    pub async fn set_fan_auto_rpm_async(
        &mut self,
        ch: Channel,
        select: TachSelect,
    ) -> Result<(), Error<I2C::Error>> {
        let mask = FanConfig1::PWM_MODE.bits() | fields::TACH_SELECT_MASK;
        self.update_reg_async(addr::fan_config1(ch), mask, select.bits())
            .await
    }

    pub async fn set_fan_pwm_async(
        &mut self,
        ch: Channel,
        percent: u8,
    ) -> Result<(), Error<I2C::Error>> {
        let mask = FanConfig1::PWM_MODE.bits() | fields::TACH_SELECT_MASK;
        self.update_reg_async(
            addr::fan_config1(ch),
            mask,
            FanConfig1::PWM_MODE.bits(),
        )
        .await?;
        self.set_duty_percent_async(ch, percent).await
    }

    pub async fn set_fan_manual_rpm_async(
        &mut self,
        ch: Channel,
        target: u8,
    ) -> Result<(), Error<I2C::Error>> {
        let mask = FanConfig1::PWM_MODE.bits() | fields::TACH_SELECT_MASK;
        self.update_reg_async(addr::fan_config1(ch), mask, 0).await?;
        self.set_target_tach_async(ch, target).await
    }

    pub async fn set_fan_minimum_speed_async(
        &mut self,
        ch: Channel,
        enabled: bool,
        count: u8,
    ) -> Result<(), Error<I2C::Error>> {
        let mask = FanConfig2a::MIN_SPEED_EN.bits();
        self.update_reg_async(addr::fan_config2a(ch), mask, if enabled { mask } else { 0 })
            .await?;
        self.set_min_tach_count_async(ch, count).await
    }

    pub async fn get_rate_of_change_async(&mut self, ch: Channel) -> Result<u8, Error<I2C::Error>> {
        let raw = self.read_reg_async(addr::fan_config1(ch)).await?;
        Ok((raw & fields::RATE_OF_CHANGE_MASK) >> fields::RATE_OF_CHANGE_SHIFT)
    }

    pub async fn set_rate_of_change_async(
        &mut self,
        ch: Channel,
        code: u8,
    ) -> Result<(), Error<I2C::Error>> {
        self.update_reg_async(
            addr::fan_config1(ch),
            fields::RATE_OF_CHANGE_MASK,
            code << fields::RATE_OF_CHANGE_SHIFT,
        )
        .await
    }

    pub async fn get_rpm_step_a_async(&mut self, ch: Channel) -> Result<u8, Error<I2C::Error>> {
        let raw = self.read_reg_async(addr::fan_config2a(ch)).await?;
        Ok((raw & fields::RPM_STEP_A_MASK) >> fields::RPM_STEP_A_SHIFT)
    }

    pub async fn set_rpm_step_a_async(
        &mut self,
        ch: Channel,
        code: u8,
    ) -> Result<(), Error<I2C::Error>> {
        self.update_reg_async(
            addr::fan_config2a(ch),
            fields::RPM_STEP_A_MASK,
            code << fields::RPM_STEP_A_SHIFT,
        )
        .await
    }

    pub async fn get_temp_step_a_async(&mut self, ch: Channel) -> Result<TempStep, Error<I2C::Error>> {
        let raw = self.read_reg_async(addr::fan_config2a(ch)).await?;
        Ok(TempStep::from_code(
            (raw & fields::TEMP_STEP_A_MASK) >> fields::TEMP_STEP_A_SHIFT,
        ))
    }

    pub async fn set_temp_step_a_async(
        &mut self,
        ch: Channel,
        step: TempStep,
    ) -> Result<(), Error<I2C::Error>> {
        self.update_reg_async(
            addr::fan_config2a(ch),
            fields::TEMP_STEP_A_MASK,
            step.code() << fields::TEMP_STEP_A_SHIFT,
        )
        .await
    }

    pub async fn get_rpm_step_b_async(&mut self, ch: Channel) -> Result<u8, Error<I2C::Error>> {
        let raw = self.read_reg_async(addr::fan_config2b(ch)).await?;
        Ok((raw & fields::RPM_STEP_B_MASK) >> fields::RPM_STEP_B_SHIFT)
    }

    pub async fn set_rpm_step_b_async(
        &mut self,
        ch: Channel,
        code: u8,
    ) -> Result<(), Error<I2C::Error>> {
        self.update_reg_async(
            addr::fan_config2b(ch),
            fields::RPM_STEP_B_MASK,
            code << fields::RPM_STEP_B_SHIFT,
        )
        .await
    }

    pub async fn get_start_step_async(&mut self, ch: Channel) -> Result<u8, Error<I2C::Error>> {
        let raw = self.read_reg_async(addr::fan_config2b(ch)).await?;
        Ok(raw & fields::START_STEP_MASK)
    }

    pub async fn set_start_step_async(
        &mut self,
        ch: Channel,
        code: u8,
    ) -> Result<(), Error<I2C::Error>> {
        self.update_reg_async(addr::fan_config2b(ch), fields::START_STEP_MASK, code)
            .await
    }

    pub async fn set_run_async(&mut self, run: bool) -> Result<(), Error<I2C::Error>> {
        let mask = GlobalConfig::STANDBY.bits();
        self.update_reg_async(addr::GLOBAL_CONFIG, mask, if run { 0 } else { mask })
            .await
    }

    pub async fn is_running_async(&mut self) -> Result<bool, Error<I2C::Error>> {
        let config = self.get_config_async().await?;
        Ok(!config.contains(GlobalConfig::STANDBY))
    }

    pub async fn set_por_async(&mut self, reset: bool) -> Result<(), Error<I2C::Error>> {
        let mask = GlobalConfig::POR.bits();
        self.update_reg_async(addr::GLOBAL_CONFIG, mask, if reset { mask } else { 0 })
            .await
    }

    pub async fn set_channel2_source_async(
        &mut self,
        source: Channel2Source,
    ) -> Result<(), Error<I2C::Error>> {
        let mask = GlobalConfig::CH2_LOCAL.bits();
        let value = match source {
            Channel2Source::Local => mask,
            Channel2Source::Remote => 0,
        };
        self.update_reg_async(addr::GLOBAL_CONFIG, mask, value).await
    }
}
