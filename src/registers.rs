//! Register map, bit layouts and raw-value conversions for the MAX6639.
//! Addresses and field positions are taken from the datasheet register table.

use crate::data_types::Channel;

/// Default I2C address (ADD pin low).
pub const DEFAULT_I2C_ADDRESS: u8 = 0x2C;
/// Addresses selectable via the ADD pin strapping.
pub const CANDIDATE_ADDRESSES: [u8; 3] = [0x2C, 0x2E, 0x2F];

/// Attempts made by the read primitive before giving up. One attempt per
/// millisecond, so the worst-case blocking time is ~100 ms.
pub const READ_RETRY_LIMIT: u8 = 100;

/// Register addresses. Per-channel registers are address functions of the
/// channel; the rest are plain constants.
pub mod addr {
    use super::Channel;

    /// Temperature, whole degrees (0x00 ch0, 0x01 ch1).
    pub const fn temp(ch: Channel) -> u8 {
        0x00 + ch.index()
    }
    pub const STATUS: u8 = 0x02;
    pub const OUTPUT_MASK: u8 = 0x03;
    pub const GLOBAL_CONFIG: u8 = 0x04;
    /// Extended temperature: fractional bits 7..5, diode fault bit 0.
    pub const fn temp_ext(ch: Channel) -> u8 {
        0x05 + ch.index()
    }
    pub const fn alert_limit(ch: Channel) -> u8 {
        0x08 + ch.index()
    }
    pub const fn ot_limit(ch: Channel) -> u8 {
        0x0A + ch.index()
    }
    pub const fn therm_limit(ch: Channel) -> u8 {
        0x0C + ch.index()
    }
    pub const fn fan_config1(ch: Channel) -> u8 {
        0x10 + ch.index() * 4
    }
    pub const fn fan_config2a(ch: Channel) -> u8 {
        0x11 + ch.index() * 4
    }
    pub const fn fan_config2b(ch: Channel) -> u8 {
        0x12 + ch.index() * 4
    }
    pub const fn fan_config3(ch: Channel) -> u8 {
        0x13 + ch.index() * 4
    }
    pub const fn tach_count(ch: Channel) -> u8 {
        0x20 + ch.index()
    }
    pub const fn target_tach(ch: Channel) -> u8 {
        0x22 + ch.index()
    }
    /// PPR code (bits 7..6) and minimum tach count (bits 5..0) share this byte.
    pub const fn ppr_min_tach(ch: Channel) -> u8 {
        0x24 + ch.index()
    }
    pub const fn target_duty(ch: Channel) -> u8 {
        0x26 + ch.index()
    }
    pub const fn fan_start_temp(ch: Channel) -> u8 {
        0x28 + ch.index()
    }
    pub const DEVICE_ID: u8 = 0x3D;
    pub const MANUFACTURER_ID: u8 = 0x3E;
    pub const DEVICE_REVISION: u8 = 0x3F;
}

bitflags::bitflags! {
    /// Global configuration register bits (0x04).
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct GlobalConfig: u8 {
        /// Bit 7: standby (1 = monitoring and fan control suspended).
        const STANDBY         = 1 << 7;
        /// Bit 6: power-on reset.
        const POR             = 1 << 6;
        /// Bit 5: disable the SMBus timeout.
        const DISABLE_TIMEOUT = 1 << 5;
        /// Bit 4: channel-2 temperature source (1 = local diode).
        const CH2_LOCAL       = 1 << 4;
        /// Bit 3: PWM frequency band (1 = high-frequency range).
        const PWM_FREQ_HIGH   = 1 << 3;
    }

    /// Fan configuration 1 flag bits (0x10/0x14). The rate-of-change,
    /// tach-select and RPM-range multi-bit fields live in [`fields`].
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct FanConfig1: u8 {
        /// Bit 7: PWM duty-cycle mode (0 = closed-loop RPM mode).
        const PWM_MODE = 1 << 7;
    }

    /// Fan configuration 2a flag bits (0x11/0x15).
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct FanConfig2a: u8 {
        /// Bit 1: PWM output polarity (1 = active high).
        const POLARITY_HIGH = 1 << 1;
        /// Bit 0: minimum-speed (tach threshold) enforcement enable.
        const MIN_SPEED_EN  = 1 << 0;
    }

    /// Fan configuration 3 flag bits (0x13/0x17).
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct FanConfig3: u8 {
        /// Bit 7: suppress the spin-up sequence.
        const SPINUP_DISABLE        = 1 << 7;
        /// Bit 6: force full speed while THERM is asserted.
        const THERM_FULL_SPEED      = 1 << 6;
        /// Bit 5: disable tach pulse stretching.
        const PULSE_STRETCH_DISABLE = 1 << 5;
    }
}

/// Masks and shifts for the multi-bit sub-fields packed into shared registers.
pub mod fields {
    /// Fan config 1 bits 6..4: duty-cycle rate of change.
    pub const RATE_OF_CHANGE_MASK: u8 = 0x70;
    pub const RATE_OF_CHANGE_SHIFT: u8 = 4;
    /// Fan config 1 bits 3..2: temperature channel driving auto-RPM.
    pub const TACH_SELECT_MASK: u8 = 0x0C;
    /// Fan config 1 bits 1..0: tach range code.
    pub const RPM_RANGE_MASK: u8 = 0x03;

    /// Fan config 2a bits 6..4: RPM step size A.
    pub const RPM_STEP_A_MASK: u8 = 0x70;
    pub const RPM_STEP_A_SHIFT: u8 = 4;
    /// Fan config 2a bits 3..2: temperature step size A.
    pub const TEMP_STEP_A_MASK: u8 = 0x0C;
    pub const TEMP_STEP_A_SHIFT: u8 = 2;

    /// Fan config 2b bits 7..4: RPM step size B.
    pub const RPM_STEP_B_MASK: u8 = 0xF0;
    pub const RPM_STEP_B_SHIFT: u8 = 4;
    /// Fan config 2b bits 3..0: start step.
    pub const START_STEP_MASK: u8 = 0x0F;

    /// Fan config 3 bits 1..0: PWM frequency code within the band.
    pub const PWM_FREQ_CODE_MASK: u8 = 0x03;

    /// PPR/min-tach byte, bits 7..6: pulses-per-revolution code.
    pub const PPR_MASK: u8 = 0xC0;
    pub const PPR_SHIFT: u8 = 6;
    /// PPR/min-tach byte, bits 5..0: minimum tach count.
    pub const MIN_TACH_MASK: u8 = 0x3F;

    /// Extended temperature register, bit 0: diode fault.
    pub const DIODE_FAULT: u8 = 0x01;
}

/// Startup configuration applied by `init_defaults`.
pub mod defaults {
    pub const THERM_LIMIT_C: u8 = 40;
    pub const ALERT_LIMIT_C: u8 = 50;
    pub const OT_LIMIT_C: u8 = 60;
    pub const FAN_START_TEMP_C: u8 = 35;
    pub const MIN_TACH_COUNT: u8 = 5;
    /// Rate-of-change code written together with the RPM range.
    pub const RATE_OF_CHANGE: u8 = 0x07;
    pub const POR_SETTLE_MS: u32 = 100;
}

/// Full-scale value of the target duty register (chip native scale).
pub const DUTY_FULL_SCALE: u8 = 120;

/// Convert a 0..=100 percentage to the native duty scale. Inputs above 100
/// are clamped before scaling.
pub fn percent_to_duty(percent: u8) -> u8 {
    (percent.min(100) as u16 * DUTY_FULL_SCALE as u16 / 100) as u8
}

/// Convert a native duty value back to a percentage (truncating).
pub fn duty_to_percent(duty: u8) -> u8 {
    (duty as u16 * 100 / DUTY_FULL_SCALE as u16) as u8
}

/// Derive fan speed from a raw tach count. A count of 255 is the chip's
/// stalled/no-signal sentinel and always yields 0 rather than a rounded
/// near-zero value.
pub fn tach_count_to_rpm(count: u8, ppr: u8, range_hz: u16) -> u16 {
    if count == 255 || ppr == 0 {
        return 0;
    }
    (range_hz as u32 * (255 - count) as u32 / ppr as u32 / 60) as u16
}

/// Decode the fractional addend from an extended-temperature byte. Bits 7,
/// 6 and 5 are independent 0.5/0.25/0.125 degree flags, not a binary field.
pub fn ext_temp_fraction(raw: u8) -> f32 {
    let mut frac = 0.0;
    if raw & 0x80 != 0 {
        frac += 0.5;
    }
    if raw & 0x40 != 0 {
        frac += 0.25;
    }
    if raw & 0x20 != 0 {
        frac += 0.125;
    }
    frac
}

/// Apply a channel correction to a value headed for the wire (or read back
/// as a measurement). Wrapping arithmetic keeps get/set round-trips exact
/// for every offset.
pub fn apply_correction(raw: u8, correction: i8) -> u8 {
    raw.wrapping_add_signed(correction)
}

/// Inverse of [`apply_correction`].
pub fn remove_correction(raw: u8, correction: i8) -> u8 {
    raw.wrapping_sub(correction as u8)
}
