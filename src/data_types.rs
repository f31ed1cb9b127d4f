//! Typed values for the MAX6639 driver: channels, strapped addresses and the
//! fixed code tables the chip exposes through 2-bit register fields.

/// One of the two fan/temperature lanes on the chip.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Channel {
    Ch0,
    Ch1,
}

impl Channel {
    /// Register-address offset of this channel.
    pub const fn index(self) -> u8 {
        match self {
            Channel::Ch0 => 0,
            Channel::Ch1 => 1,
        }
    }

    /// Both channels, in register order.
    pub const BOTH: [Channel; 2] = [Channel::Ch0, Channel::Ch1];
}

/// I2C addresses selectable with the ADD pin.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Address {
    Addr0x2C,
    Addr0x2E,
    Addr0x2F,
}

impl Address {
    pub const fn value(self) -> u8 {
        match self {
            Address::Addr0x2C => 0x2C,
            Address::Addr0x2E => 0x2E,
            Address::Addr0x2F => 0x2F,
        }
    }
}

/// Tachometer pulses per fan revolution (PPR field, 2 bits).
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PulsesPerRev {
    One,
    Two,
    Three,
    Four,
}

impl PulsesPerRev {
    /// Field code as stored in bits 7..6 of the PPR/min-tach byte.
    pub const fn code(self) -> u8 {
        match self {
            PulsesPerRev::One => 0b00,
            PulsesPerRev::Two => 0b01,
            PulsesPerRev::Three => 0b10,
            PulsesPerRev::Four => 0b11,
        }
    }

    /// Pulse count used in the RPM derivation.
    pub const fn pulses(self) -> u8 {
        self.code() + 1
    }

    pub const fn from_code(code: u8) -> Self {
        match code & 0b11 {
            0b00 => PulsesPerRev::One,
            0b01 => PulsesPerRev::Two,
            0b10 => PulsesPerRev::Three,
            _ => PulsesPerRev::Four,
        }
    }
}

/// Full-scale tach range selection (fan config 1 bits 1..0). The selected
/// range doubles as the clock frequency in the RPM derivation.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RpmRange {
    Rpm2000,
    Rpm4000,
    Rpm8000,
    Rpm16000,
}

impl RpmRange {
    pub const fn code(self) -> u8 {
        match self {
            RpmRange::Rpm2000 => 0b00,
            RpmRange::Rpm4000 => 0b01,
            RpmRange::Rpm8000 => 0b10,
            RpmRange::Rpm16000 => 0b11,
        }
    }

    /// Tach clock frequency for this range, in Hz.
    pub const fn frequency_hz(self) -> u16 {
        match self {
            RpmRange::Rpm2000 => 2_000,
            RpmRange::Rpm4000 => 4_000,
            RpmRange::Rpm8000 => 8_000,
            RpmRange::Rpm16000 => 16_000,
        }
    }

    pub const fn from_code(code: u8) -> Self {
        match code & 0b11 {
            0b00 => RpmRange::Rpm2000,
            0b01 => RpmRange::Rpm4000,
            0b10 => RpmRange::Rpm8000,
            _ => RpmRange::Rpm16000,
        }
    }
}

/// PWM output frequency. The band bit lives in the global config register,
/// the 2-bit code in the per-channel fan config 3 register; together they
/// select one of eight fixed frequencies.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PwmFrequency {
    Hz20,
    Hz33_33,
    Hz50,
    Hz100,
    Hz5000,
    Hz8330,
    Hz12500,
    Hz25000,
}

impl PwmFrequency {
    /// (high-band bit, 2-bit code) as stored on the chip.
    pub const fn parts(self) -> (bool, u8) {
        match self {
            PwmFrequency::Hz20 => (false, 0b00),
            PwmFrequency::Hz33_33 => (false, 0b01),
            PwmFrequency::Hz50 => (false, 0b10),
            PwmFrequency::Hz100 => (false, 0b11),
            PwmFrequency::Hz5000 => (true, 0b00),
            PwmFrequency::Hz8330 => (true, 0b01),
            PwmFrequency::Hz12500 => (true, 0b10),
            PwmFrequency::Hz25000 => (true, 0b11),
        }
    }

    pub const fn from_parts(high_band: bool, code: u8) -> Self {
        match (high_band, code & 0b11) {
            (false, 0b00) => PwmFrequency::Hz20,
            (false, 0b01) => PwmFrequency::Hz33_33,
            (false, 0b10) => PwmFrequency::Hz50,
            (false, _) => PwmFrequency::Hz100,
            (true, 0b00) => PwmFrequency::Hz5000,
            (true, 0b01) => PwmFrequency::Hz8330,
            (true, 0b10) => PwmFrequency::Hz12500,
            (true, _) => PwmFrequency::Hz25000,
        }
    }

    /// Nominal output frequency in Hz.
    pub fn hz(self) -> f32 {
        match self {
            PwmFrequency::Hz20 => 20.0,
            PwmFrequency::Hz33_33 => 33.33,
            PwmFrequency::Hz50 => 50.0,
            PwmFrequency::Hz100 => 100.0,
            PwmFrequency::Hz5000 => 5_000.0,
            PwmFrequency::Hz8330 => 8_330.0,
            PwmFrequency::Hz12500 => 12_500.0,
            PwmFrequency::Hz25000 => 25_000.0,
        }
    }
}

/// Temperature channel driving a fan's closed-loop RPM control
/// (fan config 1 bits 3..2).
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TachSelect {
    /// Auto-RPM disabled for this fan.
    Off,
    /// Track the channel-0 temperature.
    Temp0,
    /// Track the channel-1 temperature.
    Temp1,
}

impl TachSelect {
    /// Field bits within fan config 1 (not a packed binary code).
    pub const fn bits(self) -> u8 {
        match self {
            TachSelect::Off => 0x00,
            TachSelect::Temp0 => 0x08,
            TachSelect::Temp1 => 0x04,
        }
    }
}

/// PWM output polarity (fan config 2a bit 1).
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PwmPolarity {
    ActiveLow,
    ActiveHigh,
}

/// Fan drive mode (fan config 1 bit 7).
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ControlMode {
    /// Closed-loop: chip adjusts duty to hit the target tach count.
    Rpm,
    /// Open-loop: duty register drives the output directly.
    Pwm,
}

/// Channel-2 temperature source (global config bit 4).
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Channel2Source {
    /// Remote diode input.
    Remote,
    /// Internal (local) sensor.
    Local,
}

/// Temperature step size A (fan config 2a bits 3..2), in degrees Celsius.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TempStep {
    C1,
    C2,
    C4,
    C8,
}

impl TempStep {
    pub const fn code(self) -> u8 {
        match self {
            TempStep::C1 => 0b00,
            TempStep::C2 => 0b01,
            TempStep::C4 => 0b10,
            TempStep::C8 => 0b11,
        }
    }

    pub const fn from_code(code: u8) -> Self {
        match code & 0b11 {
            0b00 => TempStep::C1,
            0b01 => TempStep::C2,
            0b10 => TempStep::C4,
            _ => TempStep::C8,
        }
    }
}
