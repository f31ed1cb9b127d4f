use max6639_rs::data_types::{PulsesPerRev, PwmFrequency, RpmRange};
use max6639_rs::registers::{
    apply_correction, duty_to_percent, ext_temp_fraction, percent_to_duty, remove_correction,
    tach_count_to_rpm, DUTY_FULL_SCALE,
};

#[test]
fn duty_percent_roundtrip_within_one() {
    for p in 0..=100u8 {
        let back = duty_to_percent(percent_to_duty(p));
        assert!(
            (back as i16 - p as i16).abs() <= 1,
            "percent {} came back as {}",
            p,
            back
        );
    }
}

#[test]
fn duty_percent_clamps_above_100() {
    assert_eq!(percent_to_duty(101), DUTY_FULL_SCALE);
    assert_eq!(percent_to_duty(255), DUTY_FULL_SCALE);
    assert_eq!(percent_to_duty(100), DUTY_FULL_SCALE);
}

#[test]
fn duty_uses_120_full_scale() {
    assert_eq!(percent_to_duty(50), 60);
    assert_eq!(duty_to_percent(120), 100);
    assert_eq!(duty_to_percent(60), 50);
}

#[test]
fn stalled_tach_always_reads_zero_rpm() {
    for ppr in [
        PulsesPerRev::One,
        PulsesPerRev::Two,
        PulsesPerRev::Three,
        PulsesPerRev::Four,
    ] {
        for range in [
            RpmRange::Rpm2000,
            RpmRange::Rpm4000,
            RpmRange::Rpm8000,
            RpmRange::Rpm16000,
        ] {
            assert_eq!(
                tach_count_to_rpm(255, ppr.pulses(), range.frequency_hz()),
                0
            );
        }
    }
}

#[test]
fn rpm_derivation_mid_range() {
    // 4 kHz range, 2 pulses per rev, count 135: 4000 * 120 / 2 / 60.
    assert_eq!(tach_count_to_rpm(135, 2, 4_000), 4_000);
    // Count 254 still produces a value instead of the sentinel zero.
    assert!(tach_count_to_rpm(254, 2, 2_000) > 0);
}

#[test]
fn ext_temp_fraction_bits_are_additive() {
    assert_eq!(ext_temp_fraction(0x00), 0.0);
    assert_eq!(ext_temp_fraction(0x80), 0.5);
    assert_eq!(ext_temp_fraction(0x40), 0.25);
    assert_eq!(ext_temp_fraction(0x20), 0.125);
    // Bits 7 and 5 set: 0.5 + 0.125.
    assert_eq!(ext_temp_fraction(0xA0), 0.625);
    assert_eq!(ext_temp_fraction(0xE0), 0.875);
    // Low bits (diode fault etc.) do not contribute.
    assert_eq!(ext_temp_fraction(0x1F), 0.0);
}

#[test]
fn correction_roundtrips_for_every_offset() {
    for k in i8::MIN..=i8::MAX {
        for v in [0u8, 1, 40, 127, 128, 200, 255] {
            assert_eq!(remove_correction(apply_correction(v, k), k), v);
        }
    }
}

#[test]
fn pwm_frequency_table_is_exact() {
    let table = [
        (PwmFrequency::Hz20, false, 0b00, 20.0),
        (PwmFrequency::Hz33_33, false, 0b01, 33.33),
        (PwmFrequency::Hz50, false, 0b10, 50.0),
        (PwmFrequency::Hz100, false, 0b11, 100.0),
        (PwmFrequency::Hz5000, true, 0b00, 5_000.0),
        (PwmFrequency::Hz8330, true, 0b01, 8_330.0),
        (PwmFrequency::Hz12500, true, 0b10, 12_500.0),
        (PwmFrequency::Hz25000, true, 0b11, 25_000.0),
    ];
    for (freq, high_band, code, hz) in table {
        assert_eq!(freq.parts(), (high_band, code));
        assert_eq!(PwmFrequency::from_parts(high_band, code), freq);
        assert_eq!(freq.hz(), hz);
    }
}

#[test]
fn rpm_range_table() {
    assert_eq!(RpmRange::Rpm2000.frequency_hz(), 2_000);
    assert_eq!(RpmRange::Rpm4000.frequency_hz(), 4_000);
    assert_eq!(RpmRange::Rpm8000.frequency_hz(), 8_000);
    assert_eq!(RpmRange::Rpm16000.frequency_hz(), 16_000);
    for code in 0..4u8 {
        assert_eq!(RpmRange::from_code(code).code(), code);
    }
}

#[test]
fn ppr_codes_roundtrip() {
    for code in 0..4u8 {
        let ppr = PulsesPerRev::from_code(code);
        assert_eq!(ppr.code(), code);
        assert_eq!(ppr.pulses(), code + 1);
    }
}
