use embedded_hal::i2c::{ErrorKind, NoAcknowledgeSource};
use embedded_hal_mock::eh1::delay::NoopDelay;
use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction as I2cTrans};

use max6639_rs::data_types::{Channel, PulsesPerRev, PwmFrequency};
use max6639_rs::registers::DEFAULT_I2C_ADDRESS;
use max6639_rs::{Error, Max6639};

const ADDR: u8 = DEFAULT_I2C_ADDRESS;

fn driver(expectations: &[I2cTrans]) -> Max6639<I2cMock, NoopDelay> {
    Max6639::new(I2cMock::new(expectations), NoopDelay::new())
}

fn finish(driver: Max6639<I2cMock, NoopDelay>) {
    let (mut i2c, _delay) = driver.free();
    i2c.done();
}

#[test]
fn duty_percent_writes_native_scale() {
    // 50 % -> 60/120 on channel 0, clamped 150 % -> 120 on channel 1.
    let expectations = [
        I2cTrans::write(ADDR, vec![0x26, 60]),
        I2cTrans::write(ADDR, vec![0x27, 120]),
    ];
    let mut dev = driver(&expectations);
    dev.set_duty_percent(Channel::Ch0, 50).unwrap();
    dev.set_duty_percent(Channel::Ch1, 150).unwrap();
    finish(dev);
}

#[test]
fn alert_limit_roundtrips_through_correction() {
    let expectations = [
        I2cTrans::write(ADDR, vec![0x08, 55]),
        I2cTrans::write_read(ADDR, vec![0x08], vec![55]),
    ];
    let mut dev = driver(&expectations);
    dev.set_sensor_correction(Channel::Ch0, 5);
    dev.set_alert_limit(Channel::Ch0, 50).unwrap();
    assert_eq!(dev.get_alert_limit(Channel::Ch0).unwrap(), 50);
    finish(dev);
}

#[test]
fn temp_read_applies_correction() {
    let expectations = [I2cTrans::write_read(ADDR, vec![0x01], vec![30])];
    let mut dev = driver(&expectations);
    dev.set_sensor_correction(Channel::Ch1, -3);
    assert_eq!(dev.get_temp_celsius(Channel::Ch1).unwrap(), 27);
    finish(dev);
}

#[test]
fn fahrenheit_scales_from_celsius() {
    let expectations = [I2cTrans::write_read(ADDR, vec![0x00], vec![100])];
    let mut dev = driver(&expectations);
    assert_eq!(dev.get_temp_fahrenheit(Channel::Ch0).unwrap(), 212);
    finish(dev);
}

#[test]
fn ext_temp_combines_integer_and_fraction() {
    let expectations = [
        I2cTrans::write_read(ADDR, vec![0x00], vec![25]),
        I2cTrans::write_read(ADDR, vec![0x05], vec![0xA0]),
    ];
    let mut dev = driver(&expectations);
    assert_eq!(dev.get_ext_temp(Channel::Ch0).unwrap(), 25.625);
    finish(dev);
}

#[test]
fn set_ppr_preserves_min_tach_field() {
    // Min tach count 0x2A must survive a PPR change.
    let expectations = [
        I2cTrans::write_read(ADDR, vec![0x24], vec![0x2A]),
        I2cTrans::write(ADDR, vec![0x24, 0xC0 | 0x2A]),
    ];
    let mut dev = driver(&expectations);
    dev.set_ppr(Channel::Ch0, PulsesPerRev::Four).unwrap();
    finish(dev);
}

#[test]
fn set_min_tach_preserves_ppr_field() {
    let expectations = [
        I2cTrans::write_read(ADDR, vec![0x25], vec![0x80 | 0x05]),
        I2cTrans::write(ADDR, vec![0x25, 0x80 | 0x3F]),
    ];
    let mut dev = driver(&expectations);
    // Count above 6 bits is masked to the field width.
    dev.set_min_tach_count(Channel::Ch1, 0xFF).unwrap();
    finish(dev);
}

#[test]
fn pwm_frequency_set_and_get() {
    let expectations = [
        // Band bit into global config (other bits preserved).
        I2cTrans::write_read(ADDR, vec![0x04], vec![0x30]),
        I2cTrans::write(ADDR, vec![0x04, 0x38]),
        // Code into fan config 3 of channel 1 (flag bits preserved).
        I2cTrans::write_read(ADDR, vec![0x17], vec![0x40]),
        I2cTrans::write(ADDR, vec![0x17, 0x43]),
        // Read-back recombines both registers.
        I2cTrans::write_read(ADDR, vec![0x04], vec![0x38]),
        I2cTrans::write_read(ADDR, vec![0x17], vec![0x43]),
    ];
    let mut dev = driver(&expectations);
    dev.set_pwm_frequency(Channel::Ch1, PwmFrequency::Hz25000)
        .unwrap();
    assert_eq!(
        dev.get_pwm_frequency(Channel::Ch1).unwrap(),
        PwmFrequency::Hz25000
    );
    finish(dev);
}

#[test]
fn run_state_follows_standby_bit() {
    let expectations = [
        // set_run(true) clears the standby bit.
        I2cTrans::write_read(ADDR, vec![0x04], vec![0xB0]),
        I2cTrans::write(ADDR, vec![0x04, 0x30]),
        I2cTrans::write_read(ADDR, vec![0x04], vec![0x30]),
        // set_run(false) sets it again.
        I2cTrans::write_read(ADDR, vec![0x04], vec![0x30]),
        I2cTrans::write(ADDR, vec![0x04, 0xB0]),
        I2cTrans::write_read(ADDR, vec![0x04], vec![0xB0]),
    ];
    let mut dev = driver(&expectations);
    dev.set_run(true).unwrap();
    assert!(dev.is_running().unwrap());
    dev.set_run(false).unwrap();
    assert!(!dev.is_running().unwrap());
    finish(dev);
}

#[test]
fn diode_fault_is_bit_zero_of_ext_register() {
    let expectations = [
        I2cTrans::write_read(ADDR, vec![0x06], vec![0x01]),
        I2cTrans::write_read(ADDR, vec![0x06], vec![0xA0]),
    ];
    let mut dev = driver(&expectations);
    assert!(dev.get_diode_fault(Channel::Ch1).unwrap());
    assert!(!dev.get_diode_fault(Channel::Ch1).unwrap());
    finish(dev);
}

#[test]
fn fan_rpm_combines_count_ppr_and_range() {
    let expectations = [
        I2cTrans::write_read(ADDR, vec![0x20], vec![135]),
        I2cTrans::write_read(ADDR, vec![0x24], vec![0x40]),
        I2cTrans::write_read(ADDR, vec![0x10], vec![0x01]),
    ];
    let mut dev = driver(&expectations);
    // 4 kHz range, 2 PPR, count 135 -> 4000 RPM.
    assert_eq!(dev.get_fan_rpm(Channel::Ch0).unwrap(), 4_000);
    finish(dev);
}

#[test]
fn stalled_fan_reports_zero_rpm() {
    let expectations = [
        I2cTrans::write_read(ADDR, vec![0x20], vec![255]),
        I2cTrans::write_read(ADDR, vec![0x24], vec![0x00]),
        I2cTrans::write_read(ADDR, vec![0x10], vec![0x03]),
    ];
    let mut dev = driver(&expectations);
    assert_eq!(dev.get_fan_rpm(Channel::Ch0).unwrap(), 0);
    finish(dev);
}

#[test]
fn minimum_speed_sets_enable_then_threshold() {
    let expectations = [
        I2cTrans::write_read(ADDR, vec![0x11], vec![0x02]),
        I2cTrans::write(ADDR, vec![0x11, 0x03]),
        I2cTrans::write_read(ADDR, vec![0x24], vec![0x40]),
        I2cTrans::write(ADDR, vec![0x24, 0x45]),
    ];
    let mut dev = driver(&expectations);
    dev.set_fan_minimum_speed(Channel::Ch0, true, 5).unwrap();
    finish(dev);
}

#[test]
fn read_times_out_after_retry_budget() {
    let nack = I2cTrans::write_read(ADDR, vec![0x02], vec![0])
        .with_error(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
    let expectations: Vec<I2cTrans> = (0..100).map(|_| nack.clone()).collect();
    let mut dev = driver(&expectations);
    assert_eq!(dev.get_status(), Err(Error::Timeout));
    finish(dev);
}

#[test]
fn non_nack_bus_fault_propagates_immediately() {
    let expectations =
        [I2cTrans::write_read(ADDR, vec![0x02], vec![0]).with_error(ErrorKind::ArbitrationLoss)];
    let mut dev = driver(&expectations);
    assert_eq!(dev.get_status(), Err(Error::I2c(ErrorKind::ArbitrationLoss)));
    finish(dev);
}

#[test]
fn read_recovers_before_the_retry_limit() {
    let nack = I2cTrans::write_read(ADDR, vec![0x3D], vec![0])
        .with_error(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
    let mut expectations: Vec<I2cTrans> = (0..3).map(|_| nack.clone()).collect();
    expectations.push(I2cTrans::write_read(ADDR, vec![0x3D], vec![0x58]));
    let mut dev = driver(&expectations);
    assert_eq!(dev.get_device_id().unwrap(), 0x58);
    finish(dev);
}
