//! Error definitions for the MAX6639 driver.

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, PartialEq, Eq)]
pub enum Error<I2cError> {
    /// Underlying I2C transaction failed.
    I2c(I2cError),
    /// Device did not acknowledge within the bounded retry window (~100 ms).
    Timeout,
}

impl<I2cError: core::fmt::Debug> core::fmt::Display for Error<I2cError> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::I2c(e) => write!(f, "I2C error: {:?}", e),
            Error::Timeout => write!(f, "device did not respond before the retry limit"),
        }
    }
}
