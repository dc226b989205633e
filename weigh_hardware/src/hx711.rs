//! HX711 24-bit load-cell ADC on Raspberry Pi GPIO.
//!
//! Channel 0 is input A at gain 128, channel 1 is input B at gain 32. The
//! gain pulses clocked after each read select the *next* conversion, so a
//! channel switch throws away one conversion.
use std::time::Duration;

use rppal::gpio::{Gpio, InputPin, OutputPin};
use tracing::{trace, warn};
use weigh_traits::{BoxError, SampleSource};

use crate::error::{HwError, Result};
use crate::util::{is_saturated, normalize, sign_extend_24, wait_until_low_with_timeout};

const DATA_BITS: u8 = 24;

fn gain_pulses(channel: u8) -> Result<u8> {
    match channel {
        0 => Ok(1),
        1 => Ok(2),
        other => Err(HwError::NoChannel(other)),
    }
}

pub struct Hx711 {
    dt: InputPin,
    sck: OutputPin,
    selected: u8,
    shift: u8,
    timeout: Duration,
}

impl Hx711 {
    /// Claim the data and clock pins. `shift` drops noise bits from each
    /// 24-bit conversion before it leaves the driver.
    pub fn open(dt_pin: u8, sck_pin: u8, shift: u8, timeout: Duration) -> Result<Self> {
        let gpio = Gpio::new().map_err(|e| HwError::Gpio(e.to_string()))?;
        let dt = gpio
            .get(dt_pin)
            .map_err(|e| HwError::Gpio(e.to_string()))?
            .into_input();
        let mut sck = gpio
            .get(sck_pin)
            .map_err(|e| HwError::Gpio(e.to_string()))?
            .into_output();
        sck.set_low();
        Ok(Self {
            dt,
            sck,
            selected: 0,
            shift,
            timeout,
        })
    }

    fn pulse(&mut self) {
        self.sck.set_high();
        std::hint::spin_loop();
        self.sck.set_low();
        std::hint::spin_loop();
    }

    /// Clock out one conversion and program the following one for `next`.
    fn convert(&mut self, next: u8) -> Result<i32> {
        let dt = &self.dt;
        wait_until_low_with_timeout(|| dt.is_high(), self.timeout, Duration::from_micros(200))?;

        let mut word: u32 = 0;
        for _ in 0..DATA_BITS {
            self.sck.set_high();
            std::hint::spin_loop();
            word = (word << 1) | u32::from(self.dt.is_high());
            self.sck.set_low();
            std::hint::spin_loop();
        }
        for _ in 0..gain_pulses(next)? {
            self.pulse();
        }
        self.selected = next;
        Ok(sign_extend_24(word))
    }

    pub fn read(&mut self, channel: u8) -> Result<i32> {
        if channel != self.selected {
            trace!(from = self.selected, to = channel, "hx711 channel switch");
            self.convert(channel)?;
        }
        let raw = self.convert(channel)?;
        if is_saturated(raw) {
            warn!(raw, channel, "hx711 saturated");
            return Err(HwError::Saturated(raw));
        }
        trace!(raw, channel, "hx711 conversion");
        Ok(normalize(raw, self.shift))
    }
}

impl SampleSource for Hx711 {
    fn read_channel(&mut self, channel: u8) -> std::result::Result<i32, BoxError> {
        Ok(self.read(channel)?)
    }

    fn channels(&self) -> u8 {
        2
    }
}
