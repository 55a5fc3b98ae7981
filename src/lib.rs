#![no_std]
//! # `ad9833` - Embedded driver for the AD9833 DDS waveform generator
//!
//! The AD9833 is a low power DDS waveform generator sold by Analog Devices. Check the [datasheet](https://www.analog.com/media/en/technical-documentation/data-sheets/AD9833.pdf) for general information about it.
//!
//! This crate implements an interface for embedded devices to control such an AD9833 chip.
//!
//! The driver needs an SPI bus implementing [`embedded_hal::blocking::spi::Write<u8>`] and one digital output pin
//! for FSYNC implementing [`embedded_hal::digital::v2::OutputPin`]. Configure the bus with [`MODE`].
//!
//! ## Usage example
//!
//! This example uses the [`stm32g4xx-hal`](https://github.com/stm32-rs/stm32g4xx-hal). The `ad9833` library is not device specific though, so
//! it should be easy to adapt the example to other devices.
//!
//! ```ignore
//! #[entry]
//! fn main() -> ! {
//!     let dp = stm32::Peripherals::take().unwrap();
//!     let mut rcc = dp.RCC.constrain();
//!     let gpiob = dp.GPIOB.split(&mut rcc);
//!     let gpioc = dp.GPIOC.split(&mut rcc);
//!
//!     let sclk = gpiob.pb13.into_alternate();
//!     let mosi = gpiob.pb15.into_alternate();
//!     let spi = dp.SPI2.spi((sclk, NoMiso, mosi), ad9833::MODE, 1.MHz(), &mut rcc);
//!     let fsync = gpioc.pc6.into_push_pull_output(); // Connect PC6 to FSYNC (AD9833)
//!
//!     // Reset the device, program 1 kHz at 0 degrees, then release reset
//!     let mut ad9833 = ad9833::Ad9833::new(spi, fsync)
//!         .initialize_with(1_000, 0)
//!         .unwrap();
//!
//!     // Retune to 42 kHz
//!     ad9833.set_frequency(42_000).unwrap();
//!     loop {}
//! }
//! ```
//!
//! ## Supported features
//!
//! - [x] Reset the device
//! - [x] Program FREQ0 / FREQ1 in 28-bit mode
//! - [x] Program PHASE0 / PHASE1
//! - [x] Select sine, triangle and square output
//! - [x] Sleep (MCLK and/or DAC power down)
//! - [ ] 14-bit half register writes (HLB mode)
//!
//! ## Diagnostics
//!
//! Requested values, computed register words and every transmitted frame are reported through the
//! [`log`](https://docs.rs/log) facade (`debug` and `trace` levels). Install whatever logger your
//! firmware already uses (USB-CDC, RTT, UART) to see them; without a logger this costs nothing.
//!
//! ## A note about the frequency register
//!
//! The AD9833 has no readback path. The driver cannot know what the device currently holds, and
//! it cannot detect a failed transfer: the bus error is returned, but the register state of the
//! device is undefined from then on. Call [`reset`](Ad9833::reset) to bring it back to a known state.
//!
//! Frequency updates do not assert RESET. In 28-bit mode the device latches the new tuning word
//! after the second half has been written, so the output glides to the new frequency without a
//! glitch to midscale.

use core::marker::PhantomData;
use embedded_hal::blocking::spi::Write;
use embedded_hal::digital::v2::OutputPin;
use embedded_hal::spi::{self, Phase, Polarity};

/// Default frequency of the master clock connected to the AD9833.
pub const DEFAULT_MCLK_FREQUENCY: u32 = 25_000_000;

/// SPI mode required by the AD9833 (CPOL = 1, CPHA = 0).
pub const MODE: spi::Mode = spi::Mode {
    polarity: Polarity::IdleHigh,
    phase: Phase::CaptureOnFirstTransition,
};

/// Bits of the 16-bit control register and register-select headers.
pub mod control {
    /// Header of a FREQ0 write.
    pub const FREQ0: u16 = 0x4000;
    /// Header of a FREQ1 write.
    pub const FREQ1: u16 = 0x8000;
    /// Header of a PHASE0 write.
    pub const PHASE0: u16 = 0xC000;
    /// Header of a PHASE1 write.
    pub const PHASE1: u16 = 0xE000;

    /// Frequency registers are written as two consecutive 14-bit halves.
    pub const B28: u16 = 1 << 13;
    /// Selects the half written when `B28` is clear.
    pub const HLB: u16 = 1 << 12;
    /// FREQ1 drives the phase accumulator.
    pub const FSELECT: u16 = 1 << 11;
    /// PHASE1 is added to the phase accumulator.
    pub const PSELECT: u16 = 1 << 10;
    /// Resets internal registers, output goes to midscale.
    pub const RESET: u16 = 1 << 8;
    /// Disables the internal MCLK.
    pub const SLEEP1: u16 = 1 << 7;
    /// Powers down the DAC.
    pub const SLEEP12: u16 = 1 << 6;
    /// Routes the DAC data MSB to VOUT (square output).
    pub const OPBITEN: u16 = 1 << 5;
    /// Square output at the full MSB rate, half rate when clear.
    pub const DIV2: u16 = 1 << 3;
    /// Triangle output.
    pub const MODE: u16 = 1 << 1;
}

/// Errors returned by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<SpiE, PinE> {
    /// SPI write failed
    Spi(SpiE),
    /// Setting the FSYNC pin failed
    Pin(PinE),
    /// Requested frequency is at or above half the master clock
    FrequencyOutOfRange,
    /// Requested phase is above 360 degrees
    PhaseOutOfRange,
}

/// Frequency register selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrequencyRegister {
    F0,
    F1,
}

/// Phase register selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PhaseRegister {
    P0,
    P1,
}

/// Shape of the output signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Waveform {
    Sine,
    Triangle,
    /// Square wave at the programmed frequency.
    Square,
    /// Square wave at half the programmed frequency.
    HalfSquare,
}

/// Power-down state of the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SleepMode {
    /// Everything powered.
    Awake,
    /// Internal clock stopped, output holds its current value.
    MclkOff,
    /// DAC powered down. Useful with square output, which bypasses the DAC.
    DacOff,
    /// Clock stopped and DAC powered down.
    Both,
}

// Mirror of the flags last written to the control register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Control {
    waveform: Waveform,
    sleep: SleepMode,
    frequency: FrequencyRegister,
    phase: PhaseRegister,
}

impl Default for Control {
    fn default() -> Self {
        Self {
            waveform: Waveform::Sine,
            sleep: SleepMode::Awake,
            frequency: FrequencyRegister::F0,
            phase: PhaseRegister::P0,
        }
    }
}

impl Control {
    fn bits(&self) -> u16 {
        let mut bits = control::B28;
        if self.frequency == FrequencyRegister::F1 {
            bits |= control::FSELECT;
        }
        if self.phase == PhaseRegister::P1 {
            bits |= control::PSELECT;
        }
        bits |= match self.sleep {
            SleepMode::Awake => 0,
            SleepMode::MclkOff => control::SLEEP1,
            SleepMode::DacOff => control::SLEEP12,
            SleepMode::Both => control::SLEEP1 | control::SLEEP12,
        };
        bits |= match self.waveform {
            Waveform::Sine => 0,
            Waveform::Triangle => control::MODE,
            Waveform::Square => control::OPBITEN | control::DIV2,
            Waveform::HalfSquare => control::OPBITEN,
        };
        bits
    }
}

/// Represents a connection to a AD9833 device.
///
/// See [crate level documentation](crate), or check the [`new`](Ad9833::new) method for an entry point.
pub struct Ad9833<Mode, Spi, Fsync> {
    mclk: u32,
    spi: Spi,
    fsync: Fsync,
    control: Control,
    marker: PhantomData<Mode>,
}

impl<Spi, Fsync, SpiE, PinE> Ad9833<mode::Init, Spi, Fsync>
where
    Spi: Write<u8, Error = SpiE>,
    Fsync: OutputPin<Error = PinE>,
{
    /// Construct a new Ad9833 instance, in initial mode.
    ///
    /// This call does not communicate with the device yet. You need to call [`initialize`](Ad9833::initialize)
    /// or [`initialize_with`](Ad9833::initialize_with) before you can program it.
    ///
    /// | Signal | AD9833 Pin |
    /// |--------|------------|
    /// | fsync  |      8     |
    /// | SCLK   |      7     |
    /// | SDATA  |      6     |
    ///
    /// The FSYNC pin should already be high when passed in, so the device does not see a spurious frame start.
    pub fn new(spi: Spi, fsync: Fsync) -> Self {
        Self::new_with_mclk(spi, fsync, DEFAULT_MCLK_FREQUENCY)
    }

    /// Same as [`new`](Ad9833::new), but allows the master clock frequency to be specified.
    ///
    /// Use this if your board's oscillator is **not** 25 MHz.
    ///
    /// This value is used by [`set_frequency`](Ad9833::set_frequency) to compute tuning words and
    /// to bound the accepted frequency range.
    pub fn new_with_mclk(spi: Spi, fsync: Fsync, mclk: u32) -> Self {
        Self { mclk, spi, fsync, control: Control::default(), marker: PhantomData }
    }

    /// Reset the device and start waveform generation.
    ///
    /// Sends RESET together with 28-bit mode, then clears RESET. The device resumes with whatever
    /// FREQ0 and PHASE0 held before (zero after power-up).
    pub fn initialize(mut self) -> Result<Ad9833<mode::Ready, Spi, Fsync>, Error<SpiE, PinE>> {
        self.reset_sequence(None)?;
        Ok(self.into_ready())
    }

    /// Reset the device, program FREQ0 and PHASE0 while reset is held, then start waveform generation.
    ///
    /// Both values are checked before anything is sent.
    pub fn initialize_with(mut self, frequency: u32, phase: u16) -> Result<Ad9833<mode::Ready, Spi, Fsync>, Error<SpiE, PinE>> {
        self.reset_sequence(Some((frequency, phase)))?;
        Ok(self.into_ready())
    }

    fn into_ready(self) -> Ad9833<mode::Ready, Spi, Fsync> {
        Ad9833 {
            mclk: self.mclk,
            spi: self.spi,
            fsync: self.fsync,
            control: self.control,
            marker: PhantomData,
        }
    }
}

impl<Mode, Spi, Fsync, SpiE, PinE> Ad9833<Mode, Spi, Fsync>
where
    Spi: Write<u8, Error = SpiE>,
    Fsync: OutputPin<Error = PinE>,
{
    /// Master clock frequency (in Hz) used for tuning word calculations.
    pub fn mclk(&self) -> u32 {
        self.mclk
    }

    /// Release the SPI bus and FSYNC pin.
    pub fn destroy(self) -> (Spi, Fsync) {
        (self.spi, self.fsync)
    }

    fn check_frequency(&self, frequency: u32) -> Result<u32, Error<SpiE, PinE>> {
        if frequency >= self.mclk / 2 {
            log::debug!("rejecting {} Hz, limit is {} Hz", frequency, self.mclk / 2);
            return Err(Error::FrequencyOutOfRange);
        }
        Ok(util::frequency_to_tuning_word(frequency, self.mclk))
    }

    fn check_phase(phase: u16) -> Result<u16, Error<SpiE, PinE>> {
        if phase > 360 {
            return Err(Error::PhaseOutOfRange);
        }
        Ok(util::phase_to_word(phase))
    }

    fn reset_sequence(&mut self, initial: Option<(u32, u16)>) -> Result<(), Error<SpiE, PinE>> {
        let initial = match initial {
            Some((frequency, phase)) => Some((self.check_frequency(frequency)?, Self::check_phase(phase)?)),
            None => None,
        };

        let defaults = Control::default();
        self.write_frame(defaults.bits() | control::RESET)?;
        if let Some((tuning_word, phase_word)) = initial {
            let [low, high] = util::frequency_frames(FrequencyRegister::F0, tuning_word);
            self.write_frame(low)?;
            self.write_frame(high)?;
            self.write_frame(util::phase_frame(PhaseRegister::P0, phase_word))?;
        }
        self.write_frame(defaults.bits())?;
        self.control = defaults;
        Ok(())
    }

    fn write_control(&mut self, control: Control) -> Result<(), Error<SpiE, PinE>> {
        self.write_frame(control.bits())?;
        self.control = control;
        Ok(())
    }

    fn write_frame(&mut self, frame: u16) -> Result<(), Error<SpiE, PinE>> {
        log::trace!("frame 0x{:04X}", frame);
        self.fsync.set_low().map_err(Error::Pin)?;
        // MSB first
        let result = self.spi.write(&frame.to_be_bytes()).map_err(Error::Spi);
        self.fsync.set_high().map_err(Error::Pin)?;
        result
    }
}

/// Utility functions
pub mod util {
    use crate::{control, FrequencyRegister, PhaseRegister};

    /// Mask of the 28-bit frequency registers.
    pub const FREQUENCY_MASK: u32 = 0x0FFF_FFFF;
    /// Mask of the 12-bit phase registers.
    pub const PHASE_MASK: u16 = 0x0FFF;

    const HALF_MASK: u32 = 0x3FFF;

    /// Turns a frequency (in Hz) into a 28-bit tuning word, rounded to the nearest step.
    ///
    /// The result is masked to 28 bits, so `mclk` itself wraps to `0`:
    /// ```
    /// # use ad9833::util::frequency_to_tuning_word;
    /// assert_eq!(0x29F1, frequency_to_tuning_word(1_000, 25_000_000));
    /// assert_eq!(0, frequency_to_tuning_word(25_000_000, 25_000_000));
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if `mclk` is zero.
    pub fn frequency_to_tuning_word(frequency: u32, mclk: u32) -> u32 {
        let mclk = mclk as u64;
        let word = ((frequency as u64) << 28).wrapping_add(mclk / 2) / mclk;
        (word as u32) & FREQUENCY_MASK
    }

    /// Inverse of [`frequency_to_tuning_word`], rounded to the nearest Hz.
    pub fn tuning_word_to_frequency(tuning_word: u32, mclk: u32) -> u32 {
        let scaled = (tuning_word & FREQUENCY_MASK) as u64 * mclk as u64;
        ((scaled + (1 << 27)) >> 28) as u32
    }

    /// Turns a phase (in degrees) into a 12-bit phase word.
    ///
    /// ```
    /// # use ad9833::util::phase_to_word;
    /// assert_eq!(2048, phase_to_word(180));
    /// assert_eq!(0, phase_to_word(360));
    /// ```
    pub fn phase_to_word(degrees: u16) -> u16 {
        ((degrees as u32 * 4096 / 360) as u16) & PHASE_MASK
    }

    /// Splits a tuning word into the two frames of a 28-bit write, low half first.
    ///
    /// Both halves carry the header of the target register; the device tells them apart by order.
    ///
    /// ```
    /// # use ad9833::{util::frequency_frames, FrequencyRegister};
    /// assert_eq!([0x570A, 0x428F], frequency_frames(FrequencyRegister::F0, 0xA3D70A));
    /// ```
    pub fn frequency_frames(register: FrequencyRegister, tuning_word: u32) -> [u16; 2] {
        let header = match register {
            FrequencyRegister::F0 => control::FREQ0,
            FrequencyRegister::F1 => control::FREQ1,
        };
        let tuning_word = tuning_word & FREQUENCY_MASK;
        [
            header | (tuning_word & HALF_MASK) as u16,
            header | (tuning_word >> 14 & HALF_MASK) as u16,
        ]
    }

    pub fn phase_frame(register: PhaseRegister, phase_word: u16) -> u16 {
        let header = match register {
            PhaseRegister::P0 => control::PHASE0,
            PhaseRegister::P1 => control::PHASE1,
        };
        header | (phase_word & PHASE_MASK)
    }
}

impl<Spi, Fsync, SpiE, PinE> Ad9833<mode::Ready, Spi, Fsync>
where
    Spi: Write<u8, Error = SpiE>,
    Fsync: OutputPin<Error = PinE>,
{
    /// Set the output frequency (in Hz) of FREQ0.
    ///
    /// Frequencies at or above half the master clock alias and are rejected with
    /// [`Error::FrequencyOutOfRange`] before anything is sent.
    pub fn set_frequency(&mut self, frequency: u32) -> Result<(), Error<SpiE, PinE>> {
        self.set_frequency_in(FrequencyRegister::F0, frequency)
    }

    /// Same as [`set_frequency`](Ad9833::set_frequency), for the given register.
    pub fn set_frequency_in(&mut self, register: FrequencyRegister, frequency: u32) -> Result<(), Error<SpiE, PinE>> {
        log::debug!("requested frequency: {} Hz", frequency);
        let tuning_word = self.check_frequency(frequency)?;
        self.set_frequency_word_in(register, tuning_word)
    }

    /// Write a raw tuning word to a frequency register.
    ///
    /// This is a low-level interface. The word is masked to 28 bits.
    ///
    /// Three frames are sent: the control register (28-bit mode, current flags), the low 14 bits,
    /// then the high 14 bits. The device only switches to the new word once the high half is latched.
    pub fn set_frequency_word_in(&mut self, register: FrequencyRegister, tuning_word: u32) -> Result<(), Error<SpiE, PinE>> {
        let [low, high] = util::frequency_frames(register, tuning_word);
        log::debug!("tuning word: 0x{:07X} (low 0x{:04X}, high 0x{:04X})", tuning_word & util::FREQUENCY_MASK, low, high);
        self.write_frame(self.control.bits())?;
        self.write_frame(low)?;
        self.write_frame(high)
    }

    /// Set the phase offset (in degrees, 0 to 360) of PHASE0.
    pub fn set_phase(&mut self, phase: u16) -> Result<(), Error<SpiE, PinE>> {
        self.set_phase_in(PhaseRegister::P0, phase)
    }

    /// Same as [`set_phase`](Ad9833::set_phase), for the given register.
    pub fn set_phase_in(&mut self, register: PhaseRegister, phase: u16) -> Result<(), Error<SpiE, PinE>> {
        let phase_word = Self::check_phase(phase)?;
        log::debug!("phase {} deg -> word {}", phase, phase_word);
        self.write_frame(util::phase_frame(register, phase_word))
    }

    /// Start continuous output from FREQ0 and PHASE0.
    ///
    /// Clears sleep and reset. The waveform shape is kept.
    pub fn enable_continuous_output(&mut self) -> Result<(), Error<SpiE, PinE>> {
        self.write_control(Control {
            sleep: SleepMode::Awake,
            frequency: FrequencyRegister::F0,
            phase: PhaseRegister::P0,
            ..self.control
        })
    }

    pub fn set_waveform(&mut self, waveform: Waveform) -> Result<(), Error<SpiE, PinE>> {
        self.write_control(Control { waveform, ..self.control })
    }

    /// Select which frequency register drives the output.
    pub fn select_frequency(&mut self, frequency: FrequencyRegister) -> Result<(), Error<SpiE, PinE>> {
        self.write_control(Control { frequency, ..self.control })
    }

    /// Select which phase register is added to the output.
    pub fn select_phase(&mut self, phase: PhaseRegister) -> Result<(), Error<SpiE, PinE>> {
        self.write_control(Control { phase, ..self.control })
    }

    pub fn sleep(&mut self, sleep: SleepMode) -> Result<(), Error<SpiE, PinE>> {
        self.write_control(Control { sleep, ..self.control })
    }

    /// Run the initialization sequence again.
    ///
    /// Use this after a failed transfer: the device state is unknown until then. All control flags
    /// go back to their defaults (sine, FREQ0, PHASE0, awake).
    pub fn reset(&mut self) -> Result<(), Error<SpiE, PinE>> {
        self.reset_sequence(None)
    }

    /// Send a raw 16-bit frame.
    ///
    /// This bypasses the control register mirror, so later calls may overwrite what is sent here.
    pub fn send_frame(&mut self, frame: u16) -> Result<(), Error<SpiE, PinE>> {
        self.write_frame(frame)
    }
}

/// Marker types for different modes.
///
/// These types are used for the `Mode` type parameter of [`Ad9833`].
pub mod mode {
    /// Initial mode. No communication has happened.
    pub struct Init;
    /// Device is reset and generating output. Registers can be programmed.
    pub struct Ready;
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use std::{cell::RefCell, rc::Rc, vec::Vec};

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Event {
        Low,
        High,
        Byte(u8),
    }

    type Events = Rc<RefCell<Vec<Event>>>;

    struct MockSpi {
        events: Events,
        fail: bool,
    }

    impl Write<u8> for MockSpi {
        type Error = ();

        fn write(&mut self, words: &[u8]) -> Result<(), ()> {
            if self.fail {
                return Err(());
            }
            self.events.borrow_mut().extend(words.iter().map(|w| Event::Byte(*w)));
            Ok(())
        }
    }

    struct MockPin {
        events: Events,
    }

    impl OutputPin for MockPin {
        type Error = ();

        fn set_low(&mut self) -> Result<(), ()> {
            self.events.borrow_mut().push(Event::Low);
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), ()> {
            self.events.borrow_mut().push(Event::High);
            Ok(())
        }
    }

    fn setup(mclk: u32) -> (Ad9833<mode::Init, MockSpi, MockPin>, Events) {
        let events = Events::default();
        let spi = MockSpi { events: events.clone(), fail: false };
        let fsync = MockPin { events: events.clone() };
        (Ad9833::new_with_mclk(spi, fsync, mclk), events)
    }

    fn ready() -> (Ad9833<mode::Ready, MockSpi, MockPin>, Events) {
        let (ad9833, events) = setup(DEFAULT_MCLK_FREQUENCY);
        let ad9833 = ad9833.initialize().unwrap();
        events.borrow_mut().clear();
        (ad9833, events)
    }

    // Decodes FSYNC-framed writes, failing on anything that is not low, two bytes, high.
    fn frames(events: &Events) -> Vec<u16> {
        events
            .borrow()
            .chunks(4)
            .map(|chunk| match chunk {
                [Event::Low, Event::Byte(hi), Event::Byte(lo), Event::High] => u16::from_be_bytes([*hi, *lo]),
                other => panic!("malformed frame: {:?}", other),
            })
            .collect()
    }

    #[test]
    fn tuning_words_for_known_frequencies() {
        assert_eq!(0x29F1, util::frequency_to_tuning_word(1_000, DEFAULT_MCLK_FREQUENCY));
        assert_eq!(0xD1B7, util::frequency_to_tuning_word(5_000, DEFAULT_MCLK_FREQUENCY));
        assert_eq!(0x10624E, util::frequency_to_tuning_word(100_000, DEFAULT_MCLK_FREQUENCY));
        assert_eq!(0x51EB85, util::frequency_to_tuning_word(500_000, DEFAULT_MCLK_FREQUENCY));
    }

    #[test]
    fn tuning_word_boundaries() {
        assert_eq!(0, util::frequency_to_tuning_word(0, DEFAULT_MCLK_FREQUENCY));
        assert_eq!(0, util::frequency_to_tuning_word(DEFAULT_MCLK_FREQUENCY, DEFAULT_MCLK_FREQUENCY));
        assert_eq!(0x7FF_FFF5, util::frequency_to_tuning_word(12_499_999, DEFAULT_MCLK_FREQUENCY));
    }

    #[test]
    fn tuning_word_decodes_back_to_frequency() {
        for frequency in (0..DEFAULT_MCLK_FREQUENCY / 2).step_by(9_973) {
            let word = util::frequency_to_tuning_word(frequency, DEFAULT_MCLK_FREQUENCY);
            assert_eq!(frequency, util::tuning_word_to_frequency(word, DEFAULT_MCLK_FREQUENCY));
        }
    }

    #[test]
    fn phase_words_are_monotonic_and_in_range() {
        let mut previous = 0;
        for degrees in 0..360 {
            let word = util::phase_to_word(degrees);
            assert!(word <= 4095);
            assert!(word >= previous);
            previous = word;
        }
        assert_eq!(1024, util::phase_to_word(90));
        assert_eq!(4084, util::phase_to_word(359));
    }

    #[test]
    fn initialize_resets_then_releases() {
        let (ad9833, events) = setup(DEFAULT_MCLK_FREQUENCY);
        ad9833.initialize().unwrap();
        assert_eq!(frames(&events), [0x2100, 0x2000]);
    }

    #[test]
    fn initialize_with_programs_registers_under_reset() {
        let (ad9833, events) = setup(DEFAULT_MCLK_FREQUENCY);
        ad9833.initialize_with(1_000, 180).unwrap();
        assert_eq!(frames(&events), [0x2100, 0x69F1, 0x4000, 0xC800, 0x2000]);
    }

    #[test]
    fn initialize_with_rejects_before_sending() {
        let (ad9833, events) = setup(DEFAULT_MCLK_FREQUENCY);
        assert_eq!(Some(Error::PhaseOutOfRange), ad9833.initialize_with(1_000, 400).err());
        assert!(events.borrow().is_empty());
    }

    #[test]
    fn set_frequency_sends_low_half_first() {
        let (mut ad9833, events) = ready();
        ad9833.set_frequency(1_000).unwrap();
        assert_eq!(frames(&events), [0x2000, 0x69F1, 0x4000]);

        events.borrow_mut().clear();
        ad9833.set_frequency(1_000_000).unwrap();
        assert_eq!(frames(&events), [0x2000, 0x570A, 0x428F]);
    }

    #[test]
    fn set_frequency_in_freq1() {
        let (mut ad9833, events) = ready();
        ad9833.set_frequency_in(FrequencyRegister::F1, 1_000).unwrap();
        assert_eq!(frames(&events), [0x2000, 0xA9F1, 0x8000]);
    }

    #[test]
    fn set_frequency_uses_configured_mclk() {
        let (ad9833, events) = setup(1 << 28);
        let mut ad9833 = ad9833.initialize().unwrap();
        events.borrow_mut().clear();
        ad9833.set_frequency(1_000).unwrap();
        assert_eq!(frames(&events), [0x2000, 0x43E8, 0x4000]);
        assert_eq!(1 << 28, ad9833.mclk());
    }

    #[test]
    fn set_frequency_rejects_nyquist_and_above() {
        let (mut ad9833, events) = ready();
        assert_eq!(Err(Error::FrequencyOutOfRange), ad9833.set_frequency(12_500_000));
        assert_eq!(Err(Error::FrequencyOutOfRange), ad9833.set_frequency(u32::MAX));
        assert!(events.borrow().is_empty());

        ad9833.set_frequency(12_499_999).unwrap();
        assert_eq!(frames(&events), [0x2000, 0x7FF5, 0x5FFF]);
    }

    #[test]
    fn set_phase_frames() {
        let (mut ad9833, events) = ready();
        ad9833.set_phase(180).unwrap();
        ad9833.set_phase(360).unwrap();
        ad9833.set_phase_in(PhaseRegister::P1, 90).unwrap();
        assert_eq!(frames(&events), [0xC800, 0xC000, 0xE400]);

        events.borrow_mut().clear();
        assert_eq!(Err(Error::PhaseOutOfRange), ad9833.set_phase(361));
        assert!(events.borrow().is_empty());
    }

    #[test]
    fn waveform_bits() {
        let (mut ad9833, events) = ready();
        ad9833.set_waveform(Waveform::Triangle).unwrap();
        ad9833.set_waveform(Waveform::Square).unwrap();
        ad9833.set_waveform(Waveform::HalfSquare).unwrap();
        ad9833.set_waveform(Waveform::Sine).unwrap();
        assert_eq!(frames(&events), [0x2002, 0x2028, 0x2020, 0x2000]);
    }

    #[test]
    fn sleep_bits() {
        let (mut ad9833, events) = ready();
        ad9833.sleep(SleepMode::MclkOff).unwrap();
        ad9833.sleep(SleepMode::DacOff).unwrap();
        ad9833.sleep(SleepMode::Both).unwrap();
        ad9833.sleep(SleepMode::Awake).unwrap();
        assert_eq!(frames(&events), [0x2080, 0x2040, 0x20C0, 0x2000]);
    }

    #[test]
    fn register_selection_bits() {
        let (mut ad9833, events) = ready();
        ad9833.select_frequency(FrequencyRegister::F1).unwrap();
        ad9833.select_phase(PhaseRegister::P1).unwrap();
        assert_eq!(frames(&events), [0x2800, 0x2C00]);
    }

    #[test]
    fn frequency_update_keeps_control_flags() {
        let (mut ad9833, events) = ready();
        ad9833.set_waveform(Waveform::Square).unwrap();
        events.borrow_mut().clear();
        ad9833.set_frequency(1_000).unwrap();
        assert_eq!(frames(&events), [0x2028, 0x69F1, 0x4000]);
    }

    #[test]
    fn continuous_output_selects_freq0_phase0() {
        let (mut ad9833, events) = ready();
        ad9833.select_frequency(FrequencyRegister::F1).unwrap();
        ad9833.select_phase(PhaseRegister::P1).unwrap();
        ad9833.sleep(SleepMode::Both).unwrap();
        ad9833.set_waveform(Waveform::Triangle).unwrap();
        ad9833.send_frame(control::B28 | control::RESET).unwrap();
        events.borrow_mut().clear();

        ad9833.enable_continuous_output().unwrap();
        let last = *frames(&events).last().unwrap();
        assert_eq!(0, last & (control::RESET | control::FSELECT | control::PSELECT));
        assert_eq!(0, last & (control::SLEEP1 | control::SLEEP12));
        assert_eq!(0x2002, last);
    }

    #[test]
    fn reset_restores_default_flags() {
        let (mut ad9833, events) = ready();
        ad9833.set_waveform(Waveform::Triangle).unwrap();
        events.borrow_mut().clear();
        ad9833.reset().unwrap();
        ad9833.set_frequency(1_000).unwrap();
        assert_eq!(frames(&events), [0x2100, 0x2000, 0x2000, 0x69F1, 0x4000]);
    }

    #[test]
    fn spi_error_releases_fsync() {
        let (ad9833, events) = ready();
        let (mut spi, fsync) = ad9833.destroy();
        spi.fail = true;
        let mut ad9833 = Ad9833::new(spi, fsync);
        assert_eq!(Some(Error::Spi(())), ad9833.write_frame(0x2000).err());
        assert_eq!(*events.borrow(), [Event::Low, Event::High]);
    }
}
