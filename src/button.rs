/*
 *  button.rs
 *
 *  EcuMonS - worth the squeeze
 *  (c) 2020-26 Stuart Hunter
 *
 *  Push button handling: debounce, short press and long press
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use std::time::{Duration, Instant};
use thiserror::Error;

/// What a physical button activation means to the dashboard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonEvent {
    /// Short press: show the next field
    Advance,
    /// Held past the long-press threshold: toggle test mode, back to the first field
    ToggleMode,
}

#[derive(Debug, Error)]
pub enum InputError {
    #[cfg(feature = "gpio-button")]
    #[error("GPIO error: {0}")]
    Gpio(#[from] rppal::gpio::Error),
    #[error("GPIO button support not compiled in")]
    Unsupported,
}

/// Anything that can be polled for button events
pub trait ButtonSource {
    fn poll(&mut self, now: Instant) -> Option<ButtonEvent>;
}

#[derive(Debug, Clone, Copy)]
pub struct ButtonTiming {
    pub debounce: Duration,
    pub long_press: Duration,
}

impl Default for ButtonTiming {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(50),
            long_press: Duration::from_millis(1500),
        }
    }
}

/// Turns a sampled pin level into discrete events.
///
/// A press released before the long-press threshold yields one `Advance`
/// on release. Holding past the threshold yields one `ToggleMode` while
/// still held, and nothing on release. Level changes closer together than
/// the debounce interval are ignored.
#[derive(Debug)]
pub struct ButtonDebouncer {
    timing: ButtonTiming,
    pressed: bool,
    last_change: Option<Instant>,
    pressed_at: Option<Instant>,
    long_fired: bool,
}

impl ButtonDebouncer {
    pub fn new(timing: ButtonTiming) -> Self {
        Self {
            timing,
            pressed: false,
            last_change: None,
            pressed_at: None,
            long_fired: false,
        }
    }

    pub fn is_pressed(&self) -> bool {
        self.pressed
    }

    pub fn update(&mut self, pressed: bool, now: Instant) -> Option<ButtonEvent> {
        if pressed != self.pressed {
            if let Some(last) = self.last_change {
                if now.saturating_duration_since(last) < self.timing.debounce {
                    return None;
                }
            }
            self.pressed = pressed;
            self.last_change = Some(now);

            if pressed {
                self.pressed_at = Some(now);
                self.long_fired = false;
                return None;
            }

            let was_held = self.pressed_at.take().is_some();
            if std::mem::take(&mut self.long_fired) {
                return None;
            }
            return was_held.then_some(ButtonEvent::Advance);
        }

        if self.pressed && !self.long_fired {
            if let Some(at) = self.pressed_at {
                if now.saturating_duration_since(at) >= self.timing.long_press {
                    self.long_fired = true;
                    return Some(ButtonEvent::ToggleMode);
                }
            }
        }
        None
    }
}

#[cfg(feature = "gpio-button")]
pub use gpio::GpioButton;

#[cfg(feature = "gpio-button")]
mod gpio {
    use super::*;
    use log::info;
    use rppal::gpio::{Gpio, InputPin};

    /// Push button on a BCM-numbered GPIO pin. The pin is released on drop.
    pub struct GpioButton {
        pin: InputPin,
        active_low: bool,
        debouncer: ButtonDebouncer,
    }

    impl GpioButton {
        pub fn open(bcm_pin: u8, active_low: bool, timing: ButtonTiming) -> Result<Self, InputError> {
            let pin = Gpio::new()?.get(bcm_pin)?;
            let pin = if active_low { pin.into_input_pullup() } else { pin.into_input_pulldown() };
            info!("Button on GPIO{} ({})", bcm_pin, if active_low { "active low" } else { "active high" });
            Ok(Self {
                pin,
                active_low,
                debouncer: ButtonDebouncer::new(timing),
            })
        }
    }

    impl ButtonSource for GpioButton {
        fn poll(&mut self, now: Instant) -> Option<ButtonEvent> {
            let pressed = if self.active_low { self.pin.is_low() } else { self.pin.is_high() };
            self.debouncer.update(pressed, now)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(base: Instant, n: u64) -> Instant {
        base + Duration::from_millis(n)
    }

    #[test]
    fn test_short_press_emits_one_advance() {
        let t0 = Instant::now();
        let mut b = ButtonDebouncer::new(ButtonTiming::default());
        assert_eq!(b.update(true, ms(t0, 0)), None);
        assert_eq!(b.update(true, ms(t0, 100)), None);
        assert_eq!(b.update(false, ms(t0, 200)), Some(ButtonEvent::Advance));
        assert_eq!(b.update(false, ms(t0, 300)), None);
    }

    #[test]
    fn test_bounce_is_ignored() {
        let t0 = Instant::now();
        let mut b = ButtonDebouncer::new(ButtonTiming::default());
        let mut events = Vec::new();
        // contact chatter within the debounce window
        for (i, level) in [true, false, true, false, true].into_iter().enumerate() {
            events.extend(b.update(level, ms(t0, i as u64 * 5)));
        }
        events.extend(b.update(false, ms(t0, 200)));
        assert_eq!(events, vec![ButtonEvent::Advance]);
    }

    #[test]
    fn test_long_press_toggles_once() {
        let t0 = Instant::now();
        let mut b = ButtonDebouncer::new(ButtonTiming::default());
        let mut events = Vec::new();
        for step in 0..=40 {
            events.extend(b.update(true, ms(t0, step * 50)));
        }
        events.extend(b.update(false, ms(t0, 2100)));
        assert_eq!(events, vec![ButtonEvent::ToggleMode]);
        assert!(!b.is_pressed());
    }

    #[test]
    fn test_press_after_long_press_advances_again() {
        let t0 = Instant::now();
        let mut b = ButtonDebouncer::new(ButtonTiming::default());
        b.update(true, ms(t0, 0));
        assert_eq!(b.update(true, ms(t0, 1600)), Some(ButtonEvent::ToggleMode));
        assert_eq!(b.update(false, ms(t0, 1700)), None);
        b.update(true, ms(t0, 2000));
        assert_eq!(b.update(false, ms(t0, 2100)), Some(ButtonEvent::Advance));
    }
}
