/*
 *  display/drivers/mock.rs
 *
 *  EcuMonS - worth the squeeze
 *  (c) 2020-26 Stuart Hunter
 *
 *  In-memory panel for tests
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

use embedded_graphics::geometry::Size;
use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::Rectangle;

use crate::display::error::DisplayError;
use crate::display::traits::{DisplayCapabilities, DisplayDriver};
use crate::vframebuf::VarFrameBuf;

use std::sync::{Arc, Mutex};

/// Records every driver call; the state handle stays valid after the
/// driver has been moved into a sink.
#[derive(Debug, Clone)]
pub struct MockDriver {
    framebuffer: VarFrameBuf<BinaryColor>,
    capabilities: DisplayCapabilities,
    state: Arc<Mutex<MockDriverState>>,
}

#[derive(Debug, Default)]
pub struct MockDriverState {
    pub init_count: usize,
    pub flush_count: usize,
    pub clear_count: usize,
    pub last_brightness: Option<u8>,
    /// Lit pixels at the most recent flush
    pub lit_at_flush: usize,
    pub simulate_flush_failure: bool,
}

impl MockDriver {
    pub fn new_with_size(width: u32, height: u32) -> Self {
        Self {
            framebuffer: VarFrameBuf::new(width, height, BinaryColor::Off),
            capabilities: DisplayCapabilities {
                width,
                height,
            },
            state: Arc::new(Mutex::new(MockDriverState::default())),
        }
    }

    pub fn state(&self) -> Arc<Mutex<MockDriverState>> {
        Arc::clone(&self.state)
    }

    pub fn count_on_pixels(&self) -> usize {
        self.framebuffer.count_lit()
    }

    pub fn get_pixel(&self, x: u32, y: u32) -> Option<BinaryColor> {
        self.framebuffer.get(x, y)
    }

    /// True if any pixel in the rectangle is lit
    pub fn any_lit_in(&self, area: Rectangle) -> bool {
        area.points()
            .any(|p| self.get_pixel(p.x as u32, p.y as u32) == Some(BinaryColor::On))
    }
}

impl DisplayDriver for MockDriver {
    fn capabilities(&self) -> &DisplayCapabilities {
        &self.capabilities
    }

    fn init(&mut self) -> Result<(), DisplayError> {
        self.state.lock().unwrap().init_count += 1;
        Ok(())
    }

    fn set_brightness(&mut self, value: u8) -> Result<(), DisplayError> {
        self.state.lock().unwrap().last_brightness = Some(value);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), DisplayError> {
        let mut state = self.state.lock().unwrap();
        if state.simulate_flush_failure {
            return Err(DisplayError::Other("Simulated flush failure".to_string()));
        }
        state.flush_count += 1;
        state.lit_at_flush = self.framebuffer.count_lit();
        Ok(())
    }

    fn clear(&mut self) -> Result<(), DisplayError> {
        self.state.lock().unwrap().clear_count += 1;
        self.framebuffer.clear(BinaryColor::Off)
            .map_err(|_| DisplayError::Other("Failed to clear framebuffer".to_string()))?;
        self.flush()
    }
}

impl DrawTarget for MockDriver {
    type Color = BinaryColor;
    type Error = core::convert::Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        self.framebuffer.draw_iter(pixels)
    }

    fn clear(&mut self, color: Self::Color) -> Result<(), Self::Error> {
        self.framebuffer.clear(color)
    }
}

impl OriginDimensions for MockDriver {
    fn size(&self) -> Size {
        Size::new(self.capabilities.width, self.capabilities.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_graphics::primitives::{Line, PrimitiveStyle};

    #[test]
    fn test_mock_driver_clear() {
        let mut driver = MockDriver::new_with_size(128, 64);
        Line::new(Point::new(0, 0), Point::new(10, 10))
            .into_styled(PrimitiveStyle::with_stroke(BinaryColor::On, 1))
            .draw(&mut driver)
            .unwrap();
        assert_eq!(driver.get_pixel(0, 0), Some(BinaryColor::On));

        // DisplayDriver::clear, not DrawTarget::clear
        DisplayDriver::clear(&mut driver).unwrap();
        assert_eq!(driver.count_on_pixels(), 0);
        let state = driver.state();
        let state = state.lock().unwrap();
        assert_eq!(state.clear_count, 1);
        assert_eq!(state.flush_count, 1);
    }

    #[test]
    fn test_mock_driver_records_brightness() {
        let mut driver = MockDriver::new_with_size(128, 32);
        assert_eq!(driver.dimensions(), (128, 32));
        driver.set_brightness(200).unwrap();
        assert_eq!(driver.state().lock().unwrap().last_brightness, Some(200));
    }
}
