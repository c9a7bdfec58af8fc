/*
 *  display/drivers/ssd1306.rs
 *
 *  EcuMonS - worth the squeeze
 *  (c) 2020-26 Stuart Hunter
 *
 *  SSD1306 I2C OLED panel
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

use linux_embedded_hal::I2cdev;
use ssd1306::{
    mode::{BufferedGraphicsMode, DisplayConfig as _},
    prelude::*,
    size::{DisplaySize128x32, DisplaySize128x64},
    I2CDisplayInterface,
    Ssd1306,
};

use embedded_graphics::geometry::Size;
use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::Rectangle;

use crate::config::DisplayConfig;
use crate::display::error::DisplayError;
use crate::display::traits::{DisplayCapabilities, DisplayDriver};
use crate::vframebuf::VarFrameBuf;

use log::info;

type Panel<S> = Ssd1306<I2CInterface<I2cdev>, S, BufferedGraphicsMode<S>>;

enum Ssd1306Variants {
    Size128x64(Panel<DisplaySize128x64>),
    Size128x32(Panel<DisplaySize128x32>),
}

/// Run the same body against whichever panel size is fitted
macro_rules! with_panel {
    ($variants:expr, $d:ident => $body:expr) => {
        match $variants {
            Ssd1306Variants::Size128x64($d) => $body,
            Ssd1306Variants::Size128x32($d) => $body,
        }
    };
}

pub struct Ssd1306Driver {
    display: Ssd1306Variants,
    framebuffer: VarFrameBuf<BinaryColor>,
    capabilities: DisplayCapabilities,
    brightness: Option<u8>,
    inverted: bool,
}

impl Ssd1306Driver {
    /// Open `i2c_bus_path` and address the panel at `address` (usually 0x3C).
    /// Only 128x64 and 128x32 glass is supported.
    pub fn new_i2c(
        i2c_bus_path: &str,
        address: u8,
        config: &DisplayConfig,
    ) -> Result<Self, DisplayError> {
        info!("Opening SSD1306 on {} at 0x{:02X}", i2c_bus_path, address);

        let i2c = I2cdev::new(i2c_bus_path)
            .map_err(|e| DisplayError::I2cError(format!("Failed to open {}: {}", i2c_bus_path, e)))?;
        let interface = I2CDisplayInterface::new_custom_address(i2c, address);

        let rotation = match config.rotate_deg.unwrap_or(0) {
            0 => DisplayRotation::Rotate0,
            90 => DisplayRotation::Rotate90,
            180 => DisplayRotation::Rotate180,
            270 => DisplayRotation::Rotate270,
            other => return Err(DisplayError::InvalidRotation(other)),
        };

        let width = config.width.unwrap_or(128);
        let height = config.height.unwrap_or(64);
        let display = match (width, height) {
            (128, 64) => Ssd1306Variants::Size128x64(
                Ssd1306::new(interface, DisplaySize128x64, rotation).into_buffered_graphics_mode(),
            ),
            (128, 32) => Ssd1306Variants::Size128x32(
                Ssd1306::new(interface, DisplaySize128x32, rotation).into_buffered_graphics_mode(),
            ),
            _ => {
                return Err(DisplayError::InvalidConfiguration(format!(
                    "Unsupported SSD1306 size: {}x{}",
                    width, height
                )));
            }
        };

        // drawing happens in panel coordinates, so swap for portrait mounting
        let (w, h) = match rotation {
            DisplayRotation::Rotate90 | DisplayRotation::Rotate270 => (height, width),
            _ => (width, height),
        };

        Ok(Self {
            display,
            framebuffer: VarFrameBuf::new(w, h, BinaryColor::Off),
            capabilities: DisplayCapabilities {
                width: w,
                height: h,
            },
            brightness: config.brightness,
            inverted: config.invert.unwrap_or(false),
        })
    }
}

impl DisplayDriver for Ssd1306Driver {
    fn capabilities(&self) -> &DisplayCapabilities {
        &self.capabilities
    }

    fn init(&mut self) -> Result<(), DisplayError> {
        with_panel!(&mut self.display, d => d.init()?);
        if let Some(level) = self.brightness {
            self.set_brightness(level)?;
        }
        info!("SSD1306 ready ({}x{})", self.capabilities.width, self.capabilities.height);
        Ok(())
    }

    fn set_brightness(&mut self, value: u8) -> Result<(), DisplayError> {
        let brightness = match value {
            0..=63 => Brightness::DIMMEST,
            64..=127 => Brightness::DIM,
            128..=191 => Brightness::NORMAL,
            _ => Brightness::BRIGHTEST,
        };
        with_panel!(&mut self.display, d => d.set_brightness(brightness)?);
        self.brightness = Some(value);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), DisplayError> {
        let (bg, fg) = if self.inverted {
            (BinaryColor::On, BinaryColor::Off)
        } else {
            (BinaryColor::Off, BinaryColor::On)
        };
        let lit = self.framebuffer.lit().map(|p| Pixel(p, fg));
        with_panel!(&mut self.display, d => {
            d.clear(bg)
                .map_err(|e| DisplayError::DrawingError(format!("{:?}", e)))?;
            d.draw_iter(lit)
                .map_err(|e| DisplayError::DrawingError(format!("{:?}", e)))?;
            d.flush()?;
        });
        Ok(())
    }

    fn clear(&mut self) -> Result<(), DisplayError> {
        self.framebuffer.clear(BinaryColor::Off)
            .map_err(|_| DisplayError::Other("Failed to clear framebuffer".to_string()))?;
        self.flush()
    }
}

impl DrawTarget for Ssd1306Driver {
    type Color = BinaryColor;
    type Error = core::convert::Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        self.framebuffer.draw_iter(pixels)
    }

    fn fill_contiguous<I>(&mut self, area: &Rectangle, colors: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Self::Color>,
    {
        self.framebuffer.fill_contiguous(area, colors)
    }

    fn clear(&mut self, color: Self::Color) -> Result<(), Self::Error> {
        self.framebuffer.clear(color)
    }
}

impl OriginDimensions for Ssd1306Driver {
    fn size(&self) -> Size {
        Size::new(self.capabilities.width, self.capabilities.height)
    }
}
