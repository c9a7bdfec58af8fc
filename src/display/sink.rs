/*
 *  display/sink.rs
 *
 *  EcuMonS - worth the squeeze
 *  (c) 2020-26 Stuart Hunter
 *
 *  Frame renderers: OLED panel and headless log
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

use arrayvec::ArrayString;
use embedded_graphics::{
    mono_font::{
        ascii::{FONT_10X20, FONT_6X10},
        MonoFont, MonoTextStyle,
    },
    pixelcolor::BinaryColor,
    prelude::*,
    text::{Baseline, Text},
};
use log::info;

use crate::controller::Frame;
use crate::display::error::DisplayError;
use crate::display::traits::DisplayDriver;

/// Where frames go
pub trait RenderSink {
    fn render(&mut self, frame: &Frame) -> Result<(), DisplayError>;

    /// Blank the output and hand back the hardware
    fn release(&mut self) -> Result<(), DisplayError>;
}

const LABEL_FONT: &MonoFont<'static> = &FONT_6X10;
const VALUE_FONT: &MonoFont<'static> = &FONT_10X20;

/// Truncate `text` to what fits in `max_chars` cells
fn fit(text: &str, max_chars: usize) -> ArrayString<32> {
    let mut out = ArrayString::new();
    for ch in text.chars().take(max_chars) {
        if out.try_push(ch).is_err() {
            break;
        }
    }
    out
}

/// x that centres `chars` glyphs of `font` in `width`
fn centered_x(width: u32, chars: usize, font: &MonoFont) -> i32 {
    let text_w = chars as i32 * font.character_size.width as i32;
    ((width as i32 - text_w) / 2).max(0)
}

/// Draws frames on a monochrome panel:
///
/// ```text
///  +----------------------+
///  |        RPM          T|   label, test marker
///  |                      |
///  |        3500          |   value
///  |       NO DATA        |   hint (panels 48px and taller)
///  +----------------------+
/// ```
pub struct OledSink<D> {
    driver: D,
    last: Option<Frame>,
}

impl<D> OledSink<D>
where
    D: DisplayDriver + DrawTarget<Color = BinaryColor>,
{
    pub fn new(mut driver: D) -> Result<Self, DisplayError> {
        driver.init()?;
        DisplayDriver::clear(&mut driver)?;
        Ok(Self { driver, last: None })
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    fn draw_text(&mut self, text: &str, at: Point, font: &MonoFont, baseline: Baseline) -> Result<(), DisplayError> {
        Text::with_baseline(text, at, MonoTextStyle::new(font, BinaryColor::On), baseline)
            .draw(&mut self.driver)
            .map(|_| ())
            .map_err(|_| DisplayError::DrawingError(format!("Failed to draw '{}'", text)))
    }

    fn compose(&mut self, frame: &Frame) -> Result<(), DisplayError> {
        let (w, h) = self.driver.dimensions();
        let label_cell = LABEL_FONT.character_size.width as usize;
        let value_cell = VALUE_FONT.character_size.width as usize;

        DrawTarget::clear(&mut self.driver, BinaryColor::Off)
            .map_err(|_| DisplayError::DrawingError("Failed to clear frame".to_string()))?;

        // leave the right-hand cell free for the marker
        let label = fit(&frame.value.label, (w as usize / label_cell).saturating_sub(2));
        let x = centered_x(w, label.chars().count(), LABEL_FONT);
        self.draw_text(&label, Point::new(x, 0), LABEL_FONT, Baseline::Top)?;

        let value = fit(&frame.value.value, w as usize / value_cell);
        let x = centered_x(w, value.chars().count(), VALUE_FONT);
        self.draw_text(&value, Point::new(x, h as i32 / 2 + 2), VALUE_FONT, Baseline::Middle)?;

        if frame.flags.test_mode && frame.flags.blink_on {
            let x = w as i32 - label_cell as i32;
            self.draw_text("T", Point::new(x, 0), LABEL_FONT, Baseline::Top)?;
        }

        if frame.flags.no_data && h >= 48 {
            let x = centered_x(w, 7, LABEL_FONT);
            self.draw_text("NO DATA", Point::new(x, h as i32 - 1), LABEL_FONT, Baseline::Bottom)?;
        }
        Ok(())
    }
}

impl<D> RenderSink for OledSink<D>
where
    D: DisplayDriver + DrawTarget<Color = BinaryColor>,
{
    fn render(&mut self, frame: &Frame) -> Result<(), DisplayError> {
        if self.last.as_ref() == Some(frame) {
            return Ok(());
        }
        self.compose(frame)?;
        self.driver.flush()?;
        self.last = Some(frame.clone());
        Ok(())
    }

    fn release(&mut self) -> Result<(), DisplayError> {
        self.last = None;
        DisplayDriver::clear(&mut self.driver)
    }
}

/// Headless sink: one `info` line whenever what is shown changes.
/// Blink phase alone does not count as a change.
#[derive(Debug, Default)]
pub struct LogSink {
    last: Option<Frame>,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RenderSink for LogSink {
    fn render(&mut self, frame: &Frame) -> Result<(), DisplayError> {
        let same = self.last.as_ref().is_some_and(|last| {
            last.value == frame.value
                && last.flags.test_mode == frame.flags.test_mode
                && last.flags.no_data == frame.flags.no_data
        });
        if !same {
            info!("{}", frame);
            self.last = Some(frame.clone());
        }
        Ok(())
    }

    fn release(&mut self) -> Result<(), DisplayError> {
        self.last = None;
        Ok(())
    }
}
