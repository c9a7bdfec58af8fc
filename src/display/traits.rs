/*
 *  display/traits.rs
 *
 *  EcuMonS - worth the squeeze
 *  (c) 2020-26 Stuart Hunter
 *
 *  Panel driver abstraction
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

use crate::display::error::DisplayError;

#[derive(Debug, Clone)]
pub struct DisplayCapabilities {
    pub width: u32,
    pub height: u32,
}

/// Operations every monochrome panel offers. Drawing goes through the
/// driver's own `DrawTarget` impl into an off-screen buffer; `flush` pushes
/// that buffer to the glass.
pub trait DisplayDriver: Send {
    fn capabilities(&self) -> &DisplayCapabilities;

    /// (width, height)
    fn dimensions(&self) -> (u32, u32) {
        let caps = self.capabilities();
        (caps.width, caps.height)
    }

    fn init(&mut self) -> Result<(), DisplayError>;

    /// 0-255, quantised by the driver
    fn set_brightness(&mut self, value: u8) -> Result<(), DisplayError>;

    fn flush(&mut self) -> Result<(), DisplayError>;

    /// Blank the buffer and the glass
    fn clear(&mut self) -> Result<(), DisplayError>;
}
