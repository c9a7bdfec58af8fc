/*
 *  lib.rs
 *
 *  EcuMonS - worth the squeeze
 *  (c) 2020-26 Stuart Hunter
 *
 *  Live TunerStudio datalog values on a small OLED
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

pub mod button;
pub mod config;
pub mod controller;
pub mod display;
pub mod error;
pub mod header;
pub mod housekeeping;
pub mod locator;
pub mod runner;
pub mod synthetic;
pub mod tailer;
pub mod vframebuf;

pub use controller::{DashController, DashSettings, Frame};
pub use error::{LookupResult, TailError};
pub use locator::{find_latest, LogFile};
pub use tailer::LogTailer;
