/*
 *  synthetic.rs
 *
 *  EcuMonS - worth the squeeze
 *  (c) 2020-26 Stuart Hunter
 *
 *  Fake engine values for test mode
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

use std::time::Duration;

pub const DEFAULT_TEST_LABELS: [&str; 5] = ["RPM", "TPS", "AFR", "CLT", "IAT"];

/// Value shown for `label` after `elapsed` in test mode.
/// RPM and TPS sweep so a frozen display is obvious.
pub fn synthetic_value(label: &str, elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    match label {
        "RPM" => (secs % 7000).to_string(),
        "TPS" => ((secs * 3) % 100).to_string(),
        "AFR" => "14.7".to_string(),
        "CLT" => "90".to_string(),
        "IAT" | "MAT" => "25".to_string(),
        "MAP" => "100".to_string(),
        _ => "0".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sweeping_values() {
        assert_eq!(synthetic_value("RPM", Duration::from_secs(7001)), "1");
        assert_eq!(synthetic_value("TPS", Duration::from_secs(34)), "2");
        assert_eq!(synthetic_value("AFR", Duration::from_secs(34)), "14.7");
        assert_eq!(synthetic_value("EGT", Duration::ZERO), "0");
    }
}
