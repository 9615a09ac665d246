//! # Flicker Standards Module
//!
//! Pure classifiers that compare a (frequency, percent flicker) pair against
//! published lighting-flicker limits.
//!
//! ## Standards
//! - IEEE 1789-2015 recommended practice (three risk tiers)
//! - California Title 24 JA8 2019 (pass/fail)
//! - WELL Building Standard v2, feature L07 (pass/fail)

use std::fmt;

use serde::{Deserialize, Serialize};

/// IEEE 1789-2015 risk tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IeeeRisk {
    #[serde(rename = "No Risk")]
    NoRisk,
    #[serde(rename = "Low Risk")]
    LowRisk,
    #[serde(rename = "High Risk")]
    HighRisk,
}

impl IeeeRisk {
    pub fn as_str(self) -> &'static str {
        match self {
            IeeeRisk::NoRisk => "No Risk",
            IeeeRisk::LowRisk => "Low Risk",
            IeeeRisk::HighRisk => "High Risk",
        }
    }
}

impl fmt::Display for IeeeRisk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifies a waveform against IEEE 1789-2015.
///
/// Above 3 kHz there is no risk. Below 90 Hz the no-risk and low-risk limits
/// are first 0.01 and 0.025 times the frequency. Any frequency not settled by
/// then is no risk below 0.0333 times the frequency, low risk below 0.08 times
/// the frequency up to 1250 Hz, and high risk otherwise.
///
/// # Arguments
/// * `frequency` - Flicker frequency in Hz
/// * `percent_flicker` - Percent flicker (0-100)
pub fn ieee_1789_2015(frequency: f64, percent_flicker: f64) -> IeeeRisk {
    if frequency > 3000.0 {
        return IeeeRisk::NoRisk;
    }

    if frequency < 90.0 {
        if percent_flicker < 0.01 * frequency {
            return IeeeRisk::NoRisk;
        }
        if percent_flicker < 0.025 * frequency {
            return IeeeRisk::LowRisk;
        }
    }

    // Low frequencies that miss both limits above are still checked here.
    if percent_flicker < 0.0333 * frequency {
        IeeeRisk::NoRisk
    } else if frequency <= 1250.0 && percent_flicker < 0.08 * frequency {
        IeeeRisk::LowRisk
    } else {
        IeeeRisk::HighRisk
    }
}

/// California JA8 2019: passes above 200 Hz or below 30% flicker.
pub fn california_ja8_2019(frequency: f64, percent_flicker: f64) -> bool {
    frequency > 200.0 || percent_flicker < 30.0
}

/// WELL v2 L07: passes above 90 Hz or below 5% flicker.
pub fn well_building_standard_v2(frequency: f64, percent_flicker: f64) -> bool {
    frequency > 90.0 || percent_flicker < 5.0
}

/// "Pass" or "Fail".
pub fn pass_fail(passed: bool) -> &'static str {
    if passed { "Pass" } else { "Fail" }
}

/// All three classifications for one waveform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandardsResult {
    pub ieee_1789_2015: IeeeRisk,
    pub california_ja8_2019: bool,
    pub well_standard_v2: bool,
}

impl StandardsResult {
    pub fn evaluate(frequency: f64, percent_flicker: f64) -> Self {
        Self {
            ieee_1789_2015: ieee_1789_2015(frequency, percent_flicker),
            california_ja8_2019: california_ja8_2019(frequency, percent_flicker),
            well_standard_v2: well_building_standard_v2(frequency, percent_flicker),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ieee_scenarios() {
        assert_eq!(ieee_1789_2015(120.0, 5.0), IeeeRisk::LowRisk);
        assert_eq!(ieee_1789_2015(1000.0, 20.0), IeeeRisk::NoRisk);
        assert_eq!(ieee_1789_2015(120.0, 3.0), IeeeRisk::NoRisk);
        assert_eq!(ieee_1789_2015(120.0, 10.0), IeeeRisk::HighRisk);
    }

    #[test]
    fn test_ieee_low_frequency_branch() {
        assert_eq!(ieee_1789_2015(60.0, 0.5), IeeeRisk::NoRisk);
        assert_eq!(ieee_1789_2015(60.0, 1.0), IeeeRisk::LowRisk);
        assert_eq!(ieee_1789_2015(0.0, 0.0), IeeeRisk::HighRisk);
    }

    #[test]
    fn test_ieee_low_frequency_falls_through_to_general_limits() {
        // 60 Hz: 1.5% and 1.8% miss the low-frequency limits but sit under 0.0333 · 60
        assert_eq!(ieee_1789_2015(60.0, 1.5), IeeeRisk::NoRisk);
        assert_eq!(ieee_1789_2015(60.0, 1.8), IeeeRisk::NoRisk);
        assert_eq!(ieee_1789_2015(60.0, 3.0), IeeeRisk::LowRisk);
        assert_eq!(ieee_1789_2015(60.0, 4.9), IeeeRisk::HighRisk);
        assert_eq!(ieee_1789_2015(30.0, 0.2), IeeeRisk::NoRisk);
        assert_eq!(ieee_1789_2015(30.0, 0.5), IeeeRisk::LowRisk);
        assert_eq!(ieee_1789_2015(30.0, 1.0), IeeeRisk::LowRisk);
        assert_eq!(ieee_1789_2015(30.0, 2.0), IeeeRisk::LowRisk);
        assert_eq!(ieee_1789_2015(30.0, 2.5), IeeeRisk::HighRisk);
    }

    #[test]
    fn test_ieee_risk_never_drops_as_flicker_grows_from_90hz() {
        let rank = |r: IeeeRisk| match r {
            IeeeRisk::NoRisk => 0,
            IeeeRisk::LowRisk => 1,
            IeeeRisk::HighRisk => 2,
        };
        for step in 15..=600 {
            let freq = step as f64 * 6.0;
            let mut previous = rank(ieee_1789_2015(freq, 0.0));
            for p in 1..=200 {
                let current = rank(ieee_1789_2015(freq, p as f64 * 0.5));
                assert!(current >= previous, "risk fell at {freq} Hz, {}%", p as f64 * 0.5);
                previous = current;
            }
        }
    }

    #[test]
    fn test_california_ja8() {
        assert!(california_ja8_2019(120.0, 5.0));
        assert!(california_ja8_2019(250.0, 90.0));
        assert!(!california_ja8_2019(120.0, 30.0));
    }

    #[test]
    fn test_well_v2() {
        assert!(well_building_standard_v2(120.0, 50.0));
        assert!(well_building_standard_v2(60.0, 4.9));
        assert!(!well_building_standard_v2(90.0, 5.0));
    }

    #[test]
    fn test_serialized_risk_strings() {
        let json = serde_json::to_string(&StandardsResult::evaluate(120.0, 5.0)).unwrap();
        assert_eq!(
            json,
            r#"{"ieee_1789_2015":"Low Risk","california_ja8_2019":true,"well_standard_v2":true}"#
        );
        assert_eq!(IeeeRisk::HighRisk.to_string(), "High Risk");
        assert_eq!(pass_fail(false), "Fail");
    }
}
