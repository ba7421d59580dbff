//! Accuracy classes `H1`..`H6` and their regulation parameters.
//!
//! Tolerances follow `coefficient × √(distance_km)` in millimeters. The
//! [`ClassTable`] is an explicit configuration value: build it once (from
//! defaults or a JSON override file, see [`crate::config::classes`]) and pass
//! it by reference to the components that classify or check measurements.

use crate::types::MeasurementMethod;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Leveling accuracy class, strictest first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AccuracyClass {
    H1,
    H2,
    H3,
    H4,
    H5,
    H6,
}

impl AccuracyClass {
    /// All classes in strictness order.
    pub const ALL: [AccuracyClass; 6] = [
        AccuracyClass::H1,
        AccuracyClass::H2,
        AccuracyClass::H3,
        AccuracyClass::H4,
        AccuracyClass::H5,
        AccuracyClass::H6,
    ];

    /// Class number 1..=6.
    pub fn number(self) -> u8 {
        self as u8 + 1
    }

    pub fn from_number(n: u8) -> Option<Self> {
        match n {
            1..=6 => Some(Self::ALL[(n - 1) as usize]),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            AccuracyClass::H1 => "H1",
            AccuracyClass::H2 => "H2",
            AccuracyClass::H3 => "H3",
            AccuracyClass::H4 => "H4",
            AccuracyClass::H5 => "H5",
            AccuracyClass::H6 => "H6",
        }
    }

    #[inline]
    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for AccuracyClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AccuracyClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        AccuracyClass::ALL
            .iter()
            .copied()
            .find(|c| c.name() == upper)
            .ok_or_else(|| format!("invalid class name: {s} (expected H1-H6)"))
    }
}

/// Tightest class a misclosure satisfies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum AchievedClass {
    Within(AccuracyClass),
    ExceedsAll,
}

impl AchievedClass {
    /// Class number, `0` when every tolerance is exceeded.
    pub fn number(self) -> u8 {
        match self {
            AchievedClass::Within(c) => c.number(),
            AchievedClass::ExceedsAll => 0,
        }
    }

    pub fn class(self) -> Option<AccuracyClass> {
        match self {
            AchievedClass::Within(c) => Some(c),
            AchievedClass::ExceedsAll => None,
        }
    }

    pub fn is_within(self) -> bool {
        matches!(self, AchievedClass::Within(_))
    }
}

impl fmt::Display for AchievedClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AchievedClass::Within(c) => write!(f, "{c}"),
            AchievedClass::ExceedsAll => f.write_str("Exceeded"),
        }
    }
}

/// How a sight distance was measured.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SightKind {
    /// Level and staff.
    Geometric,
    /// Total station and prism.
    Trigonometric,
}

/// Regulation constants of a single accuracy class.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassParameters {
    pub class: AccuracyClass,
    /// Tolerance coefficient (mm/√km).
    pub tolerance_coefficient: f64,
    /// Maximum line length (km); `None` means unlimited.
    pub max_line_length_km: Option<f64>,
    pub max_sight_distance_geometric_m: f64,
    pub max_sight_distance_trigonometric_m: f64,
    pub min_staff_clearance_m: Option<f64>,
    pub required_method: MeasurementMethod,
    pub min_setups: usize,
    pub requires_double_run: bool,
    pub max_fb_difference_mm: Option<f64>,
    /// Maximum back/fore distance difference within one setup (m).
    pub max_single_distance_imbalance_m: f64,
    /// Maximum accumulated back/fore distance difference along a line (m).
    pub max_cumulative_distance_imbalance_m: f64,
    pub max_instrument_error_mm_per_km: Option<f64>,
    pub max_days_for_double_run: Option<u32>,
}

impl ClassParameters {
    /// Survey of Israel Directive G2 (2021) values.
    pub fn regulation(class: AccuracyClass) -> Self {
        let (coef, max_len, sight_geo, sight_trig, clearance, method, single, cumulative) =
            match class {
                AccuracyClass::H1 => (3.0, None, 30.0, 80.0, Some(0.5), MeasurementMethod::Bffb, 1.0, 5.0),
                AccuracyClass::H2 => (5.0, Some(60.0), 40.0, 80.0, Some(0.5), MeasurementMethod::Bffb, 2.0, 5.0),
                AccuracyClass::H3 => (10.0, Some(24.0), 50.0, 100.0, Some(0.4), MeasurementMethod::Bffb, 2.0, 10.0),
                AccuracyClass::H4 => (20.0, Some(10.0), 80.0, 150.0, Some(0.4), MeasurementMethod::Bf, 5.0, 10.0),
                AccuracyClass::H5 => (30.0, Some(5.0), 100.0, 150.0, None, MeasurementMethod::Bf, 10.0, 10.0),
                AccuracyClass::H6 => (60.0, Some(4.0), 100.0, 200.0, None, MeasurementMethod::Bf, 10.0, 15.0),
            };
        let instrument = match class {
            AccuracyClass::H1 => Some(0.3),
            AccuracyClass::H2 => Some(1.0),
            _ => None,
        };
        let days = match class {
            AccuracyClass::H1 | AccuracyClass::H2 | AccuracyClass::H3 => Some(30),
            _ => None,
        };
        Self {
            class,
            tolerance_coefficient: coef,
            max_line_length_km: max_len,
            max_sight_distance_geometric_m: sight_geo,
            max_sight_distance_trigonometric_m: sight_trig,
            min_staff_clearance_m: clearance,
            required_method: method,
            min_setups: 2,
            requires_double_run: class != AccuracyClass::H6,
            max_fb_difference_mm: None,
            max_single_distance_imbalance_m: single,
            max_cumulative_distance_imbalance_m: cumulative,
            max_instrument_error_mm_per_km: instrument,
            max_days_for_double_run: days,
        }
    }

    /// Allowable misclosure (mm) over `distance_km`.
    #[inline]
    pub fn tolerance_mm(&self, distance_km: f64) -> f64 {
        self.tolerance_coefficient * distance_km.max(0.0).sqrt()
    }

    pub fn validate_line_length(&self, distance_km: f64) -> Result<(), String> {
        match self.max_line_length_km {
            Some(max) if distance_km > max => Err(format!(
                "line length {distance_km:.2} km exceeds maximum {max} km for {}",
                self.class
            )),
            _ => Ok(()),
        }
    }

    pub fn validate_sight_distance(&self, distance_m: f64, kind: SightKind) -> Result<(), String> {
        let (max, label) = match kind {
            SightKind::Geometric => (self.max_sight_distance_geometric_m, "geometric"),
            SightKind::Trigonometric => (self.max_sight_distance_trigonometric_m, "trigonometric"),
        };
        if distance_m > max {
            Err(format!(
                "sight distance {distance_m:.1} m exceeds maximum {max} m for {} ({label})",
                self.class
            ))
        } else {
            Ok(())
        }
    }

    /// Only a `BFFB` requirement is restrictive; any method satisfies `BF`.
    pub fn validate_method(&self, method: MeasurementMethod) -> Result<(), String> {
        if self.required_method == MeasurementMethod::Bffb && method != MeasurementMethod::Bffb {
            Err(format!(
                "{} requires BFFB measurement method (got {method})",
                self.class
            ))
        } else {
            Ok(())
        }
    }
}

/// Parameters for all six classes plus the default class.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ClassTable {
    classes: Vec<ClassParameters>,
    default_class: AccuracyClass,
}

impl Default for ClassTable {
    fn default() -> Self {
        Self {
            classes: AccuracyClass::ALL
                .iter()
                .map(|&c| ClassParameters::regulation(c))
                .collect(),
            default_class: AccuracyClass::H3,
        }
    }
}

impl ClassTable {
    pub fn get(&self, class: AccuracyClass) -> &ClassParameters {
        &self.classes[class.index()]
    }

    pub fn get_mut(&mut self, class: AccuracyClass) -> &mut ClassParameters {
        &mut self.classes[class.index()]
    }

    pub fn default_class(&self) -> AccuracyClass {
        self.default_class
    }

    pub fn set_default_class(&mut self, class: AccuracyClass) {
        self.default_class = class;
    }

    pub fn default_parameters(&self) -> &ClassParameters {
        self.get(self.default_class)
    }

    /// Parameters in strictness order.
    pub fn iter(&self) -> impl Iterator<Item = &ClassParameters> {
        self.classes.iter()
    }

    pub fn tolerance_mm(&self, class: AccuracyClass, distance_km: f64) -> f64 {
        self.get(class).tolerance_mm(distance_km)
    }

    /// Allowable misclosure (mm) for a line of `distance_m` meters.
    pub fn allowable_misclosure_mm(&self, distance_m: f64, class: AccuracyClass) -> f64 {
        self.tolerance_mm(class, distance_m / 1000.0)
    }

    /// Tightest class whose tolerance covers `|misclosure_mm|`, scanning
    /// H1 through H6.
    pub fn classify(&self, misclosure_mm: f64, distance_km: f64) -> AchievedClass {
        let abs = misclosure_mm.abs();
        self.classes
            .iter()
            .find(|p| abs <= p.tolerance_mm(distance_km))
            .map(|p| AchievedClass::Within(p.class))
            .unwrap_or(AchievedClass::ExceedsAll)
    }
}
