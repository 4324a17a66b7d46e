//! Summary statistics over sampled resource usage

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::units::{Quantity, Unit, UnitError};

/// Domain flavour of a statistics record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatisticsKind {
    /// Generic statistics
    Common,
    /// CPU utilization
    Cpu,
    /// Process memory consumption
    Memory,
    /// GPU memory consumption
    GpuMemory,
    /// GPU power draw
    GpuPower,
}

impl StatisticsKind {
    /// Unit assumed when a record omits one
    #[must_use]
    pub const fn default_unit(self) -> Option<Unit> {
        match self {
            Self::Common => None,
            Self::Cpu => Some(Unit::Percent),
            Self::Memory => Some(Unit::Kilobyte),
            Self::GpuMemory => Some(Unit::Mebibyte),
            Self::GpuPower => Some(Unit::Watt),
        }
    }
}

/// Average, minimum and maximum of a sample series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    /// Arithmetic mean
    pub avg: f64,
    /// Smallest sample
    pub min: f64,
    /// Largest sample
    pub max: f64,
    /// Unit of all three values
    pub unit: Option<Unit>,
}

impl Statistics {
    /// Create a record
    #[must_use]
    pub const fn new(avg: f64, min: f64, max: f64, unit: Option<Unit>) -> Self {
        Self {
            avg,
            min,
            max,
            unit,
        }
    }

    /// Aggregate samples taken in `native` and express them in `requested`.
    ///
    /// An empty series yields zeros.
    ///
    /// # Errors
    ///
    /// Returns [`UnitError`] if the units are incompatible.
    pub fn from_samples(samples: &[f64], native: Unit, requested: Unit) -> Result<Self, UnitError> {
        if samples.is_empty() {
            if !native.is_compatible(requested) {
                return Err(UnitError::Incompatible {
                    from: native.name().to_string(),
                    to: requested.name().to_string(),
                });
            }
            return Ok(Self::new(0.0, 0.0, 0.0, Some(requested)));
        }
        let sum: f64 = samples.iter().sum();
        let avg = sum / samples.len() as f64;
        let min = samples.iter().copied().fold(f64::INFINITY, f64::min);
        let max = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let convert = |v: f64| -> Result<f64, UnitError> {
            Ok(Quantity::new(v, Some(native))
                .to(requested)?
                .magnitude
                .as_f64())
        };
        Ok(Self::new(convert(avg)?, convert(min)?, convert(max)?, Some(requested)))
    }

    /// Average as a quantity
    #[must_use]
    pub fn avg_quantity(&self) -> Quantity {
        Quantity::new(self.avg, self.unit)
    }

    /// Minimum as a quantity
    #[must_use]
    pub fn min_quantity(&self) -> Quantity {
        Quantity::new(self.min, self.unit)
    }

    /// Maximum as a quantity
    #[must_use]
    pub fn max_quantity(&self) -> Quantity {
        Quantity::new(self.max, self.unit)
    }
}

impl fmt::Display for Statistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = self.unit.map(|u| format!(" {u}")).unwrap_or_default();
        write!(
            f,
            "Average: {}{unit} / Minimum: {}{unit} / Maximum: {}{unit}",
            self.avg, self.min, self.max
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_samples_converts_units() {
        let samples = [1024.0, 2048.0, 3072.0];
        let stats = Statistics::from_samples(&samples, Unit::Kibibyte, Unit::Mebibyte)
            .expect("aggregate");
        assert!((stats.avg - 2.0).abs() < 1e-12);
        assert!((stats.min - 1.0).abs() < 1e-12);
        assert!((stats.max - 3.0).abs() < 1e-12);
        assert_eq!(stats.unit, Some(Unit::Mebibyte));
    }

    #[test]
    fn test_from_samples_empty_is_zero() {
        let stats =
            Statistics::from_samples(&[], Unit::Kibibyte, Unit::Kilobyte).expect("aggregate");
        assert_eq!(stats, Statistics::new(0.0, 0.0, 0.0, Some(Unit::Kilobyte)));
    }

    #[test]
    fn test_from_samples_incompatible() {
        assert!(Statistics::from_samples(&[1.0], Unit::Percent, Unit::Byte).is_err());
        assert!(Statistics::from_samples(&[], Unit::Percent, Unit::Byte).is_err());
    }

    #[test]
    fn test_default_units() {
        assert_eq!(StatisticsKind::Memory.default_unit(), Some(Unit::Kilobyte));
        assert_eq!(StatisticsKind::GpuMemory.default_unit(), Some(Unit::Mebibyte));
        assert_eq!(StatisticsKind::GpuPower.default_unit(), Some(Unit::Watt));
        assert_eq!(StatisticsKind::Cpu.default_unit(), Some(Unit::Percent));
    }

    #[test]
    fn test_display() {
        let stats = Statistics::new(1.5, 1.0, 2.0, Some(Unit::Watt));
        assert_eq!(
            stats.to_string(),
            "Average: 1.5 watt / Minimum: 1 watt / Maximum: 2 watt"
        );
    }
}
