//! Unit registry and unit-aware quantities
//!
//! Every unit is an integral multiple of its dimension's base unit (bit,
//! milliwatt, millisecond, micrometer, ...). Conversions between units of the
//! same dimension are therefore exact rationals: integer magnitudes stay
//! integers whenever the result is whole, otherwise the result is real.

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised by unit parsing and conversion
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnitError {
    /// Unit string is not in the registry
    #[error("unknown unit '{0}'")]
    Unknown(String),

    /// Units measure different dimensions
    #[error("cannot convert {from} to {to}")]
    Incompatible {
        /// Source unit
        from: String,
        /// Target unit
        to: String,
    },

    /// Integer conversion overflowed
    #[error("magnitude {0} overflows during conversion")]
    Overflow(i64),

    /// Quantity text is malformed
    #[error("malformed quantity '{0}'")]
    Malformed(String),
}

/// Physical dimension of a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Dimension {
    /// Digital information (bits and bytes)
    Information,
    /// Power
    Power,
    /// Dimensionless ratio
    Ratio,
    /// Time
    Time,
    /// Temperature
    Temperature,
    /// Length
    Length,
}

/// A unit known to the registry
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Unit {
    Bit,
    Byte,
    Kilobyte,
    Megabyte,
    Gigabyte,
    Terabyte,
    Kibibyte,
    Mebibyte,
    Gibibyte,
    Tebibyte,
    Milliwatt,
    Watt,
    Kilowatt,
    Percent,
    Millisecond,
    Second,
    Minute,
    Hour,
    Celsius,
    Millimeter,
    Centimeter,
    Meter,
    Kilometer,
    Inch,
    Foot,
    Mile,
}

const KI: u128 = 1024;

impl Unit {
    /// Every registered unit
    pub const ALL: [Self; 26] = [
        Self::Bit,
        Self::Byte,
        Self::Kilobyte,
        Self::Megabyte,
        Self::Gigabyte,
        Self::Terabyte,
        Self::Kibibyte,
        Self::Mebibyte,
        Self::Gibibyte,
        Self::Tebibyte,
        Self::Milliwatt,
        Self::Watt,
        Self::Kilowatt,
        Self::Percent,
        Self::Millisecond,
        Self::Second,
        Self::Minute,
        Self::Hour,
        Self::Celsius,
        Self::Millimeter,
        Self::Centimeter,
        Self::Meter,
        Self::Kilometer,
        Self::Inch,
        Self::Foot,
        Self::Mile,
    ];

    /// Dimension this unit measures
    #[must_use]
    pub const fn dimension(self) -> Dimension {
        match self {
            Self::Bit
            | Self::Byte
            | Self::Kilobyte
            | Self::Megabyte
            | Self::Gigabyte
            | Self::Terabyte
            | Self::Kibibyte
            | Self::Mebibyte
            | Self::Gibibyte
            | Self::Tebibyte => Dimension::Information,
            Self::Milliwatt | Self::Watt | Self::Kilowatt => Dimension::Power,
            Self::Percent => Dimension::Ratio,
            Self::Millisecond | Self::Second | Self::Minute | Self::Hour => Dimension::Time,
            Self::Celsius => Dimension::Temperature,
            Self::Millimeter
            | Self::Centimeter
            | Self::Meter
            | Self::Kilometer
            | Self::Inch
            | Self::Foot
            | Self::Mile => Dimension::Length,
        }
    }

    /// Size of this unit in base units of its dimension
    #[must_use]
    pub const fn factor(self) -> u128 {
        match self {
            Self::Bit => 1,
            Self::Byte => 8,
            Self::Kilobyte => 8 * 1_000,
            Self::Megabyte => 8 * 1_000_000,
            Self::Gigabyte => 8 * 1_000_000_000,
            Self::Terabyte => 8 * 1_000_000_000_000,
            Self::Kibibyte => 8 * KI,
            Self::Mebibyte => 8 * KI * KI,
            Self::Gibibyte => 8 * KI * KI * KI,
            Self::Tebibyte => 8 * KI * KI * KI * KI,
            Self::Milliwatt => 1,
            Self::Watt => 1_000,
            Self::Kilowatt => 1_000_000,
            Self::Percent | Self::Celsius => 1,
            Self::Millisecond => 1,
            Self::Second => 1_000,
            Self::Minute => 60_000,
            Self::Hour => 3_600_000,
            // micrometers
            Self::Millimeter => 1_000,
            Self::Centimeter => 10_000,
            Self::Meter => 1_000_000,
            Self::Kilometer => 1_000_000_000,
            Self::Inch => 25_400,
            Self::Foot => 304_800,
            Self::Mile => 1_609_344_000,
        }
    }

    /// Canonical long name, used for serialization
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Bit => "bit",
            Self::Byte => "byte",
            Self::Kilobyte => "kilobyte",
            Self::Megabyte => "megabyte",
            Self::Gigabyte => "gigabyte",
            Self::Terabyte => "terabyte",
            Self::Kibibyte => "kibibyte",
            Self::Mebibyte => "mebibyte",
            Self::Gibibyte => "gibibyte",
            Self::Tebibyte => "tebibyte",
            Self::Milliwatt => "milliwatt",
            Self::Watt => "watt",
            Self::Kilowatt => "kilowatt",
            Self::Percent => "percent",
            Self::Millisecond => "millisecond",
            Self::Second => "second",
            Self::Minute => "minute",
            Self::Hour => "hour",
            Self::Celsius => "celsius",
            Self::Millimeter => "millimeter",
            Self::Centimeter => "centimeter",
            Self::Meter => "meter",
            Self::Kilometer => "kilometer",
            Self::Inch => "inch",
            Self::Foot => "foot",
            Self::Mile => "mile",
        }
    }

    /// Short symbol
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Bit => "bit",
            Self::Byte => "B",
            Self::Kilobyte => "kB",
            Self::Megabyte => "MB",
            Self::Gigabyte => "GB",
            Self::Terabyte => "TB",
            Self::Kibibyte => "KiB",
            Self::Mebibyte => "MiB",
            Self::Gibibyte => "GiB",
            Self::Tebibyte => "TiB",
            Self::Milliwatt => "mW",
            Self::Watt => "W",
            Self::Kilowatt => "kW",
            Self::Percent => "%",
            Self::Millisecond => "ms",
            Self::Second => "s",
            Self::Minute => "min",
            Self::Hour => "h",
            Self::Celsius => "degC",
            Self::Millimeter => "mm",
            Self::Centimeter => "cm",
            Self::Meter => "m",
            Self::Kilometer => "km",
            Self::Inch => "in",
            Self::Foot => "ft",
            Self::Mile => "mi",
        }
    }

    /// Whether values in `self` can be converted to `other`
    #[must_use]
    pub fn is_compatible(self, other: Self) -> bool {
        self.dimension() == other.dimension()
    }
}

fn lookup(raw: &str) -> Option<Unit> {
    let trimmed = raw.trim();
    // Symbols are case sensitive: "mW" and "MW" differ.
    if let Some(unit) = Unit::ALL.into_iter().find(|u| u.symbol() == trimmed) {
        return Some(unit);
    }
    let lower = trimmed.to_ascii_lowercase().replace(' ', "_");
    let alias = match lower.as_str() {
        "bits" => Some(Unit::Bit),
        "bytes" => Some(Unit::Byte),
        "kb" => Some(Unit::Kilobyte),
        "kib" => Some(Unit::Kibibyte),
        "mib" => Some(Unit::Mebibyte),
        "gib" => Some(Unit::Gibibyte),
        "tib" => Some(Unit::Tebibyte),
        "pct" | "percentage" => Some(Unit::Percent),
        "sec" | "secs" => Some(Unit::Second),
        "mins" => Some(Unit::Minute),
        "hr" | "hrs" => Some(Unit::Hour),
        "°c" | "degree_celsius" | "degrees_celsius" => Some(Unit::Celsius),
        "metre" | "metres" => Some(Unit::Meter),
        "inches" => Some(Unit::Inch),
        "feet" => Some(Unit::Foot),
        _ => None,
    };
    alias.or_else(|| {
        Unit::ALL.into_iter().find(|u| {
            let name = u.name();
            lower == name || lower.strip_suffix('s') == Some(name)
        })
    })
}

/// Parse a unit string (long name, plural or symbol)
///
/// # Errors
///
/// Returns [`UnitError::Unknown`] if the string is not registered.
pub fn parse(raw: &str) -> Result<Unit, UnitError> {
    lookup(raw).ok_or_else(|| UnitError::Unknown(raw.to_string()))
}

/// Canonical string form of a unit
#[must_use]
pub fn format(unit: Unit) -> String {
    unit.name().to_string()
}

impl FromStr for Unit {
    type Err = UnitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s)
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for Unit {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for Unit {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(de::Error::custom)
    }
}

/// Numeric magnitude of a quantity
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Magnitude {
    /// Integral magnitude
    Integer(i64),
    /// Real magnitude
    Real(f64),
}

impl Magnitude {
    /// Value as a float
    #[must_use]
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Integer(i) => i as f64,
            Self::Real(r) => r,
        }
    }

    /// Whether the magnitude is integral
    #[must_use]
    pub const fn is_integer(self) -> bool {
        matches!(self, Self::Integer(_))
    }
}

impl PartialEq for Magnitude {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Integer(a), Self::Integer(b)) => a == b,
            _ => self.as_f64() == other.as_f64(),
        }
    }
}

impl PartialOrd for Magnitude {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Integer(a), Self::Integer(b)) => a.partial_cmp(b),
            _ => self.as_f64().partial_cmp(&other.as_f64()),
        }
    }
}

impl From<i64> for Magnitude {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for Magnitude {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<u32> for Magnitude {
    fn from(value: u32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for Magnitude {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl fmt::Display for Magnitude {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(i) => write!(f, "{i}"),
            Self::Real(r) => write!(f, "{r}"),
        }
    }
}

/// A magnitude with an optional unit
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quantity {
    /// Numeric value
    pub magnitude: Magnitude,
    /// Unit, absent for dimensionless counts
    pub unit: Option<Unit>,
}

/// Build a quantity
#[must_use]
pub fn quantity(magnitude: impl Into<Magnitude>, unit: Unit) -> Quantity {
    Quantity::new(magnitude, Some(unit))
}

/// Convert a quantity to `unit`
///
/// # Errors
///
/// Returns [`UnitError`] if the quantity has no unit or the dimensions differ.
pub fn convert(q: Quantity, unit: Unit) -> Result<Quantity, UnitError> {
    q.to(unit)
}

impl Quantity {
    /// Create a quantity
    #[must_use]
    pub fn new(magnitude: impl Into<Magnitude>, unit: Option<Unit>) -> Self {
        Self {
            magnitude: magnitude.into(),
            unit,
        }
    }

    /// Dimensionless quantity
    #[must_use]
    pub fn unitless(magnitude: impl Into<Magnitude>) -> Self {
        Self::new(magnitude, None)
    }

    /// Convert to another unit of the same dimension
    ///
    /// Integer magnitudes stay integral when the converted value is whole.
    ///
    /// # Errors
    ///
    /// Returns [`UnitError::Incompatible`] if the quantity has no unit or the
    /// dimensions differ.
    pub fn to(self, target: Unit) -> Result<Self, UnitError> {
        let Some(source) = self.unit else {
            return Err(UnitError::Incompatible {
                from: "dimensionless".to_string(),
                to: target.name().to_string(),
            });
        };
        if !source.is_compatible(target) {
            return Err(UnitError::Incompatible {
                from: source.name().to_string(),
                to: target.name().to_string(),
            });
        }
        if source == target {
            return Ok(self);
        }
        let (num, den) = (source.factor(), target.factor());
        let magnitude = match self.magnitude {
            Magnitude::Integer(i) => convert_integer(i, num, den)?,
            Magnitude::Real(r) => Magnitude::Real(r * num as f64 / den as f64),
        };
        Ok(Self::new(magnitude, Some(target)))
    }

    /// Order two quantities, converting `other` into this quantity's unit
    ///
    /// # Errors
    ///
    /// Returns [`UnitError`] if exactly one side is dimensionless, the
    /// dimensions differ, or a magnitude is NaN.
    pub fn compare(&self, other: &Self) -> Result<Ordering, UnitError> {
        let rhs = match (self.unit, other.unit) {
            (None, None) => *other,
            (Some(unit), Some(_)) => other.to(unit)?,
            (Some(unit), None) | (None, Some(unit)) => {
                return Err(UnitError::Incompatible {
                    from: "dimensionless".to_string(),
                    to: unit.name().to_string(),
                });
            }
        };
        self.magnitude
            .partial_cmp(&rhs.magnitude)
            .ok_or_else(|| UnitError::Malformed(format!("{self} vs {other}")))
    }
}

fn convert_integer(value: i64, num: u128, den: u128) -> Result<Magnitude, UnitError> {
    let num = i128::try_from(num).map_err(|_| UnitError::Overflow(value))?;
    let den = i128::try_from(den).map_err(|_| UnitError::Overflow(value))?;
    let scaled = i128::from(value)
        .checked_mul(num)
        .ok_or(UnitError::Overflow(value))?;
    if scaled % den == 0 {
        let whole = i64::try_from(scaled / den).map_err(|_| UnitError::Overflow(value))?;
        Ok(Magnitude::Integer(whole))
    } else {
        Ok(Magnitude::Real(scaled as f64 / den as f64))
    }
}

impl From<i64> for Quantity {
    fn from(value: i64) -> Self {
        Self::unitless(value)
    }
}

impl From<i32> for Quantity {
    fn from(value: i32) -> Self {
        Self::unitless(value)
    }
}

impl From<f64> for Quantity {
    fn from(value: f64) -> Self {
        Self::unitless(value)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.unit {
            Some(unit) => write!(f, "{} {unit}", self.magnitude),
            None => write!(f, "{}", self.magnitude),
        }
    }
}

impl FromStr for Quantity {
    type Err = UnitError;

    /// Parse `"<number> [unit]"`, e.g. `"3000 byte"` or `"0.5"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (number, unit) = match trimmed.split_once(char::is_whitespace) {
            Some((n, u)) => (n, Some(u.trim())),
            None => (trimmed, None),
        };
        let magnitude = number
            .parse::<i64>()
            .map(Magnitude::Integer)
            .or_else(|_| number.parse::<f64>().map(Magnitude::Real))
            .map_err(|_| UnitError::Malformed(s.to_string()))?;
        let unit = unit.map(parse).transpose()?;
        Ok(Self::new(magnitude, unit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_names_plurals_symbols() {
        assert_eq!(parse("byte").expect("parse"), Unit::Byte);
        assert_eq!(parse("bytes").expect("parse"), Unit::Byte);
        assert_eq!(parse("B").expect("parse"), Unit::Byte);
        assert_eq!(parse("KiB").expect("parse"), Unit::Kibibyte);
        assert_eq!(parse("kb").expect("parse"), Unit::Kilobyte);
        assert_eq!(parse("Mebibytes").expect("parse"), Unit::Mebibyte);
        assert_eq!(parse("W").expect("parse"), Unit::Watt);
        assert_eq!(parse("mW").expect("parse"), Unit::Milliwatt);
        assert_eq!(parse("%").expect("parse"), Unit::Percent);
        assert_eq!(parse("miles").expect("parse"), Unit::Mile);
        assert_eq!(parse("metre").expect("parse"), Unit::Meter);
        assert_eq!(parse("celsius").expect("parse"), Unit::Celsius);
    }

    #[test]
    fn test_parse_unknown() {
        assert_eq!(
            parse("furlong").unwrap_err(),
            UnitError::Unknown("furlong".to_string())
        );
    }

    #[test]
    fn test_format_canonical() {
        for unit in Unit::ALL {
            assert_eq!(parse(&format(unit)).expect("roundtrip"), unit);
            assert_eq!(parse(unit.symbol()).expect("symbol"), unit);
        }
    }

    #[test]
    fn test_binary_and_decimal_ratios() {
        let q = quantity(2, Unit::Kibibyte).to(Unit::Byte).expect("convert");
        assert_eq!(q.magnitude, Magnitude::Integer(2048));
        let q = quantity(2, Unit::Kilobyte).to(Unit::Byte).expect("convert");
        assert_eq!(q.magnitude, Magnitude::Integer(2000));
        let q = quantity(3, Unit::Mebibyte).to(Unit::Kibibyte).expect("convert");
        assert_eq!(q.magnitude, Magnitude::Integer(3072));
    }

    #[test]
    fn test_inexact_integer_becomes_real() {
        let q = quantity(1500, Unit::Byte).to(Unit::Kibibyte).expect("convert");
        assert!(!q.magnitude.is_integer());
        assert!((q.magnitude.as_f64() - 1500.0 / 1024.0).abs() < 1e-12);
    }

    #[test]
    fn test_power_and_length() {
        let q = quantity(2500, Unit::Milliwatt).to(Unit::Watt).expect("convert");
        assert!((q.magnitude.as_f64() - 2.5).abs() < 1e-12);
        let q = quantity(1, Unit::Mile).to(Unit::Meter).expect("convert");
        assert!((q.magnitude.as_f64() - 1609.344).abs() < 1e-9);
    }

    #[test]
    fn test_incompatible() {
        let err = quantity(1, Unit::Byte).to(Unit::Watt).unwrap_err();
        assert!(matches!(err, UnitError::Incompatible { .. }));
        assert!(Quantity::unitless(3).to(Unit::Byte).is_err());
    }

    #[test]
    fn test_compare_across_units() {
        let max = quantity(2, Unit::Kilobyte);
        let threshold = quantity(3000, Unit::Byte);
        assert_eq!(max.compare(&threshold).expect("compare"), Ordering::Less);
        let max = quantity(4, Unit::Kilobyte);
        assert_eq!(max.compare(&threshold).expect("compare"), Ordering::Greater);
        assert!(max.compare(&Quantity::unitless(1)).is_err());
    }

    #[test]
    fn test_serde_shape() {
        let json = serde_json::to_value(quantity(42, Unit::Meter)).expect("serialize");
        assert_eq!(json, serde_json::json!({"magnitude": 42, "unit": "meter"}));
        let json = serde_json::to_value(Quantity::unitless(0.5)).expect("serialize");
        assert_eq!(json, serde_json::json!({"magnitude": 0.5, "unit": null}));
        let back: Quantity =
            serde_json::from_value(serde_json::json!({"magnitude": 2.0, "unit": "KiB"}))
                .expect("deserialize");
        assert_eq!(back, quantity(2.0, Unit::Kibibyte));
        assert!(
            serde_json::from_value::<Quantity>(serde_json::json!({"magnitude": 1, "unit": "zz"}))
                .is_err()
        );
    }

    #[test]
    fn test_quantity_text_roundtrip() {
        let q: Quantity = "3000 byte".parse().expect("parse");
        assert_eq!(q, quantity(3000, Unit::Byte));
        assert_eq!(q.to_string(), "3000 byte");
        let q: Quantity = "0.25".parse().expect("parse");
        assert_eq!(q, Quantity::unitless(0.25));
        assert!("abc byte".parse::<Quantity>().is_err());
        assert!("3 parsecs".parse::<Quantity>().is_err());
    }

    proptest! {
        #[test]
        fn prop_integer_roundtrip_exact(value in -1_000_000i64..1_000_000, idx in 0usize..10) {
            let unit = Unit::ALL[idx];
            let q = quantity(value, unit);
            let there = q.to(Unit::Bit).expect("to bit");
            let back = there.to(unit).expect("back");
            prop_assert_eq!(back.magnitude, Magnitude::Integer(value));
        }

        #[test]
        fn prop_real_roundtrip_within_tolerance(
            value in -1.0e6f64..1.0e6,
            a in 0usize..26,
            b in 0usize..26,
        ) {
            let (from, to) = (Unit::ALL[a], Unit::ALL[b]);
            prop_assume!(from.is_compatible(to));
            let q = quantity(value, from);
            let back = q.to(to).expect("to").to(from).expect("back");
            let tolerance = 1e-9 * value.abs().max(1.0);
            prop_assert!((back.magnitude.as_f64() - value).abs() <= tolerance);
        }
    }
}
