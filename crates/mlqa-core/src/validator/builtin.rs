//! Ready-made validators for the built-in evidence types

use super::{BoolExp, CompareOp, Condition, Validator};
use crate::evidence::{EvidenceType, StatisticsKind};
use crate::units::{Magnitude, Quantity, Unit};

fn compare(
    entity: EvidenceType,
    function: &str,
    field: &str,
    op: CompareOp,
    threshold: Quantity,
    success: &str,
    failure: &str,
) -> Validator {
    let condition = Condition::new(field, op, threshold);
    Validator::assemble(
        BoolExp::Condition(condition),
        vec![threshold.into()],
        success.to_string(),
        failure.to_string(),
        vec![entity],
    )
    .with_creator(entity.qualified_name(), function, vec![threshold.to_string()])
}

/// Validators for `Integer` evidence
pub mod integer {
    use super::*;

    /// Value strictly below `threshold`
    #[must_use]
    pub fn less_than(threshold: impl Into<Quantity>) -> Validator {
        compare(
            EvidenceType::Integer,
            "less_than",
            "value",
            CompareOp::Lt,
            threshold.into(),
            "Integer magnitude is less than threshold {threshold}",
            "Integer magnitude exceeds threshold {threshold}",
        )
    }

    /// Value at most `threshold`
    #[must_use]
    pub fn less_or_equal_to(threshold: impl Into<Quantity>) -> Validator {
        compare(
            EvidenceType::Integer,
            "less_or_equal_to",
            "value",
            CompareOp::Le,
            threshold.into(),
            "Integer magnitude is less than or equal to threshold {threshold}",
            "Integer magnitude exceeds threshold {threshold}",
        )
    }
}

/// Validators for `Real` evidence
pub mod real {
    use super::*;

    /// Value strictly below `threshold`
    #[must_use]
    pub fn less_than(threshold: impl Into<Quantity>) -> Validator {
        compare(
            EvidenceType::Real,
            "less_than",
            "value",
            CompareOp::Lt,
            threshold.into(),
            "Real magnitude is less than threshold {threshold}",
            "Real magnitude exceeds threshold {threshold}",
        )
    }

    /// Value at most `threshold`
    #[must_use]
    pub fn less_or_equal_to(threshold: impl Into<Quantity>) -> Validator {
        compare(
            EvidenceType::Real,
            "less_or_equal_to",
            "value",
            CompareOp::Le,
            threshold.into(),
            "Real magnitude is less than or equal to threshold {threshold}",
            "Real magnitude exceeds threshold {threshold}",
        )
    }

    /// Value strictly above `threshold`
    #[must_use]
    pub fn greater_than(threshold: impl Into<Quantity>) -> Validator {
        compare(
            EvidenceType::Real,
            "greater_than",
            "value",
            CompareOp::Gt,
            threshold.into(),
            "Real magnitude is greater than threshold {threshold}",
            "Real magnitude is below threshold {threshold}",
        )
    }

    /// Value at least `threshold`
    #[must_use]
    pub fn greater_or_equal_to(threshold: impl Into<Quantity>) -> Validator {
        compare(
            EvidenceType::Real,
            "greater_or_equal_to",
            "value",
            CompareOp::Ge,
            threshold.into(),
            "Real magnitude is greater than or equal to threshold {threshold}",
            "Real magnitude is below threshold {threshold}",
        )
    }
}

/// Validators for `String` evidence
pub mod string {
    use super::*;

    fn text(
        function: &str,
        op: CompareOp,
        needle: &str,
        success: &str,
        failure: &str,
    ) -> Validator {
        Validator::assemble(
            BoolExp::Condition(Condition::new("value", op, needle)),
            vec![needle.into()],
            success.to_string(),
            failure.to_string(),
            vec![EvidenceType::String],
        )
        .with_creator(
            EvidenceType::String.qualified_name(),
            function,
            vec![needle.to_string()],
        )
    }

    /// Text contains `needle`
    #[must_use]
    pub fn contains(needle: &str) -> Validator {
        text(
            "contains",
            CompareOp::Contains,
            needle,
            "String contains {threshold}",
            "String does not contain {threshold}",
        )
    }

    /// Text equals `expected`
    #[must_use]
    pub fn equal_to(expected: &str) -> Validator {
        text(
            "equal_to",
            CompareOp::Eq,
            expected,
            "String is equal to {threshold}",
            "String is not equal to {threshold}",
        )
    }
}

/// Validators for `Image` evidence
pub mod image {
    use super::*;

    /// Record that an image was attached
    #[must_use]
    pub fn register_info(message: &str) -> Validator {
        Validator::info(message, vec![EvidenceType::Image]).with_creator(
            EvidenceType::Image.qualified_name(),
            "register_info",
            vec![message.to_string()],
        )
    }
}

/// Validators for any statistics evidence
pub mod statistics {
    use super::*;

    /// Maximum strictly below `threshold`
    #[must_use]
    pub fn max_less_than(kind: StatisticsKind, threshold: Quantity) -> Validator {
        compare(
            kind.into(),
            "max_less_than",
            "max",
            CompareOp::Lt,
            threshold,
            "Maximum value below threshold {threshold}",
            "Maximum value exceeds threshold {threshold}",
        )
    }

    /// Average strictly below `threshold`
    #[must_use]
    pub fn average_less_than(kind: StatisticsKind, threshold: Quantity) -> Validator {
        compare(
            kind.into(),
            "average_less_than",
            "avg",
            CompareOp::Lt,
            threshold,
            "Average value below threshold {threshold}",
            "Average value exceeds threshold {threshold}",
        )
    }
}

macro_rules! consumption_validators {
    ($module:ident, $kind:expr, $what:literal) => {
        #[doc = concat!("Validators for ", $what, " statistics")]
        pub mod $module {
            use super::*;

            /// Maximum consumption strictly below `value` `unit`
            #[must_use]
            pub fn max_consumption_less_than(value: impl Into<Magnitude>, unit: Unit) -> Validator {
                let threshold = Quantity::new(value, Some(unit));
                compare(
                    $kind.into(),
                    "max_consumption_less_than",
                    "max",
                    CompareOp::Lt,
                    threshold,
                    concat!("Maximum ", $what, " consumption below threshold {threshold}"),
                    concat!("Maximum ", $what, " consumption exceeds threshold {threshold}"),
                )
            }

            /// Average consumption strictly below `value` `unit`
            #[must_use]
            pub fn average_consumption_less_than(
                value: impl Into<Magnitude>,
                unit: Unit,
            ) -> Validator {
                let threshold = Quantity::new(value, Some(unit));
                compare(
                    $kind.into(),
                    "average_consumption_less_than",
                    "avg",
                    CompareOp::Lt,
                    threshold,
                    concat!("Average ", $what, " consumption below threshold {threshold}"),
                    concat!("Average ", $what, " consumption exceeds threshold {threshold}"),
                )
            }
        }
    };
}

consumption_validators!(memory, StatisticsKind::Memory, "memory");
consumption_validators!(gpu_memory, StatisticsKind::GpuMemory, "GPU memory");
consumption_validators!(gpu_power, StatisticsKind::GpuPower, "GPU power");

/// Validators for CPU statistics
pub mod cpu {
    use super::*;

    /// Maximum utilization strictly below `percent`
    #[must_use]
    pub fn max_utilization_less_than(percent: impl Into<Magnitude>) -> Validator {
        compare(
            EvidenceType::CpuStatistics,
            "max_utilization_less_than",
            "max",
            CompareOp::Lt,
            Quantity::new(percent, Some(Unit::Percent)),
            "Maximum utilization below threshold {threshold}",
            "Maximum utilization exceeds threshold {threshold}",
        )
    }

    /// Average utilization strictly below `percent`
    #[must_use]
    pub fn average_utilization_less_than(percent: impl Into<Magnitude>) -> Validator {
        compare(
            EvidenceType::CpuStatistics,
            "average_utilization_less_than",
            "avg",
            CompareOp::Lt,
            Quantity::new(percent, Some(Unit::Percent)),
            "Average utilization below threshold {threshold}",
            "Average utilization exceeds threshold {threshold}",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::{Evidence, EvidenceValue, Statistics};
    use crate::result::ResultKind;
    use crate::units::quantity;

    fn memory_max(max: f64, unit: Unit) -> Evidence {
        Evidence::new(EvidenceValue::statistics(
            StatisticsKind::Memory,
            Statistics::new(max / 2.0, 0.0, max, Some(unit)),
        ))
    }

    #[test]
    fn test_memory_threshold_across_units() {
        let v = memory::max_consumption_less_than(3000, Unit::Byte);
        assert_eq!(v.validate(&memory_max(2.0, Unit::Kilobyte)).kind, ResultKind::Success);
        assert_eq!(v.validate(&memory_max(4.0, Unit::Kilobyte)).kind, ResultKind::Failure);
        assert_eq!(v.bool_exp_str(), Some("evidence.max < 3000 byte"));
    }

    #[test]
    fn test_memory_validator_rejects_cpu_evidence() {
        let cpu = Evidence::new(EvidenceValue::statistics(
            StatisticsKind::Cpu,
            Statistics::new(1.0, 1.0, 1.0, Some(Unit::Percent)),
        ));
        let result = memory::max_consumption_less_than(1, Unit::Kilobyte).validate(&cpu);
        assert!(result.message.starts_with("type error"));
    }

    #[test]
    fn test_common_statistics_accepts_subtypes() {
        let v = statistics::max_less_than(StatisticsKind::Common, quantity(1, Unit::Mebibyte));
        assert_eq!(v.validate(&memory_max(10.0, Unit::Kilobyte)).kind, ResultKind::Success);
    }

    #[test]
    fn test_integer_and_real() {
        let e = Evidence::new(EvidenceValue::Integer {
            value: 4000,
            unit: Some(Unit::Byte),
        });
        assert_eq!(
            integer::less_than(quantity(5, Unit::Kilobyte)).validate(&e).kind,
            ResultKind::Success
        );
        assert_eq!(
            integer::less_or_equal_to(quantity(4000, Unit::Byte)).validate(&e).kind,
            ResultKind::Success
        );
        let r = Evidence::new(EvidenceValue::real(0.93));
        assert_eq!(real::greater_than(0.9).validate(&r).kind, ResultKind::Success);
        assert_eq!(real::less_than(0.9).validate(&r).kind, ResultKind::Failure);
        assert_eq!(real::greater_or_equal_to(0.93).validate(&r).kind, ResultKind::Success);
        assert_eq!(real::less_or_equal_to(0.5).validate(&r).kind, ResultKind::Failure);
    }

    #[test]
    fn test_string_validators() {
        let e = Evidence::new(EvidenceValue::String("checksum ok".into()));
        assert_eq!(string::contains("ok").validate(&e).kind, ResultKind::Success);
        assert_eq!(string::equal_to("ok").validate(&e).kind, ResultKind::Failure);
    }

    #[test]
    fn test_image_info_and_creator() {
        let v = image::register_info("confusion matrix attached");
        let creator = v.creator().expect("creator");
        assert_eq!(creator.function, "register_info");
        let e = Evidence::new(EvidenceValue::Image {
            bytes: vec![0],
            mime: "image/png".into(),
        });
        assert_eq!(v.validate(&e).kind, ResultKind::Info);
    }

    #[test]
    fn test_cpu_and_gpu() {
        let cpu = Evidence::new(EvidenceValue::statistics(
            StatisticsKind::Cpu,
            Statistics::new(40.0, 10.0, 90.0, Some(Unit::Percent)),
        ));
        assert_eq!(cpu::average_utilization_less_than(50).validate(&cpu).kind, ResultKind::Success);
        assert_eq!(cpu::max_utilization_less_than(50).validate(&cpu).kind, ResultKind::Failure);

        let power = Evidence::new(EvidenceValue::statistics(
            StatisticsKind::GpuPower,
            Statistics::new(150.0, 100.0, 200.0, Some(Unit::Watt)),
        ));
        assert_eq!(
            gpu_power::max_consumption_less_than(1, Unit::Kilowatt).validate(&power).kind,
            ResultKind::Success
        );
        let gpu_mem = Evidence::new(EvidenceValue::statistics(
            StatisticsKind::GpuMemory,
            Statistics::new(512.0, 256.0, 1024.0, Some(Unit::Mebibyte)),
        ));
        assert_eq!(
            gpu_memory::average_consumption_less_than(1, Unit::Gibibyte).validate(&gpu_mem).kind,
            ResultKind::Success
        );
    }
}
