//! Navigation guard: pure decisions, no side effects.

use super::step::Step;
use super::WizardData;

/// Forward motion needs a satisfied validator and no transition in flight.
pub fn can_advance(step: &Step, data: &WizardData, busy: bool) -> bool {
    !busy && step.validate(data)
}

pub fn can_retreat(index: usize, busy: bool) -> bool {
    index > 0 && !busy
}

/// Only steps already reached may be jumped to.
pub fn can_jump_to(index: usize, max_visited_index: usize) -> bool {
    index <= max_visited_index
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;
    use serde_json::json;

    fn gated() -> Step {
        Step::new("source", "Source").with_validator(|d| d.contains_key("ok"))
    }

    #[rstest]
    #[case(false, false, false)]
    #[case(true, false, true)]
    #[case(true, true, false)]
    #[case(false, true, false)]
    fn test_can_advance(#[case] valid: bool, #[case] busy: bool, #[case] expected: bool) {
        let mut data = WizardData::new();
        if valid {
            data.insert("ok".into(), json!(true));
        }
        assert_eq!(can_advance(&gated(), &data, busy), expected);
    }

    #[rstest]
    #[case(0, false, false)]
    #[case(1, false, true)]
    #[case(3, true, false)]
    fn test_can_retreat(#[case] index: usize, #[case] busy: bool, #[case] expected: bool) {
        assert_eq!(can_retreat(index, busy), expected);
    }

    proptest! {
        #[test]
        fn prop_jump_bounded_by_high_water_mark(index in 0usize..64, max in 0usize..64) {
            prop_assert_eq!(can_jump_to(index, max), index <= max);
        }

        #[test]
        fn prop_busy_always_blocks(index in 0usize..64) {
            let step = Step::new("any", "Any");
            prop_assert!(!can_advance(&step, &WizardData::new(), true));
            prop_assert!(!can_retreat(index, true));
        }
    }
}
