use serde::{Deserialize, Serialize};

use crate::models::{DiabetesType, ReadingContext};

/// Which of the four target ranges applies to a reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetContext {
    Fasting,
    BeforeMeal,
    AfterMeal,
    Bedtime,
}

impl TargetContext {
    pub const ALL: [Self; 4] = [
        Self::Fasting,
        Self::BeforeMeal,
        Self::AfterMeal,
        Self::Bedtime,
    ];

    /// Readings without a context, or tagged `random`, are judged against the
    /// after-meal range. Exercise readings use the before-meal range.
    #[must_use]
    pub const fn for_reading(context: Option<ReadingContext>) -> Self {
        match context {
            Some(ReadingContext::Fasting) => Self::Fasting,
            Some(ReadingContext::PreMeal | ReadingContext::Exercise) => Self::BeforeMeal,
            Some(ReadingContext::Bedtime) => Self::Bedtime,
            Some(ReadingContext::PostMeal | ReadingContext::Random) | None => Self::AfterMeal,
        }
    }
}

/// Target window in mg/dL. A `min` of 0 means no lower bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRange {
    pub min: i32,
    pub max: i32,
}

impl TargetRange {
    const fn new(min: i32, max: i32) -> Self {
        Self { min, max }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Targets {
    pub fasting: TargetRange,
    pub before_meal: TargetRange,
    pub after_meal: TargetRange,
    pub bedtime: TargetRange,
}

impl Targets {
    #[must_use]
    pub const fn range(&self, context: TargetContext) -> TargetRange {
        match context {
            TargetContext::Fasting => self.fasting,
            TargetContext::BeforeMeal => self.before_meal,
            TargetContext::AfterMeal => self.after_meal,
            TargetContext::Bedtime => self.bedtime,
        }
    }
}

const TYPE1_TARGETS: Targets = Targets {
    fasting: TargetRange::new(80, 130),
    before_meal: TargetRange::new(80, 130),
    after_meal: TargetRange::new(0, 180),
    bedtime: TargetRange::new(90, 150),
};

const TYPE2_TARGETS: Targets = Targets {
    fasting: TargetRange::new(80, 130),
    before_meal: TargetRange::new(80, 130),
    after_meal: TargetRange::new(0, 180),
    bedtime: TargetRange::new(100, 140),
};

const GESTATIONAL_TARGETS: Targets = Targets {
    fasting: TargetRange::new(0, 95),
    before_meal: TargetRange::new(0, 95),
    after_meal: TargetRange::new(0, 140),
    bedtime: TargetRange::new(0, 120),
};

const PREDIABETES_TARGETS: Targets = Targets {
    fasting: TargetRange::new(70, 99),
    before_meal: TargetRange::new(70, 99),
    after_meal: TargetRange::new(0, 140),
    bedtime: TargetRange::new(70, 120),
};

/// Target ranges for a diabetes type. An unknown type (`None`) gets the
/// type 2 table.
#[must_use]
pub const fn targets_for(category: Option<DiabetesType>) -> Targets {
    match category {
        Some(DiabetesType::Type1) => TYPE1_TARGETS,
        Some(DiabetesType::Type2) | None => TYPE2_TARGETS,
        Some(DiabetesType::Gestational) => GESTATIONAL_TARGETS,
        Some(DiabetesType::Prediabetes) => PREDIABETES_TARGETS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_category_uses_type2() {
        assert_eq!(targets_for(None), targets_for(Some(DiabetesType::Type2)));
    }

    #[test]
    fn test_every_range_is_well_formed() {
        for category in DiabetesType::ALL {
            let targets = targets_for(Some(category));
            for ctx in TargetContext::ALL {
                let range = targets.range(ctx);
                assert!(range.min >= 0);
                assert!(range.max > range.min, "{category:?} {ctx:?}");
            }
        }
    }

    #[test]
    fn test_gestational_is_tighter_after_meals() {
        let gdm = targets_for(Some(DiabetesType::Gestational));
        let t2 = targets_for(Some(DiabetesType::Type2));
        assert!(gdm.after_meal.max < t2.after_meal.max);
        assert_eq!(gdm.fasting.min, 0);
    }

    #[test]
    fn test_context_mapping() {
        assert_eq!(TargetContext::for_reading(None), TargetContext::AfterMeal);
        assert_eq!(
            TargetContext::for_reading(Some(ReadingContext::Random)),
            TargetContext::AfterMeal
        );
        assert_eq!(
            TargetContext::for_reading(Some(ReadingContext::Exercise)),
            TargetContext::BeforeMeal
        );
        assert_eq!(
            TargetContext::for_reading(Some(ReadingContext::Fasting)),
            TargetContext::Fasting
        );
    }
}
