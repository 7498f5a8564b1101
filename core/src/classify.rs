use serde::{Deserialize, Serialize};

use crate::models::{DiabetesType, GLUCOSE_MAX, GLUCOSE_MIN, ReadingContext};
use crate::targets::{TargetContext, TargetRange, targets_for};

/// Below this value a reading is low for every diabetes type.
pub const HYPO_THRESHOLD: i32 = 70;
/// Readings more than this far above the target max are `VeryHigh`.
pub const VERY_HIGH_MARGIN: i32 = 50;
/// Type 1 readings above this value get a ketone check instruction.
pub const KETONE_THRESHOLD: i32 = 300;

const CONTACT_PROVIDER: &str =
    "Contact your healthcare provider within 24 hours if this persists.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GlucoseTier {
    Low,
    Normal,
    High,
    VeryHigh,
}

impl GlucoseTier {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::VeryHigh => "very_high",
        }
    }
}

/// Derived classification of one reading. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlucoseStatus {
    pub tier: GlucoseTier,
    pub message: String,
    pub recommendation: String,
    pub target: TargetRange,
}

/// Classify a single reading against the target range for its context.
///
/// Values outside the meter domain are clamped first. A value sitting exactly
/// on a boundary takes the safer tier: `max` is normal, `max + 50` is high.
#[must_use]
pub fn classify(
    value: i32,
    category: Option<DiabetesType>,
    context: Option<ReadingContext>,
) -> GlucoseStatus {
    let value = value.clamp(GLUCOSE_MIN, GLUCOSE_MAX);
    let target_context = TargetContext::for_reading(context);
    let range = targets_for(category).range(target_context);
    let label = range_label(range);

    if value < HYPO_THRESHOLD || value < range.min {
        let recommendation = if value < HYPO_THRESHOLD {
            "Treat immediately with 15g of fast-acting carbohydrate, recheck in 15 minutes, \
             and repeat if still low."
        } else {
            "Have a light snack and monitor your levels for the next 30 minutes."
        };
        return GlucoseStatus {
            tier: GlucoseTier::Low,
            message: format!("{value} mg/dL is below your target ({label})."),
            recommendation: recommendation.to_string(),
            target: range,
        };
    }

    if value <= range.max {
        return GlucoseStatus {
            tier: GlucoseTier::Normal,
            message: format!("{value} mg/dL is within your target ({label})."),
            recommendation: normal_advice(target_context).to_string(),
            target: range,
        };
    }

    if value <= range.max + VERY_HIGH_MARGIN {
        let mut advice = vec![high_context_advice(target_context)];
        match category {
            Some(DiabetesType::Type1) => {
                advice.push("Consider a correction dose as directed by your care plan.");
            }
            Some(DiabetesType::Type2) => {
                advice.push("Review the timing of your medication with meals.");
            }
            _ => {}
        }
        return GlucoseStatus {
            tier: GlucoseTier::High,
            message: format!("{value} mg/dL is above your target ({label})."),
            recommendation: advice.join(" "),
            target: range,
        };
    }

    let mut advice = vec!["Drink water to stay hydrated."];
    if value > KETONE_THRESHOLD && category == Some(DiabetesType::Type1) {
        advice.push("Check for ketones now.");
    }
    advice.push(CONTACT_PROVIDER);
    GlucoseStatus {
        tier: GlucoseTier::VeryHigh,
        message: format!("{value} mg/dL is well above your target ({label})."),
        recommendation: advice.join(" "),
        target: range,
    }
}

fn range_label(range: TargetRange) -> String {
    if range.min == 0 {
        format!("under {} mg/dL", range.max)
    } else {
        format!("{}-{} mg/dL", range.min, range.max)
    }
}

const fn normal_advice(context: TargetContext) -> &'static str {
    match context {
        TargetContext::Fasting => "Great fasting number. Your overnight control is on track.",
        TargetContext::BeforeMeal => {
            "Good pre-meal level. Keep portions balanced to stay in range after eating."
        }
        TargetContext::AfterMeal => "Nice work. Your meal choices are keeping you in range.",
        TargetContext::Bedtime => "Good bedtime level. You are set for a steady night.",
    }
}

const fn high_context_advice(context: TargetContext) -> &'static str {
    match context {
        TargetContext::BeforeMeal => {
            "Take a short walk before eating and consider reducing your portion size."
        }
        TargetContext::AfterMeal => "A 20-30 minute walk can help bring your level down.",
        TargetContext::Fasting => "Review the timing and size of your evening snack.",
        TargetContext::Bedtime => "Skip any bedtime snack and recheck in the morning.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTEXTS: [Option<ReadingContext>; 7] = [
        None,
        Some(ReadingContext::Fasting),
        Some(ReadingContext::PreMeal),
        Some(ReadingContext::PostMeal),
        Some(ReadingContext::Bedtime),
        Some(ReadingContext::Random),
        Some(ReadingContext::Exercise),
    ];

    fn categories() -> Vec<Option<DiabetesType>> {
        let mut all: Vec<_> = DiabetesType::ALL.iter().copied().map(Some).collect();
        all.push(None);
        all
    }

    fn range(category: Option<DiabetesType>, ctx: Option<ReadingContext>) -> TargetRange {
        targets_for(category).range(TargetContext::for_reading(ctx))
    }

    #[test]
    fn test_max_is_normal_and_max_plus_one_is_high() {
        for category in categories() {
            for ctx in CONTEXTS {
                let r = range(category, ctx);
                assert_eq!(
                    classify(r.max, category, ctx).tier,
                    GlucoseTier::Normal,
                    "{category:?} {ctx:?}"
                );
                assert_eq!(
                    classify(r.max + 1, category, ctx).tier,
                    GlucoseTier::High,
                    "{category:?} {ctx:?}"
                );
            }
        }
    }

    #[test]
    fn test_high_upper_boundary_is_inclusive() {
        for category in categories() {
            for ctx in CONTEXTS {
                let r = range(category, ctx);
                assert_eq!(
                    classify(r.max + VERY_HIGH_MARGIN, category, ctx).tier,
                    GlucoseTier::High
                );
                assert_eq!(
                    classify(r.max + VERY_HIGH_MARGIN + 1, category, ctx).tier,
                    GlucoseTier::VeryHigh
                );
            }
        }
    }

    #[test]
    fn test_below_70_is_always_low() {
        for category in categories() {
            for ctx in CONTEXTS {
                for value in [20, 45, 69] {
                    let status = classify(value, category, ctx);
                    assert_eq!(status.tier, GlucoseTier::Low);
                    assert!(status.recommendation.contains("15g"));
                }
            }
        }
    }

    #[test]
    fn test_below_min_but_above_70_gets_snack_advice() {
        let status = classify(75, Some(DiabetesType::Type1), Some(ReadingContext::Fasting));
        assert_eq!(status.tier, GlucoseTier::Low);
        assert!(status.recommendation.contains("light snack"));
        assert!(status.recommendation.contains("30 minutes"));
    }

    #[test]
    fn test_min_value_is_normal() {
        let status = classify(80, Some(DiabetesType::Type1), Some(ReadingContext::Fasting));
        assert_eq!(status.tier, GlucoseTier::Normal);
    }

    #[test]
    fn test_normal_advice_differs_per_context() {
        let fasting = classify(100, Some(DiabetesType::Type2), Some(ReadingContext::Fasting));
        let pre = classify(100, Some(DiabetesType::Type2), Some(ReadingContext::PreMeal));
        let post = classify(120, Some(DiabetesType::Type2), Some(ReadingContext::PostMeal));
        let bed = classify(120, Some(DiabetesType::Type2), Some(ReadingContext::Bedtime));
        let all = [
            &fasting.recommendation,
            &pre.recommendation,
            &post.recommendation,
            &bed.recommendation,
        ];
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_high_pre_meal_type1_advice() {
        let status = classify(150, Some(DiabetesType::Type1), Some(ReadingContext::PreMeal));
        assert_eq!(status.tier, GlucoseTier::High);
        assert!(status.recommendation.contains("walk before eating"));
        assert!(status.recommendation.contains("correction dose"));
        assert!(!status.recommendation.contains("medication"));
    }

    #[test]
    fn test_high_post_meal_type2_advice() {
        let status = classify(200, Some(DiabetesType::Type2), Some(ReadingContext::PostMeal));
        assert_eq!(status.tier, GlucoseTier::High);
        assert!(status.recommendation.contains("20-30 minute walk"));
        assert!(status.recommendation.contains("medication"));
    }

    #[test]
    fn test_high_fasting_mentions_evening_snack() {
        let status = classify(140, Some(DiabetesType::Prediabetes), Some(ReadingContext::Fasting));
        assert_eq!(status.tier, GlucoseTier::High);
        assert!(status.recommendation.contains("evening snack"));
        assert!(!status.recommendation.contains("correction"));
    }

    #[test]
    fn test_very_high_type1_above_300_checks_ketones() {
        let status = classify(320, Some(DiabetesType::Type1), Some(ReadingContext::PostMeal));
        assert_eq!(status.tier, GlucoseTier::VeryHigh);
        assert!(status.recommendation.contains("hydrated"));
        assert!(status.recommendation.contains("ketones"));
        assert!(status.recommendation.ends_with(CONTACT_PROVIDER));
    }

    #[test]
    fn test_very_high_type2_never_mentions_ketones() {
        let status = classify(350, Some(DiabetesType::Type2), Some(ReadingContext::PostMeal));
        assert_eq!(status.tier, GlucoseTier::VeryHigh);
        assert!(!status.recommendation.contains("ketones"));
        assert!(status.recommendation.contains("healthcare provider"));
    }

    #[test]
    fn test_very_high_type1_at_300_skips_ketones() {
        let status = classify(300, Some(DiabetesType::Type1), Some(ReadingContext::Fasting));
        assert_eq!(status.tier, GlucoseTier::VeryHigh);
        assert!(!status.recommendation.contains("ketones"));
    }

    #[test]
    fn test_out_of_domain_values_are_clamped() {
        let low = classify(-5, Some(DiabetesType::Type1), None);
        assert_eq!(low.tier, GlucoseTier::Low);
        assert!(low.message.starts_with("20 mg/dL"));

        let high = classify(9000, Some(DiabetesType::Type1), None);
        assert_eq!(high.tier, GlucoseTier::VeryHigh);
        assert!(high.message.starts_with("600 mg/dL"));
    }

    #[test]
    fn test_message_for_open_lower_bound() {
        let status = classify(120, Some(DiabetesType::Gestational), Some(ReadingContext::PostMeal));
        assert_eq!(status.tier, GlucoseTier::Normal);
        assert!(status.message.contains("under 140 mg/dL"));
    }
}
