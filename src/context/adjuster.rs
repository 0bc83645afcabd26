//! Applies contextual factors to candidates and explains the result

use serde::Deserialize;
use serde::Serialize;

use super::ContextualFactor;
use super::FactorKind;
use super::RecommendationContext;
use super::TimeOfDay;
use crate::models;
use crate::models::BusinessRecord;
use crate::models::ScoredBusiness;
use crate::ranking::RankedBusiness;

/// Anything the adjuster can re-score
pub trait ContextCandidate {
    /// Lowercased `"<category> <tags>"` matched against factor keywords
    fn category_text(&self) -> String;

    /// Lower-is-better value divided by the contextual score
    fn base_metric(&self) -> f64;
}

impl ContextCandidate for BusinessRecord {
    fn category_text(&self) -> String {
        BusinessRecord::category_text(self)
    }

    fn base_metric(&self) -> f64 {
        self.distance_km.unwrap_or(self.relevance_score)
    }
}

impl ContextCandidate for RankedBusiness {
    fn category_text(&self) -> String {
        self.record.category_text()
    }

    fn base_metric(&self) -> f64 {
        self.record.base_metric()
    }
}

/// No distance is known, so the final value is `1 / contextual_score`
impl ContextCandidate for ScoredBusiness {
    fn category_text(&self) -> String {
        models::category_text(&self.category, &self.tags)
    }

    fn base_metric(&self) -> f64 {
        1.0
    }
}

/// A candidate annotated with its contextual adjustment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Adjusted<T> {
    pub item: T,
    /// Product of matched multipliers, starts at 1.0
    pub contextual_score: f64,
    pub applied_factors: Vec<String>,
    /// `base_metric / contextual_score`, lower is better
    pub final_rank_value: f64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ContextualAdjuster;

impl ContextualAdjuster {
    pub fn new() -> Self {
        Self
    }

    /// Multiplier and explanations for one candidate text
    pub fn score_text(&self, text: &str, factors: &[ContextualFactor]) -> (f64, Vec<String>) {
        let text = text.to_lowercase();
        let mut score = 1.0;
        let mut applied = Vec::new();

        for factor in factors {
            let mut matched = false;
            if let Some(multiplier) = factor.category_boost.first_match(&text) {
                score *= multiplier * factor.weight;
                matched = true;
            }
            if let Some(multiplier) = factor.category_penalty.first_match(&text) {
                score *= multiplier / factor.weight;
                matched = true;
            }
            if matched {
                applied.push(factor.explanation.clone());
            }
        }

        (score, applied)
    }

    /// Re-scores candidates and sorts them by `final_rank_value` ascending.
    ///
    /// The sort is stable, so equal values keep their incoming order.
    pub fn apply<T: ContextCandidate>(&self, items: Vec<T>, factors: &[ContextualFactor]) -> Vec<Adjusted<T>> {
        let mut adjusted = self.annotate(items, factors);
        adjusted.sort_by(|a, b| a.final_rank_value.total_cmp(&b.final_rank_value));
        adjusted
    }

    /// Scores candidates without changing their order
    pub fn annotate<T: ContextCandidate>(&self, items: Vec<T>, factors: &[ContextualFactor]) -> Vec<Adjusted<T>> {
        items
            .into_iter()
            .map(|item| {
                let (contextual_score, applied_factors) = self.score_text(&item.category_text(), factors);
                let final_rank_value = item.base_metric() / contextual_score;
                Adjusted {
                    item,
                    contextual_score,
                    applied_factors,
                    final_rank_value,
                }
            })
            .collect()
    }

    /// Human-readable description of the situation
    pub fn summary(&self, context: &RecommendationContext, factors: &[ContextualFactor]) -> String {
        let mut parts = vec![format!("It's {}", context.current_time.format("%A, %I:%M %p"))];

        if let Some(weather) = &context.weather {
            parts.push(format!(
                "Weather is {} at {:.0}°C",
                weather.description, weather.temperature_c
            ));
        }

        let mut suggestions = Vec::new();
        for factor in factors {
            match factor.kind {
                FactorKind::Time if context.time_of_day == TimeOfDay::Lunch => {
                    suggestions.push("perfect for lunch");
                }
                FactorKind::Weather => match &context.weather {
                    Some(weather) if weather.is_rainy => suggestions.push("indoor activities recommended"),
                    Some(weather) if weather.is_pleasant => {
                        suggestions.push("great weather for outdoor activities");
                    }
                    _ => {}
                },
                _ => {}
            }
        }
        if !suggestions.is_empty() {
            parts.push(format!("({})", suggestions.join(", ")));
        }

        format!("{}.", parts.join(". "))
    }
}

#[cfg(test)]
mod tests {
    use chrono::FixedOffset;
    use chrono::TimeZone;

    use super::*;
    use crate::context::factors;
    use crate::context::CategoryMultipliers;
    use crate::weather::WeatherCondition;
    use crate::weather::WeatherSnapshot;

    fn context_at(hour: u32, minute: u32) -> RecommendationContext {
        let time = FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2024, 3, 4, hour, minute, 0)
            .unwrap();
        RecommendationContext::new("u1", (37.0, -122.0), time)
    }

    fn record(name: &str, category: &str, tags: &[&str], distance: f64) -> BusinessRecord {
        let mut record = BusinessRecord::new(
            name,
            "owner",
            category,
            tags.iter().map(|t| (*t).to_string()).collect(),
            37.0,
            -122.0,
        );
        record.distance_km = Some(distance);
        record
    }

    fn factor(boost: &[(&str, f64)], penalty: &[(&str, f64)], weight: f64) -> ContextualFactor {
        ContextualFactor {
            kind: FactorKind::Time,
            category_boost: boost.iter().copied().collect(),
            category_penalty: penalty.iter().copied().collect(),
            weight,
            explanation: "test factor".to_string(),
        }
    }

    #[test]
    fn test_boost_and_penalty_math() {
        let adjuster = ContextualAdjuster::new();
        let f = factor(&[("coffee", 2.0)], &[("bar", 0.5)], 1.25);

        let (boosted, applied) = adjuster.score_text("Coffee Shop", &[f.clone()]);
        assert!((boosted - 2.5).abs() < 1e-12);
        assert_eq!(applied, vec!["test factor".to_string()]);

        let (penalized, _) = adjuster.score_text("wine bar", &[f.clone()]);
        assert!((penalized - 0.4).abs() < 1e-12);

        let (both, applied) = adjuster.score_text("coffee bar", &[f.clone()]);
        assert!((both - 1.0).abs() < 1e-12);
        assert_eq!(applied.len(), 1);

        let (neutral, applied) = adjuster.score_text("gym", &[f]);
        assert_eq!(neutral, 1.0);
        assert!(applied.is_empty());
    }

    #[test]
    fn test_only_first_matching_keyword_applies() {
        let adjuster = ContextualAdjuster::new();
        let f = factor(&[("restaurant", 1.8), ("fast food", 1.6)], &[], 1.0);
        let (score, _) = adjuster.score_text("fast food restaurant", &[f]);
        assert!((score - 1.8).abs() < 1e-12);
    }

    #[test]
    fn test_time_bucket_boost_lowers_final_value() {
        let adjuster = ContextualAdjuster::new();
        let context = context_at(12, 15);
        let factors = factors::build_factors(&context);

        let plain = record("Hardware", "Hardware Store", &[], 2.0);
        let lunch = record("Diner", "Restaurant", &[], 2.0);
        let adjusted = adjuster.apply(vec![plain, lunch], &factors);

        assert_eq!(adjusted[0].item.name, "Diner");
        assert!(adjusted[0].final_rank_value < 2.0);
        assert_eq!(adjusted[1].final_rank_value, 2.0);
        assert!(adjusted[1].applied_factors.is_empty());
    }

    #[test]
    fn test_rain_favours_indoor_mall_over_outdoor_market() {
        let adjuster = ContextualAdjuster::new();
        let rainy = WeatherSnapshot::from_reading(15.0, WeatherCondition::Rain, 80.0, "rain");
        let factors = vec![factors::weather_factor(&rainy)];

        let market = record("Market", "Market", &["outdoor market"], 1.0);
        let mall = record("Galleria", "Shopping Center", &["indoor mall"], 1.0);
        let adjusted = adjuster.apply(vec![market, mall], &factors);

        assert_eq!(adjusted[0].item.name, "Galleria");
        assert!(adjusted[0].contextual_score > 1.0);
        assert_eq!(adjusted[1].item.name, "Market");
        assert!(adjusted[1].contextual_score < 1.0);
    }

    #[test]
    fn test_annotate_keeps_order() {
        let adjuster = ContextualAdjuster::new();
        let f = factor(&[("cafe", 3.0)], &[], 1.0);
        let items = vec![record("Far", "Gym", &[], 1.0), record("Near", "Cafe", &[], 1.0)];

        let annotated = adjuster.annotate(items.clone(), &[f.clone()]);
        assert_eq!(annotated[0].item.name, "Far");
        assert!((annotated[1].contextual_score - 3.0).abs() < 1e-12);

        let applied = adjuster.apply(items, &[f]);
        assert_eq!(applied[0].item.name, "Near");
    }

    #[test]
    fn test_base_metric_falls_back_to_relevance() {
        let mut no_distance = record("X", "Cafe", &[], 0.0);
        no_distance.distance_km = None;
        no_distance.relevance_score = 0.4;
        assert_eq!(no_distance.base_metric(), 0.4);

        let adjusted = ContextualAdjuster::new().apply(vec![no_distance], &[]);
        assert_eq!(adjusted[0].contextual_score, 1.0);
        assert_eq!(adjusted[0].final_rank_value, 0.4);
    }

    #[test]
    fn test_recommendations_rank_by_inverse_contextual_score() {
        let pick = |id: &str, category: &str, tags: &[&str]| ScoredBusiness {
            business_id: id.to_string(),
            business_name: id.to_string(),
            category: category.to_string(),
            tags: tags.iter().map(|t| (*t).to_string()).collect(),
            recommendation_score: 4.0,
        };
        let rainy = WeatherSnapshot::from_reading(15.0, WeatherCondition::Rain, 80.0, "rain");
        let factors = vec![factors::weather_factor(&rainy)];

        let adjusted = ContextualAdjuster::new().apply(
            vec![
                pick("market", "Outdoor Market", &[]),
                pick("plain", "Hardware", &[]),
                pick("museum", "Museum", &["indoor"]),
            ],
            &factors,
        );

        let order: Vec<&str> = adjusted.iter().map(|a| a.item.business_id.as_str()).collect();
        assert_eq!(order, vec!["museum", "plain", "market"]);
        assert_eq!(adjusted[1].final_rank_value, 1.0);
        assert!((adjusted[0].final_rank_value * adjusted[0].contextual_score - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_summary_at_lunch_in_the_rain() {
        let adjuster = ContextualAdjuster::new();
        let rainy = WeatherSnapshot::from_reading(12.4, WeatherCondition::LightRain, 60.0, "light rain");
        let context = context_at(12, 30).with_weather(Some(rainy));
        let factors = factors::build_factors(&context);

        assert_eq!(
            adjuster.summary(&context, &factors),
            "It's Monday, 12:30 PM. Weather is light rain at 12°C. \
             (perfect for lunch, indoor activities recommended)."
        );
    }

    #[test]
    fn test_summary_without_weather_or_suggestions() {
        let adjuster = ContextualAdjuster::new();
        let context = context_at(9, 5);
        let factors = factors::build_factors(&context);
        assert_eq!(adjuster.summary(&context, &factors), "It's Monday, 09:05 AM.");
    }

    #[test]
    fn test_summary_for_pleasant_weather() {
        let adjuster = ContextualAdjuster::new();
        let nice = WeatherSnapshot::from_reading(21.0, WeatherCondition::Clear, 5.0, "clear sky");
        let context = context_at(15, 0).with_weather(Some(nice));
        let factors = vec![factors::weather_factor(context.weather.as_ref().unwrap())];
        assert!(adjuster
            .summary(&context, &factors)
            .ends_with("(great weather for outdoor activities)."));
        assert!(CategoryMultipliers::new().is_empty());
    }
}
