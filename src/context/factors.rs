//! Builds contextual factors from a [`RecommendationContext`]

use std::collections::HashMap;

use super::tables;
use super::CategoryMultipliers;
use super::ContextualFactor;
use super::FactorKind;
use super::RecommendationContext;
use crate::weather::weather_suggestions;
use crate::weather::WeatherSnapshot;

pub const TIME_WEIGHT: f64 = 1.2;
pub const DAY_WEIGHT: f64 = 0.8;
pub const PREFERENCE_WEIGHT: f64 = 1.1;
pub const USAGE_PATTERN_WEIGHT: f64 = 0.9;

const WEATHER_PREFERRED_BOOST: f64 = 1.5;
const WEATHER_AVOID_PENALTY: f64 = 0.4;

const RAINY_EXTRAS: &[(&str, f64)] = &[("indoor", 1.8), ("covered", 1.6), ("mall", 1.4)];
const HOT_EXTRAS: &[(&str, f64)] = &[("air conditioning", 1.6), ("cold drinks", 1.5), ("ice cream", 1.8)];
const COLD_EXTRAS: &[(&str, f64)] = &[("coffee", 1.6), ("warm food", 1.5), ("heated", 1.4)];
const NO_EXTRAS: &[(&str, f64)] = &[];

/// Interactions considered for the active-time factor
const RECENT_WINDOW: usize = 20;

/// Time, day, weather (when known) and history factors, in that order
pub fn build_factors(context: &RecommendationContext) -> Vec<ContextualFactor> {
    let mut factors = vec![time_factor(context), day_factor(context)];
    if let Some(weather) = &context.weather {
        factors.push(weather_factor(weather));
    }
    factors.extend(history_factors(context));
    factors
}

pub fn time_factor(context: &RecommendationContext) -> ContextualFactor {
    let prefs = tables::time_preferences(context.time_of_day);
    ContextualFactor {
        kind: FactorKind::Time,
        category_boost: prefs.boosted.iter().copied().collect(),
        category_penalty: prefs
            .avoid
            .iter()
            .map(|category| (*category, tables::TIME_AVOID_PENALTY))
            .collect(),
        weight: TIME_WEIGHT,
        explanation: format!(
            "Time of day: {} ({})",
            context.time_of_day,
            context.current_time.format("%H:%M")
        ),
    }
}

pub fn day_factor(context: &RecommendationContext) -> ContextualFactor {
    ContextualFactor {
        kind: FactorKind::Day,
        category_boost: tables::day_boosts(context.weekday()).iter().copied().collect(),
        category_penalty: CategoryMultipliers::new(),
        weight: DAY_WEIGHT,
        explanation: format!("Day of week: {}", context.current_time.format("%A")),
    }
}

pub fn weather_factor(weather: &WeatherSnapshot) -> ContextualFactor {
    let suggestions = weather_suggestions(weather);

    let mut boost: CategoryMultipliers = suggestions
        .preferred
        .iter()
        .map(|category| (category.as_str(), WEATHER_PREFERRED_BOOST))
        .collect();
    let penalty: CategoryMultipliers = suggestions
        .avoid
        .iter()
        .map(|category| (category.as_str(), WEATHER_AVOID_PENALTY))
        .collect();

    let (extras, weight) = if weather.is_rainy {
        (RAINY_EXTRAS, 1.3)
    } else if weather.is_hot {
        (HOT_EXTRAS, 1.2)
    } else if weather.is_cold {
        (COLD_EXTRAS, 1.2)
    } else {
        (NO_EXTRAS, 1.0)
    };
    for (keyword, multiplier) in extras {
        boost.set(*keyword, *multiplier);
    }

    ContextualFactor {
        kind: FactorKind::Weather,
        category_boost: boost,
        category_penalty: penalty,
        weight,
        explanation: format!(
            "Weather: {} ({:.0}°C)",
            weather.description, weather.temperature_c
        ),
    }
}

/// Preference and active-time factors; empty without history
pub fn history_factors(context: &RecommendationContext) -> Vec<ContextualFactor> {
    let history = &context.history;
    let mut factors = Vec::new();

    if let Some(preferences) = &history.preferences {
        let max_weight = preferences
            .category_weights
            .values()
            .copied()
            .fold(0.0_f64, f64::max);

        if max_weight > 0.0 {
            let mut weighted: Vec<(&String, f64)> = preferences
                .category_weights
                .iter()
                .filter(|(_, w)| **w > 0.0)
                .map(|(c, w)| (c, *w))
                .collect();
            // Strongest first, ties by name, so the first matching keyword is deterministic
            weighted.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));

            factors.push(ContextualFactor {
                kind: FactorKind::History,
                category_boost: weighted
                    .into_iter()
                    .map(|(category, w)| (category.as_str(), (1.0 + w / max_weight).min(2.0)))
                    .collect(),
                category_penalty: CategoryMultipliers::new(),
                weight: PREFERENCE_WEIGHT,
                explanation: "Based on your previous preferences".to_string(),
            });
        }
    }

    let hour = context.hour();
    if history.patterns.is_peak_hour(hour) {
        let recent = &history.recent_interactions;
        let window = &recent[recent.len().saturating_sub(RECENT_WINDOW)..];

        let mut order: Vec<&str> = Vec::new();
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for category in window
            .iter()
            .filter_map(|i| i.category.as_deref())
            .filter(|c| !c.is_empty())
        {
            let count = counts.entry(category).or_insert(0);
            if *count == 0 {
                order.push(category);
            }
            *count += 1;
        }

        if let Some(max_count) = counts.values().copied().max() {
            factors.push(ContextualFactor {
                kind: FactorKind::History,
                category_boost: order
                    .into_iter()
                    .map(|category| {
                        let share = counts[category] as f64 / max_count as f64;
                        (category, 1.0 + share * 0.3)
                    })
                    .collect(),
                category_penalty: CategoryMultipliers::new(),
                weight: USAGE_PATTERN_WEIGHT,
                explanation: format!("Active time pattern (you're usually active at {hour}:00)"),
            });
        }
    }

    factors
}
