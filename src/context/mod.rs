//! Situational context: time of day, weekday, weather and personal history
//!
//! A [`RecommendationContext`] is built once per request. [`factors`] turns it
//! into weighted [`ContextualFactor`]s and [`adjuster`] applies them to
//! ranked candidates.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::fmt;

use chrono::DateTime;
use chrono::Datelike;
use chrono::FixedOffset;
use chrono::Timelike;
use serde::Deserialize;
use serde::Serialize;

use crate::models::UserInteraction;
use crate::models::UserPreferences;
use crate::weather::WeatherSnapshot;

pub mod adjuster;
pub mod factors;
pub mod tables;

pub use adjuster::Adjusted;
pub use adjuster::ContextCandidate;
pub use adjuster::ContextualAdjuster;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeOfDay {
    EarlyMorning,
    Morning,
    LateMorning,
    Lunch,
    Afternoon,
    EarlyEvening,
    Evening,
    Night,
    LateNight,
}

impl TimeOfDay {
    /// Bucket for a local hour (0-23)
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            5..=7 => Self::EarlyMorning,
            8..=10 => Self::Morning,
            11 => Self::LateMorning,
            12..=13 => Self::Lunch,
            14..=16 => Self::Afternoon,
            17..=18 => Self::EarlyEvening,
            19..=20 => Self::Evening,
            21..=23 => Self::Night,
            _ => Self::LateNight,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::EarlyMorning => "early_morning",
            Self::Morning => "morning",
            Self::LateMorning => "late_morning",
            Self::Lunch => "lunch",
            Self::Afternoon => "afternoon",
            Self::EarlyEvening => "early_evening",
            Self::Evening => "evening",
            Self::Night => "night",
            Self::LateNight => "late_night",
        }
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FactorKind {
    Time,
    Day,
    Weather,
    History,
}

/// Category keyword -> multiplier, in insertion order
///
/// Lookups return the first keyword contained in the candidate text, so the
/// order keywords were inserted in decides which one applies.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryMultipliers(Vec<(String, f64)>);

impl CategoryMultipliers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `keyword`, or overwrites its multiplier in place
    pub fn set(&mut self, keyword: impl Into<String>, multiplier: f64) {
        let keyword = keyword.into();
        match self.0.iter_mut().find(|(k, _)| *k == keyword) {
            Some(entry) => entry.1 = multiplier,
            None => self.0.push((keyword, multiplier)),
        }
    }

    /// Multiplier of the first keyword that is a substring of `text` (lowercased)
    pub fn first_match(&self, text: &str) -> Option<f64> {
        self.0
            .iter()
            .find(|(keyword, _)| text.contains(&keyword.to_lowercase()))
            .map(|(_, m)| *m)
    }

    pub fn get(&self, keyword: &str) -> Option<f64> {
        self.0.iter().find(|(k, _)| k == keyword).map(|(_, m)| *m)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, m)| (k.as_str(), *m))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, f64)> for CategoryMultipliers {
    fn from_iter<I: IntoIterator<Item = (S, f64)>>(iter: I) -> Self {
        let mut multipliers = Self::new();
        for (keyword, multiplier) in iter {
            multipliers.set(keyword, multiplier);
        }
        multipliers
    }
}

/// Weighted, explainable set of boosts and penalties
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextualFactor {
    pub kind: FactorKind,
    pub category_boost: CategoryMultipliers,
    pub category_penalty: CategoryMultipliers,
    pub weight: f64,
    pub explanation: String,
}

/// Activity patterns mined from recent interactions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsagePatterns {
    /// (hour, count), busiest first, at most three
    pub peak_hours: Vec<(u32, usize)>,
    /// (lowercase weekday, count), busiest first, at most three
    pub peak_days: Vec<(String, usize)>,
    /// category -> hour -> count
    pub category_timing: BTreeMap<String, BTreeMap<u32, usize>>,
    /// Last ten known interaction locations
    pub frequent_locations: Vec<(f64, f64)>,
}

impl UsagePatterns {
    /// Buckets interactions by local hour and weekday in `offset`
    pub fn analyze(interactions: &[UserInteraction], offset: FixedOffset) -> Self {
        if interactions.is_empty() {
            return Self::default();
        }

        let mut hours: HashMap<u32, usize> = HashMap::new();
        let mut days: HashMap<String, usize> = HashMap::new();
        let mut category_timing: BTreeMap<String, BTreeMap<u32, usize>> = BTreeMap::new();

        for interaction in interactions {
            let local = interaction.timestamp.with_timezone(&offset);
            let hour = local.hour();
            let day = local.format("%A").to_string().to_lowercase();
            let category = interaction
                .category
                .clone()
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| "unknown".to_string());

            *hours.entry(hour).or_insert(0) += 1;
            *days.entry(day).or_insert(0) += 1;
            *category_timing
                .entry(category)
                .or_default()
                .entry(hour)
                .or_insert(0) += 1;
        }

        let mut peak_hours: Vec<(u32, usize)> = hours.into_iter().collect();
        peak_hours.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        peak_hours.truncate(3);

        let mut peak_days: Vec<(String, usize)> = days.into_iter().collect();
        peak_days.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        peak_days.truncate(3);

        let locations: Vec<(f64, f64)> = interactions.iter().filter_map(|i| i.location).collect();
        let frequent_locations = locations[locations.len().saturating_sub(10)..].to_vec();

        Self {
            peak_hours,
            peak_days,
            category_timing,
            frequent_locations,
        }
    }

    pub fn is_peak_hour(&self, hour: u32) -> bool {
        self.peak_hours.iter().any(|(h, _)| *h == hour)
    }
}

/// Summarized personal history feeding the history factors
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserHistory {
    /// Chronological
    pub recent_interactions: Vec<UserInteraction>,
    pub preferences: Option<UserPreferences>,
    pub patterns: UsagePatterns,
}

impl UserHistory {
    pub fn new(
        recent_interactions: Vec<UserInteraction>,
        preferences: Option<UserPreferences>,
        offset: FixedOffset,
    ) -> Self {
        let patterns = UsagePatterns::analyze(&recent_interactions, offset);
        Self {
            recent_interactions,
            preferences,
            patterns,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.recent_interactions.is_empty() && self.preferences.is_none()
    }
}

/// Everything known about the request's situation
#[derive(Debug, Clone)]
pub struct RecommendationContext {
    pub user_id: String,
    pub location: (f64, f64),
    /// Requester wall-clock time
    pub current_time: DateTime<FixedOffset>,
    pub time_of_day: TimeOfDay,
    pub weather: Option<WeatherSnapshot>,
    pub history: UserHistory,
    pub search_query: Option<String>,
}

impl RecommendationContext {
    pub fn new(
        user_id: impl Into<String>,
        location: (f64, f64),
        current_time: DateTime<FixedOffset>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            location,
            time_of_day: TimeOfDay::from_hour(current_time.hour()),
            current_time,
            weather: None,
            history: UserHistory::default(),
            search_query: None,
        }
    }

    #[must_use]
    pub fn with_weather(mut self, weather: Option<WeatherSnapshot>) -> Self {
        self.weather = weather;
        self
    }

    #[must_use]
    pub fn with_history(mut self, history: UserHistory) -> Self {
        self.history = history;
        self
    }

    #[must_use]
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.search_query = Some(query.into());
        self
    }

    pub fn weekday(&self) -> chrono::Weekday {
        self.current_time.weekday()
    }

    pub fn hour(&self) -> u32 {
        self.current_time.hour()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use chrono::Utc;

    use super::*;
    use crate::models::InteractionKind;

    #[test]
    fn test_time_buckets() {
        let expected = [
            (0, TimeOfDay::LateNight),
            (4, TimeOfDay::LateNight),
            (5, TimeOfDay::EarlyMorning),
            (7, TimeOfDay::EarlyMorning),
            (8, TimeOfDay::Morning),
            (10, TimeOfDay::Morning),
            (11, TimeOfDay::LateMorning),
            (12, TimeOfDay::Lunch),
            (13, TimeOfDay::Lunch),
            (14, TimeOfDay::Afternoon),
            (17, TimeOfDay::EarlyEvening),
            (19, TimeOfDay::Evening),
            (21, TimeOfDay::Night),
            (23, TimeOfDay::Night),
        ];
        for (hour, bucket) in expected {
            assert_eq!(TimeOfDay::from_hour(hour), bucket, "hour {hour}");
        }
    }

    #[test]
    fn test_multipliers_keep_insertion_order() {
        let mut boosts = CategoryMultipliers::new();
        boosts.set("coffee", 1.6);
        boosts.set("coffee shop", 2.0);
        boosts.set("coffee", 1.2);

        assert_eq!(boosts.len(), 2);
        assert_eq!(boosts.first_match("coffee shop espresso"), Some(1.2));
        assert_eq!(boosts.first_match("tea house"), None);
    }

    #[test]
    fn test_keywords_match_case_insensitively() {
        let boosts: CategoryMultipliers = [("Shopping Mall", 1.3)].into_iter().collect();
        assert_eq!(boosts.first_match("shopping mall indoor"), Some(1.3));
    }

    #[test]
    fn test_usage_patterns() {
        let utc = FixedOffset::east_opt(0).unwrap();
        let record = crate::models::BusinessRecord::new("A", "o", "Cafe", vec![], 1.0, 2.0);
        let at = |h: u32| {
            UserInteraction::with_business("u1", "s", &record, InteractionKind::View, None)
                .at(Utc.with_ymd_and_hms(2024, 3, 4, h, 0, 0).unwrap())
        };
        let mut interactions = vec![at(9), at(9), at(9), at(12), at(12), at(18), at(20)];
        for (i, interaction) in interactions.iter_mut().enumerate() {
            interaction.location = Some((i as f64, 0.0));
        }

        let patterns = UsagePatterns::analyze(&interactions, utc);
        assert_eq!(patterns.peak_hours, vec![(9, 3), (12, 2), (18, 1)]);
        assert_eq!(patterns.peak_days, vec![("monday".to_string(), 7)]);
        assert_eq!(patterns.category_timing["Cafe"][&9], 3);
        assert_eq!(patterns.frequent_locations.len(), 7);
        assert!(patterns.is_peak_hour(12));
        assert!(!patterns.is_peak_hour(20));
    }

    #[test]
    fn test_context_bucket_follows_local_time() {
        let offset = FixedOffset::west_opt(8 * 3600).unwrap();
        // 20:30 UTC is 12:30 at UTC-8
        let time = Utc
            .with_ymd_and_hms(2024, 3, 4, 20, 30, 0)
            .unwrap()
            .with_timezone(&offset);
        let context = RecommendationContext::new("u1", (37.0, -122.0), time);
        assert_eq!(context.time_of_day, TimeOfDay::Lunch);
        assert_eq!(context.weekday(), chrono::Weekday::Mon);
    }
}
