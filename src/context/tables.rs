//! Static time-of-day and weekday preference tables

use chrono::Weekday;

use super::TimeOfDay;

/// Boosted and avoided categories for one time bucket
#[derive(Debug, Clone, Copy)]
pub struct TimePreferences {
    pub boosted: &'static [(&'static str, f64)],
    pub avoid: &'static [&'static str],
}

/// Multiplier applied to categories avoided at the current time
pub const TIME_AVOID_PENALTY: f64 = 0.3;

pub fn time_preferences(bucket: TimeOfDay) -> TimePreferences {
    match bucket {
        TimeOfDay::EarlyMorning => TimePreferences {
            boosted: &[
                ("coffee shop", 2.0),
                ("bakery", 1.8),
                ("gym", 1.5),
                ("breakfast restaurant", 1.7),
            ],
            avoid: &["bar", "nightclub", "late night food"],
        },
        TimeOfDay::Morning => TimePreferences {
            boosted: &[
                ("coffee shop", 1.8),
                ("business services", 1.5),
                ("breakfast restaurant", 1.5),
            ],
            avoid: &["bar", "nightclub", "dinner restaurant"],
        },
        TimeOfDay::LateMorning => TimePreferences {
            boosted: &[("shopping mall", 1.3), ("brunch restaurant", 1.6)],
            avoid: &["bar", "nightclub"],
        },
        TimeOfDay::Lunch => TimePreferences {
            boosted: &[
                ("restaurant", 1.8),
                ("fast food", 1.6),
                ("cafe", 1.4),
                ("lunch specials", 2.0),
            ],
            avoid: &["breakfast restaurant", "late night food"],
        },
        TimeOfDay::Afternoon => TimePreferences {
            boosted: &[("shopping mall", 1.4), ("retail", 1.3), ("coffee shop", 1.2)],
            avoid: &["bar", "nightclub", "breakfast restaurant"],
        },
        TimeOfDay::EarlyEvening => TimePreferences {
            boosted: &[("restaurant", 1.6), ("grocery store", 1.4), ("happy hour", 1.8)],
            avoid: &["breakfast restaurant", "late night food"],
        },
        TimeOfDay::Evening => TimePreferences {
            boosted: &[
                ("restaurant", 1.7),
                ("entertainment", 1.5),
                ("bar", 1.4),
                ("cinema", 1.6),
            ],
            avoid: &["breakfast restaurant", "business services"],
        },
        TimeOfDay::Night => TimePreferences {
            boosted: &[("bar", 1.8), ("entertainment", 1.6), ("late night food", 1.7)],
            avoid: &["breakfast restaurant", "business services", "office supply"],
        },
        TimeOfDay::LateNight => TimePreferences {
            boosted: &[
                ("24hr service", 2.0),
                ("late night food", 1.8),
                ("convenience store", 1.6),
            ],
            avoid: &["business services", "retail", "shopping mall"],
        },
    }
}

pub fn day_boosts(day: Weekday) -> &'static [(&'static str, f64)] {
    match day {
        Weekday::Mon => &[("coffee shop", 1.3), ("business services", 1.2)],
        Weekday::Tue => &[("restaurant", 1.1), ("services", 1.1)],
        Weekday::Wed => &[("coffee shop", 1.2), ("lunch specials", 1.3)],
        Weekday::Thu => &[("restaurant", 1.2), ("happy hour", 1.4)],
        Weekday::Fri => &[("restaurant", 1.4), ("bar", 1.5), ("entertainment", 1.3)],
        Weekday::Sat => &[
            ("restaurant", 1.3),
            ("entertainment", 1.4),
            ("shopping mall", 1.2),
            ("recreational", 1.3),
        ],
        Weekday::Sun => &[
            ("brunch restaurant", 1.6),
            ("recreational", 1.2),
            ("family entertainment", 1.3),
        ],
    }
}
