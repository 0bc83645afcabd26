pub mod config;
pub mod context;
pub mod engine;
pub mod errors;
pub mod geo;
pub mod ledger;
pub mod logging;
pub mod models;
pub mod normalizer;
pub mod ranking;
pub mod recommender;
pub mod retrieval;
pub mod store;
pub mod weather;

#[cfg(test)]
mod errors_tests;

pub use config::AppConfig;
pub use engine::Recommendation;
pub use engine::SearchEngine;
pub use engine::SearchRequest;
pub use engine::SearchResponse;
pub use engine::TrackEvent;
pub use errors::*;
pub use models::BusinessRecord;
pub use models::InteractionKind;
pub use models::UserInteraction;
