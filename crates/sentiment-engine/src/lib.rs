pub mod client;
pub mod engine;

pub use client::{HttpScoringClient, ScoredSentiment, SentimentScorer};
pub use engine::{SentimentConfig, SentimentEngine};
