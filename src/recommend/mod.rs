pub mod ranker;

pub use ranker::RecommendationRanker;
