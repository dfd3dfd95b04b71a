// Simulation Module
// In-memory venue and price feed for paper runs and tests

pub mod paper_venue;
pub mod price_feed;

pub use paper_venue::{OrderKind, PaperOrder, PaperVenue};
pub use price_feed::RandomWalkFeed;
