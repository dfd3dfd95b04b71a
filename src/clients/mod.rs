// Venue client interface

pub mod venue;

pub use venue::{with_timeout, BestBidAsk, OrderStatusReport, PositionSnapshot, VenueClient};
