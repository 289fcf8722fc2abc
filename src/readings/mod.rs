//! Temperature readings grouped by room.

pub mod model;
pub mod routes;
pub mod service;

pub use model::TemperatureReading;
pub use service::ReadingService;
