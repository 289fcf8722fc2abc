//! Appliances, their recurring cleaning tasks, and the scheduler that keeps
//! one upcoming task per scheduled appliance.

pub mod model;
pub mod routes;
pub mod scheduler;
pub mod seed;
pub mod service;

pub use model::{Appliance, CleaningTask, DueTask};
pub use seed::ensure_seed_defaults;
pub use service::ApplianceService;
