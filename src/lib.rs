//! Home Dashboard: appliance cleaning schedules and room temperatures.

pub mod api;
pub mod appliances;
pub mod clock;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod readings;
pub mod store;
