//! Availability harvesting for the Fujisawa city facility reservation site.
//!
//! The [`scraper`] engine drives a [`browser::Browser`] through search,
//! facility and room selection and calendar paging, and turns schedule
//! tables into [`models::AvailabilityRecord`]s. The remaining modules wire
//! that engine to configuration, the terminal and a chat webhook.

pub mod app;
pub mod browser;
pub mod cli;
pub mod config;
pub mod logging;
pub mod models;
pub mod notify;
pub mod report;
pub mod scraper;
pub mod utils;
