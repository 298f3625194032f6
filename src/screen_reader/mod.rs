//! Screen capture

pub mod screen_service;

pub use screen_service::{Region, ScreenService};
