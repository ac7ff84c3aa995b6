pub mod bluesky;
pub mod config;
pub mod errors;
pub mod facebook;
pub mod fetch;
pub mod richtext;
pub mod session;
pub mod web;
