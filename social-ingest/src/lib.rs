pub mod config;
pub mod error;
pub mod fetch;
pub mod mastodon;
pub mod pipeline;
pub mod project;
mod response_helpers;
pub mod twitter;
