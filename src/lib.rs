pub mod app_state;
pub mod auth;
pub mod config;
pub mod entities;
pub mod extract;
pub mod health;
pub mod jobs;
pub mod mailbox;
pub mod middleware;
pub mod passwords;
pub mod providers;
pub mod repositories;
pub mod scan;
pub mod scans;
pub mod subscriptions;
