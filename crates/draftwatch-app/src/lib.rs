// Application layer behind the `draftwatch` binary.

pub mod app;
pub mod config;
pub mod context;
pub mod db;
pub mod seat;
