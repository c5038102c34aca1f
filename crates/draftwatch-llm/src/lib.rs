pub mod client;
pub mod prompt;
pub mod recommend;
