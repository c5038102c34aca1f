pub mod client;
pub mod players;
pub mod rankings;
