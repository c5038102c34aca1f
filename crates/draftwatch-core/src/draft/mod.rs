pub mod pick;
pub mod snake;
pub mod snapshot;
pub mod tracker;
