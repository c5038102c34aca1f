// Library root for the draft-state polling core: picks and snapshots, the
// state tracker, the snapshot source seam and the polling watcher.

pub mod cache;
pub mod draft;
pub mod protocol;
pub mod source;
pub mod watcher;
