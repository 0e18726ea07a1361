//! Command-line front end. It only dispatches actions to the card store and
//! renders snapshots.
mod app;
mod main;

pub use app::*;
pub use main::*;
