pub mod actions;
pub mod log;
pub mod reactions;
pub mod state;
