pub mod cli;
pub mod scheduler;
pub mod state;
