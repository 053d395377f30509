pub mod cli;
pub mod confirm;
