pub mod bench;
pub mod check;
pub mod config;
pub mod run;
