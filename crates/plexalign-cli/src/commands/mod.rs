pub mod config;
pub mod pair;
pub mod run;
pub mod scan;
