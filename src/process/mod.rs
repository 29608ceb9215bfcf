// src/process/mod.rs

pub mod clean;
pub mod partition;
pub mod pool;
pub mod project;
pub mod split;
pub mod table;
