//! lootdb: loot filter template database builder
//!
//! Assembles hand-maintained rule templates, override files and correction
//! files into a versioned snapshot with derived lookup indexes.

pub mod cli;
pub mod core;
pub mod db;
pub mod rules;
