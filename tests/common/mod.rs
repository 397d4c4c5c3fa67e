#![allow(dead_code)]

pub mod database;
pub mod observers;

pub use database::{balance_of, seed, TestDb};
pub use observers::RecordingObserver;
