//! Domain model

pub mod knowledge;
