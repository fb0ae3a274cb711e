// sotto-common: shared types and utilities for the Sotto workspace

pub mod event;
pub mod room;
pub mod time;
