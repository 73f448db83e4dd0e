//! TUI views for the dashboard.

mod grid;

pub use grid::{GridView, columns_for};
