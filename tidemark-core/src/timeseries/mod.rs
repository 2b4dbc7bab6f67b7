/// Union timestamp index and row alignment.
pub mod align;
/// Request-sized splitting of time ranges.
pub mod partition;
/// Bounded most-recent history.
pub mod ring;
