//! Flutter-facing bindings for the TLC assay core.

pub mod api;
