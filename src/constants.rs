//! Physical constants and fixed message tags.

/// Speed of light in cm/shake.
pub const C: f64 = 299.792458;

/// Pi, spelled out to double precision.
pub const PI: f64 = 3.141_592_653_589_793;

/// Message tag for completion-count messages on the tree links.
pub const COUNT_TAG: u16 = 4;

/// Message tag for photon batches between adjacent ranks.
pub const PHOTON_TAG: u16 = 5;
