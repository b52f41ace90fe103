//! Match visualization rendering
//!
//! This module contains:
//! - Connector sizes and the color palette
//! - Composite image rendering using tiny-skia (for saving to file)

pub mod geometry;
pub mod image;
