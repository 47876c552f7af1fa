//! # labelmesh Pipeline
//!
//! Converts labels of segmented medical volumes into triangle surfaces
//! ready for scene assembly, and names labels through [`LabelMap`].

pub mod labels;
pub mod pipeline;

pub use labels::*;
pub use pipeline::*;
