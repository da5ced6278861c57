//! Packing of sampled animation data into GPU lookup textures.

pub mod matrix;
pub mod model;
pub mod weights;
