extern crate strum;

pub mod config;
pub mod gl;
pub mod render;
pub mod scene;
