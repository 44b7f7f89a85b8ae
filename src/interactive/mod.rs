//! Interactive winit viewer driving the compute pipeline

mod viewer;

pub use viewer::{run_viewer, ViewerConfig};
