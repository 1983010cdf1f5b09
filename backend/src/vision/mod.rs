pub mod client;
pub mod prompt;
pub mod reply;

pub use client::{VisionClient, VisionError};
