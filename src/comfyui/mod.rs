pub mod adapter;
pub mod client;
pub mod workflow;

pub use adapter::{ComfyUIAdapter, ComfyUISettings};
pub use client::ComfyUIClient;
