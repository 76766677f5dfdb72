pub mod client;

pub use client::EnhancerClient;
