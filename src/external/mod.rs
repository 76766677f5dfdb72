pub mod client;

pub use client::{ExternalApiAdapter, ExternalApiSettings, ExternalProvider, ProviderEndpoint};
