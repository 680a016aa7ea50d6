//! Recursively expand an Azure resource id into a single JSON document.
//!
//! Nested objects carrying an `id` are looked up through Azure Resource
//! Graph and their fields merged in place. Each id is queried at most once
//! per run, so reference cycles terminate.

pub mod azure;
pub mod config;
pub mod resource;

/// Version injected at compile time via AZINFO_VERSION env var (set by CI/CD),
/// or "dev" for local builds.
pub const VERSION: &str = match option_env!("AZINFO_VERSION") {
    Some(v) => v,
    None => "dev",
};
