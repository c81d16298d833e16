//! Shared helpers used across the provider SDK and (via `router_providers::common`)
//! the gateway's own configuration types.

pub mod duration_serde;
