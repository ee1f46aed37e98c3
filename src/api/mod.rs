//! REST client for the model generation service: wire types, domain
//! types, and the endpoint methods.

pub mod api_types;
pub mod client;
pub mod types;
