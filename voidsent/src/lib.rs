pub mod config;
pub mod dialogue;
pub mod exchange;
pub mod il;
pub mod overrides;
pub mod sites;
pub mod special_orders;
pub mod types;
