pub mod config;
pub mod defaults;
pub mod error;
pub mod issuer;
pub mod presenter;
pub mod proof;
pub mod session;
pub mod verifier;
