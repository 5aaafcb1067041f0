//! Request and response models for the broker transitions.

pub mod requests;
pub mod responses;

pub use requests::*;
pub use responses::*;
