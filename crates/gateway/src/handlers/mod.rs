//! API handlers module

pub mod citations;
pub mod documents;
pub mod extraction;
pub mod health;
