//! Session identity resolution.

pub mod resolver;
