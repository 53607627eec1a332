//! Chat exchange, transcript persistence, and history views.

pub mod accumulator;
pub mod engine;
pub mod feed;
pub mod grouping;
pub mod repository;
pub mod service;
