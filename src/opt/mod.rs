//! Record-time simplification.

pub mod fold;
