//! # OROBOROS Shared
//!
//! Common math used by both client and server.
//!
//! ## CRITICAL RULE
//!
//! Everything here is `f64`. Aim geometry compares squared distances
//! against `1e-8`, which is below `f32` resolution at world coordinates.
//!
//! This crate must NEVER depend on `wgpu` or any GPU or window-related crate.

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod math;

pub use math::{Location, Ray, Vec3};
