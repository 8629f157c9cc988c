// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! photoatlas: district photo toolkit for static web maps
//!
//! Renames geotagged photos, builds CSV indexes, labels photos through a vision
//! API and sanitizes export folders before deployment.

pub mod config;
pub mod error;
pub mod geocode;
pub mod history;
pub mod index;
pub mod labeler;
pub mod openai;
pub mod pipeline;
pub mod renamer;
pub mod sanitizer;
pub mod scanner;

#[cfg(test)]
pub(crate) mod testutil;

pub use config::AppConfig;
pub use error::{AtlasError, Result};
