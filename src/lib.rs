//! Flipbook Server Library
//!
//! Progressive PDF page-flip viewer exposed over HTTP.
//!
//! # Modules
//!
//! - `viewer`: Source selection, progressive page rendering, book navigation
//! - `raster`: Rasterization boundary and the MuPDF backend
//! - `fetch`: Loading document bytes for a source
//! - `library`: Listing of public PDFs
//! - `routes`: HTTP API

pub mod config;
pub mod error;
pub mod fetch;
pub mod library;
pub mod object_url;
pub mod probe;
pub mod raster;
pub mod routes;
pub mod source;
pub mod state;
pub mod viewer;

#[cfg(test)]
mod testing;
