//! # zettel-core
//!
//! A library for storing, parsing, evaluating and rendering zettel: small notes identified by a
//! 14 digit timestamp, written in Zettelmarkup or another supported syntax, linked to each other.
//!
//! ## Overview
//!
//! A zettel travels through a fixed pipeline:
//!
//! 1. **Storage**: a [`boxes::manager::Manager`] composes an ordered list of boxes (directories,
//!    memory, the bundled constant zettel and computed zettel) into one logical store. Earlier
//!    boxes shadow later ones.
//! 2. **Parsing**: [`parser::parse_zettel`] turns the content into a block-structured AST,
//!    choosing the parser from the `syntax` metadata key.
//! 3. **Evaluation**: [`eval::evaluate_zettel`] expands transclusions, embeds and queries
//!    against a [`eval::Port`], usually the manager.
//! 4. **Encoding**: an [`encoder::Encoder`] writes the AST as HTML, SHTML, sz, Markdown, plain
//!    text or Zettelmarkup.
//!
//! Alongside, an index worker keeps word, URL and reference indexes current so that
//! [`query::Query`] can search by words and so that back references can be reported.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use zettel_core::{
//!     boxes::manager::Manager,
//!     config::Config,
//!     context::Context,
//!     encoder::{self, Encoding, EncoderOptions},
//!     eval, parser,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config {
//!         box_uri: vec!["dir://./notes".to_string()],
//!         ..Config::default()
//!     };
//!     let manager = Manager::new(&config)?;
//!     let ctx = Context::background();
//!     manager.start(&ctx)?;
//!     manager.wait_idle().await;
//!
//!     let zettel = manager.get_zettel(&ctx, config.runtime.home_zettel)?;
//!     let rtc = manager.runtime_config();
//!     let mut parsed = parser::parse_zettel(&zettel, "", Some(rtc.as_ref()));
//!     eval::evaluate_zettel(&ctx, &manager, Some(rtc.as_ref()), &mut parsed);
//!     let html =
//!         encoder::encode_blocks_to_string(Encoding::Html, &EncoderOptions::default(), &parsed.ast)?;
//!     println!("{html}");
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `service`: watches directory boxes for changes made outside the process.
//! - `stemming`: reduces search words to their stem before indexing and matching.
//! - `bin`: the `zettel` command line tool.

pub mod ast;
pub mod boxes;
pub mod config;
pub mod context;
pub mod encoder;
pub mod error;
pub mod eval;
pub mod id;
pub mod input;
pub mod meta;
pub mod parser;
pub mod query;
pub mod sx;
#[cfg(test)]
mod tests;
pub mod zettel;

pub use error::*;
