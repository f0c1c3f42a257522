//! Output generation for stage artifacts and operator views.
//!
//! # Submodules
//!
//! - [`artifacts`]: Reads and writes the raw and clean CSV stores
//! - [`table`]: Renders records as a plain-text table for the terminal
//!
//! # Output Structure
//!
//! ```text
//! data/
//! ├── articles_raw.csv     # Extraction output, fully quoted
//! ├── articles_clean.csv   # Transformation output
//! └── news_articles.db     # Loading output (SQLite)
//!
//! logs/
//! ├── pipeline_log.txt     # Stage events
//! └── newsletter_log.txt   # Delivery outcomes
//! ```

pub mod artifacts;
pub mod table;
