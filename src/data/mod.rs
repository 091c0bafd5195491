//! Data layer: core types and measurement-file ingestion.
//!
//! Architecture:
//! ```text
//!  .csv / delimited text
//!        │
//!        ▼
//!   ┌──────────┐
//!   │  loader   │  detect encoding + delimiter, map headers → Measurement
//!   └──────────┘
//!        │
//!        ▼
//!   ┌──────────────┐
//!   │  Measurement  │  sample id, channel, raw ‰ value, replicate, session
//!   └──────────────┘
//!        │
//!        ▼
//!   aggregate → calibrate → quantify   (see the top-level modules)
//! ```

pub mod loader;
pub mod model;
