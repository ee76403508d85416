//! Trending and popularity ranking for activity feeds.
//!
//! Activity records ("a user rated this at that time") are fetched in
//! windowed, cursor-paged batches, grouped by content key, filtered for
//! eligibility, scored and sorted. Each rail (songs, albums, artists, genre,
//! friends, weekly) is the same pipeline with different parameters.

pub mod cache;
pub mod config;
pub mod controller;
pub mod eligibility;
pub mod error;
pub mod group;
pub mod model;
pub mod paginate;
pub mod pipeline;
pub mod platform;
pub mod score;
pub mod slice;
pub mod source;
pub mod window;

pub use controller::RailController;
pub use error::{Error, Result};
pub use group::{KeyStrategy, ScoredGroup};
pub use model::{ItemType, LogRecord, TrendingItem};
pub use pipeline::{Audience, RailSpec};
pub use score::{ScoreKind, Weights};
pub use slice::{LoadState, Slice};
pub use source::{LogFilter, LogSource, Page, SourceError};
