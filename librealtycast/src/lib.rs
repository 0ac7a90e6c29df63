//! Realtycast - social scheduling and multi-platform publishing
//!
//! This library holds the publishing engine behind the real-estate site's
//! social tools: post storage and claiming, OAuth token custody with
//! refresh-on-read, one adapter per social platform, and a trigger-driven
//! scheduler that fans each due post out to its platforms.

pub mod config;
pub mod error;
pub mod logging;
pub mod oauth;
pub mod platforms;
pub mod posts;
pub mod publisher;
pub mod rate_limiter;
pub mod scheduler;
pub mod scheduling;
pub mod service;
pub mod store;
pub mod tokens;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use error::{RealtycastError, Result};
pub use scheduler::{PerPostResult, SchedulerRun};
pub use service::RealtycastService;
pub use types::{NewPost, Platform, PostStatus, PublishResult, PublishStatus, SocialPost};
