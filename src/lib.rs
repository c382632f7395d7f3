//! Vehicle Watch
//!
//! Real-time vehicle detection over an MJPEG camera stream.
//!
//! # Architecture
//!
//! Each loop iteration is strictly sequential:
//!
//! 1. **Acquire**: the primary HTTP reader fetches one frame with bounded retries;
//!    on failure a persistent fallback capture session is tried once.
//! 2. **Schedule**: every Nth frame runs detection; the rest reuse the cached result.
//! 3. **Detect**: argmax class selection, vehicle filtering, then greedy NMS.
//! 4. **Present**: boxes, labels and a HUD are drawn and handed to a `Display`.
//!
//! Consecutive acquisition failures are tracked by a health monitor that forces a
//! cooldown pause once a threshold is exceeded.
//!
//! # Module Structure
//!
//! - `ingest`: MJPEG boundary parsing, primary HTTP reader, fallback capture session
//! - `detect`: inference seam, post-processing, detection engine
//! - `schedule`: frame decimation and result cache
//! - `health`: consecutive-failure tracking and cooldown
//! - `render`: annotation, HUD, placeholder, display seam
//! - `pipeline`: the control loop tying it together

pub mod config;
pub mod detect;
pub mod error;
pub mod frame;
pub mod health;
pub mod ingest;
pub mod pipeline;
pub mod render;
pub mod schedule;

pub use config::WatchConfig;
pub use error::{AcquireError, AcquireResult};
pub use frame::{AnnotatedFrame, Frame};
pub use pipeline::{Iteration, LoopStats, WatchLoop};
