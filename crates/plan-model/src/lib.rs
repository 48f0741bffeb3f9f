//! Reelsmith Plan Model
//!
//! Defines the data contracts handed to the render engine:
//! - **Config:** Output size, frame rate, preset, premium/beat settings, mode
//! - **Plan:** Ordered still/clip track items, optional audio, timed overlays
//! - **Treatment:** Named filters, 2D transforms, pan/zoom motion
//!
//! Timeline positions are integer microseconds so that the contiguity and
//! total-duration invariants checked at construction hold exactly. Positions
//! used for overlays and transforms are normalized to `[0.0, 1.0]` of the
//! canvas.

pub mod config;
pub mod filter;
pub mod overlay;
pub mod plan;
pub mod time;
pub mod transform;

pub use config::*;
pub use filter::*;
pub use overlay::*;
pub use plan::*;
pub use time::*;
pub use transform::*;
