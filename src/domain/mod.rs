//! Domain types shared by the detectors and the reporting layers
//!
//! - `findings`: what a single detector saw in a single document
//! - `violations`: located, reportable results and the error type

pub mod findings;
pub mod violations;
