//! The streaming relay core: wire frames, tool-call correlation, and the
//! assistant session driver.

pub mod correlator;
pub mod frames;
pub mod session;
