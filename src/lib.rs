//! Driver for a small serial LED matrix.
//!
//! Animations draw onto a shared [`surface::RasterSurface`]; a
//! [`transport::FrameTransport`] encodes the surface into the device's
//! one-byte-per-pixel serpentine format and streams it over a serial port.
//! A [`scheduler::ModeScheduler`] keeps exactly one animation running and is
//! driven by JSON requests from the [`control`] socket. The [`bypass`] socket
//! lets an external producer stream pre-encoded frames instead.

pub mod bypass;
pub mod catalog;
pub mod color;
pub mod config;
pub mod control;
pub mod device;
pub mod encoder;
pub mod modes;
pub mod power;
pub mod request;
pub mod scheduler;
pub mod shutdown;
pub mod surface;
pub mod transport;
