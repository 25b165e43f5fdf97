//! Integration test suite for cfaview.
//!
//! # Test Categories
//!
//! - `dispatcher`: queueing, busy tracking and reply delivery across real
//!   worker threads
//! - `resolver`: display-to-canonical mapping over a loaded model
//! - `render`: the CFA/ARG render session on top of the dispatcher


mod dispatcher;
mod render;
mod resolver;
