//! Middleware module - Instrumentation and panic fallback

pub mod fallback;
pub mod instrumentation;
