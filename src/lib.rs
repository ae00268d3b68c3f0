//! Strider: a physics-driven first-person locomotion controller on Rapier.
//!
//! The crate exposes the controller itself under [`player`], its settings
//! under [`config`], and a small headless demo level under [`scenario`].

pub mod config;
pub mod logging;
pub mod player;
pub mod scenario;
