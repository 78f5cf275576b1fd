//! Client-side playback session controller for a streaming-music service.
//!
//! `coda` authenticates a user, establishes a logical device session,
//! accepts playback commands and exposes a continuously consistent view of
//! the ordered play queue and playback position. All public entry points
//! are synchronous and panic-free; session traffic runs on an internal
//! [`tokio`] runtime owned by the [`player::Player`] engine.
//!
//! The C boundary lives in [`ffi`]; Rust hosts embed [`player::Player`]
//! directly and may inject their own collaborators through the traits in
//! [`connect`] and [`auth`].
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

#[macro_use]
extern crate log;

pub mod auth;
pub mod connect;
pub mod error;
pub mod ffi;
pub mod gateway;
pub mod player;
pub mod position;
pub mod queue;
pub mod session;
pub mod settings;
pub mod token;
pub mod track;
