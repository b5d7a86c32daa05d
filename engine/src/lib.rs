//! radio24: an always-on internet radio playout engine.
//!
//! The [`playout`] task keeps something on air around the clock: it builds a
//! rotation from the catalog ([`rotation`]), interrupts it at the top of the
//! hour ([`clock`]), recovers from playback failures and fades on
//! pause/resume ([`fader`]). The catalog lives in SQLite ([`store`]) behind
//! the [`source::ContentSource`] seam; audio is played by an
//! [`output::AudioOutput`]. [`api`] exposes all of it over HTTP.

pub mod api;
pub mod clock;
pub mod config;
pub mod error;
pub mod fader;
pub mod model;
pub mod output;
pub mod playout;
pub mod rotation;
pub mod source;
pub mod store;

#[cfg(test)]
mod testing;
