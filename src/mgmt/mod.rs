//! Management-channel protocol handling.
//!
//! The worker process connects back to a loopback management port and speaks
//! a line-oriented frame protocol: a fixed header line opens a frame,
//! `Key: Value` lines populate it, a blank line closes it. This module owns
//! both directions:
//!
//! - `codec`: the strict two-state frame decoder, the
//!   [`tokio_util::codec::Decoder`] used on the control socket, and the
//!   outbound command encoder.
//! - `event`: decoded events, the field vocabulary, and the enhanced
//!   lower_snake/typed translation with its exact inverse.

pub mod codec;
pub mod event;
