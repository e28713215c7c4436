//! Sources of capture requests besides the presentation layer.

#[cfg(feature = "keyboard")]
mod keyboard;
mod udp;

#[cfg(feature = "keyboard")]
pub use keyboard::{KeyAction, KeyboardInputHandler};
pub use udp::UdpTriggerListener;
