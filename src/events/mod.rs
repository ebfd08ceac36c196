//! # Events Module
//!
//! Event-driven status reporting.
//!
//! ## Design
//! The core library emits events through channels, allowing any UI
//! (CLI, GUI, tray app) to subscribe and display what happened to each
//! document.
//!
//! ## Example
//! ```rust,ignore
//! let (sender, receiver) = EventChannel::new();
//!
//! std::thread::spawn(move || {
//!     for event in receiver.iter() {
//!         if let Event::Status(status) = event {
//!             println!("[{}] {}", status.level, status.message);
//!         }
//!     }
//! });
//!
//! let processor = FileProcessor::new(classifier, directories, sender);
//! ```

mod channel;
mod types;

pub use channel::{null_sender, EventChannel, EventReceiver, EventSender};
pub use types::*;
