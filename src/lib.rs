pub mod audio;
pub mod aux_dev;
pub mod catalog;
pub mod command;
pub mod config;
pub mod device;
pub mod emulator;
pub mod error;
pub mod logging;
pub mod notify;
pub mod player;
pub mod relay;
pub mod strings;
pub mod timecode;

pub use emulator::{CdEmulator, EmulatorBuilder, EmulatorStatus};
pub use error::*;
