pub mod codec;
pub mod wire;

pub use codec::IntLineCodec;
pub use wire::{DeviceSignal, HostCommand};
