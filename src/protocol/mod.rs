//! Wire protocol: JSON frame types and the length-prefixed stream codec

pub mod codec;
pub mod wire;

pub use codec::{encode, FrameCodec, MAX_FRAME_SIZE};
pub use wire::{ClientAction, Login, ServerFrame};
