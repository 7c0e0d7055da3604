//! Marshalling of typed request arguments into owned wire buffers.
//!
//! One writer handles every [`ArgShape`](relay_abi::ArgShape): the encoded
//! size is measured up front, the buffer is reserved in one fallible
//! allocation, and string checks run while writing. A buffer abandoned part
//! way through is zeroed before it is freed when secure erase is requested.
//!
//! Layout (little endian):
//!
//! | shape     | encoding                                                    |
//! |-----------|-------------------------------------------------------------|
//! | `Void`    | empty                                                       |
//! | `Ints`    | `u32` count, then `i32` values                              |
//! | `Strings` | `u32` count, then per string `i32` length (`-1` = null), bytes, NUL |
//! | `Raw`     | `u32` length, then bytes                                    |
//! | `Record`  | `u16` field count, then per field a `u8` tag and its value  |

#![deny(missing_docs)]

mod error;
mod wire;

pub use error::{CodecError, CodecResult, TruncationReason};
pub use wire::{encoded_len, marshal, unmarshal, MarshalOptions};
