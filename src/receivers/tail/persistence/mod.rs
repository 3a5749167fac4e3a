// SPDX-License-Identifier: Apache-2.0

//! Persistence for the tail offset.
//!
//! The offset is a single line of text, replaced atomically on every save.

mod store;
mod text_file;

#[cfg(test)]
pub use store::MockOffsetStore;
pub use store::OffsetStore;
pub use text_file::TextFileOffsetStore;
