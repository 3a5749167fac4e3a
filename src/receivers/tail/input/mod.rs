// SPDX-License-Identifier: Apache-2.0

mod cursor;
mod file_id;
mod scanner;

pub use cursor::{FileCursor, epoch_millis};
pub use file_id::FileId;
pub use scanner::{Bound, Candidate, DirectoryScanner};
