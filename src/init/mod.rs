// SPDX-License-Identifier: Apache-2.0

pub mod args;
pub mod tail_receiver;
pub mod wait;
