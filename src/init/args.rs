// SPDX-License-Identifier: Apache-2.0

use clap::Args;

use crate::init::tail_receiver::TailReceiverArgs;

#[derive(Debug, Args, Clone)]
pub struct TailRun {
    /// Seconds to wait for the receiver to finish its current run on shutdown
    #[arg(long, env = "RELTAIL_SHUTDOWN_TIMEOUT_SECS", default_value = "10")]
    pub shutdown_timeout_secs: u64,

    #[command(flatten)]
    pub tail_receiver: TailReceiverArgs,
}
