//! Transaction submission module with nonce ownership and gas policy

mod gas;
mod nonce;
mod submitter;

pub use gas::GasEstimator;
pub use nonce::{NonceLease, NonceManager};
pub use submitter::{ConfirmOutcome, Submitter};
