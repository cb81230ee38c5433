//! Event-to-call translation
//!
//! Pure mapping from an observed bridge event to the contract call executed
//! on the counterpart chain, plus the ABI encoding for the read-only
//! precondition checks. No I/O. Malformed logs never reach this module; the
//! decode boundary in `events` already rejected them, so translation is total
//! over typed events.

use crate::chain::ChainRole;
use crate::events::{EventKind, RelayEvent, RelayEventId};

use ethers::abi::Token;
use ethers::types::{Address, Bytes, H256};
use ethers::utils::{id, keccak256};
use lazy_static::lazy_static;

lazy_static! {
    /// Role required of the relay account by both bridge contracts
    pub static ref WARDEN_ROLE: H256 = H256(keccak256("BRIDGE_WARDEN_ROLE"));
}

/// An ABI-encodable contract function call
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    /// Canonical signature, e.g. `wrap(address,address,uint256)`
    pub signature: &'static str,
    pub args: Vec<Token>,
}

impl FunctionCall {
    pub fn name(&self) -> &'static str {
        self.signature
            .split_once('(')
            .map(|(name, _)| name)
            .unwrap_or(self.signature)
    }

    /// Selector followed by the ABI-encoded arguments
    pub fn calldata(&self) -> Bytes {
        let mut data = id(self.signature).to_vec();
        data.extend(ethers::abi::encode(&self.args));
        Bytes::from(data)
    }
}

/// A pending relay: which chain to call, and with what.
#[derive(Debug, Clone)]
pub struct RelayInstruction {
    pub event_id: RelayEventId,
    pub target: ChainRole,
    pub call: FunctionCall,
}

/// Map an observed event to the counterpart chain's call.
///
/// Deposit on source mints on destination; Unwrap on destination releases on
/// source. Argument order follows the bridge contracts: (token, recipient,
/// amount).
pub fn translate(event: &RelayEvent) -> RelayInstruction {
    let (target, signature) = match event.kind {
        EventKind::Deposit => (ChainRole::Destination, "wrap(address,address,uint256)"),
        EventKind::Unwrap => (ChainRole::Source, "withdraw(address,address,uint256)"),
    };

    RelayInstruction {
        event_id: event.id,
        target,
        call: FunctionCall {
            signature,
            args: vec![
                Token::Address(event.token),
                Token::Address(event.recipient),
                Token::Uint(event.amount),
            ],
        },
    }
}

/// `approved(address) -> bool` precondition probe
pub fn approved_call(token: Address) -> FunctionCall {
    FunctionCall {
        signature: "approved(address)",
        args: vec![Token::Address(token)],
    }
}

/// `hasRole(bytes32,address) -> bool` probe for the warden role
pub fn has_role_call(role: H256, account: Address) -> FunctionCall {
    FunctionCall {
        signature: "hasRole(bytes32,address)",
        args: vec![
            Token::FixedBytes(role.as_bytes().to_vec()),
            Token::Address(account),
        ],
    }
}
