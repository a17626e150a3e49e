use solana_sdk::pubkey::Pubkey;
use solana_sdk::signer::Signer;

use crate::address::METADATA_PROGRAM_ID;
use crate::network::Network;
use crate::retry::RetryPolicy;

/// Priority fee settings applied to every submitted transaction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FeePolicy {
    /// Compute unit price in micro-lamports.  No price instruction is added
    /// when zero.
    pub priority_fee: u64,
    /// Compute unit limit; the runtime’s default when `None`.
    pub compute_unit_limit: Option<u32>,
}

impl FeePolicy {
    pub fn with_priority_fee(priority_fee: u64) -> Self {
        Self { priority_fee, ..Self::default() }
    }
}


/// Everything an operation needs to talk to the cluster.
///
/// Passed explicitly to each operation.  The signer is the fee payer of all
/// submitted transactions and the authority of buffers and records it
/// creates.
#[derive(Clone, Copy)]
pub struct ClientContext<'a> {
    pub network: &'a dyn Network,
    pub signer: &'a dyn Signer,
    pub fees: FeePolicy,
    pub retry: RetryPolicy,
    /// Address of the metadata program; [`METADATA_PROGRAM_ID`] by default.
    pub metadata_program: Pubkey,
}

impl<'a> ClientContext<'a> {
    pub fn new(network: &'a dyn Network, signer: &'a dyn Signer) -> Self {
        Self {
            network,
            signer,
            fees: FeePolicy::default(),
            retry: RetryPolicy::default(),
            metadata_program: METADATA_PROGRAM_ID,
        }
    }

    pub fn with_fees(self, fees: FeePolicy) -> Self { Self { fees, ..self } }

    pub fn with_retry(self, retry: RetryPolicy) -> Self { Self { retry, ..self } }

    pub fn with_metadata_program(self, metadata_program: Pubkey) -> Self {
        Self { metadata_program, ..self }
    }

    /// Address of the signer.
    pub fn payer(&self) -> Pubkey { self.signer.pubkey() }
}

impl core::fmt::Debug for ClientContext<'_> {
    fn fmt(&self, fmtr: &mut core::fmt::Formatter) -> core::fmt::Result {
        fmtr.debug_struct("ClientContext")
            .field("signer", &self.payer())
            .field("fees", &self.fees)
            .field("retry", &self.retry)
            .field("metadata_program", &self.metadata_program)
            .finish_non_exhaustive()
    }
}
