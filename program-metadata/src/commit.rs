//! Building, packing and submitting commits.
//!
//! A commit is a single transaction.  Every commit is prefixed with the
//! compute budget instructions of the context’s [`FeePolicy`] and submitted
//! under its [`crate::RetryPolicy`].

use base64::Engine;
use solana_sdk::compute_budget::ComputeBudgetInstruction;
use solana_sdk::hash::Hash;
use solana_sdk::instruction::Instruction;
use solana_sdk::message::Message;
use solana_sdk::packet::PACKET_DATA_SIZE;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::signer::Signer;
use solana_sdk::transaction::Transaction;

use crate::context::{ClientContext, FeePolicy};
use crate::error::{Error, Result};

/// Returns compute budget instructions for given fee policy.
pub(crate) fn fee_instructions(fees: &FeePolicy) -> Vec<Instruction> {
    let mut instructions = Vec::with_capacity(2);
    if let Some(limit) = fees.compute_unit_limit {
        instructions.push(ComputeBudgetInstruction::set_compute_unit_limit(limit));
    }
    if fees.priority_fee > 0 {
        instructions.push(ComputeBudgetInstruction::set_compute_unit_price(
            fees.priority_fee,
        ));
    }
    instructions
}

/// Size of a transaction signed by all required signers of `message`.
pub(crate) fn transaction_size(message: &Message) -> usize {
    let signatures = usize::from(message.header.num_required_signatures);
    // Signature count is a short-vec; it’s a single byte below 128.
    1 + signatures * 64 + message.serialize().len()
}

/// Greedily packs `instructions` into as few commits as fit in a packet.
///
/// Each returned commit starts with the fee instructions.  Order of
/// instructions is preserved.  Fails if a single instruction doesn’t fit.
pub(crate) fn pack(
    fees: &FeePolicy,
    payer: &Pubkey,
    instructions: Vec<Instruction>,
) -> Result<Vec<Vec<Instruction>>> {
    let prefix = fee_instructions(fees);
    let too_big = |instruction: &Instruction| {
        Error::validation(format!(
            "instruction for {} doesn’t fit in a transaction",
            instruction.program_id
        ))
    };
    let mut commits = Vec::new();
    let mut current = prefix.clone();
    for instruction in instructions {
        current.push(instruction);
        if fits(payer, &current) {
            continue;
        }
        let last = current.split_off(current.len() - 1);
        if current.len() == prefix.len() {
            return Err(too_big(&last[0]));
        }
        let next = [prefix.clone(), last].concat();
        commits.push(core::mem::replace(&mut current, next));
        if !fits(payer, &current) {
            return Err(too_big(&current[prefix.len()]));
        }
    }
    if current.len() > prefix.len() {
        commits.push(current);
    }
    Ok(commits)
}

fn fits(payer: &Pubkey, instructions: &[Instruction]) -> bool {
    let message = Message::new(instructions, Some(payer));
    transaction_size(&message) <= PACKET_DATA_SIZE
}


/// Signs and submits a commit, retrying transient failures.
///
/// On retries `applied` is consulted first and if it reports that an earlier
/// attempt took effect after all nothing is resubmitted and `None` is
/// returned.  `extra_signers` sign next to the context’s signer which is
/// always the fee payer.
pub(crate) fn submit(
    ctx: &ClientContext,
    what: &str,
    instructions: &[Instruction],
    extra_signers: &[&dyn Signer],
    mut applied: impl FnMut() -> Result<bool>,
) -> Result<Option<Signature>> {
    let payer = ctx.payer();
    let signers: Vec<&dyn Signer> =
        core::iter::once(ctx.signer).chain(extra_signers.iter().copied()).collect();
    ctx.retry.run(what, |attempt| {
        if attempt > 1 && applied()? {
            tracing::info!("{what}: already applied");
            return Ok(None);
        }
        let blockhash = ctx.network.latest_blockhash()?;
        let message =
            Message::new_with_blockhash(instructions, Some(&payer), &blockhash);
        let mut tx = Transaction::new_unsigned(message);
        tx.try_sign(&signers, blockhash)?;
        let sig = ctx.network.send_and_confirm(&tx)?;
        tracing::info!("{what}: confirmed {sig}");
        Ok(Some(sig))
    })
}


/// Unsigned commit handed over to another party for signing.
#[derive(Clone, Debug, PartialEq)]
pub struct ExportedTransaction {
    /// Address of the record the commit updates.
    pub address: Pubkey,
    /// Buffer the commit consumes.  The authority should close it once the
    /// commit lands, reclaiming its deposit.
    pub buffer: Pubkey,
    pub message: Message,
}

impl ExportedTransaction {
    /// Builds the message with `authority` as fee payer and no blockhash.
    pub(crate) fn new(
        address: Pubkey,
        buffer: Pubkey,
        authority: &Pubkey,
        instructions: &[Instruction],
    ) -> Self {
        let message =
            Message::new_with_blockhash(instructions, Some(authority), &Hash::default());
        Self { address, buffer, message }
    }

    /// Base64 encoding of the serialised message.
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.message.serialize())
    }

    /// Size of the transaction once signed.
    pub fn transaction_size(&self) -> usize { transaction_size(&self.message) }
}
