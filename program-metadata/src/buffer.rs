//! Staging buffers.
//!
//! A buffer is a fresh keypair account owned by the metadata program, sized
//! to hold exactly the header and the stored payload.  It’s allocated and
//! given its header in a single commit, filled with a sequence of
//! `write_buffer` commits and finally consumed by `set_buffer` and closed.

use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature};
use solana_sdk::signer::Signer;

use crate::commit::{fee_instructions, submit};
use crate::context::ClientContext;
use crate::error::{Result, ResultExt, Step};
use crate::header::{Header, Layout, Tags, HEADER_SIZE};
use crate::instruction::{self, ChunkIter};
use crate::network::Network;
use crate::reader::fetch_header;

/// A buffer owned by an authority.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BufferInfo {
    pub address: Pubkey,
    pub header: Header,
    /// Deposit the buffer holds; returned to the authority when closed.
    pub lamports: u64,
}


/// Allocates a buffer for `stored_len` bytes of payload and writes its
/// header.
///
/// The context’s signer becomes the buffer’s authority and pays the
/// deposit.  Returns the buffer’s address.
pub fn create(
    ctx: &ClientContext,
    seed: &str,
    tags: Tags,
    stored_len: usize,
) -> Result<Pubkey> {
    let keypair = Keypair::new();
    let address = keypair.pubkey();
    let payer = ctx.payer();
    let size = HEADER_SIZE + stored_len;
    let lamports = ctx.network.minimum_balance(size).at(Step::CreateBuffer, &address)?;
    tracing::debug!("creating {size}-byte buffer {address} ({lamports} lamports)");

    let mut instructions = fee_instructions(&ctx.fees);
    instructions.push(solana_system_interface::instruction::create_account(
        &payer,
        &address,
        lamports,
        size as u64,
        &ctx.metadata_program,
    ));
    instructions.push(instruction::create_buffer(
        &ctx.metadata_program,
        &address,
        &payer,
        seed,
        tags,
    ));
    submit(ctx, "create buffer", &instructions, &[&keypair as &dyn Signer], || {
        Ok(ctx.network.get_account(&address)?.is_some())
    })
    .at(Step::CreateBuffer, &address)?;
    Ok(address)
}

/// Fills the buffer with `stored` payload in chunks.
///
/// Each chunk is a separate commit.  The program appends chunks at the
/// buffer’s current payload length so a retried chunk which had landed is
/// detected by the length and not written twice.
pub fn write(ctx: &ClientContext, buffer: &Pubkey, stored: &[u8]) -> Result {
    let chunks = ChunkIter::new(&ctx.metadata_program, *buffer, ctx.payer(), stored);
    let count = chunks.size_hint().0;
    for (index, chunk) in chunks.enumerate() {
        let end = chunk.offset + chunk.len;
        tracing::debug!(
            "writing chunk {}/{count}: bytes {}..{end} of {}",
            index + 1,
            chunk.offset,
            stored.len()
        );
        let mut instructions = fee_instructions(&ctx.fees);
        instructions.push(chunk.instruction);
        submit(ctx, "write buffer", &instructions, &[], || {
            let header = fetch_header(ctx.network, buffer)?;
            Ok(header.is_some_and(|(header, _)| header.data_len as usize >= end))
        })
        .at(Step::WriteBuffer, buffer)?;
    }
    Ok(())
}

/// Closes a buffer returning its deposit to the context’s signer.
///
/// The signer must be the buffer’s authority.  Returns `None` if the buffer
/// was found closed on a retry.
pub fn close(ctx: &ClientContext, buffer: &Pubkey) -> Result<Option<Signature>> {
    let mut instructions = fee_instructions(&ctx.fees);
    instructions.push(instruction::close_buffer(
        &ctx.metadata_program,
        buffer,
        &ctx.payer(),
    ));
    submit(ctx, "close buffer", &instructions, &[], || {
        Ok(ctx.network.get_account(buffer)?.is_none())
    })
    .at(Step::CloseBuffer, buffer)
}

/// Lists buffers of given authority.
///
/// Accounts whose header can’t be parsed are skipped with a warning.
pub fn list(
    network: &dyn Network,
    metadata_program: &Pubkey,
    authority: &Pubkey,
) -> Result<Vec<BufferInfo>> {
    let accounts = network
        .program_accounts(
            metadata_program,
            &Layout::Buffer.discriminator(),
            Some(authority),
        )
        .at(Step::List, authority)?;
    Ok(accounts
        .into_iter()
        .filter_map(|(address, account)| match Header::decode(&account.data) {
            Ok((header, _)) => {
                Some(BufferInfo { address, header, lamports: account.lamports })
            }
            Err(err) => {
                tracing::warn!("skipping buffer {address}: {err}");
                None
            }
        })
        .collect())
}
