//! Managing existing records.

use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;

use crate::commit::{fee_instructions, submit};
use crate::context::ClientContext;
use crate::error::{Error, Result, ResultExt, Step};
use crate::header::{Header, Layout};
use crate::instruction;
use crate::network::Network;
use crate::reader::fetch_header;

/// A record owned by an authority.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordInfo {
    pub address: Pubkey,
    pub header: Header,
    pub size: usize,
    pub lamports: u64,
}


/// Reassigns authority of the record at `address`.
///
/// The context’s signer must be the current authority.  Setting the
/// authority to the default (all-zero) address makes the record immutable.
pub fn set_authority(
    ctx: &ClientContext,
    address: &Pubkey,
    new_authority: &Pubkey,
) -> Result<Option<Signature>> {
    let header = load(ctx, address, Step::SetAuthority)?;
    if header.layout != Layout::Record {
        let err = Error::validation(format!(
            "cannot change authority of legacy {:?} record",
            header.layout
        ));
        return Err(err.at(Step::SetAuthority, address));
    }
    ensure_authority(ctx, &header).at(Step::SetAuthority, address)?;
    let instructions = [
        fee_instructions(&ctx.fees),
        vec![instruction::set_authority(
            &ctx.metadata_program,
            address,
            &ctx.payer(),
            new_authority,
        )],
    ]
    .concat();
    submit(ctx, "set authority", &instructions, &[], || {
        let header = fetch_header(ctx.network, address)?;
        Ok(header.is_some_and(|(header, _)| header.authority == *new_authority))
    })
    .at(Step::SetAuthority, address)
}

/// Closes the record at `address` returning its deposit to the context’s
/// signer, which must be the record’s authority.
///
/// Works with current and legacy record layouts.
pub fn close_record(ctx: &ClientContext, address: &Pubkey) -> Result<Option<Signature>> {
    let header = load(ctx, address, Step::CloseRecord)?;
    ensure_authority(ctx, &header).at(Step::CloseRecord, address)?;
    let close = instruction::close_record(
        &ctx.metadata_program,
        header.layout,
        address,
        &ctx.payer(),
    )
    .at(Step::CloseRecord, address)?;
    let instructions = [fee_instructions(&ctx.fees), vec![close]].concat();
    submit(ctx, "close record", &instructions, &[], || {
        Ok(ctx.network.get_account(address)?.is_none())
    })
    .at(Step::CloseRecord, address)
}

/// Lists records of all layouts owned by given authority.
pub fn list_records(
    network: &dyn Network,
    metadata_program: &Pubkey,
    authority: &Pubkey,
) -> Result<Vec<RecordInfo>> {
    let mut records = Vec::new();
    for layout in [Layout::Record, Layout::RecordV2, Layout::RecordV1] {
        let accounts = network
            .program_accounts(metadata_program, &layout.discriminator(), Some(authority))
            .at(Step::List, authority)?;
        for (address, account) in accounts {
            match Header::decode(&account.data) {
                Ok((header, _)) => records.push(RecordInfo {
                    address,
                    header,
                    size: account.data.len(),
                    lamports: account.lamports,
                }),
                Err(err) => tracing::warn!("skipping record {address}: {err}"),
            }
        }
    }
    Ok(records)
}

fn load(ctx: &ClientContext, address: &Pubkey, step: Step) -> Result<Header> {
    fetch_header(ctx.network, address)
        .and_then(|header| header.ok_or(Error::NotFound))
        .map(|(header, _)| header)
        .at(step, address)
}

fn ensure_authority(ctx: &ClientContext, header: &Header) -> Result {
    let signer = ctx.payer();
    if header.authority == signer {
        Ok(())
    } else {
        Err(Error::NotAuthorized(format!(
            "record authority is {}, not {signer}",
            header.authority
        )))
    }
}
