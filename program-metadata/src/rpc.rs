//! [`Network`] implementation for the blocking Solana RPC client.

use solana_account_decoder_client_types::UiAccountEncoding;
use solana_client::client_error::{ClientError, ClientErrorKind};
use solana_client::rpc_client::RpcClient;
use solana_client::rpc_config::{RpcAccountInfoConfig, RpcProgramAccountsConfig};
use solana_client::rpc_filter::{Memcmp, RpcFilterType};
use solana_client::rpc_request::RpcError;
use solana_sdk::account::Account;
use solana_sdk::hash::Hash;
use solana_sdk::instruction::InstructionError;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::{Transaction, TransactionError};
use solana_transaction_status::option_serializer::OptionSerializer;
use solana_transaction_status::UiTransactionEncoding;

use crate::error::{Error, Result};
use crate::header::DISCRIMINATOR_LEN;
use crate::network::Network;

/// Anchor `ConstraintHasOne`, `ConstraintRaw` and the metadata program’s
/// `WrongAuthority` and `InvalidAuthority` error codes.
const AUTHORITY_ERRORS: [u32; 4] = [2001, 2003, 6000, 6005];

impl Network for RpcClient {
    fn get_account(&self, address: &Pubkey) -> Result<Option<Account>> {
        self.get_account_with_commitment(address, self.commitment())
            .map(|resp| resp.value)
            .map_err(classify)
    }

    fn minimum_balance(&self, size: usize) -> Result<u64> {
        self.get_minimum_balance_for_rent_exemption(size).map_err(classify)
    }

    fn latest_blockhash(&self) -> Result<Hash> {
        self.get_latest_blockhash().map_err(classify)
    }

    fn send_and_confirm(&self, transaction: &Transaction) -> Result<Signature> {
        let sig =
            self.send_and_confirm_transaction(transaction).map_err(classify)?;
        if tracing::enabled!(tracing::Level::TRACE) {
            trace_logs(self, &sig);
        }
        Ok(sig)
    }

    fn program_accounts(
        &self,
        program: &Pubkey,
        discriminator: &[u8; DISCRIMINATOR_LEN],
        authority: Option<&Pubkey>,
    ) -> Result<Vec<(Pubkey, Account)>> {
        let mut filters =
            vec![RpcFilterType::Memcmp(Memcmp::new_raw_bytes(0, discriminator.to_vec()))];
        if let Some(authority) = authority {
            filters.push(RpcFilterType::Memcmp(Memcmp::new_raw_bytes(
                DISCRIMINATOR_LEN,
                authority.to_bytes().to_vec(),
            )));
        }
        let config = RpcProgramAccountsConfig {
            filters: Some(filters),
            account_config: RpcAccountInfoConfig {
                encoding: Some(UiAccountEncoding::Base64),
                ..Default::default()
            },
            ..Default::default()
        };
        self.get_program_accounts_with_config(program, config).map_err(classify)
    }
}

/// Logs program messages of a confirmed transaction.
fn trace_logs(client: &RpcClient, sig: &Signature) {
    let resp = match client.get_transaction(sig, UiTransactionEncoding::Binary) {
        Ok(resp) => resp,
        Err(err) => {
            tracing::debug!("cannot fetch transaction {sig}: {err}");
            return;
        }
    };
    tracing::trace!("{sig} executed in slot {}", resp.slot);
    let logs = resp.transaction.meta.map(|meta| meta.log_messages);
    if let Some(OptionSerializer::Some(messages)) = logs {
        for msg in messages {
            tracing::trace!("{msg}");
        }
    }
}

/// Maps RPC client errors onto the library’s error taxonomy.
fn classify(err: ClientError) -> Error {
    match err.get_transaction_error() {
        Some(TransactionError::BlockhashNotFound) => {
            return Error::Transient(err.to_string())
        }
        Some(TransactionError::InstructionError(
            _,
            InstructionError::Custom(code),
        )) if AUTHORITY_ERRORS.contains(&code) => {
            return Error::NotAuthorized(err.to_string())
        }
        Some(TransactionError::InstructionError(
            _,
            InstructionError::MissingRequiredSignature,
        )) => return Error::NotAuthorized(err.to_string()),
        _ => (),
    }
    match err.kind() {
        ClientErrorKind::Io(_) | ClientErrorKind::Reqwest(_) => {
            Error::Transient(err.to_string())
        }
        ClientErrorKind::RpcError(RpcError::ForUser(msg))
            if msg.contains("unable to confirm transaction") =>
        {
            Error::Transient(err.to_string())
        }
        _ => Error::Network(err.to_string()),
    }
}
