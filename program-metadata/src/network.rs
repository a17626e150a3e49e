//! Interfaces to the outside world.
//!
//! [`Network`] abstracts the cluster the records live on and [`UrlFetcher`]
//! the web server URL-sourced records point at.  Implementations backed by
//! the Solana RPC client and by `reqwest` are available with `rpc` and `http`
//! features respectively.

use solana_sdk::account::Account;
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::Transaction;

use crate::error::Result;
use crate::header::DISCRIMINATOR_LEN;

/// Access to the ledger.
///
/// Implementations classify their failures: anything which may succeed if
/// the same unit of work is resubmitted (connection problems, expired
/// blockhash, confirmation timeout) must be reported as
/// [`crate::Error::Transient`] and rejections of the signer by the metadata
/// program as [`crate::Error::NotAuthorized`].
pub trait Network {
    /// Returns the account at given address or `None` if it doesn’t exist.
    fn get_account(&self, address: &Pubkey) -> Result<Option<Account>>;

    /// Returns the storage deposit an account of given size needs.
    fn minimum_balance(&self, size: usize) -> Result<u64>;

    fn latest_blockhash(&self) -> Result<Hash>;

    /// Submits a signed transaction and waits for its confirmation.
    fn send_and_confirm(&self, transaction: &Transaction) -> Result<Signature>;

    /// Lists accounts owned by `program` whose data starts with
    /// `discriminator` and, if given, have `authority` stored right after
    /// it.
    fn program_accounts(
        &self,
        program: &Pubkey,
        discriminator: &[u8; DISCRIMINATOR_LEN],
        authority: Option<&Pubkey>,
    ) -> Result<Vec<(Pubkey, Account)>>;
}

/// Fetches documents URL-sourced records point at.
pub trait UrlFetcher {
    /// Returns body of the document at `url` or a description of why it
    /// couldn’t be fetched.
    fn fetch(&self, url: &str) -> Result<Vec<u8>, String>;
}


/// [`UrlFetcher`] using blocking `reqwest` client.
#[cfg(feature = "http")]
#[derive(Clone, Debug, Default)]
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

#[cfg(feature = "http")]
impl HttpFetcher {
    pub fn new(client: reqwest::blocking::Client) -> Self { Self { client } }
}

#[cfg(feature = "http")]
impl UrlFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, String> {
        tracing::debug!("fetching {url}");
        self.client
            .get(url)
            .send()
            .and_then(|resp| resp.error_for_status())
            .and_then(|resp| resp.bytes())
            .map(|body| body.to_vec())
            .map_err(|err| err.to_string())
    }
}
