//! Reading records.

use core::str::FromStr;

use solana_sdk::account::Account;
use solana_sdk::pubkey::Pubkey;

use crate::address::RecordSeeds;
use crate::compression::decode_payload;
use crate::error::{Error, Result, ResultExt, Step};
use crate::header::{DataSource, Header};
use crate::network::{Network, UrlFetcher};

/// A record (or buffer) as stored on chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    pub address: Pubkey,
    pub header: Header,
    /// Stored, usually compressed, payload.
    pub stored: Vec<u8>,
    /// Size of the account data.
    pub size: usize,
}

impl Record {
    /// Decompresses the stored payload according to the header’s tags.
    pub fn payload(&self) -> Result<Vec<u8>> {
        decode_payload(&self.stored, self.header.tags.compression)
    }
}


/// Loads the account at `address` and parses its header.
pub(crate) fn fetch_header(
    network: &dyn Network,
    address: &Pubkey,
) -> Result<Option<(Header, Account)>> {
    let Some(account) = network.get_account(address)? else {
        return Ok(None);
    };
    let (header, _) = Header::decode(&account.data)?;
    Ok(Some((header, account)))
}

/// Loads and parses the record at `address`.  Returns `None` if there’s no
/// account at the address.
pub fn fetch_record(network: &dyn Network, address: &Pubkey) -> Result<Option<Record>> {
    let account = network.get_account(address).at(Step::Fetch, address)?;
    let Some(account) = account else { return Ok(None) };
    let (header, stored) = Header::decode(&account.data).at(Step::Fetch, address)?;
    Ok(Some(Record {
        address: *address,
        header,
        stored: stored.to_vec(),
        size: account.data.len(),
    }))
}

/// Reads the content of the record at `address`.
///
/// The stored payload is decompressed and then resolved according to the
/// record’s data source:
/// - `direct` payload is returned once it passes the format check,
/// - `url` payload is a URL whose body is fetched with `fetcher` and
///   returned once it passes the format check,
/// - `account` payload is the address of another account whose data is
///   returned.
///
/// Fails with [`Error::NotFound`] if the record doesn’t exist.
pub fn fetch(
    network: &dyn Network,
    fetcher: Option<&dyn UrlFetcher>,
    address: &Pubkey,
) -> Result<Vec<u8>> {
    let record = fetch_record(network, address)?
        .ok_or(Error::NotFound)
        .at(Step::Fetch, address)?;
    let payload = record.payload().at(Step::Fetch, address)?;
    let format = record.header.tags.format;
    tracing::debug!(
        "{address}: {} record, {} bytes stored, {} bytes of {format} via {}",
        record.header.kind,
        record.stored.len(),
        payload.len(),
        record.header.tags.source,
    );
    match record.header.tags.source {
        DataSource::Direct => {
            format
                .validate(&payload)
                .map_err(|reason| {
                    Error::validation(format!("content is not valid {format}: {reason}"))
                })
                .at(Step::Fetch, address)?;
            Ok(payload)
        }
        DataSource::Url => {
            let url = core::str::from_utf8(&payload)
                .map(str::trim)
                .map_err(|_| Error::malformed("URL is not UTF-8"))
                .at(Step::Fetch, address)?;
            fetch_url(fetcher, url, format).at(Step::Fetch, address)
        }
        DataSource::Account => {
            let target = core::str::from_utf8(&payload)
                .ok()
                .and_then(|text| Pubkey::from_str(text.trim()).ok())
                .ok_or_else(|| Error::malformed("payload is not an account address"))
                .at(Step::Fetch, address)?;
            let account = network
                .get_account(&target)
                .and_then(|account| account.ok_or(Error::NotFound))
                .at(Step::Fetch, &target)?;
            Ok(account.data)
        }
    }
}

/// Reads the content of the record with given seeds.
pub fn fetch_by_seeds(
    network: &dyn Network,
    fetcher: Option<&dyn UrlFetcher>,
    metadata_program: &Pubkey,
    seeds: &RecordSeeds,
) -> Result<Vec<u8>> {
    let (address, _) = seeds.derive(metadata_program)?;
    fetch(network, fetcher, &address)
}

/// Fetches document at `url` and checks it’s well-formed `format`.
pub(crate) fn fetch_url(
    fetcher: Option<&dyn UrlFetcher>,
    url: &str,
    format: crate::header::Format,
) -> Result<Vec<u8>> {
    let fail = |reason: String| Error::IndirectFetch { url: url.into(), reason };
    let fetcher = fetcher.ok_or_else(|| fail("no URL fetcher available".into()))?;
    let body = fetcher.fetch(url).map_err(fail)?;
    format
        .validate(&body)
        .map_err(|reason| fail(format!("not valid {format}: {reason}")))?;
    Ok(body)
}
