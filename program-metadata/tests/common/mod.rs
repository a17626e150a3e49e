//! In-memory ledger emulating the metadata program.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use solana_program_metadata::instruction::MetadataInstruction;
use solana_program_metadata::resize::MAX_RESIZE_STEP;
use solana_program_metadata::{
    ClientContext, ContentKind, Error, Header, Layout, Network, RecordSeeds,
    Result, RetryPolicy, METADATA_PROGRAM_ID,
};
use solana_sdk::account::Account;
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::signer::keypair::Keypair;
use solana_sdk::transaction::Transaction;

/// Failure injected into a transaction submission.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Failure {
    /// Transaction is dropped before execution.
    Dropped,
    /// Transaction executes but confirmation is lost.
    LostConfirmation,
}

#[derive(Default)]
struct State {
    accounts: HashMap<Pubkey, Account>,
    upgrade_authorities: HashMap<Pubkey, Pubkey>,
    schedule: VecDeque<Option<Failure>>,
    commits: Vec<Vec<&'static str>>,
    sends: usize,
}

#[derive(Default)]
pub struct MockLedger {
    state: RefCell<State>,
}

impl MockLedger {
    /// Registers an upgradeable program with given upgrade authority.
    pub fn deploy(&self, program_id: Pubkey, authority: Pubkey) {
        self.state.borrow_mut().upgrade_authorities.insert(program_id, authority);
    }

    /// Sets failures for the upcoming submissions, one entry per submission.
    pub fn schedule(&self, plan: impl IntoIterator<Item = Option<Failure>>) {
        self.state.borrow_mut().schedule = plan.into_iter().collect();
    }

    pub fn account(&self, address: &Pubkey) -> Option<Account> {
        self.state.borrow().accounts.get(address).cloned()
    }

    pub fn insert_account(&self, address: Pubkey, data: Vec<u8>) {
        let account = Account {
            lamports: rent(data.len()),
            data,
            owner: METADATA_PROGRAM_ID,
            executable: false,
            rent_epoch: 0,
        };
        self.state.borrow_mut().accounts.insert(address, account);
    }

    /// Names of metadata program instructions of each executed commit.
    pub fn commits(&self) -> Vec<Vec<&'static str>> {
        self.state.borrow().commits.clone()
    }

    /// Number of submissions, including failed ones.
    pub fn sends(&self) -> usize { self.state.borrow().sends }

    pub fn header(&self, address: &Pubkey) -> Option<Header> {
        let account = self.account(address)?;
        Header::decode(&account.data).ok().map(|(header, _)| header)
    }
}

fn rent(size: usize) -> u64 { (size as u64 + 128) * 6960 }

impl Network for MockLedger {
    fn get_account(&self, address: &Pubkey) -> Result<Option<Account>> {
        Ok(self.account(address))
    }

    fn minimum_balance(&self, size: usize) -> Result<u64> { Ok(rent(size)) }

    fn latest_blockhash(&self) -> Result<Hash> { Ok(Hash::new_from_array([7; 32])) }

    fn send_and_confirm(&self, tx: &Transaction) -> Result<Signature> {
        let mut state = self.state.borrow_mut();
        state.sends += 1;
        let failure = state.schedule.pop_front().flatten();
        if failure == Some(Failure::Dropped) {
            return Err(Error::Transient("transaction dropped".into()));
        }
        tx.verify().map_err(|err| Error::Network(err.to_string()))?;

        let mut accounts = state.accounts.clone();
        let mut names = Vec::new();
        let upgrade_authorities = state.upgrade_authorities.clone();
        let mut exec = Exec { accounts: &mut accounts, upgrade_authorities: &upgrade_authorities };
        let message = &tx.message;
        for ix in &message.instructions {
            let keys = ix
                .accounts
                .iter()
                .map(|&idx| {
                    let idx = usize::from(idx);
                    (message.account_keys[idx], message.is_signer(idx))
                })
                .collect::<Vec<_>>();
            let program = message.account_keys[usize::from(ix.program_id_index)];
            if program == solana_sdk::compute_budget::ID {
                continue;
            } else if program == solana_sdk::system_program::ID {
                exec.system(&keys, &ix.data)?;
            } else if program == METADATA_PROGRAM_ID {
                let ix = MetadataInstruction::decode(&ix.data)?;
                names.push(ix.name());
                exec.metadata(&keys, ix)?;
            } else {
                return Err(Error::Network(format!("unknown program {program}")));
            }
        }
        state.accounts = accounts;
        state.commits.push(names);
        if failure == Some(Failure::LostConfirmation) {
            return Err(Error::Transient("confirmation timed out".into()));
        }
        Ok(tx.signatures[0])
    }

    fn program_accounts(
        &self,
        program: &Pubkey,
        discriminator: &[u8; 8],
        authority: Option<&Pubkey>,
    ) -> Result<Vec<(Pubkey, Account)>> {
        let state = self.state.borrow();
        let mut found = state
            .accounts
            .iter()
            .filter(|(_, account)| {
                account.owner == *program &&
                    account.data.starts_with(discriminator) &&
                    authority.map_or(true, |authority| {
                        account.data.get(8..40) == Some(authority.as_ref())
                    })
            })
            .map(|(key, account)| (*key, account.clone()))
            .collect::<Vec<_>>();
        found.sort_by_key(|(key, _)| *key);
        Ok(found)
    }
}


struct Exec<'a> {
    accounts: &'a mut HashMap<Pubkey, Account>,
    upgrade_authorities: &'a HashMap<Pubkey, Pubkey>,
}

type Keys = [(Pubkey, bool)];

fn fail(msg: impl Into<String>) -> Error { Error::Network(msg.into()) }

fn denied(msg: impl Into<String>) -> Error { Error::NotAuthorized(msg.into()) }

fn signer(keys: &Keys, idx: usize) -> Result<Pubkey> {
    match keys.get(idx) {
        Some(&(key, true)) if key != Pubkey::default() => Ok(key),
        Some(&(key, _)) => Err(denied(format!("{key} did not sign"))),
        None => Err(fail("missing account")),
    }
}

fn key(keys: &Keys, idx: usize) -> Result<Pubkey> {
    keys.get(idx).map(|(key, _)| *key).ok_or_else(|| fail("missing account"))
}

impl Exec<'_> {
    fn system(&mut self, keys: &Keys, data: &[u8]) -> Result {
        // CreateAccount { lamports: u64, space: u64, owner: Pubkey }
        if data.len() != 52 || data[..4] != [0, 0, 0, 0] {
            return Err(fail("unsupported system instruction"));
        }
        signer(keys, 0)?;
        let address = signer(keys, 1)?;
        if self.accounts.contains_key(&address) {
            return Err(fail("account already in use"));
        }
        let lamports = u64::from_le_bytes(data[4..12].try_into().unwrap());
        let space = u64::from_le_bytes(data[12..20].try_into().unwrap());
        let owner = Pubkey::try_from(&data[20..52]).unwrap();
        self.accounts.insert(address, Account {
            lamports,
            data: vec![0; space as usize],
            owner,
            executable: false,
            rent_epoch: 0,
        });
        Ok(())
    }

    fn load(&self, address: &Pubkey) -> Result<(Header, Vec<u8>, usize)> {
        let account =
            self.accounts.get(address).ok_or_else(|| fail("account not found"))?;
        let (header, payload) = Header::decode(&account.data)?;
        Ok((header, payload.to_vec(), account.data.len()))
    }

    /// Parses a record header ignoring `data_len`, which a shrinking resize
    /// leaves stale until the next `set_buffer`.
    fn load_record(&self, address: &Pubkey) -> Result<(Header, usize)> {
        let account =
            self.accounts.get(address).ok_or_else(|| fail("account not found"))?;
        let mut data = account.data.clone();
        if let Some(data_len) = data.get_mut(88..92) {
            data_len.fill(0);
        }
        let (header, _) = Header::decode(&data)?;
        Ok((header, data.len()))
    }

    fn store(&mut self, address: &Pubkey, header: &Header, payload: &[u8]) -> Result {
        let bytes = header.encode(payload)?;
        let account =
            self.accounts.get_mut(address).ok_or_else(|| fail("account not found"))?;
        let data = account
            .data
            .get_mut(..bytes.len())
            .ok_or_else(|| fail("account too small"))?;
        data.copy_from_slice(&bytes);
        Ok(())
    }

    fn metadata(&mut self, keys: &Keys, ix: MetadataInstruction) -> Result {
        match ix {
            MetadataInstruction::Initialize { seed, tags, signer_seeded } => {
                let pda = key(keys, 0)?;
                let signer = signer(keys, 1)?;
                let program_id = key(keys, 3)?;
                let seeds = if signer_seeded {
                    RecordSeeds::with_signer(program_id, seed.clone(), signer)
                } else {
                    if self.upgrade_authorities.get(&program_id) != Some(&signer) {
                        return Err(denied("signer is not the upgrade authority"));
                    }
                    RecordSeeds::canonical(program_id, seed.clone())
                };
                if seeds.derive(&METADATA_PROGRAM_ID)?.0 != pda {
                    return Err(fail("seeds constraint violated"));
                }
                if self.accounts.contains_key(&pda) {
                    return Err(fail("account already in use"));
                }
                let header = Header {
                    layout: Layout::Record,
                    authority: signer,
                    kind: ContentKind::new(&seed)?,
                    program_id,
                    data_len: 0,
                    tags,
                };
                let data = header.encode(b"")?;
                self.accounts.insert(pda, Account {
                    lamports: rent(data.len()),
                    data,
                    owner: METADATA_PROGRAM_ID,
                    executable: false,
                    rent_epoch: 0,
                });
                Ok(())
            }
            MetadataInstruction::CreateBuffer { seed, tags } => {
                let buffer = key(keys, 0)?;
                let authority = signer(keys, 1)?;
                let account = self
                    .accounts
                    .get(&buffer)
                    .ok_or_else(|| fail("buffer not allocated"))?;
                if account.owner != METADATA_PROGRAM_ID || account.data[..8] != [0; 8] {
                    return Err(fail("buffer already initialised"));
                }
                let header = Header {
                    layout: Layout::Buffer,
                    authority,
                    kind: ContentKind::new(&seed)?,
                    program_id: Pubkey::default(),
                    data_len: 0,
                    tags,
                };
                self.store(&buffer, &header, b"")
            }
            MetadataInstruction::WriteBuffer { data } => {
                let buffer = key(keys, 0)?;
                let signer = signer(keys, 1)?;
                let (mut header, mut payload, _) = self.load(&buffer)?;
                if header.layout != Layout::Buffer || header.authority != signer {
                    return Err(denied("buffer authority mismatch"));
                }
                payload.extend_from_slice(&data);
                header.data_len = payload.len() as u32;
                self.store(&buffer, &header, &payload)
            }
            MetadataInstruction::Resize { len } => {
                let pda = key(keys, 0)?;
                let signer = signer(keys, 1)?;
                let (header, size) = self.load_record(&pda)?;
                if header.authority != signer {
                    return Err(denied("record authority mismatch"));
                }
                let len = usize::from(len);
                if len > size + MAX_RESIZE_STEP {
                    return Err(fail("account data size increase too large"));
                }
                let account =
                    self.accounts.get_mut(&pda).ok_or_else(|| fail("account not found"))?;
                account.data.resize(len, 0);
                account.lamports = rent(len);
                Ok(())
            }
            MetadataInstruction::SetBuffer => {
                let buffer = key(keys, 0)?;
                let pda = key(keys, 1)?;
                let authority = signer(keys, 2)?;
                let program_id = key(keys, 3)?;
                let (buf_header, payload, _) = self.load(&buffer)?;
                if buf_header.layout != Layout::Buffer {
                    return Err(fail("not a buffer"));
                }
                let (mut header, size) = self.load_record(&pda)?;
                if header.program_id != program_id {
                    return Err(fail("wrong program id"));
                }
                let upgrade = self.upgrade_authorities.get(&program_id) == Some(&authority);
                if !upgrade && header.authority != authority {
                    return Err(denied("record authority mismatch"));
                }
                if Layout::Record.header_size() + payload.len() > size {
                    return Err(fail("record too small"));
                }
                header.authority = authority;
                header.kind = buf_header.kind;
                header.tags = buf_header.tags;
                header.data_len = buf_header.data_len;
                self.store(&pda, &header, &payload)
            }
            MetadataInstruction::CloseBuffer => {
                let buffer = key(keys, 0)?;
                let authority = signer(keys, 1)?;
                let (header, _, _) = self.load(&buffer)?;
                if header.layout != Layout::Buffer || header.authority != authority {
                    return Err(denied("buffer authority mismatch"));
                }
                self.accounts.remove(&buffer);
                Ok(())
            }
            MetadataInstruction::SetAuthority { new_authority } => {
                let pda = key(keys, 0)?;
                let authority = signer(keys, 1)?;
                let (mut header, payload, _) = self.load(&pda)?;
                if header.authority != authority {
                    return Err(denied("record authority mismatch"));
                }
                header.authority = new_authority;
                self.store(&pda, &header, &payload)
            }
            MetadataInstruction::CloseRecord(layout) => {
                let pda = key(keys, 0)?;
                let authority = signer(keys, 1)?;
                let (header, _, _) = self.load(&pda)?;
                if header.layout != layout {
                    return Err(fail("account discriminator mismatch"));
                }
                if header.authority != authority {
                    return Err(denied("record authority mismatch"));
                }
                self.accounts.remove(&pda);
                Ok(())
            }
        }
    }
}


/// Retry policy without delays.
pub fn quick_retry() -> RetryPolicy {
    RetryPolicy { max_attempts: 3, base_delay: Duration::ZERO }
}

pub fn context<'a>(ledger: &'a MockLedger, signer: &'a Keypair) -> ClientContext<'a> {
    ClientContext::new(ledger, signer).with_retry(quick_retry())
}

/// Deterministic incompressible bytes.
pub fn noise(len: usize, seed: u64) -> Vec<u8> {
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
    (0..len)
        .map(|_| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (state >> 33) as u8
        })
        .collect()
}
