//! Instructions of the metadata program.
//!
//! Instruction data is an 8-byte Anchor discriminator followed by
//! Borsh-serialised arguments.  Strings and byte vectors are prefixed with
//! their length as a 4-byte little-endian integer; classification enums are
//! single bytes.

use core::num::NonZeroU16;

use solana_program::instruction::{AccountMeta, Instruction};
use solana_program::pubkey::Pubkey;

use crate::address::{program_data_address, RecordSeeds};
use crate::error::{Error, Result};
use crate::header::{Layout, Tags, DISCRIMINATOR_LEN};

/// Maximum chunk size sent in a single `write_buffer` instruction.
///
/// Leaves room in the transaction for compute budget instructions.  To use
/// smaller chunks call [`ChunkIter::chunk_size`].
pub const CHUNK_SIZE: NonZeroU16 = match NonZeroU16::new(900) {
    Some(value) => value,
    None => unreachable!(),
};


/// Decoded instruction of the metadata program.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MetadataInstruction {
    Initialize { seed: String, tags: Tags, signer_seeded: bool },
    CreateBuffer { seed: String, tags: Tags },
    WriteBuffer { data: Vec<u8> },
    Resize { len: u16 },
    SetBuffer,
    CloseBuffer,
    SetAuthority { new_authority: Pubkey },
    CloseRecord(Layout),
}

type Disc = [u8; DISCRIMINATOR_LEN];

const INITIALIZE: Disc = [175, 175, 109, 31, 13, 152, 155, 237];
const INITIALIZE_WITH_SIGNER_SEED: Disc = [55, 45, 87, 223, 169, 179, 103, 71];
const CREATE_BUFFER: Disc = [175, 76, 101, 74, 224, 249, 104, 170];
const WRITE_BUFFER: Disc = [164, 194, 69, 154, 75, 169, 228, 85];
const RESIZE: Disc = [74, 27, 74, 155, 56, 134, 175, 125];
const SET_BUFFER: Disc = [13, 212, 241, 0, 78, 93, 17, 51];
const CLOSE_BUFFER: Disc = [46, 114, 179, 58, 57, 45, 194, 172];
const SET_AUTHORITY: Disc = [133, 250, 37, 21, 110, 163, 26, 121];
const CLOSE_METADATA_ACCOUNT_1: Disc = [214, 59, 103, 132, 141, 70, 199, 195];
const CLOSE_METADATA_ACCOUNT_2: Disc = [121, 166, 201, 151, 202, 148, 168, 175];
const CLOSE_METADATA_ACCOUNT_3: Disc = [45, 239, 223, 90, 12, 191, 163, 140];

impl MetadataInstruction {
    /// Serialises the instruction data.
    pub fn encode(&self) -> Vec<u8> {
        let string = |value: &[u8]| {
            [&(value.len() as u32).to_le_bytes()[..], value].concat()
        };
        match self {
            Self::Initialize { seed, tags, signer_seeded } => {
                let disc = if *signer_seeded {
                    INITIALIZE_WITH_SIGNER_SEED
                } else {
                    INITIALIZE
                };
                let seed = string(seed.as_bytes());
                [&disc[..], &seed, &tags.to_bytes()].concat()
            }
            Self::CreateBuffer { seed, tags } => {
                let seed = string(seed.as_bytes());
                [&CREATE_BUFFER[..], &seed, &tags.to_bytes()].concat()
            }
            Self::WriteBuffer { data } => {
                [&WRITE_BUFFER[..], &string(data)].concat()
            }
            Self::Resize { len } => {
                [&RESIZE[..], &len.to_le_bytes()[..]].concat()
            }
            Self::SetBuffer => SET_BUFFER.to_vec(),
            Self::CloseBuffer => CLOSE_BUFFER.to_vec(),
            Self::SetAuthority { new_authority } => {
                [&SET_AUTHORITY[..], new_authority.as_ref()].concat()
            }
            Self::CloseRecord(layout) => match layout {
                Layout::RecordV1 => CLOSE_METADATA_ACCOUNT_1,
                Layout::RecordV2 => CLOSE_METADATA_ACCOUNT_2,
                _ => CLOSE_METADATA_ACCOUNT_3,
            }
            .to_vec(),
        }
    }

    /// Parses instruction data.
    ///
    /// Trailing bytes after the arguments are rejected.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut rest = data;
        let disc: Disc = take(&mut rest, DISCRIMINATOR_LEN)?
            .try_into()
            .map_err(|_| bad_data())?;
        let seed_and_tags = |rest: &mut &[u8]| -> Result<(String, Tags)> {
            let seed = take_vec(rest)?;
            let seed = String::from_utf8(seed.to_vec()).map_err(|_| bad_data())?;
            let tags = take(rest, 4)?.try_into().map_err(|_| bad_data())?;
            Ok((seed, Tags::from_bytes(tags)?))
        };
        let ix = match disc {
            INITIALIZE | INITIALIZE_WITH_SIGNER_SEED => {
                let (seed, tags) = seed_and_tags(&mut rest)?;
                let signer_seeded = disc == INITIALIZE_WITH_SIGNER_SEED;
                Self::Initialize { seed, tags, signer_seeded }
            }
            CREATE_BUFFER => {
                let (seed, tags) = seed_and_tags(&mut rest)?;
                Self::CreateBuffer { seed, tags }
            }
            WRITE_BUFFER => Self::WriteBuffer { data: take_vec(&mut rest)?.to_vec() },
            RESIZE => {
                let len = take(&mut rest, 2)?;
                Self::Resize { len: u16::from_le_bytes([len[0], len[1]]) }
            }
            SET_BUFFER => Self::SetBuffer,
            CLOSE_BUFFER => Self::CloseBuffer,
            SET_AUTHORITY => {
                let key = take(&mut rest, 32)?;
                let new_authority =
                    Pubkey::try_from(key).map_err(|_| bad_data())?;
                Self::SetAuthority { new_authority }
            }
            CLOSE_METADATA_ACCOUNT_1 => Self::CloseRecord(Layout::RecordV1),
            CLOSE_METADATA_ACCOUNT_2 => Self::CloseRecord(Layout::RecordV2),
            CLOSE_METADATA_ACCOUNT_3 => Self::CloseRecord(Layout::Record),
            _ => {
                return Err(Error::validation(format!(
                    "unknown instruction {disc:?}"
                )))
            }
        };
        if rest.is_empty() {
            Ok(ix)
        } else {
            Err(bad_data())
        }
    }

    /// Short name of the instruction for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Initialize { signer_seeded: false, .. } => "initialize",
            Self::Initialize { signer_seeded: true, .. } => {
                "initialize_with_signer_seed"
            }
            Self::CreateBuffer { .. } => "create_buffer",
            Self::WriteBuffer { .. } => "write_buffer",
            Self::Resize { .. } => "resize",
            Self::SetBuffer => "set_buffer",
            Self::CloseBuffer => "close_buffer",
            Self::SetAuthority { .. } => "set_authority",
            Self::CloseRecord(_) => "close_metadata_account",
        }
    }
}

fn bad_data() -> Error {
    Error::validation("malformed instruction data")
}

fn take<'a>(data: &mut &'a [u8], len: usize) -> Result<&'a [u8]> {
    if data.len() < len {
        return Err(bad_data());
    }
    let (head, tail) = data.split_at(len);
    *data = tail;
    Ok(head)
}

fn take_vec<'a>(data: &mut &'a [u8]) -> Result<&'a [u8]> {
    let len = take(data, 4)?;
    let len = u32::from_le_bytes([len[0], len[1], len[2], len[3]]);
    take(data, len as usize)
}


/// Generates instruction initialising a record with given seeds.
///
/// For records seeded with a signer, `signer` must be that signer since the
/// program derives the address from the signing account.
pub fn initialize(
    metadata_program: &Pubkey,
    seeds: &RecordSeeds,
    record: &Pubkey,
    signer: &Pubkey,
    tags: Tags,
) -> Result<Instruction> {
    if seeds.signer.is_some_and(|key| key != *signer) {
        return Err(Error::validation(
            "record seeded with a signer must be initialised by that signer",
        ));
    }
    let data = MetadataInstruction::Initialize {
        seed: seeds.seed.clone(),
        tags,
        signer_seeded: seeds.signer.is_some(),
    };
    Ok(Instruction {
        program_id: *metadata_program,
        accounts: vec![
            AccountMeta::new(*record, false),
            AccountMeta::new(*signer, true),
            AccountMeta::new_readonly(solana_program::system_program::ID, false),
            AccountMeta::new_readonly(seeds.program_id, false),
            AccountMeta::new_readonly(
                program_data_address(&seeds.program_id),
                false,
            ),
        ],
        data: data.encode(),
    })
}

/// Generates instruction writing the header of a freshly allocated buffer.
pub fn create_buffer(
    metadata_program: &Pubkey,
    buffer: &Pubkey,
    authority: &Pubkey,
    seed: &str,
    tags: Tags,
) -> Instruction {
    let data = MetadataInstruction::CreateBuffer { seed: seed.into(), tags };
    Instruction {
        program_id: *metadata_program,
        accounts: vec![
            AccountMeta::new(*buffer, false),
            AccountMeta::new_readonly(*authority, true),
        ],
        data: data.encode(),
    }
}

/// Generates instruction growing or shrinking a record to `len` bytes.
///
/// Fails if `len` doesn’t fit the instruction’s 16-bit argument.
pub fn resize(
    metadata_program: &Pubkey,
    record: &Pubkey,
    signer: &Pubkey,
    program_id: &Pubkey,
    len: usize,
) -> Result<Instruction> {
    let len = u16::try_from(len).map_err(|_| {
        Error::validation(format!(
            "record size {len} exceeds maximum of {} bytes",
            u16::MAX
        ))
    })?;
    Ok(Instruction {
        program_id: *metadata_program,
        accounts: vec![
            AccountMeta::new(*record, false),
            AccountMeta::new(*signer, true),
            AccountMeta::new_readonly(solana_program::system_program::ID, false),
            AccountMeta::new_readonly(*program_id, false),
        ],
        data: MetadataInstruction::Resize { len }.encode(),
    })
}

/// Generates instruction copying buffer’s header tags and payload into the
/// record.  The record keeps its authority.
pub fn set_buffer(
    metadata_program: &Pubkey,
    buffer: &Pubkey,
    record: &Pubkey,
    authority: &Pubkey,
    program_id: &Pubkey,
) -> Instruction {
    Instruction {
        program_id: *metadata_program,
        accounts: vec![
            AccountMeta::new(*buffer, false),
            AccountMeta::new(*record, false),
            AccountMeta::new_readonly(*authority, true),
            AccountMeta::new_readonly(*program_id, false),
            AccountMeta::new_readonly(program_data_address(program_id), false),
        ],
        data: MetadataInstruction::SetBuffer.encode(),
    }
}

/// Generates instruction closing a buffer and returning its deposit to the
/// authority.
pub fn close_buffer(
    metadata_program: &Pubkey,
    buffer: &Pubkey,
    authority: &Pubkey,
) -> Instruction {
    Instruction {
        program_id: *metadata_program,
        accounts: vec![
            AccountMeta::new(*buffer, false),
            AccountMeta::new(*authority, true),
        ],
        data: MetadataInstruction::CloseBuffer.encode(),
    }
}

/// Generates instruction reassigning record’s authority.
pub fn set_authority(
    metadata_program: &Pubkey,
    record: &Pubkey,
    authority: &Pubkey,
    new_authority: &Pubkey,
) -> Instruction {
    let data = MetadataInstruction::SetAuthority { new_authority: *new_authority };
    Instruction {
        program_id: *metadata_program,
        accounts: vec![
            AccountMeta::new(*record, false),
            AccountMeta::new_readonly(*authority, true),
        ],
        data: data.encode(),
    }
}

/// Generates instruction closing a record of given layout and returning its
/// deposit to the authority.
pub fn close_record(
    metadata_program: &Pubkey,
    layout: Layout,
    record: &Pubkey,
    authority: &Pubkey,
) -> Result<Instruction> {
    if matches!(layout, Layout::Buffer | Layout::IdlAccount) {
        return Err(Error::validation(format!(
            "{layout:?} account is not a metadata record"
        )));
    }
    Ok(Instruction {
        program_id: *metadata_program,
        accounts: vec![
            AccountMeta::new(*record, false),
            AccountMeta::new(*authority, true),
        ],
        data: MetadataInstruction::CloseRecord(layout).encode(),
    })
}


/// A `write_buffer` instruction together with the region of the payload it
/// writes.
#[derive(Clone, Debug, PartialEq)]
pub struct WriteChunk {
    pub offset: usize,
    pub len: usize,
    pub instruction: Instruction,
}

/// Iterator generating `write_buffer` instructions filling a buffer with
/// given payload.
///
/// The program appends each chunk at the buffer’s current payload length so
/// the instructions must be executed in order.
pub struct ChunkIter<'a> {
    metadata_program: &'a Pubkey,
    buffer: Pubkey,
    signer: Pubkey,
    data: &'a [u8],
    position: usize,
    chunk_size: NonZeroU16,
}

impl<'a> ChunkIter<'a> {
    /// Constructs a new iterator writing `data` into `buffer`.
    ///
    /// `signer` is the buffer’s authority.  It signs and pays for each of the
    /// write transactions.
    pub fn new(
        metadata_program: &'a Pubkey,
        buffer: Pubkey,
        signer: Pubkey,
        data: &'a [u8],
    ) -> Self {
        Self {
            metadata_program,
            buffer,
            signer,
            data,
            position: 0,
            chunk_size: CHUNK_SIZE,
        }
    }

    /// Sets maximum chunk size.
    ///
    /// The `chunk_size` argument is clamped between 1 and [`CHUNK_SIZE`].
    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        let chunk_size = chunk_size.min(usize::from(CHUNK_SIZE.get())) as u16;
        self.chunk_size = NonZeroU16::new(chunk_size).unwrap_or(NonZeroU16::MIN);
        self
    }
}

impl Iterator for ChunkIter<'_> {
    type Item = WriteChunk;

    fn next(&mut self) -> Option<Self::Item> {
        let len = self.data.len();
        let start = self.position;
        if start >= len {
            return None;
        }
        let end = start.saturating_add(self.chunk_size.get().into()).min(len);
        self.position = end;
        let data = MetadataInstruction::WriteBuffer {
            data: self.data[start..end].to_vec(),
        };

        Some(WriteChunk {
            offset: start,
            len: end - start,
            instruction: Instruction {
                program_id: *self.metadata_program,
                accounts: vec![
                    AccountMeta::new(self.buffer, false),
                    AccountMeta::new(self.signer, true),
                    AccountMeta::new_readonly(
                        solana_program::system_program::ID,
                        false,
                    ),
                ],
                data: data.encode(),
            },
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.data.len().saturating_sub(self.position);
        let count = left.div_ceil(usize::from(self.chunk_size.get()));
        (count, Some(count))
    }
}
