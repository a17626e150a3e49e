//! Uploading records.
//!
//! An upload goes through the following stages:
//!
//! 1. the record address is derived from its seeds,
//! 2. the record is initialised unless it already exists,
//! 3. a buffer is created and filled with the compressed payload,
//! 4. the record is resized to the size of the buffer,
//! 5. the buffer is swapped into the record,
//! 6. the buffer is closed.
//!
//! Steps 4 to 6 are packed into as few commits as fit in a transaction; when
//! everything fits they happen atomically.  In export mode the commit
//! performing steps 4 and 5 (and 2 if the record doesn’t exist yet) is
//! returned unsigned instead of being submitted.
//!
//! A failed upload moves to [`Stage::Aborted`] and returns
//! [`Error::Aborted`] naming the last stage it reached.  Already confirmed
//! commits stay in place.  In particular it may leave an orphaned buffer
//! behind; see [`crate::buffer::list`] and [`crate::buffer::close`].

use core::str::FromStr;

use solana_sdk::instruction::Instruction;
use solana_sdk::packet::PACKET_DATA_SIZE;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;

use crate::address::RecordSeeds;
use crate::buffer;
use crate::commit::{fee_instructions, pack, submit, ExportedTransaction};
use crate::compression::encode_payload;
use crate::context::ClientContext;
use crate::error::{Error, Result, ResultExt, Step};
use crate::header::{ContentKind, DataSource, Header, Layout, Tags, HEADER_SIZE};
use crate::instruction::{self, MetadataInstruction};
use crate::network::UrlFetcher;
use crate::reader::{fetch_header, fetch_record, fetch_url};
use crate::resize::{plan_resize, MAX_RESIZE_STEP};

/// Stage an upload has reached.
#[derive(Clone, Copy, Debug, PartialEq, Eq, derive_more::Display)]
pub enum Stage {
    #[display("start")]
    Start,
    #[display("derived")]
    Derived,
    #[display("initialized")]
    Initialized,
    #[display("buffer created")]
    BufferCreated,
    #[display("buffer written")]
    BufferWritten,
    #[display("resized")]
    Resized,
    #[display("swapped")]
    Swapped,
    #[display("buffer closed")]
    BufferClosed,
    #[display("aborted")]
    Aborted,
}


/// Description of what to upload where.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Upload {
    /// Program the record describes.
    pub program_id: Pubkey,
    /// Kind of the record; also the seed of its address.
    pub kind: ContentKind,
    pub tags: Tags,
    /// Whether to derive the record address with the authority as extra
    /// seed.  Such records may be created by anyone, not only by the
    /// program’s upgrade authority.
    pub signer_seeded: bool,
    /// If set, the final commit is exported for this authority to sign
    /// rather than submitted.
    pub export: Option<Pubkey>,
}

impl Upload {
    pub fn new(program_id: Pubkey, kind: ContentKind, tags: Tags) -> Self {
        Self { program_id, kind, tags, signer_seeded: false, export: None }
    }

    /// Authority of the record: the export authority if exporting, the
    /// context’s signer otherwise.
    pub fn authority(&self, ctx: &ClientContext) -> Pubkey {
        self.export.unwrap_or_else(|| ctx.payer())
    }

    pub fn seeds(&self, ctx: &ClientContext) -> RecordSeeds {
        let seed = self.kind.as_str();
        if self.signer_seeded {
            RecordSeeds::with_signer(self.program_id, seed, self.authority(ctx))
        } else {
            RecordSeeds::canonical(self.program_id, seed)
        }
    }
}


/// Result of a successful upload.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    /// The record was updated and the buffer closed.
    Committed {
        address: Pubkey,
        /// Signature of the last commit; `None` if on a retry the last
        /// commit turned out to have landed already.
        signature: Option<Signature>,
    },
    /// The buffer was staged and the commit swapping it into the record is
    /// waiting to be signed by the authority.
    Exported(ExportedTransaction),
}

impl Outcome {
    pub fn address(&self) -> &Pubkey {
        match self {
            Self::Committed { address, .. } => address,
            Self::Exported(export) => &export.address,
        }
    }
}


/// Uploads `content` as the record described by `req`.
///
/// `content` is checked against the declared format (for direct records)
/// and compressed according to the declared compression before anything is
/// submitted.  Any failure is reported as [`Error::Aborted`] carrying the
/// last stage reached; [`Error::root`] gives the cause.
pub fn upload(ctx: &ClientContext, req: &Upload, content: &[u8]) -> Result<Outcome> {
    let mut stage = Stage::Start;
    run(ctx, req, content, &mut stage).map_err(|err| {
        tracing::warn!("{stage} → {}: {err}", Stage::Aborted);
        Error::Aborted { reached: stage, source: err.into() }
    })
}

fn run(
    ctx: &ClientContext,
    req: &Upload,
    content: &[u8],
    stage: &mut Stage,
) -> Result<Outcome> {
    check_content(&req.tags, content)?;
    let stored = encode_payload(content, req.tags.compression)?;
    let target = HEADER_SIZE + stored.len();
    let authority = req.authority(ctx);
    let seeds = req.seeds(ctx);
    let program = ctx.metadata_program;

    let (address, _) =
        seeds.derive(&program).at(Step::Derive, &req.program_id)?;
    advance(stage, Stage::Derived, &address);
    tracing::info!(
        "uploading {} bytes ({} stored) of {} for {} to {address}",
        content.len(),
        stored.len(),
        req.kind,
        req.program_id,
    );

    let existing = fetch_header(ctx.network, &address).at(Step::Initialize, &address)?;
    if let Some((header, _)) = &existing {
        check_authority(header, &authority, req.signer_seeded)
            .at(Step::Initialize, &address)?;
    }
    let current = existing
        .as_ref()
        .map_or(HEADER_SIZE, |(_, account)| account.data.len());
    let steps = plan_resize(current, target, MAX_RESIZE_STEP)?;
    if !steps.is_empty() && target > usize::from(u16::MAX) {
        return Err(Error::validation(format!(
            "stored payload of {} bytes exceeds record capacity of {} bytes",
            stored.len(),
            usize::from(u16::MAX) - HEADER_SIZE
        )));
    }

    let mut tail = Vec::with_capacity(steps.len() + 3);
    if existing.is_none() {
        let init =
            instruction::initialize(&program, &seeds, &address, &authority, req.tags)?;
        if req.export.is_some() {
            tail.push(init);
        } else {
            submit_initialize(ctx, &address, init)?;
        }
    } else {
        tracing::debug!("{address}: record exists ({current} bytes)");
    }
    advance(stage, Stage::Initialized, &address);

    let buffer = buffer::create(ctx, req.kind.as_str(), req.tags, stored.len())?;
    advance(stage, Stage::BufferCreated, &buffer);
    buffer::write(ctx, &buffer, &stored)?;
    advance(stage, Stage::BufferWritten, &buffer);

    for &size in &steps {
        tracing::debug!("{address}: resize to {size} bytes");
        tail.push(instruction::resize(
            &program,
            &address,
            &authority,
            &req.program_id,
            size,
        )?);
    }
    tail.push(instruction::set_buffer(
        &program,
        &buffer,
        &address,
        &authority,
        &req.program_id,
    ));

    if req.export.is_some() {
        let instructions = [fee_instructions(&ctx.fees), tail].concat();
        let export =
            ExportedTransaction::new(address, buffer, &authority, &instructions);
        let size = export.transaction_size();
        if size > PACKET_DATA_SIZE {
            tracing::warn!(
                "exported transaction is {size} bytes; exceeds packet size of \
                 {PACKET_DATA_SIZE} bytes"
            );
        }
        tracing::info!(
            "{address}: exported swap of buffer {buffer} for {authority}"
        );
        return Ok(Outcome::Exported(export));
    }

    if steps.is_empty() {
        advance(stage, Stage::Resized, &address);
    }
    tail.push(instruction::close_buffer(&program, &buffer, &authority));
    let commits = pack(&ctx.fees, &ctx.payer(), tail)?;
    let mut signature = None;
    for commit in &commits {
        let effects = effects(&program, commit);
        let Some(last) = effects.last() else { continue };
        let (what, step, at) = match last {
            MetadataInstruction::Resize { .. } => ("resize record", Step::Resize, address),
            MetadataInstruction::SetBuffer => ("swap buffer", Step::Swap, address),
            _ => ("swap buffer and close", Step::CloseBuffer, buffer),
        };
        let sig = submit(ctx, what, commit, &[], || {
            applied(ctx, last, &address, &buffer, &stored, &req.tags)
        })
        .at(step, &at)?;
        signature = sig.or(signature);
        for effect in &effects {
            match effect {
                MetadataInstruction::Resize { len } if usize::from(*len) == target => {
                    advance(stage, Stage::Resized, &address)
                }
                MetadataInstruction::SetBuffer => {
                    advance(stage, Stage::Swapped, &address)
                }
                MetadataInstruction::CloseBuffer => {
                    advance(stage, Stage::BufferClosed, &buffer)
                }
                _ => (),
            }
        }
    }
    Ok(Outcome::Committed { address, signature })
}

/// Uploads a record pointing at `url`.
///
/// The document at the URL is fetched and checked against the declared
/// format first.  The record’s data source is set to `url`.
pub fn upload_url(
    ctx: &ClientContext,
    req: &Upload,
    url: &str,
    fetcher: Option<&dyn UrlFetcher>,
) -> Result<Outcome> {
    fetch_url(fetcher, url, req.tags.format)?;
    let tags = Tags { source: DataSource::Url, ..req.tags };
    upload(ctx, &Upload { tags, ..req.clone() }, url.as_bytes())
}

/// Initialises the record with given seeds unless it exists already.
///
/// Returns `None` if the record exists.  The context’s signer becomes the
/// record’s authority; for canonical records it must be the program’s
/// upgrade authority.
pub fn initialize(
    ctx: &ClientContext,
    seeds: &RecordSeeds,
    tags: Tags,
) -> Result<Option<Signature>> {
    let (address, _) =
        seeds.derive(&ctx.metadata_program).at(Step::Derive, &seeds.program_id)?;
    if ctx.network.get_account(&address).at(Step::Initialize, &address)?.is_some() {
        tracing::info!("{address}: record already initialised");
        return Ok(None);
    }
    let init = instruction::initialize(
        &ctx.metadata_program,
        seeds,
        &address,
        &ctx.payer(),
        tags,
    )?;
    submit_initialize(ctx, &address, init)
}

fn submit_initialize(
    ctx: &ClientContext,
    address: &Pubkey,
    init: Instruction,
) -> Result<Option<Signature>> {
    let instructions = [fee_instructions(&ctx.fees), vec![init]].concat();
    submit(ctx, "initialize record", &instructions, &[], || {
        Ok(ctx.network.get_account(address)?.is_some())
    })
    .at(Step::Initialize, address)
}


/// Checks that `content` is acceptable for given tags.
fn check_content(tags: &Tags, content: &[u8]) -> Result {
    let text = || {
        core::str::from_utf8(content).map(str::trim).map_err(|_| {
            Error::validation(format!("{} payload is not UTF-8", tags.source))
        })
    };
    match tags.source {
        DataSource::Direct => tags.format.validate(content).map_err(|reason| {
            Error::validation(format!("content is not valid {}: {reason}", tags.format))
        }),
        DataSource::Url => {
            let url = text()?;
            if url.starts_with("https://") || url.starts_with("http://") {
                Ok(())
            } else {
                Err(Error::validation(format!("{url:?} is not an HTTP URL")))
            }
        }
        DataSource::Account => Pubkey::from_str(text()?).map(|_| ()).map_err(|err| {
            Error::validation(format!("payload is not an account address: {err}"))
        }),
    }
}

/// Checks that `authority` may update an existing record.
///
/// The check is advisory.  The program enforces authority on every mutating
/// instruction.  For signer-seeded records a mismatch is only logged.
fn check_authority(header: &Header, authority: &Pubkey, signer_seeded: bool) -> Result {
    if header.layout != Layout::Record {
        return Err(Error::validation(format!(
            "record uses legacy {:?} layout; close it before uploading",
            header.layout
        )));
    }
    if header.authority == *authority {
        return Ok(());
    }
    let msg = format!("record authority is {}, not {authority}", header.authority);
    if signer_seeded {
        tracing::warn!("{msg}; proceeding anyway");
        Ok(())
    } else {
        Err(Error::NotAuthorized(msg))
    }
}

/// Decodes metadata program instructions of a commit.
fn effects(program: &Pubkey, commit: &[Instruction]) -> Vec<MetadataInstruction> {
    commit
        .iter()
        .filter(|ix| ix.program_id == *program)
        .filter_map(|ix| MetadataInstruction::decode(&ix.data).ok())
        .collect()
}

/// Checks whether a commit whose last effect is `last` has been applied.
fn applied(
    ctx: &ClientContext,
    last: &MetadataInstruction,
    address: &Pubkey,
    buffer: &Pubkey,
    stored: &[u8],
    tags: &Tags,
) -> Result<bool> {
    match last {
        MetadataInstruction::Resize { len } => {
            let account = ctx.network.get_account(address)?;
            Ok(account.is_some_and(|account| account.data.len() == usize::from(*len)))
        }
        MetadataInstruction::SetBuffer => {
            let record = fetch_record(ctx.network, address)?;
            Ok(record.is_some_and(|record| {
                record.stored == stored && record.header.tags == *tags
            }))
        }
        _ => Ok(ctx.network.get_account(buffer)?.is_none()),
    }
}

fn advance(stage: &mut Stage, next: Stage, address: &Pubkey) {
    tracing::info!("{stage} → {next} ({address})");
    *stage = next;
}


#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::header::Format;

    fn header(authority: Pubkey, layout: Layout) -> Header {
        Header {
            layout,
            authority,
            kind: ContentKind::Idl,
            program_id: Pubkey::new_unique(),
            data_len: 0,
            tags: Tags::json(),
        }
    }

    #[test]
    fn test_check_content() {
        let json = Tags::json();
        check_content(&json, br#"{"address":"X"}"#).unwrap();
        assert!(check_content(&json, b"{").is_err());

        let url = Tags::url(Format::Json);
        check_content(&url, b"https://example.com/idl.json").unwrap();
        assert!(check_content(&url, b"ftp://example.com/idl.json").is_err());

        let account = Tags { source: DataSource::Account, ..Tags::default() };
        let key = Pubkey::new_unique().to_string();
        check_content(&account, key.as_bytes()).unwrap();
        assert!(check_content(&account, b"not a key").is_err());
    }

    #[test]
    fn test_check_authority() {
        let authority = Pubkey::new_unique();
        let other = Pubkey::new_unique();
        check_authority(&header(authority, Layout::Record), &authority, false).unwrap();

        let err = check_authority(&header(other, Layout::Record), &authority, false)
            .unwrap_err();
        assert!(err.is_not_authorized(), "{err:?}");
        check_authority(&header(other, Layout::Record), &authority, true).unwrap();

        let err = check_authority(&header(authority, Layout::RecordV2), &authority, false)
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)), "{err:?}");
    }

    #[test]
    fn test_effects() {
        let program = Pubkey::new_unique();
        let key = Pubkey::new_unique();
        let commit = [
            solana_sdk::compute_budget::ComputeBudgetInstruction::set_compute_unit_price(5),
            instruction::resize(&program, &key, &key, &key, 200).unwrap(),
            instruction::set_buffer(&program, &key, &key, &key, &key),
        ];
        assert_eq!(
            vec![MetadataInstruction::Resize { len: 200 }, MetadataInstruction::SetBuffer],
            effects(&program, &commit)
        );
    }
}
