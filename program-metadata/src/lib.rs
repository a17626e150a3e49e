// solana-program-metadata — client library for storing IDLs and program
//                           metadata in Solana accounts
// © 2025 by solana-program-metadata developers
//
// This program is free software; you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation; either version 2 of the License, or (at your option) any later
// version.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE.  See the GNU General Public License for more
// details.
//
// You should have received a copy of the GNU General Public License along with
// this program; if not, see <https://www.gnu.org/licenses/>.

//! Client library for the program metadata program.
//!
//! The metadata program stores arbitrary documents, most notably program
//! IDLs and security metadata, in accounts whose addresses are derived from
//! the described program’s id and a seed such as `idl` or `metadata`.
//!
//! Solana limits transaction size to at most 1232 bytes and accounts may grow
//! by at most 10 KiB per instruction.  Documents are therefore never written
//! into a record directly.  Instead, [`upload()`] compresses the document,
//! stages it in a fresh buffer account written in chunks, grows the record
//! in bounded steps and finally swaps the buffer into the record and closes
//! the buffer.  [`reader::fetch`] reverses the process, following URL and
//! account indirection where the record uses it.
//!
//! All operations take an explicit [`ClientContext`] holding the [`Network`]
//! to talk to, the signer and the fee and retry policies.
//!
//! ## Feature flags
#![doc = document_features::document_features!()]

pub mod address;
pub mod buffer;
mod commit;
pub mod compression;
mod context;
mod error;
pub mod header;
pub mod instruction;
pub mod manage;
pub mod metadata;
mod network;
pub mod reader;
pub mod resize;
mod retry;
#[cfg(feature = "rpc")]
mod rpc;
pub mod upload;

pub use address::{RecordSeeds, METADATA_PROGRAM_ID};
pub use commit::ExportedTransaction;
pub use context::{ClientContext, FeePolicy};
pub use error::{Error, Result, Step};
pub use header::{
    Compression, ContentKind, DataSource, Encoding, Format, Header, Layout, Tags,
};
pub use metadata::ProgramMetadata;
#[cfg(feature = "http")]
pub use network::HttpFetcher;
pub use network::{Network, UrlFetcher};
pub use retry::RetryPolicy;
pub use upload::{upload, upload_url, Outcome, Stage, Upload};
