//! Layout of metadata record and buffer accounts.
//!
//! Every account starts with an 8-byte discriminator identifying its layout,
//! followed by a fixed-size header and the (usually compressed) payload.  The
//! current layout, shared by records and buffers, is:
//!
//! ```text
//! discriminator   8
//! authority      32
//! content tag    16  ASCII, NUL-padded
//! program id     32
//! payload length  4  little-endian
//! encoding        1
//! compression     1
//! format          1
//! data source     1
//! payload         …
//! ```
//!
//! Older versions of the program stored the content tag as a free-form
//! string (e.g. `idl.json` or `meta.url`) and had no classification bytes.
//! Such accounts are still decoded, with the classification inferred from
//! the tag.

use core::fmt;
use core::str::FromStr;

use solana_program::pubkey::Pubkey;

use crate::error::{Error, Result};

/// Length of the account discriminator.
pub const DISCRIMINATOR_LEN: usize = 8;

/// Maximum length of a content tag.
pub const TAG_LEN: usize = 16;

/// Size of the header of current record and buffer accounts.
pub const HEADER_SIZE: usize = DISCRIMINATOR_LEN + 32 + TAG_LEN + 32 + 4 + 4;


macro_rules! tag_enum {
    (
        $(#[$meta:meta])*
        $name:ident ($what:literal) {
            $($variant:ident = $value:literal => $text:literal,)*
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant = $value,)*
        }

        impl $name {
            /// All variants in their on-chain order.
            pub const ALL: &'static [Self] = &[$(Self::$variant,)*];

            /// Decodes the on-chain byte representation.
            pub fn from_u8(byte: u8) -> Option<Self> {
                match byte {
                    $($value => Some(Self::$variant),)*
                    _ => None,
                }
            }

            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)*
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, fmtr: &mut fmt::Formatter) -> fmt::Result {
                fmtr.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(value: &str) -> Result<Self> {
                Self::ALL
                    .iter()
                    .copied()
                    .find(|item| item.as_str().eq_ignore_ascii_case(value))
                    .ok_or_else(|| {
                        Error::validation(format!(
                            concat!("unknown ", $what, ": {}"),
                            value
                        ))
                    })
            }
        }
    };
}

tag_enum! {
    /// How the stored payload text is encoded.
    Encoding("encoding") {
        Utf8 = 0 => "utf8",
        Base58 = 1 => "base58",
        Base64 = 2 => "base64",
    }
}

tag_enum! {
    /// How the stored payload is compressed.
    Compression("compression") {
        None = 0 => "none",
        Gzip = 1 => "gzip",
        Zstd = 2 => "zstd",
    }
}

tag_enum! {
    /// Format of the (decompressed and dereferenced) payload.
    Format("format") {
        Text = 0 => "text",
        Json = 1 => "json",
        Yaml = 2 => "yaml",
        Toml = 3 => "toml",
        Binary = 4 => "binary",
    }
}

tag_enum! {
    /// Where the actual content lives.
    DataSource("data source") {
        Url = 0 => "url",
        Account = 1 => "account",
        Direct = 2 => "direct",
    }
}

impl Format {
    /// Checks that `data` is well-formed for the format.
    ///
    /// This is a container-level check only; the content itself is never
    /// interpreted.  YAML has no structural check beyond being UTF-8.
    pub fn validate(self, data: &[u8]) -> Result<(), String> {
        let text = || core::str::from_utf8(data).map_err(|err| err.to_string());
        match self {
            Self::Binary => Ok(()),
            Self::Text | Self::Yaml => text().map(|_| ()),
            Self::Json => serde_json::from_slice::<serde_json::Value>(data)
                .map(|_| ())
                .map_err(|err| err.to_string()),
            Self::Toml => toml::from_str::<toml::Table>(text()?)
                .map(|_| ())
                .map_err(|err| err.to_string()),
        }
    }
}


/// Classification bytes stored in the header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Tags {
    pub encoding: Encoding,
    pub compression: Compression,
    pub format: Format,
    pub source: DataSource,
}

impl Default for Tags {
    fn default() -> Self {
        Self {
            encoding: Encoding::Utf8,
            compression: Compression::Gzip,
            format: Format::Text,
            source: DataSource::Direct,
        }
    }
}

impl Tags {
    /// Tags of a compressed JSON document stored directly in the record.
    pub fn json() -> Self {
        Self { format: Format::Json, ..Self::default() }
    }

    /// Tags of a record holding a URL of a document in given format.
    pub fn url(format: Format) -> Self {
        Self { format, source: DataSource::Url, ..Self::default() }
    }

    pub(crate) fn to_bytes(self) -> [u8; 4] {
        [
            self.encoding as u8,
            self.compression as u8,
            self.format as u8,
            self.source as u8,
        ]
    }

    pub(crate) fn from_bytes(bytes: &[u8; 4]) -> Result<Self> {
        fn get<T>(value: Option<T>, what: &str, byte: u8) -> Result<T> {
            value.ok_or_else(|| Error::malformed(format!("unknown {what} {byte}")))
        }
        let [enc, comp, form, src] = *bytes;
        Ok(Self {
            encoding: get(Encoding::from_u8(enc), "encoding", enc)?,
            compression: get(Compression::from_u8(comp), "compression", comp)?,
            format: get(Format::from_u8(form), "format", form)?,
            source: get(DataSource::from_u8(src), "data source", src)?,
        })
    }
}


/// Kind of content a record holds; also the seed of its address.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ContentKind {
    Idl,
    Metadata,
    Custom(String),
}

impl ContentKind {
    /// Parses a content tag given by the user.
    ///
    /// The tag must be non-empty printable ASCII of at most [`TAG_LEN`]
    /// bytes.
    pub fn new(tag: &str) -> Result<Self> {
        if tag.is_empty() || tag.len() > TAG_LEN {
            return Err(Error::validation(format!(
                "content tag must be 1 to {TAG_LEN} bytes long; got {}",
                tag.len()
            )));
        }
        if !tag.bytes().all(|byte| byte.is_ascii_graphic()) {
            return Err(Error::validation(format!(
                "content tag {tag:?} must be printable ASCII"
            )));
        }
        Ok(Self::from_stored(tag))
    }

    fn from_stored(tag: &str) -> Self {
        match tag {
            "idl" => Self::Idl,
            "metadata" => Self::Metadata,
            _ => Self::Custom(tag.into()),
        }
    }

    /// Interprets a string tag written by an older program version.
    ///
    /// Those tags look like `idl.json`, `idl.url`, `meta.json` or
    /// `meta.url` and carry the format and data source in the suffix.
    fn from_legacy(tag: &str) -> (Self, Format, DataSource) {
        let (prefix, suffix) = tag.split_once('.').unwrap_or((tag, ""));
        let kind = match prefix {
            "idl" => Self::Idl,
            "meta" | "metadata" => Self::Metadata,
            _ => Self::Custom(tag.into()),
        };
        let (format, source) = match suffix {
            "url" => (Format::Json, DataSource::Url),
            "json" => (Format::Json, DataSource::Direct),
            _ => (Format::Text, DataSource::Direct),
        };
        (kind, format, source)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Idl => "idl",
            Self::Metadata => "metadata",
            Self::Custom(tag) => tag.as_str(),
        }
    }

    fn to_bytes(&self) -> Result<[u8; TAG_LEN]> {
        let tag = self.as_str().as_bytes();
        let mut buf = [0; TAG_LEN];
        buf.get_mut(..tag.len())
            .ok_or_else(|| {
                Error::validation(format!("content tag {self} is too long"))
            })?
            .copy_from_slice(tag);
        Ok(buf)
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, fmtr: &mut fmt::Formatter) -> fmt::Result {
        fmtr.write_str(self.as_str())
    }
}

impl FromStr for ContentKind {
    type Err = Error;

    fn from_str(tag: &str) -> Result<Self> {
        Self::new(tag)
    }
}


/// Layout of a metadata program account, identified by its discriminator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Layout {
    /// Current record (`MetadataAccount3`).
    Record,
    /// Staging buffer (`MetadataBuffer`).
    Buffer,
    /// Record with a string tag and program id (`MetadataAccount2`).
    RecordV2,
    /// Record with a string tag only (`MetadataAccount`).
    RecordV1,
    /// IDL account of the original IDL upload program (`IdlAccount`).
    IdlAccount,
}

impl Layout {
    pub const fn discriminator(self) -> [u8; DISCRIMINATOR_LEN] {
        match self {
            Self::Record => [180, 62, 172, 157, 43, 105, 117, 200],
            Self::Buffer => [123, 121, 190, 46, 245, 204, 102, 54],
            Self::RecordV2 => [217, 197, 213, 23, 62, 14, 230, 192],
            Self::RecordV1 => [32, 224, 226, 224, 77, 64, 109, 234],
            Self::IdlAccount => [140, 36, 166, 2, 103, 197, 33, 164],
        }
    }

    /// Size of the header, including the discriminator.
    pub const fn header_size(self) -> usize {
        match self {
            Self::Record | Self::Buffer => HEADER_SIZE,
            Self::RecordV2 => DISCRIMINATOR_LEN + 32 + TAG_LEN + 32 + 4,
            Self::RecordV1 => DISCRIMINATOR_LEN + 32 + TAG_LEN + 4,
            Self::IdlAccount => DISCRIMINATOR_LEN + 32 + 4,
        }
    }

    pub fn from_discriminator(disc: &[u8; DISCRIMINATOR_LEN]) -> Option<Self> {
        [
            Self::Record,
            Self::Buffer,
            Self::RecordV2,
            Self::RecordV1,
            Self::IdlAccount,
        ]
        .into_iter()
        .find(|layout| layout.discriminator() == *disc)
    }

    pub fn is_legacy(self) -> bool {
        !matches!(self, Self::Record | Self::Buffer)
    }
}


/// Decoded header of a record or buffer account.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Header {
    pub layout: Layout,
    pub authority: Pubkey,
    pub kind: ContentKind,
    /// Program the record describes; default for layouts which don’t store
    /// it and for buffers.
    pub program_id: Pubkey,
    pub data_len: u32,
    pub tags: Tags,
}

impl Header {
    /// Size of the account holding this header and its payload.
    pub fn account_size(&self) -> usize {
        self.layout.header_size() + self.data_len as usize
    }

    /// Serialises the header followed by `payload`.
    ///
    /// `data_len` is taken from the payload.  Only the current layouts can
    /// be encoded.
    pub fn encode(&self, payload: &[u8]) -> Result<Vec<u8>> {
        if self.layout.is_legacy() {
            return Err(Error::validation(format!(
                "cannot encode legacy {:?} layout",
                self.layout
            )));
        }
        let data_len = u32::try_from(payload.len())
            .map_err(|_| Error::validation("payload too large"))?;
        Ok([
            &self.layout.discriminator()[..],
            self.authority.as_ref(),
            &self.kind.to_bytes()?[..],
            self.program_id.as_ref(),
            &data_len.to_le_bytes()[..],
            &self.tags.to_bytes()[..],
            payload,
        ]
        .concat())
    }

    /// Parses raw account data.
    ///
    /// Returns the header and the payload slice
    /// `[header_size, header_size + data_len)`.  Trailing bytes past the
    /// payload are ignored.  Fails with [`Error::MalformedHeader`] if the
    /// discriminator is unknown, the header is truncated or the declared
    /// payload length reaches past the end of the account.
    pub fn decode(data: &[u8]) -> Result<(Self, &[u8])> {
        let mut rest = data;
        let disc = take::<DISCRIMINATOR_LEN>(&mut rest)?;
        let layout = Layout::from_discriminator(disc).ok_or_else(|| {
            Error::malformed(format!("unknown discriminator {disc:?}"))
        })?;

        let authority = Pubkey::from(*take::<32>(&mut rest)?);
        let mut program_id = Pubkey::default();
        let header = match layout {
            Layout::Record | Layout::Buffer => {
                let tag = read_tag(take::<TAG_LEN>(&mut rest)?)?;
                program_id = Pubkey::from(*take::<32>(&mut rest)?);
                let data_len = u32::from_le_bytes(*take::<4>(&mut rest)?);
                let tags = Tags::from_bytes(take::<4>(&mut rest)?)?;
                let kind = ContentKind::from_stored(tag);
                Self { layout, authority, kind, program_id, data_len, tags }
            }
            Layout::RecordV2 | Layout::RecordV1 => {
                let tag = read_tag(take::<TAG_LEN>(&mut rest)?)?;
                if layout == Layout::RecordV2 {
                    program_id = Pubkey::from(*take::<32>(&mut rest)?);
                }
                let data_len = u32::from_le_bytes(*take::<4>(&mut rest)?);
                let (kind, format, source) = ContentKind::from_legacy(tag);
                let tags = Tags { format, source, ..Tags::default() };
                Self { layout, authority, kind, program_id, data_len, tags }
            }
            Layout::IdlAccount => {
                let data_len = u32::from_le_bytes(*take::<4>(&mut rest)?);
                let kind = ContentKind::Idl;
                let tags = Tags::json();
                Self { layout, authority, kind, program_id, data_len, tags }
            }
        };

        let start = layout.header_size();
        let payload = start
            .checked_add(header.data_len as usize)
            .and_then(|end| data.get(start..end))
            .ok_or_else(|| {
                Error::malformed(format!(
                    "declared payload length {} exceeds account size {}",
                    header.data_len,
                    data.len()
                ))
            })?;
        Ok((header, payload))
    }
}

/// Takes first `N` bytes from `data` advancing the slice.
fn take<'a, const N: usize>(data: &mut &'a [u8]) -> Result<&'a [u8; N]> {
    let (head, tail) = data
        .split_first_chunk::<N>()
        .ok_or_else(|| Error::malformed("account data too short"))?;
    *data = tail;
    Ok(head)
}

/// Reads a NUL-padded tag.
///
/// Only trailing padding may be NUL; the tag itself must be non-empty
/// printable ASCII, the same as [`ContentKind::new`] accepts.
fn read_tag(tag: &[u8; TAG_LEN]) -> Result<&str> {
    let end = tag.iter().rposition(|&byte| byte != 0).map_or(0, |pos| pos + 1);
    let tag = &tag[..end];
    if tag.is_empty() {
        return Err(Error::malformed("empty content tag"));
    }
    if !tag.iter().all(u8::is_ascii_graphic) {
        return Err(Error::malformed(format!(
            "content tag \"{}\" is not printable ASCII",
            tag.escape_ascii()
        )));
    }
    core::str::from_utf8(tag).map_err(|_| Error::malformed("bad content tag"))
}
