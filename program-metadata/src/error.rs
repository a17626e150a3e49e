use solana_program::pubkey::Pubkey;

use crate::upload::Stage;

pub type Result<T = (), E = Error> = core::result::Result<T, E>;


/// Step of an operation an error is attributed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, derive_more::Display)]
pub enum Step {
    #[display("deriving address")]
    Derive,
    #[display("initialising record")]
    Initialize,
    #[display("creating buffer")]
    CreateBuffer,
    #[display("writing buffer")]
    WriteBuffer,
    #[display("resizing record")]
    Resize,
    #[display("swapping buffer into record")]
    Swap,
    #[display("closing buffer")]
    CloseBuffer,
    #[display("downloading record")]
    Fetch,
    #[display("setting authority")]
    SetAuthority,
    #[display("closing record")]
    CloseRecord,
    #[display("listing accounts")]
    List,
}


/// Errors reported by all operations of the library.
///
/// Structural errors (`Validation`, `InvalidPlan`, `Derivation`,
/// `MalformedHeader`, `Decompression`) are never retried.  `Transient` errors
/// are retried by [`crate::RetryPolicy`] and turn into `RetriesExhausted`
/// once the attempts run out.  `Context` wraps any of the above with the
/// step and the account address the failure happened at and `Aborted`
/// records how far a failed upload got; use [`Error::root`] to look through
/// both.
#[derive(Debug, derive_more::Display, derive_more::From)]
pub enum Error {
    #[display("invalid input: {_0}")]
    #[from(ignore)]
    Validation(String),

    /// A resize plan was requested with a zero step.  This is a bug in the
    /// caller rather than bad input.
    #[display("invalid resize plan: {_0}")]
    #[from(ignore)]
    InvalidPlan(String),

    #[display("account does not exist")]
    NotFound,

    #[display("cannot derive address from seed {seed:?}")]
    #[from(ignore)]
    Derivation { seed: String },

    #[display("malformed account header: {_0}")]
    #[from(ignore)]
    MalformedHeader(String),

    #[display("corrupt payload: {_0}")]
    Decompression(std::io::Error),

    #[display("not authorized: {_0}")]
    #[from(ignore)]
    NotAuthorized(String),

    #[display("transient failure: {_0}")]
    #[from(ignore)]
    Transient(String),

    #[display("giving up after {attempts} attempts: {last}")]
    #[from(ignore)]
    RetriesExhausted { attempts: u32, last: String },

    #[display("{_0}")]
    #[from(ignore)]
    Network(String),

    #[display("failed to fetch {url}: {reason}")]
    #[from(ignore)]
    IndirectFetch { url: String, reason: String },

    #[display("signing failed: {_0}")]
    Signer(solana_sdk::signer::SignerError),

    #[display("{source} while {step} at {address}")]
    #[from(ignore)]
    Context { step: Step, address: Pubkey, source: Box<Error> },

    /// An upload failed after reaching `reached` and moved to
    /// [`Stage::Aborted`].  Commits confirmed up to that stage stay in
    /// place.
    #[display("upload aborted after stage {reached}: {source}")]
    #[from(ignore)]
    Aborted { reached: Stage, source: Box<Error> },
}

impl Error {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedHeader(msg.into())
    }

    /// Returns the underlying error, looking through any `Context` and
    /// `Aborted` wrappers.
    pub fn root(&self) -> &Error {
        match self {
            Self::Context { source, .. } | Self::Aborted { source, .. } => {
                source.root()
            }
            err => err,
        }
    }

    /// Last stage a failed upload reached before aborting.
    pub fn reached(&self) -> Option<Stage> {
        match self {
            Self::Aborted { reached, .. } => Some(*reached),
            _ => None,
        }
    }

    /// Whether the failure may go away if the unit of work is resubmitted.
    pub fn is_transient(&self) -> bool {
        matches!(self.root(), Self::Transient(_))
    }

    /// Whether the program rejected the signer as not permitted to mutate
    /// the account.
    pub fn is_not_authorized(&self) -> bool {
        matches!(self.root(), Self::NotAuthorized(_))
    }

    /// Attributes the error to given step and account.
    ///
    /// An error which already carries context is returned unchanged so the
    /// innermost (most specific) attribution wins.  So is an aborted upload.
    pub fn at(self, step: Step, address: &Pubkey) -> Self {
        match self {
            err @ (Self::Context { .. } | Self::Aborted { .. }) => err,
            err => Self::Context { step, address: *address, source: err.into() },
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Decompression(err) => Some(err),
            Self::Signer(err) => Some(err),
            Self::Context { source, .. } | Self::Aborted { source, .. } => {
                Some(source.as_ref())
            }
            _ => None,
        }
    }
}


/// Extension for attaching [`Step`] context to results.
pub(crate) trait ResultExt<T> {
    fn at(self, step: Step, address: &Pubkey) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn at(self, step: Step, address: &Pubkey) -> Result<T> {
        self.map_err(|err| err.at(step, address))
    }
}


#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_context_display() {
        let address = Pubkey::new_unique();
        let err = Error::malformed("too short").at(Step::Fetch, &address);
        assert_eq!(
            format!(
                "malformed account header: too short while downloading \
                 record at {address}"
            ),
            err.to_string()
        );
        assert!(matches!(err.root(), Error::MalformedHeader(_)));
    }

    #[test]
    fn test_innermost_context_wins() {
        let inner = Pubkey::new_unique();
        let outer = Pubkey::new_unique();
        let err = Error::Transient("timeout".into())
            .at(Step::WriteBuffer, &inner)
            .at(Step::Swap, &outer);
        match err {
            Error::Context { step, address, .. } => {
                assert_eq!((Step::WriteBuffer, inner), (step, address));
            }
            err => panic!("unexpected error: {err:?}"),
        }
    }

    #[test]
    fn test_classification() {
        let key = Pubkey::new_unique();
        assert!(Error::Transient("x".into()).at(Step::Resize, &key).is_transient());
        assert!(!Error::Network("x".into()).is_transient());
        assert!(Error::NotAuthorized("x".into())
            .at(Step::Swap, &key)
            .is_not_authorized());
        assert!(!Error::validation("x").is_not_authorized());
    }

    #[test]
    fn test_aborted() {
        let key = Pubkey::new_unique();
        let err = Error::Aborted {
            reached: Stage::BufferWritten,
            source: Error::Transient("x".into()).at(Step::Swap, &key).into(),
        };
        assert_eq!(Some(Stage::BufferWritten), err.reached());
        assert!(err.is_transient());
        assert_eq!(None, err.root().reached());
        let err = err.at(Step::Fetch, &key);
        assert_eq!(Some(Stage::BufferWritten), err.reached());
        assert_eq!(
            format!(
                "upload aborted after stage buffer written: transient failure: \
                 x while swapping buffer into record at {key}"
            ),
            err.to_string()
        );
    }
}
