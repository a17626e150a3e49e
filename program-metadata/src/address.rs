//! Deterministic addresses of metadata records.
//!
//! A record is never referred to by a stored pointer.  Its address is always
//! recomputed as a PDA of the metadata program from the described program’s
//! id, an optional signer and the seed string (which is also the record’s
//! content tag, e.g. `idl` or `metadata`).

use solana_program::pubkey::{Pubkey, MAX_SEED_LEN};

use crate::error::{Error, Result};

/// Address of the deployed metadata program.
pub const METADATA_PROGRAM_ID: Pubkey =
    solana_program::pubkey!("pmetaypqG6SiB47xMigYVMAkuHDWeSDXcv3zzDrJJvA");


/// Seeds identifying a metadata record.
///
/// Two records with the same `seed` but different `signer` are distinct.
/// This lets any signer maintain a ‘personal’ record next to the canonical
/// one (which only the program’s upgrade authority may create).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordSeeds {
    pub program_id: Pubkey,
    pub seed: String,
    pub signer: Option<Pubkey>,
}

impl RecordSeeds {
    /// Seeds of the canonical record of given program.
    pub fn canonical(program_id: Pubkey, seed: impl Into<String>) -> Self {
        Self { program_id, seed: seed.into(), signer: None }
    }

    /// Seeds of a record associated with given signer rather than with the
    /// program’s upgrade authority.
    pub fn with_signer(
        program_id: Pubkey,
        seed: impl Into<String>,
        signer: Pubkey,
    ) -> Self {
        Self { program_id, seed: seed.into(), signer: Some(signer) }
    }

    /// Returns address and bump of the record owned by `metadata_program`.
    pub fn derive(&self, metadata_program: &Pubkey) -> Result<(Pubkey, u8)> {
        derive(
            metadata_program,
            &self.program_id,
            &self.seed,
            self.signer.as_ref(),
        )
    }
}


/// Computes the record address for given seeds.
///
/// Seeds are `[program_id, signer, seed]`, with `signer` omitted for
/// canonical records.  Fails with [`Error::Derivation`] if `seed` is longer
/// than a PDA seed may be or if no bump yields an off-curve address.
pub fn derive(
    metadata_program: &Pubkey,
    program_id: &Pubkey,
    seed: &str,
    signer: Option<&Pubkey>,
) -> Result<(Pubkey, u8)> {
    let derivation_error = || Error::Derivation { seed: seed.into() };
    if seed.len() > MAX_SEED_LEN {
        return Err(derivation_error());
    }
    let found = match signer {
        None => Pubkey::try_find_program_address(
            &[program_id.as_ref(), seed.as_bytes()],
            metadata_program,
        ),
        Some(signer) => Pubkey::try_find_program_address(
            &[program_id.as_ref(), signer.as_ref(), seed.as_bytes()],
            metadata_program,
        ),
    };
    found.ok_or_else(derivation_error)
}

/// Returns the program data account of an upgradeable program.
///
/// The metadata program reads the upgrade authority from it when checking
/// who may initialise a canonical record.
pub fn program_data_address(program_id: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(
        &[program_id.as_ref()],
        &solana_sdk::bpf_loader_upgradeable::ID,
    )
    .0
}


#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_derive_is_deterministic() {
        let program = Pubkey::new_unique();
        let seeds = RecordSeeds::canonical(program, "idl");
        let first = seeds.derive(&METADATA_PROGRAM_ID).unwrap();
        let second = seeds.derive(&METADATA_PROGRAM_ID).unwrap();
        assert_eq!(first, second);

        let want = Pubkey::find_program_address(
            &[program.as_ref(), b"idl"],
            &METADATA_PROGRAM_ID,
        );
        assert_eq!(want, first);
    }

    #[test]
    fn test_signer_seed_is_distinct() {
        let program = Pubkey::new_unique();
        let signer = Pubkey::new_unique();
        let other = Pubkey::new_unique();
        let canonical = RecordSeeds::canonical(program, "metadata")
            .derive(&METADATA_PROGRAM_ID)
            .unwrap();
        let personal = RecordSeeds::with_signer(program, "metadata", signer)
            .derive(&METADATA_PROGRAM_ID)
            .unwrap();
        let foreign = RecordSeeds::with_signer(program, "metadata", other)
            .derive(&METADATA_PROGRAM_ID)
            .unwrap();
        assert_ne!(canonical.0, personal.0);
        assert_ne!(personal.0, foreign.0);
    }

    #[test]
    fn test_different_seeds() {
        let program = Pubkey::new_unique();
        let idl = derive(&METADATA_PROGRAM_ID, &program, "idl", None);
        let meta = derive(&METADATA_PROGRAM_ID, &program, "metadata", None);
        assert_ne!(idl.unwrap().0, meta.unwrap().0);
    }

    #[test]
    fn test_overlong_seed() {
        let program = Pubkey::new_unique();
        let seed = "x".repeat(MAX_SEED_LEN + 1);
        let err = derive(&METADATA_PROGRAM_ID, &program, &seed, None)
            .unwrap_err();
        assert!(matches!(err, Error::Derivation { .. }), "{err:?}");
        derive(&METADATA_PROGRAM_ID, &program, &seed[1..], None).unwrap();
    }
}
