//! Short identifier allocation.

use ring::rand::{SecureRandom, SystemRandom};
use thiserror::Error;

use crate::storage::Catalog;

pub const ID_ALPHABET: &[u8; 36] = b"abcdefghijklmnopqrstuvwxyz0123456789";
pub const ID_LEN: usize = 6;

/// Give up after this many collisions in a row.
pub const MAX_ALLOCATION_ATTEMPTS: usize = 64;

// Largest multiple of the alphabet size that fits in a byte. Bytes at or
// above it are discarded so every symbol is equally likely.
const REJECTION_BOUND: u8 = (256 / ID_ALPHABET.len() * ID_ALPHABET.len()) as u8;

#[derive(Debug, Error)]
pub enum AllocError {
    #[error("No free identifier after {0} attempts")]
    Exhausted(usize),
    #[error("System random source failed")]
    Random,
}

/// Draw one random identifier from the OS random source.
pub fn random_id() -> Result<String, AllocError> {
    let rng = SystemRandom::new();
    let mut id = String::with_capacity(ID_LEN);
    let mut buf = [0u8; 16];

    while id.len() < ID_LEN {
        rng.fill(&mut buf).map_err(|_| AllocError::Random)?;
        for &b in buf.iter().filter(|&&b| b < REJECTION_BOUND) {
            if id.len() == ID_LEN {
                break;
            }
            id.push(ID_ALPHABET[b as usize % ID_ALPHABET.len()] as char);
        }
    }

    Ok(id)
}

/// Allocate an identifier not present in `catalog.objects`.
///
/// Only inspects the snapshot; inserting is the caller's job.
pub fn allocate(catalog: &Catalog) -> Result<String, AllocError> {
    allocate_with(catalog, random_id)
}

/// Like [`allocate`] but with a caller-provided draw.
pub fn allocate_with<F>(catalog: &Catalog, mut draw: F) -> Result<String, AllocError>
where
    F: FnMut() -> Result<String, AllocError>,
{
    for attempt in 1..=MAX_ALLOCATION_ATTEMPTS {
        let id = draw()?;
        if !catalog.objects.contains_key(&id) {
            return Ok(id);
        }
        tracing::debug!(%id, attempt, "Identifier collision, retrying");
    }
    Err(AllocError::Exhausted(MAX_ALLOCATION_ATTEMPTS))
}
