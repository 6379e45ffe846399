use sha2::{Digest as ShaDigest, Sha512};

pub type Digest = [u8; 64];

/// Types with a stable digest identity. For messages the digest covers
/// (sender, round, value) only, so every copy of the same instance hashes
/// identically no matter how many hops it has traversed.
pub trait Hashable {
    fn hash(&self) -> Digest;
}

/// Length-prefixed Sha512 over a sequence of byte fields. The prefixes keep
/// adjacent variable-length fields from colliding ("ab" + "c" vs "a" + "bc").
pub fn digest_fields<'a>(fields: impl IntoIterator<Item = &'a [u8]>) -> Digest {
    let mut hasher = Sha512::new();
    for field in fields {
        hasher.update((field.len() as u64).to_be_bytes());
        hasher.update(field);
    }
    let result = hasher.finalize();
    let mut digest = [0u8; 64];
    digest.copy_from_slice(&result[..]);
    digest
}
