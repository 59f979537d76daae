//! Queue key derivation.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::KeyDerivationError;

/// Key addressing one kernel message queue.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct QueueKey(i32);

impl QueueKey {
    pub const fn from_raw(raw: i32) -> Self {
        Self(raw)
    }

    pub const fn as_raw(self) -> i32 {
        self.0
    }
}

impl fmt::Display for QueueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

/// Derives a [`QueueKey`] from an anchor path and a discriminator.
///
/// Implementations must be deterministic: the same `(path, discriminator)`
/// yields the same key as long as the anchor is unchanged, and distinct
/// discriminators on one path yield distinct keys.
///
/// Closures of the right shape implement this trait, so tests can hand out
/// fixed keys without touching the filesystem:
///
/// ```rust
/// use msgq::{KeyDerivationError, KeyResolver, QueueKey};
/// use std::path::Path;
///
/// let resolver =
///     |_: &Path, id: u8| Ok::<_, KeyDerivationError>(QueueKey::from_raw(0x5100 + i32::from(id)));
/// assert_eq!(resolver.resolve(Path::new("/nowhere"), 2).unwrap(), QueueKey::from_raw(0x5102));
/// ```
pub trait KeyResolver: Send + Sync {
    fn resolve(&self, path: &Path, discriminator: u8) -> Result<QueueKey, KeyDerivationError>;
}

impl<F> KeyResolver for F
where
    F: Fn(&Path, u8) -> Result<QueueKey, KeyDerivationError> + Send + Sync,
{
    fn resolve(&self, path: &Path, discriminator: u8) -> Result<QueueKey, KeyDerivationError> {
        self(path, discriminator)
    }
}

/// Resolver backed by `ftok(3)`.
///
/// The key mixes the anchor's device and inode numbers with the
/// discriminator, so the anchor must exist and stay in place for as long as
/// cooperating processes need to find the queue.
#[cfg(target_os = "linux")]
#[derive(Clone, Copy, Debug, Default)]
pub struct FtokResolver;

#[cfg(target_os = "linux")]
impl KeyResolver for FtokResolver {
    fn resolve(&self, path: &Path, discriminator: u8) -> Result<QueueKey, KeyDerivationError> {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;

        if discriminator == 0 {
            return Err(KeyDerivationError::ZeroDiscriminator);
        }

        // ftok reports ENOENT/EACCES itself, but stat first so the error
        // carries the offending path.
        std::fs::metadata(path).map_err(|source| KeyDerivationError::Unresolvable {
            path: path.to_path_buf(),
            source,
        })?;

        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|_| KeyDerivationError::InvalidPath(path.to_path_buf()))?;

        let key = crate::sys::ftok(&c_path, discriminator).map_err(|source| {
            KeyDerivationError::Unresolvable {
                path: path.to_path_buf(),
                source,
            }
        })?;
        log::trace!("msgq: ftok({}, {discriminator}) = 0x{key:08x}", path.display());
        Ok(QueueKey(key))
    }
}
