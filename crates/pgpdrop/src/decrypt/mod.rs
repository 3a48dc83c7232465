pub mod gpg;
pub mod naming;
pub mod permissions;
pub mod step;

use std::path::Path;

use crate::error::DecryptError;

pub use gpg::GpgDecryptor;
pub use naming::OutputNaming;
pub use permissions::OutputPolicy;
pub use step::{DecryptStep, StepOutcome};

/// The external decryption collaborator, treated as a black box: decrypt
/// `input` and write the cleartext to `output`.
pub trait Decryptor: Send + Sync {
    fn decrypt(&self, input: &Path, output: &Path) -> Result<(), DecryptError>;
}

impl<D: Decryptor + ?Sized> Decryptor for Box<D> {
    fn decrypt(&self, input: &Path, output: &Path) -> Result<(), DecryptError> {
        (**self).decrypt(input, output)
    }
}
