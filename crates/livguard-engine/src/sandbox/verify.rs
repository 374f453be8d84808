//! Module integrity checks run before permission evaluation.

use sha2::{Digest, Sha256};

use livguard_core::decision::Decision;
use livguard_core::error::ReasonCode;
use livguard_core::policy::AdminControls;
use livguard_core::request::ModuleBundle;

/// Lowercase hex SHA-256.
pub fn content_digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Hash must match the manifest. A claimed signature must have been
/// verified, and when the policy requires signatures the signer must be one
/// of its trusted signers.
pub fn verify_module(bundle: &ModuleBundle, admin: &AdminControls) -> Decision {
    let v = &bundle.verification;

    let actual = content_digest(&bundle.bytes);
    if !actual.eq_ignore_ascii_case(v.content_sha256.trim()) {
        return Decision::deny(
            ReasonCode::IntegrityMismatch,
            format!(
                "module {} content hash {} does not match manifest {}",
                bundle.descriptor.name, actual, v.content_sha256
            ),
        );
    }

    if v.signer.is_some() && !v.signature_verified {
        return Decision::deny(
            ReasonCode::UnsignedModule,
            format!("module {} signature failed verification", bundle.descriptor.name),
        );
    }

    if admin.require_signature {
        if !v.signature_verified {
            return Decision::deny(
                ReasonCode::UnsignedModule,
                format!("module {} is not signed", bundle.descriptor.name),
            );
        }
        match v.signer.as_deref() {
            Some(s) if admin.trusted_signers.contains(s) => {}
            other => {
                return Decision::deny(
                    ReasonCode::UntrustedSigner,
                    format!(
                        "signer {} is not trusted",
                        other.unwrap_or("<unknown>")
                    ),
                )
            }
        }
    }

    Decision::Allow
}
