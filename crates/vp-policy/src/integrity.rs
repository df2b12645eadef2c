// integrity.rs — Binding policies to their hash.
//
// `hash_policy` is the only sanctioned way to compute a policy hash:
// serialize the full private spec, canonicalize per RFC 8785, SHA-256.
// The public spec carries that hash in its integrity block so a verifier can
// check a proof was produced against exactly the policy it trusts.

use serde::{Deserialize, Serialize};
use tracing::debug;
use vp_canon::PolicyHash;

use crate::error::PolicyError;
use crate::graph::PolicyGraph;
use crate::output::OutputClaimSpec;
use crate::spec::{
    DisclosureSpec, PolicyMetadata, PolicySpec, SemVer, SubjectSpec, ValiditySpec,
};
use crate::validate::validate;

/// Canonical RFC 8785 bytes of the full private policy.
pub fn canonical_policy_bytes(spec: &PolicySpec) -> Result<Vec<u8>, PolicyError> {
    Ok(vp_canon::to_canonical_bytes(spec)?)
}

/// `sha256:<hex>` over the policy's canonical bytes.
pub fn hash_policy(spec: &PolicySpec) -> Result<PolicyHash, PolicyError> {
    let bytes = canonical_policy_bytes(spec)?;
    Ok(vp_canon::hash(&bytes))
}

/// A policy that has been hashed and validated, ready to evaluate.
///
/// Sealing is the gate every evaluation passes through: canonicalization
/// failures and static errors stop here, before any observation is looked at.
#[derive(Debug, Clone)]
pub struct SealedPolicy {
    spec: PolicySpec,
    graph: PolicyGraph,
    hash: PolicyHash,
}

impl SealedPolicy {
    pub fn seal(spec: PolicySpec) -> Result<Self, PolicyError> {
        // Hash first: a policy that cannot be canonicalized is rejected even
        // if it would otherwise validate.
        let hash = hash_policy(&spec)?;
        let graph = validate(&spec)?;
        debug!(policy_id = %spec.id, policy_hash = %hash, "policy sealed");
        Ok(Self { spec, graph, hash })
    }

    pub fn spec(&self) -> &PolicySpec {
        &self.spec
    }

    pub fn graph(&self) -> &PolicyGraph {
        &self.graph
    }

    pub fn policy_hash(&self) -> &PolicyHash {
        &self.hash
    }
}

/// Canonicalization scheme named in the integrity block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Canonicalization {
    #[serde(rename = "RFC8785")]
    Rfc8785,
}

/// Optional pin of the evaluator implementation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CodeRef {
    Git { repo: String, commit: String },
    Oci { image: String, digest: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Integrity {
    pub canonicalization: Canonicalization,
    pub policy_hash: PolicyHash,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_ref: Option<CodeRef>,
}

/// The publishable view of a policy: what the claims mean, what gets
/// disclosed, how long it is valid, and which exact policy was proven.
/// Inputs (data sources, signals, windows) are never part of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PublicPolicySpec {
    pub id: String,
    pub version: SemVer,
    pub metadata: PolicyMetadata,
    pub subject: SubjectSpec,
    pub outputs: Vec<OutputClaimSpec>,
    pub validity: ValiditySpec,
    pub disclosure: DisclosureSpec,
    pub integrity: Integrity,
}

impl PublicPolicySpec {
    /// Project a private policy into its public form, embedding its hash.
    pub fn from_private(
        spec: &PolicySpec,
        code_ref: Option<CodeRef>,
    ) -> Result<Self, PolicyError> {
        let policy_hash = hash_policy(spec)?;
        Ok(Self {
            id: spec.id.clone(),
            version: spec.version,
            metadata: spec.metadata.clone(),
            subject: spec.subject.clone(),
            outputs: spec.outputs.clone(),
            validity: spec.validity.clone(),
            disclosure: spec.disclosure.clone(),
            integrity: Integrity {
                canonicalization: Canonicalization::Rfc8785,
                policy_hash,
                code_ref,
            },
        })
    }

    pub fn policy_hash(&self) -> &PolicyHash {
        &self.integrity.policy_hash
    }
}

/// Check that a public spec truthfully describes a private policy.
///
/// The recomputed hash must match the integrity block, and every projected
/// field must agree; a public spec that advertises different outputs or
/// disclosure than the hashed policy would mislead a verifier.
pub fn verify_public(public: &PublicPolicySpec, private: &PolicySpec) -> Result<(), PolicyError> {
    let actual = hash_policy(private)?;
    if &actual != public.policy_hash() {
        return Err(PolicyError::IntegrityMismatch {
            field: "integrity.policyHash".to_string(),
            reason: format!(
                "public spec claims {} but the policy hashes to {}",
                public.policy_hash(),
                actual
            ),
        });
    }

    let mismatch = |field: &str| PolicyError::IntegrityMismatch {
        field: field.to_string(),
        reason: "differs from the hashed policy".to_string(),
    };
    if public.id != private.id {
        return Err(mismatch("id"));
    }
    if public.version != private.version {
        return Err(mismatch("version"));
    }
    if public.metadata != private.metadata {
        return Err(mismatch("metadata"));
    }
    if public.subject != private.subject {
        return Err(mismatch("subject"));
    }
    if public.outputs != private.outputs {
        return Err(mismatch("outputs"));
    }
    if public.validity != private.validity {
        return Err(mismatch("validity"));
    }
    if public.disclosure != private.disclosure {
        return Err(mismatch("disclosure"));
    }
    Ok(())
}
