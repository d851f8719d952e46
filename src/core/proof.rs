//! Canonical proof (signed claim) model and its on-chain encoding.
//!
//! The extension hands back an opaque JSON claim object on success; this
//! module is the only place that shape is trusted into typed form. The
//! typed [`Proof`] is what the rest of the client stores, and what gets
//! ABI-encoded for the smart-contract verifier as the tuple
//! `(claimInfo, signedClaim, isAppclipProof)`.

use anyhow::{anyhow, Context, Result};
use ethers_core::abi::{self, ParamType, Token};
use ethers_core::types::{Address, H256};
use ethers_core::utils::keccak256;
use serde::Deserialize;
use serde_json::Value;

// ── Typed claim model ────────────────────────────────────────────────────────

/// What was attested: the provider route and its request/response context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimInfo {
    pub provider: String,
    pub parameters: String,
    /// May legitimately be empty.
    pub context: String,
}

impl ClaimInfo {
    /// Claim identifier as the verifier derives it: keccak256 over the
    /// newline-joined info fields.
    pub fn identifier(&self) -> H256 {
        let preimage = format!("{}\n{}\n{}", self.provider, self.parameters, self.context);
        H256::from(keccak256(preimage.as_bytes()))
    }
}

/// The notarized claim body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimData {
    pub identifier: H256,
    pub owner: Address,
    pub timestamp_s: u32,
    pub epoch: u32,
}

/// Claim body plus the notary signature set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedClaim {
    pub claim: ClaimData,
    pub signatures: Vec<Vec<u8>>,
}

/// The complete attestation consumed by the on-chain verifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proof {
    pub claim_info: ClaimInfo,
    pub signed_claim: SignedClaim,
    pub is_app_clip: bool,
}

// ── Parsing the extension's opaque success payload ───────────────────────────

#[derive(Deserialize)]
struct WireClaimInfo {
    provider: String,
    parameters: String,
    #[serde(default)]
    context: String,
}

#[derive(Deserialize)]
struct WireClaimData {
    identifier: String,
    owner: String,
    #[serde(rename = "timestampS")]
    timestamp_s: u32,
    epoch: u32,
}

#[derive(Deserialize)]
struct WireSignedClaim {
    claim: WireClaimData,
    signatures: Vec<String>,
}

#[derive(Deserialize)]
struct WireProof {
    #[serde(rename = "claimInfo")]
    claim_info: WireClaimInfo,
    #[serde(rename = "signedClaim")]
    signed_claim: WireSignedClaim,
    #[serde(rename = "isAppclipProof", default)]
    is_appclip_proof: bool,
}

impl Proof {
    /// Parse the opaque claim object from a `success` notary response.
    ///
    /// Any shape mismatch is an error for the caller to collapse into the
    /// failed-to-prove path, never a panic.
    pub fn from_claim_value(value: &Value) -> Result<Self> {
        let wire: WireProof = serde_json::from_value(value.clone())
            .context("claim payload does not match the expected proof shape")?;

        let identifier: H256 = wire
            .signed_claim
            .claim
            .identifier
            .parse()
            .context("claim identifier is not a 32-byte hex string")?;
        let owner: Address = wire
            .signed_claim
            .claim
            .owner
            .parse()
            .context("claim owner is not an address")?;

        let signatures = wire
            .signed_claim
            .signatures
            .iter()
            .map(|s| {
                hex::decode(s.trim_start_matches("0x"))
                    .with_context(|| format!("signature is not hex: {s}"))
            })
            .collect::<Result<Vec<_>>>()?;
        if signatures.is_empty() {
            return Err(anyhow!("claim carries no signatures"));
        }

        Ok(Self {
            claim_info: ClaimInfo {
                provider: wire.claim_info.provider,
                parameters: wire.claim_info.parameters,
                context: wire.claim_info.context,
            },
            signed_claim: SignedClaim {
                claim: ClaimData {
                    identifier,
                    owner,
                    timestamp_s: wire.signed_claim.claim.timestamp_s,
                    epoch: wire.signed_claim.claim.epoch,
                },
                signatures,
            },
            is_app_clip: wire.is_appclip_proof,
        })
    }
}

// ── ABI encoding ─────────────────────────────────────────────────────────────

/// `(claimInfo:(string,string,string),
///   signedClaim:((bytes32,address,uint32,uint32), bytes[]),
///   isAppclipProof: bool)`
fn proof_param_type() -> ParamType {
    ParamType::Tuple(vec![
        ParamType::Tuple(vec![ParamType::String, ParamType::String, ParamType::String]),
        ParamType::Tuple(vec![
            ParamType::Tuple(vec![
                ParamType::FixedBytes(32),
                ParamType::Address,
                ParamType::Uint(32),
                ParamType::Uint(32),
            ]),
            ParamType::Array(Box::new(ParamType::Bytes)),
        ]),
        ParamType::Bool,
    ])
}

fn proof_to_token(proof: &Proof) -> Token {
    let claim_info = Token::Tuple(vec![
        Token::String(proof.claim_info.provider.clone()),
        Token::String(proof.claim_info.parameters.clone()),
        Token::String(proof.claim_info.context.clone()),
    ]);
    let claim = Token::Tuple(vec![
        Token::FixedBytes(proof.signed_claim.claim.identifier.as_bytes().to_vec()),
        Token::Address(proof.signed_claim.claim.owner),
        Token::Uint(proof.signed_claim.claim.timestamp_s.into()),
        Token::Uint(proof.signed_claim.claim.epoch.into()),
    ]);
    let signatures = Token::Array(
        proof
            .signed_claim
            .signatures
            .iter()
            .cloned()
            .map(Token::Bytes)
            .collect(),
    );
    Token::Tuple(vec![
        claim_info,
        Token::Tuple(vec![claim, signatures]),
        Token::Bool(proof.is_app_clip),
    ])
}

/// Encode a proof as the submission tuple.
pub fn encode(proof: &Proof) -> Vec<u8> {
    abi::encode(&[proof_to_token(proof)])
}

/// Decode a submission tuple back into a [`Proof`].
pub fn decode(data: &[u8]) -> Result<Proof> {
    let mut tokens = abi::decode(&[proof_param_type()], data)
        .context("payload is not a valid proof tuple")?;
    let token = tokens.pop().ok_or_else(|| anyhow!("empty token set"))?;
    proof_from_token(token)
}

fn proof_from_token(token: Token) -> Result<Proof> {
    let mut outer = expect_tuple(token, 3)?;
    let is_app_clip = match outer.pop() {
        Some(Token::Bool(b)) => b,
        other => return Err(anyhow!("expected bool isAppclipProof, got {other:?}")),
    };
    let mut signed = expect_tuple(outer.pop().ok_or_else(|| anyhow!("missing signedClaim"))?, 2)?;
    let mut info = expect_tuple(outer.pop().ok_or_else(|| anyhow!("missing claimInfo"))?, 3)?;

    let context = expect_string(info.pop())?;
    let parameters = expect_string(info.pop())?;
    let provider = expect_string(info.pop())?;

    let signatures = match signed.pop() {
        Some(Token::Array(items)) => items
            .into_iter()
            .map(|t| match t {
                Token::Bytes(b) => Ok(b),
                other => Err(anyhow!("expected bytes signature, got {other:?}")),
            })
            .collect::<Result<Vec<_>>>()?,
        other => return Err(anyhow!("expected signature array, got {other:?}")),
    };

    let mut claim = expect_tuple(signed.pop().ok_or_else(|| anyhow!("missing claim"))?, 4)?;
    let epoch = expect_u32(claim.pop())?;
    let timestamp_s = expect_u32(claim.pop())?;
    let owner = match claim.pop() {
        Some(Token::Address(a)) => a,
        other => return Err(anyhow!("expected owner address, got {other:?}")),
    };
    let identifier = match claim.pop() {
        Some(Token::FixedBytes(b)) if b.len() == 32 => H256::from_slice(&b),
        other => return Err(anyhow!("expected bytes32 identifier, got {other:?}")),
    };

    Ok(Proof {
        claim_info: ClaimInfo { provider, parameters, context },
        signed_claim: SignedClaim {
            claim: ClaimData { identifier, owner, timestamp_s, epoch },
            signatures,
        },
        is_app_clip,
    })
}

fn expect_tuple(token: Token, len: usize) -> Result<Vec<Token>> {
    match token {
        Token::Tuple(items) if items.len() == len => Ok(items),
        other => Err(anyhow!("expected {len}-tuple, got {other:?}")),
    }
}

fn expect_string(token: Option<Token>) -> Result<String> {
    match token {
        Some(Token::String(s)) => Ok(s),
        other => Err(anyhow!("expected string, got {other:?}")),
    }
}

fn expect_u32(token: Option<Token>) -> Result<u32> {
    match token {
        Some(Token::Uint(v)) if v <= u32::MAX.into() => Ok(v.as_u32()),
        other => Err(anyhow!("expected uint32, got {other:?}")),
    }
}
