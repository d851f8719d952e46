//! Presigned-upload collaborator boundary.
//!
//! Side feature, not part of the proof protocol: a submitter can park an
//! encoded proof at a presigned URL for later pickup. Only the interface
//! is owned here; the in-memory implementation backs the demo and tests.

use anyhow::Result;
use ethers_core::types::Address;
use uuid::Uuid;

/// Where to put the upload, and the id to quote when referencing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresignedUpload {
    pub url: String,
    pub submission_id: String,
}

pub trait UploadApi: Send + Sync {
    /// Request an upload slot for one platform, optionally bound to the
    /// submitting address.
    fn create_upload(&self, platform: &str, submitter: Option<Address>) -> Result<PresignedUpload>;
}

/// Deterministic local stand-in for the remote API.
#[derive(Debug, Default)]
pub struct LocalUploadApi {
    base_url: String,
}

impl LocalUploadApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into() }
    }
}

impl UploadApi for LocalUploadApi {
    fn create_upload(&self, platform: &str, submitter: Option<Address>) -> Result<PresignedUpload> {
        let submission_id = Uuid::new_v4().to_string();
        let url = match submitter {
            Some(address) => format!(
                "{}/{}/{}?submitter={:#x}",
                self.base_url, platform, submission_id, address
            ),
            None => format!("{}/{}/{}", self.base_url, platform, submission_id),
        };
        Ok(PresignedUpload { url, submission_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_urls_scope_platform_and_submitter() {
        let api = LocalUploadApi::new("https://uploads.payproof.test");
        let address: Address = "0x1111111111111111111111111111111111111111".parse().unwrap();

        let anonymous = api.create_upload("venmo", None).unwrap();
        assert!(anonymous.url.contains("/venmo/"));
        assert!(anonymous.url.contains(&anonymous.submission_id));
        assert!(!anonymous.url.contains("submitter="));

        let bound = api.create_upload("venmo", Some(address)).unwrap();
        assert!(bound.url.contains("submitter=0x1111111111111111111111111111111111111111"));
        assert_ne!(anonymous.submission_id, bound.submission_id);
    }
}
