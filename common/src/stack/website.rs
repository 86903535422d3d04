use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Bucket with static website hosting and its single uploaded page
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Website {
    /// Physical bucket name, generated by CloudFormation when absent
    pub bucket_name: Option<String>,

    pub index_document: String,
    pub error_document: String,

    /// Local file uploaded to the bucket
    pub source: PathBuf,

    /// Object key, the source file name by default
    pub key: Option<String>,

    pub content_type: String,

    /// Readable by anyone through the bucket policy
    pub public: bool,
}

impl Default for Website {
    fn default() -> Self {
        Website {
            bucket_name: None,
            index_document: "index.html".into(),
            error_document: "error.html".into(),
            source: PathBuf::from("index.html"),
            key: None,
            content_type: "text/html".into(),
            public: true,
        }
    }
}

/// Object uploaded after the stack is provisioned
///
/// No ACL is ever set on it, reads are granted by the bucket policy only.
#[derive(Clone, Debug, PartialEq)]
pub struct BucketObject {
    pub key: String,
    pub content_type: String,
    pub source: PathBuf,
}

/// Account-level safety switches that reject public policies and ACLs
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PublicAccessBlock {
    pub block_public_acls: bool,
    pub ignore_public_acls: bool,
    pub block_public_policy: bool,
    pub restrict_public_buckets: bool,
}

impl PublicAccessBlock {
    pub fn all(blocked: bool) -> Self {
        PublicAccessBlock {
            block_public_acls: blocked,
            ignore_public_acls: blocked,
            block_public_policy: blocked,
            restrict_public_buckets: blocked,
        }
    }
}

impl Website {
    pub fn object(&self) -> BucketObject {
        let key = self.key.clone().unwrap_or_else(|| {
            self.source
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_else(|| self.index_document.clone())
        });

        BucketObject {
            key,
            content_type: self.content_type.clone(),
            source: self.source.clone(),
        }
    }

    /// A public policy only takes effect with every block switched off
    pub fn public_access_block(&self) -> PublicAccessBlock {
        PublicAccessBlock::all(!self.public)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_default_object_key_to_file_name() {
        let website = Website {
            source: PathBuf::from("/srv/site/landing.html"),
            ..Default::default()
        };

        assert_eq!(website.object().key, "landing.html");
        assert_eq!(website.object().content_type, "text/html");
    }

    #[test]
    fn test_should_use_explicit_object_key() {
        let website = Website {
            key: Some("index.html".into()),
            source: PathBuf::from("dist/main.html"),
            ..Default::default()
        };

        assert_eq!(website.object().key, "index.html");
    }

    #[test]
    fn test_should_unblock_public_access_only_for_public_site() {
        assert_eq!(Website::default().public_access_block(), PublicAccessBlock::all(false));

        let private = Website {
            public: false,
            ..Default::default()
        };
        assert_eq!(private.public_access_block(), PublicAccessBlock::all(true));
    }
}
