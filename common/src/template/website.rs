use super::{CfnOutput, CfnResource, Template};
use crate::policy::PolicyDocument;
use crate::stack::Website;
use eyre::WrapErr;
use serde_json::json;

impl Template {
    pub fn bucket_id(&self) -> String {
        self.prefixed("WebsiteBucket")
    }

    pub fn bucket_policy_id(&self) -> String {
        self.prefixed("WebsiteBucketPolicy")
    }

    /// CFN template for the website bucket and, for a public site, its read policy
    ///
    /// The public access block is a property of the bucket, so the policy
    /// referencing the bucket is always applied after it is switched off.
    pub(super) fn website(&self, website: &Website) -> eyre::Result<Vec<CfnResource>> {
        let bucket = self.bucket_id();
        let block = website.public_access_block();

        let mut properties = json!({
            "WebsiteConfiguration": {
                "IndexDocument": website.index_document,
                "ErrorDocument": website.error_document
            },
            "PublicAccessBlockConfiguration": {
                "BlockPublicAcls": block.block_public_acls,
                "IgnorePublicAcls": block.ignore_public_acls,
                "BlockPublicPolicy": block.block_public_policy,
                "RestrictPublicBuckets": block.restrict_public_buckets
            },
            // ACLs are disabled, reads are granted by the bucket policy only
            "OwnershipControls": {
                "Rules": [{"ObjectOwnership": "BucketOwnerEnforced"}]
            },
            "Tags": self.tags()
        });

        if let Some(bucket_name) = &website.bucket_name {
            properties["BucketName"] = json!(bucket_name);
        }

        let mut resources = vec![CfnResource {
            name: bucket.clone(),
            resource: json!({
                "Type": "AWS::S3::Bucket",
                "Properties": properties
            }),
        }];

        if website.public {
            let policy = serde_json::to_value(PolicyDocument::public_read(&bucket))
                .wrap_err("Failed to serialize bucket policy")?;

            resources.push(CfnResource {
                name: self.bucket_policy_id(),
                resource: json!({
                    "Type": "AWS::S3::BucketPolicy",
                    "Properties": {
                        "Bucket": {"Ref": bucket},
                        "PolicyDocument": policy
                    }
                }),
            });
        }

        Ok(resources)
    }

    pub(super) fn website_outputs(&self) -> Vec<CfnOutput> {
        let bucket = self.bucket_id();

        vec![
            CfnOutput {
                name: "BucketName".into(),
                description: "Name of the website bucket".into(),
                value: json!({"Ref": bucket}),
            },
            CfnOutput {
                name: "WebsiteUrl".into(),
                description: "Website endpoint of the bucket".into(),
                value: json!({"Fn::GetAtt": [bucket, "WebsiteURL"]}),
            },
        ]
    }
}
