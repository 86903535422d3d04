mod cloudformation;
mod s3;

use aws_config::BehaviorVersion;
use plinth_common::deploy::Deployer;
use std::sync::Arc;

/// Deployer backed by CloudFormation and S3
///
/// Credentials and region come from the default chain (env, profile, SSO, IMDS).
pub(crate) async fn deployer() -> Deployer {
    let config = aws_config::defaults(BehaviorVersion::latest()).load().await;

    Deployer::new(
        Arc::new(cloudformation::CloudFormation::new(&config)),
        Arc::new(s3::S3::new(&config)),
    )
}
