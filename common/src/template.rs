mod compute;
mod network;
pub mod sanitize;
#[allow(clippy::module_inception)]
mod template;
mod website;

pub use template::{CfnOutput, CfnResource, Template};
