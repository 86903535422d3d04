//! Stacks shared by unit tests

use crate::oidc::OidcTrust;
use crate::stack::{Compute, Network, Stack, TaskSpec, Website};

pub(crate) fn compute() -> Compute {
    let subject = "repo:myorg/myrepo:ref:refs/heads/main".parse().unwrap();
    Compute::new(OidcTrust::new(subject), TaskSpec::new("nginx:latest"))
}

/// Project "site" with a public website and compute, optionally networked
pub(crate) fn stack(with_network_stack: bool) -> Stack {
    let compute = if with_network_stack {
        compute().with_network(Network::default())
    } else {
        compute()
    };

    Stack::new("site")
        .with_website(Website::default())
        .with_compute(compute)
}
