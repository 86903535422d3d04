pub mod check;
pub mod config;
pub mod deploy;
pub mod expr;
pub mod graph;
pub mod oidc;
pub mod policy;
pub mod stack;
pub mod template;

#[cfg(test)]
pub(crate) mod fixtures;
