use std::sync::OnceLock;

pub struct Config<'a> {
    /// Host of the OIDC issuer trusted by the deploy role
    pub oidc_issuer: &'a str,

    /// Managed policy attached to the deploy role unless configured otherwise
    pub managed_policy_arn: &'a str,

    /// Prepended to the project name to get the CloudFormation stack name
    pub stack_prefix: &'a str,

    /// Tag key put on every taggable resource
    pub project_tag: &'a str,
}

static CONFIG: OnceLock<Config> = OnceLock::new();

pub fn config() -> &'static Config<'static> {
    CONFIG.get_or_init(|| Config {
        oidc_issuer: option_env!("PLINTH_OIDC_ISSUER")
            .unwrap_or("token.actions.githubusercontent.com"),

        managed_policy_arn: option_env!("PLINTH_MANAGED_POLICY_ARN")
            .unwrap_or("arn:aws:iam::aws:policy/AmazonECS_FullAccess"),

        stack_prefix: option_env!("PLINTH_STACK_PREFIX").unwrap_or("plinth"),
        project_tag: "plinth:project",
    })
}
