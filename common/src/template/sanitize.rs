/// Replace any unwanted character in resource name
/// with its uppercase-alpha counterpart
///
/// CloudFormation logical IDs are alphanumeric only, anything not covered by
/// the replacements below is dropped.
pub fn escape_resource_name(name: &str) -> String {
    name.replace("@", "AT")
        .replace(".", "DOT")
        .replace("-", "HYPHEN")
        .replace("_", "UNDRSC")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}

/// Turn a project name into a valid stack name segment
///
/// Stack names allow letters, digits and hyphens, up to 128 characters.
pub fn escape_stack_name(name: &str) -> String {
    let escaped = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect::<String>();

    escaped.trim_matches('-').chars().take(100).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_escape_logical_id_characters() {
        assert_eq!(escape_resource_name("my-site_v1.0"), "myHYPHENsiteUNDRSCv1DOT0");
        assert_eq!(escape_resource_name("a b/c"), "abc");
    }

    #[test]
    fn test_should_escape_stack_name() {
        assert_eq!(escape_stack_name("my_site"), "my-site");
        assert_eq!(escape_stack_name("_site_"), "site");
    }
}
