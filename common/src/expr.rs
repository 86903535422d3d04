use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// A template value that is either known upfront or resolved by CloudFormation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "Value", try_from = "Value")]
pub enum Expr {
    Literal(String),

    /// `{"Ref": "LogicalId"}`
    Ref(String),

    /// `{"Fn::GetAtt": ["LogicalId", "Attribute"]}`
    GetAtt(String, String),

    /// `{"Fn::Sub": "arn:aws:s3:::${LogicalId}/*"}`
    Sub(String),
}

impl Expr {
    pub fn literal(value: &str) -> Self {
        Expr::Literal(value.to_string())
    }

    pub fn reference(logical_id: &str) -> Self {
        Expr::Ref(logical_id.to_string())
    }

    pub fn get_att(logical_id: &str, attribute: &str) -> Self {
        Expr::GetAtt(logical_id.to_string(), attribute.to_string())
    }

    pub fn sub(template: &str) -> Self {
        Expr::Sub(template.to_string())
    }

    /// Resolve the value the way CloudFormation would
    ///
    /// `vars` holds the values of refs (`Bucket`), attributes (`Role.Arn`) and
    /// pseudo parameters (`AWS::AccountId`). Returns None if anything is unknown.
    pub fn resolve(&self, vars: &BTreeMap<String, String>) -> Option<String> {
        match self {
            Expr::Literal(value) => Some(value.clone()),
            Expr::Ref(id) => vars.get(id).cloned(),
            Expr::GetAtt(id, attribute) => vars.get(&format!("{id}.{attribute}")).cloned(),
            Expr::Sub(template) => {
                let mut result = String::new();

                for part in sub_parts(template) {
                    match part {
                        SubPart::Text(text) => result.push_str(text),
                        SubPart::Var(name) => result.push_str(vars.get(name)?),
                    }
                }

                Some(result)
            }
        }
    }

    /// Logical IDs and pseudo parameters the value depends on
    pub fn references(&self) -> Vec<String> {
        match self {
            Expr::Literal(_) => vec![],
            Expr::Ref(id) | Expr::GetAtt(id, _) => vec![id.clone()],
            Expr::Sub(template) => sub_parts(template)
                .into_iter()
                .filter_map(|part| match part {
                    SubPart::Var(name) => Some(name.split('.').next().unwrap_or(name).to_string()),
                    SubPart::Text(_) => None,
                })
                .collect(),
        }
    }
}

#[derive(Debug, PartialEq)]
pub(crate) enum SubPart<'a> {
    Text(&'a str),
    Var(&'a str),
}

/// Split a `Fn::Sub` string into text and `${Var}` placeholders
///
/// `${!Literal}` is kept as text, without the exclamation mark.
pub(crate) fn sub_parts(template: &str) -> Vec<SubPart<'_>> {
    let mut parts = vec![];
    let mut rest = template;

    while let Some(start) = rest.find("${") {
        let Some(length) = rest[start..].find('}') else {
            break;
        };

        if start > 0 {
            parts.push(SubPart::Text(&rest[..start]));
        }

        let name = &rest[start + 2..start + length];

        if let Some(literal) = name.strip_prefix('!') {
            parts.push(SubPart::Text("${"));
            parts.push(SubPart::Text(literal));
            parts.push(SubPart::Text("}"));
        } else {
            parts.push(SubPart::Var(name));
        }

        rest = &rest[start + length + 1..];
    }

    if !rest.is_empty() {
        parts.push(SubPart::Text(rest));
    }

    parts
}

impl From<Expr> for Value {
    fn from(expr: Expr) -> Self {
        match expr {
            Expr::Literal(value) => Value::String(value),
            Expr::Ref(id) => json!({ "Ref": id }),
            Expr::GetAtt(id, attribute) => json!({ "Fn::GetAtt": [id, attribute] }),
            Expr::Sub(template) => json!({ "Fn::Sub": template }),
        }
    }
}

impl TryFrom<Value> for Expr {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        if let Value::String(literal) = value {
            return Ok(Expr::Literal(literal));
        }

        let Some(object) = value.as_object().filter(|o| o.len() == 1) else {
            return Err(format!("Unsupported expression: {value}"));
        };

        if let Some(id) = object.get("Ref").and_then(Value::as_str) {
            return Ok(Expr::reference(id));
        }

        if let Some(template) = object.get("Fn::Sub").and_then(Value::as_str) {
            return Ok(Expr::sub(template));
        }

        match object.get("Fn::GetAtt") {
            Some(Value::Array(items)) if items.len() == 2 => {
                match (items[0].as_str(), items[1].as_str()) {
                    (Some(id), Some(attribute)) => Ok(Expr::get_att(id, attribute)),
                    _ => Err(format!("Malformed Fn::GetAtt: {value}")),
                }
            }
            Some(Value::String(path)) => match path.split_once('.') {
                Some((id, attribute)) => Ok(Expr::get_att(id, attribute)),
                None => Err(format!("Malformed Fn::GetAtt: {value}")),
            },
            _ => Err(format!("Unsupported expression: {value}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars() -> BTreeMap<String, String> {
        BTreeMap::from([
            ("WebsiteBucket".to_string(), "my-site-bucket-1x2y".to_string()),
            ("AWS::AccountId".to_string(), "123456789012".to_string()),
            ("Role.Arn".to_string(), "arn:aws:iam::123456789012:role/x".to_string()),
        ])
    }

    #[test]
    fn test_should_resolve_sub_with_ref_and_pseudo_parameter() {
        let expr = Expr::sub("arn:aws:s3:::${WebsiteBucket}/*");
        assert_eq!(
            expr.resolve(&vars()).as_deref(),
            Some("arn:aws:s3:::my-site-bucket-1x2y/*")
        );

        let expr = Expr::sub("arn:aws:iam::${AWS::AccountId}:root");
        assert_eq!(
            expr.resolve(&vars()).as_deref(),
            Some("arn:aws:iam::123456789012:root")
        );
    }

    #[test]
    fn test_should_not_resolve_unknown_variable() {
        assert_eq!(Expr::sub("${Missing}").resolve(&vars()), None);
        assert_eq!(Expr::reference("Missing").resolve(&vars()), None);
    }

    #[test]
    fn test_should_keep_escaped_placeholder_literal() {
        assert_eq!(
            Expr::sub("${!Literal}-x").resolve(&vars()).as_deref(),
            Some("${Literal}-x")
        );
    }

    #[test]
    fn test_should_list_sub_references_without_attributes() {
        assert_eq!(
            Expr::sub("${Role.Arn}/${WebsiteBucket}").references(),
            vec!["Role".to_string(), "WebsiteBucket".to_string()]
        );
    }

    #[test]
    fn test_should_serialize_intrinsics() {
        assert_eq!(
            serde_json::to_value(Expr::get_att("Role", "Arn")).unwrap(),
            json!({"Fn::GetAtt": ["Role", "Arn"]})
        );

        let parsed: Expr = serde_json::from_value(json!({"Fn::GetAtt": "Role.Arn"})).unwrap();
        assert_eq!(parsed, Expr::get_att("Role", "Arn"));
    }
}
