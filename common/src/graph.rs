use crate::expr::{sub_parts, SubPart};
use eyre::ContextCompat;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

/// Dependencies between the resources of a template
///
/// Built from `Ref`, `Fn::GetAtt`, `Fn::Sub` placeholders and `DependsOn`,
/// the same way CloudFormation orders its operations.
#[derive(Clone, Debug, Default)]
pub struct Graph {
    /// Resource -> resources it depends on
    edges: BTreeMap<String, BTreeSet<String>>,

    /// Resource -> its type, e.g. AWS::S3::Bucket
    types: BTreeMap<String, String>,
}

/// Reference from a resource to something the template does not declare
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dangling {
    pub resource: String,
    pub target: String,
}

impl Graph {
    pub fn new(resources: &Map<String, Value>) -> Self {
        let mut graph = Graph::default();

        for (name, resource) in resources {
            let mut dependencies = references(resource.get("Properties").unwrap_or(&Value::Null));

            match resource.get("DependsOn") {
                Some(Value::String(dependency)) => {
                    dependencies.insert(dependency.clone());
                }
                Some(Value::Array(items)) => {
                    dependencies.extend(items.iter().filter_map(Value::as_str).map(String::from));
                }
                _ => {}
            }

            let resource_type = resource
                .get("Type")
                .and_then(Value::as_str)
                .unwrap_or_default();

            graph.types.insert(name.clone(), resource_type.to_string());
            graph.edges.insert(name.clone(), dependencies);
        }

        graph
    }

    pub fn resource_type(&self, name: &str) -> Option<&str> {
        self.types.get(name).map(String::as_str)
    }

    pub fn dependencies(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.edges.get(name)
    }

    /// References to undeclared resources, pseudo parameters excluded
    pub fn dangling(&self) -> Vec<Dangling> {
        self.edges
            .iter()
            .flat_map(|(resource, dependencies)| {
                dependencies
                    .iter()
                    .filter(|target| !self.edges.contains_key(*target))
                    .map(|target| Dangling {
                        resource: resource.clone(),
                        target: target.clone(),
                    })
            })
            .collect()
    }

    /// Resources ordered so that every resource comes after its dependencies
    ///
    /// Ties are broken alphabetically to keep the order stable. Fails on cycles.
    pub fn order(&self) -> eyre::Result<Vec<String>> {
        let mut remaining = self
            .edges
            .iter()
            .map(|(name, dependencies)| {
                let known = dependencies
                    .iter()
                    .filter(|d| self.edges.contains_key(*d))
                    .cloned()
                    .collect::<BTreeSet<_>>();

                (name.clone(), known)
            })
            .collect::<BTreeMap<_, _>>();

        let mut order = Vec::with_capacity(remaining.len());

        while !remaining.is_empty() {
            let next = remaining
                .iter()
                .find(|(_, dependencies)| dependencies.is_empty())
                .map(|(name, _)| name.clone())
                .wrap_err_with(|| {
                    format!(
                        "Circular dependency between {}",
                        remaining.keys().cloned().collect::<Vec<_>>().join(", ")
                    )
                })?;

            remaining.remove(&next);

            for dependencies in remaining.values_mut() {
                dependencies.remove(&next);
            }

            order.push(next);
        }

        Ok(order)
    }
}

/// Logical IDs referenced anywhere inside a value
///
/// Pseudo parameters (`AWS::Region`) and attributes (`Role.Arn` -> `Role`)
/// are normalized away.
pub fn references(value: &Value) -> BTreeSet<String> {
    let mut result = BTreeSet::new();
    collect(value, &mut result);
    result
}

fn collect(value: &Value, result: &mut BTreeSet<String>) {
    match value {
        Value::Array(items) => items.iter().for_each(|item| collect(item, result)),
        Value::Object(object) if object.len() > 1 => {
            object.values().for_each(|v| collect(v, result))
        }
        Value::Object(object) => {
            let Some((key, argument)) = object.iter().next() else {
                return;
            };

            match (key.as_str(), argument) {
                ("Ref", Value::String(id)) => insert(id, result),
                ("Fn::GetAtt", Value::Array(items)) => {
                    if let Some(id) = items.first().and_then(Value::as_str) {
                        insert(id, result);
                    }
                }
                ("Fn::GetAtt", Value::String(path)) => {
                    insert(path.split('.').next().unwrap_or(path), result)
                }
                ("Fn::Sub", Value::String(template)) => sub_references(template, None, result),
                ("Fn::Sub", Value::Array(items)) => {
                    let variables = items.get(1).and_then(Value::as_object);

                    if let Some(template) = items.first().and_then(Value::as_str) {
                        sub_references(template, variables, result);
                    }

                    if let Some(variables) = variables {
                        variables.values().for_each(|v| collect(v, result));
                    }
                }
                _ => collect(argument, result),
            }
        }
        _ => {}
    }
}

fn sub_references(template: &str, variables: Option<&Map<String, Value>>, result: &mut BTreeSet<String>) {
    for part in sub_parts(template) {
        if let SubPart::Var(name) = part {
            let id = name.split('.').next().unwrap_or(name);

            if !variables.is_some_and(|v| v.contains_key(id)) {
                insert(id, result);
            }
        }
    }
}

fn insert(id: &str, result: &mut BTreeSet<String>) {
    if !id.starts_with("AWS::") {
        result.insert(id.to_string());
    }
}
