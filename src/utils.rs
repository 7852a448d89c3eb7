//! Helpers for reading instances as plain data

use crate::errors::{Error, ErrorKind, Result};
use crate::instance::{ChainId, Gaia, Instance};
use crate::types::{Initializer, Props};
use serde::Serialize;

fn require<'a>(instance: Option<&'a Instance>, kind: ErrorKind, operation: &str) -> Result<&'a Instance> {
    instance.ok_or_else(|| Error::with_addition(kind, format!("{} needs an instance", operation)))
}

fn absorb(out: &mut Props, layer: &Props) {
    for (key, value) in layer {
        if !out.contains_key(key) {
            out.insert(key.clone(), value.clone());
        }
    }
}

/// Every field visible through the instance, nearest layer winning.
pub fn extract<'a>(instance: impl Into<Option<&'a Instance>>) -> Result<Props> {
    let instance = require(instance.into(), ErrorKind::WrongInstanceInvocation, "extract")?;
    let mut out = Props::new();
    let mut current = instance.clone();
    loop {
        absorb(&mut out, &current.data());
        absorb(&mut out, current.type_def().template());
        match current.parent().cloned() {
            Some(parent) => current = parent,
            None => break,
        }
    }
    match current.gaia() {
        Some(Gaia::Object(props)) => absorb(&mut out, props),
        Some(Gaia::Instance(gaia)) => absorb(&mut out, &extract(gaia)?),
        None => {}
    }
    Ok(out)
}

/// Visible fields among `keys`; absent keys are skipped.
pub fn pick<'a, S: AsRef<str>>(instance: impl Into<Option<&'a Instance>>, keys: &[S]) -> Result<Props> {
    let instance = require(instance.into(), ErrorKind::WrongInstanceInvocation, "pick")?;
    let mut out = Props::new();
    for key in keys {
        let key = key.as_ref();
        if let Some(value) = instance.get(key) {
            out.insert(key.to_string(), value);
        }
    }
    Ok(out)
}

/// Shallow merge of the extracted instances, later ones winning.
///
/// Only instances are merged; to rebuild an instance on another receiver use
/// [`Instance::fork_onto`].
pub fn merge<'a, I>(instances: I) -> Result<Props>
where
    I: IntoIterator<Item = Option<&'a Instance>>,
{
    let mut out = Props::new();
    let mut merged = 0;
    for instance in instances {
        let instance = require(instance, ErrorKind::WrongInstanceInvocation, "merge")?;
        out.extend(extract(instance)?);
        merged += 1;
    }
    if merged == 0 {
        return Err(Error::with_addition(
            ErrorKind::WrongInstanceInvocation,
            "merge needs at least one instance",
        ));
    }
    Ok(out)
}

/// Composition provenance of an instance
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Parsed {
    pub name: String,
    /// Own data
    pub props: Props,
    /// Everything visible through the instance
    #[serde(rename = "self")]
    pub self_: Props,
    /// Template of the instance's type
    pub proto: Props,
    /// Delegation-chain node
    pub joint: ChainId,
    pub parent: Option<Box<Parsed>>,
    /// Receiver the root construction was bound to
    pub gaia: Option<Props>,
}

pub fn parse(instance: &Instance) -> Parsed {
    let gaia = root_of(instance).gaia().map(|gaia| match gaia {
        Gaia::Object(props) => props.clone(),
        Gaia::Instance(other) => other.extract(),
    });
    Parsed {
        name: instance.type_name().to_string(),
        props: instance.snapshot(),
        self_: instance.extract(),
        proto: instance.type_def().template().clone(),
        joint: instance.chain(),
        parent: instance.parent().map(|parent| Box::new(parse(parent))),
        gaia,
    }
}

fn root_of(instance: &Instance) -> &Instance {
    let mut current = instance;
    while let Some(parent) = current.parent() {
        current = parent;
    }
    current
}

/// One level of an instance's construction chain
#[derive(Debug, Clone)]
pub struct Constructor {
    pub type_path: String,
    pub initializer: Initializer,
}

/// Initializers that built `instance`, root ancestor first.
pub fn collect_constructors<'a>(instance: impl Into<Option<&'a Instance>>) -> Result<Vec<Constructor>> {
    let instance = require(
        instance.into(),
        ErrorKind::WrongModificationPattern,
        "collect_constructors",
    )?;
    let mut constructors = Vec::new();
    let mut current = Some(instance);
    while let Some(level) = current {
        constructors.push(Constructor {
            type_path: level.type_path().to_string(),
            initializer: level.type_def().initializer().clone(),
        });
        current = level.parent();
    }
    constructors.reverse();
    Ok(constructors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeSpec;
    use crate::Registry;
    use serde_json::json;

    fn account_and_frozen() -> (Instance, Instance) {
        let registry = Registry::new();
        let account = registry
            .define(
                TypeSpec::new("Account")
                    .template(json!({"kind": "account", "currency": "EUR"}))
                    .init(|ctx| {
                        ctx.set("balance", ctx.arg(0).cloned().unwrap_or(json!(0)));
                        Ok(())
                    }),
            )
            .unwrap();
        account
            .define(
                TypeSpec::new("Frozen")
                    .template(json!({"kind": "frozen"}))
                    .init(|ctx| {
                        ctx.set("reason", "audit");
                        Ok(())
                    }),
            )
            .unwrap();
        let a = account.construct(vec![json!(100)]).unwrap().into_ready().unwrap();
        let f = a.invoke("Frozen", vec![]).unwrap().into_ready().unwrap();
        (a, f)
    }

    #[test]
    fn test_extract_nearest_layer_wins() {
        let (_, frozen) = account_and_frozen();
        let extracted = extract(&frozen).unwrap();
        assert_eq!(
            serde_json::Value::Object(extracted),
            json!({"reason": "audit", "kind": "frozen", "balance": 100, "currency": "EUR"})
        );
        assert_eq!(extract(None::<&Instance>).unwrap_err(), ErrorKind::WrongInstanceInvocation);
    }

    #[test]
    fn test_pick_skips_missing() {
        let (_, frozen) = account_and_frozen();
        let picked = pick(&frozen, &["balance", "missing"]).unwrap();
        assert_eq!(serde_json::Value::Object(picked), json!({"balance": 100}));
        assert_eq!(pick(None::<&Instance>, &["balance"]).unwrap_err(), ErrorKind::WrongInstanceInvocation);
    }

    #[test]
    fn test_merge_is_right_biased() {
        let (account, frozen) = account_and_frozen();
        let merged = merge([Some(&frozen), Some(&account)]).unwrap();
        assert_eq!(merged["kind"], json!("account"));
        assert_eq!(merged["reason"], json!("audit"));

        assert_eq!(merge([Some(&account), None]).unwrap_err(), ErrorKind::WrongInstanceInvocation);
        assert_eq!(merge(Vec::<Option<&Instance>>::new()).unwrap_err(), ErrorKind::WrongInstanceInvocation);
    }

    #[test]
    fn test_parse_field_order() {
        let (account, frozen) = account_and_frozen();
        let parsed = parse(&frozen);
        assert_eq!(parsed.name, "Frozen");
        assert_eq!(parsed.joint, frozen.chain());
        assert_eq!(parsed.parent.as_ref().unwrap().joint, account.chain());
        assert!(parsed.gaia.is_none());

        let value = serde_json::to_value(&parsed).unwrap();
        let keys: Vec<&String> = value.as_object().unwrap().keys().collect();
        assert_eq!(keys, ["name", "props", "self", "proto", "joint", "parent", "gaia"]);
    }

    #[test]
    fn test_collect_constructors() {
        let (account, frozen) = account_and_frozen();
        let collected = collect_constructors(&frozen).unwrap();
        let paths: Vec<&str> = collected.iter().map(|c| c.type_path.as_str()).collect();
        assert_eq!(paths, ["Account", "Account.Frozen"]);
        assert!(collected[0].initializer.ptr_eq(account.type_def().initializer()));
        assert_eq!(collect_constructors(None::<&Instance>).unwrap_err(), ErrorKind::WrongModificationPattern);
    }
}
