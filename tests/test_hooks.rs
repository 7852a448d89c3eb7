use progeny::{ConfigOverrides, Error, ErrorKind, HookKind, Registry, TypeSpec};
use serde_json::{json, Value};
use std::sync::Arc;
use parking_lot::Mutex;

type Journal = Arc<Mutex<Vec<String>>>;

fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

fn note(journal: &Journal, entry: impl Into<String>) {
    journal.lock().push(entry.into());
}

#[test]
fn test_post_creation_hooks_run_in_registration_order() {
    let registry = Registry::new();
    let account = registry.define(TypeSpec::new("Account")).unwrap();
    let seen = journal();

    for label in ["A", "B"] {
        let seen = seen.clone();
        account.register_hook(HookKind::PostCreation, move |_| {
            note(&seen, label);
            Ok(())
        });
    }

    account.construct(vec![]).unwrap();
    account.construct(vec![]).unwrap();
    assert_eq!(*seen.lock(), ["A", "B", "A", "B"]);
    assert_eq!(account.hooks().hook_count(HookKind::PostCreation), 2);
}

#[test]
fn test_interceptors_run_namespace_then_collection_then_type() {
    let registry = Registry::new();
    let namespace = registry.create_namespace("audit").unwrap();
    let types = registry
        .create_collection(Some(&namespace), Some("audited"), ConfigOverrides::default())
        .unwrap();
    let seen = journal();

    let ledger = {
        let seen = seen.clone();
        types
            .define(TypeSpec::new("Ledger").init(move |_| {
                note(&seen, "init");
                Ok(())
            }))
            .unwrap()
    };

    for kind in [HookKind::PreCreation, HookKind::PostCreation] {
        let (ns, col, ty) = (seen.clone(), seen.clone(), seen.clone());
        namespace.register_hook(kind, move |_| {
            note(&ns, format!("{}:namespace", kind));
            Ok(())
        });
        types.register_hook(kind, move |_| {
            note(&col, format!("{}:collection", kind));
            Ok(())
        });
        ledger.register_hook(kind, move |_| {
            note(&ty, format!("{}:type", kind));
            Ok(())
        });
    }
    let (ns, col, ty) = (seen.clone(), seen.clone(), seen.clone());
    ledger.register_flow_checker(move |_| {
        note(&ty, "flow:type");
        Ok(())
    });
    types.register_flow_checker(move |_| {
        note(&col, "flow:collection");
        Ok(())
    });
    namespace.register_flow_checker(move |_| {
        note(&ns, "flow:namespace");
        Ok(())
    });

    ledger.construct(vec![]).unwrap().into_ready().unwrap();
    assert_eq!(
        *seen.lock(),
        [
            "flow:namespace",
            "flow:collection",
            "flow:type",
            "preCreation:namespace",
            "preCreation:collection",
            "preCreation:type",
            "init",
            "postCreation:namespace",
            "postCreation:collection",
            "postCreation:type",
        ]
    );
}

#[test]
fn test_hooks_stay_within_their_namespace() {
    let registry = Registry::new();
    let seen = journal();
    {
        let seen = seen.clone();
        registry
            .default_namespace()
            .register_hook(HookKind::PostCreation, move |opts| {
                note(&seen, opts.type_path);
                Ok(())
            });
    }

    let elsewhere = registry.create_namespace("elsewhere").unwrap();
    let remote = elsewhere.default_collection().define(TypeSpec::new("Remote")).unwrap();
    let local = registry.define(TypeSpec::new("Local")).unwrap();

    remote.construct(vec![]).unwrap();
    local.construct(vec![]).unwrap();
    assert_eq!(*seen.lock(), ["Local"]);
}

#[test]
fn test_hook_options() {
    let registry = Registry::new();
    let account = registry
        .define(
            TypeSpec::new("Account")
                .template(json!({"kind": "account"}))
                .init(|ctx| {
                    ctx.set("balance", 100);
                    Ok(())
                }),
        )
        .unwrap();
    let frozen = account
        .define(TypeSpec::new("Frozen").init(|ctx| {
            ctx.set("frozen", true);
            Ok(())
        }))
        .unwrap();

    let pre = Arc::new(Mutex::new(Vec::new()));
    let post = Arc::new(Mutex::new(Vec::new()));
    {
        let pre = pre.clone();
        frozen.register_hook(HookKind::PreCreation, move |opts| {
            pre.lock().push((
                opts.type_name.to_string(),
                opts.context.is_empty(),
                opts.existent_instance.map(|i| i.id()),
                opts.inherited_instance.is_some(),
            ));
            Ok(())
        });
    }
    {
        let post = post.clone();
        frozen.register_hook(HookKind::PostCreation, move |opts| {
            post.lock().push((
                opts.type_path.to_string(),
                opts.args.to_vec(),
                Value::Object(opts.context.clone()),
                opts.existent_instance.map(|i| i.id()),
                opts.inherited_instance.map(|i| i.id()),
            ));
            Ok(())
        });
    }
    {
        account.register_hook(HookKind::PostCreation, |opts| {
            assert_eq!(opts.proto.get("kind"), Some(&json!("account")));
            assert!(opts.existent_instance.is_none());
            Ok(())
        });
    }

    let a = account.construct(vec![]).unwrap().into_ready().unwrap();
    let f = a.invoke("Frozen", vec![json!("why")]).unwrap().into_ready().unwrap();

    assert_eq!(*pre.lock(), [("Frozen".to_string(), true, Some(a.id()), false)]);
    assert_eq!(
        *post.lock(),
        [(
            "Account.Frozen".to_string(),
            vec![json!("why")],
            json!({"frozen": true}),
            Some(a.id()),
            Some(f.id()),
        )]
    );
}

#[test]
fn test_ancestor_type_hooks_do_not_fire_for_subtypes() {
    let registry = Registry::new();
    let account = registry.define(TypeSpec::new("Account")).unwrap();
    account.define(TypeSpec::new("Frozen")).unwrap();
    let seen = journal();
    {
        let seen = seen.clone();
        account.register_hook(HookKind::PostCreation, move |opts| {
            note(&seen, opts.type_path);
            Ok(())
        });
    }

    let a = account.construct(vec![]).unwrap().into_ready().unwrap();
    a.invoke("Frozen", vec![]).unwrap();
    assert_eq!(*seen.lock(), ["Account"]);
}

#[test]
fn test_failing_flow_checker_aborts_construction() {
    let registry = Registry::new();
    let seen = journal();
    let guarded = {
        let seen = seen.clone();
        registry
            .define(TypeSpec::new("Guarded").init(move |_| {
                note(&seen, "init");
                Ok(())
            }))
            .unwrap()
    };
    guarded.register_flow_checker(|opts| match opts.args.first() {
        Some(Value::String(token)) if token == "let me in" => Ok(()),
        _ => Err(Error::raised("access denied")),
    });

    let err = guarded.construct(vec![json!("wrong")]).unwrap_err();
    assert_eq!(err, ErrorKind::Raised);
    assert_eq!(err.message(), "construction aborted : access denied");
    assert_eq!(err.construction().unwrap().type_path, "Guarded");
    assert!(seen.lock().is_empty());

    guarded.construct(vec![json!("let me in")]).unwrap();
    assert_eq!(*seen.lock(), ["init"]);
}

#[test]
fn test_failing_hook_stops_later_hooks() {
    let registry = Registry::new();
    let account = registry.define(TypeSpec::new("Account")).unwrap();
    let seen = journal();

    account.register_hook(HookKind::PostCreation, |_| Err(Error::raised("first hook failed")));
    {
        let seen = seen.clone();
        account.register_hook(HookKind::PostCreation, move |_| {
            note(&seen, "second");
            Ok(())
        });
    }

    let err = account.construct(vec![]).unwrap_err();
    assert_eq!(err, ErrorKind::Raised);
    assert!(seen.lock().is_empty());
}

#[test]
fn test_hook_kind_names() {
    assert_eq!("preCreation".parse::<HookKind>().unwrap(), HookKind::PreCreation);
    assert_eq!("postCreation".parse::<HookKind>().unwrap(), HookKind::PostCreation);
    assert_eq!(HookKind::PostCreation.to_string(), "postCreation");

    let err = "duringCreation".parse::<HookKind>().unwrap_err();
    assert_eq!(err, ErrorKind::WrongHookType);
}

#[test]
fn test_aborted_construction_keeps_fork_origin() {
    let registry = Registry::new();
    let account = registry.define(TypeSpec::new("Account")).unwrap();
    let frozen = account
        .define(TypeSpec::new("Frozen").init(|ctx| {
            let reason = ctx.arg(0).cloned().unwrap_or(Value::Null);
            ctx.set("reason", reason);
            Ok(())
        }))
        .unwrap();
    frozen.register_hook(HookKind::PostCreation, |opts| match opts.args.first() {
        Some(Value::String(reason)) if reason == "reject" => Err(Error::raised("rejected by audit")),
        _ => Ok(()),
    });

    let a = account.construct(vec![]).unwrap().into_ready().unwrap();
    let b = account.construct(vec![]).unwrap().into_ready().unwrap();
    let f = a.invoke("Frozen", vec![json!("ok")]).unwrap().into_ready().unwrap();

    let err = b.invoke("Frozen", vec![json!("reject")]).unwrap_err();
    assert_eq!(err, ErrorKind::Raised);

    let forked = f.fork(vec![json!("again")]).unwrap().into_ready().unwrap();
    assert_eq!(forked.get("reason"), Some(json!("again")));
    assert!(forked.descends_from(&a));
}
