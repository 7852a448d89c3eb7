use progeny::infrastructure::metrics::counters;
use progeny::{Construction, Error, ErrorKind, HookKind, Initializer, Registry, TypeDef, TypeSpec};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Initializer that copies the first argument's fields after a yield.
fn deferred_assign() -> Initializer {
    Initializer::future(|mut this, args| async move {
        tokio::task::yield_now().await;
        if let Some(Value::Object(fields)) = args.first() {
            this.extend(fields.clone());
        }
        Ok(Some(Value::Object(this)))
    })
}

fn assign() -> Initializer {
    Initializer::new(|ctx| {
        if let Some(Value::Object(fields)) = ctx.arg(0).cloned() {
            ctx.assign(fields);
        }
        Ok(())
    })
}

fn loader(registry: &Registry) -> TypeDef {
    let loader = registry
        .define(TypeSpec::new("Loader").initializer(Initializer::future(|mut this, args| async move {
            tokio::task::yield_now().await;
            this.insert("data".into(), args.first().cloned().unwrap_or(Value::Null));
            Ok(Some(Value::Object(this)))
        })))
        .unwrap();
    loader
        .define(TypeSpec::new("Child").init(|ctx| {
            let seen = ctx.get("data").unwrap_or(Value::Null);
            ctx.set("seen", seen);
            Ok(())
        }))
        .unwrap();
    loader
}

#[tokio::test]
async fn test_pending_instance_is_usable_before_settling() {
    let registry = Registry::new();
    let loader = loader(&registry);

    let construction = loader.construct(vec![json!("tada")]).unwrap();
    assert!(construction.is_pending());
    assert!(construction.is_instance_of(&loader));
    let instance = construction.instance().clone();
    assert!(instance.is_pending());
    assert_eq!(instance.get("data"), None);

    let child = construction.invoke("Child", vec![]).unwrap();
    assert!(child.is_pending());
    assert!(child.is_instance_of(&loader));
    assert!(construction.clone().into_ready().is_err());

    let settled = construction.settle().await.unwrap();
    assert_eq!(settled, instance);
    assert!(!settled.is_pending());
    assert_eq!(settled.get("data"), Some(json!("tada")));

    let child = child.settle().await.unwrap();
    assert_eq!(child.get("seen"), Some(json!("tada")));
    assert!(child.descends_from(&settled));
    assert_eq!(registry.metrics().get_counter(counters::ASYNC_CONSTRUCTIONS), 1);
}

#[tokio::test]
async fn test_pending_handle_is_awaitable() {
    let registry = Registry::new();
    let loader = loader(&registry);

    let pending = match loader.construct(vec![json!(7)]).unwrap() {
        Construction::Pending(pending) => pending,
        Construction::Ready(_) => panic!("deferred initializer settled eagerly"),
    };
    assert!(!pending.is_settled());
    let instance = pending.clone().await.unwrap();
    assert!(pending.is_settled());
    assert_eq!(instance.get("data"), Some(json!(7)));

    // settled handles hand out the same instance again
    assert_eq!(pending.await.unwrap(), instance);
}

#[tokio::test]
async fn test_queued_constructions_run_in_request_order() {
    let registry = Registry::new();
    let loader = loader(&registry);
    let order = Arc::new(Mutex::new(Vec::new()));
    for step in ["First", "Second", "Third"] {
        let order = order.clone();
        loader
            .define(TypeSpec::new(step).init(move |ctx| {
                order.lock().push(ctx.type_path().to_string());
                Ok(())
            }))
            .unwrap();
    }

    let construction = loader.construct(vec![]).unwrap();
    let third = construction.invoke("Third", vec![]).unwrap();
    let first = construction.invoke("First", vec![]).unwrap();
    let second = construction.invoke("Second", vec![]).unwrap();
    assert!(order.lock().is_empty());

    construction.settle().await.unwrap();
    assert_eq!(*order.lock(), ["Loader.Third", "Loader.First", "Loader.Second"]);

    for queued in [first, second, third] {
        assert!(!queued.settle().await.unwrap().is_pending());
    }
}

#[tokio::test]
async fn test_post_creation_hooks_wait_for_settlement() {
    let registry = Registry::new();
    let loader = loader(&registry);
    let calls = Arc::new(AtomicUsize::new(0));
    {
        let calls = calls.clone();
        loader.register_hook(HookKind::PostCreation, move |opts| {
            assert_eq!(opts.context.get("data"), Some(&json!("ready")));
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
    }

    let construction = loader.construct(vec![json!("ready")]).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    construction.settle().await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_rejection_reaches_queued_work() {
    let registry = Registry::new();
    let failing = registry
        .define(TypeSpec::new("Failing").initializer(Initializer::future(|_, _| async {
            tokio::task::yield_now().await;
            Err(Error::raised("remote refused"))
        })))
        .unwrap();
    let ran = Arc::new(AtomicUsize::new(0));
    {
        let ran = ran.clone();
        failing
            .define(TypeSpec::new("After").init(move |_| {
                ran.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }))
            .unwrap();
    }

    let construction = failing.construct(vec![json!(1)]).unwrap();
    let after = construction.invoke("After", vec![]).unwrap();

    let err = construction.settle().await.unwrap_err();
    assert_eq!(err, ErrorKind::Raised);
    assert_eq!(err.construction().unwrap().type_path, "Failing");

    let err = after.settle().await.unwrap_err();
    assert_eq!(err, ErrorKind::Raised);
    assert_eq!(ran.load(Ordering::SeqCst), 0);
    assert_eq!(registry.metrics().get_counter(counters::FAILED_CONSTRUCTIONS), 1);
}

#[tokio::test]
async fn test_clone_and_fork_of_pending_instances() {
    let registry = Registry::new();
    let loader = loader(&registry);

    let construction = loader.construct(vec![json!("tada")]).unwrap();
    let clone = construction.clone_instance();
    let fork = construction.fork(vec![json!("dada")]).unwrap();
    assert!(clone.is_pending());
    assert!(fork.is_pending());

    let original = construction.settle().await.unwrap();
    let clone = clone.settle().await.unwrap();
    let fork = fork.settle().await.unwrap();

    assert_ne!(clone, original);
    assert_eq!(clone.chain(), original.chain());
    assert_eq!(clone.get("data"), Some(json!("tada")));
    assert_eq!(fork.get("data"), Some(json!("dada")));
    assert_ne!(fork.chain(), original.chain());
    assert!(fork.is_instance_of(&loader));
}

#[tokio::test]
async fn test_mixed_chain_settles_in_order() {
    let registry = Registry::new();
    let first = registry
        .define(TypeSpec::new("AsyncChain1st").initializer(deferred_assign()))
        .unwrap();
    let second = first
        .define(TypeSpec::new("AsyncChain2nd").initializer(deferred_assign()))
        .unwrap();
    let sync = second
        .define(TypeSpec::new("Async2Sync2nd").initializer(assign()))
        .unwrap();
    let third = sync
        .define(TypeSpec::new("AsyncChain3rd").initializer(deferred_assign()))
        .unwrap();

    let level1 = first.construct(vec![json!({"one": 1})]).unwrap();
    let level2 = level1.invoke("AsyncChain2nd", vec![json!({"two": 2})]).unwrap();
    let level3 = level2.invoke("Async2Sync2nd", vec![json!({"three": 3})]).unwrap();
    let level4 = level3.invoke("AsyncChain3rd", vec![json!({"four": 4})]).unwrap();

    let last = level4.settle().await.unwrap();
    assert_eq!(last.get("one"), Some(json!(1)));
    assert_eq!(last.get("two"), Some(json!(2)));
    assert_eq!(last.get("three"), Some(json!(3)));
    assert_eq!(last.get("four"), Some(json!(4)));
    assert_eq!(Value::Object(last.snapshot()), json!({"four": 4}));
    for def in [&first, &second, &sync, &third] {
        assert!(last.is_instance_of(def));
    }
    assert!(!last.is_pending());
}

#[tokio::test]
async fn test_pending_instance_invoked_directly() {
    let registry = Registry::new();
    let loader = loader(&registry);

    let construction = loader.construct(vec![json!("later")]).unwrap();
    let shell = construction.instance().clone();
    // constructing below an unsettled instance runs right away
    let child = shell.invoke("Child", vec![]).unwrap().into_ready().unwrap();
    assert_eq!(child.get("seen"), Some(Value::Null));

    construction.settle().await.unwrap();
    assert_eq!(child.get("data"), Some(json!("later")));
}

#[tokio::test]
async fn test_rejected_construction_keeps_fork_origin() {
    let registry = Registry::new();
    let account = registry.define(TypeSpec::new("Account")).unwrap();
    account
        .define(TypeSpec::new("Remote").initializer(Initializer::future(|mut this, args| async move {
            tokio::task::yield_now().await;
            match args.first() {
                Some(Value::String(reason)) if reason == "reject" => Err(Error::raised("remote refused")),
                other => {
                    this.insert("reason".into(), other.cloned().unwrap_or(Value::Null));
                    Ok(Some(Value::Object(this)))
                }
            }
        })))
        .unwrap();

    let a = account.construct(vec![]).unwrap().into_ready().unwrap();
    let b = account.construct(vec![]).unwrap().into_ready().unwrap();
    let good = a.invoke("Remote", vec![json!("ok")]).unwrap().settle().await.unwrap();

    let rejected = b.invoke("Remote", vec![json!("reject")]).unwrap();
    assert!(rejected.is_pending());
    assert_eq!(rejected.settle().await.unwrap_err(), ErrorKind::Raised);

    let forked = good.fork(vec![json!("again")]).unwrap().settle().await.unwrap();
    assert_eq!(forked.get("reason"), Some(json!("again")));
    assert!(forked.descends_from(&a));
}

#[tokio::test]
async fn test_writes_while_pending_survive_settlement() {
    let registry = Registry::new();
    let loader = loader(&registry);

    let construction = loader.construct(vec![json!("tada")]).unwrap();
    construction.instance().set("note", "written while pending");

    let settled = construction.settle().await.unwrap();
    assert_eq!(settled.get("note"), Some(json!("written while pending")));
    assert_eq!(settled.get("data"), Some(json!("tada")));
}
