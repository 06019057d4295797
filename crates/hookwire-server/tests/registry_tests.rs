//! Registry and middleware chain tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use hookwire_protocol::{QualifiedAction, Request, Response};
use hookwire_server::*;
use hookwire_session::{MemorySessionStore, Session, SessionConfig};
use http::Method;
use parking_lot::Mutex;

/// Controller with a fixed manifest and no behaviour.
macro_rules! stub_controller {
    ($name:ident, $manifest:expr) => {
        #[derive(Debug, Clone, Default)]
        struct $name;

        impl Controller for $name {
            fn manifest() -> ActionManifest {
                $manifest
            }

            async fn call(&mut self, _action: &str, _cx: &mut ActionContext) -> ActionOutput {
                Ok(None)
            }
        }
    };
}

/// Middleware recording its name into a shared log.
struct Check {
    name: &'static str,
    verdict: bool,
    log: Arc<Mutex<Vec<&'static str>>>,
    except: Vec<String>,
}

impl Middleware for Check {
    async fn exec(&mut self, _request: &Request, _response: &Response, _session: &mut Session) -> bool {
        self.log.lock().push(self.name);
        self.verdict
    }

    fn except(&self) -> &[String] {
        &self.except
    }

    fn error(&self) -> String {
        if self.verdict {
            String::new()
        } else {
            format!("{} said no", self.name)
        }
    }
}

fn resolver_with(names: &[&'static str]) -> MiddlewareResolver {
    let mut resolver = MiddlewareResolver::new();
    for &name in names {
        resolver.register(name, move || Check {
            name,
            verdict: true,
            log: Arc::default(),
            except: Vec::new(),
        });
    }
    resolver
}

// ─────────────────────────────────────────────────────────────────────────────
// Manifest
// ─────────────────────────────────────────────────────────────────────────────

mod manifest {
    use super::*;

    #[test]
    fn except_qualifies_bare_names() {
        let manifest = ActionManifest::new("User")
            .action("login")
            .except("login")
            .except("Admin::index");
        assert_eq!(manifest.middleware_except(), ["User::login", "Admin::index"]);
    }

    #[test]
    fn builder_keeps_declaration_order() {
        let manifest = ActionManifest::new("Shop")
            .actions(["list", "show"])
            .action("buy")
            .middleware("Auth")
            .middleware("RateLimit");
        assert_eq!(manifest.type_name(), "Shop");
        assert_eq!(manifest.declared_actions(), ["list", "show", "buy"]);
        assert_eq!(manifest.middleware_ids(), ["Auth", "RateLimit"]);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Controller Type Build
// ─────────────────────────────────────────────────────────────────────────────

mod build {
    use super::*;

    stub_controller!(
        Shop,
        ActionManifest::new("Shop")
            .actions(["list", "show", "clone", "on_exception", "__secret"])
            .middleware("Auth")
            .except("list")
    );
    stub_controller!(Home, ActionManifest::new("Home").actions(["index", "about"]));
    stub_controller!(Nameless, ActionManifest::new(""));
    stub_controller!(Spaced, ActionManifest::new("Shop Front"));
    stub_controller!(BadAction, ActionManifest::new("Bad").action("9lives"));
    stub_controller!(Twice, ActionManifest::new("Twice").actions(["go", "go"]));
    stub_controller!(Unknown, ActionManifest::new("Unknown").middleware("Nope"));

    #[test]
    fn allowed_set_excludes_reserved_names() {
        let ty = ControllerType::build(Shop, &resolver_with(&["Auth"])).unwrap();
        assert_eq!(ty.name(), "Shop");
        assert_eq!(ty.allowed_actions(), ["list", "show"]);
        assert!(ty.allows("show"));
        assert!(!ty.allows("clone"));
        assert!(!ty.allows("on_exception"));
        assert!(!ty.allows("__secret"));
        assert_eq!(ty.middleware(), ["Auth"]);
        assert_eq!(ty.middleware_except(), ["Shop::list"]);
        assert_eq!(ty.qualify("show"), QualifiedAction::new("Shop", "show"));
        assert!(!ty.has_index());
    }

    #[test]
    fn index_action_is_detected() {
        let ty = ControllerType::build(Home, &MiddlewareResolver::new()).unwrap();
        assert!(ty.has_index());
        assert!(ty.allows(INDEX_ACTION));
    }

    #[test]
    fn reserved_list_covers_lifecycle_hooks() {
        for hook in ["manifest", "call", "action_not_found", "after_action", "on_exception"] {
            assert!(RESERVED_ACTIONS.contains(&hook), "{hook} should be reserved");
        }
    }

    #[test]
    fn invalid_manifests_are_rejected() {
        let resolver = resolver_with(&[]);
        assert_eq!(
            ControllerType::build(Nameless, &resolver).unwrap_err(),
            RegistryError::EmptyTypeName
        );
        assert_eq!(
            ControllerType::build(Spaced, &resolver).unwrap_err(),
            RegistryError::InvalidTypeName("Shop Front".into())
        );
        assert_eq!(
            ControllerType::build(BadAction, &resolver).unwrap_err(),
            RegistryError::InvalidActionName {
                type_name: "Bad".into(),
                action: "9lives".into()
            }
        );
        assert_eq!(
            ControllerType::build(Twice, &resolver).unwrap_err(),
            RegistryError::DuplicateAction {
                type_name: "Twice".into(),
                action: "go".into()
            }
        );
        assert_eq!(
            ControllerType::build(Unknown, &resolver).unwrap_err(),
            RegistryError::UnknownMiddleware {
                type_name: "Unknown".into(),
                middleware: "Nope".into()
            }
        );
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ActionRegistry
// ─────────────────────────────────────────────────────────────────────────────

mod registry {
    use super::*;

    stub_controller!(Blog, ActionManifest::new("Blog").actions(["index", "post"]));
    stub_controller!(Wiki, ActionManifest::new("Wiki").action("page"));
    stub_controller!(Broken, ActionManifest::new("").action("x"));
    stub_controller!(BlogAgain, ActionManifest::new("Blog").action("index"));

    #[test]
    fn builds_once_per_type() {
        let registry = ActionRegistry::new();
        let resolver = resolver_with(&[]);
        let prototypes = AtomicUsize::new(0);

        let first = registry
            .get_or_build(
                || {
                    prototypes.fetch_add(1, Ordering::SeqCst);
                    Blog
                },
                &resolver,
            )
            .unwrap();
        let second = registry
            .get_or_build(
                || {
                    prototypes.fetch_add(1, Ordering::SeqCst);
                    Blog
                },
                &resolver,
            )
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(prototypes.load(Ordering::SeqCst), 1);
        assert_eq!(registry.build_count(), 1);

        registry.get_or_build(|| Wiki, &resolver).unwrap();
        assert_eq!(registry.build_count(), 2);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn concurrent_first_use_builds_once() {
        let registry = ActionRegistry::new();
        let resolver = resolver_with(&[]);

        let types: Vec<_> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..16)
                .map(|_| scope.spawn(|| registry.get_or_build(|| Blog, &resolver).unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(registry.build_count(), 1);
        assert!(types.iter().all(|ty| Arc::ptr_eq(ty, &types[0])));
        assert_eq!(types[0].allowed_actions(), ["index", "post"]);
    }

    #[test]
    fn failed_build_is_not_cached() {
        let registry = ActionRegistry::new();
        let resolver = resolver_with(&[]);

        assert!(registry.get_or_build(|| Broken, &resolver).is_err());
        assert!(registry.get::<Broken>().is_none());
        assert!(registry.is_empty());
        assert_eq!(registry.build_count(), 0);
    }

    #[test]
    fn dispatcher_rejects_duplicate_registration() {
        let mut dispatcher = Dispatcher::with_memory_store(DispatcherConfig::default(), resolver_with(&[]));
        dispatcher.register(Blog).unwrap();
        dispatcher.register(Wiki).unwrap();

        assert_eq!(
            dispatcher.register(Blog).unwrap_err(),
            RegistryError::DuplicateController("Blog".into())
        );
        assert_eq!(
            dispatcher.register(BlogAgain).unwrap_err(),
            RegistryError::DuplicateController("Blog".into())
        );
        assert_eq!(dispatcher.controllers(), ["Blog", "Wiki"]);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Middleware Chain
// ─────────────────────────────────────────────────────────────────────────────

mod chain {
    use super::*;

    struct Fixture {
        request: Request,
        response: Response,
        session: Session,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    fn fixture() -> Fixture {
        let request = Request::new(Method::GET, "/User/profile".parse().unwrap());
        let response = Response::new();
        let session = Session::new(
            Arc::new(MemorySessionStore::new()),
            Arc::new(SessionConfig::default()),
            &request,
            response.clone(),
        );
        Fixture {
            request,
            response,
            session,
            log: Arc::default(),
        }
    }

    fn unit(fx: &Fixture, name: &'static str, verdict: bool, except: &[&str]) -> MiddlewareUnit {
        MiddlewareUnit::new(
            name,
            Check {
                name,
                verdict,
                log: fx.log.clone(),
                except: except.iter().map(|s| s.to_string()).collect(),
            },
        )
    }

    async fn run(fx: &mut Fixture, units: &mut [MiddlewareUnit], global_except: &[String], action: &str) -> ChainOutcome {
        let action = QualifiedAction::new("User", action);
        run_chain(units, global_except, &action, &fx.request, &fx.response, &mut fx.session).await
    }

    #[tokio::test]
    async fn all_pass() {
        let mut fx = fixture();
        let mut units = vec![unit(&fx, "A", true, &[]), unit(&fx, "B", true, &[])];
        assert_eq!(run(&mut fx, &mut units, &[], "profile").await, ChainOutcome::Passed);
        assert_eq!(*fx.log.lock(), ["A", "B"]);
    }

    #[tokio::test]
    async fn empty_chain_passes() {
        let mut fx = fixture();
        let outcome = run(&mut fx, &mut [], &[], "profile").await;
        assert!(outcome.is_success());
    }

    #[tokio::test]
    async fn stops_at_first_refusal() {
        let mut fx = fixture();
        let mut units = vec![
            unit(&fx, "A", true, &[]),
            unit(&fx, "B", false, &[]),
            unit(&fx, "C", true, &[]),
        ];
        let outcome = run(&mut fx, &mut units, &[], "profile").await;

        assert_eq!(
            outcome,
            ChainOutcome::Rejected(MiddlewareRejection {
                middleware: "B".into(),
                reason: "B said no".into(),
            })
        );
        assert!(!outcome.is_success());
        assert_eq!(*fx.log.lock(), ["A", "B"]);
    }

    #[tokio::test]
    async fn global_except_bypasses_every_unit() {
        let mut fx = fixture();
        let mut units = vec![unit(&fx, "A", false, &[])];
        let outcome = run(&mut fx, &mut units, &["User::profile".into()], "profile").await;

        assert_eq!(outcome, ChainOutcome::Bypassed);
        assert!(outcome.is_success());
        assert!(fx.log.lock().is_empty());
    }

    #[tokio::test]
    async fn global_except_matches_qualified_name_only() {
        let mut fx = fixture();
        let mut units = vec![unit(&fx, "A", true, &[])];
        let global = ["profile".to_string(), "Admin::profile".to_string()];
        assert_eq!(run(&mut fx, &mut units, &global, "profile").await, ChainOutcome::Passed);
        assert_eq!(*fx.log.lock(), ["A"]);
    }

    #[tokio::test]
    async fn unit_except_skips_that_unit() {
        let mut fx = fixture();
        let mut units = vec![
            unit(&fx, "A", false, &["User::profile"]),
            unit(&fx, "B", true, &[]),
        ];
        assert_eq!(run(&mut fx, &mut units, &[], "profile").await, ChainOutcome::Passed);
        assert_eq!(*fx.log.lock(), ["B"]);

        fx.log.lock().clear();
        let outcome = run(&mut fx, &mut units, &[], "index").await;
        assert!(matches!(outcome, ChainOutcome::Rejected(ref r) if r.middleware == "A"));
    }

    #[test]
    fn rejection_envelope_shape() {
        let rejection = MiddlewareRejection {
            middleware: "Auth".into(),
            reason: "token expired".into(),
        };
        assert_eq!(
            rejection.envelope().to_json(),
            r#"{"code":200,"result":"middleware check failed","msg":"middleware Auth: check failed, reason: token expired"}"#
        );
    }

    #[test]
    fn resolver_produces_fresh_units() {
        let resolver = resolver_with(&["Auth", "Audit"]);
        assert_eq!(resolver.names(), ["Audit", "Auth"]);
        assert!(resolver.contains("Auth"));
        assert!(resolver.resolve("Missing").is_none());

        let units = resolver.resolve_all(&["Audit".into(), "Auth".into()]).unwrap();
        let names: Vec<_> = units.iter().map(MiddlewareUnit::name).collect();
        assert_eq!(names, ["Audit", "Auth"]);

        match resolver.resolve_all(&["Auth".into(), "Gone".into()]) {
            Err(ActionFault::UnresolvedMiddleware(name)) => assert_eq!(name, "Gone"),
            _ => panic!("expected unresolved middleware"),
        }
    }
}
