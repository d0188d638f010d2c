use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use proptest::prelude::*;
use tracegate_core::{
    ApiError, GuardDecision, GuardSettings, GuardState, Identity, IdentityResolver,
    MemoryBackend, NavigationGuard, NavigationIntent, RefreshCoordinator, RefreshEndpoint,
    RouteTable, SessionEvents, SessionStore, TokenPair, Verdict,
};

struct Unused;

#[async_trait]
impl IdentityResolver for Unused {
    async fn resolve_identity(&self) -> Result<Identity, ApiError> {
        Err(ApiError::AuthExpired)
    }
}

#[async_trait]
impl RefreshEndpoint for Unused {
    async fn refresh(&self, _refresh_token: &str) -> Result<TokenPair, ApiError> {
        Err(ApiError::AuthExpired)
    }
}

fn guard() -> NavigationGuard {
    let store = Arc::new(SessionStore::open(Box::new(MemoryBackend::new())).expect("store"));
    let events = SessionEvents::default();
    let coordinator = Arc::new(RefreshCoordinator::new(
        store.clone(),
        Arc::new(Unused),
        events.clone(),
    ));
    NavigationGuard::new(
        store,
        coordinator,
        Arc::new(Unused),
        events,
        RouteTable::builtin(),
        GuardSettings::default(),
    )
}

fn roles() -> impl Strategy<Value = BTreeSet<String>> {
    proptest::collection::btree_set("[A-D]", 0..4)
}

proptest! {
    #[test]
    fn access_granted_iff_roles_intersect(held in roles(), required in roles()) {
        let guard = guard();
        let identity = Identity::new("1", "p", held.clone());
        let intent = NavigationIntent::protected("/area").with_roles(required.clone());
        let verdict = guard.decide(GuardState::Authenticated, &intent, Some(&identity));

        let allowed = required.is_empty() || !held.is_disjoint(&required);
        prop_assert_eq!(verdict == Verdict::Decided(GuardDecision::Allow), allowed);
        prop_assert_eq!(identity.has_any_role(&required), !held.is_disjoint(&required));
    }

    #[test]
    fn anonymous_never_reaches_protected_routes(required in roles(), path in "/[a-z]{1,8}") {
        let guard = guard();
        let intent = NavigationIntent::protected(path.clone()).with_roles(required);
        let verdict = guard.decide(GuardState::Anonymous, &intent, None);
        match verdict {
            Verdict::Decided(GuardDecision::Redirect { to, return_to, .. }) => {
                prop_assert_eq!(to, "/login");
                prop_assert_eq!(return_to, Some(path));
            }
            other => prop_assert!(false, "unexpected verdict {:?}", other),
        }
    }
}
