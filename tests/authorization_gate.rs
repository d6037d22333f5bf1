use campus_server::{
    auth::{
        Role,
        gate::{INSUFFICIENT_PRIVILEGES, Policy, RoleCache, meet_roles},
    },
    test_helpers::test_state,
};

#[tokio::test]
async fn meet_roles_resolves_roles_lazily_and_reuses_the_cache() {
    let state = test_state().await;
    let roles = state.dao.role();
    let user = state
        .dao
        .user()
        .create_user("gate@example.com", "gate", None)
        .await
        .expect("create user");
    roles.grant(user.id, Role::Teacher).await.expect("grant");

    let mut cache = RoleCache::new(user.id);

    let teacher_policy = Policy::any_of(vec![Role::Teacher]);
    assert_eq!(
        meet_roles(&teacher_policy, &mut cache, &roles).await.expect("gate"),
        ""
    );

    // later grants are invisible to this request: the cache was already
    // populated on first access
    roles.grant(user.id, Role::Admin).await.expect("grant");
    let admin_policy = Policy::any_of(vec![Role::Admin]);
    assert_eq!(
        meet_roles(&admin_policy, &mut cache, &roles).await.expect("gate"),
        INSUFFICIENT_PRIVILEGES
    );

    // a fresh request-scoped cache sees the new grant
    let mut fresh = RoleCache::new(user.id);
    assert_eq!(
        meet_roles(&admin_policy, &mut fresh, &roles).await.expect("gate"),
        ""
    );
}

#[tokio::test]
async fn preloaded_cache_skips_the_database() {
    let state = test_state().await;
    let roles = state.dao.role();

    // user 42 has no rows at all; the preloaded set is authoritative
    let mut cache = RoleCache::preloaded(42, vec![Role::Super]);
    let policy = Policy::any_of(vec![Role::Super]);
    assert_eq!(meet_roles(&policy, &mut cache, &roles).await.expect("gate"), "");
}

#[tokio::test]
async fn rank_comparisons_use_ordinals() {
    // "you may not grant a role >= your own highest role"
    let granter_highest = Role::Admin;
    assert!(Role::Teacher < granter_highest);
    assert!(granter_highest <= Role::Super);
    assert!(Role::Super.ordinal() > Role::Admin.ordinal());
}
