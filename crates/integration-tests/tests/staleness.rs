//! End-to-end staleness audit tests.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use hpp_integration_tests::TestContext;

#[tokio::test]
async fn test_never_calculated_recipe_is_stale() {
    let ctx = TestContext::new();
    let bakery = ctx.seed_bakery();

    let stale = ctx
        .engine
        .staleness()
        .check_stale_hpp(ctx.account, 7)
        .await
        .unwrap();

    assert_eq!(stale.len(), 1);
    assert_eq!(stale[0].recipe_id, bakery.roti);
    assert_eq!(stale[0].name, "Roti Manis");
    assert!(stale[0].last_calculated_at.is_none());
}

#[tokio::test]
async fn test_refresh_clears_staleness() {
    let ctx = TestContext::new();
    let bakery = ctx.seed_bakery();
    let donat = ctx.add_recipe_using("Donat", 5, bakery.flour);
    let archived = ctx.add_recipe_using("Bolu Lama", 8, bakery.flour);
    ctx.store.set_recipe_active(archived, false);

    let auditor = ctx.engine.staleness();
    let outcome = auditor.refresh_stale_hpp(ctx.account, 7).await.unwrap();
    assert_eq!(outcome.processed, 2);
    assert_eq!(outcome.failed, 0);

    assert!(auditor.check_stale_hpp(ctx.account, 7).await.unwrap().is_empty());

    let calculated: Vec<_> = ctx
        .store
        .calculations(ctx.account)
        .iter()
        .map(|c| c.recipe_id)
        .collect();
    assert!(calculated.contains(&bakery.roti));
    assert!(calculated.contains(&donat));
    assert!(!calculated.contains(&archived));
}
