//! Integration tests for the pipeline.
//!
//! A toy two-strategy chain over an in-memory catalog, followed by the
//! optional diversify and contextual stages.

use data_loader::{ItemId, UserId};
use pipeline::{
    ContextReranker, Diversifier, Draw, FallbackChain, FallbackReason, OpeningHours, OpeningHoursAdjuster,
    RequestContext, ScoredItem, Strategy, top_k,
};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::HashMap;

struct Personal(HashMap<UserId, Vec<ScoredItem>>);

impl Strategy<UserId> for Personal {
    fn name(&self) -> &str {
        "personal"
    }

    fn try_predict(&self, user: &UserId) -> Result<Vec<ScoredItem>, FallbackReason> {
        self.0
            .get(user)
            .cloned()
            .ok_or_else(|| FallbackReason::UnknownEntity(format!("user {}", user)))
    }
}

struct Popular(Vec<ScoredItem>);

impl Strategy<UserId> for Popular {
    fn name(&self) -> &str {
        "popular"
    }

    fn try_predict(&self, _user: &UserId) -> Result<Vec<ScoredItem>, FallbackReason> {
        Ok(self.0.clone())
    }
}

fn chain() -> FallbackChain<UserId> {
    let personal = HashMap::from([(
        1,
        vec![ScoredItem::new(10, 0.9), ScoredItem::new(11, 0.7), ScoredItem::new(12, 0.2)],
    )]);
    FallbackChain::new()
        .add_strategy(Personal(personal))
        .add_strategy(Popular(vec![ScoredItem::new(12, 4.8), ScoredItem::new(10, 4.1)]))
}

#[test]
fn known_user_served_by_first_strategy() {
    let outcome = chain().run(&1).unwrap();
    assert_eq!(outcome.strategy, "personal");
    let ids: Vec<ItemId> = top_k(outcome.items, 2).iter().map(|s| s.item_id).collect();
    assert_eq!(ids, vec![10, 11]);
}

#[test]
fn unknown_user_falls_back_to_popularity() {
    let outcome = chain().run(&99).unwrap();
    assert_eq!(outcome.strategy, "popular");
    assert!(matches!(outcome.skipped[0].1, FallbackReason::UnknownEntity(_)));
}

#[test]
fn context_reorders_closed_items_down() {
    let hours = HashMap::from([(10, OpeningHours::daily(8, 12))]);
    let reranker = ContextReranker::new().add_adjuster(OpeningHoursAdjuster::new(hours).with_closed_factor(0.1));

    let outcome = chain().run(&1).unwrap();
    let evening = RequestContext::new().with_time(19, 2);
    let ranked = reranker.rerank(outcome.items.clone(), &evening);
    assert_eq!(ranked[0].item_id, 11);

    // without a time signal the ranking is untouched
    let unchanged = reranker.rerank(outcome.items, &RequestContext::new());
    assert_eq!(unchanged[0].item_id, 10);
}

#[test]
fn diversify_after_chain() {
    let mut rng = StdRng::seed_from_u64(5);
    let catalog = [10, 11, 12, 13];

    // the coin comes first; only an exploiting request runs the chain
    assert_eq!(Diversifier::new(0.0).draw(&catalog, 2, &mut rng), Draw::Exploit);
    let outcome = chain().run(&1).unwrap();
    assert_eq!(top_k(outcome.items, 2).len(), 2);

    let Draw::Explore(items) = Diversifier::new(1.0).draw(&catalog, 2, &mut rng) else {
        panic!("rate 1.0 must explore");
    };
    assert!(items.iter().all(|s| catalog.contains(&s.item_id)));
}
