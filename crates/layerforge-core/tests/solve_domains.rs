//! `Domains` bookkeeping and weighted-draw scenarios. Moved out of
//! `solve::mod`'s unit tests: see `compile_validation.rs` for why this
//! crate's own test helper crate can't be a dev-dependency of an in-`src`
//! `#[cfg(test)]` module.

use layerforge_core::compile::{compile, CompiledRequest};
use layerforge_core::solve::{draw_weighted, Domains};
use layerforge_testutil::{layer, normal_trait, request};
use rand::SeedableRng;
use rand::rngs::StdRng;

fn two_layer_request() -> CompiledRequest {
    compile(request(
        "domains",
        (8, 8),
        1,
        vec![
            layer(
                "A",
                0,
                vec![
                    normal_trait("A0", 1, (8, 8), [10, 0, 0, 255]),
                    normal_trait("A1", 5, (8, 8), [20, 0, 0, 255]),
                ],
            ),
            layer("B", 1, vec![normal_trait("B0", 3, (8, 8), [0, 10, 0, 255])]),
        ],
    ))
    .unwrap()
}

#[test]
fn test_domain_bookkeeping() {
    let compiled = two_layer_request();
    let mut domains = Domains::full(&compiled);

    assert_eq!(domains.live(0), 2);
    assert!(domains.remove(0, 1));
    assert!(!domains.remove(0, 1));
    assert_eq!(domains.live(0), 1);
    assert_eq!(domains.iter(0).collect::<Vec<_>>(), vec![0]);

    domains.restrict_to(1, 0);
    assert_eq!(domains.live(1), 1);
    assert!(domains.contains(1, 0));
}

#[test]
fn test_draw_weighted_respects_pruned_weights() {
    let compiled = two_layer_request();
    let mut rng = StdRng::seed_from_u64(7);

    // Full pool: weight 5 trait should dominate a 1-weight sibling.
    let pool = vec![0, 1];
    let mut hits = [0u32; 2];
    for _ in 0..600 {
        let pos = draw_weighted(&compiled, 0, &pool, &mut rng);
        hits[pool[pos]] += 1;
    }
    assert!(hits[1] > hits[0] * 2, "weight 5 should outdraw weight 1: {hits:?}");

    // Pruned pool: the only survivor is always drawn.
    let pool = vec![0];
    for _ in 0..10 {
        assert_eq!(draw_weighted(&compiled, 0, &pool, &mut rng), 0);
    }
}
