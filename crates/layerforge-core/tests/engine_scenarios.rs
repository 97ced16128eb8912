//! End-to-end scenarios against the public engine API: happy path, ruler
//! rules, strict pairs, decode degradation, budgets, cancellation and
//! determinism.

use std::collections::HashSet;

use layerforge_core::engine::{CancelReason, Event, GeneratedItem};
use layerforge_core::error::ForgeError;
use layerforge_core::rarity::Summary;
use layerforge_core::request::{CombinationId, GenerationRequest, LayerCombination, RulerRule};
use layerforge_testutil::{layer, normal_trait, request, ruler_trait, swatch_layer, trait_id};

const RED: [u8; 4] = [200, 40, 40, 255];
const GREEN: [u8; 4] = [40, 200, 40, 255];
const BLUE: [u8; 4] = [40, 40, 200, 255];
const GOLD: [u8; 4] = [220, 180, 40, 255];

fn run_to_completion(req: GenerationRequest) -> (Vec<GeneratedItem>, Summary) {
    let run = layerforge_core::run(req).expect("request should compile");
    let mut items = Vec::new();
    let mut summary = None;
    for event in run {
        match event {
            Event::ItemReady(item) => items.push(item),
            Event::Complete(s) => summary = Some(*s),
            Event::Error(err) => panic!("unexpected terminal error: {err}"),
            Event::Cancelled { .. } => panic!("unexpected cancellation"),
            Event::Progress { .. } | Event::Warning { .. } => {}
        }
    }
    (items, summary.expect("stream should end with Complete"))
}

fn attribute_key(item: &GeneratedItem) -> Vec<(String, String)> {
    item.attributes
        .iter()
        .map(|a| (a.trait_type.clone(), a.value.clone()))
        .collect()
}

#[test]
fn s1_happy_path_exhausts_all_combinations() {
    let req = request(
        "s1",
        (8, 8),
        4,
        vec![
            layer(
                "Background",
                0,
                vec![normal_trait("Forest", 3, (8, 8), RED), normal_trait("City", 3, (8, 8), GREEN)],
            ),
            layer(
                "Body",
                1,
                vec![normal_trait("Robot", 3, (8, 8), BLUE), normal_trait("Knight", 3, (8, 8), GOLD)],
            ),
        ],
    );

    let (items, summary) = run_to_completion(req);
    assert_eq!(items.len(), 4);

    // Exactly the four distinct combinations.
    let combos: HashSet<_> = items.iter().map(attribute_key).collect();
    assert_eq!(combos.len(), 4);

    // Ranks form 1..=4 and every trait landed at exactly 50%.
    let mut ranks: Vec<u32> = summary.items.iter().map(|r| r.rank).collect();
    ranks.sort_unstable();
    assert_eq!(ranks, vec![1, 2, 3, 4]);
    for freq in &summary.trait_frequencies {
        assert!((freq.pct - 50.0).abs() < 1e-9, "{freq:?}");
    }
}

#[test]
fn s2_ruler_forbid_never_pairs() {
    let body = layer(
        "Body",
        1,
        vec![normal_trait("Robot", 3, (8, 8), BLUE), normal_trait("Knight", 3, (8, 8), GOLD)],
    );
    let robot = trait_id(&body, "Robot");
    let bg = layer(
        "Background",
        0,
        vec![
            ruler_trait(
                "Forest",
                3,
                (8, 8),
                GREEN,
                vec![RulerRule {
                    target_layer: body.id,
                    allowed: vec![],
                    forbidden: vec![robot],
                }],
            ),
            normal_trait("City", 3, (8, 8), RED),
        ],
    );

    let (items, _) = run_to_completion(request("s2", (8, 8), 3, vec![bg, body]));
    assert_eq!(items.len(), 3);
    for item in &items {
        let key = attribute_key(item);
        let forest = key.iter().any(|(_, v)| v == "Forest");
        let robot = key.iter().any(|(_, v)| v == "Robot");
        assert!(!(forest && robot), "forbidden pair emitted: {key:?}");
    }
}

#[test]
fn s3_ruler_allow_list_pins_outfit() {
    let outfit = layer(
        "Outfit",
        1,
        vec![normal_trait("Royal", 3, (8, 8), GOLD), normal_trait("Rags", 3, (8, 8), RED)],
    );
    let royal = trait_id(&outfit, "Royal");
    let head = layer(
        "Head",
        0,
        vec![
            ruler_trait(
                "Crown",
                3,
                (8, 8),
                GOLD,
                vec![RulerRule {
                    target_layer: outfit.id,
                    allowed: vec![royal],
                    forbidden: vec![],
                }],
            ),
            normal_trait("Cap", 3, (8, 8), BLUE),
        ],
    );

    let (items, _) = run_to_completion(request("s3", (8, 8), 3, vec![head, outfit]));
    for item in &items {
        let key = attribute_key(item);
        let crown = key.iter().any(|(_, v)| v == "Crown");
        if crown {
            assert!(
                key.iter().any(|(_, v)| v == "Royal"),
                "Crown without Royal: {key:?}"
            );
        }
    }
}

fn strict_pair_request(count: u32) -> GenerationRequest {
    let a = layer(
        "A",
        0,
        vec![normal_trait("A1", 3, (8, 8), RED), normal_trait("A2", 3, (8, 8), GREEN)],
    );
    let b = layer(
        "B",
        1,
        vec![
            normal_trait("B1", 3, (8, 8), BLUE),
            normal_trait("B2", 3, (8, 8), GOLD),
            normal_trait("B3", 3, (8, 8), RED),
        ],
    );
    let combo = LayerCombination {
        id: CombinationId::new(),
        layer_ids: vec![a.id, b.id],
        active: true,
    };
    let mut req = request("s4", (8, 8), count, vec![a, b]);
    req.strict_pair_rules = vec![combo];
    req
}

#[test]
fn s4_strict_pair_enumerates_exactly_six() {
    let (items, _) = run_to_completion(strict_pair_request(6));
    assert_eq!(items.len(), 6);
    let pairs: HashSet<_> = items.iter().map(attribute_key).collect();
    assert_eq!(pairs.len(), 6);
}

#[test]
fn s4_strict_pair_seven_is_infeasible() {
    match layerforge_core::run(strict_pair_request(7)) {
        Err(ForgeError::Infeasible {
            requested,
            upper_bound,
        }) => {
            assert_eq!(requested, 7);
            assert_eq!(upper_bound, 6);
        }
        Ok(_) => panic!("expected Infeasible"),
        Err(other) => panic!("expected Infeasible, got {other}"),
    }
}

fn four_layer_request(count: u32) -> GenerationRequest {
    let a = swatch_layer("A", 0, 4, (8, 8));
    let b = swatch_layer("B", 1, 3, (8, 8));
    let c = swatch_layer("C", 2, 5, (8, 8));
    let d = swatch_layer("D", 3, 6, (8, 8));
    let combo = LayerCombination {
        id: CombinationId::new(),
        layer_ids: vec![a.id, b.id, c.id, d.id],
        active: true,
    };
    let mut req = request("s5", (8, 8), count, vec![a, b, c, d]);
    req.strict_pair_rules = vec![combo];
    req.worker_cap = Some(2);
    req
}

#[test]
fn s5_multi_layer_strict_pair_fills_the_space() {
    let (items, summary) = run_to_completion(four_layer_request(360));
    assert_eq!(items.len(), 360);
    assert_eq!(summary.total, 360);

    let combos: HashSet<_> = items.iter().map(attribute_key).collect();
    assert_eq!(combos.len(), 360);

    // Ranks are a permutation of 1..=360.
    let mut ranks: Vec<u32> = summary.items.iter().map(|r| r.rank).collect();
    ranks.sort_unstable();
    assert_eq!(ranks, (1..=360).collect::<Vec<u32>>());
    let rank_sum: u64 = ranks.iter().map(|&r| u64::from(r)).sum();
    assert_eq!(rank_sum, 360 * 361 / 2);
}

#[test]
fn s5_multi_layer_strict_pair_overflow_is_infeasible() {
    match layerforge_core::run(four_layer_request(361)) {
        Err(ForgeError::Infeasible { upper_bound, .. }) => assert_eq!(upper_bound, 360),
        Ok(_) => panic!("expected Infeasible"),
        Err(other) => panic!("expected Infeasible, got {other}"),
    }
}

#[test]
fn s6_cancellation_terminates_promptly() {
    let mut req = request(
        "s6",
        (16, 16),
        1000,
        vec![
            swatch_layer("A", 0, 6, (16, 16)),
            swatch_layer("B", 1, 6, (16, 16)),
            swatch_layer("C", 2, 6, (16, 16)),
            swatch_layer("D", 3, 6, (16, 16)),
        ],
    );
    req.worker_cap = Some(2);

    let mut run = layerforge_core::run(req).unwrap();
    let mut cancelled = false;
    let mut terminal = None;
    let mut items_after_terminal = 0u32;
    while let Some(event) = run.next_event() {
        match event {
            Event::Progress { completed, .. } if completed >= 10 && !cancelled => {
                run.cancel();
                cancelled = true;
            }
            Event::Cancelled { completed, reason } => {
                terminal = Some((completed, reason));
            }
            Event::ItemReady(_) if terminal.is_some() => items_after_terminal += 1,
            Event::Error(err) => panic!("unexpected error: {err}"),
            Event::Complete(_) => panic!("run should not complete after cancel"),
            _ => {}
        }
    }

    assert!(cancelled, "never saw 10 completed items");
    let (completed, reason) = terminal.expect("expected Cancelled terminal");
    assert!(completed >= 10);
    assert_eq!(reason, CancelReason::Requested);
    assert_eq!(items_after_terminal, 0, "no items may follow the terminal event");
}

#[test]
fn timeout_cancels_with_timeout_reason() {
    let mut req = request("timeout", (8, 8), 4, vec![swatch_layer("A", 0, 4, (8, 8))]);
    req.timeout_ms = Some(0);

    let run = layerforge_core::run(req).unwrap();
    let mut saw_cancelled = false;
    for event in run {
        if let Event::Cancelled { reason, .. } = event {
            assert_eq!(reason, CancelReason::Timeout);
            saw_cancelled = true;
        }
    }
    assert!(saw_cancelled, "expected a timeout cancellation");
}

#[test]
fn concurrency_preserves_uniqueness_and_ranks() {
    let mut req = request(
        "parallel",
        (16, 16),
        100,
        vec![
            swatch_layer("A", 0, 5, (16, 16)),
            swatch_layer("B", 1, 5, (16, 16)),
            swatch_layer("C", 2, 5, (16, 16)),
        ],
    );
    req.worker_cap = Some(4);

    let (items, summary) = run_to_completion(req);
    assert_eq!(items.len(), 100);

    let combos: HashSet<_> = items.iter().map(attribute_key).collect();
    assert_eq!(combos.len(), 100, "duplicate assignments emitted");

    let mut ranks: Vec<u32> = summary.items.iter().map(|r| r.rank).collect();
    ranks.sort_unstable();
    assert_eq!(ranks, (1..=100).collect::<Vec<u32>>());
}

#[test]
fn seeded_single_worker_runs_are_reproducible() {
    let build = || {
        let mut req = request(
            "deterministic",
            (8, 8),
            12,
            vec![swatch_layer("A", 0, 4, (8, 8)), swatch_layer("B", 1, 5, (8, 8))],
        );
        req.seed = Some(1234);
        req.worker_cap = Some(1);
        req
    };

    // Identical layer/trait ids so assignments compare structurally.
    let template = build();
    let first = template.clone();
    let second = template;

    let (items_a, _) = run_to_completion(first);
    let (items_b, _) = run_to_completion(second);

    let key = |items: &[GeneratedItem]| {
        let mut v: Vec<(u32, Vec<(String, String)>, Vec<u8>)> = items
            .iter()
            .map(|i| (i.index, attribute_key(i), i.png_bytes.clone()))
            .collect();
        v.sort_by_key(|(i, _, _)| *i);
        v
    };
    assert_eq!(key(&items_a), key(&items_b));
}

#[test]
fn emitted_pngs_round_trip_at_output_size() {
    let (items, _) = run_to_completion(request(
        "roundtrip",
        (24, 24),
        4,
        vec![swatch_layer("A", 0, 2, (24, 24)), swatch_layer("B", 1, 2, (24, 24))],
    ));
    for item in &items {
        let decoded = image::load_from_memory(&item.png_bytes).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (24, 24));
    }
}

#[test]
fn decode_failure_poisons_trait_and_run_recovers() {
    let mut req = request(
        "poison-recover",
        (8, 8),
        2,
        vec![
            layer(
                "A",
                0,
                vec![normal_trait("Good", 3, (8, 8), RED), normal_trait("Bad", 3, (8, 8), GREEN)],
            ),
            layer(
                "B",
                1,
                vec![normal_trait("X", 3, (8, 8), BLUE), normal_trait("Y", 3, (8, 8), GOLD)],
            ),
        ],
    );
    // Corrupt Bad's payload while keeping its declared dimensions valid.
    req.layers[0].traits[1].image.bytes = b"not a png at all".to_vec();

    let (items, _) = run_to_completion(req);
    assert_eq!(items.len(), 2);
    for item in &items {
        assert!(
            item.attributes.iter().all(|a| a.value != "Bad"),
            "poisoned trait composited: {:?}",
            item.attributes
        );
    }
}

#[test]
fn decode_failure_that_empties_a_layer_is_infeasible() {
    let mut req = request(
        "poison-fatal",
        (8, 8),
        2,
        vec![
            layer("A", 0, vec![normal_trait("OnlyBad", 3, (8, 8), RED)]),
            layer(
                "B",
                1,
                vec![normal_trait("X", 3, (8, 8), BLUE), normal_trait("Y", 3, (8, 8), GOLD)],
            ),
        ],
    );
    req.layers[0].traits[0].image.bytes = b"garbage".to_vec();

    let run = layerforge_core::run(req).unwrap();
    let mut saw_warning = false;
    let mut saw_infeasible = false;
    for event in run {
        match event {
            Event::Warning { .. } => saw_warning = true,
            Event::Error(ForgeError::Infeasible { .. }) => saw_infeasible = true,
            Event::Error(err) => panic!("unexpected error kind: {err}"),
            Event::Complete(_) => panic!("run should not complete"),
            _ => {}
        }
    }
    assert!(saw_warning, "decode failure should emit a warning");
    assert!(saw_infeasible, "emptied layer should abort the run");
}

#[test]
fn undersized_memory_budget_is_fatal() {
    let mut req = request("budget", (8, 8), 2, vec![swatch_layer("A", 0, 2, (8, 8))]);
    req.memory_budget_bytes = Some(10);

    let run = layerforge_core::run(req).unwrap();
    let mut saw_budget_error = false;
    for event in run {
        match event {
            Event::Error(ForgeError::MemoryBudgetExceeded { budget_bytes, .. }) => {
                assert_eq!(budget_bytes, 10);
                saw_budget_error = true;
            }
            Event::Error(err) => panic!("unexpected error kind: {err}"),
            Event::Complete(_) => panic!("run should not complete"),
            _ => {}
        }
    }
    assert!(saw_budget_error);
}
