use std::collections::HashSet;

use rand::rngs::StdRng;
use tracing::debug;

use crate::compile::CompiledRequest;
use crate::error::{ForgeError, Result};
use crate::ledger::UniquenessLedger;
use crate::solve::{ac3, draw_weighted, Assignment, Domains};

/// Backtracks allowed within one restart before the search re-randomizes.
const RESTART_BACKTRACK_CAP: u32 = 512;

enum Dfs {
    Solved(Assignment),
    /// Subtree fully explored without a solution.
    Exhausted,
    /// Backtrack cap hit; restart with fresh draws.
    Aborted,
}

struct SearchCtx<'a> {
    compiled: &'a CompiledRequest,
    ledger: &'a UniquenessLedger,
    backtracks: u32,
    ledger_dead_ends: bool,
}

/// Find one consistent assignment not yet present in the ledger.
///
/// `poisoned` traits (decode failures earlier in the run) are dropped from
/// their domains before pruning. Errors: `Infeasible` when no consistent
/// assignment exists at all, `SolverExhausted` when the restart budget ran
/// out or the space is saturated by already-emitted items (retryable).
pub fn solve(
    compiled: &CompiledRequest,
    ledger: &UniquenessLedger,
    poisoned: &HashSet<(usize, usize)>,
    rng: &mut StdRng,
) -> Result<Assignment> {
    let mut base = Domains::full(compiled);
    for &(layer, tr) in poisoned {
        base.remove(layer, tr);
    }
    for layer in 0..compiled.layer_count() {
        if base.live(layer) == 0 {
            return Err(infeasible(compiled, ledger));
        }
    }
    if !ac3::prune(compiled, &mut base) {
        return Err(infeasible(compiled, ledger));
    }

    let budget = compiled.attempt_budget;
    for restart in 0..budget {
        let mut ctx = SearchCtx {
            compiled,
            ledger,
            backtracks: 0,
            ledger_dead_ends: false,
        };
        let mut assignment = vec![None; compiled.layer_count()];
        match dfs(&mut ctx, base.clone(), &mut assignment, rng) {
            Dfs::Solved(done) => return Ok(done),
            Dfs::Exhausted => {
                // The whole space was visited: with no ledger hits this item
                // can never exist; with hits, everything left is taken.
                if ctx.ledger_dead_ends {
                    return Err(ForgeError::SolverExhausted { budget: restart + 1 });
                }
                return Err(infeasible(compiled, ledger));
            }
            Dfs::Aborted => {
                debug!(restart, "backtrack cap hit, restarting");
            }
        }
    }
    Err(ForgeError::SolverExhausted { budget })
}

fn infeasible(compiled: &CompiledRequest, ledger: &UniquenessLedger) -> ForgeError {
    ForgeError::Infeasible {
        requested: u64::from(compiled.target_count),
        upper_bound: ledger.committed_count() as u128,
    }
}

fn dfs(
    ctx: &mut SearchCtx<'_>,
    domains: Domains,
    assignment: &mut Vec<Option<usize>>,
    rng: &mut StdRng,
) -> Dfs {
    let Some(layer) = pick_layer(ctx.compiled, &domains, assignment) else {
        let full: Assignment = assignment.iter().filter_map(|a| *a).collect();
        if ctx.ledger.would_collide(&full) {
            // Already emitted (whole item or a strict-pair projection):
            // local dead end, the ledger is never touched from here.
            ctx.ledger_dead_ends = true;
            return Dfs::Exhausted;
        }
        return Dfs::Solved(full);
    };

    let mut pool: Vec<usize> = domains.iter(layer).collect();
    while !pool.is_empty() {
        let pos = draw_weighted(ctx.compiled, layer, &pool, rng);
        let tr = pool.swap_remove(pos);

        let mut child = domains.clone();
        child.restrict_to(layer, tr);
        if ac3::propagate_from(ctx.compiled, &mut child, layer) {
            assignment[layer] = Some(tr);
            match dfs(ctx, child, assignment, rng) {
                Dfs::Solved(done) => return Dfs::Solved(done),
                Dfs::Aborted => return Dfs::Aborted,
                Dfs::Exhausted => {}
            }
            assignment[layer] = None;
        }

        ctx.backtracks += 1;
        if ctx.backtracks > RESTART_BACKTRACK_CAP {
            return Dfs::Aborted;
        }
    }
    Dfs::Exhausted
}

/// Most-constrained unassigned layer first; ties broken by constraint
/// degree (denser first), then by paint order.
fn pick_layer(
    compiled: &CompiledRequest,
    domains: &Domains,
    assignment: &[Option<usize>],
) -> Option<usize> {
    (0..compiled.layer_count())
        .filter(|&l| assignment[l].is_none())
        .min_by_key(|&l| (domains.live(l), std::cmp::Reverse(compiled.graph.degree(l)), l))
}

