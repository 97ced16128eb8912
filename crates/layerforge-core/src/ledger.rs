//! # Uniqueness Ledger
//!
//! Tracks which whole items and which strict-pair projections the run has
//! already produced. Keys are 128-bit SipHash-2-4 fingerprints over the
//! sorted (layer, trait) dense-index pairs of an assignment — seeded from
//! the request seed so a seeded run is reproducible end to end. At 128 bits
//! collisions are treated as negligible; there is no secondary equality
//! check.
//!
//! Concurrent workers use the two-phase `reserve`/`release` protocol: a
//! reservation holds the keys while the item is composited, and either
//! commits them or frees them. `would_collide` sees reservations too, so no
//! two workers can commit colliding assignments even under race.

use std::collections::HashSet;
use std::hash::Hasher;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use siphasher::sip128::{Hasher128, SipHasher24};

use crate::compile::CompiledRequest;

pub struct UniquenessLedger {
    k0: u64,
    k1: u64,
    /// Sorted dense layer indices per active strict-pair rule.
    combos: Vec<Vec<usize>>,
    inner: Mutex<LedgerInner>,
}

struct LedgerInner {
    whole: HashSet<u128>,
    projections: Vec<HashSet<u128>>,
    reserved_whole: HashSet<u128>,
    reserved_projections: Vec<HashSet<u128>>,
    committed: usize,
}

/// Keys held by an in-flight reservation.
#[must_use = "a reservation must be released (committed or abandoned)"]
pub struct ReserveToken {
    whole: u128,
    projections: Vec<u128>,
}

impl UniquenessLedger {
    pub fn new(compiled: &CompiledRequest) -> Self {
        let mut rng = StdRng::seed_from_u64(compiled.seed);
        let combos = compiled
            .combinations
            .iter()
            .map(|c| c.layers.clone())
            .collect();
        Self::with_keys(rng.random(), rng.random(), combos)
    }

    pub fn with_keys(k0: u64, k1: u64, combos: Vec<Vec<usize>>) -> Self {
        let projections = vec![HashSet::new(); combos.len()];
        let reserved_projections = vec![HashSet::new(); combos.len()];
        Self {
            k0,
            k1,
            combos,
            inner: Mutex::new(LedgerInner {
                whole: HashSet::new(),
                projections,
                reserved_whole: HashSet::new(),
                reserved_projections,
                committed: 0,
            }),
        }
    }

    /// True when the whole-item key or any strict-pair projection key is
    /// already committed or reserved.
    pub fn would_collide(&self, assignment: &[usize]) -> bool {
        let (whole, projections) = self.keys_for(assignment);
        let inner = self.inner.lock();
        if inner.whole.contains(&whole) || inner.reserved_whole.contains(&whole) {
            return true;
        }
        projections.iter().enumerate().any(|(i, key)| {
            inner.projections[i].contains(key) || inner.reserved_projections[i].contains(key)
        })
    }

    /// Atomically claim every key for this assignment. `None` means another
    /// worker holds or committed a colliding key.
    pub fn reserve(&self, assignment: &[usize]) -> Option<ReserveToken> {
        let (whole, projections) = self.keys_for(assignment);
        let mut inner = self.inner.lock();

        if inner.whole.contains(&whole) || inner.reserved_whole.contains(&whole) {
            return None;
        }
        if projections.iter().enumerate().any(|(i, key)| {
            inner.projections[i].contains(key) || inner.reserved_projections[i].contains(key)
        }) {
            return None;
        }

        inner.reserved_whole.insert(whole);
        for (i, key) in projections.iter().enumerate() {
            inner.reserved_projections[i].insert(*key);
        }
        Some(ReserveToken { whole, projections })
    }

    /// Drop a reservation, committing its keys when `commit` is true.
    pub fn release(&self, token: ReserveToken, commit: bool) {
        let mut inner = self.inner.lock();
        inner.reserved_whole.remove(&token.whole);
        for (i, key) in token.projections.iter().enumerate() {
            inner.reserved_projections[i].remove(key);
        }
        if commit {
            inner.whole.insert(token.whole);
            for (i, key) in token.projections.into_iter().enumerate() {
                inner.projections[i].insert(key);
            }
            inner.committed += 1;
        }
    }

    /// Single-step insert for non-racing callers. Returns false on collision.
    pub fn commit(&self, assignment: &[usize]) -> bool {
        match self.reserve(assignment) {
            Some(token) => {
                self.release(token, true);
                true
            }
            None => false,
        }
    }

    pub fn committed_count(&self) -> usize {
        self.inner.lock().committed
    }

    fn keys_for(&self, assignment: &[usize]) -> (u128, Vec<u128>) {
        let whole = self.fingerprint(assignment, None);
        let projections = self
            .combos
            .iter()
            .map(|layers| self.fingerprint(assignment, Some(layers)))
            .collect();
        (whole, projections)
    }

    /// Order-independent key: (layer, trait) pairs are fed in ascending
    /// layer-index order, restricted to `subset` when given.
    fn fingerprint(&self, assignment: &[usize], subset: Option<&[usize]>) -> u128 {
        let mut hasher = SipHasher24::new_with_keys(self.k0, self.k1);
        let mut feed = |layer: usize| {
            hasher.write(&(layer as u32).to_le_bytes());
            hasher.write(&(assignment[layer] as u32).to_le_bytes());
        };
        match subset {
            None => (0..assignment.len()).for_each(&mut feed),
            Some(layers) => layers.iter().copied().for_each(&mut feed),
        }
        hasher.finish128().as_u128()
    }
}
