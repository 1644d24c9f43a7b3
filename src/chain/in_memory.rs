use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::datum::{redeemers, PlutusData, RedeemerPurpose};
use super::{
    BidRecord, ChainProvider, EncryptionRecord, ListingStatus, Timestamp, TokenId, Transaction,
    TxId,
};
use crate::algebra::group::{public_input_len, ProtocolGroup};
use crate::error::{ProtocolError, Result};
use crate::hop::HopArtifacts;
use crate::level::{verify_level, FullEncryptionLevel, LevelKind};

const LOG_TARGET: &str = "peace_protocol::chain::in_memory";

/// An accepted transaction and the redeemers it was validated with.
#[derive(Clone, Debug)]
pub struct Submission {
    pub id: TxId,
    pub label: &'static str,
    pub redeemers: Vec<(RedeemerPurpose, PlutusData)>,
}

struct ChainState<G: ProtocolGroup> {
    encryptions: HashMap<TokenId, EncryptionRecord<G>>,
    bids: HashMap<TokenId, BidRecord<G>>,
    /// Newest first.
    history: HashMap<TokenId, Vec<FullEncryptionLevel<G>>>,
    submitted: Vec<Submission>,
    clock: Timestamp,
    reward_balance: u64,
    failures_remaining: usize,
}

/// Ledger stand-in that runs the validator checks the protocol depends on
/// (proofs of knowledge, level equations, status transitions, TTL windows)
/// but not Groth16 verification.
pub struct InMemoryChain<G: ProtocolGroup> {
    state: Arc<Mutex<ChainState<G>>>,
}

impl<G: ProtocolGroup> Clone for InMemoryChain<G> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<G: ProtocolGroup> Default for InMemoryChain<G> {
    fn default() -> Self {
        Self::new(super::now_millis())
    }
}

fn rejected(tx: &str, reason: impl std::fmt::Display) -> ProtocolError {
    ProtocolError::external(format!("{tx} rejected: {reason}"))
}

impl<G: ProtocolGroup> InMemoryChain<G> {
    pub fn new(now: Timestamp) -> Self {
        Self {
            state: Arc::new(Mutex::new(ChainState {
                encryptions: HashMap::new(),
                bids: HashMap::new(),
                history: HashMap::new(),
                submitted: Vec::new(),
                clock: now,
                reward_balance: 0,
                failures_remaining: 0,
            })),
        }
    }

    pub fn set_time(&self, now: Timestamp) {
        self.state.lock().clock = now;
    }

    pub fn advance(&self, millis: i64) {
        self.state.lock().clock += millis;
    }

    pub fn set_reward_balance(&self, lovelace: u64) {
        self.state.lock().reward_balance = lovelace;
    }

    /// Fail the next `n` submissions with `ExternalFailure` before they are
    /// applied.
    pub fn fail_next_submissions(&self, n: usize) {
        self.state.lock().failures_remaining = n;
    }

    /// Labels of accepted transactions, in order.
    pub fn submitted(&self) -> Vec<&'static str> {
        self.state.lock().submitted.iter().map(|s| s.label).collect()
    }

    /// Accepted transactions with their encoded redeemers, in order.
    pub fn submissions(&self) -> Vec<Submission> {
        self.state.lock().submitted.clone()
    }

    pub fn encryption(&self, token: &TokenId) -> Option<EncryptionRecord<G>> {
        self.state.lock().encryptions.get(token).cloned()
    }

    fn apply(state: &mut ChainState<G>, tx: Transaction<G>) -> Result<()> {
        let label = tx.label();
        let now = state.clock;
        match tx {
            Transaction::CreateListing {
                record,
                schnorr,
                binding,
            } => {
                if state.encryptions.contains_key(&record.token) {
                    return Err(rejected(label, "token already minted"));
                }
                if !record.status.is_open() || record.full_level.is_some() {
                    return Err(rejected(label, "new listings start open without a full level"));
                }
                if !record.owner.verify(&schnorr) {
                    return Err(rejected(label, "schnorr proof failed"));
                }
                if !verify_level(
                    &record.half_level,
                    &binding,
                    &record.owner,
                    &record.token,
                    LevelKind::Genesis,
                ) {
                    return Err(rejected(label, "genesis level failed"));
                }
                state.encryptions.insert(record.token, record);
            }
            Transaction::RemoveListing { token, owner_vkh } => {
                let record = state
                    .encryptions
                    .get(&token)
                    .ok_or_else(|| rejected(label, "unknown listing"))?;
                if record.owner_vkh != owner_vkh {
                    return Err(rejected(label, "not signed by the owner"));
                }
                if !record.status.is_open() {
                    return Err(rejected(label, "listing is pending"));
                }
                state.encryptions.remove(&token);
                state.history.remove(&token);
            }
            Transaction::PlaceBid { record, schnorr } => {
                if state.bids.contains_key(&record.pointer) {
                    return Err(rejected(label, "bid token already minted"));
                }
                if !state.encryptions.contains_key(&record.token) {
                    return Err(rejected(label, "bid targets an unknown listing"));
                }
                if !record.owner.verify(&schnorr) {
                    return Err(rejected(label, "schnorr proof failed"));
                }
                state.bids.insert(record.pointer, record);
            }
            Transaction::RemoveBid { pointer, owner_vkh } => {
                let bid = state
                    .bids
                    .get(&pointer)
                    .ok_or_else(|| rejected(label, "unknown bid"))?;
                if bid.owner_vkh != owner_vkh {
                    return Err(rejected(label, "not signed by the bidder"));
                }
                state.bids.remove(&pointer);
            }
            Transaction::UseSnark {
                token,
                bid,
                public_inputs,
                ttl,
                ..
            } => {
                let bid = state
                    .bids
                    .get(&bid)
                    .filter(|b| b.token == token)
                    .ok_or_else(|| rejected(label, "bid does not target this listing"))?;
                let limbs = G::LIMBS_PER_POINT;
                if public_inputs.len() != public_input_len::<G>() {
                    return Err(rejected(label, "wrong public input count"));
                }
                if public_inputs[..limbs] != G::snark_limbs(&bid.owner.public_value)[..] {
                    return Err(rejected(label, "proof is not over the bidder's register"));
                }
                if ttl <= now {
                    return Err(rejected(label, "ttl already elapsed"));
                }
                let record = state
                    .encryptions
                    .get_mut(&token)
                    .ok_or_else(|| rejected(label, "unknown listing"))?;
                if !record.status.is_open() {
                    return Err(rejected(label, "listing is not open"));
                }
                record.status = ListingStatus::Pending { public_inputs, ttl };
            }
            Transaction::UseEncryption {
                token,
                bid,
                artifacts,
            } => {
                let bid = state
                    .bids
                    .get(&bid)
                    .filter(|b| b.token == token)
                    .cloned()
                    .ok_or_else(|| rejected(label, "bid does not target this listing"))?;
                let record = state
                    .encryptions
                    .get(&token)
                    .ok_or_else(|| rejected(label, "unknown listing"))?;
                check_hop(record, &bid, &artifacts, now).map_err(|reason| rejected(label, reason))?;

                let record = state
                    .encryptions
                    .get_mut(&token)
                    .ok_or_else(|| rejected(label, "unknown listing"))?;
                record.owner_vkh = bid.owner_vkh;
                record.owner = artifacts.buyer;
                record.half_level = artifacts.half_level;
                record.full_level = Some(artifacts.full_level);
                record.status = ListingStatus::Open;
                state
                    .history
                    .entry(token)
                    .or_default()
                    .insert(0, artifacts.full_level);
                state.bids.remove(&bid.pointer);
            }
            Transaction::CancelEncryption { token } => {
                let record = state
                    .encryptions
                    .get_mut(&token)
                    .ok_or_else(|| rejected(label, "unknown listing"))?;
                if !record.status.is_abandonable(now) {
                    return Err(rejected(label, "listing is not pending past its ttl"));
                }
                record.status = ListingStatus::Open;
            }
        }
        Ok(())
    }
}

/// Validator checks for the second hop transaction.
fn check_hop<G: ProtocolGroup>(
    record: &EncryptionRecord<G>,
    bid: &BidRecord<G>,
    artifacts: &HopArtifacts<G>,
    now: Timestamp,
) -> std::result::Result<(), &'static str> {
    let ListingStatus::Pending { public_inputs, ttl } = &record.status else {
        return Err("listing is not pending");
    };
    if now > *ttl {
        return Err("ttl elapsed");
    }
    let limbs = G::LIMBS_PER_POINT;
    if public_inputs[limbs..2 * limbs] != G::snark_limbs(&artifacts.witness.w0)[..] {
        return Err("witness point does not match the proof");
    }
    // e(G, R5) == e(W, G2) - e(V_owner, H0)
    let lhs = G::pairing(&G::g1_generator(), &artifacts.r5);
    let rhs = G::pairing(&artifacts.witness.w0, &G::g2_generator())
        - G::pairing(&record.owner.public_value, &G::h0());
    if lhs != rhs {
        return Err("r5 does not match the owner and witness");
    }
    if artifacts.full_level.half() != record.half_level {
        return Err("full level does not extend the current half level");
    }
    if artifacts.buyer != bid.owner {
        return Err("new owner is not the bidder");
    }
    if !verify_level(
        &artifacts.half_level,
        &artifacts.binding,
        &artifacts.buyer,
        &record.token,
        LevelKind::Hop,
    ) {
        return Err("new level failed");
    }
    Ok(())
}

#[async_trait]
impl<G: ProtocolGroup> ChainProvider<G> for InMemoryChain<G> {
    async fn fetch_encryption(&self, token: &TokenId) -> Result<Option<EncryptionRecord<G>>> {
        Ok(self.state.lock().encryptions.get(token).cloned())
    }

    async fn fetch_bid(&self, pointer: &TokenId) -> Result<Option<BidRecord<G>>> {
        Ok(self.state.lock().bids.get(pointer).cloned())
    }

    async fn fetch_bids_for(&self, token: &TokenId) -> Result<Vec<BidRecord<G>>> {
        Ok(self
            .state
            .lock()
            .bids
            .values()
            .filter(|bid| bid.token == *token)
            .cloned()
            .collect())
    }

    async fn fetch_level_history(&self, token: &TokenId) -> Result<Vec<FullEncryptionLevel<G>>> {
        Ok(self.state.lock().history.get(token).cloned().unwrap_or_default())
    }

    async fn submit(&self, tx: Transaction<G>) -> Result<TxId> {
        let label = tx.label();
        let attached = redeemers(&tx);
        let mut state = self.state.lock();
        if state.failures_remaining > 0 {
            state.failures_remaining -= 1;
            tracing::warn!(target: LOG_TARGET, tx = label, "injected submission failure");
            return Err(ProtocolError::external(format!("{label}: injected failure")));
        }
        if let Err(err) = Self::apply(&mut state, tx) {
            tracing::warn!(target: LOG_TARGET, tx = label, error = %err, "transaction rejected");
            return Err(err);
        }
        let id = TxId(format!("{label}-{:04}", state.submitted.len()));
        state.submitted.push(Submission {
            id: id.clone(),
            label,
            redeemers: attached,
        });
        tracing::info!(target: LOG_TARGET, tx = label, id = %id, "transaction accepted");
        Ok(id)
    }

    async fn reward_balance(&self) -> Result<u64> {
        Ok(self.state.lock().reward_balance)
    }

    fn now(&self) -> Timestamp {
        self.state.lock().clock
    }
}
