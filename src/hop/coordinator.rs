use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{assemble_hop, HopContext, HopPhase, HopRecord, HopState};
use crate::algebra::group::{public_input_len, ProtocolGroup};
use crate::chain::{
    BidRecord, ChainProvider, EncryptionRecord, ListingStatus, Timestamp, TokenId, Transaction,
    TxId,
};
use crate::error::{ProtocolError, Result};
use crate::identity::{SigningCapability, Vkh};
use crate::marketplace::{owner_secret_key, BidSecrets};
use crate::snark::{
    strip_leading_one, ExternalProof, HopWitness, ProgressSink, ProverRequest, SnarkProver,
};
use crate::store::SecretStore;

const LOG_TARGET: &str = "peace_protocol::hop::coordinator";

/// Drives hops for the listings the local actor owns.
///
/// At most one flow per listing token runs at a time; a second call for the
/// same token while one is in flight fails with `StaleState`.
pub struct HopCoordinator<G: ProtocolGroup> {
    chain: Arc<dyn ChainProvider<G>>,
    store: Arc<dyn SecretStore<HopRecord<G>>>,
    bids: Arc<dyn SecretStore<BidSecrets<G>>>,
    prover: Arc<dyn SnarkProver<G>>,
    signer: Arc<dyn SigningCapability>,
    proof_ttl_ms: i64,
    in_flight: Mutex<HashSet<TokenId>>,
}

/// Releases the per-token slot on drop.
struct FlowGuard<'a> {
    in_flight: &'a Mutex<HashSet<TokenId>>,
    token: TokenId,
}

impl Drop for FlowGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.lock().remove(&self.token);
    }
}

impl<G: ProtocolGroup> HopCoordinator<G> {
    pub fn new(
        chain: Arc<dyn ChainProvider<G>>,
        store: Arc<dyn SecretStore<HopRecord<G>>>,
        bids: Arc<dyn SecretStore<BidSecrets<G>>>,
        prover: Arc<dyn SnarkProver<G>>,
        signer: Arc<dyn SigningCapability>,
        proof_ttl_ms: i64,
    ) -> Self {
        Self {
            chain,
            store,
            bids,
            prover,
            signer,
            proof_ttl_ms,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    fn claim(&self, token: &TokenId) -> Result<FlowGuard<'_>> {
        if !self.in_flight.lock().insert(*token) {
            return Err(ProtocolError::stale(format!(
                "a hop step for {token} is already running"
            )));
        }
        Ok(FlowGuard {
            in_flight: &self.in_flight,
            token: *token,
        })
    }

    async fn load(&self, token: &TokenId) -> Result<HopRecord<G>> {
        self.store
            .get(token)
            .await?
            .ok_or_else(|| ProtocolError::unavailable("hop", token.to_hex()))
    }

    async fn listing(&self, token: &TokenId) -> Result<EncryptionRecord<G>> {
        self.chain
            .fetch_encryption(token)
            .await?
            .ok_or_else(|| ProtocolError::stale(format!("listing {token} is not on chain")))
    }

    async fn bid_for(&self, listing: &TokenId, bid: &TokenId) -> Result<BidRecord<G>> {
        self.chain
            .fetch_bid(bid)
            .await?
            .filter(|record| record.token == *listing)
            .ok_or_else(|| {
                ProtocolError::stale(format!("bid {bid} no longer targets listing {listing}"))
            })
    }

    fn witness(record: &HopRecord<G>, bid: &BidRecord<G>) -> Result<HopWitness<G>> {
        let hk = record.resolved_hop_key()?;
        Ok(HopWitness::with_hop_key(
            hk,
            &record.a0,
            &record.r0,
            &bid.owner.public_value,
        ))
    }

    /// Idle -> AwaitingProof. Samples `(a0, r0)` for `bid` and persists them
    /// before anything leaves the process. Returns what the prover needs.
    pub async fn prepare_hop(
        &self,
        listing: &TokenId,
        bid: &TokenId,
    ) -> Result<ProverRequest<G>> {
        let _guard = self.claim(listing)?;
        if let Some(existing) = self.store.get(listing).await? {
            return Err(ProtocolError::stale(format!(
                "listing {listing} already has a hop in {}",
                existing.state()
            )));
        }

        let record = self.listing(listing).await?;
        if record.owner_vkh != Vkh::of(self.signer.as_ref()) {
            return Err(ProtocolError::stale(format!("listing {listing} has another owner")));
        }
        if !record.status.is_open() {
            return Err(ProtocolError::stale(format!("listing {listing} is not open")));
        }
        let bid_record = self.bid_for(listing, bid).await?;

        let hop = HopRecord::<G>::sample(*listing, *bid, &mut rand::thread_rng());
        let witness = Self::witness(&hop, &bid_record)?;
        let request = ProverRequest {
            a0: hop.a0,
            r0: hop.r0,
            v: bid_record.owner.public_value,
            w0: witness.w0,
            w1: witness.w1,
        };

        self.store.put(hop).await?;
        tracing::info!(target: LOG_TARGET, %listing, %bid, "hop prepared");
        Ok(request)
    }

    /// Run the external prover for a prepared hop. Resumable: the request is
    /// rebuilt from the persisted record.
    pub async fn generate_proof(
        &self,
        listing: &TokenId,
        progress: &dyn ProgressSink,
    ) -> Result<ExternalProof<G::Scalar>> {
        let record = self.load(listing).await?;
        if !matches!(
            record.phase,
            HopPhase::AwaitingProof | HopPhase::ProofReady { proof_tx: None, .. }
        ) {
            return Err(ProtocolError::stale(format!(
                "hop for {listing} is in {}, not awaiting a proof",
                record.state()
            )));
        }
        let bid = self.bid_for(listing, &record.bid_token).await?;
        let witness = Self::witness(&record, &bid)?;
        let request = ProverRequest {
            a0: record.a0,
            r0: record.r0,
            v: bid.owner.public_value,
            w0: witness.w0,
            w1: witness.w1,
        };

        tracing::info!(target: LOG_TARGET, %listing, "generating hop proof");
        let proof = self.prover.prove(&request, progress).await?;
        tracing::info!(target: LOG_TARGET, %listing, inputs = proof.raw_inputs.len(), "hop proof ready");
        Ok(proof)
    }

    /// AwaitingProof -> ProofReady. Checks the prover echoed exactly the
    /// public inputs recomputed from the stored secrets, persists the phase
    /// change, then submits the transaction that moves the listing to
    /// `Pending`. Safe to call again after a failed submission.
    pub async fn submit_proof(
        &self,
        listing: &TokenId,
        proof: ExternalProof<G::Scalar>,
    ) -> Result<TxId> {
        let _guard = self.claim(listing)?;
        let mut record = self.load(listing).await?;
        // A ProofReady record without a transaction id is a submission that
        // failed after the phase change was persisted.
        if !matches!(
            record.phase,
            HopPhase::AwaitingProof | HopPhase::ProofReady { proof_tx: None, .. }
        ) {
            return Err(ProtocolError::stale(format!(
                "hop for {listing} is in {}, not awaiting a proof",
                record.state()
            )));
        }

        let public_inputs = strip_leading_one(&proof.raw_inputs, public_input_len::<G>())?;
        let bid = self.bid_for(listing, &record.bid_token).await?;
        let expected = Self::witness(&record, &bid)?.public_inputs(&bid.owner.public_value);
        if public_inputs != expected {
            return Err(ProtocolError::mismatch(format!(
                "proof public inputs for {listing} differ from the recomputed vector"
            )));
        }

        let listing_record = self.listing(listing).await?;
        if !listing_record.status.is_open() {
            return Err(ProtocolError::stale(format!("listing {listing} is not open")));
        }

        let ttl: Timestamp = self.chain.now() + self.proof_ttl_ms;
        record.phase = HopPhase::ProofReady {
            public_inputs: public_inputs.clone(),
            ttl,
            proof_tx: None,
        };
        self.store.put(record.clone()).await?;

        let tx_id = self
            .chain
            .submit(Transaction::UseSnark {
                token: *listing,
                bid: record.bid_token,
                proof: proof.proof,
                public_inputs: public_inputs.clone(),
                commitment_wires: proof.commitment_wires,
                ttl,
            })
            .await?;

        record.phase = HopPhase::ProofReady {
            public_inputs,
            ttl,
            proof_tx: Some(tx_id.clone()),
        };
        self.store.put(record).await?;
        tracing::info!(target: LOG_TARGET, %listing, ttl, tx = %tx_id, "hop proof submitted");
        Ok(tx_id)
    }

    /// ProofReady -> Completed. Builds the buyer's level and the completed
    /// full level from the stored secrets and the owner key, and submits the
    /// hand-over. The record is deleted only once the provider accepts it.
    pub async fn finish_hop(&self, listing: &TokenId) -> Result<TxId> {
        let _guard = self.claim(listing)?;
        let record = self.load(listing).await?;
        let HopPhase::ProofReady {
            public_inputs,
            ttl,
            ..
        } = &record.phase
        else {
            return Err(ProtocolError::stale(format!(
                "hop for {listing} has no submitted proof"
            )));
        };

        let listing_record = self.listing(listing).await?;
        let on_chain_ttl = match &listing_record.status {
            ListingStatus::Pending {
                public_inputs: on_chain,
                ..
            } if on_chain != public_inputs => {
                return Err(ProtocolError::mismatch(format!(
                    "pending status of {listing} carries different public inputs"
                )));
            }
            ListingStatus::Pending { ttl: on_chain, .. } if on_chain != ttl => {
                return Err(ProtocolError::stale(format!(
                    "pending ttl {on_chain} of {listing} is not the submitted {ttl}"
                )));
            }
            ListingStatus::Pending { ttl: on_chain, .. } => *on_chain,
            ListingStatus::Open => {
                return Err(ProtocolError::stale(format!(
                    "listing {listing} is not pending"
                )));
            }
        };
        let now = self.chain.now();
        if listing_record.status.is_abandonable(now) {
            return Err(ProtocolError::stale(format!(
                "ttl {on_chain_ttl} for {listing} elapsed at {now}"
            )));
        }

        let bid = self.bid_for(listing, &record.bid_token).await?;
        let sk = owner_secret_key(self.signer.as_ref(), self.bids.as_ref(), &listing_record).await?;
        let hk = record.resolved_hop_key()?;
        let artifacts = {
            let context = HopContext {
                token: listing,
                outgoing: &listing_record.half_level,
                buyer: &bid.owner,
                buyer_vkh: bid.owner_vkh,
            };
            assemble_hop(&record.a0, &record.r0, hk, &sk, &context, &mut rand::thread_rng())?
        };

        let tx_id = self
            .chain
            .submit(Transaction::UseEncryption {
                token: *listing,
                bid: record.bid_token,
                artifacts,
            })
            .await?;
        self.store.delete(listing).await?;
        tracing::info!(target: LOG_TARGET, %listing, buyer = %bid.owner_vkh, tx = %tx_id, "hop completed");
        Ok(tx_id)
    }

    /// Drop the local secrets of a hop that can no longer complete. Refuses
    /// while a submitted proof's window is still open. Returns whether a
    /// record was removed.
    pub async fn abandon_hop(&self, listing: &TokenId) -> Result<bool> {
        let _guard = self.claim(listing)?;
        let Some(record) = self.store.get(listing).await? else {
            return Ok(false);
        };
        if let HopPhase::ProofReady { .. } = record.phase {
            let on_chain = self.chain.fetch_encryption(listing).await?;
            let now = self.chain.now();
            if let Some(ListingStatus::Pending { ttl, .. }) = on_chain.as_ref().map(|r| &r.status) {
                if now <= *ttl {
                    return Err(ProtocolError::stale(format!(
                        "hop for {listing} can still complete until {ttl}"
                    )));
                }
            }
        }
        let removed = self.store.delete(listing).await?;
        tracing::info!(target: LOG_TARGET, %listing, "hop abandoned");
        Ok(removed)
    }

    /// Where the hop for `listing` stands.
    pub async fn status(&self, listing: &TokenId) -> Result<HopState> {
        let Some(record) = self.store.get(listing).await? else {
            return Ok(HopState::Idle);
        };
        let HopPhase::ProofReady { ttl, .. } = &record.phase else {
            return Ok(HopState::AwaitingProof);
        };
        let Some(on_chain) = self.chain.fetch_encryption(listing).await? else {
            return Ok(HopState::Abandoned);
        };
        let now = self.chain.now();
        let state = match &on_chain.status {
            ListingStatus::Pending { .. } if now > *ttl => HopState::Abandoned,
            ListingStatus::Pending { .. } => HopState::ProofReady,
            ListingStatus::Open if on_chain.owner_vkh != Vkh::of(self.signer.as_ref()) => {
                HopState::Completed
            }
            // Proof transaction not yet seen, or the listing was cancelled.
            ListingStatus::Open if now > *ttl => HopState::Abandoned,
            ListingStatus::Open => HopState::ProofReady,
        };
        Ok(state)
    }

    /// Revert an expired `Pending` listing to `Open`. Open to any party; a
    /// local hop record for the listing is dropped afterwards.
    pub async fn cancel_expired(&self, listing: &TokenId) -> Result<TxId> {
        let _guard = self.claim(listing)?;
        let record = self.listing(listing).await?;
        let now = self.chain.now();
        if !record.status.is_abandonable(now) {
            return Err(ProtocolError::stale(format!(
                "listing {listing} is not pending past its ttl"
            )));
        }
        let tx_id = self
            .chain
            .submit(Transaction::CancelEncryption { token: *listing })
            .await?;
        if self.store.delete(listing).await? {
            tracing::debug!(target: LOG_TARGET, %listing, "dropped local hop secrets");
        }
        tracing::info!(target: LOG_TARGET, %listing, tx = %tx_id, "expired hop cancelled");
        Ok(tx_id)
    }
}
