//! Seller and bidder flows around a listing: creating and withdrawing
//! listings, placing and withdrawing bids, and opening a purchased listing.

use std::fmt;
use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::algebra::group::ProtocolGroup;
use crate::algebra::{hop_key, random_nonzero_scalar};
use crate::capsule::Capsule;
use crate::chain::{
    BidRecord, ChainProvider, EncryptionRecord, ListingStatus, TokenId, Transaction, TxId,
};
use crate::error::{ProtocolError, Result};
use crate::identity::{build_register, derive_secret_key, Register, SecretKey, SigningCapability, Vkh};
use crate::level::{build_level, recover_capsule_key, LevelKind, LevelSecrets};
use crate::store::{SecretRecord, SecretStore};

const LOG_TARGET: &str = "peace_protocol::marketplace";

/// The genesis exponents of a listing, keyed by listing token.
#[derive(Clone, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct ListingSecrets<G: ProtocolGroup> {
    pub token: TokenId,
    #[serde(with = "crate::crypto_serde::scalar")]
    pub a: G::Scalar,
    #[serde(with = "crate::crypto_serde::scalar")]
    pub r: G::Scalar,
}

impl<G: ProtocolGroup> SecretRecord for ListingSecrets<G> {
    const ROLE: &'static str = "seller";

    fn key(&self) -> TokenId {
        self.token
    }
}

impl<G: ProtocolGroup> Drop for ListingSecrets<G> {
    fn drop(&mut self) {
        self.a.zeroize();
        self.r.zeroize();
    }
}

impl<G: ProtocolGroup> fmt::Debug for ListingSecrets<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListingSecrets")
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}

/// A bid's register secret `b`, keyed by bid token and indexed by the
/// listing it targets.
#[derive(Clone, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct BidSecrets<G: ProtocolGroup> {
    pub bid_token: TokenId,
    pub listing_token: TokenId,
    #[serde(with = "crate::crypto_serde::scalar")]
    pub b: G::Scalar,
}

impl<G: ProtocolGroup> BidSecrets<G> {
    pub fn register(&self) -> Result<Register<G>> {
        Register::canonical(&SecretKey::new(self.b)?)
    }
}

impl<G: ProtocolGroup> SecretRecord for BidSecrets<G> {
    const ROLE: &'static str = "bid";

    fn key(&self) -> TokenId {
        self.bid_token
    }

    fn index(&self) -> Option<TokenId> {
        Some(self.listing_token)
    }
}

impl<G: ProtocolGroup> Drop for BidSecrets<G> {
    fn drop(&mut self) {
        self.b.zeroize();
    }
}

impl<G: ProtocolGroup> fmt::Debug for BidSecrets<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BidSecrets")
            .field("bid_token", &self.bid_token)
            .field("listing_token", &self.listing_token)
            .finish_non_exhaustive()
    }
}

/// Secret key behind the listing's current owner register: the wallet key
/// for a seller's own listing, otherwise the `b` of the bid that bought it.
pub async fn owner_secret_key<G: ProtocolGroup>(
    signer: &dyn SigningCapability,
    bids: &dyn SecretStore<BidSecrets<G>>,
    record: &EncryptionRecord<G>,
) -> Result<SecretKey<G::Scalar>> {
    let sk = derive_secret_key::<G::Scalar>(signer)?;
    if Register::<G>::from_secret(&sk, record.owner.generator)? == record.owner {
        return Ok(sk);
    }
    for secrets in bids.list_for_index(&record.token).await? {
        let candidate = SecretKey::new(secrets.b)?;
        if Register::<G>::from_secret(&candidate, record.owner.generator)? == record.owner {
            return Ok(candidate);
        }
    }
    Err(ProtocolError::unavailable("owner", record.token.to_hex()))
}

pub struct Marketplace<G: ProtocolGroup> {
    chain: Arc<dyn ChainProvider<G>>,
    signer: Arc<dyn SigningCapability>,
    listings: Arc<dyn SecretStore<ListingSecrets<G>>>,
    bids: Arc<dyn SecretStore<BidSecrets<G>>>,
}

impl<G: ProtocolGroup> Marketplace<G> {
    pub fn new(
        chain: Arc<dyn ChainProvider<G>>,
        signer: Arc<dyn SigningCapability>,
        listings: Arc<dyn SecretStore<ListingSecrets<G>>>,
        bids: Arc<dyn SecretStore<BidSecrets<G>>>,
    ) -> Self {
        Self {
            chain,
            signer,
            listings,
            bids,
        }
    }

    pub fn vkh(&self) -> Vkh {
        Vkh::of(self.signer.as_ref())
    }

    /// Encrypt `payload` under a fresh genesis level for the caller's own
    /// register and list it. The genesis exponents are durable before the
    /// mint is submitted.
    pub async fn create_listing(&self, payload: &[u8]) -> Result<(TokenId, TxId)> {
        let sk = derive_secret_key::<G::Scalar>(self.signer.as_ref())?;
        let (tx, secrets) = {
            let mut rng = rand::thread_rng();
            let (owner, schnorr) = build_register::<G, _>(&sk, G::g1_generator(), &mut rng)?;
            let token = TokenId::random(&mut rng);
            let level_secrets = LevelSecrets::<G::Scalar>::random(&mut rng);
            let built = build_level(&level_secrets, &owner, &token, LevelKind::Genesis, &mut rng)?;
            let kem = hop_key::<G>(&level_secrets.a);
            let capsule = Capsule::seal(&kem, &built.level.r1, payload, &mut rng)?;

            let record = EncryptionRecord {
                owner_vkh: self.vkh(),
                owner,
                token,
                half_level: built.level,
                full_level: None,
                capsule,
                status: ListingStatus::Open,
            };
            let secrets = ListingSecrets::<G> {
                token,
                a: level_secrets.a,
                r: level_secrets.r,
            };
            let tx = Transaction::CreateListing {
                record,
                schnorr,
                binding: built.binding,
            };
            (tx, secrets)
        };
        let token = secrets.token;

        self.listings.put(secrets).await?;
        let tx_id = self.chain.submit(tx).await?;
        tracing::info!(target: LOG_TARGET, %token, tx = %tx_id, "listing created");
        Ok((token, tx_id))
    }

    /// Withdraw an open listing the caller owns. Secrets go only after the
    /// burn is accepted.
    pub async fn remove_listing(&self, token: &TokenId) -> Result<TxId> {
        let record = self.fetch_listing(token).await?;
        if record.owner_vkh != self.vkh() {
            return Err(ProtocolError::stale(format!("listing {token} has another owner")));
        }
        let tx_id = self
            .chain
            .submit(Transaction::RemoveListing {
                token: *token,
                owner_vkh: record.owner_vkh,
            })
            .await?;
        self.listings.delete(token).await?;
        tracing::info!(target: LOG_TARGET, %token, tx = %tx_id, "listing removed");
        Ok(tx_id)
    }

    /// Bid on `listing` with a fresh register `[b]G`. `b` is durable before
    /// the bid is submitted.
    pub async fn place_bid(&self, listing: &TokenId, amount: u64) -> Result<(TokenId, TxId)> {
        let record = self.fetch_listing(listing).await?;
        if record.owner_vkh == self.vkh() {
            return Err(ProtocolError::stale(format!("listing {listing} is already ours")));
        }

        let (tx, secrets) = {
            let mut rng = rand::thread_rng();
            secrets_and_bid::<G, _>(self.vkh(), *listing, amount, &mut rng)?
        };
        let bid_token = secrets.bid_token;

        self.bids.put(secrets).await?;
        let tx_id = self.chain.submit(tx).await?;
        tracing::info!(target: LOG_TARGET, %listing, bid = %bid_token, amount, tx = %tx_id, "bid placed");
        Ok((bid_token, tx_id))
    }

    pub async fn remove_bid(&self, bid_token: &TokenId) -> Result<TxId> {
        let tx_id = self
            .chain
            .submit(Transaction::RemoveBid {
                pointer: *bid_token,
                owner_vkh: self.vkh(),
            })
            .await?;
        self.bids.delete(bid_token).await?;
        tracing::info!(target: LOG_TARGET, bid = %bid_token, tx = %tx_id, "bid removed");
        Ok(tx_id)
    }

    /// Whether one of our bids became the owner of `listing`.
    pub async fn has_purchased(&self, listing: &TokenId) -> Result<bool> {
        let Some(record) = self.chain.fetch_encryption(listing).await? else {
            return Ok(false);
        };
        for secrets in self.bids.list_for_index(listing).await? {
            if secrets.register()? == record.owner {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Decrypt the payload as the listing's current owner.
    pub async fn open_listing(&self, token: &TokenId) -> Result<Vec<u8>> {
        let record = self.fetch_listing(token).await?;
        let sk = owner_secret_key(self.signer.as_ref(), self.bids.as_ref(), &record).await?;
        let history = self.chain.fetch_level_history(token).await?;
        let kem = recover_capsule_key(&sk, &record.half_level, &history);
        let genesis_r1 = history.last().map_or(record.half_level.r1, |level| level.r1);
        let payload = record.capsule.open(&kem, &genesis_r1)?;
        tracing::info!(target: LOG_TARGET, %token, hops = history.len(), "opened listing");
        Ok(payload)
    }

    pub async fn bids_for(&self, listing: &TokenId) -> Result<Vec<BidRecord<G>>> {
        self.chain.fetch_bids_for(listing).await
    }

    async fn fetch_listing(&self, token: &TokenId) -> Result<EncryptionRecord<G>> {
        self.chain
            .fetch_encryption(token)
            .await?
            .ok_or_else(|| ProtocolError::stale(format!("listing {token} is not on chain")))
    }
}

fn secrets_and_bid<G: ProtocolGroup, R: Rng + ?Sized>(
    owner_vkh: Vkh,
    listing: TokenId,
    amount: u64,
    rng: &mut R,
) -> Result<(Transaction<G>, BidSecrets<G>)> {
    let b: G::Scalar = random_nonzero_scalar(rng);
    let sk = SecretKey::new(b)?;
    let (owner, schnorr) = build_register::<G, _>(&sk, G::g1_generator(), rng)?;
    let bid_token = TokenId::random(rng);
    let record = BidRecord {
        owner_vkh,
        owner,
        pointer: bid_token,
        token: listing,
        amount,
    };
    let secrets = BidSecrets {
        bid_token,
        listing_token: listing,
        b,
    };
    Ok((Transaction::PlaceBid { record, schnorr }, secrets))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algebra::Bls12;
    use crate::chain::InMemoryChain;
    use crate::error::ErrorKind;
    use crate::identity::Ed25519Capability;
    use crate::store::InMemorySecretStore;

    struct Party {
        market: Marketplace<Bls12>,
        listings: InMemorySecretStore<ListingSecrets<Bls12>>,
        bids: InMemorySecretStore<BidSecrets<Bls12>>,
    }

    fn party(chain: &InMemoryChain<Bls12>, seed: u8) -> Party {
        let listings = InMemorySecretStore::new();
        let bids = InMemorySecretStore::new();
        let market = Marketplace::new(
            Arc::new(chain.clone()),
            Arc::new(Ed25519Capability::from_seed(&[seed; 32])),
            Arc::new(listings.clone()),
            Arc::new(bids.clone()),
        );
        Party {
            market,
            listings,
            bids,
        }
    }

    #[tokio::test]
    async fn seller_lists_and_reopens_payload() {
        let chain = InMemoryChain::<Bls12>::new(1_000);
        let seller = party(&chain, 1);
        let (token, _) = seller.market.create_listing(b"the recipe").await.unwrap();

        assert!(seller.listings.get(&token).await.unwrap().is_some());
        assert_eq!(seller.market.open_listing(&token).await.unwrap(), b"the recipe");
        assert_eq!(chain.submitted(), vec!["create_listing"]);
    }

    #[tokio::test]
    async fn secrets_survive_a_failed_submission() {
        let chain = InMemoryChain::<Bls12>::new(1_000);
        let seller = party(&chain, 1);
        chain.fail_next_submissions(1);
        let err = seller.market.create_listing(b"payload").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExternalFailure);
        assert_eq!(seller.listings.len(), 1);
        assert!(chain.submitted().is_empty());
    }

    #[tokio::test]
    async fn bids_are_indexed_by_listing() {
        let chain = InMemoryChain::<Bls12>::new(1_000);
        let seller = party(&chain, 1);
        let buyer = party(&chain, 2);
        let (token, _) = seller.market.create_listing(b"payload").await.unwrap();

        let (bid, _) = buyer.market.place_bid(&token, 5_000_000).await.unwrap();
        let stored = buyer.bids.list_for_index(&token).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].bid_token, bid);
        assert_eq!(seller.market.bids_for(&token).await.unwrap()[0].amount, 5_000_000);
        assert!(!buyer.market.has_purchased(&token).await.unwrap());

        let err = seller.market.place_bid(&token, 1).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StaleState);

        buyer.market.remove_bid(&bid).await.unwrap();
        assert!(buyer.bids.is_empty());
        assert!(seller.market.bids_for(&token).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn strangers_cannot_open_or_remove() {
        let chain = InMemoryChain::<Bls12>::new(1_000);
        let seller = party(&chain, 1);
        let stranger = party(&chain, 3);
        let (token, _) = seller.market.create_listing(b"payload").await.unwrap();

        let err = stranger.market.open_listing(&token).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SecretsUnavailable);
        let err = stranger.market.remove_listing(&token).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StaleState);

        seller.market.remove_listing(&token).await.unwrap();
        assert!(seller.listings.is_empty());
        assert!(chain.encryption(&token).is_none());
    }
}
