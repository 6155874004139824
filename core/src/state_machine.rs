//! The swap protocol driver, grounded on
//! `services/swap/swap.go`'s `request()`/`respond()` step sequences but
//! reshaped into a table-driven, crash-resumable machine generic over the
//! two chain legs involved.

use crate::atom::Atom;
use crate::complaint::Complaint;
use crate::error::{Error, Result};
use crate::rendezvous::RendezvousChannel;
use crate::store::SwapStore;
use crate::types::{now_unix, StatusCode, StepStatus, SwapBlob, SwapID, SwapReceipt};
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Minimum safety margin between the requestor's and responder's expiry
/// Default one day.
pub const SAFETY_WINDOW_SECONDS: i64 = 24 * 60 * 60;

/// The requestor's initial HTLC lifetime.
pub const REQUESTOR_EXPIRY_SECONDS: i64 = 48 * 60 * 60;

/// What running one step produced.
pub enum StepOutcome {
    /// The step's side effect succeeded; status advances to the given
    /// value and must be persisted before the next step runs.
    Advanced(StepStatus),
    /// A transient failure (chain RPC, rendezvous timeout before its
    /// deadline); retry the same step without changing status.
    RetryEligible,
    /// A non-recoverable protocol failure; status is left unchanged so
    /// the swap runs out its clock and refunds.
    AbortSwap(Complaint),
}

/// One swap in progress, generic over its own chain leg (`personal`), the
/// counterparty's chain leg (`foreign`), the store, and the rendezvous
/// channel. A fresh `Swap` is constructed by the supervisor from a
/// persisted [`SwapBlob`] every time its task (re)starts.
pub struct Swap<P: Atom, F: Atom, S: SwapStore + ?Sized, R: RendezvousChannel + ?Sized> {
    pub personal: P,
    pub foreign: F,
    pub store: Arc<S>,
    pub rendezvous: Arc<R>,
    pub own_address: String,
}

impl<P: Atom, F: Atom, S: SwapStore + ?Sized, R: RendezvousChannel + ?Sized> Swap<P, F, S, R> {
    pub fn new(personal: P, foreign: F, store: Arc<S>, rendezvous: Arc<R>, own_address: String) -> Self {
        Self {
            personal,
            foreign,
            store,
            rendezvous,
            own_address,
        }
    }

    /// Role is derived, never configured:
    /// the leg with the lower priority code is the requestor.
    fn is_requestor(&self, blob: &SwapBlob) -> bool {
        if self.personal.priority_code() != self.foreign.priority_code() {
            self.personal.priority_code() < self.foreign.priority_code()
        } else {
            blob.should_initiate_first
        }
    }

    /// Drive this swap to completion (or to a persisted stuck/retryable
    /// state), resuming from whatever `step` is stored. Returns the final
    /// `StatusCode` reached before the task ends — terminal statuses mean
    /// the caller (the supervisor) should drop this swap's task; anything
    /// else means a transient condition and the caller should reschedule.
    pub async fn run(&self, id: SwapID) -> Result<StatusCode> {
        loop {
            let mut blob = self
                .store
                .get_pending_swap(id)
                .await?
                .ok_or_else(|| Error::SwapNotFound(id.to_string()))?;

            if blob.step.is_terminal() {
                return Ok(blob.step.status_code());
            }

            let requestor = self.is_requestor(&blob);

            if let Err(e) = self.rendezvous.send_owner_address(id, requestor, &self.own_address).await {
                log::warn!(target: "swap", "swap {id} failed to post owner address: {e}");
            }

            let outcome = if requestor {
                self.step_requestor(&mut blob).await
            } else {
                self.step_responder(&mut blob).await
            };

            match outcome {
                StepOutcome::Advanced(next) => {
                    blob.step = next;
                    self.store.put_pending_swap(&blob).await?;
                    self.persist_receipt(&blob).await?;
                    if next.is_terminal() {
                        self.store.delete_pending_swap(id).await?;
                        return Ok(next.status_code());
                    }
                }
                StepOutcome::RetryEligible => {
                    return Ok(blob.step.status_code());
                }
                StepOutcome::AbortSwap(complaint) => {
                    log::warn!(target: "swap", "swap {id} aborting: {complaint}");
                    return Err(Error::AuditFailed(complaint));
                }
            }
        }
    }

    async fn persist_receipt(&self, blob: &SwapBlob) -> Result<()> {
        let now = now_unix();
        let receipt = match self.store.get_swap_receipt(blob.id).await? {
            Some(existing) => existing.with_status(blob.step.status_code(), now),
            None => SwapReceipt::new(blob, now).with_status(blob.step.status_code(), now),
        };
        self.store.put_swap_receipt(&receipt).await
    }

    // ---- Requestor path ----

    async fn step_requestor(&self, blob: &mut SwapBlob) -> StepOutcome {
        match blob.step {
            StepStatus::Inactive => self.requestor_generate_details(blob).await,
            StepStatus::InitiateDetailsAcquired => self.requestor_initiate(blob).await,
            StepStatus::Initiated => self.requestor_send_details(blob).await,
            StepStatus::SentSwapDetails => self.requestor_receive_details(blob).await,
            StepStatus::ReceivedSwapDetails => self.requestor_audit(blob).await,
            StepStatus::Audited => self.requestor_redeem(blob).await,
            _ => StepOutcome::RetryEligible,
        }
    }

    async fn requestor_generate_details(&self, blob: &mut SwapBlob) -> StepOutcome {
        use rand::RngCore;
        let mut secret = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut secret);
        let secret_hash: [u8; 32] = Sha256::digest(secret).into();
        let expiry = now_unix() + REQUESTOR_EXPIRY_SECONDS;

        blob.secret = Some(secret);
        blob.secret_hash = Some(secret_hash);
        blob.expiry = Some(expiry);
        StepOutcome::Advanced(StepStatus::InitiateDetailsAcquired)
    }

    async fn requestor_initiate(&self, blob: &mut SwapBlob) -> StepOutcome {
        let Some(secret_hash) = blob.secret_hash else {
            return StepOutcome::AbortSwap(Complaint::WrongRequestorInitiation("missing secret hash".into()));
        };
        let Some(expiry) = blob.expiry else {
            return StepOutcome::AbortSwap(Complaint::WrongRequestorInitiation("missing expiry".into()));
        };

        let to = match self.rendezvous.receive_owner_address(blob.id, false, expiry).await {
            Ok(addr) => addr,
            Err(Error::RendezvousTimeout(_)) => return StepOutcome::AbortSwap(Complaint::DelayedResponderInitiation),
            Err(e) => return retry_or_abort(e),
        };

        let value = match blob.send_amount.parse::<rust_decimal::Decimal>() {
            Ok(v) => v,
            Err(_) => return StepOutcome::AbortSwap(Complaint::WrongRequestorInitiation("malformed send amount".into())),
        };

        match self.personal.initiate(&to, secret_hash, value, expiry).await {
            Ok(details) => {
                blob.personal_contract = Some(details);
                StepOutcome::Advanced(StepStatus::Initiated)
            }
            Err(e) => retry_or_abort(e),
        }
    }

    async fn requestor_send_details(&self, blob: &mut SwapBlob) -> StepOutcome {
        let Some(details) = &blob.personal_contract else {
            return StepOutcome::AbortSwap(Complaint::WrongRequestorInitiation("missing personal contract".into()));
        };
        let bytes = match serde_json::to_vec(details) {
            Ok(b) => b,
            Err(e) => return StepOutcome::AbortSwap(Complaint::WrongRequestorInitiation(e.to_string())),
        };
        match self.rendezvous.send_swap_details(blob.id, true, &bytes).await {
            Ok(()) => StepOutcome::Advanced(StepStatus::SentSwapDetails),
            Err(e) => retry_or_abort(e),
        }
    }

    async fn requestor_receive_details(&self, blob: &mut SwapBlob) -> StepOutcome {
        let Some(expiry) = blob.expiry else {
            return StepOutcome::AbortSwap(Complaint::WrongRequestorInitiation("missing expiry".into()));
        };
        let deadline = expiry - SAFETY_WINDOW_SECONDS;
        match self.rendezvous.receive_swap_details(blob.id, false, deadline).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(details) => {
                    blob.foreign_contract = Some(details);
                    StepOutcome::Advanced(StepStatus::ReceivedSwapDetails)
                }
                Err(e) => StepOutcome::AbortSwap(Complaint::WrongResponderInitiation(e.to_string())),
            },
            Err(Error::RendezvousTimeout(_)) => StepOutcome::AbortSwap(Complaint::DelayedResponderInitiation),
            Err(e) => retry_or_abort(e),
        }
    }

    async fn requestor_audit(&self, blob: &mut SwapBlob) -> StepOutcome {
        let Some(foreign_contract) = blob.foreign_contract.clone() else {
            return StepOutcome::AbortSwap(Complaint::WrongResponderInitiation("missing foreign contract".into()));
        };
        let Some(own_secret_hash) = blob.secret_hash else {
            return StepOutcome::AbortSwap(Complaint::WrongResponderInitiation("missing secret hash".into()));
        };
        let min_value = match blob.receive_amount.parse::<rust_decimal::Decimal>() {
            Ok(v) => v,
            Err(_) => return StepOutcome::AbortSwap(Complaint::WrongResponderInitiation("malformed receive amount".into())),
        };

        match self.foreign.audit(&foreign_contract, &blob.receive_from, min_value).await {
            Ok((expiry, foreign_secret_hash)) => {
                if foreign_secret_hash != own_secret_hash {
                    return StepOutcome::AbortSwap(Complaint::WrongResponderInitiation("secret hash mismatch".into()));
                }
                if now_unix() >= expiry as i64 {
                    return StepOutcome::AbortSwap(Complaint::WrongResponderInitiation("foreign contract already expired".into()));
                }
                StepOutcome::Advanced(StepStatus::Audited)
            }
            Err(e) if e.complaint().is_some() => StepOutcome::AbortSwap(e.complaint().unwrap().clone()),
            Err(e) => retry_or_abort(e),
        }
    }

    async fn requestor_redeem(&self, blob: &mut SwapBlob) -> StepOutcome {
        let (Some(foreign_contract), Some(secret)) = (blob.foreign_contract.clone(), blob.secret) else {
            return StepOutcome::AbortSwap(Complaint::WrongResponderInitiation("missing redeem prerequisites".into()));
        };
        match self.foreign.redeem(&foreign_contract, secret).await {
            Ok(()) => StepOutcome::Advanced(StepStatus::Redeemed),
            Err(e) => retry_or_abort(e),
        }
    }

    // ---- Responder path ----

    async fn step_responder(&self, blob: &mut SwapBlob) -> StepOutcome {
        match blob.step {
            StepStatus::Inactive => self.responder_receive_details(blob).await,
            StepStatus::ReceivedSwapDetails => self.responder_audit(blob).await,
            StepStatus::Audited => self.responder_initiate(blob).await,
            StepStatus::Initiated => self.responder_send_details(blob).await,
            StepStatus::SentSwapDetails => self.responder_get_redeem_details(blob).await,
            StepStatus::RedeemDetailsAcquired => self.responder_redeem(blob).await,
            _ => StepOutcome::RetryEligible,
        }
    }

    async fn responder_receive_details(&self, blob: &mut SwapBlob) -> StepOutcome {
        let Some(requestor_expiry) = blob.time_lock else {
            return StepOutcome::AbortSwap(Complaint::WrongRequestorInitiation("missing counterparty time lock".into()));
        };
        let deadline = requestor_expiry - 2 * SAFETY_WINDOW_SECONDS;
        match self.rendezvous.receive_swap_details(blob.id, true, deadline).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(details) => {
                    blob.foreign_contract = Some(details);
                    StepOutcome::Advanced(StepStatus::ReceivedSwapDetails)
                }
                Err(e) => StepOutcome::AbortSwap(Complaint::WrongRequestorInitiation(e.to_string())),
            },
            Err(Error::RendezvousTimeout(_)) => StepOutcome::AbortSwap(Complaint::DelayedRequestorInitiation),
            Err(e) => retry_or_abort(e),
        }
    }

    async fn responder_audit(&self, blob: &mut SwapBlob) -> StepOutcome {
        let Some(foreign_contract) = blob.foreign_contract.clone() else {
            return StepOutcome::AbortSwap(Complaint::WrongRequestorInitiation("missing foreign contract".into()));
        };
        let min_value = match blob.receive_amount.parse::<rust_decimal::Decimal>() {
            Ok(v) => v,
            Err(_) => return StepOutcome::AbortSwap(Complaint::WrongRequestorInitiation("malformed receive amount".into())),
        };

        match self.foreign.audit(&foreign_contract, &blob.receive_from, min_value).await {
            Ok((foreign_expiry, foreign_secret_hash)) => {
                let new_expiry = foreign_expiry as i64 - SAFETY_WINDOW_SECONDS;
                if now_unix() >= new_expiry {
                    return StepOutcome::AbortSwap(Complaint::WrongRequestorInitiation(
                        "insufficient time remaining before counterparty expiry".into(),
                    ));
                }
                blob.expiry = Some(new_expiry);
                blob.secret_hash = Some(foreign_secret_hash);
                StepOutcome::Advanced(StepStatus::Audited)
            }
            Err(e) if e.complaint().is_some() => StepOutcome::AbortSwap(e.complaint().unwrap().clone()),
            Err(e) => retry_or_abort(e),
        }
    }

    async fn responder_initiate(&self, blob: &mut SwapBlob) -> StepOutcome {
        let (Some(secret_hash), Some(expiry)) = (blob.secret_hash, blob.expiry) else {
            return StepOutcome::AbortSwap(Complaint::WrongRequestorInitiation("missing initiate details".into()));
        };
        let to = match self.rendezvous.receive_owner_address(blob.id, true, expiry).await {
            Ok(addr) => addr,
            Err(Error::RendezvousTimeout(_)) => return StepOutcome::AbortSwap(Complaint::DelayedRequestorInitiation),
            Err(e) => return retry_or_abort(e),
        };

        let value = match blob.send_amount.parse::<rust_decimal::Decimal>() {
            Ok(v) => v,
            Err(_) => return StepOutcome::AbortSwap(Complaint::WrongRequestorInitiation("malformed send amount".into())),
        };

        match self.personal.initiate(&to, secret_hash, value, expiry).await {
            Ok(details) => {
                blob.personal_contract = Some(details);
                StepOutcome::Advanced(StepStatus::Initiated)
            }
            Err(e) => retry_or_abort(e),
        }
    }

    async fn responder_send_details(&self, blob: &mut SwapBlob) -> StepOutcome {
        let Some(details) = &blob.personal_contract else {
            return StepOutcome::AbortSwap(Complaint::WrongRequestorInitiation("missing personal contract".into()));
        };
        let bytes = match serde_json::to_vec(details) {
            Ok(b) => b,
            Err(e) => return StepOutcome::AbortSwap(Complaint::WrongRequestorInitiation(e.to_string())),
        };
        match self.rendezvous.send_swap_details(blob.id, false, &bytes).await {
            Ok(()) => StepOutcome::Advanced(StepStatus::SentSwapDetails),
            Err(e) => retry_or_abort(e),
        }
    }

    async fn responder_get_redeem_details(&self, blob: &mut SwapBlob) -> StepOutcome {
        let Some(personal_contract) = blob.personal_contract.clone() else {
            return StepOutcome::AbortSwap(Complaint::DelayedRequestorRedemption);
        };
        let Some(secret_hash) = blob.secret_hash else {
            return StepOutcome::AbortSwap(Complaint::DelayedRequestorRedemption);
        };

        match self.personal.audit_secret(&personal_contract).await {
            Ok(secret) => {
                let hash: [u8; 32] = Sha256::digest(secret).into();
                if hash != secret_hash {
                    return StepOutcome::AbortSwap(Complaint::DelayedRequestorRedemption);
                }
                blob.secret = Some(secret);
                StepOutcome::Advanced(StepStatus::RedeemDetailsAcquired)
            }
            Err(e) => retry_or_abort(e),
        }
    }

    async fn responder_redeem(&self, blob: &mut SwapBlob) -> StepOutcome {
        let (Some(foreign_contract), Some(secret)) = (blob.foreign_contract.clone(), blob.secret) else {
            return StepOutcome::AbortSwap(Complaint::DelayedRequestorRedemption);
        };
        match self.foreign.redeem(&foreign_contract, secret).await {
            Ok(()) => StepOutcome::Advanced(StepStatus::Redeemed),
            Err(e) => retry_or_abort(e),
        }
    }
}

fn retry_or_abort(err: Error) -> StepOutcome {
    if let Some(complaint) = err.complaint() {
        return StepOutcome::AbortSwap(complaint.clone());
    }
    if err.is_retryable() {
        StepOutcome::RetryEligible
    } else {
        StepOutcome::AbortSwap(Complaint::WrongResponderInitiation(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use crate::types::{AtomContractDetails, Token};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    struct FakeAtom {
        priority: u8,
        published: StdMutex<Option<AtomContractDetails>>,
        counterparty_addr: String,
        secret_hash: [u8; 32],
        value: rust_decimal::Decimal,
        expiry: i64,
        redeemed_with: StdMutex<Option<[u8; 32]>>,
        redeem_secret_for_audit: Option<[u8; 32]>,
    }

    #[async_trait]
    impl Atom for FakeAtom {
        async fn initiate(&self, _to: &str, secret_hash: [u8; 32], _value: rust_decimal::Decimal, _expiry: i64) -> Result<AtomContractDetails> {
            let details = AtomContractDetails::Eth {
                order_id: secret_hash,
                sender_address: self.counterparty_addr.clone(),
            };
            *self.published.lock().unwrap() = Some(details.clone());
            Ok(details)
        }

        async fn audit(&self, _details: &AtomContractDetails, expected_to: &str, min_value: rust_decimal::Decimal) -> Result<(u64, [u8; 32])> {
            if expected_to != self.counterparty_addr {
                return Err(Error::AuditFailed(Complaint::WrongResponderInitiation("addr".into())));
            }
            if min_value > self.value {
                return Err(Error::AuditFailed(Complaint::WrongResponderInitiation("value".into())));
            }
            Ok((self.expiry as u64, self.secret_hash))
        }

        async fn redeem(&self, _details: &AtomContractDetails, secret: [u8; 32]) -> Result<()> {
            *self.redeemed_with.lock().unwrap() = Some(secret);
            Ok(())
        }

        async fn refund(&self, _details: &AtomContractDetails) -> Result<()> {
            Ok(())
        }

        async fn audit_secret(&self, _details: &AtomContractDetails) -> Result<[u8; 32]> {
            self.redeem_secret_for_audit
                .ok_or_else(|| Error::RendezvousTimeout("no secret yet".into()))
        }

        fn priority_code(&self) -> u8 {
            self.priority
        }
    }

    struct FakeRendezvous {
        inbox: StdMutex<HashMap<SwapID, Vec<u8>>>,
        owners: StdMutex<HashMap<(SwapID, bool), String>>,
    }

    impl FakeRendezvous {
        fn new() -> Self {
            Self { inbox: StdMutex::new(HashMap::new()), owners: StdMutex::new(HashMap::new()) }
        }
    }

    #[async_trait]
    impl RendezvousChannel for FakeRendezvous {
        async fn send_owner_address(&self, id: SwapID, from_requestor: bool, addr: &str) -> Result<()> {
            self.owners.lock().unwrap().insert((id, from_requestor), addr.to_string());
            Ok(())
        }

        async fn receive_owner_address(&self, id: SwapID, from_requestor: bool, _deadline: i64) -> Result<String> {
            self.owners
                .lock()
                .unwrap()
                .get(&(id, from_requestor))
                .cloned()
                .ok_or_else(|| Error::RendezvousTimeout("no owner address posted yet".into()))
        }

        async fn send_swap_details(&self, id: SwapID, _from_requestor: bool, bytes: &[u8]) -> Result<()> {
            self.inbox.lock().unwrap().insert(id, bytes.to_vec());
            Ok(())
        }

        async fn receive_swap_details(&self, id: SwapID, _from_requestor: bool, _deadline: i64) -> Result<Vec<u8>> {
            self.inbox
                .lock()
                .unwrap()
                .get(&id)
                .cloned()
                .ok_or_else(|| Error::RendezvousTimeout("nothing delivered yet".into()))
        }
    }

    fn base_blob(id: SwapID, should_initiate_first: bool) -> SwapBlob {
        SwapBlob {
            id,
            send_token: Token::Btc,
            receive_token: Token::Eth,
            send_amount: "100000".into(),
            receive_amount: "1000000000000000".into(),
            send_to: "bob".into(),
            receive_from: "alice".into(),
            secret_hash: None,
            time_lock: None,
            should_initiate_first,
            password: "hunter2".into(),
            step: StepStatus::Inactive,
            secret: None,
            personal_contract: None,
            foreign_contract: None,
            expiry: None,
        }
    }

    #[tokio::test]
    async fn requestor_generate_details_sets_secret_and_expiry() {
        let store = Arc::new(MemoryStore::new());
        let rendezvous = Arc::new(FakeRendezvous::new());
        let id = SwapID::generate();
        let blob = base_blob(id, true);
        store.put_pending_swap(&blob).await.unwrap();

        let personal = FakeAtom {
            priority: 0,
            published: StdMutex::new(None),
            counterparty_addr: "bob".into(),
            secret_hash: [0u8; 32],
            value: "0".parse().unwrap(),
            expiry: 0,
            redeemed_with: StdMutex::new(None),
            redeem_secret_for_audit: None,
        };
        let foreign = FakeAtom {
            priority: 1,
            published: StdMutex::new(None),
            counterparty_addr: "alice".into(),
            secret_hash: [0u8; 32],
            value: "1000000000000000".parse().unwrap(),
            expiry: now_unix() + 1000,
            redeemed_with: StdMutex::new(None),
            redeem_secret_for_audit: None,
        };

        let swap = Swap::new(personal, foreign, store.clone(), rendezvous, "alice".into());
        let mut blob = store.get_pending_swap(id).await.unwrap().unwrap();
        let outcome = swap.step_requestor(&mut blob).await;
        match outcome {
            StepOutcome::Advanced(StepStatus::InitiateDetailsAcquired) => {}
            _ => panic!("expected InitiateDetailsAcquired"),
        }
    }

    #[tokio::test]
    async fn requestor_audit_aborts_on_secret_hash_mismatch() {
        let store = Arc::new(MemoryStore::new());
        let rendezvous = Arc::new(FakeRendezvous::new());
        let id = SwapID::generate();
        let mut blob = base_blob(id, true);
        blob.step = StepStatus::ReceivedSwapDetails;
        blob.secret_hash = Some([1u8; 32]);
        blob.foreign_contract = Some(AtomContractDetails::Eth {
            order_id: [0u8; 32],
            sender_address: "alice".into(),
        });
        store.put_pending_swap(&blob).await.unwrap();

        let personal = FakeAtom {
            priority: 0,
            published: StdMutex::new(None),
            counterparty_addr: "bob".into(),
            secret_hash: [0u8; 32],
            value: "0".parse().unwrap(),
            expiry: 0,
            redeemed_with: StdMutex::new(None),
            redeem_secret_for_audit: None,
        };
        let foreign = FakeAtom {
            priority: 1,
            published: StdMutex::new(None),
            counterparty_addr: "alice".into(),
            // Deliberately mismatched against `blob.secret_hash` above.
            secret_hash: [2u8; 32],
            value: "1000000000000000".parse().unwrap(),
            expiry: now_unix() + 1000,
            redeemed_with: StdMutex::new(None),
            redeem_secret_for_audit: None,
        };

        let swap = Swap::new(personal, foreign, store, rendezvous, "alice".into());
        let outcome = swap.step_requestor(&mut blob).await;
        match outcome {
            StepOutcome::AbortSwap(_) => {}
            _ => panic!("expected an abort on secret hash mismatch"),
        }
    }

    #[tokio::test]
    async fn responder_aborts_when_requestor_never_sends_details() {
        let store = Arc::new(MemoryStore::new());

        struct TimingOutRendezvous;
        #[async_trait]
        impl RendezvousChannel for TimingOutRendezvous {
            async fn send_owner_address(&self, _id: SwapID, _from_requestor: bool, _addr: &str) -> Result<()> {
                Ok(())
            }
            async fn receive_owner_address(&self, _id: SwapID, _from_requestor: bool, _deadline: i64) -> Result<String> {
                Ok("bob".into())
            }
            async fn send_swap_details(&self, _id: SwapID, _from_requestor: bool, _bytes: &[u8]) -> Result<()> {
                Ok(())
            }
            async fn receive_swap_details(&self, _id: SwapID, _from_requestor: bool, _deadline: i64) -> Result<Vec<u8>> {
                Err(Error::RendezvousTimeout("requestor never posted".into()))
            }
        }

        let id = SwapID::generate();
        let mut blob = base_blob(id, false);
        blob.time_lock = Some(now_unix() + REQUESTOR_EXPIRY_SECONDS);
        store.put_pending_swap(&blob).await.unwrap();

        let personal = FakeAtom {
            priority: 0,
            published: StdMutex::new(None),
            counterparty_addr: "bob".into(),
            secret_hash: [0u8; 32],
            value: "0".parse().unwrap(),
            expiry: 0,
            redeemed_with: StdMutex::new(None),
            redeem_secret_for_audit: None,
        };
        let foreign = FakeAtom {
            priority: 1,
            published: StdMutex::new(None),
            counterparty_addr: "alice".into(),
            secret_hash: [0u8; 32],
            value: "1000000000000000".parse().unwrap(),
            expiry: now_unix() + 1000,
            redeemed_with: StdMutex::new(None),
            redeem_secret_for_audit: None,
        };

        let swap = Swap::new(personal, foreign, store, Arc::new(TimingOutRendezvous), "bob".into());
        let outcome = swap.step_responder(&mut blob).await;
        match outcome {
            StepOutcome::AbortSwap(Complaint::DelayedRequestorInitiation) => {}
            _ => panic!("expected DelayedRequestorInitiation"),
        }
    }

    #[tokio::test]
    async fn run_resumes_from_persisted_step_after_simulated_restart() {
        let store = Arc::new(MemoryStore::new());
        let id = SwapID::generate();
        let blob = base_blob(id, true);
        store.put_pending_swap(&blob).await.unwrap();

        // The rendezvous channel is an external service, not local state, so
        // it survives the simulated restart below even though the `Swap`
        // itself is rebuilt from scratch.
        let rendezvous = Arc::new(FakeRendezvous::new());
        rendezvous.send_owner_address(id, false, "bob").await.unwrap();

        let new_swap = |rendezvous: Arc<FakeRendezvous>| {
            let personal = FakeAtom {
                priority: 0,
                published: StdMutex::new(None),
                counterparty_addr: "bob".into(),
                secret_hash: [0u8; 32],
                value: "0".parse().unwrap(),
                expiry: 0,
                redeemed_with: StdMutex::new(None),
                redeem_secret_for_audit: None,
            };
            let foreign = FakeAtom {
                priority: 1,
                published: StdMutex::new(None),
                counterparty_addr: "alice".into(),
                secret_hash: [0u8; 32],
                value: "1000000000000000".parse().unwrap(),
                expiry: now_unix() + 1000,
                redeemed_with: StdMutex::new(None),
                redeem_secret_for_audit: None,
            };
            Swap::new(personal, foreign, store.clone(), rendezvous, "alice".into())
        };

        // First "process": advances exactly one step then the task exits
        // (standing in for a crash), as if the supervisor dropped the task
        // after this step's outcome was persisted.
        let swap_before_restart = new_swap(rendezvous.clone());
        let mut blob = store.get_pending_swap(id).await.unwrap().unwrap();
        let outcome = swap_before_restart.step_requestor(&mut blob).await;
        assert!(matches!(outcome, StepOutcome::Advanced(StepStatus::InitiateDetailsAcquired)));
        blob.step = StepStatus::InitiateDetailsAcquired;
        store.put_pending_swap(&blob).await.unwrap();

        // A brand new `Swap` (fresh `FakeAtom`s, as a restarted process would
        // build from scratch) picks up exactly where the persisted step left
        // off rather than re-running `requestor_generate_details`.
        let swap_after_restart = new_swap(rendezvous.clone());
        let mut resumed = store.get_pending_swap(id).await.unwrap().unwrap();
        assert_eq!(resumed.step, StepStatus::InitiateDetailsAcquired);
        let outcome = swap_after_restart.step_requestor(&mut resumed).await;
        assert!(matches!(outcome, StepOutcome::Advanced(StepStatus::Initiated)));
    }

    #[tokio::test]
    async fn requestor_initiate_fetches_destination_via_owner_address_exchange() {
        struct AddressCapturingAtom {
            requested_to: StdMutex<Option<String>>,
        }

        #[async_trait]
        impl Atom for AddressCapturingAtom {
            async fn initiate(&self, to: &str, secret_hash: [u8; 32], _value: rust_decimal::Decimal, _expiry: i64) -> Result<AtomContractDetails> {
                *self.requested_to.lock().unwrap() = Some(to.to_string());
                Ok(AtomContractDetails::Eth { order_id: secret_hash, sender_address: to.to_string() })
            }
            async fn audit(&self, _details: &AtomContractDetails, _expected_to: &str, _min_value: rust_decimal::Decimal) -> Result<(u64, [u8; 32])> {
                unreachable!("audit is not exercised by this step")
            }
            async fn redeem(&self, _details: &AtomContractDetails, _secret: [u8; 32]) -> Result<()> {
                unreachable!("redeem is not exercised by this step")
            }
            async fn refund(&self, _details: &AtomContractDetails) -> Result<()> {
                unreachable!("refund is not exercised by this step")
            }
            async fn audit_secret(&self, _details: &AtomContractDetails) -> Result<[u8; 32]> {
                unreachable!("audit_secret is not exercised by this step")
            }
            fn priority_code(&self) -> u8 {
                0
            }
        }

        let store = Arc::new(MemoryStore::new());
        let rendezvous = Arc::new(FakeRendezvous::new());
        let id = SwapID::generate();
        let mut blob = base_blob(id, true);
        // `send_to` is a placeholder: the real destination only ever comes
        // from the owner-address exchange below.
        blob.send_to = "PLACEHOLDER".into();
        blob.secret_hash = Some([9u8; 32]);
        blob.expiry = Some(now_unix() + 1000);
        blob.step = StepStatus::InitiateDetailsAcquired;
        store.put_pending_swap(&blob).await.unwrap();

        // The responder posts its real receiving address to its own slot
        // before the requestor ever asks for it.
        rendezvous.send_owner_address(id, false, "bobs_real_address").await.unwrap();

        let personal = AddressCapturingAtom { requested_to: StdMutex::new(None) };
        let foreign = FakeAtom {
            priority: 1,
            published: StdMutex::new(None),
            counterparty_addr: "alice".into(),
            secret_hash: [0u8; 32],
            value: "1000000000000000".parse().unwrap(),
            expiry: now_unix() + 2000,
            redeemed_with: StdMutex::new(None),
            redeem_secret_for_audit: None,
        };

        let swap = Swap::new(personal, foreign, store, rendezvous, "alices_real_address".into());
        let outcome = swap.step_requestor(&mut blob).await;
        assert!(matches!(outcome, StepOutcome::Advanced(StepStatus::Initiated)));
        assert_eq!(swap.personal.requested_to.lock().unwrap().as_deref(), Some("bobs_real_address"));
    }
}
