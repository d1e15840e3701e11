//! SecureFlow contract client.
//!
//! `EscrowReader` and `EscrowWriter` are the seams the rest of the crate
//! talks to; `SecureFlowClient` implements both over an alloy provider.

use alloy::primitives::{Address, TxHash, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info};

use crate::onchain::abi::ISecureFlow;
use crate::onchain::types::{EscrowRating, EscrowSummary, FreelancerRating};

/// Raw `getApplicationsPage` record.
pub type ApplicationTuple = ISecureFlow::Application;

#[derive(Error, Debug)]
pub enum ContractError {
    #[error("contract call failed: {0}")]
    Call(#[from] alloy::contract::Error),
    #[error("transaction failed: {0}")]
    PendingTx(#[from] alloy::providers::PendingTransactionError),
    #[error("value out of range for {0}")]
    OutOfRange(&'static str),
    #[error("client setup failed: {0}")]
    Setup(String),
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Whether the revert text says the escrow was already rated.
    pub fn is_already_rated(&self) -> bool {
        self.to_string().to_lowercase().contains("already rated")
    }
}

#[async_trait]
pub trait EscrowReader: Send + Sync {
    /// One past the highest escrow id (ids start at 1).
    async fn next_escrow_id(&self) -> Result<u64, ContractError>;
    async fn escrow_summary(&self, escrow_id: u64) -> Result<EscrowSummary, ContractError>;
    async fn application_count(&self, job_id: u64) -> Result<u64, ContractError>;
    async fn applications_page(
        &self,
        job_id: u64,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<ApplicationTuple>, ContractError>;
    async fn freelancer_rating(&self, freelancer: Address)
        -> Result<FreelancerRating, ContractError>;
    async fn escrow_rating(&self, escrow_id: u64) -> Result<EscrowRating, ContractError>;
}

#[async_trait]
pub trait EscrowWriter: Send + Sync {
    async fn accept_freelancer(
        &self,
        job_id: u64,
        freelancer: Address,
    ) -> Result<TxHash, ContractError>;
    async fn rate_freelancer(&self, escrow_id: u64, rating: u8) -> Result<TxHash, ContractError>;
}

/// alloy-backed client for the SecureFlow escrow contract.
#[derive(Clone)]
pub struct SecureFlowClient {
    contract: ISecureFlow::ISecureFlowInstance<DynProvider>,
}

impl SecureFlowClient {
    pub fn new(address: Address, provider: DynProvider) -> Self {
        Self {
            contract: ISecureFlow::new(address, provider),
        }
    }

    /// Read-only client over HTTP.
    pub fn connect_http(rpc_url: &str, address: Address) -> Result<Self, ContractError> {
        let url = rpc_url
            .parse()
            .map_err(|e| ContractError::Setup(format!("bad rpc url {rpc_url}: {e}")))?;
        let provider = ProviderBuilder::new().connect_http(url).erased();
        info!(rpc = rpc_url, contract = %address, "SecureFlow client ready (read-only)");
        Ok(Self::new(address, provider))
    }

    /// Client that can also send transactions, signing with `private_key`.
    pub fn connect_with_signer(
        rpc_url: &str,
        address: Address,
        private_key: &str,
    ) -> Result<Self, ContractError> {
        let signer: PrivateKeySigner = private_key
            .trim()
            .parse()
            .map_err(|e| ContractError::Setup(format!("invalid private key: {e}")))?;
        let sender = signer.address();
        let url = rpc_url
            .parse()
            .map_err(|e| ContractError::Setup(format!("bad rpc url {rpc_url}: {e}")))?;
        let provider = ProviderBuilder::new().wallet(signer).connect_http(url).erased();
        info!(rpc = rpc_url, contract = %address, sender = %sender, "SecureFlow client ready");
        Ok(Self::new(address, provider))
    }

    pub fn address(&self) -> Address {
        *self.contract.address()
    }

    pub fn provider(&self) -> &DynProvider {
        self.contract.provider()
    }
}

fn to_u64(value: U256, what: &'static str) -> Result<u64, ContractError> {
    u64::try_from(value).map_err(|_| ContractError::OutOfRange(what))
}

#[async_trait]
impl EscrowReader for SecureFlowClient {
    async fn next_escrow_id(&self) -> Result<u64, ContractError> {
        let next = self.contract.nextEscrowId().call().await?;
        to_u64(next, "nextEscrowId")
    }

    async fn escrow_summary(&self, escrow_id: u64) -> Result<EscrowSummary, ContractError> {
        let ret = self
            .contract
            .getEscrowSummary(U256::from(escrow_id))
            .call()
            .await?;
        Ok(EscrowSummary::from_return(escrow_id, ret))
    }

    async fn application_count(&self, job_id: u64) -> Result<u64, ContractError> {
        let count = self
            .contract
            .getApplicationCount(U256::from(job_id))
            .call()
            .await?;
        to_u64(count, "getApplicationCount")
    }

    async fn applications_page(
        &self,
        job_id: u64,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<ApplicationTuple>, ContractError> {
        let page = self
            .contract
            .getApplicationsPage(U256::from(job_id), U256::from(offset), U256::from(limit))
            .call()
            .await?;
        debug!(job_id, offset, limit, returned = page.len(), "applications page");
        Ok(page)
    }

    async fn freelancer_rating(
        &self,
        freelancer: Address,
    ) -> Result<FreelancerRating, ContractError> {
        let ret = self.contract.getFreelancerRating(freelancer).call().await?;
        Ok(FreelancerRating::from_return(ret))
    }

    async fn escrow_rating(&self, escrow_id: u64) -> Result<EscrowRating, ContractError> {
        let ret = self
            .contract
            .getEscrowRating(U256::from(escrow_id))
            .call()
            .await?;
        Ok(EscrowRating::from_return(ret))
    }
}

#[async_trait]
impl EscrowWriter for SecureFlowClient {
    async fn accept_freelancer(
        &self,
        job_id: u64,
        freelancer: Address,
    ) -> Result<TxHash, ContractError> {
        let pending = self
            .contract
            .acceptFreelancer(U256::from(job_id), freelancer)
            .send()
            .await?;
        let tx_hash = pending.watch().await?;
        info!(job_id, freelancer = %freelancer, tx = %tx_hash, "freelancer accepted");
        Ok(tx_hash)
    }

    async fn rate_freelancer(&self, escrow_id: u64, rating: u8) -> Result<TxHash, ContractError> {
        let pending = self
            .contract
            .rateFreelancer(U256::from(escrow_id), rating)
            .send()
            .await?;
        let tx_hash = pending.watch().await?;
        info!(escrow_id, rating, tx = %tx_hash, "freelancer rated");
        Ok(tx_hash)
    }
}
