//! # Smart Account Client
//!
//! Drives a [`SmartAccount`] through the user-operation lifecycle:
//!
//! 1. Resolve deployment state (falling back to the predicted address)
//! 2. Fetch the nonce under the signer's nonce key
//! 3. Build calldata and attach factory data for the first operation
//! 4. Fill fees, a stub signature, paymaster data and gas estimates
//! 5. Sign with the account's signer
//! 6. Submit to the bundler and poll for the receipt
//!
//! The client performs no retries; collaborators own that policy.

use crate::account::SmartAccount;
use crate::chain::{BundlerClient, ChainStateReader, PaymasterClient, UserOperationReceipt};
use crate::signature::ValidityWindow;
use crate::signer::{Signer, SigningContext};
use crate::types::Call;
use crate::user_op::{SignedUserOperation, UserOperation};
use crate::{Error, Result};
use alloy_primitives::{Address, B256};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

/// Default receipt polling interval
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Account, signer and collaborators bundled together
pub struct SmartAccountClient<S: Signer> {
    account: RwLock<SmartAccount>,
    signer: S,
    reader: Arc<dyn ChainStateReader>,
    bundler: Arc<dyn BundlerClient>,
    paymaster: Option<Arc<dyn PaymasterClient>>,
    window: ValidityWindow,
    poll_interval: Duration,
}

impl<S: Signer> SmartAccountClient<S> {
    pub fn new(
        account: SmartAccount,
        signer: S,
        reader: Arc<dyn ChainStateReader>,
        bundler: Arc<dyn BundlerClient>,
    ) -> Self {
        Self {
            account: RwLock::new(account),
            signer,
            reader,
            bundler,
            paymaster: None,
            window: ValidityWindow::unbounded(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_paymaster(mut self, paymaster: Arc<dyn PaymasterClient>) -> Self {
        self.paymaster = Some(paymaster);
        self
    }

    pub fn with_validity_window(mut self, window: ValidityWindow) -> Self {
        self.window = window;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn signer(&self) -> &S {
        &self.signer
    }

    pub fn reader(&self) -> &dyn ChainStateReader {
        self.reader.as_ref()
    }

    pub async fn address(&self) -> Address {
        self.account.read().await.address()
    }

    /// Snapshot of the account
    pub async fn account(&self) -> SmartAccount {
        self.account.read().await.clone()
    }

    /// Signing context for the account
    pub async fn signing_context(&self) -> SigningContext {
        let account = self.account.read().await;
        SigningContext::new(account.config().clone(), account.address()).with_window(self.window)
    }

    /// Build a fully estimated operation carrying a stub signature
    #[instrument(skip(self, calls), fields(calls = calls.len()))]
    pub async fn prepare_user_operation(&self, calls: &[Call]) -> Result<UserOperation> {
        let ctx = self.signing_context().await;
        let config = &ctx.config;
        let chain_id = config.chain_id()?;

        let mut account = self.account.write().await;
        account.resolve(self.reader.as_ref()).await?;
        let nonce = account
            .get_nonce(self.reader.as_ref(), self.signer.nonce_key(&ctx))
            .await?;
        let mut op = account.build_user_operation(calls, nonce)?;
        drop(account);

        let prices = self.bundler.gas_prices().await?;
        op.max_fee_per_gas = prices.max_fee_per_gas;
        op.max_priority_fee_per_gas = prices.max_priority_fee_per_gas;
        op.signature = self.signer.stub_signature(&ctx).await?;

        let mut sponsored_gas = None;
        if let Some(paymaster) = &self.paymaster {
            if let Some(sponsorship) = paymaster.sponsor(&op, config.entry_point, chain_id).await? {
                debug!(paymaster = %sponsorship.paymaster.paymaster, "operation sponsored");
                op.paymaster = Some(sponsorship.paymaster);
                sponsored_gas = sponsorship.gas;
            }
        }

        let estimate = match sponsored_gas {
            Some(gas) => gas,
            None => {
                self.bundler
                    .estimate_user_operation_gas(&op, config.entry_point, config.entry_point_version)
                    .await?
            }
        };
        estimate.apply(&mut op);

        debug!(
            sender = %op.sender,
            nonce = %op.nonce,
            deploys = op.is_deployment(),
            "prepared user operation"
        );
        Ok(op)
    }

    /// Replace the stub with a real signature
    pub async fn sign_user_operation(&self, op: UserOperation) -> Result<SignedUserOperation> {
        let ctx = self.signing_context().await;
        self.signer.sign_user_operation(&ctx, op).await
    }

    /// Prepare, sign and submit `calls`, returning the operation hash
    #[instrument(skip(self, calls), fields(calls = calls.len()))]
    pub async fn send_calls(&self, calls: &[Call]) -> Result<B256> {
        let op = self.prepare_user_operation(calls).await?;
        let signed = self.sign_user_operation(op).await?;
        self.send_signed(&signed).await
    }

    /// Submit an already signed operation
    pub async fn send_signed(&self, op: &SignedUserOperation) -> Result<B256> {
        let config = self.account.read().await.config().clone();
        let hash = self
            .bundler
            .send_user_operation(op, config.entry_point, config.entry_point_version)
            .await?;
        info!(%hash, sender = %op.sender, "user operation submitted");
        Ok(hash)
    }

    /// Receipt for `hash`, if the bundler has one
    pub async fn get_receipt(&self, hash: B256) -> Result<Option<UserOperationReceipt>> {
        let receipt = self.bundler.get_user_operation_receipt(hash).await?;
        if let Some(receipt) = &receipt {
            self.observe(receipt).await;
        }
        Ok(receipt)
    }

    /// Poll until the operation is included or `timeout` elapses
    pub async fn wait_for_receipt(
        &self,
        hash: B256,
        timeout: Duration,
    ) -> Result<UserOperationReceipt> {
        let start = tokio::time::Instant::now();

        loop {
            if start.elapsed() > timeout {
                return Err(Error::Bundler(format!(
                    "UserOperation {hash} not confirmed within {} seconds",
                    timeout.as_secs()
                )));
            }

            if let Some(receipt) = self.get_receipt(hash).await? {
                return Ok(receipt);
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn observe(&self, receipt: &UserOperationReceipt) {
        let mut account = self.account.write().await;
        if receipt.success && receipt.sender == account.address() && !account.is_deployed() {
            info!(address = %receipt.sender, "account deployed");
            account.mark_deployed();
        }
    }
}
