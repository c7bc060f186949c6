//! Anchor contract client over `ethers`.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use ethers::contract::abigen;
use ethers::contract::ContractError;
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Middleware, Provider, ProviderError};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, H256, U256};

use anchora_core::retry::{retry, RetryPolicy};

use crate::error::ChainError;

abigen!(
    InvoiceAnchor,
    r#"[
        function anchorBatch(bytes32 merkleRoot, uint256 batchSize, string metadataURI)
        function verifyInvoiceByCID(bytes32 merkleRoot, string cid, bytes32[] proof) view returns (bool)
        function registerIndividualInvoice(bytes32 merkleRoot, string invoiceId, string cid, bytes32 invoiceHash)
        function getBatch(bytes32 merkleRoot) view returns (bytes32 merkleRoot, uint256 batchSize, address issuer, string metadataURI, uint256 timestamp)
        event BatchAnchored(bytes32 indexed merkleRoot, uint256 batchSize, address indexed issuer, string metadataURI)
    ]"#
);

type ReadProvider = Provider<Http>;
type SigningClient = SignerMiddleware<Provider<Http>, LocalWallet>;

/// Gas headroom applied on top of the node's estimate, in percent.
const GAS_HEADROOM_PERCENT: u64 = 20;

/// Configuration for the anchor contract client.
#[derive(Debug, Clone)]
pub struct ChainClientConfig {
    /// JSON-RPC endpoint URL.
    pub rpc_url: String,
    /// Anchor contract address (`0x` + 40 hex chars).
    pub contract_address: String,
    /// EVM chain id the signing key is bound to.
    pub chain_id: u64,
    /// Hex-encoded signing key. `None` leaves the client read-only.
    pub private_key: Option<String>,
    /// Upper bound on the gas price, in wei.
    pub max_gas_price_wei: u128,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Backoff policy for transient RPC failures.
    pub retry: RetryPolicy,
}

impl ChainClientConfig {
    /// Configuration with default limits (100 gwei cap, 30 s timeout).
    pub fn new(
        rpc_url: impl Into<String>,
        contract_address: impl Into<String>,
        chain_id: u64,
    ) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            contract_address: contract_address.into(),
            chain_id,
            private_key: None,
            max_gas_price_wei: 100_000_000_000,
            timeout_secs: 30,
            retry: RetryPolicy::default(),
        }
    }

    /// Attach a signing key.
    pub fn with_private_key(mut self, key: impl Into<String>) -> Self {
        self.private_key = Some(key.into());
        self
    }
}

/// The anchored batch tuple as stored by the contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnchoredBatch {
    /// `0x`-prefixed Merkle root.
    pub merkle_root: String,
    /// Number of invoices under the root.
    pub batch_size: u64,
    /// `0x`-prefixed address that anchored the batch.
    pub issuer: String,
    /// IPFS URI of the batch metadata document.
    pub metadata_uri: String,
    /// Anchor timestamp (unix seconds, contract clock).
    pub timestamp: u64,
}

/// Minimal receipt view consumed by the confirmation poller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    /// `0x`-prefixed transaction hash.
    pub tx_hash: String,
    /// Block the transaction was mined in, once mined.
    pub block_number: Option<u64>,
    /// Whether the receipt status marks success.
    pub success: bool,
}

/// Anchor contract client. `Send + Sync`; share via `Arc`.
#[derive(Debug)]
pub struct ChainClient {
    provider: Arc<ReadProvider>,
    reader: InvoiceAnchor<ReadProvider>,
    writer: Option<InvoiceAnchor<SigningClient>>,
    retry: RetryPolicy,
    max_gas_price: U256,
}

impl ChainClient {
    /// Build a client from configuration.
    pub fn new(config: ChainClientConfig) -> Result<Self, ChainError> {
        let contract_address = Address::from_str(&config.contract_address).map_err(|_| {
            ChainError::Config(format!(
                "invalid contract address: {}",
                config.contract_address
            ))
        })?;

        let url = reqwest::Url::parse(&config.rpc_url)
            .map_err(|e| ChainError::Config(format!("invalid RPC URL: {e}")))?;
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ChainError::Config(format!("failed to build HTTP client: {e}")))?;
        let provider = Arc::new(Provider::new(Http::new_with_client(url, http_client)));

        let reader = InvoiceAnchor::new(contract_address, provider.clone());

        let writer = match &config.private_key {
            Some(key) => {
                let wallet = LocalWallet::from_str(key)
                    .map_err(|e| ChainError::Config(format!("invalid private key: {e}")))?
                    .with_chain_id(config.chain_id);
                tracing::info!(signer = %format!("{:?}", wallet.address()), chain_id = config.chain_id, "chain client signing enabled");
                let signing = Arc::new(SignerMiddleware::new((*provider).clone(), wallet));
                Some(InvoiceAnchor::new(contract_address, signing))
            }
            None => {
                tracing::warn!("no private key configured; chain client is read-only");
                None
            }
        };

        Ok(Self {
            provider,
            reader,
            writer,
            retry: config.retry,
            max_gas_price: U256::from(config.max_gas_price_wei),
        })
    }

    /// Whether the client can send state-changing transactions.
    pub fn can_sign(&self) -> bool {
        self.writer.is_some()
    }

    /// Anchor a batch root on-chain, returning the transaction hash.
    ///
    /// Gas is estimated with 20% headroom; the gas price is read from the
    /// node and clamped to the configured maximum. The transaction itself
    /// is sent exactly once.
    pub async fn anchor_batch(
        &self,
        merkle_root: &str,
        batch_size: u64,
        metadata_uri: &str,
    ) -> Result<String, ChainError> {
        let writer = self.writer.as_ref().ok_or(ChainError::NoSigner {
            operation: "anchorBatch",
        })?;
        let root = parse_bytes32("anchorBatch", merkle_root)?;

        let call = writer.anchor_batch(root, U256::from(batch_size), metadata_uri.to_string());

        let estimated = retry(&self.retry, ChainError::is_retryable, || async {
            call.estimate_gas()
                .await
                .map_err(|e| classify("anchorBatch gas estimation", e))
        })
        .await?;
        let gas = estimated * U256::from(100 + GAS_HEADROOM_PERCENT) / U256::from(100u64);

        let node_price = retry(&self.retry, ChainError::is_retryable, || async {
            self.provider
                .get_gas_price()
                .await
                .map_err(|e| provider_error("anchorBatch gas price", e))
        })
        .await?;
        let gas_price = node_price.min(self.max_gas_price);
        if gas_price < node_price {
            tracing::warn!(
                node_price = %node_price,
                clamped = %gas_price,
                "gas price clamped to configured maximum"
            );
        }

        // Single send per claimed batch; a failure here fails the batch.
        let call = call.gas(gas).gas_price(gas_price);
        let pending = call
            .send()
            .await
            .map_err(|e| classify("anchorBatch", e))?;
        let tx_hash = format!("{:?}", pending.tx_hash());
        tracing::info!(tx_hash = %tx_hash, batch_size, "anchor transaction sent");
        Ok(tx_hash)
    }

    /// Read-only inclusion check against the anchored root.
    pub async fn verify_invoice_by_cid(
        &self,
        merkle_root: &str,
        cid: &str,
        proof: &[String],
    ) -> Result<bool, ChainError> {
        let root = parse_bytes32("verifyInvoiceByCID", merkle_root)?;
        let proof: Vec<[u8; 32]> = proof
            .iter()
            .map(|p| parse_bytes32("verifyInvoiceByCID", p))
            .collect::<Result<_, _>>()?;

        retry(&self.retry, ChainError::is_retryable, || async {
            self.reader
                .verify_invoice_by_cid(root, cid.to_string(), proof.clone())
                .call()
                .await
                .map_err(|e| classify("verifyInvoiceByCID", e))
        })
        .await
    }

    /// Best-effort per-invoice indexing write.
    pub async fn register_individual_invoice(
        &self,
        merkle_root: &str,
        invoice_id: &str,
        cid: &str,
        invoice_hash: &str,
    ) -> Result<String, ChainError> {
        let writer = self.writer.as_ref().ok_or(ChainError::NoSigner {
            operation: "registerIndividualInvoice",
        })?;
        let root = parse_bytes32("registerIndividualInvoice", merkle_root)?;
        let hash = parse_bytes32("registerIndividualInvoice", invoice_hash)?;

        let call =
            writer.register_individual_invoice(root, invoice_id.to_string(), cid.to_string(), hash);
        let pending = call
            .send()
            .await
            .map_err(|e| classify("registerIndividualInvoice", e))?;
        Ok(format!("{:?}", pending.tx_hash()))
    }

    /// Fetch the anchored batch tuple; `None` when the root is unknown.
    pub async fn get_batch(&self, merkle_root: &str) -> Result<Option<AnchoredBatch>, ChainError> {
        let root = parse_bytes32("getBatch", merkle_root)?;

        let (stored_root, batch_size, issuer, metadata_uri, timestamp) =
            retry(&self.retry, ChainError::is_retryable, || async {
                self.reader
                    .get_batch(root)
                    .call()
                    .await
                    .map_err(|e| classify("getBatch", e))
            })
            .await?;

        if stored_root == [0u8; 32] {
            return Ok(None);
        }
        Ok(Some(AnchoredBatch {
            merkle_root: format!("0x{}", hex::encode(stored_root)),
            batch_size: batch_size.as_u64(),
            issuer: format!("{:?}", issuer),
            metadata_uri,
            timestamp: timestamp.as_u64(),
        }))
    }

    /// Receipt lookup; `None` while the transaction is unmined.
    pub async fn get_transaction_receipt(
        &self,
        tx_hash: &str,
    ) -> Result<Option<TxReceipt>, ChainError> {
        let hash = H256::from_str(tx_hash).map_err(|e| ChainError::Malformed {
            operation: "getTransactionReceipt".to_string(),
            reason: format!("invalid transaction hash {tx_hash:?}: {e}"),
        })?;

        let receipt = retry(&self.retry, ChainError::is_retryable, || async {
            self.provider
                .get_transaction_receipt(hash)
                .await
                .map_err(|e| provider_error("getTransactionReceipt", e))
        })
        .await?;

        Ok(receipt.map(|r| TxReceipt {
            tx_hash: tx_hash.to_string(),
            block_number: r.block_number.map(|b| b.as_u64()),
            success: r.status.map(|s| s.as_u64() == 1).unwrap_or(false),
        }))
    }

    /// Current chain head height.
    pub async fn get_current_block(&self) -> Result<u64, ChainError> {
        let block = retry(&self.retry, ChainError::is_retryable, || async {
            self.provider
                .get_block_number()
                .await
                .map_err(|e| provider_error("getCurrentBlock", e))
        })
        .await?;
        Ok(block.as_u64())
    }

    /// Whether `tx_hash` has a successful receipt buried at least
    /// `required_confirmations` blocks deep.
    pub async fn is_confirmed(
        &self,
        tx_hash: &str,
        required_confirmations: u64,
    ) -> Result<bool, ChainError> {
        let Some(receipt) = self.get_transaction_receipt(tx_hash).await? else {
            return Ok(false);
        };
        if !receipt.success {
            return Ok(false);
        }
        let Some(mined_at) = receipt.block_number else {
            return Ok(false);
        };
        let current = self.get_current_block().await?;
        Ok(confirmation_depth(current, mined_at) >= required_confirmations)
    }
}

/// Confirmation depth of a transaction mined at `mined_at` when the head is
/// `current`: the mined block itself counts as one confirmation.
pub fn confirmation_depth(current: u64, mined_at: u64) -> u64 {
    current.saturating_sub(mined_at).saturating_add(1)
}

/// Decode a `0x`-prefixed (or bare) 64-char hex string into 32 bytes.
fn parse_bytes32(operation: &str, value: &str) -> Result<[u8; 32], ChainError> {
    let stripped = value.strip_prefix("0x").unwrap_or(value);
    let bytes = hex::decode(stripped).map_err(|e| ChainError::Malformed {
        operation: operation.to_string(),
        reason: format!("invalid hex {value:?}: {e}"),
    })?;
    let len = bytes.len();
    bytes.try_into().map_err(|_| ChainError::Malformed {
        operation: operation.to_string(),
        reason: format!("expected 32 bytes, got {len}"),
    })
}

fn classify<M: Middleware>(operation: &str, e: ContractError<M>) -> ChainError {
    match e {
        ContractError::Revert(data) => ChainError::Reverted {
            operation: operation.to_string(),
            reason: format!("execution reverted: 0x{}", hex::encode(&data)),
        },
        ContractError::MiddlewareError { e } => split_by_message(operation, e.to_string()),
        ContractError::ProviderError { e } => split_by_message(operation, e.to_string()),
        other => ChainError::Malformed {
            operation: operation.to_string(),
            reason: other.to_string(),
        },
    }
}

fn provider_error(operation: &str, e: ProviderError) -> ChainError {
    split_by_message(operation, e.to_string())
}

/// Reverts surface through middleware as JSON-RPC errors; everything else
/// at that layer is transport.
fn split_by_message(operation: &str, message: String) -> ChainError {
    if message.contains("revert") || message.contains("invalid argument") {
        ChainError::Reverted {
            operation: operation.to_string(),
            reason: message,
        }
    } else {
        ChainError::Transport {
            operation: operation.to_string(),
            reason: message,
        }
    }
}
