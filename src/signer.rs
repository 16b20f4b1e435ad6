use crate::chain::{FunctionCall, InvokeTransaction, L1Chain, L2Chain};
use crate::config::SignerConfig;
use crate::error::{BridgeError, ChainSide, Result};
use crate::types::{felt_hex, felt_to_u256, parse_felt, short_string, PendingOperation};
use alloy_primitives::Address;
use alloy_rpc_types::TransactionRequest;
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use starknet_crypto::{get_public_key, pedersen_hash, rfc6979_generate_k, sign, Felt};
use std::fmt;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Ethereum account. Submissions are serialised so two transactions never
/// share a nonce.
pub struct L1Identity {
    signer: PrivateKeySigner,
    address: Address,
    last_nonce: Mutex<Option<u64>>,
}

impl fmt::Debug for L1Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("L1Identity")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

pub fn load_l1_identity(private_key_hex: &str) -> Result<L1Identity> {
    let signer: PrivateKeySigner = private_key_hex
        .trim()
        .parse()
        .map_err(|err| BridgeError::InvalidKey(format!("L1 private key: {err}")))?;
    let address = Signer::address(&signer);
    Ok(L1Identity {
        signer,
        address,
        last_nonce: Mutex::new(None),
    })
}

impl L1Identity {
    pub fn address(&self) -> Address {
        self.address
    }

    /// Fetch nonce, sign and broadcast while holding the identity lock.
    pub async fn send(
        &self,
        chain: &dyn L1Chain,
        mut request: TransactionRequest,
    ) -> Result<PendingOperation> {
        let mut last = self.last_nonce.lock().await;
        let fetched = chain
            .pending_nonce(self.address)
            .await
            .map_err(|err| into_submission(ChainSide::L1, err))?;
        let nonce = match *last {
            Some(previous) if previous >= fetched => previous + 1,
            _ => fetched,
        };
        request.from = Some(self.address);
        request.nonce = Some(nonce);

        let tx_hash = chain
            .send_transaction(&self.signer, request)
            .await
            .map_err(|err| into_submission(ChainSide::L1, err))?;
        *last = Some(nonce);
        info!(tx_hash = %tx_hash, nonce, from = %self.address, "L1 transaction submitted");
        Ok(PendingOperation::submitted(
            ChainSide::L1,
            format!("{tx_hash:#x}"),
        ))
    }
}

/// Calldata layout expected by the account's `__execute__`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountVersion {
    Cairo0,
    Cairo1,
}

impl AccountVersion {
    pub fn from_number(version: u8) -> Result<Self> {
        match version {
            0 => Ok(Self::Cairo0),
            1 => Ok(Self::Cairo1),
            other => Err(BridgeError::config(format!(
                "unsupported account contract version {other} (expected 0 or 1)"
            ))),
        }
    }

    pub fn format_calldata(self, calls: &[FunctionCall]) -> Vec<Felt> {
        let mut out = vec![Felt::from(calls.len() as u64)];
        match self {
            Self::Cairo0 => {
                let mut offset = 0u64;
                let mut flat = Vec::new();
                for call in calls {
                    let len = call.calldata.len() as u64;
                    out.push(call.contract_address);
                    out.push(call.entry_point_selector);
                    out.push(Felt::from(offset));
                    out.push(Felt::from(len));
                    offset += len;
                    flat.extend_from_slice(&call.calldata);
                }
                out.push(Felt::from(flat.len() as u64));
                out.extend(flat);
            }
            Self::Cairo1 => {
                for call in calls {
                    out.push(call.contract_address);
                    out.push(call.entry_point_selector);
                    out.push(Felt::from(call.calldata.len() as u64));
                    out.extend_from_slice(&call.calldata);
                }
            }
        }
        out
    }
}

/// Starknet account contract plus its Stark-curve key.
pub struct L2Identity {
    address: Felt,
    public_key: Felt,
    private_key: Felt,
    version: AccountVersion,
    last_nonce: Mutex<Option<Felt>>,
}

impl fmt::Debug for L2Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("L2Identity")
            .field("address", &felt_hex(&self.address))
            .field("public_key", &felt_hex(&self.public_key))
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

pub fn load_l2_identity(
    public_key: &str,
    private_key: &str,
    account_address: &str,
    contract_version: u8,
) -> Result<L2Identity> {
    let address = parse_felt(account_address)?;
    let private_key = parse_felt(private_key)
        .map_err(|_| BridgeError::InvalidKey("L2 private key is not a felt".to_string()))?;
    if private_key == Felt::ZERO {
        return Err(BridgeError::InvalidKey("L2 private key is zero".to_string()));
    }
    let public_key = parse_felt(public_key)
        .map_err(|_| BridgeError::InvalidKey("L2 public key is not a felt".to_string()))?;
    if get_public_key(&private_key) != public_key {
        return Err(BridgeError::InvalidKey(
            "L2 public key does not match the private key".to_string(),
        ));
    }
    Ok(L2Identity {
        address,
        public_key,
        private_key,
        version: AccountVersion::from_number(contract_version)?,
        last_nonce: Mutex::new(None),
    })
}

impl L2Identity {
    pub fn address(&self) -> Felt {
        self.address
    }

    pub fn public_key(&self) -> Felt {
        self.public_key
    }

    /// Build, sign and submit a v1 invoke of `calls` from this account.
    ///
    /// The nonce is read under the identity lock and never reused: if the node
    /// reports a nonce at or below the last one we submitted, the next one up
    /// is used instead.
    pub async fn invoke(
        &self,
        chain: &dyn L2Chain,
        calls: &[FunctionCall],
        max_fee: Felt,
    ) -> Result<PendingOperation> {
        let calldata = self.version.format_calldata(calls);
        let mut last = self.last_nonce.lock().await;

        let chain_id = chain
            .chain_id()
            .await
            .map_err(|err| into_submission(ChainSide::L2, err))?;
        let fetched = chain
            .nonce(self.address)
            .await
            .map_err(|err| into_submission(ChainSide::L2, err))?;
        let nonce = match *last {
            Some(previous) if felt_to_u256(&previous) >= felt_to_u256(&fetched) => {
                previous + Felt::ONE
            }
            _ => fetched,
        };

        let tx_hash = invoke_v1_hash(self.address, &calldata, max_fee, chain_id, nonce);
        let signature = self.sign(&tx_hash)?;
        let tx = InvokeTransaction {
            sender_address: self.address,
            calldata,
            max_fee,
            signature,
            nonce,
        };

        let returned = chain
            .add_invoke_transaction(&tx)
            .await
            .map_err(|err| into_submission(ChainSide::L2, err))?;
        *last = Some(nonce);
        if returned != tx_hash {
            warn!(
                local = %felt_hex(&tx_hash),
                remote = %felt_hex(&returned),
                "node returned a different transaction hash"
            );
        }
        info!(
            tx_hash = %felt_hex(&returned),
            nonce = %felt_hex(&nonce),
            sender = %felt_hex(&self.address),
            "L2 invoke submitted"
        );
        Ok(PendingOperation::submitted(ChainSide::L2, felt_hex(&returned)))
    }

    fn sign(&self, hash: &Felt) -> Result<Vec<Felt>> {
        let k = rfc6979_generate_k(hash, &self.private_key, None);
        let signature = sign(&self.private_key, hash, &k)
            .map_err(|err| BridgeError::submission(ChainSide::L2, format!("{err:?}")))?;
        Ok(vec![signature.r, signature.s])
    }
}

/// Pedersen hash chain over `data`, finished with its length.
pub fn compute_hash_on_elements(data: &[Felt]) -> Felt {
    let acc = data
        .iter()
        .fold(Felt::ZERO, |acc, item| pedersen_hash(&acc, item));
    pedersen_hash(&acc, &Felt::from(data.len() as u64))
}

pub fn invoke_v1_hash(
    sender: Felt,
    calldata: &[Felt],
    max_fee: Felt,
    chain_id: Felt,
    nonce: Felt,
) -> Felt {
    compute_hash_on_elements(&[
        short_string("invoke"),
        Felt::ONE,
        sender,
        Felt::ZERO,
        compute_hash_on_elements(calldata),
        max_fee,
        chain_id,
        nonce,
    ])
}

fn into_submission(side: ChainSide, err: BridgeError) -> BridgeError {
    match err {
        BridgeError::Submission { .. } => err,
        other => BridgeError::submission(side, other),
    }
}

/// Both identities, read from the environment variables named in `[signer]`.
#[derive(Debug)]
pub struct Credentials {
    pub l1: L1Identity,
    pub l2: L2Identity,
}

impl Credentials {
    pub fn from_env(config: &SignerConfig) -> Result<Self> {
        let l1 = load_l1_identity(&require_env(config.l1_private_key_env())?)?;
        let l2 = load_l2_identity(
            &require_env(config.l2_public_key_env())?,
            &require_env(config.l2_private_key_env())?,
            &require_env(config.l2_account_env())?,
            config.account_contract_version(),
        )?;
        Ok(Self { l1, l2 })
    }
}

fn require_env(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| BridgeError::config(format!("environment variable {name} is not set")))
}
