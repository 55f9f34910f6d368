//! In-memory wallet hosts and chains for unit tests.

use crate::{
    chain::ChainFamily,
    contracts::{EvmContracts, IProjectAdmin, IERC20},
    project::metadata::{MetadataSource, ProjectMetadata},
    rpc::{EvmRpc, SimulationOutcome, SolanaRpc},
    wallet::{
        detector::{InjectedProvider, InjectionPoint, InjectionScope},
        ConnectRoute, EvmWallet, SolanaWallet, WalletAddress, WalletCapability, WalletConnector,
        WalletError, WalletKind,
    },
};
use alloy_primitives::{eip191_hash_message, keccak256, Address, Bytes, B256, U256, U64};
use alloy_sol_types::SolCall;
use anyhow::{anyhow, bail, Context as _};
use async_trait::async_trait;
use k256::ecdsa::SigningKey;
use services_common::evm::rpc::{JsonRpcError, TransactionReceipt, EXECUTION_REVERTED_CODE};
use solana_sdk::{
    hash::Hash,
    pubkey::Pubkey,
    signature::{Keypair, Signature},
    signer::Signer,
    transaction::{Transaction, TransactionError},
};
use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicU32, Ordering},
        Mutex, MutexGuard,
    },
    time::Duration,
};
use uuid::Uuid;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().expect("test mutex poisoned")
}

/// Injection environment the tests write providers into.
#[derive(Default)]
pub struct FakeInjection {
    providers: Mutex<HashMap<InjectionPoint, InjectedProvider>>,
    sdk_wallet_name: Mutex<Option<String>>,
}

impl FakeInjection {
    pub fn inject(&self, point: InjectionPoint, provider: InjectedProvider) {
        lock(&self.providers).insert(point, provider);
    }

    pub fn set_sdk_wallet_name(&self, name: Option<&str>) {
        *lock(&self.sdk_wallet_name) = name.map(str::to_owned);
    }
}

impl InjectionScope for FakeInjection {
    fn injected(&self, point: InjectionPoint) -> Option<InjectedProvider> {
        lock(&self.providers).get(&point).cloned()
    }

    fn sdk_wallet_name(&self) -> Option<String> {
        lock(&self.sdk_wallet_name).clone()
    }
}

/// Secp256k1 key signing the way EVM wallets do for `personal_sign`.
#[derive(Clone)]
pub struct EvmTestKey(SigningKey);

impl EvmTestKey {
    pub fn random() -> Self {
        let seed = keccak256(Uuid::new_v4().as_bytes());
        Self(SigningKey::from_slice(seed.as_slice()).expect("valid secp256k1 scalar"))
    }

    pub fn address(&self) -> Address {
        Address::from_public_key(self.0.verifying_key())
    }

    /// 65 bytes, `r || s || v` with `v` in {27, 28}.
    pub fn personal_sign(&self, message: &[u8]) -> Vec<u8> {
        let hash = eip191_hash_message(message);
        let (signature, recovery_id) = self
            .0
            .sign_prehash_recoverable(hash.as_slice())
            .expect("sign prehash");
        let mut bytes = signature.to_bytes().to_vec();
        bytes.push(27 + recovery_id.to_byte());
        bytes
    }
}

#[derive(Debug, Clone)]
pub enum ConnectBehavior {
    Resolve(WalletAddress),
    Fail(WalletError),
    /// Never answers, like a popup the user walked away from.
    Hang,
    Delay(Duration, WalletAddress),
}

pub enum SignBehavior {
    Solana(Keypair),
    Evm(EvmTestKey),
    Reject,
}

pub struct MockConnector {
    connect: Mutex<ConnectBehavior>,
    sign: SignBehavior,
    connects: AtomicU32,
    disconnects: Mutex<Vec<ChainFamily>>,
}

impl MockConnector {
    pub fn new(connect: ConnectBehavior, sign: SignBehavior) -> Self {
        Self {
            connect: Mutex::new(connect),
            sign,
            connects: AtomicU32::new(0),
            disconnects: Mutex::new(Vec::new()),
        }
    }

    pub fn set_connect(&self, behavior: ConnectBehavior) {
        *lock(&self.connect) = behavior;
    }

    pub fn connects(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> Vec<ChainFamily> {
        lock(&self.disconnects).clone()
    }
}

#[async_trait]
impl WalletConnector for MockConnector {
    async fn connect(
        &self,
        _wallet: WalletKind,
        _route: ConnectRoute,
    ) -> Result<WalletAddress, WalletError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let behavior = lock(&self.connect).clone();
        match behavior {
            ConnectBehavior::Resolve(address) => Ok(address),
            ConnectBehavior::Fail(err) => Err(err),
            ConnectBehavior::Hang => std::future::pending().await,
            ConnectBehavior::Delay(delay, address) => {
                tokio::time::sleep(delay).await;
                Ok(address)
            }
        }
    }

    async fn sign_message(
        &self,
        _family: ChainFamily,
        message: &[u8],
    ) -> Result<Vec<u8>, WalletError> {
        match &self.sign {
            SignBehavior::Solana(keypair) => Ok(keypair.sign_message(message).as_ref().to_vec()),
            SignBehavior::Evm(key) => Ok(key.personal_sign(message)),
            SignBehavior::Reject => Err(WalletError::rejected()),
        }
    }

    async fn disconnect(&self, family: ChainFamily) -> Result<(), WalletError> {
        lock(&self.disconnects).push(family);
        Ok(())
    }
}

#[derive(Default)]
struct SolanaChain {
    accounts: HashMap<Pubkey, Vec<u8>>,
    account_delays: HashMap<Pubkey, Duration>,
    account_reads: usize,
    account_failure: Option<String>,
    priority_fees: Vec<u64>,
    priority_fees_fail: bool,
    simulation: SimulationOutcome,
    simulated: Vec<Transaction>,
    sent: Vec<Transaction>,
    signature_status: Option<Result<(), TransactionError>>,
    block_height: u64,
    last_valid_block_height: Option<u64>,
}

/// Solana cluster kept in memory. Signatures stay unseen until a status is
/// set and blockhashes stay valid until height 1000 unless told otherwise.
#[derive(Default)]
pub struct MockSolanaRpc {
    chain: Mutex<SolanaChain>,
}

impl MockSolanaRpc {
    pub fn put_account(&self, address: Pubkey, data: Vec<u8>) {
        lock(&self.chain).accounts.insert(address, data);
    }

    pub fn delay_account(&self, address: Pubkey, delay: Duration) {
        lock(&self.chain).account_delays.insert(address, delay);
    }

    pub fn fail_account_reads(&self, message: &str) {
        lock(&self.chain).account_failure = Some(message.to_owned());
    }

    pub fn account_reads(&self) -> usize {
        lock(&self.chain).account_reads
    }

    pub fn set_priority_fees(&self, fees: Vec<u64>) {
        lock(&self.chain).priority_fees = fees;
    }

    pub fn fail_priority_fees(&self) {
        lock(&self.chain).priority_fees_fail = true;
    }

    pub fn set_simulation(&self, outcome: SimulationOutcome) {
        lock(&self.chain).simulation = outcome;
    }

    pub fn simulated(&self) -> Vec<Transaction> {
        lock(&self.chain).simulated.clone()
    }

    pub fn sent(&self) -> Vec<Transaction> {
        lock(&self.chain).sent.clone()
    }

    pub fn set_signature_status(&self, status: Option<Result<(), TransactionError>>) {
        lock(&self.chain).signature_status = status;
    }

    pub fn set_block_height(&self, height: u64) {
        lock(&self.chain).block_height = height;
    }

    pub fn set_last_valid_block_height(&self, height: u64) {
        lock(&self.chain).last_valid_block_height = Some(height);
    }
}

#[async_trait]
impl SolanaRpc for MockSolanaRpc {
    async fn account_data(&self, address: &Pubkey) -> anyhow::Result<Option<Vec<u8>>> {
        let delay = {
            let mut chain = lock(&self.chain);
            chain.account_reads += 1;
            if let Some(message) = &chain.account_failure {
                bail!("{message}");
            }
            chain.account_delays.get(address).copied()
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(lock(&self.chain).accounts.get(address).cloned())
    }

    async fn latest_blockhash(&self) -> anyhow::Result<(Hash, u64)> {
        let chain = lock(&self.chain);
        Ok((
            Hash::new_from_array([7; 32]),
            chain.last_valid_block_height.unwrap_or(1_000),
        ))
    }

    async fn block_height(&self) -> anyhow::Result<u64> {
        Ok(lock(&self.chain).block_height)
    }

    async fn recent_prioritization_fees(&self, _accounts: &[Pubkey]) -> anyhow::Result<Vec<u64>> {
        let chain = lock(&self.chain);
        if chain.priority_fees_fail {
            bail!("Method not found");
        }
        Ok(chain.priority_fees.clone())
    }

    async fn simulate(&self, tx: &Transaction) -> anyhow::Result<SimulationOutcome> {
        let mut chain = lock(&self.chain);
        chain.simulated.push(tx.clone());
        Ok(chain.simulation.clone())
    }

    async fn send(&self, tx: &Transaction, _skip_preflight: bool) -> anyhow::Result<Signature> {
        let signature = tx
            .signatures
            .first()
            .copied()
            .context("transaction is not signed")?;
        lock(&self.chain).sent.push(tx.clone());
        Ok(signature)
    }

    async fn signature_status(
        &self,
        _signature: &Signature,
    ) -> anyhow::Result<Option<Result<(), TransactionError>>> {
        Ok(lock(&self.chain).signature_status.clone())
    }
}

/// Solana wallet with configurable capabilities.
pub struct MockSolanaWallet {
    keypair: Keypair,
    capability: WalletCapability,
    reject: bool,
    sent: Mutex<Vec<Transaction>>,
}

impl MockSolanaWallet {
    fn with(capability: WalletCapability, reject: bool) -> Self {
        Self {
            keypair: Keypair::new(),
            capability,
            reject,
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Signs and sends itself, pricing compute on its own.
    pub fn phantom() -> Self {
        Self::with(
            WalletCapability {
                wallet_name: WalletKind::Phantom.to_string(),
                family: ChainFamily::Solana,
                is_installed: true,
                can_sign_transaction: true,
                can_sign_and_send: true,
                can_batch_sign: true,
                supports_priority_fees: true,
            },
            false,
        )
    }

    /// Declines every signature request.
    pub fn rejecting() -> Self {
        Self::with(
            WalletCapability {
                wallet_name: WalletKind::Solflare.to_string(),
                family: ChainFamily::Solana,
                is_installed: true,
                can_sign_transaction: true,
                can_sign_and_send: false,
                can_batch_sign: false,
                supports_priority_fees: false,
            },
            true,
        )
    }

    pub fn sent(&self) -> Vec<Transaction> {
        lock(&self.sent).clone()
    }
}

#[async_trait]
impl SolanaWallet for MockSolanaWallet {
    fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    fn capability(&self) -> WalletCapability {
        self.capability.clone()
    }

    async fn sign_transaction(&self, mut tx: Transaction) -> Result<Transaction, WalletError> {
        if self.reject {
            return Err(WalletError::rejected());
        }
        let blockhash = tx.message.recent_blockhash;
        tx.try_sign(&[&self.keypair], blockhash)
            .map_err(|err| WalletError::new(err.to_string()))?;
        Ok(tx)
    }

    async fn sign_and_send_transaction(&self, tx: Transaction) -> Result<Signature, WalletError> {
        let signed = self.sign_transaction(tx).await?;
        let signature = signed.signatures[0];
        lock(&self.sent).push(signed);
        Ok(signature)
    }
}

/// Stored project registry entry.
#[derive(Debug, Clone)]
pub struct MockProject {
    pub price: U256,
    pub sales: U256,
    pub profit: U256,
    pub total_supply: U256,
    pub active: bool,
    pub crowdfunding_phase: bool,
    pub is_passive: bool,
    pub uri: String,
    pub investor_fee: U256,
    pub owner_fee: U256,
}

pub fn mock_project_admin(price: u64, total_supply: u64, sales: u64) -> MockProject {
    MockProject {
        price: U256::from(price),
        sales: U256::from(sales),
        profit: U256::ZERO,
        total_supply: U256::from(total_supply),
        active: true,
        crowdfunding_phase: true,
        is_passive: false,
        uri: String::new(),
        investor_fee: U256::ZERO,
        owner_fee: U256::ZERO,
    }
}

/// Ordering of what happened on the mock EVM chain, keyed by selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvmEvent {
    Sent([u8; 4]),
    /// First time a successful receipt was handed out.
    Mined([u8; 4]),
}

struct MockTx {
    selector: [u8; 4],
    success: bool,
    polls: u32,
    reported: bool,
}

#[derive(Default)]
struct EvmChain {
    projects: HashMap<u64, MockProject>,
    balances: HashMap<(u64, Address), u64>,
    allowances: HashMap<(Address, Address), U256>,
    transactions: Vec<(Address, Bytes)>,
    pending: HashMap<B256, MockTx>,
    events: Vec<EvmEvent>,
    reverting: HashSet<[u8; 4]>,
    withhold_receipts: bool,
    receipt_delay: u32,
    call_failure: Option<JsonRpcError>,
}

/// Polygon contracts kept in memory. Transactions arrive through
/// [`MockEvmWallet`] and are mined on the first receipt lookup.
#[derive(Default)]
pub struct MockEvmRpc {
    chain: Mutex<EvmChain>,
}

fn reverted(reason: &str) -> anyhow::Error {
    anyhow::Error::new(JsonRpcError {
        code: EXECUTION_REVERTED_CODE,
        message: format!("execution reverted: {reason}"),
        data: None,
    })
    .context("eth_call failed")
}

fn selector(data: &[u8]) -> anyhow::Result<[u8; 4]> {
    data.get(..4)
        .and_then(|bytes| bytes.try_into().ok())
        .context("calldata shorter than a selector")
}

impl MockEvmRpc {
    pub fn contracts(&self) -> EvmContracts {
        EvmContracts {
            project_admin: Address::repeat_byte(0xad),
            payment_token: Address::repeat_byte(0x70),
        }
    }

    pub fn put_project(&self, id: u64, project: MockProject) {
        lock(&self.chain).projects.insert(id, project);
    }

    pub fn put_balance(&self, id: u64, owner: Address, balance: u64) {
        lock(&self.chain).balances.insert((id, owner), balance);
    }

    pub fn put_allowance(&self, owner: Address, spender: Address, allowance: U256) {
        lock(&self.chain)
            .allowances
            .insert((owner, spender), allowance);
    }

    /// Transactions calling `selector` get a failed receipt.
    pub fn revert_on(&self, selector: [u8; 4]) {
        lock(&self.chain).reverting.insert(selector);
    }

    /// Every `eth_call` fails with this node error.
    pub fn fail_calls(&self, code: i64, message: &str) {
        lock(&self.chain).call_failure = Some(JsonRpcError {
            code,
            message: message.into(),
            data: None,
        });
    }

    pub fn withhold_receipts(&self) {
        lock(&self.chain).withhold_receipts = true;
    }

    /// Receipts show up only after this many lookups per transaction.
    pub fn delay_receipts(&self, lookups: u32) {
        lock(&self.chain).receipt_delay = lookups;
    }

    pub fn events(&self) -> Vec<EvmEvent> {
        lock(&self.chain).events.clone()
    }

    pub fn transactions(&self) -> Vec<(Address, Bytes)> {
        lock(&self.chain).transactions.clone()
    }

    fn submit(&self, from: Address, to: Address, data: Bytes) -> anyhow::Result<B256> {
        let selector = selector(&data)?;
        let mut chain = lock(&self.chain);
        let mut preimage = (chain.transactions.len() as u64).to_be_bytes().to_vec();
        preimage.extend_from_slice(&data);
        let hash = keccak256(preimage);
        let success = !chain.reverting.contains(&selector);
        if success && selector == IERC20::approveCall::SELECTOR {
            let approve = IERC20::approveCall::abi_decode(&data, true)?;
            chain
                .allowances
                .insert((from, approve.spender), approve.amount);
        }
        chain.transactions.push((to, data));
        chain.events.push(EvmEvent::Sent(selector));
        chain.pending.insert(
            hash,
            MockTx {
                selector,
                success,
                polls: 0,
                reported: false,
            },
        );
        Ok(hash)
    }
}

#[async_trait]
impl EvmRpc for MockEvmRpc {
    async fn call(&self, _to: Address, data: Bytes) -> anyhow::Result<Bytes> {
        let selector = selector(&data)?;
        let chain = lock(&self.chain);
        if let Some(err) = &chain.call_failure {
            return Err(anyhow::Error::new(err.clone()).context("eth_call failed"));
        }
        let encoded = if selector == IProjectAdmin::returnProjectCall::SELECTOR {
            let call = IProjectAdmin::returnProjectCall::abi_decode(&data, true)?;
            let id = u64::try_from(call.id)?;
            let project = chain
                .projects
                .get(&id)
                .ok_or_else(|| reverted("project does not exist"))?;
            IProjectAdmin::returnProjectCall::abi_encode_returns(&(
                project.price,
                project.sales,
                project.profit,
                project.total_supply,
                Vec::<Address>::new(),
                project.active,
                project.crowdfunding_phase,
                project.uri.clone(),
                project.is_passive,
                project.investor_fee,
                project.owner_fee,
            ))
        } else if selector == IProjectAdmin::balanceOfCall::SELECTOR {
            let call = IProjectAdmin::balanceOfCall::abi_decode(&data, true)?;
            let id = u64::try_from(call.id)?;
            let balance = chain
                .balances
                .get(&(id, call.account))
                .copied()
                .unwrap_or_default();
            IProjectAdmin::balanceOfCall::abi_encode_returns(&(U256::from(balance),))
        } else if selector == IERC20::allowanceCall::SELECTOR {
            let call = IERC20::allowanceCall::abi_decode(&data, true)?;
            let allowance = chain
                .allowances
                .get(&(call.owner, call.spender))
                .copied()
                .unwrap_or_default();
            IERC20::allowanceCall::abi_encode_returns(&(allowance,))
        } else {
            return Err(reverted(&format!("unknown selector {selector:?}")));
        };
        Ok(encoded.into())
    }

    async fn receipt(&self, hash: B256) -> anyhow::Result<Option<TransactionReceipt>> {
        let mut chain = lock(&self.chain);
        let withhold = chain.withhold_receipts;
        let delay = chain.receipt_delay;
        let Some(tx) = chain.pending.get_mut(&hash) else {
            return Ok(None);
        };
        tx.polls += 1;
        if withhold || tx.polls <= delay {
            return Ok(None);
        }
        let receipt = TransactionReceipt {
            transaction_hash: hash,
            block_number: Some(U64::from(1)),
            status: Some(U64::from(u8::from(tx.success))),
        };
        let mined = tx.success && !tx.reported;
        tx.reported = true;
        let selector = tx.selector;
        if mined {
            chain.events.push(EvmEvent::Mined(selector));
        }
        Ok(Some(receipt))
    }
}

/// EVM wallet broadcasting into a [`MockEvmRpc`].
#[derive(Clone)]
pub struct MockEvmWallet {
    address: Address,
    rpc: std::sync::Arc<MockEvmRpc>,
    reject: Option<[u8; 4]>,
}

impl MockEvmWallet {
    pub fn new(rpc: std::sync::Arc<MockEvmRpc>) -> Self {
        Self {
            address: Address::repeat_byte(0x5a),
            rpc,
            reject: None,
        }
    }

    /// Same wallet, but the user declines calls to `selector`.
    pub fn rejecting(&self, selector: [u8; 4]) -> Self {
        Self {
            reject: Some(selector),
            ..self.clone()
        }
    }
}

#[async_trait]
impl EvmWallet for MockEvmWallet {
    fn address(&self) -> Address {
        self.address
    }

    async fn send_transaction(&self, to: Address, data: Bytes) -> Result<B256, WalletError> {
        if self.reject.is_some() && self.reject == selector(&data).ok() {
            return Err(WalletError::rejected());
        }
        self.rpc
            .submit(self.address, to, data)
            .map_err(|err| WalletError::new(format!("{err:#}")))
    }
}

/// Metadata documents by URI. Unknown URIs fail like a dead gateway.
#[derive(Default)]
pub struct MockMetadata {
    documents: Mutex<HashMap<String, ProjectMetadata>>,
}

impl MockMetadata {
    pub fn put(&self, uri: &str, metadata: ProjectMetadata) {
        lock(&self.documents).insert(uri.to_owned(), metadata);
    }
}

#[async_trait]
impl MetadataSource for MockMetadata {
    async fn fetch(&self, uri: &str) -> anyhow::Result<ProjectMetadata> {
        lock(&self.documents)
            .get(uri)
            .cloned()
            .ok_or_else(|| anyhow!("404 Not Found: {uri}"))
    }
}
