//! Simulation controller.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::bail;
use futures::future::join_all;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::RwLock;
use tracing::{info, warn};

use channelpay_common::{format_units, parse_units, Address, Amount, EscrowError, TOKEN_DECIMALS};
use channelpay_escrow::{EscrowConfig, EscrowEngine, MetricsSnapshot, SolvencyReport};
use channelpay_token::{FungibleToken, InMemoryToken};

use crate::metrics::{OperationKind, SimulationMetrics};
use crate::payer::{PayerFactory, SimulatedPayer};
use crate::scenario::{AssertCondition, Expect, FaultType, Scenario, ScenarioStep};

/// Whole tokens minted to every payer.
const INITIAL_BALANCE: &str = "1000000";

/// Channels used by continuous mode.
const CHANNEL_POOL: usize = 8;

/// End-of-run summary.
#[derive(Debug, Clone)]
pub struct SimulationReport {
    /// Controller-side call statistics.
    pub simulation: SimulationMetrics,
    /// Engine counters.
    pub engine: MetricsSnapshot,
    /// Custody check.
    pub solvency: SolvencyReport,
    /// Channels registered or holding escrow.
    pub active_channels: usize,
    /// Accepted payments per payer name.
    pub payments_by_payer: Vec<(String, u64)>,
}

/// Controls the simulation.
pub struct SimulationController {
    /// Number of payers.
    payer_count: usize,
    /// Simulation speed multiplier.
    speed: f64,
    /// Random number generator.
    rng: Arc<RwLock<StdRng>>,
    /// Token backing the engine.
    token: Arc<InMemoryToken>,
    /// Engine under test.
    engine: Arc<EscrowEngine>,
    /// Simulated payers.
    payers: Arc<RwLock<Vec<SimulatedPayer>>>,
    /// Simulation metrics.
    metrics: Arc<RwLock<SimulationMetrics>>,
    /// Running flag.
    running: Arc<RwLock<bool>>,
}

impl SimulationController {
    /// Create a new simulation controller.
    pub fn new(
        payer_count: usize,
        speed: f64,
        seed: Option<u64>,
        config: EscrowConfig,
    ) -> anyhow::Result<Self> {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };

        let token = Arc::new(InMemoryToken::new("Simulated USDC", "sUSDC", TOKEN_DECIMALS));
        let engine = EscrowEngine::new(config, token.clone())?;

        Ok(Self {
            payer_count,
            speed: speed.max(0.001),
            rng: Arc::new(RwLock::new(rng)),
            token,
            engine: Arc::new(engine),
            payers: Arc::new(RwLock::new(Vec::new())),
            metrics: Arc::new(RwLock::new(SimulationMetrics::new())),
            running: Arc::new(RwLock::new(false)),
        })
    }

    /// Initialize the simulation.
    pub async fn initialize(&mut self) -> anyhow::Result<()> {
        info!("Initializing simulation with {} payers", self.payer_count);

        let payers = PayerFactory::create_payers(self.payer_count);
        let balance = parse_units(INITIAL_BALANCE, TOKEN_DECIMALS)?;
        let escrow = self.engine.escrow_address();

        for payer in &payers {
            payer.fund(&self.token, escrow, balance)?;
            info!(
                "Funded payer {} ({}) with {} {}",
                payer.name,
                payer.address,
                INITIAL_BALANCE,
                self.token.symbol()
            );
        }

        *self.payers.write().await = payers;

        Ok(())
    }

    /// Run a scenario. Fails on the first unmet expectation.
    pub async fn run_scenario(&self, scenario: Scenario) -> anyhow::Result<()> {
        info!("Running scenario: {} - {}", scenario.name, scenario.description);

        *self.running.write().await = true;

        for (index, step) in scenario.steps.iter().enumerate() {
            if !*self.running.read().await {
                break;
            }

            if let Err(e) = self.execute_step(step).await {
                *self.running.write().await = false;
                bail!("Scenario {} failed at step {}: {}", scenario.name, index + 1, e);
            }
        }

        *self.running.write().await = false;
        info!("Scenario {} passed", scenario.name);

        Ok(())
    }

    /// Run in continuous mode.
    pub async fn run(&self, duration: Option<Duration>) -> anyhow::Result<()> {
        info!("Running simulation in continuous mode");

        *self.running.write().await = true;

        let engine = self.engine.clone();
        let payers = self.payers.clone();
        let metrics = self.metrics.clone();
        let rng = self.rng.clone();
        let running = self.running.clone();
        let speed = self.speed;

        let handle = tokio::spawn(async move {
            loop {
                if !*running.read().await {
                    break;
                }

                let payers_guard = payers.read().await;
                if payers_guard.is_empty() {
                    drop(payers_guard);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    continue;
                }

                // One payment per payer, all in flight at once.
                let batch: Vec<(usize, String, Amount)> = {
                    let mut rng_guard = rng.write().await;
                    (0..payers_guard.len())
                        .map(|i| {
                            let channel = format!("channel-{}", rng_guard.gen_range(0..CHANNEL_POOL));
                            let whole: u64 = rng_guard.gen_range(1..=100);
                            let amount = Amount::from(whole) * 10u128.pow(TOKEN_DECIMALS);
                            (i, channel, amount)
                        })
                        .collect()
                };

                let calls = batch.iter().map(|(i, channel, amount)| {
                    let engine = &engine;
                    let payer = &payers_guard[*i];
                    async move {
                        let started = Instant::now();
                        let result = engine.pay(payer.address, channel.as_str(), *amount).await;
                        if result.is_ok() {
                            payer.record_payment();
                        }
                        (started.elapsed(), result.map(|outcome| OperationKind::from(&outcome)))
                    }
                });

                for (elapsed, result) in join_all(calls).await {
                    record(&metrics, elapsed, &result).await;
                }
                drop(payers_guard);

                let register = rng.write().await.gen_bool(0.1);
                if register {
                    let channel = format!("channel-{}", rng.write().await.gen_range(0..CHANNEL_POOL));
                    if !engine.get_channel(channel.as_str()).await.registered {
                        let wallet = Address::from_label(&format!("wallet:{}", channel));
                        let started = Instant::now();
                        let result = engine
                            .register_channel(engine.owner(), channel.as_str(), wallet)
                            .await
                            .map(|_| OperationKind::Register);
                        record(&metrics, started.elapsed(), &result).await;
                    }
                }

                // Wait based on speed
                let delay = Duration::from_millis((1000.0 / speed) as u64);
                tokio::time::sleep(delay).await;
            }
        });

        // Wait for duration or Ctrl+C
        match duration {
            Some(d) => {
                tokio::time::sleep(d).await;
            }
            None => {
                tokio::signal::ctrl_c().await?;
            }
        }

        *self.running.write().await = false;
        handle.await?;

        Ok(())
    }

    /// Execute a single scenario step.
    async fn execute_step(&self, step: &ScenarioStep) -> anyhow::Result<()> {
        match step {
            ScenarioStep::Wait { millis } => {
                let adjusted = (*millis as f64 / self.speed) as u64;
                info!("Waiting {}ms (adjusted: {}ms)", millis, adjusted);
                tokio::time::sleep(Duration::from_millis(adjusted)).await;
            }
            ScenarioStep::Pay {
                payer,
                channel,
                amount,
                expect,
            } => {
                info!("Paying {} into {} from {}", amount, channel, payer);

                let from = self.resolve(payer).await;
                let amount = parse_units(amount, TOKEN_DECIMALS)?;

                let started = Instant::now();
                let result = self
                    .engine
                    .pay(from, channel.as_str(), amount)
                    .await
                    .map(|outcome| OperationKind::from(&outcome));
                record(&self.metrics, started.elapsed(), &result).await;

                if result.is_ok() {
                    if let Some(p) = self.payers.read().await.iter().find(|p| p.address == from) {
                        p.record_payment();
                    }
                }
                check_expectation("pay", &result, expect)?;
            }
            ScenarioStep::Register {
                caller,
                channel,
                wallet,
                expect,
            } => {
                info!("Registering {} to {} as {}", channel, wallet, caller);

                let caller = self.resolve(caller).await;
                let wallet = self.resolve(wallet).await;

                let started = Instant::now();
                let result = self
                    .engine
                    .register_channel(caller, channel.as_str(), wallet)
                    .await
                    .map(|_| OperationKind::Register);
                record(&self.metrics, started.elapsed(), &result).await;

                check_expectation("register", &result, expect)?;
            }
            ScenarioStep::InjectFault { fault_type, target } => {
                info!("Injecting fault {:?} on {}", fault_type, target);
                let account = self.resolve(target).await;
                match fault_type {
                    FaultType::AccountFrozen => self.token.freeze(account),
                }
            }
            ScenarioStep::ClearFault { target } => {
                info!("Clearing fault on {}", target);
                let account = self.resolve(target).await;
                self.token.unfreeze(account);
            }
            ScenarioStep::Assert { condition } => {
                info!("Asserting condition: {:?}", condition);
                self.check_condition(condition).await?;
            }
        }

        Ok(())
    }

    async fn check_condition(&self, condition: &AssertCondition) -> anyhow::Result<()> {
        match condition {
            AssertCondition::ChannelLocked { channel, amount } => {
                let expected = parse_units(amount, TOKEN_DECIMALS)?;
                let actual = self.engine.get_channel(channel.as_str()).await.locked;
                if actual != expected {
                    bail!(
                        "{} locked {}, expected {}",
                        channel,
                        format_units(actual, TOKEN_DECIMALS),
                        amount
                    );
                }
            }
            AssertCondition::ChannelRegistered { channel, wallet } => {
                let expected = self.resolve(wallet).await;
                let record = self.engine.get_channel(channel.as_str()).await;
                if !record.registered || record.wallet != expected {
                    bail!("{} is not registered to {}", channel, wallet);
                }
            }
            AssertCondition::ChannelUnregistered { channel } => {
                let record = self.engine.get_channel(channel.as_str()).await;
                if record.registered || !record.wallet.is_zero() {
                    bail!("{} is registered to {}", channel, record.wallet);
                }
            }
            AssertCondition::BalanceEquals { account, amount } => {
                let expected = parse_units(amount, TOKEN_DECIMALS)?;
                let actual = self.token.balance_of(self.resolve(account).await).await;
                if actual != expected {
                    bail!(
                        "{} holds {}, expected {}",
                        account,
                        format_units(actual, TOKEN_DECIMALS),
                        amount
                    );
                }
            }
            AssertCondition::LastEvent { name } => {
                let last = self.engine.events().all().pop();
                match last {
                    Some(record) if record.event.name() == name.as_str() => {}
                    Some(record) => bail!("last event is {}, expected {}", record.event.name(), name),
                    None => bail!("no events, expected {}", name),
                }
            }
            AssertCondition::Solvent => {
                let report = self.engine.verify_solvency().await;
                if !report.is_solvent() {
                    bail!(
                        "custody {} below locked {}",
                        report.custody_balance,
                        report.total_locked
                    );
                }
            }
        }

        Ok(())
    }

    /// Map a scenario label to an address.
    async fn resolve(&self, label: &str) -> Address {
        match label {
            "owner" => self.engine.owner(),
            "escrow" => self.engine.escrow_address(),
            "zero" => Address::ZERO,
            _ => self
                .payers
                .read()
                .await
                .iter()
                .find(|p| p.name == label)
                .map(|p| p.address)
                .unwrap_or_else(|| Address::from_label(label)),
        }
    }

    /// Collect the end-of-run summary.
    pub async fn report(&self) -> SimulationReport {
        SimulationReport {
            simulation: self.metrics.read().await.clone(),
            engine: self.engine.metrics().snapshot(),
            solvency: self.engine.verify_solvency().await,
            active_channels: self.engine.channel_count().await,
            payments_by_payer: self
                .payers
                .read()
                .await
                .iter()
                .map(|p| (p.name.clone(), p.payment_count()))
                .collect(),
        }
    }

    /// Engine metrics in Prometheus text format.
    pub fn prometheus(&self) -> String {
        self.engine.metrics().to_prometheus()
    }
}

async fn record(
    metrics: &RwLock<SimulationMetrics>,
    elapsed: Duration,
    result: &Result<OperationKind, EscrowError>,
) {
    let mut metrics = metrics.write().await;
    match result {
        Ok(kind) => metrics.record_success(*kind, elapsed.as_micros() as u64),
        Err(e) => {
            warn!(code = e.error_code(), "Call failed: {}", e);
            metrics.record_failure(e.error_code());
        }
    }
}

fn check_expectation<T>(
    call: &str,
    result: &Result<T, EscrowError>,
    expect: &Expect,
) -> anyhow::Result<()> {
    match (result, expect) {
        (Ok(_), Expect::Success) => Ok(()),
        (Err(e), Expect::Failure { code }) if e.error_code() == code.as_str() => Ok(()),
        (Ok(_), Expect::Failure { code }) => bail!("{}: expected {}, call succeeded", call, code),
        (Err(e), _) => bail!("{}: unexpected {} ({})", call, e.error_code(), e),
    }
}
