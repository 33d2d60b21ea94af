//! Simulation scenarios.
//!
//! Accounts are referred to by label: `owner` and `escrow` resolve to the
//! engine's fixed identities, `zero` to the zero address, a payer name to that
//! payer, and anything else to an address derived from the label. Amounts are
//! whole-token decimal strings.

use serde::{Deserialize, Serialize};

/// A simulation scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name.
    pub name: String,
    /// Description.
    pub description: String,
    /// Steps in the scenario.
    pub steps: Vec<ScenarioStep>,
}

/// Expected result of an engine call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Expect {
    /// The call succeeds.
    Success,
    /// The call fails with this error code.
    Failure { code: String },
}

impl Expect {
    fn failure(code: &str) -> Self {
        Expect::Failure {
            code: code.to_string(),
        }
    }
}

/// A step in a scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ScenarioStep {
    /// Wait for a duration.
    Wait { millis: u64 },
    /// Pay into a channel.
    Pay {
        payer: String,
        channel: String,
        amount: String,
        expect: Expect,
    },
    /// Register a channel.
    Register {
        caller: String,
        channel: String,
        wallet: String,
        expect: Expect,
    },
    /// Inject a fault.
    InjectFault { fault_type: FaultType, target: String },
    /// Clear a fault.
    ClearFault { target: String },
    /// Assert a condition.
    Assert { condition: AssertCondition },
}

/// Types of faults that can be injected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FaultType {
    /// Token rejects every transfer from or to the account.
    AccountFrozen,
}

/// Conditions that can be asserted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AssertCondition {
    /// Escrow held for a channel.
    ChannelLocked { channel: String, amount: String },
    /// Channel is registered to a wallet.
    ChannelRegistered { channel: String, wallet: String },
    /// Channel is not registered.
    ChannelUnregistered { channel: String },
    /// Token balance of an account.
    BalanceEquals { account: String, amount: String },
    /// Name of the most recent event.
    LastEvent { name: String },
    /// Custody covers all escrow.
    Solvent,
}

impl Scenario {
    /// Names of the built-in scenarios.
    pub const BUILT_IN: [&'static str; 6] = [
        "locked-payment",
        "direct-payment",
        "register-and-release",
        "double-registration",
        "unauthorized-registration",
        "release-fault",
    ];

    /// Load a scenario by name.
    pub fn load(name: &str) -> anyhow::Result<Self> {
        match name {
            "locked-payment" => Ok(Self::locked_payment()),
            "direct-payment" => Ok(Self::direct_payment()),
            "register-and-release" => Ok(Self::register_and_release()),
            "double-registration" => Ok(Self::double_registration()),
            "unauthorized-registration" => Ok(Self::unauthorized_registration()),
            "release-fault" => Ok(Self::release_fault()),
            _ => Err(anyhow::anyhow!(
                "Unknown scenario: {} (available: {})",
                name,
                Self::BUILT_IN.join(", ")
            )),
        }
    }

    /// Payment to an unregistered channel goes into escrow.
    fn locked_payment() -> Self {
        Self {
            name: "locked-payment".to_string(),
            description: "Pay 100 into an unregistered channel".to_string(),
            steps: vec![
                pay("alice", "channel1", "100"),
                ScenarioStep::Assert {
                    condition: AssertCondition::LastEvent {
                        name: "PaymentLocked".to_string(),
                    },
                },
                ScenarioStep::Assert {
                    condition: AssertCondition::ChannelLocked {
                        channel: "channel1".to_string(),
                        amount: "100".to_string(),
                    },
                },
                ScenarioStep::Assert {
                    condition: AssertCondition::ChannelUnregistered {
                        channel: "channel1".to_string(),
                    },
                },
                balance("escrow", "100"),
                ScenarioStep::Assert {
                    condition: AssertCondition::Solvent,
                },
            ],
        }
    }

    /// Payment to a registered channel forwards immediately.
    fn direct_payment() -> Self {
        Self {
            name: "direct-payment".to_string(),
            description: "Register a channel, then pay 50 straight to its wallet".to_string(),
            steps: vec![
                register("owner", "channel2", "creator"),
                pay("alice", "channel2", "50"),
                ScenarioStep::Assert {
                    condition: AssertCondition::LastEvent {
                        name: "PaymentSent".to_string(),
                    },
                },
                balance("creator", "50"),
                balance("escrow", "0"),
                ScenarioStep::Assert {
                    condition: AssertCondition::ChannelLocked {
                        channel: "channel2".to_string(),
                        amount: "0".to_string(),
                    },
                },
            ],
        }
    }

    /// Registration releases prior escrow.
    fn register_and_release() -> Self {
        Self {
            name: "register-and-release".to_string(),
            description: "Lock 100, register, escrow released to the wallet".to_string(),
            steps: vec![
                pay("alice", "channel4", "60"),
                pay("bob", "channel4", "40"),
                balance("escrow", "100"),
                register("owner", "channel4", "creator"),
                ScenarioStep::Assert {
                    condition: AssertCondition::LastEvent {
                        name: "FundsReleased".to_string(),
                    },
                },
                ScenarioStep::Assert {
                    condition: AssertCondition::ChannelRegistered {
                        channel: "channel4".to_string(),
                        wallet: "creator".to_string(),
                    },
                },
                ScenarioStep::Assert {
                    condition: AssertCondition::ChannelLocked {
                        channel: "channel4".to_string(),
                        amount: "0".to_string(),
                    },
                },
                balance("creator", "100"),
                balance("escrow", "0"),
            ],
        }
    }

    /// A channel can be registered only once.
    fn double_registration() -> Self {
        Self {
            name: "double-registration".to_string(),
            description: "Second registration of a channel is rejected".to_string(),
            steps: vec![
                register("owner", "channel5", "creator"),
                ScenarioStep::Register {
                    caller: "owner".to_string(),
                    channel: "channel5".to_string(),
                    wallet: "impostor".to_string(),
                    expect: Expect::failure("ALREADY_REGISTERED"),
                },
                ScenarioStep::Assert {
                    condition: AssertCondition::ChannelRegistered {
                        channel: "channel5".to_string(),
                        wallet: "creator".to_string(),
                    },
                },
                ScenarioStep::Assert {
                    condition: AssertCondition::LastEvent {
                        name: "ChannelRegistered".to_string(),
                    },
                },
            ],
        }
    }

    /// Rejected calls change nothing.
    fn unauthorized_registration() -> Self {
        Self {
            name: "unauthorized-registration".to_string(),
            description: "Non-owner registration and invalid inputs are rejected".to_string(),
            steps: vec![
                pay("alice", "channel8", "10"),
                ScenarioStep::Register {
                    caller: "alice".to_string(),
                    channel: "channel8".to_string(),
                    wallet: "alice".to_string(),
                    expect: Expect::failure("UNAUTHORIZED"),
                },
                ScenarioStep::Register {
                    caller: "owner".to_string(),
                    channel: "channel8".to_string(),
                    wallet: "zero".to_string(),
                    expect: Expect::failure("INVALID_WALLET"),
                },
                ScenarioStep::Pay {
                    payer: "alice".to_string(),
                    channel: "channel8".to_string(),
                    amount: "0".to_string(),
                    expect: Expect::failure("INVALID_AMOUNT"),
                },
                ScenarioStep::Assert {
                    condition: AssertCondition::ChannelUnregistered {
                        channel: "channel8".to_string(),
                    },
                },
                ScenarioStep::Assert {
                    condition: AssertCondition::ChannelLocked {
                        channel: "channel8".to_string(),
                        amount: "10".to_string(),
                    },
                },
                ScenarioStep::Assert {
                    condition: AssertCondition::LastEvent {
                        name: "PaymentLocked".to_string(),
                    },
                },
            ],
        }
    }

    /// Failed release keeps escrow; recovery succeeds.
    fn release_fault() -> Self {
        Self {
            name: "release-fault".to_string(),
            description: "Release to a frozen wallet fails cleanly, then recovers".to_string(),
            steps: vec![
                pay("alice", "channel9", "100"),
                ScenarioStep::InjectFault {
                    fault_type: FaultType::AccountFrozen,
                    target: "creator".to_string(),
                },
                ScenarioStep::Register {
                    caller: "owner".to_string(),
                    channel: "channel9".to_string(),
                    wallet: "creator".to_string(),
                    expect: Expect::failure("TRANSFER_FAILED"),
                },
                ScenarioStep::Assert {
                    condition: AssertCondition::ChannelUnregistered {
                        channel: "channel9".to_string(),
                    },
                },
                ScenarioStep::Assert {
                    condition: AssertCondition::ChannelLocked {
                        channel: "channel9".to_string(),
                        amount: "100".to_string(),
                    },
                },
                ScenarioStep::Wait { millis: 100 },
                ScenarioStep::ClearFault {
                    target: "creator".to_string(),
                },
                register("owner", "channel9", "creator"),
                balance("creator", "100"),
                balance("escrow", "0"),
                ScenarioStep::Assert {
                    condition: AssertCondition::Solvent,
                },
            ],
        }
    }
}

fn pay(payer: &str, channel: &str, amount: &str) -> ScenarioStep {
    ScenarioStep::Pay {
        payer: payer.to_string(),
        channel: channel.to_string(),
        amount: amount.to_string(),
        expect: Expect::Success,
    }
}

fn register(caller: &str, channel: &str, wallet: &str) -> ScenarioStep {
    ScenarioStep::Register {
        caller: caller.to_string(),
        channel: channel.to_string(),
        wallet: wallet.to_string(),
        expect: Expect::Success,
    }
}

fn balance(account: &str, amount: &str) -> ScenarioStep {
    ScenarioStep::Assert {
        condition: AssertCondition::BalanceEquals {
            account: account.to_string(),
            amount: amount.to_string(),
        },
    }
}
