//! Shared fixture for the treasury integration tests.
//!
//! Wires a [`Treasury`] to the in-memory collaborators and a manual clock,
//! and hands every piece back so tests can mint balances, seed pools,
//! publish prices and move time.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use treasury_contracts::{Collaborators, Treasury, TreasuryConfig};
use treasury_protocol::logging::{init_logging, LogFormat};
use treasury_protocol::memory::{MemoryFarmRegistry, MemoryLedger, MemoryOracle, MemoryRouter};
use treasury_protocol::{Address, Amount, Clock, ManualClock, TokenId, TokenLedger};

pub struct Fixture {
    pub treasury: Treasury,
    pub ledger: Arc<MemoryLedger>,
    pub router: Arc<MemoryRouter>,
    pub farms: Arc<MemoryFarmRegistry>,
    pub oracle: Arc<MemoryOracle>,
    pub clock: Arc<ManualClock>,
    pub governor: Address,
    pub guardian: Address,
    pub stranger: Address,
}

/// Fixed start time so failures are reproducible.
pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
}

pub fn addr(label: &str) -> Address {
    Address::from_label(label)
}

/// Treasury with default delays and thresholds.
pub fn fixture() -> Fixture {
    fixture_with(|_| {})
}

/// Treasury whose config is adjusted by `tweak` before construction.
pub fn fixture_with(tweak: impl FnOnce(&mut TreasuryConfig)) -> Fixture {
    init_logging("warn", LogFormat::Pretty);

    let ledger = Arc::new(MemoryLedger::new());
    let router = Arc::new(MemoryRouter::new(ledger.clone()));
    let farms = Arc::new(MemoryFarmRegistry::new(ledger.clone()));
    let oracle = Arc::new(MemoryOracle::new());
    let clock = Arc::new(ManualClock::new(start()));

    let governor = addr("governor");
    let guardian = addr("guardian");
    let mut config = TreasuryConfig::new(governor, guardian, addr("treasury"));
    tweak(&mut config);

    let collaborators = Collaborators {
        ledger: ledger.clone(),
        router: router.clone(),
        farms: farms.clone(),
        oracle: oracle.clone(),
    };
    let treasury = Treasury::new(&config, collaborators, clock.clone()).expect("valid config");

    Fixture {
        treasury,
        ledger,
        router,
        farms,
        oracle,
        clock,
        governor,
        guardian,
        stranger: addr("stranger"),
    }
}

impl Fixture {
    /// Mints `amount` of `token` into the treasury.
    pub fn fund(&self, token: &TokenId, amount: Amount) {
        self.ledger
            .mint(token, &self.treasury.address(), amount)
            .expect("mint");
    }

    pub fn balance(&self, token: &TokenId, owner: &Address) -> Amount {
        self.ledger.balance_of(token, owner)
    }

    pub fn treasury_balance(&self, token: &TokenId) -> Amount {
        self.balance(token, &self.treasury.address())
    }

    /// Registers a feed for each token at `price`, fresh as of now, with
    /// the given decimal normalizer.
    pub fn price(&mut self, tokens: &[TokenId], price: Amount, normalizer: Amount) {
        let feeds: Vec<Address> = tokens
            .iter()
            .map(|t| Address::from_label(&format!("feed:{}", t.to_hex())))
            .collect();
        let now = self.clock.now();
        for feed in &feeds {
            self.oracle.set_price(feed, price, now);
        }
        let governor = self.governor;
        self.treasury
            .set_price_feeds(&governor, tokens, &feeds)
            .expect("set feeds");
        self.treasury
            .set_token_decimals(&governor, tokens, &vec![normalizer; tokens.len()])
            .expect("set decimals");
    }

    pub fn advance(&self, secs: i64) {
        self.clock.advance_secs(secs);
    }
}
