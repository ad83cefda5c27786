//! # Price Guard
//!
//! Bounds every guarded trade by what the oracle says the trade should
//! return. Given `amount_in` of one token, the oracle-implied counter
//! amount is computed in two steps through a common value unit:
//!
//! ```text
//! value    = amount_in * price_in  / normalizer_in
//! expected = value     * normalizer_out / price_out
//! ```
//!
//! The quoted amount must sit inside a symmetric band around `expected`.
//! Too little means the pool is being drained at our expense
//! ([`TreasuryError::AmountOutTooLow`]); too much means the pool itself is
//! off-peg and the trade would be pushing it further
//! ([`TreasuryError::PriceDeviation`]).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use treasury_protocol::config::{
    lower_band, DEFAULT_DECIMALS_NORMALIZER, DEFAULT_MAX_DEVIATION_FACTOR, DEFAULT_MAX_STALENESS,
    DEVIATION_FACTOR_SCALE,
};
use treasury_protocol::{Amount, FeedId, PriceOracle, TokenId};

use crate::error::{ensure_same_len, TreasuryError, TreasuryResult};

/// Feeds, decimals and tolerances used by the guard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceFeedConfig {
    /// Oracle feed per token.
    pub feeds: BTreeMap<TokenId, FeedId>,
    /// `10^decimals` per token. Missing tokens use 18 decimals.
    pub normalizers: BTreeMap<TokenId, Amount>,
    /// Tolerance band, per mille.
    pub max_deviation_factor: u32,
    /// Maximum oracle reading age in seconds.
    pub max_staleness_secs: u64,
}

impl Default for PriceFeedConfig {
    fn default() -> Self {
        Self {
            feeds: BTreeMap::new(),
            normalizers: BTreeMap::new(),
            max_deviation_factor: DEFAULT_MAX_DEVIATION_FACTOR,
            max_staleness_secs: DEFAULT_MAX_STALENESS.as_secs(),
        }
    }
}

impl PriceFeedConfig {
    /// Sets the tolerance band. Factors above the scale are rejected.
    pub fn set_max_deviation_factor(&mut self, factor: u32) -> TreasuryResult<()> {
        if factor > DEVIATION_FACTOR_SCALE {
            return Err(TreasuryError::InvalidDeviationFactor(factor));
        }
        self.max_deviation_factor = factor;
        Ok(())
    }

    /// Assigns feeds pairwise.
    pub fn set_price_feeds(&mut self, tokens: &[TokenId], feeds: &[FeedId]) -> TreasuryResult<()> {
        ensure_same_len(tokens, feeds)?;
        self.feeds.extend(tokens.iter().copied().zip(feeds.iter().copied()));
        Ok(())
    }

    /// Assigns decimal normalizers pairwise. Zero is rejected.
    pub fn set_token_decimals(&mut self, tokens: &[TokenId], normalizers: &[Amount]) -> TreasuryResult<()> {
        ensure_same_len(tokens, normalizers)?;
        if let Some((token, _)) = tokens.iter().zip(normalizers).find(|(_, n)| **n == 0) {
            return Err(TreasuryError::InvalidNormalizer(*token));
        }
        self.normalizers
            .extend(tokens.iter().copied().zip(normalizers.iter().copied()));
        Ok(())
    }

    /// Normalizer for `token`.
    pub fn normalizer(&self, token: &TokenId) -> Amount {
        self.normalizers
            .get(token)
            .copied()
            .unwrap_or(DEFAULT_DECIMALS_NORMALIZER)
    }

    /// Fresh, non-zero oracle price of `token` at `now`.
    pub fn reference_price(
        &self,
        oracle: &dyn PriceOracle,
        token: &TokenId,
        now: DateTime<Utc>,
    ) -> TreasuryResult<Amount> {
        let feed = self
            .feeds
            .get(token)
            .ok_or(TreasuryError::MissingPriceFeed(*token))?;
        let reading = oracle.latest_price(feed)?;
        if reading.price == 0 {
            return Err(TreasuryError::InvalidPrice(*token));
        }
        let age_secs = (now - reading.updated_at).num_seconds().max(0) as u64;
        if age_secs > self.max_staleness_secs {
            return Err(TreasuryError::StaleOracle {
                token: *token,
                age_secs,
                max_staleness_secs: self.max_staleness_secs,
            });
        }
        Ok(reading.price)
    }

    /// Oracle-implied amount of `token_out` for `amount_in` of `token_in`.
    pub fn expected_amount_out(
        &self,
        oracle: &dyn PriceOracle,
        token_in: &TokenId,
        token_out: &TokenId,
        amount_in: Amount,
        now: DateTime<Utc>,
    ) -> TreasuryResult<Amount> {
        let price_in = self.reference_price(oracle, token_in, now)?;
        let price_out = self.reference_price(oracle, token_out, now)?;
        let value = amount_in
            .checked_mul(price_in)
            .ok_or(TreasuryError::ArithmeticOverflow)?
            / self.normalizer(token_in);
        let expected = value
            .checked_mul(self.normalizer(token_out))
            .ok_or(TreasuryError::ArithmeticOverflow)?
            / price_out;
        Ok(expected)
    }

    /// Fails unless `quoted` is within the band around `expected`.
    pub fn check_band(&self, expected: Amount, quoted: Amount) -> TreasuryResult<()> {
        let scale = DEVIATION_FACTOR_SCALE as Amount;
        let gap = expected.abs_diff(quoted);
        let lhs = gap.checked_mul(scale).ok_or(TreasuryError::ArithmeticOverflow)?;
        let rhs = expected
            .checked_mul(self.max_deviation_factor as Amount)
            .ok_or(TreasuryError::ArithmeticOverflow)?;
        if lhs <= rhs {
            return Ok(());
        }
        tracing::warn!(
            expected,
            quoted,
            factor = self.max_deviation_factor,
            "price guard rejected quote"
        );
        if quoted < expected {
            Err(TreasuryError::AmountOutTooLow { expected, quoted })
        } else {
            Err(TreasuryError::PriceDeviation { expected, quoted })
        }
    }

    /// Smallest amount the guard accepts for `expected`.
    pub fn min_acceptable(&self, expected: Amount) -> Amount {
        lower_band(expected, self.max_deviation_factor)
    }

    /// Full guard for a trade of `amount_in` quoted at `quoted`. Returns the
    /// minimum output to hand to the router.
    pub fn guard(
        &self,
        oracle: &dyn PriceOracle,
        token_in: &TokenId,
        token_out: &TokenId,
        amount_in: Amount,
        quoted: Amount,
        now: DateTime<Utc>,
    ) -> TreasuryResult<Amount> {
        let expected = self.expected_amount_out(oracle, token_in, token_out, amount_in, now)?;
        self.check_band(expected, quoted)?;
        tracing::debug!(expected, quoted, "price guard passed");
        Ok(self.min_acceptable(expected))
    }
}
