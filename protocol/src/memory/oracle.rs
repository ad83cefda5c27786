//! In-memory price oracle.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::address::{Amount, FeedId};
use crate::collaborators::{CollaboratorError, PriceOracle, PriceReading};

/// Feeds whose readings are set by hand.
#[derive(Debug, Default)]
pub struct MemoryOracle {
    readings: RwLock<HashMap<FeedId, PriceReading>>,
}

impl MemoryOracle {
    /// Creates an oracle with no feeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes a reading for `feed`.
    pub fn set_price(&self, feed: &FeedId, price: Amount, updated_at: DateTime<Utc>) {
        self.readings
            .write()
            .insert(*feed, PriceReading { price, updated_at });
    }
}

impl PriceOracle for MemoryOracle {
    fn latest_price(&self, feed: &FeedId) -> Result<PriceReading, CollaboratorError> {
        self.readings
            .read()
            .get(feed)
            .copied()
            .ok_or(CollaboratorError::FeedNotFound(*feed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Address;

    #[test]
    fn latest_reading_wins() {
        let oracle = MemoryOracle::new();
        let feed = Address::from_label("eth-usd");
        let t0 = Utc::now();
        oracle.set_price(&feed, 1_800_00000000, t0);
        oracle.set_price(&feed, 1_900_00000000, t0);
        assert_eq!(oracle.latest_price(&feed).unwrap().price, 1_900_00000000);
    }

    #[test]
    fn missing_feed_is_an_error() {
        let oracle = MemoryOracle::new();
        let feed = Address::from_label("nope");
        assert_eq!(
            oracle.latest_price(&feed),
            Err(CollaboratorError::FeedNotFound(feed))
        );
    }
}
