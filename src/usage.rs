//! Byte accounting and cost.
use crate::channel::ChannelGroup;
use crate::error::Error;
use serde::Serialize;

/// Bytes written to one response, split by billing group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Usage {
    pub others_bytes: u64,
    pub orderbook_bytes: u64,
}

impl Usage {
    pub fn add(&mut self, group: ChannelGroup, bytes: usize) {
        let bytes = bytes as u64;
        match group {
            ChannelGroup::Orderbook => self.orderbook_bytes += bytes,
            ChannelGroup::Others => self.others_bytes += bytes,
        }
    }

    pub fn total(&self) -> u64 {
        self.others_bytes + self.orderbook_bytes
    }

    /// Fails unless the accounted total equals the response length exactly.
    pub fn check(&self, written: usize) -> Result<(), Error> {
        let written = written as u64;
        if self.total() != written {
            return Err(Error::Consistency { accounted: self.total(), written });
        }
        Ok(())
    }
}

/// Weights applied to each group; cost is expressed in `unit_bytes` units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pricing {
    pub others_weight: u64,
    pub orderbook_weight: u64,
    pub unit_bytes: u64,
}

impl Default for Pricing {
    fn default() -> Self {
        // Order-book traffic at a quarter of the rate of everything else.
        Self { others_weight: 4, orderbook_weight: 1, unit_bytes: 4 }
    }
}

impl Pricing {
    pub fn cost(&self, usage: &Usage) -> u64 {
        let weighted = (usage.others_bytes as u128) * (self.others_weight as u128)
            + (usage.orderbook_bytes as u128) * (self.orderbook_weight as u128);
        let unit = self.unit_bytes.max(1) as u128;
        weighted.div_ceil(unit).min(u64::MAX as u128) as u64
    }
}
