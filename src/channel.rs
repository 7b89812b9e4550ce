//! Channel classification and request-side channel filtering.
//!
//! Two independent decisions are made per channel:
//! - inclusion, through [`ChannelFilter`], which compares on the key the
//!   exchange actually stores (see [`prefix_key`])
//! - billing, through [`classify`], which never affects inclusion
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelGroup {
    Orderbook,
    Others,
}

/// Exchanges whose stored channel names are `kind_instrument` while the log
/// tags messages by `kind` alone.
fn is_prefix_keyed(exchange: &str) -> bool {
    matches!(exchange, "bitmex")
}

/// Reduce a channel to the key used for filter matching.
///
/// `orderBookL2_XBTUSD` -> `orderBookL2` on prefix-keyed exchanges; unchanged
/// elsewhere.
pub fn prefix_key<'a>(exchange: &str, channel: &'a str) -> &'a str {
    if !is_prefix_keyed(exchange) {
        return channel;
    }
    match channel.find('_') {
        Some(i) => &channel[..i],
        None => channel,
    }
}

/// Billing group of a channel on an exchange.
pub fn classify(exchange: &str, channel: &str) -> ChannelGroup {
    let orderbook = match exchange {
        "binance" => channel.contains("@depth"),
        "bitmex" => channel.starts_with("orderBookL2") || channel.starts_with("orderBook10"),
        "bitflyer" => channel.starts_with("lightning_board_"),
        "bitfinex" => channel.starts_with("book_"),
        "liquid" => channel.starts_with("price_ladders_"),
        _ => false,
    };
    if orderbook { ChannelGroup::Orderbook } else { ChannelGroup::Others }
}

/// Set of matching keys built once per request.
#[derive(Debug, Clone)]
pub struct ChannelFilter {
    exchange: String,
    keys: HashSet<String>,
}

impl ChannelFilter {
    pub fn new<I, S>(exchange: &str, channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keys = channels
            .into_iter()
            .map(|c| prefix_key(exchange, c.as_ref()).to_string())
            .collect();
        Self { exchange: exchange.to_string(), keys }
    }

    /// Whether a stored (or formatter-produced) channel passes the filter.
    pub fn matches(&self, channel: &str) -> bool {
        self.keys.contains(prefix_key(&self.exchange, channel))
    }

    pub fn exchange(&self) -> &str { &self.exchange }
}
