//! Arbitrage opportunity type with derived profitability fields.
//!
//! An [`Opportunity`] captures a buy-low/sell-high pairing across two venues
//! at one evaluation instant. It is immutable once constructed; all derived
//! fields (fee totals, slippage buffer, net profit) are computed at
//! construction from the two quotes it was built from.

use rust_decimal::Decimal;
use std::fmt;

use super::id::{Symbol, VenueId};
use super::money::{Price, Quantity};

/// A detected cross-venue arbitrage opportunity.
///
/// `net_profit` is expressed as a fraction of the buy notional, after taker
/// fees on both legs and a conservative slippage buffer:
///
/// ```text
/// net = (sell * (1 - sell_fee) - buy * (1 + buy_fee) - slippage * buy) / buy
/// ```
#[derive(Debug, Clone)]
pub struct Opportunity {
    symbol: Symbol,
    buy_venue: VenueId,
    sell_venue: VenueId,
    buy_price: Price,
    sell_price: Price,
    trade_size: Quantity,
    fees_both_legs: Price,
    slippage_buffer: Price,
    net_profit: Decimal,
}

impl Opportunity {
    /// Build an opportunity from the quoted prices and cost assumptions.
    ///
    /// `buy_fee` and `sell_fee` are taker fees as fractions (0.001 = 0.1%);
    /// `slippage` is the configured worst-case slippage fraction applied
    /// against the buy notional, not a live depth estimate.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        symbol: Symbol,
        buy_venue: VenueId,
        sell_venue: VenueId,
        buy_price: Price,
        sell_price: Price,
        trade_size: Quantity,
        buy_fee: Decimal,
        sell_fee: Decimal,
        slippage: Decimal,
    ) -> Self {
        let fees_both_legs = trade_size * (buy_price * buy_fee + sell_price * sell_fee);
        let slippage_buffer = trade_size * buy_price * slippage;
        let net_profit = (sell_price * (Decimal::ONE - sell_fee)
            - buy_price * (Decimal::ONE + buy_fee)
            - buy_price * slippage)
            / buy_price;

        Self {
            symbol,
            buy_venue,
            sell_venue,
            buy_price,
            sell_price,
            trade_size,
            fees_both_legs,
            slippage_buffer,
            net_profit,
        }
    }

    /// The instrument being arbitraged.
    #[must_use]
    pub const fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    /// Venue to buy on (lowest ask).
    #[must_use]
    pub const fn buy_venue(&self) -> &VenueId {
        &self.buy_venue
    }

    /// Venue to sell on (highest bid).
    #[must_use]
    pub const fn sell_venue(&self) -> &VenueId {
        &self.sell_venue
    }

    /// Limit price of the buy leg.
    #[must_use]
    pub const fn buy_price(&self) -> Price {
        self.buy_price
    }

    /// Limit price of the sell leg.
    #[must_use]
    pub const fn sell_price(&self) -> Price {
        self.sell_price
    }

    /// Base-currency size of each leg.
    #[must_use]
    pub const fn trade_size(&self) -> Quantity {
        self.trade_size
    }

    /// Estimated taker fees across both legs, in quote currency.
    #[must_use]
    pub const fn fees_both_legs(&self) -> Price {
        self.fees_both_legs
    }

    /// Conservative slippage buffer, in quote currency.
    #[must_use]
    pub const fn slippage_buffer(&self) -> Price {
        self.slippage_buffer
    }

    /// Expected net profit as a fraction of the buy notional.
    #[must_use]
    pub const fn net_profit(&self) -> Decimal {
        self.net_profit
    }

    /// Quote-currency notional of the buy leg.
    #[must_use]
    pub fn notional(&self) -> Price {
        self.trade_size * self.buy_price
    }
}

impl fmt::Display for Opportunity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: buy {}@{} / sell {}@{} size {} net {}",
            self.symbol,
            self.buy_venue,
            self.buy_price,
            self.sell_venue,
            self.sell_price,
            self.trade_size,
            self.net_profit,
        )
    }
}
