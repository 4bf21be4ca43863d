//! Executor state-machine tests against scripted gateways.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal_macros::dec;

use spreadhawk::application::{
    BreakerConfig, BreakerRegistry, BreakerStatus, FeeSchedule, GatewayMap, OrderManager,
    OrderPolicy, TradeExecutor,
};
use spreadhawk::domain::{AttemptStatus, Opportunity, Symbol, VenueId};
use spreadhawk::port::venue::OrderGateway;
use spreadhawk::testkit::venue::{FillMode, ScriptedGateway};

fn opportunity() -> Opportunity {
    Opportunity::new(
        Symbol::new("BTC/USDT"),
        VenueId::new("kraken"),
        VenueId::new("binance"),
        dec!(100),
        dec!(100.5),
        dec!(1),
        dec!(0.001),
        dec!(0.001),
        dec!(0.001),
    )
}

fn fast_policy() -> OrderPolicy {
    OrderPolicy {
        max_wait: Duration::from_millis(100),
        status_poll: Duration::from_millis(10),
    }
}

struct Harness {
    executor: TradeExecutor,
    breakers: Arc<BreakerRegistry>,
    buy: Arc<ScriptedGateway>,
    sell: Arc<ScriptedGateway>,
}

fn harness() -> Harness {
    let buy = ScriptedGateway::new(VenueId::new("kraken"));
    let sell = ScriptedGateway::new(VenueId::new("binance"));

    let mut gateways: GatewayMap = HashMap::new();
    gateways.insert(VenueId::new("kraken"), buy.clone() as Arc<dyn OrderGateway>);
    gateways.insert(VenueId::new("binance"), sell.clone() as Arc<dyn OrderGateway>);

    let breakers = Arc::new(BreakerRegistry::new(BreakerConfig::default()));
    let executor = TradeExecutor::new(
        gateways,
        Arc::new(OrderManager::new(fast_policy())),
        breakers.clone(),
        FeeSchedule::new(dec!(0.001)),
    );

    Harness {
        executor,
        breakers,
        buy,
        sell,
    }
}

#[tokio::test]
async fn both_legs_fill() {
    let harness = harness();

    let outcome = harness.executor.execute(&opportunity()).await;

    assert_eq!(outcome.status, AttemptStatus::BothFilled);
    // 100.5 * 0.999 - 100 * 1.001 = 0.2995
    assert_eq!(outcome.pnl, dec!(0.2995));
    assert_eq!(harness.buy.place_count(), 1);
    assert_eq!(harness.sell.place_count(), 1);
}

#[tokio::test]
async fn failed_sell_leg_unwinds_filled_buy() {
    let harness = harness();
    harness.sell.push_place_error("insufficient balance");
    // The compensating market sell on the buy venue fills below entry
    harness.buy.set_market_price(dec!(99.8));

    let outcome = harness.executor.execute(&opportunity()).await;

    assert_eq!(outcome.status, AttemptStatus::Unwound);
    // Entry: -100 * 1.001; unwind: +99.8 * 0.999
    assert_eq!(outcome.pnl, dec!(-0.3998));
    // Buy venue saw the leg and the compensating order
    assert_eq!(harness.buy.place_count(), 2);
}

#[tokio::test]
async fn failed_buy_leg_unwinds_filled_sell() {
    let harness = harness();
    harness.buy.push_place_error("rejected");
    // Buy back the short on the sell venue, above the sale
    harness.sell.set_market_price(dec!(100.7));

    let outcome = harness.executor.execute(&opportunity()).await;

    assert_eq!(outcome.status, AttemptStatus::Unwound);
    // Sale: +100.5 * 0.999 = 100.3995; buy-back: -100.7 * 1.001 = -100.8007
    assert_eq!(outcome.pnl, dec!(-0.4012));
    assert_eq!(harness.sell.place_count(), 2);
}

#[tokio::test]
async fn lone_unfilled_leg_is_cancelled_and_attempt_aborts() {
    let harness = harness();
    harness.sell.push_place_error("rejected");
    // The surviving buy leg never fills
    harness.buy.set_fill_mode(FillMode::StayOpen);

    let outcome = harness.executor.execute(&opportunity()).await;

    assert_eq!(outcome.status, AttemptStatus::Aborted);
    assert_eq!(outcome.pnl, dec!(0));
    assert!(harness.buy.cancel_count() >= 1);
}

#[tokio::test]
async fn unwind_failure_forces_breaker_open() {
    let harness = harness();
    harness.sell.push_place_error("rejected");
    harness.buy.set_market_price(dec!(99.8));
    // The compensating order itself is rejected
    harness.buy.push_place_error("margin check failed");

    let outcome = harness.executor.execute(&opportunity()).await;

    assert_eq!(outcome.status, AttemptStatus::UnwindFailed);
    // Fatal for the affected venue only
    assert_eq!(
        harness.breakers.status(&VenueId::new("kraken")),
        BreakerStatus::Open
    );
    assert_ne!(
        harness.breakers.status(&VenueId::new("binance")),
        BreakerStatus::Open
    );
}

#[tokio::test]
async fn matched_partial_fills_close_flat_without_unwind() {
    let harness = harness();
    harness.buy.set_fill_mode(FillMode::FillPartial(dec!(0.5)));
    harness.sell.set_fill_mode(FillMode::FillPartial(dec!(0.5)));

    let outcome = harness.executor.execute(&opportunity()).await;

    // Equal fills on both sides: no exposure, no compensating order
    assert_eq!(outcome.status, AttemptStatus::BothFilled);
    assert_eq!(harness.buy.place_count(), 1);
    assert_eq!(harness.sell.place_count(), 1);
    // Half the size, same spread economics
    assert_eq!(outcome.pnl, dec!(0.14975));
}

#[tokio::test]
async fn imbalanced_partial_fill_unwinds_remainder_only() {
    let harness = harness();
    // Only the buy leg half-fills; the compensating order (the next order
    // on this gateway) fills fully at the market price.
    harness.buy.push_fill_mode(FillMode::FillPartial(dec!(0.5)));
    harness.sell.set_fill_mode(FillMode::StayOpen);
    harness.buy.set_market_price(dec!(99.9));

    let outcome = harness.executor.execute(&opportunity()).await;

    assert_eq!(outcome.status, AttemptStatus::Unwound);
    // Leg + compensating order on the buy venue
    assert_eq!(harness.buy.place_count(), 2);
    // Bought 0.5 @ 100, unwound 0.5 @ 99.9, fees both ways:
    // -0.5*100*1.001 + 0.5*99.9*0.999 = -50.05 + 49.90005
    assert_eq!(outcome.pnl, dec!(-0.14995));
}

#[tokio::test]
async fn cancel_all_open_sweeps_limit_orders_but_spares_unwinds() {
    use spreadhawk::domain::{AttemptId, OrderKind, OrderSide, OrderSpec};

    let gateway = ScriptedGateway::new(VenueId::new("kraken"));
    gateway.set_fill_mode(FillMode::StayOpen);
    let orders = OrderManager::new(fast_policy());

    let spec = |side, kind, price| OrderSpec {
        venue: VenueId::new("kraken"),
        symbol: Symbol::new("BTC/USDT"),
        side,
        kind,
        quantity: dec!(1),
        limit_price: price,
        attempt_id: AttemptId::new(),
    };
    orders
        .submit(gateway.as_ref(), spec(OrderSide::Buy, OrderKind::Limit, Some(dec!(100))))
        .await
        .unwrap();
    orders
        .submit(gateway.as_ref(), spec(OrderSide::Sell, OrderKind::Limit, Some(dec!(101))))
        .await
        .unwrap();
    // An in-flight compensating order: the kill switch must not abort it
    orders
        .submit(gateway.as_ref(), spec(OrderSide::Sell, OrderKind::Market, None))
        .await
        .unwrap();
    assert_eq!(orders.open_orders().len(), 3);

    let mut gateways: GatewayMap = HashMap::new();
    gateways.insert(VenueId::new("kraken"), gateway.clone() as Arc<dyn OrderGateway>);

    let failures = orders.cancel_all_open(&gateways).await;
    assert!(failures.is_empty());
    // Only the two resting limit orders received cancel requests
    assert_eq!(gateway.cancel_count(), 2);
}

#[tokio::test]
async fn no_attempt_ends_one_sided_without_compensation() {
    // Property: for every failure mix, a filled quantity on one side is
    // always matched or answered with a compensating order.
    for (buy_mode, sell_mode) in [
        (FillMode::FillAtLimit, FillMode::StayOpen),
        (FillMode::StayOpen, FillMode::FillAtLimit),
        (FillMode::FillPartial(dec!(0.25)), FillMode::StayOpen),
    ] {
        let harness = harness();
        harness.buy.set_fill_mode(buy_mode);
        harness.sell.set_fill_mode(sell_mode);
        harness.buy.set_market_price(dec!(100));
        harness.sell.set_market_price(dec!(100.5));

        let outcome = harness.executor.execute(&opportunity()).await;

        assert!(
            matches!(
                outcome.status,
                AttemptStatus::Unwound | AttemptStatus::UnwindFailed
            ),
            "one-sided fill must enter an unwinding path, got {:?}",
            outcome.status
        );
    }
}
