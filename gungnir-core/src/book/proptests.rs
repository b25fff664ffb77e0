//! Property-based tests for order book invariants
//!
//! Randomized order flow against a single book, verifying the invariants
//! that unit tests can only spot-check: quantity conservation, no negative
//! remaining quantity, FOK atomicity, and an uncrossed resting book.

#[cfg(test)]
mod tests {
    use crate::book::{OrderBook, Remainder};
    use crate::core::types::{AccountId, OrderId, OrderType, Side, Symbol, TimeInForce};
    use crate::core::Order;
    use proptest::prelude::*;
    use rust_decimal::Decimal;
    use std::time::SystemTime;

    #[derive(Debug, Clone)]
    struct OrderSpec {
        buy: bool,
        qty: u32,
        price: u32,
        tif: u8,
        cancel: bool,
    }

    fn order_spec() -> impl Strategy<Value = OrderSpec> {
        (any::<bool>(), 1..500u32, 90..110u32, 0..4u8, any::<bool>()).prop_map(
            |(buy, qty, price, tif, cancel)| OrderSpec {
                buy,
                qty,
                price,
                tif,
                cancel,
            },
        )
    }

    fn build(spec: &OrderSpec) -> Order {
        let tif = match spec.tif {
            0 => TimeInForce::Day,
            1 => TimeInForce::Gtc,
            2 => TimeInForce::Ioc,
            _ => TimeInForce::Fok,
        };
        let qty = Decimal::from(spec.qty);
        Order {
            id: OrderId::generate(),
            symbol: Symbol::from("PROP"),
            side: if spec.buy { Side::Buy } else { Side::Sell },
            order_type: OrderType::Limit,
            quantity: qty,
            remaining: qty,
            limit_price: Some(Decimal::from(spec.price)),
            stop_price: None,
            time_in_force: tif,
            account: AccountId::from("PROP"),
            created_at: SystemTime::now(),
            sequence: 0,
        }
    }

    #[test]
    fn prop_quantity_conservation_and_no_negative() {
        proptest!(|(specs in proptest::collection::vec(order_spec(), 1..60))| {
            let mut book = OrderBook::new(Symbol::from("PROP"));
            // submitted quantity = traded*2 + resting + discarded
            let mut submitted = Decimal::ZERO;
            let mut traded = Decimal::ZERO;
            let mut discarded = Decimal::ZERO;
            let mut rested_ids: Vec<OrderId> = Vec::new();

            for spec in &specs {
                let order = build(spec);
                submitted += order.quantity;
                let outcome = book.submit(order).unwrap();

                for fill in &outcome.fills {
                    prop_assert!(fill.quantity > Decimal::ZERO);
                    traded += fill.quantity;
                }

                match outcome.remainder {
                    Remainder::None => {}
                    Remainder::Rested(ref o) => {
                        prop_assert!(o.remaining > Decimal::ZERO);
                        prop_assert!(o.remaining <= o.quantity);
                        rested_ids.push(o.id);
                    }
                    Remainder::Cancelled(ref o) => {
                        prop_assert!(o.remaining > Decimal::ZERO);
                        discarded += o.remaining;
                    }
                    Remainder::Rejected { ref order, .. } => {
                        // FOK rejection has zero fills by definition
                        prop_assert!(outcome.fills.is_empty());
                        discarded += order.remaining;
                    }
                }

                // Interleave cancels; the id may have filled in the
                // meantime, in which case the cancel misses harmlessly
                if spec.cancel {
                    if let Some(id) = rested_ids.pop() {
                        if let Ok(cancelled) = book.cancel(id) {
                            discarded += cancelled.remaining;
                        }
                    }
                }
            }

            let resting: Decimal = (90..=110u32)
                .map(Decimal::from)
                .map(|p| book.quantity_at(Side::Buy, p) + book.quantity_at(Side::Sell, p))
                .sum();

            // Every submitted unit is accounted for exactly once on each
            // side of its trade
            prop_assert_eq!(submitted, traded * Decimal::TWO + resting + discarded);

            // Resting book is never crossed
            if let (Some(bid), Some(ask)) = (book.best_bid(), book.best_ask()) {
                prop_assert!(bid < ask, "crossed book: bid {} >= ask {}", bid, ask);
            }
        });
    }

    #[test]
    fn prop_fok_all_or_nothing() {
        proptest!(|(specs in proptest::collection::vec(order_spec(), 1..40), fok_qty in 1..2000u32)| {
            let mut book = OrderBook::new(Symbol::from("PROP"));
            for spec in &specs {
                let mut order = build(spec);
                // Seed book with resting liquidity only
                order.time_in_force = TimeInForce::Gtc;
                book.submit(order).unwrap();
            }

            let mut fok = build(&OrderSpec { buy: true, qty: fok_qty, price: 105, tif: 3, cancel: false });
            fok.time_in_force = TimeInForce::Fok;
            let quantity = fok.quantity;
            let outcome = book.submit(fok).unwrap();

            let filled: Decimal = outcome.fills.iter().map(|t| t.quantity).sum();
            match outcome.remainder {
                Remainder::Rejected { .. } => prop_assert_eq!(filled, Decimal::ZERO),
                Remainder::None => prop_assert_eq!(filled, quantity),
                ref other => prop_assert!(false, "FOK produced {:?}", other),
            }
        });
    }
}
