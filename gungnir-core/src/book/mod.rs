//! Price-time-priority order book and matching engine
//!
//! One `OrderBook` per instrument. Bids are matched from the highest price
//! down, asks from the lowest up; within a level, strictly in arrival order.
//! The book is the unit of serialization for its instrument - callers wrap
//! it in a mutex and all mutation goes through that single domain.
//!
//! ```text
//!  incoming order
//!        │
//!        ▼
//!  FOK? ── dry-run fillability ── not fillable ──► reject, zero mutation
//!        │
//!        ▼
//!  consume opposite levels at crossing prices (price, then time)
//!        │
//!        ▼
//!  remainder: GTC/DAY rest │ IOC cancel │ market reject
//! ```
//!
//! A fill that would take any remaining quantity negative is a consistency
//! violation: the book is taken offline and the error surfaces loudly.

mod proptests;

use crate::core::errors::{reason, CoreResult, ExecutionError};
use crate::core::order::{FillError, Order, Trade};
use crate::core::types::{OrderId, OrderType, Side, Symbol};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap, VecDeque};
use tracing::{debug, error};

/// A price and the FIFO queue of order ids resting at that price
///
/// The orders themselves live in the book's id index; a cancelled order
/// leaves its queue slot behind as a tombstone that matching reclaims
/// lazily, so in-level removal is constant-time. `open_quantity` and
/// `live` track only the orders still present.
#[derive(Debug)]
pub struct PriceLevel {
    pub price: Decimal,
    queue: VecDeque<OrderId>,
    open_quantity: Decimal,
    live: usize,
}

impl PriceLevel {
    fn new(price: Decimal) -> Self {
        Self {
            price,
            queue: VecDeque::new(),
            open_quantity: Decimal::ZERO,
            live: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn len(&self) -> usize {
        self.live
    }

    /// Total open quantity at this level
    pub fn total_quantity(&self) -> Decimal {
        self.open_quantity
    }
}

/// How the unfilled portion of an incoming order was disposed of
#[derive(Debug)]
pub enum Remainder {
    /// Fully filled, nothing left
    None,
    /// GTC/DAY remainder now resting in the book
    Rested(Order),
    /// IOC remainder discarded; report Cancelled for the open portion
    Cancelled(Order),
    /// FOK not fully fillable or market order against an empty side;
    /// the whole order is rejected with zero side effects
    Rejected { order: Order, code: &'static str },
}

/// Result of submitting one order to the book
#[derive(Debug)]
pub struct MatchOutcome {
    pub fills: Vec<Trade>,
    pub remainder: Remainder,
}

/// One side of the book: sorted price levels
///
/// Both sides key ascending; bids iterate in reverse for best-first.
type BookSide = BTreeMap<Decimal, PriceLevel>;

/// Per-instrument limit order book with price-time-priority matching
pub struct OrderBook {
    symbol: Symbol,
    bids: BookSide,
    asks: BookSide,
    /// Resting orders by id; level queues hold ids only, so a cancel is
    /// one map removal plus level counter updates
    index: HashMap<OrderId, Order>,
    /// Arrival sequence, strictly increasing per instrument
    next_sequence: u64,
    last_trade_price: Option<Decimal>,
    /// Set after a consistency violation; all further mutation is refused
    /// until the book is rebuilt
    offline: bool,
}

impl OrderBook {
    pub fn new(symbol: Symbol) -> Self {
        Self {
            symbol,
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            index: HashMap::new(),
            next_sequence: 0,
            last_trade_price: None,
            offline: false,
        }
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.keys().next_back().copied()
    }

    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.keys().next().copied()
    }

    pub fn last_trade_price(&self) -> Option<Decimal> {
        self.last_trade_price
    }

    /// Seed the reference price before any trade has printed
    pub fn set_reference_price(&mut self, price: Decimal) {
        if self.last_trade_price.is_none() {
            self.last_trade_price = Some(price);
        }
    }

    pub fn is_offline(&self) -> bool {
        self.offline
    }

    /// Number of resting orders across both sides
    pub fn resting_orders(&self) -> usize {
        self.index.len()
    }

    /// Open quantity at a given price on a side (diagnostics and tests)
    pub fn quantity_at(&self, side: Side, price: Decimal) -> Decimal {
        let book_side = match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        };
        book_side
            .get(&price)
            .map(|l| l.total_quantity())
            .unwrap_or(Decimal::ZERO)
    }

    /// Submit an order for matching
    ///
    /// Returns the trades produced and the disposition of any remainder.
    /// The caller assigns no sequence number; arrival order at this book is
    /// what defines time priority.
    pub fn submit(&mut self, mut order: Order) -> CoreResult<MatchOutcome> {
        self.check_online()?;

        self.next_sequence += 1;
        order.sequence = self.next_sequence;

        // FOK: dry-run fillability across levels before committing anything
        if order.time_in_force == crate::core::types::TimeInForce::Fok {
            let fillable = self.fillable_quantity(&order);
            if fillable < order.quantity {
                debug!(
                    order_id = %order.id,
                    fillable = %fillable,
                    quantity = %order.quantity,
                    "FOK order not fully fillable, rejecting with zero side effects"
                );
                return Ok(MatchOutcome {
                    fills: Vec::new(),
                    remainder: Remainder::Rejected {
                        order,
                        code: reason::FOK_UNFILLABLE,
                    },
                });
            }
        }

        let fills = self.match_incoming(&mut order)?;

        let remainder = if order.remaining.is_zero() {
            Remainder::None
        } else if order.order_type == OrderType::Market {
            // Market orders never rest
            Remainder::Rejected {
                order,
                code: reason::MARKET_UNFILLABLE,
            }
        } else if order.time_in_force.may_rest() {
            match order.limit_price {
                Some(price) => {
                    self.rest(order.clone(), price);
                    Remainder::Rested(order)
                }
                // A non-market order without a limit price cannot rest
                None => Remainder::Rejected {
                    order,
                    code: reason::MALFORMED_ORDER,
                },
            }
        } else {
            // IOC: discard the open portion
            Remainder::Cancelled(order)
        };

        Ok(MatchOutcome { fills, remainder })
    }

    /// Cancel a resting order, preserving FIFO order of the remaining orders
    ///
    /// Constant-time within the level: the order leaves the index and its
    /// queue slot stays behind as a tombstone for matching to reclaim.
    pub fn cancel(&mut self, order_id: OrderId) -> CoreResult<Order> {
        self.check_online()?;

        let order = self.index.remove(&order_id).ok_or_else(|| {
            ExecutionError::validation(reason::UNKNOWN_ORDER, format!("order {} not resting", order_id))
        })?;

        let price = order.limit_price.ok_or_else(|| ExecutionError::Consistency {
            symbol: self.symbol.clone(),
            detail: format!("resting order {} carries no level price", order_id),
        })?;

        let book_side = match order.side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        };

        let level = book_side.get_mut(&price).ok_or_else(|| {
            ExecutionError::Consistency {
                symbol: self.symbol.clone(),
                detail: format!("index points at missing level {} for order {}", price, order_id),
            }
        })?;

        level.open_quantity -= order.remaining;
        level.live -= 1;
        if level.is_empty() {
            book_side.remove(&price);
        }

        Ok(order)
    }

    /// Dry-run: total quantity immediately fillable for `order` at or
    /// better than its limit. Mutates nothing.
    pub fn fillable_quantity(&self, order: &Order) -> Decimal {
        let mut fillable = Decimal::ZERO;
        let want = order.quantity;

        let levels: Box<dyn Iterator<Item = (&Decimal, &PriceLevel)>> = match order.side {
            Side::Buy => Box::new(self.asks.iter()),
            Side::Sell => Box::new(self.bids.iter().rev()),
        };

        for (price, level) in levels {
            if !order.crosses(*price) {
                break;
            }
            fillable += level.total_quantity();
            if fillable >= want {
                return want;
            }
        }
        fillable
    }

    /// Match an incoming order against the opposite side
    ///
    /// Trade creation and the two quantity decrements happen together; no
    /// intermediate state shows a trade without both decrements applied.
    fn match_incoming(&mut self, incoming: &mut Order) -> CoreResult<Vec<Trade>> {
        let mut fills = Vec::new();
        // Deferred so the level borrow is released before the book mutates
        // its offline flag
        let mut violation: Option<(OrderId, FillError)> = None;

        'levels: while incoming.remaining > Decimal::ZERO {
            let best_price = match incoming.side {
                Side::Buy => self.best_ask(),
                Side::Sell => self.best_bid(),
            };
            let Some(price) = best_price else { break };
            if !incoming.crosses(price) {
                break;
            }

            let symbol = self.symbol.clone();
            let (book_side, index) = match incoming.side {
                Side::Buy => (&mut self.asks, &mut self.index),
                Side::Sell => (&mut self.bids, &mut self.index),
            };
            // Level exists: best_price came from this side's keys
            let Some(level) = book_side.get_mut(&price) else {
                break;
            };

            // Consume orders within the level strictly in arrival order
            while incoming.remaining > Decimal::ZERO {
                let Some(&front_id) = level.queue.front() else {
                    break;
                };
                // Cancelled orders leave a tombstone in the queue
                let Some(resting) = index.get_mut(&front_id) else {
                    level.queue.pop_front();
                    continue;
                };

                let qty = incoming.remaining.min(resting.remaining);

                // Both decrements atomic with trade creation: a failure in
                // either is a consistency violation, the book goes offline
                if let Err(e) = incoming.fill(qty) {
                    violation = Some((incoming.id, e));
                    break 'levels;
                }
                if let Err(e) = resting.fill(qty) {
                    violation = Some((front_id, e));
                    break 'levels;
                }
                level.open_quantity -= qty;

                let trade = Trade::new(symbol.clone(), price, qty, incoming.id, front_id);
                debug!(
                    symbol = %symbol,
                    price = %price,
                    qty = %qty,
                    taker = %incoming.id,
                    maker = %front_id,
                    "trade"
                );
                fills.push(trade);
                self.last_trade_price = Some(price);

                if resting.is_fully_filled() {
                    index.remove(&front_id);
                    level.queue.pop_front();
                    level.live -= 1;
                }
            }

            if level.is_empty() {
                book_side.remove(&price);
            }
        }

        if let Some((order_id, cause)) = violation {
            return Err(self.go_offline(order_id, cause));
        }

        Ok(fills)
    }

    /// Rest a remainder at its limit price, tail of the level
    fn rest(&mut self, order: Order, price: Decimal) {
        debug_assert_eq!(order.limit_price, Some(price));
        let book_side = match order.side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        };
        let level = book_side
            .entry(price)
            .or_insert_with(|| PriceLevel::new(price));
        level.queue.push_back(order.id);
        level.open_quantity += order.remaining;
        level.live += 1;
        self.index.insert(order.id, order);
    }

    fn check_online(&self) -> CoreResult<()> {
        if self.offline {
            return Err(ExecutionError::validation(
                reason::BOOK_OFFLINE,
                format!("book {} is offline pending rebuild", self.symbol),
            ));
        }
        Ok(())
    }

    /// Take the book offline after an invariant violation
    fn go_offline(&mut self, order_id: OrderId, cause: FillError) -> ExecutionError {
        self.offline = true;
        error!(
            symbol = %self.symbol,
            order_id = %order_id,
            %cause,
            "BOOK OFFLINE: quantity invariant violated, manual rebuild required"
        );
        ExecutionError::Consistency {
            symbol: self.symbol.clone(),
            detail: format!("order {}: {}", order_id, cause),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{AccountId, TimeInForce};
    use rust_decimal_macros::dec;
    use std::time::SystemTime;

    fn order(side: Side, qty: Decimal, price: Option<Decimal>, tif: TimeInForce) -> Order {
        Order {
            id: OrderId::generate(),
            symbol: Symbol::from("BTC-USD"),
            side,
            order_type: if price.is_some() {
                OrderType::Limit
            } else {
                OrderType::Market
            },
            quantity: qty,
            remaining: qty,
            limit_price: price,
            stop_price: None,
            time_in_force: tif,
            account: AccountId::from("ACC1"),
            created_at: SystemTime::now(),
            sequence: 0,
        }
    }

    fn limit(side: Side, qty: Decimal, price: Decimal) -> Order {
        order(side, qty, Some(price), TimeInForce::Gtc)
    }

    #[test]
    fn test_limit_buy_rests_in_empty_book() {
        // A limit buy into an empty book rests at its limit
        let mut book = OrderBook::new(Symbol::from("BTC-USD"));
        let outcome = book.submit(limit(Side::Buy, dec!(100), dec!(50.00))).unwrap();

        assert!(outcome.fills.is_empty());
        assert!(matches!(outcome.remainder, Remainder::Rested(_)));
        assert_eq!(book.best_bid(), Some(dec!(50.00)));
        assert_eq!(book.quantity_at(Side::Buy, dec!(50.00)), dec!(100));
    }

    #[test]
    fn test_market_buy_partially_consumes_resting_sell() {
        // Market buy 60 against a resting sell of 100 at 50.00
        let mut book = OrderBook::new(Symbol::from("BTC-USD"));
        let resting = limit(Side::Sell, dec!(100), dec!(50.00));
        let resting_id = resting.id;
        book.submit(resting).unwrap();

        let incoming = order(Side::Buy, dec!(60), None, TimeInForce::Ioc);
        let outcome = book.submit(incoming).unwrap();

        assert_eq!(outcome.fills.len(), 1);
        let trade = &outcome.fills[0];
        assert_eq!(trade.quantity, dec!(60));
        assert_eq!(trade.price, dec!(50.00));
        assert_eq!(trade.maker_order, resting_id);
        assert!(matches!(outcome.remainder, Remainder::None));

        // Resting order remaining becomes 40
        assert_eq!(book.quantity_at(Side::Sell, dec!(50.00)), dec!(40));
        assert_eq!(book.last_trade_price(), Some(dec!(50.00)));
    }

    #[test]
    fn test_price_time_priority_within_level() {
        let mut book = OrderBook::new(Symbol::from("BTC-USD"));
        let first = limit(Side::Sell, dec!(30), dec!(50));
        let second = limit(Side::Sell, dec!(30), dec!(50));
        let first_id = first.id;
        let second_id = second.id;
        book.submit(first).unwrap();
        book.submit(second).unwrap();

        let outcome = book.submit(limit(Side::Buy, dec!(40), dec!(50))).unwrap();

        // Fills allocated strictly in arrival order: 30 from first, 10 from second
        assert_eq!(outcome.fills.len(), 2);
        assert_eq!(outcome.fills[0].maker_order, first_id);
        assert_eq!(outcome.fills[0].quantity, dec!(30));
        assert_eq!(outcome.fills[1].maker_order, second_id);
        assert_eq!(outcome.fills[1].quantity, dec!(10));
    }

    #[test]
    fn test_price_priority_across_levels() {
        let mut book = OrderBook::new(Symbol::from("BTC-USD"));
        book.submit(limit(Side::Sell, dec!(10), dec!(51))).unwrap();
        book.submit(limit(Side::Sell, dec!(10), dec!(50))).unwrap();

        let outcome = book.submit(limit(Side::Buy, dec!(15), dec!(51))).unwrap();

        // Best ask (50) consumed before 51
        assert_eq!(outcome.fills[0].price, dec!(50));
        assert_eq!(outcome.fills[0].quantity, dec!(10));
        assert_eq!(outcome.fills[1].price, dec!(51));
        assert_eq!(outcome.fills[1].quantity, dec!(5));
    }

    #[test]
    fn test_buy_does_not_cross_above_limit() {
        let mut book = OrderBook::new(Symbol::from("BTC-USD"));
        book.submit(limit(Side::Sell, dec!(10), dec!(51))).unwrap();

        let outcome = book.submit(limit(Side::Buy, dec!(10), dec!(50))).unwrap();
        assert!(outcome.fills.is_empty());
        assert!(matches!(outcome.remainder, Remainder::Rested(_)));
        // Book not crossed: best bid below best ask
        assert!(book.best_bid().unwrap() < book.best_ask().unwrap());
    }

    #[test]
    fn test_ioc_remainder_cancelled() {
        let mut book = OrderBook::new(Symbol::from("BTC-USD"));
        book.submit(limit(Side::Sell, dec!(60), dec!(50))).unwrap();

        let ioc = order(Side::Buy, dec!(100), Some(dec!(50)), TimeInForce::Ioc);
        let outcome = book.submit(ioc).unwrap();

        assert_eq!(outcome.fills.len(), 1);
        assert_eq!(outcome.fills[0].quantity, dec!(60));
        match outcome.remainder {
            Remainder::Cancelled(o) => assert_eq!(o.remaining, dec!(40)),
            other => panic!("expected Cancelled, got {:?}", other),
        }
        // Nothing rested
        assert_eq!(book.resting_orders(), 0);
    }

    #[test]
    fn test_fok_rejected_with_zero_side_effects() {
        // FOK buy 100 when only 60 is fillable at the limit
        let mut book = OrderBook::new(Symbol::from("BTC-USD"));
        book.submit(limit(Side::Sell, dec!(40), dec!(49))).unwrap();
        book.submit(limit(Side::Sell, dec!(20), dec!(50))).unwrap();

        let fok = order(Side::Buy, dec!(100), Some(dec!(50)), TimeInForce::Fok);
        let outcome = book.submit(fok).unwrap();

        assert!(outcome.fills.is_empty());
        assert!(matches!(
            outcome.remainder,
            Remainder::Rejected {
                code: reason::FOK_UNFILLABLE,
                ..
            }
        ));
        // Book unchanged
        assert_eq!(book.quantity_at(Side::Sell, dec!(49)), dec!(40));
        assert_eq!(book.quantity_at(Side::Sell, dec!(50)), dec!(20));
    }

    #[test]
    fn test_fok_fills_completely_when_fillable() {
        let mut book = OrderBook::new(Symbol::from("BTC-USD"));
        book.submit(limit(Side::Sell, dec!(60), dec!(49))).unwrap();
        book.submit(limit(Side::Sell, dec!(60), dec!(50))).unwrap();

        let fok = order(Side::Buy, dec!(100), Some(dec!(50)), TimeInForce::Fok);
        let outcome = book.submit(fok).unwrap();

        let total: Decimal = outcome.fills.iter().map(|t| t.quantity).sum();
        assert_eq!(total, dec!(100));
        assert!(matches!(outcome.remainder, Remainder::None));
    }

    #[test]
    fn test_fok_only_counts_crossing_levels() {
        let mut book = OrderBook::new(Symbol::from("BTC-USD"));
        book.submit(limit(Side::Sell, dec!(60), dec!(49))).unwrap();
        // 60 more, but above the FOK's limit
        book.submit(limit(Side::Sell, dec!(60), dec!(52))).unwrap();

        let fok = order(Side::Buy, dec!(100), Some(dec!(50)), TimeInForce::Fok);
        let outcome = book.submit(fok).unwrap();
        assert!(outcome.fills.is_empty());
        assert!(matches!(outcome.remainder, Remainder::Rejected { .. }));
    }

    #[test]
    fn test_market_order_never_rests() {
        let mut book = OrderBook::new(Symbol::from("BTC-USD"));
        let market = order(Side::Buy, dec!(10), None, TimeInForce::Day);
        let outcome = book.submit(market).unwrap();

        assert!(outcome.fills.is_empty());
        assert!(matches!(
            outcome.remainder,
            Remainder::Rejected {
                code: reason::MARKET_UNFILLABLE,
                ..
            }
        ));
        assert_eq!(book.resting_orders(), 0);
    }

    #[test]
    fn test_cancel_preserves_fifo() {
        let mut book = OrderBook::new(Symbol::from("BTC-USD"));
        let a = limit(Side::Sell, dec!(10), dec!(50));
        let b = limit(Side::Sell, dec!(10), dec!(50));
        let c = limit(Side::Sell, dec!(10), dec!(50));
        let (a_id, b_id, c_id) = (a.id, b.id, c.id);
        book.submit(a).unwrap();
        book.submit(b).unwrap();
        book.submit(c).unwrap();

        book.cancel(b_id).unwrap();

        let outcome = book.submit(limit(Side::Buy, dec!(20), dec!(50))).unwrap();
        assert_eq!(outcome.fills[0].maker_order, a_id);
        assert_eq!(outcome.fills[1].maker_order, c_id);
    }

    #[test]
    fn test_cancel_excludes_quantity_immediately() {
        // The tombstoned slot is reclaimed lazily, but depth and
        // fillability must drop the cancelled quantity right away
        let mut book = OrderBook::new(Symbol::from("BTC-USD"));
        let a = limit(Side::Sell, dec!(10), dec!(50));
        let b = limit(Side::Sell, dec!(10), dec!(50));
        let b_id = b.id;
        book.submit(a).unwrap();
        book.submit(b).unwrap();

        book.cancel(b_id).unwrap();

        assert_eq!(book.quantity_at(Side::Sell, dec!(50)), dec!(10));
        assert_eq!(book.resting_orders(), 1);
        let probe = order(Side::Buy, dec!(20), Some(dec!(50)), TimeInForce::Fok);
        assert_eq!(book.fillable_quantity(&probe), dec!(10));
    }

    #[test]
    fn test_cancelled_head_skipped_by_matching() {
        let mut book = OrderBook::new(Symbol::from("BTC-USD"));
        let head = limit(Side::Sell, dec!(10), dec!(50));
        let tail = limit(Side::Sell, dec!(10), dec!(50));
        let head_id = head.id;
        let tail_id = tail.id;
        book.submit(head).unwrap();
        book.submit(tail).unwrap();

        book.cancel(head_id).unwrap();

        let outcome = book.submit(limit(Side::Buy, dec!(10), dec!(50))).unwrap();
        assert_eq!(outcome.fills.len(), 1);
        assert_eq!(outcome.fills[0].maker_order, tail_id);
        assert_eq!(book.best_ask(), None);
    }

    #[test]
    fn test_cancel_last_order_clears_level() {
        let mut book = OrderBook::new(Symbol::from("BTC-USD"));
        let o = limit(Side::Sell, dec!(10), dec!(50));
        let id = o.id;
        book.submit(o).unwrap();

        book.cancel(id).unwrap();
        assert_eq!(book.best_ask(), None);
        assert_eq!(book.resting_orders(), 0);
    }

    #[test]
    fn test_cancel_unknown_order() {
        let mut book = OrderBook::new(Symbol::from("BTC-USD"));
        let err = book.cancel(OrderId::generate()).unwrap_err();
        assert_eq!(err.code(), reason::UNKNOWN_ORDER);
    }

    #[test]
    fn test_quantity_conservation() {
        let mut book = OrderBook::new(Symbol::from("BTC-USD"));
        book.submit(limit(Side::Sell, dec!(30), dec!(50))).unwrap();
        book.submit(limit(Side::Sell, dec!(30), dec!(51))).unwrap();

        let incoming = limit(Side::Buy, dec!(45), dec!(51));
        let original_qty = incoming.quantity;
        let outcome = book.submit(incoming).unwrap();

        let filled: Decimal = outcome.fills.iter().map(|t| t.quantity).sum();
        assert_eq!(filled, dec!(45));
        // Sum of fills never exceeds original quantity
        assert!(filled <= original_qty);
        // Resting side decremented by exactly the traded quantity
        assert_eq!(
            book.quantity_at(Side::Sell, dec!(50)) + book.quantity_at(Side::Sell, dec!(51)),
            dec!(15)
        );
    }

    #[test]
    fn test_sequence_strictly_increasing() {
        let mut book = OrderBook::new(Symbol::from("BTC-USD"));
        let o1 = limit(Side::Buy, dec!(1), dec!(10));
        let o2 = limit(Side::Buy, dec!(1), dec!(11));
        let r1 = book.submit(o1).unwrap();
        let r2 = book.submit(o2).unwrap();
        let s1 = match r1.remainder {
            Remainder::Rested(o) => o.sequence,
            _ => panic!(),
        };
        let s2 = match r2.remainder {
            Remainder::Rested(o) => o.sequence,
            _ => panic!(),
        };
        assert!(s2 > s1);
    }

    #[test]
    fn test_offline_book_refuses_mutation() {
        let mut book = OrderBook::new(Symbol::from("BTC-USD"));
        book.offline = true;
        let err = book.submit(limit(Side::Buy, dec!(1), dec!(10))).unwrap_err();
        assert_eq!(err.code(), reason::BOOK_OFFLINE);
    }
}
