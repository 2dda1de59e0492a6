// region:    --- Imports
use crate::auction::events::AuctionEvent;
use crate::bidding::model::{leaderboard_order, Bid};
use uuid::Uuid;
// endregion: --- Imports

/// Viewer-side reconciliation of a bid list.
/// The fan-out gives no ordering guarantee across hops, so `newBid` and
/// `bidUpdate` may arrive in any order or more than once; bids are merged by id.
#[derive(Debug, Clone)]
pub struct BidBoard {
    auction_id: Uuid,
    current_price: Option<i64>,
    bids: Vec<Bid>,
}

impl BidBoard {
    pub fn new(auction_id: Uuid) -> Self {
        Self {
            auction_id,
            current_price: None,
            bids: Vec::new(),
        }
    }

    /// Folds one event into the board. Returns true when the board changed.
    pub fn apply(&mut self, event: &AuctionEvent) -> bool {
        match event {
            AuctionEvent::NewBid { bid } if bid.auction_id == self.auction_id => {
                let changed = self.upsert(bid);
                self.raise_price(bid.amount) || changed
            }
            AuctionEvent::BidUpdate { auction, bids } if auction.id == self.auction_id => {
                let mut changed = false;
                let auction_id = self.auction_id;
                for bid in bids.iter().filter(|b| b.auction_id == auction_id) {
                    changed |= self.upsert(bid);
                }
                self.raise_price(auction.current_price) || changed
            }
            _ => false,
        }
    }

    pub fn bids(&self) -> &[Bid] {
        &self.bids
    }

    pub fn current_price(&self) -> Option<i64> {
        self.current_price
    }

    pub fn leader(&self) -> Option<&Bid> {
        self.bids.first()
    }

    fn upsert(&mut self, bid: &Bid) -> bool {
        if self.bids.iter().any(|b| b.id == bid.id) {
            return false;
        }
        self.bids.push(bid.clone());
        self.bids.sort_by(leaderboard_order);
        true
    }

    // price never goes down, whatever order events land in
    fn raise_price(&mut self, price: i64) -> bool {
        match self.current_price {
            Some(current) if current >= price => false,
            _ => {
                self.current_price = Some(price);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auction::model::{Auction, NewAuction};
    use chrono::{Duration, Utc};

    fn fixture() -> (Auction, Bid, Bid) {
        let now = Utc::now();
        let mut auction = Auction::new(
            NewAuction {
                item_id: "item".to_string(),
                status_id: "available".to_string(),
                start_time: now,
                end_time: now + Duration::minutes(10),
                start_price: 10,
                min_bid_increment: 0,
            },
            now,
        );
        let first = Bid::new(auction.id, "alice".to_string(), 20, now);
        let second = Bid::new(auction.id, "bob".to_string(), 30, now + Duration::seconds(1));
        auction.current_price = 30;
        (auction, first, second)
    }

    #[test]
    fn new_bid_then_update_keeps_one_copy() {
        let (auction, first, second) = fixture();
        let mut board = BidBoard::new(auction.id);
        assert!(board.apply(&AuctionEvent::NewBid { bid: second.clone() }));
        board.apply(&AuctionEvent::BidUpdate {
            auction: auction.clone(),
            bids: vec![second.clone(), first.clone()],
        });
        assert_eq!(board.bids(), &[second.clone(), first]);
        assert_eq!(board.current_price(), Some(30));
    }

    #[test]
    fn update_then_new_bid_keeps_one_copy() {
        let (auction, first, second) = fixture();
        let mut board = BidBoard::new(auction.id);
        board.apply(&AuctionEvent::BidUpdate {
            auction: auction.clone(),
            bids: vec![second.clone(), first.clone()],
        });
        assert!(!board.apply(&AuctionEvent::NewBid { bid: second.clone() }));
        assert_eq!(board.bids().len(), 2);
        assert_eq!(board.leader(), Some(&second));
    }

    #[test]
    fn stale_update_does_not_lower_the_price() {
        let (mut auction, first, second) = fixture();
        let mut board = BidBoard::new(auction.id);
        board.apply(&AuctionEvent::NewBid { bid: second.clone() });
        auction.current_price = 20;
        board.apply(&AuctionEvent::BidUpdate {
            auction,
            bids: vec![first],
        });
        assert_eq!(board.current_price(), Some(30));
        assert_eq!(board.leader(), Some(&second));
    }

    #[test]
    fn ignores_other_auctions() {
        let (auction, first, _) = fixture();
        let mut board = BidBoard::new(Uuid::new_v4());
        assert!(!board.apply(&AuctionEvent::NewBid { bid: first }));
        assert!(!board.apply(&AuctionEvent::BidUpdate {
            auction,
            bids: vec![]
        }));
        assert!(board.bids().is_empty());
    }
}
