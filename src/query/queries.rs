const AUCTION_COLUMNS: &str = "id, item_id, status_id, start_time, end_time, start_price, current_price, min_bid_increment, settled, settlement_stage, settlement_id, settlement_updated_at, created_at";

pub const INSERT_AUCTION: &str = r#"
    INSERT INTO auctions (id, item_id, status_id, start_time, end_time, start_price, current_price, min_bid_increment, settled, settlement_stage, created_at)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, FALSE, 'pending', $9)
"#;

pub fn get_auction() -> String {
    format!("SELECT {AUCTION_COLUMNS} FROM auctions WHERE id = $1")
}

pub const LIST_AUCTIONS: &str = r#"
    SELECT a.id, a.item_id, a.status_id, a.start_time, a.end_time, a.start_price, a.current_price,
           a.min_bid_increment, a.settled, a.settlement_stage, a.settlement_id, a.settlement_updated_at,
           a.created_at, COUNT(b.id) AS bid_count
    FROM auctions a
    LEFT JOIN bids b ON b.auction_id = a.id
    GROUP BY a.id
    ORDER BY a.created_at DESC
"#;

/// Only auctions that have not started may change terms.
pub const UPDATE_TERMS: &str = r#"
    UPDATE auctions
    SET start_time = $2, end_time = $3, status_id = $4, min_bid_increment = $5
    WHERE id = $1 AND settled = FALSE AND start_time > $6
"#;

/// bids are removed by ON DELETE CASCADE
pub const DELETE_AUCTION: &str = "DELETE FROM auctions WHERE id = $1";

/// Admission predicate and price raise in a single statement. The row lock
/// it takes orders the bid insert before any settlement claim.
pub fn raise_price() -> String {
    format!(
        "UPDATE auctions SET current_price = $2
         WHERE id = $1
           AND settled = FALSE
           AND start_time <= $3
           AND end_time > $3
           AND $2 > current_price
           AND (NOT $4 OR $2 - min_bid_increment >= current_price)
         RETURNING {AUCTION_COLUMNS}"
    )
}

pub const INSERT_BID: &str = r#"
    INSERT INTO bids (id, auction_id, user_id, amount, created_at)
    VALUES ($1, $2, $3, $4, $5)
"#;

pub const GET_BIDS: &str = r#"
    SELECT id, auction_id, user_id, amount, created_at
    FROM bids
    WHERE auction_id = $1
    ORDER BY amount DESC, created_at ASC, id ASC
"#;

/// Winning bid: highest amount, earliest on ties.
pub const GET_HIGHEST_BID: &str = r#"
    SELECT id, auction_id, user_id, amount, created_at
    FROM bids
    WHERE auction_id = $1
    ORDER BY amount DESC, created_at ASC, id ASC
    LIMIT 1
"#;

/// Exactly-once claim: flips `settled` only for an ended, unsettled auction.
pub fn claim_settlement() -> String {
    format!(
        "UPDATE auctions
         SET settled = TRUE, settlement_stage = 'claimed', settlement_id = $2, settlement_updated_at = $3
         WHERE id = $1 AND settled = FALSE AND end_time <= $3
         RETURNING {AUCTION_COLUMNS}"
    )
}

pub const ADVANCE_SETTLEMENT: &str = r#"
    UPDATE auctions
    SET settlement_stage = $3, settlement_updated_at = $4
    WHERE id = $1 AND settlement_stage = $2
"#;

pub const INSERT_PURCHASE: &str = r#"
    INSERT INTO purchases (id, auction_id, item_id, buyer_id, amount, created_at)
    VALUES ($1, $2, $3, $4, $5, $6)
    ON CONFLICT (auction_id) DO NOTHING
"#;

pub const GET_PURCHASE: &str = r#"
    SELECT id, auction_id, item_id, buyer_id, amount, created_at
    FROM purchases
    WHERE auction_id = $1
"#;

pub fn unsettled_auctions() -> String {
    format!("SELECT {AUCTION_COLUMNS} FROM auctions WHERE settled = FALSE ORDER BY end_time ASC")
}

pub fn stalled_settlements() -> String {
    format!(
        "SELECT {AUCTION_COLUMNS} FROM auctions
         WHERE settled = TRUE
           AND settlement_stage = ANY($1)
           AND (settlement_updated_at IS NULL OR settlement_updated_at <= $2)"
    )
}

pub const GET_ITEM: &str = "SELECT id, owner, status_id, price FROM items WHERE id = $1";

pub const STATUS_EXISTS: &str = "SELECT EXISTS (SELECT 1 FROM statuses WHERE id = $1)";

pub const MARK_ITEM_SOLD: &str = "UPDATE items SET status_id = $2, price = $3 WHERE id = $1";
