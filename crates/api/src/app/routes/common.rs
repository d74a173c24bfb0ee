use std::collections::HashMap;

use axum::http::StatusCode;

use rdpstore_catalog::{Fingerprint, LineItem, PriceList};

use crate::app::{dto::OrderLineRequest, errors};

/// Re-price requested lines from the catalog; client prices are never trusted.
///
/// Quantities are checked against the per-line cap after duplicate
/// configurations are merged, and against the per-order unit cap.
pub fn price_lines(
    prices: &PriceList,
    lines: &[OrderLineRequest],
) -> Result<Vec<LineItem>, axum::response::Response> {
    let priced = lines
        .iter()
        .map(|req| {
            if !(1..=LineItem::MAX_QUANTITY).contains(&req.quantity) {
                return Err(quantity_error(format!(
                    "quantity must be within 1..={}",
                    LineItem::MAX_QUANTITY
                )));
            }
            prices
                .resolve(&req.configuration)
                .map(|line| line.with_quantity(req.quantity))
                .map_err(errors::domain_error_to_response)
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut per_line: HashMap<&Fingerprint, u64> = HashMap::new();
    for line in &priced {
        *per_line.entry(&line.fingerprint).or_default() += u64::from(line.quantity);
    }
    if per_line.values().any(|&n| n > u64::from(LineItem::MAX_QUANTITY)) {
        return Err(quantity_error(format!(
            "at most {} units of one configuration per order",
            LineItem::MAX_QUANTITY
        )));
    }
    if per_line.values().sum::<u64>() > LineItem::MAX_ORDER_UNITS {
        return Err(quantity_error(format!(
            "at most {} units per order",
            LineItem::MAX_ORDER_UNITS
        )));
    }

    Ok(priced)
}

fn quantity_error(message: String) -> axum::response::Response {
    errors::json_error(StatusCode::UNPROCESSABLE_ENTITY, "validation_error", message)
}
