use serde::{Deserialize, Serialize};

use rdpstore_catalog::{Fingerprint, LineItem, PlanConfiguration};

/// Session-owned collection of priced lines, merged by fingerprint.
///
/// Every operation is total: unknown fingerprints are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    lines: Vec<LineItem>,
}

impl Cart {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one unit of `config` at `unit_price`.
    ///
    /// An existing line with the same fingerprint gains one unit; its stored
    /// price is left as it was.
    pub fn add_line(&mut self, config: PlanConfiguration, unit_price: u64) {
        self.add_item(LineItem::new(config, unit_price));
    }

    /// Merge an already priced line (quantity included).
    ///
    /// A merged line never exceeds [`LineItem::MAX_QUANTITY`].
    pub fn add_item(&mut self, item: LineItem) {
        let units = item.quantity;
        match self.position(&item.fingerprint) {
            Some(idx) => {
                let line = &mut self.lines[idx];
                line.quantity = line.quantity.saturating_add(units).clamp(1, LineItem::MAX_QUANTITY);
            }
            None => self.lines.push(item.with_quantity(units)),
        }
    }

    pub fn remove_line(&mut self, fingerprint: &Fingerprint) {
        self.lines.retain(|l| &l.fingerprint != fingerprint);
    }

    /// Replace a line's quantity; `n <= 0` removes the line and larger
    /// values are capped at [`LineItem::MAX_QUANTITY`].
    pub fn set_quantity(&mut self, fingerprint: &Fingerprint, n: i64) {
        if n <= 0 {
            self.remove_line(fingerprint);
            return;
        }
        if let Some(idx) = self.position(fingerprint) {
            let n = u32::try_from(n).unwrap_or(u32::MAX);
            self.lines[idx].quantity = n.min(LineItem::MAX_QUANTITY);
        }
    }

    /// Σ(unit_price × quantity) in smallest currency unit, saturating.
    pub fn total(&self) -> u64 {
        saturating_total(&self.lines)
    }

    /// Number of units across all lines (one instance each at fulfillment).
    pub fn unit_count(&self) -> u64 {
        self.lines.iter().map(|l| u64::from(l.quantity)).sum()
    }

    pub fn lines(&self) -> &[LineItem] {
        &self.lines
    }

    pub fn get(&self, fingerprint: &Fingerprint) -> Option<&LineItem> {
        self.lines.iter().find(|l| &l.fingerprint == fingerprint)
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    /// Owned, immutable copy handed to checkout.
    pub fn snapshot(&self) -> CartSnapshot {
        CartSnapshot {
            lines: self.lines.clone(),
        }
    }

    fn position(&self, fingerprint: &Fingerprint) -> Option<usize> {
        self.lines.iter().position(|l| &l.fingerprint == fingerprint)
    }
}

/// Frozen copy of a cart at submission time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartSnapshot {
    lines: Vec<LineItem>,
}

impl CartSnapshot {
    /// Build a snapshot from lines, merging duplicates like [`Cart`] does.
    pub fn from_lines(lines: impl IntoIterator<Item = LineItem>) -> Self {
        let mut cart = Cart::new();
        for line in lines {
            cart.add_item(line);
        }
        cart.snapshot()
    }

    pub fn lines(&self) -> &[LineItem] {
        &self.lines
    }

    pub fn into_lines(self) -> Vec<LineItem> {
        self.lines
    }

    pub fn total(&self) -> u64 {
        saturating_total(&self.lines)
    }

    pub fn unit_count(&self) -> u64 {
        self.lines.iter().map(|l| u64::from(l.quantity)).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

fn saturating_total(lines: &[LineItem]) -> u64 {
    lines.iter().map(LineItem::subtotal).fold(0, u64::saturating_add)
}
