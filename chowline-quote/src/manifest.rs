use chowline_core::checkout::Cart;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Dimensions {
    pub length_cm: u32,
    pub width_cm: u32,
    pub height_cm: u32,
}

impl Dimensions {
    pub const fn new(length_cm: u32, width_cm: u32, height_cm: u32) -> Self {
        Self { length_cm, width_cm, height_cm }
    }

    pub fn volume_cm3(&self) -> u64 {
        self.length_cm as u64 * self.width_cm as u64 * self.height_cm as u64
    }
}

/// Box sizes by total item quantity: (largest quantity that fits, box).
const SIZE_TIERS: [(u32, Dimensions); 3] = [
    (5, Dimensions::new(30, 30, 15)),
    (10, Dimensions::new(40, 40, 20)),
    (u32::MAX, Dimensions::new(50, 40, 25)),
];

/// Pick the box for a total item quantity. Never shrinks as quantity grows.
pub fn dimensions_for_quantity(total_quantity: u32) -> Dimensions {
    SIZE_TIERS
        .iter()
        .find(|(max_quantity, _)| total_quantity <= *max_quantity)
        .map(|(_, dims)| *dims)
        .unwrap_or(SIZE_TIERS[SIZE_TIERS.len() - 1].1)
}

fn default_unit_weight_kg() -> Decimal {
    Decimal::new(5, 1)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageItem {
    pub name: String,
    pub description: Option<String>,
    pub quantity: u32,
    pub unit_value: Decimal,
    pub unit_weight_kg: Decimal,
}

/// What goes in the bag, synthesized from the cart since menus carry no
/// shipping data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageManifest {
    pub items: Vec<PackageItem>,
    pub total_quantity: u32,
    pub total_weight_kg: Decimal,
    pub declared_value: Decimal,
    pub currency: String,
    pub dimensions: Dimensions,
}

impl PackageManifest {
    pub fn from_items(items: Vec<PackageItem>, currency: &str) -> Self {
        let total_quantity = items.iter().map(|i| i.quantity).sum();
        let total_weight_kg = items
            .iter()
            .map(|i| i.unit_weight_kg * Decimal::from(i.quantity))
            .sum();
        let declared_value = items
            .iter()
            .map(|i| i.unit_value * Decimal::from(i.quantity))
            .sum();

        Self {
            items,
            total_quantity,
            total_weight_kg,
            declared_value,
            currency: currency.to_string(),
            dimensions: dimensions_for_quantity(total_quantity),
        }
    }

    pub fn from_cart(cart: &Cart) -> Self {
        let items = cart
            .items
            .iter()
            .filter(|line| line.quantity > 0)
            .map(|line| PackageItem {
                name: line.name.clone(),
                description: line.description.clone(),
                quantity: line.quantity,
                unit_value: line.unit_price,
                unit_weight_kg: line.unit_weight_kg.unwrap_or_else(default_unit_weight_kg),
            })
            .collect();
        Self::from_items(items, &cart.currency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chowline_core::checkout::CartLine;
    use uuid::Uuid;

    fn cart(quantities: &[u32]) -> Cart {
        Cart {
            user_id: Uuid::new_v4(),
            vendor_id: Uuid::new_v4(),
            currency: "NGN".to_string(),
            items: quantities
                .iter()
                .enumerate()
                .map(|(i, q)| CartLine {
                    name: format!("dish {i}"),
                    description: None,
                    quantity: *q,
                    unit_price: Decimal::new(2500, 0),
                    unit_weight_kg: None,
                })
                .collect(),
        }
    }

    #[test]
    fn test_tiers_for_documented_quantities() {
        assert_eq!(PackageManifest::from_cart(&cart(&[1, 2])).dimensions, Dimensions::new(30, 30, 15));
        assert_eq!(PackageManifest::from_cart(&cart(&[3, 4])).dimensions, Dimensions::new(40, 40, 20));
        assert_eq!(PackageManifest::from_cart(&cart(&[12])).dimensions, Dimensions::new(50, 40, 25));
    }

    #[test]
    fn test_sizing_is_monotonic() {
        let mut previous = dimensions_for_quantity(0);
        for quantity in 0..200 {
            let dims = dimensions_for_quantity(quantity);
            assert!(dims.volume_cm3() >= previous.volume_cm3(), "shrank at {quantity}");
            previous = dims;
        }
    }

    #[test]
    fn test_totals_from_cart() {
        let manifest = PackageManifest::from_cart(&cart(&[2, 0, 1]));
        assert_eq!(manifest.items.len(), 2);
        assert_eq!(manifest.total_quantity, 3);
        assert_eq!(manifest.declared_value, Decimal::new(7500, 0));
        assert_eq!(manifest.total_weight_kg, Decimal::new(15, 1));
        assert_eq!(manifest.currency, "NGN");
    }
}
