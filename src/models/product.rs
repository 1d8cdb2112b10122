use serde::{Deserialize, Serialize};

/// A product record as stored by the inventory service.
///
/// The wire format uses Mongo-style field names (`_id`, `imagePath`); the
/// create endpoint returns the same record under `id` instead, hence the alias.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    pub name: String,
    pub inventory: i64,
    pub price: f64,
    #[serde(rename = "imagePath", default)]
    pub image_path: Option<String>,
    #[serde(default)]
    pub creator: Option<String>,
}

impl Product {
    /// Whether the product can currently be purchased
    pub fn is_available(&self) -> bool {
        self.inventory > 0
    }

    /// Whether the given user created this product (and may edit/delete it)
    pub fn is_owned_by(&self, user_id: Option<&str>) -> bool {
        match (self.creator.as_deref(), user_id) {
            (Some(creator), Some(user)) => creator == user,
            _ => false,
        }
    }
}

/// One page of the product listing plus the server-side total,
/// needed to compute the page count for pagination controls.
#[derive(Debug, Clone, Default)]
pub struct ProductPage {
    pub products: Vec<Product>,
    pub total: i64,
}

/// User-entered product fields, validated before submission.
#[derive(Debug, Clone)]
pub struct ProductDraft {
    pub name: String,
    pub inventory: i64,
    pub price: f64,
}

impl ProductDraft {
    /// Validate form input. Returns the draft or a message suitable
    /// for display next to the form.
    pub fn parse(name: &str, inventory: &str, price: &str) -> Result<Self, String> {
        let name = name.trim();
        if name.is_empty() {
            return Err("Name is required".to_string());
        }

        let inventory: i64 = inventory
            .trim()
            .parse()
            .map_err(|_| "Inventory must be a whole number".to_string())?;
        if inventory < 0 {
            return Err("Inventory cannot be negative".to_string());
        }

        let price: f64 = price
            .trim()
            .parse()
            .map_err(|_| "Price must be a number".to_string())?;
        if price < 0.0 {
            return Err("Price cannot be negative".to_string());
        }

        Ok(Self {
            name: name.to_string(),
            inventory,
            price,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_product_wire_format() {
        let json = r#"{
            "_id": "65f1c0ffee",
            "name": "Widget",
            "inventory": 12,
            "price": 19.99,
            "imagePath": "http://localhost:3000/images/widget-123.png",
            "creator": "u-42"
        }"#;

        let product: Product = serde_json::from_str(json).expect("parse product");
        assert_eq!(product.id, "65f1c0ffee");
        assert_eq!(product.inventory, 12);
        assert!(product.is_available());
        assert!(product.is_owned_by(Some("u-42")));
        assert!(!product.is_owned_by(Some("u-7")));
        assert!(!product.is_owned_by(None));
    }

    #[test]
    fn test_parse_product_accepts_id_alias() {
        // The create endpoint returns `id` rather than `_id`
        let json = r#"{"id": "abc", "name": "Widget", "inventory": 0, "price": 1.0}"#;
        let product: Product = serde_json::from_str(json).expect("parse product");
        assert_eq!(product.id, "abc");
        assert!(product.image_path.is_none());
        assert!(!product.is_available());
    }

    #[test]
    fn test_draft_parse_valid() {
        let draft = ProductDraft::parse(" Widget ", "5", "9.50").expect("valid draft");
        assert_eq!(draft.name, "Widget");
        assert_eq!(draft.inventory, 5);
        assert_eq!(draft.price, 9.5);
    }

    #[test]
    fn test_draft_parse_rejects_bad_input() {
        assert!(ProductDraft::parse("", "5", "1.0").is_err());
        assert!(ProductDraft::parse("Widget", "five", "1.0").is_err());
        assert!(ProductDraft::parse("Widget", "-1", "1.0").is_err());
        assert!(ProductDraft::parse("Widget", "5", "free").is_err());
        assert!(ProductDraft::parse("Widget", "5", "-0.5").is_err());
    }
}
