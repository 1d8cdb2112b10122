/// Case-insensitive substring search, used by the product list filter
pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Format a price for display with two decimal places
pub fn format_price(price: f64) -> String {
    format!("${:.2}", price)
}

/// Truncate a string to a maximum length, adding ellipsis if needed
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{}...", truncated)
    }
}

/// Format an inventory count for display
pub fn format_inventory(count: i64) -> String {
    match count {
        0 => "out of stock".to_string(),
        1 => "1 unit".to_string(),
        n => format!("{} units", n),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_ignore_case() {
        assert!(contains_ignore_case("Widget Deluxe", "deluxe"));
        assert!(contains_ignore_case("Widget Deluxe", "WIDGET"));
        assert!(!contains_ignore_case("Widget", "gadget"));
    }

    #[test]
    fn test_format_price() {
        assert_eq!(format_price(19.99), "$19.99");
        assert_eq!(format_price(5.0), "$5.00");
        assert_eq!(format_price(0.125), "$0.13");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("Hello", 10), "Hello");
        assert_eq!(truncate("Hello World", 8), "Hello...");
        assert_eq!(truncate("Hi", 2), "Hi");
    }

    #[test]
    fn test_format_inventory() {
        assert_eq!(format_inventory(0), "out of stock");
        assert_eq!(format_inventory(1), "1 unit");
        assert_eq!(format_inventory(42), "42 units");
    }
}
