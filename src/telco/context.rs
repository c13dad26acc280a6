use serde::{Deserialize, Serialize};

/// Placeholder rendered into instructions for facts not known yet.
pub const UNKNOWN: &str = "[unknown]";

/// Session facts shared by the telco agents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelcoContext {
    pub customer_name: Option<String>,
    pub account_number: Option<String>,
}

impl TelcoContext {
    pub fn customer_name_or_unknown(&self) -> &str {
        self.customer_name.as_deref().unwrap_or(UNKNOWN)
    }

    pub fn account_number_or_unknown(&self) -> &str {
        self.account_number.as_deref().unwrap_or(UNKNOWN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_fields_render_unknown() {
        let ctx = TelcoContext::default();
        assert_eq!(ctx.account_number_or_unknown(), "[unknown]");
        assert_eq!(ctx.customer_name_or_unknown(), "[unknown]");

        let ctx = TelcoContext {
            customer_name: Some("Wei Ling".to_string()),
            account_number: Some("12345678".to_string()),
        };
        assert_eq!(ctx.account_number_or_unknown(), "12345678");
        assert_eq!(ctx.customer_name_or_unknown(), "Wei Ling");
    }
}
