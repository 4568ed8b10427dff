use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};

use crate::ids::BorrowerId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Borrower {
    pub id: BorrowerId,
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BorrowerInput {
    #[garde(length(min = 1, max = 150))]
    pub name: String,
    #[garde(email)]
    pub email: String,
}

impl BorrowerInput {
    pub(crate) fn normalized(mut self) -> Self {
        self.name = self.name.trim().to_string();
        self.email = self.email.trim().to_lowercase();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_is_lowercased() {
        let input = BorrowerInput {
            name: " Ada ".to_string(),
            email: "Ada@Example.COM ".to_string(),
        }
        .normalized();
        assert_eq!(input.name, "Ada");
        assert_eq!(input.email, "ada@example.com");
        assert!(input.validate().is_ok());
    }

    #[test]
    fn malformed_email_is_rejected() {
        let input = BorrowerInput {
            name: "Ada".to_string(),
            email: "not-an-email".to_string(),
        };
        assert!(input.validate().is_err());
    }
}
