//! 用户与身份标识

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::{IdentifierType, RecipientType};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub entity_id: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing)]
    #[sqlx(default)]
    pub password_hash: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 用户拥有的身份标识（邮箱、URL、电话）
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserIdentifier {
    pub id: i64,
    pub user_id: i64,
    pub identifier: String,
    pub identifier_type: IdentifierType,
    pub verified: bool,
    pub created_at: DateTime<Utc>,
}

/// 用户及其全部身份标识，权限判断与背包查询都基于它
#[derive(Debug, Clone)]
pub struct UserAccount {
    pub user: User,
    pub identifiers: Vec<UserIdentifier>,
}

impl UserAccount {
    pub fn new(user: User, identifiers: Vec<UserIdentifier>) -> Self {
        Self { user, identifiers }
    }

    pub fn id(&self) -> i64 {
        self.user.id
    }

    pub fn entity_id(&self) -> &str {
        &self.user.entity_id
    }

    /// 至少拥有一个已验证的身份标识
    pub fn is_verified(&self) -> bool {
        self.identifiers.iter().any(|i| i.verified)
    }

    /// 已验证的全部标识（不区分类型），用于匹配徽章接收者
    pub fn verified_identifiers(&self) -> Vec<String> {
        self.identifiers
            .iter()
            .filter(|i| i.verified)
            .map(|i| i.identifier.clone())
            .collect()
    }

    pub fn verified_emails(&self) -> Vec<&str> {
        self.identifiers
            .iter()
            .filter(|i| i.verified && i.identifier_type == IdentifierType::Email)
            .map(|i| i.identifier.as_str())
            .collect()
    }

    /// 大小写不敏感地判断邮箱是否为已验证邮箱
    pub fn is_email_verified(&self, email: &str) -> bool {
        self.verified_emails()
            .iter()
            .any(|e| e.eq_ignore_ascii_case(email))
    }

    /// 判断给定接收者是否属于本用户的已验证标识
    pub fn owns_recipient(&self, identifier: &str, recipient_type: RecipientType) -> bool {
        let wanted = recipient_type.identifier_type();
        self.identifiers.iter().any(|i| {
            i.verified && i.identifier_type == wanted && i.identifier.eq_ignore_ascii_case(identifier)
        })
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn user(id: i64) -> User {
        let now = Utc::now();
        User {
            id,
            entity_id: format!("user{:018}", id),
            first_name: "Test".to_string(),
            last_name: format!("User{}", id),
            password_hash: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn identifier(user_id: i64, value: &str, kind: IdentifierType, verified: bool) -> UserIdentifier {
        UserIdentifier {
            id: user_id * 100 + value.len() as i64,
            user_id,
            identifier: value.to_string(),
            identifier_type: kind,
            verified,
            created_at: Utc::now(),
        }
    }

    pub fn account(id: i64, emails: &[&str]) -> UserAccount {
        UserAccount::new(
            user(id),
            emails
                .iter()
                .map(|e| identifier(id, e, IdentifierType::Email, true))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_verified_identifiers() {
        let mut account = account(1, &["a@example.org"]);
        account
            .identifiers
            .push(identifier(1, "b@example.org", IdentifierType::Email, false));
        account.identifiers.push(identifier(
            1,
            "https://a.example.org",
            IdentifierType::Url,
            true,
        ));

        assert!(account.is_verified());
        assert_eq!(account.verified_emails(), vec!["a@example.org"]);
        assert!(account.is_email_verified("A@Example.org"));
        assert!(!account.is_email_verified("b@example.org"));
        assert_eq!(account.verified_identifiers().len(), 2);
    }

    #[test]
    fn test_owns_recipient_by_type() {
        let mut account = account(2, &["me@example.org"]);
        account.identifiers.push(identifier(
            2,
            "https://me.example.org",
            IdentifierType::Url,
            true,
        ));

        assert!(account.owns_recipient("ME@example.org", RecipientType::Email));
        assert!(account.owns_recipient("https://me.example.org", RecipientType::Id));
        assert!(!account.owns_recipient("me@example.org", RecipientType::Url));
    }

    #[test]
    fn test_unverified_account() {
        let account = UserAccount::new(
            user(3),
            vec![identifier(3, "x@example.org", IdentifierType::Email, false)],
        );
        assert!(!account.is_verified());
    }
}
