//! 领域模型
//!
//! 发行方、徽章定义、徽章实例、背包收藏集以及用户和 OAuth 实体

pub mod assertion;
pub mod badge_class;
pub mod collection;
pub mod enums;
pub mod issuer;
pub mod oauth;
pub mod user;

pub use assertion::{AssertionFilter, BadgeInstance, EvidenceItem, NewBadgeInstance};
pub use badge_class::{Alignment, BadgeClass, NewBadgeClass};
pub use collection::{BackpackCollection, NewCollection};
pub use enums::{Acceptance, ExpiresDuration, IdentifierType, RecipientType, StaffRole};
pub use issuer::{Issuer, IssuerStaff, NewIssuer, role_of};
pub use oauth::{
    AccessToken, Application, NewAccessToken, PUBLIC_CLIENT_ID, generate_token, split_scopes,
};
pub use user::{User, UserAccount, UserIdentifier};
