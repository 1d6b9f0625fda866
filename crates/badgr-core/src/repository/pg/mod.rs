//! PostgreSQL 仓储实现

mod assertion_repo;
mod badge_class_repo;
mod collection_repo;
mod issuer_repo;
mod oauth_repo;
mod user_repo;

pub use assertion_repo::AssertionRepository;
pub use badge_class_repo::BadgeClassRepository;
pub use collection_repo::CollectionRepository;
pub use issuer_repo::IssuerRepository;
pub use oauth_repo::OAuthRepository;
pub use user_repo::UserRepository;
