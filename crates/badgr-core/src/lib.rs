//! Open Badges 核心领域库
//!
//! 提供发行方、徽章定义、徽章实例（assertion）与背包收藏集的模型层，
//! 以及仓储抽象、Open Badges JSON-LD 渲染和外部徽章导入校验。
//!
//! ## 模块结构
//!
//! - `models`: 实体模型与枚举
//! - `repository`: 仓储 Trait、PostgreSQL 实现与内存实现
//! - `service`: 发放、撤销、令牌等跨实体的领域操作
//! - `openbadges`: Open Badges 2.0 JSON-LD 文档渲染
//! - `badgecheck`: 外部徽章的获取、解包与校验
//! - `publisher`: 用户缓存发布（背包缓存失效通知）

pub mod badgecheck;
pub mod entity_id;
pub mod error;
pub mod hashing;
pub mod models;
pub mod openbadges;
pub mod publisher;
pub mod repository;
pub mod service;
pub mod text;

pub use error::{CoreError, FieldErrors, Result};
pub use models::{
    AccessToken, Acceptance, Alignment, Application, BackpackCollection, BadgeClass,
    BadgeInstance, EvidenceItem, ExpiresDuration, IdentifierType, Issuer, IssuerStaff,
    RecipientType, StaffRole, User, UserAccount, UserIdentifier,
};
pub use repository::Repositories;
