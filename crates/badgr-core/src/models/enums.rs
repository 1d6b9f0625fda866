//! 领域枚举定义

use chrono::{DateTime, Months, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// 发行方成员角色
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
pub enum StaffRole {
    Owner,
    Editor,
    #[default]
    Staff,
}

impl StaffRole {
    /// owner 与 editor 可修改发行方及其徽章定义
    pub fn can_edit(&self) -> bool {
        matches!(self, Self::Owner | Self::Editor)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Editor => "editor",
            Self::Staff => "staff",
        }
    }
}

/// 接收者对徽章实例的处理状态
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar")]
pub enum Acceptance {
    Unaccepted,
    #[default]
    Accepted,
    Rejected,
}

impl Acceptance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unaccepted => "Unaccepted",
            Self::Accepted => "Accepted",
            Self::Rejected => "Rejected",
        }
    }
}

/// 接收者标识类型
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
pub enum RecipientType {
    #[default]
    Email,
    Url,
    Id,
    Telephone,
}

impl RecipientType {
    /// 未显式指定 hashed 时的默认值
    pub fn hashed_by_default(&self) -> bool {
        matches!(self, Self::Email | Self::Telephone)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Url => "url",
            Self::Id => "id",
            Self::Telephone => "telephone",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "email" => Some(Self::Email),
            "url" => Some(Self::Url),
            "id" => Some(Self::Id),
            "telephone" => Some(Self::Telephone),
            _ => None,
        }
    }

    /// 用户身份标识中与之对应的类型（id 类型与 url 共用）
    pub fn identifier_type(&self) -> IdentifierType {
        match self {
            Self::Email => IdentifierType::Email,
            Self::Url | Self::Id => IdentifierType::Url,
            Self::Telephone => IdentifierType::Telephone,
        }
    }
}

/// 用户身份标识类型
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
pub enum IdentifierType {
    #[default]
    Email,
    Url,
    Telephone,
}

/// 徽章定义的有效期单位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
pub enum ExpiresDuration {
    Days,
    Weeks,
    Months,
    Years,
}

impl ExpiresDuration {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "days" => Some(Self::Days),
            "weeks" => Some(Self::Weeks),
            "months" => Some(Self::Months),
            "years" => Some(Self::Years),
            _ => None,
        }
    }

    /// 从 `from` 起算 `amount` 个单位后的时间，溢出时返回 None
    pub fn add_to(&self, from: DateTime<Utc>, amount: i32) -> Option<DateTime<Utc>> {
        let amount = u32::try_from(amount).ok()?;
        match self {
            Self::Days => from.checked_add_signed(TimeDelta::try_days(amount.into())?),
            Self::Weeks => from.checked_add_signed(TimeDelta::try_weeks(amount.into())?),
            Self::Months => from.checked_add_months(Months::new(amount)),
            Self::Years => from.checked_add_months(Months::new(amount.checked_mul(12)?)),
        }
    }
}
