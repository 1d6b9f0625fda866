//! 背包收藏集

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BackpackCollection {
    pub id: i64,
    pub entity_id: String,
    pub owner_id: i64,
    pub name: String,
    pub description: String,
    /// 发布后生成，取消发布时清空
    #[sqlx(default)]
    pub share_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// 有序的徽章实例 entity_id，由仓储单独加载
    #[sqlx(skip)]
    pub assertions: Vec<String>,
}

impl BackpackCollection {
    pub fn published(&self) -> bool {
        self.share_hash.is_some()
    }

    /// 发布时返回公开分享地址
    pub fn share_url(&self, origin: &str) -> Option<String> {
        self.share_hash.as_ref().map(|hash| {
            format!(
                "{}/public/collections/{}",
                origin.trim_end_matches('/'),
                hash
            )
        })
    }

    /// 切换发布状态；已发布时保留原有 share_hash
    pub fn set_published(&mut self, published: bool) {
        match (published, self.share_hash.is_some()) {
            (true, false) => self.share_hash = Some(crate::entity_id::generate()),
            (false, true) => self.share_hash = None,
            _ => {}
        }
    }
}

/// 新建收藏集参数
#[derive(Debug, Clone)]
pub struct NewCollection {
    pub entity_id: String,
    pub owner_id: i64,
    pub name: String,
    pub description: String,
    pub share_hash: Option<String>,
    pub assertions: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collection() -> BackpackCollection {
        let now = Utc::now();
        BackpackCollection {
            id: 1,
            entity_id: "col".into(),
            owner_id: 1,
            name: "Mine".into(),
            description: String::new(),
            share_hash: None,
            created_at: now,
            updated_at: now,
            assertions: vec![],
        }
    }

    #[test]
    fn test_publish_toggles_share_url() {
        let mut c = collection();
        assert_eq!(c.share_url("https://badgr.example.org"), None);

        c.set_published(true);
        let hash = c.share_hash.clone().unwrap();
        assert_eq!(
            c.share_url("https://badgr.example.org/"),
            Some(format!("https://badgr.example.org/public/collections/{}", hash))
        );

        // 重复发布不换 hash
        c.set_published(true);
        assert_eq!(c.share_hash.as_deref(), Some(hash.as_str()));

        c.set_published(false);
        assert!(!c.published());
    }
}
