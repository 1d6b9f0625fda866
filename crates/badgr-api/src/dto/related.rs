//! 响应渲染时按需加载关联的徽章定义与发行方
//!
//! 同一次请求内按 id 缓存，列表渲染时每个关联对象只查询一次

use std::collections::HashMap;

use serde_json::Value;

use badgr_core::models::{BadgeClass, BadgeInstance, Issuer};
use badgr_core::openbadges::RenderOptions;

use super::assertion::AssertionDto;
use super::badge_class::BadgeClassDto;
use super::query::Expands;
use crate::error::{ApiError, Result};
use crate::state::AppState;

pub struct Related<'a> {
    state: &'a AppState,
    badge_classes: HashMap<i64, BadgeClass>,
    issuers: HashMap<i64, Issuer>,
}

impl<'a> Related<'a> {
    pub fn new(state: &'a AppState) -> Self {
        Self {
            state,
            badge_classes: HashMap::new(),
            issuers: HashMap::new(),
        }
    }

    pub async fn badge_class(&mut self, id: i64) -> Result<BadgeClass> {
        if let Some(found) = self.badge_classes.get(&id) {
            return Ok(found.clone());
        }
        let badge_class = self
            .state
            .repos
            .badge_classes
            .get(id)
            .await?
            .ok_or_else(|| ApiError::Internal(format!("badge class {} missing", id)))?;
        self.badge_classes.insert(id, badge_class.clone());
        Ok(badge_class)
    }

    pub async fn issuer(&mut self, id: i64) -> Result<Issuer> {
        if let Some(found) = self.issuers.get(&id) {
            return Ok(found.clone());
        }
        let issuer = self
            .state
            .repos
            .issuers
            .get(id)
            .await?
            .ok_or_else(|| ApiError::Internal(format!("issuer {} missing", id)))?;
        self.issuers.insert(id, issuer.clone());
        Ok(issuer)
    }

    pub async fn badge_class_dto(&mut self, badge_class: BadgeClass) -> Result<BadgeClassDto> {
        let issuer = self.issuer(badge_class.issuer_id).await?;
        let urls = &self.state.urls;
        let open_badge_id = urls.badge_class_jsonld_id(&badge_class);
        Ok(BadgeClassDto::new(
            badge_class,
            open_badge_id,
            urls.issuer_jsonld_id(&issuer),
        ))
    }

    pub async fn badge_class_dtos(&mut self, badge_classes: Vec<BadgeClass>) -> Result<Vec<BadgeClassDto>> {
        let mut dtos = Vec::with_capacity(badge_classes.len());
        for badge_class in badge_classes {
            dtos.push(self.badge_class_dto(badge_class).await?);
        }
        Ok(dtos)
    }

    /// 发行方视角的实例表示
    pub async fn assertion(&mut self, instance: BadgeInstance) -> Result<AssertionDto> {
        let badge_class = self.badge_class(instance.badgeclass_id).await?;
        let issuer = self.issuer(instance.issuer_id).await?;
        let urls = &self.state.urls;
        let open_badge_id = urls.assertion_jsonld_id(&instance);
        Ok(AssertionDto::new(
            instance,
            open_badge_id,
            urls.badge_class_jsonld_id(&badge_class),
            urls.issuer_jsonld_id(&issuer),
        ))
    }

    pub async fn assertions(&mut self, instances: Vec<BadgeInstance>) -> Result<Vec<AssertionDto>> {
        let mut dtos = Vec::with_capacity(instances.len());
        for instance in instances {
            dtos.push(self.assertion(instance).await?);
        }
        Ok(dtos)
    }

    /// 背包表示：带 pending；展开 badgeclass 时内联徽章定义文档，
    /// 同时展开 issuer 时发行方文档嵌在 badgeclass.issuer 下
    pub async fn backpack_assertion(&mut self, instance: BadgeInstance, expands: Expands) -> Result<AssertionDto> {
        let pending = instance.pending();
        let badgeclass = if expands.badgeclass {
            Some(self.expanded_badge_class(instance.badgeclass_id, expands.issuer).await?)
        } else {
            None
        };

        let mut dto = self.assertion(instance).await?;
        dto.pending = Some(pending);
        if let Some(badgeclass) = badgeclass {
            dto.badgeclass = badgeclass;
        }
        Ok(dto)
    }

    pub async fn backpack_assertions(
        &mut self,
        instances: Vec<BadgeInstance>,
        expands: Expands,
    ) -> Result<Vec<AssertionDto>> {
        let mut dtos = Vec::with_capacity(instances.len());
        for instance in instances {
            dtos.push(self.backpack_assertion(instance, expands).await?);
        }
        Ok(dtos)
    }

    async fn expanded_badge_class(&mut self, badge_class_id: i64, with_issuer: bool) -> Result<Value> {
        let badge_class = self.badge_class(badge_class_id).await?;
        let issuer = self.issuer(badge_class.issuer_id).await?;
        let urls = &self.state.urls;

        let mut doc = urls.badge_class_json(
            &badge_class,
            &urls.issuer_jsonld_id(&issuer),
            RenderOptions::expanded(),
        );
        if with_issuer {
            if let Some(object) = doc.as_object_mut() {
                object.insert(
                    "issuer".to_string(),
                    urls.issuer_json(&issuer, RenderOptions::expanded()),
                );
            }
        }
        Ok(doc)
    }
}
