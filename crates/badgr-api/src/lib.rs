//! Open Badges 发行与背包 API 服务
//!
//! 提供发行方、徽章定义、徽章实例的管理接口，接收者背包与收藏集，
//! 外部徽章导入，OAuth 令牌签发以及公开的 Open Badges 文档。
//!
//! ## 模块结构
//!
//! - `auth`: 请求身份、scope 匹配与发行方对象级权限
//! - `dto`: 请求校验、响应表示与 V2 信封
//! - `error`: 错误类型定义
//! - `handlers`: HTTP 请求处理器
//! - `middleware`: Bearer 令牌认证
//! - `routes`: 路由配置
//! - `state`: 应用状态
//!
//! ## 技术栈
//!
//! - Web 框架：Axum
//! - 数据验证：validator
//! - 序列化：serde (camelCase)

pub mod auth;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod state;

pub use error::{ApiError, Result};
pub use routes::build_router;
pub use state::AppState;
