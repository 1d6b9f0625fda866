//! 中间件模块
//!
//! 提供 OAuth Bearer 令牌认证中间件

mod auth;

pub use auth::bearer_auth;
