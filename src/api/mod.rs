//! HTTP 接口公共部分：请求解析辅助与 OpenAPI 聚合
pub mod request;
pub mod swagger;

#[cfg(test)]
pub mod testing;
