//! HTTP 请求处理器

pub mod brand;
pub mod event;
pub mod health;
pub mod internal_job;

pub use brand::Brand;
