//! HTTP 接口的数据传输对象

pub mod request;
pub mod response;

pub use request::{
    CreateInternalJobRequest, ListJobsQuery, PreviewQuery, SubmitEventRequest,
    UpdateInternalJobRequest,
};
pub use response::{
    ApiResponse, DeletedResponse, HealthResponse, JobPreviewResponse, JobRunResponse,
    TargetCustomer,
};
