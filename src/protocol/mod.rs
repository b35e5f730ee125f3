pub mod request;
pub mod response;

pub use request::{ClientRequest, RequestKind};
pub use response::{ResponseBody, ServerResponse};
