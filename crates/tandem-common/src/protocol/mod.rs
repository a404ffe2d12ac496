pub mod batch;
pub mod builtin;
pub mod codes;
pub mod error;
pub mod failure;
pub mod procedure;


pub use batch::{batch_status, BatchPayload, CallId, CallRequest, CallResponse, ErrorBody, ErrorData};
pub use codes::ErrorCode;
pub use error::{Result, TandemError};
pub use failure::ProcedureError;
pub use procedure::{path_is_within, PathError, ProcedureKind, ProcedurePath};
