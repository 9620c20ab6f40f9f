//! HTTP binding for the sharelock access gateway.

pub mod codes;
pub mod errors;
pub mod server;
pub mod upload;


pub use codes::{data_url, QrCodeEncoder};
pub use errors::ApiError;
pub use server::{build_router, start_server, AppState, UploadResponse, CREDENTIAL_HEADER};
