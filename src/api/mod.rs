pub mod request;
pub mod response;
pub mod routes;
pub mod tls;

pub use request::ImageReview;
pub use response::{ErrorResponse, ImageReviewResponse};
pub use routes::{create_router, AppState};
pub use tls::{server_config, TlsError};
