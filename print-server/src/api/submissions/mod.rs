//! Submission Routes
//!
//! | path | method | notes |
//! |------|--------|-------|
//! | /api/submissions | POST | JSON or multipart, 202 on accept |
//! | /api/submissions | GET | guestbook page, newest first |
//! | /api/submissions/count | GET | number of stored records |
//! | /api/submissions/{identifier} | GET | one stored record |

mod handler;

pub use handler::client_address;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::get;

use crate::core::ServerState;

pub fn router(body_limit: usize) -> Router<ServerState> {
    Router::new()
        .route("/api/submissions", get(handler::list).post(handler::create))
        .route("/api/submissions/count", get(handler::count))
        .route("/api/submissions/{identifier}", get(handler::get_by_id))
        .layer(DefaultBodyLimit::max(body_limit))
}
