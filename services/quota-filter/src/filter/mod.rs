mod handler;
mod route;

pub use handler::QuotaFilter;
pub use route::{ResourcePath, Route};
