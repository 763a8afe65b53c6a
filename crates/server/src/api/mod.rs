pub mod handlers;
pub mod instances;
pub mod middleware;
pub mod pipelines;
pub mod routes;

pub use routes::create_router;
